//! Demo endpoints served over a real listener.

use std::time::Duration;

use http_observers::http::Todo;
use reqwest::StatusCode;

mod common;

#[tokio::test]
async fn test_hello() {
    let backend = common::start_todo_backend().await;
    let (addr, _sink, shutdown) = common::start_server(format!("http://{}/todos/1", backend)).await;

    let res = common::test_client()
        .get(format!("http://{}/", addr))
        .send()
        .await
        .expect("server unreachable");

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "Hello World!");
    shutdown.trigger();
}

#[tokio::test]
async fn test_event_listener_endpoint() {
    let backend = common::start_todo_backend().await;
    let (addr, sink, shutdown) = common::start_server(format!("http://{}/todos/1", backend)).await;

    let res = common::test_client()
        .get(format!("http://{}/test", addr))
        .send()
        .await
        .expect("server unreachable");

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({"userId": 1, "title": "delectus aut autem", "completed": false})
    );

    let lines = sink.lines();
    assert_eq!(lines.len(), 3, "{lines:?}");
    assert!(lines[0].contains(" RequestStart http://127.0.0.1:"));
    assert!(lines[1].contains(" executed in "));
    assert!(lines[2].ends_with(" RequestStop"));
    shutdown.trigger();
}

#[tokio::test]
async fn test_diagnostic_tap_endpoint() {
    let backend = common::start_todo_backend().await;
    let todo_url = format!("http://{}/todos/1", backend);
    let (addr, sink, shutdown) = common::start_server(todo_url.clone()).await;

    let todo: Todo = common::test_client()
        .get(format!("http://{}/test2", addr))
        .send()
        .await
        .expect("server unreachable")
        .json()
        .await
        .unwrap();

    assert_eq!(todo.title, "delectus aut autem");
    assert!(!todo.completed);

    let lines = sink.lines();
    assert_eq!(lines.len(), 2, "{lines:?}");
    assert!(lines[0].starts_with(&format!("GET {todo_url} 1.1 (UserAgent: http-observers/")));
    assert_eq!(lines[1], format!("200 {todo_url}"));
    shutdown.trigger();
}

#[tokio::test]
async fn test_upstream_failure_is_bad_gateway() {
    let backend =
        common::start_programmable_backend(|| async { (404, "{}".to_string()) }).await;
    let (addr, sink, shutdown) = common::start_server(format!("http://{}/todos/1", backend)).await;

    let res = common::test_client()
        .get(format!("http://{}/test2", addr))
        .send()
        .await
        .expect("server unreachable");

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("404"));

    // The tap still saw the exchange.
    assert_eq!(sink.lines().len(), 2);
    assert!(sink.lines()[1].starts_with("404 "));
    shutdown.trigger();
}

#[tokio::test]
async fn test_graceful_shutdown() {
    let backend = common::start_todo_backend().await;
    let (addr, _sink, shutdown) = common::start_server(format!("http://{}/todos/1", backend)).await;

    assert_eq!(shutdown.trigger(), 1);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let res = common::test_client()
        .get(format!("http://{}/", addr))
        .timeout(Duration::from_secs(2))
        .send()
        .await;
    assert!(res.is_err(), "server still answering after shutdown");
}
