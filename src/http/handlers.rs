//! Demo endpoints.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::http::error::AppError;
use crate::http::server::AppState;
use crate::observers::{DiagnosticTap, HttpEventListener};

/// A todo item as served by the upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub user_id: i32,
    pub title: String,
    pub completed: bool,
}

pub async fn hello() -> &'static str {
    "Hello World!"
}

/// Fetch the todo with the request correlator enabled.
pub async fn fetch_with_event_listener(
    State(state): State<AppState>,
) -> Result<Json<Todo>, AppError> {
    let _listener = HttpEventListener::enable(
        &state.session,
        state.sink.clone(),
        state.correlator.stale_after(),
    );
    let todo = state.client.get_json::<Todo>(&state.upstream.todo_url).await?;
    Ok(Json(todo))
}

/// Fetch the todo with the diagnostic tap installed.
pub async fn fetch_with_diagnostic_tap(
    State(state): State<AppState>,
) -> Result<Json<Todo>, AppError> {
    let _tap = DiagnosticTap::install(&state.bus, state.tap_accessors, state.sink.clone());
    let todo = state.client.get_json::<Todo>(&state.upstream.todo_url).await?;
    Ok(Json(todo))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_todo_json_uses_camel_case() {
        let todo: Todo = serde_json::from_str(
            r#"{"userId":1,"id":1,"title":"delectus aut autem","completed":false}"#,
        )
        .unwrap();
        assert_eq!(
            todo,
            Todo {
                user_id: 1,
                title: "delectus aut autem".into(),
                completed: false,
            }
        );
        assert_eq!(
            serde_json::to_value(&todo).unwrap(),
            serde_json::json!({"userId": 1, "title": "delectus aut autem", "completed": false})
        );
    }
}
