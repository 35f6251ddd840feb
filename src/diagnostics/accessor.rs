//! Named field accessors over opaque diagnostic payloads.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::diagnostics::bus::DiagnosticPayload;
use crate::diagnostics::exchange::{register_client_shapes, HttpExchange};

/// Resolves one field of a payload value, or `None` if the value is not the
/// expected concrete type.
pub type ExchangeGetter = fn(&(dyn Any + Send + Sync)) -> Option<&dyn HttpExchange>;

/// Raised when an observer asks for a field no registered shape provides.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessorError {
    #[error("unknown payload shape '{0}'")]
    UnknownShape(String),

    #[error("payload shape '{shape}' has no field '{field}'")]
    UnknownField { shape: String, field: String },
}

/// Registry of known payload shapes and the fields each exposes.
#[derive(Clone, Default)]
pub struct PayloadShapes {
    fields: HashMap<&'static str, HashMap<&'static str, ExchangeGetter>>,
}

impl PayloadShapes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shapes written by the instrumented HTTP client.
    pub fn builtin() -> Self {
        let mut shapes = Self::new();
        register_client_shapes(&mut shapes);
        shapes
    }

    pub fn register(&mut self, shape: &'static str, field: &'static str, getter: ExchangeGetter) {
        self.fields.entry(shape).or_default().insert(field, getter);
    }

    /// Resolve an accessor up front. Failing here means the producer's
    /// payload contract changed and the observer cannot work at all.
    pub fn accessor(&self, shape: &str, field: &str) -> Result<FieldAccessor, AccessorError> {
        let (shape_key, fields) = self
            .fields
            .get_key_value(shape)
            .ok_or_else(|| AccessorError::UnknownShape(shape.to_string()))?;
        let (field_key, getter) =
            fields
                .get_key_value(field)
                .ok_or_else(|| AccessorError::UnknownField {
                    shape: shape.to_string(),
                    field: field.to_string(),
                })?;

        Ok(FieldAccessor {
            shape: *shape_key,
            field: *field_key,
            getter: *getter,
        })
    }
}

impl fmt::Debug for PayloadShapes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (shape, fields) in &self.fields {
            map.entry(shape, &fields.keys().collect::<Vec<_>>());
        }
        map.finish()
    }
}

/// A resolved `(shape, field)` accessor.
#[derive(Clone, Copy)]
pub struct FieldAccessor {
    shape: &'static str,
    field: &'static str,
    getter: ExchangeGetter,
}

impl FieldAccessor {
    pub fn shape(&self) -> &'static str {
        self.shape
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    /// Borrow the field from a payload. `None` when the payload has another
    /// shape or the field is absent.
    pub fn get<'a>(&self, payload: &'a DiagnosticPayload) -> Option<&'a dyn HttpExchange> {
        if payload.shape() != self.shape {
            return None;
        }
        (self.getter)(payload.value())
    }
}

impl fmt::Debug for FieldAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldAccessor({}.{})", self.shape, self.field)
    }
}
