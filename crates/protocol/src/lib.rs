//! Wire protocol for GraphQL over a push-style WebSocket gateway.
//!
//! All communication uses JSON text frames.
//!
//! Frame types:
//! - `RequestEnvelope`: client → server, starts an operation or cancels one
//! - `ResponseFrame`: server → client, one result (or the terminal marker) of
//!   the operation identified by `id`
//!
//! A subscription produces any number of `done: false` frames followed by
//! exactly one `done: true` frame.

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

// ── Constants ────────────────────────────────────────────────────────────────

pub const MAX_PAYLOAD_BYTES: usize = 131_072; // 128 KB
pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;

// ── Error codes ──────────────────────────────────────────────────────────────

/// Values carried in `extensions.code` of errors synthesized by the server.
pub mod error_codes {
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const OPERATION_NOT_FOUND: &str = "OPERATION_NOT_FOUND";
    pub const EXECUTION_FAILED: &str = "EXECUTION_FAILED";
    pub const SUBSCRIPTION_FAILED: &str = "SUBSCRIPTION_FAILED";
    pub const DUPLICATE_SUBSCRIPTION: &str = "DUPLICATE_SUBSCRIPTION";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

// ── Error shape ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

/// A GraphQL error as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: None,
            extensions: None,
        }
    }

    /// Build an error tagged with one of the [`error_codes`].
    pub fn with_code(code: &str, message: impl Into<String>) -> Self {
        let mut err = Self::new(message);
        err.set_code(code);
        err
    }

    /// Normalize any displayable error into the wire shape.
    pub fn from_display(err: impl std::fmt::Display) -> Self {
        Self::new(err.to_string())
    }

    pub fn set_code(&mut self, code: &str) {
        self.extensions
            .get_or_insert_with(Map::new)
            .insert("code".into(), Value::String(code.into()));
    }

    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.get("code")?.as_str()
    }
}

impl std::fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for GraphQLError {}

// ── Frames ───────────────────────────────────────────────────────────────────

/// What a request envelope asks the server to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// Run the operation in `query` (the default when `type` is absent).
    #[default]
    Start,
    /// Stop the live subscription identified by `id`.
    Cancel,
}

impl RequestKind {
    fn is_start(&self) -> bool {
        matches!(self, Self::Start)
    }
}

/// Client → server request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    #[serde(rename = "type", default, skip_serializing_if = "RequestKind::is_start")]
    pub kind: RequestKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl RequestEnvelope {
    pub fn start(id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            query: Some(query.into()),
            ..Default::default()
        }
    }

    pub fn cancel(id: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::Cancel,
            id: Some(id.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = Some(variables);
        self
    }

    #[must_use]
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

/// Server → client result frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<GraphQLError>,
    #[serde(default)]
    pub done: bool,
}

impl ResponseFrame {
    /// A non-terminal result frame.
    pub fn next(id: Option<String>, data: Option<Value>, errors: Vec<GraphQLError>) -> Self {
        Self {
            id,
            data,
            errors,
            done: false,
        }
    }

    /// The terminal frame ending a subscription normally.
    pub fn complete(id: Option<String>) -> Self {
        Self {
            id,
            data: None,
            errors: Vec::new(),
            done: true,
        }
    }

    /// A terminal frame carrying the errors that ended the operation.
    pub fn failure(id: Option<String>, errors: Vec<GraphQLError>) -> Self {
        Self {
            id,
            data: None,
            errors,
            done: true,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.done
    }
}

/// Body of the one-shot HTTP call: `{data, errors}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpResponseBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<GraphQLError>,
}

impl From<ResponseFrame> for HttpResponseBody {
    fn from(frame: ResponseFrame) -> Self {
        Self {
            data: frame.data,
            errors: frame.errors,
        }
    }
}
