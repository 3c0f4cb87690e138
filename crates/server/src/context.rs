//! Inbound events and per-request context construction.

use std::collections::HashMap;

use {async_trait::async_trait, graphpush_protocol::GraphQLError};

/// One invocation of the handler, as delivered by the gateway.
#[derive(Debug, Clone, Default)]
pub struct InboundEvent {
    /// Push connection the frame arrived on. `None` for one-shot HTTP calls.
    pub connection_id: Option<String>,
    /// Raw request body (a JSON request envelope).
    pub body: String,
    /// Request headers, keys lowercased.
    headers: HashMap<String, String>,
}

impl InboundEvent {
    /// A frame received on a push connection.
    pub fn frame(connection_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            connection_id: Some(connection_id.into()),
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    /// A one-shot HTTP request.
    pub fn http(body: impl Into<String>) -> Self {
        Self {
            connection_id: None,
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Cookies from the `Cookie` header.
    pub fn cookies(&self) -> HashMap<String, String> {
        parse_cookies(self.header("cookie").unwrap_or_default())
    }
}

/// Split a `Cookie` header into name/value pairs.
///
/// Pairs are separated by `"; "`; a value may itself contain `=`.
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split("; ")
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => (name.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

/// Headers the context builder wants returned alongside the response
/// (e.g. `Set-Cookie`). Only the HTTP path can deliver them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders(Vec<(String, String)>);

impl ResponseHeaders {
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Input handed to a [`ContextBuilder`].
pub struct ContextRequest<'a> {
    pub event: &'a InboundEvent,
    pub cookies: HashMap<String, String>,
    pub response_headers: &'a mut ResponseHeaders,
}

/// Builds the execution context for one request.
///
/// Runs once per request, after validation and before execution. An error
/// fails the request with an `EXECUTION_FAILED` frame.
#[async_trait]
pub trait ContextBuilder<C>: Send + Sync + 'static {
    async fn build(&self, request: ContextRequest<'_>) -> Result<C, GraphQLError>;
}

/// Builder producing `C::default()` for every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContext;

#[async_trait]
impl<C> ContextBuilder<C> for DefaultContext
where
    C: Default + Send + 'static,
{
    async fn build(&self, _request: ContextRequest<'_>) -> Result<C, GraphQLError> {
        Ok(C::default())
    }
}
