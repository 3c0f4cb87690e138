//! Conversions from async-graphql errors to the wire error shape.

use {
    async_graphql::{ServerError, parser},
    graphpush_protocol::GraphQLError,
};

/// Convert an execution error into the wire shape.
///
/// Both types serialize to the GraphQL response error format, so the
/// conversion goes through JSON and keeps locations, path and extensions.
pub fn server_error(error: ServerError) -> GraphQLError {
    serde_json::to_value(&error)
        .and_then(serde_json::from_value)
        .unwrap_or_else(|_| GraphQLError::new(error.message))
}

/// Convert a syntax error, keeping its positions.
pub fn syntax_error(error: parser::Error) -> GraphQLError {
    server_error(ServerError::from(error))
}
