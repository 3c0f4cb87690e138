//! The GraphQL execution capability consumed by the router.
//!
//! Parsing, validation and execution belong to an external engine. The router
//! only needs the five operations of [`Engine`]; everything else about the
//! schema stays behind the trait.

use {
    async_trait::async_trait,
    futures::stream::BoxStream,
    graphpush_protocol::GraphQLError,
    serde_json::{Map, Value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

/// One execution result: `{data, errors}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    pub data: Option<Value>,
    pub errors: Vec<GraphQLError>,
}

impl ExecutionResult {
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn error(error: GraphQLError) -> Self {
        Self {
            data: None,
            errors: vec![error],
        }
    }

    /// `true` when the result carries errors and nothing else.
    pub fn is_failure(&self) -> bool {
        self.data.is_none() && !self.errors.is_empty()
    }
}

/// Pull-based sequence of subscription results.
///
/// An `Err` item is a terminal failure of the source stream; the bridge stops
/// pulling after it. Dropping the stream cancels it.
pub type ResultStream = BoxStream<'static, Result<ExecutionResult, GraphQLError>>;

/// What `subscribe` hands back.
pub enum SubscribeOutcome {
    Stream(ResultStream),
    /// Setup failed (or the engine answered eagerly): a single result, not a
    /// stream.
    Single(ExecutionResult),
}

impl std::fmt::Debug for SubscribeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("SubscribeOutcome::Stream(..)"),
            Self::Single(result) => f.debug_tuple("SubscribeOutcome::Single").field(result).finish(),
        }
    }
}

/// Everything an engine needs to run one operation.
pub struct ExecuteOptions<D, C> {
    pub document: D,
    pub source: String,
    pub operation_name: Option<String>,
    pub variables: Map<String, Value>,
    pub context: C,
}

#[async_trait]
pub trait Engine: Send + Sync + 'static {
    /// Parsed executable document.
    type Document: Send + 'static;
    /// Per-request execution context produced by a
    /// [`ContextBuilder`](crate::ContextBuilder).
    type Context: Send + 'static;

    fn parse(&self, source: &str) -> Result<Self::Document, GraphQLError>;

    /// Check the document against the schema. Returns every violation found.
    fn validate(&self, document: &Self::Document) -> Vec<GraphQLError>;

    /// Resolve the operation to run. `None` when `name` matches nothing, or
    /// when no name is given and the document holds several operations.
    fn operation(&self, document: &Self::Document, name: Option<&str>) -> Option<OperationKind>;

    async fn execute(
        &self,
        options: ExecuteOptions<Self::Document, Self::Context>,
    ) -> ExecutionResult;

    async fn subscribe(
        &self,
        options: ExecuteOptions<Self::Document, Self::Context>,
    ) -> SubscribeOutcome;
}
