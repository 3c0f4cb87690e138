//! [`Engine`] implementation over an `async_graphql::Schema`.

use {
    async_graphql::{
        Data, ObjectType, Request, Response, Schema, SubscriptionType, Value as GqlValue,
        Variables,
        parser::{
            self,
            types::{DocumentOperations, ExecutableDocument, OperationType},
        },
    },
    async_trait::async_trait,
    futures::{FutureExt, StreamExt, stream},
    graphpush_protocol::{GraphQLError, error_codes},
    graphpush_server::{Engine, ExecuteOptions, ExecutionResult, OperationKind, SubscribeOutcome},
    serde_json::Value,
};

use crate::error::{server_error, syntax_error};

/// Runs operations against an async-graphql schema.
///
/// The per-request context is an `async_graphql::Data` map that becomes the
/// request data; schema-level data stays on the schema.
pub struct AsyncGraphqlEngine<Q, M, S> {
    schema: Schema<Q, M, S>,
}

impl<Q, M, S> AsyncGraphqlEngine<Q, M, S>
where
    Q: ObjectType + 'static,
    M: ObjectType + 'static,
    S: SubscriptionType + 'static,
{
    pub fn new(schema: Schema<Q, M, S>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema<Q, M, S> {
        &self.schema
    }
}

fn request(options: ExecuteOptions<ExecutableDocument, Data>) -> Request {
    // async-graphql parses the source again; the pre-parsed document only
    // served operation lookup.
    let ExecuteOptions {
        source,
        operation_name,
        variables,
        context,
        ..
    } = options;
    let mut request =
        Request::new(source).variables(Variables::from_json(Value::Object(variables)));
    if let Some(name) = operation_name {
        request = request.operation_name(name);
    }
    request.data = context;
    request
}

fn into_result(response: Response) -> ExecutionResult {
    let mut errors: Vec<GraphQLError> = response.errors.into_iter().map(server_error).collect();
    let data = match response.data {
        GqlValue::Null if !errors.is_empty() => None,
        data => match data.into_json() {
            Ok(json) => Some(json),
            Err(e) => {
                errors.push(GraphQLError::from_display(e));
                None
            },
        },
    };
    ExecutionResult { data, errors }
}

/// Errors without a path and no data mean execution never reached a
/// resolver, so async-graphql's validation rejected the document.
fn tag_rejected(mut result: ExecutionResult) -> ExecutionResult {
    if result.data.is_none() && result.errors.iter().all(|e| e.path.is_none()) {
        for error in result.errors.iter_mut().filter(|e| e.code().is_none()) {
            error.set_code(error_codes::VALIDATION_FAILED);
        }
    }
    result
}

/// A response with errors and no data ends the subscription.
fn into_step(response: Response) -> Result<ExecutionResult, GraphQLError> {
    let result = into_result(response);
    if !result.is_failure() {
        return Ok(result);
    }
    Err(result
        .errors
        .into_iter()
        .next()
        .unwrap_or_else(|| GraphQLError::new("subscription failed")))
}

fn kind(ty: OperationType) -> OperationKind {
    match ty {
        OperationType::Query => OperationKind::Query,
        OperationType::Mutation => OperationKind::Mutation,
        OperationType::Subscription => OperationKind::Subscription,
    }
}

#[async_trait]
impl<Q, M, S> Engine for AsyncGraphqlEngine<Q, M, S>
where
    Q: ObjectType + 'static,
    M: ObjectType + 'static,
    S: SubscriptionType + 'static,
{
    type Context = Data;
    type Document = ExecutableDocument;

    fn parse(&self, source: &str) -> Result<ExecutableDocument, GraphQLError> {
        parser::parse_query(source).map_err(syntax_error)
    }

    /// async-graphql runs its validation rules as the first step of
    /// execution, before any resolver. Violations come back as a result with
    /// errors and no data, which the router reports as a failure.
    fn validate(&self, _document: &ExecutableDocument) -> Vec<GraphQLError> {
        Vec::new()
    }

    fn operation(&self, document: &ExecutableDocument, name: Option<&str>) -> Option<OperationKind> {
        match (&document.operations, name) {
            (DocumentOperations::Single(op), None) => Some(kind(op.node.ty)),
            (DocumentOperations::Single(_), Some(_)) => None,
            (DocumentOperations::Multiple(ops), Some(name)) => ops
                .iter()
                .find(|(op_name, _)| op_name.as_str() == name)
                .map(|(_, op)| kind(op.node.ty)),
            (DocumentOperations::Multiple(ops), None) => {
                let mut ops = ops.values();
                match (ops.next(), ops.next()) {
                    (Some(op), None) => Some(kind(op.node.ty)),
                    _ => None,
                }
            },
        }
    }

    async fn execute(&self, options: ExecuteOptions<ExecutableDocument, Data>) -> ExecutionResult {
        tag_rejected(into_result(self.schema.execute(request(options)).await))
    }

    async fn subscribe(&self, options: ExecuteOptions<ExecutableDocument, Data>) -> SubscribeOutcome {
        let mut responses = self.schema.execute_stream(request(options)).boxed();

        // Validation and resolver setup errors surface on the first poll.
        match responses.next().now_or_never() {
            Some(Some(first)) => {
                let first = into_result(first);
                if first.is_failure() {
                    return SubscribeOutcome::Single(tag_rejected(first));
                }
                SubscribeOutcome::Stream(
                    stream::iter([Ok(first)])
                        .chain(responses.map(into_step))
                        .boxed(),
                )
            },
            Some(None) => SubscribeOutcome::Stream(stream::empty().boxed()),
            None => SubscribeOutcome::Stream(responses.map(into_step).boxed()),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use {
        super::*,
        crate::{context::EventBus, schema::demo_engine},
    };

    fn engine() -> std::sync::Arc<crate::schema::DemoEngine> {
        demo_engine(EventBus::default())
    }

    fn options(source: &str, variables: Value) -> ExecuteOptions<ExecutableDocument, Data> {
        let engine = engine();
        ExecuteOptions {
            document: engine.parse(source).unwrap(),
            source: source.to_string(),
            operation_name: None,
            variables: variables.as_object().cloned().unwrap_or_default(),
            context: Data::default(),
        }
    }

    #[test]
    fn operation_kind_follows_the_document() {
        let engine = engine();
        let doc = engine.parse("subscription { counter }").unwrap();
        assert_eq!(engine.operation(&doc, None), Some(OperationKind::Subscription));

        let doc = engine
            .parse("query A { hello } mutation B { publish(topic: \"t\", payload: 1) }")
            .unwrap();
        assert_eq!(engine.operation(&doc, Some("B")), Some(OperationKind::Mutation));
        assert_eq!(engine.operation(&doc, Some("A")), Some(OperationKind::Query));
        assert_eq!(engine.operation(&doc, Some("C")), None);
        assert_eq!(engine.operation(&doc, None), None);
    }

    #[test]
    fn single_named_operation_is_found_without_a_name() {
        let engine = engine();
        let doc = engine.parse("query Greeting { hello }").unwrap();
        assert_eq!(engine.operation(&doc, None), Some(OperationKind::Query));
    }

    #[test]
    fn syntax_errors_are_reported_with_location() {
        let err = engine().parse("{ hello").unwrap_err();
        assert!(!err.locations.is_empty());
    }

    #[tokio::test]
    async fn execute_returns_data() {
        let result = engine()
            .execute(options("{ hello(name: \"rust\") }", serde_json::json!({})))
            .await;
        assert_eq!(result.data, Some(serde_json::json!({ "hello": "Hello, rust!" })));
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn invalid_field_fails_without_data() {
        let result = engine()
            .execute(options("{ invalidField }", serde_json::json!({})))
            .await;
        assert!(result.is_failure());
        assert!(result.data.is_none());
        assert!(
            result
                .errors
                .iter()
                .all(|e| e.code() == Some(error_codes::VALIDATION_FAILED))
        );
    }

    #[tokio::test]
    async fn invalid_subscription_is_tagged_as_validation_failure() {
        let outcome = engine()
            .subscribe(options("subscription { nope }", serde_json::json!({})))
            .await;
        let result = match outcome {
            SubscribeOutcome::Single(result) => result,
            other => panic!("expected a single result, got {other:?}"),
        };
        assert_eq!(result.errors[0].code(), Some(error_codes::VALIDATION_FAILED));
    }

    #[tokio::test]
    async fn counter_streams_then_ends() {
        let outcome = engine()
            .subscribe(options("subscription { counter }", serde_json::json!({})))
            .await;
        let stream = match outcome {
            SubscribeOutcome::Stream(stream) => stream,
            other => panic!("expected a stream, got {other:?}"),
        };
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].as_ref().unwrap().data,
            Some(serde_json::json!({ "counter": 1 }))
        );
        assert_eq!(
            items[1].as_ref().unwrap().data,
            Some(serde_json::json!({ "counter": 2 }))
        );
    }

    #[tokio::test]
    async fn resolver_error_in_stream_is_terminal_item() {
        let outcome = engine()
            .subscribe(options(
                "subscription ($at: Int) { counter(from: 1, to: 5, intervalMs: 5, failAt: $at) }",
                serde_json::json!({ "at": 2 }),
            ))
            .await;
        let stream = match outcome {
            SubscribeOutcome::Stream(stream) => stream,
            other => panic!("expected a stream, got {other:?}"),
        };
        let items: Vec<_> = stream.collect().await;
        assert!(items[0].is_ok());
        let err = items[1].as_ref().unwrap_err();
        assert_eq!(err.message, "counter failed at 2");
        assert_eq!(err.code(), None);
    }

    #[tokio::test]
    async fn setup_failure_is_single_result() {
        let outcome = engine()
            .subscribe(options(
                "subscription { counter(from: 3, to: 1) }",
                serde_json::json!({}),
            ))
            .await;
        let result = match outcome {
            SubscribeOutcome::Single(result) => result,
            other => panic!("expected a single result, got {other:?}"),
        };
        assert!(result.is_failure());
    }
}
