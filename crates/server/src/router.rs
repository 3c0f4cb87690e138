//! Per-invocation request handling.
//!
//! The gateway calls [`Router::handle`] once for every inbound frame (or HTTP
//! request). The router decodes the envelope, runs it through the engine and
//! either answers with a single result or hands the subscription stream to a
//! [`SubscriptionBridge`]. Nothing escapes: every error, panics included,
//! ends up as a failure envelope.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use {
    futures::FutureExt,
    graphpush_protocol::{
        GraphQLError, HttpResponseBody, RequestEnvelope, RequestKind, ResponseFrame,
        STATUS_BAD_REQUEST, STATUS_OK, error_codes,
    },
    serde_json::Value,
    tracing::{debug, error, info, warn},
};

use crate::{
    bridge::{BridgeOutcome, BridgeReport, ErrorFormatter, SubscriptionBridge, identity_formatter},
    context::{ContextBuilder, ContextRequest, DefaultContext, InboundEvent, ResponseHeaders},
    engine::{Engine, ExecuteOptions, ExecutionResult, OperationKind, SubscribeOutcome},
    error::Error,
    registry::SubscriptionRegistry,
    transport::{Transport, encode_frame},
};

/// How one invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A single result was produced.
    Completed,
    /// The request failed before or during execution.
    Failed,
    /// A subscription ran through the bridge.
    Streamed(BridgeReport),
    /// A `cancel` envelope was processed. `live` tells whether it matched a
    /// running subscription.
    Cancelled { live: bool },
}

/// What the handler returns to the gateway route.
#[derive(Debug, Clone)]
pub struct HandlerResponse {
    pub status_code: u16,
    /// Headers added by the context builder.
    pub headers: ResponseHeaders,
    /// JSON `{data, errors}`.
    pub body: String,
    pub outcome: RequestOutcome,
}

impl HandlerResponse {
    fn new(
        status_code: u16,
        headers: ResponseHeaders,
        body: HttpResponseBody,
        outcome: RequestOutcome,
    ) -> Self {
        let body = serde_json::to_string(&body).unwrap_or_else(|e| {
            format!(r#"{{"errors":[{{"message":"failed to encode response: {e}"}}]}}"#)
        });
        Self {
            status_code,
            headers,
            body,
            outcome,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK
    }
}

/// Correlation data of the request being handled.
struct Target<'a> {
    connection_id: Option<&'a str>,
    id: Option<&'a str>,
}

impl Target<'_> {
    /// Both halves of a push address, if this request has one.
    fn push(&self) -> Option<(&str, &str)> {
        self.connection_id.zip(self.id)
    }
}

pub struct Router<E, B = DefaultContext> {
    engine: Arc<E>,
    context_builder: B,
    transport: Arc<dyn Transport>,
    registry: Arc<SubscriptionRegistry>,
    format_error: ErrorFormatter,
}

impl<E: Engine> Router<E> {
    pub fn new(engine: Arc<E>, transport: Arc<dyn Transport>) -> Self {
        Self {
            engine,
            context_builder: DefaultContext,
            transport,
            registry: Arc::new(SubscriptionRegistry::default()),
            format_error: identity_formatter(),
        }
    }
}

impl<E, B> Router<E, B>
where
    E: Engine,
    B: ContextBuilder<E::Context>,
{
    pub fn with_context_builder<B2>(self, context_builder: B2) -> Router<E, B2>
    where
        B2: ContextBuilder<E::Context>,
    {
        Router {
            engine: self.engine,
            context_builder,
            transport: self.transport,
            registry: self.registry,
            format_error: self.format_error,
        }
    }

    #[must_use]
    pub fn with_error_formatter(mut self, format_error: ErrorFormatter) -> Self {
        self.format_error = format_error;
        self
    }

    /// Cap live subscriptions per connection. `0` means unlimited.
    #[must_use]
    pub fn with_max_subscriptions(mut self, max_per_connection: usize) -> Self {
        self.registry = Arc::new(SubscriptionRegistry::new(max_per_connection));
        self
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Cancel every subscription of a connection that went away.
    pub fn disconnect(&self, connection_id: &str) -> usize {
        let cancelled = self.registry.cancel_connection(connection_id);
        if cancelled > 0 {
            info!(conn_id = %connection_id, cancelled, "connection closed, subscriptions cancelled");
        }
        cancelled
    }

    /// Handle one inbound event.
    ///
    /// For subscriptions this resolves only once the stream has ended.
    pub async fn handle(&self, event: InboundEvent) -> HandlerResponse {
        let raw: Result<Value, _> = serde_json::from_str(&event.body);
        // Recovered up front so even a malformed envelope can be answered
        // under its id.
        let id = raw
            .as_ref()
            .ok()
            .and_then(|v| v.get("id"))
            .and_then(Value::as_str)
            .map(str::to_owned);
        let target = Target {
            connection_id: event.connection_id.as_deref(),
            id: id.as_deref(),
        };

        match AssertUnwindSafe(self.process(&event, raw, &target))
            .catch_unwind()
            .await
        {
            Ok(response) => response,
            Err(panic) => {
                let message = panic_message(&*panic);
                error!(conn_id = ?target.connection_id, request_id = ?target.id, %message, "request handler panicked");
                self.fail(
                    &target,
                    vec![GraphQLError::with_code(
                        error_codes::INTERNAL_ERROR,
                        "internal server error",
                    )],
                    ResponseHeaders::default(),
                )
                .await
            },
        }
    }

    async fn process(
        &self,
        event: &InboundEvent,
        raw: Result<Value, serde_json::Error>,
        target: &Target<'_>,
    ) -> HandlerResponse {
        let envelope = match raw.and_then(serde_json::from_value::<RequestEnvelope>) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(conn_id = ?target.connection_id, error = %e, "malformed request envelope");
                return self
                    .fail_with(target, error_codes::INVALID_REQUEST, format!("malformed request: {e}"))
                    .await;
            },
        };

        if envelope.kind == RequestKind::Cancel {
            return self.cancel(target).await;
        }

        let Some(query) = envelope.query.filter(|q| !q.trim().is_empty()) else {
            return self
                .fail_with(target, error_codes::INVALID_REQUEST, "'query' field not provided")
                .await;
        };

        let document = match self.engine.parse(&query) {
            Ok(document) => document,
            Err(mut e) => {
                e.set_code(error_codes::INVALID_REQUEST);
                return self.fail(target, vec![e], ResponseHeaders::default()).await;
            },
        };

        let mut violations = self.engine.validate(&document);
        if !violations.is_empty() {
            debug!(conn_id = ?target.connection_id, request_id = ?target.id, count = violations.len(), "validation failed");
            for violation in &mut violations {
                violation.set_code(error_codes::VALIDATION_FAILED);
            }
            return self.fail(target, violations, ResponseHeaders::default()).await;
        }

        let operation_name = envelope.operation_name;
        let Some(kind) = self
            .engine
            .operation(&document, operation_name.as_deref())
        else {
            let name = operation_name.as_deref().unwrap_or_default();
            return self
                .fail_with(
                    target,
                    error_codes::OPERATION_NOT_FOUND,
                    format!("Operation '{name}' not found"),
                )
                .await;
        };

        let mut headers = ResponseHeaders::default();
        let context = match self
            .context_builder
            .build(ContextRequest {
                event,
                cookies: event.cookies(),
                response_headers: &mut headers,
            })
            .await
        {
            Ok(context) => context,
            Err(mut e) => {
                if e.code().is_none() {
                    e.set_code(error_codes::EXECUTION_FAILED);
                }
                return self.fail(target, vec![e], headers).await;
            },
        };

        let options = ExecuteOptions {
            document,
            source: query,
            operation_name,
            variables: envelope.variables.unwrap_or_default(),
            context,
        };

        match kind {
            OperationKind::Subscription => self.subscribe(target, options, headers).await,
            OperationKind::Query | OperationKind::Mutation => {
                debug!(conn_id = ?target.connection_id, request_id = ?target.id, ?kind, "executing operation");
                let result = self.engine.execute(options).await;
                self.respond(target, result, headers).await
            },
        }
    }

    async fn subscribe(
        &self,
        target: &Target<'_>,
        options: ExecuteOptions<E::Document, E::Context>,
        headers: ResponseHeaders,
    ) -> HandlerResponse {
        let Some((connection_id, id)) = target.push() else {
            return self
                .fail_with(
                    target,
                    error_codes::INVALID_REQUEST,
                    "subscriptions need a push connection and an 'id'",
                )
                .await;
        };

        let registration = match self.registry.register(connection_id, id) {
            Ok(registration) => registration,
            Err(Error::DuplicateSubscription { .. }) => {
                // A frame under this id would end the subscription already
                // using it, so only the handler response reports the clash.
                warn!(conn_id = %connection_id, subscription_id = %id, "duplicate subscription id");
                let error = (self.format_error)(GraphQLError::with_code(
                    error_codes::DUPLICATE_SUBSCRIPTION,
                    format!("subscription '{id}' is already live"),
                ));
                return HandlerResponse::new(
                    STATUS_BAD_REQUEST,
                    headers,
                    HttpResponseBody {
                        data: None,
                        errors: vec![error],
                    },
                    RequestOutcome::Failed,
                );
            },
            Err(Error::Cancelled { .. }) => {
                // The client already gave up on this id; end it the way the
                // bridge ends a cancelled subscription.
                debug!(conn_id = %connection_id, subscription_id = %id, "subscription cancelled before start");
                let sent = self
                    .push(connection_id, &ResponseFrame::complete(Some(id.to_string())))
                    .await;
                let outcome = if sent {
                    BridgeOutcome::Cancelled
                } else {
                    BridgeOutcome::PeerGone
                };
                return HandlerResponse::new(
                    STATUS_OK,
                    headers,
                    HttpResponseBody::default(),
                    RequestOutcome::Streamed(BridgeReport {
                        outcome,
                        frames_sent: 0,
                    }),
                );
            },
            Err(e @ Error::ConnectionClosed(_)) => {
                // Nobody is left to push to.
                debug!(conn_id = %connection_id, subscription_id = %id, "start for a closed connection");
                let error = (self.format_error)(GraphQLError::with_code(
                    error_codes::SUBSCRIPTION_FAILED,
                    e.to_string(),
                ));
                return HandlerResponse::new(
                    STATUS_BAD_REQUEST,
                    headers,
                    HttpResponseBody {
                        data: None,
                        errors: vec![error],
                    },
                    RequestOutcome::Failed,
                );
            },
            Err(e) => {
                return self
                    .fail_with(target, error_codes::SUBSCRIPTION_FAILED, e.to_string())
                    .await;
            },
        };

        let stream = match self.engine.subscribe(options).await {
            SubscribeOutcome::Stream(stream) => stream,
            SubscribeOutcome::Single(result) => {
                drop(registration);
                return self.respond(target, result, headers).await;
            },
        };

        info!(conn_id = %connection_id, subscription_id = %id, "subscription started");
        let report = SubscriptionBridge::new(Arc::clone(&self.transport), connection_id, id)
            .with_error_formatter(Arc::clone(&self.format_error))
            .run(stream, registration.token())
            .await;
        drop(registration);
        info!(conn_id = %connection_id, subscription_id = %id, outcome = ?report.outcome, frames = report.frames_sent, "subscription ended");

        HandlerResponse::new(
            STATUS_OK,
            headers,
            HttpResponseBody::default(),
            RequestOutcome::Streamed(report),
        )
    }

    async fn cancel(&self, target: &Target<'_>) -> HandlerResponse {
        let Some((connection_id, id)) = target.push() else {
            return self
                .fail_with(
                    target,
                    error_codes::INVALID_REQUEST,
                    "cancel needs a push connection and an 'id'",
                )
                .await;
        };
        // The bridge sends the terminal frame once it observes the token.
        let live = self.registry.cancel(connection_id, id);
        debug!(conn_id = %connection_id, subscription_id = %id, live, "cancel requested");
        HandlerResponse::new(
            STATUS_OK,
            ResponseHeaders::default(),
            HttpResponseBody::default(),
            RequestOutcome::Cancelled { live },
        )
    }

    /// Answer with one result. On a push connection it also becomes a
    /// `next` frame plus `complete`, or a single failure frame.
    async fn respond(
        &self,
        target: &Target<'_>,
        result: ExecutionResult,
        headers: ResponseHeaders,
    ) -> HandlerResponse {
        if result.is_failure() {
            return self.fail(target, result.errors, headers).await;
        }

        let errors: Vec<_> = result
            .errors
            .into_iter()
            .map(|e| (self.format_error)(e))
            .collect();
        if let Some((connection_id, id)) = target.push() {
            let next = ResponseFrame::next(Some(id.to_string()), result.data.clone(), errors.clone());
            if self.push(connection_id, &next).await {
                self.push(connection_id, &ResponseFrame::complete(Some(id.to_string())))
                    .await;
            }
        }

        HandlerResponse::new(
            STATUS_OK,
            headers,
            HttpResponseBody {
                data: result.data,
                errors,
            },
            RequestOutcome::Completed,
        )
    }

    async fn fail_with(
        &self,
        target: &Target<'_>,
        code: &str,
        message: impl Into<String>,
    ) -> HandlerResponse {
        self.fail(
            target,
            vec![GraphQLError::with_code(code, message)],
            ResponseHeaders::default(),
        )
        .await
    }

    async fn fail(
        &self,
        target: &Target<'_>,
        errors: Vec<GraphQLError>,
        headers: ResponseHeaders,
    ) -> HandlerResponse {
        let errors: Vec<_> = errors.into_iter().map(|e| (self.format_error)(e)).collect();
        if let Some((connection_id, id)) = target.push() {
            self.push(
                connection_id,
                &ResponseFrame::failure(Some(id.to_string()), errors.clone()),
            )
            .await;
        }
        HandlerResponse::new(
            STATUS_BAD_REQUEST,
            headers,
            HttpResponseBody { data: None, errors },
            RequestOutcome::Failed,
        )
    }

    async fn push(&self, connection_id: &str, frame: &ResponseFrame) -> bool {
        match self
            .transport
            .send(connection_id, encode_frame(frame))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(conn_id = %connection_id, error = %e, "failed to push frame");
                false
            },
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
