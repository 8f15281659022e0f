use std::sync::Arc;

use futures::{stream::BoxStream, StreamExt};
use repeater::Nested;
use serde_json::Value;

use super::{
    collect::FieldsAndPatches, complete::into_json, execute_query, tasks::TaskSet, ExecutionContext, FieldContext,
    OperationContext, ResolveMode,
};
use crate::{
    error::{ErrorKind, GraphqlError, GraphqlResult, ResponsePath},
    resolver::FieldValue,
    response::{ExecutionOutcome, Response},
};

/// Events of a subscription, as returned by the subscriber of its root field.
pub type SourceEventStream = BoxStream<'static, Result<FieldValue, GraphqlError>>;

impl ExecutionContext {
    async fn execute_root_subscription_field(&self) -> GraphqlResult<SourceEventStream> {
        let root_type = self.operation.root_type()?;
        let FieldsAndPatches { fields, .. } = self.operation.collect_root_fields(root_type)?;
        let Some((response_key, field_nodes)) = fields.first() else {
            return Err(GraphqlError::new(
                "Subscription operation must select a field.",
                ErrorKind::Document,
            ));
        };
        let Some(first) = field_nodes.first() else {
            return Err(GraphqlError::internal("Grouped field without node."));
        };

        let field_name = &self.document()[*first].name;
        let Some(definition) = self.schema().field(root_type, field_name) else {
            return Err(GraphqlError::new(
                format!("The subscription field \"{field_name}\" is not defined."),
                ErrorKind::FieldResolution,
            )
            .with_locations(field_nodes.iter().map(|node| self.document()[*node].location)));
        };

        let field = FieldContext {
            definition,
            field_nodes: field_nodes.clone(),
            parent_type: root_type,
        };
        let path = ResponsePath::root().child(response_key.as_str());

        let event_stream = async {
            let mut value = self.resolve_field(&field, &self.root_value, &path)?;
            loop {
                match value {
                    FieldValue::Future(future) => value = future.await?,
                    FieldValue::Stream(stream) => return Ok(stream),
                    FieldValue::Error(error) => return Err(error),
                    other => {
                        return Err(GraphqlError::new(
                            format!("Subscription field must return Async Iterable. Received: {other:?}."),
                            ErrorKind::TypeMismatch,
                        ))
                    }
                }
            }
        };
        event_stream
            .await
            .map_err(|error| error.located(self.locations(&field), &path))
    }
}

/// Resolves the root field of a subscription into its source event stream.
pub(crate) async fn create_source_event_stream(
    operation: Arc<OperationContext>,
    root_value: Arc<Value>,
) -> Result<SourceEventStream, Response> {
    let (spawner, _tasks) = TaskSet::new();
    let ctx = ExecutionContext::new(operation, root_value, ResolveMode::Subscribe, false, spawner);
    ctx.execute_root_subscription_field()
        .await
        .map_err(|error| Response::from_errors([error]))
}

/// Executes the query algorithm once per source event, with the event as root value. Incremental
/// payloads of an event are delivered before the next event is pulled.
pub(crate) async fn execute_subscription(operation: Arc<OperationContext>, root_value: Arc<Value>) -> ExecutionOutcome {
    let source = match create_source_event_stream(operation.clone(), root_value).await {
        Ok(source) => source,
        Err(response) => return ExecutionOutcome::Single(response),
    };

    let events = repeater::map(source, move |event| {
        let operation = operation.clone();
        async move {
            tracing::debug!("executing subscription event");
            let event = match settle(event).await {
                Ok(event) => event,
                Err(error) => return Nested::Value(Response::from_errors([error])),
            };
            match execute_query(operation, Arc::new(event), true).await.outcome {
                ExecutionOutcome::Single(response) => Nested::Value(response),
                ExecutionOutcome::Stream(stream) => Nested::Stream(stream.map(Ok::<_, GraphqlError>).boxed()),
            }
        }
    });

    // A failing source ends the subscription with a last response carrying the error.
    let responses = repeater::flatten(events).map(|response| {
        response.unwrap_or_else(|error: GraphqlError| Response::from_errors([error.from_source()]))
    });
    ExecutionOutcome::Stream(responses.boxed())
}

/// The plain value of a source event.
async fn settle(mut event: FieldValue) -> GraphqlResult<Value> {
    loop {
        match event {
            FieldValue::Future(future) => event = future.await?,
            event => return into_json(event),
        }
    }
}
