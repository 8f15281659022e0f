use std::sync::Arc;

use futures::FutureExt;
use tracing::Instrument;

use crate::{
    coercion::get_variable_values,
    config::ExecutorConfig,
    document::{Document, OperationType},
    execution::{self, OperationContext, SourceEventStream, SubFieldCache},
    request::{Request, RequestDocument},
    response::{ExecutionOutcome, Response},
    schema::ExecutorSchema,
};

#[derive(Debug, thiserror::Error)]
pub enum ExecuteSyncError {
    #[error("GraphQL execution failed to complete synchronously.")]
    NotSynchronous,
}

/// Executes requests against a schema.
#[derive(Clone)]
pub struct Executor {
    schema: Arc<ExecutorSchema>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(schema: ExecutorSchema) -> Self {
        Self::with_config(schema, ExecutorConfig::default())
    }

    pub fn with_config(schema: ExecutorSchema, config: ExecutorConfig) -> Self {
        Executor {
            schema: Arc::new(schema),
            config,
        }
    }

    pub fn schema(&self) -> &ExecutorSchema {
        &self.schema
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Executes a query, a mutation or a subscription.
    ///
    /// A response stream is returned for subscriptions and whenever `@defer` or `@stream` left
    /// work outstanding after the initial response.
    pub async fn execute(&self, request: impl Into<Request>) -> ExecutionOutcome {
        let request = request.into();
        let span = tracing::info_span!(
            "execute",
            operation.name = request.operation_name.as_deref(),
            operation.ty = tracing::field::Empty,
        );

        async {
            let (operation, root_value) = match self.prepare(request) {
                Ok(prepared) => prepared,
                Err(response) => return ExecutionOutcome::Single(response),
            };
            let ty = operation.operation().ty;
            tracing::Span::current().record("operation.ty", ty.as_ref());

            if ty == OperationType::Subscription && !operation.force_query_algorithm {
                return execution::execute_subscription(operation, root_value).await;
            }
            let force_query_algorithm = operation.force_query_algorithm;
            execution::execute_query(operation, root_value, force_query_algorithm)
                .await
                .outcome
        }
        .instrument(span)
        .await
    }

    /// Executes a request that doesn't involve any asynchronous resolver, deferred fragment or
    /// streamed list.
    pub fn execute_sync(&self, request: impl Into<Request>) -> Result<Response, ExecuteSyncError> {
        let (operation, root_value) = match self.prepare(request.into()) {
            Ok(prepared) => prepared,
            Err(response) => return Ok(response),
        };
        let force_query_algorithm = operation.force_query_algorithm;

        let Some(execution) = execution::execute_query(operation, root_value, force_query_algorithm).now_or_never()
        else {
            tracing::warn!("execution did not complete on its first poll");
            return Err(ExecuteSyncError::NotSynchronous);
        };
        if execution.saw_async_value {
            tracing::warn!("a resolver returned an asynchronous value during synchronous execution");
            return Err(ExecuteSyncError::NotSynchronous);
        }

        match execution.outcome {
            ExecutionOutcome::Single(response) => Ok(response),
            ExecutionOutcome::Stream(_) => {
                tracing::warn!("synchronous execution produced incremental results");
                Err(ExecuteSyncError::NotSynchronous)
            }
        }
    }

    /// Resolves the root field of a subscription into its event stream, without executing
    /// anything for the events.
    pub async fn create_source_event_stream(
        &self,
        request: impl Into<Request>,
    ) -> Result<SourceEventStream, Response> {
        let (operation, root_value) = self.prepare(request.into())?;
        execution::create_source_event_stream(operation, root_value).await
    }

    /// Everything that can fail before execution starts: parsing, operation selection and
    /// variable coercion.
    fn prepare(&self, request: Request) -> Result<(Arc<OperationContext>, Arc<serde_json::Value>), Response> {
        let document = match request.document {
            RequestDocument::Parsed(document) => document,
            RequestDocument::Query(query) => {
                Arc::new(Document::parse(&query).map_err(|error| Response::from_errors([error]))?)
            }
        };

        let selected = document
            .select_operation(request.operation_name.as_deref())
            .map_err(|error| Response::from_errors([error]))?;
        let index = document
            .operations()
            .iter()
            .position(|operation| std::ptr::eq(operation, selected))
            .unwrap_or_default();

        let variables = get_variable_values(
            &self.schema,
            &selected.variable_definitions,
            &request.variables,
            self.config.max_variable_errors,
        )
        .map_err(Response::from_errors)?;

        let operation = OperationContext {
            schema: self.schema.clone(),
            document,
            operation: index,
            variables,
            data: request.data,
            field_resolver: request.field_resolver,
            type_resolver: request.type_resolver,
            subscribe_field_resolver: request.subscribe_field_resolver,
            enable_incremental: request.enable_incremental.unwrap_or(self.config.enable_incremental),
            force_query_algorithm: request
                .force_query_algorithm
                .unwrap_or(self.config.force_query_algorithm),
            sub_fields: SubFieldCache::default(),
        };
        Ok((Arc::new(operation), Arc::new(request.root_value)))
    }
}
