//! Execution of an operation against the schema: field collection, value completion and the
//! incremental delivery of deferred fragments and streamed list items.

mod collect;
mod complete;
mod state;
mod stream;
mod subscription;
mod tasks;

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use serde_json::Value;

use self::{
    collect::{FieldCollector, FieldNodes, FieldsAndPatches},
    state::{ResponseHooks, SharedState},
    tasks::{TaskSet, TaskSpawner},
};
use crate::{
    document::{Document, OperationDefinition, OperationType},
    error::{ErrorKind, GraphqlError, GraphqlResult, Location, ResponsePath},
    publisher::Publisher,
    resolver::{ContextData, FieldResolver, ResolveInfo, TypeResolver, Variables},
    response::{ExecutionOutcome, Response, ResponseNode},
    schema::{ExecutorSchema, FieldDefinitionId, NamedTypeId},
};

pub(crate) use subscription::{create_source_event_stream, execute_subscription};
pub use subscription::SourceEventStream;

/// Everything about a request that stays the same for each of its executions. A subscription
/// executes once per source event.
pub(crate) struct OperationContext {
    pub schema: Arc<ExecutorSchema>,
    pub document: Arc<Document>,
    /// Index of the selected operation in the document.
    pub operation: usize,
    pub variables: Variables,
    pub data: ContextData,
    pub field_resolver: Option<FieldResolver>,
    pub type_resolver: Option<TypeResolver>,
    pub subscribe_field_resolver: Option<FieldResolver>,
    pub enable_incremental: bool,
    pub force_query_algorithm: bool,
    pub sub_fields: SubFieldCache,
}

/// Sub-field collection memoized by runtime type and merged field nodes.
#[derive(Default)]
pub(crate) struct SubFieldCache(Mutex<HashMap<(NamedTypeId, FieldNodes), Arc<FieldsAndPatches>>>);

impl OperationContext {
    pub fn operation(&self) -> &OperationDefinition {
        &self.document.operations()[self.operation]
    }

    fn collector(&self) -> FieldCollector<'_> {
        FieldCollector {
            schema: &self.schema,
            document: &self.document,
            variables: &self.variables,
            enable_incremental: self.enable_incremental,
        }
    }

    fn collect_root_fields(&self, root_type: NamedTypeId) -> GraphqlResult<FieldsAndPatches> {
        self.collector()
            .collect_root_fields(root_type, self.operation().selection_set)
    }

    fn collect_sub_fields(
        &self,
        return_type: NamedTypeId,
        field_nodes: &FieldNodes,
    ) -> GraphqlResult<Arc<FieldsAndPatches>> {
        let key = (return_type, field_nodes.clone());
        if let Some(collected) = self.sub_fields.0.lock().unwrap_or_else(PoisonError::into_inner).get(&key) {
            return Ok(collected.clone());
        }

        let collected = Arc::new(self.collector().collect_sub_fields(return_type, field_nodes)?);
        self.sub_fields
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, collected.clone());
        Ok(collected)
    }

    fn root_type(&self) -> GraphqlResult<NamedTypeId> {
        let operation = self.operation();
        self.schema.root_type(operation.ty).ok_or_else(|| {
            GraphqlError::new(
                format!("Schema is not configured to execute {} operation.", operation.ty),
                ErrorKind::Document,
            )
            .with_location(operation.location)
        })
    }
}

/// Which resolver a field uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResolveMode {
    Resolve,
    /// Creation of the source event stream of a subscription.
    Subscribe,
}

/// A field being executed.
#[derive(Clone)]
pub(crate) struct FieldContext {
    pub definition: FieldDefinitionId,
    pub field_nodes: FieldNodes,
    pub parent_type: NamedTypeId,
}

/// State of a single execution: the response being built and the payloads it may still produce.
#[derive(Clone)]
pub(crate) struct ExecutionContext {
    operation: Arc<OperationContext>,
    root_value: Arc<Value>,
    mode: ResolveMode,
    force_query_algorithm: bool,
    root_node: Arc<ResponseNode>,
    state: SharedState,
    publisher: Arc<Publisher<ResponseHooks>>,
    spawner: TaskSpawner,
    saw_async_value: Arc<AtomicBool>,
}

impl ExecutionContext {
    fn new(
        operation: Arc<OperationContext>,
        root_value: Arc<Value>,
        mode: ResolveMode,
        force_query_algorithm: bool,
        spawner: TaskSpawner,
    ) -> Self {
        let state = SharedState::default();
        ExecutionContext {
            operation,
            root_value,
            mode,
            force_query_algorithm,
            root_node: ResponseNode::new(),
            publisher: Arc::new(Publisher::new(ResponseHooks::new(state.clone()))),
            state,
            spawner,
            saw_async_value: Arc::new(AtomicBool::new(false)),
        }
    }

    fn schema(&self) -> &ExecutorSchema {
        &self.operation.schema
    }

    fn document(&self) -> &Document {
        &self.operation.document
    }

    fn field_name(&self, field: &FieldContext) -> &str {
        &self.schema()[field.definition].name
    }

    fn locations(&self, field: &FieldContext) -> Vec<Location> {
        field
            .field_nodes
            .iter()
            .map(|node| self.document()[*node].location)
            .collect()
    }

    fn resolve_info<'a>(&'a self, field: &'a FieldContext, path: &'a ResponsePath) -> ResolveInfo<'a> {
        ResolveInfo {
            field_name: self.field_name(field),
            field_nodes: &field.field_nodes,
            return_type: self.schema()[field.definition].ty,
            parent_type: field.parent_type,
            path,
            schema: self.schema(),
            document: self.document(),
            operation: self.operation.operation(),
            root_value: &self.root_value,
            variables: &self.operation.variables,
        }
    }

    fn mark_async(&self) {
        self.saw_async_value.store(true, Ordering::Relaxed);
    }

    /// Executes the root selection set, returning the data of the initial response. Errors end up
    /// in the root response node.
    async fn execute_operation(&self) -> Value {
        match self.execute_root_fields().await {
            Ok(data) => data,
            Err(error) => {
                self.root_node.push_error(error);
                Value::Null
            }
        }
    }

    async fn execute_root_fields(&self) -> GraphqlResult<Value> {
        let root_type = self.operation.root_type()?;
        let FieldsAndPatches { fields, patches } = self.operation.collect_root_fields(root_type)?;
        let source = self.root_value.clone();
        let path = ResponsePath::root();

        let serially = self.operation.operation().ty == OperationType::Mutation && !self.force_query_algorithm;
        let data = if serially {
            self.execute_fields_serially(root_type, &source, &path, &fields)
        } else {
            self.execute_fields(root_type, &source, &path, &fields, &self.root_node)
        };
        self.add_patches(&patches, root_type, &source, &path, &self.root_node);
        data.await
    }

    /// The initial response, followed by the incremental payloads when some work is still
    /// outstanding.
    fn build_response(&self, data: Value, tasks: TaskSet) -> ExecutionOutcome {
        let initial = Response {
            errors: self.root_node.take_errors(),
            data: Some(data),
            ..Default::default()
        };

        {
            let mut state = state::lock(&self.state);
            if !state.has_next() {
                return ExecutionOutcome::Single(initial);
            }
            state.streaming = true;
        }

        self.publisher.emit(
            vec![self.root_node.id()],
            Response {
                has_next: Some(true),
                ..initial
            },
        );
        ExecutionOutcome::Stream(tasks.run_with(self.publisher.subscribe()))
    }
}

pub(crate) struct Execution {
    pub outcome: ExecutionOutcome,
    /// A resolver returned a future or a stream along the way.
    pub saw_async_value: bool,
}

/// Executes a query or mutation, or the query algorithm for one subscription event.
pub(crate) async fn execute_query(
    operation: Arc<OperationContext>,
    root_value: Arc<Value>,
    force_query_algorithm: bool,
) -> Execution {
    let (spawner, mut tasks) = TaskSet::new();
    let ctx = ExecutionContext::new(
        operation,
        root_value,
        ResolveMode::Resolve,
        force_query_algorithm,
        spawner,
    );

    let data = tasks.drive(ctx.execute_operation()).await;
    let outcome = ctx.build_response(data, tasks);
    Execution {
        outcome,
        saw_async_value: ctx.saw_async_value.load(Ordering::Relaxed),
    }
}
