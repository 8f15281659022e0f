use std::sync::Arc;

use futures::{
    future::{self, join_all, BoxFuture},
    stream::BoxStream,
    FutureExt, StreamExt,
};
use serde_json::Value;

use super::{
    collect::{FieldNodes, GroupedFields, Patch, StreamArguments},
    ExecutionContext, FieldContext, ResolveMode,
};
use crate::{
    coercion::get_argument_values,
    error::{ErrorKind, GraphqlError, GraphqlResult, PathSegment, ResponsePath},
    resolver::{default_field_resolver, default_type_resolver, FieldValue, ResolverContext},
    response::{IncrementalResult, ResponseNode},
    schema::{inspect, NamedTypeId, TypeDefinition, TypeKind, TypeRefId},
};

impl ExecutionContext {
    /// Executes the fields of a selection set concurrently. Keys keep the order of the selection
    /// set whatever the order fields settle in.
    pub(super) fn execute_fields<'a>(
        &'a self,
        parent_type: NamedTypeId,
        source: &'a Arc<Value>,
        path: &'a ResponsePath,
        fields: &'a GroupedFields,
        node: &'a Arc<ResponseNode>,
    ) -> BoxFuture<'a, GraphqlResult<Value>> {
        async move {
            let results = join_all(fields.iter().map(|(response_key, field_nodes)| {
                self.execute_field(parent_type, source, field_nodes, path.child(response_key.as_str()), node)
            }))
            .await;

            let mut data = serde_json::Map::with_capacity(fields.len());
            for (response_key, result) in fields.keys().zip(results) {
                if let Some(value) = result? {
                    data.insert(response_key.clone(), value);
                }
            }
            Ok(Value::Object(data))
        }
        .boxed()
    }

    /// Executes the fields one after the other, each one settling completely before the next one
    /// starts. Used for mutation root fields.
    pub(super) fn execute_fields_serially<'a>(
        &'a self,
        parent_type: NamedTypeId,
        source: &'a Arc<Value>,
        path: &'a ResponsePath,
        fields: &'a GroupedFields,
    ) -> BoxFuture<'a, GraphqlResult<Value>> {
        async move {
            let mut data = serde_json::Map::with_capacity(fields.len());
            for (response_key, field_nodes) in fields {
                let field_path = path.child(response_key.as_str());
                let result = self
                    .execute_field(parent_type, source, field_nodes, field_path, &self.root_node)
                    .await?;
                if let Some(value) = result {
                    data.insert(response_key.clone(), value);
                }
            }
            Ok(Value::Object(data))
        }
        .boxed()
    }

    /// `None` when the field doesn't exist on the parent type: it is omitted from the response.
    async fn execute_field(
        &self,
        parent_type: NamedTypeId,
        source: &Value,
        field_nodes: &FieldNodes,
        path: ResponsePath,
        node: &Arc<ResponseNode>,
    ) -> GraphqlResult<Option<Value>> {
        let Some(first) = field_nodes.first() else {
            return Ok(None);
        };
        let Some(definition) = self.schema().field(parent_type, &self.document()[*first].name) else {
            return Ok(None);
        };

        let field = FieldContext {
            definition,
            field_nodes: field_nodes.clone(),
            parent_type,
        };
        let return_type = self.schema()[definition].ty;

        let completed = match self.resolve_field(&field, source, &path) {
            Ok(value) => self.complete_value(&field, return_type, path.clone(), value, node).await,
            Err(error) => Err(error),
        };

        completed
            .or_else(|error| self.handle_field_error(error, &field, return_type, &path, node))
            .map(Some)
    }

    /// Calls the resolver of the field, or the subscriber when creating a source event stream.
    pub(super) fn resolve_field(
        &self,
        field: &FieldContext,
        source: &Value,
        path: &ResponsePath,
    ) -> GraphqlResult<FieldValue> {
        let schema = self.schema();
        let definition = &schema[field.definition];
        let Some(first) = field.field_nodes.first() else {
            return Ok(FieldValue::NULL);
        };
        let node = &self.document()[*first];

        let args = get_argument_values(
            schema,
            &definition.arguments,
            &node.arguments,
            &self.operation.variables,
            node.location,
        )?;

        let resolver = match self.mode {
            ResolveMode::Resolve => definition.resolver().or(self.operation.field_resolver.as_ref()),
            ResolveMode::Subscribe => definition
                .subscriber()
                .or(self.operation.subscribe_field_resolver.as_ref()),
        };

        let info = self.resolve_info(field, path);
        let ctx = ResolverContext {
            source,
            args: &args,
            data: &self.operation.data,
            info: &info,
        };
        Ok(match resolver {
            Some(resolver) => resolver(ctx),
            None => default_field_resolver(ctx),
        })
    }

    /// Locates the error, then either bubbles it up to the parent when `ty` is non-null or
    /// records it and nulls the value.
    pub(super) fn handle_field_error(
        &self,
        error: GraphqlError,
        field: &FieldContext,
        ty: TypeRefId,
        path: &ResponsePath,
        node: &ResponseNode,
    ) -> GraphqlResult<Value> {
        let error = error.located(self.locations(field), path);
        if self.schema().is_non_null_type(ty) {
            return Err(error);
        }
        node.push_error(error);
        Ok(Value::Null)
    }

    pub(super) fn complete_value<'a>(
        &'a self,
        field: &'a FieldContext,
        ty: TypeRefId,
        path: ResponsePath,
        value: FieldValue,
        node: &'a Arc<ResponseNode>,
    ) -> BoxFuture<'a, GraphqlResult<Value>> {
        async move {
            let schema = self.schema();

            if schema.is_non_null_type(ty) {
                let completed = self
                    .complete_value(field, schema.nullable_type(ty), path, value, node)
                    .await?;
                if completed.is_null() {
                    return Err(GraphqlError::new(
                        format!(
                            "Cannot return null for non-nullable field {}.{}.",
                            schema[field.parent_type].name(),
                            self.field_name(field)
                        ),
                        ErrorKind::NullabilityViolation,
                    ));
                }
                return Ok(completed);
            }

            let value = match value {
                FieldValue::Error(error) => return Err(error),
                FieldValue::Future(future) => {
                    self.mark_async();
                    let resolved = future.await?;
                    return self.complete_value(field, ty, path, resolved, node).await;
                }
                value if value.is_null() => return Ok(Value::Null),
                value => value,
            };

            match schema.kind(ty) {
                TypeKind::List => self.complete_list_value(field, ty, path, value, node).await,
                TypeKind::Scalar | TypeKind::Enum => self.complete_leaf_value(ty, value),
                TypeKind::Interface | TypeKind::Union => {
                    self.complete_abstract_value(field, ty, path, into_json(value)?, node)
                        .await
                }
                TypeKind::Object => {
                    let object_type = schema.named_type_of(ty);
                    self.complete_object_value(field, object_type, path, into_json(value)?, node)
                        .await
                }
                TypeKind::NonNull | TypeKind::InputObject => Err(GraphqlError::internal(format!(
                    "Cannot complete value of unexpected output type: \"{}\".",
                    schema.display_type(ty)
                ))),
            }
        }
        .boxed()
    }

    fn complete_leaf_value(&self, ty: TypeRefId, value: FieldValue) -> GraphqlResult<Value> {
        let value = into_json(value)?;
        let leaf_type = &self.schema()[self.schema().named_type_of(ty)];
        let serialized = match leaf_type {
            TypeDefinition::Scalar(scalar) => scalar.serialize(&value),
            TypeDefinition::Enum(enum_type) => enum_type.serialize(&value),
            _ => Err(format!("\"{}\" is not a leaf type.", leaf_type.name())),
        }
        .map_err(|message| GraphqlError::new(message, ErrorKind::SerializationFailure))?;

        if serialized.is_null() {
            return Err(GraphqlError::new(
                format!(
                    "Expected `{}.serialize({})` to return non-nullable value, returned: null",
                    leaf_type.name(),
                    inspect(&value)
                ),
                ErrorKind::SerializationFailure,
            ));
        }
        Ok(serialized)
    }

    async fn complete_abstract_value(
        &self,
        field: &FieldContext,
        ty: TypeRefId,
        path: ResponsePath,
        value: Value,
        node: &Arc<ResponseNode>,
    ) -> GraphqlResult<Value> {
        let schema = self.schema();
        let abstract_type = schema.named_type_of(ty);
        let abstract_name = schema[abstract_type].name();

        let runtime_type_name = {
            let info = self.resolve_info(field, &path);
            match schema[abstract_type]
                .type_resolver()
                .or(self.operation.type_resolver.as_ref())
            {
                Some(resolve_type) => resolve_type(&value, &info, abstract_name),
                None => default_type_resolver(&value, &info, abstract_name),
            }
        };

        let runtime_type = self.ensure_valid_runtime_type(runtime_type_name, abstract_type, field)?;
        self.complete_object_value(field, runtime_type, path, value, node).await
    }

    fn ensure_valid_runtime_type(
        &self,
        runtime_type_name: Option<String>,
        abstract_type: NamedTypeId,
        field: &FieldContext,
    ) -> GraphqlResult<NamedTypeId> {
        let schema = self.schema();
        let abstract_name = schema[abstract_type].name();
        let invalid = |message: String| GraphqlError::new(message, ErrorKind::InvalidRuntimeType);

        let Some(runtime_type_name) = runtime_type_name else {
            return Err(invalid(format!(
                "Abstract type \"{abstract_name}\" must resolve to an Object type at runtime for field \"{}.{}\". \
                 Either the \"{abstract_name}\" type should provide a \"resolveType\" function or each possible type \
                 should provide an \"isTypeOf\" function.",
                schema[field.parent_type].name(),
                self.field_name(field)
            )));
        };

        let Some(runtime_type) = schema.named_type(&runtime_type_name) else {
            return Err(invalid(format!(
                "Abstract type \"{abstract_name}\" was resolved to a type \"{runtime_type_name}\" that does not exist \
                 inside the schema."
            )));
        };

        if schema[runtime_type].kind() != TypeKind::Object {
            return Err(invalid(format!(
                "Abstract type \"{abstract_name}\" was resolved to a non-object type \"{runtime_type_name}\"."
            )));
        }

        if !schema.is_sub_type(abstract_type, runtime_type) {
            return Err(invalid(format!(
                "Runtime Object type \"{runtime_type_name}\" is not a possible type for \"{abstract_name}\"."
            )));
        }

        Ok(runtime_type)
    }

    async fn complete_object_value(
        &self,
        field: &FieldContext,
        object_type: NamedTypeId,
        path: ResponsePath,
        value: Value,
        node: &Arc<ResponseNode>,
    ) -> GraphqlResult<Value> {
        let schema = self.schema();
        if let Some(is_type_of) = schema[object_type].as_object().and_then(|object| object.is_type_of()) {
            let matches = is_type_of(&value, &self.resolve_info(field, &path));
            if !matches {
                return Err(GraphqlError::new(
                    format!(
                        "Expected value of type \"{}\" but got: {}.",
                        schema[object_type].name(),
                        inspect(&value)
                    ),
                    ErrorKind::TypeMismatch,
                ));
            }
        }

        let collected = self.operation.collect_sub_fields(object_type, &field.field_nodes)?;
        let source = Arc::new(value);
        let data = self.execute_fields(object_type, &source, &path, &collected.fields, node);
        self.add_patches(&collected.patches, object_type, &source, &path, node);
        data.await
    }

    /// Schedules the deferred fragments of a selection set. Each one is published once `parent`
    /// has been.
    pub(super) fn add_patches(
        &self,
        patches: &[Patch],
        parent_type: NamedTypeId,
        source: &Arc<Value>,
        path: &ResponsePath,
        parent: &ResponseNode,
    ) {
        for patch in patches {
            super::state::lock(&self.state).pending_pushes += 1;

            let ctx = self.clone();
            let node = ResponseNode::new();
            let source = source.clone();
            let path = path.clone();
            let fields = patch.fields.clone();
            let label = patch.label.clone();
            let parent = parent.id();

            self.spawner.spawn(async move {
                let result = ctx.execute_fields(parent_type, &source, &path, &fields, &node).await;
                let data = result.unwrap_or_else(|error| {
                    node.push_error(error);
                    Value::Null
                });

                let result = IncrementalResult {
                    nodes: vec![node],
                    data,
                    path: path.to_vec(),
                    at_index: None,
                    at_indices: None,
                    label,
                };
                ctx.publisher.queue(result.keys(), result, parent);
            });
        }
    }

    async fn complete_list_value(
        &self,
        field: &FieldContext,
        ty: TypeRefId,
        path: ResponsePath,
        value: FieldValue,
        node: &Arc<ResponseNode>,
    ) -> GraphqlResult<Value> {
        let Some(item_type) = self.schema().of_type(ty) else {
            return Err(GraphqlError::internal("List type without item type."));
        };

        // @stream applies to the list of the field itself, not to nested lists.
        let stream = match path.last() {
            Some(PathSegment::Field(_)) => self.operation.collector().stream_arguments(&field.field_nodes)?,
            _ => None,
        };

        match value {
            FieldValue::Stream(source) => {
                self.mark_async();
                self.complete_async_list_value(field, item_type, path, source, node, stream)
                    .await
            }
            FieldValue::List(items) => {
                self.complete_sync_list_value(field, item_type, path, items, node, stream)
                    .await
            }
            FieldValue::Value(Value::Array(items)) => {
                let items = items.into_iter().map(FieldValue::Value).collect();
                self.complete_sync_list_value(field, item_type, path, items, node, stream)
                    .await
            }
            _ => Err(GraphqlError::new(
                format!(
                    "Expected Iterable, but did not find one for field \"{}.{}\".",
                    self.schema()[field.parent_type].name(),
                    self.field_name(field)
                ),
                ErrorKind::InvalidListValue,
            )),
        }
    }

    async fn complete_sync_list_value(
        &self,
        field: &FieldContext,
        item_type: TypeRefId,
        path: ResponsePath,
        items: Vec<FieldValue>,
        node: &Arc<ResponseNode>,
        stream: Option<StreamArguments>,
    ) -> GraphqlResult<Value> {
        let total = items.len();
        let initial_count = stream.as_ref().map_or(total, |stream| stream.initial_count);
        let mut items = items.into_iter().enumerate();

        let completed = join_all(
            items
                .by_ref()
                .take(initial_count)
                .map(|(index, item)| self.complete_list_item(field, item_type, path.child(index), item, node)),
        );

        if let Some(stream) = stream.filter(|stream| total >= stream.initial_count) {
            let stream_context = self.create_stream_context(&stream, &path, node);
            for (index, item) in items {
                self.add_value(&stream_context, field, item_type, index, item);
            }
            stream_context.set_total(total);
        }

        completed
            .await
            .into_iter()
            .collect::<GraphqlResult<Vec<_>>>()
            .map(Value::Array)
    }

    async fn complete_async_list_value(
        &self,
        field: &FieldContext,
        item_type: TypeRefId,
        path: ResponsePath,
        mut source: BoxStream<'static, GraphqlResult<FieldValue>>,
        node: &Arc<ResponseNode>,
        stream: Option<StreamArguments>,
    ) -> GraphqlResult<Value> {
        let mut completed: Vec<BoxFuture<'_, GraphqlResult<Value>>> = Vec::new();
        let mut index = 0;

        loop {
            if let Some(stream) = stream.as_ref().filter(|stream| index >= stream.initial_count) {
                let stream_context = self.create_stream_context(stream, &path, node);
                self.spawn_list_source(stream_context, field, item_type, index, source);
                break;
            }

            match source.next().await {
                Some(Ok(item)) => {
                    completed.push(
                        self.complete_list_item(field, item_type, path.child(index), item, node)
                            .boxed(),
                    );
                    index += 1;
                }
                Some(Err(error)) => {
                    let error = error.from_source();
                    let result = self.handle_field_error(error, field, item_type, &path.child(index), node);
                    completed.push(future::ready(result).boxed());
                    break;
                }
                None => break,
            }
        }

        join_all(completed)
            .await
            .into_iter()
            .collect::<GraphqlResult<Vec<_>>>()
            .map(Value::Array)
    }

    async fn complete_list_item(
        &self,
        field: &FieldContext,
        item_type: TypeRefId,
        path: ResponsePath,
        item: FieldValue,
        node: &Arc<ResponseNode>,
    ) -> GraphqlResult<Value> {
        match self.complete_value(field, item_type, path.clone(), item, node).await {
            Ok(value) => Ok(value),
            Err(error) => self.handle_field_error(error, field, item_type, &path, node),
        }
    }
}

/// Plain JSON out of a settled resolver value.
pub(super) fn into_json(value: FieldValue) -> GraphqlResult<Value> {
    match value {
        FieldValue::Value(value) => Ok(value),
        FieldValue::List(items) => items
            .into_iter()
            .map(into_json)
            .collect::<GraphqlResult<Vec<_>>>()
            .map(Value::Array),
        FieldValue::Error(error) => Err(error),
        FieldValue::Future(_) | FieldValue::Stream(_) => Err(GraphqlError::new(
            "Expected a settled value, but got an asynchronous one.",
            ErrorKind::TypeMismatch,
        )),
    }
}
