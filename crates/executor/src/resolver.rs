//! What resolvers receive and return.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    future::Future,
    sync::Arc,
};

use futures::{future::BoxFuture, stream::BoxStream, FutureExt, Stream, StreamExt};
use serde_json::Value;

use crate::{
    document::{Document, FieldNodeId, OperationDefinition},
    error::{GraphqlError, ResponsePath},
    schema::{ExecutorSchema, NamedTypeId, TypeRefId},
};

pub type Variables = serde_json::Map<String, Value>;

pub type FieldResolver = Arc<dyn Fn(ResolverContext<'_>) -> FieldValue + Send + Sync>;
/// Returns the name of the object type `value` belongs to, given the abstract type name.
pub type TypeResolver = Arc<dyn Fn(&Value, &ResolveInfo<'_>, &str) -> Option<String> + Send + Sync>;
pub type IsTypeOf = Arc<dyn Fn(&Value, &ResolveInfo<'_>) -> bool + Send + Sync>;

/// Value produced by a resolver.
pub enum FieldValue {
    Value(Value),
    /// A list whose items may themselves be asynchronous.
    List(Vec<FieldValue>),
    /// An asynchronous sequence, for list fields and subscription roots.
    Stream(BoxStream<'static, Result<FieldValue, GraphqlError>>),
    Future(BoxFuture<'static, Result<FieldValue, GraphqlError>>),
    Error(GraphqlError),
}

impl FieldValue {
    pub const NULL: FieldValue = FieldValue::Value(Value::Null);

    pub fn value(value: impl Into<Value>) -> Self {
        FieldValue::Value(value.into())
    }

    pub fn list<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<FieldValue>,
    {
        FieldValue::List(items.into_iter().map(Into::into).collect())
    }

    pub fn stream(stream: impl Stream<Item = Result<FieldValue, GraphqlError>> + Send + 'static) -> Self {
        FieldValue::Stream(stream.boxed())
    }

    pub fn future(future: impl Future<Output = Result<FieldValue, GraphqlError>> + Send + 'static) -> Self {
        FieldValue::Future(future.boxed())
    }

    pub fn error(error: impl Into<GraphqlError>) -> Self {
        FieldValue::Error(error.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Value(Value::Null))
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Value(value) => write!(f, "{value}"),
            FieldValue::List(items) => f.debug_list().entries(items).finish(),
            FieldValue::Stream(_) => f.write_str("<stream>"),
            FieldValue::Future(_) => f.write_str("<future>"),
            FieldValue::Error(error) => write!(f, "<error: {}>", error.message),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Value(value)
    }
}

impl<T, E> From<Result<T, E>> for FieldValue
where
    T: Into<FieldValue>,
    E: Into<GraphqlError>,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => value.into(),
            Err(error) => FieldValue::Error(error.into()),
        }
    }
}

/// Typed values shared with every resolver of a request.
#[derive(Default)]
pub struct ContextData(HashMap<TypeId, Box<dyn Any + Send + Sync>>);

impl ContextData {
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        self.0.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.0.get(&TypeId::of::<T>()).and_then(|value| value.downcast_ref())
    }
}

impl fmt::Debug for ContextData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextData").field("len", &self.0.len()).finish()
    }
}

pub struct ResolveInfo<'a> {
    pub field_name: &'a str,
    pub field_nodes: &'a [FieldNodeId],
    pub return_type: TypeRefId,
    pub parent_type: NamedTypeId,
    pub path: &'a ResponsePath,
    pub schema: &'a ExecutorSchema,
    pub document: &'a Document,
    pub operation: &'a OperationDefinition,
    pub root_value: &'a Value,
    pub variables: &'a Variables,
}

impl ResolveInfo<'_> {
    pub fn parent_type_name(&self) -> &str {
        self.schema[self.parent_type].name()
    }

    pub fn return_type_name(&self) -> String {
        self.schema.display_type(self.return_type)
    }
}

pub struct ResolverContext<'a> {
    pub source: &'a Value,
    pub args: &'a serde_json::Map<String, Value>,
    pub data: &'a ContextData,
    pub info: &'a ResolveInfo<'a>,
}

impl<'a> ResolverContext<'a> {
    pub fn arg(&self, name: &str) -> Option<&'a Value> {
        self.args.get(name)
    }

    pub fn data<T: Any + Send + Sync>(&self) -> Option<&'a T> {
        self.data.get()
    }
}

/// Reads the property named after the field from an object source.
pub fn default_field_resolver(ctx: ResolverContext<'_>) -> FieldValue {
    match ctx.source {
        Value::Object(object) => object
            .get(ctx.info.field_name)
            .cloned()
            .map(FieldValue::Value)
            .unwrap_or(FieldValue::NULL),
        _ => FieldValue::NULL,
    }
}

/// Uses a string `__typename` property, else the first possible type whose `is_type_of` accepts the
/// value.
pub fn default_type_resolver(value: &Value, info: &ResolveInfo<'_>, abstract_type: &str) -> Option<String> {
    if let Some(Value::String(typename)) = value.get("__typename") {
        return Some(typename.clone());
    }

    let abstract_type = info.schema.named_type(abstract_type)?;
    info.schema
        .possible_types(abstract_type)
        .iter()
        .find(|possible_type| {
            info.schema[**possible_type]
                .as_object()
                .and_then(|object| object.is_type_of.as_ref())
                .is_some_and(|is_type_of| is_type_of(value, info))
        })
        .map(|possible_type| info.schema[*possible_type].name().to_string())
}
