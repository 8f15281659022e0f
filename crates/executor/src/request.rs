use std::sync::Arc;

use serde_json::Value;

use crate::{
    document::Document,
    resolver::{ContextData, FieldResolver, FieldValue, ResolveInfo, ResolverContext, TypeResolver, Variables},
};

pub(crate) enum RequestDocument {
    Query(String),
    Parsed(Arc<Document>),
}

/// A GraphQL request: the document to execute and everything resolvers receive alongside it.
pub struct Request {
    pub(crate) document: RequestDocument,
    pub(crate) operation_name: Option<String>,
    pub(crate) variables: Variables,
    pub(crate) root_value: Value,
    pub(crate) data: ContextData,
    pub(crate) field_resolver: Option<FieldResolver>,
    pub(crate) type_resolver: Option<TypeResolver>,
    pub(crate) subscribe_field_resolver: Option<FieldResolver>,
    pub(crate) enable_incremental: Option<bool>,
    pub(crate) force_query_algorithm: Option<bool>,
}

impl Request {
    pub fn new(query: impl Into<String>) -> Self {
        Self::with_document_source(RequestDocument::Query(query.into()))
    }

    /// Reuses an already parsed document, e.g. one that went through validation.
    pub fn from_document(document: Arc<Document>) -> Self {
        Self::with_document_source(RequestDocument::Parsed(document))
    }

    fn with_document_source(document: RequestDocument) -> Self {
        Request {
            document,
            operation_name: None,
            variables: Variables::new(),
            root_value: Value::Null,
            data: ContextData::default(),
            field_resolver: None,
            type_resolver: None,
            subscribe_field_resolver: None,
            enable_incremental: None,
            force_query_algorithm: None,
        }
    }

    #[must_use]
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Raw variable values, coerced against the variable definitions of the operation. Anything
    /// but a JSON object is treated as no variables.
    #[must_use]
    pub fn variables(mut self, variables: Value) -> Self {
        self.variables = match variables {
            Value::Object(variables) => variables,
            _ => Variables::new(),
        };
        self
    }

    #[must_use]
    pub fn root_value(mut self, root_value: Value) -> Self {
        self.root_value = root_value;
        self
    }

    /// Adds a value resolvers can retrieve by type with [`ResolverContext::data`].
    #[must_use]
    pub fn data<T: std::any::Any + Send + Sync>(mut self, value: T) -> Self {
        self.data.insert(value);
        self
    }

    /// Resolver for the fields the schema has no resolver for.
    #[must_use]
    pub fn field_resolver(
        mut self,
        resolver: impl Fn(ResolverContext<'_>) -> FieldValue + Send + Sync + 'static,
    ) -> Self {
        self.field_resolver = Some(Arc::new(resolver));
        self
    }

    #[must_use]
    pub fn type_resolver(
        mut self,
        resolver: impl Fn(&Value, &ResolveInfo<'_>, &str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.type_resolver = Some(Arc::new(resolver));
        self
    }

    /// Creates the source event stream of a subscription whose root field has no subscriber.
    #[must_use]
    pub fn subscribe_field_resolver(
        mut self,
        resolver: impl Fn(ResolverContext<'_>) -> FieldValue + Send + Sync + 'static,
    ) -> Self {
        self.subscribe_field_resolver = Some(Arc::new(resolver));
        self
    }

    #[must_use]
    pub fn enable_incremental(mut self, enabled: bool) -> Self {
        self.enable_incremental = Some(enabled);
        self
    }

    #[must_use]
    pub fn force_query_algorithm(mut self, forced: bool) -> Self {
        self.force_query_algorithm = Some(forced);
        self
    }
}

impl From<&str> for Request {
    fn from(query: &str) -> Self {
        Request::new(query)
    }
}

impl From<String> for Request {
    fn from(query: String) -> Self {
        Request::new(query)
    }
}
