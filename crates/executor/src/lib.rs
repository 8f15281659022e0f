//! A GraphQL executor with incremental delivery.
//!
//! Operations run against an [`ExecutorSchema`] built from SDL with Rust resolvers attached.
//! Fragments marked with `@defer` and list items past the initial count of `@stream` are delivered
//! as incremental payloads after the initial response, each one published only after the payload
//! it belongs to.

mod bundler;
mod coercion;
mod config;
mod document;
mod error;
mod execution;
mod executor;
mod ids;
mod publisher;
mod request;
mod resolver;
mod response;
mod schema;
mod validation;

pub use coercion::coerce_input_value;
pub use config::{ConfigError, ExecutorConfig, DEFAULT_MAX_VARIABLE_ERRORS};
pub use document::{Document, FieldNodeId, OperationDefinition, OperationType};
pub use error::{ErrorKind, GraphqlError, GraphqlResult, Location, PathSegment, ResponsePath};
pub use execution::SourceEventStream;
pub use executor::{ExecuteSyncError, Executor};
pub use request::Request;
pub use resolver::{
    default_field_resolver, default_type_resolver, ContextData, FieldResolver, FieldValue, IsTypeOf, ResolveInfo,
    ResolverContext, TypeResolver, Variables,
};
pub use response::{ExecutionOutcome, Response, ResponseStream};
pub use schema::{
    CustomScalar, ExecutorSchema, NamedTypeId, SchemaBuildError, SchemaBuilder, TypeDefinition, TypeKind, TypeRefId,
};
pub use validation::validate;
