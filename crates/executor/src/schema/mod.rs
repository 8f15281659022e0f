//! The type system as seen by the executor.
//!
//! Every type reference used by the schema is interned into a [`TypeRefId`] when the schema is
//! built, together with its [`TypeKind`], so that completion and coercion dispatch on a plain tag.
//! Input types are also interned with every stricter wrapping a variable may declare for them, so
//! looking up a variable type by its AST reference never misses for a valid document.

mod builder;
mod scalars;

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value;

pub use builder::{CustomScalar, SchemaBuildError, SchemaBuilder};

use crate::{
    document::{BaseType, ConstValue, OperationType, TypeReference},
    ids::id_newtypes,
    resolver::{FieldResolver, IsTypeOf, TypeResolver},
};

id_newtypes! {
    ExecutorSchema.types[NamedTypeId] => TypeDefinition,
    ExecutorSchema.type_refs[TypeRefId] => TypeRef,
    ExecutorSchema.fields[FieldDefinitionId] => FieldDefinition,
}

pub(crate) const TYPENAME_FIELD: &str = "__typename";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Named(NamedTypeId),
    List(TypeRefId),
    NonNull(TypeRefId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    List,
    NonNull,
    Scalar,
    Enum,
    Object,
    Interface,
    Union,
    InputObject,
}

impl TypeKind {
    pub fn is_leaf(self) -> bool {
        matches!(self, TypeKind::Scalar | TypeKind::Enum)
    }

    pub fn is_abstract(self) -> bool {
        matches!(self, TypeKind::Interface | TypeKind::Union)
    }

    pub fn is_input(self) -> bool {
        matches!(self, TypeKind::Scalar | TypeKind::Enum | TypeKind::InputObject)
    }
}

pub enum TypeDefinition {
    Scalar(ScalarType),
    Enum(EnumType),
    Object(ObjectType),
    Interface(InterfaceType),
    Union(UnionType),
    InputObject(InputObjectType),
}

impl TypeDefinition {
    pub fn name(&self) -> &str {
        match self {
            TypeDefinition::Scalar(ty) => &ty.name,
            TypeDefinition::Enum(ty) => &ty.name,
            TypeDefinition::Object(ty) => &ty.name,
            TypeDefinition::Interface(ty) => &ty.name,
            TypeDefinition::Union(ty) => &ty.name,
            TypeDefinition::InputObject(ty) => &ty.name,
        }
    }

    pub fn kind(&self) -> TypeKind {
        match self {
            TypeDefinition::Scalar(_) => TypeKind::Scalar,
            TypeDefinition::Enum(_) => TypeKind::Enum,
            TypeDefinition::Object(_) => TypeKind::Object,
            TypeDefinition::Interface(_) => TypeKind::Interface,
            TypeDefinition::Union(_) => TypeKind::Union,
            TypeDefinition::InputObject(_) => TypeKind::InputObject,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectType> {
        match self {
            TypeDefinition::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_input_object(&self) -> Option<&InputObjectType> {
        match self {
            TypeDefinition::InputObject(input_object) => Some(input_object),
            _ => None,
        }
    }

    /// Type resolver attached to an interface or union.
    pub fn type_resolver(&self) -> Option<&TypeResolver> {
        match self {
            TypeDefinition::Interface(interface) => interface.resolve_type.as_ref(),
            TypeDefinition::Union(union) => union.resolve_type.as_ref(),
            _ => None,
        }
    }

    fn fields(&self) -> Option<&IndexMap<String, FieldDefinitionId>> {
        match self {
            TypeDefinition::Object(object) => Some(&object.fields),
            TypeDefinition::Interface(interface) => Some(&interface.fields),
            _ => None,
        }
    }
}

pub type ScalarFn = std::sync::Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;
pub type LiteralFn = std::sync::Arc<dyn Fn(&ConstValue) -> Result<Value, String> + Send + Sync>;

pub struct ScalarType {
    pub name: String,
    pub(crate) serialize: ScalarFn,
    pub(crate) parse_value: ScalarFn,
    pub(crate) parse_literal: LiteralFn,
}

impl ScalarType {
    pub fn serialize(&self, value: &Value) -> Result<Value, String> {
        (self.serialize)(value)
    }

    pub fn parse_value(&self, value: &Value) -> Result<Value, String> {
        (self.parse_value)(value)
    }

    pub fn parse_literal(&self, value: &ConstValue) -> Result<Value, String> {
        (self.parse_literal)(value)
    }
}

pub struct EnumType {
    pub name: String,
    /// Enum value names and the internal values resolvers work with.
    pub values: IndexMap<String, Value>,
}

impl EnumType {
    pub fn serialize(&self, value: &Value) -> Result<Value, String> {
        self.values
            .iter()
            .find(|(_, internal)| *internal == value)
            .map(|(name, _)| Value::String(name.clone()))
            .ok_or_else(|| format!("Enum \"{}\" cannot represent value: {}", self.name, inspect(value)))
    }

    pub fn parse_value(&self, value: &Value) -> Result<Value, String> {
        let Value::String(name) = value else {
            return Err(format!(
                "Enum \"{}\" cannot represent non-string value: {}.",
                self.name,
                inspect(value)
            ));
        };
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| format!("Value \"{name}\" does not exist in \"{}\" enum.", self.name))
    }

    pub fn parse_literal(&self, value: &ConstValue) -> Result<Value, String> {
        let ConstValue::Enum(name) = value else {
            return Err(format!(
                "Enum \"{}\" cannot represent non-enum value: {value}.",
                self.name
            ));
        };
        self.values
            .get(name.as_str())
            .cloned()
            .ok_or_else(|| format!("Value \"{name}\" does not exist in \"{}\" enum.", self.name))
    }
}

pub struct ObjectType {
    pub name: String,
    pub fields: IndexMap<String, FieldDefinitionId>,
    pub interfaces: Vec<NamedTypeId>,
    pub(crate) is_type_of: Option<IsTypeOf>,
}

impl ObjectType {
    pub fn is_type_of(&self) -> Option<&IsTypeOf> {
        self.is_type_of.as_ref()
    }
}

pub struct InterfaceType {
    pub name: String,
    pub fields: IndexMap<String, FieldDefinitionId>,
    pub interfaces: Vec<NamedTypeId>,
    pub(crate) resolve_type: Option<TypeResolver>,
}

pub struct UnionType {
    pub name: String,
    pub members: Vec<NamedTypeId>,
    pub(crate) resolve_type: Option<TypeResolver>,
}

pub struct InputObjectType {
    pub name: String,
    pub fields: IndexMap<String, InputValueDefinition>,
}

pub struct FieldDefinition {
    pub name: String,
    pub arguments: IndexMap<String, InputValueDefinition>,
    pub ty: TypeRefId,
    pub(crate) resolve: Option<FieldResolver>,
    pub(crate) subscribe: Option<FieldResolver>,
}

impl FieldDefinition {
    pub fn resolver(&self) -> Option<&FieldResolver> {
        self.resolve.as_ref()
    }

    pub fn subscriber(&self) -> Option<&FieldResolver> {
        self.subscribe.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct InputValueDefinition {
    pub name: String,
    pub ty: TypeRefId,
    pub default_value: Option<ConstValue>,
}

#[derive(Debug)]
pub struct DirectiveDefinition {
    pub name: String,
    pub arguments: IndexMap<String, InputValueDefinition>,
}

pub struct ExecutorSchema {
    types: Vec<TypeDefinition>,
    type_ids: HashMap<String, NamedTypeId>,
    type_refs: Vec<TypeRef>,
    type_ref_ids: HashMap<TypeRef, TypeRefId>,
    kinds: Vec<TypeKind>,
    fields: Vec<FieldDefinition>,
    directives: HashMap<String, DirectiveDefinition>,
    possible_types: HashMap<NamedTypeId, Vec<NamedTypeId>>,
    query: Option<NamedTypeId>,
    mutation: Option<NamedTypeId>,
    subscription: Option<NamedTypeId>,
    typename_field: FieldDefinitionId,
}

impl ExecutorSchema {
    pub fn builder(sdl: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::from_sdl(sdl)
    }

    pub fn kind(&self, ty: TypeRefId) -> TypeKind {
        self.kinds[usize::from(ty)]
    }

    pub fn is_list_type(&self, ty: TypeRefId) -> bool {
        self.kind(ty) == TypeKind::List
    }

    pub fn is_non_null_type(&self, ty: TypeRefId) -> bool {
        self.kind(ty) == TypeKind::NonNull
    }

    pub fn is_leaf_type(&self, ty: TypeRefId) -> bool {
        self.kind(ty).is_leaf()
    }

    pub fn is_abstract_type(&self, ty: TypeRefId) -> bool {
        self.kind(ty).is_abstract()
    }

    pub fn is_input_type(&self, ty: TypeRefId) -> bool {
        self[self.named_type_of(ty)].kind().is_input()
    }

    /// Strips a non-null wrapper, if any.
    pub fn nullable_type(&self, ty: TypeRefId) -> TypeRefId {
        match self[ty] {
            TypeRef::NonNull(inner) => inner,
            _ => ty,
        }
    }

    /// Wrapped type of a list or non-null type.
    pub fn of_type(&self, ty: TypeRefId) -> Option<TypeRefId> {
        match self[ty] {
            TypeRef::List(inner) | TypeRef::NonNull(inner) => Some(inner),
            TypeRef::Named(_) => None,
        }
    }

    pub fn named_type_of(&self, mut ty: TypeRefId) -> NamedTypeId {
        loop {
            match self[ty] {
                TypeRef::Named(named) => return named,
                TypeRef::List(inner) | TypeRef::NonNull(inner) => ty = inner,
            }
        }
    }

    pub fn named_type(&self, name: &str) -> Option<NamedTypeId> {
        self.type_ids.get(name).copied()
    }

    pub fn named_type_ref(&self, named: NamedTypeId) -> Option<TypeRefId> {
        self.type_ref_ids.get(&TypeRef::Named(named)).copied()
    }

    /// Resolves an AST type reference, as found in variable definitions.
    pub fn get_type(&self, ty: &TypeReference) -> Option<TypeRefId> {
        let base = match &ty.base {
            BaseType::Named(name) => TypeRef::Named(self.named_type(name)?),
            BaseType::List(inner) => TypeRef::List(self.get_type(inner)?),
        };
        let base = self.type_ref_ids.get(&base).copied()?;
        if ty.nullable {
            Some(base)
        } else {
            self.type_ref_ids.get(&TypeRef::NonNull(base)).copied()
        }
    }

    pub fn display_type(&self, ty: TypeRefId) -> String {
        match self[ty] {
            TypeRef::Named(named) => self[named].name().to_string(),
            TypeRef::List(inner) => format!("[{}]", self.display_type(inner)),
            TypeRef::NonNull(inner) => format!("{}!", self.display_type(inner)),
        }
    }

    pub fn root_type(&self, operation: OperationType) -> Option<NamedTypeId> {
        match operation {
            OperationType::Query => self.query,
            OperationType::Mutation => self.mutation,
            OperationType::Subscription => self.subscription,
        }
    }

    /// Object types implementing an interface or members of a union.
    pub fn possible_types(&self, abstract_type: NamedTypeId) -> &[NamedTypeId] {
        self.possible_types
            .get(&abstract_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_sub_type(&self, abstract_type: NamedTypeId, maybe_sub_type: NamedTypeId) -> bool {
        self.possible_types(abstract_type).contains(&maybe_sub_type)
    }

    /// Field of an object or interface type, `__typename` included.
    pub fn field(&self, parent: NamedTypeId, name: &str) -> Option<FieldDefinitionId> {
        if name == TYPENAME_FIELD {
            return Some(self.typename_field);
        }
        self[parent].fields()?.get(name).copied()
    }

    pub fn directive(&self, name: &str) -> Option<&DirectiveDefinition> {
        self.directives.get(name)
    }
}

pub(crate) fn inspect(value: &Value) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use async_graphql_parser::types::Type;

    use super::*;

    fn schema() -> ExecutorSchema {
        SchemaBuilder::from_sdl(
            r#"
            interface Node { id: ID! }
            type User implements Node { id: ID! friends(first: Int, filter: [String!]): [User] }
            type Post implements Node { id: ID! }
            union SearchResult = User | Post
            input Filter { tags: [String] }
            type Query { node(id: ID!): Node search(filter: Filter): [SearchResult!]! }
            "#,
        )
        .build()
        .unwrap()
    }

    #[test]
    fn kinds_are_tagged_per_type_reference() {
        let schema = schema();
        let query = schema.root_type(OperationType::Query).unwrap();
        let search = &schema[schema.field(query, "search").unwrap()];

        assert_eq!(schema.display_type(search.ty), "[SearchResult!]!");
        assert_eq!(schema.kind(search.ty), TypeKind::NonNull);
        let list = schema.of_type(search.ty).unwrap();
        assert_eq!(schema.kind(list), TypeKind::List);
        let item = schema.of_type(list).unwrap();
        assert_eq!(schema.kind(schema.of_type(item).unwrap()), TypeKind::Union);
        assert!(schema.is_abstract_type(schema.nullable_type(item)));
    }

    #[test]
    fn possible_types_of_abstract_types() {
        let schema = schema();
        let node = schema.named_type("Node").unwrap();
        let search = schema.named_type("SearchResult").unwrap();
        let user = schema.named_type("User").unwrap();
        let post = schema.named_type("Post").unwrap();

        assert_eq!(schema.possible_types(node), &[user, post]);
        assert!(schema.is_sub_type(search, post));
        assert!(!schema.is_sub_type(search, node));
    }

    #[test]
    fn stricter_input_wrappings_are_available_to_variables() {
        let schema = schema();
        for source in ["[String!]!", "[String]", "[String!]", "String!", "Int!", "Filter!", "ID"] {
            let ty = Type::new(source).unwrap();
            let id = schema.get_type(&ty).unwrap_or_else(|| unreachable!("{source} should resolve"));
            assert_eq!(schema.display_type(id), source);
        }
        assert!(schema.get_type(&Type::new("Unknown").unwrap()).is_none());
    }

    #[test]
    fn typename_is_a_field_of_every_composite_type() {
        let schema = schema();
        let user = schema.named_type("User").unwrap();
        let field = &schema[schema.field(user, "__typename").unwrap()];
        assert_eq!(schema.display_type(field.ty), "String!");
        assert!(schema.field(user, "missing").is_none());
    }
}
