use std::{collections::HashMap, sync::Arc};

use async_graphql_parser::{types as ast, Positioned};
use indexmap::IndexMap;
use serde_json::Value;

use super::{scalars, *};
use crate::{
    document::Name,
    resolver::{FieldValue, ResolveInfo, ResolverContext},
};

const BUILT_IN_DIRECTIVES: &str = r"
directive @skip(if: Boolean!) on FIELD | FRAGMENT_SPREAD | INLINE_FRAGMENT
directive @include(if: Boolean!) on FIELD | FRAGMENT_SPREAD | INLINE_FRAGMENT
directive @defer(if: Boolean! = true, label: String) on FRAGMENT_SPREAD | INLINE_FRAGMENT
directive @stream(
  if: Boolean! = true
  label: String
  initialCount: Int = 0
  maxChunkSize: Int = 1
  maxInterval: Int
  inParallel: Boolean = false
) on FIELD
";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaBuildError {
    #[error("invalid SDL: {0}")]
    Parse(String),
    #[error("type {0} is defined more than once")]
    DuplicateType(String),
    #[error("unknown type {0}")]
    UnknownType(String),
    #[error("{0} must be an object type")]
    NotAnObject(String),
    #[error("{0} must be an interface type")]
    NotAnInterface(String),
    #[error("{0} must be an interface or union type")]
    NotAbstract(String),
    #[error("{0} must be a scalar type")]
    NotAScalar(String),
    #[error("field {type_name}.{field_name} does not exist")]
    UnknownField { type_name: String, field_name: String },
}

/// Coercion functions of a custom scalar. Unset functions pass values through unchanged.
#[derive(Default, Clone)]
pub struct CustomScalar {
    serialize: Option<ScalarFn>,
    parse_value: Option<ScalarFn>,
    parse_literal: Option<LiteralFn>,
}

impl CustomScalar {
    #[must_use]
    pub fn serialize(mut self, f: impl Fn(&Value) -> Result<Value, String> + Send + Sync + 'static) -> Self {
        self.serialize = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn parse_value(mut self, f: impl Fn(&Value) -> Result<Value, String> + Send + Sync + 'static) -> Self {
        self.parse_value = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn parse_literal(mut self, f: impl Fn(&ConstValue) -> Result<Value, String> + Send + Sync + 'static) -> Self {
        self.parse_literal = Some(Arc::new(f));
        self
    }
}

/// Builds an [`ExecutorSchema`] from SDL and the Rust functions attached to it.
pub struct SchemaBuilder {
    sdl: String,
    resolvers: HashMap<(String, String), FieldResolver>,
    subscribers: HashMap<(String, String), FieldResolver>,
    type_resolvers: HashMap<String, TypeResolver>,
    is_type_of: HashMap<String, IsTypeOf>,
    scalars: HashMap<String, CustomScalar>,
}

impl SchemaBuilder {
    pub fn from_sdl(sdl: impl Into<String>) -> Self {
        SchemaBuilder {
            sdl: sdl.into(),
            resolvers: HashMap::new(),
            subscribers: HashMap::new(),
            type_resolvers: HashMap::new(),
            is_type_of: HashMap::new(),
            scalars: HashMap::new(),
        }
    }

    #[must_use]
    pub fn resolver(
        mut self,
        type_name: &str,
        field_name: &str,
        f: impl Fn(ResolverContext<'_>) -> FieldValue + Send + Sync + 'static,
    ) -> Self {
        self.resolvers
            .insert((type_name.to_string(), field_name.to_string()), Arc::new(f));
        self
    }

    /// Resolver producing the source event stream of a subscription field.
    #[must_use]
    pub fn subscriber(
        mut self,
        type_name: &str,
        field_name: &str,
        f: impl Fn(ResolverContext<'_>) -> FieldValue + Send + Sync + 'static,
    ) -> Self {
        self.subscribers
            .insert((type_name.to_string(), field_name.to_string()), Arc::new(f));
        self
    }

    #[must_use]
    pub fn type_resolver(
        mut self,
        type_name: &str,
        f: impl Fn(&Value, &ResolveInfo<'_>, &str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.type_resolvers.insert(type_name.to_string(), Arc::new(f));
        self
    }

    #[must_use]
    pub fn is_type_of(
        mut self,
        type_name: &str,
        f: impl Fn(&Value, &ResolveInfo<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.is_type_of.insert(type_name.to_string(), Arc::new(f));
        self
    }

    #[must_use]
    pub fn scalar(mut self, name: &str, scalar: CustomScalar) -> Self {
        self.scalars.insert(name.to_string(), scalar);
        self
    }

    pub fn build(self) -> Result<ExecutorSchema, SchemaBuildError> {
        let document =
            async_graphql_parser::parse_schema(&self.sdl).map_err(|error| SchemaBuildError::Parse(error.to_string()))?;
        let built_in_directives = async_graphql_parser::parse_schema(BUILT_IN_DIRECTIVES)
            .map_err(|error| SchemaBuildError::Parse(error.to_string()))?;

        let mut ingester = Ingester::new(self);
        ingester.ingest_top_level_definitions(&document)?;
        ingester.ingest_definition_bodies(&document)?;
        ingester.ingest_directives(&document)?;
        ingester.ingest_directives(&built_in_directives)?;
        ingester.ingest_schema_definition(&document)?;
        ingester.finish()
    }
}

struct Ingester {
    builder: SchemaBuilder,
    types: Vec<TypeDefinition>,
    type_ids: HashMap<String, NamedTypeId>,
    type_refs: Vec<TypeRef>,
    type_ref_ids: HashMap<TypeRef, TypeRefId>,
    fields: Vec<FieldDefinition>,
    directives: HashMap<String, DirectiveDefinition>,
    roots: [Option<NamedTypeId>; 3],
}

impl Ingester {
    fn new(builder: SchemaBuilder) -> Self {
        let mut ingester = Ingester {
            builder,
            types: Vec::new(),
            type_ids: HashMap::new(),
            type_refs: Vec::new(),
            type_ref_ids: HashMap::new(),
            fields: Vec::new(),
            directives: HashMap::new(),
            roots: [None; 3],
        };

        for name in scalars::BUILT_IN_SCALARS {
            if let Some(scalar) = scalars::built_in(name) {
                ingester.push_type(TypeDefinition::Scalar(scalar));
            }
        }
        ingester
    }

    fn push_type(&mut self, definition: TypeDefinition) -> NamedTypeId {
        let id = NamedTypeId::from(self.types.len());
        self.type_ids.insert(definition.name().to_string(), id);
        self.types.push(definition);
        self.intern(TypeRef::Named(id));
        id
    }

    fn type_by_name(&self, name: &str) -> Result<NamedTypeId, SchemaBuildError> {
        self.type_ids
            .get(name)
            .copied()
            .ok_or_else(|| SchemaBuildError::UnknownType(name.to_string()))
    }

    fn intern(&mut self, ty: TypeRef) -> TypeRefId {
        if let Some(id) = self.type_ref_ids.get(&ty) {
            return *id;
        }
        let id = TypeRefId::from(self.type_refs.len());
        self.type_refs.push(ty);
        self.type_ref_ids.insert(ty, id);
        id
    }

    fn intern_field_type(&mut self, ty: &ast::Type) -> Result<TypeRefId, SchemaBuildError> {
        let base = match &ty.base {
            ast::BaseType::Named(name) => TypeRef::Named(self.type_by_name(name)?),
            ast::BaseType::List(inner) => TypeRef::List(self.intern_field_type(inner)?),
        };
        let base = self.intern(base);
        Ok(if ty.nullable {
            base
        } else {
            self.intern(TypeRef::NonNull(base))
        })
    }

    /// Interns the type of an input position with every wrapping a variable may use for it: any
    /// nullable position, the outermost one included, may be made non-null.
    fn intern_input_type_variations(&mut self, ty: TypeRefId) {
        let outer = match self.type_refs[usize::from(ty)] {
            TypeRef::NonNull(inner) => inner,
            _ => ty,
        };
        self.input_type_variations(outer);
    }

    fn input_type_variations(&mut self, ty: TypeRefId) -> Vec<TypeRefId> {
        let (declared_non_null, inner) = match self.type_refs[usize::from(ty)] {
            TypeRef::NonNull(inner) => (true, inner),
            _ => (false, ty),
        };

        let bases = match self.type_refs[usize::from(inner)] {
            TypeRef::List(item) => self
                .input_type_variations(item)
                .into_iter()
                .map(|item| self.intern(TypeRef::List(item)))
                .collect(),
            TypeRef::Named(_) | TypeRef::NonNull(_) => vec![inner],
        };

        let mut variations = Vec::with_capacity(bases.len() * 2);
        for base in bases {
            if !declared_non_null {
                variations.push(base);
            }
            variations.push(self.intern(TypeRef::NonNull(base)));
        }
        variations
    }

    fn ingest_top_level_definitions(&mut self, document: &ast::ServiceDocument) -> Result<(), SchemaBuildError> {
        for definition in &document.definitions {
            let ast::TypeSystemDefinition::Type(type_definition) = definition else {
                continue;
            };
            let name = type_definition.node.name.node.to_string();
            if self.type_ids.contains_key(&name) {
                if type_definition.node.extend || scalars::BUILT_IN_SCALARS.contains(&name.as_str()) {
                    continue;
                }
                return Err(SchemaBuildError::DuplicateType(name));
            }

            let definition = match &type_definition.node.kind {
                ast::TypeKind::Scalar => {
                    let scalar = match self.builder.scalars.remove(&name) {
                        Some(custom) => {
                            let passthrough = scalars::passthrough(&name);
                            ScalarType {
                                serialize: custom.serialize.unwrap_or(passthrough.serialize),
                                parse_value: custom.parse_value.unwrap_or(passthrough.parse_value),
                                parse_literal: custom.parse_literal.unwrap_or(passthrough.parse_literal),
                                name,
                            }
                        }
                        None => scalars::passthrough(&name),
                    };
                    TypeDefinition::Scalar(scalar)
                }
                ast::TypeKind::Enum(_) => TypeDefinition::Enum(EnumType {
                    name,
                    values: IndexMap::new(),
                }),
                ast::TypeKind::Object(_) => TypeDefinition::Object(ObjectType {
                    is_type_of: self.builder.is_type_of.remove(&name),
                    name,
                    fields: IndexMap::new(),
                    interfaces: Vec::new(),
                }),
                ast::TypeKind::Interface(_) => TypeDefinition::Interface(InterfaceType {
                    resolve_type: self.builder.type_resolvers.remove(&name),
                    name,
                    fields: IndexMap::new(),
                    interfaces: Vec::new(),
                }),
                ast::TypeKind::Union(_) => TypeDefinition::Union(UnionType {
                    resolve_type: self.builder.type_resolvers.remove(&name),
                    name,
                    members: Vec::new(),
                }),
                ast::TypeKind::InputObject(_) => TypeDefinition::InputObject(InputObjectType {
                    name,
                    fields: IndexMap::new(),
                }),
            };
            self.push_type(definition);
        }

        if let Some(name) = self.builder.scalars.keys().next() {
            return Err(SchemaBuildError::NotAScalar(name.clone()));
        }
        if let Some(name) = self.builder.is_type_of.keys().next() {
            return Err(SchemaBuildError::NotAnObject(name.clone()));
        }
        if let Some(name) = self.builder.type_resolvers.keys().next() {
            return Err(SchemaBuildError::NotAbstract(name.clone()));
        }
        Ok(())
    }

    fn ingest_definition_bodies(&mut self, document: &ast::ServiceDocument) -> Result<(), SchemaBuildError> {
        let type_definitions = document.definitions.iter().filter_map(|definition| match definition {
            ast::TypeSystemDefinition::Type(ty) => Some(ty),
            _ => None,
        });

        for definition in type_definitions {
            let type_name = definition.node.name.node.as_str();
            let type_id = self.type_by_name(type_name)?;

            match &definition.node.kind {
                ast::TypeKind::Object(object) => {
                    let interfaces = self.ingest_implements(&object.implements)?;
                    let fields = self.ingest_fields(type_name, &object.fields)?;
                    if let TypeDefinition::Object(ty) = &mut self.types[usize::from(type_id)] {
                        ty.interfaces.extend(interfaces);
                        ty.fields.extend(fields);
                    }
                }
                ast::TypeKind::Interface(interface) => {
                    let interfaces = self.ingest_implements(&interface.implements)?;
                    let fields = self.ingest_fields(type_name, &interface.fields)?;
                    if let TypeDefinition::Interface(ty) = &mut self.types[usize::from(type_id)] {
                        ty.interfaces.extend(interfaces);
                        ty.fields.extend(fields);
                    }
                }
                ast::TypeKind::Union(union) => {
                    let mut members = Vec::with_capacity(union.members.len());
                    for member in &union.members {
                        let member_id = self.type_by_name(&member.node)?;
                        if !matches!(self.types[usize::from(member_id)], TypeDefinition::Object(_)) {
                            return Err(SchemaBuildError::NotAnObject(member.node.to_string()));
                        }
                        members.push(member_id);
                    }
                    if let TypeDefinition::Union(ty) = &mut self.types[usize::from(type_id)] {
                        ty.members.extend(members);
                    }
                }
                ast::TypeKind::Enum(enum_type) => {
                    let values = enum_type.values.iter().map(|value| {
                        let name = value.node.value.node.to_string();
                        (name.clone(), Value::String(name))
                    });
                    if let TypeDefinition::Enum(ty) = &mut self.types[usize::from(type_id)] {
                        ty.values.extend(values);
                    }
                }
                ast::TypeKind::InputObject(input_object) => {
                    let fields = self.ingest_input_values(&input_object.fields)?;
                    if let TypeDefinition::InputObject(ty) = &mut self.types[usize::from(type_id)] {
                        ty.fields.extend(fields);
                    }
                }
                ast::TypeKind::Scalar => {}
            }
        }

        let mut leftover = self.builder.resolvers.keys().chain(self.builder.subscribers.keys());
        if let Some((type_name, field_name)) = leftover.next() {
            return Err(SchemaBuildError::UnknownField {
                type_name: type_name.clone(),
                field_name: field_name.clone(),
            });
        }
        Ok(())
    }

    fn ingest_implements(&self, implements: &[Positioned<Name>]) -> Result<Vec<NamedTypeId>, SchemaBuildError> {
        implements
            .iter()
            .map(|name| {
                let id = self.type_by_name(&name.node)?;
                match self.types[usize::from(id)] {
                    TypeDefinition::Interface(_) => Ok(id),
                    _ => Err(SchemaBuildError::NotAnInterface(name.node.to_string())),
                }
            })
            .collect()
    }

    fn ingest_fields(
        &mut self,
        type_name: &str,
        fields: &[Positioned<ast::FieldDefinition>],
    ) -> Result<Vec<(String, FieldDefinitionId)>, SchemaBuildError> {
        let mut ids = Vec::with_capacity(fields.len());
        for field in fields {
            let name = field.node.name.node.to_string();
            let key = (type_name.to_string(), name.clone());
            let definition = FieldDefinition {
                arguments: self.ingest_input_values(&field.node.arguments)?,
                ty: self.intern_field_type(&field.node.ty.node)?,
                resolve: self.builder.resolvers.remove(&key),
                subscribe: self.builder.subscribers.remove(&key),
                name: name.clone(),
            };
            let id = FieldDefinitionId::from(self.fields.len());
            self.fields.push(definition);
            ids.push((name, id));
        }
        Ok(ids)
    }

    fn ingest_input_values(
        &mut self,
        values: &[Positioned<ast::InputValueDefinition>],
    ) -> Result<IndexMap<String, InputValueDefinition>, SchemaBuildError> {
        let mut definitions = IndexMap::with_capacity(values.len());
        for value in values {
            let ty = self.intern_field_type(&value.node.ty.node)?;
            self.intern_input_type_variations(ty);
            let name = value.node.name.node.to_string();
            definitions.insert(
                name.clone(),
                InputValueDefinition {
                    name,
                    ty,
                    default_value: value.node.default_value.as_ref().map(|value| value.node.clone()),
                },
            );
        }
        Ok(definitions)
    }

    fn ingest_directives(&mut self, document: &ast::ServiceDocument) -> Result<(), SchemaBuildError> {
        for definition in &document.definitions {
            let ast::TypeSystemDefinition::Directive(directive) = definition else {
                continue;
            };
            let name = directive.node.name.node.to_string();
            if self.directives.contains_key(&name) {
                continue;
            }
            let arguments = self.ingest_input_values(&directive.node.arguments)?;
            self.directives.insert(name.clone(), DirectiveDefinition { name, arguments });
        }
        Ok(())
    }

    fn ingest_schema_definition(&mut self, document: &ast::ServiceDocument) -> Result<(), SchemaBuildError> {
        let mut explicit = false;
        for definition in &document.definitions {
            let ast::TypeSystemDefinition::Schema(schema) = definition else {
                continue;
            };
            explicit = true;
            let roots = [&schema.node.query, &schema.node.mutation, &schema.node.subscription];
            for (slot, name) in self.roots.iter_mut().zip(roots) {
                if let Some(name) = name {
                    let id = self
                        .type_ids
                        .get(name.node.as_str())
                        .copied()
                        .ok_or_else(|| SchemaBuildError::UnknownType(name.node.to_string()))?;
                    *slot = Some(id);
                }
            }
        }

        if !explicit {
            for (slot, name) in self.roots.iter_mut().zip(["Query", "Mutation", "Subscription"]) {
                *slot = self.type_ids.get(name).copied();
            }
        }

        for (root, name) in self.roots.iter().zip(["query", "mutation", "subscription"]) {
            if let Some(root) = root {
                if !matches!(self.types[usize::from(*root)], TypeDefinition::Object(_)) {
                    return Err(SchemaBuildError::NotAnObject(format!("{name} root type")));
                }
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<ExecutorSchema, SchemaBuildError> {
        // Named input types may be used directly by variables without appearing in any argument.
        for index in 0..self.types.len() {
            if self.types[index].kind().is_input() {
                let named = self.intern(TypeRef::Named(NamedTypeId::from(index)));
                self.intern(TypeRef::NonNull(named));
            }
        }

        let string = self.type_by_name("String")?;
        let string = self.intern(TypeRef::Named(string));
        let typename_type = self.intern(TypeRef::NonNull(string));
        let typename_field = FieldDefinitionId::from(self.fields.len());
        self.fields.push(FieldDefinition {
            name: TYPENAME_FIELD.to_string(),
            arguments: IndexMap::new(),
            ty: typename_type,
            resolve: Some(Arc::new(|ctx: ResolverContext<'_>| {
                FieldValue::value(ctx.info.parent_type_name())
            })),
            subscribe: None,
        });

        let mut possible_types: HashMap<NamedTypeId, Vec<NamedTypeId>> = HashMap::new();
        for (index, definition) in self.types.iter().enumerate() {
            let id = NamedTypeId::from(index);
            match definition {
                TypeDefinition::Object(object) => {
                    for interface in &object.interfaces {
                        possible_types.entry(*interface).or_default().push(id);
                    }
                }
                TypeDefinition::Union(union) => {
                    possible_types.entry(id).or_default().extend(union.members.iter().copied());
                }
                _ => {}
            }
        }

        let kinds = self
            .type_refs
            .iter()
            .map(|ty| match ty {
                TypeRef::List(_) => TypeKind::List,
                TypeRef::NonNull(_) => TypeKind::NonNull,
                TypeRef::Named(named) => self.types[usize::from(*named)].kind(),
            })
            .collect();

        let [query, mutation, subscription] = self.roots;
        Ok(ExecutorSchema {
            types: self.types,
            type_ids: self.type_ids,
            type_refs: self.type_refs,
            type_ref_ids: self.type_ref_ids,
            kinds,
            fields: self.fields,
            directives: self.directives,
            possible_types,
            query,
            mutation,
            subscription,
            typename_field,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolvers_must_target_existing_fields() {
        let error = SchemaBuilder::from_sdl("type Query { a: Int }")
            .resolver("Query", "b", |_| FieldValue::NULL)
            .build()
            .err();
        assert_eq!(
            error,
            Some(SchemaBuildError::UnknownField {
                type_name: "Query".into(),
                field_name: "b".into()
            })
        );
    }

    #[test]
    fn built_in_directives_are_always_available() {
        let schema = SchemaBuilder::from_sdl("type Query { a: Int }").build().unwrap();
        let stream = schema.directive("stream").unwrap();
        assert_eq!(
            stream.arguments.keys().map(String::as_str).collect::<Vec<_>>(),
            ["if", "label", "initialCount", "maxChunkSize", "maxInterval", "inParallel"]
        );
        assert!(schema.directive("defer").is_some());
        assert!(schema.directive("skip").is_some());
    }

    #[test]
    fn schema_definition_names_root_types() {
        let schema = SchemaBuilder::from_sdl(
            "schema { query: Root mutation: Change } type Root { a: Int } type Change { b: Int }",
        )
        .build()
        .unwrap();
        assert_eq!(
            schema.root_type(OperationType::Mutation),
            schema.named_type("Change")
        );
        assert_eq!(schema.root_type(OperationType::Subscription), None);
    }

    #[test]
    fn extensions_add_fields() {
        let schema = SchemaBuilder::from_sdl("type Query { a: Int } extend type Query { b: Int }")
            .build()
            .unwrap();
        let query = schema.root_type(OperationType::Query).unwrap();
        assert!(schema.field(query, "b").is_some());
    }
}
