//! Executable documents ingested into an arena, so that selections can be referenced and memoized
//! by id for the lifetime of a request.

mod ingest;

use std::collections::HashMap;

pub use async_graphql_parser::types::{BaseType, Type as TypeReference};
pub use async_graphql_value::{ConstValue, Name, Value as InputValue};

use crate::{
    error::{GraphqlError, GraphqlResult, Location},
    ids::id_newtypes,
};

id_newtypes! {
    Document.fields[FieldNodeId] => FieldNode,
    Document.selection_sets[SelectionSetId] => SelectionSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
}

#[derive(Debug, Default)]
pub struct Document {
    operations: Vec<OperationDefinition>,
    fragments: HashMap<String, FragmentDefinition>,
    fields: Vec<FieldNode>,
    selection_sets: Vec<SelectionSet>,
}

#[derive(Debug)]
pub struct OperationDefinition {
    pub name: Option<String>,
    pub ty: OperationType,
    pub variable_definitions: Vec<VariableDefinition>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSetId,
    pub location: Location,
}

#[derive(Debug)]
pub struct VariableDefinition {
    pub name: String,
    pub ty: TypeReference,
    pub default_value: Option<ConstValue>,
    pub location: Location,
}

#[derive(Debug)]
pub struct FragmentDefinition {
    pub name: String,
    pub type_condition: String,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSetId,
    pub location: Location,
}

#[derive(Debug, Default)]
pub struct SelectionSet {
    pub items: Vec<Selection>,
}

#[derive(Debug)]
pub enum Selection {
    Field(FieldNodeId),
    FragmentSpread(FragmentSpread),
    InlineFragment(InlineFragment),
}

#[derive(Debug)]
pub struct FieldNode {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<(String, InputValue)>,
    pub directives: Vec<Directive>,
    pub selection_set: Option<SelectionSetId>,
    pub location: Location,
}

impl FieldNode {
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn argument(&self, name: &str) -> Option<&InputValue> {
        find_argument(&self.arguments, name)
    }
}

#[derive(Debug)]
pub struct FragmentSpread {
    pub fragment_name: String,
    pub directives: Vec<Directive>,
    pub location: Location,
}

#[derive(Debug)]
pub struct InlineFragment {
    pub type_condition: Option<String>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSetId,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct Directive {
    pub name: String,
    pub arguments: Vec<(String, InputValue)>,
    pub location: Location,
}

impl Directive {
    pub fn argument(&self, name: &str) -> Option<&InputValue> {
        find_argument(&self.arguments, name)
    }
}

fn find_argument<'a>(arguments: &'a [(String, InputValue)], name: &str) -> Option<&'a InputValue> {
    arguments
        .iter()
        .find_map(|(argument, value)| (argument == name).then_some(value))
}

impl Document {
    pub fn parse(source: &str) -> GraphqlResult<Self> {
        let document = async_graphql_parser::parse_query(source).map_err(|error| {
            GraphqlError::document(format!("Syntax Error: {error}")).with_locations(error.positions().map(Into::into))
        })?;
        Ok(ingest::ingest(document))
    }

    pub fn operations(&self) -> &[OperationDefinition] {
        &self.operations
    }

    pub fn fragment(&self, name: &str) -> Option<&FragmentDefinition> {
        self.fragments.get(name)
    }

    pub fn fragments(&self) -> impl Iterator<Item = &FragmentDefinition> + '_ {
        self.fragments.values()
    }

    /// Picks the operation to execute, by name when the document has several.
    pub fn select_operation(&self, name: Option<&str>) -> GraphqlResult<&OperationDefinition> {
        let mut selected = None;
        for operation in &self.operations {
            match name {
                None => {
                    if selected.is_some() {
                        return Err(GraphqlError::document(
                            "Must provide operation name if query contains multiple operations.",
                        ));
                    }
                    selected = Some(operation);
                }
                Some(name) if operation.name.as_deref() == Some(name) => selected = Some(operation),
                Some(_) => {}
            }
        }

        selected.ok_or_else(|| match name {
            Some(name) => GraphqlError::document(format!("Unknown operation named \"{name}\".")),
            None => GraphqlError::document("Must provide an operation."),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selections_are_ingested_into_the_arena() {
        let document = Document::parse(
            r#"
            query Named($id: ID!) {
                item(id: $id) { id ...Details }
                other: item(id: "2") { ... on Item @defer(label: "late") { name } }
            }
            fragment Details on Item { name }
            "#,
        )
        .unwrap();

        let operation = document.select_operation(None).unwrap();
        assert_eq!(operation.name.as_deref(), Some("Named"));
        assert_eq!(operation.variable_definitions[0].name, "id");

        let root = &document[operation.selection_set];
        assert_eq!(root.items.len(), 2);
        let Selection::Field(second) = root.items[1] else {
            unreachable!("expected a field");
        };
        assert_eq!(document[second].response_key(), "other");
        assert_eq!(document.fragment("Details").unwrap().type_condition, "Item");
    }

    #[test]
    fn operation_selection_errors() {
        let document = Document::parse("query A { a } query B { b }").unwrap();
        assert_eq!(
            document.select_operation(None).unwrap_err().message,
            "Must provide operation name if query contains multiple operations."
        );
        assert_eq!(
            document.select_operation(Some("C")).unwrap_err().message,
            "Unknown operation named \"C\"."
        );
        assert_eq!(document.select_operation(Some("B")).unwrap().name.as_deref(), Some("B"));
    }

    #[test]
    fn syntax_errors_are_document_errors() {
        let error = Document::parse("{ field ").unwrap_err();
        assert_eq!(error.kind, crate::ErrorKind::Document);
        assert!(error.message.starts_with("Syntax Error"));
    }
}
