use async_graphql_parser::{
    types::{self as ast, ExecutableDocument},
    Positioned,
};

use super::*;

pub(super) fn ingest(document: ExecutableDocument) -> Document {
    let mut ingester = Ingester::default();

    let operations = document
        .operations
        .iter()
        .map(|(name, operation)| ingester.ingest_operation(name.map(|name| name.to_string()), operation))
        .collect();

    let fragments = document
        .fragments
        .iter()
        .map(|(name, fragment)| {
            let fragment = FragmentDefinition {
                name: name.to_string(),
                type_condition: fragment.node.type_condition.node.on.node.to_string(),
                directives: ingest_directives(&fragment.node.directives),
                selection_set: ingester.ingest_selection_set(&fragment.node.selection_set),
                location: fragment.pos.into(),
            };
            (fragment.name.clone(), fragment)
        })
        .collect();

    Document {
        operations,
        fragments,
        fields: ingester.fields,
        selection_sets: ingester.selection_sets,
    }
}

#[derive(Default)]
struct Ingester {
    fields: Vec<FieldNode>,
    selection_sets: Vec<SelectionSet>,
}

impl Ingester {
    fn ingest_operation(
        &mut self,
        name: Option<String>,
        operation: &Positioned<ast::OperationDefinition>,
    ) -> OperationDefinition {
        let ty = match operation.node.ty {
            ast::OperationType::Query => OperationType::Query,
            ast::OperationType::Mutation => OperationType::Mutation,
            ast::OperationType::Subscription => OperationType::Subscription,
        };

        let variable_definitions = operation
            .node
            .variable_definitions
            .iter()
            .map(|definition| VariableDefinition {
                name: definition.node.name.node.to_string(),
                ty: definition.node.var_type.node.clone(),
                default_value: definition.node.default_value.as_ref().map(|value| value.node.clone()),
                location: definition.pos.into(),
            })
            .collect();

        OperationDefinition {
            name,
            ty,
            variable_definitions,
            directives: ingest_directives(&operation.node.directives),
            selection_set: self.ingest_selection_set(&operation.node.selection_set),
            location: operation.pos.into(),
        }
    }

    fn ingest_selection_set(&mut self, selection_set: &Positioned<ast::SelectionSet>) -> SelectionSetId {
        let items = selection_set
            .node
            .items
            .iter()
            .map(|item| self.ingest_selection(&item.node))
            .collect();

        let id = SelectionSetId::from(self.selection_sets.len());
        self.selection_sets.push(SelectionSet { items });
        id
    }

    fn ingest_selection(&mut self, selection: &ast::Selection) -> Selection {
        match selection {
            ast::Selection::Field(field) => {
                let selection_set = if field.node.selection_set.node.items.is_empty() {
                    None
                } else {
                    Some(self.ingest_selection_set(&field.node.selection_set))
                };

                let node = FieldNode {
                    alias: field.node.alias.as_ref().map(|alias| alias.node.to_string()),
                    name: field.node.name.node.to_string(),
                    arguments: ingest_arguments(&field.node.arguments),
                    directives: ingest_directives(&field.node.directives),
                    selection_set,
                    location: field.pos.into(),
                };

                let id = FieldNodeId::from(self.fields.len());
                self.fields.push(node);
                Selection::Field(id)
            }
            ast::Selection::FragmentSpread(spread) => Selection::FragmentSpread(FragmentSpread {
                fragment_name: spread.node.fragment_name.node.to_string(),
                directives: ingest_directives(&spread.node.directives),
                location: spread.pos.into(),
            }),
            ast::Selection::InlineFragment(fragment) => Selection::InlineFragment(InlineFragment {
                type_condition: fragment
                    .node
                    .type_condition
                    .as_ref()
                    .map(|condition| condition.node.on.node.to_string()),
                directives: ingest_directives(&fragment.node.directives),
                selection_set: self.ingest_selection_set(&fragment.node.selection_set),
                location: fragment.pos.into(),
            }),
        }
    }
}

fn ingest_arguments(arguments: &[(Positioned<Name>, Positioned<InputValue>)]) -> Vec<(String, InputValue)> {
    arguments
        .iter()
        .map(|(name, value)| (name.node.to_string(), value.node.clone()))
        .collect()
}

fn ingest_directives(directives: &[Positioned<ast::Directive>]) -> Vec<Directive> {
    directives
        .iter()
        .map(|directive| Directive {
            name: directive.node.name.node.to_string(),
            arguments: ingest_arguments(&directive.node.arguments),
            location: directive.pos.into(),
        })
        .collect()
}
