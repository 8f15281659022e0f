use super::super::visitor::{DirectiveEdge, Visitor};
use crate::{
    document::OperationType,
    error::{ErrorKind, GraphqlError},
    schema::ExecutorSchema,
};

/// `@defer` and `@stream` are forbidden directly on the root mutation and subscription types.
#[derive(Default)]
pub(crate) struct DeferStreamDirectiveOnRootField {
    pub errors: Vec<GraphqlError>,
}

impl Visitor for DeferStreamDirectiveOnRootField {
    fn directive(&mut self, schema: &ExecutorSchema, edge: DirectiveEdge<'_>) {
        let Some(parent_type) = edge.parent_type else {
            return;
        };
        let directive = match edge.directive.name.as_str() {
            "defer" => "Defer",
            "stream" => "Stream",
            _ => return,
        };

        for operation in [OperationType::Mutation, OperationType::Subscription] {
            if schema.root_type(operation) == Some(parent_type) {
                self.errors.push(
                    GraphqlError::new(
                        format!(
                            "{directive} directive cannot be used on root {operation} type \"{}\".",
                            schema[parent_type].name()
                        ),
                        ErrorKind::Validation,
                    )
                    .with_location(edge.directive.location),
                );
            }
        }
    }
}
