use super::super::visitor::{DirectiveEdge, Visitor};
use crate::{
    error::{ErrorKind, GraphqlError},
    schema::ExecutorSchema,
};

/// `@stream` only makes sense on fields returning a list, possibly non-null.
#[derive(Default)]
pub(crate) struct StreamDirectiveOnListField {
    pub errors: Vec<GraphqlError>,
}

impl Visitor for StreamDirectiveOnListField {
    fn directive(&mut self, schema: &ExecutorSchema, edge: DirectiveEdge<'_>) {
        let (Some(field), Some(parent_type)) = (edge.field, edge.parent_type) else {
            return;
        };
        if edge.directive.name != "stream" {
            return;
        }

        let field = &schema[field];
        if !schema.is_list_type(schema.nullable_type(field.ty)) {
            self.errors.push(
                GraphqlError::new(
                    format!(
                        "Stream directive cannot be used on non-list field \"{}\" on type \"{}\".",
                        field.name,
                        schema[parent_type].name()
                    ),
                    ErrorKind::Validation,
                )
                .with_location(edge.directive.location),
            );
        }
    }
}
