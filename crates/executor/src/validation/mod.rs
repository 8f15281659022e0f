//! The validation rules specific to incremental delivery.
//!
//! Every other validation rule is expected to have run beforehand.

mod rules;
mod visitor;

use rules::{DeferStreamDirectiveOnRootField, StreamDirectiveOnListField};
use visitor::{Visitor, VisitorContext};

use crate::{document::Document, error::GraphqlError, schema::ExecutorSchema};

/// Checks the placement of `@defer` and `@stream` in every operation and fragment of a document.
pub fn validate(schema: &ExecutorSchema, document: &Document) -> Vec<GraphqlError> {
    let mut root_field = DeferStreamDirectiveOnRootField::default();
    let mut list_field = StreamDirectiveOnListField::default();

    {
        let mut visitors: [&mut dyn Visitor; 2] = [&mut root_field, &mut list_field];
        let mut ctx = VisitorContext::new(schema, document, &mut visitors);
        for operation in document.operations() {
            ctx.visit_operation(operation);
        }
        for fragment in document.fragments() {
            ctx.visit_fragment(fragment);
        }
    }

    let mut errors = root_field.errors;
    errors.extend(list_field.errors);
    errors
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::schema::SchemaBuilder;

    fn messages(query: &str) -> Vec<String> {
        let schema = SchemaBuilder::from_sdl(
            r#"
            type Item { id: ID! tags: [String!]! }
            type Query { items: [Item] item: Item }
            type Mutation { addItem: Item }
            type Subscription { itemAdded: Item }
            "#,
        )
        .build()
        .unwrap();
        let document = Document::parse(query).unwrap();
        validate(&schema, &document)
            .into_iter()
            .map(|error| error.message.into_owned())
            .collect()
    }

    #[test]
    fn defer_and_stream_are_allowed_on_queries() {
        assert_eq!(
            messages("{ items @stream(initialCount: 1) { id ... @defer { tags @stream } } }"),
            Vec::<String>::new()
        );
    }

    #[test]
    fn defer_on_root_mutation_and_subscription() {
        assert_eq!(
            messages("mutation { ... @defer { addItem { id } } }"),
            vec![r#"Defer directive cannot be used on root mutation type "Mutation"."#]
        );
        assert_eq!(
            messages("subscription { ...Root @defer } fragment Root on Subscription { itemAdded { id } }"),
            vec![r#"Defer directive cannot be used on root subscription type "Subscription"."#]
        );
        // Nested selections are fine.
        assert_eq!(
            messages("mutation { addItem { ... @defer { id } } }"),
            Vec::<String>::new()
        );
    }

    #[test]
    fn stream_on_non_list_fields() {
        assert_eq!(
            messages("{ item @stream { id } items { id @stream } }"),
            vec![
                r#"Stream directive cannot be used on non-list field "item" on type "Query"."#,
                r#"Stream directive cannot be used on non-list field "id" on type "Item"."#,
            ]
        );
    }
}
