use crate::{
    document::{Directive, Document, FragmentDefinition, OperationDefinition, Selection, SelectionSetId},
    schema::{ExecutorSchema, FieldDefinitionId, NamedTypeId},
};

#[allow(unused_variables)]
pub(super) trait Visitor {
    fn directive(&mut self, schema: &ExecutorSchema, edge: DirectiveEdge<'_>) {}
}

/// A directive together with where it sits in the type system.
#[derive(Clone, Copy)]
pub(super) struct DirectiveEdge<'a> {
    pub directive: &'a Directive,
    /// Type owning the fields of the enclosing selection set.
    pub parent_type: Option<NamedTypeId>,
    /// Closest enclosing field, the directive's own field when placed on one.
    pub field: Option<FieldDefinitionId>,
}

pub(super) struct VisitorContext<'a> {
    schema: &'a ExecutorSchema,
    document: &'a Document,
    visitors: &'a mut [&'a mut dyn Visitor],
}

impl<'a> VisitorContext<'a> {
    pub fn new(schema: &'a ExecutorSchema, document: &'a Document, visitors: &'a mut [&'a mut dyn Visitor]) -> Self {
        VisitorContext {
            schema,
            document,
            visitors,
        }
    }

    fn visit_directives(
        &mut self,
        directives: &[Directive],
        parent_type: Option<NamedTypeId>,
        field: Option<FieldDefinitionId>,
    ) {
        for directive in directives {
            let edge = DirectiveEdge {
                directive,
                parent_type,
                field,
            };
            for visitor in self.visitors.iter_mut() {
                visitor.directive(self.schema, edge);
            }
        }
    }

    pub fn visit_operation(&mut self, operation: &OperationDefinition) {
        // Directives on the operation itself have no parent type.
        self.visit_directives(&operation.directives, None, None);
        let root = self.schema.root_type(operation.ty);
        self.visit_selection_set(operation.selection_set, root, None);
    }

    pub fn visit_fragment(&mut self, fragment: &FragmentDefinition) {
        self.visit_directives(&fragment.directives, None, None);
        let ty = self.schema.named_type(&fragment.type_condition);
        self.visit_selection_set(fragment.selection_set, ty, None);
    }

    fn visit_selection_set(
        &mut self,
        selection_set: SelectionSetId,
        parent_type: Option<NamedTypeId>,
        enclosing_field: Option<FieldDefinitionId>,
    ) {
        let document = self.document;
        for selection in &document[selection_set].items {
            match selection {
                Selection::Field(id) => {
                    let node = &document[*id];
                    let field = parent_type.and_then(|parent| self.schema.field(parent, &node.name));
                    self.visit_directives(&node.directives, parent_type, field);

                    if let Some(selection_set) = node.selection_set {
                        let field_type = field.map(|field| self.schema.named_type_of(self.schema[field].ty));
                        self.visit_selection_set(selection_set, field_type, field);
                    }
                }
                Selection::InlineFragment(fragment) => {
                    self.visit_directives(&fragment.directives, parent_type, enclosing_field);
                    let ty = match &fragment.type_condition {
                        Some(name) => self.schema.named_type(name),
                        None => parent_type,
                    };
                    self.visit_selection_set(fragment.selection_set, ty, enclosing_field);
                }
                Selection::FragmentSpread(spread) => {
                    self.visit_directives(&spread.directives, parent_type, enclosing_field);
                }
            }
        }
    }
}
