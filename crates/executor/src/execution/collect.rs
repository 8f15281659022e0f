use std::{collections::HashSet, sync::Arc, time::Duration};

use indexmap::IndexMap;
use serde_json::Value;

use crate::{
    coercion::get_directive_values,
    document::{Directive, Document, FieldNodeId, Selection, SelectionSetId},
    error::{GraphqlError, GraphqlResult},
    resolver::Variables,
    schema::{ExecutorSchema, NamedTypeId},
};

/// Every node of a merged field, in document order. The first one is the reference for
/// arguments and directives.
pub(crate) type FieldNodes = Arc<[FieldNodeId]>;

pub(crate) type GroupedFields = IndexMap<String, FieldNodes>;

#[derive(Debug, Default)]
pub(crate) struct FieldsAndPatches {
    pub fields: GroupedFields,
    pub patches: Vec<Patch>,
}

/// Fields of a deferred fragment, executed after the selection set they belong to.
#[derive(Debug)]
pub(crate) struct Patch {
    pub label: Option<String>,
    pub fields: GroupedFields,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StreamArguments {
    pub initial_count: usize,
    pub max_chunk_size: usize,
    pub max_interval: Option<Duration>,
    pub in_parallel: bool,
    pub label: Option<String>,
}

type Grouping = IndexMap<String, Vec<FieldNodeId>>;

pub(crate) struct FieldCollector<'a> {
    pub schema: &'a ExecutorSchema,
    pub document: &'a Document,
    pub variables: &'a Variables,
    pub enable_incremental: bool,
}

impl FieldCollector<'_> {
    pub fn collect_root_fields(
        &self,
        runtime_type: NamedTypeId,
        selection_set: SelectionSetId,
    ) -> GraphqlResult<FieldsAndPatches> {
        let mut fields = Grouping::new();
        let mut patches = Vec::new();
        self.collect(
            runtime_type,
            selection_set,
            &mut fields,
            &mut patches,
            &mut HashSet::new(),
        )?;
        Ok(FieldsAndPatches {
            fields: freeze(fields),
            patches,
        })
    }

    /// Merges the sub-selections of every node of a field.
    pub fn collect_sub_fields(
        &self,
        return_type: NamedTypeId,
        field_nodes: &[FieldNodeId],
    ) -> GraphqlResult<FieldsAndPatches> {
        let mut fields = Grouping::new();
        let mut patches = Vec::new();
        let mut visited = HashSet::new();
        for field_node in field_nodes {
            if let Some(selection_set) = self.document[*field_node].selection_set {
                self.collect(return_type, selection_set, &mut fields, &mut patches, &mut visited)?;
            }
        }
        tracing::trace!(
            ty = self.schema[return_type].name(),
            fields = fields.len(),
            patches = patches.len(),
            "collected sub-fields"
        );
        Ok(FieldsAndPatches {
            fields: freeze(fields),
            patches,
        })
    }

    fn collect(
        &self,
        runtime_type: NamedTypeId,
        selection_set: SelectionSetId,
        fields: &mut Grouping,
        patches: &mut Vec<Patch>,
        visited: &mut HashSet<String>,
    ) -> GraphqlResult<()> {
        for selection in &self.document[selection_set].items {
            match selection {
                Selection::Field(id) => {
                    let field = &self.document[*id];
                    if !self.should_include(&field.directives)? {
                        continue;
                    }
                    fields.entry(field.response_key().to_string()).or_default().push(*id);
                }
                Selection::InlineFragment(fragment) => {
                    if !self.should_include(&fragment.directives)?
                        || !self.does_fragment_condition_match(fragment.type_condition.as_deref(), runtime_type)
                    {
                        continue;
                    }

                    match self.defer_label(&fragment.directives)? {
                        Some(label) => {
                            let mut patch_fields = Grouping::new();
                            self.collect(runtime_type, fragment.selection_set, &mut patch_fields, patches, visited)?;
                            patches.push(Patch {
                                label,
                                fields: freeze(patch_fields),
                            });
                        }
                        None => self.collect(runtime_type, fragment.selection_set, fields, patches, visited)?,
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let name = &spread.fragment_name;
                    if !self.should_include(&spread.directives)? {
                        continue;
                    }

                    let defer = self.defer_label(&spread.directives)?;
                    if defer.is_none() && visited.contains(name) {
                        continue;
                    }

                    let Some(fragment) = self.document.fragment(name) else {
                        continue;
                    };
                    if !self.does_fragment_condition_match(Some(&fragment.type_condition), runtime_type) {
                        continue;
                    }

                    match defer {
                        Some(label) => {
                            let mut patch_fields = Grouping::new();
                            self.collect(runtime_type, fragment.selection_set, &mut patch_fields, patches, visited)?;
                            patches.push(Patch {
                                label,
                                fields: freeze(patch_fields),
                            });
                        }
                        None => {
                            visited.insert(name.clone());
                            self.collect(runtime_type, fragment.selection_set, fields, patches, visited)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// `@skip` is checked first, so it wins over `@include`.
    fn should_include(&self, directives: &[Directive]) -> GraphqlResult<bool> {
        if self.directive_if(directives, "skip")? == Some(true) {
            return Ok(false);
        }
        if self.directive_if(directives, "include")? == Some(false) {
            return Ok(false);
        }
        Ok(true)
    }

    fn directive_if(&self, directives: &[Directive], name: &str) -> GraphqlResult<Option<bool>> {
        Ok(self
            .directive_values(directives, name)?
            .and_then(|values| values.get("if").and_then(Value::as_bool)))
    }

    fn directive_values(
        &self,
        directives: &[Directive],
        name: &str,
    ) -> GraphqlResult<Option<serde_json::Map<String, Value>>> {
        let Some(definition) = self.schema.directive(name) else {
            return Ok(None);
        };
        get_directive_values(self.schema, definition, directives, self.variables)
    }

    /// `Some(label)` when the fragment is deferred.
    fn defer_label(&self, directives: &[Directive]) -> GraphqlResult<Option<Option<String>>> {
        if !self.enable_incremental {
            return Ok(None);
        }
        let Some(values) = self.directive_values(directives, "defer")? else {
            return Ok(None);
        };
        if values.get("if") == Some(&Value::Bool(false)) {
            return Ok(None);
        }
        Ok(Some(label(&values)))
    }

    fn does_fragment_condition_match(&self, type_condition: Option<&str>, runtime_type: NamedTypeId) -> bool {
        let Some(type_condition) = type_condition else {
            return true;
        };
        let Some(condition) = self.schema.named_type(type_condition) else {
            return false;
        };
        if condition == runtime_type {
            return true;
        }
        self.schema[condition].kind().is_abstract() && self.schema.is_sub_type(condition, runtime_type)
    }

    /// Arguments of `@stream` on a list field. Merged nodes are guaranteed equivalent by validation,
    /// so only the first one is looked at.
    pub fn stream_arguments(&self, field_nodes: &[FieldNodeId]) -> GraphqlResult<Option<StreamArguments>> {
        if !self.enable_incremental {
            return Ok(None);
        }
        let Some(first) = field_nodes.first() else {
            return Ok(None);
        };
        let Some(values) = self.directive_values(&self.document[*first].directives, "stream")? else {
            return Ok(None);
        };
        if values.get("if") == Some(&Value::Bool(false)) {
            return Ok(None);
        }

        let integer = |name: &str, minimum: i64, requirement: &str| -> GraphqlResult<Option<usize>> {
            match values.get(name) {
                None | Some(Value::Null) => Ok(None),
                Some(value) => value
                    .as_i64()
                    .filter(|value| *value >= minimum)
                    .and_then(|value| usize::try_from(value).ok())
                    .map(Some)
                    .ok_or_else(|| GraphqlError::internal(format!("{name} must be an integer {requirement}"))),
            }
        };

        let initial_count = integer("initialCount", 0, "greater than or equal to zero")?.unwrap_or(0);
        let max_chunk_size = integer("maxChunkSize", 1, "greater than or equal to one")?.unwrap_or(1);
        let max_interval = integer("maxInterval", 0, "greater than or equal to zero")?
            .map(|millis| Duration::from_millis(millis as u64));

        Ok(Some(StreamArguments {
            initial_count,
            max_chunk_size,
            max_interval,
            in_parallel: values.get("inParallel") == Some(&Value::Bool(true)),
            label: label(&values),
        }))
    }
}

fn label(values: &serde_json::Map<String, Value>) -> Option<String> {
    values.get("label").and_then(Value::as_str).map(str::to_string)
}

fn freeze(grouping: Grouping) -> GroupedFields {
    grouping
        .into_iter()
        .map(|(key, nodes)| (key, FieldNodes::from(nodes)))
        .collect()
}
