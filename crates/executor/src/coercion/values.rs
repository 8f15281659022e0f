use indexmap::IndexMap;
use serde_json::Value;

use super::{coerce_input_value, print_path, value_from_ast, value_from_const};
use crate::{
    document::{Directive, InputValue, VariableDefinition},
    error::{ErrorKind, GraphqlError, Location},
    resolver::Variables,
    schema::{inspect, DirectiveDefinition, ExecutorSchema, InputValueDefinition},
};

/// Coerces the request variables against the variable definitions of the operation.
///
/// Collects every error, stopping once `max_errors` is exceeded.
pub fn get_variable_values(
    schema: &ExecutorSchema,
    definitions: &[VariableDefinition],
    inputs: &Variables,
    max_errors: usize,
) -> Result<Variables, Vec<GraphqlError>> {
    let mut errors = Vec::new();
    let mut coerced = Variables::new();

    let completed = coerce_variable_values(schema, definitions, inputs, &mut coerced, &mut |error| {
        if errors.len() >= max_errors {
            return Err(GraphqlError::new(
                "Too many errors processing variables, error limit reached. Execution aborted.",
                ErrorKind::VariableCoercion,
            ));
        }
        errors.push(error);
        Ok(())
    });

    if let Err(error) = completed {
        errors.push(error);
    }

    if errors.is_empty() {
        Ok(coerced)
    } else {
        tracing::debug!(count = errors.len(), "variable coercion failed");
        Err(errors)
    }
}

fn coerce_variable_values(
    schema: &ExecutorSchema,
    definitions: &[VariableDefinition],
    inputs: &Variables,
    coerced: &mut Variables,
    on_error: &mut dyn FnMut(GraphqlError) -> Result<(), GraphqlError>,
) -> Result<(), GraphqlError> {
    let variable_error = |message: String, location: Location| {
        GraphqlError::new(message, ErrorKind::VariableCoercion).with_location(location)
    };

    for definition in definitions {
        let name = &definition.name;
        let type_name = definition.ty.to_string();

        let Some(ty) = schema.get_type(&definition.ty).filter(|ty| schema.is_input_type(*ty)) else {
            on_error(variable_error(
                format!("Variable \"${name}\" expected value of type \"{type_name}\" which cannot be used as an input type."),
                definition.location,
            ))?;
            continue;
        };

        let Some(value) = inputs.get(name) else {
            if let Some(default_value) = &definition.default_value {
                if let Some(default_value) = value_from_const(schema, default_value, ty) {
                    coerced.insert(name.clone(), default_value);
                }
            } else if schema.is_non_null_type(ty) {
                on_error(variable_error(
                    format!("Variable \"${name}\" of required type \"{type_name}\" was not provided."),
                    definition.location,
                ))?;
            }
            continue;
        };

        if value.is_null() && schema.is_non_null_type(ty) {
            on_error(variable_error(
                format!("Variable \"${name}\" of non-null type \"{type_name}\" must not be null."),
                definition.location,
            ))?;
            continue;
        }

        let mut aborted = None;
        let value = coerce_input_value(schema, value, ty, &mut |path, invalid, message| {
            if aborted.is_some() {
                return;
            }
            let mut prefix = format!("Variable \"${name}\" got invalid value {}", inspect(invalid));
            if !path.is_empty() {
                prefix.push_str(&format!(" at \"{name}{}\"", print_path(path)));
            }
            if let Err(error) = on_error(variable_error(format!("{prefix}; {message}"), definition.location)) {
                aborted = Some(error);
            }
        });

        if let Some(error) = aborted {
            return Err(error);
        }
        if let Some(value) = value {
            coerced.insert(name.clone(), value);
        }
    }

    Ok(())
}

/// Coerces the arguments of a field or directive node against their definitions.
///
/// Arguments that are neither provided nor defaulted are absent from the result.
pub fn get_argument_values(
    schema: &ExecutorSchema,
    definitions: &IndexMap<String, InputValueDefinition>,
    arguments: &[(String, InputValue)],
    variables: &Variables,
    location: Location,
) -> Result<serde_json::Map<String, Value>, GraphqlError> {
    let argument_error =
        |message: String| GraphqlError::new(message, ErrorKind::ArgumentCoercion).with_location(location);

    let mut coerced = serde_json::Map::with_capacity(definitions.len());
    for (name, definition) in definitions {
        let type_name = schema.display_type(definition.ty);
        let node = arguments
            .iter()
            .find_map(|(argument, value)| (argument == name).then_some(value));

        let Some(node) = node else {
            if let Some(default_value) = &definition.default_value {
                if let Some(default_value) = value_from_const(schema, default_value, definition.ty) {
                    coerced.insert(name.clone(), default_value);
                }
            } else if schema.is_non_null_type(definition.ty) {
                return Err(argument_error(format!(
                    "Argument \"{name}\" of required type \"{type_name}\" was not provided."
                )));
            }
            continue;
        };

        let is_null = match node {
            InputValue::Variable(variable) => match variables.get(variable.as_str()) {
                Some(value) => value.is_null(),
                None => {
                    if let Some(default_value) = &definition.default_value {
                        if let Some(default_value) = value_from_const(schema, default_value, definition.ty) {
                            coerced.insert(name.clone(), default_value);
                        }
                    } else if schema.is_non_null_type(definition.ty) {
                        return Err(argument_error(format!(
                            "Argument \"{name}\" of required type \"{type_name}\" was provided the variable \"${variable}\" which was not provided a runtime value."
                        )));
                    }
                    continue;
                }
            },
            InputValue::Null => true,
            _ => false,
        };

        if is_null && schema.is_non_null_type(definition.ty) {
            return Err(argument_error(format!(
                "Argument \"{name}\" of non-null type \"{type_name}\" must not be null."
            )));
        }

        let Some(value) = value_from_ast(schema, node, definition.ty, Some(variables)) else {
            return Err(argument_error(format!("Argument \"{name}\" has invalid value {node}.")));
        };
        coerced.insert(name.clone(), value);
    }

    Ok(coerced)
}

/// Coerced arguments of the first directive named after `definition` on a node, if present.
pub fn get_directive_values(
    schema: &ExecutorSchema,
    definition: &DirectiveDefinition,
    directives: &[Directive],
    variables: &Variables,
) -> Result<Option<serde_json::Map<String, Value>>, GraphqlError> {
    directives
        .iter()
        .find(|directive| directive.name == definition.name)
        .map(|directive| {
            get_argument_values(
                schema,
                &definition.arguments,
                &directive.arguments,
                variables,
                directive.location,
            )
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::{
        document::{Document, Selection},
        schema::SchemaBuilder,
    };

    fn schema() -> ExecutorSchema {
        SchemaBuilder::from_sdl(
            r#"
            input Point { x: Int! y: Int }
            type Query { point(at: Point, limit: Int! = 10, id: ID!): Int }
            "#,
        )
        .build()
        .unwrap()
    }

    fn variables(value: Value) -> Variables {
        value.as_object().cloned().unwrap()
    }

    fn coerce_variables(query: &str, inputs: Value, max_errors: usize) -> Result<Variables, Vec<String>> {
        let schema = schema();
        let document = Document::parse(query).unwrap();
        let operation = document.select_operation(None).unwrap();
        get_variable_values(&schema, &operation.variable_definitions, &variables(inputs), max_errors)
            .map_err(|errors| errors.into_iter().map(|error| error.message.into_owned()).collect())
    }

    #[test]
    fn variables_are_coerced_with_defaults() {
        let coerced = coerce_variables(
            "query ($at: Point, $limit: Int = 5, $id: ID!) { point(at: $at, limit: $limit, id: $id) }",
            json!({"at": {"x": 1}, "id": 7}),
            50,
        );
        assert_eq!(coerced, Ok(variables(json!({"at": {"x": 1}, "limit": 5, "id": "7"}))));
    }

    #[test]
    fn variable_errors_are_reported_with_their_path() {
        let errors = coerce_variables(
            "query ($at: Point!, $id: ID!, $other: ID!, $bad: Query) { point(at: $at, id: $id) }",
            json!({"at": {"x": "one"}, "other": null}),
            50,
        );
        assert_eq!(
            errors,
            Err(vec![
                r#"Variable "$at" got invalid value "one" at "at.x"; Int cannot represent non-integer value: "one""#
                    .to_string(),
                r#"Variable "$id" of required type "ID!" was not provided."#.to_string(),
                r#"Variable "$other" of non-null type "ID!" must not be null."#.to_string(),
                r#"Variable "$bad" expected value of type "Query" which cannot be used as an input type."#.to_string(),
            ])
        );
    }

    #[test]
    fn variable_errors_are_capped() {
        let errors = coerce_variables(
            "query ($a: ID!, $b: ID!, $c: ID!) { point(id: $a) }",
            json!({}),
            2,
        )
        .unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(
            errors[2],
            "Too many errors processing variables, error limit reached. Execution aborted."
        );
    }

    #[test]
    fn argument_errors() {
        let schema = schema();
        let query = schema.named_type("Query").unwrap();
        let point = &schema[schema.field(query, "point").unwrap()];

        let arguments = |source: &str| {
            let document = Document::parse(source).unwrap();
            let operation = document.select_operation(None).unwrap();
            let Selection::Field(field) = document[operation.selection_set].items[0] else {
                unreachable!()
            };
            document[field].arguments.clone()
        };

        let values = get_argument_values(
            &schema,
            &point.arguments,
            &arguments("{ point(id: 1, at: {x: 2}) }"),
            &Variables::new(),
            Location::default(),
        );
        assert_eq!(values, Ok(variables(json!({"at": {"x": 2}, "limit": 10, "id": "1"}))));

        let message = |source: &str, variables: Value| {
            get_argument_values(
                &schema,
                &point.arguments,
                &arguments(source),
                &self::variables(variables),
                Location::default(),
            )
            .unwrap_err()
            .message
        };

        assert_eq!(
            message("{ point(limit: 1) }", json!({})),
            r#"Argument "id" of required type "ID!" was not provided."#
        );
        assert_eq!(
            message("query ($v: ID) { point(id: $v) }", json!({})),
            r#"Argument "id" of required type "ID!" was provided the variable "$v" which was not provided a runtime value."#
        );
        assert_eq!(
            message("query ($v: ID) { point(id: $v) }", json!({"v": null})),
            r#"Argument "id" of non-null type "ID!" must not be null."#
        );
        assert_eq!(
            message(r#"{ point(id: 1, at: "here") }"#, json!({})),
            r#"Argument "at" has invalid value "here"."#
        );
    }
}
