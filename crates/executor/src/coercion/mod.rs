//! Coercion of input values (variables, arguments, directive arguments) against input types.

mod literal;
mod values;

use serde_json::Value;

pub use literal::{value_from_ast, value_from_const};
pub use values::{get_argument_values, get_directive_values, get_variable_values};

use crate::{
    error::PathSegment,
    schema::{inspect, ExecutorSchema, TypeDefinition, TypeKind, TypeRefId},
};

/// Coerces an external input value, typically a variable, against an input type.
///
/// Every problem is reported through `on_error` with the path inside `input` and the offending
/// value; the function keeps going so that all errors are collected. `None` means the value is
/// invalid.
pub fn coerce_input_value(
    schema: &ExecutorSchema,
    input: &Value,
    ty: TypeRefId,
    on_error: &mut dyn FnMut(&[PathSegment], &Value, String),
) -> Option<Value> {
    let mut path = Vec::new();
    coerce(schema, input, ty, on_error, &mut path)
}

fn coerce(
    schema: &ExecutorSchema,
    input: &Value,
    ty: TypeRefId,
    on_error: &mut dyn FnMut(&[PathSegment], &Value, String),
    path: &mut Vec<PathSegment>,
) -> Option<Value> {
    if schema.kind(ty) == TypeKind::NonNull {
        if input.is_null() {
            on_error(
                path,
                input,
                format!(
                    "Expected non-nullable type \"{}\" not to be null.",
                    schema.display_type(ty)
                ),
            );
            return None;
        }
        return coerce(schema, input, schema.nullable_type(ty), on_error, path);
    }

    if input.is_null() {
        return Some(Value::Null);
    }

    match schema.kind(ty) {
        TypeKind::List => {
            let item_type = schema.of_type(ty)?;
            let Value::Array(items) = input else {
                // A single item is coerced to a list of one.
                return coerce(schema, input, item_type, on_error, path).map(|item| Value::Array(vec![item]));
            };

            let mut coerced = Vec::with_capacity(items.len());
            let mut valid = true;
            for (index, item) in items.iter().enumerate() {
                path.push(PathSegment::Index(index));
                match coerce(schema, item, item_type, on_error, path) {
                    Some(item) => coerced.push(item),
                    None => valid = false,
                }
                path.pop();
            }
            valid.then_some(Value::Array(coerced))
        }
        TypeKind::InputObject => {
            let named = schema.named_type_of(ty);
            let TypeDefinition::InputObject(input_object) = &schema[named] else {
                return None;
            };
            let Value::Object(fields) = input else {
                on_error(
                    path,
                    input,
                    format!("Expected type \"{}\" to be an object.", input_object.name),
                );
                return None;
            };

            let mut coerced = serde_json::Map::with_capacity(input_object.fields.len());
            let mut valid = true;
            for (name, field) in &input_object.fields {
                let Some(value) = fields.get(name) else {
                    if let Some(default_value) = &field.default_value {
                        match value_from_const(schema, default_value, field.ty) {
                            Some(default_value) => {
                                coerced.insert(name.clone(), default_value);
                            }
                            None => valid = false,
                        }
                    } else if schema.is_non_null_type(field.ty) {
                        on_error(
                            path,
                            input,
                            format!(
                                "Field \"{name}\" of required type \"{}\" was not provided.",
                                schema.display_type(field.ty)
                            ),
                        );
                        valid = false;
                    }
                    continue;
                };

                path.push(PathSegment::Field(name.clone()));
                match coerce(schema, value, field.ty, on_error, path) {
                    Some(value) => {
                        coerced.insert(name.clone(), value);
                    }
                    None => valid = false,
                }
                path.pop();
            }

            for name in fields.keys() {
                if !input_object.fields.contains_key(name) {
                    on_error(
                        path,
                        input,
                        format!("Field \"{name}\" is not defined by type \"{}\".", input_object.name),
                    );
                    valid = false;
                }
            }

            valid.then_some(Value::Object(coerced))
        }
        TypeKind::Scalar | TypeKind::Enum => {
            let named = schema.named_type_of(ty);
            let parsed = match &schema[named] {
                TypeDefinition::Scalar(scalar) => scalar.parse_value(input),
                TypeDefinition::Enum(enum_type) => enum_type.parse_value(input),
                _ => return None,
            };
            match parsed {
                Ok(Value::Null) => {
                    on_error(
                        path,
                        input,
                        format!("Expected type \"{}\".", schema[named].name()),
                    );
                    None
                }
                Ok(value) => Some(value),
                Err(message) => {
                    on_error(path, input, message);
                    None
                }
            }
        }
        TypeKind::Object | TypeKind::Interface | TypeKind::Union | TypeKind::NonNull => {
            on_error(
                path,
                input,
                format!(
                    "Type \"{}\" cannot be used as an input type, got {}.",
                    schema.display_type(ty),
                    inspect(input)
                ),
            );
            None
        }
    }
}

/// Renders a path inside a value the way it is written in JavaScript: `.field[0].other`.
pub(crate) fn print_path(path: &[PathSegment]) -> String {
    path.iter()
        .map(|segment| match segment {
            PathSegment::Field(name) => format!(".{name}"),
            PathSegment::Index(index) => format!("[{index}]"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::schema::SchemaBuilder;

    fn schema() -> ExecutorSchema {
        SchemaBuilder::from_sdl(
            r#"
            enum Color { RED GREEN }
            input Point { x: Int! y: Int = 0 color: Color }
            type Query { draw(points: [Point!]!, tags: [String]): Boolean }
            "#,
        )
        .build()
        .unwrap()
    }

    fn coerce_with_errors(schema: &ExecutorSchema, input: Value, ty: &str) -> (Option<Value>, Vec<String>) {
        let ty = schema
            .get_type(&async_graphql_parser::types::Type::new(ty).unwrap())
            .unwrap();
        let mut errors = Vec::new();
        let value = coerce_input_value(schema, &input, ty, &mut |path, _, message| {
            errors.push(format!("{}: {message}", print_path(path)));
        });
        (value, errors)
    }

    #[test]
    fn input_objects_get_defaults_and_enum_values() {
        let schema = schema();
        let (value, errors) = coerce_with_errors(&schema, json!([{"x": 1, "color": "RED"}]), "[Point!]!");
        assert_eq!(errors, Vec::<String>::new());
        assert_eq!(value, Some(json!([{"x": 1, "y": 0, "color": "RED"}])));
    }

    #[test]
    fn every_error_is_collected_with_its_path() {
        let schema = schema();
        let (value, errors) = coerce_with_errors(
            &schema,
            json!([{"y": "one"}, {"x": 2, "z": true}, null]),
            "[Point!]!",
        );
        assert_eq!(value, None);
        assert_eq!(
            errors,
            vec![
                r#"[0]: Field "x" of required type "Int!" was not provided."#,
                r#"[0].y: Int cannot represent non-integer value: "one""#,
                r#"[1]: Field "z" is not defined by type "Point"."#,
                r#"[2]: Expected non-nullable type "Point!" not to be null."#,
            ]
        );
    }

    #[test]
    fn single_values_are_wrapped_into_lists() {
        let schema = schema();
        let (value, errors) = coerce_with_errors(&schema, json!("solo"), "[String]");
        assert!(errors.is_empty());
        assert_eq!(value, Some(json!(["solo"])));
    }
}
