use serde_json::Value;

use crate::{
    document::{ConstValue, InputValue, Name},
    resolver::Variables,
    schema::{ExecutorSchema, TypeDefinition, TypeKind, TypeRefId},
};

/// Produces the internal value of a literal from the document against an input type.
///
/// `None` means the literal is invalid, including when it references a variable that has no
/// value. Invalidity is not further explained here, validation of the document gives better
/// messages.
pub fn value_from_ast(
    schema: &ExecutorSchema,
    node: &InputValue,
    ty: TypeRefId,
    variables: Option<&Variables>,
) -> Option<Value> {
    if let InputValue::Variable(name) = node {
        let value = variables?.get(name.as_str())?;
        if value.is_null() && schema.is_non_null_type(ty) {
            return None;
        }
        return Some(value.clone());
    }

    if schema.is_non_null_type(ty) {
        if matches!(node, InputValue::Null) {
            return None;
        }
        return value_from_ast(schema, node, schema.nullable_type(ty), variables);
    }

    if matches!(node, InputValue::Null) {
        return Some(Value::Null);
    }

    match schema.kind(ty) {
        TypeKind::List => {
            let item_type = schema.of_type(ty)?;
            let InputValue::List(items) = node else {
                return value_from_ast(schema, node, item_type, variables).map(|item| Value::Array(vec![item]));
            };

            items
                .iter()
                .map(|item| {
                    if is_missing_variable(item, variables) {
                        (!schema.is_non_null_type(item_type)).then_some(Value::Null)
                    } else {
                        value_from_ast(schema, item, item_type, variables)
                    }
                })
                .collect::<Option<Vec<_>>>()
                .map(Value::Array)
        }
        TypeKind::InputObject => {
            let TypeDefinition::InputObject(input_object) = &schema[schema.named_type_of(ty)] else {
                return None;
            };
            let InputValue::Object(fields) = node else {
                return None;
            };

            let mut coerced = serde_json::Map::with_capacity(input_object.fields.len());
            for (name, field) in &input_object.fields {
                match fields.get(name.as_str()) {
                    Some(value) if !is_missing_variable(value, variables) => {
                        coerced.insert(name.clone(), value_from_ast(schema, value, field.ty, variables)?);
                    }
                    _ => {
                        if let Some(default_value) = &field.default_value {
                            coerced.insert(name.clone(), value_from_const(schema, default_value, field.ty)?);
                        } else if schema.is_non_null_type(field.ty) {
                            return None;
                        }
                    }
                }
            }
            Some(Value::Object(coerced))
        }
        TypeKind::Scalar | TypeKind::Enum => {
            let literal = node
                .clone()
                .into_const_with(|name: Name| {
                    variables
                        .and_then(|variables| variables.get(name.as_str()))
                        .cloned()
                        .ok_or(())
                        .and_then(|value| ConstValue::from_json(value).map_err(|_| ()))
                })
                .ok()?;

            let parsed = match &schema[schema.named_type_of(ty)] {
                TypeDefinition::Scalar(scalar) => scalar.parse_literal(&literal),
                TypeDefinition::Enum(enum_type) => enum_type.parse_literal(&literal),
                _ => return None,
            };
            parsed.ok()
        }
        TypeKind::Object | TypeKind::Interface | TypeKind::Union | TypeKind::NonNull => None,
    }
}

/// Coerces a default value from the schema or a variable definition.
pub fn value_from_const(schema: &ExecutorSchema, value: &ConstValue, ty: TypeRefId) -> Option<Value> {
    value_from_ast(schema, &value.clone().into_value(), ty, None)
}

fn is_missing_variable(node: &InputValue, variables: Option<&Variables>) -> bool {
    match node {
        InputValue::Variable(name) => variables.map_or(true, |variables| !variables.contains_key(name.as_str())),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use async_graphql_parser::types::Type;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::schema::SchemaBuilder;

    fn schema() -> ExecutorSchema {
        SchemaBuilder::from_sdl(
            r#"
            enum Color { RED GREEN }
            input Point { x: Int! y: Int = 3 color: Color }
            type Query { draw(point: Point, points: [Point], ids: [ID!], color: Color!): Boolean }
            "#,
        )
        .build()
        .unwrap()
    }

    fn literal(source: &str) -> InputValue {
        let document = async_graphql_parser::parse_query(format!("{{ f(a: {source}) }}")).unwrap();
        let async_graphql_parser::types::DocumentOperations::Single(operation) = document.operations else {
            unreachable!()
        };
        let async_graphql_parser::types::Selection::Field(field) = &operation.node.selection_set.node.items[0].node
        else {
            unreachable!()
        };
        field.node.arguments[0].1.node.clone()
    }

    fn coerce(schema: &ExecutorSchema, source: &str, ty: &str, variables: Option<&Variables>) -> Option<Value> {
        let ty = schema.get_type(&Type::new(ty).unwrap()).unwrap();
        value_from_ast(schema, &literal(source), ty, variables)
    }

    #[test]
    fn input_object_literals() {
        let schema = schema();
        assert_eq!(
            coerce(&schema, "{x: 1, color: GREEN}", "Point", None),
            Some(json!({"x": 1, "y": 3, "color": "GREEN"}))
        );
        assert_eq!(coerce(&schema, "{y: 1}", "Point", None), None);
        assert_eq!(coerce(&schema, "{x: \"1\"}", "Point", None), None);
    }

    #[test]
    fn lists_accept_single_items() {
        let schema = schema();
        assert_eq!(coerce(&schema, "\"1\"", "[ID!]", None), Some(json!(["1"])));
        assert_eq!(coerce(&schema, "[1, \"2\"]", "[ID!]", None), Some(json!(["1", "2"])));
        assert_eq!(coerce(&schema, "[1, null]", "[ID!]", None), None);
    }

    #[test]
    fn variables_are_substituted() {
        let schema = schema();
        let variables = json!({"c": "RED", "n": null}).as_object().cloned().unwrap();
        assert_eq!(coerce(&schema, "$c", "Color!", Some(&variables)), Some(json!("RED")));
        assert_eq!(coerce(&schema, "$n", "Color!", Some(&variables)), None);
        assert_eq!(coerce(&schema, "$missing", "Color", Some(&variables)), None);
        assert_eq!(
            coerce(&schema, "[{x: 1, color: $missing}]", "[Point]", Some(&variables)),
            Some(json!([{"x": 1, "y": 3}]))
        );
        assert_eq!(coerce(&schema, "GREEN", "Color!", None), Some(json!("GREEN")));
        assert_eq!(coerce(&schema, "\"GREEN\"", "Color!", None), None);
    }
}
