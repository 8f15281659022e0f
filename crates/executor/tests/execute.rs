use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use graphql_executor::{ExecuteSyncError, Executor, ExecutorConfig, FieldValue, Request, SchemaBuilder};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn delayed(millis: u64, value: Value) -> FieldValue {
    FieldValue::future(async move {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(FieldValue::Value(value))
    })
}

#[tokio::test(start_paused = true)]
async fn keys_follow_the_selection_order() {
    let schema = SchemaBuilder::from_sdl("type Query { a: String b: String c: String }")
        .resolver("Query", "a", |_| delayed(30, json!("a")))
        .resolver("Query", "b", |_| FieldValue::value("b"))
        .resolver("Query", "c", |_| delayed(10, json!("c")))
        .build()
        .unwrap();

    let response = Executor::new(schema)
        .execute("{ c a b }")
        .await
        .into_single()
        .unwrap();

    let data = response.data.unwrap();
    let keys: Vec<_> = data.as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys, ["c", "a", "b"]);
    assert_eq!(data, json!({"a": "a", "b": "b", "c": "c"}));
}

#[tokio::test]
async fn null_propagates_to_the_closest_nullable_parent() {
    let schema = SchemaBuilder::from_sdl(
        r"
        type Query { outer: Outer }
        type Outer { inner: Inner! other: String }
        type Inner { value: String! }
        ",
    )
    .build()
    .unwrap();

    let request = Request::new("{ outer { inner { value } other } }")
        .root_value(json!({"outer": {"inner": {"value": null}, "other": "kept"}}));
    let response = Executor::new(schema).execute(request).await.into_single().unwrap();

    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({
            "errors": [{
                "message": "Cannot return null for non-nullable field Inner.value.",
                "locations": [{"line": 1, "column": 19}],
                "path": ["outer", "inner", "value"]
            }],
            "data": {"outer": null}
        })
    );
}

#[tokio::test]
async fn resolver_errors_are_located_once() {
    let schema = SchemaBuilder::from_sdl("type Query { list: [String] }")
        .resolver("Query", "list", |_| {
            FieldValue::list([FieldValue::value("a"), FieldValue::error("broken"), FieldValue::value("c")])
        })
        .build()
        .unwrap();

    let response = Executor::new(schema).execute("{ list }").await.into_single().unwrap();

    assert_eq!(response.data, Some(json!({"list": ["a", null, "c"]})));
    assert_eq!(
        serde_json::to_value(&response.errors).unwrap(),
        json!([{"message": "broken", "locations": [{"line": 1, "column": 3}], "path": ["list", 1]}])
    );
}

#[tokio::test(start_paused = true)]
async fn mutation_fields_run_one_after_the_other() {
    let calls = Arc::new(Mutex::new(Vec::new()));

    let first_calls = calls.clone();
    let second_calls = calls.clone();
    let schema = SchemaBuilder::from_sdl("type Query { noop: String } type Mutation { first: String second: String }")
        .resolver("Mutation", "first", move |_| {
            let calls = first_calls.clone();
            FieldValue::future(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                calls.lock().unwrap().push("first");
                Ok(FieldValue::value("first"))
            })
        })
        .resolver("Mutation", "second", move |_| {
            second_calls.lock().unwrap().push("second");
            FieldValue::value("second")
        })
        .build()
        .unwrap();

    let response = Executor::new(schema)
        .execute("mutation { first second }")
        .await
        .into_single()
        .unwrap();

    assert_eq!(response.data, Some(json!({"first": "first", "second": "second"})));
    assert_eq!(*calls.lock().unwrap(), ["first", "second"]);
}

#[tokio::test]
async fn skip_wins_over_include() {
    let schema = SchemaBuilder::from_sdl("type Query { a: String b: String c: String }")
        .build()
        .unwrap();

    let request = Request::new("{ a @skip(if: true) @include(if: true) b @include(if: false) c @skip(if: false) }")
        .root_value(json!({"a": "a", "b": "b", "c": "c"}));
    let response = Executor::new(schema).execute(request).await.into_single().unwrap();

    assert_eq!(response.data, Some(json!({"c": "c"})));
}

#[tokio::test]
async fn variable_errors_prevent_execution() {
    let schema = SchemaBuilder::from_sdl("type Query { echo(n: Int!): Int }")
        .resolver("Query", "echo", |ctx| FieldValue::Value(ctx.arg("n").cloned().unwrap_or_default()))
        .build()
        .unwrap();
    let executor = Executor::new(schema);

    let response = executor
        .execute("query ($n: Int!) { echo(n: $n) }")
        .await
        .into_single()
        .unwrap();
    assert_eq!(response.data, None);
    assert_eq!(
        response.errors[0].message,
        "Variable \"$n\" of required type \"Int!\" was not provided."
    );

    let request = Request::new("query ($n: Int!) { echo(n: $n) }").variables(json!({"n": 4}));
    let response = executor.execute(request).await.into_single().unwrap();
    assert_eq!(response.data, Some(json!({"echo": 4})));
}

#[tokio::test]
async fn abstract_types_resolve_through_typename() {
    let schema = SchemaBuilder::from_sdl(
        r"
        type Query { pets: [Pet] }
        interface Pet { name: String }
        type Dog implements Pet { name: String barks: Boolean }
        type Cat implements Pet { name: String }
        ",
    )
    .build()
    .unwrap();

    let request = Request::new("{ pets { __typename name ... on Dog { barks } } }").root_value(json!({
        "pets": [
            {"__typename": "Dog", "name": "Rex", "barks": true},
            {"__typename": "Cat", "name": "Tom"},
            {"__typename": "Fish", "name": "Nemo"}
        ]
    }));
    let response = Executor::new(schema).execute(request).await.into_single().unwrap();

    assert_eq!(
        response.data,
        Some(json!({
            "pets": [
                {"__typename": "Dog", "name": "Rex", "barks": true},
                {"__typename": "Cat", "name": "Tom"},
                null
            ]
        }))
    );
    assert_eq!(
        response.errors[0].message,
        "Abstract type \"Pet\" was resolved to a type \"Fish\" that does not exist inside the schema."
    );
}

#[test]
fn execute_sync_completes_synchronous_operations() {
    let schema = SchemaBuilder::from_sdl("type Query { hello: String }")
        .resolver("Query", "hello", |_| FieldValue::value("world"))
        .build()
        .unwrap();

    let response = Executor::new(schema).execute_sync("{ hello }").unwrap();
    assert_eq!(response.data, Some(json!({"hello": "world"})));
}

#[test]
fn execute_sync_rejects_asynchronous_resolvers() {
    let schema = SchemaBuilder::from_sdl("type Query { hello: String }")
        .resolver("Query", "hello", |_| {
            FieldValue::future(futures::future::ready(Ok(FieldValue::value("world"))))
        })
        .build()
        .unwrap();

    let result = Executor::new(schema).execute_sync("{ hello }");
    assert!(matches!(result, Err(ExecuteSyncError::NotSynchronous)));
}

#[test]
fn missing_root_types_are_reported() {
    let schema = SchemaBuilder::from_sdl("type Query { hello: String }").build().unwrap();

    let response = Executor::new(schema).execute_sync("mutation { hello }").unwrap();
    assert_eq!(response.data, Some(Value::Null));
    assert_eq!(
        response.errors[0].message,
        "Schema is not configured to execute mutation operation."
    );
}

#[test]
fn configuration_can_be_overridden_per_request() {
    let schema = SchemaBuilder::from_sdl("type Query { hello: String }").build().unwrap();
    let config = ExecutorConfig::from_toml("enable_incremental = false").unwrap();
    let executor = Executor::with_config(schema, config);

    let request = Request::new("{ ... @defer { hello } }").root_value(json!({"hello": "world"}));
    let response = executor.execute_sync(request).unwrap();
    assert_eq!(response.data, Some(json!({"hello": "world"})));
    assert_eq!(response.has_next, None);

    let request = Request::new("{ ... @defer { hello } }")
        .root_value(json!({"hello": "world"}))
        .enable_incremental(true);
    assert!(executor.execute_sync(request).is_err());
}
