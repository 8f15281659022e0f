use futures::{stream, StreamExt};
use graphql_executor::{ExecutionOutcome, Executor, ExecutorSchema, FieldValue, GraphqlError, SchemaBuilder};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn schema() -> ExecutorSchema {
    SchemaBuilder::from_sdl(
        r"
        type Query { noop: String }
        type Subscription { counter: Int, greeting: String, tick: Tick }
        type Tick { n: Int, items: [Int] }
        ",
    )
    .subscriber("Subscription", "counter", |_| {
        FieldValue::stream(stream::iter(
            (1..=3).map(|n| Ok::<_, GraphqlError>(FieldValue::value(json!({"counter": n})))),
        ))
    })
    .subscriber("Subscription", "greeting", |_| FieldValue::value("hello"))
    .subscriber("Subscription", "tick", |_| {
        FieldValue::stream(stream::iter((1..=2).map(|n| {
            Ok::<_, GraphqlError>(FieldValue::value(json!({"tick": {"n": n, "items": [n, n * 10]}})))
        })))
    })
    .build()
    .unwrap()
}

#[tokio::test]
async fn every_event_is_executed_with_the_query_algorithm() {
    let outcome = Executor::new(schema()).execute("subscription { counter }").await;
    let ExecutionOutcome::Stream(responses) = outcome else {
        unreachable!("subscriptions produce a response stream");
    };

    let payloads: Vec<Value> = responses
        .map(|response| serde_json::to_value(response).unwrap())
        .collect()
        .await;
    assert_eq!(
        payloads,
        vec![
            json!({"data": {"counter": 1}}),
            json!({"data": {"counter": 2}}),
            json!({"data": {"counter": 3}}),
        ]
    );
}

#[tokio::test]
async fn incremental_payloads_of_each_event_are_delivered_in_order() {
    let outcome = Executor::new(schema())
        .execute("subscription { tick { n items @stream(initialCount: 1) } }")
        .await;

    let payloads: Vec<Value> = outcome
        .into_stream()
        .map(|response| serde_json::to_value(response).unwrap())
        .collect()
        .await;
    insta::assert_json_snapshot!(payloads, @r###"
    [
      {
        "data": {
          "tick": {
            "n": 1,
            "items": [
              1
            ]
          }
        },
        "hasNext": true
      },
      {
        "data": 10,
        "path": [
          "tick",
          "items",
          1
        ],
        "hasNext": false
      },
      {
        "data": {
          "tick": {
            "n": 2,
            "items": [
              2
            ]
          }
        },
        "hasNext": true
      },
      {
        "data": 20,
        "path": [
          "tick",
          "items",
          1
        ],
        "hasNext": false
      }
    ]
    "###);
}

#[tokio::test]
async fn subscribers_must_return_a_stream() {
    let response = Executor::new(schema())
        .execute("subscription { greeting }")
        .await
        .into_single()
        .unwrap();

    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({
            "errors": [{
                "message": "Subscription field must return Async Iterable. Received: \"hello\".",
                "locations": [{"line": 1, "column": 16}],
                "path": ["greeting"]
            }]
        })
    );
}

#[tokio::test]
async fn undefined_subscription_fields_are_reported() {
    let response = Executor::new(schema())
        .execute("subscription { missing }")
        .await
        .into_single()
        .unwrap();

    assert_eq!(response.data, None);
    assert_eq!(response.errors[0].message, "The subscription field \"missing\" is not defined.");
}

#[tokio::test]
async fn source_event_streams_are_available_directly() {
    let source = Executor::new(schema())
        .create_source_event_stream("subscription { counter }")
        .await
        .unwrap();

    let events: Vec<_> = source.map(|event| format!("{:?}", event.unwrap())).collect().await;
    assert_eq!(events, [r#"{"counter":1}"#, r#"{"counter":2}"#, r#"{"counter":3}"#]);
}
