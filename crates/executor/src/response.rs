use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, PoisonError,
};

use futures::stream::BoxStream;
use serde_json::Value;

use crate::error::{GraphqlError, PathSegment};

/// A single GraphQL response, or one incremental payload of a response stream.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphqlError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_indices: Option<Vec<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_next: Option<bool>,
}

impl Response {
    /// Response of a request that failed before execution started.
    pub fn from_errors(errors: impl IntoIterator<Item = GraphqlError>) -> Self {
        Response {
            errors: errors.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Payload closing a response stream without carrying any result.
    pub fn end_of_stream() -> Self {
        Response {
            has_next: Some(false),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

pub type ResponseStream = BoxStream<'static, Response>;

pub enum ExecutionOutcome {
    Single(Response),
    /// The initial response followed by incremental payloads, or one response per subscription event.
    Stream(ResponseStream),
}

impl ExecutionOutcome {
    pub fn is_stream(&self) -> bool {
        matches!(self, ExecutionOutcome::Stream(_))
    }

    pub fn into_single(self) -> Option<Response> {
        match self {
            ExecutionOutcome::Single(response) => Some(response),
            ExecutionOutcome::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> ResponseStream {
        use futures::StreamExt;

        match self {
            ExecutionOutcome::Single(response) => futures::stream::once(async move { response }).boxed(),
            ExecutionOutcome::Stream(stream) => stream,
        }
    }
}

impl std::fmt::Debug for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionOutcome::Single(response) => f.debug_tuple("Single").field(response).finish(),
            ExecutionOutcome::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ResponseNodeId(u64);

/// Error sink of one chunk of the response: the initial result, a deferred fragment or a streamed
/// item. Its id is what dependent chunks wait on before they are published.
#[derive(Debug)]
pub(crate) struct ResponseNode {
    id: ResponseNodeId,
    errors: Mutex<Vec<GraphqlError>>,
}

impl ResponseNode {
    pub fn new() -> Arc<Self> {
        Self::with_errors(Vec::new())
    }

    pub fn with_errors(errors: Vec<GraphqlError>) -> Arc<Self> {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);

        Arc::new(ResponseNode {
            id: ResponseNodeId(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
            errors: Mutex::new(errors),
        })
    }

    pub fn id(&self) -> ResponseNodeId {
        self.id
    }

    pub fn push_error(&self, error: GraphqlError) {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).push(error);
    }

    pub fn take_errors(&self) -> Vec<GraphqlError> {
        std::mem::take(&mut *self.errors.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// A chunk of data ready to be published once its parent chunk has been.
#[derive(Debug)]
pub(crate) struct IncrementalResult {
    pub nodes: Vec<Arc<ResponseNode>>,
    pub data: Value,
    pub path: Vec<PathSegment>,
    pub at_index: Option<usize>,
    pub at_indices: Option<Vec<usize>>,
    pub label: Option<String>,
}

impl IncrementalResult {
    pub fn keys(&self) -> Vec<ResponseNodeId> {
        self.nodes.iter().map(|node| node.id()).collect()
    }

    pub fn into_response(self, has_next: bool) -> Response {
        let errors = self.nodes.iter().flat_map(|node| node.take_errors()).collect();
        Response {
            errors,
            data: Some(self.data),
            path: Some(self.path),
            at_index: self.at_index,
            at_indices: self.at_indices,
            label: self.label,
            has_next: Some(has_next),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn incremental_payload_shape() {
        let node = ResponseNode::new();
        node.push_error(GraphqlError::from("late failure"));
        let result = IncrementalResult {
            nodes: vec![node.clone(), ResponseNode::new()],
            data: json!([1, 2]),
            path: vec!["items".into()],
            at_index: Some(3),
            at_indices: None,
            label: Some("rest".into()),
        };

        assert_eq!(
            serde_json::to_value(result.into_response(true)).unwrap(),
            json!({
                "errors": [{"message": "late failure"}],
                "data": [1, 2],
                "path": ["items"],
                "atIndex": 3,
                "label": "rest",
                "hasNext": true
            })
        );
        assert!(node.take_errors().is_empty());
    }

    #[test]
    fn null_data_is_kept_but_missing_data_is_omitted() {
        let response = Response {
            data: Some(Value::Null),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(response).unwrap(), json!({"data": null}));
        assert_eq!(
            serde_json::to_value(Response::end_of_stream()).unwrap(),
            json!({"hasNext": false})
        );
    }

    #[test]
    fn nodes_have_distinct_ids() {
        assert_ne!(ResponseNode::new().id(), ResponseNode::new().id());
    }
}
