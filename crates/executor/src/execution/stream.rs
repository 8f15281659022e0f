//! Incremental delivery of `@stream` list items: each item past the initial count is completed in
//! the background and handed to a bundler, whose bundles become incremental payloads.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use futures::{
    future::{AbortHandle, Abortable},
    stream::BoxStream,
    StreamExt,
};
use serde_json::Value;

use super::{
    collect::StreamArguments,
    state::{self, ResponseHooks, SharedState},
    tasks::TaskSpawner,
    ExecutionContext, FieldContext,
};
use crate::{
    bundler::{Bundle, BundleSink, Bundler, IntervalTimer, SequentialBundler, StreamBundler},
    error::{GraphqlError, GraphqlResult, ResponsePath},
    publisher::Publisher,
    resolver::FieldValue,
    response::{IncrementalResult, Response, ResponseNode, ResponseNodeId},
    schema::TypeRefId,
};

/// A completed list item and the node collecting its errors.
pub(super) struct StreamItem {
    node: Arc<ResponseNode>,
    data: Value,
}

type BundlerCell = Mutex<Box<dyn StreamBundler<StreamItem, Arc<ResponseNode>>>>;

fn lock(bundler: &BundlerCell) -> MutexGuard<'_, Box<dyn StreamBundler<StreamItem, Arc<ResponseNode>>>> {
    bundler.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub(super) struct StreamContext {
    path: ResponsePath,
    bundler: Arc<BundlerCell>,
}

impl StreamContext {
    fn queue_data(&self, index: usize, node: Arc<ResponseNode>, data: Value) {
        lock(&self.bundler).queue_data(index, StreamItem { node, data });
    }

    fn queue_error(&self, index: usize, node: Arc<ResponseNode>) {
        lock(&self.bundler).queue_error(index, node);
    }

    pub fn set_total(&self, total: usize) {
        lock(&self.bundler).set_total(total);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadShape {
    /// One payload per item, located at the item itself.
    PerItem,
    /// Items in completion order, with their indices.
    Parallel,
    /// Consecutive items, located by the index of the first one.
    Sequential,
}

struct StreamSink {
    state: SharedState,
    publisher: Arc<Publisher<ResponseHooks>>,
    parent: ResponseNodeId,
    path: ResponsePath,
    label: Option<String>,
    shape: PayloadShape,
}

impl StreamSink {
    fn incremental_result(&self, bundle: Bundle<StreamItem, Arc<ResponseNode>>) -> IncrementalResult {
        let mut nodes = Vec::new();
        let mut indices = Vec::new();
        let data = match bundle {
            Bundle::Data(items) => {
                let mut data = Vec::with_capacity(items.len());
                for (index, item) in items {
                    indices.push(index);
                    nodes.push(item.node);
                    data.push(item.data);
                }
                Some(data)
            }
            Bundle::Errors(items) => {
                for (index, node) in items {
                    indices.push(index);
                    nodes.push(node);
                }
                None
            }
        };

        let first_index = indices.first().copied().unwrap_or_default();
        let (data, path, at_index, at_indices) = match self.shape {
            PayloadShape::PerItem => (
                data.and_then(|data| data.into_iter().next()).unwrap_or(Value::Null),
                self.path.child(first_index),
                None,
                None,
            ),
            PayloadShape::Parallel => (
                data.map_or(Value::Null, Value::Array),
                self.path.clone(),
                None,
                Some(indices),
            ),
            PayloadShape::Sequential => (
                data.map_or(Value::Null, Value::Array),
                self.path.clone(),
                Some(first_index),
                None,
            ),
        };

        IncrementalResult {
            nodes,
            data,
            path: path.to_vec(),
            at_index,
            at_indices,
            label: self.label.clone(),
        }
    }
}

impl BundleSink<StreamItem, Arc<ResponseNode>> for StreamSink {
    fn on_open(&mut self, _index: usize) {
        state::lock(&self.state).bundle_opened();
    }

    fn on_append(&mut self, _index: usize) {
        state::lock(&self.state).bundle_appended();
    }

    fn on_bundle(&mut self, bundle: Bundle<StreamItem, Arc<ResponseNode>>) {
        let result = self.incremental_result(bundle);
        self.publisher.queue(result.keys(), result, self.parent);
    }
}

/// Flushes the bundler from a background task once the interval elapsed.
struct TaskTimer {
    spawner: TaskSpawner,
    bundler: Weak<BundlerCell>,
    pending: Option<AbortHandle>,
}

impl IntervalTimer for TaskTimer {
    fn schedule(&mut self, delay: Duration) {
        self.cancel();
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!("no tokio runtime available, streamed items will not be flushed on interval");
            return;
        }

        let (handle, registration) = AbortHandle::new_pair();
        let bundler = self.bundler.clone();
        self.spawner.spawn(async move {
            if Abortable::new(tokio::time::sleep(delay), registration).await.is_err() {
                return;
            }
            if let Some(bundler) = bundler.upgrade() {
                lock(&bundler).flush_on_timer();
            }
        });
        self.pending = Some(handle);
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl ExecutionContext {
    pub(super) fn create_stream_context(
        &self,
        stream: &StreamArguments,
        path: &ResponsePath,
        parent: &ResponseNode,
    ) -> StreamContext {
        let shape = if stream.max_chunk_size == 1 {
            PayloadShape::PerItem
        } else if stream.in_parallel {
            PayloadShape::Parallel
        } else {
            PayloadShape::Sequential
        };
        tracing::trace!(?shape, initial_count = stream.initial_count, "streaming list items");

        let sink = StreamSink {
            state: self.state.clone(),
            publisher: self.publisher.clone(),
            parent: parent.id(),
            path: path.clone(),
            label: stream.label.clone(),
            shape,
        };

        let bundler = Arc::new_cyclic(|weak: &Weak<BundlerCell>| {
            let mut bundler = Bundler::new(stream.initial_count, stream.max_chunk_size, sink);
            if let Some(max_interval) = stream.max_interval {
                let timer = TaskTimer {
                    spawner: self.spawner.clone(),
                    bundler: weak.clone(),
                    pending: None,
                };
                bundler = bundler.with_interval(max_interval, Box::new(timer));
            }

            let bundler: Box<dyn StreamBundler<StreamItem, Arc<ResponseNode>>> = if stream.in_parallel {
                Box::new(bundler)
            } else {
                Box::new(SequentialBundler::new(stream.initial_count, bundler))
            };
            Mutex::new(bundler)
        });

        StreamContext {
            path: path.clone(),
            bundler,
        }
    }

    /// Completes a list item past the initial count in the background.
    pub(super) fn add_value(
        &self,
        stream_context: &StreamContext,
        field: &FieldContext,
        item_type: TypeRefId,
        index: usize,
        item: FieldValue,
    ) {
        state::lock(&self.state).stream_result_started();

        let ctx = self.clone();
        let stream_context = stream_context.clone();
        let field = field.clone();
        self.spawner.spawn(async move {
            let node = ResponseNode::new();
            let path = stream_context.path.child(index);
            let completed = ctx.complete_value(&field, item_type, path, item, &node).await;
            match completed {
                Ok(data) => stream_context.queue_data(index, node, data),
                Err(error) => ctx.handle_stream_error(&stream_context, &field, item_type, index, error, node),
            }
        });
    }

    /// An item that failed is published as an error when it can't be null, as a null otherwise.
    fn handle_stream_error(
        &self,
        stream_context: &StreamContext,
        field: &FieldContext,
        item_type: TypeRefId,
        index: usize,
        error: GraphqlError,
        node: Arc<ResponseNode>,
    ) {
        node.push_error(error.located(self.locations(field), &stream_context.path.child(index)));
        if self.schema().is_non_null_type(item_type) {
            stream_context.queue_error(index, node);
        } else {
            stream_context.queue_data(index, node, Value::Null);
        }
    }

    /// Keeps pulling an asynchronous list source in the background, starting at `index`. The pull
    /// is aborted when the response stream stops.
    pub(super) fn spawn_list_source(
        &self,
        stream_context: StreamContext,
        field: &FieldContext,
        item_type: TypeRefId,
        index: usize,
        source: BoxStream<'static, GraphqlResult<FieldValue>>,
    ) {
        let (handle, registration) = AbortHandle::new_pair();
        let id = state::lock(&self.state).register_iterator(handle);

        let ctx = self.clone();
        let field = field.clone();
        self.spawner.spawn(async move {
            let pull = ctx.pull_list_source(&stream_context, &field, item_type, index, source);
            if Abortable::new(pull, registration).await.is_err() {
                tracing::trace!("streamed list source closed before its end");
            }
            ctx.close_list_source(id);
        });
    }

    async fn pull_list_source(
        &self,
        stream_context: &StreamContext,
        field: &FieldContext,
        item_type: TypeRefId,
        mut index: usize,
        mut source: BoxStream<'static, GraphqlResult<FieldValue>>,
    ) {
        loop {
            match source.next().await {
                Some(Ok(item)) => {
                    self.add_value(stream_context, field, item_type, index, item);
                    index += 1;
                    // A source that is always ready would otherwise never give control back.
                    tokio::task::coop::consume_budget().await;
                }
                Some(Err(error)) => {
                    state::lock(&self.state).stream_result_started();
                    let error = error.from_source();
                    self.handle_stream_error(stream_context, field, item_type, index, error, ResponseNode::new());
                    stream_context.set_total(index + 1);
                    return;
                }
                None => {
                    stream_context.set_total(index);
                    return;
                }
            }
        }
    }

    fn close_list_source(&self, id: u64) {
        let finished = {
            let mut state = state::lock(&self.state);
            state.close_iterator(id);
            state.streaming && !state.has_next()
        };
        if finished {
            self.publisher.stop(Some(Response::end_of_stream()));
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::error::PathSegment;

    fn sink(shape: PayloadShape) -> StreamSink {
        let state = SharedState::default();
        StreamSink {
            publisher: Arc::new(Publisher::new(ResponseHooks::new(state.clone()))),
            state,
            parent: ResponseNode::new().id(),
            path: ResponsePath::root().child("items"),
            label: Some("more".into()),
            shape,
        }
    }

    fn item(data: Value) -> StreamItem {
        StreamItem {
            node: ResponseNode::new(),
            data,
        }
    }

    #[test]
    fn single_items_are_located_at_their_index() {
        let result = sink(PayloadShape::PerItem).incremental_result(Bundle::Data(vec![(3, item(json!("d")))]));

        assert_eq!(result.data, json!("d"));
        assert_eq!(result.path, vec![PathSegment::from("items"), PathSegment::Index(3)]);
        assert_eq!((result.at_index, result.at_indices), (None, None));
        assert_eq!(result.label.as_deref(), Some("more"));
    }

    #[test]
    fn parallel_bundles_list_their_indices() {
        let result = sink(PayloadShape::Parallel)
            .incremental_result(Bundle::Data(vec![(4, item(json!(4))), (2, item(json!(2)))]));

        assert_eq!(result.data, json!([4, 2]));
        assert_eq!(result.path, vec![PathSegment::from("items")]);
        assert_eq!(result.at_indices, Some(vec![4, 2]));
        assert_eq!(result.nodes.len(), 2);
    }

    #[test]
    fn error_bundles_have_no_data() {
        let node = ResponseNode::with_errors(vec![GraphqlError::from("boom")]);
        let result = sink(PayloadShape::Sequential).incremental_result(Bundle::Errors(vec![(5, node)]));

        assert_eq!(result.data, Value::Null);
        assert_eq!(result.at_index, Some(5));

        let response = result.into_response(false);
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.has_next, Some(false));
    }
}
