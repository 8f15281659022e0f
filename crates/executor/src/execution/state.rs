use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::future::AbortHandle;

use crate::{
    publisher::PublisherHooks,
    response::{IncrementalResult, Response, ResponseNodeId},
};

/// Outstanding work of one execution that may still produce payloads.
#[derive(Debug, Default)]
pub(crate) struct ExecutionState {
    /// Deferred fragments and stream bundles created but not yet published.
    pub pending_pushes: usize,
    /// Streamed items being completed that no bundle accounted for yet.
    pub pending_stream_results: usize,
    /// The initial response was emitted and payloads now go through the publisher.
    pub streaming: bool,
    iterators: HashMap<u64, AbortHandle>,
    next_iterator: u64,
}

impl ExecutionState {
    pub fn has_next(&self) -> bool {
        self.pending_pushes > 0 || self.pending_stream_results > 0 || !self.iterators.is_empty()
    }

    pub fn register_iterator(&mut self, handle: AbortHandle) -> u64 {
        let id = self.next_iterator;
        self.next_iterator += 1;
        self.iterators.insert(id, handle);
        id
    }

    pub fn close_iterator(&mut self, id: u64) {
        self.iterators.remove(&id);
    }

    pub fn stream_result_started(&mut self) {
        self.pending_stream_results += 1;
    }

    /// A streamed item opened a new bundle, which is now a pending push.
    pub fn bundle_opened(&mut self) {
        self.pending_pushes += 1;
        self.pending_stream_results = self.pending_stream_results.saturating_sub(1);
    }

    pub fn bundle_appended(&mut self) {
        self.pending_stream_results = self.pending_stream_results.saturating_sub(1);
    }
}

pub(crate) type SharedState = Arc<Mutex<ExecutionState>>;

pub(crate) fn lock(state: &SharedState) -> MutexGuard<'_, ExecutionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ties the publisher of an execution to its [`ExecutionState`].
pub(crate) struct ResponseHooks {
    state: SharedState,
}

impl ResponseHooks {
    pub fn new(state: SharedState) -> Self {
        ResponseHooks { state }
    }
}

impl PublisherHooks for ResponseHooks {
    type Key = ResponseNodeId;
    type Source = IncrementalResult;
    type Payload = Response;

    fn on_ready(&self) {
        let mut state = lock(&self.state);
        state.pending_pushes = state.pending_pushes.saturating_sub(1);
    }

    fn has_next(&self) -> bool {
        lock(&self.state).has_next()
    }

    fn payload_from_source(&self, source: IncrementalResult, has_next: bool) -> Response {
        source.into_response(has_next)
    }

    fn on_stop(&self) {
        let iterators = std::mem::take(&mut lock(&self.state).iterators);
        if !iterators.is_empty() {
            tracing::debug!(count = iterators.len(), "closing streamed list sources");
        }
        for handle in iterators.into_values() {
            handle.abort();
        }
    }
}
