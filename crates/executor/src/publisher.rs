//! Ordered delivery of incremental payloads.
//!
//! Payloads become ready in any order, but one is never delivered before the payload it depends
//! on. A payload queued against a parent key that was not published yet waits in a per-parent
//! list and is released, in arrival order, as soon as the parent is emitted.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    hash::Hash,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::{stream::BoxStream, StreamExt};
use repeater::{Pusher, Repeater, RepeaterOverflowError};
use tokio::sync::Notify;

/// Execution specific behavior of a [`Publisher`]. Every hook is called while the publisher is
/// locked, so hooks must never call back into it.
pub(crate) trait PublisherHooks: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Send + 'static;
    type Source: Send + 'static;
    type Payload: Send + 'static;

    /// A queued source is about to be turned into a payload.
    fn on_ready(&self);

    fn has_next(&self) -> bool;

    fn payload_from_source(&self, source: Self::Source, has_next: bool) -> Self::Payload;

    /// The output sequence stopped, whether exhausted or dropped by its consumer.
    fn on_stop(&self);
}

pub(crate) struct Publisher<H: PublisherHooks> {
    hooks: Arc<H>,
    inner: Mutex<Inner<H>>,
    trigger: Notify,
}

struct Inner<H: PublisherHooks> {
    buffer: VecDeque<H::Payload>,
    pushed: HashSet<H::Key>,
    pending: HashMap<H::Key, Vec<(Vec<H::Key>, H::Source)>>,
    stopped: bool,
}

impl<H: PublisherHooks> Publisher<H> {
    pub fn new(hooks: H) -> Self {
        Publisher {
            hooks: Arc::new(hooks),
            inner: Mutex::new(Inner {
                buffer: VecDeque::new(),
                pushed: HashSet::new(),
                pending: HashMap::new(),
                stopped: false,
            }),
            trigger: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<H>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes `payload` right away and marks `keys` as published, releasing everything that
    /// waited on them.
    pub fn emit(&self, keys: Vec<H::Key>, payload: H::Payload) {
        self.emit_locked(&mut self.lock(), keys, payload);
        self.trigger.notify_one();
    }

    /// Publishes the payload computed from `source` once `parent` has been published.
    pub fn queue(&self, keys: Vec<H::Key>, source: H::Source, parent: H::Key) {
        let mut inner = self.lock();
        if inner.stopped {
            tracing::trace!("ignoring a payload queued after the publisher stopped");
            return;
        }

        if inner.pushed.contains(&parent) {
            self.push_one(&mut inner, keys, source);
            drop(inner);
            self.trigger.notify_one();
        } else {
            inner.pending.entry(parent).or_default().push((keys, source));
        }
    }

    /// Ends the output sequence once the already published payloads, and `final_payload` if any,
    /// have been delivered.
    pub fn stop(&self, final_payload: Option<H::Payload>) {
        self.stop_locked(&mut self.lock(), final_payload);
        self.trigger.notify_one();
    }

    /// The output sequence. There is a single consumer: call this once.
    pub fn subscribe(self: &Arc<Self>) -> BoxStream<'static, H::Payload> {
        let publisher = Arc::clone(self);
        let hooks = Arc::clone(&self.hooks);

        Repeater::<H::Payload, RepeaterOverflowError>::new(move |pusher, _stopper| publisher.drain(pusher))
            .on_stop(move || hooks.on_stop())
            .filter_map(|item| async move {
                match item {
                    Ok(payload) => Some(payload),
                    Err(error) => {
                        tracing::error!(%error, "publisher output sequence failed");
                        None
                    }
                }
            })
            .boxed()
    }

    async fn drain(
        self: Arc<Self>,
        pusher: Pusher<H::Payload, RepeaterOverflowError>,
    ) -> Result<(), RepeaterOverflowError> {
        loop {
            let next = {
                let mut inner = self.lock();
                match inner.buffer.pop_front() {
                    Some(payload) => Some(payload),
                    None if inner.stopped => return Ok(()),
                    None => None,
                }
            };

            match next {
                Some(payload) => pusher.push(payload)?.await,
                None => self.trigger.notified().await,
            }
        }
    }

    fn emit_locked(&self, inner: &mut Inner<H>, keys: Vec<H::Key>, payload: H::Payload) {
        if inner.stopped {
            tracing::trace!("ignoring a payload emitted after the publisher stopped");
            return;
        }

        inner.pushed.extend(keys.iter().cloned());
        inner.buffer.push_back(payload);

        for key in keys {
            if let Some(dependents) = inner.pending.remove(&key) {
                self.push_many(inner, dependents);
            }
        }
    }

    fn stop_locked(&self, inner: &mut Inner<H>, final_payload: Option<H::Payload>) {
        if inner.stopped {
            return;
        }
        tracing::debug!(remaining = inner.buffer.len(), "publisher stopped");
        inner.buffer.extend(final_payload);
        inner.stopped = true;
    }

    fn push_one(&self, inner: &mut Inner<H>, keys: Vec<H::Key>, source: H::Source) {
        if !self.push_ready(inner, keys, source) {
            self.stop_locked(inner, None);
        }
    }

    fn push_many(&self, inner: &mut Inner<H>, dependents: Vec<(Vec<H::Key>, H::Source)>) {
        let mut has_next = false;
        for (keys, source) in dependents {
            has_next = self.push_ready(inner, keys, source);
        }
        if !has_next {
            self.stop_locked(inner, None);
        }
    }

    fn push_ready(&self, inner: &mut Inner<H>, keys: Vec<H::Key>, source: H::Source) -> bool {
        self.hooks.on_ready();
        // Computed now rather than when queued: work that completed since may make this the last payload.
        let has_next = self.hooks.has_next();
        let payload = self.hooks.payload_from_source(source, has_next);
        self.emit_locked(inner, keys, payload);
        has_next
    }
}
