//! A push-based stream whose producer is an async function driven by the consumer.
//!
//! The producer receives a [`Pusher`] and a [`Stopper`]. Every push returns a future resolving
//! once the consumer pulled the value (or once a [`Buffer`] absorbed it). The stream ends after the
//! producer stops it, either explicitly or by returning, and all values pushed before that point
//! have been drained. A producer error is yielded once, after those remaining values.
//!
//! The producer future is polled from within [`Stream::poll_next`], so a repeater needs no runtime
//! of its own and dropping it cancels the producer.

mod buffer;
mod combinators;

use std::{
    collections::VecDeque,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll, Waker},
};

use futures::{channel::oneshot, future::BoxFuture, FutureExt, Stream};

pub use buffer::Buffer;
pub use combinators::{flatten, map, Nested};

/// Maximum number of pushes that may wait for the consumer at the same time.
pub const MAX_QUEUE_LENGTH: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("No more than {MAX_QUEUE_LENGTH} pending calls to push are allowed on a single repeater.")]
pub struct RepeaterOverflowError;

type Producer<T, E> = Box<dyn FnOnce(Pusher<T, E>, Stopper<T, E>) -> BoxFuture<'static, Result<(), E>> + Send>;

enum ProducerState<T, E> {
    Initial(Producer<T, E>),
    Running(BoxFuture<'static, Result<(), E>>),
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Stopped,
    Done,
}

struct PendingPush<T> {
    value: T,
    consumed: Option<oneshot::Sender<()>>,
}

impl<T> PendingPush<T> {
    fn release(&mut self) {
        if let Some(sender) = self.consumed.take() {
            sender.send(()).ok();
        }
    }
}

struct State<T, E> {
    phase: Phase,
    buffer: Buffer<T>,
    pushes: VecDeque<PendingPush<T>>,
    error: Option<E>,
    consumer: Option<Waker>,
    stop_listeners: Vec<Waker>,
    on_stop: Option<Box<dyn FnOnce() + Send>>,
}

impl<T, E> State<T, E> {
    fn wake_consumer(&mut self) {
        if let Some(waker) = self.consumer.take() {
            waker.wake();
        }
    }

    fn next_value(&mut self) -> Option<T> {
        if let Some(value) = self.buffer.remove() {
            while self.buffer.accepts() {
                let Some(mut push) = self.pushes.pop_front() else {
                    break;
                };
                push.release();
                self.buffer.add(push.value);
            }
            return Some(value);
        }

        let mut push = self.pushes.pop_front()?;
        push.release();
        Some(push.value)
    }
}

struct Shared<T, E> {
    state: Mutex<State<T, E>>,
}

impl<T, E> Shared<T, E> {
    fn lock(&self) -> MutexGuard<'_, State<T, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop(&self, error: Option<E>) {
        let hook = {
            let mut state = self.lock();
            if state.phase != Phase::Running {
                return;
            }
            state.phase = Phase::Stopped;
            if state.error.is_none() {
                state.error = error;
            }
            for push in &mut state.pushes {
                push.release();
            }
            state.wake_consumer();
            for waker in std::mem::take(&mut state.stop_listeners) {
                waker.wake();
            }
            state.on_stop.take()
        };

        if let Some(hook) = hook {
            hook();
        }
    }
}

/// A stream of `Result<T, E>` fed by a producer future.
pub struct Repeater<T, E> {
    shared: Arc<Shared<T, E>>,
    producer: ProducerState<T, E>,
}

impl<T, E> Repeater<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(Pusher<T, E>, Stopper<T, E>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        Self::with_buffer(Buffer::default(), producer)
    }

    pub fn with_buffer<F, Fut>(buffer: Buffer<T>, producer: F) -> Self
    where
        F: FnOnce(Pusher<T, E>, Stopper<T, E>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                phase: Phase::Running,
                buffer,
                pushes: VecDeque::new(),
                error: None,
                consumer: None,
                stop_listeners: Vec::new(),
                on_stop: None,
            }),
        });

        Self {
            shared,
            producer: ProducerState::Initial(Box::new(move |pusher, stopper| producer(pusher, stopper).boxed())),
        }
    }

    /// Registers a hook run exactly once, when the repeater stops for whatever reason.
    #[must_use]
    pub fn on_stop(self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.shared.lock().on_stop = Some(Box::new(hook));
        self
    }
}

impl<T, E> Repeater<T, E> {
    /// Stops the repeater from the consumer side, discarding anything not yet pulled.
    pub fn close(&mut self) {
        self.shared.stop(None);
        self.producer = ProducerState::Finished;

        let mut state = self.shared.lock();
        state.phase = Phase::Done;
        state.error = None;
        state.buffer.clear();
        state.pushes.clear();
    }

    /// Raises an error into the sequence. It is yielded after the values already pushed.
    pub fn throw(&mut self, error: E) {
        self.shared.stop(Some(error));
    }

    fn drive_producer(&mut self, cx: &mut Context<'_>) {
        if matches!(self.producer, ProducerState::Initial(_)) {
            if let ProducerState::Initial(producer) = std::mem::replace(&mut self.producer, ProducerState::Finished) {
                let pusher = Pusher {
                    shared: self.shared.clone(),
                };
                let stopper = Stopper {
                    shared: self.shared.clone(),
                };
                self.producer = ProducerState::Running(producer(pusher, stopper));
            }
        }

        if let ProducerState::Running(future) = &mut self.producer {
            if let Poll::Ready(result) = future.poll_unpin(cx) {
                self.producer = ProducerState::Finished;
                self.shared.stop(result.err());
            }
        }
    }
}

impl<T, E> Stream for Repeater<T, E> {
    type Item = Result<T, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.shared.lock().phase == Phase::Done {
            return Poll::Ready(None);
        }

        this.drive_producer(cx);

        let mut state = this.shared.lock();
        if let Some(value) = state.next_value() {
            return Poll::Ready(Some(Ok(value)));
        }

        match state.phase {
            Phase::Running => {
                state.consumer = Some(cx.waker().clone());
                Poll::Pending
            }
            Phase::Stopped => {
                state.phase = Phase::Done;
                Poll::Ready(state.error.take().map(Err))
            }
            Phase::Done => Poll::Ready(None),
        }
    }
}

impl<T, E> Drop for Repeater<T, E> {
    fn drop(&mut self) {
        self.shared.stop(None);
    }
}

/// Producer handle pushing values to the consumer.
pub struct Pusher<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Pusher<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T, E> Pusher<T, E> {
    /// Pushes a value. Once the repeater stopped, values are dropped and the push resolves at once.
    pub fn push(&self, value: T) -> Result<Push, RepeaterOverflowError> {
        let mut state = self.shared.lock();
        if state.phase != Phase::Running {
            return Ok(Push::ready());
        }

        if state.pushes.is_empty() && state.buffer.accepts() {
            state.buffer.add(value);
            state.wake_consumer();
            return Ok(Push::ready());
        }

        if state.pushes.len() >= MAX_QUEUE_LENGTH {
            tracing::error!("repeater overflow with {} pending pushes", state.pushes.len());
            return Err(RepeaterOverflowError);
        }

        let (sender, receiver) = oneshot::channel();
        state.pushes.push_back(PendingPush {
            value,
            consumed: Some(sender),
        });
        state.wake_consumer();

        Ok(Push {
            receiver: Some(receiver),
        })
    }
}

/// Resolves once the pushed value was pulled, absorbed by the buffer, or the repeater stopped.
#[must_use = "a push completes only when awaited"]
pub struct Push {
    receiver: Option<oneshot::Receiver<()>>,
}

impl Push {
    fn ready() -> Self {
        Self { receiver: None }
    }
}

impl Future for Push {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match self.receiver.as_mut() {
            None => Poll::Ready(()),
            Some(receiver) => receiver.poll_unpin(cx).map(|_| ()),
        }
    }
}

/// Producer handle observing and triggering the end of the stream.
pub struct Stopper<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Stopper<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T, E> Stopper<T, E> {
    pub fn stop(&self) {
        self.shared.stop(None);
    }

    pub fn stop_with_error(&self, error: E) {
        self.shared.stop(Some(error));
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.lock().phase != Phase::Running
    }

    pub fn stopped(&self) -> Stopped<T, E> {
        Stopped {
            shared: self.shared.clone(),
        }
    }
}

pub struct Stopped<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Future for Stopped<T, E> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.shared.lock();
        if state.phase != Phase::Running {
            return Poll::Ready(());
        }
        if !state.stop_listeners.iter().any(|waker| waker.will_wake(cx.waker())) {
            state.stop_listeners.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use std::{
        num::NonZeroUsize,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use futures::StreamExt;
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Debug, PartialEq, thiserror::Error)]
    enum TestError {
        #[error(transparent)]
        Overflow(#[from] RepeaterOverflowError),
        #[error("{0}")]
        Failed(&'static str),
    }

    #[tokio::test]
    async fn values_are_delivered_in_push_order() {
        let repeater = Repeater::<u32, TestError>::new(|pusher, _| async move {
            for value in 0..3 {
                pusher.push(value)?.await;
            }
            Ok(())
        });

        let values: Vec<_> = repeater.collect().await;
        assert_eq!(values, vec![Ok(0), Ok(1), Ok(2)]);
    }

    #[tokio::test]
    async fn error_surfaces_after_pending_values() {
        let repeater = Repeater::<u32, TestError>::new(|pusher, _| async move {
            let _first = pusher.push(1)?;
            let _second = pusher.push(2)?;
            Err(TestError::Failed("boom"))
        });

        let values: Vec<_> = repeater.collect().await;
        assert_eq!(values, vec![Ok(1), Ok(2), Err(TestError::Failed("boom"))]);
    }

    #[tokio::test]
    async fn pushing_beyond_the_queue_limit_overflows() {
        let repeater = Repeater::<usize, TestError>::new(|pusher, _| async move {
            let mut pending = Vec::new();
            for value in 0..=MAX_QUEUE_LENGTH {
                pending.push(pusher.push(value)?);
            }
            Ok(())
        });

        let values: Vec<_> = repeater.collect().await;
        assert_eq!(values.len(), MAX_QUEUE_LENGTH + 1);
        assert!(values[..MAX_QUEUE_LENGTH].iter().all(Result::is_ok));
        assert_eq!(values.last(), Some(&Err(TestError::Overflow(RepeaterOverflowError))));
    }

    #[tokio::test]
    async fn pushes_after_stop_are_ignored() {
        let repeater = Repeater::<u32, TestError>::new(|pusher, stopper| async move {
            pusher.push(1)?.await;
            stopper.stop();
            pusher.push(2)?.await;
            stopper.stopped().await;
            Ok(())
        });

        let values: Vec<_> = repeater.collect().await;
        assert_eq!(values, vec![Ok(1)]);
    }

    #[tokio::test]
    async fn sliding_buffer_keeps_the_latest_pushes() {
        let repeater = Repeater::<u32, TestError>::with_buffer(
            Buffer::sliding(NonZeroUsize::new(2).unwrap()),
            |pusher, _| async move {
                for value in 1..=5 {
                    pusher.push(value)?.await;
                }
                Ok(())
            },
        );

        let values: Vec<_> = repeater.collect().await;
        assert_eq!(values, vec![Ok(4), Ok(5)]);
    }

    #[tokio::test]
    async fn stop_hook_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut repeater = Repeater::<u32, TestError>::new(|pusher, stopper| async move {
            pusher.push(1)?.await;
            stopper.stopped().await;
            Ok(())
        })
        .on_stop(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(repeater.next().await, Some(Ok(1)));
        repeater.close();
        assert_eq!(repeater.next().await, None);
        drop(repeater);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn thrown_error_is_yielded_after_buffered_values() {
        let mut repeater = Repeater::<u32, TestError>::with_buffer(Buffer::fixed(4), |pusher, stopper| async move {
            pusher.push(1)?.await;
            pusher.push(2)?.await;
            stopper.stopped().await;
            Ok(())
        });

        assert_eq!(repeater.next().await, Some(Ok(1)));
        repeater.throw(TestError::Failed("thrown"));
        assert_eq!(repeater.next().await, Some(Ok(2)));
        assert_eq!(repeater.next().await, Some(Err(TestError::Failed("thrown"))));
        assert_eq!(repeater.next().await, None);
    }
}
