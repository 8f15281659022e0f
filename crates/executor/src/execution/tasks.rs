//! Background work of an execution: deferred fragments, streamed items, list sources and interval
//! timers. Nothing is spawned on a runtime. The work is polled alongside the initial result, then by
//! the response stream, and dropping that stream drops it.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{
    channel::mpsc,
    future::BoxFuture,
    stream::{BoxStream, FuturesUnordered},
    FutureExt, Stream, StreamExt,
};

/// Rounds of task polling done before returning to the caller.
const POLL_BUDGET: usize = 64;

#[derive(Clone)]
pub(crate) struct TaskSpawner(mpsc::UnboundedSender<BoxFuture<'static, ()>>);

impl TaskSpawner {
    pub fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) {
        if self.0.unbounded_send(task.boxed()).is_err() {
            tracing::trace!("execution already dropped, discarding background task");
        }
    }
}

pub(crate) struct TaskSet {
    incoming: mpsc::UnboundedReceiver<BoxFuture<'static, ()>>,
    running: FuturesUnordered<BoxFuture<'static, ()>>,
}

impl TaskSet {
    pub fn new() -> (TaskSpawner, TaskSet) {
        let (sender, incoming) = mpsc::unbounded();
        let tasks = TaskSet {
            incoming,
            running: FuturesUnordered::new(),
        };
        (TaskSpawner(sender), tasks)
    }

    /// Makes progress on every task. Never completes on its own: the set stays open for as long
    /// as a spawner may add to it.
    ///
    /// Gives control back after [`POLL_BUDGET`] rounds even if tasks are still ready, so that a
    /// source producing items without end can't starve the consumer.
    fn poll_tasks(&mut self, cx: &mut Context<'_>) {
        for _ in 0..POLL_BUDGET {
            while let Poll::Ready(Some(task)) = self.incoming.poll_next_unpin(cx) {
                self.running.push(task);
            }
            match self.running.poll_next_unpin(cx) {
                Poll::Ready(Some(())) => continue,
                Poll::Ready(None) | Poll::Pending => {}
            }
            // A task that just ran may have spawned another one.
            match self.incoming.poll_next_unpin(cx) {
                Poll::Ready(Some(task)) => self.running.push(task),
                Poll::Ready(None) | Poll::Pending => return,
            }
        }
        cx.waker().wake_by_ref();
    }

    /// Runs `future` to completion, making progress on the background tasks meanwhile.
    pub async fn drive<F: Future>(&mut self, future: F) -> F::Output {
        let mut future = std::pin::pin!(future);
        futures::future::poll_fn(|cx| {
            if let Poll::Ready(output) = future.as_mut().poll(cx) {
                return Poll::Ready(output);
            }
            self.poll_tasks(cx);
            // Tasks may have unblocked the future.
            future.as_mut().poll(cx)
        })
        .await
    }

    /// A stream yielding the items of `inner` while the tasks keep running.
    pub fn run_with<T: Send + 'static>(self, inner: BoxStream<'static, T>) -> BoxStream<'static, T> {
        DrivenStream { tasks: self, inner }.boxed()
    }
}

struct DrivenStream<T> {
    tasks: TaskSet,
    inner: BoxStream<'static, T>,
}

impl<T> Stream for DrivenStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        this.tasks.poll_tasks(cx);
        this.inner.poll_next_unpin(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures::channel::oneshot;
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn tasks_run_while_driving() {
        let (spawner, mut tasks) = TaskSet::new();
        let (sender, receiver) = oneshot::channel();

        let nested = spawner.clone();
        spawner.spawn(async move {
            nested.spawn(async move {
                let _ = sender.send(42);
            });
        });

        // Only completes if the nested task gets polled.
        let value = tasks.drive(receiver).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn busy_tasks_do_not_starve_the_stream() {
        let (spawner, tasks) = TaskSet::new();

        fn respawn(spawner: TaskSpawner) {
            let next = spawner.clone();
            spawner.spawn(async move { respawn(next) });
        }
        respawn(spawner);

        let mut stream = tasks.run_with(futures::stream::iter([1, 2]).boxed());
        assert_eq!(stream.next().await, Some(1));
        assert_eq!(stream.next().await, Some(2));
    }

    #[tokio::test]
    async fn dropping_the_stream_drops_the_tasks() {
        let (spawner, tasks) = TaskSet::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (sender, receiver) = oneshot::channel::<()>();

        let task_log = log.clone();
        spawner.spawn(async move {
            let _ = receiver.await;
            task_log.lock().unwrap().push("finished");
        });

        let mut stream = tasks.run_with(futures::stream::iter([1, 2]).boxed());
        assert_eq!(stream.next().await, Some(1));
        drop(stream);

        assert!(sender.send(()).is_err());
        assert!(log.lock().unwrap().is_empty());
    }
}
