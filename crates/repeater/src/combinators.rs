use std::future::Future;

use futures::{
    future::{self, Either},
    stream::BoxStream,
    Stream, StreamExt,
};

use crate::{Repeater, RepeaterOverflowError};

/// Item of a stream that [`flatten`] expands.
pub enum Nested<T, E> {
    Value(T),
    Stream(BoxStream<'static, Result<T, E>>),
}

/// Maps every value of `source` through the async function `f`, one at a time.
///
/// Stopping the returned repeater drops `source`.
pub fn map<S, T, U, E, F, Fut>(source: S, mut f: F) -> Repeater<U, E>
where
    S: Stream<Item = Result<T, E>> + Send + Unpin + 'static,
    F: FnMut(T) -> Fut + Send + 'static,
    Fut: Future<Output = U> + Send + 'static,
    T: Send + 'static,
    U: Send + 'static,
    E: From<RepeaterOverflowError> + Send + 'static,
{
    Repeater::new(move |pusher, stopper| async move {
        let mut source = source;
        loop {
            let item = match future::select(source.next(), stopper.stopped()).await {
                Either::Left((item, _)) => item,
                Either::Right(_) => return Ok(()),
            };
            match item {
                Some(Ok(value)) => {
                    let mapped = f(value).await;
                    pusher.push(mapped)?.await;
                }
                Some(Err(error)) => return Err(error),
                None => return Ok(()),
            }
        }
    })
}

/// Flattens a stream of values and nested streams. Each nested stream is fully drained before
/// the next outer item is pulled.
///
/// Stopping the returned repeater drops both the outer stream and the active nested one.
pub fn flatten<S, T, E>(source: S) -> Repeater<T, E>
where
    S: Stream<Item = Result<Nested<T, E>, E>> + Send + Unpin + 'static,
    T: Send + 'static,
    E: From<RepeaterOverflowError> + Send + 'static,
{
    Repeater::new(move |pusher, stopper| async move {
        let mut source = source;
        loop {
            let item = match future::select(source.next(), stopper.stopped()).await {
                Either::Left((item, _)) => item,
                Either::Right(_) => return Ok(()),
            };
            match item {
                Some(Ok(Nested::Value(value))) => pusher.push(value)?.await,
                Some(Ok(Nested::Stream(mut inner))) => loop {
                    let item = match future::select(inner.next(), stopper.stopped()).await {
                        Either::Left((item, _)) => item,
                        Either::Right(_) => return Ok(()),
                    };
                    match item {
                        Some(Ok(value)) => pusher.push(value)?.await,
                        Some(Err(error)) => return Err(error),
                        None => break,
                    }
                },
                Some(Err(error)) => return Err(error),
                None => return Ok(()),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use futures::stream;
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Debug, PartialEq, thiserror::Error)]
    enum TestError {
        #[error(transparent)]
        Overflow(#[from] RepeaterOverflowError),
        #[error("{0}")]
        Source(&'static str),
    }

    #[tokio::test]
    async fn map_applies_the_function_in_order() {
        let source = stream::iter([Ok::<u32, TestError>(1), Ok(2), Ok(3)]);
        let mapped = map(source, |value| async move { value * 10 });

        let values: Vec<_> = mapped.collect().await;
        assert_eq!(values, vec![Ok(10), Ok(20), Ok(30)]);
    }

    #[tokio::test]
    async fn map_forwards_source_errors() {
        let source = stream::iter([Ok::<u32, TestError>(1), Err(TestError::Source("broken")), Ok(3)]);
        let mapped = map(source, |value| async move { value + 1 });

        let values: Vec<_> = mapped.collect().await;
        assert_eq!(values, vec![Ok(2), Err(TestError::Source("broken"))]);
    }

    #[tokio::test]
    async fn flatten_drains_nested_streams_before_pulling_again() {
        let nested = stream::iter([Ok::<u32, TestError>(2), Ok(3)]).boxed();
        let source = stream::iter([
            Ok::<_, TestError>(Nested::Value(1)),
            Ok(Nested::Stream(nested)),
            Ok(Nested::Value(4)),
        ]);

        let values: Vec<_> = flatten(source).collect().await;
        assert_eq!(values, vec![Ok(1), Ok(2), Ok(3), Ok(4)]);
    }

    #[tokio::test]
    async fn closing_a_flattened_stream_stops_pulling() {
        let source = stream::iter(0..)
            .map(|value| Ok::<_, TestError>(Nested::Value(value)))
            .boxed();

        let mut flattened = flatten(source);
        assert_eq!(flattened.next().await, Some(Ok(0)));
        assert_eq!(flattened.next().await, Some(Ok(1)));
        flattened.close();
        assert_eq!(flattened.next().await, None);
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn closing_a_flattened_stream_drops_the_active_nested_stream() {
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(dropped.clone());
        let nested = stream::iter(0..)
            .map(move |value| {
                let _flag = &flag;
                Ok::<u32, TestError>(value)
            })
            .boxed();
        let source = stream::iter([Ok::<_, TestError>(Nested::Stream(nested)), Ok(Nested::Value(100))]);

        let mut flattened = flatten(source);
        assert_eq!(flattened.next().await, Some(Ok(0)));
        assert_eq!(flattened.next().await, Some(Ok(1)));
        assert!(!dropped.load(Ordering::SeqCst));

        flattened.close();
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(flattened.next().await, None);
    }
}
