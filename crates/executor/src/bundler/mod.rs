//! Batching of streamed list items into fewer incremental payloads.
//!
//! A [`Bundler`] accumulates indexed results into a homogeneous bundle of data or errors and hands
//! it to its [`BundleSink`] once it is full, once every item has been seen, or once the configured
//! interval elapsed since the previous flush.

mod sequential;

use std::time::Duration;

use tokio::time::Instant;

pub(crate) use sequential::SequentialBundler;

#[derive(Debug, PartialEq)]
pub(crate) enum Bundle<D, E> {
    Data(Vec<(usize, D)>),
    Errors(Vec<(usize, E)>),
}

impl<D, E> Bundle<D, E> {
    fn len(&self) -> usize {
        match self {
            Bundle::Data(items) => items.len(),
            Bundle::Errors(items) => items.len(),
        }
    }
}

/// Receives bundles and the bookkeeping events leading to them.
pub(crate) trait BundleSink<D, E> {
    /// The item at `index` opened a new bundle.
    fn on_open(&mut self, index: usize);

    /// The item at `index` joined the current bundle.
    fn on_append(&mut self, index: usize);

    fn on_bundle(&mut self, bundle: Bundle<D, E>);
}

/// Something accepting indexed stream results.
pub(crate) trait StreamBundler<D, E>: Send {
    fn queue_data(&mut self, index: usize, data: D);

    fn queue_error(&mut self, index: usize, error: E);

    /// Number of items of the stream, known once its source is exhausted.
    fn set_total(&mut self, total: usize);

    /// Called by the [`IntervalTimer`] when the interval it was scheduled for elapsed.
    fn flush_on_timer(&mut self);
}

/// Calls back [`StreamBundler::flush_on_timer`] after a delay.
pub(crate) trait IntervalTimer: Send {
    /// Schedules the callback, replacing any pending one.
    fn schedule(&mut self, delay: Duration);

    fn cancel(&mut self);
}

struct Timing {
    max_interval: Duration,
    last_flush: Instant,
    timer: Box<dyn IntervalTimer>,
    armed: bool,
}

impl Timing {
    fn restart(&mut self) {
        self.timer.schedule(self.max_interval);
        self.armed = true;
        self.last_flush = Instant::now();
    }

    fn clear(&mut self) {
        if self.armed {
            self.timer.cancel();
            self.armed = false;
        }
    }
}

pub(crate) struct Bundler<D, E, S> {
    max_bundle_size: usize,
    timing: Option<Timing>,
    current: Option<Bundle<D, E>>,
    count: usize,
    total: Option<usize>,
    sink: S,
}

impl<D, E, S> Bundler<D, E, S>
where
    S: BundleSink<D, E>,
{
    pub fn new(initial_index: usize, max_bundle_size: usize, sink: S) -> Self {
        Bundler {
            max_bundle_size,
            timing: None,
            current: None,
            count: initial_index,
            total: None,
            sink,
        }
    }

    /// Also flushes whatever is pending every `max_interval`.
    #[must_use]
    pub fn with_interval(mut self, max_interval: Duration, timer: Box<dyn IntervalTimer>) -> Self {
        self.timing = Some(Timing {
            max_interval,
            last_flush: Instant::now(),
            timer,
            armed: false,
        });
        self
    }

    fn open(&mut self, index: usize, bundle: Bundle<D, E>) {
        self.sink.on_open(index);
        self.current = Some(bundle);
        if let Some(timing) = &mut self.timing {
            if !timing.armed {
                timing.timer.schedule(timing.max_interval);
                timing.armed = true;
            }
        }
    }

    fn flush(&mut self) {
        if let Some(bundle) = self.current.take() {
            tracing::trace!(size = bundle.len(), "flushing stream bundle");
            self.sink.on_bundle(bundle);
        }
    }

    fn after_queue(&mut self) {
        self.count += 1;
        let size = self.current.as_ref().map_or(0, Bundle::len);

        if Some(self.count) == self.total {
            self.flush();
            if let Some(timing) = &mut self.timing {
                timing.clear();
            }
        } else if size >= self.max_bundle_size {
            self.flush();
            if let Some(timing) = &mut self.timing {
                timing.restart();
            }
        } else if self
            .timing
            .as_ref()
            .is_some_and(|timing| timing.last_flush.elapsed() > timing.max_interval)
        {
            self.flush();
            if let Some(timing) = &mut self.timing {
                timing.restart();
            }
        }
    }
}

impl<D, E, S> StreamBundler<D, E> for Bundler<D, E, S>
where
    D: Send,
    E: Send,
    S: BundleSink<D, E> + Send,
{
    fn queue_data(&mut self, index: usize, data: D) {
        match &mut self.current {
            Some(Bundle::Data(items)) => {
                items.push((index, data));
                self.sink.on_append(index);
            }
            _ => {
                self.flush();
                self.open(index, Bundle::Data(vec![(index, data)]));
            }
        }
        self.after_queue();
    }

    fn queue_error(&mut self, index: usize, error: E) {
        match &mut self.current {
            Some(Bundle::Errors(items)) => {
                items.push((index, error));
                self.sink.on_append(index);
            }
            _ => {
                self.flush();
                self.open(index, Bundle::Errors(vec![(index, error)]));
            }
        }
        self.after_queue();
    }

    fn set_total(&mut self, total: usize) {
        if self.count < total {
            self.total = Some(total);
            return;
        }

        // Everything was queued before the total was known: the last partial bundle is complete.
        self.flush();
        if let Some(timing) = &mut self.timing {
            timing.clear();
        }
    }

    fn flush_on_timer(&mut self) {
        let Some(timing) = &mut self.timing else {
            return;
        };
        timing.armed = false;

        if self.current.is_some() {
            self.flush();
            if let Some(timing) = &mut self.timing {
                timing.restart();
            }
        }
    }
}
