use std::collections::HashMap;

use super::StreamBundler;

/// Forwards results to the inner bundler in index order, holding back those that arrive early.
pub(crate) struct SequentialBundler<D, E, B> {
    inner: B,
    data: HashMap<usize, D>,
    errors: HashMap<usize, E>,
    count: usize,
}

impl<D, E, B> SequentialBundler<D, E, B>
where
    B: StreamBundler<D, E>,
{
    pub fn new(initial_index: usize, inner: B) -> Self {
        SequentialBundler {
            inner,
            data: HashMap::new(),
            errors: HashMap::new(),
            count: initial_index,
        }
    }

    fn process_pending(&mut self) {
        loop {
            if let Some(data) = self.data.remove(&self.count) {
                self.inner.queue_data(self.count, data);
            } else if let Some(error) = self.errors.remove(&self.count) {
                self.inner.queue_error(self.count, error);
            } else {
                break;
            }
            self.count += 1;
        }
    }
}

impl<D, E, B> StreamBundler<D, E> for SequentialBundler<D, E, B>
where
    D: Send,
    E: Send,
    B: StreamBundler<D, E>,
{
    fn queue_data(&mut self, index: usize, data: D) {
        if index != self.count {
            self.data.insert(index, data);
            return;
        }
        self.inner.queue_data(index, data);
        self.count += 1;
        self.process_pending();
    }

    fn queue_error(&mut self, index: usize, error: E) {
        if index != self.count {
            self.errors.insert(index, error);
            return;
        }
        self.inner.queue_error(index, error);
        self.count += 1;
        self.process_pending();
    }

    fn set_total(&mut self, total: usize) {
        self.inner.set_total(total);
    }

    fn flush_on_timer(&mut self) {
        self.inner.flush_on_timer();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::bundler::{
        tests::{Event, RecordingSink},
        Bundle, Bundler,
    };

    #[test]
    fn out_of_order_results_are_forwarded_in_order() {
        let sink = RecordingSink::default();
        let mut bundler = SequentialBundler::new(0, Bundler::new(0, 1, sink.clone()));

        bundler.queue_data(2, "c");
        bundler.queue_data(0, "a");
        bundler.queue_data(1, "b");

        assert_eq!(
            sink.bundles(),
            vec![
                Bundle::Data(vec![(0, "a")]),
                Bundle::Data(vec![(1, "b")]),
                Bundle::Data(vec![(2, "c")]),
            ]
        );
    }

    #[test]
    fn errors_keep_their_position() {
        let sink = RecordingSink::default();
        let mut bundler = SequentialBundler::new(3, Bundler::new(3, 5, sink.clone()));

        bundler.set_total(6);
        bundler.queue_data(5, "f");
        bundler.queue_error(4, "boom");
        assert!(sink.0.lock().unwrap().is_empty());

        bundler.queue_data(3, "d");
        assert_eq!(
            *sink.0.lock().unwrap(),
            vec![
                Event::Open(3),
                Event::Bundle(Bundle::Data(vec![(3, "d")])),
                Event::Open(4),
                Event::Bundle(Bundle::Errors(vec![(4, "boom")])),
                Event::Open(5),
                Event::Bundle(Bundle::Data(vec![(5, "f")])),
            ]
        );
    }
}
