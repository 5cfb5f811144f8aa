use std::time::Duration;

/// What one fetch contributed to the current tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fetched {
    /// Decoded and handed to the handler.
    Item,
    /// Filtered, dropped, dead-lettered or held back.
    Skipped,
}

/// Paces the consumption loop and decides when a tick has collected enough.
///
/// Skipped messages are bounded separately so a stretch of filtered or
/// corrupt input still ends the tick instead of starving the handler.
pub trait IBatchPolicy: Send + Sync {
    /// Period between ticks.
    fn interval(&self) -> Duration;
    /// Longest wait for the first message of a tick.
    fn first_wait(&self) -> Duration;
    /// Upper bound on items per batch.
    fn capacity(&self) -> usize;
    fn start_tick(&mut self);
    fn record(&mut self, fetched: Fetched);
    fn exhausted(&self) -> bool;
}

pub struct DefaultBatchPolicy {
    interval: Duration,
    first_wait: Duration,
    max_items: usize,
    max_skips: usize,
    items: usize,
    skips: usize,
}

impl DefaultBatchPolicy {
    /// Allows as many skipped messages per tick as items.
    pub fn new(interval: Duration, first_wait: Duration, max_items: usize) -> Self {
        Self {
            interval,
            first_wait,
            max_items,
            max_skips: max_items,
            items: 0,
            skips: 0,
        }
    }

    pub fn max_skips(mut self, max_skips: usize) -> Self {
        self.max_skips = max_skips;
        self
    }
}

impl IBatchPolicy for DefaultBatchPolicy {
    fn interval(&self) -> Duration {
        self.interval
    }

    fn first_wait(&self) -> Duration {
        self.first_wait
    }

    fn capacity(&self) -> usize {
        self.max_items
    }

    fn start_tick(&mut self) {
        self.items = 0;
        self.skips = 0;
    }

    fn record(&mut self, fetched: Fetched) {
        match fetched {
            Fetched::Item => self.items += 1,
            Fetched::Skipped => self.skips += 1,
        }
    }

    fn exhausted(&self) -> bool {
        self.items >= self.max_items || self.skips >= self.max_skips
    }
}
