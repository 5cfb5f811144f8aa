use crate::assembler::BatchAssembler;
use crate::codec::Event;
use crate::context::Context;
use crate::coordinator::CommitCoordinator;
use crate::processor::IBatchHandler;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Ticking,
    Fetching,
    Handling,
    Committing,
    Stopped,
}

/// Ticked poll, handle and commit cycle. Ticks never overlap: each one runs
/// to completion, commit included, before cancellation is looked at again.
pub struct BatchConsumer<T> {
    assembler: BatchAssembler<T>,
    coordinator: CommitCoordinator,
    handler: Arc<dyn IBatchHandler<T>>,
    state: LoopState,
}

impl<T: Event> BatchConsumer<T> {
    pub fn new(assembler: BatchAssembler<T>, handler: Arc<dyn IBatchHandler<T>>) -> Self {
        let coordinator = CommitCoordinator::new(assembler.reader().clone());
        Self {
            assembler,
            coordinator,
            handler,
            state: LoopState::Idle,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next {
            debug!("Consumption loop {:?} -> {:?}.", self.state, next);
            self.state = next;
        }
    }

    /// Runs ticks until `ctx` is cancelled.
    pub async fn run(&mut self, ctx: &Context) {
        let mut ticker = interval(self.assembler.policy().interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Consumption loop started.");
        loop {
            self.transition(LoopState::Idle);
            if ctx.is_cancelled() {
                break;
            }
            tokio::select! {
                biased;
                _ = ctx.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.tick(ctx).await;
        }
        self.transition(LoopState::Stopped);
        info!("Consumption loop stopped.");
    }

    /// One poll, handle and commit cycle. Returns how many items the
    /// handler was given.
    ///
    /// Nothing is fetched while a rewind from an earlier tick is still
    /// outstanding.
    pub async fn tick(&mut self, ctx: &Context) -> usize {
        self.transition(LoopState::Ticking);
        if let Err(e) = self.coordinator.retry_rewinds().await {
            warn!("Failed to rewind, skipping this tick.({})", e);
            self.transition(LoopState::Idle);
            return 0;
        }
        self.transition(LoopState::Fetching);
        let first_wait = self.assembler.policy().first_wait();
        let batch = self.assembler.poll_batch(ctx, first_wait).await;

        let mut succeeded = vec![];
        if !batch.is_empty() {
            self.transition(LoopState::Handling);
            let handled = self.handler.handle(ctx, batch.items()).await;
            if let Some(e) = handled.error {
                error!(
                    "Handler failed on part of the batch.({} of {} succeeded, {:#})",
                    handled.succeeded.len(),
                    batch.len(),
                    e
                );
            }
            succeeded = handled.succeeded;
        }

        self.transition(LoopState::Committing);
        if let Err(e) = self.coordinator.commit_contiguous(&batch, &succeeded).await {
            warn!("Failed to commit batch, it will be redelivered.({})", e);
        }
        self.transition(LoopState::Idle);
        batch.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::BatchItem;
    use crate::codec::testing::sms;
    use crate::codec::SmsEvent;
    use crate::kafka::key::CommitToken;
    use crate::kafka::testing::MemoryBroker;
    use crate::policy::DefaultBatchPolicy;
    use crate::processor::testing::ScriptedHandler;
    use crate::processor::{DefaultHandler, Handled};
    use crate::publisher::Publisher;
    use crate::settings::testing::settings;
    use async_trait::async_trait;
    use rdkafka::error::{KafkaError, RDKafkaErrorCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::{timeout, Instant};

    fn consumer(
        broker: &Arc<MemoryBroker>,
        handler: Arc<dyn IBatchHandler<SmsEvent>>,
        limit: usize,
    ) -> BatchConsumer<SmsEvent> {
        let assembler = BatchAssembler::new(
            broker.clone(),
            DefaultBatchPolicy::new(Duration::from_millis(20), Duration::from_millis(20), limit),
        );
        BatchConsumer::new(assembler, handler)
    }

    #[tokio::test]
    async fn test_partial_success_commits_prefix_and_redelivers_rest() {
        let broker = Arc::new(MemoryBroker::new("sms", 1));
        let publisher = Publisher::new(broker.clone(), &settings(&["--balancer", "crc32"]));
        let ctx = Context::new();
        let events = (0..5).map(sms).collect::<Vec<_>>();
        for event in &events {
            publisher.publish(&ctx, event).await.unwrap();
        }

        let handler = Arc::new(ScriptedHandler::new(&[0, 1, 2, 4]));
        let mut consumer = consumer(&broker, handler.clone(), 10);
        assert_eq!(consumer.tick(&ctx).await, 5);
        assert_eq!(broker.commits(), vec![vec![CommitToken::new(0, 2)]]);
        assert_eq!(broker.committed(0), Some(3));

        assert_eq!(consumer.tick(&ctx).await, 2);
        let seen = handler.seen.lock().unwrap();
        assert_eq!(seen[0], events);
        assert_eq!(seen[1], events[3..].to_vec());
    }

    #[tokio::test]
    async fn test_empty_tick_skips_handler() {
        let broker = Arc::new(MemoryBroker::new("sms", 1));
        let handler = Arc::new(ScriptedHandler::<SmsEvent>::new(&[]));
        let mut consumer = consumer(&broker, handler.clone(), 10);
        assert_eq!(consumer.tick(&Context::new()).await, 0);
        assert!(handler.seen.lock().unwrap().is_empty());
        assert!(broker.commits().is_empty());
        assert_eq!(consumer.state(), LoopState::Idle);
    }

    #[tokio::test]
    async fn test_commit_failure_keeps_loop_alive() {
        let broker = Arc::new(MemoryBroker::new("sms", 1));
        broker.push_event(0, &sms(0));
        broker.fail_next_commit(KafkaError::ConsumerCommit(RDKafkaErrorCode::RequestTimedOut));
        let mut consumer = consumer(&broker, Arc::new(DefaultHandler), 10);
        let ctx = Context::new();
        assert_eq!(consumer.tick(&ctx).await, 1);
        assert!(broker.commits().is_empty());

        broker.push_event(0, &sms(1));
        assert_eq!(consumer.tick(&ctx).await, 1);
        assert_eq!(broker.committed(0), Some(2));
    }

    /// Rejects its first batch, accepts everything afterwards.
    struct FailFirst {
        calls: AtomicUsize,
        seen: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl IBatchHandler<SmsEvent> for FailFirst {
        async fn handle(&self, _ctx: &Context, batch: &[BatchItem<SmsEvent>]) -> Handled {
            let mut seen = self.seen.lock().unwrap();
            seen.extend(batch.iter().map(|i| i.payload().text.clone()));
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Handled::partial(vec![], anyhow::anyhow!("rejected"))
            } else {
                Handled::all(batch)
            }
        }
    }

    #[tokio::test]
    async fn test_failed_rewind_is_retried_before_next_fetch() {
        let broker = Arc::new(MemoryBroker::new("sms", 1));
        let first = sms(0);
        let second = sms(1);
        broker.push_event(0, &first);
        broker.push_event(0, &second);
        broker.fail_next_rewind(KafkaError::Seek("broker down".to_string()));
        let handler = Arc::new(FailFirst {
            calls: AtomicUsize::new(0),
            seen: std::sync::Mutex::new(vec![]),
        });
        let mut consumer = consumer(&broker, handler.clone(), 1);
        let ctx = Context::new();

        // The failed item stays un-rewound, and the next tick rewinds first.
        assert_eq!(consumer.tick(&ctx).await, 1);
        assert!(broker.rewinds().is_empty());
        assert_eq!(consumer.tick(&ctx).await, 1);
        assert_eq!(broker.rewinds(), vec![CommitToken::new(0, 0)]);
        assert_eq!(broker.commits(), vec![vec![CommitToken::new(0, 0)]]);

        assert_eq!(consumer.tick(&ctx).await, 1);
        assert_eq!(broker.committed(0), Some(2));
        let seen = handler.seen.lock().unwrap();
        assert_eq!(*seen, vec![first.text.clone(), first.text.clone(), second.text.clone()]);
    }

    #[tokio::test]
    async fn test_tick_waits_for_rewind() {
        let broker = Arc::new(MemoryBroker::new("sms", 1));
        broker.push_event(0, &sms(0));
        broker.push_event(0, &sms(1));
        broker.fail_next_rewind(KafkaError::Seek("broker down".to_string()));
        broker.fail_next_rewind(KafkaError::Seek("broker down".to_string()));
        let handler = Arc::new(ScriptedHandler::<SmsEvent>::new(&[]));
        let mut consumer = consumer(&broker, handler.clone(), 1);
        let ctx = Context::new();

        assert_eq!(consumer.tick(&ctx).await, 1);
        assert_eq!(consumer.tick(&ctx).await, 0);
        assert_eq!(handler.seen.lock().unwrap().len(), 1);
        assert_eq!(broker.pending(), 1);
        assert!(broker.commits().is_empty());
        assert_eq!(consumer.state(), LoopState::Idle);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let broker = Arc::new(MemoryBroker::new("sms", 1));
        for n in 0..3 {
            broker.push_event(0, &sms(n));
        }
        let mut consumer = consumer(&broker, Arc::new(DefaultHandler), 10);
        let ctx = Context::new();
        let task = tokio::spawn({
            let ctx = ctx.clone();
            async move {
                consumer.run(&ctx).await;
                consumer
            }
        });

        let started = Instant::now();
        while broker.committed(0).is_none() && started.elapsed() < Duration::from_secs(2) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        ctx.cancel();
        let consumer = timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert_eq!(consumer.state(), LoopState::Stopped);
        assert_eq!(broker.committed(0), Some(3));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let broker = Arc::new(MemoryBroker::new("sms", 1));
        broker.push_event(0, &sms(0));
        let handler = Arc::new(ScriptedHandler::<SmsEvent>::new(&[0]));
        let mut consumer = consumer(&broker, handler.clone(), 10);
        let ctx = Context::new();
        ctx.cancel();
        consumer.run(&ctx).await;
        assert!(handler.seen.lock().unwrap().is_empty());
        assert_eq!(broker.pending(), 1);
        assert_eq!(consumer.state(), LoopState::Stopped);
    }
}
