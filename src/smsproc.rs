use crate::assembler::{BatchAssembler, PoisonPolicy};
use crate::codec::Event;
use crate::consumer::BatchConsumer;
use crate::context::Context;
use crate::error::StartError;
use crate::kafka::consumer::{IMessageReader, KafkaReader};
use crate::kafka::producer::{IMessageWriter, KafkaWriter};
use crate::policy::DefaultBatchPolicy;
use crate::processor::IBatchHandler;
use crate::publisher::Publisher;
use crate::settings::Settings;
use log::{error, info, warn};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::{self, JoinHandle};

/// Owns the reader, the writer and the background consumption loop.
pub struct SmsProc {
    settings: Settings,
    reader: Arc<dyn IMessageReader>,
    writer: Arc<dyn IMessageWriter>,
    publisher: Arc<Publisher>,
    context: Context,
    task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl SmsProc {
    /// Validates `settings` and connects both clients. Any failure here is
    /// fatal to the caller.
    pub fn new(settings: Settings) -> Result<Self, StartError> {
        settings.validate()?;
        let writer = KafkaWriter::new(&settings)?;
        let reader = KafkaReader::new(&settings)?;
        Ok(Self::with_transport(
            settings,
            Arc::new(reader),
            Arc::new(writer),
        ))
    }

    pub fn with_transport(
        settings: Settings,
        reader: Arc<dyn IMessageReader>,
        writer: Arc<dyn IMessageWriter>,
    ) -> Self {
        let publisher = Arc::new(Publisher::new(writer.clone(), &settings));
        Self {
            settings,
            reader,
            writer,
            publisher,
            context: Context::new(),
            task: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn publisher(&self) -> Arc<Publisher> {
        self.publisher.clone()
    }

    pub fn context(&self) -> Context {
        self.context.clone()
    }

    fn assembler<T: Event>(&self) -> BatchAssembler<T> {
        let policy = DefaultBatchPolicy::new(
            self.settings.tick(),
            self.settings.max_wait(),
            self.settings.batch_size,
        );
        let assembler = BatchAssembler::new(self.reader.clone(), policy)
            .type_filter(self.settings.type_filter());
        match (
            self.settings.poison_policy(),
            self.settings.dead_letter_topic.as_deref(),
        ) {
            (PoisonPolicy::DeadLetter, Some(topic)) => {
                assembler.dead_letter(self.writer.clone(), topic.trim())
            }
            _ => assembler,
        }
    }

    /// Spawns the consumption loop. Only the first call has an effect.
    pub async fn start<T: Event, H: IBatchHandler<T>>(&self, handler: H) {
        let mut slot = self.task.lock().await;
        if slot.is_some() || self.closed.load(Ordering::SeqCst) {
            warn!("Consumption loop is already started or shut down.");
            return;
        }
        let mut consumer = BatchConsumer::new(self.assembler::<T>(), Arc::new(handler));
        let ctx = self.context.clone();
        *slot = Some(task::spawn(async move {
            consumer.run(&ctx).await;
        }));
        info!(
            "Consuming {} as group {}.",
            self.settings.consumer_topic, self.settings.group_id
        );
    }

    /// Starts the loop and shuts down once `signal` resolves or the context
    /// is cancelled elsewhere.
    pub async fn run<T, H, F>(&self, handler: H, signal: F)
    where
        T: Event,
        H: IBatchHandler<T>,
        F: Future,
    {
        self.start::<T, H>(handler).await;
        tokio::select! {
            _ = signal => info!("Shutdown requested."),
            _ = self.context.cancelled() => {}
        }
        self.shutdown().await;
    }

    /// Cancels the loop, waits for its current tick to finish and releases
    /// the reader and the writer. Repeated calls are no-ops.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.context.cancel();
        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                error!("Consumption loop did not finish cleanly.({})", e);
            }
        }
        self.reader.close();
        self.writer.close();
        info!("Shut down.");
    }
}
