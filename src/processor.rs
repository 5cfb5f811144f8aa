use crate::assembler::BatchItem;
use crate::context::Context;
use async_trait::async_trait;

/// What a handler reports for one batch.
#[derive(Debug, Default)]
pub struct Handled {
    /// Positions in the batch that were durably processed.
    pub succeeded: Vec<usize>,
    /// Advisory only; logged by the loop, never stops the commit.
    pub error: Option<anyhow::Error>,
}

impl Handled {
    pub fn all<T>(batch: &[BatchItem<T>]) -> Self {
        Self {
            succeeded: (0..batch.len()).collect(),
            error: None,
        }
    }

    pub fn partial(succeeded: Vec<usize>, error: impl Into<anyhow::Error>) -> Self {
        Self {
            succeeded,
            error: Some(error.into()),
        }
    }
}

/// Application code plugged into the consumption loop. Called once per
/// non-empty tick; the loop waits for it before committing.
#[async_trait]
pub trait IBatchHandler<T>: 'static + Send + Sync {
    async fn handle(&self, ctx: &Context, batch: &[BatchItem<T>]) -> Handled;
}

pub struct DefaultHandler;

#[async_trait]
impl<T: Send + Sync + 'static> IBatchHandler<T> for DefaultHandler {
    async fn handle(&self, _ctx: &Context, batch: &[BatchItem<T>]) -> Handled {
        // ack everything
        Handled::all(batch)
    }
}
