use crate::assembler::{Batch, BatchItem, Held};
use crate::error::CommitError;
use crate::kafka::consumer::IMessageReader;
use crate::kafka::key::{CommitToken, Partition};
use log::debug;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Scratch state of one partition, alive for a single commit call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct PartitionCommitState {
    blocked: bool,
    last_successful: Option<CommitToken>,
    first_failure: Option<CommitToken>,
}

impl PartitionCommitState {
    fn succeed(&mut self, token: CommitToken) {
        if !self.blocked {
            self.last_successful = Some(token);
        }
    }

    fn fail(&mut self, token: CommitToken) {
        if !self.blocked {
            self.blocked = true;
            self.first_failure = Some(token);
        }
    }
}

/// Tokens to commit and partitions to rewind, one entry per partition,
/// ordered by partition.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct CommitPlan {
    pub(crate) commits: Vec<CommitToken>,
    pub(crate) rewinds: Vec<CommitToken>,
}

/// Walks the batch in arrival order and keeps, per partition, the last token
/// of the unbroken run of successes. Deferred skips count as successes and
/// held failures as failures. Indices outside the batch are ignored.
pub(crate) fn plan<T>(batch: &Batch<T>, succeeded: &[usize]) -> CommitPlan {
    let succeeded = succeeded.iter().copied().collect::<HashSet<_>>();
    let mut states: BTreeMap<Partition, PartitionCommitState> = BTreeMap::new();
    let mut held = batch.held().iter().peekable();

    for position in 0..=batch.len() {
        while let Some(h) = held.next_if(|h| h.position <= position) {
            let state = states.entry(h.token.partition()).or_default();
            match h.held {
                Held::Skipped => state.succeed(h.token),
                Held::Failed => state.fail(h.token),
            }
        }
        if let Some(item) = batch.items().get(position) {
            let token = item.token();
            let state = states.entry(token.partition()).or_default();
            if succeeded.contains(&position) {
                state.succeed(token);
            } else {
                state.fail(token);
            }
        }
    }

    CommitPlan {
        commits: states.values().filter_map(|s| s.last_successful).collect(),
        rewinds: states.values().filter_map(|s| s.first_failure).collect(),
    }
}

/// Commits the processed prefix of each partition and rewinds the rest, so
/// everything after a gap is fetched again on the next poll.
///
/// A rewind that fails stays pending. Its partition is not committed again
/// until a later rewind to that position succeeds.
pub struct CommitCoordinator {
    reader: Arc<dyn IMessageReader>,
    pending_rewinds: BTreeMap<Partition, CommitToken>,
}

impl CommitCoordinator {
    pub fn new(reader: Arc<dyn IMessageReader>) -> Self {
        Self {
            reader,
            pending_rewinds: BTreeMap::new(),
        }
    }

    pub fn has_pending_rewinds(&self) -> bool {
        !self.pending_rewinds.is_empty()
    }

    /// Seeks back every partition whose earlier rewind failed. Must succeed
    /// before the next fetch, or that fetch would read past the gap.
    pub async fn retry_rewinds(&mut self) -> Result<(), CommitError> {
        if self.pending_rewinds.is_empty() {
            return Ok(());
        }
        let tokens = self.pending_rewinds.values().copied().collect::<Vec<_>>();
        debug!("Retrying rewind to {:?}.", tokens);
        self.reader
            .rewind(&tokens)
            .await
            .map_err(CommitError::Rewind)?;
        self.pending_rewinds.clear();
        Ok(())
    }

    /// Commits, per partition, the longest run of successes in arrival order.
    ///
    /// `succeeded` holds batch positions the handler reported as processed.
    /// Nothing is committed for a partition whose first item failed, and no
    /// commit call is made at all when no partition advanced. Repeating a
    /// call with the same inputs commits the same offsets again.
    pub async fn commit_contiguous<T>(
        &mut self,
        batch: &Batch<T>,
        succeeded: &[usize],
    ) -> Result<(), CommitError> {
        let mut plan = plan(batch, succeeded);
        plan.commits
            .retain(|token| !self.pending_rewinds.contains_key(&token.partition()));

        let mut committed = Ok(());
        if !plan.commits.is_empty() {
            debug!("Committing {:?}.", plan.commits);
            committed = self
                .reader
                .commit(&plan.commits)
                .await
                .map_err(CommitError::Commit);
        }
        // A failed commit still rewinds: the failed items must come back.
        let rewinds = self.merge_rewinds(&plan.rewinds);
        if !rewinds.is_empty() {
            debug!("Rewinding to {:?}.", rewinds);
            if let Err(e) = self.reader.rewind(&rewinds).await {
                self.pending_rewinds = rewinds.into_iter().map(|t| (t.partition(), t)).collect();
                return Err(CommitError::Rewind(e));
            }
            self.pending_rewinds.clear();
        }
        committed
    }

    /// Pending rewinds joined with `rewinds`, keeping the earliest offset
    /// of each partition.
    fn merge_rewinds(&self, rewinds: &[CommitToken]) -> Vec<CommitToken> {
        let mut merged = self.pending_rewinds.clone();
        for token in rewinds {
            merged
                .entry(token.partition())
                .and_modify(|t| {
                    if token.offset() < t.offset() {
                        *t = *token;
                    }
                })
                .or_insert(*token);
        }
        merged.into_values().collect()
    }

    /// Treats every item of the batch as processed.
    pub async fn commit_all<T>(&mut self, batch: &Batch<T>) -> Result<(), CommitError> {
        let all = (0..batch.len()).collect::<Vec<_>>();
        self.commit_contiguous(batch, &all).await
    }

    pub async fn commit_one<T>(&mut self, item: &BatchItem<T>) -> Result<(), CommitError> {
        self.reader
            .commit(&[item.token()])
            .await
            .map_err(CommitError::Commit)
    }
}
