use crate::kafka::key::Partition;
use crate::settings::BalancerKind;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Chooses the target partition of outgoing records. The strategy is fixed
/// at construction; hash strategies defer to the client partitioner, which
/// is configured with the matching hash function.
pub struct Balancer {
    kind: BalancerKind,
    next: AtomicUsize,
    loads: Vec<AtomicU64>,
}

impl Balancer {
    pub fn new(kind: BalancerKind, partitions: usize) -> Self {
        Self {
            kind,
            next: AtomicUsize::new(0),
            loads: (0..partitions).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn kind(&self) -> BalancerKind {
        self.kind
    }

    /// Picks a partition for a record of `size` bytes. `None` leaves the
    /// choice to the client, as does an unknown partition count.
    pub fn pick(&self, size: usize) -> Option<Partition> {
        if self.loads.is_empty() {
            return None;
        }
        match self.kind {
            BalancerKind::RoundRobin => {
                let n = self.next.fetch_add(1, Ordering::Relaxed);
                Some((n % self.loads.len()) as Partition)
            }
            BalancerKind::LeastBytes => {
                let (partition, load) = self
                    .loads
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, load)| load.load(Ordering::Relaxed))?;
                load.fetch_add(size as u64, Ordering::Relaxed);
                Some(partition as Partition)
            }
            BalancerKind::Crc32 | BalancerKind::Murmur2 => None,
        }
    }
}
