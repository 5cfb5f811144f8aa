pub type Topic = String;
pub type Partition = i32;
pub type Offset = i64;

/// Opaque acknowledgement handle for one received message.
///
/// Only the batch assembler creates tokens (through [`token!`]); handlers
/// receive them with their items and never see the transport message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct CommitToken {
    partition: Partition,
    offset: Offset,
}

impl CommitToken {
    pub(crate) fn new(partition: Partition, offset: Offset) -> Self {
        Self { partition, offset }
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// Offset of the message itself. The committed consumer position is the
    /// following offset.
    pub fn offset(&self) -> Offset {
        self.offset
    }
}

macro_rules! token {
    ($msg: expr) => {
        $crate::kafka::key::CommitToken::new($msg.partition(), $msg.offset())
    };
}

pub(crate) use token;
