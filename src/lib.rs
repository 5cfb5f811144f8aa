//! SMS送信イベントをkafkaへ発行し、バッチ単位で処理してからオフセットを更新するライブラリ。
//!
//! ### Features
//!
//! - [publisher::Publisher]でイベントをJSONとヘッダ付きで発行できる
//! - [processor::IBatchHandler]を実装することでバッチの処理部分を組み込むことができる
//! - 成功したメッセージのうち、パーティションごとに連続した先頭部分だけをコミットする
//! - 失敗以降のメッセージは次のtickで再配信される
//!
//! ### Examples
//!
//! ```no_run
//! use async_trait::async_trait;
//! use clap::Parser;
//! use smsproc::prelude::*;
//! use tokio::time::sleep;
//! use std::time::Duration;
//!
//! struct Handler;
//!
//! #[async_trait]
//! impl IBatchHandler<SmsEvent> for Handler {
//!     async fn handle(&self, _ctx: &Context, batch: &[BatchItem<SmsEvent>]) -> Handled {
//!         for item in batch {
//!             println!("{:?}", item.payload());
//!         }
//!         Handled::all(batch)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), StartError> {
//!     env_logger::init();
//!     let smsproc = SmsProc::new(Settings::parse())?;
//!     smsproc
//!         .run::<SmsEvent, _, _>(Handler, sleep(Duration::from_secs(60)))
//!         .await;
//!     Ok(())
//! }
//! ```
mod macros;

pub mod assembler;
pub mod balancer;
pub mod codec;
pub mod consumer;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod kafka;
pub mod policy;
pub mod processor;
pub mod publisher;
pub mod settings;
pub mod smsproc;

pub mod prelude {
    pub use super::assembler::{Batch, BatchAssembler, BatchItem, PoisonPolicy};
    pub use super::codec::{Event, SmsEvent, TypeFilter};
    pub use super::consumer::{BatchConsumer, LoopState};
    pub use super::context::Context;
    pub use super::coordinator::CommitCoordinator;
    pub use super::error::*;
    pub use super::kafka::*;
    pub use super::policy::{DefaultBatchPolicy, IBatchPolicy};
    pub use super::processor::{DefaultHandler, Handled, IBatchHandler};
    pub use super::publisher::Publisher;
    pub use super::settings::Settings;
    pub use super::smsproc::SmsProc;
}
