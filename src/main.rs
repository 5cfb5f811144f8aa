use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use log::info;
use signal_hook::consts::TERM_SIGNALS;
use signal_hook::iterator::Signals;
use smsproc::prelude::*;
use std::future;
use std::thread;

struct LoggingHandler;

#[async_trait]
impl IBatchHandler<SmsEvent> for LoggingHandler {
    async fn handle(&self, _ctx: &Context, batch: &[BatchItem<SmsEvent>]) -> Handled {
        for item in batch {
            let sms = item.payload();
            info!(
                "sms(user_id={}, phone={}, partition={}, offset={})",
                sms.user_id,
                sms.phone,
                item.token().partition(),
                item.token().offset()
            );
        }
        Handled::all(batch)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let settings = Settings::parse();
    let smsproc = SmsProc::new(settings)?;

    let mut signals = Signals::new(TERM_SIGNALS)?;
    thread::spawn({
        let ctx = smsproc.context();
        move || {
            if let Some(signal) = signals.forever().next() {
                info!("Received signal {}.", signal);
                ctx.cancel();
            }
        }
    });

    smsproc
        .run::<SmsEvent, _, _>(LoggingHandler, future::pending::<()>())
        .await;
    Ok(())
}
