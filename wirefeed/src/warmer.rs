use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio::sync::Notify;
use tracing::info;

use crate::service::NewsService;

/// Keep the breaking and section tiers warm until `shutdown` is notified.
///
/// A pass in progress is abandoned on shutdown; its refreshes still commit
/// because they run as their own tasks.
pub async fn run_warmer(service: Arc<NewsService>, interval: Duration, shutdown: Arc<Notify>) {
    info!(interval_secs = interval.as_secs(), "warmer: starting");

    let shutdown_signal = shutdown.notified();
    tokio::pin!(shutdown_signal);
    shutdown_signal.as_mut().enable();

    let mut passes: u64 = 0;
    loop {
        select! {
            _ = &mut shutdown_signal => {
                info!(passes, "warmer: shutdown requested, exiting loop");
                break;
            }
            _ = async {
                service.warm().await;
                tokio::time::sleep(interval).await;
            } => {
                passes += 1;
            }
        }
    }
}
