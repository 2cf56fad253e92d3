use tracing::{info, warn};

use crate::error::HandlerError;
use crate::progress::ProgressEvent;

use super::{UpdateFeedsOutput, Worker};

impl Worker {
    /// Refresh every subscription, one after another.
    ///
    /// Feeds are spaced by the configured delay (none after the last). A
    /// failing feed is logged and counted; the batch carries on. Only failing
    /// to read the subscription list fails the whole run.
    pub(super) async fn update_feeds(&self) -> Result<UpdateFeedsOutput, HandlerError> {
        let subscriptions = self.registry.list().await?;
        let total = subscriptions.len();
        info!(total, "Refreshing subscriptions");

        let mut output = UpdateFeedsOutput::default();

        for (index, subscription) in subscriptions.iter().enumerate() {
            if index > 0 && !self.options.feed_delay.is_zero() {
                tokio::time::sleep(self.options.feed_delay).await;
            }

            self.reporter.report(ProgressEvent::FeedRefreshStarting {
                podcast_id: subscription.id.clone(),
                title: subscription.title.clone(),
                index,
                total,
            });

            match self.refresh_subscription(subscription).await {
                Ok(new_episodes) => {
                    output.updated += 1;
                    output.new_episodes += new_episodes;
                    self.reporter.report(ProgressEvent::FeedRefreshed {
                        podcast_id: subscription.id.clone(),
                        title: subscription.title.clone(),
                        new_episodes,
                    });
                }
                Err(e) => {
                    warn!(podcast_id = %subscription.id, error = %e, "Feed refresh failed");
                    output.failed += 1;
                    self.reporter.report(ProgressEvent::FeedRefreshFailed {
                        podcast_id: subscription.id.clone(),
                        title: subscription.title.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        self.reporter.report(ProgressEvent::RefreshCompleted {
            updated: output.updated,
            failed: output.failed,
            new_episodes: output.new_episodes,
        });
        Ok(output)
    }
}
