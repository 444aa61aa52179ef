use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tracing::{info, warn};

use crate::client::DeliveryClient;
use crate::observability::metrics::Metrics;
use crate::tracking::{Registry, TrackingEntry, TrackingSettings};

pub(super) struct Poller {
    pub(super) delivery_id: String,
    pub(super) entry: Arc<TrackingEntry>,
    pub(super) client: Arc<DeliveryClient>,
    pub(super) settings: TrackingSettings,
    pub(super) registry: Arc<Registry>,
    pub(super) metrics: Arc<Metrics>,
    pub(super) stop_rx: watch::Receiver<bool>,
}

pub(super) async fn run(mut poller: Poller) {
    let delivery_id = poller.delivery_id.clone();
    let started = Instant::now();
    let deadline = started + poller.settings.max_duration;

    let mut ticker = interval_at(started + poller.settings.interval, poller.settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let expiry = sleep_until(deadline);
    tokio::pin!(expiry);

    loop {
        tokio::select! {
            biased;
            changed = poller.stop_rx.changed() => {
                if changed.is_err() || *poller.stop_rx.borrow() {
                    break;
                }
                continue;
            }
            _ = &mut expiry => {
                info!(delivery_id = %delivery_id, "tracking window elapsed, polling stopped");
                break;
            }
            _ = ticker.tick() => {}
        }

        // Subscribers present when the tick fires receive its result even if
        // they cancel while the request is in flight.
        let subscribers = poller.entry.snapshot();

        match poller.client.track_delivery(&delivery_id).await {
            Ok(update) => {
                if Instant::now() >= deadline {
                    info!(delivery_id = %delivery_id, "tracking window elapsed, update dropped");
                    break;
                }
                poller
                    .metrics
                    .tracking_ticks_total
                    .with_label_values(&["success"])
                    .inc();

                let status = update.status;
                for on_update in &subscribers {
                    on_update(update.clone());
                }

                if status.is_terminal() {
                    info!(delivery_id = %delivery_id, status = %status, "delivery tracking completed");
                    break;
                }
            }
            Err(err) => {
                poller
                    .metrics
                    .tracking_ticks_total
                    .with_label_values(&["error"])
                    .inc();
                warn!(delivery_id = %delivery_id, error = %err, "tracking update failed");
            }
        }

        if *poller.stop_rx.borrow() {
            break;
        }
    }

    poller.entry.close();
    poller
        .registry
        .remove_if(&delivery_id, |_, current| Arc::ptr_eq(current, &poller.entry));
    poller.metrics.active_trackings.dec();
}
