mod poller;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::client::DeliveryClient;
use crate::config::PollingSettings;
use crate::models::tracking::TrackingUpdate;
use crate::observability::metrics::Metrics;

pub type UpdateCallback = Arc<dyn Fn(TrackingUpdate) + Send + Sync>;

type Registry = DashMap<String, Arc<TrackingEntry>>;

#[derive(Debug, Clone)]
pub struct TrackingSettings {
    pub interval: Duration,
    pub max_duration: Duration,
}

impl From<&PollingSettings> for TrackingSettings {
    fn from(polling: &PollingSettings) -> Self {
        Self {
            interval: polling.interval,
            max_duration: polling.max_duration,
        }
    }
}

struct Subscribers {
    callbacks: Vec<(Uuid, UpdateCallback)>,
    closed: bool,
}

/// Shared state of one delivery's poller. Once `closed` is set no new
/// subscriber may join; a fresh entry replaces it instead.
struct TrackingEntry {
    subscribers: Mutex<Subscribers>,
    stop_tx: watch::Sender<bool>,
}

impl TrackingEntry {
    fn new() -> (Arc<Self>, watch::Receiver<bool>) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let entry = Arc::new(Self {
            subscribers: Mutex::new(Subscribers {
                callbacks: Vec::new(),
                closed: false,
            }),
            stop_tx,
        });
        (entry, stop_rx)
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn try_subscribe(&self, callback: UpdateCallback) -> Option<Uuid> {
        let mut subscribers = self.lock();
        if subscribers.closed {
            return None;
        }
        let id = Uuid::new_v4();
        subscribers.callbacks.push((id, callback));
        Some(id)
    }

    /// Returns true when this removed the last subscriber.
    fn unsubscribe(&self, id: Uuid) -> bool {
        let mut subscribers = self.lock();
        subscribers.callbacks.retain(|(sub, _)| *sub != id);
        if subscribers.callbacks.is_empty() && !subscribers.closed {
            subscribers.closed = true;
            return true;
        }
        false
    }

    fn snapshot(&self) -> Vec<UpdateCallback> {
        self.lock()
            .callbacks
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect()
    }

    /// Drops every callback so whatever they captured is released.
    fn close(&self) {
        let mut subscribers = self.lock();
        subscribers.closed = true;
        subscribers.callbacks.clear();
    }

    fn stop(&self) {
        self.close();
        let _ = self.stop_tx.send(true);
    }

    fn subscriber_count(&self) -> usize {
        self.lock().callbacks.len()
    }
}

/// Runs one polling task per tracked delivery and fans its updates out to
/// every subscriber of that delivery.
#[derive(Clone)]
pub struct Tracker {
    client: Arc<DeliveryClient>,
    settings: TrackingSettings,
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
}

impl Tracker {
    pub fn new(client: Arc<DeliveryClient>, settings: TrackingSettings, metrics: Arc<Metrics>) -> Self {
        Self {
            client,
            settings,
            registry: Arc::new(DashMap::new()),
            metrics,
        }
    }

    /// Subscribes `on_update` to polling for `delivery_id`, starting a poller
    /// if none is running. The first poll happens one interval from now.
    pub fn start_tracking<F>(&self, delivery_id: &str, on_update: F) -> TrackingHandle
    where
        F: Fn(TrackingUpdate) + Send + Sync + 'static,
    {
        let callback: UpdateCallback = Arc::new(on_update);

        let (entry, subscriber) = match self.registry.entry(delivery_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                match occupied.get().try_subscribe(callback.clone()) {
                    Some(subscriber) => {
                        debug!(delivery_id, "joined existing tracking");
                        (occupied.get().clone(), subscriber)
                    }
                    None => {
                        let (entry, subscriber) = self.spawn_poller(delivery_id, callback);
                        occupied.insert(entry.clone());
                        (entry, subscriber)
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let (entry, subscriber) = self.spawn_poller(delivery_id, callback);
                vacant.insert(entry.clone());
                (entry, subscriber)
            }
        };

        TrackingHandle {
            delivery_id: delivery_id.to_string(),
            subscriber,
            entry,
            registry: self.registry.clone(),
            cancelled: AtomicBool::new(false),
        }
    }

    fn spawn_poller(&self, delivery_id: &str, callback: UpdateCallback) -> (Arc<TrackingEntry>, Uuid) {
        let (entry, stop_rx) = TrackingEntry::new();
        let subscriber = Uuid::new_v4();
        entry.lock().callbacks.push((subscriber, callback));

        info!(
            delivery_id,
            interval_ms = self.settings.interval.as_millis() as u64,
            "delivery tracking started"
        );
        self.metrics.active_trackings.inc();

        tokio::spawn(poller::run(poller::Poller {
            delivery_id: delivery_id.to_string(),
            entry: entry.clone(),
            client: self.client.clone(),
            settings: self.settings.clone(),
            registry: self.registry.clone(),
            metrics: self.metrics.clone(),
            stop_rx,
        }));

        (entry, subscriber)
    }

    pub fn active_deliveries(&self) -> Vec<String> {
        self.registry
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn subscriber_count(&self, delivery_id: &str) -> usize {
        self.registry
            .get(delivery_id)
            .map(|entry| entry.subscriber_count())
            .unwrap_or(0)
    }

    pub fn stop_all(&self) {
        for entry in self.registry.iter() {
            entry.value().stop();
        }
        self.registry.clear();
    }
}

/// Caller's hold on a tracking subscription. Dropping it leaves the
/// subscription running; call [`TrackingHandle::cancel`] to stop it.
pub struct TrackingHandle {
    delivery_id: String,
    subscriber: Uuid,
    entry: Arc<TrackingEntry>,
    registry: Arc<Registry>,
    cancelled: AtomicBool,
}

impl TrackingHandle {
    pub fn delivery_id(&self) -> &str {
        &self.delivery_id
    }

    /// Stops delivering updates to this subscriber. A poll already in flight
    /// still reports to it. Calling this more than once does nothing.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        if self.entry.unsubscribe(self.subscriber) {
            let _ = self.entry.stop_tx.send(true);
            self.registry
                .remove_if(&self.delivery_id, |_, current| Arc::ptr_eq(current, &self.entry));
            info!(delivery_id = %self.delivery_id, "delivery tracking cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
