use std::sync::Arc;

use crate::client::{CourierApi, DeliveryClient, KeyValueStore};
use crate::config::Config;
use crate::observability::metrics::Metrics;
use crate::retry::RetryPolicy;
use crate::tracking::{Tracker, TrackingSettings};
use crate::workflow::Workflow;

pub struct AppState {
    pub config: Arc<Config>,
    pub workflow: Workflow,
    pub metrics: Arc<Metrics>,
    pub retry: RetryPolicy,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        api: Arc<dyn CourierApi>,
        store: Arc<dyn KeyValueStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let client = Arc::new(DeliveryClient::new(api, store));
        let tracker = Tracker::new(
            client.clone(),
            TrackingSettings::from(&config.polling),
            metrics.clone(),
        );

        Self {
            retry: RetryPolicy::from(&config.retry),
            workflow: Workflow::new(config.clone(), client, tracker),
            config,
            metrics,
        }
    }
}
