use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub courier_requests_total: IntCounterVec,
    pub courier_request_seconds: HistogramVec,
    pub tracking_ticks_total: IntCounterVec,
    pub active_trackings: IntGauge,
    pub deliveries_created_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let courier_requests_total = IntCounterVec::new(
            Opts::new(
                "courier_requests_total",
                "Courier API requests by endpoint and outcome",
            ),
            &["endpoint", "outcome"],
        )
        .expect("valid courier_requests_total metric");

        let courier_request_seconds = HistogramVec::new(
            HistogramOpts::new(
                "courier_request_seconds",
                "Latency of courier API requests in seconds",
            ),
            &["endpoint"],
        )
        .expect("valid courier_request_seconds metric");

        let tracking_ticks_total = IntCounterVec::new(
            Opts::new("tracking_ticks_total", "Tracking poll ticks by outcome"),
            &["outcome"],
        )
        .expect("valid tracking_ticks_total metric");

        let active_trackings =
            IntGauge::new("active_trackings", "Deliveries currently being polled")
                .expect("valid active_trackings metric");

        let deliveries_created_total = IntCounterVec::new(
            Opts::new(
                "deliveries_created_total",
                "Checkout delivery assignments by outcome",
            ),
            &["outcome"],
        )
        .expect("valid deliveries_created_total metric");

        registry
            .register(Box::new(courier_requests_total.clone()))
            .expect("register courier_requests_total");
        registry
            .register(Box::new(courier_request_seconds.clone()))
            .expect("register courier_request_seconds");
        registry
            .register(Box::new(tracking_ticks_total.clone()))
            .expect("register tracking_ticks_total");
        registry
            .register(Box::new(active_trackings.clone()))
            .expect("register active_trackings");
        registry
            .register(Box::new(deliveries_created_total.clone()))
            .expect("register deliveries_created_total");

        Self {
            registry,
            courier_requests_total,
            courier_request_seconds,
            tracking_ticks_total,
            active_trackings,
            deliveries_created_total,
        }
    }

    pub fn observe_request(&self, endpoint: &str, outcome: &str, seconds: f64) {
        self.courier_requests_total
            .with_label_values(&[endpoint, outcome])
            .inc();
        self.courier_request_seconds
            .with_label_values(&[endpoint])
            .observe(seconds);
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
