use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub trip_events_total: IntCounterVec,
    pub accept_conflicts_total: IntCounter,
    pub offers_sent_total: IntCounter,
    pub trips_searching: IntGauge,
    pub dispatch_jobs_in_queue: IntGauge,
    pub dispatch_latency_seconds: HistogramVec,
    pub notification_failures_total: IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let trip_events_total = IntCounterVec::new(
            Opts::new("trip_events_total", "Trip lifecycle transitions by event"),
            &["event"],
        )
        .expect("valid trip_events_total metric");

        let accept_conflicts_total = IntCounter::new(
            "accept_conflicts_total",
            "Accept attempts that lost the claim race",
        )
        .expect("valid accept_conflicts_total metric");

        let offers_sent_total =
            IntCounter::new("offers_sent_total", "Trip offers sent to drivers")
                .expect("valid offers_sent_total metric");

        let trips_searching =
            IntGauge::new("trips_searching", "Trips currently waiting for a driver")
                .expect("valid trips_searching metric");

        let dispatch_jobs_in_queue = IntGauge::new(
            "dispatch_jobs_in_queue",
            "Current number of dispatch jobs in queue",
        )
        .expect("valid dispatch_jobs_in_queue metric");

        let dispatch_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of dispatch job processing in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let notification_failures_total = IntCounter::new(
            "notification_failures_total",
            "Outbound notifications the transport did not take",
        )
        .expect("valid notification_failures_total metric");

        registry
            .register(Box::new(trip_events_total.clone()))
            .expect("register trip_events_total");
        registry
            .register(Box::new(accept_conflicts_total.clone()))
            .expect("register accept_conflicts_total");
        registry
            .register(Box::new(offers_sent_total.clone()))
            .expect("register offers_sent_total");
        registry
            .register(Box::new(trips_searching.clone()))
            .expect("register trips_searching");
        registry
            .register(Box::new(dispatch_jobs_in_queue.clone()))
            .expect("register dispatch_jobs_in_queue");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(notification_failures_total.clone()))
            .expect("register notification_failures_total");

        Self {
            registry,
            trip_events_total,
            accept_conflicts_total,
            offers_sent_total,
            trips_searching,
            dispatch_jobs_in_queue,
            dispatch_latency_seconds,
            notification_failures_total,
        }
    }

    pub fn trip_event(&self, event: &str) {
        self.trip_events_total.with_label_values(&[event]).inc();
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
