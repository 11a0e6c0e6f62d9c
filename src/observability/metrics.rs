use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatch_attempts_total: IntCounterVec,
    pub courier_responses_total: IntCounterVec,
    pub assignments_expired_total: IntCounter,
    pub waiting_assignments: IntGauge,
    pub dispatch_latency_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatch_attempts_total = IntCounterVec::new(
            Opts::new("dispatch_attempts_total", "Dispatch attempts by outcome"),
            &["outcome"],
        )
        .expect("valid dispatch_attempts_total metric");

        let courier_responses_total = IntCounterVec::new(
            Opts::new("courier_responses_total", "Courier responses by applied outcome"),
            &["outcome"],
        )
        .expect("valid courier_responses_total metric");

        let assignments_expired_total = IntCounter::new(
            "assignments_expired_total",
            "Assignments that ran out of time without an answer",
        )
        .expect("valid assignments_expired_total metric");

        let waiting_assignments = IntGauge::new(
            "waiting_assignments",
            "Assignments currently waiting for a courier answer",
        )
        .expect("valid waiting_assignments metric");

        let dispatch_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of a dispatch attempt in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        registry
            .register(Box::new(dispatch_attempts_total.clone()))
            .expect("register dispatch_attempts_total");
        registry
            .register(Box::new(courier_responses_total.clone()))
            .expect("register courier_responses_total");
        registry
            .register(Box::new(assignments_expired_total.clone()))
            .expect("register assignments_expired_total");
        registry
            .register(Box::new(waiting_assignments.clone()))
            .expect("register waiting_assignments");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");

        Self {
            registry,
            dispatch_attempts_total,
            courier_responses_total,
            assignments_expired_total,
            waiting_assignments,
            dispatch_latency_seconds,
        }
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
