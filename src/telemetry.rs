use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use std::collections::HashSet;

pub struct Metrics {
    // The registry only renders while its provider is alive.
    _provider: SdkMeterProvider,
    detection_duration: Histogram<u64>,
    frames_buffered: Counter<u64>,
    frames_fetched: Counter<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = SdkMeterProvider::builder().with_reader(exporter).build();

        let meter = provider.meter("face_relay");
        global::set_meter_provider(provider.clone());

        let boundaries = generate_boundaries((10, 50, 100, 500, 2000));

        let detection_duration = meter
            .u64_histogram("detection_duration_ms")
            .with_boundaries(boundaries)
            .with_description("Duration of detection calls in milliseconds")
            .build();

        let frames_buffered = meter
            .u64_counter("frames_buffered_total")
            .with_description("Annotated frames offered to the frame buffer")
            .build();

        let frames_fetched = meter
            .u64_counter("frames_fetched_total")
            .with_description("Fetch attempts against the frame buffer")
            .build();

        Ok(Metrics {
            _provider: provider,
            detection_duration,
            frames_buffered,
            frames_fetched,
            registry,
        })
    }

    pub fn record_detection_duration(&self, duration_ms: u64, outcome: &str) {
        let attributes = [KeyValue::new("outcome", outcome.to_string())];
        self.detection_duration.record(duration_ms, &attributes);
    }

    pub fn record_buffered(&self, accepted: bool) {
        let outcome = if accepted { "accepted" } else { "dropped" };
        self.frames_buffered
            .add(1, &[KeyValue::new("outcome", outcome)]);
    }

    pub fn record_fetch(&self, hit: bool) {
        let outcome = if hit { "hit" } else { "empty" };
        self.frames_fetched
            .add(1, &[KeyValue::new("outcome", outcome)]);
    }

    pub fn render(&self) -> anyhow::Result<String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 10;
    let middle_step: usize = 25;
    let end_step: usize = 100;
    let tail_step: usize = 500;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}
