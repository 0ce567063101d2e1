use std::sync::OnceLock;

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

const BATCH_BUCKETS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 80.0, 160.0];

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("ocr_batch_duration_seconds".to_string()),
            BATCH_BUCKETS,
        )?
        .install_recorder()?;
    let _ = PROM_HANDLE.set(handle);

    describe_counter!("ocr_images_total", "Images pushed through upload and recognition");
    describe_counter!("llm_requests_total", "Language model calls by kind and outcome");
    describe_counter!("http_requests_total", "HTTP responses by status code");
    describe_histogram!(
        "ocr_batch_duration_seconds",
        Unit::Seconds,
        "Wall time of one recognition batch"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "Wall time of one HTTP request"
    );

    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(PrometheusHandle::render)
}
