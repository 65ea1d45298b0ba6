use std::{
    thread,
    time::{Duration, SystemTime},
};

use rand::Rng;
use tracing::error;
use wavefront_sender::{Centroid, EventOptions, Granularity, ProxySenderBuilder, Span, SpanTag, Tags};

fn main() {
    tracing_subscriber::fmt::init();

    let sender = ProxySenderBuilder::default()
        .with_host("localhost")
        .with_metrics_port(2878)
        .with_distribution_port(40000)
        .with_tracing_port(30000)
        .with_events_port(2878)
        .with_flush_interval(Duration::from_secs(2))
        .build_and_start()
        .expect("failed to build proxy sender");

    let tags = Tags::from([("system".to_string(), "foo".to_string())]);
    let span_tags = vec![SpanTag::new("application", "demo"), SpanTag::new("service", "loop")];
    let mut rng = rand::rng();

    let now_millis = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64);
    sender
        .send_event("demo started", now_millis, 0, "", &tags, &EventOptions::new().severity("info"))
        .expect("failed to send event");

    // Loop over and over, pretending to do some work.
    for iteration in 0..600u64 {
        let work_ms = rng.random_range(5..50);
        thread::sleep(Duration::from_millis(work_ms));

        if let Err(e) = sender.send_metric("demo.loop.work_ms", work_ms as f64, None, "", &tags) {
            error!(error = %e, "Failed to send metric.");
        }
        if let Err(e) = sender.send_delta_counter("demo.loop.iterations", 1.0, None, "", &tags) {
            error!(error = %e, "Failed to send delta counter.");
        }

        let centroids = [Centroid::new(work_ms as f64, 1), Centroid::new(rng.random_range(0.0..1.0), 2)];
        if let Err(e) = sender.send_distribution("demo.loop.latency", &centroids, &[Granularity::Minute], None, "", &tags) {
            error!(error = %e, "Failed to send distribution.");
        }

        let trace_id = format!("trace-{iteration}");
        let span = Span {
            name: "iteration",
            start_millis: now_millis + iteration as i64,
            duration_millis: work_ms as i64,
            trace_id: &trace_id,
            span_id: "root",
            tags: &span_tags,
            ..Span::default()
        };
        if let Err(e) = sender.send_span(&span, &[]) {
            error!(error = %e, "Failed to send span.");
        }
    }

    sender.close();
}
