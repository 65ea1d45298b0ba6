//! Self-monitoring.
//!
//! The registry periodically samples the sender's own operational counters and gauges, and reports them as ordinary
//! metric points through the sender itself. It only ever sees the sender through [`MetricSender`], so it has no access
//! to transports or any other sender internals.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, SystemTime},
};

use crossbeam_channel::{select, tick, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, trace};

use crate::{
    counter::{Counter, DeltaCounter},
    lines::Tags,
    sender::MetricSender,
};

type GaugeFn = Box<dyn Fn() -> f64 + Send + Sync>;

enum Producer {
    Delta(Arc<DeltaCounter>),
    Counter(Arc<Counter>),
    Gauge(GaugeFn),
}

enum Sample {
    Delta(f64),
    Count(f64),
    Gauge(f64),
}

/// Registry configuration.
pub(crate) struct RegistryConfiguration {
    /// Prefix applied to every reported metric name, separated by a `.`.
    pub prefix: String,

    /// Tags attached to every reported metric.
    pub tags: Tags,

    /// How often to report.
    pub interval: Duration,
}

struct Worker {
    shutdown_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Samples registered producers and reports them through a [`MetricSender`].
pub(crate) struct MetricRegistry {
    sender: Arc<dyn MetricSender>,
    config: RegistryConfiguration,
    producers: Mutex<Vec<(String, Producer)>>,
    worker: Mutex<Option<Worker>>,
    stopped: AtomicBool,
}

impl MetricRegistry {
    /// Creates a new `MetricRegistry` that reports through the given sender.
    pub fn new(sender: Arc<dyn MetricSender>, config: RegistryConfiguration) -> Self {
        MetricRegistry {
            sender,
            config,
            producers: Mutex::new(Vec::new()),
            worker: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    fn qualified_name(&self, name: &str) -> String {
        if self.config.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.config.prefix, name)
        }
    }

    fn register(&self, name: &str, producer: Producer) {
        let name = self.qualified_name(name);
        self.producers.lock().push((name, producer));
    }

    /// Registers an existing delta counter, reported as `<prefix>.<name>.count`.
    pub fn register_delta_counter(&self, name: &str, counter: Arc<DeltaCounter>) {
        self.register(name, Producer::Delta(counter));
    }

    /// Creates and registers a new delta counter.
    pub fn new_delta_counter(&self, name: &str) -> Arc<DeltaCounter> {
        let counter = Arc::new(DeltaCounter::new());
        self.register_delta_counter(name, Arc::clone(&counter));
        counter
    }

    /// Creates and registers a new cumulative counter, reported as `<prefix>.<name>.count`.
    pub fn new_counter(&self, name: &str) -> Arc<Counter> {
        let counter = Arc::new(Counter::new());
        self.register(name, Producer::Counter(Arc::clone(&counter)));
        counter
    }

    /// Registers a gauge whose value is computed by `f` at every report.
    pub fn new_gauge<F>(&self, name: &str, f: F)
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        self.register(name, Producer::Gauge(Box::new(f)));
    }

    fn sample(&self) -> Vec<(String, Sample)> {
        let producers = self.producers.lock();
        producers
            .iter()
            .map(|(name, producer)| {
                let sample = match producer {
                    Producer::Delta(counter) => Sample::Delta(counter.report_and_reset()),
                    Producer::Counter(counter) => Sample::Count(counter.count() as f64),
                    Producer::Gauge(f) => Sample::Gauge(f()),
                };
                (name.clone(), sample)
            })
            .collect()
    }

    /// Samples every registered producer and reports the values.
    ///
    /// Sampling happens before anything is sent, so a slow or failing send never delays reading the counters. Failed
    /// sends are logged and otherwise ignored; in particular, the delta sampled from a delta counter is not restored.
    pub fn report(&self) {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .ok()
            .and_then(|d| i64::try_from(d.as_secs()).ok());
        let tags = &self.config.tags;

        let samples = self.sample();
        let mut failed = 0usize;
        for (name, sample) in &samples {
            let result = match sample {
                Sample::Delta(value) => {
                    self.sender.send_delta_counter(&format!("{name}.count"), *value, None, "", tags)
                }
                Sample::Count(value) => {
                    self.sender.send_metric(&format!("{name}.count"), *value, timestamp, "", tags)
                }
                Sample::Gauge(value) => self.sender.send_metric(name, *value, timestamp, "", tags),
            };

            if let Err(e) = result {
                trace!(metric_name = name.as_str(), error = %e, "Failed to report internal metric.");
                failed += 1;
            }
        }

        if failed > 0 {
            debug!(reported = samples.len() - failed, failed, "Internal metrics report incomplete.");
        }
    }

    /// Starts reporting on the configured interval, if not already started.
    ///
    /// Starting a stopped registry does nothing.
    pub fn start(self: &Arc<Self>) -> std::io::Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() || self.stopped.load(Ordering::Acquire) {
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let registry = Arc::clone(self);
        let handle = thread::Builder::new().name("wavefront-sender-registry".to_string()).spawn(move || {
            let ticker = tick(registry.config.interval);
            loop {
                select! {
                    recv(ticker) -> _ => registry.report(),
                    recv(shutdown_rx) -> _ => break,
                }
            }
        })?;

        *worker = Some(Worker { shutdown_tx, handle });
        Ok(())
    }

    /// Stops periodic reporting, then performs one final report.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        let worker = self.worker.lock().take();
        if let Some(Worker { shutdown_tx, handle }) = worker {
            drop(shutdown_tx);
            if handle.join().is_err() {
                error!("Registry thread panicked.");
            }
        }

        self.report();
    }
}
