use crate::device::Measurement;
use crate::Result;
use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::{Arc, Mutex};

const LABELS: [&str; 2] = ["hostname", "device"];

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Quantity {
    Current,
    Voltage,
    Power,
}

impl Quantity {
    pub const ALL: [Quantity; 3] = [Quantity::Current, Quantity::Voltage, Quantity::Power];

    /// Exported metric name.
    pub fn name(self) -> &'static str {
        match self {
            Quantity::Current => "current",
            Quantity::Voltage => "voltage",
            Quantity::Power => "power",
        }
    }

    fn help(self) -> &'static str {
        match self {
            Quantity::Current => "Current measured by the INA260 in amperes",
            Quantity::Voltage => "Bus voltage measured by the INA260 in volts",
            Quantity::Power => "Power measured by the INA260 in watts",
        }
    }
}

/// Identifies one physical sensor across every deployment scraped by a shared collector.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SampleLabels {
    pub hostname: String,
    pub device: String,
}

impl SampleLabels {
    fn values(&self) -> [&str; 2] {
        [self.hostname.as_str(), self.device.as_str()]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub quantity: Quantity,
    pub labels: SampleLabels,
    pub value: f64,
}

impl Sample {
    pub fn name(&self) -> &'static str {
        self.quantity.name()
    }

    pub fn from_measurement(m: &Measurement, labels: &SampleLabels) -> [Sample; 3] {
        Quantity::ALL.map(|quantity| Sample {
            quantity,
            labels: labels.clone(),
            value: match quantity {
                Quantity::Current => m.current,
                Quantity::Voltage => m.voltage,
                Quantity::Power => m.power,
            },
        })
    }
}

/// Destination for samples produced by the poller. Implementations are shared with the
/// exposition side, hence `Send + Sync` and `&self`.
pub trait MetricsSink: Send + Sync {
    fn publish(&self, sample: &Sample);

    /// A polling cycle produced no measurement.
    fn record_failure(&self, _labels: &SampleLabels) {}
}

/// Prometheus-backed sink. Clones share the same registry.
#[derive(Clone)]
pub struct MetricsHub {
    registry: Registry,
    current: GaugeVec,
    voltage: GaugeVec,
    power: GaugeVec,
    read_errors: IntCounterVec,
}

impl MetricsHub {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let gauge = |q: Quantity| GaugeVec::new(Opts::new(q.name(), q.help()), &LABELS);
        let current = gauge(Quantity::Current)?;
        let voltage = gauge(Quantity::Voltage)?;
        let power = gauge(Quantity::Power)?;
        let read_errors = IntCounterVec::new(
            Opts::new(
                "ina260_read_errors_total",
                "Polling cycles skipped because a register read failed",
            ),
            &LABELS,
        )?;
        registry.register(Box::new(current.clone()))?;
        registry.register(Box::new(voltage.clone()))?;
        registry.register(Box::new(power.clone()))?;
        registry.register(Box::new(read_errors.clone()))?;
        Ok(Self {
            registry,
            current,
            voltage,
            power,
            read_errors,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn gauge(&self, quantity: Quantity) -> &GaugeVec {
        match quantity {
            Quantity::Current => &self.current,
            Quantity::Voltage => &self.voltage,
            Quantity::Power => &self.power,
        }
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl MetricsSink for MetricsHub {
    fn publish(&self, sample: &Sample) {
        self.gauge(sample.quantity)
            .with_label_values(&sample.labels.values())
            .set(sample.value);
    }

    fn record_failure(&self, labels: &SampleLabels) {
        self.read_errors.with_label_values(&labels.values()).inc();
    }
}

/// In-memory sink that keeps every sample, for tests and dry runs.
#[derive(Clone, Default)]
pub struct RecordingSink {
    samples: Arc<Mutex<Vec<Sample>>>,
    failures: Arc<Mutex<u64>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<Sample> {
        self.samples
            .lock()
            .map(|s| s.to_vec())
            .unwrap_or_else(|poisoned| poisoned.into_inner().to_vec())
    }

    pub fn failures(&self) -> u64 {
        self.failures.lock().map(|f| *f).unwrap_or_else(|p| *p.into_inner())
    }
}

impl MetricsSink for RecordingSink {
    fn publish(&self, sample: &Sample) {
        let mut samples = self.samples.lock().unwrap_or_else(|p| p.into_inner());
        samples.push(sample.clone());
    }

    fn record_failure(&self, _labels: &SampleLabels) {
        let mut failures = self.failures.lock().unwrap_or_else(|p| p.into_inner());
        *failures += 1;
    }
}
