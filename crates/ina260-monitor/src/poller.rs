//! Fixed-cadence polling of one INA260 session into a metrics sink.

use crate::device::{Ina260, Measurement};
use crate::metrics::{MetricsSink, Sample, SampleLabels};
use crate::Result;
use i2c_transport::I2cBus;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Consecutive failures after which each further failure is logged at error level.
const PERSISTENT_FAILURE_CYCLES: u64 = 10;

/// Owns the session (and through it the bus) for the life of the process.
///
/// A failed cycle publishes nothing and is simply retried one interval later. There is
/// no backoff and no retry ceiling, and no timeout on the transactions themselves: a
/// bus that never completes a transfer blocks the poller thread.
pub struct Poller<B, S> {
    session: Ina260<B>,
    sink: S,
    labels: SampleLabels,
    interval: Duration,
    consecutive_failures: u64,
}

impl<B: I2cBus, S: MetricsSink> Poller<B, S> {
    pub fn new(session: Ina260<B>, sink: S, labels: SampleLabels, interval: Duration) -> Self {
        Self {
            session,
            sink,
            labels,
            interval,
            consecutive_failures: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures
    }

    /// One cycle without the trailing sleep: read, then publish all three samples or
    /// none of them.
    pub fn poll_once(&mut self) -> Result<Measurement> {
        match self.session.read_measurement() {
            Ok(m) => {
                if self.consecutive_failures > 0 {
                    info!(
                        skipped = self.consecutive_failures,
                        "INA260 readings recovered"
                    );
                    self.consecutive_failures = 0;
                }
                info!(
                    "Voltage: {:.3} V, Current: {:.3} A, Power: {:.3} W",
                    m.voltage, m.current, m.power
                );
                debug!(taken_at = %m.taken_at, device = %self.labels.device, "publishing samples");
                for sample in Sample::from_measurement(&m, &self.labels) {
                    self.sink.publish(&sample);
                }
                Ok(m)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                self.sink.record_failure(&self.labels);
                if self.consecutive_failures >= PERSISTENT_FAILURE_CYCLES {
                    error!(
                        failures = self.consecutive_failures,
                        "error reading INA260: {e}"
                    );
                } else {
                    warn!(
                        failures = self.consecutive_failures,
                        "error reading INA260: {e}"
                    );
                }
                Err(e)
            }
        }
    }

    /// Run `cycles` iterations, sleeping the interval after each one.
    pub fn run_cycles(&mut self, cycles: usize) {
        for _ in 0..cycles {
            let _ = self.poll_once();
            thread::sleep(self.interval);
        }
    }

    /// Poll forever. Only process termination stops this.
    pub fn run(mut self) -> ! {
        info!(
            interval = ?self.interval,
            device = %self.labels.device,
            "Reading INA260 values (Voltage, Current, Power)"
        );
        loop {
            let _ = self.poll_once();
            thread::sleep(self.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Register;
    use crate::metrics::{Quantity, RecordingSink};
    use i2c_transport::{I2cAddress, MockBus, MockHandle};
    use std::time::Instant;

    fn labels() -> SampleLabels {
        SampleLabels {
            hostname: "bench".to_string(),
            device: "tca0x70_ch0_ina260".to_string(),
        }
    }

    fn poller() -> anyhow::Result<(Poller<MockBus, RecordingSink>, MockHandle, RecordingSink)> {
        let bus = MockBus::open("mock0")?;
        let h = bus.handle();
        let dev = I2cAddress::new(0x40).ok_or_else(|| anyhow::anyhow!("addr"))?;
        h.set_register(dev, Register::Current.addr(), 0xFFFF);
        h.set_register(dev, Register::BusVoltage.addr(), 0x2580);
        h.set_register(dev, Register::Power.addr(), 0x0001);
        let sink = RecordingSink::new();
        let p = Poller::new(Ina260::open(bus, dev), sink.clone(), labels(), Duration::ZERO);
        Ok((p, h, sink))
    }

    #[test]
    fn test_success_publishes_three_samples() -> anyhow::Result<()> {
        let (mut p, _h, sink) = poller()?;
        p.poll_once()?;
        let samples = sink.samples();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].quantity, Quantity::Current);
        assert!((samples[0].value + 0.00125).abs() < 1e-9);
        assert_eq!(samples[1].value, 12.0);
        assert_eq!(samples[2].value, 0.01);
        Ok(())
    }

    #[test]
    fn test_failure_in_middle_read_publishes_nothing() -> anyhow::Result<()> {
        let (mut p, h, sink) = poller()?;
        let dev = I2cAddress::new(0x40).ok_or_else(|| anyhow::anyhow!("addr"))?;
        h.remove_register(dev, Register::BusVoltage.addr());

        assert!(p.poll_once().is_err());
        assert!(sink.samples().is_empty());
        assert_eq!(sink.failures(), 1);
        assert_eq!(p.consecutive_failures(), 1);
        // Current then voltage were attempted; power never was.
        assert_eq!(h.transactions().len(), 2);

        h.set_register(dev, Register::BusVoltage.addr(), 0x2580);
        p.poll_once()?;
        assert_eq!(sink.samples().len(), 3);
        assert_eq!(p.consecutive_failures(), 0);
        Ok(())
    }

    #[test]
    fn test_failed_cycles_wait_out_the_interval() -> anyhow::Result<()> {
        let (p, h, sink) = poller()?;
        let mut p = Poller {
            interval: Duration::from_millis(20),
            ..p
        };
        h.fail_next(3);

        let started = Instant::now();
        p.run_cycles(3);
        assert!(started.elapsed() >= Duration::from_millis(60));
        // One attempt per interval, even while every read fails.
        assert_eq!(h.transactions().len(), 3);
        assert_eq!(sink.failures(), 3);
        assert!(sink.samples().is_empty());
        Ok(())
    }

    #[test]
    fn test_sustained_failures_retry_every_cycle() -> anyhow::Result<()> {
        let (mut p, h, sink) = poller()?;
        h.fail_next(5);
        p.run_cycles(5);
        assert_eq!(sink.failures(), 5);
        assert!(sink.samples().is_empty());
        // One attempted transaction per failed cycle: no immediate retries.
        assert_eq!(h.transactions().len(), 5);

        p.run_cycles(1);
        assert_eq!(sink.samples().len(), 3);
        Ok(())
    }
}
