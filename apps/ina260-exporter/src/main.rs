use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::thread;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use i2c_transport::{I2cBus, MockBus};
use ina260_monitor::{
    attach, load_config_file, parse_address, parse_channel, AddressValue, ConfigFile,
    MetricsHub, MonitorConfig, Poller, Register,
};

mod server;

const DEFAULT_LISTEN: &str = "0.0.0.0:9090";

#[derive(Parser, Debug)]
#[command(
    name = "ina260-exporter",
    version,
    about = "Export INA260 voltage, current and power behind a TCA9548A as Prometheus gauges",
    allow_negative_numbers = true
)]
struct Cli {
    /// TCA9548A address, decimal or 0x-prefixed hex [default: 0x70]
    mux_address: Option<String>,

    /// Multiplexer channel the INA260 is wired to, 0-7 [default: 0]
    channel: Option<String>,

    /// I2C bus device node [default: /dev/i2c-1]
    #[arg(long)]
    bus: Option<String>,

    /// INA260 address on the selected channel [default: 0x40]
    #[arg(long)]
    device_address: Option<String>,

    /// Address for the metrics HTTP server [default: 0.0.0.0:9090]
    #[arg(long)]
    listen: Option<String>,

    /// Delay between polling cycles in milliseconds [default: 1000]
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Value of the `hostname` label [default: this machine's hostname]
    #[arg(long)]
    hostname: Option<String>,

    /// YAML file with the same settings; command-line values take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use an in-process mock bus with a simulated sensor
    #[arg(long, action = ArgAction::SetTrue)]
    mock: bool,

    /// List I2C buses for the selected backend and exit
    #[arg(long, action = ArgAction::SetTrue)]
    list_buses: bool,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    /// Settings given on the command line, validated early so bad input fails before
    /// the config file is even read.
    fn overlay(&self) -> Result<ConfigFile> {
        let mux_address = match &self.mux_address {
            Some(s) => {
                parse_address(s).context("multiplexer address")?;
                Some(AddressValue::Text(s.clone()))
            }
            None => None,
        };
        let channel = match &self.channel {
            Some(s) => Some(i64::from(parse_channel(s).context("channel")?.get())),
            None => None,
        };
        let device_address = match &self.device_address {
            Some(s) => {
                parse_address(s).context("device address")?;
                Some(AddressValue::Text(s.clone()))
            }
            None => None,
        };
        Ok(ConfigFile {
            bus: self.bus.clone(),
            mux_address,
            channel,
            device_address,
            hostname: self.hostname.clone(),
            interval_ms: self.interval_ms,
            listen: self.listen.clone(),
        })
    }
}

/// Sensor bring-up is blocking I2C, so it runs before the async runtime exists; only
/// the HTTP server lives on tokio.
fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(&cli.log_level);

    if cli.list_buses {
        return list_buses(cli.mock);
    }

    let (cfg, listen) = resolve(&cli)?;
    info!(
        "Using TCA9548A at address {} channel {} on {}",
        cfg.mux,
        cfg.channel,
        if cli.mock { "mock bus" } else { cfg.bus.as_str() }
    );

    let hub = MetricsHub::new().context("creating metrics registry")?;
    if cli.mock {
        let bus = mock_sensor_bus(&cfg)?;
        start_poller(bus, &cfg, hub.clone())?;
    } else {
        start_poller(open_hardware_bus(&cfg)?, &cfg, hub.clone())?;
    }

    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    runtime.block_on(server::serve(listen, hub))
}

fn setup_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::default().add_directive(level.into())
    });
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn resolve(cli: &Cli) -> Result<(MonitorConfig, SocketAddr)> {
    let overlay = cli.overlay()?;
    let base = match &cli.config {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };
    let merged = base.merge(overlay);
    let cfg = merged.resolve(&local_hostname())?;
    let listen_str = merged.listen.as_deref().unwrap_or(DEFAULT_LISTEN);
    let listen: SocketAddr = listen_str
        .parse()
        .with_context(|| format!("invalid listen address {listen_str:?}"))?;
    Ok((cfg, listen))
}

fn local_hostname() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            warn!("could not determine hostname ({e}); labeling as \"unknown\"");
            "unknown".to_string()
        }
    }
}

fn list_buses(mock: bool) -> Result<()> {
    let buses = if mock {
        MockBus::list()?
    } else {
        hardware_buses()?
    };
    for bus in buses {
        println!("{}\t{}", bus.name, bus.driver);
    }
    Ok(())
}

#[cfg(feature = "linux")]
fn hardware_buses() -> Result<Vec<i2c_transport::BusInfo>> {
    Ok(i2c_transport::LinuxBus::list()?)
}

#[cfg(not(feature = "linux"))]
fn hardware_buses() -> Result<Vec<i2c_transport::BusInfo>> {
    anyhow::bail!("built without the linux backend; only --mock is available")
}

#[cfg(feature = "linux")]
fn open_hardware_bus(cfg: &MonitorConfig) -> Result<i2c_transport::LinuxBus> {
    let bus = i2c_transport::LinuxBus::open(&cfg.bus)
        .with_context(|| format!("opening I2C bus {}", cfg.bus))?;
    info!("I2C bus {} initialized", bus.path());
    Ok(bus)
}

#[cfg(not(feature = "linux"))]
fn open_hardware_bus(_cfg: &MonitorConfig) -> Result<MockBus> {
    anyhow::bail!("built without the linux backend; rerun with --mock")
}

/// Mock bus answering like a switch with a healthy INA260 on a 12 V rail drawing 0.5 A.
fn mock_sensor_bus(cfg: &MonitorConfig) -> Result<MockBus> {
    let bus = MockBus::open("mock0")?;
    let h = bus.handle();
    h.add_latch(cfg.mux);
    let regs = [
        (Register::ManufacturerId, 0x5449),
        (Register::DeviceId, 0x2260),
        (Register::Current, 0x0190),
        (Register::BusVoltage, 0x2580),
        (Register::Power, 0x0258),
    ];
    for (reg, value) in regs {
        h.set_register(cfg.device, reg.addr(), value);
    }
    info!("I2C bus {} initialized (mock)", bus.name());
    Ok(bus)
}

/// Bring the sensor up on this thread, so setup failures end the process, then hand
/// the session to a dedicated polling thread.
fn start_poller<B>(bus: B, cfg: &MonitorConfig, hub: MetricsHub) -> Result<thread::JoinHandle<()>>
where
    B: I2cBus + Send + 'static,
{
    let session = attach(bus, cfg.multiplexer(), cfg.channel, cfg.device).with_context(|| {
        format!(
            "bringing up INA260 at {} behind TCA9548A {} channel {}",
            cfg.device, cfg.mux, cfg.channel
        )
    })?;
    let poller = Poller::new(session, hub, cfg.labels(), cfg.interval);
    let handle = thread::Builder::new()
        .name("ina260-poller".to_string())
        .spawn(move || {
            poller.run();
        })
        .context("spawning poller thread")?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli> {
        Ok(Cli::try_parse_from(args)?)
    }

    #[test]
    fn test_positional_defaults() -> Result<()> {
        let cli = parse(&["ina260-exporter", "--hostname", "h"])?;
        let (cfg, listen) = resolve(&cli)?;
        assert_eq!(cfg.mux.raw(), 0x70);
        assert_eq!(cfg.channel.get(), 0);
        assert_eq!(listen.port(), 9090);
        assert_eq!(cfg.device_label(), "tca0x70_ch0_ina260");
        Ok(())
    }

    #[test]
    fn test_positional_address_and_channel() -> Result<()> {
        let cli = parse(&["ina260-exporter", "0x71", "6", "--hostname", "h"])?;
        let (cfg, _) = resolve(&cli)?;
        assert_eq!(cfg.mux.raw(), 0x71);
        assert_eq!(cfg.channel.get(), 6);
        let cli = parse(&["ina260-exporter", "113", "6", "--hostname", "h"])?;
        assert_eq!(resolve(&cli)?.0.mux.raw(), 0x71);
        Ok(())
    }

    #[test]
    fn test_invalid_values_fail_before_io() -> Result<()> {
        for args in [
            vec!["ina260-exporter", "0x70", "8"],
            vec!["ina260-exporter", "0x70", "-1"],
            vec!["ina260-exporter", "bogus", "0"],
            vec!["ina260-exporter", "0x70", "0", "--listen", "nowhere"],
            vec!["ina260-exporter", "0x70", "0", "--interval-ms", "0"],
        ] {
            let cli = parse(&args)?;
            assert!(resolve(&cli).is_err(), "{args:?}");
        }
        Ok(())
    }

    #[test]
    fn test_mock_pipeline_publishes() -> Result<()> {
        let cli = parse(&["ina260-exporter", "0x70", "3", "--hostname", "h", "--mock"])?;
        let (cfg, _) = resolve(&cli)?;
        let bus = mock_sensor_bus(&cfg)?;
        let hub = MetricsHub::new()?;
        let session = attach(bus, cfg.multiplexer(), cfg.channel, cfg.device)?;
        let mut poller = Poller::new(session, hub.clone(), cfg.labels(), std::time::Duration::ZERO);
        poller.poll_once()?;
        let text = hub.encode_text();
        assert!(text.contains(r#"voltage{device="tca0x70_ch3_ina260",hostname="h"} 12"#));
        assert!(text.contains(r#"current{device="tca0x70_ch3_ina260",hostname="h"} 0.5"#));
        Ok(())
    }

    #[test]
    fn test_bring_up_runs_without_a_runtime() -> Result<()> {
        let cli = parse(&[
            "ina260-exporter", "0x70", "3", "--hostname", "h", "--mock", "--interval-ms", "10",
        ])?;
        let (cfg, _) = resolve(&cli)?;
        assert!(tokio::runtime::Handle::try_current().is_err());

        let hub = MetricsHub::new()?;
        let handle = start_poller(mock_sensor_bus(&cfg)?, &cfg, hub.clone())?;
        assert_eq!(handle.thread().name(), Some("ina260-poller"));

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while !hub.encode_text().contains("tca0x70_ch3_ina260") {
            anyhow::ensure!(std::time::Instant::now() < deadline, "poller never published");
            thread::sleep(std::time::Duration::from_millis(5));
        }
        Ok(())
    }
}
