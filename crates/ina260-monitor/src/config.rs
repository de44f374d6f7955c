use crate::device;
use crate::metrics::SampleLabels;
use crate::mux::{self, ChannelIndex, Tca9548a};
use crate::{Error, Result};
use anyhow::Context;
use i2c_transport::I2cAddress;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BUS: &str = "/dev/i2c-1";
pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// Parse a 7-bit address written in decimal or with a `0x`, `0o` or `0b` prefix.
pub fn parse_address(s: &str) -> Result<I2cAddress> {
    let t = s.trim();
    let lower = t.to_ascii_lowercase();
    let (digits, radix) = if let Some(rest) = lower.strip_prefix("0x") {
        (rest, 16)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (rest, 8)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (rest, 2)
    } else {
        (lower.as_str(), 10)
    };
    let value = u64::from_str_radix(digits, radix)
        .map_err(|e| Error::Config(format!("invalid I2C address {s:?}: {e}")))?;
    I2cAddress::try_from(value)
        .map_err(|_| Error::Config(format!("I2C address {s:?} does not fit in 7 bits")))
}

/// Parse a decimal channel number and check it against the switch's eight channels.
pub fn parse_channel(s: &str) -> Result<ChannelIndex> {
    let value: i64 = s
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid channel number {s:?}: {e}")))?;
    ChannelIndex::new(value)
}

/// Integer or string in a YAML file; `0x70` and `"0x70"` are both accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AddressValue {
    Int(u64),
    Text(String),
}

impl AddressValue {
    fn resolve(&self) -> Result<I2cAddress> {
        match self {
            AddressValue::Int(v) => I2cAddress::try_from(*v)
                .map_err(|_| Error::Config(format!("I2C address {v} does not fit in 7 bits"))),
            AddressValue::Text(s) => parse_address(s),
        }
    }
}

/// Unvalidated settings, as read from YAML or collected from the command line.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub bus: Option<String>,
    #[serde(default)]
    pub mux_address: Option<AddressValue>,
    #[serde(default)]
    pub channel: Option<i64>,
    #[serde(default)]
    pub device_address: Option<AddressValue>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub interval_ms: Option<u64>,
    #[serde(default)]
    pub listen: Option<String>,
}

impl ConfigFile {
    /// Values set in `over` replace ours.
    pub fn merge(self, over: ConfigFile) -> ConfigFile {
        ConfigFile {
            bus: over.bus.or(self.bus),
            mux_address: over.mux_address.or(self.mux_address),
            channel: over.channel.or(self.channel),
            device_address: over.device_address.or(self.device_address),
            hostname: over.hostname.or(self.hostname),
            interval_ms: over.interval_ms.or(self.interval_ms),
            listen: over.listen.or(self.listen),
        }
    }

    /// Validate into a [`MonitorConfig`], filling gaps with defaults. `default_hostname`
    /// is used when no hostname was configured.
    pub fn resolve(&self, default_hostname: &str) -> Result<MonitorConfig> {
        let mux = match &self.mux_address {
            Some(v) => v.resolve()?,
            None => I2cAddress::new(mux::DEFAULT_ADDRESS)
                .ok_or_else(|| Error::Config("default multiplexer address".into()))?,
        };
        let channel = ChannelIndex::new(self.channel.unwrap_or(0))?;
        let device = match &self.device_address {
            Some(v) => v.resolve()?,
            None => I2cAddress::new(device::DEFAULT_ADDRESS)
                .ok_or_else(|| Error::Config("default device address".into()))?,
        };
        if device == mux {
            return Err(Error::Config(format!(
                "device address {device} collides with the multiplexer"
            )));
        }
        let interval_ms = self.interval_ms.unwrap_or(DEFAULT_INTERVAL_MS);
        if interval_ms == 0 {
            return Err(Error::Config("polling interval must be at least 1 ms".into()));
        }
        let hostname = self
            .hostname
            .clone()
            .unwrap_or_else(|| default_hostname.to_string());
        if hostname.is_empty() {
            return Err(Error::Config("hostname label must not be empty".into()));
        }
        Ok(MonitorConfig {
            bus: self.bus.clone().unwrap_or_else(|| DEFAULT_BUS.to_string()),
            mux,
            channel,
            device,
            hostname,
            interval: Duration::from_millis(interval_ms),
        })
    }
}

pub fn load_config_file(path: impl AsRef<Path>) -> anyhow::Result<ConfigFile> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading config: {}", path.display()))?;
    let file: ConfigFile =
        serde_yaml::from_str(&raw).with_context(|| format!("parsing yaml: {}", path.display()))?;
    Ok(file)
}

/// Validated, immutable settings for one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub bus: String,
    pub mux: I2cAddress,
    pub channel: ChannelIndex,
    pub device: I2cAddress,
    pub hostname: String,
    pub interval: Duration,
}

impl MonitorConfig {
    pub fn multiplexer(&self) -> Tca9548a {
        Tca9548a::new(self.mux)
    }

    /// `tca0x70_ch3_ina260` style label naming the switch and channel.
    pub fn device_label(&self) -> String {
        format!("tca{:#x}_ch{}_ina260", self.mux.raw(), self.channel)
    }

    pub fn labels(&self) -> SampleLabels {
        SampleLabels {
            hostname: self.hostname.clone(),
            device: self.device_label(),
        }
    }
}
