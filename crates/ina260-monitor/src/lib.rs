//! ina260-monitor: INA260 power readings through a TCA9548A bus switch
//!
//! Every INA260 answers at the same address, so each sensor sits on its own downstream
//! channel of a TCA9548A. A [`device::attach`] call selects the channel, checks the
//! sensor identity and yields an [`Ina260`] session; a [`Poller`] then reads it on a
//! fixed cadence and publishes [`Sample`]s into a [`MetricsSink`].

mod error;
pub use error::{Error, Result};

pub mod codec;
pub use codec::Register;

pub mod mux;
pub use mux::{ChannelIndex, ChannelMask, Tca9548a};

pub mod device;
pub use device::{attach, DeviceIdentity, Ina260, Measurement};

mod config;
pub use config::{
    load_config_file, parse_address, parse_channel, AddressValue, ConfigFile, MonitorConfig,
};

mod metrics;
pub use metrics::{MetricsHub, MetricsSink, Quantity, RecordingSink, Sample, SampleLabels};

mod poller;
pub use poller::Poller;
