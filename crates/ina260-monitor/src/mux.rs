//! TCA9548A 1-to-8 I2C bus switch.
//!
//! The switch has no register pointer: its only register is the channel mask, written and
//! read as a single byte. A write replaces the previous mask outright, so selecting one
//! channel deselects every other one.
//!
//! Selection is state held by the chip, not by this process. Every transaction on the
//! bus after a select goes to the selected channel(s) whichever session issues it, so
//! selection and the device transactions that depend on it must happen under the same
//! `&mut` borrow of the bus.

use crate::{Error, Result};
use core::fmt;
use i2c_transport::{I2cAddress, I2cBus};
use tracing::debug;

pub const DEFAULT_ADDRESS: u8 = 0x70;
pub const CHANNEL_COUNT: u8 = 8;

/// Downstream channel number, always in `0..8`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ChannelIndex(u8);

impl ChannelIndex {
    pub fn new(index: i64) -> Result<Self> {
        match u8::try_from(index) {
            Ok(i) if i < CHANNEL_COUNT => Ok(Self(i)),
            _ => Err(Error::Config(format!(
                "channel must be between 0 and {}, got {index}",
                CHANNEL_COUNT - 1
            ))),
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for ChannelIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Absolute channel selection. Bits may be combined to fan out to several channels.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct ChannelMask(u8);

impl ChannelMask {
    pub const NONE: Self = Self(0);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn with(self, channel: ChannelIndex) -> Self {
        Self(self.0 | 1 << channel.get())
    }

    pub fn contains(self, channel: ChannelIndex) -> bool {
        self.0 & (1 << channel.get()) != 0
    }
}

impl From<ChannelIndex> for ChannelMask {
    fn from(channel: ChannelIndex) -> Self {
        Self(1 << channel.get())
    }
}

impl fmt::Display for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0b{:08b}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Tca9548a {
    address: I2cAddress,
}

impl Tca9548a {
    pub fn new(address: I2cAddress) -> Self {
        Self { address }
    }

    pub fn address(&self) -> I2cAddress {
        self.address
    }

    /// Write `mask` as the new selection.
    pub fn select_mask<B: I2cBus>(&self, bus: &mut B, mask: ChannelMask) -> Result<()> {
        bus.write(self.address, &[mask.bits()])?;
        debug!(mux = %self.address, %mask, "multiplexer mask written");
        Ok(())
    }

    /// Route the bus to exactly one channel. The index is validated before the bus is
    /// touched.
    pub fn select_channel<B: I2cBus>(&self, bus: &mut B, channel: i64) -> Result<ChannelIndex> {
        let channel = ChannelIndex::new(channel)?;
        self.select_mask(bus, channel.into())?;
        Ok(channel)
    }

    /// Read the control register back.
    pub fn selected_mask<B: I2cBus>(&self, bus: &mut B) -> Result<ChannelMask> {
        let mut buf = [0u8; 1];
        bus.read(self.address, &mut buf)?;
        Ok(ChannelMask(buf[0]))
    }

    pub fn disconnect_all<B: I2cBus>(&self, bus: &mut B) -> Result<()> {
        self.select_mask(bus, ChannelMask::NONE)
    }
}

/// Select `channel` on the multiplexer at `mux`.
pub fn select_channel<B: I2cBus>(bus: &mut B, mux: I2cAddress, channel: i64) -> Result<ChannelIndex> {
    Tca9548a::new(mux).select_channel(bus, channel)
}
