//! INA260 session over an owned bus handle.

use crate::codec::{self, read_register, Register};
use crate::mux::{ChannelIndex, ChannelMask, Tca9548a};
use crate::Result;
use i2c_transport::{I2cAddress, I2cBus};
use time::OffsetDateTime;
use tracing::{info, warn};

/// Fixed address of every INA260 in this deployment (A0 = A1 = GND).
pub const DEFAULT_ADDRESS: u8 = 0x40;
/// Texas Instruments ("TI" in ASCII).
pub const EXPECTED_MANUFACTURER_ID: u16 = 0x5449;
pub const EXPECTED_DEVICE_ID: u16 = 0x2260;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DeviceIdentity {
    pub manufacturer_id: u16,
    pub device_id: u16,
}

impl DeviceIdentity {
    pub fn is_expected(&self) -> bool {
        self.manufacturer_id == EXPECTED_MANUFACTURER_ID && self.device_id == EXPECTED_DEVICE_ID
    }
}

/// One reading of the three quantities. The registers are read back to back, not
/// latched together, so the fields may straddle a conversion boundary.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measurement {
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
    pub taken_at: OffsetDateTime,
}

pub struct Ina260<B> {
    bus: B,
    address: I2cAddress,
}

impl<B: I2cBus> Ina260<B> {
    /// Wrap the bus. No transaction is issued; the caller has already routed the bus to
    /// the sensor's channel.
    pub fn open(bus: B, address: I2cAddress) -> Self {
        Self { bus, address }
    }

    pub fn address(&self) -> I2cAddress {
        self.address
    }

    /// Read manufacturer and die IDs. A mismatch is only warned about: some clones
    /// report other IDs yet behave identically.
    pub fn identify(&mut self) -> Result<DeviceIdentity> {
        let manufacturer_id = read_register(&mut self.bus, self.address, Register::ManufacturerId)?;
        let device_id = read_register(&mut self.bus, self.address, Register::DeviceId)?;
        let identity = DeviceIdentity {
            manufacturer_id,
            device_id,
        };
        if identity.is_expected() {
            info!(
                "INA260: manufacturer ID 0x{manufacturer_id:04X}, device ID 0x{device_id:04X}"
            );
        } else {
            warn!(
                "unexpected INA260 identity: expected 0x{EXPECTED_MANUFACTURER_ID:04X}/0x{EXPECTED_DEVICE_ID:04X}, got 0x{manufacturer_id:04X}/0x{device_id:04X}"
            );
        }
        Ok(identity)
    }

    /// Current, bus voltage, then power. The first failing read aborts the measurement.
    pub fn read_measurement(&mut self) -> Result<Measurement> {
        let current = read_register(&mut self.bus, self.address, Register::Current)?;
        let voltage = read_register(&mut self.bus, self.address, Register::BusVoltage)?;
        let power = read_register(&mut self.bus, self.address, Register::Power)?;
        Ok(Measurement {
            voltage: codec::decode_voltage(voltage),
            current: codec::decode_current(current),
            power: codec::decode_power(power),
            taken_at: OffsetDateTime::now_utc(),
        })
    }

}

/// One-time bring-up: route the bus to `channel`, then open and identify the sensor.
/// Select and identify errors are setup failures. The control register readback that
/// confirms the selection is advisory: a mismatch or a failed read only warns.
pub fn attach<B: I2cBus>(
    mut bus: B,
    mux: Tca9548a,
    channel: ChannelIndex,
    device: I2cAddress,
) -> Result<Ina260<B>> {
    let selected = mux.select_channel(&mut bus, i64::from(channel.get()))?;
    match mux.selected_mask(&mut bus) {
        Ok(readback) if readback == ChannelMask::from(selected) => {
            info!("TCA9548A at {}: selected channel {selected}", mux.address());
        }
        Ok(readback) => warn!(
            "TCA9548A at {}: wrote channel {selected} but control register reads {readback}",
            mux.address()
        ),
        Err(e) => warn!(
            "TCA9548A at {}: selected channel {selected}, readback unavailable: {e}",
            mux.address()
        ),
    }

    let mut session = Ina260::open(bus, device);
    session.identify()?;
    Ok(session)
}
