//! INA260 register access and LSB scaling.
//!
//! All registers are 16 bits, transferred MSB first. Scaling factors come from the
//! datasheet: 1.25 mA/LSB for current, 1.25 mV/LSB for bus voltage, 10 mW/LSB for power.

use crate::Result;
use i2c_transport::{I2cAddress, I2cBus};
use tracing::trace;

pub const CURRENT_LSB_MA: f64 = 1.25;
pub const VOLTAGE_LSB_MV: f64 = 1.25;
pub const POWER_LSB_MW: f64 = 10.0;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Register {
    Current = 0x01,
    BusVoltage = 0x02,
    Power = 0x03,
    ManufacturerId = 0xFE,
    DeviceId = 0xFF,
}

impl Register {
    pub fn addr(self) -> u8 {
        self as u8
    }
}

/// Write the register pointer then read two bytes back, in one transaction.
pub fn read_register<B: I2cBus>(bus: &mut B, device: I2cAddress, reg: Register) -> Result<u16> {
    let mut buf = [0u8; 2];
    bus.write_read(device, &[reg.addr()], &mut buf)?;
    let raw = u16::from_be_bytes(buf);
    trace!(%device, register = ?reg, raw, "register read");
    Ok(raw)
}

/// Bus voltage in volts. The register is unsigned.
pub fn decode_voltage(raw: u16) -> f64 {
    f64::from(raw) * VOLTAGE_LSB_MV / 1000.0
}

/// Current in amperes. The register is two's complement: negative values mean current
/// flowing from load to supply.
pub fn decode_current(raw: u16) -> f64 {
    f64::from(raw as i16) * CURRENT_LSB_MA / 1000.0
}

/// Power in watts. The INA260 reports magnitude only, so this is never negative.
pub fn decode_power(raw: u16) -> f64 {
    f64::from(raw) * POWER_LSB_MW / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use i2c_transport::{MockBus, Transaction};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_current_is_signed() {
        assert!(close(decode_current(0xFFFF), -0.00125));
        assert!(close(decode_current(0x0001), 0.00125));
        assert!(close(decode_current(0x7FFF), 40.95875));
        assert!(close(decode_current(0x8000), -40.96));
        assert!(close(decode_current(0x0010), 0.02));
    }

    #[test]
    fn test_voltage_and_power_scaling() {
        assert_eq!(decode_voltage(0x0190), 0.5);
        assert_eq!(decode_power(0x0064), 1.0);
        assert!(decode_power(0xFFFF) > 0.0);
        assert!(close(decode_voltage(0xFFFF), 81.91875));
    }

    #[test]
    fn test_read_register_sends_pointer_then_reads_two_bytes() -> anyhow::Result<()> {
        let mut bus = MockBus::open("mock0")?;
        let h = bus.handle();
        let dev = I2cAddress::new(0x40).ok_or_else(|| anyhow::anyhow!("addr"))?;
        h.set_register(dev, Register::ManufacturerId.addr(), 0x5449);

        let raw = read_register(&mut bus, dev, Register::ManufacturerId)?;
        assert_eq!(raw, 0x5449);
        assert_eq!(
            h.transactions(),
            vec![Transaction::WriteRead {
                addr: 0x40,
                bytes: vec![0xFE],
                len: 2
            }]
        );
        Ok(())
    }

    #[test]
    fn test_read_register_propagates_bus_error() -> anyhow::Result<()> {
        let mut bus = MockBus::open("mock0")?;
        let dev = I2cAddress::new(0x40).ok_or_else(|| anyhow::anyhow!("addr"))?;
        assert!(read_register(&mut bus, dev, Register::Current).is_err());
        Ok(())
    }
}
