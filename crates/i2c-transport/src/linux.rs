use crate::{BusInfo, I2cAddress, I2cBus, Result, TransportError};
use embedded_hal::i2c::I2c;
use linux_embedded_hal::I2cdev;
use std::fs;
use tracing::debug;

/// Linux i2c-dev master (e.g. `/dev/i2c-1` on a Raspberry Pi). The file descriptor is
/// closed when the bus is dropped.
pub struct LinuxBus {
    path: String,
    dev: I2cdev,
}

impl LinuxBus {
    pub fn path(&self) -> &str {
        &self.path
    }
}

fn io_err(op: &str, addr: I2cAddress, e: impl core::fmt::Debug) -> TransportError {
    TransportError::Io(format!("{op} at {addr}: {e:?}"))
}

impl I2cBus for LinuxBus {
    fn open(path: &str) -> Result<Self> {
        if fs::metadata(path).is_err() {
            return Err(TransportError::InterfaceNotFound(path.to_string()));
        }
        let dev = I2cdev::new(path).map_err(|e| TransportError::Io(format!("{path}: {e:?}")))?;
        debug!(path, "opened i2c-dev bus");
        Ok(Self {
            path: path.to_string(),
            dev,
        })
    }

    fn list() -> Result<Vec<BusInfo>> {
        let mut out = Vec::new();
        for entry in fs::read_dir("/dev").map_err(|e| TransportError::Io(e.to_string()))? {
            let entry = entry.map_err(|e| TransportError::Io(e.to_string()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("i2c-") {
                out.push(BusInfo {
                    name: format!("/dev/{name}"),
                    driver: "i2c-dev".to_string(),
                });
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    fn write(&mut self, addr: I2cAddress, bytes: &[u8]) -> Result<()> {
        self.dev
            .write(addr.raw(), bytes)
            .map_err(|e| io_err("write", addr, e))
    }

    fn read(&mut self, addr: I2cAddress, buf: &mut [u8]) -> Result<()> {
        self.dev
            .read(addr.raw(), buf)
            .map_err(|e| io_err("read", addr, e))
    }

    fn write_read(&mut self, addr: I2cAddress, bytes: &[u8], buf: &mut [u8]) -> Result<()> {
        self.dev
            .write_read(addr.raw(), bytes, buf)
            .map_err(|e| io_err("write_read", addr, e))
    }
}
