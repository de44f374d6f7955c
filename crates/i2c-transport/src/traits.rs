use crate::{BusInfo, I2cAddress, Result, TransportError};

/// A minimal blocking I2C master interface.
///
/// Every method addresses one slave and completes one bus transaction. Implementations
/// own the underlying bus; callers needing several transactions to be seen as a unit
/// (multiplexer selection followed by device access) hold `&mut` across them.
pub trait I2cBus {
    /// Open an I2C master by name (e.g., "/dev/i2c-1", "mock0").
    fn open(name: &str) -> Result<Self>
    where
        Self: Sized;

    /// Attempt to list available buses for this backend.
    fn list() -> Result<Vec<BusInfo>>;

    /// Write-only transaction.
    fn write(&mut self, addr: I2cAddress, bytes: &[u8]) -> Result<()>;

    /// Read-only transaction.
    fn read(&mut self, _addr: I2cAddress, _buf: &mut [u8]) -> Result<()> {
        Err(TransportError::Unsupported("plain reads not supported"))
    }

    /// Write then read with a repeated start, typically a register pointer followed by
    /// the register contents.
    fn write_read(&mut self, addr: I2cAddress, bytes: &[u8], buf: &mut [u8]) -> Result<()>;
}
