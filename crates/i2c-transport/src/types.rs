use core::fmt;

/// 7-bit I2C slave address
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct I2cAddress(u8);

impl I2cAddress {
    pub const MAX: u8 = 0x7F;

    pub const fn new(addr: u8) -> Option<Self> {
        if addr <= Self::MAX {
            Some(Self(addr))
        } else {
            None
        }
    }

    pub fn raw(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u64> for I2cAddress {
    type Error = crate::TransportError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(Self::new)
            .ok_or(crate::TransportError::InvalidAddress(value))
    }
}

impl fmt::Display for I2cAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{raw:02X}", raw = self.0)
    }
}

#[derive(Clone, Debug)]
pub struct BusInfo {
    pub name: String,
    pub driver: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_range() {
        assert_eq!(I2cAddress::new(0x70).map(|a| a.raw()), Some(0x70));
        assert!(I2cAddress::new(0x7F).is_some());
        assert!(I2cAddress::new(0x80).is_none());
        assert!(I2cAddress::try_from(0x1_0040u64).is_err());
        assert!(I2cAddress::try_from(0x40u64).is_ok());
    }

    #[test]
    fn test_address_display() -> anyhow::Result<()> {
        let addr = I2cAddress::new(0x40).ok_or_else(|| anyhow::anyhow!("0x40 rejected"))?;
        assert_eq!(addr.to_string(), "0x40");
        let addr = I2cAddress::new(0x0A).ok_or_else(|| anyhow::anyhow!("0x0A rejected"))?;
        assert_eq!(addr.to_string(), "0x0A");
        Ok(())
    }
}
