//! i2c-transport: blocking I2C bus abstractions
//!
//! This crate provides a trait and types for issuing raw transactions on an I2C master,
//! with feature-gated backends. The default build enables a `mock` backend so that
//! binaries and tests run on any host without an i2c-dev node.

mod types;
pub use types::{BusInfo, I2cAddress};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::I2cBus;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockBus, MockHandle, Transaction};

#[cfg(feature = "linux")]
mod linux;

#[cfg(feature = "linux")]
pub use linux::LinuxBus;
