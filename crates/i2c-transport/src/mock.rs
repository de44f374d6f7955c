use crate::{BusInfo, I2cAddress, I2cBus, Result, TransportError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// One bus transaction as observed by the mock, in issue order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Transaction {
    Write { addr: u8, bytes: Vec<u8> },
    Read { addr: u8, len: usize },
    WriteRead { addr: u8, bytes: Vec<u8>, len: usize },
}

impl Transaction {
    pub fn addr(&self) -> u8 {
        match self {
            Transaction::Write { addr, .. }
            | Transaction::Read { addr, .. }
            | Transaction::WriteRead { addr, .. } => *addr,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    // Devices exposing 16-bit big-endian registers behind a one-byte pointer.
    registers: HashMap<u8, HashMap<u8, u16>>,
    // Devices with a single control byte: a write latches it, a read returns it.
    latches: HashMap<u8, u8>,
    fail_next: u32,
    log: Vec<Transaction>,
}

impl MockState {
    fn record(&mut self, t: Transaction) -> Result<()> {
        let addr = t.addr();
        self.log.push(t);
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(TransportError::Io(format!(
                "injected failure talking to 0x{addr:02X}"
            )));
        }
        if self.registers.contains_key(&addr) || self.latches.contains_key(&addr) {
            Ok(())
        } else {
            Err(TransportError::Io(format!("no ACK from 0x{addr:02X}")))
        }
    }
}

/// A simple in-process mock bus. Clone a [`MockHandle`] before handing the bus off to
/// keep scripting and inspecting it.
pub struct MockBus {
    name: String,
    state: Arc<Mutex<MockState>>,
}

/// Shared view into a [`MockBus`] used to script devices and read the transaction log.
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockBus {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl MockHandle {
    /// Set a 16-bit register on a register-pointer device, creating the device.
    pub fn set_register(&self, addr: I2cAddress, reg: u8, value: u16) {
        lock(&self.state)
            .registers
            .entry(addr.raw())
            .or_default()
            .insert(reg, value);
    }

    pub fn remove_register(&self, addr: I2cAddress, reg: u8) {
        if let Some(regs) = lock(&self.state).registers.get_mut(&addr.raw()) {
            regs.remove(&reg);
        }
    }

    /// Attach a single-byte control device (such as a bus switch) at `addr`.
    pub fn add_latch(&self, addr: I2cAddress) {
        lock(&self.state).latches.entry(addr.raw()).or_insert(0);
    }

    pub fn latch(&self, addr: I2cAddress) -> Option<u8> {
        lock(&self.state).latches.get(&addr.raw()).copied()
    }

    /// Fail the next `n` transactions regardless of address.
    pub fn fail_next(&self, n: u32) {
        lock(&self.state).fail_next = n;
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        lock(&self.state).log.clone()
    }
}

impl I2cBus for MockBus {
    fn open(name: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(MockState::default())),
        })
    }

    fn list() -> Result<Vec<BusInfo>> {
        Ok(vec![BusInfo {
            name: "mock0".to_string(),
            driver: "mock".to_string(),
        }])
    }

    fn write(&mut self, addr: I2cAddress, bytes: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        state.record(Transaction::Write {
            addr: addr.raw(),
            bytes: bytes.to_vec(),
        })?;
        if let (Some(latch), [byte]) = (state.latches.get_mut(&addr.raw()), bytes) {
            *latch = *byte;
        }
        Ok(())
    }

    fn read(&mut self, addr: I2cAddress, buf: &mut [u8]) -> Result<()> {
        let mut state = lock(&self.state);
        state.record(Transaction::Read {
            addr: addr.raw(),
            len: buf.len(),
        })?;
        match state.latches.get(&addr.raw()) {
            Some(latch) => {
                buf.fill(*latch);
                Ok(())
            }
            None => Err(TransportError::Unsupported(
                "mock reads only from latch devices",
            )),
        }
    }

    fn write_read(&mut self, addr: I2cAddress, bytes: &[u8], buf: &mut [u8]) -> Result<()> {
        let mut state = lock(&self.state);
        state.record(Transaction::WriteRead {
            addr: addr.raw(),
            bytes: bytes.to_vec(),
            len: buf.len(),
        })?;
        let reg = match bytes {
            [reg] => *reg,
            _ => return Err(TransportError::Io("expected a one-byte register pointer".into())),
        };
        let value = state
            .registers
            .get(&addr.raw())
            .and_then(|regs| regs.get(&reg))
            .copied()
            .ok_or_else(|| {
                TransportError::Io(format!("register 0x{reg:02X} not scripted at {addr}"))
            })?;
        let be = value.to_be_bytes();
        for (dst, src) in buf.iter_mut().zip(be.iter()) {
            *dst = *src;
        }
        Ok(())
    }
}
