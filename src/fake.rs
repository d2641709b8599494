//! In-memory controller used by the unit tests.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::vec::Vec;

use embedded_hal::digital::{ErrorKind as PinErrorKind, ErrorType as PinErrorType};
use embedded_hal::i2c::{ErrorKind, ErrorType};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::{I2c, Operation, SevenBitAddress};

pub use futures::executor::block_on;

use crate::defs::PAGE_SELECT;
use crate::page::flatten;
use crate::{Config, Rmi4};

/// Register file behind a paged I²C interface.
///
/// Plain registers auto-increment through a flat 64 KiB memory. Packet
/// registers registered with [`FakeBus::packet`] return their whole contents
/// from a single address.
pub struct FakeBus {
  mem: Vec<u8>,
  packets: BTreeMap<u16, Vec<u8>>,
  page: u8,
  pointer: u16,
  page_writes: usize,
  writes: Vec<(u16, Vec<u8>)>,
  raw_writes: Vec<Vec<u8>>,
  reads: Vec<u16>,
  transactions: usize,
  fail_after: Option<usize>,
}

impl FakeBus {
  pub fn new() -> Self {
    Self {
      mem: vec![0; 0x1_0000],
      packets: BTreeMap::new(),
      page: 0,
      pointer: 0,
      page_writes: 0,
      writes: Vec::new(),
      raw_writes: Vec::new(),
      reads: Vec::new(),
      transactions: 0,
      fail_after: None,
    }
  }

  pub fn put(&mut self, addr: u16, bytes: &[u8]) {
    for (i, b) in bytes.iter().enumerate() {
      self.mem[addr as usize + i] = *b;
    }
  }

  pub fn packet(&mut self, addr: u16, bytes: &[u8]) {
    self.packets.insert(addr, bytes.to_vec());
  }

  pub fn byte(&self, addr: u16) -> u8 {
    self.mem[addr as usize]
  }

  /// Fail every transaction once `n` have succeeded.
  pub fn fail_after(&mut self, n: usize) {
    self.fail_after = Some(n);
  }

  pub fn transactions(&self) -> usize {
    self.transactions
  }

  pub fn page_writes(&self) -> usize {
    self.page_writes
  }

  pub fn wrote(&self, addr: u16, bytes: &[u8]) -> bool {
    self.writes.iter().any(|(a, b)| *a == addr && b == bytes)
  }

  /// Page select writes exactly as they went over the wire.
  pub fn wrote_raw(&self, bytes: &[u8]) -> bool {
    self.raw_writes.iter().any(|w| w == bytes)
  }

  pub fn reads_at(&self, addr: u16) -> usize {
    self.reads.iter().filter(|&&a| a == addr).count()
  }
}

impl ErrorType for FakeBus {
  type Error = ErrorKind;
}

impl I2c<SevenBitAddress> for FakeBus {
  async fn transaction(&mut self, _address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
    if self.fail_after.is_some_and(|n| self.transactions >= n) {
      return Err(ErrorKind::Other);
    }
    self.transactions += 1;

    for op in operations.iter_mut() {
      match op {
        Operation::Write(bytes) => {
          let Some((&offset, data)) = bytes.split_first() else {
            continue;
          };
          if offset == PAGE_SELECT {
            self.raw_writes.push(bytes.to_vec());
            if let Some(&page) = data.first() {
              self.page = page;
              self.page_writes += 1;
            }
            continue;
          }
          self.pointer = flatten(self.page, offset);
          if !data.is_empty() {
            self.writes.push((self.pointer, data.to_vec()));
            let start = self.pointer;
            self.put(start, data);
          }
        }
        Operation::Read(buf) => {
          self.reads.push(self.pointer);
          match self.packets.get(&self.pointer) {
            Some(p) => {
              for (i, b) in buf.iter_mut().enumerate() {
                *b = p.get(i).copied().unwrap_or(0);
              }
            }
            None => {
              for (i, b) in buf.iter_mut().enumerate() {
                *b = self.mem[(self.pointer as usize + i) & 0xFFFF];
              }
            }
          }
        }
      }
    }
    Ok(())
  }
}

/// Attention line that is always asserted.
pub struct FakePin;

impl PinErrorType for FakePin {
  type Error = Infallible;
}

impl Wait for FakePin {
  async fn wait_for_high(&mut self) -> Result<(), Self::Error> {
    Ok(())
  }

  async fn wait_for_low(&mut self) -> Result<(), Self::Error> {
    Ok(())
  }

  async fn wait_for_rising_edge(&mut self) -> Result<(), Self::Error> {
    Ok(())
  }

  async fn wait_for_falling_edge(&mut self) -> Result<(), Self::Error> {
    Ok(())
  }

  async fn wait_for_any_edge(&mut self) -> Result<(), Self::Error> {
    Ok(())
  }
}

/// Attention line whose driver fails every wait.
pub struct BrokenPin;

impl PinErrorType for BrokenPin {
  type Error = PinErrorKind;
}

impl Wait for BrokenPin {
  async fn wait_for_high(&mut self) -> Result<(), Self::Error> {
    Err(PinErrorKind::Other)
  }

  async fn wait_for_low(&mut self) -> Result<(), Self::Error> {
    Err(PinErrorKind::Other)
  }

  async fn wait_for_rising_edge(&mut self) -> Result<(), Self::Error> {
    Err(PinErrorKind::Other)
  }

  async fn wait_for_falling_edge(&mut self) -> Result<(), Self::Error> {
    Err(PinErrorKind::Other)
  }

  async fn wait_for_any_edge(&mut self) -> Result<(), Self::Error> {
    Err(PinErrorKind::Other)
  }
}

pub struct NoDelay;

impl DelayNs for NoDelay {
  async fn delay_ns(&mut self, _ns: u32) {}
}

pub fn device(bus: FakeBus) -> Rmi4<FakeBus, FakePin> {
  Rmi4::new(bus, FakePin, Config::default())
}

pub const F01_QUERY: u16 = 0x0030;
pub const F01_COMMAND: u16 = 0x002A;
pub const F01_CONTROL: u16 = 0x0020;
pub const F01_DATA: u16 = 0x0004;
pub const F12_QUERY: u16 = 0x0050;
pub const F12_CONTROL: u16 = 0x0060;
pub const F12_DATA: u16 = 0x0008;

/// A controller with F01 and an F12 reporting two object slots.
///
/// The F12 data packet holds a two byte register 0 followed by the objects,
/// so objects start at `F12_DATA + 2`.
pub fn image() -> FakeBus {
  let mut bus = FakeBus::new();
  bus.put(0x00E9, &[F01_QUERY as u8, F01_COMMAND as u8, F01_CONTROL as u8, F01_DATA as u8, 1, 0x01]);
  bus.put(0x00E3, &[F12_QUERY as u8, 0x00, F12_CONTROL as u8, F12_DATA as u8, 1, 0x12]);

  // manufacturer, adjustable doze, product id
  bus.put(F01_QUERY, &[1, 0x20]);
  bus.put(F01_QUERY + 11, b"TM3276-001");

  bus.put(F12_QUERY, &[0x01]);
  // query: register 0
  bus.put(F12_QUERY + 1, &[2]);
  bus.packet(F12_QUERY + 2, &[2, 0x01]);
  bus.packet(F12_QUERY + 3, &[1, 0x01]);
  // control: register 8
  bus.put(F12_QUERY + 4, &[3]);
  bus.packet(F12_QUERY + 5, &[2, 0x00, 0x01]);
  bus.packet(F12_QUERY + 6, &[4, 0x01]);
  // data: register 0 (2 bytes), register 1 (two objects)
  bus.put(F12_QUERY + 7, &[2]);
  bus.packet(F12_QUERY + 8, &[4, 0x03]);
  bus.packet(F12_QUERY + 9, &[2, 0x01, 16, 0x03]);

  bus.put(F12_CONTROL, &[0x00, 0x04, 0x00, 0x03]);
  bus
}

/// An attached session over [`image`], plus the F01 data address.
pub fn attached() -> (Rmi4<FakeBus, FakePin>, u16) {
  let mut dev = device(image());
  block_on(dev.attach()).expect("attach");
  (dev, F01_DATA)
}
