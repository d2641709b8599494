use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::defs::{VersionIrq, MAX_FUNCTIONS, PDT_END, PDT_ENTRY_SIZE, PDT_START};
use crate::{page, Error, Rmi4};

/// One page description table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FunctionDescriptor {
  pub query_base: u8,
  pub command_base: u8,
  pub control_base: u8,
  pub data_base: u8,
  /// Number of interrupt sources the function owns (0..=7).
  pub irq_count: u8,
  /// Function version (0..=3).
  pub version: u8,
  /// Function number; 0 terminates a table.
  pub number: u8,
  /// Page the entry was found on. All four bases live on this page.
  pub page: u8,
}

impl FunctionDescriptor {
  /// Decode the six raw bytes of an entry read from `page`.
  pub fn from_bytes(page: u8, raw: [u8; 6]) -> Self {
    let vi = VersionIrq::from_bits(raw[4]);
    Self {
      query_base: raw[0],
      command_base: raw[1],
      control_base: raw[2],
      data_base: raw[3],
      irq_count: vi.irq_count(),
      version: vi.function_version(),
      number: raw[5],
      page,
    }
  }

  pub const fn is_sentinel(&self) -> bool {
    self.number == 0
  }

  pub const fn query_addr(&self, offset: u8) -> u16 {
    page::flatten(self.page, self.query_base) + offset as u16
  }

  pub const fn command_addr(&self, offset: u8) -> u16 {
    page::flatten(self.page, self.command_base) + offset as u16
  }

  pub const fn control_addr(&self, offset: u8) -> u16 {
    page::flatten(self.page, self.control_base) + offset as u16
  }

  pub const fn data_addr(&self, offset: u8) -> u16 {
    page::flatten(self.page, self.data_base) + offset as u16
  }
}

/// Functions discovered at attach time, in scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FunctionDirectory {
  entries: [FunctionDescriptor; MAX_FUNCTIONS],
  len: usize,
}

impl FunctionDirectory {
  pub const fn new() -> Self {
    const EMPTY: FunctionDescriptor = FunctionDescriptor {
      query_base: 0,
      command_base: 0,
      control_base: 0,
      data_base: 0,
      irq_count: 0,
      version: 0,
      number: 0,
      page: 0,
    };
    Self { entries: [EMPTY; MAX_FUNCTIONS], len: 0 }
  }

  /// Append a live entry. Fails once the directory is full.
  pub fn push(&mut self, fd: FunctionDescriptor) -> Result<(), FunctionDescriptor> {
    if self.len == MAX_FUNCTIONS {
      return Err(fd);
    }
    self.entries[self.len] = fd;
    self.len += 1;
    Ok(())
  }

  pub const fn len(&self) -> usize {
    self.len
  }

  /// Returns `true` if no function was discovered.
  pub const fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Live entries in scan order.
  pub fn as_slice(&self) -> &[FunctionDescriptor] {
    &self.entries[..self.len]
  }

  pub fn iter(&self) -> impl Iterator<Item = &FunctionDescriptor> {
    self.as_slice().iter()
  }

  /// Entry at scan position `index`, as returned by [`FunctionDirectory::index_of`].
  pub fn get(&self, index: usize) -> Option<&FunctionDescriptor> {
    self.as_slice().get(index)
  }

  /// Position of the first entry implementing `number`.
  pub fn index_of(&self, number: u8) -> Option<usize> {
    self.iter().position(|fd| fd.number == number)
  }

  /// First entry implementing `number`.
  pub fn find(&self, number: u8) -> Option<&FunctionDescriptor> {
    self.index_of(number).and_then(|i| self.get(i))
  }
}

impl Default for FunctionDirectory {
  fn default() -> Self {
    Self::new()
  }
}

impl<I, E, ATTN> Rmi4<I, ATTN>
where
  I: I2c<SevenBitAddress, Error = E>,
  ATTN: Wait,
{
  /// Walk the page description tables from the top of page 0 downwards.
  ///
  /// A zero function number ends the current page; the scan then moves to the
  /// next page and stops at the first page that has no entries at all.
  pub async fn discover(&mut self) -> Result<FunctionDirectory, Error<E>> {
    let mut dir = FunctionDirectory::new();
    let mut pg: u8 = 0;

    loop {
      let mut addr = PDT_START;
      let mut found = 0usize;

      loop {
        let raw: [u8; 6] = self.read(page::flatten(pg, addr)).await?;
        let fd = FunctionDescriptor::from_bytes(pg, raw);
        if fd.is_sentinel() {
          break;
        }

        debug!(
          "rmi4: F{=u8:#x} v{=u8} irqs={=u8} page={=u8} q={=u8:#x} c={=u8:#x} d={=u8:#x}",
          fd.number,
          fd.version,
          fd.irq_count,
          fd.page,
          fd.query_base,
          fd.control_base,
          fd.data_base
        );
        // ten live entries followed by a sentinel fit; an eleventh live entry overflows
        dir.push(fd).map_err(|_| Error::DirectoryOverflow)?;
        found += 1;

        if addr < PDT_END + PDT_ENTRY_SIZE {
          break;
        }
        addr -= PDT_ENTRY_SIZE;
      }

      if found == 0 || pg == u8::MAX {
        break;
      }
      pg += 1;
    }

    info!("rmi4: discovered {=usize} functions", dir.len());
    Ok(dir)
  }
}
