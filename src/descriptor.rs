//! Self-describing register layouts.
//!
//! Functions that advertise register descriptors (F12 and later) do not have a
//! fixed register map. Instead each register block (query, control, data) is
//! described by three consecutive registers:
//!
//! 1. the size `n` of the presence register (1..=35),
//! 2. the presence register: the structure size followed by a bitmap of which
//!    of the 256 possible packet registers exist,
//! 3. the structure register: for every present packet register, a size header
//!    followed by a subpacket map in 7-bit groups (bit 7 continues the map).
//!
//! The decoded [`RegisterDescriptor`] lets callers locate packet registers and
//! size bulk transfers without any per-function tables.

use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::bitmap::{PresenceMap, SubpacketMap, PRESENCE_BITS, SUBPACKET_BITS};
use crate::{Error, Rmi4};

/// Packet registers a single descriptor can hold.
pub const MAX_DESCRIPTOR_REGISTERS: usize = 64;
/// Largest structure register the decoder will read.
pub const MAX_STRUCTURE_SIZE: usize = 512;
const MAX_PRESENCE_SIZE: usize = 35;

/// Why a descriptor could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DescriptorError {
  /// The encoding is inconsistent: bad presence size, bits out of range,
  /// structure shorter than the presence map requires, or an empty register.
  Malformed,
  /// The descriptor is well formed but larger than this driver can hold.
  Capacity,
}

impl<E> From<DescriptorError> for Error<E> {
  fn from(e: DescriptorError) -> Self {
    match e {
      DescriptorError::Malformed => Error::MalformedDescriptor,
      DescriptorError::Capacity => Error::DescriptorCapacity,
    }
  }
}

/// One packet register of a described block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDescriptorItem {
  /// Packet register number (0..=255).
  pub index: u8,
  /// Byte length announced by the register's size header.
  pub declared_size: u32,
  /// Which subpackets the register carries.
  pub subpackets: SubpacketMap,
}

impl RegisterDescriptorItem {
  const EMPTY: Self = Self { index: 0, declared_size: 0, subpackets: SubpacketMap::new() };

  /// Register size derived from the subpacket map population.
  pub fn size(&self) -> usize {
    self.subpackets.weight()
  }

  pub fn subpacket_count(&self) -> usize {
    self.subpackets.weight()
  }

  pub fn has_subpacket(&self, n: usize) -> bool {
    self.subpackets.test(n)
  }
}

#[cfg(feature = "defmt")]
impl defmt::Format for RegisterDescriptorItem {
  fn format(&self, f: defmt::Formatter) {
    defmt::write!(
      f,
      "reg {=u8}: {=u32} bytes, {=usize} subpackets",
      self.index,
      self.declared_size,
      self.subpacket_count()
    )
  }
}

/// Decoded layout of one register block (query, control or data).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDescriptor {
  presence: PresenceMap,
  structure_size: usize,
  items: [RegisterDescriptorItem; MAX_DESCRIPTOR_REGISTERS],
  len: usize,
}

impl RegisterDescriptor {
  pub const fn new() -> Self {
    Self {
      presence: PresenceMap::new(),
      structure_size: 0,
      items: [RegisterDescriptorItem::EMPTY; MAX_DESCRIPTOR_REGISTERS],
      len: 0,
    }
  }

  /// Decode the presence register contents into the structure size and the
  /// presence bitmap.
  pub fn parse_presence(raw: &[u8]) -> Result<(usize, PresenceMap), DescriptorError> {
    if raw.is_empty() || raw.len() > MAX_PRESENCE_SIZE {
      return Err(DescriptorError::Malformed);
    }

    let (structure_size, start) = if raw[0] != 0 {
      (raw[0] as usize, 1)
    } else {
      let lo = *raw.get(1).ok_or(DescriptorError::Malformed)?;
      let hi = *raw.get(2).ok_or(DescriptorError::Malformed)?;
      (u16::from_le_bytes([lo, hi]) as usize, 3)
    };

    let mut presence = PresenceMap::new();
    for (i, byte) in raw[start..].iter().enumerate() {
      for b in 0..8 {
        if *byte & (1u8 << b) == 0 {
          continue;
        }
        let bit = i * 8 + b;
        if bit >= PRESENCE_BITS || !presence.set(bit) {
          return Err(DescriptorError::Malformed);
        }
      }
    }

    Ok((structure_size, presence))
  }

  /// Build the item list from a presence map and the structure register.
  pub fn from_structure(presence: PresenceMap, structure: &[u8]) -> Result<Self, DescriptorError> {
    let mut desc = Self::new();
    desc.presence = presence;
    desc.structure_size = structure.len();

    let mut cur = Cursor { buf: structure, pos: 0 };
    for reg in presence.iter() {
      if desc.len == MAX_DESCRIPTOR_REGISTERS {
        return Err(DescriptorError::Capacity);
      }

      let mut declared_size = cur.u8()? as u32;
      if declared_size == 0 {
        declared_size = cur.u16()? as u32;
      }
      if declared_size == 0 {
        declared_size = cur.u32()?;
      }

      let mut subpackets = SubpacketMap::new();
      let mut bit = 0usize;
      loop {
        let byte = cur.u8()?;
        for b in 0..7 {
          if byte & (1u8 << b) != 0 {
            if bit >= SUBPACKET_BITS || !subpackets.set(bit) {
              return Err(DescriptorError::Malformed);
            }
          }
          bit += 1;
        }
        if byte & 0x80 == 0 {
          break;
        }
      }

      if declared_size == 0 || subpackets.is_empty() {
        return Err(DescriptorError::Malformed);
      }

      desc.items[desc.len] = RegisterDescriptorItem { index: reg as u8, declared_size, subpackets };
      desc.len += 1;
    }

    Ok(desc)
  }

  /// Decode a descriptor from the raw presence and structure registers.
  pub fn parse(presence_reg: &[u8], structure: &[u8]) -> Result<Self, DescriptorError> {
    let (size, presence) = Self::parse_presence(presence_reg)?;
    let structure = structure.get(..size).ok_or(DescriptorError::Malformed)?;
    Self::from_structure(presence, structure)
  }

  pub fn presence(&self) -> &PresenceMap {
    &self.presence
  }

  pub fn structure_size(&self) -> usize {
    self.structure_size
  }

  pub fn items(&self) -> &[RegisterDescriptorItem] {
    &self.items[..self.len]
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Sum of every register's subpacket population.
  pub fn total_size(&self) -> usize {
    self.items().iter().map(RegisterDescriptorItem::size).sum()
  }

  /// Sum of every register's declared byte length; the length of a bulk read
  /// covering the whole block.
  pub fn packet_size(&self) -> usize {
    self.items().iter().map(|item| item.declared_size as usize).sum()
  }

  pub fn lookup(&self, index: u8) -> Option<&RegisterDescriptorItem> {
    self.items().iter().find(|item| item.index == index)
  }

  /// Address offset of packet register `index` from the block base. Every
  /// packet register occupies a single address regardless of its length.
  pub fn register_offset(&self, index: u8) -> Option<u8> {
    self.lookup(index)?;
    Some(self.presence.rank(index as usize) as u8)
  }

  /// Byte offset of packet register `index` inside a bulk read of the block.
  pub fn packet_offset(&self, index: u8) -> Option<usize> {
    self.lookup(index)?;
    Some(self.items().iter().take_while(|item| item.index != index).map(|item| item.declared_size as usize).sum())
  }
}

impl Default for RegisterDescriptor {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(feature = "defmt")]
impl defmt::Format for RegisterDescriptor {
  fn format(&self, f: defmt::Formatter) {
    defmt::write!(f, "{=usize} registers, {=usize} packet bytes", self.len, self.packet_size())
  }
}

struct Cursor<'a> {
  buf: &'a [u8],
  pos: usize,
}

impl Cursor<'_> {
  fn take<const N: usize>(&mut self) -> Result<[u8; N], DescriptorError> {
    let bytes = self.buf.get(self.pos..self.pos + N).ok_or(DescriptorError::Malformed)?;
    self.pos += N;
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
  }

  fn u8(&mut self) -> Result<u8, DescriptorError> {
    Ok(self.take::<1>()?[0])
  }

  fn u16(&mut self) -> Result<u16, DescriptorError> {
    self.take().map(u16::from_le_bytes)
  }

  fn u32(&mut self) -> Result<u32, DescriptorError> {
    self.take().map(u32::from_le_bytes)
  }
}

impl<I, E, ATTN> Rmi4<I, ATTN>
where
  I: I2c<SevenBitAddress, Error = E>,
  ATTN: Wait,
{
  /// Read and decode the register descriptor whose size register is at `addr`.
  pub async fn decode_descriptor(&mut self, addr: u16) -> Result<RegisterDescriptor, Error<E>> {
    let n = self.read_u8(addr).await? as usize;
    if n == 0 || n > MAX_PRESENCE_SIZE {
      return Err(Error::MalformedDescriptor);
    }

    let mut presence = [0u8; MAX_PRESENCE_SIZE];
    self.read_bytes(addr + 1, &mut presence[..n]).await?;
    let (size, map) = RegisterDescriptor::parse_presence(&presence[..n])?;
    if size > MAX_STRUCTURE_SIZE {
      return Err(Error::DescriptorCapacity);
    }

    let mut structure = [0u8; MAX_STRUCTURE_SIZE];
    if size > 0 {
      self.read_bytes(addr + 2, &mut structure[..size]).await?;
    }
    let desc = RegisterDescriptor::from_structure(map, &structure[..size])?;

    debug!(
      "rmi4: descriptor @{=u16:#x}: {=usize} registers, {=usize} subpackets, {=usize} bytes",
      addr,
      desc.len(),
      desc.total_size(),
      desc.packet_size()
    );
    Ok(desc)
  }
}
