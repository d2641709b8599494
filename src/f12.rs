//! F12 2-D sensor: descriptor-driven register layout and finger object decoding.

use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::defs::*;
use crate::descriptor::RegisterDescriptor;
use crate::finger::{FingerStatus, RawObject};
use crate::function::FunctionDescriptor;
use crate::{Error, Rmi4};

/// Largest data packet prefix read per cycle.
const MAX_DATA_READ: usize = 512;

/// Object classification byte of an F12 data 1 entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ObjectType {
  None,
  Finger,
  Stylus,
  Palm,
  Unclassified,
  GlovedFinger,
  NarrowObject,
  HandEdge,
  Cover,
  Stylus2,
  Eraser,
  SmallObject,
  Reserved(u8),
}

impl ObjectType {
  pub const fn from_byte(b: u8) -> Self {
    match b {
      0x00 => Self::None,
      0x01 => Self::Finger,
      0x02 => Self::Stylus,
      0x03 => Self::Palm,
      0x04 => Self::Unclassified,
      0x06 => Self::GlovedFinger,
      0x07 => Self::NarrowObject,
      0x08 => Self::HandEdge,
      0x0A => Self::Cover,
      0x0B => Self::Stylus2,
      0x0C => Self::Eraser,
      0x0D => Self::SmallObject,
      n => Self::Reserved(n),
    }
  }

  pub const fn finger_status(self) -> FingerStatus {
    match self {
      Self::Finger | Self::GlovedFinger | Self::Stylus | Self::Stylus2 | Self::Eraser => FingerStatus::Accurate,
      Self::Palm | Self::NarrowObject | Self::HandEdge | Self::SmallObject | Self::Unclassified => {
        FingerStatus::Inaccurate
      }
      Self::None | Self::Cover | Self::Reserved(_) => FingerStatus::NotPresent,
    }
  }
}

/// Decode one 8 byte data 1 entry into a cache record for `slot`.
pub fn decode_object(slot: u8, raw: &[u8]) -> RawObject {
  let kind = ObjectType::from_byte(raw[0]);
  let x = u16::from_le_bytes([raw[1], raw[2]]);
  let y = u16::from_le_bytes([raw[3], raw[4]]);
  RawObject::new(slot, x, y, kind.finger_status())
}

/// F12 register layout resolved at attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sensor {
  pub descriptor: FunctionDescriptor,
  pub query: RegisterDescriptor,
  pub control: RegisterDescriptor,
  pub data: RegisterDescriptor,
  pub max_x: u16,
  pub max_y: u16,
  pub has_dribble: bool,
  /// Byte offset of the finger objects inside the data packet.
  data1_offset: usize,
  /// Object slots the sensor reports per packet.
  objects: usize,
}

impl Sensor {
  pub const fn max_objects(&self) -> usize {
    self.objects
  }

  pub const fn objects_offset(&self) -> usize {
    self.data1_offset
  }

  /// Bytes to read from the data base to cover every object.
  fn read_len(&self) -> usize {
    let end = self.data1_offset + self.objects * F12_BYTES_PER_OBJECT;
    end.min(self.data.packet_size())
  }
}

impl<I, E, ATTN> Rmi4<I, ATTN>
where
  I: I2c<SevenBitAddress, Error = E>,
  ATTN: Wait,
{
  pub(crate) async fn configure_sensor(&mut self, fd: &FunctionDescriptor) -> Result<Sensor, Error<E>> {
    let general = F12General::from_bits(self.read_u8(fd.query_addr(0)).await?);
    if !general.has_register_descriptors() {
      return Err(Error::MalformedDescriptor);
    }

    let mut desc_addr = fd.query_addr(F12_QUERY_DESCRIPTORS);
    let query = self.decode_descriptor(desc_addr).await?;
    desc_addr += F12_DESCRIPTOR_STRIDE as u16;
    let control = self.decode_descriptor(desc_addr).await?;
    desc_addr += F12_DESCRIPTOR_STRIDE as u16;
    let data = self.decode_descriptor(desc_addr).await?;

    let (mut max_x, mut max_y) = (0, 0);
    if let Some(item) = control.lookup(F12_CTRL_SENSOR_TUNING) {
      if item.declared_size >= 4 {
        let offset = control.register_offset(F12_CTRL_SENSOR_TUNING).unwrap_or(0);
        let raw: [u8; 4] = self.read(fd.control_addr(offset)).await?;
        max_x = u16::from_le_bytes([raw[0], raw[1]]);
        max_y = u16::from_le_bytes([raw[2], raw[3]]);
      }
    }

    let fingers = data.lookup(F12_DATA_FINGERS).ok_or(Error::MalformedDescriptor)?;
    let objects = fingers.subpacket_count();
    if objects > MAX_TOUCHES {
      return Err(Error::SlotOutOfRange(objects.min(u8::MAX as usize) as u8));
    }
    let data1_offset = data.packet_offset(F12_DATA_FINGERS).unwrap_or(0);
    if data1_offset + objects * F12_BYTES_PER_OBJECT > MAX_DATA_READ {
      return Err(Error::DescriptorCapacity);
    }

    info!(
      "rmi4: F12 {=u16}x{=u16}, {=usize} objects at +{=usize}",
      max_x,
      max_y,
      objects,
      data1_offset
    );

    Ok(Sensor {
      descriptor: *fd,
      query,
      control,
      data,
      max_x,
      max_y,
      has_dribble: general.has_dribble(),
      data1_offset,
      objects,
    })
  }

  /// Read the finger objects of the current data packet into `out`.
  /// Returns the number of objects written.
  pub(crate) async fn read_objects(&mut self, out: &mut [RawObject; MAX_TOUCHES]) -> Result<usize, Error<E>> {
    let (base, offset, len) = match &self.f12 {
      Some(s) => (s.descriptor.data_addr(0), s.data1_offset, s.read_len()),
      None => return Err(Error::NotAttached),
    };
    if len <= offset {
      return Ok(0);
    }

    let mut buf = [0u8; MAX_DATA_READ];
    self.read_bytes(base, &mut buf[..len]).await?;

    let count = (len - offset) / F12_BYTES_PER_OBJECT;
    for (slot, raw) in buf[offset..len].chunks_exact(F12_BYTES_PER_OBJECT).take(count).enumerate() {
      out[slot] = decode_object(slot as u8, raw);
    }
    trace!("rmi4: {=usize} object slots read", count);
    Ok(count)
  }

  /// Resolved F12 layout of the attached sensor.
  pub fn sensor(&self) -> Option<&Sensor> {
    self.f12.as_ref()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fake::{attached, block_on, device, FakeBus, F12_DATA};

  #[test]
  fn object_types_map_to_finger_status() {
    let accurate = [0x01, 0x02, 0x06, 0x0B, 0x0C];
    let inaccurate = [0x03, 0x04, 0x07, 0x08, 0x0D];
    let absent = [0x00, 0x0A, 0x05, 0x09, 0xFF];
    for b in accurate {
      assert_eq!(ObjectType::from_byte(b).finger_status(), FingerStatus::Accurate, "type {b:#x}");
    }
    for b in inaccurate {
      assert_eq!(ObjectType::from_byte(b).finger_status(), FingerStatus::Inaccurate, "type {b:#x}");
    }
    for b in absent {
      assert_eq!(ObjectType::from_byte(b).finger_status(), FingerStatus::NotPresent, "type {b:#x}");
    }
  }

  #[test]
  fn object_decodes_little_endian_position() {
    let o = decode_object(3, &[0x01, 0x34, 0x12, 0x78, 0x05, 40, 2, 3]);
    assert_eq!(o, RawObject::new(3, 0x1234, 0x0578, FingerStatus::Accurate));
  }

  #[test]
  fn attach_resolves_layout() {
    let (dev, _) = attached();
    let s = dev.sensor().unwrap();
    assert_eq!((s.max_x, s.max_y), (1024, 768));
    assert_eq!(s.max_objects(), 2);
    assert_eq!(s.objects_offset(), 2);
    assert!(!s.has_dribble);
    assert_eq!(s.data.total_size(), 3);
  }

  #[test]
  fn objects_follow_data_prefix() {
    let (mut dev, _) = attached();
    dev.i2c.put(F12_DATA, &[0xAA, 0xBB]);
    dev.i2c.put(F12_DATA + 2, &[0x01, 100, 0, 50, 0, 0, 0, 0, 0x03, 0x10, 0x01, 0x20, 0x02, 0, 0, 0]);

    let mut out = [RawObject::default(); MAX_TOUCHES];
    let n = block_on(dev.read_objects(&mut out)).unwrap();
    assert_eq!(n, 2);
    assert_eq!(out[0], RawObject::new(0, 100, 50, FingerStatus::Accurate));
    assert_eq!(out[1], RawObject::new(1, 0x110, 0x220, FingerStatus::Inaccurate));
  }

  #[test]
  fn sensor_without_descriptors_is_rejected() {
    let mut bus = FakeBus::new();
    bus.put(0x0050, &[0x00]);
    let mut dev = device(bus);
    let fd = FunctionDescriptor { query_base: 0x50, number: F12_2D_SENSOR, ..Default::default() };
    assert!(matches!(block_on(dev.configure_sensor(&fd)), Err(Error::MalformedDescriptor)));
  }

  #[test]
  fn missing_finger_register_is_rejected() {
    let mut bus = FakeBus::new();
    bus.put(0x0050, &[0x01]);
    // only register 0 in every block
    for base in [0x51u16, 0x54, 0x57] {
      bus.put(base, &[2]);
      bus.packet(base + 1, &[2, 0x01]);
      bus.packet(base + 2, &[1, 0x01]);
    }
    let mut dev = device(bus);
    let fd = FunctionDescriptor { query_base: 0x50, number: F12_2D_SENSOR, ..Default::default() };
    assert!(matches!(block_on(dev.configure_sensor(&fd)), Err(Error::MalformedDescriptor)));
  }
}
