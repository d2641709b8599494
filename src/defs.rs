/******************************************************************************
 * Synaptics RMI4 - register map constants and fixed register layouts.       *
 * ========================================================================== *
 * Function bases come from the page description table; everything below is  *
 * either a fixed address or an offset relative to one of those bases.        *
*******************************************************************************/

use bitfield_struct::bitfield;

pub(crate) const DEFAULT_I2C_ADDR: u8 = 0x20;

/// Address of the first page description table entry on every page.
pub const PDT_START: u8 = 0xE9;
/// Lowest address a page description table entry may start at.
pub(crate) const PDT_END: u8 = 0x05;
/// Size in bytes of one page description table entry.
pub const PDT_ENTRY_SIZE: u8 = 6;
/// Page select register, reserved on every page.
pub const PAGE_SELECT: u8 = 0xFF;

/// Device control function.
pub const F01_DEVICE_CONTROL: u8 = 0x01;
/// 2-D touch sensor with register descriptors.
pub const F12_2D_SENSOR: u8 = 0x12;
/// 0-D capacitive buttons.
pub const F1A_0D_BUTTONS: u8 = 0x1A;

/// Capacity of the function directory.
pub const MAX_FUNCTIONS: usize = 10;
/// Capacity of the finger cache.
pub const MAX_TOUCHES: usize = 32;

/// Interrupt status bit raised by the 2-D touch sensor.
pub const IRQ_2D_TOUCH: u8 = 0x04;
/// Interrupt status bit raised by the 0-D button sensor.
pub const IRQ_0D_BUTTON: u8 = 0x20;

// F01 query layout
pub(crate) const F01_QUERY_LEN: usize = 21;
pub(crate) const F01_QUERY_MANUFACTURER: usize = 0;
pub(crate) const F01_QUERY_PROPERTIES: usize = 1;
pub(crate) const F01_QUERY_PRODUCT_ID: usize = 11;
pub(crate) const PRODUCT_ID_LEN: usize = 10;

// F01 control layout
pub(crate) const F01_CTRL_DEVICE_CONTROL: u8 = 0;
pub(crate) const F01_CTRL_INTERRUPT_ENABLE: u8 = 1;
pub(crate) const F01_CTRL_DOZE_INTERVAL: u8 = 2;
pub(crate) const F01_CTRL_DOZE_HOLDOFF: u8 = 4;

pub(crate) const F01_CMD_RESET: u8 = 0x01;

// F12 layout
pub(crate) const F12_QUERY_DESCRIPTORS: u8 = 1;
pub(crate) const F12_DESCRIPTOR_STRIDE: u8 = 3;
pub(crate) const F12_CTRL_SENSOR_TUNING: u8 = 8;
pub(crate) const F12_DATA_FINGERS: u8 = 1;
pub(crate) const F12_BYTES_PER_OBJECT: usize = 8;

/// Byte 4 of a page description table entry.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct VersionIrq {
  #[bits(3)]
  pub irq_count: u8,
  #[bits(2)]
  __: u8,
  #[bits(2)]
  pub function_version: u8,
  ___: bool,
}

/// F01 data register 0.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct DeviceStatusReg {
  #[bits(4)]
  pub status: u8,
  #[bits(2)]
  __: u8,
  pub flash_prog: bool,
  pub unconfigured: bool,
}

/// F01 query register 1.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct ProductProperties {
  pub custom_map: bool,
  pub non_compliant: bool,
  __: bool,
  pub has_sensor_id: bool,
  ___: bool,
  pub has_adjustable_doze: bool,
  pub has_doze_holdoff: bool,
  ____: bool,
}

/// F01 control register 0.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct DeviceControl {
  #[bits(2)]
  pub sleep_mode: SleepMode,
  pub no_sleep: bool,
  #[bits(3)]
  __: u8,
  pub report_rate: bool,
  pub configured: bool,
}

/// F12 query register 0.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct F12General {
  pub has_register_descriptors: bool,
  #[bits(2)]
  __: u8,
  pub has_dribble: bool,
  #[bits(4)]
  ___: u8,
}

/// Power state requested through F01 control register 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SleepMode {
  /// Normal operation.
  Operating = 0b00,
  /// Sensor sleep; the controller stops scanning until woken.
  Sleeping = 0b01,
  /// Reserved encodings, kept so a read-modify-write preserves them.
  Reserved2 = 0b10,
  Reserved3 = 0b11,
}

impl SleepMode {
  pub(crate) const fn into_bits(self) -> u8 {
    self as _
  }

  pub(crate) const fn from_bits(bits: u8) -> Self {
    match bits & 0b11 {
      0b00 => Self::Operating,
      0b01 => Self::Sleeping,
      0b10 => Self::Reserved2,
      _ => Self::Reserved3,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn version_irq_splits_fields() {
    let v = VersionIrq::from_bits(0b0110_0011);
    assert_eq!(v.irq_count(), 3);
    assert_eq!(v.function_version(), 3);

    let v = VersionIrq::from_bits(0b0010_0101);
    assert_eq!(v.irq_count(), 5);
    assert_eq!(v.function_version(), 1);
  }

  #[test]
  fn device_status_flags() {
    let s = DeviceStatusReg::from_bits(0x81);
    assert_eq!(s.status(), 1);
    assert!(s.unconfigured());
    assert!(!s.flash_prog());

    let s = DeviceStatusReg::from_bits(0x44);
    assert_eq!(s.status(), 4);
    assert!(s.flash_prog());
  }

  #[test]
  fn device_control_layout() {
    let ctrl = DeviceControl::new().with_sleep_mode(SleepMode::Sleeping).with_no_sleep(true).with_configured(true);
    assert_eq!(ctrl.into_bits(), 0b1000_0101);
    assert!(DeviceControl::from_bits(0x40).report_rate());
  }
}
