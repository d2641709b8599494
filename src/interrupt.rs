use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::defs::DeviceStatusReg;
use crate::{Error, Rmi4};

/// Device status nibble of F01 data register 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceStatus {
  NoError,
  ResetOccurred,
  InvalidConfiguration,
  DeviceFailure,
  ConfigCrcFailure,
  FirmwareCrcFailure,
  CrcInProgress,
  /// Out of range value, kept verbatim.
  Unknown(u8),
}

impl DeviceStatus {
  pub const fn from_nibble(code: u8) -> Self {
    match code & 0x0F {
      0 => Self::NoError,
      1 => Self::ResetOccurred,
      2 => Self::InvalidConfiguration,
      3 => Self::DeviceFailure,
      4 => Self::ConfigCrcFailure,
      5 => Self::FirmwareCrcFailure,
      6 => Self::CrcInProgress,
      n => Self::Unknown(n),
    }
  }

  /// The session cannot continue until the controller is reset.
  pub const fn is_fatal(self) -> bool {
    matches!(self, Self::DeviceFailure | Self::ConfigCrcFailure | Self::FirmwareCrcFailure)
  }

  /// Reported upward without halting polling.
  pub const fn is_diagnostic(self) -> bool {
    matches!(self, Self::InvalidConfiguration | Self::Unknown(_))
  }
}

/// Result of one interrupt check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterruptStatus {
  pub device: DeviceStatus,
  /// Controller is in bootloader mode.
  pub flash_prog: bool,
  /// Controller lost its runtime configuration.
  pub unconfigured: bool,
  /// Pending interrupt sources, restricted to the enabled ones.
  pub pending: u8,
}

impl InterruptStatus {
  /// Decode F01 data registers 0 (device status) and 1 (interrupt status).
  pub fn from_bytes(raw: [u8; 2], enabled: u8) -> Self {
    let status = DeviceStatusReg::from_bits(raw[0]);
    Self {
      device: DeviceStatus::from_nibble(status.status()),
      flash_prog: status.flash_prog(),
      unconfigured: status.unconfigured(),
      pending: raw[1] & enabled,
    }
  }

  /// Returns `true` if any of `bits` is pending.
  pub const fn is_pending(&self, bits: u8) -> bool {
    self.pending & bits != 0
  }

  /// Returns `true` if the device status halts the session.
  pub const fn is_fatal(&self) -> bool {
    self.device.is_fatal()
  }

  /// Function directory and descriptors must be rebuilt before the next data
  /// read.
  pub const fn needs_rediscovery(&self) -> bool {
    matches!(self.device, DeviceStatus::ResetOccurred) || (self.unconfigured && !self.flash_prog)
  }
}

impl<I, E, ATTN> Rmi4<I, ATTN>
where
  I: I2c<SevenBitAddress, Error = E>,
  ATTN: Wait,
{
  /// Read device and interrupt status from F01 and fold the pending sources
  /// into the running mask.
  pub async fn check_interrupts(&mut self) -> Result<InterruptStatus, Error<E>> {
    let f01 = self.f01.as_ref().map(|f| f.descriptor).ok_or(Error::NotAttached)?;
    let raw: [u8; 2] = self.read(f01.data_addr(0)).await?;
    let status = InterruptStatus::from_bytes(raw, self.config.interrupt_enable);
    self.irq |= status.pending;

    match status.device {
      s if s.is_fatal() => error!("rmi4: fatal device status {}", s),
      s if s.is_diagnostic() => warn!("rmi4: device status {}", s),
      DeviceStatus::ResetOccurred => info!("rmi4: controller reset"),
      _ => {}
    }
    if status.unconfigured && !status.flash_prog {
      warn!("rmi4: controller unconfigured");
    }

    Ok(status)
  }

  /// Interrupt sources seen but not yet serviced.
  pub const fn pending_interrupts(&self) -> u8 {
    self.irq
  }

  pub(crate) fn acknowledge(&mut self, bits: u8) {
    self.irq &= !bits;
  }
}
