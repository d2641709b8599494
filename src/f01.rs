use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::defs::*;
use crate::function::FunctionDescriptor;
use crate::page::PageState;
use crate::{Error, Rmi4};

/// Identity and capabilities reported by the F01 query registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceInfo {
  pub manufacturer: u8,
  pub custom_map: bool,
  pub non_compliant: bool,
  pub has_sensor_id: bool,
  pub has_adjustable_doze: bool,
  pub has_doze_holdoff: bool,
  product_id: [u8; PRODUCT_ID_LEN],
}

impl DeviceInfo {
  pub fn from_query(raw: &[u8; F01_QUERY_LEN]) -> Self {
    let props = ProductProperties::from_bits(raw[F01_QUERY_PROPERTIES]);
    let mut product_id = [0u8; PRODUCT_ID_LEN];
    product_id.copy_from_slice(&raw[F01_QUERY_PRODUCT_ID..F01_QUERY_PRODUCT_ID + PRODUCT_ID_LEN]);
    Self {
      manufacturer: raw[F01_QUERY_MANUFACTURER],
      custom_map: props.custom_map(),
      non_compliant: props.non_compliant(),
      has_sensor_id: props.has_sensor_id(),
      has_adjustable_doze: props.has_adjustable_doze(),
      has_doze_holdoff: props.has_doze_holdoff(),
      product_id,
    }
  }

  /// Product id string, cut at the first NUL. Empty if not ASCII.
  pub fn product_id(&self) -> &str {
    let end = self.product_id.iter().position(|&b| b == 0).unwrap_or(PRODUCT_ID_LEN);
    match core::str::from_utf8(&self.product_id[..end]) {
      Ok(s) if s.is_ascii() => s,
      _ => "",
    }
  }
}

/// F01 state kept for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct F01 {
  pub descriptor: FunctionDescriptor,
  pub info: DeviceInfo,
}

impl<I, E, ATTN> Rmi4<I, ATTN>
where
  I: I2c<SevenBitAddress, Error = E>,
  ATTN: Wait,
{
  pub(crate) async fn read_device_info(&mut self, fd: &FunctionDescriptor) -> Result<DeviceInfo, Error<E>> {
    let raw: [u8; F01_QUERY_LEN] = self.read(fd.query_addr(0)).await?;
    let info = DeviceInfo::from_query(&raw);
    info!("rmi4: manufacturer {=u8} product {=str}", info.manufacturer, info.product_id());
    Ok(info)
  }

  /// Push device control, interrupt enable and doze settings from the staged
  /// [`crate::Config`].
  pub(crate) async fn configure_device(&mut self, fd: &FunctionDescriptor, info: &DeviceInfo) -> Result<(), Error<E>> {
    let ctrl = DeviceControl::new()
      .with_sleep_mode(self.config.sleep_mode)
      .with_no_sleep(self.config.no_sleep)
      .with_report_rate(self.config.report_rate)
      .with_configured(true);
    self.write_u8(fd.control_addr(F01_CTRL_DEVICE_CONTROL), ctrl.into_bits()).await?;
    self.write_u8(fd.control_addr(F01_CTRL_INTERRUPT_ENABLE), self.config.interrupt_enable).await?;

    if info.has_adjustable_doze {
      let doze = [self.config.doze_interval, self.config.doze_threshold];
      self.write_bytes(fd.control_addr(F01_CTRL_DOZE_INTERVAL), &doze).await?;
    }
    if info.has_doze_holdoff {
      self.write_u8(fd.control_addr(F01_CTRL_DOZE_HOLDOFF), self.config.doze_holdoff).await?;
    }
    Ok(())
  }

  fn f01(&self) -> Result<F01, Error<E>> {
    self.f01.ok_or(Error::NotAttached)
  }

  /// Identity of the attached controller.
  pub fn device_info(&self) -> Option<&DeviceInfo> {
    self.f01.as_ref().map(|f| &f.info)
  }

  /// Read-modify-write the sleep mode bits of F01 control register 0.
  pub async fn set_sleep_mode(&mut self, mode: SleepMode) -> Result<(), Error<E>> {
    let addr = self.f01()?.descriptor.control_addr(F01_CTRL_DEVICE_CONTROL);
    let ctrl = DeviceControl::from_bits(self.read_u8(addr).await?).with_sleep_mode(mode);
    self.write_u8(addr, ctrl.into_bits()).await?;
    self.config.sleep_mode = mode;
    Ok(())
  }

  /// Command a controller reset, wait for it to settle and attach again.
  ///
  /// This is the only way out of a halted session.
  pub async fn reset<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
    let fd = match self.f01 {
      Some(f) => f.descriptor,
      None => *self.functions.find(F01_DEVICE_CONTROL).ok_or(Error::NotAttached)?,
    };
    self.write_u8(fd.command_addr(0), F01_CMD_RESET).await?;
    self.halted = false;
    delay.delay_ms(self.config.reset_delay_ms).await;
    // the controller comes back with page 0 latched
    self.page = PageState::new();
    self.attach().await
  }
}
