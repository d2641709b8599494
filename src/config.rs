use crate::defs::{SleepMode, DEFAULT_I2C_ADDR, IRQ_2D_TOUCH};

/// Staged controller configuration, written to F01 at every attach.
///
/// # Example
/// ```no_run
/// use rmi4::{Config, SleepMode};
///
/// let config = Config::default()
///   .with_address(0x2c)
///   .with_no_sleep(true)
///   .with_doze(20, 5)
///   .with_doze_holdoff(10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
  pub address: u8,
  pub sleep_mode: SleepMode,
  pub no_sleep: bool,
  /// Halve the report rate when set.
  pub report_rate: bool,
  /// Doze wakeup interval in 10 ms units. Written only when the controller
  /// advertises adjustable doze.
  pub doze_interval: u8,
  pub doze_threshold: u8,
  /// Doze holdoff in 100 ms units. Written only when the controller
  /// advertises doze holdoff.
  pub doze_holdoff: u8,
  /// Interrupt sources enabled in F01 and retained by interrupt checks.
  pub interrupt_enable: u8,
  /// Settle time after a commanded reset.
  pub reset_delay_ms: u32,
}

impl Config {
  /// Default address 0x20, operating mode, only the 2-D touch interrupt enabled.
  pub const fn new() -> Self {
    Self {
      address: DEFAULT_I2C_ADDR,
      sleep_mode: SleepMode::Operating,
      no_sleep: false,
      report_rate: false,
      doze_interval: 0,
      doze_threshold: 0,
      doze_holdoff: 0,
      interrupt_enable: IRQ_2D_TOUCH,
      reset_delay_ms: 100,
    }
  }

  /// Set the 7-bit I²C address of the controller.
  pub const fn with_address(mut self, address: u8) -> Self {
    self.address = address;
    self
  }

  /// Set the sleep mode written to F01 control 0.
  pub const fn with_sleep_mode(mut self, sleep_mode: SleepMode) -> Self {
    self.sleep_mode = sleep_mode;
    self
  }

  /// Keep the controller from entering doze.
  pub const fn with_no_sleep(mut self, no_sleep: bool) -> Self {
    self.no_sleep = no_sleep;
    self
  }

  /// Halve the report rate.
  pub const fn with_report_rate(mut self, report_rate: bool) -> Self {
    self.report_rate = report_rate;
    self
  }

  /// Set the doze wakeup interval (10 ms units) and wakeup threshold.
  pub const fn with_doze(mut self, interval: u8, threshold: u8) -> Self {
    self.doze_interval = interval;
    self.doze_threshold = threshold;
    self
  }

  /// Set the doze holdoff in 100 ms units.
  pub const fn with_doze_holdoff(mut self, holdoff: u8) -> Self {
    self.doze_holdoff = holdoff;
    self
  }

  /// Set the interrupt sources to enable, e.g. [`crate::IRQ_2D_TOUCH`].
  pub const fn with_interrupt_enable(mut self, mask: u8) -> Self {
    self.interrupt_enable = mask;
    self
  }

  pub const fn with_reset_delay_ms(mut self, ms: u32) -> Self {
    self.reset_delay_ms = ms;
    self
  }
}

impl Default for Config {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_enable_touch_only() {
    let c = Config::default();
    assert_eq!(c.address, 0x20);
    assert_eq!(c.interrupt_enable, IRQ_2D_TOUCH);
    assert_eq!(c.sleep_mode, SleepMode::Operating);
  }

  #[test]
  fn builders_chain() {
    let c = Config::new().with_doze(20, 5).with_doze_holdoff(3).with_no_sleep(true);
    assert_eq!((c.doze_interval, c.doze_threshold, c.doze_holdoff), (20, 5, 3));
    assert!(c.no_sleep);
  }
}
