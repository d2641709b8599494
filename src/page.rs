use crate::defs::PAGE_SELECT;

/// Split a flat register address into `(page, offset)`.
pub const fn resolve(addr: u16) -> (u8, u8) {
  ((addr >> 8) as u8, addr as u8)
}

/// Fold a page and in-page offset back into a flat register address.
pub const fn flatten(page: u8, offset: u8) -> u16 {
  ((page as u16) << 8) | offset as u16
}

/// `true` for the page select register, which is reserved on every page.
pub const fn is_reserved(addr: u16) -> bool {
  resolve(addr).1 == PAGE_SELECT
}

/// Tracks the page currently latched in the controller's page select register.
///
/// The page is unknown after a select write failed, since the controller may
/// have latched it before the transfer broke off. The next access then always
/// writes the select register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PageState {
  current: Option<u8>,
}

impl PageState {
  /// Page 0 is selected after power-on and after every reset.
  pub const fn new() -> Self {
    Self { current: Some(0) }
  }

  /// Latched page, `None` while unknown.
  pub const fn current(&self) -> Option<u8> {
    self.current
  }

  /// Returns `true` unless `desired` is known to be latched.
  pub const fn needs_select(&self, desired: u8) -> bool {
    !matches!(self.current, Some(page) if page == desired)
  }

  /// Record a page select write the bus acknowledged.
  pub fn commit(&mut self, page: u8) {
    self.current = Some(page);
  }

  /// Forget the latched page after a select write failed.
  pub fn invalidate(&mut self) {
    self.current = None;
  }
}

impl Default for PageState {
  fn default() -> Self {
    Self::new()
  }
}
