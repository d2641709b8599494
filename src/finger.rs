//! Multitouch finger cache.
//!
//! The sensor reports objects by fixed physical slot. Consumers want a stable
//! first-down-first-reported ordering and a cheap way to skip unchanged slots,
//! so the cache keeps two bitmasks (occupied, changed this cycle) next to the
//! ordered list of slots in the order they went down.

use crate::defs::MAX_TOUCHES;
use crate::Error;

/// Per-slot contact state as reported by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FingerStatus {
  #[default]
  NotPresent = 0,
  /// Contact present, position accurate.
  Accurate = 1,
  /// Contact present, position unreliable (palm, edge, unclassified).
  Inaccurate = 2,
  Reserved = 3,
}

impl FingerStatus {
  pub const fn from_bits(bits: u8) -> Self {
    match bits & 0b11 {
      0 => Self::NotPresent,
      1 => Self::Accurate,
      2 => Self::Inaccurate,
      _ => Self::Reserved,
    }
  }

  pub const fn is_present(self) -> bool {
    matches!(self, Self::Accurate | Self::Inaccurate)
  }
}

/// Last known position and state of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FingerInfo {
  pub x: u16,
  pub y: u16,
  pub status: FingerStatus,
}

/// One decoded object from a poll, addressed by its physical slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawObject {
  pub slot: u8,
  pub x: u16,
  pub y: u16,
  pub status: FingerStatus,
}

impl RawObject {
  pub const fn new(slot: u8, x: u16, y: u16, status: FingerStatus) -> Self {
    Self { slot, x, y, status }
  }
}

/// A raw object addressed a slot beyond the cache capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidSlot(pub u8);

impl<E> From<InvalidSlot> for Error<E> {
  fn from(e: InvalidSlot) -> Self {
    Error::SlotOutOfRange(e.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FingerCache {
  slots: [FingerInfo; MAX_TOUCHES],
  valid: u32,
  dirty: u32,
  down_order: [u8; MAX_TOUCHES],
  down_count: usize,
}

impl FingerCache {
  pub const fn new() -> Self {
    Self {
      slots: [FingerInfo { x: 0, y: 0, status: FingerStatus::NotPresent }; MAX_TOUCHES],
      valid: 0,
      dirty: 0,
      down_order: [0; MAX_TOUCHES],
      down_count: 0,
    }
  }

  /// Fold one poll's worth of objects into the cache.
  ///
  /// Slots reported present that were free become valid and are appended to
  /// the down order. Valid slots whose position or status changed are marked
  /// dirty. Valid slots missing from `objects` (or reported not present) are
  /// released and removed from the down order. Nothing is modified if any
  /// object addresses a slot beyond capacity.
  pub fn update(&mut self, objects: &[RawObject]) -> Result<(), InvalidSlot> {
    if let Some(o) = objects.iter().find(|o| o.slot as usize >= MAX_TOUCHES) {
      return Err(InvalidSlot(o.slot));
    }

    self.dirty = 0;
    let mut seen = 0u32;

    for o in objects.iter().filter(|o| o.status.is_present()) {
      let slot = o.slot as usize;
      let bit = 1u32 << slot;
      let info = FingerInfo { x: o.x, y: o.y, status: o.status };
      seen |= bit;

      if self.valid & bit == 0 {
        self.valid |= bit;
        self.down_order[self.down_count] = o.slot;
        self.down_count += 1;
        self.dirty |= bit;
        self.slots[slot] = info;
      } else if self.slots[slot] != info {
        self.dirty |= bit;
        self.slots[slot] = info;
      }
    }

    let mut lifted = self.valid & !seen;
    while lifted != 0 {
      let slot = lifted.trailing_zeros() as usize;
      let bit = 1u32 << slot;
      lifted &= !bit;

      self.valid &= !bit;
      self.dirty |= bit;
      // position is kept so the liftoff can be reported where it happened
      self.slots[slot].status = FingerStatus::NotPresent;
      self.remove_from_down_order(slot as u8);
    }

    Ok(())
  }

  fn remove_from_down_order(&mut self, slot: u8) {
    if let Some(pos) = self.down_order().iter().position(|&s| s == slot) {
      self.down_order.copy_within(pos + 1..self.down_count, pos);
      self.down_count -= 1;
    }
  }

  /// Drop every contact without reporting liftoffs.
  pub fn clear(&mut self) {
    *self = Self::new();
  }

  /// Bitmask of occupied slots.
  pub const fn valid_slots(&self) -> u32 {
    self.valid
  }

  /// Bitmask of slots that changed during the last [`FingerCache::update`].
  pub const fn dirty_slots(&self) -> u32 {
    self.dirty
  }

  /// Occupied slots, oldest contact first.
  pub fn down_order(&self) -> &[u8] {
    &self.down_order[..self.down_count]
  }

  pub const fn down_count(&self) -> usize {
    self.down_count
  }

  /// Returns `true` if a finger is down in `slot`.
  pub const fn is_valid(&self, slot: u8) -> bool {
    (slot as usize) < MAX_TOUCHES && self.valid & (1 << slot) != 0
  }

  /// Returns `true` if `slot` changed during the last update.
  pub const fn is_dirty(&self, slot: u8) -> bool {
    (slot as usize) < MAX_TOUCHES && self.dirty & (1 << slot) != 0
  }

  /// Last known state of `slot`, including released slots.
  pub fn slot(&self, slot: u8) -> Option<&FingerInfo> {
    self.slots.get(slot as usize)
  }

  /// Occupied slots with their state, in down order.
  pub fn contacts(&self) -> impl Iterator<Item = (u8, FingerInfo)> + '_ {
    self.down_order().iter().map(move |&s| (s, self.slots[s as usize]))
  }
}

impl Default for FingerCache {
  fn default() -> Self {
    Self::new()
  }
}
