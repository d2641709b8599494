//! High-level touch event façade turning finger cache updates into contact
//! transitions. Available when the `touchpad` Cargo feature is enabled.
//!
//! ```no_run
//! # use embedded_hal_async::{digital::Wait, i2c::{I2c, SevenBitAddress}};
//! # use rmi4::{Rmi4, Touchpad, TouchPhase};
//! # async fn example<I2C, ATTN, E>(controller: Rmi4<I2C, ATTN>) -> Result<(), rmi4::Error<E>>
//! # where I2C: I2c<SevenBitAddress, Error = E>, ATTN: Wait
//! # {
//! let mut touchpad = Touchpad::new(controller);
//! touchpad.controller().attach().await?;
//!
//! loop {
//!   let frame = touchpad.next_frame().await?;
//!   for touch in frame.contacts().iter() {
//!     match touch.phase {
//!       TouchPhase::Start => { /* finger down at touch.point */ }
//!       TouchPhase::Move => { /* finger moved */ }
//!       TouchPhase::End => { /* finger lifted at its last position */ }
//!     }
//!   }
//! }
//! # }
//! ```

use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::defs::MAX_TOUCHES;
use crate::{Error, FingerCache, FingerInfo, InterruptStatus, Rmi4};

/// Indicates how a finger changed compared to the previous frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TouchPhase {
  /// A new finger contact appeared on the surface.
  Start,
  /// An existing finger moved or changed classification.
  Move,
  /// A finger was lifted off the surface.
  End,
}

impl TouchPhase {
  /// Returns `true` if this is [`TouchPhase::Start`].
  pub const fn is_start(self) -> bool {
    matches!(self, TouchPhase::Start)
  }

  /// Returns `true` if this is [`TouchPhase::Move`].
  pub const fn is_move(self) -> bool {
    matches!(self, TouchPhase::Move)
  }

  /// Returns `true` if this is [`TouchPhase::End`].
  pub const fn is_end(self) -> bool {
    matches!(self, TouchPhase::End)
  }

  pub const fn as_str(self) -> &'static str {
    match self {
      TouchPhase::Start => "start",
      TouchPhase::Move => "move",
      TouchPhase::End => "end",
    }
  }
}

/// One slot transition in a frame. For [`TouchPhase::End`] the point is the
/// last position seen before liftoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Touch {
  pub slot: u8,
  pub phase: TouchPhase,
  pub point: FingerInfo,
}

impl Touch {
  pub const fn new(slot: u8, phase: TouchPhase, point: FingerInfo) -> Self {
    Self { slot, phase, point }
  }
}

/// Active contacts, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct State {
  contacts: [(u8, FingerInfo); MAX_TOUCHES],
  len: usize,
}

impl State {
  /// No contacts.
  pub const fn new() -> Self {
    Self { contacts: [(0, Changes::EMPTY.point); MAX_TOUCHES], len: 0 }
  }

  /// Snapshot the cache's valid slots in down order.
  pub fn from_cache(cache: &FingerCache) -> Self {
    let mut contacts = [(0, FingerInfo::default()); MAX_TOUCHES];
    let mut len = 0;
    for c in cache.contacts() {
      contacts[len] = c;
      len += 1;
    }
    Self { contacts, len }
  }

  /// The contact that has been down the longest.
  pub fn primary(&self) -> Option<FingerInfo> {
    self.iter().next().map(|(_, f)| f)
  }

  /// Position of the contact in `slot`, if it is down.
  pub fn get(&self, slot: u8) -> Option<FingerInfo> {
    self.iter().find(|(s, _)| *s == slot).map(|(_, f)| f)
  }

  /// `(slot, point)` pairs, oldest contact first.
  pub fn iter(&self) -> impl Iterator<Item = (u8, FingerInfo)> + '_ {
    self.contacts[..self.len].iter().copied()
  }

  pub fn count(&self) -> usize {
    self.len
  }

  /// Returns `true` if no finger is down.
  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Bit mask of the slots that are down.
  pub fn mask(&self) -> u32 {
    self.iter().fold(0u32, |m, (slot, _)| m | 1u32 << slot)
  }

  /// Returns `true` if more than one finger is down.
  pub fn is_multi_touch(&self) -> bool {
    self.len > 1
  }

  /// Average position of all active contacts.
  pub fn centroid(&self) -> Option<(u16, u16)> {
    if self.is_empty() {
      return None;
    }
    let (sx, sy) = self.iter().fold((0u32, 0u32), |(sx, sy), (_, f)| (sx + f.x as u32, sy + f.y as u32));
    let n = self.len as u32;
    Some(((sx / n) as u16, (sy / n) as u16))
  }
}

/// Slot transitions of one frame, ascending by slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Changes {
  touches: [Touch; MAX_TOUCHES],
  len: usize,
}

impl Changes {
  const EMPTY: Touch = Touch::new(0, TouchPhase::End, FingerInfo {
    x: 0,
    y: 0,
    status: crate::FingerStatus::NotPresent,
  });

  /// No transitions.
  pub const fn new() -> Self {
    Self { touches: [Self::EMPTY; MAX_TOUCHES], len: 0 }
  }

  fn push(&mut self, touch: Touch) {
    if self.len < MAX_TOUCHES {
      self.touches[self.len] = touch;
      self.len += 1;
    }
  }

  /// Transition of `slot` in this frame, if it changed.
  pub fn get(&self, slot: u8) -> Option<Touch> {
    self.iter().find(|t| t.slot == slot)
  }

  pub fn iter(&self) -> impl Iterator<Item = Touch> + '_ {
    self.touches[..self.len].iter().copied()
  }

  /// Returns `true` if no slot changed.
  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn count(&self) -> usize {
    self.len
  }

  /// Returns `true` if any finger went down.
  pub fn has_starts(&self) -> bool {
    self.iter().any(|t| t.phase.is_start())
  }

  /// Returns `true` if any finger lifted.
  pub fn has_ends(&self) -> bool {
    self.iter().any(|t| t.phase.is_end())
  }

  /// Returns `true` if any finger moved.
  pub fn has_moves(&self) -> bool {
    self.iter().any(|t| t.phase.is_move())
  }

  pub fn contacts_with_phase(&self, phase: TouchPhase) -> impl Iterator<Item = Touch> + '_ {
    self.iter().filter(move |t| t.phase == phase)
  }
}

impl Default for Changes {
  fn default() -> Self {
    Self::new()
  }
}

/// Summary of one service cycle as seen by a touch consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
  pub status: InterruptStatus,
  pub events: Changes,
  pub state: State,
}

impl Frame {
  pub const fn status(&self) -> InterruptStatus {
    self.status
  }

  pub const fn contacts(&self) -> &Changes {
    &self.events
  }

  pub const fn snapshot(&self) -> &State {
    &self.state
  }

  /// Returns `true` if any slot changed in this frame.
  pub fn has_activity(&self) -> bool {
    !self.events.is_empty()
  }

  /// The first finger of a new touch session went down.
  pub fn is_session_start(&self) -> bool {
    self.events.has_starts() && self.state.count() == 1
  }

  /// The last finger of a touch session lifted.
  pub fn is_session_end(&self) -> bool {
    self.events.has_ends() && self.state.is_empty()
  }

  /// Returns `true` if more than one finger is down after this frame.
  pub fn is_multi_touch(&self) -> bool {
    self.state.is_multi_touch()
  }
}

/// Derive slot transitions from the cache and the contacts of the previous
/// frame. Slots that vanished without a dirty bit (the cache was rebuilt
/// after a controller reset) still report an end, at the point the previous
/// frame held for them.
fn build_changes(previous: &State, cache: &FingerCache, updated: bool) -> Changes {
  let before = previous.mask();
  let valid = cache.valid_slots();
  let mut mask = before & !valid;
  if updated {
    mask |= cache.dirty_slots();
  }

  let mut changes = Changes::new();
  while mask != 0 {
    let slot = mask.trailing_zeros() as u8;
    mask &= !(1 << slot);

    let was = before & (1 << slot) != 0;
    let is = valid & (1 << slot) != 0;
    let phase = match (was, is) {
      (false, true) => TouchPhase::Start,
      (true, true) => TouchPhase::Move,
      (true, false) => TouchPhase::End,
      // touched and lifted between two frames
      (false, false) => continue,
    };
    let point = match phase {
      TouchPhase::End => previous.get(slot).or_else(|| cache.slot(slot).copied()),
      _ => cache.slot(slot).copied(),
    }
    .unwrap_or_default();
    changes.push(Touch::new(slot, phase, point));
  }
  changes
}

/// Ergonomic façade on top of [`Rmi4`] that turns finger cache updates into
/// touch events.
pub struct Touchpad<I, ATTN> {
  controller: Rmi4<I, ATTN>,
  previous: State,
}

impl<I, ATTN> Touchpad<I, ATTN> {
  pub fn new(controller: Rmi4<I, ATTN>) -> Self {
    Self { controller, previous: State::new() }
  }

  /// Give the controller back.
  pub fn into_inner(self) -> Rmi4<I, ATTN> {
    self.controller
  }

  /// Low level access, for operations the façade does not expose.
  pub fn controller(&mut self) -> &mut Rmi4<I, ATTN> {
    &mut self.controller
  }

  /// Shared access to the controller.
  pub fn controller_ref(&self) -> &Rmi4<I, ATTN> {
    &self.controller
  }
}

impl<I, E, ATTN> Touchpad<I, ATTN>
where
  I: I2c<SevenBitAddress, Error = E>,
  ATTN: Wait,
{
  /// Wait for the attention line, run one service cycle and report what
  /// changed.
  pub async fn next_frame(&mut self) -> Result<Frame, Error<E>> {
    self.controller.wait_for_attention().await?;
    self.poll().await
  }

  /// Like [`Touchpad::next_frame`] without waiting on the attention line.
  pub async fn poll(&mut self) -> Result<Frame, Error<E>> {
    let status = self.controller.service().await?;
    let cache = self.controller.fingers();
    let events = build_changes(&self.previous, cache, self.controller.fingers_updated());
    let state = State::from_cache(cache);
    self.previous = state;
    Ok(Frame { status, events, state })
  }

  /// Frames as an endless stream of [`Touchpad::next_frame`] results.
  pub fn stream(&mut self) -> Stream<'_, I, ATTN> {
    Stream { touchpad: self }
  }
}

/// A stream of frames. Create one using [`Touchpad::stream`].
pub struct Stream<'a, I, ATTN> {
  touchpad: &'a mut Touchpad<I, ATTN>,
}

impl<'a, I, E, ATTN> Stream<'a, I, ATTN>
where
  I: I2c<SevenBitAddress, Error = E>,
  ATTN: Wait,
{
  /// Wait for the next frame. Never yields `None`; errors end the stream.
  pub async fn next(&mut self) -> Result<Option<Frame>, Error<E>> {
    Ok(Some(self.touchpad.next_frame().await?))
  }
}
