#![cfg_attr(not(test), no_std)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Async, `no_std` driver core for Synaptics RMI4 touch controllers on I²C.
//!
//! RMI4 controllers describe themselves: a page description table lists the
//! functions the firmware implements, and descriptor-based functions such as
//! the F12 2-D sensor publish their own register layout as a compact bitmap
//! structure. This crate handles:
//!
//! - Paged register access with redundant page selects elided
//! - Function discovery across pages
//! - Decoding self-describing register descriptors
//! - Interrupt and device status classification, including re-discovery after
//!   a controller reset
//! - Turning per-poll finger objects into stable, ordered touch slots
//! - Optional touchpad event façade (enable the `touchpad` Cargo feature)
//!
//! ```no_run
//! use embedded_hal_async::{digital::Wait, i2c::{I2c, SevenBitAddress}};
//! use rmi4::{Config, Rmi4};
//!
//! async fn example<I2C, ATTN, E>(i2c: I2C, attn: ATTN) -> Result<(), rmi4::Error<E>>
//! where
//!   I2C: I2c<SevenBitAddress, Error = E>,
//!   ATTN: Wait,
//! {
//!   let mut controller = Rmi4::new(i2c, attn, Config::default().with_address(0x2c));
//!   controller.attach().await?;
//!
//!   loop {
//!     controller.wait_for_attention().await?;
//!     controller.service().await?;
//!     for slot in controller.fingers().down_order() {
//!       let _finger = controller.fingers().slot(*slot);
//!     }
//!   }
//! }
//! ```

#[macro_use]
mod fmt;

mod bitmap;
mod config;
mod defs;
mod descriptor;
mod f01;
mod f12;
mod finger;
mod function;
mod interrupt;
mod page;
mod rw;
#[cfg(feature = "touchpad")]
mod touchpad;

#[cfg(test)]
mod fake;

use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

pub use bitmap::{weight, Bitmap, PresenceMap, SubpacketMap};
pub use config::Config;
pub use defs::{
  SleepMode, F01_DEVICE_CONTROL, F12_2D_SENSOR, F1A_0D_BUTTONS, IRQ_0D_BUTTON, IRQ_2D_TOUCH, MAX_FUNCTIONS,
  MAX_TOUCHES, PAGE_SELECT, PDT_ENTRY_SIZE, PDT_START,
};
pub use descriptor::{DescriptorError, RegisterDescriptor, RegisterDescriptorItem};
pub use f01::DeviceInfo;
pub use f12::{decode_object, ObjectType, Sensor};
pub use finger::{FingerCache, FingerInfo, FingerStatus, InvalidSlot, RawObject};
pub use function::{FunctionDescriptor, FunctionDirectory};
pub use interrupt::{DeviceStatus, InterruptStatus};
pub use page::PageState;
#[cfg(feature = "touchpad")]
pub use touchpad::*;

use f01::F01;

/// Errors that can occur while talking to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
  /// I²C bus transaction failed with the underlying driver error.
  I2c(E),
  /// Waiting on the attention line failed with the pin driver's error kind.
  Attention(embedded_hal::digital::ErrorKind),
  /// The page description tables list more live functions than fit.
  DirectoryOverflow,
  /// A register descriptor or function layout did not decode.
  MalformedDescriptor,
  /// A register descriptor is valid but exceeds the fixed capacity.
  DescriptorCapacity,
  /// An operation attempted to write a buffer larger than the protocol allows.
  BufferOverflow,
  /// A required function is missing from the page description tables.
  FunctionNotFound(u8),
  /// The page select register cannot be addressed as a data register.
  ReservedAddress(u16),
  /// A finger object addressed a slot beyond [`MAX_TOUCHES`].
  SlotOutOfRange(u8),
  /// The operation needs [`Rmi4::attach`] to have succeeded first.
  NotAttached,
  /// The controller reported a fatal status; the session is halted.
  DeviceFault(DeviceStatus),
  /// The session was halted by an earlier fatal status. Call [`Rmi4::reset`].
  ResetRequired,
}

/// One RMI4 controller session.
///
/// The driver owns the I²C peripheral and attention pin. Every operation
/// takes `&mut self`, so a whole service cycle runs under one exclusive
/// borrow and no bus traffic interleaves with it. Create an instance with
/// [`Rmi4::new`], then call [`Rmi4::attach`] to discover and configure the
/// controller.
pub struct Rmi4<I, ATTN> {
  i2c: I,
  attn: ATTN,
  config: Config,
  page: PageState,
  functions: FunctionDirectory,
  f01: Option<F01>,
  f12: Option<Sensor>,
  fingers: FingerCache,
  irq: u8,
  halted: bool,
  fresh: bool,
}

impl<I, E, ATTN> Rmi4<I, ATTN>
where
  I: I2c<SevenBitAddress, Error = E>,
  ATTN: Wait,
{
  /// Create a new driver instance. Nothing is sent until [`Rmi4::attach`].
  pub fn new(i2c: I, attn: ATTN, config: Config) -> Self {
    Self {
      i2c,
      attn,
      config,
      page: PageState::new(),
      functions: FunctionDirectory::new(),
      f01: None,
      f12: None,
      fingers: FingerCache::new(),
      irq: 0,
      halted: false,
      fresh: false,
    }
  }

  /// Discover functions, read F01 identity, push the staged configuration
  /// and resolve the F12 register layout.
  ///
  /// Any earlier session state is dropped first, so a failed attach leaves the
  /// driver detached rather than half rebuilt. A halted session refuses with
  /// [`Error::ResetRequired`]; only [`Rmi4::reset`] clears the halt.
  pub async fn attach(&mut self) -> Result<(), Error<E>> {
    if self.halted {
      return Err(Error::ResetRequired);
    }

    self.f01 = None;
    self.f12 = None;
    self.functions = FunctionDirectory::new();
    self.fingers.clear();
    self.irq = 0;

    let functions = self.discover().await?;

    let f01 = *functions.find(F01_DEVICE_CONTROL).ok_or(Error::FunctionNotFound(F01_DEVICE_CONTROL))?;
    let info = self.read_device_info(&f01).await?;
    self.configure_device(&f01, &info).await?;

    let f12 = *functions.find(F12_2D_SENSOR).ok_or(Error::FunctionNotFound(F12_2D_SENSOR))?;
    let sensor = self.configure_sensor(&f12).await?;

    self.functions = functions;
    self.f01 = Some(F01 { descriptor: f01, info });
    self.f12 = Some(sensor);
    Ok(())
  }

  /// Run one interrupt service cycle.
  ///
  /// Reads the interrupt and device status, rebuilds the session after a
  /// controller reset, and folds fresh finger objects into the cache when
  /// the 2-D sensor has data pending. A fatal device status halts the
  /// session until [`Rmi4::reset`].
  pub async fn service(&mut self) -> Result<InterruptStatus, Error<E>> {
    self.fresh = false;
    if self.halted {
      return Err(Error::ResetRequired);
    }

    let status = self.check_interrupts().await?;
    if status.is_fatal() {
      self.halted = true;
      return Err(Error::DeviceFault(status.device));
    }

    if status.needs_rediscovery() {
      info!("rmi4: re-attaching after reset");
      // a reset controller comes back on page 0
      self.page = PageState::new();
      self.attach().await?;
      return Ok(status);
    }

    if self.irq & IRQ_2D_TOUCH != 0 {
      let mut objects = [RawObject::default(); MAX_TOUCHES];
      let count = self.read_objects(&mut objects).await?;
      self.fingers.update(&objects[..count])?;
      self.acknowledge(IRQ_2D_TOUCH);
      self.fresh = true;
    }

    Ok(status)
  }

  /// Returns `true` if the last [`Rmi4::attach`] resolved both F01 and F12.
  pub fn is_attached(&self) -> bool {
    self.f01.is_some() && self.f12.is_some()
  }

  /// Returns `true` once a fatal status was seen and no reset has followed.
  pub const fn is_halted(&self) -> bool {
    self.halted
  }

  /// Configuration pushed on every attach.
  pub const fn config(&self) -> &Config {
    &self.config
  }

  /// Functions found by the last successful attach.
  pub const fn functions(&self) -> &FunctionDirectory {
    &self.functions
  }

  /// Tracked finger slots as of the last successful [`Rmi4::service`].
  ///
  /// The cache is cleared by every attach, including the automatic one after
  /// a controller reset.
  pub const fn fingers(&self) -> &FingerCache {
    &self.fingers
  }

  /// `true` if the last [`Rmi4::service`] folded new objects into the cache.
  pub const fn fingers_updated(&self) -> bool {
    self.fresh
  }

  /// Page currently latched in the controller, or `None` after a page select
  /// write failed and the latched page is unknown.
  pub const fn current_page(&self) -> Option<u8> {
    self.page.current()
  }

  /// Release the bus and attention pin.
  pub fn release(self) -> (I, ATTN) {
    (self.i2c, self.attn)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::defs::F01_CMD_RESET;
  use crate::fake::{attached, block_on, device, FakeBus, NoDelay, F01_COMMAND, F01_DATA, F12_DATA};

  fn touch(dev: &mut Rmi4<FakeBus, crate::fake::FakePin>, objects: [[u8; 8]; 2]) {
    dev.i2c.put(F01_DATA, &[0x00, IRQ_2D_TOUCH]);
    dev.i2c.put(F12_DATA + 2, &objects[0]);
    dev.i2c.put(F12_DATA + 10, &objects[1]);
  }

  const FINGER_A: [u8; 8] = [0x01, 100, 0, 50, 0, 0, 0, 0];
  const FINGER_B: [u8; 8] = [0x06, 200, 0, 80, 0, 0, 0, 0];
  const NONE: [u8; 8] = [0; 8];

  #[test]
  fn attach_requires_f01() {
    let mut bus = FakeBus::new();
    bus.put(0x00E9, &[0x50, 0, 0x60, 0x08, 1, F12_2D_SENSOR]);
    let mut dev = device(bus);
    assert!(matches!(block_on(dev.attach()), Err(Error::FunctionNotFound(F01_DEVICE_CONTROL))));
    assert!(!dev.is_attached());
  }

  #[test]
  fn service_feeds_finger_cache() {
    let (mut dev, _) = attached();

    touch(&mut dev, [FINGER_A, NONE]);
    block_on(dev.service()).unwrap();
    assert_eq!(dev.fingers().valid_slots(), 0b01);
    assert_eq!(dev.fingers().down_order(), &[0]);
    assert_eq!(dev.pending_interrupts(), 0);
    assert!(dev.fingers_updated());

    touch(&mut dev, [FINGER_A, FINGER_B]);
    block_on(dev.service()).unwrap();
    assert_eq!(dev.fingers().down_order(), &[0, 1]);
    assert_eq!(dev.fingers().dirty_slots(), 0b10);

    touch(&mut dev, [NONE, FINGER_B]);
    block_on(dev.service()).unwrap();
    assert_eq!(dev.fingers().down_order(), &[1]);
    assert_eq!(dev.fingers().dirty_slots(), 0b01);
    assert_eq!(dev.fingers().slot(0).map(|f| f.x), Some(100));
  }

  #[test]
  fn service_skips_data_without_touch_interrupt() {
    let (mut dev, _) = attached();
    dev.i2c.put(F01_DATA, &[0x00, 0x00]);
    dev.i2c.put(F12_DATA + 2, &FINGER_A);
    block_on(dev.service()).unwrap();
    assert_eq!(dev.fingers().valid_slots(), 0);
    assert!(!dev.fingers_updated());
  }

  #[test]
  fn fatal_status_halts_until_reset() {
    let (mut dev, _) = attached();
    dev.i2c.put(F01_DATA, &[0x04, IRQ_2D_TOUCH]);
    assert!(matches!(block_on(dev.service()), Err(Error::DeviceFault(DeviceStatus::ConfigCrcFailure))));
    assert!(dev.is_halted());

    dev.i2c.put(F01_DATA, &[0x00, 0x00]);
    assert!(matches!(block_on(dev.service()), Err(Error::ResetRequired)));

    block_on(dev.reset(&mut NoDelay)).unwrap();
    assert!(!dev.is_halted());
    assert!(block_on(dev.service()).is_ok());
  }

  #[test]
  fn attach_cannot_clear_fatal_halt() {
    let (mut dev, _) = attached();
    dev.i2c.put(F01_DATA, &[0x04, IRQ_2D_TOUCH]);
    assert!(block_on(dev.service()).is_err());
    assert!(dev.is_halted());

    dev.i2c.put(F01_DATA, &[0x00, 0x00]);
    assert!(matches!(block_on(dev.attach()), Err(Error::ResetRequired)));
    assert!(dev.is_halted());
    assert!(!dev.i2c.wrote(F01_COMMAND, &[F01_CMD_RESET]));
    assert!(matches!(block_on(dev.service()), Err(Error::ResetRequired)));

    block_on(dev.reset(&mut NoDelay)).unwrap();
    assert!(dev.i2c.wrote(F01_COMMAND, &[F01_CMD_RESET]));
    assert!(!dev.is_halted());
    assert!(dev.is_attached());
  }

  #[test]
  fn failed_reset_command_stays_halted() {
    let (mut dev, _) = attached();
    dev.i2c.put(F01_DATA, &[0x05, 0x00]);
    assert!(matches!(block_on(dev.service()), Err(Error::DeviceFault(DeviceStatus::FirmwareCrcFailure))));

    dev.i2c.fail_after(dev.i2c.transactions());
    assert!(matches!(block_on(dev.reset(&mut NoDelay)), Err(Error::I2c(_))));
    assert!(dev.is_halted());
  }

  #[test]
  fn diagnostic_status_keeps_polling() {
    for (raw, expected) in [(0x02, DeviceStatus::InvalidConfiguration), (0x09, DeviceStatus::Unknown(9))] {
      let (mut dev, _) = attached();
      dev.i2c.put(F01_DATA, &[raw, IRQ_2D_TOUCH]);
      dev.i2c.put(F12_DATA + 2, &FINGER_A);

      let status = block_on(dev.service()).unwrap();
      assert_eq!(status.device, expected);
      assert!(!dev.is_halted(), "status {raw:#x}");
      assert!(dev.fingers_updated());
      assert_eq!(dev.fingers().valid_slots(), 0b01);
      assert_eq!(dev.fingers().slot(0).map(|f| (f.x, f.y)), Some((100, 50)));

      // the next cycle still runs
      dev.i2c.put(F01_DATA, &[raw, IRQ_2D_TOUCH]);
      dev.i2c.put(F12_DATA + 2, &NONE);
      assert!(block_on(dev.service()).is_ok());
      assert_eq!(dev.fingers().valid_slots(), 0);
    }
  }

  #[test]
  fn reset_status_rediscovers() {
    let (mut dev, _) = attached();
    touch(&mut dev, [FINGER_A, NONE]);
    block_on(dev.service()).unwrap();
    assert_eq!(dev.fingers().down_count(), 1);

    dev.i2c.put(F01_DATA, &[0x01, IRQ_2D_TOUCH]);
    let reads_before = dev.i2c.reads_at(0x00E9);
    let status = block_on(dev.service()).unwrap();
    assert_eq!(status.device, DeviceStatus::ResetOccurred);
    assert_eq!(dev.i2c.reads_at(0x00E9), reads_before + 1);
    assert_eq!(dev.fingers().down_count(), 0);
    assert!(dev.is_attached());
  }

  #[test]
  fn failed_cycle_leaves_cache_untouched() {
    let (mut dev, _) = attached();
    touch(&mut dev, [FINGER_A, NONE]);
    block_on(dev.service()).unwrap();
    let before = *dev.fingers();

    touch(&mut dev, [NONE, FINGER_B]);
    // status read succeeds, data read fails
    dev.i2c.fail_after(dev.i2c.transactions() + 1);
    assert!(matches!(block_on(dev.service()), Err(Error::I2c(_))));
    assert_eq!(*dev.fingers(), before);
  }
}
