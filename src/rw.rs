use embedded_hal::digital::Error as _;
use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::defs::PAGE_SELECT;
use crate::{page, Error, Rmi4};

/// Largest single register write, excluding the offset byte.
const MAX_WRITE: usize = 31;

impl<I, E, ATTN> Rmi4<I, ATTN>
where
  I: I2c<SevenBitAddress, Error = E>,
  ATTN: Wait,
{
  /// Wait for the controller to assert its active-low attention line.
  pub async fn wait_for_attention(&mut self) -> Result<(), Error<E>> {
    self.attn.wait_for_low().await.map_err(|e| Error::Attention(e.kind()))
  }

  /// Latch `desired` into the page select register unless it is already
  /// selected. A failed write leaves the tracked page unknown, so the next
  /// access selects again whatever page it targets.
  pub(crate) async fn select_page(&mut self, desired: u8) -> Result<(), Error<E>> {
    if !self.page.needs_select(desired) {
      return Ok(());
    }
    trace!("rmi4: select page {=u8}", desired);
    match self.i2c.write(self.config.address, &[PAGE_SELECT, desired]).await {
      Ok(()) => {
        self.page.commit(desired);
        Ok(())
      }
      Err(e) => {
        warn!("rmi4: page select failed, page unknown");
        self.page.invalidate();
        Err(Error::I2c(e))
      }
    }
  }

  /// Read `buf.len()` bytes starting at the flat register address `addr`.
  pub(crate) async fn read_bytes(&mut self, addr: u16, buf: &mut [u8]) -> Result<(), Error<E>> {
    let offset = self.enter(addr).await?;
    self.i2c.write_read(self.config.address, &[offset], buf).await.map_err(Error::I2c)
  }

  pub(crate) async fn read_u8(&mut self, addr: u16) -> Result<u8, Error<E>> {
    let mut b = [0u8; 1];
    self.read_bytes(addr, &mut b).await?;
    Ok(b[0])
  }

  pub(crate) async fn read<const N: usize>(&mut self, addr: u16) -> Result<[u8; N], Error<E>> {
    let mut b = [0u8; N];
    self.read_bytes(addr, &mut b).await?;
    Ok(b)
  }

  pub(crate) async fn write_bytes(&mut self, addr: u16, data: &[u8]) -> Result<(), Error<E>> {
    let len = data.len();
    if len > MAX_WRITE {
      return Err(Error::BufferOverflow);
    }
    let offset = self.enter(addr).await?;
    let mut buf = [0u8; MAX_WRITE + 1];
    buf[0] = offset;
    buf[1..=len].copy_from_slice(data);
    self.i2c.write(self.config.address, &buf[..=len]).await.map_err(Error::I2c)
  }

  pub(crate) async fn write_u8(&mut self, addr: u16, value: u8) -> Result<(), Error<E>> {
    self.write_bytes(addr, &[value]).await
  }

  /// Resolve `addr`, reject the reserved page select offset and make sure the
  /// right page is latched before the transfer.
  async fn enter(&mut self, addr: u16) -> Result<u8, Error<E>> {
    if page::is_reserved(addr) {
      return Err(Error::ReservedAddress(addr));
    }
    let (page, offset) = page::resolve(addr);
    self.select_page(page).await?;
    Ok(offset)
  }
}
