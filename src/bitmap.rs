/// Fixed-width bit set backed by `WORDS` 32-bit words, LSB of word 0 first.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Bitmap<const WORDS: usize> {
  words: [u32; WORDS],
}

/// Which of the 256 possible registers a descriptor block contains.
pub type PresenceMap = Bitmap<8>;
/// Which of the (up to 296) subpackets a packet register carries.
pub type SubpacketMap = Bitmap<10>;

pub(crate) const PRESENCE_BITS: usize = 32 * 8;
pub(crate) const SUBPACKET_BITS: usize = 37 * 8;

impl<const WORDS: usize> Bitmap<WORDS> {
  pub const BITS: usize = WORDS * 32;

  pub const fn new() -> Self {
    Self { words: [0; WORDS] }
  }

  /// Set bit `n`. Returns `false` if `n` is outside the map.
  pub fn set(&mut self, n: usize) -> bool {
    if n >= Self::BITS {
      return false;
    }
    self.words[n / 32] |= 1 << (n % 32);
    true
  }

  pub fn test(&self, n: usize) -> bool {
    n < Self::BITS && self.words[n / 32] & (1 << (n % 32)) != 0
  }

  /// Population count.
  pub fn weight(&self) -> usize {
    weight(&self.words)
  }

  pub fn is_empty(&self) -> bool {
    self.words.iter().all(|&w| w == 0)
  }

  /// Number of set bits strictly below `n`.
  pub fn rank(&self, n: usize) -> usize {
    self.iter().take_while(|&bit| bit < n).count()
  }

  /// Ascending iterator over set bit indices.
  pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
    (0..Self::BITS).filter(move |&n| self.test(n))
  }
}

impl<const WORDS: usize> Default for Bitmap<WORDS> {
  fn default() -> Self {
    Self::new()
  }
}

impl<const WORDS: usize> core::fmt::Debug for Bitmap<WORDS> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_set().entries(self.iter()).finish()
  }
}

#[cfg(feature = "defmt")]
impl<const WORDS: usize> defmt::Format for Bitmap<WORDS> {
  fn format(&self, f: defmt::Formatter) {
    defmt::write!(f, "{:#x}", &self.words[..])
  }
}

/// Hamming weight of a word slice.
pub const fn weight(words: &[u32]) -> usize {
  let mut total = 0;
  let mut i = 0;
  while i < words.len() {
    total += words[i].count_ones() as usize;
    i += 1;
  }
  total
}
