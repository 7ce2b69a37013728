//! Panel hardware revision newtype.
//!
//! Revisions are lettered in configuration keys (`_revA`, `_revB`, ...).
//! Revision A is index 0 and must always be configured.

// ── Error type ───────────────────────────────────────────────────────────────

/// Error returned when a value is out of the valid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutOfRangeError {
    /// The value that was out of range.
    pub value: u32,
    /// The inclusive minimum allowed value.
    pub min: u32,
    /// The inclusive maximum allowed value.
    pub max: u32,
}

impl core::fmt::Display for OutOfRangeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} outside {}..={}", self.value, self.min, self.max)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for OutOfRangeError {}

// ── Revision ─────────────────────────────────────────────────────────────────

/// Hardware revision index, `0` (A) to `25` (Z).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct Revision(u8);

impl Revision {
    /// Highest representable revision index (Z).
    pub const MAX_INDEX: u8 = 25;

    /// Revision A.
    pub const A: Self = Self(0);
    /// Revision B.
    pub const B: Self = Self(1);
    /// Revision C.
    pub const C: Self = Self(2);
    /// Revision D.
    pub const D: Self = Self(3);

    /// Create a revision, clamping indices above Z to Z.
    #[must_use]
    pub fn new(index: u8) -> Self {
        Self(index.min(Self::MAX_INDEX))
    }

    /// Create a revision, rejecting indices above Z.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfRangeError`] if `index > 25`.
    pub fn try_new(index: u8) -> Result<Self, OutOfRangeError> {
        if index > Self::MAX_INDEX {
            Err(OutOfRangeError {
                value: u32::from(index),
                min: 0,
                max: u32::from(Self::MAX_INDEX),
            })
        } else {
            Ok(Self(index))
        }
    }

    /// Parse a revision letter (`'A'..='Z'`, case-insensitive).
    pub fn from_letter(letter: char) -> Option<Self> {
        let upper = letter.to_ascii_uppercase();
        if upper.is_ascii_uppercase() {
            // 'A'..='Z' is contiguous ASCII, so the difference fits in u8.
            let index = u32::from(upper).checked_sub(u32::from('A'))?;
            u8::try_from(index).ok().map(Self)
        } else {
            None
        }
    }

    /// Revision letter as used in configuration keys.
    pub fn letter(self) -> char {
        char::from(b'A'.saturating_add(self.0))
    }

    /// Zero-based index.
    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based index as `usize`, for slot lookups.
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// The preceding revision, or `None` for A.
    pub fn previous(self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }

    /// Iterate revisions `A..` for `count` entries (clamped to Z).
    pub fn iter(count: u8) -> impl Iterator<Item = Self> {
        (0..count.min(Self::MAX_INDEX.saturating_add(1))).map(Self)
    }
}

impl core::fmt::Display for Revision {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "rev{}", self.letter())
    }
}
