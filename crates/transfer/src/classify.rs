use crate::{DEFAULT_CHUNK_SIZE, DEFAULT_HARD_MAX, DEFAULT_SMALL_CEILING, TransferError};

/// Upload strategy selected for a declared object size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    /// Fits in one request.
    Inline,
    /// Needs an upload session.
    Chunked,
    /// Over the hard maximum; must be refused before any network call.
    TooLarge,
}

/// Classifies `size` against the two ceilings.
pub fn classify(size: u64, small_ceiling: u64, hard_max: u64) -> SizeClass {
    if size > hard_max {
        SizeClass::TooLarge
    } else if size <= small_ceiling {
        SizeClass::Inline
    } else {
        SizeClass::Chunked
    }
}

/// Size limits applied to every transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    /// Objects at or below this size are uploaded inline.
    pub small_ceiling: u64,
    /// Objects above this size are refused.
    pub hard_max: u64,
    /// Bytes per session chunk.
    pub chunk_size: usize,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            small_ceiling: DEFAULT_SMALL_CEILING,
            hard_max: DEFAULT_HARD_MAX,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl TransferLimits {
    /// Builds validated limits.
    pub fn new(small_ceiling: u64, hard_max: u64, chunk_size: usize) -> Result<Self, TransferError> {
        let limits = Self {
            small_ceiling,
            hard_max,
            chunk_size,
        };
        limits.validate()?;
        Ok(limits)
    }

    pub fn validate(&self) -> Result<(), TransferError> {
        if self.chunk_size == 0 {
            return Err(TransferError::InvalidLimits("chunk size must be non-zero".into()));
        }
        if self.small_ceiling > self.hard_max {
            return Err(TransferError::InvalidLimits(format!(
                "small ceiling {} exceeds hard maximum {}",
                self.small_ceiling, self.hard_max
            )));
        }
        Ok(())
    }

    pub fn classify(&self, size: u64) -> SizeClass {
        classify(size, self.small_ceiling, self.hard_max)
    }
}
