use core::fmt;

/// What an engine does when it can't satisfy a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OomPolicy {
    /// Return [`AllocError`] to the caller.
    ReturnError,
    /// Panic with a message describing the failed request.
    Panic,
}

impl Default for OomPolicy {
    fn default() -> Self {
        Self::ReturnError
    }
}

/// The requested memory block could not be provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError {
    /// The payload size that was requested.
    pub requested: usize,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "out of memory while allocating {} bytes", self.requested)
    }
}

/// A region can't host an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The region can't hold the sentinels and one minimum-size block.
    RegionTooSmall { len: usize, min: usize },
    /// Block offsets in the region would not fit in the size field.
    RegionTooLarge { len: usize, max: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::RegionTooSmall { len, min } => {
                write!(f, "region of {} bytes is smaller than the minimum of {} bytes", len, min)
            }
            Self::RegionTooLarge { len, max } => {
                write!(f, "region of {} bytes exceeds the maximum of {} bytes", len, max)
            }
        }
    }
}

#[cfg(feature = "std")]
#[cfg_attr(feature = "doc_cfg", doc(cfg(feature = "std")))]
impl std::error::Error for AllocError {}

#[cfg(feature = "std")]
#[cfg_attr(feature = "doc_cfg", doc(cfg(feature = "std")))]
impl std::error::Error for ConfigError {}
