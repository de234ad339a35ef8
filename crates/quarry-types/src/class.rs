use std::fmt;

/// User-facing failure taxonomy.
///
/// Every crate-level error maps into one of these classes. The CLI turns the
/// class into a process exit code, one code per class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorClass {
    /// Transient remote failure (retried before surfacing).
    Network,
    /// Neither the cache nor the remote holds the content.
    BlobUnavailable,
    /// A pointer record or config file is malformed.
    ManifestCorrupt,
    /// Local read/write failure.
    Io,
    /// Invalid user input.
    Argument,
    /// Anything else, including cancellation.
    Other,
}

impl ErrorClass {
    /// Process exit code for this class.
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Argument => 2,
            Self::Io => 3,
            Self::Network => 4,
            Self::BlobUnavailable => 5,
            Self::ManifestCorrupt => 6,
            Self::Other => 1,
        }
    }

    /// Whether an operation failing with this class may succeed on retry.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::BlobUnavailable => "blob unavailable",
            Self::ManifestCorrupt => "manifest corrupt",
            Self::Io => "i/o",
            Self::Argument => "argument",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}
