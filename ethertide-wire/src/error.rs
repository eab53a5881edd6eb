//! Encode/decode error.

/// Wire encode/decode errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum WireError {
    /// The source buffer does not hold enough bytes to decode the requested
    /// type.
    ReadBufferTooShort {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        got: usize,
    },
    /// The destination buffer is too short to hold the packed value.
    WriteBufferTooShort {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        got: usize,
    },
    /// The raw bytes do not form a valid instance of the target type.
    InvalidValue,
}

impl std::error::Error for WireError {}

impl core::fmt::Display for WireError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            WireError::ReadBufferTooShort { needed, got } => write!(
                f,
                "read buffer too short: needed {} bytes, got {}",
                needed, got
            ),
            WireError::WriteBufferTooShort { needed, got } => write!(
                f,
                "write buffer too short: needed {} bytes, got {}",
                needed, got
            ),
            WireError::InvalidValue => f.write_str("invalid value for target type"),
        }
    }
}
