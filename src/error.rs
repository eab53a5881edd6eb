//! Ethertide error types.
//!
//! Errors here cover configuration-time failures. Cyclic-path problems (lost
//! datagrams, working counter mismatches, SubDevice refusals) are never
//! surfaced as `Error`s: they terminate the offending request or show up in
//! domain health, see the request and domain modules.

use crate::command::Command;

/// An Ethertide error.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Error {
    /// A low level error occurred when producing or consuming a datagram.
    Pdu(PduError),
    /// A domain configuration error.
    Domain(DomainError),
    /// A fixed size collection was not large enough to hold a given item type.
    Capacity(Item),
    /// An item in a list could not be found.
    NotFound {
        /// Item kind.
        item: Item,

        /// An index into a list of items, if known.
        index: Option<usize>,
    },
    /// A request slot is still in flight and cannot be re-armed.
    RequestBusy,
    /// An internal error occurred. This indicates something that shouldn't
    /// happen within Ethertide.
    Internal,
    /// An error occurred encoding or decoding an item.
    Wire(ethertide_wire::WireError),
}

impl std::error::Error for Error {}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Pdu(e) => write!(f, "pdu: {}", e),
            Error::Domain(e) => write!(f, "domain: {}", e),
            Error::Capacity(item) => write!(f, "not enough capacity for {:?}", item),
            Error::NotFound { item, index } => {
                write!(f, "item kind {:?} not found (index: {:?})", item, index)
            }
            Error::RequestBusy => f.write_str("request is in flight and cannot be re-armed"),
            Error::Internal => f.write_str("internal error"),
            Error::Wire(e) => write!(f, "wire encode/decode error: {}", e),
        }
    }
}

/// The kind of item being looked for or stored.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Item {
    /// An EtherCAT SubDevice.
    SubDevice,
    /// A SubDevice configuration.
    SubDeviceConfig,
    /// Fieldbus Memory Management Unit configuration.
    Fmmu,
    /// A PDO entry.
    PdoEntry,
    /// An asynchronous request (SDO, register, FoE or SoE).
    Request,
    /// A process data domain.
    Domain,
}

/// Low-level PDU (Process Data Unit) error.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PduError {
    /// PDU data is too long to fit in a single datagram.
    TooLong {
        /// Requested payload length in bytes.
        len: usize,

        /// Maximum payload length in bytes.
        max: usize,
    },
    /// Failed to decode raw PDU data into a given data type.
    Decode,
    /// A received datagram failed to validate against the one sent.
    Validation(PduValidationError),
}

impl core::fmt::Display for PduError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PduError::TooLong { len, max } => {
                write!(f, "data of {} bytes too long for datagram of max {}", len, max)
            }
            PduError::Decode => f.write_str("failed to decode raw PDU data into type"),
            PduError::Validation(e) => write!(f, "received PDU validation failed: {}", e),
        }
    }
}

/// A datagram response failed to validate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PduValidationError {
    /// The index of the received datagram does not match that of the sent one.
    IndexMismatch {
        /// Sent index.
        sent: u8,
        /// Received index.
        received: u8,
    },
    /// The received command does not match the one sent.
    CommandMismatch {
        /// Sent command.
        sent: Command,
        /// Received command.
        received: Command,
    },
}

impl core::fmt::Display for PduValidationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::IndexMismatch { sent, received } => {
                write!(f, "datagram index mismatch: sent {}, received {}", sent, received)
            }
            Self::CommandMismatch { sent, received } => {
                write!(f, "datagram command mismatch: sent {}, received {}", sent, received)
            }
        }
    }
}

/// Domain configuration error.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DomainError {
    /// The domain is finished; its FMMU layout and memory are frozen.
    Finished,
    /// The operation requires a finished domain.
    NotFinished,
    /// A single FMMU mapping is larger than the maximum datagram payload and
    /// cannot be covered by one datagram.
    FmmuTooLarge {
        /// FMMU mapping size in bytes.
        size: usize,

        /// Maximum datagram payload in bytes.
        max: usize,
    },
    /// The supplied external memory is smaller than the domain image.
    ExternalMemoryTooSmall {
        /// Bytes required by the domain image.
        needed: usize,

        /// Bytes supplied.
        got: usize,
    },
}

impl core::fmt::Display for DomainError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DomainError::Finished => f.write_str("domain is finished and frozen"),
            DomainError::NotFinished => f.write_str("domain is not finished yet"),
            DomainError::FmmuTooLarge { size, max } => write!(
                f,
                "FMMU mapping of {} bytes exceeds max datagram payload of {}",
                size, max
            ),
            DomainError::ExternalMemoryTooSmall { needed, got } => write!(
                f,
                "external memory of {} bytes too small for domain image of {}",
                got, needed
            ),
        }
    }
}

impl From<PduError> for Error {
    fn from(e: PduError) -> Self {
        Self::Pdu(e)
    }
}

impl From<DomainError> for Error {
    fn from(e: DomainError) -> Self {
        Self::Domain(e)
    }
}

impl From<PduValidationError> for PduError {
    fn from(e: PduValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<ethertide_wire::WireError> for Error {
    fn from(value: ethertide_wire::WireError) -> Self {
        Self::Wire(value)
    }
}
