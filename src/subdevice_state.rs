//! AL (application layer) state for a single SubDevice.

use ethertide_wire::{WireError, WireRead, WireWrite};

/// The `ACK_ERR` bit of the AL status register: the SubDevice has flagged an
/// error which must be acknowledged before it accepts further mailbox or
/// state traffic.
const ERROR_ACK: u8 = 0x10;

/// Mask for the state nibble of the AL status register.
const STATE_MASK: u8 = 0x0f;

/// AL state machine states for a single SubDevice.
///
/// Read from register `0x0130`
/// ([`RegisterAddress::AlStatus`](crate::RegisterAddress::AlStatus)).
///
/// Defined in ETG1000.6 6.4.1, ETG1000.6 Table 9.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum SubDeviceState {
    /// No state recorded/read/known.
    #[default]
    None = 0x00,
    /// EtherCAT `INIT` state.
    Init = 0x01,
    /// EtherCAT `PRE-OP` state.
    PreOp = 0x02,
    /// EtherCAT `BOOT` state.
    Bootstrap = 0x03,
    /// EtherCAT `SAFE-OP` state.
    SafeOp = 0x04,
    /// EtherCAT `OP` state.
    Op = 0x08,
    /// An unknown state value.
    Other(u8),
}

impl From<u8> for SubDeviceState {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::None,
            0x01 => Self::Init,
            0x02 => Self::PreOp,
            0x03 => Self::Bootstrap,
            0x04 => Self::SafeOp,
            0x08 => Self::Op,
            other => Self::Other(other),
        }
    }
}

impl From<SubDeviceState> for u8 {
    fn from(value: SubDeviceState) -> Self {
        match value {
            SubDeviceState::None => 0x00,
            SubDeviceState::Init => 0x01,
            SubDeviceState::PreOp => 0x02,
            SubDeviceState::Bootstrap => 0x03,
            SubDeviceState::SafeOp => 0x04,
            SubDeviceState::Op => 0x08,
            SubDeviceState::Other(other) => other,
        }
    }
}

impl core::fmt::Display for SubDeviceState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SubDeviceState::None => f.write_str("None"),
            SubDeviceState::Init => f.write_str("Init"),
            SubDeviceState::PreOp => f.write_str("Pre-Operational"),
            SubDeviceState::Bootstrap => f.write_str("Bootstrap"),
            SubDeviceState::SafeOp => f.write_str("Safe-Operational"),
            SubDeviceState::Op => f.write_str("Operational"),
            SubDeviceState::Other(value) => write!(f, "Other({:#04x})", value),
        }
    }
}

/// A decoded AL status register value: the state nibble plus the error
/// acknowledge flag.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AlStatus {
    /// Current application layer state.
    pub state: SubDeviceState,

    /// `ACK_ERR`: the SubDevice flagged an error that has not been
    /// acknowledged yet.
    pub error_ack: bool,
}

impl AlStatus {
    /// A SubDevice resting in the given state with no error flagged.
    pub fn new(state: SubDeviceState) -> Self {
        Self {
            state,
            error_ack: false,
        }
    }

    /// The given state with the `ACK_ERR` bit set.
    pub fn with_error(state: SubDeviceState) -> Self {
        Self {
            state,
            error_ack: true,
        }
    }
}

impl WireRead for AlStatus {
    fn unpack_from_slice(buf: &[u8]) -> Result<Self, WireError> {
        let raw = u8::unpack_from_slice(buf)?;

        Ok(Self {
            state: SubDeviceState::from(raw & STATE_MASK),
            error_ack: raw & ERROR_ACK != 0,
        })
    }
}

impl WireWrite for AlStatus {
    fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8] {
        let raw = u8::from(self.state) & STATE_MASK | if self.error_ack { ERROR_ACK } else { 0 };

        raw.pack_to_slice_unchecked(buf)
    }

    fn packed_len(&self) -> usize {
        1
    }
}

impl core::fmt::Display for AlStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.error_ack {
            write!(f, "{} + ACK_ERR", self.state)
        } else {
            self.state.fmt(f)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_status_with_error_flag() {
        assert_eq!(
            AlStatus::unpack_from_slice(&[0x14]),
            Ok(AlStatus {
                state: SubDeviceState::SafeOp,
                error_ack: true
            })
        );
    }

    #[test]
    fn state_roundtrip() {
        for raw in [0x00u8, 0x01, 0x02, 0x03, 0x04, 0x08, 0x0f] {
            assert_eq!(u8::from(SubDeviceState::from(raw)), raw);
        }
    }
}
