//! A cyclic EtherCAT MainDevice core with cable redundancy.
//!
//! Ethertide implements the two subsystems at the heart of a fieldbus
//! master:
//!
//! - A per-SubDevice **request FSM** that multiplexes asynchronous SDO,
//!   register, FoE and SoE requests onto a single shared datagram, spending
//!   at most one datagram per SubDevice per cycle.
//! - A **process data domain engine** that packs FMMU mappings from many
//!   SubDevices into one contiguous logical address space, splits it across
//!   redundant main/backup datagram pairs, and performs byte-range failover
//!   between the two links every cycle.
//!
//! Raw Ethernet I/O is out of scope: a frame driver drains the
//! [`DatagramQueues`], puts datagrams on the wire (the
//! [`Datagram::write_wire`]/[`Datagram::read_wire`] helpers pack and parse
//! the telegram layout) and publishes replies back onto the shared
//! [`Datagram`]s. The mailbox protocols themselves are also external: they
//! plug in behind the [`MailboxTransfer`] capability.
//!
//! Progress is strictly cycle-driven. There are no timers anywhere in the
//! core; a realtime task calls [`MainDevice::tick`], [`Domain::process`] and
//! [`Domain::queue`] once per cycle and everything else follows from
//! datagram round trips.

#![deny(missing_docs)]
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
#![deny(unused_import_braces)]
#![deny(unused_qualifications)]

mod command;
mod datagram;
mod domain;
pub mod error;
mod fmmu;
mod maindevice;
mod register;
mod request;
mod subdevice;
mod subdevice_config;
mod subdevice_state;
mod transfer;

pub use command::{Command, Reads, Writes};
pub use datagram::{
    Datagram, DatagramFlags, DatagramHandle, DatagramHeader, DatagramState, PayloadGuard,
    DATAGRAM_FOOTER_LEN, DATAGRAM_HEADER_LEN,
};
pub use domain::{
    DatagramPair, Domain, DomainState, PdoEntryOffset, PdoEntryRegistration, WcState,
};
pub use fmmu::{FmmuConfig, PdoEntryIndex, PdoEntryMapping};
pub use maindevice::{DatagramQueues, MainDevice};
pub use register::RegisterAddress;
pub use request::{FoeRequest, RegRequest, RequestState, SdoRequest, SoeRequest};
pub use subdevice::{
    RequestFsm, RequestFsmState, SubDevice, SubDeviceIdentity, REQUEST_QUEUE_DEPTH,
};
pub use subdevice_config::SubDeviceConfig;
pub use subdevice_state::{AlStatus, SubDeviceState};
pub use transfer::{MailboxTransfer, TransferEngines};

/// Maximum payload of a single datagram in bytes: Ethernet data (1500) minus
/// the EtherCAT frame header (2), the datagram header (10) and the working
/// counter footer (2).
pub const MAX_PDU_DATA: usize = 1486;

/// Mask for the 11-bit length field of the datagram flags word.
pub(crate) const LEN_MASK: u16 = 0b0000_0111_1111_1111;

/// Number of redundant links a datagram can travel on.
pub const NUM_DEVICES: usize = 2;

/// Which physical link a datagram travels on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DeviceIndex {
    /// The main link.
    Main,
    /// The backup link, used for cable redundancy.
    Backup,
}

impl DeviceIndex {
    /// Queue/array index of this link.
    pub const fn index(self) -> usize {
        match self {
            Self::Main => 0,
            Self::Backup => 1,
        }
    }
}

impl core::fmt::Display for DeviceIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::Backup => f.write_str("backup"),
        }
    }
}

/// Direction of a data transfer or process data mapping, seen from the
/// MainDevice.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Direction {
    /// SubDevice → MainDevice: the MainDevice reads.
    Input,
    /// MainDevice → SubDevice: the MainDevice writes.
    Output,
}

impl core::fmt::Display for Direction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}
