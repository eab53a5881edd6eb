//! Fieldbus Memory Management Unit (FMMU) configuration.
//!
//! An FMMU maps a SubDevice-local physical byte range into the MainDevice's
//! global logical address space. A domain collects FMMU configs from many
//! SubDevice configs and lays them out back to back; see
//! [`Domain::finish`](crate::Domain::finish).

use crate::{subdevice_config::SubDeviceConfig, Direction};

/// A PDO entry address in a SubDevice's object dictionary.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PdoEntryIndex {
    /// Object index.
    pub index: u16,
    /// Object subindex.
    pub subindex: u8,
}

/// Where a PDO entry sits inside its FMMU mapping.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PdoEntryMapping {
    /// The mapped entry.
    pub entry: PdoEntryIndex,
    /// Bit offset of the entry from the start of the FMMU mapping.
    pub bit_offset: u16,
    /// Entry size in bits.
    pub bit_len: u16,
}

/// One FMMU mapping contributed to a domain by a SubDevice config.
///
/// `logical_start_address` and the owning datagram pair are assigned when the
/// domain is finished; until then only the domain-relative offset is known.
#[derive(Debug, Clone)]
pub struct FmmuConfig {
    config_id: usize,
    direction: Direction,
    physical_start_address: u16,
    data_size: usize,
    domain_offset: usize,
    logical_start_address: u32,
    pair_index: Option<usize>,
    entries: Vec<PdoEntryMapping>,
}

impl FmmuConfig {
    /// Create an FMMU mapping of `data_size` bytes starting at the given
    /// SubDevice-local physical address.
    pub fn new(
        config: &SubDeviceConfig,
        direction: Direction,
        physical_start_address: u16,
        data_size: usize,
    ) -> Self {
        Self {
            config_id: config.id(),
            direction,
            physical_start_address,
            data_size,
            domain_offset: 0,
            logical_start_address: 0,
            pair_index: None,
            entries: Vec::new(),
        }
    }

    /// As [`new`](FmmuConfig::new), recording the PDO entries packed into the
    /// mapping so they can be looked up through
    /// [`Domain::register_pdo_entry_list`](crate::Domain::register_pdo_entry_list).
    pub fn with_entries(
        config: &SubDeviceConfig,
        direction: Direction,
        physical_start_address: u16,
        data_size: usize,
        entries: Vec<PdoEntryMapping>,
    ) -> Self {
        Self {
            entries,
            ..Self::new(config, direction, physical_start_address, data_size)
        }
    }

    /// The contributing SubDevice config.
    pub fn config_id(&self) -> usize {
        self.config_id
    }

    /// Mapping direction: `Input` maps SubDevice → MainDevice, `Output` the
    /// other way.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// SubDevice-local physical start address.
    pub fn physical_start_address(&self) -> u16 {
        self.physical_start_address
    }

    /// Mapping size in bytes.
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// Offset of this mapping from the start of the domain image.
    pub fn domain_offset(&self) -> usize {
        self.domain_offset
    }

    /// Global logical start address. Valid once the owning domain is
    /// finished.
    pub fn logical_start_address(&self) -> u32 {
        self.logical_start_address
    }

    /// Index of the datagram pair covering this mapping. Assigned when the
    /// owning domain is finished.
    pub fn pair_index(&self) -> Option<usize> {
        self.pair_index
    }

    /// The PDO entries packed into this mapping.
    pub fn entries(&self) -> &[PdoEntryMapping] {
        &self.entries
    }

    pub(crate) fn set_domain_offset(&mut self, offset: usize) {
        self.domain_offset = offset;
    }

    pub(crate) fn set_logical_start_address(&mut self, address: u32) {
        self.logical_start_address = address;
    }

    pub(crate) fn set_pair_index(&mut self, index: usize) {
        self.pair_index = Some(index);
    }
}
