//! The process data domain engine.
//!
//! A domain packs FMMU mappings from many SubDevice configs into one
//! contiguous logical address range, splits that range over one or more
//! redundant datagram pairs, exchanges the pairs every cycle and folds the
//! observed working counters into a health signal.
//!
//! Cyclic calling convention: run [`process`](Domain::process) at the start
//! of a cycle to import the previous cycle's inputs, then write outputs into
//! [`data_mut`](Domain::data_mut), then run [`queue`](Domain::queue) to hand
//! the next exchange to the driver.

mod pair;

use crate::{
    command::Command,
    error::{DomainError, Error, Item},
    fmmu::{FmmuConfig, PdoEntryIndex},
    maindevice::DatagramQueues,
    subdevice_config::SubDeviceConfig,
    Direction, MAX_PDU_DATA,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use pair::DatagramPair;

/// Domain working counter interpretation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum WcState {
    /// No SubDevice processed any datagram of the domain.
    Zero,
    /// Some, but not all, expected exchanges happened.
    Incomplete,
    /// Every expected exchange happened.
    Complete,
}

impl core::fmt::Display for WcState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            WcState::Zero => f.write_str("zero"),
            WcState::Incomplete => f.write_str("incomplete"),
            WcState::Complete => f.write_str("complete"),
        }
    }
}

/// Domain health snapshot, see [`Domain::state`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DomainState {
    /// Working counter observed in the last cycle.
    pub working_counter: u16,

    /// Interpretation of the working counter against the configured
    /// expectation.
    pub wc_state: WcState,
}

/// One row of a bulk PDO entry registration, see
/// [`Domain::register_pdo_entry_list`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PdoEntryRegistration {
    /// Station alias of the SubDevice config, `0` if unused.
    pub alias: u16,
    /// Ring position relative to the alias.
    pub position: u16,
    /// Expected vendor ID.
    pub vendor_id: u32,
    /// Expected product code.
    pub product_id: u32,
    /// The PDO entry to locate.
    pub entry: PdoEntryIndex,
}

/// Where a registered PDO entry lives in the domain image.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PdoEntryOffset {
    /// Byte offset from the start of the domain image.
    pub byte: usize,
    /// Bit offset within that byte.
    pub bit: u8,
}

enum DomainMemory<'buf> {
    Owned(Vec<u8>),
    External(&'buf mut [u8]),
}

impl DomainMemory<'_> {
    fn as_slice(&self) -> &[u8] {
        match self {
            Self::Owned(buf) => buf,
            Self::External(buf) => buf,
        }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Self::Owned(buf) => buf,
            Self::External(buf) => buf,
        }
    }
}

/// Rate limiter for working counter change reports: at most one log line per
/// second, coalescing every change seen in between.
struct WcLog {
    pending: u32,
    last_report: Option<Instant>,
}

enum WcReport {
    /// A single transition since the last report.
    Changed,
    /// This many transitions since the last report.
    Summary(u32),
}

impl WcLog {
    const INTERVAL: Duration = Duration::from_secs(1);

    fn new() -> Self {
        Self {
            pending: 0,
            last_report: None,
        }
    }

    fn note_change(&mut self) {
        self.pending = self.pending.saturating_add(1);
    }

    fn poll(&mut self, now: Instant) -> Option<WcReport> {
        if self.pending == 0 {
            return None;
        }

        if self
            .last_report
            .is_some_and(|last| now.saturating_duration_since(last) < Self::INTERVAL)
        {
            return None;
        }

        let report = match self.pending {
            1 => WcReport::Changed,
            changes => WcReport::Summary(changes),
        };

        self.pending = 0;
        self.last_report = Some(now);

        Some(report)
    }
}

/// A numbered process data domain.
///
/// FMMU configs are added in mapping order, then [`finish`](Domain::finish)
/// freezes the layout: it assigns logical addresses and builds the datagram
/// pair list covering the image. From then on the domain is purely cyclic.
pub struct Domain<'buf> {
    index: usize,
    logical_base_address: u32,
    fmmu_configs: Vec<FmmuConfig>,
    memory: DomainMemory<'buf>,
    data_size: usize,
    pairs: Vec<DatagramPair>,
    expected_working_counter: u16,
    working_counter: u16,
    working_counter_changes: u32,
    wc_log: WcLog,
    finished: bool,
}

impl<'buf> Domain<'buf> {
    /// Create an empty domain.
    ///
    /// Prefer [`MainDevice::create_domain`](crate::MainDevice::create_domain),
    /// which assigns the index.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            logical_base_address: 0,
            fmmu_configs: Vec::new(),
            memory: DomainMemory::Owned(Vec::new()),
            data_size: 0,
            pairs: Vec::new(),
            expected_working_counter: 0,
            working_counter: 0,
            working_counter_changes: 0,
            wc_log: WcLog::new(),
            finished: false,
        }
    }

    /// Domain number.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Size of the domain image in bytes: the sum of all added FMMU mappings.
    pub fn size(&self) -> usize {
        self.data_size
    }

    /// Logical address of the first byte of the image. Valid once finished.
    pub fn logical_base_address(&self) -> u32 {
        self.logical_base_address
    }

    /// Append an FMMU mapping and grow the image by its size.
    ///
    /// Only permitted before [`finish`](Domain::finish).
    pub fn add_fmmu_config(&mut self, mut fmmu: FmmuConfig) -> Result<(), Error> {
        if self.finished {
            return Err(Error::Domain(DomainError::Finished));
        }

        if fmmu.data_size() > MAX_PDU_DATA {
            return Err(Error::Domain(DomainError::FmmuTooLarge {
                size: fmmu.data_size(),
                max: MAX_PDU_DATA,
            }));
        }

        fmmu.set_domain_offset(self.data_size);

        self.data_size += fmmu.data_size();

        self.fmmu_configs.push(fmmu);

        Ok(())
    }

    /// Substitute the internally allocated image with application-owned
    /// memory.
    ///
    /// Must be called before [`finish`](Domain::finish); the buffer must be
    /// at least [`size`](Domain::size) bytes by then.
    pub fn external_memory(&mut self, buf: &'buf mut [u8]) -> Result<(), Error> {
        if self.finished {
            return Err(Error::Domain(DomainError::Finished));
        }

        self.memory = DomainMemory::External(buf);

        Ok(())
    }

    /// One-shot: assign the base logical address, allocate the image (unless
    /// external memory was supplied) and build the datagram pair layout.
    ///
    /// Walks FMMU mappings in insertion order, packing as many as fit into
    /// each datagram pair. A mapping that would push the current pair past
    /// the maximum datagram payload seals the pair and starts the next one.
    pub fn finish(&mut self, base_address: u32) -> Result<(), Error> {
        if self.finished {
            return Err(Error::Domain(DomainError::Finished));
        }

        match &mut self.memory {
            DomainMemory::Owned(buf) => buf.resize(self.data_size, 0),
            DomainMemory::External(buf) => {
                if buf.len() < self.data_size {
                    return Err(Error::Domain(DomainError::ExternalMemoryTooSmall {
                        needed: self.data_size,
                        got: buf.len(),
                    }));
                }
            }
        }

        self.logical_base_address = base_address;

        let mut datagram_offset = 0;
        let mut datagram_size = 0;
        let mut used_input: Vec<usize> = Vec::new();
        let mut used_output: Vec<usize> = Vec::new();

        for i in 0..self.fmmu_configs.len() {
            let (config_id, direction, size, domain_offset) = {
                let fmmu = &self.fmmu_configs[i];

                (
                    fmmu.config_id(),
                    fmmu.direction(),
                    fmmu.data_size(),
                    fmmu.domain_offset(),
                )
            };

            if datagram_size > 0 && datagram_size + size > MAX_PDU_DATA {
                self.seal_pair(
                    base_address,
                    datagram_offset,
                    datagram_size,
                    &used_input,
                    &used_output,
                )?;

                used_input.clear();
                used_output.clear();

                datagram_offset = domain_offset;
                datagram_size = 0;
            }

            {
                let pair_index = self.pairs.len();
                let fmmu = &mut self.fmmu_configs[i];

                fmmu.set_logical_start_address(base_address + domain_offset as u32);
                fmmu.set_pair_index(pair_index);
            }

            // Count each (config, direction) once per datagram: a SubDevice
            // contributing several mappings to the same datagram still bumps
            // the working counter only once per direction
            let used = match direction {
                Direction::Input => &mut used_input,
                Direction::Output => &mut used_output,
            };

            if !used.contains(&config_id) {
                used.push(config_id);
            }

            datagram_size += size;
        }

        if datagram_size > 0 {
            self.seal_pair(
                base_address,
                datagram_offset,
                datagram_size,
                &used_input,
                &used_output,
            )?;
        }

        self.expected_working_counter = self
            .pairs
            .iter()
            .map(DatagramPair::expected_working_counter)
            .sum();

        self.finished = true;

        log::debug!(
            "Domain {}: {} bytes at {:#010x}, {} datagram pair(s), expected working counter {}",
            self.index,
            self.data_size,
            self.logical_base_address,
            self.pairs.len(),
            self.expected_working_counter
        );

        Ok(())
    }

    fn seal_pair(
        &mut self,
        base_address: u32,
        offset: usize,
        size: usize,
        used_input: &[usize],
        used_output: &[usize],
    ) -> Result<(), Error> {
        let logical = base_address + offset as u32;

        let (command, expected) = match (used_output.len(), used_input.len()) {
            (0, 0) => return Err(Error::Internal),
            (outputs, 0) => (Command::lwr(logical), outputs as u16),
            (0, inputs) => (Command::lrd(logical), inputs as u16),
            (outputs, inputs) => (
                Command::lrw(logical),
                (outputs as u16) * 2 + inputs as u16,
            ),
        };

        let pair = DatagramPair::new(command, logical, offset..offset + size, expected)?;

        log::debug!(
            "Domain {}: pair {} covering bytes {}..{}, expected working counter {}",
            self.index,
            pair.command(),
            offset,
            offset + size,
            expected
        );

        self.pairs.push(pair);

        Ok(())
    }

    /// Current view of the process data image.
    pub fn data(&self) -> &[u8] {
        let raw = self.memory.as_slice();
        let len = self.data_size.min(raw.len());

        &raw[..len]
    }

    /// Mutable view of the process data image, for writing outputs.
    pub fn data_mut(&mut self) -> &mut [u8] {
        let raw = self.memory.as_mut_slice();
        let len = self.data_size.min(raw.len());

        &mut raw[..len]
    }

    /// The frozen datagram pair layout.
    pub fn datagram_pairs(&self) -> &[DatagramPair] {
        &self.pairs
    }

    /// The FMMU mappings in insertion order.
    pub fn fmmu_configs(&self) -> &[FmmuConfig] {
        &self.fmmu_configs
    }

    /// Expected working counter over all pairs.
    pub fn expected_working_counter(&self) -> u16 {
        self.expected_working_counter
    }

    /// Cumulative number of observed working counter transitions.
    pub fn working_counter_changes(&self) -> u32 {
        self.working_counter_changes
    }

    /// Export outputs: snapshot the image into every pair and queue both of
    /// each pair's datagrams on their links. Call once per cycle.
    pub fn queue(&mut self, queues: &DatagramQueues) {
        let data = self.memory.as_slice();

        for pair in &mut self.pairs {
            let range = pair.range();

            let Some(app) = data.get(range) else {
                continue;
            };

            pair.queue(app, queues);
        }
    }

    /// Import inputs and fold working counters. Call once per cycle.
    ///
    /// For every input mapping the redundancy rule decides which link's bytes
    /// become visible: main wins if its bytes moved since transmission;
    /// otherwise backup wins if its bytes moved or the pair's working counter
    /// is complete; otherwise the image keeps its previous value.
    pub fn process(&mut self) {
        self.process_at(Instant::now());
    }

    /// [`process`](Domain::process) with an explicit timestamp for the change
    /// report rate limiter. Useful for deterministic tests.
    pub fn process_at(&mut self, now: Instant) {
        let mut working_counter = 0u16;

        for pair in &self.pairs {
            working_counter = working_counter.wrapping_add(pair.working_counter());
        }

        let data = self.memory.as_mut_slice();

        for fmmu in &self.fmmu_configs {
            if fmmu.direction() != Direction::Input {
                continue;
            }

            let Some(pair) = fmmu.pair_index().and_then(|i| self.pairs.get(i)) else {
                continue;
            };

            let rel = (fmmu.logical_start_address() - pair.logical_start_address()) as usize;
            let len = fmmu.data_size();

            let pair_complete = pair.working_counter() == pair.expected_working_counter();

            let main = pair.main_payload();
            let backup = pair.backup_payload();

            let (Some(main_bytes), Some(backup_bytes), Some(prev)) = (
                main.get(rel..rel + len),
                backup.get(rel..rel + len),
                pair.send_buffer().get(rel..rel + len),
            ) else {
                continue;
            };

            let Some(visible) = data.get_mut(fmmu.domain_offset()..fmmu.domain_offset() + len)
            else {
                continue;
            };

            if main_bytes != prev {
                // The main link carried fresh input
                visible.copy_from_slice(main_bytes);
            } else if backup_bytes != prev || pair_complete {
                visible.copy_from_slice(backup_bytes);
            }
        }

        if working_counter != self.working_counter {
            self.working_counter = working_counter;
            self.working_counter_changes = self.working_counter_changes.saturating_add(1);
            self.wc_log.note_change();
        }

        match self.wc_log.poll(now) {
            Some(WcReport::Changed) => log::info!(
                "Domain {}: working counter changed to {}/{}",
                self.index,
                self.working_counter,
                self.expected_working_counter
            ),
            Some(WcReport::Summary(changes)) => log::info!(
                "Domain {}: {} working counter changes - now {}/{}",
                self.index,
                changes,
                self.working_counter,
                self.expected_working_counter
            ),
            None => {}
        }
    }

    /// Domain health snapshot.
    pub fn state(&self) -> DomainState {
        let wc_state = if self.working_counter == self.expected_working_counter {
            WcState::Complete
        } else if self.working_counter == 0 {
            WcState::Zero
        } else {
            WcState::Incomplete
        };

        DomainState {
            working_counter: self.working_counter,
            wc_state,
        }
    }

    /// Bulk-resolve PDO entries to offsets in the domain image.
    ///
    /// Mirrors the legacy array contract: a row with `entry.index == 0`
    /// terminates the list early. Returns one offset per resolved row, in
    /// order.
    pub fn register_pdo_entry_list(
        &self,
        configs: &[Arc<SubDeviceConfig>],
        entries: &[PdoEntryRegistration],
    ) -> Result<Vec<PdoEntryOffset>, Error> {
        let mut offsets = Vec::with_capacity(entries.len());

        for registration in entries {
            if registration.entry.index == 0 {
                break;
            }

            let config = configs
                .iter()
                .find(|config| {
                    config.alias() == registration.alias
                        && config.position() == registration.position
                        && config.vendor_id() == registration.vendor_id
                        && config.product_id() == registration.product_id
                })
                .ok_or(Error::NotFound {
                    item: Item::SubDeviceConfig,
                    index: None,
                })?;

            let offset = self
                .find_entry_offset(config.id(), registration.entry)
                .ok_or(Error::NotFound {
                    item: Item::PdoEntry,
                    index: None,
                })?;

            offsets.push(offset);
        }

        Ok(offsets)
    }

    fn find_entry_offset(&self, config_id: usize, entry: PdoEntryIndex) -> Option<PdoEntryOffset> {
        for fmmu in &self.fmmu_configs {
            if fmmu.config_id() != config_id {
                continue;
            }

            for mapping in fmmu.entries() {
                if mapping.entry == entry {
                    let bit = fmmu.domain_offset() * 8 + usize::from(mapping.bit_offset);

                    return Some(PdoEntryOffset {
                        byte: bit / 8,
                        bit: (bit % 8) as u8,
                    });
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wc_state_derivation() {
        let mut domain = Domain::new(0);

        domain.expected_working_counter = 6;

        domain.working_counter = 0;
        assert_eq!(domain.state().wc_state, WcState::Zero);

        domain.working_counter = 3;
        assert_eq!(domain.state().wc_state, WcState::Incomplete);

        domain.working_counter = 6;
        assert_eq!(domain.state().wc_state, WcState::Complete);
    }

    #[test]
    fn empty_domain_is_trivially_complete() {
        let mut domain = Domain::new(0);

        domain.finish(0x1000_0000).unwrap();

        assert_eq!(domain.size(), 0);
        assert!(domain.datagram_pairs().is_empty());
        assert_eq!(domain.state().wc_state, WcState::Complete);
    }

    #[test]
    fn finish_is_one_shot() {
        let mut domain = Domain::new(0);

        domain.finish(0).unwrap();

        assert_eq!(
            domain.finish(0),
            Err(Error::Domain(DomainError::Finished))
        );
    }

    #[test]
    fn wc_log_coalesces_to_one_line_per_second() {
        let mut wc_log = WcLog::new();
        let start = Instant::now();

        let mut reports = 0;

        // Ten fluctuations spread over one second
        for i in 0..10 {
            wc_log.note_change();

            if wc_log.poll(start + Duration::from_millis(i * 100)).is_some() {
                reports += 1;
            }
        }

        assert_eq!(reports, 1, "only the first change reports within the second");

        // The stable second after the burst flushes the coalesced summary
        let flushed = wc_log.poll(start + Duration::from_millis(1100));

        assert!(matches!(flushed, Some(WcReport::Summary(9))));

        // Nothing pending any more
        assert!(wc_log.poll(start + Duration::from_millis(2200)).is_none());
    }

    #[test]
    fn single_change_reports_as_transition() {
        let mut wc_log = WcLog::new();
        let start = Instant::now();

        wc_log.note_change();

        assert!(matches!(wc_log.poll(start), Some(WcReport::Changed)));
    }
}
