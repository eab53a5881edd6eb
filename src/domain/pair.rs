//! A datagram pair: the same logical exchange duplicated over the main and
//! backup links for cable redundancy.

use crate::{
    command::Command,
    datagram::{Datagram, DatagramHandle, DatagramState, PayloadGuard},
    error::Error,
    maindevice::DatagramQueues,
    DeviceIndex, NUM_DEVICES,
};
use core::ops::Range;

/// Two datagrams covering the same byte range of a domain image, one per
/// link, plus a snapshot of the bytes that went out with them.
pub struct DatagramPair {
    command: Command,
    datagrams: [DatagramHandle; NUM_DEVICES],
    send_buffer: Vec<u8>,
    logical_start_address: u32,
    range: Range<usize>,
    expected_working_counter: u16,
}

impl DatagramPair {
    pub(crate) fn new(
        command: Command,
        logical_start_address: u32,
        range: Range<usize>,
        expected_working_counter: u16,
    ) -> Result<Self, Error> {
        let datagrams: [DatagramHandle; NUM_DEVICES] =
            core::array::from_fn(|_| Datagram::new_shared());

        for datagram in &datagrams {
            datagram.prepare(command, range.len())?;
        }

        Ok(Self {
            command,
            datagrams,
            send_buffer: vec![0; range.len()],
            logical_start_address,
            range,
            expected_working_counter,
        })
    }

    /// The logical command both datagrams perform.
    pub fn command(&self) -> Command {
        self.command
    }

    /// Logical address of the first covered byte.
    pub fn logical_start_address(&self) -> u32 {
        self.logical_start_address
    }

    /// Byte range of the domain image covered by this pair.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// This pair's contribution to the domain's expected working counter.
    pub fn expected_working_counter(&self) -> u16 {
        self.expected_working_counter
    }

    /// The datagram transmitted on the given link.
    pub fn datagram(&self, device: DeviceIndex) -> &DatagramHandle {
        &self.datagrams[device.index()]
    }

    /// Observed working counter of the last cycle: the sum over both links,
    /// counting a lost datagram as zero.
    pub fn working_counter(&self) -> u16 {
        self.datagrams
            .iter()
            .filter(|datagram| datagram.state() == DatagramState::Received)
            .map(|datagram| datagram.working_counter())
            .fold(0, u16::wrapping_add)
    }

    /// Snapshot the application-visible bytes, load both datagrams with them
    /// and hand the datagrams to their link queues.
    pub(crate) fn queue(&mut self, data: &[u8], queues: &DatagramQueues) {
        self.send_buffer.copy_from_slice(data);

        for (datagram, device) in self
            .datagrams
            .iter()
            .zip([DeviceIndex::Main, DeviceIndex::Backup])
        {
            if let Err(e) = datagram.prepare_with(self.command, data) {
                log::error!("Failed to load datagram pair at {:#010x}: {}", self.logical_start_address, e);

                continue;
            }

            queues.queue(datagram.clone(), device);
        }
    }

    pub(crate) fn send_buffer(&self) -> &[u8] {
        &self.send_buffer
    }

    pub(crate) fn main_payload(&self) -> PayloadGuard<'_> {
        self.datagrams[DeviceIndex::Main.index()].payload()
    }

    pub(crate) fn backup_payload(&self) -> PayloadGuard<'_> {
        self.datagrams[DeviceIndex::Backup.index()].payload()
    }
}

impl core::fmt::Debug for DatagramPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DatagramPair")
            .field("command", &self.command)
            .field(
                "logical_start_address",
                &format_args!("{:#010x}", self.logical_start_address),
            )
            .field("range", &self.range)
            .field("expected_working_counter", &self.expected_working_counter)
            .finish()
    }
}
