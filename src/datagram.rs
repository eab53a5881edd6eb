//! A single EtherCAT datagram: one network request/reply shared between the
//! cyclic context and the frame driver.

use crate::{
    command::Command,
    error::{Error, PduError, PduValidationError},
    DeviceIndex, LEN_MASK, MAX_PDU_DATA,
};
use core::ops::Deref;
use core::sync::atomic::{AtomicU16, AtomicU8, Ordering};
use ethertide_wire::{WireError, WireRead, WireWrite};
use std::sync::Arc;

/// Datagram header length on the wire in bytes.
pub const DATAGRAM_HEADER_LEN: usize = 10;

/// Working counter footer length on the wire in bytes.
pub const DATAGRAM_FOOTER_LEN: usize = 2;

/// Datagram lifecycle state.
///
/// The cyclic core drives `Init → Queued`; the frame driver drives
/// `Queued → Sent → Received` (or `TimedOut`). The core only ever observes
/// the terminal transitions.
#[atomic_enum::atomic_enum]
#[derive(PartialEq, Default)]
pub enum DatagramState {
    /// Freshly prepared, not yet handed to the driver.
    #[default]
    Init = 0,
    /// Waiting in a device queue for transmission.
    Queued = 1,
    /// On the wire, awaiting the reply.
    Sent = 2,
    /// The reply arrived; payload and working counter are valid.
    Received = 3,
    /// The driver gave up waiting for the reply.
    TimedOut = 4,
}

impl core::fmt::Display for DatagramState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DatagramState::Init => f.write_str("INIT"),
            DatagramState::Queued => f.write_str("QUEUED"),
            DatagramState::Sent => f.write_str("SENT"),
            DatagramState::Received => f.write_str("RECEIVED"),
            DatagramState::TimedOut => f.write_str("TIMED OUT"),
        }
    }
}

/// Fields placed after the command address, e.g. `LEN`, `C` and `NEXT` in
/// ETG1000.4 5.4.1.2 Table 14.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
pub struct DatagramFlags {
    /// Data length of this datagram.
    pub length: u16,
    /// Circulating frame.
    ///
    /// 0: frame is not circulating. 1: frame has circulated once.
    pub circulated: bool,
    /// 0: last EtherCAT datagram in the frame. 1: more datagrams follow.
    pub more_follows: bool,
}

impl DatagramFlags {
    /// Flags for a single datagram of `len` payload bytes.
    pub const fn with_len(len: u16) -> Self {
        Self {
            length: len,
            circulated: false,
            more_follows: false,
        }
    }
}

impl WireWrite for DatagramFlags {
    fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8] {
        let raw = self.length & LEN_MASK
            | (self.circulated as u16) << 14
            | (self.more_follows as u16) << 15;

        raw.pack_to_slice_unchecked(buf)
    }

    fn packed_len(&self) -> usize {
        2
    }
}

impl WireRead for DatagramFlags {
    fn unpack_from_slice(buf: &[u8]) -> Result<Self, WireError> {
        let raw = u16::unpack_from_slice(buf)?;

        Ok(Self {
            length: raw & LEN_MASK,
            circulated: (raw >> 14) & 0x01 == 0x01,
            more_follows: (raw >> 15) & 0x01 == 0x01,
        })
    }
}

/// A single datagram header: command, index, address, flags and IRQ.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DatagramHeader {
    /// Raw command service code.
    pub command_code: u8,

    /// Frame index assigned by the driver.
    pub index: u8,

    /// Raw command address.
    ///
    /// This represents 2x `u16` or 1x `u32` depending on the command.
    pub command_raw: [u8; 4],

    /// Datagram flags.
    pub flags: DatagramFlags,

    /// IRQ.
    pub irq: u16,
}

impl WireWrite for DatagramHeader {
    fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8] {
        self.command_code.pack_to_slice_unchecked(&mut buf[0..1]);
        self.index.pack_to_slice_unchecked(&mut buf[1..2]);
        self.command_raw.pack_to_slice_unchecked(&mut buf[2..6]);
        self.flags.pack_to_slice_unchecked(&mut buf[6..8]);
        self.irq.pack_to_slice_unchecked(&mut buf[8..10]);

        &buf[0..DATAGRAM_HEADER_LEN]
    }

    fn packed_len(&self) -> usize {
        DATAGRAM_HEADER_LEN
    }
}

impl WireRead for DatagramHeader {
    fn unpack_from_slice(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < DATAGRAM_HEADER_LEN {
            return Err(WireError::ReadBufferTooShort {
                needed: DATAGRAM_HEADER_LEN,
                got: buf.len(),
            });
        }

        Ok(Self {
            command_code: u8::unpack_from_slice(&buf[0..1])?,
            index: u8::unpack_from_slice(&buf[1..2])?,
            command_raw: <[u8; 4]>::unpack_from_slice(&buf[2..6])?,
            flags: DatagramFlags::unpack_from_slice(&buf[6..8])?,
            irq: u16::unpack_from_slice(&buf[8..10])?,
        })
    }
}

/// A shared handle to a [`Datagram`].
pub type DatagramHandle = Arc<Datagram>;

struct DatagramInner {
    command: Command,
    device: DeviceIndex,
    payload: heapless::Vec<u8, MAX_PDU_DATA>,
}

/// One EtherCAT network request/reply.
///
/// A `Datagram` is owned by exactly one producer at a time (a per-SubDevice
/// request FSM, or a domain datagram pair) but is shared with the frame
/// driver through a [`DatagramHandle`], so its lifecycle state and working
/// counter are atomics and the command/payload sit behind a short-held spin
/// lock.
pub struct Datagram {
    state: AtomicDatagramState,
    working_counter: AtomicU16,
    index: AtomicU8,
    inner: spin::Mutex<DatagramInner>,
}

impl Default for Datagram {
    fn default() -> Self {
        Self::new()
    }
}

impl Datagram {
    /// Create an empty `NOP` datagram in the `Init` state.
    pub fn new() -> Self {
        Self {
            state: AtomicDatagramState::new(DatagramState::Init),
            working_counter: AtomicU16::new(0),
            index: AtomicU8::new(0),
            inner: spin::Mutex::new(DatagramInner {
                command: Command::Nop,
                device: DeviceIndex::Main,
                payload: heapless::Vec::new(),
            }),
        }
    }

    /// Create a shared handle to a fresh datagram.
    pub fn new_shared() -> DatagramHandle {
        Arc::new(Self::new())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DatagramState {
        self.state.load(Ordering::Acquire)
    }

    /// Working counter of the last received reply.
    pub fn working_counter(&self) -> u16 {
        self.working_counter.load(Ordering::Acquire)
    }

    /// The command this datagram performs.
    pub fn command(&self) -> Command {
        self.inner.lock().command
    }

    /// The link this datagram is (to be) transmitted on.
    pub fn device(&self) -> DeviceIndex {
        self.inner.lock().device
    }

    pub(crate) fn set_device(&self, device: DeviceIndex) {
        self.inner.lock().device = device;
    }

    pub(crate) fn mark_queued(&self) {
        self.state.store(DatagramState::Queued, Ordering::Release);
    }

    /// Driver-side: the datagram left on the wire.
    pub fn mark_sent(&self) {
        self.state.store(DatagramState::Sent, Ordering::Release);
    }

    /// Driver-side: no reply arrived in time.
    pub fn mark_timed_out(&self) {
        self.state.store(DatagramState::TimedOut, Ordering::Release);
    }

    /// Driver-side: store the reply payload and working counter, then publish
    /// the `Received` state.
    pub fn receive(&self, payload: &[u8], working_counter: u16) {
        {
            let mut inner = self.inner.lock();

            let len = payload.len().min(MAX_PDU_DATA);

            inner.payload.clear();
            let _ = inner.payload.extend_from_slice(&payload[..len]);
        }

        self.working_counter
            .store(working_counter, Ordering::Release);
        self.state.store(DatagramState::Received, Ordering::Release);
    }

    /// Re-arm this datagram with a new command and a zero-filled payload of
    /// `len` bytes.
    ///
    /// Resets the state to `Init` and clears the working counter.
    pub fn prepare(&self, command: Command, len: usize) -> Result<(), Error> {
        if len > MAX_PDU_DATA {
            return Err(Error::Pdu(PduError::TooLong {
                len,
                max: MAX_PDU_DATA,
            }));
        }

        {
            let mut inner = self.inner.lock();

            inner.command = command;
            inner.payload.clear();
            inner
                .payload
                .resize(len, 0)
                .map_err(|_| Error::Internal)?;
        }

        self.working_counter.store(0, Ordering::Release);
        self.state.store(DatagramState::Init, Ordering::Release);

        Ok(())
    }

    /// Re-arm this datagram with a new command and the given payload.
    pub fn prepare_with(&self, command: Command, data: &[u8]) -> Result<(), Error> {
        if data.len() > MAX_PDU_DATA {
            return Err(Error::Pdu(PduError::TooLong {
                len: data.len(),
                max: MAX_PDU_DATA,
            }));
        }

        {
            let mut inner = self.inner.lock();

            inner.command = command;
            inner.payload.clear();
            inner
                .payload
                .extend_from_slice(data)
                .map_err(|_| Error::Internal)?;
        }

        self.working_counter.store(0, Ordering::Release);
        self.state.store(DatagramState::Init, Ordering::Release);

        Ok(())
    }

    /// Read access to the payload buffer.
    pub fn payload(&self) -> PayloadGuard<'_> {
        PayloadGuard(self.inner.lock())
    }

    /// Pack this datagram (header, payload, zeroed working counter) into a
    /// raw telegram buffer, returning the number of bytes written.
    ///
    /// `frame_index` is the driver-assigned index used to match the reply in
    /// [`read_wire`](Datagram::read_wire).
    pub fn write_wire(&self, frame_index: u8, buf: &mut [u8]) -> Result<usize, Error> {
        let inner = self.inner.lock();

        let total = DATAGRAM_HEADER_LEN + inner.payload.len() + DATAGRAM_FOOTER_LEN;

        if buf.len() < total {
            return Err(Error::Wire(WireError::WriteBufferTooShort {
                needed: total,
                got: buf.len(),
            }));
        }

        self.index.store(frame_index, Ordering::Release);

        let mut command_raw = [0u8; 4];
        inner.command.pack_to_slice_unchecked(&mut command_raw);

        let header = DatagramHeader {
            command_code: inner.command.code(),
            index: frame_index,
            command_raw,
            flags: DatagramFlags::with_len(inner.payload.len() as u16),
            irq: 0,
        };

        header.pack_to_slice_unchecked(&mut buf[0..DATAGRAM_HEADER_LEN]);

        buf[DATAGRAM_HEADER_LEN..DATAGRAM_HEADER_LEN + inner.payload.len()]
            .copy_from_slice(&inner.payload);

        buf[DATAGRAM_HEADER_LEN + inner.payload.len()..total].fill(0);

        Ok(total)
    }

    /// Parse a reply telegram, validate it against the sent datagram and
    /// publish the result via [`receive`](Datagram::receive).
    pub fn read_wire(&self, buf: &[u8]) -> Result<(), Error> {
        let header = DatagramHeader::unpack_from_slice(buf)?;

        let sent_index = self.index.load(Ordering::Acquire);

        if header.index != sent_index {
            return Err(Error::Pdu(PduError::Validation(
                PduValidationError::IndexMismatch {
                    sent: sent_index,
                    received: header.index,
                },
            )));
        }

        let received = Command::parse_code_data(header.command_code, header.command_raw)?;
        let sent = self.command();

        if received != sent {
            return Err(Error::Pdu(PduError::Validation(
                PduValidationError::CommandMismatch { sent, received },
            )));
        }

        let len = usize::from(header.flags.length);
        let end = DATAGRAM_HEADER_LEN + len + DATAGRAM_FOOTER_LEN;

        let (payload, footer) = buf
            .get(DATAGRAM_HEADER_LEN..end)
            .map(|rest| rest.split_at(len))
            .ok_or(WireError::ReadBufferTooShort {
                needed: end,
                got: buf.len(),
            })?;

        let working_counter = u16::unpack_from_slice(footer)?;

        self.receive(payload, working_counter);

        Ok(())
    }
}

/// Read guard over a datagram's payload bytes.
pub struct PayloadGuard<'a>(spin::MutexGuard<'a, DatagramInner>);

impl Deref for PayloadGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_layout() {
        let mut buf = [0u8; 2];

        DatagramFlags {
            length: 0x123,
            circulated: false,
            more_follows: true,
        }
        .pack_to_slice_unchecked(&mut buf);

        assert_eq!(buf, [0x23, 0x81]);

        assert_eq!(
            DatagramFlags::unpack_from_slice(&buf),
            Ok(DatagramFlags {
                length: 0x123,
                circulated: false,
                more_follows: true,
            })
        );
    }

    #[test]
    fn decode_header() {
        let raw = [
            // FPRD
            0x04, //
            // Index
            0x07, //
            // Station address 0x1001
            0x01, 0x10, //
            // Register 0x0130
            0x30, 0x01, //
            // Flags: 2 byte payload
            0x02, 0x00, //
            // IRQ
            0x00, 0x00,
        ];

        let header = DatagramHeader::unpack_from_slice(&raw).unwrap();

        assert_eq!(
            header,
            DatagramHeader {
                command_code: 0x04,
                index: 0x07,
                command_raw: [0x01, 0x10, 0x30, 0x01],
                flags: DatagramFlags::with_len(2),
                irq: 0,
            }
        );
    }

    #[test]
    fn wire_roundtrip() {
        let datagram = Datagram::new();

        datagram
            .prepare_with(Command::fpwr(0x1001, 0x0130), &[0x04, 0x00])
            .unwrap();

        let mut buf = [0u8; 64];

        let written = datagram.write_wire(0x12, &mut buf).unwrap();

        assert_eq!(written, DATAGRAM_HEADER_LEN + 2 + DATAGRAM_FOOTER_LEN);

        // Simulate the SubDevice bumping the working counter in the reply
        let mut reply = buf[0..written].to_vec();
        reply[written - 2] = 0x01;

        datagram.read_wire(&reply).unwrap();

        assert_eq!(datagram.state(), DatagramState::Received);
        assert_eq!(datagram.working_counter(), 1);
    }

    #[test]
    fn reply_index_mismatch_is_rejected() {
        let datagram = Datagram::new();

        datagram.prepare(Command::fprd(0x1001, 0x0130), 2).unwrap();

        let mut buf = [0u8; 64];
        let written = datagram.write_wire(0x01, &mut buf).unwrap();

        // Corrupt the index
        buf[1] = 0x02;

        assert_eq!(
            datagram.read_wire(&buf[0..written]),
            Err(Error::Pdu(PduError::Validation(
                PduValidationError::IndexMismatch {
                    sent: 0x01,
                    received: 0x02
                }
            )))
        );
    }
}
