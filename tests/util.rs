//! Helpers shared by the integration tests: a scripted mailbox transfer
//! engine and a minimal in-process frame driver.

#![allow(dead_code)]

use ethertide::{
    Command, Datagram, DatagramQueues, DeviceIndex, FoeRequest, MailboxTransfer, SdoRequest,
    SoeRequest, SubDevice,
};
use std::sync::Arc;

/// A mailbox transfer engine driven by a script instead of a real protocol:
/// it emits a fixed number of datagrams, then reports the configured outcome.
pub struct ScriptedTransfer<R> {
    /// How many exchange steps (datagrams) each bound request takes.
    steps: usize,
    remaining: usize,
    succeed: bool,
    station: u16,
    bound: Option<R>,
}

impl<R> ScriptedTransfer<R> {
    pub fn new(steps: usize, succeed: bool) -> Self {
        Self {
            steps,
            remaining: 0,
            succeed,
            station: 0,
            bound: None,
        }
    }

}

/// A scripted CoE engine.
pub fn scripted_coe(
    steps: usize,
    succeed: bool,
) -> Box<dyn MailboxTransfer<Request = Arc<SdoRequest>>> {
    Box::new(ScriptedTransfer::<Arc<SdoRequest>>::new(steps, succeed))
}

/// A scripted FoE engine.
pub fn scripted_foe(
    steps: usize,
    succeed: bool,
) -> Box<dyn MailboxTransfer<Request = Arc<FoeRequest>>> {
    Box::new(ScriptedTransfer::<Arc<FoeRequest>>::new(steps, succeed))
}

/// A scripted SoE engine.
pub fn scripted_soe(
    steps: usize,
    succeed: bool,
) -> Box<dyn MailboxTransfer<Request = Arc<SoeRequest>>> {
    Box::new(ScriptedTransfer::<Arc<SoeRequest>>::new(steps, succeed))
}

impl<R: Send> MailboxTransfer for ScriptedTransfer<R> {
    type Request = R;

    fn transfer(&mut self, subdevice: &SubDevice, request: R) {
        self.station = subdevice.configured_address();
        self.remaining = self.steps;
        self.bound = Some(request);
    }

    fn exec(&mut self, datagram: &Datagram) -> bool {
        if self.remaining == 0 {
            return false;
        }

        self.remaining -= 1;

        // A stand-in mailbox fragment: write to the SubDevice's mailbox sync
        // manager area
        datagram
            .prepare_with(Command::fpwr(self.station, 0x1800), &[0u8; 8])
            .expect("prepare scripted mailbox datagram");

        true
    }

    fn success(&self) -> bool {
        self.succeed
    }
}

/// Complete the round trip for everything queued on both links: mark each
/// datagram sent, then echo its payload back with the given working counter.
///
/// Returns how many datagrams were exchanged.
pub fn exchange(queues: &DatagramQueues, working_counter: u16) -> usize {
    let mut count = 0;

    for device in [DeviceIndex::Main, DeviceIndex::Backup] {
        for datagram in queues.take_sendable(device) {
            datagram.mark_sent();

            let payload = datagram.payload().to_vec();

            datagram.receive(&payload, working_counter);

            count += 1;
        }
    }

    count
}

/// Drop everything queued on both links without completing it, leaving the
/// datagrams in the `Sent` state.
pub fn lose_all(queues: &DatagramQueues) -> usize {
    let mut count = 0;

    for device in [DeviceIndex::Main, DeviceIndex::Backup] {
        for datagram in queues.take_sendable(device) {
            datagram.mark_sent();

            count += 1;
        }
    }

    count
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
