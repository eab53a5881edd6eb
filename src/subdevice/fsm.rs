//! The per-SubDevice request FSM.
//!
//! Each SubDevice owns one shared datagram and one `RequestFsm` which
//! multiplexes pending SDO, register, FoE and SoE requests onto that
//! datagram. [`tick`](RequestFsm::tick) runs once per master cycle; it emits
//! at most one datagram per invocation, which preserves the cyclic bandwidth
//! budget no matter how many requests are pending.

use super::SubDevice;
use crate::{
    command::Command,
    datagram::{Datagram, DatagramHandle, DatagramState},
    maindevice::DatagramQueues,
    request::{FoeRequest, RegRequest, SdoRequest, SoeRequest},
    subdevice_state::SubDeviceState,
    transfer::TransferEngines,
    Direction,
};
use std::sync::{Arc, Weak};

/// Observable FSM state, mainly useful for diagnostics and tests.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum RequestFsmState {
    /// The SubDevice is not (yet) reachable; requests stay queued.
    Idle,
    /// Waiting for a request to dispatch.
    Ready,
    /// An SDO exchange is in flight.
    SdoRequest,
    /// A register exchange is in flight.
    RegRequest,
    /// An FoE exchange is in flight.
    FoeRequest,
    /// An SoE exchange is in flight.
    SoeRequest,
}

/// An in-flight register request and where it came from.
///
/// Config-owned slots are held weakly: if the config is torn down between
/// dispatch and completion the slot died with its owner and the FSM must not
/// touch it.
enum RegPending {
    External(Arc<RegRequest>),
    Internal(Weak<RegRequest>),
}

impl RegPending {
    fn request(&self) -> Option<Arc<RegRequest>> {
        match self {
            Self::External(request) => Some(request.clone()),
            Self::Internal(weak) => weak.upgrade(),
        }
    }
}

enum FsmState {
    Idle,
    Ready,
    Sdo(Arc<SdoRequest>),
    Reg(RegPending),
    Foe(Arc<FoeRequest>),
    Soe(Arc<SoeRequest>),
}

/// The request state machine of one SubDevice.
pub struct RequestFsm {
    subdevice: Arc<SubDevice>,
    datagram: DatagramHandle,
    state: FsmState,
    engines: TransferEngines,
}

impl RequestFsm {
    /// Create an FSM for the given SubDevice in the `Idle` state.
    pub fn new(subdevice: Arc<SubDevice>, engines: TransferEngines) -> Self {
        Self {
            subdevice,
            datagram: Datagram::new_shared(),
            state: FsmState::Idle,
            engines,
        }
    }

    /// The SubDevice this FSM drives.
    pub fn subdevice(&self) -> &Arc<SubDevice> {
        &self.subdevice
    }

    /// Observable FSM state.
    pub fn state(&self) -> RequestFsmState {
        match self.state {
            FsmState::Idle => RequestFsmState::Idle,
            FsmState::Ready => RequestFsmState::Ready,
            FsmState::Sdo(_) => RequestFsmState::SdoRequest,
            FsmState::Reg(_) => RequestFsmState::RegRequest,
            FsmState::Foe(_) => RequestFsmState::FoeRequest,
            FsmState::Soe(_) => RequestFsmState::SoeRequest,
        }
    }

    /// External edge: the SubDevice is known reachable, start serving
    /// requests.
    ///
    /// Only meaningful in `Idle`; a no-op otherwise.
    pub fn set_ready(&mut self) {
        if matches!(self.state, FsmState::Idle) {
            log::debug!(
                "SubDevice {:#06x}: ready for requests",
                self.subdevice.configured_address()
            );

            self.state = FsmState::Ready;
        }
    }

    /// Advance the FSM by one master cycle.
    ///
    /// Progress is gated on the shared datagram: while it is still `Queued`
    /// or `Sent` the previous cycle's exchange has not completed its round
    /// trip and the FSM suspends until the next cycle.
    pub fn tick(&mut self, queues: &DatagramQueues) {
        if matches!(
            self.datagram.state(),
            DatagramState::Queued | DatagramState::Sent
        ) {
            return;
        }

        let state = core::mem::replace(&mut self.state, FsmState::Idle);

        self.state = match state {
            FsmState::Idle => FsmState::Idle,
            FsmState::Ready => self.tick_ready(queues),
            FsmState::Sdo(request) => self.tick_sdo(request, queues),
            FsmState::Reg(pending) => self.tick_reg(pending),
            FsmState::Foe(request) => self.tick_foe(request, queues),
            FsmState::Soe(request) => self.tick_soe(request, queues),
        };
    }

    /// Fixed rotation: SDO, then register, then FoE, then SoE. The first
    /// class with a processable request wins the cycle; worst-case starvation
    /// is bounded by three class exchanges.
    fn tick_ready(&mut self, queues: &DatagramQueues) -> FsmState {
        if let Some(request) = self.subdevice.dequeue_sdo() {
            return self.dispatch_sdo(request, queues);
        }

        if let Some(pending) = self.next_reg_request() {
            return self.dispatch_reg(pending, queues);
        }

        if let Some(request) = self.subdevice.dequeue_foe() {
            return self.dispatch_foe(request, queues);
        }

        if let Some(request) = self.subdevice.dequeue_soe() {
            return self.dispatch_soe(request, queues);
        }

        FsmState::Ready
    }

    /// Config-owned slots take precedence over external requests. Slots are
    /// flagged busy in place, external requests are dequeued and owned.
    fn next_reg_request(&self) -> Option<RegPending> {
        if let Some(config) = self.subdevice.config() {
            if let Some(slot) = config.first_queued_reg() {
                return Some(RegPending::Internal(Arc::downgrade(&slot)));
            }
        }

        self.subdevice.dequeue_reg().map(RegPending::External)
    }

    fn dispatch_sdo(&mut self, request: Arc<SdoRequest>, queues: &DatagramQueues) -> FsmState {
        let address = self.subdevice.configured_address();
        let al = self.subdevice.al_status();

        if al.error_ack {
            log::warn!(
                "SubDevice {:#06x}: aborting SDO request, error flag is set",
                address
            );

            request.complete(false);

            return FsmState::Idle;
        }

        if al.state == SubDeviceState::Init {
            log::warn!(
                "SubDevice {:#06x}: aborting SDO request, SubDevice is in INIT",
                address
            );

            request.complete(false);

            return FsmState::Idle;
        }

        let Some(engine) = self.engines.coe.as_mut() else {
            log::warn!(
                "SubDevice {:#06x}: aborting SDO request, no CoE support",
                address
            );

            request.complete(false);

            return FsmState::Ready;
        };

        request.mark_busy();

        engine.transfer(&self.subdevice, request.clone());

        if engine.exec(&self.datagram) {
            queues.queue(self.datagram.clone(), self.subdevice.device());

            FsmState::Sdo(request)
        } else {
            request.complete(engine.success());

            FsmState::Ready
        }
    }

    fn tick_sdo(&mut self, request: Arc<SdoRequest>, queues: &DatagramQueues) -> FsmState {
        let Some(engine) = self.engines.coe.as_mut() else {
            request.complete(false);

            return FsmState::Ready;
        };

        if engine.exec(&self.datagram) {
            queues.queue(self.datagram.clone(), self.subdevice.device());

            return FsmState::Sdo(request);
        }

        let success = engine.success();

        if !success {
            log::debug!(
                "SubDevice {:#06x}: SDO request {:#06x}:{} failed{}",
                self.subdevice.configured_address(),
                request.index(),
                request.subindex(),
                request
                    .abort_code()
                    .map(|code| format!(", abort code {:#010x}", code))
                    .unwrap_or_default()
            );
        }

        request.complete(success);

        FsmState::Ready
    }

    fn dispatch_reg(&mut self, pending: RegPending, queues: &DatagramQueues) -> FsmState {
        let Some(request) = pending.request() else {
            return FsmState::Ready;
        };

        let address = self.subdevice.configured_address();
        let al = self.subdevice.al_status();

        if al.error_ack {
            log::warn!(
                "SubDevice {:#06x}: aborting register request, error flag is set",
                address
            );

            request.complete(false);

            return FsmState::Ready;
        }

        request.mark_busy();

        let prepared = match request.direction() {
            Direction::Input => self.datagram.prepare(
                Command::fprd(address, request.address()),
                request.size(),
            ),
            Direction::Output => self.datagram.prepare_with(
                Command::fpwr(address, request.address()),
                &request.data(),
            ),
        };

        if let Err(e) = prepared {
            log::error!(
                "SubDevice {:#06x}: register request rejected: {}",
                address,
                e
            );

            request.complete(false);

            return FsmState::Ready;
        }

        queues.queue(self.datagram.clone(), self.subdevice.device());

        FsmState::Reg(pending)
    }

    fn tick_reg(&mut self, pending: RegPending) -> FsmState {
        let Some(request) = pending.request() else {
            // The owning config was torn down mid-flight and freed the
            // request with it. Nothing left to complete.
            return FsmState::Ready;
        };

        let address = self.subdevice.configured_address();
        let state = self.datagram.state();

        if state != DatagramState::Received {
            log::error!(
                "SubDevice {:#06x}: failed to receive register datagram: {}",
                address,
                state
            );

            request.complete(false);
        } else if self.datagram.working_counter() == 1 {
            if request.direction() == Direction::Input {
                let payload = self.datagram.payload();
                let mut data = request.data();

                let len = data.len().min(payload.len());

                data[..len].copy_from_slice(&payload[..len]);
            }

            request.complete(true);
        } else {
            // Both FPRD and FPWR to a single station bump the counter by
            // exactly one
            log::error!(
                "SubDevice {:#06x}: register request failed, working counter {} (expected 1)",
                address,
                self.datagram.working_counter()
            );

            request.complete(false);
        }

        FsmState::Ready
    }

    fn dispatch_foe(&mut self, request: Arc<FoeRequest>, queues: &DatagramQueues) -> FsmState {
        let address = self.subdevice.configured_address();
        let al = self.subdevice.al_status();

        if al.error_ack {
            log::warn!(
                "SubDevice {:#06x}: aborting FoE request, error flag is set",
                address
            );

            request.complete(false);

            return FsmState::Ready;
        }

        let Some(engine) = self.engines.foe.as_mut() else {
            log::warn!(
                "SubDevice {:#06x}: aborting FoE request, no FoE support",
                address
            );

            request.complete(false);

            return FsmState::Ready;
        };

        request.mark_busy();

        engine.transfer(&self.subdevice, request.clone());

        if engine.exec(&self.datagram) {
            queues.queue(self.datagram.clone(), self.subdevice.device());

            FsmState::Foe(request)
        } else {
            request.complete(engine.success());

            FsmState::Ready
        }
    }

    fn tick_foe(&mut self, request: Arc<FoeRequest>, queues: &DatagramQueues) -> FsmState {
        let Some(engine) = self.engines.foe.as_mut() else {
            request.complete(false);

            return FsmState::Ready;
        };

        if engine.exec(&self.datagram) {
            queues.queue(self.datagram.clone(), self.subdevice.device());

            return FsmState::Foe(request);
        }

        let success = engine.success();

        if !success {
            log::debug!(
                "SubDevice {:#06x}: FoE request '{}' failed",
                self.subdevice.configured_address(),
                request.file_name()
            );
        }

        request.complete(success);

        FsmState::Ready
    }

    fn dispatch_soe(&mut self, request: Arc<SoeRequest>, queues: &DatagramQueues) -> FsmState {
        let address = self.subdevice.configured_address();
        let al = self.subdevice.al_status();

        if al.error_ack {
            log::warn!(
                "SubDevice {:#06x}: aborting SoE request, error flag is set",
                address
            );

            request.complete(false);

            return FsmState::Idle;
        }

        if al.state == SubDeviceState::Init {
            log::warn!(
                "SubDevice {:#06x}: aborting SoE request, SubDevice is in INIT",
                address
            );

            request.complete(false);

            return FsmState::Idle;
        }

        let Some(engine) = self.engines.soe.as_mut() else {
            log::warn!(
                "SubDevice {:#06x}: aborting SoE request, no SoE support",
                address
            );

            request.complete(false);

            return FsmState::Ready;
        };

        request.mark_busy();

        engine.transfer(&self.subdevice, request.clone());

        if engine.exec(&self.datagram) {
            queues.queue(self.datagram.clone(), self.subdevice.device());

            FsmState::Soe(request)
        } else {
            request.complete(engine.success());

            FsmState::Ready
        }
    }

    fn tick_soe(&mut self, request: Arc<SoeRequest>, queues: &DatagramQueues) -> FsmState {
        let Some(engine) = self.engines.soe.as_mut() else {
            request.complete(false);

            return FsmState::Ready;
        };

        if engine.exec(&self.datagram) {
            queues.queue(self.datagram.clone(), self.subdevice.device());

            return FsmState::Soe(request);
        }

        let success = engine.success();

        if !success {
            log::debug!(
                "SubDevice {:#06x}: SoE request IDN {:#06x} failed",
                self.subdevice.configured_address(),
                request.idn()
            );
        }

        request.complete(success);

        FsmState::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestState;
    use crate::subdevice::SubDeviceIdentity;
    use crate::subdevice_config::SubDeviceConfig;
    use crate::subdevice_state::AlStatus;
    use crate::DeviceIndex;

    fn op_subdevice() -> Arc<SubDevice> {
        let subdevice = SubDevice::new(0x1001, DeviceIndex::Main, SubDeviceIdentity::default());

        subdevice.set_al_status(AlStatus::new(SubDeviceState::Op));

        subdevice
    }

    fn ready_fsm(subdevice: &Arc<SubDevice>) -> RequestFsm {
        let mut fsm = RequestFsm::new(subdevice.clone(), TransferEngines::default());

        fsm.set_ready();

        fsm
    }

    #[test]
    fn idle_until_ready_edge() {
        let subdevice = op_subdevice();
        let queues = DatagramQueues::new();

        let mut fsm = RequestFsm::new(subdevice.clone(), TransferEngines::default());

        subdevice
            .enqueue_reg(RegRequest::read(0x0130, 2))
            .unwrap();

        fsm.tick(&queues);

        assert_eq!(fsm.state(), RequestFsmState::Idle);
        assert_eq!(queues.pending(DeviceIndex::Main), 0);

        fsm.set_ready();
        fsm.tick(&queues);

        assert_eq!(fsm.state(), RequestFsmState::RegRequest);
        assert_eq!(queues.pending(DeviceIndex::Main), 1);
    }

    #[test]
    fn sdo_abort_on_error_flag_parks_in_idle() {
        let subdevice = op_subdevice();
        let queues = DatagramQueues::new();

        subdevice.set_al_status(AlStatus::with_error(SubDeviceState::Op));

        let mut fsm = ready_fsm(&subdevice);

        let request = SdoRequest::upload(0x1018, 1);

        subdevice.enqueue_sdo(request.clone()).unwrap();

        fsm.tick(&queues);

        assert_eq!(request.state(), RequestState::Failure);
        // Historical behaviour: SDO/SoE aborts park the FSM until the next
        // external ready edge
        assert_eq!(fsm.state(), RequestFsmState::Idle);
    }

    #[test]
    fn reg_abort_on_error_flag_returns_to_ready() {
        let subdevice = op_subdevice();
        let queues = DatagramQueues::new();

        subdevice.set_al_status(AlStatus::with_error(SubDeviceState::Op));

        let mut fsm = ready_fsm(&subdevice);

        let request = RegRequest::read(0x0130, 2);

        subdevice.enqueue_reg(request.clone()).unwrap();

        fsm.tick(&queues);

        assert_eq!(request.state(), RequestState::Failure);
        assert_eq!(fsm.state(), RequestFsmState::Ready);
    }

    #[test]
    fn sdo_abort_in_init() {
        let subdevice = op_subdevice();
        let queues = DatagramQueues::new();

        subdevice.set_al_status(AlStatus::new(SubDeviceState::Init));

        let mut fsm = ready_fsm(&subdevice);

        let request = SdoRequest::upload(0x1018, 1);

        subdevice.enqueue_sdo(request.clone()).unwrap();

        fsm.tick(&queues);

        assert_eq!(request.state(), RequestState::Failure);
        assert_eq!(fsm.state(), RequestFsmState::Idle);
    }

    #[test]
    fn internal_reg_slot_is_flagged_busy_in_place() {
        let subdevice = op_subdevice();
        let queues = DatagramQueues::new();

        let config = SubDeviceConfig::new(0, 0, 0, 0, 0);
        let slot = config.create_reg_request(0x0130, Direction::Input, 2);

        subdevice.set_config(config.clone());

        let mut fsm = ready_fsm(&subdevice);

        fsm.tick(&queues);

        assert_eq!(fsm.state(), RequestFsmState::RegRequest);
        assert_eq!(slot.state(), RequestState::Busy);
        // The slot stays with its owner
        assert!(config.first_queued_reg().is_none());
    }

    #[test]
    fn config_teardown_mid_flight_is_silently_dropped() {
        let subdevice = op_subdevice();
        let queues = DatagramQueues::new();

        let config = SubDeviceConfig::new(0, 0, 0, 0, 0);
        let slot = config.create_reg_request(0x0130, Direction::Input, 2);

        subdevice.set_config(config.clone());

        let mut fsm = ready_fsm(&subdevice);

        fsm.tick(&queues);

        assert_eq!(fsm.state(), RequestFsmState::RegRequest);

        // Tear the config down while the exchange is in flight
        subdevice.clear_config();
        drop(slot);
        drop(config);

        // Round-trip completes
        for datagram in queues.take_sendable(DeviceIndex::Main) {
            datagram.receive(&[0x08, 0x00], 1);
        }

        fsm.tick(&queues);

        assert_eq!(fsm.state(), RequestFsmState::Ready);
    }
}
