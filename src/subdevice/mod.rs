//! A single SubDevice on the ring: identity, AL state, and the per-class
//! request queues its FSM drains.

mod fsm;

use crate::{
    error::{Error, Item},
    request::{FoeRequest, RegRequest, SdoRequest, SoeRequest},
    subdevice_config::SubDeviceConfig,
    subdevice_state::AlStatus,
    DeviceIndex,
};
use std::sync::Arc;

pub use fsm::{RequestFsm, RequestFsmState};

/// How many pending requests of one class a SubDevice will hold before
/// producers get [`Error::Capacity`] back.
pub const REQUEST_QUEUE_DEPTH: usize = 16;

type RequestQueue<R> = spin::Mutex<heapless::Deque<Arc<R>, REQUEST_QUEUE_DEPTH>>;

/// SubDevice identity read from EEPROM during discovery.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SubDeviceIdentity {
    /// Vendor ID.
    pub vendor_id: u32,
    /// Product code.
    pub product_id: u32,
    /// Product revision.
    pub revision: u32,
    /// Device serial number.
    pub serial: u32,
}

impl core::fmt::Display for SubDeviceIdentity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "vendor {:#010x}, product {:#010x}, rev {}, serial {}",
            self.vendor_id, self.product_id, self.revision, self.serial
        )
    }
}

/// The shared descriptor of one SubDevice.
///
/// Producers enqueue requests from any thread; the cyclic context drains the
/// queues through the SubDevice's [`RequestFsm`]. Queue edges are the only
/// contention points, guarded by short-held spin locks.
pub struct SubDevice {
    configured_address: u16,
    device: DeviceIndex,
    identity: SubDeviceIdentity,
    al_status: spin::RwLock<AlStatus>,
    config: spin::RwLock<Option<Arc<SubDeviceConfig>>>,
    sdo_requests: RequestQueue<SdoRequest>,
    reg_requests: RequestQueue<RegRequest>,
    foe_requests: RequestQueue<FoeRequest>,
    soe_requests: RequestQueue<SoeRequest>,
}

impl SubDevice {
    /// Create a SubDevice descriptor.
    pub fn new(
        configured_address: u16,
        device: DeviceIndex,
        identity: SubDeviceIdentity,
    ) -> Arc<Self> {
        Arc::new(Self {
            configured_address,
            device,
            identity,
            al_status: spin::RwLock::new(AlStatus::default()),
            config: spin::RwLock::new(None),
            sdo_requests: spin::Mutex::new(heapless::Deque::new()),
            reg_requests: spin::Mutex::new(heapless::Deque::new()),
            foe_requests: spin::Mutex::new(heapless::Deque::new()),
            soe_requests: spin::Mutex::new(heapless::Deque::new()),
        })
    }

    /// Configured station address.
    pub fn configured_address(&self) -> u16 {
        self.configured_address
    }

    /// The link this SubDevice is reached through.
    pub fn device(&self) -> DeviceIndex {
        self.device
    }

    /// EEPROM identity.
    pub fn identity(&self) -> SubDeviceIdentity {
        self.identity
    }

    /// Last AL status read from the SubDevice.
    pub fn al_status(&self) -> AlStatus {
        *self.al_status.read()
    }

    /// Record a new AL status, normally from the AL state machine that walks
    /// SubDevices through `INIT → PRE-OP → SAFE-OP → OP`.
    pub fn set_al_status(&self, status: AlStatus) {
        *self.al_status.write() = status;
    }

    /// The attached configuration, if any.
    pub fn config(&self) -> Option<Arc<SubDeviceConfig>> {
        self.config.read().clone()
    }

    /// Attach an application configuration.
    pub fn set_config(&self, config: Arc<SubDeviceConfig>) {
        *self.config.write() = Some(config);
    }

    /// Detach the application configuration.
    pub fn clear_config(&self) {
        *self.config.write() = None;
    }

    /// Queue an SDO request for this SubDevice.
    pub fn enqueue_sdo(&self, request: Arc<SdoRequest>) -> Result<(), Error> {
        self.sdo_requests
            .lock()
            .push_back(request)
            .map_err(|_| Error::Capacity(Item::Request))
    }

    /// Queue a register request for this SubDevice.
    pub fn enqueue_reg(&self, request: Arc<RegRequest>) -> Result<(), Error> {
        self.reg_requests
            .lock()
            .push_back(request)
            .map_err(|_| Error::Capacity(Item::Request))
    }

    /// Queue an FoE request for this SubDevice.
    pub fn enqueue_foe(&self, request: Arc<FoeRequest>) -> Result<(), Error> {
        self.foe_requests
            .lock()
            .push_back(request)
            .map_err(|_| Error::Capacity(Item::Request))
    }

    /// Queue an SoE request for this SubDevice.
    pub fn enqueue_soe(&self, request: Arc<SoeRequest>) -> Result<(), Error> {
        self.soe_requests
            .lock()
            .push_back(request)
            .map_err(|_| Error::Capacity(Item::Request))
    }

    pub(crate) fn dequeue_sdo(&self) -> Option<Arc<SdoRequest>> {
        self.sdo_requests.lock().pop_front()
    }

    pub(crate) fn dequeue_reg(&self) -> Option<Arc<RegRequest>> {
        self.reg_requests.lock().pop_front()
    }

    pub(crate) fn dequeue_foe(&self) -> Option<Arc<FoeRequest>> {
        self.foe_requests.lock().pop_front()
    }

    pub(crate) fn dequeue_soe(&self) -> Option<Arc<SoeRequest>> {
        self.soe_requests.lock().pop_front()
    }
}

impl core::fmt::Debug for SubDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SubDevice")
            .field(
                "configured_address",
                &format_args!("{:#06x}", self.configured_address),
            )
            .field("device", &self.device)
            .field("identity", &self.identity)
            .field("al_status", &self.al_status())
            .finish()
    }
}
