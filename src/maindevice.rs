//! The MainDevice: owner of the per-link datagram queues, the SubDevices and
//! their request FSMs.

use crate::{
    datagram::DatagramHandle,
    domain::Domain,
    error::{Error, Item},
    subdevice::{RequestFsm, SubDevice},
    subdevice_config::SubDeviceConfig,
    transfer::TransferEngines,
    DeviceIndex, NUM_DEVICES,
};
use std::collections::VecDeque;
use std::sync::Arc;

/// Per-link FIFO queues of datagrams awaiting transmission.
///
/// The cyclic context pushes; the frame driver drains with
/// [`take_sendable`](DatagramQueues::take_sendable), transmits, and later
/// publishes each reply back onto the datagram itself.
pub struct DatagramQueues {
    queues: [spin::Mutex<VecDeque<DatagramHandle>>; NUM_DEVICES],
}

impl Default for DatagramQueues {
    fn default() -> Self {
        Self::new()
    }
}

impl DatagramQueues {
    /// Create empty queues for all links.
    pub fn new() -> Self {
        Self {
            queues: core::array::from_fn(|_| spin::Mutex::new(VecDeque::new())),
        }
    }

    /// Enqueue a datagram for transmission on the given link.
    ///
    /// Marks the datagram `Queued`; the driver advances it from there.
    pub fn queue(&self, datagram: DatagramHandle, device: DeviceIndex) {
        datagram.set_device(device);
        datagram.mark_queued();

        self.queues[device.index()].lock().push_back(datagram);
    }

    /// Driver-side: take everything queued on the given link, in queue order.
    pub fn take_sendable(&self, device: DeviceIndex) -> Vec<DatagramHandle> {
        self.queues[device.index()].lock().drain(..).collect()
    }

    /// Number of datagrams waiting on the given link.
    pub fn pending(&self, device: DeviceIndex) -> usize {
        self.queues[device.index()].lock().len()
    }
}

/// The fieldbus master.
///
/// Owns one request FSM per SubDevice and the shared transmission queues.
/// [`tick`](MainDevice::tick) is the single cyclic entry point for the
/// request subsystem; domains are driven separately via
/// [`Domain::queue`] and [`Domain::process`].
pub struct MainDevice {
    queues: Arc<DatagramQueues>,
    fsms: Vec<RequestFsm>,
    configs: Vec<Arc<SubDeviceConfig>>,
    next_config_id: usize,
    next_domain_index: usize,
}

impl Default for MainDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MainDevice {
    /// Create a MainDevice with no SubDevices.
    pub fn new() -> Self {
        Self {
            queues: Arc::new(DatagramQueues::new()),
            fsms: Vec::new(),
            configs: Vec::new(),
            next_config_id: 0,
            next_domain_index: 0,
        }
    }

    /// The shared transmission queues, for handing to a frame driver.
    pub fn queues(&self) -> Arc<DatagramQueues> {
        self.queues.clone()
    }

    /// Register a discovered SubDevice and bind its transfer engines,
    /// returning its position.
    pub fn add_subdevice(&mut self, subdevice: Arc<SubDevice>, engines: TransferEngines) -> usize {
        self.fsms.push(RequestFsm::new(subdevice, engines));

        self.fsms.len() - 1
    }

    /// The SubDevice at the given position.
    pub fn subdevice(&self, position: usize) -> Option<&Arc<SubDevice>> {
        self.fsms.get(position).map(RequestFsm::subdevice)
    }

    /// All registered SubDevices in ring order.
    pub fn subdevices(&self) -> impl Iterator<Item = &Arc<SubDevice>> {
        self.fsms.iter().map(RequestFsm::subdevice)
    }

    /// The request FSM at the given position, for state observation.
    pub fn fsm(&self, position: usize) -> Option<&RequestFsm> {
        self.fsms.get(position)
    }

    /// Mark the SubDevice at the given position ready for requests (the
    /// external `Idle → Ready` edge).
    pub fn set_ready(&mut self, position: usize) -> Result<(), Error> {
        self.fsms
            .get_mut(position)
            .map(RequestFsm::set_ready)
            .ok_or(Error::NotFound {
                item: Item::SubDevice,
                index: Some(position),
            })
    }

    /// Create an application config for the SubDevice expected at
    /// `alias`/`position`.
    pub fn add_config(
        &mut self,
        alias: u16,
        position: u16,
        vendor_id: u32,
        product_id: u32,
    ) -> Arc<SubDeviceConfig> {
        let config = SubDeviceConfig::new(self.next_config_id, alias, position, vendor_id, product_id);

        self.next_config_id += 1;

        self.configs.push(config.clone());

        config
    }

    /// All application configs, in creation order.
    pub fn configs(&self) -> &[Arc<SubDeviceConfig>] {
        &self.configs
    }

    /// Attach a config to the SubDevice at the given ring position.
    pub fn attach_config(
        &mut self,
        position: usize,
        config: &Arc<SubDeviceConfig>,
    ) -> Result<(), Error> {
        let subdevice = self.subdevice(position).ok_or(Error::NotFound {
            item: Item::SubDevice,
            index: Some(position),
        })?;

        subdevice.set_config(config.clone());

        Ok(())
    }

    /// Tear down a config: detach it from any SubDevice and drop the
    /// MainDevice's reference, killing its register slots.
    pub fn remove_config(&mut self, config: &Arc<SubDeviceConfig>) {
        for subdevice in self.subdevices() {
            if subdevice
                .config()
                .is_some_and(|attached| Arc::ptr_eq(&attached, config))
            {
                subdevice.clear_config();
            }
        }

        self.configs
            .retain(|existing| !Arc::ptr_eq(existing, config));
    }

    /// Create a new, empty process data domain.
    pub fn create_domain<'buf>(&mut self) -> Domain<'buf> {
        let domain = Domain::new(self.next_domain_index);

        self.next_domain_index += 1;

        domain
    }

    /// Run every SubDevice's request FSM once. Call once per master cycle.
    pub fn tick(&mut self) {
        for fsm in &mut self.fsms {
            fsm.tick(&self.queues);
        }
    }
}
