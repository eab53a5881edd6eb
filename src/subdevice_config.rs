//! SubDevice configuration: the application-facing identity of a bus position
//! and the owner of long-lived register request slots.

use crate::{
    request::{RegRequest, RequestState},
    Direction,
};
use std::sync::Arc;

/// Application-side configuration attached to one SubDevice.
///
/// A config outlives individual cyclic exchanges but not the application; if
/// a config is torn down while one of its register slots is in flight, the
/// request FSM observes the dead slot and silently drops it.
pub struct SubDeviceConfig {
    id: usize,
    alias: u16,
    position: u16,
    vendor_id: u32,
    product_id: u32,
    reg_requests: spin::Mutex<Vec<Arc<RegRequest>>>,
}

impl SubDeviceConfig {
    /// Create a config.
    ///
    /// `id` must be unique among all configs handed to the same domain; the
    /// [`MainDevice`](crate::MainDevice) assigns it when configs are created
    /// through [`add_config`](crate::MainDevice::add_config).
    pub fn new(id: usize, alias: u16, position: u16, vendor_id: u32, product_id: u32) -> Arc<Self> {
        Arc::new(Self {
            id,
            alias,
            position,
            vendor_id,
            product_id,
            reg_requests: spin::Mutex::new(Vec::new()),
        })
    }

    /// Stable identity of this config.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Station alias, `0` if unused.
    pub fn alias(&self) -> u16 {
        self.alias
    }

    /// Ring position relative to the alias.
    pub fn position(&self) -> u16 {
        self.position
    }

    /// Expected vendor ID.
    pub fn vendor_id(&self) -> u32 {
        self.vendor_id
    }

    /// Expected product code.
    pub fn product_id(&self) -> u32 {
        self.product_id
    }

    /// Create a long-lived register request slot owned by this config.
    ///
    /// The slot starts armed. After each completion the producer may inspect
    /// the result in place and [`rearm`](RegRequest::rearm) it for the next
    /// exchange.
    pub fn create_reg_request(&self, address: u16, direction: Direction, size: usize) -> Arc<RegRequest> {
        let request = match direction {
            Direction::Input => RegRequest::read(address, size),
            Direction::Output => RegRequest::write(address, &vec![0; size]),
        };

        self.reg_requests.lock().push(request.clone());

        request
    }

    /// The first armed register slot, if any.
    ///
    /// Slots are scanned in creation order and are *not* dequeued; the FSM
    /// flags the winning slot busy in place.
    pub(crate) fn first_queued_reg(&self) -> Option<Arc<RegRequest>> {
        self.reg_requests
            .lock()
            .iter()
            .find(|slot| slot.state() == RequestState::Queued)
            .cloned()
    }
}

impl core::fmt::Debug for SubDeviceConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SubDeviceConfig")
            .field("id", &self.id)
            .field("alias", &self.alias)
            .field("position", &self.position)
            .field("vendor_id", &format_args!("{:#010x}", self.vendor_id))
            .field("product_id", &format_args!("{:#010x}", self.product_id))
            .finish()
    }
}
