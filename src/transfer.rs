//! The capability interface of the mailbox transfer engines.
//!
//! CoE, FoE and SoE exchanges are multi-step conversations with one
//! SubDevice's mailbox. The request FSM does not know anything about those
//! steps; it binds an engine to a request, then pumps [`exec`]
//! once per cycle until the engine reports a terminal outcome. The engine
//! prepares each outgoing frame into the FSM's shared datagram.
//!
//! [`exec`]: MailboxTransfer::exec

use crate::{datagram::Datagram, subdevice::SubDevice};

/// A mailbox transfer engine driving one request class against one SubDevice.
pub trait MailboxTransfer: Send {
    /// The request type this engine consumes, e.g.
    /// `Arc<`[`SdoRequest`](crate::SdoRequest)`>`.
    type Request;

    /// Bind the engine to a new request. One-shot init; called exactly once
    /// per request, before the first [`exec`](MailboxTransfer::exec).
    fn transfer(&mut self, subdevice: &SubDevice, request: Self::Request);

    /// Advance the exchange by one step.
    ///
    /// Returns `true` while the exchange is still running, in which case the
    /// engine has prepared the next outgoing frame in `datagram` and the FSM
    /// will queue it. Returns `false` once the exchange reached a terminal
    /// outcome; [`success`](MailboxTransfer::success) is valid from then on.
    fn exec(&mut self, datagram: &Datagram) -> bool;

    /// Whether the finished exchange succeeded.
    ///
    /// Only valid after [`exec`](MailboxTransfer::exec) returned `false`.
    fn success(&self) -> bool;
}

/// The set of transfer engines bound to one SubDevice's request FSM.
///
/// An absent engine means the SubDevice does not support that mailbox
/// protocol; requests of that class terminate as failures.
#[derive(Default)]
pub struct TransferEngines {
    /// CoE engine consuming [`SdoRequest`](crate::SdoRequest)s.
    pub coe: Option<Box<dyn MailboxTransfer<Request = std::sync::Arc<crate::SdoRequest>>>>,

    /// FoE engine consuming [`FoeRequest`](crate::FoeRequest)s.
    pub foe: Option<Box<dyn MailboxTransfer<Request = std::sync::Arc<crate::FoeRequest>>>>,

    /// SoE engine consuming [`SoeRequest`](crate::SoeRequest)s.
    pub soe: Option<Box<dyn MailboxTransfer<Request = std::sync::Arc<crate::SoeRequest>>>>,
}
