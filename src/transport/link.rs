//! Provisioning link trait definition

use std::fmt::Debug;

use futures::stream::BoxStream;
use trait_variant::make;

use crate::core::{error::TransportResult, types::LinkStatus};

/// Abstraction over the physical connection to one provisioning device
///
/// Implementations multiplex three logical lines: the version read, the
/// command/response control point and the streaming data-out line. Commands
/// are strictly serialized; a second `send_command` waits for the first.
#[make(Send)]
pub trait ProvisioningLink: Send + Sync + 'static {
    /// Handle identifying a device to connect to
    type Device: Clone + Debug + Send + Sync + 'static;

    /// Connect (and bond) to the device
    ///
    /// The returned stream reports link changes and only ends after
    /// [`release`](Self::release).
    async fn connect(&self, device: Self::Device) -> TransportResult<BoxStream<'static, LinkStatus>>;

    /// Read the raw version characteristic
    async fn read_version(&self) -> TransportResult<Vec<u8>>;

    /// Write a command and wait for exactly one response
    ///
    /// Fails with `CommandTimeout` when the deadline passes and with
    /// `DeviceDisconnected` when the link drops while waiting.
    async fn send_command(&self, payload: Vec<u8>) -> TransportResult<Vec<u8>>;

    /// Subscribe to data-out notifications, one frame per item
    async fn data_stream(&self) -> TransportResult<BoxStream<'static, Vec<u8>>>;

    /// Disconnect and stop all link tasks; safe to call repeatedly
    async fn release(&self) -> TransportResult<()>;
}
