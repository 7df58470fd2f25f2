//! Provisioning client on top of a provisioning link

use futures::{StreamExt, stream::BoxStream};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    core::{
        error::{CodecError, ProvisionError, ProvisionResult, TransportError},
        types::{DeviceStatus, LinkStatus, ScanRecord, Version, WifiConfig, WifiConnectionState},
    },
    protocol::{DataFrame, OpCode, codec},
    transport::link::ProvisioningLink,
};

/// Typed provisioning operations against one device at a time
///
/// Wraps a [`ProvisioningLink`] and owns request encoding, response
/// validation and data-frame decoding.
pub struct ProvisioningClient<L: ProvisioningLink> {
    link: L,
    device: Mutex<Option<L::Device>>,
    /// Held across release and connect so overlapping starts queue up
    lifecycle: Mutex<()>,
}

impl<L: ProvisioningLink> ProvisioningClient<L> {
    /// Wrap `link`; nothing is connected until [`start`](Self::start)
    pub fn new(link: L) -> Self {
        Self {
            link,
            device: Mutex::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    /// The underlying link
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Connect to `device`, releasing any previous connection first
    ///
    /// Concurrent calls are serialized; a later start always releases the
    /// device an earlier one connected.
    pub async fn start(&self, device: L::Device) -> ProvisionResult<BoxStream<'static, LinkStatus>> {
        let _lifecycle = self.lifecycle.lock().await;
        if let Err(e) = self.release_locked().await {
            warn!("Failed to release previous device: {}", e);
        }

        info!(?device, "Connecting to provisioning device");
        let statuses = self.link.connect(device.clone()).await?;
        *self.device.lock().await = Some(device);
        Ok(statuses)
    }

    /// Read and decode the version characteristic
    pub async fn read_version(&self) -> ProvisionResult<Version> {
        let bytes = self.link.read_version().await?;
        let version = codec::decode_version(&bytes)?;
        debug!(%version, "Read protocol version");
        Ok(version)
    }

    async fn command(
        &self,
        op_code: OpCode,
        config: Option<&WifiConfig>,
    ) -> ProvisionResult<Option<DeviceStatus>> {
        let request = codec::encode_request(op_code, None, config);
        debug!(?op_code, "Sending command ({} bytes)", request.len());

        let bytes = self.link.send_command(request).await?;
        let response = codec::decode_response(&bytes, op_code)?;
        response.status.map_err(ProvisionError::Response)?;
        Ok(response.device_status)
    }

    /// Request the device status
    pub async fn get_status(&self) -> ProvisionResult<DeviceStatus> {
        self.command(OpCode::GetStatus, None).await?.ok_or_else(|| {
            CodecError::MalformedMessage("status response without device status".into()).into()
        })
    }

    /// Start a device-side scan and stream its records
    ///
    /// The stream ends when the link drops or is released; dropping it does
    /// not stop the device scan, call [`stop_scan`](Self::stop_scan).
    pub async fn start_scan(&self) -> ProvisionResult<BoxStream<'static, ScanRecord>> {
        // subscribe first so no early record is lost
        let frames = self.link.data_stream().await?;
        self.command(OpCode::StartScan, None).await?;
        info!("Wi-Fi scan started");

        Ok(frames
            .filter_map(|bytes| async move {
                match codec::decode_data_frame(&bytes) {
                    Ok(DataFrame {
                        scan_record: Some(record),
                        ..
                    }) => Some(record),
                    Ok(_) => None,
                    Err(e) => {
                        warn!("Dropping undecodable scan frame: {}", e);
                        None
                    }
                }
            })
            .boxed())
    }

    /// Stop a running scan; failures are only logged
    pub async fn stop_scan(&self) {
        match self.command(OpCode::StopScan, None).await {
            Ok(_) => info!("Wi-Fi scan stopped"),
            Err(e) => warn!("Failed to stop scan: {}", e),
        }
    }

    /// Send credentials and stream connection states until a terminal one
    ///
    /// A link loss before the terminal state ends the stream with
    /// `DeviceDisconnected`.
    pub async fn set_config(
        &self,
        config: &WifiConfig,
    ) -> ProvisionResult<BoxStream<'static, ProvisionResult<WifiConnectionState>>> {
        let frames = self.link.data_stream().await?;
        info!(ssid = %config.info.ssid_lossy(), "Sending configuration");
        self.command(OpCode::SetConfig, Some(config)).await?;
        Ok(connection_states(frames))
    }

    /// Erase the stored credentials on the device
    pub async fn forget_config(&self) -> ProvisionResult<()> {
        self.command(OpCode::ForgetConfig, None).await?;
        info!("Device configuration forgotten");
        Ok(())
    }

    /// Disconnect from the current device; safe to repeat
    pub async fn release(&self) -> ProvisionResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.release_locked().await
    }

    async fn release_locked(&self) -> ProvisionResult<()> {
        if let Some(device) = self.device.lock().await.take() {
            info!(?device, "Releasing provisioning device");
        }
        self.link.release().await?;
        Ok(())
    }
}

fn connection_states(
    frames: BoxStream<'static, Vec<u8>>,
) -> BoxStream<'static, ProvisionResult<WifiConnectionState>> {
    Box::pin(async_stream::stream! {
        let mut frames = frames;
        while let Some(bytes) = frames.next().await {
            match codec::decode_data_frame(&bytes) {
                Ok(DataFrame { state: Some(state), .. }) => {
                    debug!(?state, "Connection state");
                    yield Ok(state);
                    if state.is_terminal() {
                        return;
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Dropping undecodable state frame: {}", e),
            }
        }
        yield Err(TransportError::DeviceDisconnected.into());
    })
}
