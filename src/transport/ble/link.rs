//! GATT client for the provisioning service

use std::{sync::Arc, time::Duration};

use bluer::{Address, Device, DeviceEvent, DeviceProperty, gatt::remote::Characteristic};
use futures::{StreamExt, stream::BoxStream};
use tokio::{
    sync::{Mutex, mpsc},
    time::{sleep, timeout},
};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    core::{
        error::{TransportError, TransportResult},
        types::LinkStatus,
    },
    transport::{
        ble::{adapter::BleAdapter, uuids::GattUuids},
        link::ProvisioningLink,
    },
};

const SERVICES_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Characteristics of one connected device
#[derive(Clone)]
struct ActiveLink {
    device: Device,
    version: Characteristic,
    control_point: Characteristic,
    data_out: Characteristic,
    responses: Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
    status: mpsc::UnboundedSender<LinkStatus>,
    /// Cancelled when the device drops the link
    lost: CancellationToken,
    /// Cancelled on release; stops every link task
    released: CancellationToken,
}

/// Provisioning link over BlueZ
pub struct BleLink {
    adapter: BleAdapter,
    uuids: GattUuids,
    command_timeout: Duration,
    connect_timeout: Duration,
    /// Held by connect and release for their whole run
    lifecycle: Mutex<()>,
    active: Mutex<Option<ActiveLink>>,
    /// Device of a connect in progress; left behind if that connect is dropped
    connecting: Mutex<Option<Device>>,
}

impl BleLink {
    pub fn new(
        adapter: BleAdapter,
        uuids: GattUuids,
        command_timeout: Duration,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            adapter,
            uuids,
            command_timeout,
            connect_timeout,
            lifecycle: Mutex::new(()),
            active: Mutex::new(None),
            connecting: Mutex::new(None),
        }
    }

    async fn active(&self) -> TransportResult<ActiveLink> {
        self.active
            .lock()
            .await
            .clone()
            .ok_or(TransportError::NotConnected)
    }

    async fn establish(&self, device: &Device) -> TransportResult<()> {
        if !device.is_connected().await? {
            device.connect().await?;
        }
        if !device.is_paired().await? {
            info!("Pairing with {}", device.address());
            device.pair().await?;
        }

        while !device.is_services_resolved().await? {
            sleep(SERVICES_POLL_INTERVAL).await;
        }
        Ok(())
    }

    /// Connect, pair and subscribe; the caller disconnects on error
    async fn open(
        &self,
        device: &Device,
        status_tx: mpsc::UnboundedSender<LinkStatus>,
    ) -> TransportResult<ActiveLink> {
        if timeout(self.connect_timeout, self.establish(device))
            .await
            .is_err()
        {
            return Err(TransportError::Ble(format!(
                "connection to {} timed out",
                device.address()
            )));
        }

        let [version, control_point, data_out] = self.discover(device).await?;
        let notifications = control_point.notify().await?;
        let events = device.events().await?;

        let lost = CancellationToken::new();
        let released = CancellationToken::new();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        tokio::spawn(forward_responses(
            notifications,
            response_tx,
            lost.clone(),
            released.clone(),
        ));

        let _ = status_tx.send(LinkStatus::Connected);
        tokio::spawn(watch_connection(
            events,
            status_tx.clone(),
            lost.clone(),
            released.clone(),
        ));

        Ok(ActiveLink {
            device: device.clone(),
            version,
            control_point,
            data_out,
            responses: Arc::new(Mutex::new(response_rx)),
            status: status_tx,
            lost,
            released,
        })
    }

    /// Disconnect the active device and any left by a dropped connect
    async fn release_locked(&self) -> TransportResult<()> {
        if let Some(device) = self.connecting.lock().await.take() {
            warn!("Disconnecting {} left by an abandoned connect", device.address());
            if device.is_connected().await? {
                device.disconnect().await?;
            }
        }

        let Some(link) = self.active.lock().await.take() else {
            return Ok(());
        };

        info!("Releasing {}", link.device.address());
        let _ = link.status.send(LinkStatus::Disconnecting);
        link.released.cancel();
        if link.device.is_connected().await? {
            link.device.disconnect().await?;
        }
        let _ = link.status.send(LinkStatus::Disconnected);
        Ok(())
    }

    async fn discover(&self, device: &Device) -> TransportResult<[Characteristic; 3]> {
        for service in device.services().await? {
            if service.uuid().await? != self.uuids.service {
                continue;
            }

            let mut version = None;
            let mut control_point = None;
            let mut data_out = None;
            for characteristic in service.characteristics().await? {
                let uuid = characteristic.uuid().await?;
                if uuid == self.uuids.version {
                    version = Some(characteristic);
                } else if uuid == self.uuids.control_point {
                    control_point = Some(characteristic);
                } else if uuid == self.uuids.data_out {
                    data_out = Some(characteristic);
                }
            }

            return Ok([
                version.ok_or(TransportError::CharacteristicNotFound(self.uuids.version))?,
                control_point.ok_or(TransportError::CharacteristicNotFound(
                    self.uuids.control_point,
                ))?,
                data_out.ok_or(TransportError::CharacteristicNotFound(self.uuids.data_out))?,
            ]);
        }

        Err(TransportError::ServiceNotFound(self.uuids.service))
    }
}

/// Forward control-point notifications until the link goes away
async fn forward_responses(
    notifications: impl futures::Stream<Item = Vec<u8>>,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    lost: CancellationToken,
    released: CancellationToken,
) {
    futures::pin_mut!(notifications);
    loop {
        tokio::select! {
            biased;
            _ = lost.cancelled() => break,
            _ = released.cancelled() => break,
            response = notifications.next() => match response {
                Some(response) => {
                    debug!("Control point notification ({} bytes)", response.len());
                    if tx.send(response).is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

/// Translate device property changes into link status updates
async fn watch_connection(
    events: impl futures::Stream<Item = DeviceEvent>,
    tx: mpsc::UnboundedSender<LinkStatus>,
    lost: CancellationToken,
    released: CancellationToken,
) {
    futures::pin_mut!(events);
    loop {
        let event = tokio::select! {
            biased;
            _ = released.cancelled() => break,
            event = events.next() => event,
        };

        match event {
            Some(DeviceEvent::PropertyChanged(DeviceProperty::Connected(connected))) => {
                let status = if connected {
                    LinkStatus::Connected
                } else {
                    warn!("Device dropped the link");
                    lost.cancel();
                    LinkStatus::Disconnected
                };
                if tx.send(status).is_err() {
                    break;
                }
            }
            Some(_) => {}
            None => break,
        }
    }
}

impl ProvisioningLink for BleLink {
    type Device = Address;

    async fn connect(&self, address: Address) -> TransportResult<BoxStream<'static, LinkStatus>> {
        let _lifecycle = self.lifecycle.lock().await;
        self.release_locked().await?;

        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let _ = status_tx.send(LinkStatus::Connecting);

        info!("Connecting to {}", address);
        let device = self.adapter.adapter().device(address)?;
        *self.connecting.lock().await = Some(device.clone());

        let opened = self.open(&device, status_tx).await;
        self.connecting.lock().await.take();
        let link = match opened {
            Ok(link) => link,
            Err(e) => {
                if let Err(disconnect) = device.disconnect().await {
                    debug!("Disconnect after failed connect: {}", disconnect);
                }
                return Err(e);
            }
        };

        info!("Connected to {}", address);
        *self.active.lock().await = Some(link);
        Ok(UnboundedReceiverStream::new(status_rx).boxed())
    }

    async fn read_version(&self) -> TransportResult<Vec<u8>> {
        let link = self.active().await?;
        Ok(link.version.read().await?)
    }

    async fn send_command(&self, payload: Vec<u8>) -> TransportResult<Vec<u8>> {
        let link = self.active().await?;

        // held for the whole exchange so commands never interleave
        let mut responses = link.responses.lock().await;
        while responses.try_recv().is_ok() {
            debug!("Dropping stale control point response");
        }

        link.control_point.write(&payload).await?;
        match timeout(self.command_timeout, responses.recv()).await {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(TransportError::DeviceDisconnected),
            Err(_) => Err(TransportError::CommandTimeout),
        }
    }

    async fn data_stream(&self) -> TransportResult<BoxStream<'static, Vec<u8>>> {
        let link = self.active().await?;
        let notifications = link.data_out.notify().await?;

        Ok(notifications
            .take_until(link.lost.cancelled_owned())
            .take_until(link.released.cancelled_owned())
            .boxed())
    }

    async fn release(&self) -> TransportResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.release_locked().await
    }
}
