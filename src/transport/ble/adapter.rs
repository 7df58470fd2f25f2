//! BLE adapter management and device discovery

use std::{collections::HashSet, time::Duration};

use bluer::{
    Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport,
    agent::{Agent, AgentHandle},
};
use futures::{StreamExt, pin_mut};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info};

use crate::{
    core::error::TransportResult,
    transport::ble::{advertisement::AdvertisementData, uuids::GattUuids},
};

/// A provisioning device found while discovering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub address: Address,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub advertisement: Option<AdvertisementData>,
}

/// BLE transport adapter
pub struct BleAdapter {
    adapter: Adapter,
    _agent: AgentHandle,
}

impl BleAdapter {
    /// Open the default adapter and register a pairing agent
    pub async fn new() -> TransportResult<Self> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;

        // bonding with the device needs an agent; just-works pairing only
        let agent = session
            .register_agent(Agent {
                request_default: true,
                ..Default::default()
            })
            .await?;

        info!("Using BLE adapter: {}", adapter.name());

        Ok(Self {
            adapter,
            _agent: agent,
        })
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Discover devices advertising the provisioning service
    pub async fn discover(
        &self,
        uuids: &GattUuids,
        duration: Duration,
    ) -> TransportResult<Vec<DiscoveredDevice>> {
        self.adapter
            .set_discovery_filter(DiscoveryFilter {
                uuids: HashSet::from([uuids.service]),
                transport: DiscoveryTransport::Le,
                ..Default::default()
            })
            .await?;

        info!(?duration, "Discovering provisioning devices");
        let events = self.adapter.discover_devices().await?;
        pin_mut!(events);

        let deadline = Instant::now() + duration;
        let mut seen = Vec::new();
        while let Ok(Some(event)) = timeout_at(deadline, events.next()).await {
            if let AdapterEvent::DeviceAdded(address) = event {
                if !seen.contains(&address) {
                    debug!("Device added: {}", address);
                    seen.push(address);
                }
            }
        }

        let mut devices = Vec::new();
        for address in seen {
            if let Some(device) = self.describe(address, uuids).await? {
                devices.push(device);
            }
        }
        devices.sort_by(|a, b| b.rssi.cmp(&a.rssi));

        info!("Discovered {} provisioning devices", devices.len());
        Ok(devices)
    }

    async fn describe(
        &self,
        address: Address,
        uuids: &GattUuids,
    ) -> TransportResult<Option<DiscoveredDevice>> {
        let device = self.adapter.device(address)?;
        let advertised = device.uuids().await?.unwrap_or_default();
        if !advertised.contains(&uuids.service) {
            return Ok(None);
        }

        let advertisement = device
            .service_data()
            .await?
            .and_then(|data| data.get(&uuids.service).cloned())
            .and_then(|data| AdvertisementData::parse(&data));

        Ok(Some(DiscoveredDevice {
            address,
            name: device.name().await?,
            rssi: device.rssi().await?,
            advertisement,
        }))
    }
}
