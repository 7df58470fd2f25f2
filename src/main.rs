//! nRF Wi-Fi Provisioner - Main Entry Point

use std::{error::Error, sync::Arc, time::Duration};

use bluer::Address;
use clap::Parser;
use futures::StreamExt;
use nrf_wifi_provisioner::{
    config::{CliArgs, Command, Settings},
    core::{
        aggregator::aggregate,
        client::ProvisioningClient,
        error::TransportResult,
        password_cache::PasswordCache,
        resource::Resource,
        session::{ProvisioningPhase, ProvisioningSession, SessionEntity, SessionEvent},
        types::{DeviceStatus, ScanRecordGroup, Version, WifiData},
    },
    report::{StatusReport, render_networks, render_status},
    transport::{
        NfcSession, SoftApClient, TagEmulator,
        ble::{BleAdapter, BleLink},
    },
};
use tokio::{sync::watch, time::timeout};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type MainResult<T> = Result<T, Box<dyn Error>>;
type BleSession = ProvisioningSession<BleLink>;

#[tokio::main]
async fn main() -> MainResult<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,nrf_wifi_provisioner=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();
    let settings = Settings::from(&args);
    info!(command = ?args.command, "Starting nRF Wi-Fi provisioner");

    tokio::select! {
        result = run(args.command, &settings) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), aborting");
            Ok(())
        }
    }
}

async fn run(command: Command, settings: &Settings) -> MainResult<()> {
    match command {
        Command::Devices { duration } => devices(settings, Duration::from_secs(duration)).await,
        Command::Status { device } => status(settings, device).await,
        Command::Scan { device, duration } => {
            scan(settings, device, Duration::from_secs(duration)).await
        }
        Command::Provision {
            device,
            ssid,
            password,
            channel,
            volatile,
            scan_duration,
        } => {
            let session = ble_session(settings).await?;
            let result = provision(
                &session,
                device,
                &ssid,
                password,
                channel,
                volatile,
                Duration::from_secs(scan_duration),
            )
            .await;
            session.handle(SessionEvent::Finish).await?;
            result
        }
        Command::Unprovision { device } => {
            let session = ble_session(settings).await?;
            let result = unprovision(&session, device).await;
            session.handle(SessionEvent::Finish).await?;
            result
        }
        Command::SoftapScan => {
            let client = SoftApClient::new(&settings.softap)?;
            print_groups(settings, &client.scan_groups().await?)
        }
        Command::SoftapStatus => {
            let client = SoftApClient::new(&settings.softap)?;
            print_status(settings, None, &client.status().await?)
        }
        Command::SoftapProvision {
            ssid,
            password,
            auth,
            volatile,
        } => {
            let client = SoftApClient::new(&settings.softap)?;
            let network = WifiData::new(ssid, Some(auth.into()));
            let config = network.to_config(password.as_deref(), !volatile)?;
            client.set_config(&config).await?;
            println!("Configuration sent, the device leaves SoftAP mode now");
            Ok(())
        }
        Command::NfcRecord {
            ssid,
            password,
            auth,
        } => {
            let nfc = NfcSession::new(HexDumpTag);
            nfc.publish(ssid.as_bytes(), password.as_bytes(), auth.into())
                .await?;
            nfc.stop().await?;
            Ok(())
        }
    }
}

async fn connect_adapter(settings: &Settings) -> MainResult<BleLink> {
    Ok(BleLink::new(
        BleAdapter::new().await?,
        settings.gatt_uuids,
        settings.command_timeout,
        settings.connect_timeout,
    ))
}

async fn ble_session(settings: &Settings) -> MainResult<BleSession> {
    let link = connect_adapter(settings).await?;
    let session = ProvisioningSession::new(ProvisioningClient::new(link));

    Ok(match &settings.password_cache {
        Some(path) => session.with_password_cache(Arc::new(PasswordCache::open(path).await?)),
        None => session,
    })
}

async fn devices(settings: &Settings, duration: Duration) -> MainResult<()> {
    let adapter = BleAdapter::new().await?;
    for device in adapter.discover(&settings.gatt_uuids, duration).await? {
        println!(
            "{}  {:<20}  {:>4} dBm  {}",
            device.address,
            device.name.as_deref().unwrap_or("<unnamed>"),
            device.rssi.map(|r| r.to_string()).unwrap_or_else(|| "?".into()),
            device
                .advertisement
                .map(|a| a.to_string())
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn status(settings: &Settings, device: Address) -> MainResult<()> {
    let client = ProvisioningClient::new(connect_adapter(settings).await?);
    let _link = client.start(device).await?;

    let result = async {
        let version = client.read_version().await?;
        print_status(settings, Some(version), &client.get_status().await?)
    }
    .await;

    if let Err(e) = client.release().await {
        warn!("Failed to release device: {}", e);
    }
    result
}

async fn scan(settings: &Settings, device: Address, duration: Duration) -> MainResult<()> {
    let client = ProvisioningClient::new(connect_adapter(settings).await?);
    let _link = client.start(device).await?;

    let result = async {
        let mut snapshots = aggregate(client.start_scan().await?);
        let mut groups = Vec::new();
        let _ = timeout(duration, async {
            while let Some(snapshot) = snapshots.next().await {
                groups = snapshot;
            }
        })
        .await;
        client.stop_scan().await;
        print_groups(settings, &groups)
    }
    .await;

    if let Err(e) = client.release().await {
        warn!("Failed to release device: {}", e);
    }
    result
}

async fn wait_until(
    updates: &mut watch::Receiver<SessionEntity<Address>>,
    deadline: Duration,
    predicate: impl FnMut(&SessionEntity<Address>) -> bool,
) -> MainResult<SessionEntity<Address>> {
    let entity = timeout(deadline, updates.wait_for(predicate))
        .await
        .map_err(|_| "timed out waiting for the device")??;
    Ok(entity.clone())
}

/// Wait until the device status is loaded or failed to load
async fn select(session: &BleSession, device: Address) -> MainResult<()> {
    let mut updates = session.subscribe();
    session.handle(SessionEvent::SelectDevice(device)).await?;

    let entity = wait_until(&mut updates, Duration::from_secs(60), |e| {
        e.version.as_ref().is_some_and(Resource::is_error)
            || e.status.as_ref().is_some_and(|s| !s.is_loading())
    })
    .await?;

    if let Some(error) = entity.version.as_ref().and_then(Resource::error) {
        return Err(format!("failed to read version: {error}").into());
    }
    if let Some(error) = entity.status.as_ref().and_then(Resource::error) {
        return Err(format!("failed to read status: {error}").into());
    }
    Ok(())
}

async fn provision(
    session: &BleSession,
    device: Address,
    ssid: &str,
    password: Option<String>,
    channel: Option<u32>,
    volatile: bool,
    scan_duration: Duration,
) -> MainResult<()> {
    select(session, device).await?;

    session.handle(SessionEvent::StartWifiScan).await?;
    tokio::time::sleep(scan_duration).await;
    let groups = session
        .entity()
        .scan_results
        .as_ref()
        .and_then(Resource::data)
        .cloned()
        .unwrap_or_default();
    session.handle(SessionEvent::StopWifiScan).await?;

    let network = match groups.iter().find(|g| g.ssid == ssid.as_bytes()) {
        Some(group) => match channel {
            Some(channel) => group
                .members
                .iter()
                .find(|m| m.channel() == Some(channel))
                .and_then(WifiData::from_record)
                .ok_or_else(|| format!("{ssid} was not seen on channel {channel}"))?,
            None => WifiData::from_group(group),
        },
        None => {
            warn!(ssid, "Network not seen during scan, provisioning blindly");
            WifiData::new(ssid, None)
        }
    };

    session.handle(SessionEvent::SelectNetwork(network)).await?;
    if let Some(password) = password {
        session.handle(SessionEvent::SetPassword(password)).await?;
    }
    session
        .handle(SessionEvent::SetPersistToFlash(!volatile))
        .await?;

    let mut updates = session.subscribe();
    session.handle(SessionEvent::Provision).await?;
    let entity = wait_until(&mut updates, Duration::from_secs(120), |e| {
        matches!(
            e.phase(),
            ProvisioningPhase::ProvisionedSuccess | ProvisioningPhase::ProvisionedFailure
        )
    })
    .await?;

    if entity.is_provisioning_success() {
        println!("Device connected to {ssid}");
        return Ok(());
    }
    match entity.provisioning_result {
        Some(Resource::Success(state)) => Err(format!("provisioning failed: {state:?}").into()),
        Some(Resource::Error(error)) => Err(format!("provisioning failed: {error}").into()),
        _ => Err("provisioning result unavailable".into()),
    }
}

async fn unprovision(session: &BleSession, device: Address) -> MainResult<()> {
    select(session, device).await?;

    let mut updates = session.subscribe();
    session.handle(SessionEvent::Unprovision).await?;
    let entity = wait_until(&mut updates, Duration::from_secs(60), |e| {
        e.unprovisioning_result
            .as_ref()
            .is_some_and(|r| !r.is_loading())
    })
    .await?;

    if let Some(error) = entity.unprovisioning_result.as_ref().and_then(Resource::error) {
        return Err(format!("unprovisioning failed: {error}").into());
    }
    println!("Device configuration erased");
    Ok(())
}

fn print_status(
    settings: &Settings,
    version: Option<Version>,
    status: &DeviceStatus,
) -> MainResult<()> {
    let report = StatusReport::new(version, status);
    println!("{}", render_status(&report, settings.json_output)?);
    Ok(())
}

fn print_groups(settings: &Settings, groups: &[ScanRecordGroup]) -> MainResult<()> {
    println!("{}", render_networks(groups, settings.json_output)?);
    Ok(())
}

/// Stand-in tag emulator that prints the NDEF message
struct HexDumpTag;

impl TagEmulator for HexDumpTag {
    async fn publish(&self, ndef_message: Vec<u8>) -> TransportResult<()> {
        println!("{}", hex::encode(ndef_message));
        Ok(())
    }

    async fn withdraw(&self) -> TransportResult<()> {
        Ok(())
    }
}
