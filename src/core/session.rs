//! Provisioning state machine
//!
//! A [`ProvisioningSession`] drives one device at a time through version and
//! status reads, scanning, network selection and provisioning. Its state is a
//! single [`SessionEntity`] published on a watch channel after every change.
//!
//! Every event except `OpenLogger` first cancels all pending work. Background
//! tasks only apply results while their generation is current; the check
//! happens under the entity lock, so nothing stale lands once `handle`
//! has cancelled it.

use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::{StreamExt, stream::BoxStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    core::{
        aggregator::aggregate,
        client::ProvisioningClient,
        error::{SessionError, SessionResult},
        password_cache::PasswordCache,
        resource::Resource,
        types::{
            DeviceStatus, LinkStatus, ScanRecordGroup, SessionId, Version, WifiConfig,
            WifiConnectionState, WifiData,
        },
    },
    transport::link::ProvisioningLink,
};

/// Phase of the session, derived from the entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningPhase {
    Idle,
    DeviceSelected,
    VersionLoaded,
    StatusLoaded,
    NetworkSelected,
    PasswordPending,
    Provisioning,
    ProvisionedSuccess,
    ProvisionedFailure,
    Unprovisioning,
    Finished,
}

/// Inputs to the state machine
#[derive(Debug, Clone)]
pub enum SessionEvent<D> {
    SelectDevice(D),
    StartWifiScan,
    StopWifiScan,
    SelectNetwork(WifiData),
    SetPassword(String),
    SetPersistToFlash(bool),
    Provision,
    Unprovision,
    NextDevice,
    Finish,
    OpenLogger,
}

impl<D> SessionEvent<D> {
    /// Event name for logs; never carries the password
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::SelectDevice(_) => "select_device",
            SessionEvent::StartWifiScan => "start_wifi_scan",
            SessionEvent::StopWifiScan => "stop_wifi_scan",
            SessionEvent::SelectNetwork(_) => "select_network",
            SessionEvent::SetPassword(_) => "set_password",
            SessionEvent::SetPersistToFlash(_) => "set_persist_to_flash",
            SessionEvent::Provision => "provision",
            SessionEvent::Unprovision => "unprovision",
            SessionEvent::NextDevice => "next_device",
            SessionEvent::Finish => "finish",
            SessionEvent::OpenLogger => "open_logger",
        }
    }
}

/// Observable session state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntity<D> {
    pub device: Option<D>,
    pub link_status: LinkStatus,
    pub version: Option<Resource<Version>>,
    /// Only requested after the version read succeeded
    pub status: Option<Resource<DeviceStatus>>,
    pub scan_results: Option<Resource<Vec<ScanRecordGroup>>>,
    pub network: Option<WifiData>,
    pub password: Option<String>,
    pub persist_to_flash: bool,
    pub provisioning_result: Option<Resource<WifiConnectionState>>,
    pub unprovisioning_result: Option<Resource<()>>,
    pub logger_open: bool,
    pub finished: bool,
}

impl<D> Default for SessionEntity<D> {
    fn default() -> Self {
        Self {
            device: None,
            link_status: LinkStatus::Disconnected,
            version: None,
            status: None,
            scan_results: None,
            network: None,
            password: None,
            persist_to_flash: true,
            provisioning_result: None,
            unprovisioning_result: None,
            logger_open: false,
            finished: false,
        }
    }
}

impl<D> SessionEntity<D> {
    /// The device joined the network and is still reachable
    pub fn is_provisioning_success(&self) -> bool {
        self.link_status == LinkStatus::Connected
            && matches!(
                self.provisioning_result,
                Some(Resource::Success(WifiConnectionState::Connected))
            )
    }

    pub fn is_provisioning_failure(&self) -> bool {
        matches!(
            self.provisioning_result,
            Some(Resource::Error(_))
                | Some(Resource::Success(WifiConnectionState::ConnectionFailed(_)))
        )
    }

    fn status_loaded(&self) -> bool {
        self.status.as_ref().is_some_and(Resource::is_success)
    }

    /// A `Connected` result whose link has since dropped cannot be
    /// confirmed and is reported as `ProvisionedFailure`.
    pub fn phase(&self) -> ProvisioningPhase {
        if self.finished {
            return ProvisioningPhase::Finished;
        }
        if self.device.is_none() {
            return ProvisioningPhase::Idle;
        }
        if self
            .unprovisioning_result
            .as_ref()
            .is_some_and(Resource::is_loading)
        {
            return ProvisioningPhase::Unprovisioning;
        }

        if let Some(result) = &self.provisioning_result {
            return match result {
                Resource::Loading => ProvisioningPhase::Provisioning,
                Resource::Success(state) if !state.is_terminal() => ProvisioningPhase::Provisioning,
                _ if self.is_provisioning_success() => ProvisioningPhase::ProvisionedSuccess,
                _ => ProvisioningPhase::ProvisionedFailure,
            };
        }

        if let Some(network) = &self.network {
            return if network.requires_password() && self.password.is_none() {
                ProvisioningPhase::PasswordPending
            } else {
                ProvisioningPhase::NetworkSelected
            };
        }

        if self.status_loaded() {
            ProvisioningPhase::StatusLoaded
        } else if self.version.as_ref().is_some_and(Resource::is_success) {
            ProvisioningPhase::VersionLoaded
        } else {
            ProvisioningPhase::DeviceSelected
        }
    }
}

/// Which cancellation domain an update belongs to
#[derive(Debug, Clone, Copy)]
enum Scope {
    /// Work started by one event; superseded by the next event
    Pending(u64),
    /// Link observation; superseded by a device change
    Link(u64),
}

struct Shared<D> {
    entity: SessionEntity<D>,
    session_id: SessionId,
    generation: u64,
    link_generation: u64,
    pending: CancellationToken,
    link: CancellationToken,
    scanning: bool,
}

struct Inner<D> {
    shared: Mutex<Shared<D>>,
    updates: watch::Sender<SessionEntity<D>>,
}

impl<D: Clone> Inner<D> {
    fn lock(&self) -> MutexGuard<'_, Shared<D>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` if `scope` is still current; returns whether it was
    fn update(&self, scope: Scope, f: impl FnOnce(&mut SessionEntity<D>)) -> bool {
        let mut shared = self.lock();
        let current = match scope {
            Scope::Pending(generation) => shared.generation == generation,
            Scope::Link(generation) => shared.link_generation == generation,
        };
        if !current {
            return false;
        }

        f(&mut shared.entity);
        self.updates.send_replace(shared.entity.clone());
        true
    }

    /// Supersede pending work; reports whether a scan was running
    fn cancel_pending(&self) -> (Scope, CancellationToken, bool) {
        let mut shared = self.lock();
        shared.generation += 1;
        shared.pending.cancel();
        shared.pending = CancellationToken::new();
        let scanning = std::mem::take(&mut shared.scanning);
        (
            Scope::Pending(shared.generation),
            shared.pending.clone(),
            scanning,
        )
    }

    /// Supersede link observation of the current device
    fn cancel_link(&self) -> (Scope, CancellationToken) {
        let mut shared = self.lock();
        shared.link_generation += 1;
        shared.link.cancel();
        shared.link = CancellationToken::new();
        shared.session_id = SessionId::new();
        (Scope::Link(shared.link_generation), shared.link.clone())
    }

    fn mark_scanning(&self, scope: Scope) {
        let mut shared = self.lock();
        if let Scope::Pending(generation) = scope {
            if shared.generation == generation {
                shared.scanning = true;
            }
        }
    }

    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let session_id = self.lock().session_id;
        tokio::spawn(future.instrument(info_span!("session", id = %session_id)));
    }
}

/// Event-driven provisioning of one device at a time
pub struct ProvisioningSession<L: ProvisioningLink> {
    client: Arc<ProvisioningClient<L>>,
    passwords: Option<Arc<PasswordCache>>,
    inner: Arc<Inner<L::Device>>,
}

impl<L: ProvisioningLink> ProvisioningSession<L> {
    pub fn new(client: ProvisioningClient<L>) -> Self {
        let entity = SessionEntity::default();
        let (updates, _) = watch::channel(entity.clone());

        Self {
            client: Arc::new(client),
            passwords: None,
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    entity,
                    session_id: SessionId::new(),
                    generation: 0,
                    link_generation: 0,
                    pending: CancellationToken::new(),
                    link: CancellationToken::new(),
                    scanning: false,
                }),
                updates,
            }),
        }
    }

    /// Prefill passwords from `cache` and remember successful ones
    pub fn with_password_cache(mut self, cache: Arc<PasswordCache>) -> Self {
        self.passwords = Some(cache);
        self
    }

    /// Receive a snapshot after every change
    pub fn subscribe(&self) -> watch::Receiver<SessionEntity<L::Device>> {
        self.inner.updates.subscribe()
    }

    pub fn entity(&self) -> SessionEntity<L::Device> {
        self.inner.lock().entity.clone()
    }

    pub fn phase(&self) -> ProvisioningPhase {
        self.inner.lock().entity.phase()
    }

    /// Process one event
    ///
    /// Long-running work (reads, scan, provisioning) continues in the
    /// background; observe it through [`subscribe`](Self::subscribe).
    pub async fn handle(&self, event: SessionEvent<L::Device>) -> SessionResult<()> {
        if let SessionEvent::OpenLogger = event {
            let mut shared = self.inner.lock();
            shared.entity.logger_open = true;
            self.inner.updates.send_replace(shared.entity.clone());
            return Ok(());
        }
        if self.inner.lock().entity.finished {
            return Err(SessionError::Finished);
        }

        debug!(event = event.name(), "Handling session event");
        let (scope, token, was_scanning) = self.inner.cancel_pending();
        if was_scanning {
            self.client.stop_scan().await;
        }

        match event {
            SessionEvent::SelectDevice(device) => self.select_device(device, scope, token).await,
            SessionEvent::StartWifiScan => self.start_scan(scope, token),
            SessionEvent::StopWifiScan => Ok(()),
            SessionEvent::SelectNetwork(network) => self.select_network(network, scope).await,
            SessionEvent::SetPassword(password) => {
                self.inner.update(scope, |e| e.password = Some(password));
                Ok(())
            }
            SessionEvent::SetPersistToFlash(persist) => {
                self.inner.update(scope, |e| e.persist_to_flash = persist);
                Ok(())
            }
            SessionEvent::Provision => self.provision(scope, token),
            SessionEvent::Unprovision => self.unprovision(scope, token),
            SessionEvent::NextDevice => {
                self.teardown(false).await;
                Ok(())
            }
            SessionEvent::Finish => {
                self.teardown(true).await;
                Ok(())
            }
            SessionEvent::OpenLogger => Ok(()),
        }
    }

    async fn select_device(
        &self,
        device: L::Device,
        scope: Scope,
        token: CancellationToken,
    ) -> SessionResult<()> {
        let (link_scope, link_token) = self.inner.cancel_link();
        if let Err(e) = self.client.release().await {
            warn!("Failed to release previous device: {}", e);
        }

        info!(?device, "Selecting device");
        self.inner.update(link_scope, |e| {
            *e = SessionEntity {
                device: Some(device.clone()),
                link_status: LinkStatus::Connecting,
                version: Some(Resource::Loading),
                ..SessionEntity::default()
            }
        });

        let client = self.client.clone();
        let inner = self.inner.clone();
        self.inner.spawn(async move {
            let started = tokio::select! {
                biased;
                _ = link_token.cancelled() => return,
                started = client.start(device) => started,
            };
            let statuses = match started {
                Ok(statuses) => statuses,
                Err(e) => {
                    warn!("Failed to connect: {}", e);
                    inner.update(link_scope, |entity| {
                        entity.link_status = LinkStatus::Disconnected;
                        entity.version = Some(Resource::Error(e));
                    });
                    return;
                }
            };

            let reads = load_device_info(client, inner.clone(), scope, token);
            inner.spawn(reads);
            watch_link(statuses, inner, link_scope, link_token).await;
        });
        Ok(())
    }

    fn start_scan(&self, scope: Scope, token: CancellationToken) -> SessionResult<()> {
        if !self.inner.lock().entity.status_loaded() {
            return Err(SessionError::StatusNotLoaded);
        }

        self.inner
            .update(scope, |e| e.scan_results = Some(Resource::Loading));
        self.inner.mark_scanning(scope);
        self.inner
            .spawn(run_scan(self.client.clone(), self.inner.clone(), scope, token));
        Ok(())
    }

    async fn select_network(&self, network: WifiData, scope: Scope) -> SessionResult<()> {
        if self.inner.lock().entity.device.is_none() {
            return Err(SessionError::NoDeviceSelected);
        }

        let password = match &self.passwords {
            Some(cache) => cache.get(&network.ssid).await,
            None => None,
        };
        info!(ssid = %network.ssid_lossy(), cached = password.is_some(), "Network selected");

        self.inner.update(scope, |e| {
            e.network = Some(network);
            e.password = password;
            e.provisioning_result = None;
        });
        Ok(())
    }

    fn provision(&self, scope: Scope, token: CancellationToken) -> SessionResult<()> {
        let (config, ssid, password) = {
            let shared = self.inner.lock();
            let entity = &shared.entity;
            if entity.device.is_none() {
                return Err(SessionError::NoDeviceSelected);
            }
            let network = entity
                .network
                .as_ref()
                .ok_or(SessionError::NoNetworkSelected)?;
            if network.requires_password() && entity.password.is_none() {
                return Err(SessionError::PasswordRequired);
            }

            let config = network.to_config(entity.password.as_deref(), entity.persist_to_flash)?;
            (config, network.ssid.clone(), entity.password.clone())
        };

        self.inner.update(scope, |e| {
            e.provisioning_result = Some(Resource::Loading);
            e.unprovisioning_result = None;
        });

        let remember = self
            .passwords
            .clone()
            .zip(password)
            .map(|(cache, password)| (cache, ssid, password));
        self.inner.spawn(run_provisioning(
            self.client.clone(),
            self.inner.clone(),
            scope,
            token,
            config,
            remember,
        ));
        Ok(())
    }

    fn unprovision(&self, scope: Scope, token: CancellationToken) -> SessionResult<()> {
        if self.inner.lock().entity.device.is_none() {
            return Err(SessionError::NoDeviceSelected);
        }

        self.inner
            .update(scope, |e| e.unprovisioning_result = Some(Resource::Loading));
        self.inner.spawn(run_unprovision(
            self.client.clone(),
            self.inner.clone(),
            scope,
            token,
        ));
        Ok(())
    }

    /// Release the device, then reset once the release completed
    async fn teardown(&self, finished: bool) {
        let (link_scope, _) = self.inner.cancel_link();
        if let Err(e) = self.client.release().await {
            warn!("Failed to release device: {}", e);
        }

        info!(finished, "Session reset");
        self.inner.update(link_scope, |e| {
            *e = SessionEntity {
                finished,
                ..SessionEntity::default()
            }
        });
    }
}

impl<L: ProvisioningLink> Drop for ProvisioningSession<L> {
    fn drop(&mut self) {
        self.inner.cancel_pending();
        self.inner.cancel_link();

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let client = self.client.clone();
            runtime.spawn(async move {
                if let Err(e) = client.release().await {
                    warn!("Failed to release device on drop: {}", e);
                }
            });
        }
    }
}

async fn watch_link<D: Clone>(
    mut statuses: BoxStream<'static, LinkStatus>,
    inner: Arc<Inner<D>>,
    scope: Scope,
    token: CancellationToken,
) {
    loop {
        let status = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            status = statuses.next() => status,
        };
        let Some(status) = status else {
            break;
        };

        debug!(?status, "Link status");
        if !inner.update(scope, |e| e.link_status = status) {
            break;
        }
    }
}

/// Read the version and, only if that worked, the device status
async fn load_device_info<L: ProvisioningLink>(
    client: Arc<ProvisioningClient<L>>,
    inner: Arc<Inner<L::Device>>,
    scope: Scope,
    token: CancellationToken,
) {
    let version = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        version = client.read_version() => version,
    };
    let loaded = version.is_ok();
    if let Err(e) = &version {
        warn!("Failed to read version: {}", e);
    }
    let current = inner.update(scope, |e| {
        e.version = Some(version.into());
        if loaded {
            e.status = Some(Resource::Loading);
        }
    });
    if !current || !loaded {
        return;
    }

    let status = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        status = client.get_status() => status,
    };
    if let Err(e) = &status {
        warn!("Failed to read device status: {}", e);
    }
    inner.update(scope, |e| e.status = Some(status.into()));
}

async fn run_scan<L: ProvisioningLink>(
    client: Arc<ProvisioningClient<L>>,
    inner: Arc<Inner<L::Device>>,
    scope: Scope,
    token: CancellationToken,
) {
    let started = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        started = client.start_scan() => started,
    };
    let records = match started {
        Ok(records) => records,
        Err(e) => {
            warn!("Failed to start scan: {}", e);
            inner.update(scope, |entity| entity.scan_results = Some(Resource::Error(e)));
            return;
        }
    };

    let mut snapshots = aggregate(records);
    loop {
        let snapshot = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            snapshot = snapshots.next() => snapshot,
        };
        let Some(groups) = snapshot else {
            break;
        };
        if !inner.update(scope, |e| e.scan_results = Some(Resource::Success(groups))) {
            break;
        }
    }
    debug!("Scan observation ended");
}

async fn run_provisioning<L: ProvisioningLink>(
    client: Arc<ProvisioningClient<L>>,
    inner: Arc<Inner<L::Device>>,
    scope: Scope,
    token: CancellationToken,
    config: WifiConfig,
    remember: Option<(Arc<PasswordCache>, Vec<u8>, String)>,
) {
    let started = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        started = client.set_config(&config) => started,
    };
    let mut states = match started {
        Ok(states) => states,
        Err(e) => {
            warn!("Failed to send configuration: {}", e);
            inner.update(scope, |entity| {
                entity.provisioning_result = Some(Resource::Error(e))
            });
            return;
        }
    };

    loop {
        let item = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            item = states.next() => item,
        };

        match item {
            Some(Ok(state)) => {
                if state == WifiConnectionState::Connected {
                    info!("Device connected to the network");
                    if let Some((cache, ssid, password)) = &remember {
                        if let Err(e) = cache.store(ssid, password).await {
                            warn!("Failed to remember password: {}", e);
                        }
                    }
                }
                if !inner.update(scope, |e| e.provisioning_result = Some(Resource::Success(state)))
                    || state.is_terminal()
                {
                    return;
                }
            }
            Some(Err(e)) => {
                warn!("Provisioning failed: {}", e);
                inner.update(scope, |entity| {
                    entity.provisioning_result = Some(Resource::Error(e))
                });
                return;
            }
            None => return,
        }
    }
}

/// Forget the stored configuration, then reload the status
async fn run_unprovision<L: ProvisioningLink>(
    client: Arc<ProvisioningClient<L>>,
    inner: Arc<Inner<L::Device>>,
    scope: Scope,
    token: CancellationToken,
) {
    let forgotten = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        forgotten = client.forget_config() => forgotten,
    };
    if let Err(e) = forgotten {
        warn!("Failed to unprovision: {}", e);
        inner.update(scope, |entity| {
            entity.unprovisioning_result = Some(Resource::Error(e))
        });
        return;
    }

    let current = inner.update(scope, |e| {
        e.unprovisioning_result = Some(Resource::Success(()));
        e.provisioning_result = None;
        e.network = None;
        e.password = None;
        e.status = Some(Resource::Loading);
    });
    if !current {
        return;
    }

    let status = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        status = client.get_status() => status,
    };
    inner.update(scope, |e| e.status = Some(status.into()));
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::{
        core::{
            error::{ProvisionError, TransportError},
            types::{AuthMode, FailureReason, ScanRecord, WifiInfo},
        },
        protocol::{DataFrame, OpCode},
        transport::mock::MockLink,
    };

    type Entity = SessionEntity<String>;

    fn session(link: &MockLink) -> ProvisioningSession<MockLink> {
        ProvisioningSession::new(ProvisioningClient::new(link.clone()))
    }

    async fn wait_for(
        session: &ProvisioningSession<MockLink>,
        predicate: impl FnMut(&Entity) -> bool,
    ) -> Entity {
        let mut updates = session.subscribe();
        let entity = timeout(Duration::from_secs(2), updates.wait_for(predicate))
            .await
            .expect("timed out waiting for session state")
            .expect("session dropped");
        entity.clone()
    }

    async fn wait_for_phase(session: &ProvisioningSession<MockLink>, phase: ProvisioningPhase) {
        wait_for(session, |e| e.phase() == phase).await;
    }

    async fn status_loaded(link: &MockLink) -> ProvisioningSession<MockLink> {
        let session = session(link);
        session
            .handle(SessionEvent::SelectDevice("dev".into()))
            .await
            .unwrap();
        wait_for_phase(&session, ProvisioningPhase::StatusLoaded).await;
        session
    }

    fn scanned(ssid: &str, auth_mode: AuthMode, channel: u32, rssi: i32) -> DataFrame {
        DataFrame {
            scan_record: Some(ScanRecord {
                wifi_info: Some(WifiInfo {
                    channel,
                    ..WifiInfo::new(ssid, Some(auth_mode)).unwrap()
                }),
                rssi: Some(rssi),
            }),
            state: None,
        }
    }

    fn state(state: WifiConnectionState) -> DataFrame {
        DataFrame {
            scan_record: None,
            state: Some(state),
        }
    }

    fn home() -> WifiData {
        WifiData::new("Home", Some(AuthMode::Wpa2Psk))
    }

    #[tokio::test]
    async fn test_select_device_reads_version_then_status() {
        let link = MockLink::new();
        link.set_version(Version(3)).await;
        let session = status_loaded(&link).await;

        let entity = session.entity();
        assert_eq!(entity.device.as_deref(), Some("dev"));
        assert_eq!(entity.link_status, LinkStatus::Connected);
        assert_eq!(entity.version, Some(Resource::Success(Version(3))));
        assert_eq!(link.sent_ops().await, vec![OpCode::GetStatus]);
    }

    #[tokio::test]
    async fn test_version_failure_skips_status() {
        let link = MockLink::new();
        link.fail_version(TransportError::Ble("read failed".into()))
            .await;
        let session = session(&link);

        session
            .handle(SessionEvent::SelectDevice("dev".into()))
            .await
            .unwrap();
        let entity = wait_for(&session, |e| e.version.as_ref().is_some_and(Resource::is_error)).await;

        assert_eq!(entity.status, None);
        assert_eq!(entity.phase(), ProvisioningPhase::DeviceSelected);
        assert!(link.sent_ops().await.is_empty());
    }

    #[tokio::test]
    async fn test_connect_failure_reported() {
        let link = MockLink::new();
        link.set_connect_failure(Some(TransportError::Ble("no such device".into())))
            .await;
        let session = session(&link);

        session
            .handle(SessionEvent::SelectDevice("dev".into()))
            .await
            .unwrap();
        let entity = wait_for(&session, |e| e.version.as_ref().is_some_and(Resource::is_error)).await;
        assert_eq!(entity.link_status, LinkStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_scan_requires_status() {
        let link = MockLink::new();
        let session = session(&link);
        assert_eq!(
            session.handle(SessionEvent::StartWifiScan).await,
            Err(SessionError::StatusNotLoaded)
        );
    }

    #[tokio::test]
    async fn test_scan_results_aggregated() {
        let link = MockLink::new();
        link.queue_frames(
            OpCode::StartScan,
            vec![
                scanned("Home", AuthMode::Wpa2Psk, 1, -70),
                scanned("Office", AuthMode::Wpa2Psk, 6, -50),
                scanned("Home", AuthMode::Wpa2Psk, 36, -40),
            ],
        )
        .await;
        let session = status_loaded(&link).await;

        session.handle(SessionEvent::StartWifiScan).await.unwrap();
        let entity = wait_for(&session, |e| {
            e.scan_results
                .as_ref()
                .and_then(Resource::data)
                .is_some_and(|groups| groups.iter().map(|g| g.members.len()).sum::<usize>() == 3)
        })
        .await;

        let groups = entity.scan_results.unwrap();
        let groups = groups.data().unwrap();
        assert_eq!(groups[0].ssid, b"Home");
        assert_eq!(groups[0].channels(), vec![36, 1]);

        session.handle(SessionEvent::StopWifiScan).await.unwrap();
        assert_eq!(
            link.sent_ops().await,
            vec![OpCode::GetStatus, OpCode::StartScan, OpCode::StopScan]
        );
    }

    #[tokio::test]
    async fn test_no_scan_update_after_cancel() {
        let link = MockLink::new();
        let session = status_loaded(&link).await;

        session.handle(SessionEvent::StartWifiScan).await.unwrap();
        while link.data_subscribers().await == 0 {
            sleep(Duration::from_millis(5)).await;
        }

        session.handle(SessionEvent::StopWifiScan).await.unwrap();
        let before = session.entity().scan_results;
        link.push_frame(&scanned("Late", AuthMode::Open, 1, -30))
            .await;
        sleep(Duration::from_millis(50)).await;

        assert_eq!(session.entity().scan_results, before);
        assert_eq!(link.data_subscribers().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_device_during_scan_drops_late_records() {
        let link = MockLink::new();
        link.queue_frames(
            OpCode::StartScan,
            vec![scanned("Home", AuthMode::Wpa2Psk, 6, -60)],
        )
        .await;
        let session = status_loaded(&link).await;

        session.handle(SessionEvent::StartWifiScan).await.unwrap();
        wait_for(&session, |e| {
            e.scan_results
                .as_ref()
                .and_then(Resource::data)
                .is_some_and(|groups| !groups.is_empty())
        })
        .await;

        session
            .handle(SessionEvent::SelectDevice("other".into()))
            .await
            .unwrap();
        wait_for(&session, |e| {
            e.device.as_deref() == Some("other") && e.phase() == ProvisioningPhase::StatusLoaded
        })
        .await;

        link.push_frame(&scanned("Late", AuthMode::Open, 1, -30))
            .await;
        sleep(Duration::from_millis(50)).await;

        let entity = session.entity();
        assert_eq!(entity.device.as_deref(), Some("other"));
        assert_eq!(entity.scan_results, None);
        assert!(link.sent_ops().await.contains(&OpCode::StopScan));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reselect_during_connect_keeps_one_connection() {
        let link = MockLink::new();
        link.set_connect_delay(Some(Duration::from_millis(100))).await;
        let session = session(&link);

        session
            .handle(SessionEvent::SelectDevice("first".into()))
            .await
            .unwrap();
        sleep(Duration::from_millis(10)).await;
        session
            .handle(SessionEvent::SelectDevice("second".into()))
            .await
            .unwrap();

        wait_for(&session, |e| {
            e.device.as_deref() == Some("second") && e.phase() == ProvisioningPhase::StatusLoaded
        })
        .await;
        assert_eq!(link.connected_devices().await, vec!["second".to_owned()]);
    }

    #[tokio::test]
    async fn test_provision_validation() {
        let link = MockLink::new();
        let session = status_loaded(&link).await;

        assert_eq!(
            session.handle(SessionEvent::Provision).await,
            Err(SessionError::NoNetworkSelected)
        );

        session
            .handle(SessionEvent::SelectNetwork(home()))
            .await
            .unwrap();
        assert_eq!(session.phase(), ProvisioningPhase::PasswordPending);
        assert_eq!(
            session.handle(SessionEvent::Provision).await,
            Err(SessionError::PasswordRequired)
        );

        session
            .handle(SessionEvent::SetPassword("x".repeat(65)))
            .await
            .unwrap();
        assert!(matches!(
            session.handle(SessionEvent::Provision).await,
            Err(SessionError::Validation(_))
        ));
        assert!(link.sent_configs().await.is_empty());
    }

    #[tokio::test]
    async fn test_provision_success_remembers_password() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(
            PasswordCache::open(dir.path().join("passwords.json"))
                .await
                .unwrap(),
        );
        let link = MockLink::new();
        link.queue_frames(
            OpCode::SetConfig,
            vec![
                state(WifiConnectionState::Authentication),
                state(WifiConnectionState::ObtainingIp),
                state(WifiConnectionState::Connected),
            ],
        )
        .await;
        let session = status_loaded(&link).await.with_password_cache(cache.clone());

        session
            .handle(SessionEvent::SelectNetwork(home()))
            .await
            .unwrap();
        session
            .handle(SessionEvent::SetPassword("secret123".into()))
            .await
            .unwrap();
        assert_eq!(session.phase(), ProvisioningPhase::NetworkSelected);
        session.handle(SessionEvent::Provision).await.unwrap();

        wait_for_phase(&session, ProvisioningPhase::ProvisionedSuccess).await;
        assert!(session.entity().is_provisioning_success());

        let configs = link.sent_configs().await;
        assert_eq!(configs.len(), 1);
        assert!(configs[0].any_channel);
        assert!(!configs[0].volatile_memory);
        assert_eq!(configs[0].passphrase.as_deref(), Some(&b"secret123"[..]));
        assert_eq!(cache.get(b"Home").await.as_deref(), Some("secret123"));
    }

    #[tokio::test]
    async fn test_cached_password_prefilled() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(
            PasswordCache::open(dir.path().join("passwords.json"))
                .await
                .unwrap(),
        );
        cache.store(b"Home", "remembered").await.unwrap();
        let link = MockLink::new();
        let session = status_loaded(&link).await.with_password_cache(cache);

        session
            .handle(SessionEvent::SelectNetwork(home()))
            .await
            .unwrap();
        assert_eq!(session.entity().password.as_deref(), Some("remembered"));
        assert_eq!(session.phase(), ProvisioningPhase::NetworkSelected);
    }

    #[tokio::test]
    async fn test_provision_failure_and_volatile_config() {
        let link = MockLink::new();
        link.queue_frames(
            OpCode::SetConfig,
            vec![state(WifiConnectionState::ConnectionFailed(
                FailureReason::AuthError,
            ))],
        )
        .await;
        let session = status_loaded(&link).await;

        session
            .handle(SessionEvent::SelectNetwork(home()))
            .await
            .unwrap();
        session
            .handle(SessionEvent::SetPassword("wrong-password".into()))
            .await
            .unwrap();
        session
            .handle(SessionEvent::SetPersistToFlash(false))
            .await
            .unwrap();
        session.handle(SessionEvent::Provision).await.unwrap();

        wait_for_phase(&session, ProvisioningPhase::ProvisionedFailure).await;
        assert!(session.entity().is_provisioning_failure());
        assert!(link.sent_configs().await[0].volatile_memory);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_not_found_is_final() {
        let link = MockLink::new();
        link.queue_frames(
            OpCode::SetConfig,
            vec![
                state(WifiConnectionState::Authentication),
                state(WifiConnectionState::ConnectionFailed(
                    FailureReason::NetworkNotFound,
                )),
            ],
        )
        .await;
        let session = status_loaded(&link).await;

        session
            .handle(SessionEvent::SelectNetwork(home()))
            .await
            .unwrap();
        session
            .handle(SessionEvent::SetPassword("secret123".into()))
            .await
            .unwrap();
        session.handle(SessionEvent::Provision).await.unwrap();

        wait_for_phase(&session, ProvisioningPhase::ProvisionedFailure).await;
        sleep(Duration::from_millis(50)).await;

        let entity = session.entity();
        assert_eq!(
            entity.provisioning_result,
            Some(Resource::Success(WifiConnectionState::ConnectionFailed(
                FailureReason::NetworkNotFound
            )))
        );
        assert_eq!(entity.phase(), ProvisioningPhase::ProvisionedFailure);
        assert_eq!(link.sent_configs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_open_network_pinned_channel() {
        let link = MockLink::new();
        link.queue_frames(
            OpCode::SetConfig,
            vec![state(WifiConnectionState::Connected)],
        )
        .await;
        let session = status_loaded(&link).await;

        let record = scanned("Cafe", AuthMode::Open, 11, -60).scan_record.unwrap();
        let network = WifiData::from_record(&record).unwrap();
        session
            .handle(SessionEvent::SelectNetwork(network))
            .await
            .unwrap();
        assert_eq!(session.phase(), ProvisioningPhase::NetworkSelected);
        session.handle(SessionEvent::Provision).await.unwrap();

        wait_for_phase(&session, ProvisioningPhase::ProvisionedSuccess).await;
        let config = &link.sent_configs().await[0];
        assert_eq!(config.passphrase, None);
        assert!(!config.any_channel);
        assert_eq!(config.info.channel, 11);
    }

    #[tokio::test]
    async fn test_link_loss_during_provisioning() {
        let link = MockLink::new();
        link.queue_frames(
            OpCode::SetConfig,
            vec![state(WifiConnectionState::Association)],
        )
        .await;
        let session = status_loaded(&link).await;
        session
            .handle(SessionEvent::SelectNetwork(home()))
            .await
            .unwrap();
        session
            .handle(SessionEvent::SetPassword("secret123".into()))
            .await
            .unwrap();
        session.handle(SessionEvent::Provision).await.unwrap();
        wait_for(&session, |e| {
            e.provisioning_result == Some(Resource::Success(WifiConnectionState::Association))
        })
        .await;
        assert_eq!(session.phase(), ProvisioningPhase::Provisioning);

        link.set_link_status(LinkStatus::Disconnected).await;
        let entity = wait_for(&session, |e| {
            e.is_provisioning_failure() && e.link_status == LinkStatus::Disconnected
        })
        .await;

        assert_eq!(
            entity.provisioning_result,
            Some(Resource::Error(ProvisionError::Transport(
                TransportError::DeviceDisconnected
            )))
        );
        assert_eq!(entity.link_status, LinkStatus::Disconnected);
        assert_eq!(entity.phase(), ProvisioningPhase::ProvisionedFailure);
    }

    #[tokio::test]
    async fn test_unprovision_reloads_status() {
        let link = MockLink::new();
        let session = status_loaded(&link).await;
        session
            .handle(SessionEvent::SelectNetwork(home()))
            .await
            .unwrap();

        session.handle(SessionEvent::Unprovision).await.unwrap();
        let entity = wait_for(&session, |e| {
            e.unprovisioning_result.as_ref().is_some_and(Resource::is_success)
                && e.status_loaded()
        })
        .await;

        assert_eq!(entity.network, None);
        assert_eq!(entity.password, None);
        assert_eq!(entity.phase(), ProvisioningPhase::StatusLoaded);
        assert_eq!(
            link.sent_ops().await,
            vec![OpCode::GetStatus, OpCode::ForgetConfig, OpCode::GetStatus]
        );
    }

    #[tokio::test]
    async fn test_next_device_resets_after_release() {
        let link = MockLink::new();
        link.set_release_failure(true).await;
        let session = status_loaded(&link).await;
        let releases = link.release_count().await;

        session.handle(SessionEvent::NextDevice).await.unwrap();

        assert_eq!(link.release_count().await, releases + 1);
        assert_eq!(session.phase(), ProvisioningPhase::Idle);
        assert_eq!(session.entity(), SessionEntity::default());

        link.set_release_failure(false).await;
        session
            .handle(SessionEvent::SelectDevice("other".into()))
            .await
            .unwrap();
        wait_for_phase(&session, ProvisioningPhase::StatusLoaded).await;
    }

    #[tokio::test]
    async fn test_finish_rejects_further_events() {
        let link = MockLink::new();
        let session = status_loaded(&link).await;

        session.handle(SessionEvent::Finish).await.unwrap();
        assert_eq!(session.phase(), ProvisioningPhase::Finished);
        assert!(!link.is_connected().await);

        assert_eq!(
            session.handle(SessionEvent::StartWifiScan).await,
            Err(SessionError::Finished)
        );
        session.handle(SessionEvent::OpenLogger).await.unwrap();
        assert!(session.entity().logger_open);
    }

    #[tokio::test]
    async fn test_drop_releases_device() {
        let link = MockLink::new();
        let session = status_loaded(&link).await;
        drop(session);

        timeout(Duration::from_secs(2), async {
            while link.is_connected().await {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}
