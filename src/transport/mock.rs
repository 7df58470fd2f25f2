//! Scripted provisioning link for testing
//!
//! Plays the device side of the control point: requests are decoded,
//! recorded and answered from a per-op-code reply table. Data frames can be
//! queued behind a command or pushed at any time.

use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::{StreamExt, stream::BoxStream};
use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    core::{
        error::{TransportError, TransportResult},
        types::{DeviceStatus, LinkStatus, Version, WifiConfig},
    },
    protocol::{
        DataFrame, OpCode,
        codec::{self, encode_data_frame},
        wire::Status,
    },
    transport::link::ProvisioningLink,
};

/// Deadline after which an unanswered command fails
pub const MOCK_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// How the mock answers one op code
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Respond with a status and optional device status
    Respond(Status, Option<DeviceStatus>),
    /// Never respond; the command runs into its deadline
    Timeout,
    /// Fail the write itself
    Fail(TransportError),
}

#[derive(Debug)]
struct MockState {
    connected: bool,
    /// Devices connected and not yet released, oldest first
    connected_devices: Vec<String>,
    connect_delay: Option<Duration>,
    connect_failure: Option<TransportError>,
    release_failure: bool,
    version: TransportResult<Version>,
    replies: HashMap<OpCode, MockReply>,
    queued_frames: HashMap<OpCode, Vec<DataFrame>>,
    sent_ops: Vec<OpCode>,
    sent_configs: Vec<WifiConfig>,
    status_tx: Option<mpsc::UnboundedSender<LinkStatus>>,
    data_txs: Vec<mpsc::UnboundedSender<Vec<u8>>>,
    release_count: usize,
}

/// Mock provisioning link
///
/// Cloning shares the scripted state, so a test keeps one handle while the
/// client owns another.
#[derive(Debug, Clone)]
pub struct MockLink {
    inner: Arc<Mutex<MockState>>,
}

impl MockLink {
    /// Create a mock answering every command with `Success`
    pub fn new() -> Self {
        let mut replies = HashMap::new();
        replies.insert(
            OpCode::GetStatus,
            MockReply::Respond(Status::Success, Some(DeviceStatus::default())),
        );

        Self {
            inner: Arc::new(Mutex::new(MockState {
                connected: false,
                connected_devices: vec![],
                connect_delay: None,
                connect_failure: None,
                release_failure: false,
                version: Ok(Version(1)),
                replies,
                queued_frames: HashMap::new(),
                sent_ops: vec![],
                sent_configs: vec![],
                status_tx: None,
                data_txs: vec![],
                release_count: 0,
            })),
        }
    }

    pub async fn set_version(&self, version: Version) {
        self.inner.lock().await.version = Ok(version);
    }

    pub async fn fail_version(&self, error: TransportError) {
        self.inner.lock().await.version = Err(error);
    }

    /// Device status answered to `GetStatus`
    pub async fn set_status(&self, status: DeviceStatus) {
        self.set_reply(
            OpCode::GetStatus,
            MockReply::Respond(Status::Success, Some(status)),
        )
        .await;
    }

    pub async fn set_reply(&self, op_code: OpCode, reply: MockReply) {
        self.inner.lock().await.replies.insert(op_code, reply);
    }

    /// Emit `frames` on the data line right after answering `op_code`
    pub async fn queue_frames(&self, op_code: OpCode, frames: Vec<DataFrame>) {
        self.inner.lock().await.queued_frames.insert(op_code, frames);
    }

    /// Make every connect take `delay` before it completes
    pub async fn set_connect_delay(&self, delay: Option<Duration>) {
        self.inner.lock().await.connect_delay = delay;
    }

    pub async fn set_connect_failure(&self, error: Option<TransportError>) {
        self.inner.lock().await.connect_failure = error;
    }

    pub async fn set_release_failure(&self, should_fail: bool) {
        self.inner.lock().await.release_failure = should_fail;
    }

    /// Push one frame to every open data stream
    pub async fn push_frame(&self, frame: &DataFrame) {
        let bytes = encode_data_frame(frame);
        let mut state = self.inner.lock().await;
        state.data_txs.retain(|tx| tx.send(bytes.clone()).is_ok());
    }

    /// Simulate a link change; `Disconnected` also closes the data line
    pub async fn set_link_status(&self, status: LinkStatus) {
        let mut state = self.inner.lock().await;
        if let Some(tx) = &state.status_tx {
            let _ = tx.send(status);
        }
        if status == LinkStatus::Disconnected {
            state.connected = false;
            state.data_txs.clear();
        }
    }

    /// Op codes received so far, in order
    pub async fn sent_ops(&self) -> Vec<OpCode> {
        self.inner.lock().await.sent_ops.clone()
    }

    /// Configs received with `SetConfig`
    pub async fn sent_configs(&self) -> Vec<WifiConfig> {
        self.inner.lock().await.sent_configs.clone()
    }

    pub async fn connected_devices(&self) -> Vec<String> {
        self.inner.lock().await.connected_devices.clone()
    }

    pub async fn release_count(&self) -> usize {
        self.inner.lock().await.release_count
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.connected
    }

    /// Number of data streams still held by a subscriber
    pub async fn data_subscribers(&self) -> usize {
        let mut state = self.inner.lock().await;
        state.data_txs.retain(|tx| !tx.is_closed());
        state.data_txs.len()
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvisioningLink for MockLink {
    type Device = String;

    async fn connect(&self, device: String) -> TransportResult<BoxStream<'static, LinkStatus>> {
        let delay = self.inner.lock().await.connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.inner.lock().await;
        if let Some(error) = state.connect_failure.clone() {
            return Err(error);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(LinkStatus::Connecting);
        let _ = tx.send(LinkStatus::Connected);
        state.status_tx = Some(tx);
        state.connected = true;
        state.connected_devices.push(device);

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn read_version(&self) -> TransportResult<Vec<u8>> {
        let state = self.inner.lock().await;
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        state.version.clone().map(codec::encode_version)
    }

    async fn send_command(&self, payload: Vec<u8>) -> TransportResult<Vec<u8>> {
        let mut state = self.inner.lock().await;
        if !state.connected {
            return Err(TransportError::NotConnected);
        }

        let (op_code, config) = codec::decode_request(&payload)
            .map_err(|e| TransportError::Io(format!("mock device rejected request: {e}")))?;
        state.sent_ops.push(op_code);
        state.sent_configs.extend(config);

        let reply = state
            .replies
            .get(&op_code)
            .cloned()
            .unwrap_or(MockReply::Respond(Status::Success, None));

        match reply {
            MockReply::Respond(status, device_status) => {
                let response = codec::encode_response(op_code, status, device_status.as_ref());
                if let Some(frames) = state.queued_frames.get(&op_code).cloned() {
                    for frame in &frames {
                        let bytes = encode_data_frame(frame);
                        state.data_txs.retain(|tx| tx.send(bytes.clone()).is_ok());
                    }
                }
                Ok(response)
            }
            MockReply::Timeout => {
                drop(state);
                tokio::time::sleep(MOCK_COMMAND_TIMEOUT).await;
                Err(TransportError::CommandTimeout)
            }
            MockReply::Fail(error) => Err(error),
        }
    }

    async fn data_stream(&self) -> TransportResult<BoxStream<'static, Vec<u8>>> {
        let mut state = self.inner.lock().await;
        if !state.connected {
            return Err(TransportError::NotConnected);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.data_txs.push(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn release(&self) -> TransportResult<()> {
        let mut state = self.inner.lock().await;
        state.release_count += 1;
        state.connected = false;
        state.connected_devices.clear();
        if let Some(tx) = state.status_tx.take() {
            let _ = tx.send(LinkStatus::Disconnecting);
        }
        state.data_txs.clear();

        if state.release_failure {
            Err(TransportError::Ble("mock release failure".into()))
        } else {
            Ok(())
        }
    }
}
