//! Provisioning over the device's SoftAP REST interface

use std::{path::PathBuf, time::Duration};

use reqwest::{StatusCode, Url, header::CONTENT_TYPE};
use tracing::{debug, info};

use crate::{
    core::{
        aggregator::ScanAggregator,
        error::{ProvisionError, ProvisionResult, ResponseCode, TransportError, TransportResult},
        types::{DeviceStatus, ScanRecord, ScanRecordGroup, WifiConfig},
    },
    protocol::codec,
};

/// Address of the device while it hosts its access point
pub const DEFAULT_SOFTAP_URL: &str = "https://192.0.2.1/";

const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

/// SoftAP client configuration
#[derive(Debug, Clone)]
pub struct SoftApConfig {
    pub base_url: String,
    /// PEM certificate pinned as the only trusted root
    pub certificate: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for SoftApConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SOFTAP_URL.into(),
            certificate: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP client for the `prov/` endpoints
#[derive(Debug, Clone)]
pub struct SoftApClient {
    http: reqwest::Client,
    base_url: Url,
}

impl SoftApClient {
    /// Build the HTTP client; a pinned certificate replaces the built-in roots
    pub fn new(config: &SoftApConfig) -> TransportResult<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout);

        if let Some(path) = &config.certificate {
            let pem = std::fs::read(path)?;
            let certificate = reqwest::Certificate::from_pem(&pem)?;
            builder = builder
                .tls_built_in_root_certs(false)
                .add_root_certificate(certificate);
        }

        let mut base_url = config.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url)
            .map_err(|e| TransportError::Http(format!("invalid base URL {base_url}: {e}")))?;

        Ok(Self {
            http: builder.build()?,
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> ProvisionResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| TransportError::Http(e.to_string()).into())
    }

    async fn check(response: reqwest::Response) -> ProvisionResult<Vec<u8>> {
        let status = response.status();
        debug!(%status, url = %response.url(), "SoftAP response");
        match status {
            s if s.is_success() => Ok(response
                .bytes()
                .await
                .map_err(TransportError::from)?
                .to_vec()),
            StatusCode::BAD_REQUEST => Err(ProvisionError::Response(ResponseCode::InvalidArgument)),
            s => Err(TransportError::Http(format!("unexpected status {s}")).into()),
        }
    }

    /// Networks visible to the device
    pub async fn scan(&self) -> ProvisionResult<Vec<ScanRecord>> {
        let response = self
            .http
            .get(self.endpoint("prov/networks")?)
            .send()
            .await
            .map_err(TransportError::from)?;
        let records = codec::decode_scan_results(&Self::check(response).await?)?;
        info!("SoftAP scan returned {} records", records.len());
        Ok(records)
    }

    /// Scan and group the records by SSID
    pub async fn scan_groups(&self) -> ProvisionResult<Vec<ScanRecordGroup>> {
        let mut aggregator = ScanAggregator::new();
        for record in self.scan().await? {
            aggregator.push(record);
        }
        Ok(aggregator.into_groups())
    }

    /// Status of the device as served on its access point
    pub async fn status(&self) -> ProvisionResult<DeviceStatus> {
        let response = self
            .http
            .get(self.endpoint("prov/status")?)
            .send()
            .await
            .map_err(TransportError::from)?;
        Ok(codec::decode_device_status(&Self::check(response).await?)?)
    }

    /// Send credentials; the device leaves SoftAP mode once accepted
    pub async fn set_config(&self, config: &WifiConfig) -> ProvisionResult<()> {
        info!(ssid = %config.info.ssid_lossy(), "Sending configuration over SoftAP");
        let response = self
            .http
            .post(self.endpoint("prov/configure")?)
            .header(CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)
            .body(codec::encode_wifi_config(config))
            .send()
            .await
            .map_err(TransportError::from)?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::SocketAddr,
        sync::{Arc, Mutex},
    };

    use axum::{
        Router,
        body::Bytes,
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::{get, post},
    };
    use pretty_assertions::assert_eq;
    use tokio::net::TcpListener;

    use super::*;
    use crate::core::types::{AuthMode, WifiConnectionState, WifiInfo};

    #[derive(Clone, Default)]
    struct Captured {
        body: Arc<Mutex<Option<(Option<String>, Vec<u8>)>>>,
    }

    fn records() -> Vec<ScanRecord> {
        let network = |ssid: &str, channel, rssi| ScanRecord {
            wifi_info: Some(WifiInfo {
                channel,
                ..WifiInfo::new(ssid, Some(AuthMode::Wpa2Psk)).unwrap()
            }),
            rssi: Some(rssi),
        };
        vec![
            network("Home", 1, -70),
            network("Home", 36, -45),
            network("Office", 6, -60),
        ]
    }

    async fn serve(captured: Captured) -> SocketAddr {
        let app = Router::new()
            .route(
                "/prov/networks",
                get(|| async { codec::encode_scan_results(&records()) }),
            )
            .route(
                "/prov/status",
                get(|| async {
                    codec::encode_device_status(&DeviceStatus {
                        connection_state: Some(WifiConnectionState::Disconnected),
                        ..Default::default()
                    })
                }),
            )
            .route(
                "/prov/configure",
                post(
                    |State(captured): State<Captured>, headers: HeaderMap, body: Bytes| async move {
                        let content_type = headers
                            .get(CONTENT_TYPE)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_owned);
                        let config = codec::decode_wifi_config(&body);
                        *captured.body.lock().unwrap() = Some((content_type, body.to_vec()));
                        if config.is_ok() {
                            StatusCode::OK
                        } else {
                            StatusCode::BAD_REQUEST
                        }
                    },
                ),
            )
            .with_state(captured);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        addr
    }

    fn client(addr: SocketAddr) -> SoftApClient {
        SoftApClient::new(&SoftApConfig {
            base_url: format!("http://{addr}"),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_scan_and_group() {
        let client = client(serve(Captured::default()).await);

        assert_eq!(client.scan().await.unwrap(), records());

        let groups = client.scan_groups().await.unwrap();
        assert_eq!(groups.len(), 2);
        let home = groups.iter().find(|g| g.ssid == b"Home").unwrap();
        assert_eq!(home.channels(), vec![36, 1]);
    }

    #[tokio::test]
    async fn test_status() {
        let client = client(serve(Captured::default()).await);
        let status = client.status().await.unwrap();
        assert_eq!(
            status.connection_state,
            Some(WifiConnectionState::Disconnected)
        );
        assert!(!status.is_provisioned());
    }

    #[tokio::test]
    async fn test_set_config_posts_protobuf() {
        let captured = Captured::default();
        let client = client(serve(captured.clone()).await);
        let config = WifiConfig::new(
            WifiInfo::new("Home", Some(AuthMode::Wpa2Psk)).unwrap(),
            Some(b"secret123".to_vec()),
            false,
            true,
        )
        .unwrap();

        client.set_config(&config).await.unwrap();

        let (content_type, body) = captured.body.lock().unwrap().clone().unwrap();
        assert_eq!(content_type.as_deref(), Some(PROTOBUF_CONTENT_TYPE));
        assert_eq!(codec::decode_wifi_config(&body).unwrap(), config);
    }

    #[tokio::test]
    async fn test_unreachable_device() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = client(addr).status().await;
        assert!(matches!(
            result,
            Err(ProvisionError::Transport(TransportError::Http(_)))
        ));
    }

    #[test]
    fn test_missing_certificate_file() {
        let result = SoftApClient::new(&SoftApConfig {
            certificate: Some("/nonexistent/device.pem".into()),
            ..Default::default()
        });
        assert!(matches!(result, Err(TransportError::Io(_))));
    }
}
