//! Conversions between wire messages and domain types

use std::net::Ipv4Addr;

use crate::{
    core::{
        error::{CodecError, CodecResult, ResponseCode},
        types::{
            AuthMode, Band, Bssid, ConnectionInfo, DeviceStatus, FailureReason, MAX_PASSPHRASE_LEN,
            MAX_SSID_LEN, ScanParams, ScanRecord, WifiConfig, WifiConnectionState, WifiInfo,
        },
    },
    protocol::wire,
};

fn malformed(message: impl Into<String>) -> CodecError {
    CodecError::MalformedMessage(message.into())
}

impl From<Band> for wire::Band {
    fn from(band: Band) -> Self {
        match band {
            Band::Any => wire::Band::Any,
            Band::Band2_4Ghz => wire::Band::Band2_4Gh,
            Band::Band5Ghz => wire::Band::Band5Gh,
            Band::Band6Ghz => wire::Band::Band6Gh,
        }
    }
}

/// Absent or unknown bands mean "any"
pub(crate) fn band_from_wire(value: Option<i32>) -> Band {
    match value.map(wire::Band::try_from) {
        Some(Ok(wire::Band::Band2_4Gh)) => Band::Band2_4Ghz,
        Some(Ok(wire::Band::Band5Gh)) => Band::Band5Ghz,
        Some(Ok(wire::Band::Band6Gh)) => Band::Band6Ghz,
        _ => Band::Any,
    }
}

impl From<AuthMode> for wire::AuthMode {
    fn from(mode: AuthMode) -> Self {
        match mode {
            AuthMode::Open => wire::AuthMode::Open,
            AuthMode::Wep => wire::AuthMode::Wep,
            AuthMode::WpaPsk => wire::AuthMode::WpaPsk,
            AuthMode::Wpa2Psk => wire::AuthMode::Wpa2Psk,
            AuthMode::WpaWpa2Psk => wire::AuthMode::WpaWpa2Psk,
            AuthMode::Wpa2Enterprise => wire::AuthMode::Wpa2Enterprise,
            AuthMode::Wpa3Psk => wire::AuthMode::Wpa3Psk,
        }
    }
}

impl From<wire::AuthMode> for AuthMode {
    fn from(mode: wire::AuthMode) -> Self {
        match mode {
            wire::AuthMode::Open => AuthMode::Open,
            wire::AuthMode::Wep => AuthMode::Wep,
            wire::AuthMode::WpaPsk => AuthMode::WpaPsk,
            wire::AuthMode::Wpa2Psk => AuthMode::Wpa2Psk,
            wire::AuthMode::WpaWpa2Psk => AuthMode::WpaWpa2Psk,
            wire::AuthMode::Wpa2Enterprise => AuthMode::Wpa2Enterprise,
            wire::AuthMode::Wpa3Psk => AuthMode::Wpa3Psk,
        }
    }
}

fn auth_mode_from_wire(value: Option<i32>) -> Option<AuthMode> {
    value
        .and_then(|v| wire::AuthMode::try_from(v).ok())
        .map(AuthMode::from)
}

fn reason_from_wire(value: Option<i32>) -> FailureReason {
    match value.map(wire::ConnectionFailureReason::try_from) {
        Some(Ok(wire::ConnectionFailureReason::AuthError)) => FailureReason::AuthError,
        Some(Ok(wire::ConnectionFailureReason::NetworkNotFound)) => FailureReason::NetworkNotFound,
        Some(Ok(wire::ConnectionFailureReason::Timeout)) => FailureReason::Timeout,
        Some(Ok(wire::ConnectionFailureReason::FailIp)) => FailureReason::FailIp,
        Some(Ok(wire::ConnectionFailureReason::FailConn)) => FailureReason::FailConn,
        _ => FailureReason::Unknown,
    }
}

fn reason_to_wire(reason: FailureReason) -> Option<i32> {
    let reason = match reason {
        FailureReason::AuthError => wire::ConnectionFailureReason::AuthError,
        FailureReason::NetworkNotFound => wire::ConnectionFailureReason::NetworkNotFound,
        FailureReason::Timeout => wire::ConnectionFailureReason::Timeout,
        FailureReason::FailIp => wire::ConnectionFailureReason::FailIp,
        FailureReason::FailConn => wire::ConnectionFailureReason::FailConn,
        FailureReason::Unknown => return None,
    };
    Some(reason as i32)
}

/// Combine the wire state and failure reason; unknown states decode as `None`
pub(crate) fn connection_state_from_wire(
    state: Option<i32>,
    reason: Option<i32>,
) -> Option<WifiConnectionState> {
    let state = wire::ConnectionState::try_from(state?).ok()?;
    Some(match state {
        wire::ConnectionState::Disconnected => WifiConnectionState::Disconnected,
        wire::ConnectionState::Authentication => WifiConnectionState::Authentication,
        wire::ConnectionState::Association => WifiConnectionState::Association,
        wire::ConnectionState::ObtainingIp => WifiConnectionState::ObtainingIp,
        wire::ConnectionState::Connected => WifiConnectionState::Connected,
        wire::ConnectionState::ConnectionFailed => {
            WifiConnectionState::ConnectionFailed(reason_from_wire(reason))
        }
    })
}

/// Split a state into wire state and optional reason
pub(crate) fn connection_state_to_wire(state: WifiConnectionState) -> (i32, Option<i32>) {
    let (state, reason) = match state {
        WifiConnectionState::Disconnected => (wire::ConnectionState::Disconnected, None),
        WifiConnectionState::Authentication => (wire::ConnectionState::Authentication, None),
        WifiConnectionState::Association => (wire::ConnectionState::Association, None),
        WifiConnectionState::ObtainingIp => (wire::ConnectionState::ObtainingIp, None),
        WifiConnectionState::Connected => (wire::ConnectionState::Connected, None),
        WifiConnectionState::ConnectionFailed(reason) => (
            wire::ConnectionState::ConnectionFailed,
            reason_to_wire(reason),
        ),
    };
    (state as i32, reason)
}

/// Status codes of a command response; absent means the proto2 default
pub(crate) fn status_from_wire(value: Option<i32>) -> Result<(), ResponseCode> {
    match value.map(wire::Status::try_from) {
        None | Some(Ok(wire::Status::Success)) => Ok(()),
        Some(Ok(wire::Status::InvalidArgument)) => Err(ResponseCode::InvalidArgument),
        Some(Ok(wire::Status::InvalidProto)) => Err(ResponseCode::InvalidProto),
        Some(Ok(wire::Status::InternalError)) | Some(Err(_)) => Err(ResponseCode::InternalError),
    }
}

impl From<&WifiInfo> for wire::WifiInfo {
    fn from(info: &WifiInfo) -> Self {
        Self {
            ssid: Some(info.ssid.clone()),
            bssid: info.bssid.map(|b| b.0.to_vec()),
            band: Some(wire::Band::from(info.band) as i32),
            channel: Some(info.channel),
            auth: info.auth_mode.map(|m| wire::AuthMode::from(m) as i32),
        }
    }
}

impl TryFrom<wire::WifiInfo> for WifiInfo {
    type Error = CodecError;

    fn try_from(msg: wire::WifiInfo) -> CodecResult<Self> {
        let ssid = msg.ssid.unwrap_or_default();
        if ssid.len() > MAX_SSID_LEN {
            return Err(malformed(format!("SSID of {} bytes", ssid.len())));
        }

        let bssid = match msg.bssid {
            None => None,
            Some(bytes) if bytes.is_empty() => None,
            Some(bytes) => {
                let mac: [u8; 6] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| malformed(format!("BSSID of {} bytes", bytes.len())))?;
                Some(Bssid(mac))
            }
        };

        Ok(Self {
            ssid,
            bssid,
            band: band_from_wire(msg.band),
            channel: msg.channel.unwrap_or_default(),
            auth_mode: auth_mode_from_wire(msg.auth),
        })
    }
}

impl From<&WifiConfig> for wire::WifiConfig {
    fn from(config: &WifiConfig) -> Self {
        Self {
            wifi: Some(wire::WifiInfo::from(&config.info)),
            passphrase: config.passphrase.clone(),
            volatile_memory: Some(config.volatile_memory),
            any_channel: Some(config.any_channel),
        }
    }
}

impl TryFrom<wire::WifiConfig> for WifiConfig {
    type Error = CodecError;

    fn try_from(msg: wire::WifiConfig) -> CodecResult<Self> {
        let info = msg
            .wifi
            .ok_or_else(|| malformed("WifiConfig without network info"))?;
        if let Some(passphrase) = &msg.passphrase {
            if passphrase.len() > MAX_PASSPHRASE_LEN {
                return Err(malformed(format!(
                    "passphrase of {} bytes",
                    passphrase.len()
                )));
            }
        }

        Ok(Self {
            info: WifiInfo::try_from(info)?,
            passphrase: msg.passphrase,
            volatile_memory: msg.volatile_memory.unwrap_or_default(),
            any_channel: msg.any_channel.unwrap_or_default(),
        })
    }
}

impl From<&ScanParams> for wire::ScanParams {
    fn from(params: &ScanParams) -> Self {
        Self {
            band: Some(wire::Band::from(params.band) as i32),
            passive: Some(params.passive),
            period_ms: Some(params.period_ms),
            group_channels: Some(params.group_channels),
        }
    }
}

impl From<wire::ScanParams> for ScanParams {
    fn from(msg: wire::ScanParams) -> Self {
        Self {
            band: band_from_wire(msg.band),
            passive: msg.passive.unwrap_or_default(),
            period_ms: msg.period_ms.unwrap_or_default(),
            group_channels: msg.group_channels.unwrap_or_default(),
        }
    }
}

impl From<&ScanRecord> for wire::ScanRecord {
    fn from(record: &ScanRecord) -> Self {
        Self {
            wifi: record.wifi_info.as_ref().map(wire::WifiInfo::from),
            rssi: record.rssi,
        }
    }
}

impl TryFrom<wire::ScanRecord> for ScanRecord {
    type Error = CodecError;

    fn try_from(msg: wire::ScanRecord) -> CodecResult<Self> {
        Ok(Self {
            wifi_info: msg.wifi.map(WifiInfo::try_from).transpose()?,
            rssi: msg.rssi,
        })
    }
}

impl From<&DeviceStatus> for wire::DeviceStatus {
    fn from(status: &DeviceStatus) -> Self {
        let (state, reason) = match status.connection_state.map(connection_state_to_wire) {
            Some((state, reason)) => (Some(state), reason),
            None => (None, None),
        };

        Self {
            state,
            reason,
            provisioning_info: status.provisioning_info.as_ref().map(wire::WifiInfo::from),
            connection_info: status.connection_info.map(|info| wire::ConnectionInfo {
                ip4_addr: Some(info.ipv4.octets().to_vec()),
            }),
            scan_info: status.scan_params.as_ref().map(wire::ScanParams::from),
        }
    }
}

impl TryFrom<wire::DeviceStatus> for DeviceStatus {
    type Error = CodecError;

    fn try_from(msg: wire::DeviceStatus) -> CodecResult<Self> {
        let connection_info = match msg.connection_info.and_then(|info| info.ip4_addr) {
            None => None,
            Some(bytes) => {
                let octets: [u8; 4] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| malformed(format!("IPv4 address of {} bytes", bytes.len())))?;
                Some(ConnectionInfo {
                    ipv4: Ipv4Addr::from(octets),
                })
            }
        };

        Ok(Self {
            connection_state: connection_state_from_wire(msg.state, msg.reason),
            provisioning_info: msg.provisioning_info.map(WifiInfo::try_from).transpose()?,
            connection_info,
            scan_params: msg.scan_info.map(ScanParams::from),
        })
    }
}
