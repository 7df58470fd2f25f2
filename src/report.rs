//! Printable views of scan results and device status

use serde::Serialize;

use crate::core::types::{
    DeviceStatus, FailureReason, ScanRecordGroup, Version, WifiConnectionState, WifiInfo,
};

/// One aggregated network as printed by the scan commands
#[derive(Debug, Serialize, PartialEq)]
pub struct NetworkReport {
    pub ssid: String,
    pub auth: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i32>,
    pub channels: Vec<u32>,
}

impl From<&ScanRecordGroup> for NetworkReport {
    fn from(group: &ScanRecordGroup) -> Self {
        Self {
            ssid: group.ssid_lossy(),
            auth: group.auth_mode.to_string(),
            rssi: group.best().and_then(|r| r.rssi),
            channels: group.channels(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct StoredNetworkReport {
    pub ssid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bssid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    pub channel: u32,
}

impl From<&WifiInfo> for StoredNetworkReport {
    fn from(info: &WifiInfo) -> Self {
        Self {
            ssid: info.ssid_lossy(),
            bssid: info.bssid.map(|b| b.to_string()),
            auth: info.auth_mode.map(|m| m.to_string()),
            channel: info.channel,
        }
    }
}

/// Device status as printed by the status commands
#[derive(Debug, Serialize, PartialEq)]
pub struct StatusReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub provisioned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<StoredNetworkReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,
}

impl StatusReport {
    pub fn new(version: Option<Version>, status: &DeviceStatus) -> Self {
        let failure = match status.connection_state {
            Some(WifiConnectionState::ConnectionFailed(reason)) => Some(reason_name(reason)),
            _ => None,
        };

        Self {
            version: version.map(|v| v.0),
            provisioned: status.is_provisioned(),
            network: status.provisioning_info.as_ref().map(Into::into),
            state: status.connection_state.map(state_name),
            failure,
            ipv4: status.connection_info.map(|c| c.ipv4.to_string()),
        }
    }
}

fn state_name(state: WifiConnectionState) -> &'static str {
    match state {
        WifiConnectionState::Disconnected => "disconnected",
        WifiConnectionState::Authentication => "authentication",
        WifiConnectionState::Association => "association",
        WifiConnectionState::ObtainingIp => "obtaining_ip",
        WifiConnectionState::Connected => "connected",
        WifiConnectionState::ConnectionFailed(_) => "connection_failed",
    }
}

fn reason_name(reason: FailureReason) -> &'static str {
    match reason {
        FailureReason::AuthError => "auth_error",
        FailureReason::NetworkNotFound => "network_not_found",
        FailureReason::Timeout => "timeout",
        FailureReason::FailIp => "fail_ip",
        FailureReason::FailConn => "fail_conn",
        FailureReason::Unknown => "unknown",
    }
}

pub fn render_networks(groups: &[ScanRecordGroup], json: bool) -> serde_json::Result<String> {
    let reports: Vec<NetworkReport> = groups.iter().map(Into::into).collect();
    if json {
        return serde_json::to_string_pretty(&reports);
    }

    Ok(reports
        .iter()
        .map(|r| {
            format!(
                "{:<32}  {:<16}  {:>4} dBm  channels {:?}",
                r.ssid,
                r.auth,
                r.rssi.map(|v| v.to_string()).unwrap_or_else(|| "?".into()),
                r.channels
            )
        })
        .collect::<Vec<_>>()
        .join("\n"))
}

pub fn render_status(report: &StatusReport, json: bool) -> serde_json::Result<String> {
    if json {
        return serde_json::to_string_pretty(report);
    }

    let mut lines = Vec::new();
    if let Some(version) = report.version {
        lines.push(format!("Protocol version: {version}"));
    }
    lines.push(match &report.network {
        Some(network) => format!(
            "Provisioned: {} ({}, channel {})",
            network.ssid,
            network.auth.as_deref().unwrap_or("unknown auth"),
            network.channel
        ),
        None => "Provisioned: no".to_owned(),
    });
    if let Some(state) = report.state {
        match report.failure {
            Some(reason) => lines.push(format!("Wi-Fi state: {state} ({reason})")),
            None => lines.push(format!("Wi-Fi state: {state}")),
        }
    }
    if let Some(ipv4) = &report.ipv4 {
        lines.push(format!("IPv4 address: {ipv4}"));
    }
    Ok(lines.join("\n"))
}
