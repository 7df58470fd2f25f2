//! Domain types for Wi-Fi provisioning

use std::{fmt, net::Ipv4Addr};

use crate::core::error::{ValidationError, ValidationResult};

/// Maximum SSID length per IEEE 802.11
pub const MAX_SSID_LEN: usize = 32;

/// Maximum WPA passphrase length
pub const MAX_PASSPHRASE_LEN: usize = 64;

/// Radio band of a network or scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Band {
    #[default]
    Any,
    Band2_4Ghz,
    Band5Ghz,
    Band6Ghz,
}

/// Authentication mode advertised by an access point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMode {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    Wpa2Enterprise,
    Wpa3Psk,
}

impl AuthMode {
    /// Whether joining a network with this mode needs a passphrase
    pub fn requires_password(self) -> bool {
        self != AuthMode::Open
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthMode::Open => "Open",
            AuthMode::Wep => "WEP",
            AuthMode::WpaPsk => "WPA-PSK",
            AuthMode::Wpa2Psk => "WPA2-PSK",
            AuthMode::WpaWpa2Psk => "WPA/WPA2-PSK",
            AuthMode::Wpa2Enterprise => "WPA2-Enterprise",
            AuthMode::Wpa3Psk => "WPA3-PSK",
        };
        f.write_str(name)
    }
}

/// MAC address of an access point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bssid(pub [u8; 6]);

impl fmt::Display for Bssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// A Wi-Fi network as seen by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiInfo {
    /// Raw SSID bytes (at most 32)
    pub ssid: Vec<u8>,
    pub bssid: Option<Bssid>,
    pub band: Band,
    /// Channel number, meaningful together with `band`
    pub channel: u32,
    /// `None` when the device has not resolved the mode
    pub auth_mode: Option<AuthMode>,
}

impl WifiInfo {
    /// Create network info, validating the SSID length
    pub fn new(ssid: impl Into<Vec<u8>>, auth_mode: Option<AuthMode>) -> ValidationResult<Self> {
        let ssid = ssid.into();
        if ssid.len() > MAX_SSID_LEN {
            return Err(ValidationError::SsidTooLong(ssid.len()));
        }

        Ok(Self {
            ssid,
            bssid: None,
            band: Band::Any,
            channel: 0,
            auth_mode,
        })
    }

    /// SSID rendered for display (lossy UTF-8)
    pub fn ssid_lossy(&self) -> String {
        String::from_utf8_lossy(&self.ssid).into_owned()
    }
}

/// One scan notification from the device
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanRecord {
    /// Absent for keep-alive and end-of-scan frames
    pub wifi_info: Option<WifiInfo>,
    /// Signal strength in dBm
    pub rssi: Option<i32>,
}

impl ScanRecord {
    /// Authentication mode of the scanned network, if resolved
    pub fn auth_mode(&self) -> Option<AuthMode> {
        self.wifi_info.as_ref().and_then(|info| info.auth_mode)
    }

    pub fn channel(&self) -> Option<u32> {
        self.wifi_info.as_ref().map(|info| info.channel)
    }
}

/// Scan records of one SSID, best signal first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecordGroup {
    /// Raw SSID bytes shared by all members
    pub ssid: Vec<u8>,
    /// Mode of the strongest member; members keep their own
    pub auth_mode: AuthMode,
    /// One record per channel, sorted by descending RSSI
    pub members: Vec<ScanRecord>,
}

impl ScanRecordGroup {
    /// SSID rendered for display (lossy UTF-8)
    pub fn ssid_lossy(&self) -> String {
        String::from_utf8_lossy(&self.ssid).into_owned()
    }

    /// The member with the strongest signal
    pub fn best(&self) -> Option<&ScanRecord> {
        self.members.first()
    }

    /// Channels on which the network was seen
    pub fn channels(&self) -> Vec<u32> {
        self.members.iter().filter_map(ScanRecord::channel).collect()
    }
}

/// Credentials sent to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiConfig {
    pub info: WifiInfo,
    pub passphrase: Option<Vec<u8>>,
    /// Do not persist the credentials across a device reboot
    pub volatile_memory: bool,
    /// Let the device pick the channel instead of pinning `info.channel`
    pub any_channel: bool,
}

impl WifiConfig {
    /// Create a config, validating the passphrase length
    pub fn new(
        info: WifiInfo,
        passphrase: Option<Vec<u8>>,
        volatile_memory: bool,
        any_channel: bool,
    ) -> ValidationResult<Self> {
        if let Some(passphrase) = &passphrase {
            if passphrase.len() > MAX_PASSPHRASE_LEN {
                return Err(ValidationError::PassphraseTooLong(passphrase.len()));
            }
        }

        Ok(Self {
            info,
            passphrase,
            volatile_memory,
            any_channel,
        })
    }
}

/// Why the device failed to join a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    AuthError,
    NetworkNotFound,
    Timeout,
    FailIp,
    FailConn,
    /// Missing or not understood by this build
    Unknown,
}

/// The device's own upstream Wi-Fi link state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WifiConnectionState {
    Disconnected,
    Authentication,
    Association,
    ObtainingIp,
    Connected,
    ConnectionFailed(FailureReason),
}

impl WifiConnectionState {
    /// Connected and ConnectionFailed end a provisioning attempt
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WifiConnectionState::Connected | WifiConnectionState::ConnectionFailed(_)
        )
    }
}

/// Scan parameters reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanParams {
    pub band: Band,
    pub passive: bool,
    pub period_ms: u32,
    pub group_channels: u32,
}

/// Address information of a connected device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub ipv4: Ipv4Addr,
}

/// Snapshot returned by the status command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceStatus {
    pub connection_state: Option<WifiConnectionState>,
    /// Present when the device holds stored credentials
    pub provisioning_info: Option<WifiInfo>,
    pub connection_info: Option<ConnectionInfo>,
    pub scan_params: Option<ScanParams>,
}

impl DeviceStatus {
    pub fn is_provisioned(&self) -> bool {
        self.provisioning_info.is_some()
    }
}

/// Provisioning protocol version read from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version(pub u32);

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport link state (BLE only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStatus {
    Connecting,
    Connected,
    Disconnecting,
    #[default]
    Disconnected,
}

/// Identifier of one device session, used in log spans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A network chosen for provisioning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiData {
    /// Raw SSID bytes, sent to the device unchanged
    pub ssid: Vec<u8>,
    /// `None` when the scan never resolved the mode
    pub auth_mode: Option<AuthMode>,
    /// The specific scanned entry, when the user pinned a channel
    pub pinned: Option<ScanRecord>,
}

impl WifiData {
    /// A network known only by name, e.g. typed in by the user
    pub fn new(ssid: impl Into<Vec<u8>>, auth_mode: Option<AuthMode>) -> Self {
        Self {
            ssid: ssid.into(),
            auth_mode,
            pinned: None,
        }
    }

    pub fn ssid_lossy(&self) -> String {
        String::from_utf8_lossy(&self.ssid).into_owned()
    }

    /// Select the SSID of a group and let the device choose the channel
    pub fn from_group(group: &ScanRecordGroup) -> Self {
        Self {
            ssid: group.ssid.clone(),
            auth_mode: Some(group.auth_mode),
            pinned: None,
        }
    }

    /// Select one scanned entry, pinning its channel
    pub fn from_record(record: &ScanRecord) -> Option<Self> {
        let info = record.wifi_info.as_ref()?;
        Some(Self {
            ssid: info.ssid.clone(),
            auth_mode: info.auth_mode,
            pinned: Some(record.clone()),
        })
    }

    /// Unknown modes are treated as secured
    pub fn requires_password(&self) -> bool {
        self.auth_mode.is_none_or(AuthMode::requires_password)
    }

    pub fn any_channel(&self) -> bool {
        self.pinned.is_none()
    }

    /// Build the config sent to the device
    pub fn to_config(
        &self,
        password: Option<&str>,
        persist_to_flash: bool,
    ) -> ValidationResult<WifiConfig> {
        let info = match self.pinned.as_ref().and_then(|r| r.wifi_info.clone()) {
            Some(info) => info,
            None => WifiInfo::new(self.ssid.clone(), self.auth_mode)?,
        };
        let passphrase = password
            .filter(|_| self.requires_password())
            .map(|p| p.as_bytes().to_vec());

        WifiConfig::new(info, passphrase, !persist_to_flash, self.any_channel())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ssid: &str, channel: u32, rssi: i32) -> ScanRecord {
        ScanRecord {
            wifi_info: Some(WifiInfo {
                ssid: ssid.as_bytes().to_vec(),
                bssid: Some(Bssid([0xaa, 0xbb, 0xcc, 0xdd, 0xee, channel as u8])),
                band: Band::Band2_4Ghz,
                channel,
                auth_mode: Some(AuthMode::Wpa2Psk),
            }),
            rssi: Some(rssi),
        }
    }

    #[test]
    fn test_wifi_info_ssid_limit() {
        assert!(WifiInfo::new("A".repeat(32), None).is_ok());
        assert_eq!(
            WifiInfo::new("A".repeat(33), None),
            Err(ValidationError::SsidTooLong(33))
        );
    }

    #[test]
    fn test_wifi_config_passphrase_limit() {
        let info = WifiInfo::new("Home", Some(AuthMode::Wpa2Psk)).unwrap();
        assert!(WifiConfig::new(info.clone(), Some(vec![b'x'; 64]), false, true).is_ok());
        assert_eq!(
            WifiConfig::new(info, Some(vec![b'x'; 65]), false, true),
            Err(ValidationError::PassphraseTooLong(65))
        );
    }

    #[test]
    fn test_bssid_display() {
        let bssid = Bssid([0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]);
        assert_eq!(bssid.to_string(), "00:1a:2b:3c:4d:5e");
    }

    #[test]
    fn test_terminal_states() {
        assert!(WifiConnectionState::Connected.is_terminal());
        assert!(WifiConnectionState::ConnectionFailed(FailureReason::Timeout).is_terminal());
        assert!(!WifiConnectionState::ObtainingIp.is_terminal());
        assert!(!WifiConnectionState::Disconnected.is_terminal());
    }

    #[test]
    fn test_password_requirement() {
        let open = WifiData {
            ssid: "Cafe".into(),
            auth_mode: Some(AuthMode::Open),
            pinned: None,
        };
        let unknown = WifiData {
            auth_mode: None,
            ..open.clone()
        };
        assert!(!open.requires_password());
        assert!(unknown.requires_password());
    }

    #[test]
    fn test_config_from_group_uses_any_channel() {
        let group = ScanRecordGroup {
            ssid: "Home".into(),
            auth_mode: AuthMode::Wpa2Psk,
            members: vec![record("Home", 11, -40)],
        };
        let config = WifiData::from_group(&group)
            .to_config(Some("secret123"), true)
            .unwrap();

        assert!(config.any_channel);
        assert!(!config.volatile_memory);
        assert_eq!(config.info.channel, 0);
        assert_eq!(config.passphrase.as_deref(), Some(&b"secret123"[..]));
    }

    #[test]
    fn test_config_from_record_pins_channel() {
        let data = WifiData::from_record(&record("Home", 6, -70)).unwrap();
        let config = data.to_config(Some("secret123"), false).unwrap();

        assert!(!config.any_channel);
        assert!(config.volatile_memory);
        assert_eq!(config.info.channel, 6);
        assert_eq!(config.info.band, Band::Band2_4Ghz);
    }

    #[test]
    fn test_non_utf8_ssid_sent_unchanged() {
        let gbk = vec![0xc4, 0xe3, 0xba, 0xc3, b'W', b'i', b'F', b'i'];
        let group = ScanRecordGroup {
            ssid: gbk.clone(),
            auth_mode: AuthMode::Wpa2Psk,
            members: vec![],
        };
        let config = WifiData::from_group(&group)
            .to_config(Some("secret123"), true)
            .unwrap();
        assert_eq!(config.info.ssid, gbk);

        let raw = vec![0xff; MAX_SSID_LEN];
        let config = WifiData::new(raw.clone(), Some(AuthMode::Open))
            .to_config(None, true)
            .unwrap();
        assert_eq!(config.info.ssid, raw);
    }

    #[test]
    fn test_open_network_drops_password() {
        let data = WifiData {
            ssid: "Cafe".into(),
            auth_mode: Some(AuthMode::Open),
            pinned: None,
        };
        let config = data.to_config(Some("ignored"), true).unwrap();
        assert_eq!(config.passphrase, None);
    }
}
