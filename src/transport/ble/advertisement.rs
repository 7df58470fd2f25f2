//! Provisioning service data carried in BLE advertisements

use std::fmt;

const FLAG_PROVISIONED: u8 = 0x01;
const FLAG_WIFI_CONNECTED: u8 = 0x02;

/// Device state advertised before connecting
///
/// Layout: `[version, flags, reserved, wifi_rssi]`, where `wifi_rssi` is a
/// signed dBm value that is only meaningful while connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisementData {
    pub version: u8,
    pub provisioned: bool,
    pub wifi_connected: bool,
    pub wifi_rssi: Option<i8>,
}

impl AdvertisementData {
    /// Parse service data; `None` when too short
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&version, rest) = data.split_first()?;
        let (&flags, rest) = rest.split_first()?;
        let wifi_connected = flags & FLAG_WIFI_CONNECTED != 0;
        let wifi_rssi = rest
            .get(1)
            .filter(|_| wifi_connected)
            .map(|&rssi| rssi as i8);

        Some(Self {
            version,
            provisioned: flags & FLAG_PROVISIONED != 0,
            wifi_connected,
            wifi_rssi,
        })
    }
}

impl fmt::Display for AdvertisementData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "v{} {}",
            self.version,
            if self.provisioned {
                "provisioned"
            } else {
                "unprovisioned"
            }
        )?;
        match (self.wifi_connected, self.wifi_rssi) {
            (true, Some(rssi)) => write!(f, ", wifi connected ({rssi} dBm)"),
            (true, None) => write!(f, ", wifi connected"),
            (false, _) => Ok(()),
        }
    }
}
