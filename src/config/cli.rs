//! Command-line argument parsing

use std::path::PathBuf;

use bluer::Address;
use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use crate::{
    core::types::AuthMode,
    transport::{
        ble::uuids::{
            CONTROL_POINT_CHAR_UUID, DATA_OUT_CHAR_UUID, PROVISIONING_SERVICE_UUID,
            VERSION_CHAR_UUID,
        },
        softap::DEFAULT_SOFTAP_URL,
    },
};

#[derive(Parser, Debug, Clone)]
#[clap(name = "nrf-wifi-provisioner", version, author)]
#[clap(about = "Provision nRF70 Wi-Fi devices over BLE, SoftAP or NFC")]
pub struct CliArgs {
    /// Provisioning service UUID
    #[clap(long, default_value_t = PROVISIONING_SERVICE_UUID)]
    pub service_uuid: Uuid,

    /// Version characteristic UUID
    #[clap(long, default_value_t = VERSION_CHAR_UUID)]
    pub version_uuid: Uuid,

    /// Control point characteristic UUID
    #[clap(long, default_value_t = CONTROL_POINT_CHAR_UUID)]
    pub control_point_uuid: Uuid,

    /// Data out characteristic UUID
    #[clap(long, default_value_t = DATA_OUT_CHAR_UUID)]
    pub data_out_uuid: Uuid,

    /// Deadline for a command response in milliseconds
    #[clap(long, default_value = "10000")]
    pub command_timeout_ms: u64,

    /// Deadline for connecting to a device in milliseconds
    #[clap(long, default_value = "30000")]
    pub connect_timeout_ms: u64,

    /// Base URL of the device while in SoftAP mode
    #[clap(long, default_value = DEFAULT_SOFTAP_URL)]
    pub softap_url: String,

    /// PEM certificate pinned for the SoftAP HTTPS server
    #[clap(long)]
    pub softap_certificate: Option<PathBuf>,

    /// JSON file remembering passwords of provisioned networks
    #[clap(long)]
    pub password_cache: Option<PathBuf>,

    /// Print scan results and device status as JSON
    #[clap(long, global = true)]
    pub json: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List devices advertising the provisioning service
    Devices {
        /// Discovery duration in seconds
        #[clap(long, default_value = "10")]
        duration: u64,
    },

    /// Show version and status of a device
    Status {
        /// Bluetooth address of the device
        device: Address,
    },

    /// Let a device scan for Wi-Fi networks
    Scan {
        device: Address,

        /// Scan duration in seconds
        #[clap(long, default_value = "10")]
        duration: u64,
    },

    /// Provision a device with network credentials
    Provision {
        device: Address,

        /// Network to join
        #[clap(long)]
        ssid: String,

        /// Network password; taken from the password cache when omitted
        #[clap(long)]
        password: Option<String>,

        /// Pin the channel the device was seen on instead of letting it choose
        #[clap(long)]
        channel: Option<u32>,

        /// Keep the credentials in RAM only
        #[clap(long)]
        volatile: bool,

        /// Scan duration in seconds before provisioning
        #[clap(long, default_value = "5")]
        scan_duration: u64,
    },

    /// Erase stored credentials on a device
    Unprovision { device: Address },

    /// List networks seen by a device in SoftAP mode
    SoftapScan,

    /// Show the status of a device in SoftAP mode
    SoftapStatus,

    /// Provision a device in SoftAP mode
    SoftapProvision {
        #[clap(long)]
        ssid: String,

        #[clap(long)]
        password: Option<String>,

        #[clap(long, value_enum, default_value = "wpa2-psk")]
        auth: AuthArg,

        #[clap(long)]
        volatile: bool,
    },

    /// Print the NDEF record an NFC tag would carry
    NfcRecord {
        #[clap(long)]
        ssid: String,

        #[clap(long, default_value = "")]
        password: String,

        #[clap(long, value_enum, default_value = "wpa2-psk")]
        auth: AuthArg,
    },
}

/// Authentication mode accepted on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthArg {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    Wpa2Enterprise,
    Wpa3Psk,
}

impl From<AuthArg> for AuthMode {
    fn from(arg: AuthArg) -> Self {
        match arg {
            AuthArg::Open => AuthMode::Open,
            AuthArg::Wep => AuthMode::Wep,
            AuthArg::WpaPsk => AuthMode::WpaPsk,
            AuthArg::Wpa2Psk => AuthMode::Wpa2Psk,
            AuthArg::WpaWpa2Psk => AuthMode::WpaWpa2Psk,
            AuthArg::Wpa2Enterprise => AuthMode::Wpa2Enterprise,
            AuthArg::Wpa3Psk => AuthMode::Wpa3Psk,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["nrf-wifi-provisioner", "softap-status"]);
        assert_eq!(args.service_uuid, PROVISIONING_SERVICE_UUID);
        assert_eq!(args.command_timeout_ms, 10_000);
        assert_eq!(args.softap_url, DEFAULT_SOFTAP_URL);
        assert!(!args.json);
        assert!(matches!(args.command, Command::SoftapStatus));
    }

    #[test]
    fn test_provision_arguments() {
        let args = CliArgs::parse_from([
            "nrf-wifi-provisioner",
            "provision",
            "AA:BB:CC:DD:EE:FF",
            "--ssid",
            "Home",
            "--channel",
            "6",
            "--json",
        ]);
        assert!(args.json);
        match args.command {
            Command::Provision {
                device,
                ssid,
                password,
                channel,
                volatile,
                ..
            } => {
                assert_eq!(device, Address::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]));
                assert_eq!(ssid, "Home");
                assert_eq!(password, None);
                assert_eq!(channel, Some(6));
                assert!(!volatile);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_auth_argument() {
        let args = CliArgs::parse_from([
            "nrf-wifi-provisioner",
            "nfc-record",
            "--ssid",
            "Cafe",
            "--auth",
            "open",
        ]);
        match args.command {
            Command::NfcRecord { auth, password, .. } => {
                assert_eq!(AuthMode::from(auth), AuthMode::Open);
                assert!(password.is_empty());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
