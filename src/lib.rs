//! nRF Wi-Fi Provisioner
//!
//! A client for provisioning Wi-Fi credentials onto nRF70 devices over
//! multiple transport layers:
//! - Bluetooth Low Energy (GATT)
//! - SoftAP (HTTPS REST)
//! - NFC (WSC NDEF record)

pub mod config;
pub mod core;
pub mod protocol;
pub mod report;
pub mod transport;

pub use core::{
    client::ProvisioningClient,
    error::{ProvisionError, SessionError, TransportError},
    resource::Resource,
    session::{ProvisioningPhase, ProvisioningSession, SessionEntity, SessionEvent},
    types::{AuthMode, DeviceStatus, ScanRecord, ScanRecordGroup, WifiConfig, WifiData},
};
