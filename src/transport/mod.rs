//! Transport layers carrying the provisioning protocol

pub mod ble;
pub mod link;
pub mod mock;
pub mod nfc;
pub mod softap;

pub use {
    link::ProvisioningLink,
    nfc::{NfcSession, TagEmulator},
    softap::{SoftApClient, SoftApConfig},
};
