//! NFC provisioning by tag emulation

use tokio::sync::Mutex;
use tracing::info;
use trait_variant::make;

use crate::{
    core::{
        error::{ProvisionResult, TransportResult},
        types::{AuthMode, WifiConfig},
    },
    protocol::wsc::{WscCredential, encode_ndef_message},
};

/// Something that can present an NDEF message to a reader
#[make(Send)]
pub trait TagEmulator: Sync + 'static {
    async fn publish(&self, ndef_message: Vec<u8>) -> TransportResult<()>;

    async fn withdraw(&self) -> TransportResult<()>;
}

/// Publishes one Wi-Fi credential at a time through a tag emulator
pub struct NfcSession<E: TagEmulator> {
    emulator: E,
    published: Mutex<bool>,
}

impl<E: TagEmulator> NfcSession<E> {
    pub fn new(emulator: E) -> Self {
        Self {
            emulator,
            published: Mutex::new(false),
        }
    }

    /// Encode and publish a credential, replacing any previous one
    ///
    /// Returns the NDEF message handed to the emulator.
    pub async fn publish(
        &self,
        ssid: &[u8],
        password: &[u8],
        auth_mode: AuthMode,
    ) -> ProvisionResult<Vec<u8>> {
        let credential = WscCredential::new(ssid, password, auth_mode)?;
        let message = encode_ndef_message(&credential);

        let mut published = self.published.lock().await;
        if *published {
            self.emulator.withdraw().await?;
            *published = false;
        }
        self.emulator.publish(message.clone()).await?;
        *published = true;

        info!(ssid = %String::from_utf8_lossy(ssid), %auth_mode, "Published NFC credential");
        Ok(message)
    }

    /// Publish the credential of a config; unknown modes are sent as WPA2
    pub async fn publish_config(&self, config: &WifiConfig) -> ProvisionResult<Vec<u8>> {
        let auth_mode = config.info.auth_mode.unwrap_or(AuthMode::Wpa2Psk);
        let password = config.passphrase.as_deref().unwrap_or_default();
        self.publish(&config.info.ssid, password, auth_mode).await
    }

    /// Withdraw the record; no-op when nothing is published
    pub async fn stop(&self) -> ProvisionResult<()> {
        let mut published = self.published.lock().await;
        if *published {
            self.emulator.withdraw().await?;
            *published = false;
            info!("Withdrew NFC credential");
        }
        Ok(())
    }

    pub async fn is_published(&self) -> bool {
        *self.published.lock().await
    }
}
