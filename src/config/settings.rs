//! Runtime settings

use std::{path::PathBuf, time::Duration};

use crate::{
    config::CliArgs,
    transport::{SoftApConfig, ble::GattUuids},
};

/// Runtime configuration settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub gatt_uuids: GattUuids,
    pub command_timeout: Duration,
    pub connect_timeout: Duration,
    pub softap: SoftApConfig,
    pub password_cache: Option<PathBuf>,
    pub json_output: bool,
}

impl From<&CliArgs> for Settings {
    fn from(args: &CliArgs) -> Self {
        let command_timeout = Duration::from_millis(args.command_timeout_ms);

        Settings {
            gatt_uuids: GattUuids {
                service: args.service_uuid,
                version: args.version_uuid,
                control_point: args.control_point_uuid,
                data_out: args.data_out_uuid,
            },
            command_timeout,
            connect_timeout: Duration::from_millis(args.connect_timeout_ms),
            softap: SoftApConfig {
                base_url: args.softap_url.clone(),
                certificate: args.softap_certificate.clone(),
                timeout: command_timeout,
            },
            password_cache: args.password_cache.clone(),
            json_output: args.json,
        }
    }
}
