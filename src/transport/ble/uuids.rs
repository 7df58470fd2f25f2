//! BLE GATT UUIDs of the nRF Wi-Fi provisioning service

use uuid::Uuid;

/// Provisioning service UUID
pub const PROVISIONING_SERVICE_UUID: Uuid = Uuid::from_bytes([
    0x14, 0x38, 0x78, 0x00, 0x13, 0x0c, 0x49, 0xe7, 0xb8, 0x77, 0x28, 0x81, 0xc8, 0x9c, 0xb2, 0x58,
]);

/// Version characteristic (read)
pub const VERSION_CHAR_UUID: Uuid = Uuid::from_bytes([
    0x14, 0x38, 0x78, 0x01, 0x13, 0x0c, 0x49, 0xe7, 0xb8, 0x77, 0x28, 0x81, 0xc8, 0x9c, 0xb2, 0x58,
]);

/// Control point characteristic (write command, notify response)
pub const CONTROL_POINT_CHAR_UUID: Uuid = Uuid::from_bytes([
    0x14, 0x38, 0x78, 0x02, 0x13, 0x0c, 0x49, 0xe7, 0xb8, 0x77, 0x28, 0x81, 0xc8, 0x9c, 0xb2, 0x58,
]);

/// Data out characteristic (notify scan results and connection states)
pub const DATA_OUT_CHAR_UUID: Uuid = Uuid::from_bytes([
    0x14, 0x38, 0x78, 0x03, 0x13, 0x0c, 0x49, 0xe7, 0xb8, 0x77, 0x28, 0x81, 0xc8, 0x9c, 0xb2, 0x58,
]);

/// UUID set used to locate the provisioning service
///
/// Custom firmware may move the service; override any of the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattUuids {
    pub service: Uuid,
    pub version: Uuid,
    pub control_point: Uuid,
    pub data_out: Uuid,
}

impl Default for GattUuids {
    fn default() -> Self {
        Self {
            service: PROVISIONING_SERVICE_UUID,
            version: VERSION_CHAR_UUID,
            control_point: CONTROL_POINT_CHAR_UUID,
            data_out: DATA_OUT_CHAR_UUID,
        }
    }
}
