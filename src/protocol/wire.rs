//! Protobuf messages of the nRF Wi-Fi provisioning service
//!
//! Declared with `prost` derives instead of generated code. Every field is
//! optional on the wire (proto2), so presence survives a round trip.

use prost::{Enumeration, Message};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum OpCode {
    Reserved = 0,
    GetStatus = 1,
    StartScan = 2,
    StopScan = 3,
    SetConfig = 4,
    ForgetConfig = 5,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum Status {
    Success = 0,
    InvalidArgument = 1,
    InvalidProto = 2,
    InternalError = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum Band {
    Any = 0,
    Band2_4Gh = 1,
    Band5Gh = 2,
    Band6Gh = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum AuthMode {
    Open = 0,
    Wep = 1,
    WpaPsk = 2,
    Wpa2Psk = 3,
    WpaWpa2Psk = 4,
    Wpa2Enterprise = 5,
    Wpa3Psk = 6,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum ConnectionState {
    Disconnected = 0,
    Authentication = 1,
    Association = 2,
    ObtainingIp = 3,
    Connected = 4,
    ConnectionFailed = 5,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum ConnectionFailureReason {
    AuthError = 0,
    NetworkNotFound = 1,
    Timeout = 2,
    FailIp = 3,
    FailConn = 4,
}

/// Content of the version characteristic
#[derive(Clone, PartialEq, Message)]
pub struct Info {
    #[prost(uint32, optional, tag = "1")]
    pub version: Option<u32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WifiInfo {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub ssid: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub bssid: Option<Vec<u8>>,
    #[prost(enumeration = "Band", optional, tag = "3")]
    pub band: Option<i32>,
    #[prost(uint32, optional, tag = "4")]
    pub channel: Option<u32>,
    #[prost(enumeration = "AuthMode", optional, tag = "5")]
    pub auth: Option<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WifiConfig {
    #[prost(message, optional, tag = "1")]
    pub wifi: Option<WifiInfo>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub passphrase: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "3")]
    pub volatile_memory: Option<bool>,
    #[prost(bool, optional, tag = "4")]
    pub any_channel: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ScanParams {
    #[prost(enumeration = "Band", optional, tag = "1")]
    pub band: Option<i32>,
    #[prost(bool, optional, tag = "2")]
    pub passive: Option<bool>,
    #[prost(uint32, optional, tag = "3")]
    pub period_ms: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub group_channels: Option<u32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ScanRecord {
    #[prost(message, optional, tag = "1")]
    pub wifi: Option<WifiInfo>,
    #[prost(int32, optional, tag = "2")]
    pub rssi: Option<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ConnectionInfo {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub ip4_addr: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeviceStatus {
    #[prost(enumeration = "ConnectionState", optional, tag = "1")]
    pub state: Option<i32>,
    #[prost(enumeration = "ConnectionFailureReason", optional, tag = "2")]
    pub reason: Option<i32>,
    #[prost(message, optional, tag = "10")]
    pub provisioning_info: Option<WifiInfo>,
    #[prost(message, optional, tag = "11")]
    pub connection_info: Option<ConnectionInfo>,
    #[prost(message, optional, tag = "12")]
    pub scan_info: Option<ScanParams>,
}

/// Written to the control point
#[derive(Clone, PartialEq, Message)]
pub struct Request {
    #[prost(enumeration = "OpCode", optional, tag = "1")]
    pub op_code: Option<i32>,
    #[prost(message, optional, tag = "10")]
    pub scan_params: Option<ScanParams>,
    #[prost(message, optional, tag = "11")]
    pub config: Option<WifiConfig>,
}

/// Notified on the control point
#[derive(Clone, PartialEq, Message)]
pub struct Response {
    #[prost(enumeration = "OpCode", optional, tag = "1")]
    pub request_op_code: Option<i32>,
    #[prost(enumeration = "Status", optional, tag = "2")]
    pub status: Option<i32>,
    #[prost(message, optional, tag = "10")]
    pub device_status: Option<DeviceStatus>,
}

/// Notified on the data-out characteristic
#[derive(Clone, PartialEq, Message)]
pub struct DataResult {
    #[prost(message, optional, tag = "1")]
    pub scan_record: Option<ScanRecord>,
    #[prost(enumeration = "ConnectionState", optional, tag = "2")]
    pub state: Option<i32>,
    #[prost(enumeration = "ConnectionFailureReason", optional, tag = "3")]
    pub reason: Option<i32>,
}

/// Body of the SoftAP scan endpoint
#[derive(Clone, PartialEq, Message)]
pub struct ScanResults {
    #[prost(message, repeated, tag = "1")]
    pub results: Vec<ScanRecord>,
}
