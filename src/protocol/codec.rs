//! Byte-level encode/decode of provisioning messages

use prost::Message;

use crate::{
    core::{
        error::{CodecError, CodecResult, ResponseCode},
        types::{DeviceStatus, ScanParams, ScanRecord, Version, WifiConfig, WifiConnectionState},
    },
    protocol::{
        mapper::{connection_state_from_wire, connection_state_to_wire, status_from_wire},
        wire::{self, OpCode},
    },
};

/// A frame notified on the data-out characteristic
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataFrame {
    pub scan_record: Option<ScanRecord>,
    pub state: Option<WifiConnectionState>,
}

/// Decoded control-point response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub op_code: OpCode,
    pub status: Result<(), ResponseCode>,
    pub device_status: Option<DeviceStatus>,
}

pub fn encode_version(version: Version) -> Vec<u8> {
    wire::Info {
        version: Some(version.0),
    }
    .encode_to_vec()
}

pub fn decode_version(bytes: &[u8]) -> CodecResult<Version> {
    let info = wire::Info::decode(bytes)?;
    info.version
        .map(Version)
        .ok_or_else(|| CodecError::MalformedMessage("Info without version".into()))
}

/// Encode a control-point request
pub fn encode_request(
    op_code: OpCode,
    scan_params: Option<&ScanParams>,
    config: Option<&WifiConfig>,
) -> Vec<u8> {
    wire::Request {
        op_code: Some(op_code as i32),
        scan_params: scan_params.map(wire::ScanParams::from),
        config: config.map(wire::WifiConfig::from),
    }
    .encode_to_vec()
}

/// Decode a request (used by device simulators)
pub fn decode_request(bytes: &[u8]) -> CodecResult<(OpCode, Option<WifiConfig>)> {
    let request = wire::Request::decode(bytes)?;
    let op_code = request
        .op_code
        .and_then(|op| OpCode::try_from(op).ok())
        .ok_or_else(|| CodecError::MalformedMessage("request without known op code".into()))?;
    let config = request.config.map(WifiConfig::try_from).transpose()?;
    Ok((op_code, config))
}

pub fn encode_response(
    op_code: OpCode,
    status: wire::Status,
    device_status: Option<&DeviceStatus>,
) -> Vec<u8> {
    wire::Response {
        request_op_code: Some(op_code as i32),
        status: Some(status as i32),
        device_status: device_status.map(wire::DeviceStatus::from),
    }
    .encode_to_vec()
}

/// Decode a response and check it answers `expected`
pub fn decode_response(bytes: &[u8], expected: OpCode) -> CodecResult<CommandResponse> {
    let response = wire::Response::decode(bytes)?;
    let op_code = response
        .request_op_code
        .and_then(|op| OpCode::try_from(op).ok())
        .unwrap_or(OpCode::Reserved);
    if op_code != expected {
        return Err(CodecError::MalformedMessage(format!(
            "response to {op_code:?} while waiting for {expected:?}"
        )));
    }

    Ok(CommandResponse {
        op_code,
        status: status_from_wire(response.status),
        device_status: response
            .device_status
            .map(DeviceStatus::try_from)
            .transpose()?,
    })
}

pub fn encode_wifi_config(config: &WifiConfig) -> Vec<u8> {
    wire::WifiConfig::from(config).encode_to_vec()
}

pub fn decode_wifi_config(bytes: &[u8]) -> CodecResult<WifiConfig> {
    WifiConfig::try_from(wire::WifiConfig::decode(bytes)?)
}

pub fn encode_device_status(status: &DeviceStatus) -> Vec<u8> {
    wire::DeviceStatus::from(status).encode_to_vec()
}

pub fn decode_device_status(bytes: &[u8]) -> CodecResult<DeviceStatus> {
    DeviceStatus::try_from(wire::DeviceStatus::decode(bytes)?)
}

pub fn encode_scan_record(record: &ScanRecord) -> Vec<u8> {
    wire::ScanRecord::from(record).encode_to_vec()
}

pub fn decode_scan_record(bytes: &[u8]) -> CodecResult<ScanRecord> {
    ScanRecord::try_from(wire::ScanRecord::decode(bytes)?)
}

pub fn encode_data_frame(frame: &DataFrame) -> Vec<u8> {
    let (state, reason) = match frame.state.map(connection_state_to_wire) {
        Some((state, reason)) => (Some(state), reason),
        None => (None, None),
    };

    wire::DataResult {
        scan_record: frame.scan_record.as_ref().map(wire::ScanRecord::from),
        state,
        reason,
    }
    .encode_to_vec()
}

pub fn decode_data_frame(bytes: &[u8]) -> CodecResult<DataFrame> {
    let result = wire::DataResult::decode(bytes)?;
    Ok(DataFrame {
        scan_record: result.scan_record.map(ScanRecord::try_from).transpose()?,
        state: connection_state_from_wire(result.state, result.reason),
    })
}

pub fn encode_scan_results(records: &[ScanRecord]) -> Vec<u8> {
    wire::ScanResults {
        results: records.iter().map(wire::ScanRecord::from).collect(),
    }
    .encode_to_vec()
}

pub fn decode_scan_results(bytes: &[u8]) -> CodecResult<Vec<ScanRecord>> {
    wire::ScanResults::decode(bytes)?
        .results
        .into_iter()
        .map(ScanRecord::try_from)
        .collect()
}
