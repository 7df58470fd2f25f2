//! NFC NDEF record carrying a Wi-Fi Simple Configuration credential

use bytes::{Buf, BufMut, BytesMut};

use crate::core::{
    error::{CodecError, CodecResult},
    types::{AuthMode, MAX_PASSPHRASE_LEN, MAX_SSID_LEN},
};

/// MIME type of the WSC record
pub const WSC_MIME_TYPE: &[u8] = b"application/vnd.wfa.wsc";

pub const ATTR_VERSION: u16 = 0x104a;
pub const ATTR_CREDENTIAL: u16 = 0x100e;
pub const ATTR_NETWORK_INDEX: u16 = 0x1026;
pub const ATTR_SSID: u16 = 0x1045;
pub const ATTR_AUTH_TYPE: u16 = 0x1003;
pub const ATTR_ENCRYPTION_TYPE: u16 = 0x100f;
pub const ATTR_NETWORK_KEY: u16 = 0x1027;
pub const ATTR_MAC_ADDRESS: u16 = 0x1020;

const WSC_VERSION_1_0: u8 = 0x10;

const AUTH_OPEN: u16 = 0x0001;
const AUTH_WPA_PSK: u16 = 0x0002;
const AUTH_WPA2_ENTERPRISE: u16 = 0x0010;
const AUTH_WPA2_PSK: u16 = 0x0020;

const ENCRYPTION_NONE: u16 = 0x0001;
const ENCRYPTION_WEP: u16 = 0x0002;
const ENCRYPTION_TKIP: u16 = 0x0004;
const ENCRYPTION_AES: u16 = 0x0008;

// NDEF header: MB | ME | SR, TNF = MIME media
const NDEF_MB: u8 = 0x80;
const NDEF_ME: u8 = 0x40;
const NDEF_SR: u8 = 0x10;
const NDEF_IL: u8 = 0x08;
const NDEF_TNF_MIME: u8 = 0x02;
const NDEF_TNF_MASK: u8 = 0x07;

/// Credential published over NFC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WscCredential {
    pub ssid: Vec<u8>,
    pub network_key: Vec<u8>,
    pub auth_type: u16,
    pub encryption_type: u16,
}

impl WscCredential {
    /// Build a credential, mapping the auth mode to WSC auth/encryption types
    pub fn new(ssid: &[u8], network_key: &[u8], auth_mode: AuthMode) -> CodecResult<Self> {
        if ssid.len() > MAX_SSID_LEN {
            return Err(CodecError::MalformedMessage(format!(
                "SSID of {} bytes",
                ssid.len()
            )));
        }
        if network_key.len() > MAX_PASSPHRASE_LEN {
            return Err(CodecError::MalformedMessage(format!(
                "network key of {} bytes",
                network_key.len()
            )));
        }

        let (auth_type, encryption_type) = wsc_types(auth_mode);
        Ok(Self {
            ssid: ssid.to_vec(),
            network_key: network_key.to_vec(),
            auth_type,
            encryption_type,
        })
    }
}

fn wsc_types(auth_mode: AuthMode) -> (u16, u16) {
    match auth_mode {
        AuthMode::Open => (AUTH_OPEN, ENCRYPTION_NONE),
        AuthMode::Wep => (AUTH_OPEN, ENCRYPTION_WEP),
        AuthMode::WpaPsk => (AUTH_WPA_PSK, ENCRYPTION_TKIP),
        AuthMode::Wpa2Psk | AuthMode::Wpa3Psk => (AUTH_WPA2_PSK, ENCRYPTION_AES),
        AuthMode::WpaWpa2Psk => (
            AUTH_WPA_PSK | AUTH_WPA2_PSK,
            ENCRYPTION_AES | ENCRYPTION_TKIP,
        ),
        AuthMode::Wpa2Enterprise => (AUTH_WPA2_ENTERPRISE, ENCRYPTION_AES),
    }
}

fn put_attr(buf: &mut BytesMut, attr: u16, value: &[u8]) {
    buf.put_u16(attr);
    buf.put_u16(value.len() as u16);
    buf.put_slice(value);
}

/// Encode the WSC payload (version + credential attributes)
pub fn encode_wsc_payload(credential: &WscCredential) -> Vec<u8> {
    let mut inner = BytesMut::new();
    put_attr(&mut inner, ATTR_NETWORK_INDEX, &[0x01]);
    put_attr(&mut inner, ATTR_SSID, &credential.ssid);
    put_attr(&mut inner, ATTR_AUTH_TYPE, &credential.auth_type.to_be_bytes());
    put_attr(
        &mut inner,
        ATTR_ENCRYPTION_TYPE,
        &credential.encryption_type.to_be_bytes(),
    );
    put_attr(&mut inner, ATTR_NETWORK_KEY, &credential.network_key);
    put_attr(&mut inner, ATTR_MAC_ADDRESS, &[0xff; 6]);

    let mut payload = BytesMut::new();
    put_attr(&mut payload, ATTR_VERSION, &[WSC_VERSION_1_0]);
    put_attr(&mut payload, ATTR_CREDENTIAL, &inner);
    payload.to_vec()
}

/// Walk type-length-value attributes
fn parse_attrs(mut buf: &[u8]) -> CodecResult<Vec<(u16, Vec<u8>)>> {
    let mut attrs = Vec::new();
    while buf.has_remaining() {
        if buf.remaining() < 4 {
            return Err(CodecError::MalformedMessage("truncated WSC attribute".into()));
        }
        let attr = buf.get_u16();
        let len = buf.get_u16() as usize;
        if buf.remaining() < len {
            return Err(CodecError::MalformedMessage(format!(
                "WSC attribute {attr:#06x} claims {len} bytes"
            )));
        }
        attrs.push((attr, buf[..len].to_vec()));
        buf.advance(len);
    }
    Ok(attrs)
}

fn u16_attr(value: &[u8]) -> CodecResult<u16> {
    let bytes: [u8; 2] = value
        .try_into()
        .map_err(|_| CodecError::MalformedMessage("WSC type attribute not 2 bytes".into()))?;
    Ok(u16::from_be_bytes(bytes))
}

/// Decode a WSC payload back into its credential
pub fn decode_wsc_payload(payload: &[u8]) -> CodecResult<WscCredential> {
    let credential = parse_attrs(payload)?
        .into_iter()
        .find(|(attr, _)| *attr == ATTR_CREDENTIAL)
        .ok_or_else(|| CodecError::MalformedMessage("no WSC credential".into()))?;

    let mut ssid = None;
    let mut network_key = Vec::new();
    let mut auth_type = AUTH_OPEN;
    let mut encryption_type = ENCRYPTION_NONE;
    for (attr, value) in parse_attrs(&credential.1)? {
        match attr {
            ATTR_SSID => ssid = Some(value),
            ATTR_NETWORK_KEY => network_key = value,
            ATTR_AUTH_TYPE => auth_type = u16_attr(&value)?,
            ATTR_ENCRYPTION_TYPE => encryption_type = u16_attr(&value)?,
            _ => {}
        }
    }

    Ok(WscCredential {
        ssid: ssid.ok_or_else(|| CodecError::MalformedMessage("WSC credential without SSID".into()))?,
        network_key,
        auth_type,
        encryption_type,
    })
}

/// Wrap the credential in a single-record NDEF message
pub fn encode_ndef_message(credential: &WscCredential) -> Vec<u8> {
    let payload = encode_wsc_payload(credential);
    let mut buf = BytesMut::new();

    if payload.len() <= u8::MAX as usize {
        buf.put_u8(NDEF_MB | NDEF_ME | NDEF_SR | NDEF_TNF_MIME);
        buf.put_u8(WSC_MIME_TYPE.len() as u8);
        buf.put_u8(payload.len() as u8);
    } else {
        buf.put_u8(NDEF_MB | NDEF_ME | NDEF_TNF_MIME);
        buf.put_u8(WSC_MIME_TYPE.len() as u8);
        buf.put_u32(payload.len() as u32);
    }
    buf.put_slice(WSC_MIME_TYPE);
    buf.put_slice(&payload);
    buf.to_vec()
}

/// Parse an NDEF message holding one WSC record
pub fn decode_ndef_message(mut buf: &[u8]) -> CodecResult<WscCredential> {
    let truncated = || CodecError::MalformedMessage("truncated NDEF record".into());

    if buf.remaining() < 3 {
        return Err(truncated());
    }
    let header = buf.get_u8();
    if header & NDEF_TNF_MASK != NDEF_TNF_MIME {
        return Err(CodecError::MalformedMessage(format!(
            "unexpected NDEF TNF {}",
            header & NDEF_TNF_MASK
        )));
    }
    let type_len = buf.get_u8() as usize;
    let payload_len = if header & NDEF_SR != 0 {
        buf.get_u8() as usize
    } else {
        if buf.remaining() < 4 {
            return Err(truncated());
        }
        buf.get_u32() as usize
    };
    let id_len = if header & NDEF_IL != 0 {
        if !buf.has_remaining() {
            return Err(truncated());
        }
        buf.get_u8() as usize
    } else {
        0
    };

    if buf.remaining() < type_len + id_len + payload_len {
        return Err(truncated());
    }
    if &buf[..type_len] != WSC_MIME_TYPE {
        return Err(CodecError::MalformedMessage("not a WSC record".into()));
    }
    buf.advance(type_len + id_len);

    decode_wsc_payload(&buf[..payload_len])
}
