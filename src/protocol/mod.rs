//! Wire codec for the provisioning protocol

pub mod codec;
pub mod mapper;
pub mod wire;
pub mod wsc;

pub use {
    codec::{CommandResponse, DataFrame},
    wire::OpCode,
    wsc::WscCredential,
};
