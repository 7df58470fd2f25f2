//! Bluetooth Low Energy transport layer

pub mod adapter;
pub mod advertisement;
pub mod link;
pub mod uuids;

pub use {
    adapter::{BleAdapter, DiscoveredDevice},
    advertisement::AdvertisementData,
    link::BleLink,
    uuids::*,
};
