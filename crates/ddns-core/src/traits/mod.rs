//! Core traits for the DDNS updater
//!
//! - [`AddressSource`]: Resolve the current public address of one family

pub mod address_source;

pub use address_source::{AddressSource, IpVersion};
