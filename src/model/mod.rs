//! Core data model types: the normalized message, addresses, and attachment records.

pub mod address;
pub mod attachment;
pub mod message;
