//! Byte-level email parsing: headers, MIME structure, and content decoding.

pub mod decode;
pub mod header;
pub mod mime;
