//! `mailarchiver`: durable on-disk archive of outgoing email.
//!
//! Each message is stored as its raw bytes, a preview, its extracted
//! attachments and a `meta.json`, with one summary line per message in a
//! daily index. Raw messages are parsed with a lenient byte-level MIME
//! parser; messages already parsed by `mail-parser` are used as is.

pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod normalize;
pub mod parser;
pub mod pipeline;
pub mod rules;
pub mod store;
