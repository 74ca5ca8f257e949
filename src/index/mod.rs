//! Daily index: one JSON line per archived message under `<root>/index/`.

pub mod builder;
pub mod format;
pub mod reader;

pub use builder::append_line;
pub use format::IndexLine;
pub use reader::read_day;
