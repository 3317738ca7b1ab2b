mod fmt;

pub use fmt::format_bytes;
