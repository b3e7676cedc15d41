//! Byte-size formatting used in pipeline progress messages

/// Bytes in one gibibyte
pub const GIB: f64 = (1u64 << 30) as f64;

/// Convert a byte count to GiB
pub fn bytes_to_gib(bytes: u64) -> f64 {
    bytes as f64 / GIB
}

/// Render a byte count as GiB with two decimals, e.g. `"0.02 GiB"`
pub fn format_gib(bytes: u64) -> String {
    format!("{:.2} GiB", bytes_to_gib(bytes))
}
