//! Human-readable sizes for the memory column.

const UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

/// Formats a byte count with binary (1024) steps, e.g. `1536, 1 -> "1.5 KiB"`.
///
/// The power is `floor(log2(bytes) / 10)`, so a `u64` never goes past EiB.
pub fn formatted_data_size(bytes: u64, precision: usize) -> String {
    let power = if bytes == 0 {
        0
    } else {
        (63 - bytes.leading_zeros()) / 10
    };

    let value = if power == 0 {
        bytes as f64
    } else {
        bytes as f64 / 1024f64.powi(power as i32)
    };

    format!("{:.*} {}", precision, value, UNITS[power as usize])
}
