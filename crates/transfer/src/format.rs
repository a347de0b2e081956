//! Human-readable sizes, speeds and durations for logs and the CLI.

/// Formats a byte count with one decimal, e.g. `1.5 MB`.
///
/// ```
/// use synergy_transfer::format::format_file_size;
///
/// assert_eq!(format_file_size(512), "512.0 B");
/// assert_eq!(format_file_size(1024 * 1024), "1.0 MB");
/// ```
#[must_use]
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{size:.1} {}", UNITS[unit_idx])
}

/// Formats a throughput given in Mbps, dropping to Kbps below 1 Mbps.
#[must_use]
pub fn format_speed(speed_mbps: f64) -> String {
    if speed_mbps < 1.0 {
        format!("{:.1} Kbps", speed_mbps * 1000.0)
    } else {
        format!("{speed_mbps:.1} Mbps")
    }
}

/// Formats a duration in seconds as seconds, minutes or hours.
#[must_use]
pub fn format_time(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.1} seconds")
    } else if seconds < 3600.0 {
        format!("{:.1} minutes", seconds / 60.0)
    } else {
        format!("{:.1} hours", seconds / 3600.0)
    }
}
