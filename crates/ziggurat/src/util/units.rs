//! Duration and byte humanizers for reporting handlers.

use std::time::Duration;

const TIME_UNITS: &[(&str, f64)] = &[
    ("w", 604_800.0),
    ("d", 86_400.0),
    ("h", 3_600.0),
    ("m", 60.0),
    ("s", 1.0),
    ("ms", 0.001),
];

const BYTE_UNITS: &[(&str, f64)] = &[
    ("tb", 1_099_511_627_776.0),
    ("gb", 1_073_741_824.0),
    ("mb", 1_048_576.0),
    ("kb", 1_024.0),
    ("b", 1.0),
];

/// `1w 2d 3h`-style rendering with at most three units, stopping at
/// milliseconds.
pub fn humanize_duration(duration: Duration) -> String {
    let rendered = ripper(duration.as_secs_f64(), TIME_UNITS, 3, 0, " ");
    if rendered.is_empty() {
        "<1ms".to_string()
    } else {
        rendered
    }
}

/// `1.50kb`-style rendering: the single leading unit with two decimals.
pub fn humanize_bytes(bytes: u64) -> String {
    let rendered = ripper(bytes as f64, BYTE_UNITS, 1, 2, "");
    if rendered.is_empty() {
        "0b".to_string()
    } else {
        rendered
    }
}

/// Rips an amount apart along a unit table, largest unit first, emitting
/// from the first non-zero unit on.
fn ripper(
    amount: f64,
    units: &[(&str, f64)],
    mut max_units: usize,
    last_decimals: u32,
    sep: &str,
) -> String {
    let mut remainder = amount;
    let mut parts: Vec<(String, &str)> = Vec::new();
    let mut assigning = false;
    let mut last_factor = 1.0;

    for (unit, factor) in units {
        let value = (remainder / factor).floor();
        remainder -= value * factor;
        if value > 0.0 {
            assigning = true;
        }
        if assigning {
            parts.push(((value as u64).to_string(), unit));
            last_factor = *factor;
            max_units -= 1;
            if max_units == 0 {
                break;
            }
        }
    }

    if parts.is_empty() {
        return String::new();
    }

    if last_decimals > 0 {
        if let Some(last) = parts.last_mut() {
            let scale = 10f64.powi(last_decimals as i32);
            let decimals = (scale * (remainder / last_factor)) as u64;
            last.0 = format!(
                "{}.{decimals:0>width$}",
                last.0,
                width = last_decimals as usize
            );
        }
    }

    parts
        .iter()
        .map(|(value, unit)| format!("{value}{unit}"))
        .collect::<Vec<_>>()
        .join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_render_three_leading_units() {
        let d = Duration::from_secs(8 * 86_400 + 3 * 3_600 + 25 * 60 + 7);
        assert_eq!(humanize_duration(d), "1w 1d 3h");
        assert_eq!(humanize_duration(Duration::from_secs(61)), "1m 1s 0ms");
        assert_eq!(humanize_duration(Duration::from_millis(250)), "250ms");
    }

    #[test]
    fn sub_millisecond_durations_do_not_vanish() {
        assert_eq!(humanize_duration(Duration::from_micros(40)), "<1ms");
    }

    #[test]
    fn bytes_render_one_unit_with_decimals() {
        assert_eq!(humanize_bytes(1536), "1.50kb");
        assert_eq!(humanize_bytes(3 * 1_048_576), "3.00mb");
        assert_eq!(humanize_bytes(0), "0b");
        assert_eq!(humanize_bytes(512), "512.00b");
    }
}
