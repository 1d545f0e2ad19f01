//! Braille sparkline rendering for reporting handlers.
//!
//! Each output character is a 2x4 braille cell holding two adjacent data
//! columns; the series is linearly resampled to twice the requested cell
//! count before quantizing.

/// Braille cells indexed by [left column height][right column height],
/// heights 0..=4.
const CELLS: [&str; 5] = [
    "\u{2800}\u{2880}\u{28a0}\u{28b0}\u{28b8}",
    "\u{2840}\u{28c0}\u{28e0}\u{28f0}\u{28f8}",
    "\u{2844}\u{28c4}\u{28e4}\u{28f4}\u{28fc}",
    "\u{2846}\u{28c6}\u{28e6}\u{28f6}\u{28fe}",
    "\u{2847}\u{28c7}\u{28e7}\u{28f7}\u{28ff}",
];

/// Renders a series as `min⇣[graph]⇡max`, using `cells` characters for
/// the graph body. Returns an empty string for an empty series.
pub fn sparkline(data: &[f64], cells: usize, fmt: impl Fn(f64) -> String) -> String {
    if data.is_empty() || cells == 0 {
        return String::new();
    }

    let high = data.iter().cloned().fold(f64::MIN, f64::max);
    let low = data.iter().cloned().fold(f64::MAX, f64::min);

    let resampled = resample(data, cells * 2);
    let quantized: Vec<usize> = resampled
        .iter()
        .map(|v| {
            let scaled = ((v - low) / (high - low + 1e-6)) * 5.0;
            (scaled.floor() as isize).clamp(0, 4) as usize
        })
        .collect();

    let graph: String = quantized
        .chunks(2)
        .map(|pair| {
            let left = pair[0];
            let right = pair.get(1).copied().unwrap_or(0);
            CELLS[left].chars().nth(right).expect("height is clamped to 0..=4")
        })
        .collect();

    format!("{}\u{21e3}[{}]\u{21e1}{}", fmt(low), graph, fmt(high))
}

/// Linear resampling to exactly `points` samples.
fn resample(data: &[f64], points: usize) -> Vec<f64> {
    if data.len() == points {
        return data.to_vec();
    }
    if data.len() == 1 {
        return vec![data[0]; points];
    }
    (0..points)
        .map(|i| {
            let pos = i as f64 * (data.len() - 1) as f64 / (points - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            data[lo] * (1.0 - frac) + data[hi] * frac
        })
        .collect()
}
