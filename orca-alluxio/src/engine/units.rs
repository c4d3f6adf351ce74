//! Byte-size conversions between the cache runtime's report dialect and
//! the operator's display convention.
//!
//! The runtime's text reports label sizes with decimal-looking suffixes
//! (`KB`, `MB`, `GB`) while meaning powers of 1024; the operator
//! re-renders them with explicit binary labels (`KiB`, `MiB`, `GiB`)
//! without rescaling the magnitude, so `19.07MB` in a report becomes
//! `19.07MiB` in status. That relabel-only convention is long-standing
//! and preserved for compatibility.

use std::sync::OnceLock;

use regex::Regex;

use super::error::EngineError;

const BINARY_ABBRS: [&str; 9] =
    ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];

fn size_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([0-9]+(?:\.[0-9]+)?)\s*([A-Za-z]*)$")
            .expect("static pattern")
    })
}

/// Parses a human-readable size into bytes. Accepts report values like
/// `19.07MB`, `0B`, `2GiB`, bare numerals, and gauge values with
/// thousands separators like `9,842,601`. All unit prefixes are binary
/// (powers of 1024) regardless of spelling.
pub fn parse_human_size(s: &str) -> Result<i64, EngineError> {
    let cleaned = s.trim().replace(',', "");
    let caps = size_pattern().captures(&cleaned).ok_or_else(|| {
        EngineError::Parse(format!("malformed size literal {s:?}"))
    })?;
    let number: f64 = caps[1]
        .parse()
        .map_err(|_| EngineError::Parse(format!("malformed numeral {s:?}")))?;

    // normalize the suffix: strip a trailing `b` and an optional `i`,
    // leaving the bare prefix letter
    let mut unit = caps[2].to_ascii_lowercase();
    if let Some(stripped) = unit.strip_suffix('b') {
        unit = stripped.to_string();
    }
    if let Some(stripped) = unit.strip_suffix('i') {
        unit = stripped.to_string();
    }
    let multiplier: f64 = match unit.as_str() {
        "" => 1.0,
        "k" => 1024.0,
        "m" => 1024.0 * 1024.0,
        "g" => 1024.0 * 1024.0 * 1024.0,
        "t" => 1024.0f64.powi(4),
        "p" => 1024.0f64.powi(5),
        _ => {
            return Err(EngineError::Parse(format!(
                "unrecognized size suffix in {s:?}"
            )));
        }
    };

    Ok((number * multiplier) as i64)
}

/// Renders a byte count with binary-prefix labels and four significant
/// digits, e.g. `20001587` -> `"19.07MiB"`.
pub fn format_bytes(bytes: i64) -> String {
    let mut size = bytes as f64;
    let mut idx = 0;
    while size >= 1024.0 && idx < BINARY_ABBRS.len() - 1 {
        size /= 1024.0;
        idx += 1;
    }
    format!("{}{}", format_significant(size), BINARY_ABBRS[idx])
}

/// Renders a ratio in percent with one decimal, e.g. `38.66` -> `"38.7%"`.
pub fn format_percent(value: f64) -> String {
    format!("{value:.1}%")
}

// four significant digits, trailing zeros trimmed (printf %.4g)
fn format_significant(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let int_digits = value.abs().log10().floor() as i32 + 1;
    let decimals = (4 - int_digits).max(0) as usize;
    let rendered = format!("{value:.decimals$}");
    if rendered.contains('.') {
        rendered
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_report_dialect_sizes() {
        assert_eq!(parse_human_size("0B").unwrap(), 0);
        assert_eq!(parse_human_size("19.37MB").unwrap(), 20310917);
        assert_eq!(parse_human_size("30.75MB").unwrap(), 32243712);
        assert_eq!(parse_human_size("2GB").unwrap(), 2 * 1024 * 1024 * 1024);
        assert_eq!(parse_human_size("2GiB").unwrap(), 2 * 1024 * 1024 * 1024);
        assert_eq!(parse_human_size("512").unwrap(), 512);
    }

    #[test]
    fn parses_thousands_separated_gauges() {
        assert_eq!(parse_human_size("9,842,601").unwrap(), 9_842_601);
        assert_eq!(parse_human_size("20,000,000").unwrap(), 20_000_000);
    }

    #[test]
    fn rejects_malformed_literals() {
        assert!(parse_human_size("10XB").is_err());
        assert!(parse_human_size("abc").is_err());
        assert!(parse_human_size("").is_err());
        assert!(parse_human_size("1.2.3MB").is_err());
    }

    #[test]
    fn formats_binary_labels() {
        assert_eq!(format_bytes(0), "0B");
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2 * 1024 * 1024 * 1024), "2GiB");
        assert_eq!(format_bytes(9_842_601), "9.387MiB");
    }

    #[test]
    fn relabels_without_rescaling() {
        // the report's "MB" is binary, so the numeral survives the
        // round trip with only the label changing
        assert_eq!(
            format_bytes(parse_human_size("19.07MB").unwrap()),
            "19.07MiB"
        );
        assert_eq!(
            format_bytes(parse_human_size("9.69MB").unwrap()),
            "9.69MiB"
        );
    }

    #[test]
    fn round_trips_on_magnitude() {
        for s in ["2GB", "19.07MB", "512KB", "0B", "31.5GiB"] {
            let bytes = parse_human_size(s).unwrap();
            let reparsed = parse_human_size(&format_bytes(bytes)).unwrap();
            assert_eq!(bytes, reparsed, "round trip of {s}");
        }
    }

    #[test]
    fn formats_percentages() {
        assert_eq!(format_percent(38.665), "38.7%");
        assert_eq!(format_percent(0.0), "0.0%");
        assert_eq!(format_percent(100.0), "100.0%");
    }
}
