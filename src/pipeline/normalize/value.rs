//! Canonical string rendering for the values that end up in table cells.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Number, Value};

/// Render an arbitrary JSON value the way a generic table cell expects it:
/// `null` is empty, strings are verbatim, numbers are minimal decimals and
/// nested values fall back to compact JSON.
pub fn render_json_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Integers are printed exactly, everything else goes through [`format_float`].
pub fn format_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    n.as_f64().map(format_float).unwrap_or_else(|| n.to_string())
}

/// Shortest round-trippable decimal. Exponent notation is only used for very
/// large or very small magnitudes (`1e+21`, `1e-05`).
pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if v == 0.0 {
        return "0".to_string();
    }

    let scientific = format!("{:e}", v);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => return format!("{}", v),
    };

    if (-4..21).contains(&exponent) {
        format!("{}", v)
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    }
}

/// Timestamp at second precision, always in UTC with a `Z` suffix.
pub fn format_rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC-3339 string and re-render it at second precision.
pub fn normalize_rfc3339(raw: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| format_rfc3339(&dt.with_timezone(&Utc)))
}

/// Convert a Unix epoch number into RFC-3339. Integral epochs keep second
/// precision; fractional ones keep their sub-second digits with trailing
/// zeros trimmed.
pub fn format_epoch(n: &Number) -> Option<String> {
    let (secs, nanos) = if let Some(i) = n.as_i64() {
        (i, 0)
    } else {
        split_epoch(&n.to_string()).or_else(|| n.as_f64().map(split_epoch_f64))?
    };

    let ts = Utc.timestamp_opt(secs, nanos).single()?;
    let mut out = ts.format("%Y-%m-%dT%H:%M:%S").to_string();
    if nanos > 0 {
        let frac = format!("{:09}", nanos);
        out.push('.');
        out.push_str(frac.trim_end_matches('0'));
    }
    out.push('Z');
    Some(out)
}

/// Split the decimal text of an epoch into whole seconds and nanoseconds
/// without going through binary floating point.
fn split_epoch(text: &str) -> Option<(i64, u32)> {
    if text.contains(['e', 'E']) {
        return None;
    }
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (whole, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let mut secs: i64 = whole.parse().ok()?;
    let mut padded: String = frac.chars().take(9).collect();
    while padded.len() < 9 {
        padded.push('0');
    }
    let mut nanos: u32 = padded.parse().ok()?;
    if negative {
        secs = -secs;
        if nanos > 0 {
            secs -= 1;
            nanos = 1_000_000_000 - nanos;
        }
    }
    Some((secs, nanos))
}

fn split_epoch_f64(v: f64) -> (i64, u32) {
    let secs = v.floor();
    let nanos = ((v - secs) * 1e9).round().min(999_999_999.0) as u32;
    (secs as i64, nanos)
}

/// An arbitrary-precision decimal quantity (`1.50`, `100m`, `2Ki`, `1e3`)
/// rendered back in canonical decimal form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantity {
    unscaled: i128,
    /// Number of digits after the decimal point; negative means trailing zeros.
    scale: i32,
}

/// Finest precision kept; anything beyond is rounded away from zero.
const MAX_SCALE: i32 = 9;

/// Largest decimal exponent accepted in either direction. Larger magnitudes
/// are treated as unparsable.
const MAX_EXPONENT: i32 = 40;

impl Quantity {
    pub fn parse(input: &str) -> Option<Self> {
        let s = input.trim();
        let (negative, s) = match s.as_bytes().first()? {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };

        let number_end = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        let (number, suffix) = s.split_at(number_end);
        let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && frac.is_empty() {
            return None;
        }
        if frac.contains('.') {
            return None;
        }

        let digits = format!("{whole}{frac}");
        let mut unscaled: i128 = if digits.is_empty() { 0 } else { digits.parse().ok()? };
        let mut scale = i32::try_from(frac.len()).ok()?;

        match suffix {
            "" => {}
            "Ki" | "Mi" | "Gi" | "Ti" | "Pi" | "Ei" => {
                let power = match suffix {
                    "Ki" => 1,
                    "Mi" => 2,
                    "Gi" => 3,
                    "Ti" => 4,
                    "Pi" => 5,
                    _ => 6,
                };
                unscaled = unscaled.checked_mul(1024_i128.checked_pow(power)?)?;
            }
            "n" => scale += 9,
            "u" => scale += 6,
            "m" => scale += 3,
            "k" => scale -= 3,
            "M" => scale -= 6,
            "G" => scale -= 9,
            "T" => scale -= 12,
            "P" => scale -= 15,
            "E" => scale -= 18,
            exp if exp.starts_with(['e', 'E']) => {
                let exponent: i32 = exp[1..].parse().ok()?;
                scale = scale.checked_sub(exponent)?;
            }
            _ => return None,
        }
        if !(-MAX_EXPONENT..=MAX_EXPONENT).contains(&scale) {
            return None;
        }

        if negative {
            unscaled = -unscaled;
        }
        Some(Self { unscaled, scale }.round_to_max_scale())
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Self::parse(s),
            Value::Number(n) => Self::parse(&n.to_string()),
            _ => None,
        }
    }

    fn round_to_max_scale(self) -> Self {
        if self.scale <= MAX_SCALE {
            return self;
        }
        let divisor = match 10_i128.checked_pow((self.scale - MAX_SCALE) as u32) {
            Some(d) => d,
            None => {
                return Self {
                    unscaled: self.unscaled.signum(),
                    scale: MAX_SCALE,
                }
            }
        };
        let mut unscaled = self.unscaled / divisor;
        if self.unscaled % divisor != 0 {
            unscaled += self.unscaled.signum();
        }
        Self {
            unscaled,
            scale: MAX_SCALE,
        }
    }

    pub fn to_canonical_string(&self) -> String {
        if self.unscaled == 0 && self.scale <= 0 {
            return "0".to_string();
        }
        let sign = if self.unscaled < 0 { "-" } else { "" };
        let digits = self.unscaled.unsigned_abs().to_string();

        if self.scale <= 0 {
            return format!("{sign}{digits}{}", "0".repeat(self.scale.unsigned_abs() as usize));
        }

        let scale = self.scale as usize;
        let padded = if digits.len() <= scale {
            format!("{}{}", "0".repeat(scale + 1 - digits.len()), digits)
        } else {
            digits
        };
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        format!("{sign}{int_part}.{frac_part}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn quantity(s: &str) -> String {
        Quantity::parse(s).unwrap().to_canonical_string()
    }

    #[test]
    fn test_json_values_render_minimally() {
        assert_eq!(render_json_value(&json!(null)), "");
        assert_eq!(render_json_value(&json!("name")), "name");
        assert_eq!(render_json_value(&json!(0.34)), "0.34");
        assert_eq!(render_json_value(&json!(1.40)), "1.4");
        assert_eq!(render_json_value(&json!(10)), "10");
        assert_eq!(render_json_value(&json!(true)), "true");
        assert_eq!(render_json_value(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn test_format_float_switches_to_exponent_at_extremes() {
        assert_eq!(format_float(1e21), "1e+21");
        assert_eq!(format_float(0.00001), "1e-05");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(123456789.5), "123456789.5");
        assert_eq!(format_float(-2.5), "-2.5");
    }

    #[test]
    fn test_fractional_epoch_keeps_subsecond_digits() {
        let n: Number = serde_json::from_str("1765210903.436").unwrap();
        assert_eq!(format_epoch(&n).unwrap(), "2025-12-08T16:21:43.436Z");
    }

    #[test]
    fn test_integer_epoch_has_second_precision() {
        let n: Number = serde_json::from_str("1765210903").unwrap();
        assert_eq!(format_epoch(&n).unwrap(), "2025-12-08T16:21:43Z");
    }

    #[test]
    fn test_normalize_rfc3339_converts_to_utc() {
        assert_eq!(
            normalize_rfc3339("2024-03-01T10:00:00.250+02:00").unwrap(),
            "2024-03-01T08:00:00Z"
        );
        assert!(normalize_rfc3339("yesterday").is_none());
    }

    #[test]
    fn test_quantity_canonical_forms() {
        assert_eq!(quantity("1.50"), "1.50");
        assert_eq!(quantity("0.5"), "0.5");
        assert_eq!(quantity("-12.25"), "-12.25");
        assert_eq!(quantity("100m"), "0.100");
        assert_eq!(quantity("2k"), "2000");
        assert_eq!(quantity("1Ki"), "1024");
        assert_eq!(quantity("1e3"), "1000");
        assert_eq!(quantity("15E-1"), "1.5");
        assert_eq!(quantity("0"), "0");
        assert_eq!(quantity("0.0000000001"), "0.000000001");
    }

    #[test]
    fn test_quantity_rejects_garbage() {
        assert!(Quantity::parse("").is_none());
        assert!(Quantity::parse("abc").is_none());
        assert!(Quantity::parse("1.2.3").is_none());
        assert!(Quantity::parse("5X").is_none());
    }

    #[test]
    fn test_quantity_rejects_out_of_range_exponents() {
        assert!(Quantity::parse("0.5e-2147483647").is_none());
        assert!(Quantity::parse("1e2000000000").is_none());
        assert!(Quantity::parse("1e-2147483648").is_none());
        assert!(Quantity::parse("1e41").is_none());
        assert_eq!(quantity("1e40").len(), 41);
        assert_eq!(quantity("1e-40"), "0.000000001");
    }

    #[test]
    fn test_quantity_from_json_number() {
        assert_eq!(
            Quantity::from_json(&json!(12.5)).unwrap().to_canonical_string(),
            "12.5"
        );
        assert!(Quantity::from_json(&json!(null)).is_none());
    }
}
