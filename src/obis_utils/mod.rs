use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // A-B:C.D.E with an optional *F storage suffix
    static ref OBIS_CODE: Regex = Regex::new(r"^\d{1,3}-\d{1,3}:\d{1,3}\.\d{1,3}\.\d{1,3}(\*\d{1,3})?$").unwrap();
    static ref DECIMAL: Regex = Regex::new(r"^[+-]?\d+(\.\d+)?$").unwrap();
    // values written unquoted into line protocol
    static ref BARE_TOKEN: Regex = Regex::new(r"^[0-9A-Za-z.+-]+$").unwrap();
}

pub fn validate_obis_code(code: &str) -> bool {
    // OBIS code format: A-B:C.D.E*F
    // A: Medium (0=abstract, 1=electricity, 6=heat, 7=gas, 8=water)
    // B: Channel (0-15, 1-4 are M-Bus devices like a gas meter)
    // C: Physical value
    // D: Processing method
    // E: Tariff/Time
    // F: Storage (optional)
    OBIS_CODE.is_match(code)
}

pub fn is_decimal(value: &str) -> bool {
    DECIMAL.is_match(value)
}

/// True for values that can be written into line protocol without quoting
pub fn is_bare_token(value: &str) -> bool {
    BARE_TOKEN.is_match(value)
}

/// Splits the parenthesized groups of a line remainder, `(a)(b)` gives `["a", "b"]`.
/// A value without parentheses is returned as a single group.
pub fn split_groups(raw: &str) -> Vec<&str> {
    let raw = raw.trim();
    if !raw.starts_with('(') {
        return vec![raw];
    }

    let mut groups = Vec::new();
    let mut rest = raw;
    while let Some(start) = rest.find('(') {
        match rest[start + 1..].find(')') {
            Some(len) => {
                groups.push(&rest[start + 1..start + 1 + len]);
                rest = &rest[start + 2 + len..];
            }
            None => {
                /* unterminated group, take what is there */
                groups.push(&rest[start + 1..]);
                break;
            }
        }
    }
    groups
}

/// Splits `001.234*kWh` into the magnitude and the unit
pub fn split_unit(value: &str) -> (&str, Option<&str>) {
    match value.rfind('*') {
        Some(star_pos) => {
            let unit = &value[star_pos + 1..];
            if unit.is_empty() {
                (&value[..star_pos], None)
            } else {
                (&value[..star_pos], Some(unit))
            }
        }
        None => (value, None),
    }
}

/// Decodes hex encoded telegram text. Returns `None` if the input is not hex
/// or does not decode to printable text.
pub fn decode_hex_text(value: &str) -> Option<String> {
    if value.is_empty() || value.len() % 2 != 0 {
        return None;
    }
    let bytes = hex::decode(value).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    if text.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
        Some(text)
    } else {
        None
    }
}

/// Parses the DSMR timestamp format `YYMMDDhhmmssX`. `X` is `W` for winter
/// time (UTC+1) and `S` for summer time (UTC+2).
pub fn parse_telegram_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    if value.len() != 13 || !value.is_ascii() {
        return None;
    }
    let offset = match &value[12..] {
        "W" => FixedOffset::east_opt(3600)?,
        "S" => FixedOffset::east_opt(7200)?,
        _ => return None,
    };
    let naive = NaiveDateTime::parse_from_str(&value[..12], "%y%m%d%H%M%S").ok()?;
    offset.from_local_datetime(&naive).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_obis_code() {
        assert!(validate_obis_code("1-0:1.8.1"));
        assert!(validate_obis_code("0-0:1.0.0"));
        assert!(validate_obis_code("1-0:15.7.0"));
        assert!(validate_obis_code("1-0:99.97.0"));
        assert!(validate_obis_code("1-0:1.8.0*255"));
        assert!(!validate_obis_code("invalid"));
        assert!(!validate_obis_code("1:2.3.4"));
        assert!(!validate_obis_code("1-0:1.8"));
        assert!(!validate_obis_code(" 1-0:1.8.1"));
        assert!(!validate_obis_code("/ISK5\\2M550T-1012"));
    }

    #[test]
    fn test_split_groups() {
        assert_eq!(split_groups("(001.234*kWh)"), vec!["001.234*kWh"]);
        assert_eq!(split_groups("001.234*kWh"), vec!["001.234*kWh"]);
        assert_eq!(split_groups("(101209112500W)(12785.123*m3)"), vec!["101209112500W", "12785.123*m3"]);
        assert_eq!(split_groups("()"), vec![""]);
        assert_eq!(split_groups("(12"), vec!["12"]);
    }

    #[test]
    fn test_split_unit() {
        assert_eq!(split_unit("123.456*kWh"), ("123.456", Some("kWh")));
        assert_eq!(split_unit("1.234*kW"), ("1.234", Some("kW")));
        assert_eq!(split_unit("123456"), ("123456", None));
        assert_eq!(split_unit("123*"), ("123", None));
    }

    #[test]
    fn test_is_decimal() {
        assert!(is_decimal("001.234"));
        assert!(is_decimal("-0.5"));
        assert!(is_decimal("42"));
        assert!(!is_decimal("abc"));
        assert!(!is_decimal("1e5"));
        assert!(!is_decimal("inf"));
        assert!(!is_decimal("1."));
        assert!(!is_decimal(""));
    }

    #[test]
    fn test_is_bare_token() {
        assert!(is_bare_token("0002"));
        assert!(is_bare_token("-1.5"));
        assert!(is_bare_token("ABC123"));
        assert!(!is_bare_token(""));
        assert!(!is_bare_token("0002 evil=1"));
        assert!(!is_bare_token("1,2"));
        assert!(!is_bare_token("\"x\""));
    }

    #[test]
    fn test_decode_hex_text() {
        assert_eq!(decode_hex_text("4B384547303034303436333935353037"), Some("K8EG004046395507".to_string()));
        assert_eq!(decode_hex_text("48656c6c6f20576f726c64"), Some("Hello World".to_string()));
        assert_eq!(decode_hex_text("XYZ1"), None);
        assert_eq!(decode_hex_text("0102"), None);
        assert_eq!(decode_hex_text(""), None);
    }

    #[test]
    fn test_parse_telegram_timestamp() {
        let ts = parse_telegram_timestamp("101209113020W").unwrap();
        assert_eq!(ts.to_rfc3339(), "2010-12-09T11:30:20+01:00");

        let ts = parse_telegram_timestamp("170701120000S").unwrap();
        assert_eq!(ts.timestamp(), 1498903200);

        assert!(parse_telegram_timestamp("101209113020X").is_none());
        assert!(parse_telegram_timestamp("1012091130W").is_none());
        assert!(parse_telegram_timestamp("50").is_none());
    }
}
