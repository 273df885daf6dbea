use crate::obis_utils;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum LineParseError {
    #[error("Line has no value part")]
    MissingValue,
    #[error("Invalid OBIS identifier {0:?}")]
    InvalidIdentifier(String),
}

/// One data line split into the identifier and everything after it
#[derive(Debug, Clone, PartialEq)]
pub struct TelegramLine<'a> {
    pub identifier: &'a str,
    /// The parenthesized value groups, e.g. `(001.234*kWh)`
    pub remainder: &'a str,
}

pub fn parse_obis_line(line: &str) -> Result<TelegramLine<'_>, LineParseError> {
    // Example formats:
    // 1-0:1.8.1(000123.456*kWh)
    // 0-0:96.13.0()
    // 0-1:24.2.1(101209112500W)(12785.123*m3)

    let line = line.trim_end_matches(['\r', '\n']);

    let paren_start = line.find('(')
        .ok_or(LineParseError::MissingValue)?;

    let identifier = &line[..paren_start];
    if !obis_utils::validate_obis_code(identifier) {
        return Err(LineParseError::InvalidIdentifier(identifier.to_string()));
    }

    Ok(TelegramLine {
        identifier,
        remainder: &line[paren_start..],
    })
}
