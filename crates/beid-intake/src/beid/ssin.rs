//! Belgian national register numbers (INSZ/NISS).
//!
//! A raw number has 11 digits: birth date (YYMMDD), a serial (3 digits) and a
//! mod-97 check (2 digits). The canonical display format separates the parts
//! with a century marker, e.g. `680601 053-29` for people born in the 1900s
//! and `010203=123-45` for people born in the 2000s.

use tracing::warn;

const YEAR_1900: char = ' ';
const YEAR_2000: char = '=';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SsinError {
    #[error("Invalid national id '{raw}': a raw national id must have 11 digits, got {digits}")]
    WrongLength { raw: String, digits: usize },
}

/// Reformat a raw national id into its display format.
///
/// Blank input yields an empty string. A failing check digit is tolerated
/// (the card chip is authoritative) but logged.
pub fn format_national_id(raw: &str) -> Result<String, SsinError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }

    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if digits.len() != 11 {
        return Err(SsinError::WrongLength {
            raw: trimmed.to_string(),
            digits: digits.len(),
        });
    }

    let separator = century_marker(&digits).unwrap_or_else(|| {
        warn!(national_id = %digits, "national id fails the mod-97 check");
        YEAR_1900
    });

    Ok(format!(
        "{}{}{}-{}",
        &digits[..6],
        separator,
        &digits[6..9],
        &digits[9..]
    ))
}

/// Whether a formatted or raw id passes the check digit for either century.
pub fn is_valid(national_id: &str) -> bool {
    let digits: String = national_id.chars().filter(char::is_ascii_digit).collect();
    digits.len() == 11 && century_marker(&digits).is_some()
}

fn century_marker(digits: &str) -> Option<char> {
    let body: u64 = digits[..9].parse().ok()?;
    let check: u64 = digits[9..].parse().ok()?;

    if 97 - body % 97 == check {
        Some(YEAR_1900)
    } else if 97 - (2_000_000_000 + body) % 97 == check {
        Some(YEAR_2000)
    } else {
        None
    }
}
