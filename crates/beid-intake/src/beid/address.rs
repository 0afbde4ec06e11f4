use regex::Regex;
use std::sync::OnceLock;

const MAX_STREET_CHARS: usize = 200;
const MAX_BOX_CHARS: usize = 5;

/// Street line split into its Belgian address components.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreetAddress {
    pub street: String,
    pub street_no: String,
    pub street_box: String,
    /// Overflow for box values too long to be a box number.
    pub addr2: String,
}

static NUMBER_PATTERN: OnceLock<Regex> = OnceLock::new();
static BOX_MARKER_END: OnceLock<Regex> = OnceLock::new();
static BOX_PATTERN: OnceLock<Regex> = OnceLock::new();

fn number_pattern() -> &'static Regex {
    NUMBER_PATTERN.get_or_init(|| {
        Regex::new(r"[\s,](?P<no>\d+[[:alpha:]]?)\b").expect("number pattern compiles")
    })
}

/// Text ending in a box marker, so the number after it is a box, not a house number.
fn box_marker_end() -> &'static Regex {
    BOX_MARKER_END.get_or_init(|| {
        Regex::new(r"(?i)(?:/|\b(?:bte|bus|boîte|boite|b)\.?)$")
            .expect("box marker pattern compiles")
    })
}

fn box_pattern() -> &'static Regex {
    BOX_PATTERN.get_or_init(|| {
        Regex::new(r"^(?i)(?:(?:bte|bus|boîte|boite)\.?\s*|b(?:\.\s*|\s+))(?P<value>\S.*)$")
            .expect("box pattern compiles")
    })
}

/// Split a card's `streetAndNumber` line, e.g. `Rue de l'Église 12 bte 3`.
///
/// The house number is the last number group not introduced by a box
/// marker, so street names may contain numbers (`Avenue du 11 Novembre 5`).
/// Lines without a house number are kept whole as the street.
pub fn split_street(raw: &str) -> StreetAddress {
    let line = raw.trim();

    let house_number = number_pattern()
        .captures_iter(line)
        .filter_map(|captures| {
            let number = captures.name("no")?;
            let street = line[..number.start()].trim().trim_end_matches(',').trim_end();
            let boxed = box_marker_end().is_match(street);
            (!street.is_empty() && !boxed).then(|| (street, number))
        })
        .last();

    let Some((street, number)) = house_number else {
        return StreetAddress {
            street: line.chars().take(MAX_STREET_CHARS).collect(),
            ..StreetAddress::default()
        };
    };

    let box_value = strip_box_marker(&line[number.end()..]);
    let mut address = StreetAddress {
        street: street.to_string(),
        street_no: number.as_str().to_string(),
        ..StreetAddress::default()
    };

    if box_value.chars().count() > MAX_BOX_CHARS {
        address.addr2 = box_value;
    } else {
        address.street_box = box_value;
    }

    address
}

fn strip_box_marker(rest: &str) -> String {
    let trimmed = rest.trim().trim_start_matches('/').trim_start();
    match box_pattern().captures(trimmed) {
        Some(captures) => captures["value"].trim().to_string(),
        None => trimmed.to_string(),
    }
}
