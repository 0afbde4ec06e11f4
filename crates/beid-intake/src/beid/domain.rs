use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for persisted card holders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HolderId(pub String);

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Translate the reader's `gender` code. Anything else is unknown.
    pub fn from_card_code(code: &str) -> Option<Self> {
        match code.trim() {
            "MALE" => Some(Self::Male),
            "FEMALE" => Some(Self::Female),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

/// Document types printed on Belgian identity cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    BelgianCitizen,
    KidsCard,
    Habilitation,
    ForeignerA,
    ForeignerB,
    ForeignerC,
    ForeignerD,
    ForeignerE,
    ForeignerEPlus,
    ForeignerF,
    ForeignerFPlus,
}

impl CardType {
    const TABLE: &'static [(u16, CardType)] = &[
        (1, CardType::BelgianCitizen),
        (6, CardType::KidsCard),
        (8, CardType::Habilitation),
        (11, CardType::ForeignerA),
        (12, CardType::ForeignerB),
        (13, CardType::ForeignerC),
        (14, CardType::ForeignerD),
        (15, CardType::ForeignerE),
        (16, CardType::ForeignerEPlus),
        (17, CardType::ForeignerF),
        (18, CardType::ForeignerFPlus),
    ];

    pub fn from_code(code: &str) -> Option<Self> {
        let numeric = code.trim().parse::<u16>().ok()?;
        Self::TABLE
            .iter()
            .find(|(value, _)| *value == numeric)
            .map(|(_, card_type)| *card_type)
    }

    pub fn code(self) -> u16 {
        Self::TABLE
            .iter()
            .find(|(_, card_type)| *card_type == self)
            .map(|(value, _)| *value)
            .unwrap_or_default()
    }

    pub fn label(self) -> &'static str {
        match self {
            CardType::BelgianCitizen => "Belgian citizen",
            CardType::KidsCard => "Kids card (< 12 year)",
            CardType::Habilitation => "Habilitation",
            CardType::ForeignerA => "Foreigner card A",
            CardType::ForeignerB => "Foreigner card B",
            CardType::ForeignerC => "Foreigner card C",
            CardType::ForeignerD => "Foreigner card D",
            CardType::ForeignerE => "Foreigner card E",
            CardType::ForeignerEPlus => "Foreigner card E+",
            CardType::ForeignerF => "Foreigner card F",
            CardType::ForeignerFPlus => "Foreigner card F+",
        }
    }
}

/// A calendar date whose month and/or day may be unknown (stored as 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartialDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid partial date '{0}'")]
pub struct PartialDateError(pub String);

impl PartialDate {
    /// Parse `YYYY`, `YYYY-MM` or `YYYY-MM-DD`, where `00` marks an unknown component.
    pub fn parse(raw: &str) -> Result<Self, PartialDateError> {
        let invalid = || PartialDateError(raw.to_string());
        let parts: Vec<&str> = raw.trim().split('-').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(invalid());
        }

        let component = |index: usize| -> Result<u32, PartialDateError> {
            match parts.get(index) {
                Some(part) => part.trim().parse::<u32>().map_err(|_| invalid()),
                None => Ok(0),
            }
        };

        let year = component(0)?;
        let month = component(1)?;
        let day = component(2)?;

        if year == 0 || year > 9999 || month > 12 || day > 31 || (month == 0 && day != 0) {
            return Err(invalid());
        }

        let date = Self {
            year: year as u16,
            month: month as u8,
            day: day as u8,
        };

        if date.is_complete() && date.to_naive_date().is_none() {
            return Err(invalid());
        }

        Ok(date)
    }

    pub fn is_complete(&self) -> bool {
        self.month != 0 && self.day != 0
    }

    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(i32::from(self.year), u32::from(self.month), u32::from(self.day))
    }
}

impl From<NaiveDate> for PartialDate {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year() as u16,
            month: date.month() as u8,
            day: date.day() as u8,
        }
    }
}

impl fmt::Display for PartialDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub iso_code: String,
    pub name: String,
}

/// A municipality, scoped to the ISO code of its country.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub country: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonName {
    pub first: String,
    pub middle: String,
    pub last: String,
}

impl PersonName {
    pub fn full_name(&self) -> String {
        [&self.first, &self.middle, &self.last]
            .iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Case-insensitive match on the parts that are filled in on `self`.
    pub fn matches(&self, candidate: &PersonName) -> bool {
        let pairs = [
            (&self.first, &candidate.first),
            (&self.middle, &candidate.middle),
            (&self.last, &candidate.last),
        ];
        let mut compared = false;
        for (wanted, actual) in pairs {
            let wanted = wanted.trim();
            if wanted.is_empty() {
                continue;
            }
            compared = true;
            if wanted.to_lowercase() != actual.trim().to_lowercase() {
                return false;
            }
        }
        compared
    }
}

/// Holder fields that can be filled from an eID card, in display order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum HolderField {
    NationalId,
    FirstName,
    MiddleName,
    LastName,
    BirthDate,
    BirthPlace,
    Gender,
    NobleCondition,
    CardNumber,
    CardIssuer,
    CardType,
    CardValidFrom,
    CardValidUntil,
    Street,
    StreetNo,
    StreetBox,
    Addr2,
    ZipCode,
    Country,
    City,
}

impl HolderField {
    pub const ALL: [HolderField; 20] = [
        HolderField::NationalId,
        HolderField::FirstName,
        HolderField::MiddleName,
        HolderField::LastName,
        HolderField::BirthDate,
        HolderField::BirthPlace,
        HolderField::Gender,
        HolderField::NobleCondition,
        HolderField::CardNumber,
        HolderField::CardIssuer,
        HolderField::CardType,
        HolderField::CardValidFrom,
        HolderField::CardValidUntil,
        HolderField::Street,
        HolderField::StreetNo,
        HolderField::StreetBox,
        HolderField::Addr2,
        HolderField::ZipCode,
        HolderField::Country,
        HolderField::City,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HolderField::NationalId => "national_id",
            HolderField::FirstName => "first_name",
            HolderField::MiddleName => "middle_name",
            HolderField::LastName => "last_name",
            HolderField::BirthDate => "birth_date",
            HolderField::BirthPlace => "birth_place",
            HolderField::Gender => "gender",
            HolderField::NobleCondition => "noble_condition",
            HolderField::CardNumber => "card_number",
            HolderField::CardIssuer => "card_issuer",
            HolderField::CardType => "card_type",
            HolderField::CardValidFrom => "card_valid_from",
            HolderField::CardValidUntil => "card_valid_until",
            HolderField::Street => "street",
            HolderField::StreetNo => "street_no",
            HolderField::StreetBox => "street_box",
            HolderField::Addr2 => "addr2",
            HolderField::ZipCode => "zip_code",
            HolderField::Country => "country",
            HolderField::City => "city",
        }
    }
}

impl fmt::Display for HolderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed value of a single holder field. `Empty` stands for both "unset" and "blank text".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Empty,
    Text(String),
    Date(NaiveDate),
    PartialDate(PartialDate),
    Gender(Gender),
    CardType(CardType),
    Country(String),
    Place(Place),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            FieldValue::Empty
        } else {
            FieldValue::Text(value)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Empty)
    }

    fn kind(&self) -> &'static str {
        match self {
            FieldValue::Empty => "empty",
            FieldValue::Text(_) => "text",
            FieldValue::Date(_) => "date",
            FieldValue::PartialDate(_) => "partial date",
            FieldValue::Gender(_) => "gender",
            FieldValue::CardType(_) => "card type",
            FieldValue::Country(_) => "country",
            FieldValue::Place(_) => "place",
        }
    }
}

impl<T> From<Option<T>> for FieldValue
where
    T: Into<FieldValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Empty)
    }
}

impl From<Gender> for FieldValue {
    fn from(value: Gender) -> Self {
        FieldValue::Gender(value)
    }
}

impl From<CardType> for FieldValue {
    fn from(value: CardType) -> Self {
        FieldValue::CardType(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl From<PartialDate> for FieldValue {
    fn from(value: PartialDate) -> Self {
        FieldValue::PartialDate(value)
    }
}

impl From<Place> for FieldValue {
    fn from(value: Place) -> Self {
        FieldValue::Place(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Empty => Ok(()),
            FieldValue::Text(value) | FieldValue::Country(value) => f.write_str(value),
            FieldValue::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            FieldValue::PartialDate(date) => write!(f, "{date}"),
            FieldValue::Gender(gender) => f.write_str(gender.label()),
            FieldValue::CardType(card_type) => f.write_str(card_type.label()),
            FieldValue::Place(place) => f.write_str(&place.name),
        }
    }
}

/// Field values derived from one card, ready to be compared with a holder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderFields {
    values: BTreeMap<HolderField, FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pending_place: Option<Place>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

impl HolderFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: HolderField, value: impl Into<FieldValue>) {
        self.values.insert(field, value.into());
    }

    pub fn get(&self, field: HolderField) -> Option<&FieldValue> {
        self.values.get(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (HolderField, &FieldValue)> + '_ {
        self.values.iter().map(|(field, value)| (*field, value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Municipality that does not exist yet and must be saved with the holder.
    pub fn pending_place(&self) -> Option<&Place> {
        self.pending_place.as_ref()
    }

    pub(crate) fn set_pending_place(&mut self, place: Place) {
        self.pending_place = Some(place);
    }

    /// Non-fatal problems noticed while reading the card.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub(crate) fn push_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn national_id(&self) -> String {
        self.text(HolderField::NationalId)
    }

    pub fn card_number(&self) -> String {
        self.text(HolderField::CardNumber)
    }

    pub fn person_name(&self) -> PersonName {
        PersonName {
            first: self.text(HolderField::FirstName),
            middle: self.text(HolderField::MiddleName),
            last: self.text(HolderField::LastName),
        }
    }

    fn text(&self, field: HolderField) -> String {
        self.get(field).map(ToString::to_string).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(HolderField),
    #[error("{field} cannot hold a {kind} value")]
    WrongKind {
        field: HolderField,
        kind: &'static str,
    },
    #[error("{field}: {reason}")]
    Invalid { field: HolderField, reason: String },
}

/// Capabilities the reconciler needs from a persisted holder type.
pub trait CardHolder: Clone + Send + Sync + 'static {
    /// A fresh, unsaved record with every field empty.
    fn blank() -> Self;
    fn holder_id(&self) -> Option<&HolderId>;
    fn version(&self) -> u64;
    /// Set by the store when the record is saved.
    fn stamp(&mut self, id: HolderId, version: u64);
    fn field(&self, field: HolderField) -> FieldValue;
    fn set_field(&mut self, field: HolderField, value: FieldValue) -> Result<(), ValidationError>;
    fn validate(&self) -> Result<(), ValidationError>;
    fn display_name(&self) -> String;

    fn national_id(&self) -> String {
        self.field(HolderField::NationalId).to_string()
    }

    fn person_name(&self) -> PersonName {
        PersonName {
            first: self.field(HolderField::FirstName).to_string(),
            middle: self.field(HolderField::MiddleName).to_string(),
            last: self.field(HolderField::LastName).to_string(),
        }
    }
}

/// Default holder record: a social-welfare client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: Option<HolderId>,
    pub version: u64,
    pub national_id: String,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub birth_date: Option<PartialDate>,
    pub birth_place: String,
    pub gender: Option<Gender>,
    pub noble_condition: String,
    pub card_number: String,
    pub card_issuer: String,
    pub card_type: Option<CardType>,
    pub card_valid_from: Option<NaiveDate>,
    pub card_valid_until: Option<NaiveDate>,
    pub street: String,
    pub street_no: String,
    pub street_box: String,
    pub addr2: String,
    pub zip_code: String,
    pub country: Option<String>,
    pub city: Option<Place>,
}

impl Client {
    fn text_slot(&mut self, field: HolderField) -> Option<&mut String> {
        let slot = match field {
            HolderField::NationalId => &mut self.national_id,
            HolderField::FirstName => &mut self.first_name,
            HolderField::MiddleName => &mut self.middle_name,
            HolderField::LastName => &mut self.last_name,
            HolderField::BirthPlace => &mut self.birth_place,
            HolderField::NobleCondition => &mut self.noble_condition,
            HolderField::CardNumber => &mut self.card_number,
            HolderField::CardIssuer => &mut self.card_issuer,
            HolderField::Street => &mut self.street,
            HolderField::StreetNo => &mut self.street_no,
            HolderField::StreetBox => &mut self.street_box,
            HolderField::Addr2 => &mut self.addr2,
            HolderField::ZipCode => &mut self.zip_code,
            _ => return None,
        };
        Some(slot)
    }
}

impl CardHolder for Client {
    fn blank() -> Self {
        Self::default()
    }

    fn holder_id(&self) -> Option<&HolderId> {
        self.id.as_ref()
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn stamp(&mut self, id: HolderId, version: u64) {
        self.id = Some(id);
        self.version = version;
    }

    fn field(&self, field: HolderField) -> FieldValue {
        match field {
            HolderField::NationalId => FieldValue::text(self.national_id.clone()),
            HolderField::FirstName => FieldValue::text(self.first_name.clone()),
            HolderField::MiddleName => FieldValue::text(self.middle_name.clone()),
            HolderField::LastName => FieldValue::text(self.last_name.clone()),
            HolderField::BirthDate => self.birth_date.into(),
            HolderField::BirthPlace => FieldValue::text(self.birth_place.clone()),
            HolderField::Gender => self.gender.into(),
            HolderField::NobleCondition => FieldValue::text(self.noble_condition.clone()),
            HolderField::CardNumber => FieldValue::text(self.card_number.clone()),
            HolderField::CardIssuer => FieldValue::text(self.card_issuer.clone()),
            HolderField::CardType => self.card_type.into(),
            HolderField::CardValidFrom => self.card_valid_from.into(),
            HolderField::CardValidUntil => self.card_valid_until.into(),
            HolderField::Street => FieldValue::text(self.street.clone()),
            HolderField::StreetNo => FieldValue::text(self.street_no.clone()),
            HolderField::StreetBox => FieldValue::text(self.street_box.clone()),
            HolderField::Addr2 => FieldValue::text(self.addr2.clone()),
            HolderField::ZipCode => FieldValue::text(self.zip_code.clone()),
            HolderField::Country => self
                .country
                .clone()
                .map(FieldValue::Country)
                .unwrap_or(FieldValue::Empty),
            HolderField::City => self.city.clone().into(),
        }
    }

    fn set_field(&mut self, field: HolderField, value: FieldValue) -> Result<(), ValidationError> {
        let kind = value.kind();
        let wrong_kind = || ValidationError::WrongKind { field, kind };

        if let Some(slot) = self.text_slot(field) {
            *slot = match value {
                FieldValue::Empty => String::new(),
                FieldValue::Text(text) => text,
                _ => return Err(wrong_kind()),
            };
            return Ok(());
        }

        match (field, value) {
            (HolderField::BirthDate, FieldValue::Empty) => self.birth_date = None,
            (HolderField::BirthDate, FieldValue::PartialDate(date)) => self.birth_date = Some(date),
            (HolderField::BirthDate, FieldValue::Date(date)) => self.birth_date = Some(date.into()),
            (HolderField::Gender, FieldValue::Empty) => self.gender = None,
            (HolderField::Gender, FieldValue::Gender(gender)) => self.gender = Some(gender),
            (HolderField::CardType, FieldValue::Empty) => self.card_type = None,
            (HolderField::CardType, FieldValue::CardType(card_type)) => {
                self.card_type = Some(card_type)
            }
            (HolderField::CardValidFrom, FieldValue::Empty) => self.card_valid_from = None,
            (HolderField::CardValidFrom, FieldValue::Date(date)) => {
                self.card_valid_from = Some(date)
            }
            (HolderField::CardValidUntil, FieldValue::Empty) => self.card_valid_until = None,
            (HolderField::CardValidUntil, FieldValue::Date(date)) => {
                self.card_valid_until = Some(date)
            }
            (HolderField::Country, FieldValue::Empty) => self.country = None,
            (HolderField::Country, FieldValue::Country(code)) => self.country = Some(code),
            (HolderField::City, FieldValue::Empty) => self.city = None,
            (HolderField::City, FieldValue::Place(place)) => self.city = Some(place),
            _ => return Err(wrong_kind()),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.last_name.trim().is_empty() {
            return Err(ValidationError::MissingField(HolderField::LastName));
        }

        if let (Some(from), Some(until)) = (self.card_valid_from, self.card_valid_until) {
            if until < from {
                return Err(ValidationError::Invalid {
                    field: HolderField::CardValidUntil,
                    reason: format!("card expires ({until}) before it becomes valid ({from})"),
                });
            }
        }

        if let Some(city) = &self.city {
            if self.country.as_deref() != Some(city.country.as_str()) {
                return Err(ValidationError::Invalid {
                    field: HolderField::City,
                    reason: format!("{} is not located in the holder's country", city.name),
                });
            }
        }

        Ok(())
    }

    fn display_name(&self) -> String {
        let name = PersonName {
            first: self.first_name.clone(),
            middle: self.middle_name.clone(),
            last: self.last_name.to_uppercase(),
        }
        .full_name();
        match &self.id {
            Some(id) => format!("{name} ({id})"),
            None => name,
        }
    }
}
