use chrono::NaiveDate;
use tracing::{debug, error, warn};

use super::address::split_street;
use super::artifacts::CardArtifacts;
use super::domain::{
    CardType, FieldValue, Gender, HolderField, HolderFields, PartialDate, Place,
};
use super::payload::{PayloadError, RawCardPayload};
use super::repository::{Geography, RepositoryError};
use super::ssin::{format_national_id, SsinError};

/// Why a card dump could not be turned into holder fields.
#[derive(Debug, thiserror::Error)]
pub enum CardReadError {
    #[error(transparent)]
    MalformedPayload(#[from] PayloadError),
    #[error(transparent)]
    InvalidNationalId(#[from] SsinError),
    #[error("Unknown country code '{0}'")]
    UnknownCountry(String),
    #[error("card data contains a photo but no card number")]
    MissingCardNumber,
    #[error("country lookup failed: {0}")]
    Geography(#[from] RepositoryError),
}

/// Convert a raw card dump into the fields to store on its holder.
///
/// Apart from the photo and the optional data-collector copy, which are
/// overwritten on every read, this has no side effects.
pub fn card_to_fields<G>(
    raw: &str,
    geography: &G,
    artifacts: &CardArtifacts,
) -> Result<HolderFields, CardReadError>
where
    G: Geography + ?Sized,
{
    let payload = RawCardPayload::decode(raw)?;
    let mut fields = HolderFields::new();

    let national_id = format_national_id(payload.national_number.as_deref().unwrap_or(""))?;
    fields.insert(HolderField::NationalId, FieldValue::text(national_id.clone()));
    fields.insert(HolderField::FirstName, text(&payload.first_name));
    fields.insert(HolderField::MiddleName, text(&payload.middle_name));
    fields.insert(HolderField::LastName, text(&payload.last_name));

    let card_number = payload.card_number.clone().unwrap_or_default();

    if let Some(photo) = &payload.photo {
        if card_number.is_empty() {
            error!(%national_id, "photo data but no card number");
            return Err(CardReadError::MissingCardNumber);
        }
        artifacts.store_photo(&card_number, photo);
    }

    if let Some(raw_date) = &payload.date_of_birth {
        match PartialDate::parse(raw_date) {
            Ok(date) => fields.insert(HolderField::BirthDate, date),
            Err(err) => {
                warn!(%national_id, error = %err, "ignoring birth date");
                fields.push_warning(format!("ignored birth date: {err}"));
            }
        }
    }
    let valid_from = card_date(&national_id, &payload.card_validity_date_begin, &mut fields);
    fields.insert(HolderField::CardValidFrom, valid_from);
    let valid_until = card_date(&national_id, &payload.card_validity_date_end, &mut fields);
    fields.insert(HolderField::CardValidUntil, valid_until);

    fields.insert(HolderField::CardNumber, FieldValue::text(card_number.clone()));
    fields.insert(
        HolderField::CardIssuer,
        text(&payload.card_delivery_municipality),
    );

    if let Some(noble_condition) = &payload.noble_condition {
        fields.insert(HolderField::NobleCondition, FieldValue::text(noble_condition));
    }

    if let Some(line) = &payload.street_and_number {
        let address = split_street(line);
        fields.insert(HolderField::Street, FieldValue::text(address.street));
        fields.insert(HolderField::StreetNo, FieldValue::text(address.street_no));
        fields.insert(HolderField::StreetBox, FieldValue::text(address.street_box));
        if !address.addr2.is_empty() {
            fields.insert(HolderField::Addr2, FieldValue::text(address.addr2));
        }
    }
    if let Some(zip) = &payload.zip {
        fields.insert(HolderField::ZipCode, FieldValue::text(zip));
    }
    if let Some(place_of_birth) = &payload.place_of_birth {
        fields.insert(HolderField::BirthPlace, FieldValue::text(place_of_birth));
    }

    let iso_code = payload
        .country_code
        .as_deref()
        .map(|code| code.trim().to_uppercase())
        .unwrap_or_default();
    let country = geography
        .country(&iso_code)?
        .ok_or_else(|| CardReadError::UnknownCountry(iso_code.clone()))?;
    fields.insert(HolderField::Country, FieldValue::Country(country.iso_code.clone()));

    if let Some(municipality) = &payload.municipality {
        let name = municipality.trim();
        let place = match geography.place(&country.iso_code, name)? {
            Some(place) => place,
            None => {
                debug!(municipality = name, country = %country.iso_code, "new municipality");
                let place = Place {
                    name: name.to_string(),
                    country: country.iso_code.clone(),
                };
                fields.set_pending_place(place.clone());
                place
            }
        };
        fields.insert(HolderField::City, place);
    }

    let gender = payload.gender.as_deref().unwrap_or("");
    let gender_value = Gender::from_card_code(gender);
    if gender_value.is_none() {
        warn!(%national_id, code = gender, "invalid gender code");
        fields.push_warning(format!("invalid gender code '{gender}'"));
    }
    fields.insert(HolderField::Gender, gender_value);

    let document_type = payload.document_type.as_deref().unwrap_or("");
    let card_type = CardType::from_code(document_type);
    if card_type.is_none() {
        warn!(%national_id, code = document_type, "unknown document type");
        fields.push_warning(format!("unknown document type '{document_type}'"));
    }
    fields.insert(HolderField::CardType, card_type);

    artifacts.collect_raw(&card_number, raw);

    Ok(fields)
}

fn text(value: &Option<String>) -> FieldValue {
    FieldValue::text(value.clone().unwrap_or_default())
}

fn card_date(national_id: &str, raw: &Option<String>, fields: &mut HolderFields) -> FieldValue {
    let Some(raw) = raw.as_deref().map(str::trim) else {
        return FieldValue::Empty;
    };

    let parsed = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d.%m.%Y"));
    match parsed {
        Ok(date) => FieldValue::Date(date),
        Err(err) => {
            warn!(national_id, value = raw, error = %err, "ignoring card validity date");
            fields.push_warning(format!("ignored card validity date '{raw}': {err}"));
            FieldValue::Empty
        }
    }
}
