use std::fs;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDate;

use super::common::*;
use crate::beid::domain::{
    CardType, FieldValue, Gender, HolderField, PartialDate, Place,
};
use crate::beid::payload::PayloadError;
use crate::beid::ssin::SsinError;
use crate::beid::{card_to_fields, CardArtifacts, CardReadError};

fn text(value: &str) -> Option<FieldValue> {
    Some(FieldValue::Text(value.to_string()))
}

#[test]
fn maps_every_card_field() {
    let harness = build_reconciler(false);
    let fields = harness
        .reconciler
        .read_card(&sample_card())
        .expect("sample card parses");

    assert_eq!(fields.get(HolderField::NationalId).cloned(), text(JEAN_NID));
    assert_eq!(fields.get(HolderField::FirstName).cloned(), text("Jean"));
    assert_eq!(fields.get(HolderField::MiddleName).cloned(), text("Marie"));
    assert_eq!(fields.get(HolderField::LastName).cloned(), text("Dupont"));
    assert_eq!(
        fields.get(HolderField::BirthDate),
        Some(&FieldValue::PartialDate(PartialDate {
            year: 1968,
            month: 6,
            day: 1
        }))
    );
    assert_eq!(fields.get(HolderField::BirthPlace).cloned(), text("Verviers"));
    assert_eq!(
        fields.get(HolderField::Gender),
        Some(&FieldValue::Gender(Gender::Male))
    );
    assert_eq!(fields.get(HolderField::CardNumber).cloned(), text("591123456789"));
    assert_eq!(fields.get(HolderField::CardIssuer).cloned(), text("Eupen"));
    assert_eq!(
        fields.get(HolderField::CardType),
        Some(&FieldValue::CardType(CardType::BelgianCitizen))
    );
    assert_eq!(
        fields.get(HolderField::CardValidFrom),
        Some(&FieldValue::Date(
            NaiveDate::from_ymd_opt(2016, 8, 1).expect("valid date")
        ))
    );
    assert_eq!(
        fields.get(HolderField::CardValidUntil),
        Some(&FieldValue::Date(
            NaiveDate::from_ymd_opt(2026, 8, 1).expect("valid date")
        ))
    );
    assert_eq!(fields.get(HolderField::Street).cloned(), text("Rue Haute"));
    assert_eq!(fields.get(HolderField::StreetNo).cloned(), text("12"));
    assert_eq!(fields.get(HolderField::StreetBox).cloned(), text("3"));
    assert_eq!(fields.get(HolderField::Addr2), None);
    assert_eq!(fields.get(HolderField::NobleCondition), None);
    assert_eq!(fields.get(HolderField::ZipCode).cloned(), text("4700"));
    assert_eq!(
        fields.get(HolderField::Country),
        Some(&FieldValue::Country("BE".to_string()))
    );
    assert_eq!(
        fields.get(HolderField::City),
        Some(&FieldValue::Place(Place {
            name: "Eupen".to_string(),
            country: "BE".to_string(),
        }))
    );
    assert_eq!(fields.pending_place(), None);
    assert!(fields.warnings().is_empty(), "{:?}", fields.warnings());
}

#[test]
fn parsing_the_same_dump_twice_gives_the_same_fields() {
    let harness = build_reconciler(false);
    let card = card_with(&[("municipality", "Raeren")]);
    let first = harness.reconciler.read_card(&card).expect("parses");
    let second = harness.reconciler.read_card(&card).expect("parses again");
    assert_eq!(first, second);
    assert!(harness.store.places().iter().all(|place| place.name != "Raeren"));
}

#[test]
fn unknown_gender_is_left_empty_with_a_warning() {
    let harness = build_reconciler(false);
    let fields = harness
        .reconciler
        .read_card(&card_with(&[("gender", "UNKNOWN")]))
        .expect("parses");

    assert_eq!(fields.get(HolderField::Gender), Some(&FieldValue::Empty));
    assert!(fields
        .warnings()
        .iter()
        .any(|warning| warning.contains("invalid gender code 'UNKNOWN'")));
}

#[test]
fn unknown_document_type_and_bad_dates_are_warnings() {
    let harness = build_reconciler(false);
    let fields = harness
        .reconciler
        .read_card(&card_with(&[
            ("documentType", "99"),
            ("dateOfBirth", "1968-13-40"),
            ("cardValidityDateEnd", "someday"),
        ]))
        .expect("parses");

    assert_eq!(fields.get(HolderField::CardType), Some(&FieldValue::Empty));
    assert_eq!(fields.get(HolderField::BirthDate), None);
    assert_eq!(fields.get(HolderField::CardValidUntil), Some(&FieldValue::Empty));
    assert_eq!(fields.warnings().len(), 3, "{:?}", fields.warnings());
}

#[test]
fn partial_birth_dates_and_dotted_validity_dates_are_accepted() {
    let harness = build_reconciler(false);
    let fields = harness
        .reconciler
        .read_card(&card_with(&[
            ("dateOfBirth", "1968-00-00"),
            ("cardValidityDateBegin", "01.08.2016"),
        ]))
        .expect("parses");

    assert_eq!(
        fields.get(HolderField::BirthDate),
        Some(&FieldValue::PartialDate(PartialDate {
            year: 1968,
            month: 0,
            day: 0
        }))
    );
    assert_eq!(
        fields.get(HolderField::CardValidFrom),
        Some(&FieldValue::Date(
            NaiveDate::from_ymd_opt(2016, 8, 1).expect("valid date")
        ))
    );
}

#[test]
fn national_id_with_bad_check_digits_is_kept() {
    let harness = build_reconciler(false);
    let fields = harness
        .reconciler
        .read_card(&card_with(&[("nationalNumber", "12345678901")]))
        .expect("parses");
    assert_eq!(fields.national_id(), "123456 789-01");
}

#[test]
fn national_id_of_wrong_length_is_rejected() {
    let harness = build_reconciler(false);
    match harness
        .reconciler
        .read_card(&card_with(&[("nationalNumber", "6806010532")]))
    {
        Err(crate::beid::ReconcileError::Read(CardReadError::InvalidNationalId(
            SsinError::WrongLength { digits, .. },
        ))) => assert_eq!(digits, 10),
        other => panic!("expected invalid national id, got {other:?}"),
    }
}

#[test]
fn single_line_answer_is_a_malformed_payload() {
    let store = MemoryStore::seeded();
    let artifacts = CardArtifacts::new("unused-media", None);
    match card_to_fields("No card inserted", &store, &artifacts) {
        Err(CardReadError::MalformedPayload(PayloadError::ReaderMessage(message))) => {
            assert_eq!(message, "No card inserted")
        }
        other => panic!("expected malformed payload, got {other:?}"),
    }
}

#[test]
fn unknown_reader_country_is_rejected() {
    let store = MemoryStore::seeded();
    let artifacts = CardArtifacts::new("unused-media", None);
    match card_to_fields(&card_with(&[("reader", "xx")]), &store, &artifacts) {
        Err(CardReadError::UnknownCountry(code)) => assert_eq!(code, "XX"),
        other => panic!("expected unknown country, got {other:?}"),
    }
}

#[test]
fn unknown_municipality_becomes_a_pending_place() {
    let harness = build_reconciler(false);
    let fields = harness
        .reconciler
        .read_card(&card_with(&[("municipality", "Raeren")]))
        .expect("parses");

    let raeren = Place {
        name: "Raeren".to_string(),
        country: "BE".to_string(),
    };
    assert_eq!(fields.pending_place(), Some(&raeren));
    assert_eq!(fields.get(HolderField::City), Some(&FieldValue::Place(raeren)));
}

#[test]
fn long_box_numbers_move_to_the_second_address_line() {
    let harness = build_reconciler(false);
    let fields = harness
        .reconciler
        .read_card(&card_with(&[(
            "streetAndNumber",
            "Avenue Louise 523 bte Résidence Les Tilleuls",
        )]))
        .expect("parses");

    assert_eq!(fields.get(HolderField::StreetNo).cloned(), text("523"));
    assert_eq!(fields.get(HolderField::StreetBox), Some(&FieldValue::Empty));
    assert_eq!(
        fields.get(HolderField::Addr2).cloned(),
        text("Résidence Les Tilleuls")
    );
}

#[test]
fn photo_is_stored_under_the_card_number_and_overwritten() {
    let harness = build_reconciler(false);
    let path = harness.media.path().join("beid").join("591123456789.jpg");

    let first = STANDARD.encode(b"first photo");
    harness
        .reconciler
        .read_card(&card_with(&[("photo", first.as_str())]))
        .expect("parses");
    assert_eq!(fs::read(&path).expect("photo written"), b"first photo");

    let second = STANDARD.encode(b"second photo");
    harness
        .reconciler
        .read_card(&card_with(&[("photo", second.as_str())]))
        .expect("parses");
    assert_eq!(fs::read(&path).expect("photo rewritten"), b"second photo");
}

#[test]
fn photo_without_card_number_is_an_error() {
    let harness = build_reconciler(false);
    let photo = STANDARD.encode(b"photo");
    match harness
        .reconciler
        .read_card(&card_with(&[("cardNumber", ""), ("photo", photo.as_str())]))
    {
        Err(crate::beid::ReconcileError::Read(CardReadError::MissingCardNumber)) => {}
        other => panic!("expected missing card number, got {other:?}"),
    }
}

#[test]
fn data_collector_keeps_the_raw_dump() {
    let media = tempfile::tempdir().expect("tempdir");
    let collector = media.path().join("collected");
    let store = MemoryStore::seeded();
    let artifacts = CardArtifacts::new(media.path(), Some(collector.clone()));

    let card = sample_card();
    card_to_fields(&card, &store, &artifacts).expect("parses");
    assert_eq!(
        fs::read_to_string(collector.join("591123456789.txt")).expect("dump collected"),
        card
    );
}

#[test]
fn data_collector_failure_does_not_abort_parsing() {
    let media = tempfile::tempdir().expect("tempdir");
    let blocker = media.path().join("collected");
    fs::write(&blocker, b"not a directory").expect("write blocker");
    let store = MemoryStore::seeded();
    let artifacts = CardArtifacts::new(media.path(), Some(blocker));

    let fields = card_to_fields(&sample_card(), &store, &artifacts).expect("still parses");
    assert_eq!(fields.national_id(), JEAN_NID);
}
