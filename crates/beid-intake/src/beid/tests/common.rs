use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;
use tempfile::TempDir;

use crate::beid::domain::{
    CardHolder, Client, Country, HolderId, PersonName, Place,
};
use crate::beid::repository::{
    AuditError, AuditSink, ChangeAudit, Geography, HolderRepository, RepositoryError, SaveUnit,
};
use crate::beid::{CardArtifacts, CardReconciler, ReconcilerConfig};

/// Display form of the national id on the sample card.
pub(super) const JEAN_NID: &str = "680601 053-29";
pub(super) const OTHER_NID: &str = "750315 123-53";

const SAMPLE_CARD: &[(&str, &str)] = &[
    ("nationalNumber", "68060105329"),
    ("firstName", "Jean"),
    ("middleName", "Marie"),
    ("name", "Dupont"),
    ("dateOfBirth", "1968-06-01"),
    ("placeOfBirth", "Verviers"),
    ("gender", "MALE"),
    ("streetAndNumber", "Rue Haute 12 bte 3"),
    ("zip", "4700"),
    ("municipality", "Eupen"),
    ("reader", "BE"),
    ("cardNumber", "591123456789"),
    ("cardDeliveryMunicipality", "Eupen"),
    ("cardValidityDateBegin", "2016-08-01"),
    ("cardValidityDateEnd", "2026-08-01"),
    ("documentType", "1"),
];

/// The sample card dump, as the reader sends it.
pub(super) fn sample_card() -> String {
    card_with(&[])
}

/// The sample card with some keys replaced or added. An empty value drops the key.
pub(super) fn card_with(overrides: &[(&str, &str)]) -> String {
    let mut lines: Vec<(String, String)> = SAMPLE_CARD
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();

    for (key, value) in overrides {
        match lines.iter_mut().find(|(existing, _)| existing == key) {
            Some(line) => line.1 = value.to_string(),
            None => lines.push((key.to_string(), value.to_string())),
        }
    }

    lines
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{key}: '{}'\n", value.replace('\'', "''")))
        .collect()
}

/// A stored client for the sample card, with an outdated address.
pub(super) fn known_jean() -> Client {
    Client {
        national_id: JEAN_NID.to_string(),
        first_name: "Jean".to_string(),
        middle_name: "Marie".to_string(),
        last_name: "Dupont".to_string(),
        street: "Rue Basse".to_string(),
        street_no: "4".to_string(),
        zip_code: "4700".to_string(),
        country: Some("BE".to_string()),
        ..Client::default()
    }
}

pub(super) fn person(first: &str, last: &str) -> Client {
    Client {
        first_name: first.to_string(),
        last_name: last.to_string(),
        ..Client::default()
    }
}

pub(super) fn reconciler_config(media_root: &Path, simulate: bool) -> ReconcilerConfig {
    ReconcilerConfig {
        simulate,
        holder_label: "client".to_string(),
        artifacts: CardArtifacts::new(media_root, None),
    }
}

pub(super) type MemoryReconciler = CardReconciler<Client, MemoryStore, MemoryStore, MemoryAudit>;

pub(super) struct Harness {
    pub(super) reconciler: MemoryReconciler,
    pub(super) store: Arc<MemoryStore>,
    pub(super) audit: Arc<MemoryAudit>,
    pub(super) media: TempDir,
}

pub(super) fn build_reconciler(simulate: bool) -> Harness {
    let media = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(MemoryStore::seeded());
    let audit = Arc::new(MemoryAudit::default());
    let reconciler = CardReconciler::new(
        store.clone(),
        store.clone(),
        audit.clone(),
        reconciler_config(media.path(), simulate),
    );
    Harness {
        reconciler,
        store,
        audit,
        media,
    }
}

/// Holders, places and countries kept in memory. Implements every store
/// capability so one instance can back a whole reconciler.
#[derive(Default, Clone)]
pub(super) struct MemoryStore {
    holders: Arc<Mutex<BTreeMap<HolderId, Client>>>,
    places: Arc<Mutex<Vec<Place>>>,
    countries: Arc<Vec<Country>>,
    next_id: Arc<Mutex<u64>>,
}

impl MemoryStore {
    pub(super) fn seeded() -> Self {
        let countries = [("BE", "Belgium"), ("NL", "Netherlands"), ("DE", "Germany")]
            .into_iter()
            .map(|(iso_code, name)| Country {
                iso_code: iso_code.to_string(),
                name: name.to_string(),
            })
            .collect();
        let places = ["Eupen", "Verviers"]
            .into_iter()
            .map(|name| Place {
                name: name.to_string(),
                country: "BE".to_string(),
            })
            .collect();

        Self {
            places: Arc::new(Mutex::new(places)),
            countries: Arc::new(countries),
            ..Self::default()
        }
    }

    /// Store a holder as if it had been saved earlier.
    pub(super) fn add(&self, mut holder: Client) -> Client {
        let id = self.allocate_id();
        holder.stamp(id.clone(), 1);
        self.holders
            .lock()
            .expect("holder mutex poisoned")
            .insert(id, holder.clone());
        holder
    }

    /// Simulate an edit made by someone else.
    pub(super) fn touch(&self, id: &HolderId) {
        let mut holders = self.holders.lock().expect("holder mutex poisoned");
        if let Some(holder) = holders.get_mut(id) {
            holder.version += 1;
        }
    }

    pub(super) fn get(&self, id: &HolderId) -> Option<Client> {
        self.holders
            .lock()
            .expect("holder mutex poisoned")
            .get(id)
            .cloned()
    }

    pub(super) fn holders(&self) -> Vec<Client> {
        self.holders
            .lock()
            .expect("holder mutex poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub(super) fn places(&self) -> Vec<Place> {
        self.places.lock().expect("place mutex poisoned").clone()
    }

    fn allocate_id(&self) -> HolderId {
        let mut next = self.next_id.lock().expect("id mutex poisoned");
        *next += 1;
        HolderId(format!("c-{next}"))
    }
}

impl HolderRepository<Client> for MemoryStore {
    fn fetch(&self, id: &HolderId) -> Result<Option<Client>, RepositoryError> {
        Ok(self.get(id))
    }

    fn find_by_national_id(&self, national_id: &str) -> Result<Vec<Client>, RepositoryError> {
        Ok(self
            .holders()
            .into_iter()
            .filter(|holder| holder.national_id == national_id)
            .collect())
    }

    fn count_persons_named(&self, name: &PersonName) -> Result<usize, RepositoryError> {
        Ok(self
            .holders()
            .iter()
            .filter(|holder| name.matches(&holder.person_name()))
            .count())
    }

    fn commit(&self, unit: SaveUnit<Client>) -> Result<Client, RepositoryError> {
        let mut holders = self.holders.lock().expect("holder mutex poisoned");
        let mut holder = unit.holder;

        let (id, version) = match unit.expected_version {
            None => {
                let taken = !holder.national_id.is_empty()
                    && holders
                        .values()
                        .any(|known| known.national_id == holder.national_id);
                if taken {
                    return Err(RepositoryError::Conflict);
                }
                (self.allocate_id(), 1)
            }
            Some(expected) => {
                let id = holder.id.clone().ok_or(RepositoryError::NotFound)?;
                let current = holders.get(&id).ok_or(RepositoryError::NotFound)?;
                if current.version != expected {
                    return Err(RepositoryError::Stale);
                }
                (id, expected + 1)
            }
        };

        let mut places = self.places.lock().expect("place mutex poisoned");
        for place in unit.new_places {
            let exists = places.iter().any(|known| {
                known.country == place.country && known.name.eq_ignore_ascii_case(&place.name)
            });
            if !exists {
                places.push(place);
            }
        }

        holder.stamp(id.clone(), version);
        holders.insert(id, holder.clone());
        Ok(holder)
    }
}

impl Geography for MemoryStore {
    fn country(&self, iso_code: &str) -> Result<Option<Country>, RepositoryError> {
        Ok(self
            .countries
            .iter()
            .find(|country| country.iso_code.eq_ignore_ascii_case(iso_code))
            .cloned())
    }

    fn place(&self, country_iso: &str, name: &str) -> Result<Option<Place>, RepositoryError> {
        Ok(self
            .places()
            .into_iter()
            .find(|place| place.country == country_iso && place.name.eq_ignore_ascii_case(name)))
    }
}

/// Delegates reads to a [`MemoryStore`] but refuses every write.
pub(super) struct ReadOnlyStore(pub(super) MemoryStore);

impl HolderRepository<Client> for ReadOnlyStore {
    fn fetch(&self, id: &HolderId) -> Result<Option<Client>, RepositoryError> {
        self.0.fetch(id)
    }

    fn find_by_national_id(&self, national_id: &str) -> Result<Vec<Client>, RepositoryError> {
        self.0.find_by_national_id(national_id)
    }

    fn count_persons_named(&self, name: &PersonName) -> Result<usize, RepositoryError> {
        self.0.count_persons_named(name)
    }

    fn commit(&self, _unit: SaveUnit<Client>) -> Result<Client, RepositoryError> {
        Err(RepositoryError::Unavailable("read only".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryAudit {
    entries: Arc<Mutex<Vec<ChangeAudit>>>,
}

impl MemoryAudit {
    pub(super) fn entries(&self) -> Vec<ChangeAudit> {
        self.entries.lock().expect("audit mutex poisoned").clone()
    }
}

impl AuditSink for MemoryAudit {
    fn record(&self, audit: ChangeAudit) -> Result<(), AuditError> {
        self.entries
            .lock()
            .expect("audit mutex poisoned")
            .push(audit);
        Ok(())
    }
}

pub(super) struct FailingAudit;

impl AuditSink for FailingAudit {
    fn record(&self, _audit: ChangeAudit) -> Result<(), AuditError> {
        Err(AuditError::Transport("audit log offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
