use beid_intake::beid::{
    AuditError, AuditSink, CardHolder, ChangeAudit, Client, Country, Geography, HolderId,
    HolderRepository, PersonName, Place, RepositoryError, SaveUnit,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

const SEED_COUNTRIES: &[(&str, &str)] = &[
    ("BE", "Belgium"),
    ("NL", "Netherlands"),
    ("FR", "France"),
    ("DE", "Germany"),
    ("LU", "Luxembourg"),
];

#[derive(Default)]
struct StoreState {
    clients: BTreeMap<HolderId, Client>,
    places: Vec<Place>,
    next_id: u64,
}

/// Process-local client store backing the service until a database is wired in.
#[derive(Clone)]
pub(crate) struct InMemoryHolderStore {
    state: Arc<Mutex<StoreState>>,
    countries: Arc<Vec<Country>>,
}

impl Default for InMemoryHolderStore {
    fn default() -> Self {
        let countries = SEED_COUNTRIES
            .iter()
            .map(|(iso_code, name)| Country {
                iso_code: iso_code.to_string(),
                name: name.to_string(),
            })
            .collect();
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            countries: Arc::new(countries),
        }
    }
}

impl InMemoryHolderStore {
    fn clients(&self) -> Vec<Client> {
        let guard = self.state.lock().expect("store mutex poisoned");
        guard.clients.values().cloned().collect()
    }
}

impl HolderRepository<Client> for InMemoryHolderStore {
    fn fetch(&self, id: &HolderId) -> Result<Option<Client>, RepositoryError> {
        let guard = self.state.lock().expect("store mutex poisoned");
        Ok(guard.clients.get(id).cloned())
    }

    fn find_by_national_id(&self, national_id: &str) -> Result<Vec<Client>, RepositoryError> {
        Ok(self
            .clients()
            .into_iter()
            .filter(|client| client.national_id == national_id)
            .collect())
    }

    fn count_persons_named(&self, name: &PersonName) -> Result<usize, RepositoryError> {
        Ok(self
            .clients()
            .iter()
            .filter(|client| name.matches(&client.person_name()))
            .count())
    }

    fn commit(&self, unit: SaveUnit<Client>) -> Result<Client, RepositoryError> {
        let mut guard = self.state.lock().expect("store mutex poisoned");
        let mut client = unit.holder;

        let (id, version) = match unit.expected_version {
            None => {
                let taken = !client.national_id.is_empty()
                    && guard
                        .clients
                        .values()
                        .any(|known| known.national_id == client.national_id);
                if taken {
                    return Err(RepositoryError::Conflict);
                }
                guard.next_id += 1;
                (HolderId(format!("client-{}", guard.next_id)), 1)
            }
            Some(expected) => {
                let id = client.id.clone().ok_or(RepositoryError::NotFound)?;
                let current = guard.clients.get(&id).ok_or(RepositoryError::NotFound)?;
                if current.version != expected {
                    return Err(RepositoryError::Stale);
                }
                (id, expected + 1)
            }
        };

        for place in unit.new_places {
            let exists = guard.places.iter().any(|known| {
                known.country == place.country && known.name.eq_ignore_ascii_case(&place.name)
            });
            if !exists {
                guard.places.push(place);
            }
        }

        client.stamp(id.clone(), version);
        guard.clients.insert(id, client.clone());
        Ok(client)
    }
}

impl Geography for InMemoryHolderStore {
    fn country(&self, iso_code: &str) -> Result<Option<Country>, RepositoryError> {
        Ok(self
            .countries
            .iter()
            .find(|country| country.iso_code.eq_ignore_ascii_case(iso_code))
            .cloned())
    }

    fn place(&self, country_iso: &str, name: &str) -> Result<Option<Place>, RepositoryError> {
        let guard = self.state.lock().expect("store mutex poisoned");
        Ok(guard
            .places
            .iter()
            .find(|place| place.country == country_iso && place.name.eq_ignore_ascii_case(name))
            .cloned())
    }
}

/// Audit sink that writes each change to the log.
#[derive(Default, Clone, Copy)]
pub(crate) struct TracingAuditLog;

impl AuditSink for TracingAuditLog {
    fn record(&self, audit: ChangeAudit) -> Result<(), AuditError> {
        info!(
            holder = %audit.holder_id,
            token = %audit.token_id,
            created = audit.created,
            summary = %audit.summary(),
            "eID change applied"
        );
        Ok(())
    }
}
