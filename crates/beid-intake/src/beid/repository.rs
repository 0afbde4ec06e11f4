use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::diff::FieldDiff;
use super::domain::{CardHolder, Country, HolderId, PersonName, Place};

/// Everything written by one accepted change. Stores must persist it all or nothing.
#[derive(Debug, Clone)]
pub struct SaveUnit<H> {
    pub holder: H,
    /// `None` creates a new holder; `Some(v)` updates one still at version `v`.
    pub expected_version: Option<u64>,
    /// Municipalities to create first; ones that exist by now are left alone.
    pub new_places: Vec<Place>,
}

impl<H: CardHolder> SaveUnit<H> {
    pub fn create(holder: H, new_places: Vec<Place>) -> Self {
        Self {
            holder,
            expected_version: None,
            new_places,
        }
    }

    pub fn update(holder: H, new_places: Vec<Place>) -> Self {
        let expected_version = Some(holder.version());
        Self {
            holder,
            expected_version,
            new_places,
        }
    }
}

/// Storage abstraction for card holders so the reconciler can be exercised in isolation.
pub trait HolderRepository<H: CardHolder>: Send + Sync {
    fn fetch(&self, id: &HolderId) -> Result<Option<H>, RepositoryError>;
    fn find_by_national_id(&self, national_id: &str) -> Result<Vec<H>, RepositoryError>;
    /// Person-like records whose filled-in name parts match, ignoring case.
    fn count_persons_named(&self, name: &PersonName) -> Result<usize, RepositoryError>;
    /// Atomically save the holder and its new places, returning the stored holder.
    fn commit(&self, unit: SaveUnit<H>) -> Result<H, RepositoryError>;
}

/// Country and municipality lookups used while reading a card.
pub trait Geography: Send + Sync {
    fn country(&self, iso_code: &str) -> Result<Option<Country>, RepositoryError>;
    fn place(&self, country_iso: &str, name: &str) -> Result<Option<Place>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record was modified concurrently")]
    Stale,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound hook receiving one entry per applied change.
pub trait AuditSink: Send + Sync {
    fn record(&self, audit: ChangeAudit) -> Result<(), AuditError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeAudit {
    pub holder_id: HolderId,
    pub token_id: Uuid,
    pub created: bool,
    pub changes: FieldDiff,
    pub recorded_at: DateTime<Utc>,
}

impl ChangeAudit {
    pub fn summary(&self) -> String {
        let action = if self.created { "created" } else { "updated" };
        format!(
            "{} {action} from eID card: {}",
            self.holder_id,
            self.changes.lines().join("; ")
        )
    }
}

/// Audit dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit transport unavailable: {0}")]
    Transport(String),
}
