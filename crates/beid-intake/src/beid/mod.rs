//! Belgian eID card intake: turn a card-reader dump into holder field
//! updates and apply them after explicit confirmation.

pub mod address;
pub mod artifacts;
pub mod diff;
pub mod domain;
pub mod parser;
pub mod payload;
pub mod repository;
pub mod router;
pub mod service;
pub mod ssin;

#[cfg(test)]
mod tests;

pub use artifacts::CardArtifacts;
pub use diff::{compute_diff, FieldChange, FieldDiff};
pub use domain::{
    CardHolder, CardType, Client, Country, FieldValue, Gender, HolderField, HolderFields,
    HolderId, PartialDate, PersonName, Place, ValidationError,
};
pub use parser::{card_to_fields, CardReadError};
pub use payload::{PayloadError, RawCardPayload};
pub use repository::{
    AuditError, AuditSink, ChangeAudit, Geography, HolderRepository, RepositoryError, SaveUnit,
};
pub use router::{card_router, CardReadRequest, CommitRequest};
pub use service::{
    CardReconciler, ChangeKind, ChangeToken, CommitOutcome, Proposal, ReconcileError,
    ReconcilerConfig,
};
