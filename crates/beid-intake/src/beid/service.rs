use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::artifacts::CardArtifacts;
use super::diff::{compute_diff, FieldDiff};
use super::domain::{
    CardHolder, FieldValue, HolderField, HolderFields, HolderId, Place, ValidationError,
};
use super::parser::{card_to_fields, CardReadError};
use super::repository::{
    AuditError, AuditSink, ChangeAudit, Geography, HolderRepository, RepositoryError, SaveUnit,
};
use crate::config::BeIdConfig;

const SIMULATION_MARKER: &str = "(Simulation:) ";

/// Explicit settings for one reconciler instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Report what would change without ever writing.
    pub simulate: bool,
    /// Word used for holders in user-facing messages ("client", "person", ...).
    pub holder_label: String,
    pub artifacts: CardArtifacts,
}

impl From<&BeIdConfig> for ReconcilerConfig {
    fn from(config: &BeIdConfig) -> Self {
        Self {
            simulate: config.simulate,
            holder_label: config.holder_label.clone(),
            artifacts: CardArtifacts::new(
                config.media_root.clone(),
                config.data_collector_dir.clone(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Update {
        holder_id: HolderId,
        base_version: u64,
    },
}

/// Snapshot of a proposed change, handed to the user for confirmation and
/// returned unchanged to commit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeToken {
    pub token_id: Uuid,
    pub kind: ChangeKind,
    pub fields: HolderFields,
    pub diff: FieldDiff,
    pub prompt: String,
    pub proposed_at: DateTime<Utc>,
}

impl ChangeToken {
    fn new(kind: ChangeKind, fields: HolderFields, diff: FieldDiff, prompt: String) -> Self {
        Self {
            token_id: Uuid::new_v4(),
            kind,
            fields,
            diff,
            prompt,
            proposed_at: Utc::now(),
        }
    }

    /// Prompt followed by one line per changed field.
    pub fn message(&self) -> String {
        let mut message = format!("{} :", self.prompt);
        for line in self.diff.lines() {
            message.push('\n');
            message.push_str(&line);
        }
        message
    }
}

/// Result of reading a card against the holder store.
#[derive(Debug, Clone)]
pub enum Proposal<H> {
    UpToDate { holder: H, message: String },
    Confirm(ChangeToken),
}

/// Result of the confirmation step.
#[derive(Debug, Clone)]
pub enum CommitOutcome<H> {
    Applied {
        holder: H,
        changes: FieldDiff,
        message: String,
    },
    /// Nothing was written. `holder` shows the state the change would have produced.
    Simulated {
        holder: H,
        changes: FieldDiff,
        message: String,
    },
    Rejected {
        holder: Option<H>,
    },
}

/// Error raised while reconciling card data with holders.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Read(#[from] CardReadError),
    #[error("There is more than one holder with national id {national_id} in our database ({count} found).")]
    DuplicateIdentifier { national_id: String, count: usize },
    #[error("Sorry, I cannot handle that case: national id {0} already belongs to another holder.")]
    IdentifierTaken(String),
    #[error("Sorry, I cannot handle that case: Cannot create new {label} because there is already a person named {name} in our database.")]
    NameConflict { label: String, name: String },
    #[error("Sorry, I cannot handle that case: Cannot create new {label} because there is more than one person named {name} in our database.")]
    AmbiguousName { label: String, name: String },
    #[error("Sorry, I cannot handle that case: National IDs {holder} and {card} don't match")]
    IdentifierMismatch { holder: String, card: String },
    #[error("change {token_id} no longer matches what it would write; read the card again")]
    ProposalMismatch { token_id: Uuid },
    #[error("holder {0} not found")]
    HolderNotFound(HolderId),
    #[error("holder {holder_id} changed since the proposal (expected version {expected}, found {found})")]
    StaleRecord {
        holder_id: HolderId,
        expected: u64,
        found: u64,
    },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Audit(#[from] AuditError),
}

/// Reads eID cards and merges them into holder records in two phases:
/// a proposal that writes nothing, then a commit carrying the user's answer.
pub struct CardReconciler<H, R, G, A> {
    repository: Arc<R>,
    geography: Arc<G>,
    audit: Arc<A>,
    config: ReconcilerConfig,
    holder: PhantomData<fn() -> H>,
}

impl<H, R, G, A> CardReconciler<H, R, G, A>
where
    H: CardHolder,
    R: HolderRepository<H> + 'static,
    G: Geography + 'static,
    A: AuditSink + 'static,
{
    pub fn new(
        repository: Arc<R>,
        geography: Arc<G>,
        audit: Arc<A>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            repository,
            geography,
            audit,
            config,
            holder: PhantomData,
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Parse a raw card dump into holder fields.
    pub fn read_card(&self, raw: &str) -> Result<HolderFields, ReconcileError> {
        let fields = card_to_fields(raw, self.geography.as_ref(), &self.config.artifacts)?;
        Ok(fields)
    }

    pub fn compute_diff(&self, holder: Option<&H>, fields: &HolderFields) -> FieldDiff {
        compute_diff(holder, fields)
    }

    /// Find the holder of a card, or propose creating one.
    pub fn propose_for_card(&self, fields: HolderFields) -> Result<Proposal<H>, ReconcileError> {
        let national_id = fields.national_id();
        let mut matches = if national_id.is_empty() {
            Vec::new()
        } else {
            self.repository.find_by_national_id(&national_id)?
        };

        match matches.len() {
            0 => self.propose_creation(fields),
            1 => {
                let holder = matches.remove(0);
                self.propose_update(holder, fields)
            }
            count => {
                error!(%national_id, count, "national id is not unique");
                Err(ReconcileError::DuplicateIdentifier { national_id, count })
            }
        }
    }

    /// Refresh an already selected holder from a card.
    ///
    /// A holder without national id adopts the card's id right away, unless
    /// another holder owns it already.
    pub fn propose_for_holder(
        &self,
        holder_id: &HolderId,
        fields: HolderFields,
    ) -> Result<Proposal<H>, ReconcileError> {
        let mut holder = self
            .repository
            .fetch(holder_id)?
            .ok_or_else(|| ReconcileError::HolderNotFound(holder_id.clone()))?;

        let card_id = fields.national_id();
        let holder_nid = holder.national_id();

        let unclaimed = holder_nid.is_empty()
            && !card_id.is_empty()
            && self.repository.find_by_national_id(&card_id)?.is_empty();

        if unclaimed {
            if self.config.simulate {
                // Left to the proposal so the adoption shows up in its diff.
                info!(%holder_id, national_id = %card_id, "simulation: national id not stored");
            } else {
                holder.set_field(HolderField::NationalId, FieldValue::text(card_id.clone()))?;
                holder.validate()?;
                holder = self.repository.commit(SaveUnit::update(holder, Vec::new()))?;
                info!(%holder_id, national_id = %card_id, "stored national id from card");
            }
        } else if holder_nid != card_id {
            return Err(ReconcileError::IdentifierMismatch {
                holder: holder_nid,
                card: card_id,
            });
        }

        self.propose_update(holder, fields)
    }

    /// Apply or discard a proposal.
    pub fn commit_change(
        &self,
        token: &ChangeToken,
        accepted: bool,
    ) -> Result<CommitOutcome<H>, ReconcileError> {
        match &token.kind {
            ChangeKind::Update {
                holder_id,
                base_version,
            } => self.commit_update(token, holder_id, *base_version, accepted),
            ChangeKind::Create => self.commit_creation(token, accepted),
        }
    }

    fn propose_creation(&self, fields: HolderFields) -> Result<Proposal<H>, ReconcileError> {
        let label = self.config.holder_label.clone();
        let person = fields.person_name();
        let name = person.full_name();

        match self.repository.count_persons_named(&person)? {
            0 => {
                let diff = compute_diff::<H>(None, &fields);
                let prompt = self.wrap(format!("Create new {label} {name} : Are you sure?"));
                Ok(Proposal::Confirm(ChangeToken::new(
                    ChangeKind::Create,
                    fields,
                    diff,
                    prompt,
                )))
            }
            1 => Err(ReconcileError::NameConflict { label, name }),
            _ => Err(ReconcileError::AmbiguousName { label, name }),
        }
    }

    fn propose_update(&self, holder: H, fields: HolderFields) -> Result<Proposal<H>, ReconcileError> {
        let holder_id = holder
            .holder_id()
            .cloned()
            .ok_or(RepositoryError::NotFound)?;
        let diff = compute_diff(Some(&holder), &fields);

        if diff.is_empty() {
            let message = format!(
                "{} {} is up-to-date",
                self.config.holder_label,
                holder.display_name()
            );
            info!(%holder_id, "holder already matches card");
            return Ok(Proposal::UpToDate { holder, message });
        }

        let prompt = self.wrap(format!(
            "Click OK to apply the following changes for {}",
            holder.display_name()
        ));
        let kind = ChangeKind::Update {
            holder_id,
            base_version: holder.version(),
        };
        Ok(Proposal::Confirm(ChangeToken::new(kind, fields, diff, prompt)))
    }

    fn commit_update(
        &self,
        token: &ChangeToken,
        holder_id: &HolderId,
        base_version: u64,
        accepted: bool,
    ) -> Result<CommitOutcome<H>, ReconcileError> {
        let current = self.repository.fetch(holder_id)?;

        if !accepted {
            info!(%holder_id, token = %token.token_id, "card changes rejected");
            return Ok(CommitOutcome::Rejected { holder: current });
        }

        let current = current.ok_or_else(|| ReconcileError::HolderNotFound(holder_id.clone()))?;
        if current.version() != base_version {
            warn!(
                %holder_id,
                expected = base_version,
                found = current.version(),
                "holder changed between proposal and commit"
            );
            return Err(ReconcileError::StaleRecord {
                holder_id: holder_id.clone(),
                expected: base_version,
                found: current.version(),
            });
        }

        let card_id = token.fields.national_id();
        let holder_nid = current.national_id();
        if holder_nid.is_empty() {
            let claimed = !card_id.is_empty()
                && !self.repository.find_by_national_id(&card_id)?.is_empty();
            if claimed {
                return Err(ReconcileError::IdentifierTaken(card_id));
            }
        } else if holder_nid != card_id {
            warn!(
                %holder_id,
                token = %token.token_id,
                "change targets a holder with another national id"
            );
            return Err(ReconcileError::IdentifierMismatch {
                holder: holder_nid,
                card: card_id,
            });
        }

        let changes = self.confirmed_changes(token, Some(&current))?;
        let mut updated = current;
        apply_fields(&mut updated, &token.fields)?;
        updated.validate()?;
        let message = format!("{} has been saved.", updated.display_name());

        if self.config.simulate {
            return Ok(CommitOutcome::Simulated {
                holder: updated,
                changes,
                message: self.wrap(message),
            });
        }

        let saved = self
            .repository
            .commit(SaveUnit::update(updated, pending_places(&token.fields)))?;
        self.audit.record(ChangeAudit {
            holder_id: holder_id.clone(),
            token_id: token.token_id,
            created: false,
            changes: changes.clone(),
            recorded_at: Utc::now(),
        })?;
        info!(%holder_id, changes = changes.len(), "holder updated from eID card");

        Ok(CommitOutcome::Applied {
            holder: saved,
            changes,
            message,
        })
    }

    fn commit_creation(
        &self,
        token: &ChangeToken,
        accepted: bool,
    ) -> Result<CommitOutcome<H>, ReconcileError> {
        if !accepted {
            info!(token = %token.token_id, "holder creation rejected");
            return Ok(CommitOutcome::Rejected { holder: None });
        }

        let national_id = token.fields.national_id();
        if !national_id.is_empty()
            && !self
                .repository
                .find_by_national_id(&national_id)?
                .is_empty()
        {
            return Err(ReconcileError::IdentifierTaken(national_id));
        }

        let label = &self.config.holder_label;
        let person = token.fields.person_name();
        match self.repository.count_persons_named(&person)? {
            0 => {}
            1 => {
                return Err(ReconcileError::NameConflict {
                    label: label.clone(),
                    name: person.full_name(),
                })
            }
            _ => {
                return Err(ReconcileError::AmbiguousName {
                    label: label.clone(),
                    name: person.full_name(),
                })
            }
        }

        let changes = self.confirmed_changes(token, None)?;
        let mut holder = H::blank();
        apply_fields(&mut holder, &token.fields)?;
        holder.validate()?;

        if self.config.simulate {
            let message = format!("New {label} {} has been created", holder.display_name());
            return Ok(CommitOutcome::Simulated {
                holder,
                changes,
                message: self.wrap(message),
            });
        }

        let saved = self
            .repository
            .commit(SaveUnit::create(holder, pending_places(&token.fields)))?;
        let holder_id = saved
            .holder_id()
            .cloned()
            .ok_or(RepositoryError::NotFound)?;
        self.audit.record(ChangeAudit {
            holder_id: holder_id.clone(),
            token_id: token.token_id,
            created: true,
            changes: changes.clone(),
            recorded_at: Utc::now(),
        })?;
        info!(%holder_id, %national_id, "holder created from eID card");

        let message = format!("New {label} {} has been created", saved.display_name());
        Ok(CommitOutcome::Applied {
            holder: saved,
            changes,
            message,
        })
    }

    /// The diff the token's fields produce right now. It must be the one the user confirmed.
    fn confirmed_changes(
        &self,
        token: &ChangeToken,
        holder: Option<&H>,
    ) -> Result<FieldDiff, ReconcileError> {
        let changes = compute_diff(holder, &token.fields);
        if changes != token.diff {
            warn!(token = %token.token_id, "confirmed diff differs from the fields to write");
            return Err(ReconcileError::ProposalMismatch {
                token_id: token.token_id,
            });
        }
        Ok(changes)
    }

    fn wrap(&self, message: String) -> String {
        if self.config.simulate {
            format!("{SIMULATION_MARKER}{message}")
        } else {
            message
        }
    }
}

fn apply_fields<H: CardHolder>(holder: &mut H, fields: &HolderFields) -> Result<(), ValidationError> {
    for (field, value) in fields.iter() {
        holder.set_field(field, value.clone())?;
    }
    Ok(())
}

fn pending_places(fields: &HolderFields) -> Vec<Place> {
    fields.pending_place().cloned().into_iter().collect()
}
