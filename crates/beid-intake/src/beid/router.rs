use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{CardHolder, HolderId};
use super::parser::CardReadError;
use super::repository::{AuditSink, Geography, HolderRepository};
use super::service::{CardReconciler, ChangeToken, CommitOutcome, Proposal, ReconcileError};

/// Body of the card-reading endpoints: the reader's raw dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardReadRequest {
    pub card_data: String,
}

/// Body of the confirmation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRequest {
    pub token: ChangeToken,
    pub accepted: bool,
}

impl ReconcileError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ReconcileError::Read(CardReadError::MissingCardNumber)
            | ReconcileError::Read(CardReadError::Geography(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ReconcileError::Read(_) | ReconcileError::Validation(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ReconcileError::IdentifierTaken(_)
            | ReconcileError::NameConflict { .. }
            | ReconcileError::AmbiguousName { .. }
            | ReconcileError::IdentifierMismatch { .. }
            | ReconcileError::StaleRecord { .. }
            | ReconcileError::ProposalMismatch { .. } => StatusCode::CONFLICT,
            ReconcileError::HolderNotFound(_) => StatusCode::NOT_FOUND,
            ReconcileError::DuplicateIdentifier { .. }
            | ReconcileError::Repository(_)
            | ReconcileError::Audit(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ReconcileError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.to_string() });
        (self.status_code(), axum::Json(payload)).into_response()
    }
}

/// Router builder exposing the two-phase card reading endpoints.
pub fn card_router<H, R, G, A>(reconciler: Arc<CardReconciler<H, R, G, A>>) -> Router
where
    H: CardHolder + Serialize,
    R: HolderRepository<H> + 'static,
    G: Geography + 'static,
    A: AuditSink + 'static,
{
    Router::new()
        .route("/api/v1/beid/cards", post(find_by_card_handler::<H, R, G, A>))
        .route(
            "/api/v1/beid/holders/:holder_id/card",
            post(holder_card_handler::<H, R, G, A>),
        )
        .route("/api/v1/beid/changes", post(commit_handler::<H, R, G, A>))
        .with_state(reconciler)
}

pub(crate) async fn find_by_card_handler<H, R, G, A>(
    State(reconciler): State<Arc<CardReconciler<H, R, G, A>>>,
    axum::Json(request): axum::Json<CardReadRequest>,
) -> Response
where
    H: CardHolder + Serialize,
    R: HolderRepository<H> + 'static,
    G: Geography + 'static,
    A: AuditSink + 'static,
{
    let result = reconciler
        .read_card(&request.card_data)
        .and_then(|fields| reconciler.propose_for_card(fields));
    proposal_response(result)
}

pub(crate) async fn holder_card_handler<H, R, G, A>(
    State(reconciler): State<Arc<CardReconciler<H, R, G, A>>>,
    Path(holder_id): Path<String>,
    axum::Json(request): axum::Json<CardReadRequest>,
) -> Response
where
    H: CardHolder + Serialize,
    R: HolderRepository<H> + 'static,
    G: Geography + 'static,
    A: AuditSink + 'static,
{
    let holder_id = HolderId(holder_id);
    let result = reconciler
        .read_card(&request.card_data)
        .and_then(|fields| reconciler.propose_for_holder(&holder_id, fields));
    proposal_response(result)
}

pub(crate) async fn commit_handler<H, R, G, A>(
    State(reconciler): State<Arc<CardReconciler<H, R, G, A>>>,
    axum::Json(request): axum::Json<CommitRequest>,
) -> Response
where
    H: CardHolder + Serialize,
    R: HolderRepository<H> + 'static,
    G: Geography + 'static,
    A: AuditSink + 'static,
{
    match reconciler.commit_change(&request.token, request.accepted) {
        Ok(CommitOutcome::Applied {
            holder,
            changes,
            message,
        }) => {
            let payload = json!({
                "status": "applied",
                "message": message,
                "changes": changes.lines(),
                "holder": holder,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Ok(CommitOutcome::Simulated {
            holder,
            changes,
            message,
        }) => {
            let payload = json!({
                "status": "simulated",
                "message": message,
                "changes": changes.lines(),
                "holder": holder,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Ok(CommitOutcome::Rejected { holder }) => {
            let payload = json!({
                "status": "rejected",
                "holder": holder,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error.into_response(),
    }
}

fn proposal_response<H: Serialize>(result: Result<Proposal<H>, ReconcileError>) -> Response {
    match result {
        Ok(Proposal::UpToDate { holder, message }) => {
            let payload = json!({
                "status": "up_to_date",
                "message": message,
                "holder": holder,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Ok(Proposal::Confirm(token)) => {
            let payload = json!({
                "status": "confirm",
                "message": token.message(),
                "warnings": token.fields.warnings(),
                "token": token,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error.into_response(),
    }
}
