use crate::infra::{InMemoryHolderStore, TracingAuditLog};
use beid_intake::beid::{CardReconciler, Client, HolderFields, Proposal, ReconcilerConfig};
use beid_intake::config::{AppConfig, BeIdConfig};
use beid_intake::error::AppError;
use clap::Args;
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct ParseArgs {
    /// File holding the raw card dump sent by the reader
    #[arg(long)]
    pub(crate) payload: PathBuf,
    /// Prefix proposals with the simulation marker, whatever the configuration says
    #[arg(long)]
    pub(crate) simulate: bool,
}

pub(crate) fn run_parse(args: ParseArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let report = parse_payload(&args, &config.beid)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Parse a dump against an empty store and describe what reading it would propose.
pub(crate) fn parse_payload(args: &ParseArgs, beid: &BeIdConfig) -> Result<Value, AppError> {
    let raw = fs::read_to_string(&args.payload)?;

    let mut config = ReconcilerConfig::from(beid);
    config.simulate |= args.simulate;

    let store = Arc::new(InMemoryHolderStore::default());
    let reconciler: CardReconciler<Client, _, _, _> =
        CardReconciler::new(store.clone(), store, Arc::new(TracingAuditLog), config);

    let fields = reconciler.read_card(&raw)?;
    let proposal = match reconciler.propose_for_card(fields.clone())? {
        Proposal::Confirm(token) => token.message(),
        Proposal::UpToDate { message, .. } => message,
    };

    Ok(json!({
        "national_id": fields.national_id(),
        "card_number": fields.card_number(),
        "fields": field_map(&fields),
        "pending_place": fields.pending_place(),
        "warnings": fields.warnings(),
        "proposal": proposal,
    }))
}

fn field_map(fields: &HolderFields) -> Value {
    let entries = fields
        .iter()
        .map(|(field, value)| (field.name().to_string(), Value::String(value.to_string())))
        .collect();
    Value::Object(entries)
}
