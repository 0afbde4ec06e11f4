mod cli;
mod infra;
mod parse;
mod routes;
mod server;

use beid_intake::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
