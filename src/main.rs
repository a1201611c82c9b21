mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use quizsession::config::SessionConfig;
use quizsession::gateway::PersistenceGateway;
use quizsession::session::AttemptSession;
use quizsession::state::AppState;
use quizsession::store::{self, LocalStore};
use quizsession::supply::{QuestionSupply, YamlAttemptFile};
use quizsession::{logging, tui};

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = SessionConfig::load(cli.config.as_deref())?;
    if cli.data_dir.is_some() {
        config.data_dir = cli.data_dir.clone();
    }
    if cli.log_file.is_some() {
        config.log_file = cli.log_file.clone();
    }
    logging::init(&config.log_file())?;

    let supply = YamlAttemptFile::new(&cli.attempt_file);
    let attempt = Arc::new(
        supply
            .load()
            .with_context(|| format!("cannot load {}", supply.path().display()))?,
    );
    info!(attempt_id = %attempt.id, questions = attempt.len(), "attempt loaded");

    let data_dir = config.data_dir();
    if cli.clear {
        LocalStore::clear(&data_dir, &attempt.id)?;
        eprintln!("Saved answers cleared.");
    }

    let local = Arc::new(LocalStore::open(&data_dir, Arc::clone(&attempt))?);
    let doc = local.document().await;

    if cli.status {
        print!("{}", store::status_report(&attempt, &doc));
        return Ok(());
    }

    if let Some(dest) = &cli.export {
        local.export(dest).await?;
        eprintln!("Answers exported to {}", dest.display());
        return Ok(());
    }

    let gateway: Arc<dyn PersistenceGateway> = local.clone();
    let session = AttemptSession::new((*attempt).clone(), gateway, &config);
    session.resume(&doc);

    let state = match &doc.submission {
        Some(submission) => {
            info!(finalized_at = %submission.finalized_at, "attempt already submitted");
            AppState::already_submitted(session.clone(), submission.finalized_at)
        }
        None => {
            session.start()?;
            let state = AppState::new(session.clone(), Some(local));
            state.persist_progress();
            state
        }
    };

    let outcome = tokio::task::block_in_place(|| tui::run_tui(state));
    session.shutdown();
    if let Err(e) = &outcome {
        warn!(error = %e, "terminal session ended with an error");
    }
    outcome
}
