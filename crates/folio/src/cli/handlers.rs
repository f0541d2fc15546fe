//! One handler per command. Each opens a [`DocumentSession`], does its work
//! and leaves the session closed.

use super::render;
use super::setup::{Commands, ConfigCommands, RecoverCommands};
use anyhow::{anyhow, bail, Context, Result};
use folioapp::config::FolioConfig;
use folioapp::model::{Locator, Snapshot, Version};
use folioapp::recovery::{RecoveryChoice, RecoveryRecord};
use folioapp::session::{CloseAction, DocumentSession, SessionConfig};
use folioapp::store::SharedBackend;
use std::io::Read;
use tracing::debug;

pub struct AppState {
    pub config: FolioConfig,
    pub backend: SharedBackend,
}

impl AppState {
    fn session(&self) -> DocumentSession {
        DocumentSession::new(self.backend.clone(), SessionConfig::from(&self.config))
    }
}

pub async fn dispatch(state: &AppState, command: Commands) -> Result<()> {
    match command {
        Commands::New { title, content } => new(state, title.join(" "), content).await,
        Commands::List => list(state).await,
        Commands::Show { document, json } => show(state, &document, json).await,
        Commands::Write {
            document,
            text,
            json,
        } => write(state, &document, text, json).await,
        Commands::History { document } => history(state, &document).await,
        Commands::Restore { document, version } => restore(state, &document, &version).await,
        Commands::Delete { document } => delete(state, &document).await,
        Commands::Recover { action } => {
            recover(state, action.unwrap_or(RecoverCommands::List)).await
        }
        Commands::Config { action } => config(state, action.unwrap_or(ConfigCommands::Show)),
    }
}

fn locator(raw: &str) -> Locator {
    // Infallible: anything that is not a uuid is a path.
    raw.parse().unwrap_or_else(|never| match never {})
}

fn parse_content(input: &str, json: bool) -> Result<Snapshot> {
    if json {
        let value: serde_json::Value =
            serde_json::from_str(input).context("content is not valid JSON")?;
        Ok(Snapshot::new(value))
    } else {
        Ok(render::snapshot_from_text(input))
    }
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("could not read content from stdin")?;
    Ok(buffer)
}

async fn new(state: &AppState, title: String, content: Option<String>) -> Result<()> {
    let mut session = state.session();
    let document = session.create_empty(title)?;
    let snapshot = match content {
        Some(text) => render::snapshot_from_text(&text),
        None => Snapshot::skeleton(),
    };
    session.mutate(snapshot)?;
    let version = session.save(true).await?;
    let saved = session.document().unwrap_or(document);
    session.close(CloseAction::Save).await?;

    render::print_created(&saved);
    render::print_saved(&saved, &version);
    Ok(())
}

async fn list(state: &AppState) -> Result<()> {
    let session = state.session();
    let documents = session.list_documents().await?;
    render::print_documents(&documents);
    Ok(())
}

async fn show(state: &AppState, raw: &str, json: bool) -> Result<()> {
    let mut session = state.session();
    let document = session.load(&locator(raw)).await?;
    let versions = session.versions()?.len();
    session.close(CloseAction::Save).await?;

    if json {
        render::print_message(serde_json::to_string_pretty(document.content.as_value())?);
    } else {
        render::print_document(&document, versions);
    }
    Ok(())
}

async fn write(state: &AppState, raw: &str, text: Option<String>, json: bool) -> Result<()> {
    let input = match text {
        Some(text) => text,
        None => read_stdin()?,
    };
    let snapshot = parse_content(&input, json)?;

    let mut session = state.session();
    session.load(&locator(raw)).await?;
    session.mutate(snapshot)?;
    let version = session.save(true).await?;
    let document = session.document().ok_or_else(|| anyhow!("document vanished"))?;
    session.close(CloseAction::Save).await?;

    render::print_saved(&document, &version);
    Ok(())
}

async fn history(state: &AppState, raw: &str) -> Result<()> {
    let mut session = state.session();
    session.load(&locator(raw)).await?;
    let versions = session.versions()?;
    session.close(CloseAction::Save).await?;

    render::print_versions(&versions);
    Ok(())
}

fn find_version<'a>(versions: &'a [Version], prefix: &str) -> Result<&'a Version> {
    let matches: Vec<&Version> = versions
        .iter()
        .filter(|v| v.id.to_string().starts_with(prefix))
        .collect();
    match matches.as_slice() {
        [version] => Ok(version),
        [] => bail!("no version matches '{}'", prefix),
        _ => bail!("'{}' matches {} versions; use a longer prefix", prefix, matches.len()),
    }
}

async fn restore(state: &AppState, raw: &str, prefix: &str) -> Result<()> {
    let mut session = state.session();
    session.load(&locator(raw)).await?;
    let versions = session.versions()?;
    let target = find_version(&versions, prefix)?;
    let content = session.restore_version(&target.id)?;
    session.mutate(content)?;
    let version = session.save(true).await?;
    let document = session.document().ok_or_else(|| anyhow!("document vanished"))?;
    session.close(CloseAction::Save).await?;

    render::print_saved(&document, &version);
    Ok(())
}

async fn delete(state: &AppState, raw: &str) -> Result<()> {
    let session = state.session();
    session.delete_document(&locator(raw)).await?;
    render::print_message(format!("Deleted {}", raw));
    Ok(())
}

fn find_record(records: Vec<RecoveryRecord>, prefix: &str) -> Result<RecoveryRecord> {
    let mut matches: Vec<RecoveryRecord> = records
        .into_iter()
        .filter(|r| r.name.starts_with(prefix))
        .collect();
    match matches.len() {
        1 => Ok(matches.remove(0)),
        0 => bail!("no recovery record matches '{}'", prefix),
        n => bail!("'{}' matches {} records; use a longer prefix", prefix, n),
    }
}

async fn recover(state: &AppState, action: RecoverCommands) -> Result<()> {
    let mut session = state.session();
    match action {
        RecoverCommands::List => {
            let orphans = session.scan_for_orphans().await?;
            render::print_records(&orphans);
        }
        RecoverCommands::Keep { record } => {
            let record = find_record(session.scan_for_orphans().await?, &record)?;

            let original = record.original_path.clone().map(Locator::Path);
            let loaded = match &original {
                Some(locator) => match session.load(locator).await {
                    Ok(document) => Some(document),
                    Err(folioapp::FolioError::NotFound(_)) => None,
                    Err(e) => return Err(e.into()),
                },
                None => None,
            };
            if loaded.is_none() {
                let title = record.title.clone().unwrap_or_else(|| "Recovered".to_string());
                debug!(record = %record.name, "original missing; recovering into a new document");
                session.create_empty(title)?;
            }

            session.mutate(record.content.clone())?;
            let version = session.save(true).await?;
            session.recover(&record, RecoveryChoice::Keep).await?;
            let document = session.document().ok_or_else(|| anyhow!("document vanished"))?;
            session.flush().await;
            session.close(CloseAction::Save).await?;

            render::print_saved(&document, &version);
        }
        RecoverCommands::Discard { record } => {
            let record = find_record(session.scan_for_orphans().await?, &record)?;
            session.recover(&record, RecoveryChoice::Discard).await?;
            render::print_message(format!("Discarded {}", record.name));
        }
        RecoverCommands::Prune => {
            let removed = session.prune_recovery().await?;
            render::print_message(format!("Removed {} recovery record(s)", removed));
        }
    }
    Ok(())
}

fn config(state: &AppState, action: ConfigCommands) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let data_dir = state
                .config
                .data_dir()
                .map(|d| d.display().to_string())
                .unwrap_or_default();
            render::print_config(&state.config, &data_dir);
        }
        ConfigCommands::Template => render::print_message(FolioConfig::template()),
    }
    Ok(())
}
