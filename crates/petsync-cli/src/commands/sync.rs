use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use petsync_core::db::Database;
use petsync_core::observe::absorb_result;
use petsync_core::pull::PullSkip;
use petsync_core::signals::{AlwaysOnline, TokenSource};
use petsync_core::transport::HttpTransport;
use petsync_core::{
    PullOutcome, PushOutcome, SkipReason, SyncConfig, SyncEngine, SyncScheduler, SyncStores,
    SyncTrigger,
};

use crate::auth::ProfileToken;
use crate::commands::common::open_database;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

/// Everything one sync command needs, wired to the local database
pub struct SyncSession {
    // Keeps the connection the stores share alive
    _db: Database,
    pub config: SyncConfig,
    pub engine: Arc<SyncEngine>,
    pub tokens: Arc<dyn TokenSource>,
}

impl SyncSession {
    pub async fn open(db_path: &Path, profile: Option<&str>) -> Result<Self, CliError> {
        let profiles = CliProfilesConfig::load().map_err(CliError::Config)?;
        let profile_name = profiles.resolve_profile_name(profile);
        let mut config = profiles
            .profile(&profile_name)
            .cloned()
            .unwrap_or_default()
            .to_sync_config(|key| std::env::var(key).ok());
        if config.api_base_url.is_none() {
            return Err(CliError::SyncNotConfigured);
        }

        let db = open_database(db_path).await?;
        if config.device_id.is_none() {
            config.device_id = Some(db.sync_state().device_id().await?);
        }
        config.validate()?;

        let base_url = config.api_base_url.clone().unwrap_or_default();
        let transport = HttpTransport::new(base_url, config.request_timeout())
            .map_err(petsync_core::Error::from)?;
        let tokens: Arc<dyn TokenSource> = Arc::new(ProfileToken::new(&profile_name));
        let stores = SyncStores {
            outbox: Arc::new(db.outbox()),
            records: Arc::new(db.records()),
            cursors: Arc::new(db.sync_state()),
            mappings: Some(Arc::new(db.id_mappings())),
        };
        let engine = SyncEngine::new(
            &config,
            stores,
            Arc::new(transport),
            tokens.clone(),
            Arc::new(AlwaysOnline),
        );
        absorb_result("restore id map", engine.restore_id_map().await);

        tracing::debug!(
            profile = %profile_name,
            device_id = config.device_id(),
            "Opened sync session"
        );
        Ok(Self {
            _db: db,
            config,
            engine: Arc::new(engine),
            tokens,
        })
    }
}

pub async fn run_push(db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    let session = SyncSession::open(db_path, profile).await?;
    let outcome = session.engine.push_now().await;
    println!("{}", describe_push(&outcome));
    Ok(())
}

pub async fn run_pull(force: bool, db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    let session = SyncSession::open(db_path, profile).await?;
    let outcome = session.engine.pull_now(force).await;
    println!("{}", describe_pull(&outcome));
    Ok(())
}

pub async fn run_sync(db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    let session = SyncSession::open(db_path, profile).await?;
    // One-shot commands always pull, whatever the throttle says
    let (pushed, pulled) = session.engine.sync_once(true).await;
    println!("{}", describe_push(&pushed));
    println!("{}", describe_pull(&pulled));
    Ok(())
}

pub async fn run_watch(db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    let session = SyncSession::open(db_path, profile).await?;
    let scheduler = SyncScheduler::new(
        session.engine.clone(),
        session.tokens.clone(),
        session.config.scheduler_config(),
    );
    scheduler.start();
    println!("Watching for changes. Press Ctrl+C to stop.");

    let refresh = Duration::from_millis(session.config.pull_min_interval_ms.max(1_000));
    let mut ticker = tokio::time::interval(refresh);
    ticker.tick().await;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            _ = ticker.tick() => scheduler.notify(SyncTrigger::Focus),
        }
    }

    scheduler.shutdown();
    println!("Stopped.");
    Ok(())
}

pub fn describe_push(outcome: &PushOutcome) -> String {
    match outcome {
        PushOutcome::Skipped(SkipReason::Unauthenticated) => {
            "Push skipped: not signed in. Run `petsync auth login`.".to_string()
        }
        PushOutcome::Skipped(reason) => format!("Push skipped ({reason:?})"),
        PushOutcome::NothingToPush => "Nothing to push".to_string(),
        PushOutcome::Completed { accepted, rejected } if *rejected == 0 => {
            format!("Pushed {accepted} change(s)")
        }
        PushOutcome::Completed { accepted, rejected } => {
            format!("Pushed {accepted} change(s); {rejected} rejected and kept queued")
        }
        PushOutcome::Rejected { status } => {
            format!("Push rejected by server (HTTP {status}); changes kept queued")
        }
        PushOutcome::Unreachable => "Server unreachable; changes kept queued".to_string(),
        PushOutcome::Failed(message) => format!("Push failed: {message}"),
    }
}

pub fn describe_pull(outcome: &PullOutcome) -> String {
    match outcome {
        PullOutcome::Skipped(PullSkip::Unauthenticated) => {
            "Pull skipped: not signed in. Run `petsync auth login`.".to_string()
        }
        PullOutcome::Skipped(PullSkip::Throttled) => {
            "Pull skipped: pulled recently (use --force)".to_string()
        }
        PullOutcome::Skipped(reason) => format!("Pull skipped ({reason:?})"),
        PullOutcome::Applied {
            upserts,
            deletes,
            cursor,
        } => {
            let cursor = cursor.as_deref().unwrap_or("unchanged");
            format!("Pulled {upserts} update(s), {deletes} deletion(s) (cursor {cursor})")
        }
        PullOutcome::Failed(message) => format!("Pull failed: {message}"),
    }
}
