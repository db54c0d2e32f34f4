use crate::chrome::{BrowserSessionManager, SessionStore};
use crate::harvest::{
    Collaborators, CollectionDriver, FileCheckpointStore, FsArtifactStore, HarvestSummary,
};
use crate::output::{self, text};
use crate::run_log::RunLog;
use crate::{Config, Result, utils};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct HarvestResult {
    #[serde(flatten)]
    pub summary: HarvestSummary,
    pub run_log: PathBuf,
}

impl output::OutputFormatter for HarvestResult {
    fn format_text(&self) -> String {
        let s = &self.summary;
        let mut lines = vec![
            text::success("Collection harvested"),
            text::key_value("Pages walked", &s.pages_walked.to_string()),
            text::key_value("Items seen", &s.items_seen.to_string()),
            text::key_value("Assets saved", &s.assets_saved.to_string()),
            text::key_value("Already present", &s.assets_already_present.to_string()),
        ];
        if s.items_skipped_unsupported > 0 {
            lines.push(text::key_value(
                "Unsupported (skipped)",
                &s.items_skipped_unsupported.to_string(),
            ));
        }
        lines.push(text::key_value("Run log", &self.run_log.display().to_string()));
        lines.join("\n")
    }

    fn format_json(&self, pretty: bool) -> Result<String> {
        output::to_json(self, pretty)
    }
}

pub async fn handle_run(config: Arc<Config>) -> Result<HarvestResult> {
    let storage = &config.storage;
    utils::ensure_dirs(&storage.required_dirs())?;

    let run_log = RunLog::for_today(storage.log_dir());
    let sessions = SessionStore::new(storage.cookie_dir());
    let artifacts = FsArtifactStore::new(storage.asset_dir(), storage.metadata_dir());
    let checkpoints = FileCheckpointStore::new(storage.checkpoint_path());

    let manager = match BrowserSessionManager::launch(config.clone()).await {
        Ok(manager) => manager,
        Err(e) => {
            let record = format!(
                "[0 - 0] Harvest failed\nError: {}: {}\nOrigin: launching browser",
                e.kind(),
                e
            );
            if let Err(log_err) = run_log.append(&record) {
                tracing::error!("Could not write failure record: {}", log_err);
            }
            return Err(e);
        }
    };

    let driver = CollectionDriver::new(
        Collaborators {
            listing: manager.listing(),
            surfaces: &manager,
            artifacts: &artifacts,
            checkpoints: &checkpoints,
            sessions: &sessions,
            run_log: &run_log,
        },
        &config,
    );
    let outcome = driver.run().await;

    if let Err(e) = manager.close().await {
        tracing::warn!("{}", e);
    }

    match outcome {
        Ok(summary) => Ok(HarvestResult {
            summary,
            run_log: run_log.path().to_path_buf(),
        }),
        Err(failure) => {
            eprintln!(
                "{}",
                text::error(&format!(
                    "Harvest stopped at [{}] while {}",
                    failure.position, failure.state
                ))
            );
            eprintln!("{}", text::info(&format!("Details in {}", run_log.path().display())));
            Err(failure.error)
        }
    }
}
