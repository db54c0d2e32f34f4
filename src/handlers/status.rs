use crate::chrome::SessionStore;
use crate::harvest::{CheckpointStore, FileCheckpointStore, FsArtifactStore, ResumeCheckpoint};
use crate::output::{self, text};
use crate::{Config, Result};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
pub struct StatusResult {
    pub root: PathBuf,
    pub checkpoint: Option<ResumeCheckpoint>,
    pub assets_saved: usize,
    pub session_cookies: usize,
}

impl output::OutputFormatter for StatusResult {
    fn format_text(&self) -> String {
        let mut lines = vec![
            text::section("Harvest Status"),
            text::key_value("Root", &self.root.display().to_string()),
            text::key_value("Assets saved", &self.assets_saved.to_string()),
            text::key_value("Session cookies", &self.session_cookies.to_string()),
        ];

        match &self.checkpoint {
            Some(checkpoint) => {
                lines.push(text::subsection("Resume point"));
                lines.push(text::key_value("Page", &checkpoint.page_number.to_string()));
                lines.push(text::key_value("Item", &checkpoint.item_url));
            }
            None => lines.push(text::info("No checkpoint; next run starts at the oldest page")),
        }

        if self.session_cookies == 0 {
            lines.push(text::warning("No stored session; run `login` first"));
        }

        lines.join("\n")
    }

    fn format_json(&self, pretty: bool) -> Result<String> {
        output::to_json(self, pretty)
    }
}

pub fn handle_status(config: &Config) -> Result<StatusResult> {
    let storage = &config.storage;
    let checkpoint = FileCheckpointStore::new(storage.checkpoint_path()).load()?;
    let assets_saved =
        FsArtifactStore::new(storage.asset_dir(), storage.metadata_dir()).count()?;
    let session_cookies = SessionStore::new(storage.cookie_dir()).load()?.len();

    Ok(StatusResult {
        root: storage.root.clone(),
        checkpoint,
        assets_saved,
        session_cookies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormatter;
    use tempfile::TempDir;

    fn config_at(root: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.storage.root = root.to_path_buf();
        config
    }

    #[test]
    fn test_status_of_fresh_root() {
        let temp = TempDir::new().unwrap();
        let status = handle_status(&config_at(temp.path())).unwrap();
        assert!(status.checkpoint.is_none());
        assert_eq!(status.assets_saved, 0);
        assert_eq!(status.session_cookies, 0);
        assert!(status.format_text().contains("No checkpoint"));
    }

    #[test]
    fn test_status_reports_checkpoint_and_assets() {
        let temp = TempDir::new().unwrap();
        let config = config_at(temp.path());
        let storage = &config.storage;
        crate::utils::ensure_dirs(&storage.required_dirs()).unwrap();

        FileCheckpointStore::new(storage.checkpoint_path())
            .save(&ResumeCheckpoint::new(4, "https://www.pixiv.net/artworks/77"))
            .unwrap();
        std::fs::write(storage.asset_dir().join("77_p0.png"), b"png").unwrap();
        std::fs::write(storage.asset_dir().join("78_p0.jpg"), b"jpg").unwrap();

        let status = handle_status(&config).unwrap();
        assert_eq!(status.assets_saved, 2);
        assert_eq!(
            status.checkpoint,
            Some(ResumeCheckpoint::new(4, "https://www.pixiv.net/artworks/77"))
        );

        let json: serde_json::Value =
            serde_json::from_str(&status.format_json(false).unwrap()).unwrap();
        assert_eq!(json["checkpoint"]["bookmarkPageNum"], 4);
    }
}
