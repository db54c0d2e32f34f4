use crate::{HarvestError, Result};
use chrono::{Local, NaiveDate};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only run log, one file per run day.
///
/// Lines look like `2024/05/01 13:07 [3 - 12] https://...`. The file name is
/// fixed when the run starts, so a run crossing midnight keeps one file.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn for_today(dir: impl AsRef<Path>) -> Self {
        Self::new(dir, Local::now().date_naive())
    }

    pub fn new(dir: impl AsRef<Path>, date: NaiveDate) -> Self {
        Self {
            path: dir
                .as_ref()
                .join(format!("log{}.txt", date.format("%Y%m%d"))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, message: &str) -> Result<()> {
        let stamp = Local::now().format("%Y/%m/%d %H:%M");

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| HarvestError::resource("run log", e))?;

        writeln!(file, "{} {}", stamp, message).map_err(|e| HarvestError::resource("run log", e))
    }
}
