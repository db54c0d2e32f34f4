use crate::{HarvestError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn find_chrome_executable() -> Result<PathBuf> {
    if let Some(path) = find_in_standard_locations()? {
        return Ok(path);
    }

    if let Some(path) = find_in_path() {
        return Ok(path);
    }

    Err(HarvestError::LaunchFailed(
        "Could not find Chrome/Chromium executable. Please specify with --chrome-path".into(),
    ))
}

#[cfg(target_os = "macos")]
fn find_in_standard_locations() -> Result<Option<PathBuf>> {
    Ok(first_existing(&[
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/Applications/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
    ]))
}

#[cfg(target_os = "linux")]
fn find_in_standard_locations() -> Result<Option<PathBuf>> {
    Ok(first_existing(&[
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
    ]))
}

#[cfg(target_os = "windows")]
fn find_in_standard_locations() -> Result<Option<PathBuf>> {
    Ok(first_existing(&[
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files\Chromium\Application\chrome.exe",
    ]))
}

#[cfg(any(target_os = "macos", target_os = "linux", target_os = "windows"))]
fn first_existing(paths: &[&str]) -> Option<PathBuf> {
    paths.iter().map(PathBuf::from).find(|p| p.exists())
}

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
fn find_in_standard_locations() -> Result<Option<PathBuf>> {
    Ok(None)
}

fn find_in_path() -> Option<PathBuf> {
    let binaries: &[&str] = if cfg!(windows) {
        &["chrome.exe", "chromium.exe"]
    } else {
        &["google-chrome", "chromium", "chromium-browser", "chrome"]
    };

    binaries.iter().find_map(|binary| which::which(binary).ok())
}

/// Writes `bytes` to a sibling temp file, syncs it and renames it over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp, path)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirStatus {
    Existing,
    Created,
}

/// Creates each missing directory, reporting which ones were already there.
pub fn ensure_dirs(dirs: &[PathBuf]) -> Result<Vec<(PathBuf, DirStatus)>> {
    let mut statuses = Vec::with_capacity(dirs.len());

    for dir in dirs {
        if dir.is_dir() {
            tracing::info!("Exist directory: {}", dir.display());
            statuses.push((dir.clone(), DirStatus::Existing));
        } else {
            std::fs::create_dir_all(dir)
                .map_err(|e| HarvestError::resource(format!("directory {}", dir.display()), e))?;
            tracing::info!("Make directory: {}", dir.display());
            statuses.push((dir.clone(), DirStatus::Created));
        }
    }

    Ok(statuses)
}
