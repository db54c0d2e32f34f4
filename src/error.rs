use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Interaction failed: {0}")]
    TransientInteraction(String),

    #[error("{action} failed after {attempts} attempts: {last_error}")]
    InteractionExhausted {
        action: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Unexpected page structure: {0}")]
    StructuralDrift(String),

    #[error("Consistency check failed: {0}")]
    Consistency(String),

    #[error("Failed to persist {what}: {source}")]
    ResourceIo {
        what: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to resume: {0}")]
    Resolution(String),

    #[error("Page {page} did not stabilize after {attempts} attempts")]
    PageUnstable { page: u32, attempts: u32 },

    #[error("Failed to launch Chrome: {0}")]
    LaunchFailed(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Navigation timeout after {0}s")]
    NavigationTimeout(u64),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("File I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDeError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),
}

impl HarvestError {
    pub fn transient(err: impl std::fmt::Display) -> Self {
        Self::TransientInteraction(err.to_string())
    }

    pub fn resource(what: impl Into<String>, source: std::io::Error) -> Self {
        Self::ResourceIo {
            what: what.into(),
            source,
        }
    }

    /// Only interaction hiccups are worth another attempt; everything else is fatal.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientInteraction(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransientInteraction(_) | Self::InteractionExhausted { .. } => {
                "TransientInteractionFailure"
            }
            Self::StructuralDrift(_) => "StructuralDriftError",
            Self::Consistency(_) => "ConsistencyError",
            Self::ResourceIo { .. } | Self::IoError(_) | Self::JsonError(_) => "ResourceIOError",
            Self::Resolution(_) => "ResolutionFailure",
            Self::PageUnstable { .. } => "PageFetchFailure",
            Self::ConfigError(_) | Self::TomlDeError(_) | Self::TomlSerError(_) => {
                "ConfigurationError"
            }
            Self::LaunchFailed(_)
            | Self::Browser(_)
            | Self::ElementNotFound { .. }
            | Self::NavigationTimeout(_)
            | Self::InvalidUrl(_) => "BrowserError",
        }
    }

    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::LaunchFailed(_) => vec![
                "Ensure Chrome/Chromium is installed".into(),
                "Try specifying Chrome path with --chrome-path".into(),
            ],
            Self::InteractionExhausted { .. } => vec![
                "Re-run the harvest; it resumes from the last saved item".into(),
                "Run with --headless false to watch the interaction".into(),
            ],
            Self::StructuralDrift(_) => vec![
                "The gallery markup may have changed".into(),
                "Review the [selectors] section of the configuration".into(),
            ],
            Self::Consistency(_) => vec![
                "The full-resolution view redirected; nothing was saved for this asset".into(),
                "Re-run the harvest to retry the item".into(),
            ],
            Self::ResourceIo { .. } | Self::IoError(_) => vec![
                "Check free disk space and write permissions of the storage root".into(),
            ],
            Self::Resolution(_) => vec![
                "The last saved item may have been removed from the collection".into(),
                "Inspect or delete the checkpoint file to restart from the oldest page".into(),
            ],
            Self::PageUnstable { .. } => vec![
                "Check network connectivity".into(),
                "Raise [retry] stabilize_attempts in the configuration".into(),
            ],
            Self::NavigationTimeout(_) => vec![
                "Check network connectivity".into(),
                "Raise [browser] request_timeout_secs in the configuration".into(),
            ],
            Self::ConfigError(_) | Self::TomlDeError(_) | Self::TomlSerError(_) => vec![
                "Check configuration file syntax".into(),
                "Use --config to specify a different config file".into(),
            ],
            _ => vec![
                "Run with --verbose for more details".into(),
                "Log in again with: bookmark-harvester login".into(),
            ],
        }
    }
}
