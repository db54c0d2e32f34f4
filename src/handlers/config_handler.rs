use crate::{HarvestError, Result, config::Config, output};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
pub struct ConfigInfo {
    pub path: PathBuf,
    pub exists: bool,
}

#[derive(Debug, Serialize)]
pub struct ConfigShowResult {
    pub config: Config,
}

impl output::OutputFormatter for ConfigInfo {
    fn format_text(&self) -> String {
        use crate::output::text;
        format!(
            "{}\n{}",
            text::key_value("Config Path", &self.path.display().to_string()),
            text::key_value("Exists", &self.exists.to_string())
        )
    }

    fn format_json(&self, pretty: bool) -> Result<String> {
        output::to_json(self, pretty)
    }
}

impl output::OutputFormatter for ConfigShowResult {
    fn format_text(&self) -> String {
        self.config.show()
    }

    fn format_json(&self, pretty: bool) -> Result<String> {
        output::to_json(&self.config, pretty)
    }
}

pub fn handle_config_init() -> Result<ConfigInfo> {
    let config_path = crate::config::default_config_path()?;
    let config_dir = config_path
        .parent()
        .ok_or_else(|| HarvestError::ConfigError("Invalid config path".into()))?;

    std::fs::create_dir_all(config_dir)?;

    if config_path.exists() {
        return Err(HarvestError::ConfigError(format!(
            "Config file already exists at {}",
            config_path.display()
        )));
    }

    let toml_content = toml::to_string_pretty(&Config::default())?;
    std::fs::write(&config_path, toml_content)?;

    Ok(ConfigInfo {
        path: config_path,
        exists: true,
    })
}

pub fn handle_config_show(config: &Config) -> Result<ConfigShowResult> {
    Ok(ConfigShowResult {
        config: config.clone(),
    })
}

pub fn handle_config_path() -> Result<ConfigInfo> {
    let config_path = crate::config::default_config_path()?;
    let exists = config_path.exists();

    Ok(ConfigInfo {
        path: config_path,
        exists,
    })
}
