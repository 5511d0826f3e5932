use log::warn;
use serde::{Deserialize, Serialize};
use sm83_core::Model;
use sm83_core::runner::RunLimits;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ModelSetting {
    Dmg0,
    #[default]
    Dmg,
    Cgb,
}

impl From<ModelSetting> for Model {
    fn from(setting: ModelSetting) -> Self {
        match setting {
            ModelSetting::Dmg0 => Model::Dmg0,
            ModelSetting::Dmg => Model::Dmg,
            ModelSetting::Cgb => Model::Cgb,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub model: ModelSetting,
    pub boot_rom: Option<PathBuf>,
    pub max_cycles: Option<u64>,
    pub max_instructions: Option<u64>,
    pub snapshot_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: ModelSetting::default(),
            boot_rom: None,
            max_cycles: None,
            max_instructions: None,
            snapshot_interval: RunLimits::default().snapshot_interval,
        }
    }
}

impl Config {
    pub fn limits(&self) -> RunLimits {
        RunLimits {
            max_cycles: self.max_cycles,
            max_instructions: self.max_instructions,
            snapshot_interval: self.snapshot_interval,
        }
    }
}

/// `sm83.toml` under the user's config directory.
pub fn default_config_path() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("sm83-emu").join("sm83.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("sm83-emu")
            .join("sm83.toml");
    }

    PathBuf::from("sm83.toml")
}

/// Missing files give the defaults silently; unparsable ones with a warning.
pub fn load_from_file(path: &Path) -> Config {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return Config::default(),
    };

    match toml::from_str::<Config>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse config {}: {e}; using defaults",
                path.display()
            );
            Config::default()
        }
    }
}
