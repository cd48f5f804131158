//! User preferences, stored as JSON in the platform config directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const PREFS_FILE: &str = "preferences.json";

/// Get the config directory using the platform-appropriate location.
/// Falls back to `~/.orgdesk/` if the platform dir is unavailable.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("orgdesk"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".orgdesk")
        })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub theme: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: "dark".to_string(),
        }
    }
}

/// Load preferences, seeding the file with defaults on first run. A corrupt
/// file is reported and left in place rather than silently overwritten.
pub fn load_preferences() -> Preferences {
    load_or_seed(&config_dir().join(PREFS_FILE))
}

fn load_or_seed(path: &Path) -> Preferences {
    if !path.exists() {
        let prefs = Preferences::default();
        if let Err(e) = save_preferences_to(&prefs, path) {
            eprintln!("Warning: could not seed {}: {e}", path.display());
        }
        return prefs;
    }
    load_preferences_from(path)
}

fn load_preferences_from(path: &Path) -> Preferences {
    if !path.exists() {
        return Preferences::default();
    }
    let content = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Warning: could not read {}: {e}", path.display());
            return Preferences::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(prefs) => prefs,
        Err(e) => {
            eprintln!(
                "Error: corrupt preferences {}: {e}. Using defaults.",
                path.display()
            );
            Preferences::default()
        }
    }
}

fn save_preferences_to(prefs: &Preferences, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config dir: {e}"))?;
    }
    let json = serde_json::to_string_pretty(prefs)
        .map_err(|e| format!("Failed to serialize preferences: {e}"))?;
    std::fs::write(path, json).map_err(|e| format!("Failed to write preferences: {e}"))
}
