//! The user's "fluid effect on/off" choice, persisted between sessions.

use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectSettings {
    pub fluid_enabled: bool,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self { fluid_enabled: true }
    }
}

impl EffectSettings {
    /// Reads the settings file; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Flips the fluid flag and returns the new value.
    pub fn toggle(&mut self) -> bool {
        self.fluid_enabled = !self.fluid_enabled;
        self.fluid_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("backdrop-fx-{}-{name}", std::process::id()))
    }

    #[test]
    fn missing_file_is_enabled() {
        let s = EffectSettings::load(scratch("does-not-exist.json")).unwrap();
        assert!(s.fluid_enabled);
    }

    #[test]
    fn toggle_survives_save_and_load() {
        let path = scratch("settings/effects.json");
        let mut s = EffectSettings::default();
        assert!(!s.toggle());
        s.save(&path).unwrap();
        assert_eq!(EffectSettings::load(&path).unwrap(), s);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn garbage_is_an_error() {
        let path = scratch("garbage.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(EffectSettings::load(&path), Err(SettingsError::Json(_))));
        let _ = std::fs::remove_file(&path);
    }
}
