use crate::error::FeedbackError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Sound set index meaning "no sound"
pub const SOUND_DISABLED: i32 = -1;

/// The two persisted user preferences read by the feedback adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackPreferences {
    #[serde(default = "default_led_enabled")]
    pub led_enabled: bool,

    /// Index of the sound set, or -1 for silence
    #[serde(default)]
    pub sound_effect: i32,
}

impl Default for FeedbackPreferences {
    fn default() -> Self {
        Self {
            led_enabled: default_led_enabled(),
            sound_effect: 0,
        }
    }
}

fn default_led_enabled() -> bool {
    true
}

/// TOML-backed preference file with an in-memory copy.
///
/// Reads are served from memory so the feedback path never touches disk.
pub struct PreferenceStore {
    path: PathBuf,
    current: RwLock<FeedbackPreferences>,
}

impl PreferenceStore {
    /// Load preferences, falling back to defaults when the file is missing or
    /// unreadable
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let current = match Self::read_file(&path) {
            Ok(Some(prefs)) => {
                info!("Loaded feedback preferences from {}", path.display());
                prefs
            }
            Ok(None) => {
                debug!("No preference file at {}, using defaults", path.display());
                FeedbackPreferences::default()
            }
            Err(e) => {
                warn!("{}; using defaults", e);
                FeedbackPreferences::default()
            }
        };

        Self {
            path,
            current: RwLock::new(current),
        }
    }

    pub(super) fn read_file(path: &Path) -> Result<Option<FeedbackPreferences>, FeedbackError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(FeedbackError::Preferences {
                    path: path.display().to_string(),
                    details: e.to_string(),
                })
            }
        };

        toml::from_str(&contents)
            .map(Some)
            .map_err(|e| FeedbackError::Preferences {
                path: path.display().to_string(),
                details: e.to_string(),
            })
    }

    pub fn current(&self) -> FeedbackPreferences {
        *self.current.read()
    }

    /// Replace the preferences and persist them
    pub fn update(&self, prefs: FeedbackPreferences) -> Result<(), FeedbackError> {
        let serialized = toml::to_string(&prefs).map_err(|e| FeedbackError::Preferences {
            path: self.path.display().to_string(),
            details: e.to_string(),
        })?;
        std::fs::write(&self.path, serialized).map_err(|e| FeedbackError::Preferences {
            path: self.path.display().to_string(),
            details: e.to_string(),
        })?;

        *self.current.write() = prefs;
        info!("Saved feedback preferences: {:?}", prefs);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
