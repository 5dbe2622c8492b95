use crate::error::FeedbackError;
use crate::motor::Direction;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, warn};

/// Sound sets shipped with the device, as (popup, takeback) pairs
pub const SOUND_SETS: [(&str, &str); 6] = [
    ("popup_muqin_up.ogg", "popup_muqin_down.ogg"),
    ("popup_yingyan_up.ogg", "popup_yingyan_down.ogg"),
    ("popup_mofa_up.ogg", "popup_mofa_down.ogg"),
    ("popup_jijia_up.ogg", "popup_jijia_down.ogg"),
    ("popup_chilun_up.ogg", "popup_chilun_down.ogg"),
    ("popup_cangmen_up.ogg", "popup_cangmen_down.ogg"),
];

/// Plays the selected sound set through an external player command
pub struct SoundEffects {
    sound_dir: PathBuf,
    player: String,
}

impl SoundEffects {
    pub fn new(sound_dir: impl Into<PathBuf>, player: impl Into<String>) -> Self {
        Self {
            sound_dir: sound_dir.into(),
            player: player.into(),
        }
    }

    /// File for `direction` in sound set `index`; `None` when silent or out of range
    pub fn sound_file(&self, index: i32, direction: Direction) -> Option<PathBuf> {
        let set = usize::try_from(index).ok()?;
        let (up, down) = SOUND_SETS.get(set)?;
        let name = match direction {
            Direction::Open => up,
            Direction::Close => down,
        };
        Some(self.sound_dir.join(name))
    }

    pub fn play(&self, index: i32, direction: Direction) {
        let Some(file) = self.sound_file(index, direction) else {
            debug!("No sound for set {} ({})", index, direction);
            return;
        };

        if let Err(e) = self.spawn_player(&file) {
            warn!("{}", e);
        }
    }

    fn spawn_player(&self, file: &std::path::Path) -> Result<(), FeedbackError> {
        let mut child = Command::new(&self.player)
            .arg(file)
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| FeedbackError::SoundPlayer {
                player: self.player.clone(),
                source: e,
            })?;

        debug!("Playing {}", file.display());
        tokio::spawn(async move {
            if let Err(e) = child.wait().await {
                warn!("Sound player did not finish cleanly: {}", e);
            }
        });
        Ok(())
    }
}
