use crate::error::FeedbackError;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const LED_ON: &str = "255";
const LED_OFF: &str = "0";

/// Indicator LED driven through sysfs brightness nodes
pub struct LedIndicator {
    paths: Vec<PathBuf>,
    off_timer: Mutex<Option<JoinHandle<()>>>,
}

impl LedIndicator {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            off_timer: Mutex::new(None),
        }
    }

    /// Light up for `duration`, replacing any pending switch-off
    pub fn light_for(&self, duration: Duration) {
        let mut off_timer = self.off_timer.lock();
        if let Some(timer) = off_timer.take() {
            timer.abort();
        }

        Self::write_all(&self.paths, LED_ON);

        let paths = self.paths.clone();
        *off_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            Self::write_all(&paths, LED_OFF);
        }));
    }

    fn write_all(paths: &[PathBuf], value: &str) {
        for path in paths {
            if let Err(e) = Self::write_brightness(path, value) {
                warn!("{}", e);
            } else {
                debug!("LED {} <- {}", path.display(), value);
            }
        }
    }

    fn write_brightness(path: &Path, value: &str) -> Result<(), FeedbackError> {
        std::fs::write(path, value).map_err(|e| FeedbackError::LedWrite {
            path: path.display().to_string(),
            source: e,
        })
    }
}

impl Drop for LedIndicator {
    fn drop(&mut self) {
        if let Some(timer) = self.off_timer.lock().take() {
            timer.abort();
        }
    }
}
