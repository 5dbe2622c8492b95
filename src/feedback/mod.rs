mod daemon;
mod led;
mod mock;
mod preferences;
mod sink;
mod sound;
#[cfg(test)]
mod tests;

pub use daemon::DaemonFeedback;
pub use led::LedIndicator;
pub use mock::{FeedbackCall, RecordingFeedback};
pub use preferences::{FeedbackPreferences, PreferenceStore, SOUND_DISABLED};
pub use sink::{present_dialog, CalibrationResult, DialogKind, FeedbackSink, UserChoice};
pub use sound::{SoundEffects, SOUND_SETS};
