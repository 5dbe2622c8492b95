use super::sink::{CalibrationResult, FeedbackSink, UserChoice};
use crate::motor::Direction;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

/// One call made against the sink
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackCall {
    Light(Duration),
    Sound(Direction),
    CalibrationResult(CalibrationResult),
    JamError {
        needs_calibration: bool,
        was_closing: bool,
    },
    FrequencyWarning,
    ObstructionShown,
    ObstructionDismissed,
    Home,
}

/// Feedback sink that records every request, for tests and dry runs.
///
/// Dialogs resolve immediately unless holding is enabled, in which case each
/// stays open until `release_dialog` is called.
pub struct RecordingFeedback {
    calls: Mutex<Vec<FeedbackCall>>,
    jam_choice: Mutex<UserChoice>,
    hold_dialogs: AtomicBool,
    releases: Semaphore,
}

impl RecordingFeedback {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            jam_choice: Mutex::new(UserChoice::Cancel),
            hold_dialogs: AtomicBool::new(false),
            releases: Semaphore::new(0),
        }
    }

    /// Answer given to jam dialogs that offer calibration
    pub fn set_jam_choice(&self, choice: UserChoice) {
        *self.jam_choice.lock() = choice;
    }

    pub fn hold_dialogs(&self, hold: bool) {
        self.hold_dialogs.store(hold, Ordering::SeqCst);
    }

    pub fn release_dialog(&self) {
        self.releases.add_permits(1);
    }

    pub fn calls(&self) -> Vec<FeedbackCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&FeedbackCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: FeedbackCall) {
        self.calls.lock().push(call);
    }

    async fn wait_for_dismissal(&self) {
        if !self.hold_dialogs.load(Ordering::SeqCst) {
            return;
        }
        if let Ok(permit) = self.releases.acquire().await {
            permit.forget();
        }
    }
}

impl Default for RecordingFeedback {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedbackSink for RecordingFeedback {
    fn light_indicator(&self, duration: Duration) {
        self.record(FeedbackCall::Light(duration));
    }

    fn play_feedback(&self, direction: Direction) {
        self.record(FeedbackCall::Sound(direction));
    }

    async fn show_calibration_result(&self, result: CalibrationResult) -> UserChoice {
        self.record(FeedbackCall::CalibrationResult(result));
        self.wait_for_dismissal().await;
        UserChoice::Ack
    }

    async fn show_jam_error(&self, needs_calibration: bool, was_closing: bool) -> UserChoice {
        self.record(FeedbackCall::JamError {
            needs_calibration,
            was_closing,
        });
        self.wait_for_dismissal().await;
        if needs_calibration {
            *self.jam_choice.lock()
        } else {
            UserChoice::Ack
        }
    }

    async fn show_frequency_warning(&self) -> UserChoice {
        self.record(FeedbackCall::FrequencyWarning);
        self.wait_for_dismissal().await;
        UserChoice::Ack
    }

    fn show_obstruction_notice(&self) {
        self.record(FeedbackCall::ObstructionShown);
    }

    fn dismiss_obstruction_notice(&self) {
        self.record(FeedbackCall::ObstructionDismissed);
    }

    fn go_home(&self) {
        self.record(FeedbackCall::Home);
    }
}
