use crate::motor::Direction;
use async_trait::async_trait;
use std::time::Duration;

/// Answer returned when a dialog is dismissed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserChoice {
    CalibrateNow,
    Cancel,
    Ack,
}

/// What the calibration notice reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationResult {
    /// A command arrived while calibration was still running
    InProgress,
    Succeeded,
    Failed,
}

/// Dialog categories sharing the single-dialog slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    Calibration(CalibrationResult),
    Jam {
        needs_calibration: bool,
        was_closing: bool,
    },
    FrequencyWarning,
}

impl DialogKind {
    pub fn name(&self) -> &'static str {
        match self {
            DialogKind::Calibration(_) => "calibration",
            DialogKind::Jam { .. } => "jam",
            DialogKind::FrequencyWarning => "frequency_warning",
        }
    }
}

/// User-visible side effects requested by the motor controller.
///
/// The quick effects are fire-and-forget. Dialog methods resolve when the
/// user dismisses them; the controller runs them off its own task.
#[async_trait]
pub trait FeedbackSink: Send + Sync {
    fn light_indicator(&self, duration: Duration);

    fn play_feedback(&self, direction: Direction);

    async fn show_calibration_result(&self, result: CalibrationResult) -> UserChoice;

    /// Offers `CalibrateNow`/`Cancel` when calibration is needed, `Ack` otherwise
    async fn show_jam_error(&self, needs_calibration: bool, was_closing: bool) -> UserChoice;

    async fn show_frequency_warning(&self) -> UserChoice;

    fn show_obstruction_notice(&self);

    fn dismiss_obstruction_notice(&self);

    fn go_home(&self);
}

/// Route a dialog request to the matching sink method
pub async fn present_dialog(sink: &dyn FeedbackSink, kind: DialogKind) -> UserChoice {
    match kind {
        DialogKind::Calibration(result) => sink.show_calibration_result(result).await,
        DialogKind::Jam {
            needs_calibration,
            was_closing,
        } => sink.show_jam_error(needs_calibration, was_closing).await,
        DialogKind::FrequencyWarning => sink.show_frequency_warning().await,
    }
}
