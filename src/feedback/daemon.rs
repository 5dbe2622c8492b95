use super::led::LedIndicator;
use super::preferences::PreferenceStore;
use super::sink::{CalibrationResult, FeedbackSink, UserChoice};
use super::sound::SoundEffects;
use crate::config::FeedbackConfig;
use crate::events::{EventBus, PopupcamEvent};
use crate::motor::Direction;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

/// The frequency warning cannot be dismissed before this elapses
const FREQUENCY_WARNING_LOCKOUT: Duration = Duration::from_secs(5);

/// Feedback for the headless daemon.
///
/// Lights and sounds go to hardware, gated by the stored preferences.
/// Dialogs are logged and published on the event bus and answered by policy.
pub struct DaemonFeedback {
    led: LedIndicator,
    sound: SoundEffects,
    preferences: Arc<PreferenceStore>,
    event_bus: Arc<EventBus>,
    auto_calibrate: bool,
}

impl DaemonFeedback {
    pub fn new(
        config: &FeedbackConfig,
        preferences: Arc<PreferenceStore>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            led: LedIndicator::new(config.led_paths.iter().cloned()),
            sound: SoundEffects::new(config.sound_dir.clone(), config.sound_player.clone()),
            preferences,
            event_bus,
            auto_calibrate: config.auto_calibrate,
        }
    }

    fn announce(&self, kind: &str) {
        let _ = self.event_bus.publish(PopupcamEvent::DialogShown {
            kind: kind.to_string(),
            timestamp: SystemTime::now(),
        });
    }
}

#[async_trait]
impl FeedbackSink for DaemonFeedback {
    fn light_indicator(&self, duration: Duration) {
        if self.preferences.current().led_enabled {
            self.led.light_for(duration);
        }
    }

    fn play_feedback(&self, direction: Direction) {
        self.sound
            .play(self.preferences.current().sound_effect, direction);
    }

    async fn show_calibration_result(&self, result: CalibrationResult) -> UserChoice {
        match result {
            CalibrationResult::InProgress => info!("Calibration in progress, please wait"),
            CalibrationResult::Succeeded => info!("Calibration succeeded"),
            CalibrationResult::Failed => warn!("Calibration failed"),
        }
        self.announce("calibration");
        UserChoice::Ack
    }

    async fn show_jam_error(&self, needs_calibration: bool, was_closing: bool) -> UserChoice {
        let motion = if was_closing { "retract" } else { "pop up" };
        self.announce("jam");

        if !needs_calibration {
            warn!("Front camera failed to {}", motion);
            return UserChoice::Ack;
        }

        warn!(
            "Front camera failed to {} several times, calibration recommended",
            motion
        );
        if self.auto_calibrate {
            info!("Auto-calibrate enabled, calibrating now");
            UserChoice::CalibrateNow
        } else {
            UserChoice::Cancel
        }
    }

    async fn show_frequency_warning(&self) -> UserChoice {
        warn!("Popup camera is being operated too frequently");
        self.announce("frequency_warning");
        tokio::time::sleep(FREQUENCY_WARNING_LOCKOUT).await;
        UserChoice::Ack
    }

    fn show_obstruction_notice(&self) {
        info!("Camera obstructed, keep the top of the device clear");
    }

    fn dismiss_obstruction_notice(&self) {
        info!("Camera obstruction cleared");
    }

    fn go_home(&self) {
        let _ = self.event_bus.publish(PopupcamEvent::HomeRequested {
            timestamp: SystemTime::now(),
        });
    }
}
