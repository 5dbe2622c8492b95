use crate::error::Result;
use crate::events::{EventBus, PopupcamEvent};
use crate::feedback::{FeedbackPreferences, PreferenceStore, SOUND_DISABLED, SOUND_SETS};
use crate::motor::{Direction, MotorHandle, MotorStatus, SimulatedMotor};
use crate::sensors::{SimulatedFreeFall, SimulatedProximity};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Simulated hardware event triggered from the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    CameraOpened,
    CameraClosed,
    ScreenOff,
    ScreenOn,
    FreeFall,
    Pressed,
    JamNextPopup,
    JamNextTakeback,
    ToggleProximity,
    Calibrate,
    ToggleLed,
    NextSound,
    Quit,
}

impl KeyCommand {
    pub fn from_key(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::Char('o') => Some(KeyCommand::CameraOpened),
            KeyCode::Char('c') => Some(KeyCommand::CameraClosed),
            KeyCode::Char('s') => Some(KeyCommand::ScreenOff),
            KeyCode::Char('w') => Some(KeyCommand::ScreenOn),
            KeyCode::Char('f') => Some(KeyCommand::FreeFall),
            KeyCode::Char('p') => Some(KeyCommand::Pressed),
            KeyCode::Char('j') => Some(KeyCommand::JamNextPopup),
            KeyCode::Char('k') => Some(KeyCommand::JamNextTakeback),
            KeyCode::Char('n') => Some(KeyCommand::ToggleProximity),
            KeyCode::Char('x') => Some(KeyCommand::Calibrate),
            KeyCode::Char('l') => Some(KeyCommand::ToggleLed),
            KeyCode::Char('m') => Some(KeyCommand::NextSound),
            KeyCode::Char('q') | KeyCode::Esc => Some(KeyCommand::Quit),
            _ => None,
        }
    }
}

/// Everything the keyboard can poke at
#[derive(Clone)]
pub struct SimulationControls {
    pub motor_handle: MotorHandle,
    pub motor: Arc<SimulatedMotor>,
    pub proximity: Option<Arc<SimulatedProximity>>,
    pub free_fall: Arc<SimulatedFreeFall>,
    pub preferences: Arc<PreferenceStore>,
    pub event_bus: Arc<EventBus>,
    pub camera_id: String,
}

/// Keyboard driven hardware simulation for debugging
pub struct KeyboardInputHandler {
    controls: SimulationControls,
    proximity_near: Arc<AtomicBool>,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(controls: SimulationControls) -> Self {
        Self {
            controls,
            proximity_near: Arc::new(AtomicBool::new(false)),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!(
            "Keyboard simulation active: o/c camera open/close, s/w screen off/on, f free-fall, \
             p press, j/k jam popup/takeback, n proximity, x calibrate, l LED, m sound, q quit"
        );

        let controls = self.controls.clone();
        let proximity_near = Arc::clone(&self.proximity_near);
        let cancellation_token = self.cancellation_token.clone();

        // Spawn a blocking task to handle keyboard input
        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Keyboard input handler stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        if let Ok(Event::Key(key_event)) = event::read() {
                            if key_event.kind != KeyEventKind::Press {
                                continue;
                            }
                            match KeyCommand::from_key(key_event.code) {
                                Some(command) => {
                                    apply(&controls, &proximity_near, command);
                                    if command == KeyCommand::Quit {
                                        break;
                                    }
                                }
                                None => debug!("Key pressed: {:?}", key_event.code),
                            }
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard input handler task exited");
        });

        Ok(())
    }

    /// Run one command as if its key had been pressed
    pub fn trigger(&self, command: KeyCommand) {
        apply(&self.controls, &self.proximity_near, command);
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Give the task a moment to clean up and disable raw mode
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}

fn apply(controls: &SimulationControls, proximity_near: &AtomicBool, command: KeyCommand) {
    info!("Keyboard: {:?}", command);

    let sent = match command {
        KeyCommand::CameraOpened => controls.motor_handle.camera_unavailable(&*controls.camera_id),
        KeyCommand::CameraClosed => controls.motor_handle.camera_available(&*controls.camera_id),
        KeyCommand::ScreenOff => controls.motor_handle.screen_state(false),
        KeyCommand::ScreenOn => controls.motor_handle.screen_state(true),
        KeyCommand::Calibrate => controls.motor_handle.calibrate(),
        KeyCommand::FreeFall => {
            if !controls.free_fall.trigger() {
                info!("Free-fall sensor not armed");
            }
            Ok(())
        }
        KeyCommand::Pressed => {
            controls.motor.notify(MotorStatus::Pressed);
            Ok(())
        }
        KeyCommand::JamNextPopup => {
            controls.motor.jam_next(Direction::Open, 1);
            Ok(())
        }
        KeyCommand::JamNextTakeback => {
            controls.motor.jam_next(Direction::Close, 1);
            Ok(())
        }
        KeyCommand::ToggleProximity => {
            match &controls.proximity {
                Some(proximity) => {
                    let near = !proximity_near.load(Ordering::SeqCst);
                    proximity_near.store(near, Ordering::SeqCst);
                    if !proximity.set_near(near) {
                        info!("Proximity sensor not registered");
                    }
                }
                None => info!("Proximity comes from a real sensor"),
            }
            Ok(())
        }
        KeyCommand::ToggleLed => {
            let current = controls.preferences.current();
            update_preferences(
                controls,
                FeedbackPreferences {
                    led_enabled: !current.led_enabled,
                    ..current
                },
            );
            Ok(())
        }
        KeyCommand::NextSound => {
            let current = controls.preferences.current();
            update_preferences(
                controls,
                FeedbackPreferences {
                    sound_effect: next_sound(current.sound_effect),
                    ..current
                },
            );
            Ok(())
        }
        KeyCommand::Quit => {
            let _ = controls.event_bus.publish(PopupcamEvent::ShutdownRequested {
                timestamp: SystemTime::now(),
                reason: "User requested via keyboard".to_string(),
            });
            Ok(())
        }
    };

    if let Err(e) = sent {
        warn!("Failed to deliver {:?}: {}", command, e);
    }
}

fn update_preferences(controls: &SimulationControls, prefs: FeedbackPreferences) {
    if let Err(e) = controls.preferences.update(prefs) {
        warn!("Failed to save preferences: {}", e);
    }
}

/// Cycle through the sound sets, then silence
fn next_sound(current: i32) -> i32 {
    let next = current + 1;
    if next >= SOUND_SETS.len() as i32 {
        SOUND_DISABLED
    } else {
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PopupcamConfig;
    use crate::feedback::RecordingFeedback;
    use crate::motor::{MotorActor, MotorCall, SimulatedConnector};
    use tempfile::TempDir;

    fn controls(dir: &TempDir) -> SimulationControls {
        let motor = Arc::new(SimulatedMotor::new(Duration::ZERO));
        let (actor, motor_handle) = MotorActor::builder(PopupcamConfig::default())
            .with_connector(Arc::new(SimulatedConnector::new(Arc::clone(&motor))))
            .with_feedback(Arc::new(RecordingFeedback::new()))
            .build()
            .unwrap();
        tokio::spawn(actor.run());

        SimulationControls {
            motor_handle,
            motor,
            proximity: Some(Arc::new(SimulatedProximity::new(5.0))),
            free_fall: Arc::new(SimulatedFreeFall::new()),
            preferences: Arc::new(PreferenceStore::load(dir.path().join("prefs.toml"))),
            event_bus: Arc::new(EventBus::new(16)),
            camera_id: "1".to_string(),
        }
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(
            KeyCommand::from_key(KeyCode::Char('o')),
            Some(KeyCommand::CameraOpened)
        );
        assert_eq!(KeyCommand::from_key(KeyCode::Esc), Some(KeyCommand::Quit));
        assert_eq!(KeyCommand::from_key(KeyCode::Char('z')), None);
    }

    #[test]
    fn test_sound_cycle_ends_in_silence() {
        assert_eq!(next_sound(0), 1);
        assert_eq!(next_sound(SOUND_SETS.len() as i32 - 1), SOUND_DISABLED);
        assert_eq!(next_sound(SOUND_DISABLED), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_key_opens_camera() {
        let dir = TempDir::new().unwrap();
        let handler = KeyboardInputHandler::new(controls(&dir));
        let motor = Arc::clone(&handler.controls.motor);

        handler.trigger(KeyCommand::CameraOpened);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(motor.commands(), vec![MotorCall::Popup]);
    }

    #[tokio::test]
    async fn test_preference_keys_persist() {
        let dir = TempDir::new().unwrap();
        let handler = KeyboardInputHandler::new(controls(&dir));

        handler.trigger(KeyCommand::ToggleLed);
        handler.trigger(KeyCommand::NextSound);

        let reloaded = PreferenceStore::load(dir.path().join("prefs.toml"));
        assert!(!reloaded.current().led_enabled);
        assert_eq!(reloaded.current().sound_effect, 1);
    }

    #[tokio::test]
    async fn test_quit_requests_shutdown() {
        let dir = TempDir::new().unwrap();
        let handler = KeyboardInputHandler::new(controls(&dir));
        let mut events = handler.controls.event_bus.subscribe();

        handler.trigger(KeyCommand::Quit);

        match events.try_recv().unwrap() {
            PopupcamEvent::ShutdownRequested { .. } => {}
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_keyboard_handler_stop() {
        let dir = TempDir::new().unwrap();
        let handler = KeyboardInputHandler::new(controls(&dir));

        handler.stop().await.unwrap();
        assert!(handler.cancellation_token.is_cancelled());
    }
}
