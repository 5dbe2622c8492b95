use super::*;
use crate::config::PopupcamConfig;
use crate::error::{FeedbackError, PopupcamError};
use crate::events::{EventBus, EventFilter, EventReceiver, PopupcamEvent};
use crate::motor::Direction;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_preferences_default_when_missing() {
    let dir = TempDir::new().unwrap();
    let store = PreferenceStore::load(dir.path().join("prefs.toml"));

    let prefs = store.current();
    assert!(prefs.led_enabled);
    assert_eq!(prefs.sound_effect, 0);
}

#[test]
fn test_preferences_round_trip_through_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("prefs.toml");

    let store = PreferenceStore::load(&path);
    store
        .update(FeedbackPreferences {
            led_enabled: false,
            sound_effect: SOUND_DISABLED,
        })
        .unwrap();

    let reloaded = PreferenceStore::load(&path);
    assert!(!reloaded.current().led_enabled);
    assert_eq!(reloaded.current().sound_effect, SOUND_DISABLED);
}

#[test]
fn test_corrupt_preferences_fall_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("prefs.toml");
    std::fs::write(&path, "led_enabled = \"maybe\"").unwrap();

    let store = PreferenceStore::load(&path);
    assert_eq!(store.current(), FeedbackPreferences::default());
}

#[test]
fn test_corrupt_preferences_report_feedback_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("prefs.toml");
    std::fs::write(&path, "sound_effect = [").unwrap();

    let error = PreferenceStore::read_file(&path).unwrap_err();
    match &error {
        FeedbackError::Preferences { path: reported, .. } => {
            assert!(reported.ends_with("prefs.toml"))
        }
        other => panic!("Unexpected error: {}", other),
    }

    let error = PopupcamError::from(error);
    assert!(matches!(error, PopupcamError::Feedback(_)));
}

#[test]
fn test_sound_file_selection() {
    let sound = SoundEffects::new("/sounds", "aplay");

    assert_eq!(
        sound.sound_file(0, Direction::Open),
        Some(std::path::PathBuf::from("/sounds/popup_muqin_up.ogg"))
    );
    assert_eq!(
        sound.sound_file(2, Direction::Close),
        Some(std::path::PathBuf::from("/sounds/popup_mofa_down.ogg"))
    );
    assert_eq!(sound.sound_file(SOUND_DISABLED, Direction::Open), None);
    assert_eq!(sound.sound_file(SOUND_SETS.len() as i32, Direction::Open), None);
}

#[tokio::test(start_paused = true)]
async fn test_led_lights_then_turns_off() {
    let dir = TempDir::new().unwrap();
    let green = dir.path().join("green");
    let blue = dir.path().join("blue");
    let led = LedIndicator::new([green.clone(), blue.clone()]);

    led.light_for(Duration::from_millis(1200));
    assert_eq!(std::fs::read_to_string(&green).unwrap(), "255");
    assert_eq!(std::fs::read_to_string(&blue).unwrap(), "255");

    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert_eq!(std::fs::read_to_string(&green).unwrap(), "0");
    assert_eq!(std::fs::read_to_string(&blue).unwrap(), "0");
}

#[tokio::test(start_paused = true)]
async fn test_led_relight_extends_on_time() {
    let dir = TempDir::new().unwrap();
    let green = dir.path().join("green");
    let led = LedIndicator::new([green.clone()]);

    led.light_for(Duration::from_millis(1000));
    tokio::time::sleep(Duration::from_millis(800)).await;
    led.light_for(Duration::from_millis(1000));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(std::fs::read_to_string(&green).unwrap(), "255");

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(std::fs::read_to_string(&green).unwrap(), "0");
}

fn daemon_feedback(dir: &TempDir, auto_calibrate: bool, led_enabled: bool) -> (DaemonFeedback, Arc<EventBus>) {
    let mut config = PopupcamConfig::default().feedback;
    config.led_paths = vec![dir.path().join("led").display().to_string()];
    config.auto_calibrate = auto_calibrate;

    let preferences = Arc::new(PreferenceStore::load(dir.path().join("prefs.toml")));
    preferences
        .update(FeedbackPreferences {
            led_enabled,
            sound_effect: SOUND_DISABLED,
        })
        .unwrap();

    let event_bus = Arc::new(EventBus::new(16));
    (
        DaemonFeedback::new(&config, preferences, Arc::clone(&event_bus)),
        event_bus,
    )
}

#[tokio::test]
async fn test_daemon_feedback_respects_led_preference() {
    let dir = TempDir::new().unwrap();
    let (feedback, _) = daemon_feedback(&dir, false, false);

    feedback.light_indicator(Duration::from_millis(100));
    assert!(!dir.path().join("led").exists());
}

#[tokio::test]
async fn test_daemon_feedback_jam_policy() {
    let dir = TempDir::new().unwrap();

    let (manual, event_bus) = daemon_feedback(&dir, false, true);
    let mut receiver = EventReceiver::new(
        event_bus.subscribe(),
        EventFilter::EventTypes(vec!["dialog_shown"]),
        "test".to_string(),
    );
    assert_eq!(manual.show_jam_error(true, false).await, UserChoice::Cancel);
    assert_eq!(manual.show_jam_error(false, true).await, UserChoice::Ack);
    match receiver.recv().await.unwrap() {
        PopupcamEvent::DialogShown { kind, .. } => assert_eq!(kind, "jam"),
        other => panic!("Unexpected event: {:?}", other),
    }

    let (automatic, _) = daemon_feedback(&dir, true, true);
    assert_eq!(
        automatic.show_jam_error(true, true).await,
        UserChoice::CalibrateNow
    );
}

#[tokio::test]
async fn test_recording_feedback_holds_dialogs_until_released() {
    let feedback = Arc::new(RecordingFeedback::new());
    feedback.hold_dialogs(true);

    let sink = Arc::clone(&feedback);
    let dialog = tokio::spawn(async move { sink.show_frequency_warning().await });

    tokio::task::yield_now().await;
    assert!(!dialog.is_finished());

    feedback.release_dialog();
    assert_eq!(dialog.await.unwrap(), UserChoice::Ack);
    assert_eq!(feedback.calls(), vec![FeedbackCall::FrequencyWarning]);
}
