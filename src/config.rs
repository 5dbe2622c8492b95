use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PopupcamConfig {
    pub motor: MotorConfig,
    pub debounce: DebounceConfig,
    pub frequency: FrequencyConfig,
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub proximity: ProximityConfig,
    pub simulator: SimulatorConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MotorConfig {
    /// Time after issuing a command before another may be issued
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Period at which a queued request re-checks the busy flag
    #[serde(default = "default_retry_poll_ms")]
    pub retry_poll_ms: u64,

    /// Popup jams tolerated before calibration is required
    #[serde(default = "default_max_failures")]
    pub popup_max_failures: u32,

    /// Takeback jams tolerated before calibration is required
    #[serde(default = "default_max_failures")]
    pub takeback_max_failures: u32,

    /// Error dialogs stay suppressed for this long after boot
    #[serde(default = "default_boot_grace_ms")]
    pub boot_grace_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DebounceConfig {
    /// Window in which opposite availability signals cancel each other
    #[serde(default = "default_debounce_window_ms")]
    pub window_ms: u64,

    /// Identifier of the popup (front-facing) camera
    #[serde(default = "default_front_camera_id")]
    pub front_camera_id: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FrequencyConfig {
    /// Time budget in which `capacity` actuations count as frequent
    #[serde(default = "default_frequency_window_ms")]
    pub window_ms: u64,

    /// Number of actuations remembered
    #[serde(default = "default_frequency_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FeedbackConfig {
    /// LED brightness nodes lit while the motor moves
    #[serde(default = "default_led_paths")]
    pub led_paths: Vec<String>,

    /// How long the indicator stays lit per actuation
    #[serde(default = "default_light_duration_ms")]
    pub light_duration_ms: u64,

    /// Directory holding the popup sound sets
    #[serde(default = "default_sound_dir")]
    pub sound_dir: String,

    /// External command used to play a sound file
    #[serde(default = "default_sound_player")]
    pub sound_player: String,

    /// File holding the persisted LED/sound preferences
    #[serde(default = "default_preferences_path")]
    pub preferences_path: String,

    /// Answer calibration prompts with "calibrate now" when no UI is attached
    #[serde(default = "default_auto_calibrate")]
    pub auto_calibrate: bool,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct ProximityConfig {
    /// Input device reporting ABS_DISTANCE (requires `proximity_input`)
    pub device: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SimulatorConfig {
    /// Simulated motor travel time between command and status notification
    #[serde(default = "default_travel_ms")]
    pub travel_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl MotorConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn retry_poll(&self) -> Duration {
        Duration::from_millis(self.retry_poll_ms)
    }

    pub fn boot_grace(&self) -> Duration {
        Duration::from_millis(self.boot_grace_ms)
    }
}

impl DebounceConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl FrequencyConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl FeedbackConfig {
    pub fn light_duration(&self) -> Duration {
        Duration::from_millis(self.light_duration_ms)
    }
}

impl PopupcamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("popupcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("motor.settle_delay_ms", default_settle_delay_ms())?
            .set_default("motor.retry_poll_ms", default_retry_poll_ms())?
            .set_default("motor.popup_max_failures", default_max_failures())?
            .set_default("motor.takeback_max_failures", default_max_failures())?
            .set_default("motor.boot_grace_ms", default_boot_grace_ms())?
            .set_default("debounce.window_ms", default_debounce_window_ms())?
            .set_default("debounce.front_camera_id", default_front_camera_id())?
            .set_default("frequency.window_ms", default_frequency_window_ms())?
            .set_default(
                "frequency.capacity",
                default_frequency_capacity() as i64,
            )?
            .set_default("feedback.led_paths", default_led_paths())?
            .set_default("feedback.light_duration_ms", default_light_duration_ms())?
            .set_default("feedback.sound_dir", default_sound_dir())?
            .set_default("feedback.sound_player", default_sound_player())?
            .set_default("feedback.preferences_path", default_preferences_path())?
            .set_default("feedback.auto_calibrate", default_auto_calibrate())?
            .set_default("simulator.travel_ms", default_travel_ms())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with POPUPCAM_ prefix
            .add_source(Environment::with_prefix("POPUPCAM").separator("__"))
            .build()?;

        let config: PopupcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.motor.settle_delay_ms == 0 {
            return Err(ConfigError::Message(
                "Motor settle_delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.motor.retry_poll_ms == 0 {
            return Err(ConfigError::Message(
                "Motor retry_poll_ms must be greater than 0".to_string(),
            ));
        }

        if self.motor.popup_max_failures == 0 || self.motor.takeback_max_failures == 0 {
            return Err(ConfigError::Message(
                "Motor failure caps must be greater than 0".to_string(),
            ));
        }

        if self.debounce.window_ms == 0 {
            return Err(ConfigError::Message(
                "Debounce window_ms must be greater than 0".to_string(),
            ));
        }

        if self.debounce.front_camera_id.is_empty() {
            return Err(ConfigError::Message(
                "Debounce front_camera_id must not be empty".to_string(),
            ));
        }

        if self.frequency.capacity == 0 {
            return Err(ConfigError::Message(
                "Frequency capacity must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for PopupcamConfig {
    fn default() -> Self {
        Self {
            motor: MotorConfig {
                settle_delay_ms: default_settle_delay_ms(),
                retry_poll_ms: default_retry_poll_ms(),
                popup_max_failures: default_max_failures(),
                takeback_max_failures: default_max_failures(),
                boot_grace_ms: default_boot_grace_ms(),
            },
            debounce: DebounceConfig {
                window_ms: default_debounce_window_ms(),
                front_camera_id: default_front_camera_id(),
            },
            frequency: FrequencyConfig {
                window_ms: default_frequency_window_ms(),
                capacity: default_frequency_capacity(),
            },
            feedback: FeedbackConfig {
                led_paths: default_led_paths(),
                light_duration_ms: default_light_duration_ms(),
                sound_dir: default_sound_dir(),
                sound_player: default_sound_player(),
                preferences_path: default_preferences_path(),
                auto_calibrate: default_auto_calibrate(),
            },
            proximity: ProximityConfig::default(),
            simulator: SimulatorConfig {
                travel_ms: default_travel_ms(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_settle_delay_ms() -> u64 {
    1200
}
fn default_retry_poll_ms() -> u64 {
    100
}
fn default_max_failures() -> u32 {
    3
}
fn default_boot_grace_ms() -> u64 {
    1200
}

fn default_debounce_window_ms() -> u64 {
    100
}
fn default_front_camera_id() -> String {
    "1".to_string()
}

fn default_frequency_window_ms() -> u64 {
    20_000
}
fn default_frequency_capacity() -> usize {
    10
}

fn default_led_paths() -> Vec<String> {
    vec![
        "/sys/class/leds/green/brightness".to_string(),
        "/sys/class/leds/blue/brightness".to_string(),
    ]
}
fn default_light_duration_ms() -> u64 {
    1200
}
fn default_sound_dir() -> String {
    "/system/media/audio/ui".to_string()
}
fn default_sound_player() -> String {
    "aplay".to_string()
}
fn default_preferences_path() -> String {
    "popupcam-preferences.toml".to_string()
}
fn default_auto_calibrate() -> bool {
    false
}

fn default_travel_ms() -> u64 {
    600
}

fn default_event_bus_capacity() -> usize {
    100
}
