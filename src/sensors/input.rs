use super::guard::SensorGuard;
use super::proximity::{ProximityCapability, ProximityReading, ReadingCallback};
use crate::error::SensorError;
use crate::events::{EventBus, PopupcamEvent};
use evdev::{AbsoluteAxisType, Device, InputEventKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Proximity sensor exposed as an input device reporting `ABS_DISTANCE`
pub struct EvdevProximity {
    pub(crate) device_path: String,
    max_range: f32,
    event_bus: Option<Arc<EventBus>>,
}

impl EvdevProximity {
    /// Open the device once to validate it and read the axis maximum
    pub fn open(device_path: &str) -> Result<Self, SensorError> {
        let device = Self::open_device(device_path)?;
        Self::validate_proximity_device(&device, device_path)?;

        let abs_state = device
            .get_abs_state()
            .map_err(|e| SensorError::DeviceOpen {
                device: device_path.to_string(),
                details: e.to_string(),
            })?;
        let max_range = abs_state[AbsoluteAxisType::ABS_DISTANCE.0 as usize].maximum as f32;

        info!(
            "Proximity device opened: {} ({}), max range {}",
            device_path,
            device.name().unwrap_or("Unknown"),
            max_range
        );

        Ok(Self {
            device_path: device_path.to_string(),
            max_range,
            event_bus: None,
        })
    }

    /// Publish a `SystemError` when the reader gives up on the device
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    fn open_device(device_path: &str) -> Result<Device, SensorError> {
        Device::open(device_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SensorError::NotPresent(device_path.to_string()),
            _ => SensorError::DeviceOpen {
                device: device_path.to_string(),
                details: e.to_string(),
            },
        })
    }

    pub(crate) fn validate_proximity_device(
        device: &Device,
        device_path: &str,
    ) -> Result<(), SensorError> {
        let has_distance = device
            .supported_absolute_axes()
            .map(|axes| axes.contains(AbsoluteAxisType::ABS_DISTANCE))
            .unwrap_or(false);

        if !has_distance {
            return Err(SensorError::UnsupportedDevice(device_path.to_string()));
        }
        Ok(())
    }

    /// Distance carried by an input event, if it is a distance event
    pub(crate) fn distance_of(event: &evdev::InputEvent) -> Option<f32> {
        match event.kind() {
            InputEventKind::AbsAxis(AbsoluteAxisType::ABS_DISTANCE) => Some(event.value() as f32),
            _ => None,
        }
    }

    pub(crate) fn report_reader_failure(
        event_bus: Option<&EventBus>,
        device_path: &str,
        details: &str,
    ) {
        let Some(event_bus) = event_bus else {
            return;
        };
        let _ = event_bus.publish(PopupcamEvent::SystemError {
            component: "proximity_input".to_string(),
            error: format!("{} stopped: {}", device_path, details),
        });
    }
}

impl ProximityCapability for EvdevProximity {
    fn name(&self) -> &str {
        &self.device_path
    }

    fn max_range(&self) -> f32 {
        self.max_range
    }

    fn register(&self, callback: ReadingCallback) -> Result<SensorGuard, SensorError> {
        let mut device = Self::open_device(&self.device_path)?;
        let guard = SensorGuard::new(self.device_path.clone());
        let token = guard.token();
        let device_path = self.device_path.clone();
        let event_bus = self.event_bus.clone();

        // fetch_events blocks, so the reader gets its own thread; a release is
        // noticed on the next event
        std::thread::spawn(move || {
            let mut consecutive_errors = 0;
            const MAX_CONSECUTIVE_ERRORS: u32 = 5;

            while !token.is_cancelled() {
                match device.fetch_events() {
                    Ok(events) => {
                        consecutive_errors = 0;
                        for event in events {
                            if token.is_cancelled() {
                                break;
                            }
                            if let Some(distance) = Self::distance_of(&event) {
                                debug!("Proximity distance {} from {}", distance, device_path);
                                callback(ProximityReading {
                                    distance,
                                    timestamp: Instant::now(),
                                });
                            }
                        }
                    }
                    Err(e) => {
                        consecutive_errors += 1;
                        if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                            error!(
                                "Too many consecutive errors reading {}: {}",
                                device_path, e
                            );
                            Self::report_reader_failure(
                                event_bus.as_deref(),
                                &device_path,
                                &e.to_string(),
                            );
                            break;
                        }
                        warn!(
                            "Error reading proximity device (attempt {}): {}",
                            consecutive_errors, e
                        );
                        std::thread::sleep(Duration::from_millis(100));
                    }
                }
            }
            debug!("Proximity reader for {} exited", device_path);
        });

        Ok(guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evdev::{EventType, InputEvent, Key};

    #[test]
    fn test_distance_of() {
        let near = InputEvent::new(EventType::ABSOLUTE, AbsoluteAxisType::ABS_DISTANCE.0, 0);
        assert_eq!(EvdevProximity::distance_of(&near), Some(0.0));

        let x_axis = InputEvent::new(EventType::ABSOLUTE, AbsoluteAxisType::ABS_X.0, 10);
        assert_eq!(EvdevProximity::distance_of(&x_axis), None);

        let key = InputEvent::new(EventType::KEY, Key::KEY_POWER.code(), 1);
        assert_eq!(EvdevProximity::distance_of(&key), None);
    }

    #[test]
    fn test_reader_failure_is_published() {
        let event_bus = EventBus::new(4);
        let mut events = event_bus.subscribe();

        EvdevProximity::report_reader_failure(
            Some(&event_bus),
            "/dev/input/event3",
            "No such device",
        );

        match events.try_recv().unwrap() {
            PopupcamEvent::SystemError { component, error } => {
                assert_eq!(component, "proximity_input");
                assert!(error.contains("/dev/input/event3"));
                assert!(error.contains("No such device"));
            }
            other => panic!("Unexpected event: {:?}", other),
        }

        // without a bus the failure is only logged
        EvdevProximity::report_reader_failure(None, "/dev/input/event3", "gone");
    }

    #[test]
    fn test_open_missing_device() {
        match EvdevProximity::open("/dev/input/does-not-exist") {
            Err(SensorError::NotPresent(path)) => assert!(path.ends_with("does-not-exist")),
            Err(other) => panic!("Unexpected error: {}", other),
            Ok(_) => panic!("Missing device opened"),
        }
    }
}
