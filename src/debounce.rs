//! Coalesces camera availability signals into open/close intents.
//!
//! The camera subsystem reports the popup camera as *unavailable* while a
//! client holds it, so an unavailable signal becomes an open intent and an
//! available signal becomes a close intent. Each signal is held back for the
//! debounce window; an opposite signal inside the window cancels it and is
//! itself dropped, so short blips produce no motion at all.

use crate::config::DebounceConfig;
use crate::motor::Direction;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

pub struct CameraActivityDebouncer {
    camera_id: String,
    window: Duration,
    pending_open_at: Option<Instant>,
    pending_close_at: Option<Instant>,
}

impl CameraActivityDebouncer {
    pub fn new(camera_id: impl Into<String>, window: Duration) -> Self {
        Self {
            camera_id: camera_id.into(),
            window,
            pending_open_at: None,
            pending_close_at: None,
        }
    }

    pub fn from_config(config: &DebounceConfig) -> Self {
        Self::new(config.front_camera_id.clone(), config.window())
    }

    /// The tracked camera was released by its client
    pub fn on_hardware_available(&mut self, camera_id: &str, now: Instant) {
        if camera_id != self.camera_id {
            trace!("Ignoring availability of camera {}", camera_id);
            return;
        }
        self.schedule(Direction::Close, now);
    }

    /// The tracked camera was taken by a client
    pub fn on_hardware_unavailable(&mut self, camera_id: &str, now: Instant) {
        if camera_id != self.camera_id {
            trace!("Ignoring unavailability of camera {}", camera_id);
            return;
        }
        self.schedule(Direction::Open, now);
    }

    fn schedule(&mut self, direction: Direction, now: Instant) {
        let opposite = match direction.opposite() {
            Direction::Open => &mut self.pending_open_at,
            Direction::Close => &mut self.pending_close_at,
        };

        if let Some(due) = *opposite {
            if now < due {
                *opposite = None;
                debug!(
                    "Camera {} blip: cancelled pending {} intent",
                    self.camera_id,
                    direction.opposite()
                );
                return;
            }
        }

        let own = match direction {
            Direction::Open => &mut self.pending_open_at,
            Direction::Close => &mut self.pending_close_at,
        };
        *own = Some(now + self.window);
    }

    /// Earliest time at which `poll` may emit an intent
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.pending_open_at, self.pending_close_at) {
            (Some(open), Some(close)) => Some(open.min(close)),
            (open, close) => open.or(close),
        }
    }

    /// Emit the intent whose window has elapsed, if any.
    ///
    /// When both are due (only possible if the caller fell far behind) the
    /// later-scheduled one wins and the other is discarded.
    pub fn poll(&mut self, now: Instant) -> Option<Direction> {
        let open_due = self.pending_open_at.filter(|due| *due <= now);
        let close_due = self.pending_close_at.filter(|due| *due <= now);

        let emitted = match (open_due, close_due) {
            (Some(open), Some(close)) => {
                if open >= close {
                    Some(Direction::Open)
                } else {
                    Some(Direction::Close)
                }
            }
            (Some(_), None) => Some(Direction::Open),
            (None, Some(_)) => Some(Direction::Close),
            (None, None) => None,
        };

        if open_due.is_some() {
            self.pending_open_at = None;
        }
        if close_due.is_some() {
            self.pending_close_at = None;
        }

        if let Some(direction) = emitted {
            debug!("Camera {} intent: {}", self.camera_id, direction);
        }
        emitted
    }

    pub fn is_pending(&self) -> bool {
        self.pending_open_at.is_some() || self.pending_close_at.is_some()
    }
}
