use super::{ComponentState, PopupcamOrchestrator};
use crate::error::{PopupcamError, Result};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

const MOTOR_STOP_TIMEOUT: Duration = Duration::from_secs(5);

impl PopupcamOrchestrator {
    /// Perform graceful shutdown of all components
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        let mut exit_code = 0;

        // Stop components in reverse dependency order
        if self.keyboard_enabled {
            if let Err(e) = self.stop_component("keyboard").await {
                error!("Error stopping keyboard: {}", e);
                exit_code = 1;
            }
        }

        // The motor retracts the camera on its way out
        if let Err(e) = self.stop_component("motor").await {
            error!("Error stopping motor: {}", e);
            exit_code = 1;
        }

        self.cancellation_token.cancel();

        if let Err(e) = self.stop_component("events").await {
            error!("Error stopping events: {}", e);
            exit_code = 1;
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    /// Stop a specific component
    async fn stop_component(&mut self, component: &str) -> Result<()> {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        let result = match component {
            "motor" => self.stop_motor().await,
            "keyboard" => match &self.keyboard_handler {
                Some(handler) => handler.stop().await,
                None => Ok(()),
            },
            "events" => {
                if let Some(logger) = self.event_logger.take() {
                    let _ = timeout(Duration::from_secs(1), logger).await;
                }
                Ok(())
            }
            _ => Err(PopupcamError::component(component, "Unknown component")),
        };

        match &result {
            Ok(()) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
            }
            Err(e) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("Error stopping {} component: {}", component, e);
            }
        }
        result
    }

    async fn stop_motor(&mut self) -> Result<()> {
        let Some(task) = self.motor_task.take() else {
            return Ok(());
        };
        let handle = self
            .motor_handle
            .clone()
            .ok_or_else(|| PopupcamError::component("motor", "Motor handle missing"))?;

        match timeout(MOTOR_STOP_TIMEOUT, handle.shutdown()).await {
            Ok(result) => result?,
            Err(_) => {
                task.abort();
                return Err(PopupcamError::system("motor component stop timeout"));
            }
        }

        task.await.map_err(|e| PopupcamError::component("motor", e.to_string()))
    }
}
