use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Active sensor registration.
///
/// Capabilities hand one out from `register`/`arm` and watch its token;
/// dropping the guard releases the registration on every path.
#[derive(Debug)]
pub struct SensorGuard {
    name: String,
    token: CancellationToken,
}

impl SensorGuard {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            token: CancellationToken::new(),
        }
    }

    /// Token the capability uses to notice the release
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for SensorGuard {
    fn drop(&mut self) {
        self.token.cancel();
        debug!("Released sensor registration: {}", self.name);
    }
}
