use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::error::ExecutionError;

/// In-flight runs by execution id.
#[derive(Debug, Default)]
pub struct CancelRegistry {
    running: Mutex<HashMap<String, CancellationToken>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        CancelRegistry::default()
    }

    /// Registers `execution_id` until the returned guard is dropped.
    pub fn register(self: &Arc<Self>, execution_id: &str) -> Result<Registration, ExecutionError> {
        let mut running = self.running.lock();
        if running.contains_key(execution_id) {
            return Err(ExecutionError::AlreadyRunning(execution_id.to_string()));
        }
        let token = CancellationToken::new();
        running.insert(execution_id.to_string(), token.clone());
        debug!(execution_id, "registered run");
        Ok(Registration {
            registry: Arc::clone(self),
            execution_id: execution_id.to_string(),
            token,
        })
    }

    /// Signals the run. Returns false when nothing with that id is running.
    pub fn cancel(&self, execution_id: &str) -> bool {
        match self.running.lock().get(execution_id) {
            Some(token) => {
                token.cancel();
                info!(execution_id, "cancellation requested");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, execution_id: &str) -> bool {
        self.running.lock().contains_key(execution_id)
    }
}

pub struct Registration {
    registry: Arc<CancelRegistry>,
    execution_id: String,
    token: CancellationToken,
}

impl Registration {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.running.lock().remove(&self.execution_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_signals_token() {
        let registry = Arc::new(CancelRegistry::new());
        let registration = registry.register("run-1").unwrap();
        assert!(!registration.token().is_cancelled());
        assert!(registry.cancel("run-1"));
        assert!(registration.token().is_cancelled());
    }

    #[test]
    fn test_unknown_id() {
        let registry = Arc::new(CancelRegistry::new());
        assert!(!registry.cancel("nope"));
    }

    #[test]
    fn test_drop_unregisters() {
        let registry = Arc::new(CancelRegistry::new());
        {
            let _registration = registry.register("run-1").unwrap();
            assert!(registry.is_running("run-1"));
        }
        assert!(!registry.is_running("run-1"));
        assert!(!registry.cancel("run-1"));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = Arc::new(CancelRegistry::new());
        let _first = registry.register("run-1").unwrap();
        assert!(matches!(
            registry.register("run-1"),
            Err(ExecutionError::AlreadyRunning(_))
        ));
    }
}
