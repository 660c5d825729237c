//! Single-flight guard for termination workflows

use crate::error::{ControlError, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Names of servers with a termination currently running
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    names: Arc<Mutex<HashSet<String>>>,
}

impl InFlight {
    /// Claim `name`; fails while another claim on it is alive
    pub fn acquire(&self, name: &str) -> Result<InFlightGuard> {
        let mut names = self.names.lock().unwrap_or_else(|e| e.into_inner());
        if !names.insert(name.to_string()) {
            return Err(ControlError::AlreadyInProgress(name.to_string()));
        }
        Ok(InFlightGuard {
            names: self.names.clone(),
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(name)
    }
}

/// Releases the claim on drop
#[derive(Debug)]
pub struct InFlightGuard {
    names: Arc<Mutex<HashSet<String>>>,
    name: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.name);
    }
}
