// src/health/registry.rs
use super::checker::Checker;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub type CheckerMap = HashMap<String, Arc<dyn Checker>>;

#[derive(Default)]
struct RegistryState {
    checkers: CheckerMap,
    shutting_down: bool,
}

/// Everything one round needs, copied out under a single read guard.
pub struct RegistrySnapshot {
    pub checkers: CheckerMap,
    pub shutting_down: bool,
}

/// Named checkers plus the shutdown flag, guarded by one lock.
///
/// Registration, the shutdown flag and the status read path all go through the
/// same lock, so the checker list a round sees is always consistent with the
/// flag it reports. Rounds work on a [`RegistrySnapshot`] and never hold the
/// lock while checkers run.
#[derive(Default)]
pub struct CheckerRegistry {
    state: RwLock<RegistryState>,
}

impl CheckerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `checker` under `name`, returning the checker it replaced.
    pub fn register(&self, name: impl Into<String>, checker: Arc<dyn Checker>) -> Option<Arc<dyn Checker>> {
        self.write().checkers.insert(name.into(), checker)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.read();
        RegistrySnapshot {
            checkers: state.checkers.clone(),
            shutting_down: state.shutting_down,
        }
    }

    /// Sets the shutdown flag. Returns `true` only for the call that set it.
    pub fn shutdown(&self) -> bool {
        let mut state = self.write();
        !std::mem::replace(&mut state.shutting_down, true)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.read().shutting_down
    }

    pub fn len(&self) -> usize {
        self.read().checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().checkers.keys().cloned().collect();
        names.sort();
        names
    }

    // The state is plain data that every writer leaves consistent, so a
    // poisoned lock is safe to keep using.
    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
