//! Control-thread parameter store
//!
//! UI and host threads write through a [`ControlHandle`]; the audio thread
//! copies the values out with [`ControlHandle::try_snapshot`], which never
//! blocks. A version counter lets the audio thread skip the copy when nothing
//! changed since its last snapshot.

use reverb_core::params::ids;
use reverb_core::{ParamValue, ParameterSnapshot, ParameterSource, Result, ReverbError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

#[derive(Debug)]
struct Shared {
    params: Mutex<ParameterSnapshot>,
    version: AtomicU64,
}

/// Cloneable handle to the engine's parameter values
#[derive(Debug, Clone)]
pub struct ControlHandle {
    shared: Arc<Shared>,
}

impl Default for ControlHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlHandle {
    /// Store holding every parameter at its default
    pub fn new() -> Self {
        Self::with_snapshot(ParameterSnapshot::defaults())
    }

    /// Store seeded with `snapshot`
    pub fn with_snapshot(snapshot: ParameterSnapshot) -> Self {
        Self {
            shared: Arc::new(Shared {
                params: Mutex::new(snapshot),
                version: AtomicU64::new(1),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ParameterSnapshot> {
        self.shared
            .params
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Set a float parameter
    ///
    /// The key must already exist as a float. Values are not clamped: an
    /// out-of-range value reaches the stages, which report it.
    pub fn set_float(&self, key: &str, value: f32) -> Result<()> {
        if !value.is_finite() {
            return Err(ReverbError::NonFiniteParameter {
                key: key.to_string(),
                value,
            });
        }

        let mut params = self.lock();
        match params.lookup(key) {
            Some(ParamValue::Float(current)) if *current == value => return Ok(()),
            Some(ParamValue::Float(_)) => {}
            Some(ParamValue::Choice(_)) => {
                return Err(ReverbError::WrongParameterKind {
                    key: key.to_string(),
                    expected: "float",
                })
            }
            None => return Err(ReverbError::ParameterNotFound(key.to_string())),
        }
        params.set_float(key, value);
        self.shared.version.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Read a float parameter
    pub fn float(&self, key: &str) -> Result<f32> {
        self.lock().float(key)
    }

    /// Select the IR by name (empty for none)
    pub fn select_ir(&self, name: &str) {
        let mut params = self.lock();
        if params.choice(ids::IR_CHOICE).ok() == Some(name) {
            return;
        }
        params.set_choice(ids::IR_CHOICE, name);
        self.shared.version.fetch_add(1, Ordering::Release);
    }

    /// Name of the selected IR, empty if none
    pub fn selected_ir(&self) -> String {
        self.lock()
            .choice(ids::IR_CHOICE)
            .map(str::to_string)
            .unwrap_or_default()
    }

    /// Blocking copy of every value
    pub fn snapshot(&self) -> ParameterSnapshot {
        self.lock().clone()
    }

    /// Number of accepted writes, starting at 1
    pub fn version(&self) -> u64 {
        self.shared.version.load(Ordering::Acquire)
    }

    /// Copy the values if they changed since `seen_version`
    ///
    /// Returns `None` when nothing changed or a writer holds the lock.
    pub fn try_snapshot(&self, seen_version: u64) -> Option<(u64, ParameterSnapshot)> {
        if self.version() == seen_version {
            return None;
        }
        let params = match self.shared.params.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        // Writers bump the version while holding the lock
        let version = self.version();
        Some((version, params.clone()))
    }
}
