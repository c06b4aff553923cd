//! Configuration cells that freeze when a pool is initialized.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{RwLock, RwLockReadGuard};

use crate::error::{Error, Result};

/// A configuration value that can be changed until its owner freezes it.
///
/// Once frozen every [`update`](Self::update) fails with
/// [`Error::ImmutableConfig`] and leaves the value untouched.
pub struct Settings<T> {
    label: &'static str,
    value: RwLock<T>,
    frozen: AtomicBool,
}

impl<T> Settings<T> {
    /// Wrap `value`; `label` names it in immutability errors.
    pub fn new(label: &'static str, value: T) -> Self {
        Self {
            label,
            value: RwLock::new(value),
            frozen: AtomicBool::new(false),
        }
    }

    /// Borrow the current value.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.value.read()
    }

    /// Mutate the value through `f`.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut value = self.value.write();
        if self.frozen.load(Ordering::Acquire) {
            return Err(Error::ImmutableConfig { target: self.label });
        }
        Ok(f(&mut value))
    }

    /// Whether updates are rejected
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Name used in errors
    pub const fn label(&self) -> &'static str {
        self.label
    }

    pub(crate) fn freeze(&self) {
        let _value = self.value.write();
        self.frozen.store(true, Ordering::Release);
    }

    pub(crate) fn thaw(&self) {
        let _value = self.value.write();
        self.frozen.store(false, Ordering::Release);
    }
}

impl<T: Clone> Settings<T> {
    /// Clone the current value.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for Settings<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("label", &self.label)
            .field("value", &*self.value.read())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
