//! Helpers for tests that touch process environment variables

use std::ffi::OsString;
use std::sync::{Mutex, MutexGuard, PoisonError};

static ENV: Mutex<()> = Mutex::new(());

/// Exclusive hold on a set of environment variables.
///
/// The variables are cleared on creation and restored to their previous
/// values on drop. Guards are serialized, so two tests never see each
/// other's overrides.
pub struct ScopedEnv {
    saved: Vec<(String, Option<OsString>)>,
    _lock: MutexGuard<'static, ()>,
}

impl ScopedEnv {
    pub fn clear(vars: &[&str]) -> Self {
        let lock = ENV.lock().unwrap_or_else(PoisonError::into_inner);
        let saved = vars
            .iter()
            .map(|var| (var.to_string(), std::env::var_os(var)))
            .collect();
        for var in vars {
            // SAFETY: mutation is serialized by `ENV`
            unsafe { std::env::remove_var(var) };
        }
        Self { saved, _lock: lock }
    }

    pub fn set(&self, var: &str, value: &str) -> &Self {
        debug_assert!(
            self.saved.iter().any(|(name, _)| name == var),
            "{var} is not held by this guard"
        );
        unsafe { std::env::set_var(var, value) };
        self
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (var, value) in &self.saved {
            unsafe {
                match value {
                    Some(value) => std::env::set_var(var, value),
                    None => std::env::remove_var(var),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VAR: &str = "WORKERLINK_SCOPED_ENV_TEST";

    #[test]
    fn test_restores_previous_value() {
        unsafe { std::env::set_var(VAR, "before") };
        {
            let env = ScopedEnv::clear(&[VAR]);
            assert!(std::env::var_os(VAR).is_none());
            env.set(VAR, "during");
            assert_eq!("during", std::env::var(VAR).unwrap());
        }
        assert_eq!("before", std::env::var(VAR).unwrap());
        unsafe { std::env::remove_var(VAR) };

        {
            let env = ScopedEnv::clear(&[VAR]);
            env.set(VAR, "during");
        }
        assert!(std::env::var_os(VAR).is_none());
    }
}
