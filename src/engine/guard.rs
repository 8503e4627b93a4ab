//! Scoped activation

use std::ops::{Deref, DerefMut};

use crate::error::Result;

use super::Runner;

/// An activated runner that is deactivated when the guard goes out of scope.
///
/// Dropping the guard logs deactivation failures; call [`finish`](Self::finish)
/// to receive them instead.
pub struct ActiveRunner<'a> {
    runner: &'a mut Runner,
    finished: bool,
}

impl<'a> ActiveRunner<'a> {
    pub(crate) fn new(runner: &'a mut Runner) -> Self {
        Self {
            runner,
            finished: false,
        }
    }

    /// Deactivate now, returning any failure
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.runner.deactivate()
    }
}

impl Deref for ActiveRunner<'_> {
    type Target = Runner;

    fn deref(&self) -> &Runner {
        self.runner
    }
}

impl DerefMut for ActiveRunner<'_> {
    fn deref_mut(&mut self) -> &mut Runner {
        self.runner
    }
}

impl Drop for ActiveRunner<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.runner.deactivate() {
            tracing::warn!(runner = %self.runner.name(), error = %err, "deactivation failed");
        }
    }
}
