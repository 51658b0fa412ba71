//! Privileged access switch.
//!
//! While a [`PrivilegeGuard`] is alive the scheduler allows operations on
//! SYSTEM-kind tasks and the reserved order range. Only the embedding
//! runtime's bootstrap is expected to take one.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

/// Counter behind the switch; guards may nest.
#[derive(Debug, Default)]
pub(crate) struct Privilege {
    holders: AtomicUsize,
}

impl Privilege {
    #[inline]
    pub(crate) fn is_granted(&self) -> bool {
        self.holders.load(Ordering::SeqCst) > 0
    }

    pub(crate) fn grant(&self) -> PrivilegeGuard<'_> {
        let previous = self.holders.fetch_add(1, Ordering::SeqCst);
        if previous == 0 {
            debug!("privileged access granted");
        }
        PrivilegeGuard { privilege: self }
    }
}

/// Grants privileged access until dropped.
#[must_use = "privileged access is revoked as soon as the guard is dropped"]
#[derive(Debug)]
pub struct PrivilegeGuard<'a> {
    privilege: &'a Privilege,
}

impl Drop for PrivilegeGuard<'_> {
    fn drop(&mut self) {
        if self.privilege.holders.fetch_sub(1, Ordering::SeqCst) == 1 {
            debug!("privileged access revoked");
        }
    }
}
