#![forbid(unsafe_code)]

use crate::{
    Error,
    process::Process,
    protection::{AccessIntent, Protection},
    region::MemoryRegionInfo,
};
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardState {
    /// The region already permitted the access; nothing was changed.
    Transparent,
    /// Protection was escalated and still has to be put back.
    Overridden,
    /// The original protection has been put back.
    Restored,
}

/// Scoped permission to read or write a foreign region.
///
/// Acquiring the guard either proves that the region already allows the
/// intended access or escalates its protection. An escalated region gets its
/// original protection back exactly once: through [`ProtectGuard::restore`]
/// when the caller wants to see failures, or on drop otherwise.
///
/// The guard is deliberately not `Clone`: only one value may own the
/// obligation to restore a region.
#[derive(Debug)]
pub struct ProtectGuard<'a, P: Process + ?Sized> {
    process: &'a P,
    region: MemoryRegionInfo,
    intent: AccessIntent,
    state: GuardState,
    original: Option<Protection>,
}

impl<'a, P: Process + ?Sized> ProtectGuard<'a, P> {
    /// Query the region containing `address` and guard it.
    pub fn acquire(process: &'a P, address: usize, intent: AccessIntent) -> Result<Self, Error> {
        let region = process.query(address)?;
        Self::for_region(process, region, intent)
    }

    /// Guard a region the caller already queried.
    pub fn for_region(
        process: &'a P,
        region: MemoryRegionInfo,
        intent: AccessIntent,
    ) -> Result<Self, Error> {
        // TODO: add a forced mode that skips the bad-protection check for the
        // rare callers that really have to poke at guard pages.
        if region.protect.is_bad() {
            return Err(Error::BadProtection {
                base: region.base,
                protect: region.protect.bits(),
            });
        }

        if region.protect.permits(intent) {
            return Ok(Self {
                process,
                region,
                intent,
                state: GuardState::Transparent,
                original: None,
            });
        }

        let original = match process.protect(&region, Protection::EXECUTE_READWRITE) {
            Ok(original) => original,
            Err(err) => {
                // Code integrity policies in the target may forbid execute.
                debug!(%err, base = region.base, "falling back to read/write protection");
                process.protect(&region, Protection::READWRITE)?
            }
        };

        Ok(Self {
            process,
            region,
            intent,
            state: GuardState::Overridden,
            original: Some(original),
        })
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn intent(&self) -> AccessIntent {
        self.intent
    }

    pub fn region(&self) -> &MemoryRegionInfo {
        &self.region
    }

    /// Put the original protection back. Calling this again after a success
    /// is a no-op. After a failure the guard stays `Overridden` and drop
    /// will try once more.
    pub fn restore(&mut self) -> Result<(), Error> {
        let Some(original) = self.original else {
            return Ok(());
        };

        self.process.protect(&self.region, original)?;
        self.original = None;
        self.state = GuardState::Restored;
        Ok(())
    }

    fn restore_unchecked(&mut self) {
        if let Err(err) = self.restore() {
            // WARNING: the region keeps the escalated protection.
            error!(%err, base = self.region.base, "failed to restore region protection");
            if !std::thread::panicking() {
                debug_assert!(false, "failed to restore region protection: {err}");
            }
        }
    }
}

impl<P: Process + ?Sized> Drop for ProtectGuard<'_, P> {
    fn drop(&mut self) {
        self.restore_unchecked();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeProcess;
    use pretty_assertions::assert_eq;

    const BASE: usize = 0x10000;

    #[test]
    fn sufficient_protection_is_transparent() {
        let process = FakeProcess::new(1).with_region(BASE, 0x1000, Protection::READONLY);

        let mut guard = ProtectGuard::acquire(&process, BASE + 0x10, AccessIntent::Read).unwrap();
        assert_eq!(guard.state(), GuardState::Transparent);
        guard.restore().unwrap();
        drop(guard);

        assert_eq!(process.protect_calls(), 0);
    }

    #[test]
    fn escalation_restores_exactly_once() {
        let process = FakeProcess::new(1).with_region(BASE, 0x1000, Protection::READONLY);

        let mut guard = ProtectGuard::acquire(&process, BASE, AccessIntent::Write).unwrap();
        assert_eq!(guard.state(), GuardState::Overridden);
        assert_eq!(process.protection_at(BASE), Protection::EXECUTE_READWRITE);

        guard.restore().unwrap();
        guard.restore().unwrap();
        assert_eq!(guard.state(), GuardState::Restored);
        drop(guard);

        assert_eq!(
            process.protect_history(),
            vec![
                (BASE, Protection::EXECUTE_READWRITE),
                (BASE, Protection::READONLY)
            ]
        );
        assert_eq!(process.protection_at(BASE), Protection::READONLY);
    }

    #[test]
    fn drop_restores_escalated_region() {
        let process = FakeProcess::new(1).with_region(BASE, 0x1000, Protection::EXECUTE);
        {
            let guard = ProtectGuard::acquire(&process, BASE, AccessIntent::Read).unwrap();
            assert_eq!(guard.state(), GuardState::Overridden);
        }
        assert_eq!(process.protect_calls(), 2);
        assert_eq!(process.protection_at(BASE), Protection::EXECUTE);
    }

    #[test]
    fn falls_back_to_read_write_when_execute_is_refused() {
        let process = FakeProcess::new(1).with_region(BASE, 0x1000, Protection::READONLY);
        process.refuse(Protection::EXECUTE_READWRITE);

        let guard = ProtectGuard::acquire(&process, BASE, AccessIntent::Write).unwrap();
        assert_eq!(guard.state(), GuardState::Overridden);
        assert_eq!(process.protection_at(BASE), Protection::READWRITE);
        drop(guard);

        assert_eq!(process.protection_at(BASE), Protection::READONLY);
    }

    #[test]
    fn both_escalations_refused_leaves_region_untouched() {
        let process = FakeProcess::new(1).with_region(BASE, 0x1000, Protection::READONLY);
        process.refuse(Protection::EXECUTE_READWRITE);
        process.refuse(Protection::READWRITE);

        let err = ProtectGuard::acquire(&process, BASE, AccessIntent::Write).unwrap_err();
        assert!(matches!(
            err,
            Error::Protect { protect, .. } if protect == Protection::READWRITE.bits()
        ));
        assert_eq!(process.protection_at(BASE), Protection::READONLY);
        assert!(process.protect_history().is_empty());
    }

    #[test]
    fn bad_protection_is_rejected_without_mutation() {
        for protect in [
            Protection::NOACCESS,
            Protection::READWRITE | Protection::GUARD,
            Protection::EXECUTE_READ | Protection::GUARD,
        ] {
            let process = FakeProcess::new(1).with_region(BASE, 0x1000, protect);
            for intent in [AccessIntent::Read, AccessIntent::Write] {
                let err = ProtectGuard::acquire(&process, BASE, intent).unwrap_err();
                assert!(matches!(err, Error::BadProtection { base: BASE, .. }));
            }
            assert_eq!(process.protect_calls(), 0);
        }
    }

    #[test]
    fn explicit_restore_failure_propagates_and_drop_retries() {
        let process = FakeProcess::new(1).with_region(BASE, 0x1000, Protection::READONLY);
        let mut guard = ProtectGuard::acquire(&process, BASE, AccessIntent::Write).unwrap();

        process.refuse(Protection::READONLY);
        assert!(guard.restore().is_err());
        assert_eq!(guard.state(), GuardState::Overridden);

        process.allow(Protection::READONLY);
        drop(guard);
        assert_eq!(process.protection_at(BASE), Protection::READONLY);
    }

    #[test]
    fn moved_guard_keeps_single_restoration() {
        let process = FakeProcess::new(1).with_region(BASE, 0x1000, Protection::READONLY);
        let guard = ProtectGuard::acquire(&process, BASE, AccessIntent::Write).unwrap();
        let guards = vec![guard];
        drop(guards);

        assert_eq!(process.protect_calls(), 2);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "failed to restore region protection")]
    fn failed_restore_on_drop_asserts_in_debug_builds() {
        let process = FakeProcess::new(1).with_region(BASE, 0x1000, Protection::READONLY);
        let guard = ProtectGuard::acquire(&process, BASE, AccessIntent::Write).unwrap();
        process.refuse(Protection::READONLY);
        drop(guard);
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn failed_restore_on_drop_is_swallowed_in_release_builds() {
        let process = FakeProcess::new(1).with_region(BASE, 0x1000, Protection::READONLY);
        let guard = ProtectGuard::acquire(&process, BASE, AccessIntent::Write).unwrap();
        process.refuse(Protection::READONLY);
        drop(guard);
        assert_eq!(process.protection_at(BASE), Protection::EXECUTE_READWRITE);
    }
}
