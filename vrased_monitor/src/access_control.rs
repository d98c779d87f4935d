// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Key access control: only attestation code may read the key

use crate::kill_switch::{KillInput, KillSwitch};
use crate::Error;
use serde::Serialize;
use vrased_areas::AddressPredicates;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AccessControlMonitor {
    #[serde(flatten)]
    pub guard: KillSwitch,
}

/// A read of the key region from code running outside ROM.
///
/// `addr` is whichever address bus is being watched (CPU data address or
/// DMA address); `read_en` is its read strobe.
pub fn invalid_access_key(addr: &AddressPredicates, read_en: bool) -> bool {
    addr.is_outside_rom && addr.key_access && read_en
}

impl AccessControlMonitor {
    pub const fn new() -> AccessControlMonitor {
        AccessControlMonitor {
            guard: KillSwitch::new(),
        }
    }

    fn input(addr: &AddressPredicates, read_en: bool) -> KillInput {
        KillInput {
            violation: invalid_access_key(addr, read_en),
            pc_at_reset: addr.pc_at_reset,
        }
    }

    pub fn step(&self, addr: &AddressPredicates, read_en: bool) -> AccessControlMonitor {
        AccessControlMonitor {
            guard: self.guard.step(&Self::input(addr, read_en)),
        }
    }

    pub fn step_exclusive(
        &self,
        addr: &AddressPredicates,
        read_en: bool,
    ) -> Result<AccessControlMonitor, Error> {
        Ok(AccessControlMonitor {
            guard: self.guard.step_exclusive(&Self::input(addr, read_en))?,
        })
    }

    pub fn reset(&self) -> bool {
        self.guard.reset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kill_switch::GuardState;
    use vrased_areas::MemoryLayout;

    fn booted(l: &MemoryLayout) -> AccessControlMonitor {
        AccessControlMonitor::new().step(&l.classify(0, 0), false)
    }

    #[test]
    fn rom_may_read_the_key() {
        let l = MemoryLayout::default();
        let m = booted(&l).step(&l.classify(100, 5), true);
        assert_eq!(m.guard.state, GuardState::Run);
        assert!(!m.reset());
    }

    #[test]
    fn untrusted_key_read_kills() {
        let l = MemoryLayout::default();
        let addr = l.classify(1088, 5);
        assert!(invalid_access_key(&addr, true));
        let m = booted(&l).step(&addr, true);
        assert_eq!(m.guard.state, GuardState::Kill);
        assert!(m.reset());
    }

    #[test]
    fn untrusted_key_write_is_not_a_read() {
        let l = MemoryLayout::default();
        let m = booted(&l).step(&l.classify(1088, 5), false);
        assert!(!m.reset());
    }

    // The key check is [min, max): reading the last key address from
    // untrusted code slips through.  Kept as the reference design has it.
    #[test]
    fn last_key_address_is_unguarded() {
        let l = MemoryLayout::default();
        let m = booted(&l);
        assert!(m.step(&l.classify(2000, 6), true).reset());
        assert!(!m.step(&l.classify(2000, 7), true).reset());
    }

    #[test]
    fn recovers_only_at_reset_vector() {
        let l = MemoryLayout::default();
        let killed = booted(&l).step(&l.classify(2000, 4), true);
        assert!(killed.step(&l.classify(2000, 100), false).reset());
        assert!(killed.step(&l.classify(64, 100), false).reset());
        assert!(!killed.step(&l.classify(0, 100), false).reset());
    }
}
