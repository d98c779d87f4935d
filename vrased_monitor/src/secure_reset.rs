// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::HardwareSignals;
use serde::Serialize;
use vrased_areas::AddressPredicates;

/// Forces a reset whenever memory is touched while the pc sits on the reset
/// vector.  There is no latched state; the flag is recomputed every tick.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SecureResetMonitor {
    pub reset: bool,
}

impl Default for SecureResetMonitor {
    fn default() -> SecureResetMonitor {
        SecureResetMonitor::new()
    }
}

impl SecureResetMonitor {
    pub const fn new() -> SecureResetMonitor {
        SecureResetMonitor { reset: true }
    }

    pub fn step(&self, cpu: &AddressPredicates, signals: &HardwareSignals) -> SecureResetMonitor {
        SecureResetMonitor {
            reset: cpu.pc_at_reset && signals.any_access(),
        }
    }

    pub fn reset(&self) -> bool {
        self.reset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrased_areas::MemoryLayout;

    fn step(s: HardwareSignals) -> bool {
        let l = MemoryLayout::default();
        SecureResetMonitor::new()
            .step(&l.classify(s.pc, s.data_addr), &s)
            .reset()
    }

    #[test]
    fn access_at_reset_vector_resets() {
        assert!(step(HardwareSignals::read(0, 1100)));
        assert!(step(HardwareSignals::write(0, 1100)));
        assert!(step(HardwareSignals::dma(0, 1100)));
    }

    #[test]
    fn quiet_reset_vector_is_fine() {
        assert!(!step(HardwareSignals::idle(0)));
    }

    #[test]
    fn not_sticky() {
        let l = MemoryLayout::default();
        let s = HardwareSignals::read(0, 4);
        let m = SecureResetMonitor::new().step(&l.classify(0, 4), &s);
        assert!(m.reset());
        let quiet = HardwareSignals::read(2000, 4);
        assert!(!m.step(&l.classify(2000, 4), &quiet).reset());
    }
}
