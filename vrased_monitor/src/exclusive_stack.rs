// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Exclusive stack guard
//!
//! The exclusive stack belongs to attestation code.  Untrusted code may not
//! touch it, and attestation code may only write to it (or to the HMAC
//! output buffer) so that nothing derived from the key leaks elsewhere.

use crate::kill_switch::{KillInput, KillSwitch};
use crate::Error;
use serde::Serialize;
use vrased_areas::AddressPredicates;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExclusiveStackMonitor {
    #[serde(flatten)]
    pub guard: KillSwitch,
}

pub fn unauthorized_access(addr: &AddressPredicates, read_en: bool, write_en: bool) -> bool {
    addr.is_outside_rom && addr.data_in_exclusive_stack && (read_en || write_en)
}

pub fn leaky_write(addr: &AddressPredicates, write_en: bool) -> bool {
    addr.is_in_rom && write_en && !addr.data_in_exclusive_stack && !addr.data_in_hmac_output
}

impl ExclusiveStackMonitor {
    pub const fn new() -> ExclusiveStackMonitor {
        ExclusiveStackMonitor {
            guard: KillSwitch::new(),
        }
    }

    fn input(addr: &AddressPredicates, read_en: bool, write_en: bool) -> KillInput {
        KillInput {
            violation: unauthorized_access(addr, read_en, write_en) || leaky_write(addr, write_en),
            pc_at_reset: addr.pc_at_reset,
        }
    }

    pub fn step(
        &self,
        addr: &AddressPredicates,
        read_en: bool,
        write_en: bool,
    ) -> ExclusiveStackMonitor {
        ExclusiveStackMonitor {
            guard: self.guard.step(&Self::input(addr, read_en, write_en)),
        }
    }

    pub fn step_exclusive(
        &self,
        addr: &AddressPredicates,
        read_en: bool,
        write_en: bool,
    ) -> Result<ExclusiveStackMonitor, Error> {
        Ok(ExclusiveStackMonitor {
            guard: self
                .guard
                .step_exclusive(&Self::input(addr, read_en, write_en))?,
        })
    }

    pub fn reset(&self) -> bool {
        self.guard.reset
    }
}
