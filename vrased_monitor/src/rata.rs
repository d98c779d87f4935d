// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RATA-B: freshness of the attested region
//!
//! Tracks whether the attested region has been written since it was last
//! attested, and whether attestation code acknowledged that by updating the
//! lock management table once it got past authentication (`after_auth_pc`).
//! Any direct write to the lock table, by the CPU or by DMA, throws the
//! automaton back to `RESET`.
//!
//! Guards here overlap on purpose (a lock-table write beats everything), so
//! the table is always resolved by priority.

use crate::table::{Rule, Transition, TransitionTable};
use crate::HardwareSignals;
use serde::Serialize;
use strum_macros::{Display, EnumIter};
use vrased_areas::AddressPredicates;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumIter, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RataState {
    Attest,
    NotModified,
    Update,
    Modified,
    Reset,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RataInput {
    pub modifies_lock_table: bool,
    pub modifies_attested_region: bool,
    pub pc_after_auth: bool,
    pub pc_at_rom_end: bool,
    pub pc_at_reset: bool,
}

impl RataInput {
    pub fn new(
        cpu: &AddressPredicates,
        dma: &AddressPredicates,
        signals: &HardwareSignals,
    ) -> RataInput {
        RataInput {
            modifies_lock_table: (signals.write_en && cpu.data_in_lock_table)
                || (signals.dma_en && dma.data_in_lock_table),
            modifies_attested_region: (signals.write_en && cpu.data_in_attested_region)
                || (signals.dma_en && dma.data_in_attested_region),
            pc_after_auth: cpu.pc_after_auth,
            pc_at_rom_end: cpu.is_last_rom,
            pc_at_reset: cpu.pc_at_reset,
        }
    }
}

static RATA_B: TransitionTable<RataState, RataInput> = TransitionTable {
    name: "rata-b",
    rules: &[
        Rule {
            name: "lock-table-write",
            guard: |_, i| i.modifies_lock_table,
            next: RataState::Reset,
        },
        Rule {
            name: "attested-region-write",
            guard: |s, i| s != RataState::Reset && i.modifies_attested_region,
            next: RataState::Modified,
        },
        Rule {
            name: "authenticated",
            guard: |s, i| matches!(s, RataState::Modified | RataState::Attest) && i.pc_after_auth,
            next: RataState::Update,
        },
        Rule {
            name: "attested-unmodified",
            guard: |s, i| s == RataState::Attest && i.pc_at_rom_end,
            next: RataState::NotModified,
        },
        Rule {
            name: "update-done",
            guard: |s, i| s == RataState::Update && !i.pc_after_auth,
            next: RataState::Attest,
        },
        Rule {
            name: "reset-vector",
            guard: |s, i| s == RataState::Reset && i.pc_at_reset,
            next: RataState::Modified,
        },
    ],
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegionFreshnessMonitor {
    pub state: RataState,
    pub reset: bool,
}

impl Default for RegionFreshnessMonitor {
    fn default() -> RegionFreshnessMonitor {
        RegionFreshnessMonitor::new()
    }
}

impl RegionFreshnessMonitor {
    pub const fn new() -> RegionFreshnessMonitor {
        RegionFreshnessMonitor {
            state: RataState::Reset,
            reset: true,
        }
    }

    pub fn step(&self, input: &RataInput) -> RegionFreshnessMonitor {
        self.commit(RATA_B.resolve(self.state, input))
    }

    fn commit(&self, t: Transition<RataState>) -> RegionFreshnessMonitor {
        let reset = match (t.from, t.next) {
            (_, RataState::Reset) => true,
            (RataState::Reset, RataState::Modified) => false,
            _ => self.reset,
        };
        if t.next != t.from {
            log::debug!(
                "rata-b: {} -> {} ({})",
                t.from,
                t.next,
                t.rule.unwrap_or("hold")
            );
        }
        RegionFreshnessMonitor {
            state: t.next,
            reset,
        }
    }

    pub fn reset(&self) -> bool {
        self.reset
    }

    /// The lock table update step of the protocol has completed.
    pub fn lock_table_updated(&self) -> bool {
        self.state == RataState::Update && !self.reset
    }
}
