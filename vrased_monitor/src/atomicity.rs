// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Atomic execution of attestation code
//!
//! Attestation code must be entered at its first instruction, run through
//! its middle, and be left from its last instruction.  Anything else (a jump
//! into the middle, an early exit, an interrupt) kills the run until the CPU
//! comes back through the reset vector.

use crate::table::{Rule, Transition, TransitionTable};
use crate::Error;
use serde::Serialize;
use strum_macros::{Display, EnumIter};
use vrased_areas::{AddressPredicates, RomPosition};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumIter, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AtomicityState {
    First,
    Mid,
    Last,
    Outside,
    Killed,
}

impl AtomicityState {
    /// Whether a pc at `pos` is a legitimate place to be in this state
    pub fn admits(self, pos: RomPosition) -> bool {
        match self {
            AtomicityState::First => pos == RomPosition::First,
            AtomicityState::Mid => pos == RomPosition::Mid,
            AtomicityState::Last => pos == RomPosition::Last,
            AtomicityState::Outside => pos == RomPosition::Outside,
            AtomicityState::Killed => true,
        }
    }
}

static ATOMICITY: TransitionTable<AtomicityState, AddressPredicates> = TransitionTable {
    name: "atomicity",
    rules: &[
        Rule {
            name: "first-to-mid",
            guard: |s, p| s == AtomicityState::First && p.is_mid_rom,
            next: AtomicityState::Mid,
        },
        Rule {
            name: "first-skips-mid",
            guard: |s, p| s == AtomicityState::First && (p.is_last_rom || p.is_outside_rom),
            next: AtomicityState::Killed,
        },
        Rule {
            name: "mid-to-last",
            guard: |s, p| s == AtomicityState::Mid && p.is_last_rom,
            next: AtomicityState::Last,
        },
        Rule {
            name: "mid-escapes",
            guard: |s, p| s == AtomicityState::Mid && (p.is_outside_rom || p.is_first_rom),
            next: AtomicityState::Killed,
        },
        Rule {
            name: "last-to-outside",
            guard: |s, p| s == AtomicityState::Last && p.is_outside_rom,
            next: AtomicityState::Outside,
        },
        Rule {
            name: "last-reenters",
            guard: |s, p| s == AtomicityState::Last && p.is_in_rom,
            next: AtomicityState::Killed,
        },
        Rule {
            name: "outside-to-first",
            guard: |s, p| s == AtomicityState::Outside && p.is_first_rom,
            next: AtomicityState::First,
        },
        Rule {
            name: "outside-jumps-in",
            guard: |s, p| s == AtomicityState::Outside && p.is_in_rom && !p.is_first_rom,
            next: AtomicityState::Killed,
        },
        Rule {
            name: "reset-vector",
            guard: |s, p| s == AtomicityState::Killed && p.pc_at_reset,
            next: AtomicityState::Outside,
        },
    ],
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AtomicityMonitor {
    pub state: AtomicityState,
    pub reset: bool,
}

impl Default for AtomicityMonitor {
    fn default() -> AtomicityMonitor {
        AtomicityMonitor::new()
    }
}

impl AtomicityMonitor {
    pub const fn new() -> AtomicityMonitor {
        AtomicityMonitor {
            state: AtomicityState::Killed,
            reset: true,
        }
    }

    pub fn step(&self, cpu: &AddressPredicates) -> AtomicityMonitor {
        Self::commit(ATOMICITY.resolve(self.state, cpu), cpu)
    }

    pub fn step_exclusive(&self, cpu: &AddressPredicates) -> Result<AtomicityMonitor, Error> {
        Ok(Self::commit(ATOMICITY.resolve_exclusive(self.state, cpu)?, cpu))
    }

    // Killed always asserts reset; that covers both staying killed away from
    // the reset vector and being killed by a bad jump.  A state the pc does
    // not agree with is treated the same way.
    fn commit(t: Transition<AtomicityState>, cpu: &AddressPredicates) -> AtomicityMonitor {
        let reset = t.next == AtomicityState::Killed || !t.next.admits(cpu.rom_position());
        if t.next != t.from {
            log::debug!(
                "atomicity: {} -> {} at pc {:#x} ({})",
                t.from,
                t.next,
                cpu.pc,
                t.rule.unwrap_or("hold")
            );
        }
        AtomicityMonitor {
            state: t.next,
            reset,
        }
    }

    pub fn reset(&self) -> bool {
        self.reset
    }
}
