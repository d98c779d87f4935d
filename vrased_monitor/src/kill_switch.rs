// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The two-state `Run`/`Kill` automaton shared by the key and stack guards

use crate::table::{Rule, Transition, TransitionTable};
use crate::Error;
use serde::Serialize;
use strum_macros::{Display, EnumIter};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumIter, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardState {
    Run,
    Kill,
}

/// What a kill switch needs to know about the current tick
#[derive(Copy, Clone, Debug)]
pub struct KillInput {
    pub violation: bool,
    pub pc_at_reset: bool,
}

static KILL_SWITCH: TransitionTable<GuardState, KillInput> = TransitionTable {
    name: "kill-switch",
    rules: &[
        Rule {
            name: "violation",
            guard: |s, i| s == GuardState::Run && i.violation,
            next: GuardState::Kill,
        },
        Rule {
            name: "reset-vector",
            guard: |s, i| s == GuardState::Kill && i.pc_at_reset && !i.violation,
            next: GuardState::Run,
        },
    ],
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KillSwitch {
    pub state: GuardState,
    pub reset: bool,
}

impl Default for KillSwitch {
    fn default() -> KillSwitch {
        KillSwitch::new()
    }
}

impl KillSwitch {
    /// Power-on state: killed, with reset asserted
    pub const fn new() -> KillSwitch {
        KillSwitch {
            state: GuardState::Kill,
            reset: true,
        }
    }

    pub fn step(self, input: &KillInput) -> KillSwitch {
        self.commit(KILL_SWITCH.resolve(self.state, input))
    }

    pub fn step_exclusive(self, input: &KillInput) -> Result<KillSwitch, Error> {
        Ok(self.commit(KILL_SWITCH.resolve_exclusive(self.state, input)?))
    }

    fn commit(self, t: Transition<GuardState>) -> KillSwitch {
        let reset = match (t.from, t.next) {
            (GuardState::Run, GuardState::Kill) => true,
            (GuardState::Kill, GuardState::Run) => false,
            _ => self.reset,
        };
        KillSwitch {
            state: t.next,
            reset: reset || t.next == GuardState::Kill,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == GuardState::Run && !self.reset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    const QUIET: KillInput = KillInput {
        violation: false,
        pc_at_reset: false,
    };
    const BOOT: KillInput = KillInput {
        violation: false,
        pc_at_reset: true,
    };
    const BAD: KillInput = KillInput {
        violation: true,
        pc_at_reset: false,
    };

    #[test]
    fn starts_killed() {
        let k = KillSwitch::new();
        assert_eq!(k.state, GuardState::Kill);
        assert!(k.reset);
    }

    #[test]
    fn only_the_reset_vector_revives() {
        let k = KillSwitch::new().step(&QUIET);
        assert_eq!(k, KillSwitch::new());
        let k = k.step(&BOOT);
        assert!(k.is_running());
    }

    #[test]
    fn violation_at_reset_vector_stays_killed() {
        let input = KillInput {
            violation: true,
            pc_at_reset: true,
        };
        assert_eq!(KillSwitch::new().step(&input), KillSwitch::new());
    }

    #[test]
    fn violation_kills() {
        let k = KillSwitch::new().step(&BOOT).step(&QUIET).step(&BAD);
        assert_eq!(k.state, GuardState::Kill);
        assert!(k.reset);
        // stays down until the reset vector
        let k = k.step(&QUIET);
        assert!(k.reset);
        assert!(k.step(&BOOT).is_running());
    }

    #[test]
    fn guards_never_disagree() {
        for state in GuardState::iter() {
            for violation in [false, true] {
                for pc_at_reset in [false, true] {
                    let k = KillSwitch {
                        state,
                        reset: state == GuardState::Kill,
                    };
                    let input = KillInput {
                        violation,
                        pc_at_reset,
                    };
                    assert_eq!(k.step_exclusive(&input).unwrap(), k.step(&input));
                }
            }
        }
    }
}
