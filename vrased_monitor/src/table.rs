// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ordered guard tables
//!
//! Every automaton in this crate is written down as a list of
//! `(name, guard, next)` rules.  At runtime the first rule whose guard holds
//! wins and a state with no matching rule holds.  Some tables are meant to
//! have disjoint guards; [`TransitionTable::resolve_exclusive`] checks that
//! claim on every step and reports any two matching rules that disagree.

use crate::Error;
use std::fmt::Display;

pub struct Rule<S, C> {
    pub name: &'static str,
    pub guard: fn(S, &C) -> bool,
    pub next: S,
}

pub struct TransitionTable<S: 'static, C: 'static> {
    pub name: &'static str,
    pub rules: &'static [Rule<S, C>],
}

/// Outcome of one table lookup
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Transition<S> {
    pub from: S,
    pub next: S,
    /// Name of the rule that fired, or `None` when the state held
    pub rule: Option<&'static str>,
}

impl<S: Copy + PartialEq + Display + 'static, C: 'static> TransitionTable<S, C> {
    pub fn resolve(&self, state: S, ctx: &C) -> Transition<S> {
        match self.rules.iter().find(|r| (r.guard)(state, ctx)) {
            Some(r) => Transition {
                from: state,
                next: r.next,
                rule: Some(r.name),
            },
            None => Transition {
                from: state,
                next: state,
                rule: None,
            },
        }
    }

    /// Like [`resolve`](Self::resolve), but fails if two rules match and
    /// name different next states.
    pub fn resolve_exclusive(&self, state: S, ctx: &C) -> Result<Transition<S>, Error> {
        let matching: Vec<&Rule<S, C>> =
            self.rules.iter().filter(|r| (r.guard)(state, ctx)).collect();
        if let Some(first) = matching.first() {
            if matching.iter().any(|r| r.next != first.next) {
                return Err(Error::AmbiguousTransition {
                    table: self.name,
                    state: state.to_string(),
                    rules: matching.iter().map(|r| r.name).collect(),
                });
            }
        }
        Ok(self.resolve(state, ctx))
    }

    /// Names of every rule whose guard holds, in priority order
    pub fn matching(&self, state: S, ctx: &C) -> Vec<&'static str> {
        self.rules
            .iter()
            .filter(|r| (r.guard)(state, ctx))
            .map(|r| r.name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum_macros::Display;

    #[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
    enum Light {
        Red,
        Green,
        Off,
    }

    static OVERLAPPING: TransitionTable<Light, u32> = TransitionTable {
        name: "light",
        rules: &[
            Rule {
                name: "red-on-even",
                guard: |s, n| s == Light::Red && n % 2 == 0,
                next: Light::Green,
            },
            Rule {
                name: "red-on-four",
                guard: |s, n| s == Light::Red && n % 4 == 0,
                next: Light::Off,
            },
            Rule {
                name: "red-on-six",
                guard: |s, n| s == Light::Red && *n == 6,
                next: Light::Green,
            },
        ],
    };

    #[test]
    fn first_match_wins() {
        let t = OVERLAPPING.resolve(Light::Red, &4);
        assert_eq!(t.next, Light::Green);
        assert_eq!(t.rule, Some("red-on-even"));
    }

    #[test]
    fn unmatched_holds() {
        let t = OVERLAPPING.resolve(Light::Green, &4);
        assert_eq!(t.next, Light::Green);
        assert_eq!(t.rule, None);
        assert_eq!(OVERLAPPING.resolve(Light::Red, &3).rule, None);
    }

    #[test]
    fn exclusive_reports_disagreeing_rules() {
        match OVERLAPPING.resolve_exclusive(Light::Red, &4) {
            Err(Error::AmbiguousTransition {
                table,
                state,
                rules,
            }) => {
                assert_eq!(table, "light");
                assert_eq!(state, "Red");
                assert_eq!(rules, vec!["red-on-even", "red-on-four"]);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn exclusive_accepts_agreeing_rules() {
        // "red-on-even" and "red-on-six" both match but agree on Green
        let t = OVERLAPPING.resolve_exclusive(Light::Red, &6).unwrap();
        assert_eq!(t.next, Light::Green);
        assert_eq!(OVERLAPPING.matching(Light::Red, &6).len(), 2);
    }
}
