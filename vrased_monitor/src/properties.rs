// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Security properties, checked over a finite trace
//!
//! Each `G(...)` property of the design becomes a function over a window of
//! [`TickReport`]s returning every tick where it fails.  Temporal
//! properties that relate a tick to its successor walk consecutive pairs;
//! "eventually" is read as a weak until bounded by the end of the window.

use crate::atomicity::AtomicityState;
use crate::{Error, HardwareSignals, SecurityMonitor, TickReport};
use log::{debug as okay, info, trace};
use serde::Serialize;
use std::io::Write as _;
use strum_macros::{Display, EnumIter};
use vrased_areas::MemoryLayout;

macro_rules! error {
    ($failed:ident, $($arg:tt)*) => {
        $failed = true;
        log::error!($($arg)*);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumIter, Serialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Property {
    AccessControl,
    DmaAccessControl,
    NoLeakage,
    DmaNoLeakage,
    SecureReset,
    Atomicity,
    ControlledInvocation,
    RoundTrip,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub property: Property,
    pub tick: u64,
    pub detail: String,
}

impl Violation {
    fn new(property: Property, tick: u64, detail: String) -> Violation {
        Violation {
            property,
            tick,
            detail,
        }
    }
}

/// P1: an untrusted key read always has the guard in reset, on both buses
pub fn access_control(window: &[TickReport]) -> Vec<Violation> {
    let mut out = vec![];
    for r in window {
        if r.invalid_access_key && !r.monitors.access_control.reset() {
            out.push(Violation::new(
                Property::AccessControl,
                r.tick,
                format!("key read at {:#x} from pc {:#x} without reset", r.cpu.data_addr, r.cpu.pc),
            ));
        }
        if r.dma_invalid_access_key && !r.monitors.dma.access_control.reset() {
            out.push(Violation::new(
                Property::DmaAccessControl,
                r.tick,
                format!("DMA key access at {:#x} without reset", r.dma.data_addr),
            ));
        }
    }
    out
}

/// P2: stack intrusions and leaky writes always have the guard in reset
pub fn no_leakage(window: &[TickReport]) -> Vec<Violation> {
    let mut out = vec![];
    for r in window {
        if (r.unauthorized_access || r.leaky_write) && !r.monitors.exclusive_stack.reset() {
            out.push(Violation::new(
                Property::NoLeakage,
                r.tick,
                format!(
                    "{} at {:#x} from pc {:#x} without reset",
                    if r.unauthorized_access {
                        "stack access"
                    } else {
                        "leaky write"
                    },
                    r.cpu.data_addr,
                    r.cpu.pc
                ),
            ));
        }
        if (r.dma_unauthorized_access || r.dma_leaky_write) && !r.monitors.dma.exclusive_stack.reset()
        {
            out.push(Violation::new(
                Property::DmaNoLeakage,
                r.tick,
                format!("DMA at {:#x} from pc {:#x} without reset", r.dma.data_addr, r.dma.pc),
            ));
        }
    }
    out
}

/// P3: reading or writing with the pc on the reset vector resets
pub fn secure_reset(window: &[TickReport]) -> Vec<Violation> {
    window
        .iter()
        .filter(|r| r.cpu.pc_at_reset && (r.signals.read_en || r.signals.write_en))
        .filter(|r| !r.monitors.secure_reset.reset())
        .map(|r| {
            Violation::new(
                Property::SecureReset,
                r.tick,
                "memory access at the reset vector without reset".to_string(),
            )
        })
        .collect()
}

/// P6: leaving attestation code early, or skipping its middle, resets on
/// the tick that does it
pub fn atomicity(window: &[TickReport]) -> Vec<Violation> {
    let mut out = vec![];
    for pair in window.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        let illegal = match prev.monitors.atomicity.state {
            AtomicityState::Mid => cur.cpu.is_outside_rom,
            AtomicityState::First => cur.cpu.is_last_rom || cur.cpu.is_outside_rom,
            _ => false,
        };
        if illegal && !cur.monitors.atomicity.reset() {
            out.push(Violation::new(
                Property::Atomicity,
                cur.tick,
                format!(
                    "{} -> pc {:#x} without reset",
                    prev.monitors.atomicity.state, cur.cpu.pc
                ),
            ));
        }
    }
    out
}

/// P7: `FIRST W (MID | reset)` and `MID W (LAST | reset)`.
///
/// The first tick that leaves `FIRST` (or `MID`) must be the expected
/// successor or carry a reset; staying put until the window ends is fine.
pub fn controlled_invocation(window: &[TickReport]) -> Vec<Violation> {
    let mut out = vec![];
    for pair in window.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        let (from, to) = (prev.monitors.atomicity.state, cur.monitors.atomicity.state);
        let expected = match from {
            AtomicityState::First => AtomicityState::Mid,
            AtomicityState::Mid => AtomicityState::Last,
            _ => continue,
        };
        if to != from && to != expected && !cur.monitors.atomicity.reset() {
            out.push(Violation::new(
                Property::ControlledInvocation,
                cur.tick,
                format!("{from} -> {to} without reset"),
            ));
        }
    }
    out
}

/// After a guard asserts reset, a quiet tick at the reset vector brings it
/// back to its running state with reset released.
pub fn round_trip(window: &[TickReport]) -> Vec<Violation> {
    let mut out = vec![];
    for pair in window.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        if !cur.cpu.pc_at_reset || cur.signals.any_access() {
            continue;
        }
        let (p, c) = (&prev.monitors, &cur.monitors);
        let checks = [
            ("access control", p.access_control.reset(), c.access_control.guard.is_running()),
            (
                "atomicity",
                p.atomicity.reset(),
                c.atomicity.state == AtomicityState::Outside && !c.atomicity.reset(),
            ),
            ("exclusive stack", p.exclusive_stack.reset(), c.exclusive_stack.guard.is_running()),
            ("secure reset", p.secure_reset.reset(), !c.secure_reset.reset()),
            (
                "DMA",
                p.dma.reset(),
                c.dma.access_control.guard.is_running() && c.dma.exclusive_stack.guard.is_running(),
            ),
            ("RATA-B", p.rata_b.reset(), !c.rata_b.reset()),
        ];
        for (name, was_reset, recovered) in checks {
            if was_reset && !recovered {
                out.push(Violation::new(
                    Property::RoundTrip,
                    cur.tick,
                    format!("{name} did not recover at the reset vector"),
                ));
            }
        }
    }
    out
}

/// P5: no data region shares an address with attestation code
pub fn immutability(layout: &MemoryLayout) -> bool {
    layout.data_regions_exclude_rom()
}

pub fn region_exclusivity(layout: &MemoryLayout) -> bool {
    layout.regions_pairwise_disjoint()
}

/// Every trace property, in a fixed order
pub fn check_reports(window: &[TickReport]) -> Vec<Violation> {
    let mut out = access_control(window);
    out.extend(no_leakage(window));
    out.extend(secure_reset(window));
    out.extend(atomicity(window));
    out.extend(controlled_invocation(window));
    out.extend(round_trip(window));
    out
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub ticks: usize,
    pub global_resets: usize,
    pub rata_b_resets: usize,
    pub lock_table_updates: usize,
}

/// Initializes a logger that pretty-prints logging from `check_trace`
pub fn init_check_logger(verbose: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    builder
        .format(|buf, record| {
            let mut level_style = buf.style();

            level_style.set_color(match record.level() {
                log::Level::Info => env_logger::fmt::Color::Cyan,
                log::Level::Trace => env_logger::fmt::Color::Blue,
                log::Level::Warn => env_logger::fmt::Color::Yellow,
                log::Level::Error => env_logger::fmt::Color::Red,
                log::Level::Debug => env_logger::fmt::Color::Green,
            });

            writeln!(
                buf,
                "{: <5} | {}",
                level_style.value(match record.level() {
                    log::Level::Info => "",
                    log::Level::Trace => "",
                    log::Level::Warn => "WARN",
                    log::Level::Error => "ERROR",
                    log::Level::Debug => "OKAY",
                }),
                record.args().to_string().replace('\n', "\n      | ")
            )
        })
        .filter(
            Some("vrased_monitor::properties"),
            if verbose {
                log::LevelFilter::Trace
            } else {
                log::LevelFilter::Debug
            },
        )
        .filter(
            Some("vrased_monitor::monitor"),
            if verbose {
                log::LevelFilter::Debug
            } else {
                log::LevelFilter::Error
            },
        )
        .init();
}

/// Runs `trace` through a fresh monitor and checks every property.
///
/// Tables that should have disjoint guards are checked for it on every
/// tick, so an ambiguous transition is returned as an error rather than
/// resolved by priority.
pub fn check_trace(layout: &MemoryLayout, trace: &[HardwareSignals]) -> Result<CheckSummary, Error> {
    let mut failed = false;

    info!("=== Layout ===");
    for (kind, r) in layout.regions() {
        trace!("{kind}: [{:#x}, {:#x}]", r.min, r.max);
    }
    trace!("reset vector: {:#x}", layout.reset_address());
    trace!("after-auth pc: {:#x}", layout.after_auth_pc());
    if region_exclusivity(layout) {
        okay!("Regions are pairwise disjoint");
    } else {
        error!(failed, "Regions overlap");
    }
    if immutability(layout) {
        okay!("No data region overlaps ROM");
    } else {
        error!(failed, "A data region overlaps ROM");
    }

    info!("=== Trace ===");
    let reports = SecurityMonitor::new(layout).run_strict(trace.iter().copied())?;
    for r in &reports {
        trace!(
            "{:>6} pc {:#06x} | atomicity {} | rata-b {} | reset {}",
            r.tick,
            r.signals.pc,
            r.monitors.atomicity.state,
            r.monitors.rata_b.state,
            r.global_reset
        );
    }
    okay!("No ambiguous transitions in {} ticks", reports.len());

    let checks: [(&str, fn(&[TickReport]) -> Vec<Violation>); 6] = [
        ("P1 access control", access_control),
        ("P2 no leakage", no_leakage),
        ("P3 secure reset", secure_reset),
        ("P6 atomicity", atomicity),
        ("P7 controlled invocation", controlled_invocation),
        ("reset round trip", round_trip),
    ];
    for (name, check) in checks {
        let violations = check(&reports);
        if violations.is_empty() {
            okay!("{name} holds");
        }
        for v in violations {
            error!(failed, "{name} ({}): tick {}: {}", v.property, v.tick, v.detail);
        }
    }

    let summary = CheckSummary {
        ticks: reports.len(),
        global_resets: reports.iter().filter(|r| r.global_reset).count(),
        rata_b_resets: reports.iter().filter(|r| r.rata_b_reset()).count(),
        lock_table_updates: reports.iter().filter(|r| r.lock_table_updated).count(),
    };
    info!(
        "{} ticks, {} with reset asserted, {} with RATA-B in reset, {} lock table updates",
        summary.ticks, summary.global_resets, summary.rata_b_resets, summary.lock_table_updates
    );

    if failed {
        Err(Error::CheckFailed)
    } else {
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::Monitors;

    fn reports(trace: &[HardwareSignals]) -> Vec<TickReport> {
        let l = MemoryLayout::default();
        SecurityMonitor::new(&l).run(trace.iter().copied())
    }

    #[test]
    fn monitor_output_satisfies_every_property() {
        let trace = [
            HardwareSignals::idle(0),
            HardwareSignals::idle(0),
            HardwareSignals::read(2000, 5),
            HardwareSignals::idle(0),
            HardwareSignals::idle(64),
            HardwareSignals::write(65, 40),
            HardwareSignals::write(66, 1100),
            HardwareSignals::idle(0),
            HardwareSignals::dma(2000, 40),
            HardwareSignals::read(0, 5),
            HardwareSignals::idle(0),
        ];
        let violations = check_reports(&reports(&trace));
        assert!(violations.is_empty(), "{violations:#?}");
    }

    // Hand-built windows with the reset flags cleared, to make sure the
    // checkers actually look at them.
    fn forged(trace: &[HardwareSignals]) -> Vec<TickReport> {
        reports(trace)
            .into_iter()
            .map(|mut r| {
                r.monitors.access_control.guard.reset = false;
                r.monitors.exclusive_stack.guard.reset = false;
                r.monitors.secure_reset.reset = false;
                r.monitors.dma.access_control.guard.reset = false;
                r.monitors.dma.exclusive_stack.guard.reset = false;
                r.monitors.atomicity.reset = false;
                r
            })
            .collect()
    }

    #[test]
    fn access_control_flags_missing_reset() {
        let w = forged(&[HardwareSignals::idle(0), HardwareSignals::read(2000, 4)]);
        let v = access_control(&w);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].property, Property::AccessControl);
        assert_eq!(v[0].tick, 1);

        let w = forged(&[HardwareSignals::idle(0), HardwareSignals::dma(2000, 4)]);
        assert_eq!(access_control(&w)[0].property, Property::DmaAccessControl);
    }

    #[test]
    fn no_leakage_flags_missing_reset() {
        let w = forged(&[HardwareSignals::write(500, 1100)]);
        assert_eq!(no_leakage(&w)[0].property, Property::NoLeakage);
        let w = forged(&[HardwareSignals::dma(2000, 33)]);
        assert_eq!(no_leakage(&w)[0].property, Property::DmaNoLeakage);
    }

    #[test]
    fn secure_reset_flags_missing_reset() {
        let w = forged(&[HardwareSignals::write(0, 1100)]);
        assert_eq!(secure_reset(&w).len(), 1);
        // DMA is not part of P3 itself
        let w = forged(&[HardwareSignals::dma(0, 1100)]);
        assert!(secure_reset(&w).is_empty());
    }

    #[test]
    fn atomicity_flags_missing_reset() {
        let w = forged(&[
            HardwareSignals::idle(0),
            HardwareSignals::idle(0),
            HardwareSignals::idle(64),
            HardwareSignals::idle(1087),
        ]);
        let v = atomicity(&w);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].tick, 3);
        assert_eq!(controlled_invocation(&w).len(), 1);
    }

    #[test]
    fn staying_in_first_is_not_a_violation() {
        let w = reports(&[
            HardwareSignals::idle(0),
            HardwareSignals::idle(0),
            HardwareSignals::idle(64),
            HardwareSignals::idle(64),
            HardwareSignals::idle(64),
        ]);
        assert_eq!(w.last().unwrap().monitors.atomicity.state, AtomicityState::First);
        assert!(controlled_invocation(&w).is_empty());
    }

    #[test]
    fn round_trip_flags_stuck_guard() {
        let mut w = reports(&[HardwareSignals::idle(0), HardwareSignals::idle(0)]);
        w[1].monitors = Monitors::new();
        let v = round_trip(&w);
        // every guard is still down, secure reset included
        assert_eq!(v.len(), 6);
        assert!(v.iter().all(|v| v.property == Property::RoundTrip));
    }

    #[test]
    fn static_properties_hold_for_default_layout() {
        let l = MemoryLayout::default();
        assert!(immutability(&l));
        assert!(region_exclusivity(&l));
    }

    #[test]
    fn check_trace_summarizes() {
        let l = MemoryLayout::default();
        let s = check_trace(
            &l,
            &[
                HardwareSignals::idle(0),
                HardwareSignals::idle(0),
                HardwareSignals::idle(64),
                HardwareSignals::idle(65),
                HardwareSignals::write(66, 2),
            ],
        )
        .unwrap();
        assert_eq!(s.ticks, 5);
        // the lock table write from ROM is also a leak
        assert_eq!(s.global_resets, 2);
        assert_eq!(s.rata_b_resets, 2);
        assert_eq!(s.lock_table_updates, 1);
    }
}
