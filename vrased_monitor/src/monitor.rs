// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lock-step composition of every guard
//!
//! One [`SecurityMonitor::tick`] classifies the tick's signals once, computes
//! every guard's next value from the previous [`Monitors`] snapshot, and only
//! then replaces the snapshot.  No guard ever sees another guard's next
//! value.
//!
//! The first tick after power-on (or [`SecurityMonitor::reset_to_boot`]) is
//! observed, not applied: it reports the power-on state with every reset
//! asserted.  From the second tick on, each tick's signals drive the
//! transition into the state reported for that tick.

use crate::access_control::{self, AccessControlMonitor};
use crate::atomicity::AtomicityMonitor;
use crate::dma::DmaGuard;
use crate::exclusive_stack::{self, ExclusiveStackMonitor};
use crate::rata::{RataInput, RegionFreshnessMonitor};
use crate::secure_reset::SecureResetMonitor;
use crate::{Error, HardwareSignals};
use log::{debug, trace, warn};
use serde::Serialize;
use vrased_areas::{AddressPredicates, MemoryLayout};

/// Every guard's state for one tick
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Monitors {
    pub access_control: AccessControlMonitor,
    pub atomicity: AtomicityMonitor,
    pub exclusive_stack: ExclusiveStackMonitor,
    pub secure_reset: SecureResetMonitor,
    pub dma: DmaGuard,
    pub rata_b: RegionFreshnessMonitor,
}

impl Monitors {
    pub const fn new() -> Monitors {
        Monitors {
            access_control: AccessControlMonitor::new(),
            atomicity: AtomicityMonitor::new(),
            exclusive_stack: ExclusiveStackMonitor::new(),
            secure_reset: SecureResetMonitor::new(),
            dma: DmaGuard::new(),
            rata_b: RegionFreshnessMonitor::new(),
        }
    }

    fn next(&self, cpu: &AddressPredicates, dma: &AddressPredicates, s: &HardwareSignals) -> Monitors {
        Monitors {
            access_control: self.access_control.step(cpu, s.read_en),
            atomicity: self.atomicity.step(cpu),
            exclusive_stack: self.exclusive_stack.step(cpu, s.read_en, s.write_en),
            secure_reset: self.secure_reset.step(cpu, s),
            dma: self.dma.step(dma, s.dma_en),
            rata_b: self.rata_b.step(&RataInput::new(cpu, dma, s)),
        }
    }

    fn next_exclusive(
        &self,
        cpu: &AddressPredicates,
        dma: &AddressPredicates,
        s: &HardwareSignals,
    ) -> Result<Monitors, Error> {
        Ok(Monitors {
            access_control: self.access_control.step_exclusive(cpu, s.read_en)?,
            atomicity: self.atomicity.step_exclusive(cpu)?,
            exclusive_stack: self
                .exclusive_stack
                .step_exclusive(cpu, s.read_en, s.write_en)?,
            secure_reset: self.secure_reset.step(cpu, s),
            dma: self.dma.step_exclusive(dma, s.dma_en)?,
            rata_b: self.rata_b.step(&RataInput::new(cpu, dma, s)),
        })
    }

    /// OR of every reset that drives the hardware reset line.  RATA-B is
    /// reported on its own and is not part of it.
    pub fn global_reset(&self) -> bool {
        self.access_control.reset()
            || self.atomicity.reset()
            || self.exclusive_stack.reset()
            || self.secure_reset.reset()
            || self.dma.reset()
    }
}

/// Everything observable about one tick
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub signals: HardwareSignals,
    pub cpu: AddressPredicates,
    pub dma: AddressPredicates,
    pub invalid_access_key: bool,
    pub dma_invalid_access_key: bool,
    pub unauthorized_access: bool,
    pub leaky_write: bool,
    pub dma_unauthorized_access: bool,
    pub dma_leaky_write: bool,
    pub monitors: Monitors,
    pub lock_table_updated: bool,
    pub global_reset: bool,
}

impl TickReport {
    fn new(
        tick: u64,
        signals: &HardwareSignals,
        cpu: AddressPredicates,
        dma: AddressPredicates,
        monitors: Monitors,
    ) -> TickReport {
        TickReport {
            tick,
            signals: *signals,
            invalid_access_key: access_control::invalid_access_key(&cpu, signals.read_en),
            dma_invalid_access_key: access_control::invalid_access_key(&dma, signals.dma_en),
            unauthorized_access: exclusive_stack::unauthorized_access(
                &cpu,
                signals.read_en,
                signals.write_en,
            ),
            leaky_write: exclusive_stack::leaky_write(&cpu, signals.write_en),
            dma_unauthorized_access: exclusive_stack::unauthorized_access(
                &dma,
                signals.dma_en,
                signals.dma_en,
            ),
            dma_leaky_write: exclusive_stack::leaky_write(&dma, signals.dma_en),
            cpu,
            dma,
            lock_table_updated: monitors.rata_b.lock_table_updated(),
            global_reset: monitors.global_reset(),
            monitors,
        }
    }

    pub fn rata_b_reset(&self) -> bool {
        self.monitors.rata_b.reset()
    }
}

pub struct SecurityMonitor<'a> {
    layout: &'a MemoryLayout,
    ticks: u64,
    monitors: Monitors,
    last: Option<TickReport>,
}

impl<'a> SecurityMonitor<'a> {
    pub fn new(layout: &'a MemoryLayout) -> SecurityMonitor<'a> {
        SecurityMonitor {
            layout,
            ticks: 0,
            monitors: Monitors::new(),
            last: None,
        }
    }

    /// Number of ticks observed so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn monitors(&self) -> &Monitors {
        &self.monitors
    }

    /// The most recent tick's report; `None` before the first tick
    pub fn report(&self) -> Option<&TickReport> {
        self.last.as_ref()
    }

    pub fn global_reset(&self) -> bool {
        self.monitors.global_reset()
    }

    pub fn rata_b(&self) -> &RegionFreshnessMonitor {
        &self.monitors.rata_b
    }

    /// Back to the power-on state, as after a process restart
    pub fn reset_to_boot(&mut self) {
        self.ticks = 0;
        self.monitors = Monitors::new();
        self.last = None;
    }

    fn classify(&self, s: &HardwareSignals) -> (AddressPredicates, AddressPredicates) {
        (
            self.layout.classify(s.pc, s.data_addr),
            self.layout.classify(s.pc, s.dma_addr),
        )
    }

    /// Advance every guard by one tick
    pub fn tick(&mut self, signals: &HardwareSignals) -> TickReport {
        let (cpu, dma) = self.classify(signals);
        let next = if self.ticks == 0 {
            self.monitors
        } else {
            self.monitors.next(&cpu, &dma, signals)
        };
        self.commit(signals, cpu, dma, next)
    }

    /// Like [`tick`](Self::tick), but fails instead of picking the first
    /// matching rule when a table that should have disjoint guards has two
    /// that disagree.  RATA-B is always resolved by priority.
    pub fn tick_strict(&mut self, signals: &HardwareSignals) -> Result<TickReport, Error> {
        let (cpu, dma) = self.classify(signals);
        let next = if self.ticks == 0 {
            self.monitors
        } else {
            self.monitors.next_exclusive(&cpu, &dma, signals)?
        };
        Ok(self.commit(signals, cpu, dma, next))
    }

    fn commit(
        &mut self,
        signals: &HardwareSignals,
        cpu: AddressPredicates,
        dma: AddressPredicates,
        next: Monitors,
    ) -> TickReport {
        let was_reset = self.monitors.global_reset();
        self.monitors = next;
        let report = TickReport::new(self.ticks, signals, cpu, dma, self.monitors);
        trace!("tick {}: {:?}", self.ticks, signals);
        if report.global_reset && !was_reset {
            warn!("tick {}: reset asserted at pc {:#x}", self.ticks, signals.pc);
        } else if !report.global_reset && was_reset {
            debug!("tick {}: reset released at pc {:#x}", self.ticks, signals.pc);
        }
        self.ticks += 1;
        self.last = Some(report.clone());
        report
    }

    /// Feed a whole trace, collecting one report per tick
    pub fn run<I>(&mut self, trace: I) -> Vec<TickReport>
    where
        I: IntoIterator<Item = HardwareSignals>,
    {
        trace.into_iter().map(|s| self.tick(&s)).collect()
    }

    pub fn run_strict<I>(&mut self, trace: I) -> Result<Vec<TickReport>, Error>
    where
        I: IntoIterator<Item = HardwareSignals>,
    {
        trace.into_iter().map(|s| self.tick_strict(&s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atomicity::AtomicityState;
    use crate::kill_switch::GuardState;
    use crate::rata::RataState;

    #[test]
    fn first_tick_reports_power_on_state() {
        let l = MemoryLayout::default();
        let mut m = SecurityMonitor::new(&l);
        let r = m.tick(&HardwareSignals::idle(0));
        assert_eq!(r.tick, 0);
        assert_eq!(r.monitors, Monitors::new());
        assert!(r.global_reset);
        assert!(r.rata_b_reset());
        assert_eq!(m.report(), Some(&r));
    }

    #[test]
    fn second_quiet_tick_at_reset_vector_boots() {
        let l = MemoryLayout::default();
        let mut m = SecurityMonitor::new(&l);
        m.tick(&HardwareSignals::idle(0));
        let r = m.tick(&HardwareSignals::idle(0));
        assert!(!r.global_reset);
        assert_eq!(r.monitors.access_control.guard.state, GuardState::Run);
        assert_eq!(r.monitors.atomicity.state, AtomicityState::Outside);
        assert_eq!(r.monitors.rata_b.state, RataState::Modified);
        assert!(!r.rata_b_reset());
    }

    #[test]
    fn rata_b_is_not_part_of_global_reset() {
        let l = MemoryLayout::default();
        let mut m = SecurityMonitor::new(&l);
        m.run([HardwareSignals::idle(0), HardwareSignals::idle(0)]);
        let r = m.tick(&HardwareSignals::write(2000, 2));
        assert!(r.rata_b_reset());
        assert!(!r.global_reset);
    }

    #[test]
    fn reset_to_boot_forgets_everything() {
        let l = MemoryLayout::default();
        let mut m = SecurityMonitor::new(&l);
        m.run([HardwareSignals::idle(0), HardwareSignals::idle(0)]);
        assert!(!m.global_reset());
        m.reset_to_boot();
        assert_eq!(m.ticks(), 0);
        assert_eq!(*m.monitors(), Monitors::new());
        assert!(m.report().is_none());
        assert!(m.global_reset());
    }

    #[test]
    fn strict_matches_priority_on_clean_run() {
        let l = MemoryLayout::default();
        let trace: Vec<HardwareSignals> = [0, 0, 64, 65, 66, 1087, 2000]
            .into_iter()
            .map(HardwareSignals::idle)
            .collect();
        let strict = SecurityMonitor::new(&l).run_strict(trace.clone()).unwrap();
        let loose = SecurityMonitor::new(&l).run(trace);
        assert_eq!(strict, loose);
        assert!(!strict.last().unwrap().global_reset);
    }
}
