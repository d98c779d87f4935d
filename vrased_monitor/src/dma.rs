// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The key and stack guards, wired a second time to the DMA bus.
//!
//! A DMA transfer is treated as both a read and a write.  While the pc is
//! outside ROM, DMA into the key or the exclusive stack is a violation.
//! While ROM runs, DMA anywhere outside the exclusive stack and the HMAC
//! output counts as a leak.  DMA into the exclusive stack while ROM runs is
//! not caught by either guard.

use crate::access_control::AccessControlMonitor;
use crate::exclusive_stack::ExclusiveStackMonitor;
use crate::Error;
use serde::Serialize;
use vrased_areas::AddressPredicates;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DmaGuard {
    pub access_control: AccessControlMonitor,
    pub exclusive_stack: ExclusiveStackMonitor,
}

impl DmaGuard {
    pub const fn new() -> DmaGuard {
        DmaGuard {
            access_control: AccessControlMonitor::new(),
            exclusive_stack: ExclusiveStackMonitor::new(),
        }
    }

    /// `dma` is the classification of `(pc, dma_addr)`.
    pub fn step(&self, dma: &AddressPredicates, dma_en: bool) -> DmaGuard {
        DmaGuard {
            access_control: self.access_control.step(dma, dma_en),
            exclusive_stack: self.exclusive_stack.step(dma, dma_en, dma_en),
        }
    }

    pub fn step_exclusive(&self, dma: &AddressPredicates, dma_en: bool) -> Result<DmaGuard, Error> {
        Ok(DmaGuard {
            access_control: self.access_control.step_exclusive(dma, dma_en)?,
            exclusive_stack: self.exclusive_stack.step_exclusive(dma, dma_en, dma_en)?,
        })
    }

    pub fn reset(&self) -> bool {
        self.access_control.reset() || self.exclusive_stack.reset()
    }
}
