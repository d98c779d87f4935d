// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};
use vrased_areas::Addr;

/// One clock tick's worth of observed CPU and DMA signals.
///
/// Omitted fields in a trace file default to zero / deasserted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct HardwareSignals {
    #[serde(default)]
    pub pc: Addr,
    #[serde(default)]
    pub data_addr: Addr,
    #[serde(default)]
    pub read_en: bool,
    #[serde(default)]
    pub write_en: bool,
    #[serde(default)]
    pub dma_addr: Addr,
    #[serde(default)]
    pub dma_en: bool,
}

impl HardwareSignals {
    /// Executing at `pc` with no memory traffic
    pub fn idle(pc: Addr) -> HardwareSignals {
        HardwareSignals {
            pc,
            ..Default::default()
        }
    }

    pub fn read(pc: Addr, data_addr: Addr) -> HardwareSignals {
        HardwareSignals {
            pc,
            data_addr,
            read_en: true,
            ..Default::default()
        }
    }

    pub fn write(pc: Addr, data_addr: Addr) -> HardwareSignals {
        HardwareSignals {
            pc,
            data_addr,
            write_en: true,
            ..Default::default()
        }
    }

    /// Executing at `pc` while a DMA transfer touches `dma_addr`
    pub fn dma(pc: Addr, dma_addr: Addr) -> HardwareSignals {
        HardwareSignals {
            pc,
            dma_addr,
            dma_en: true,
            ..Default::default()
        }
    }

    /// Any memory traffic at all on this tick
    pub fn any_access(&self) -> bool {
        self.read_en || self.write_en || self.dma_en
    }
}
