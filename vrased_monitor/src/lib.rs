// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cycle-synchronous guards for a VRASED-style attestation root of trust.
//!
//! Each guard is a small automaton that is advanced once per clock tick from
//! the same snapshot of CPU and DMA signals.  [`monitor::SecurityMonitor`]
//! composes them and reports the hardware reset they would force.

pub mod access_control;
pub mod atomicity;
pub mod dma;
pub mod exclusive_stack;
pub mod kill_switch;
pub mod monitor;
pub mod properties;
pub mod rata;
pub mod secure_reset;
pub mod signals;
pub mod table;
pub mod trace;

pub use monitor::{SecurityMonitor, TickReport};
pub use signals::HardwareSignals;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("property check failed; see log for details")]
    CheckFailed,

    #[error("invalid memory layout: {0}")]
    LayoutError(#[from] vrased_areas::LayoutError),

    #[error("ambiguous transition in {table} from {state}: rules {rules:?} disagree")]
    AmbiguousTransition {
        table: &'static str,
        state: String,
        rules: Vec<&'static str>,
    },

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("struct packing error: {0}")]
    PackingError(#[from] packed_struct::PackingError),

    #[error("trace record {index} is truncated: got {len} of {} bytes", trace::RECORD_SIZE)]
    TruncatedRecord { index: u64, len: usize },

    #[error("trace record {index} sets reserved flag bits: {flags:#04x}")]
    ReservedFlags { index: u64, flags: u8 },

    #[error("cannot tell the trace format of {0:?}; pass it explicitly")]
    UnknownTraceFormat(std::path::PathBuf),
}
