// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{Addr, MemoryLayout};
use serde::Serialize;
use strum_macros::{Display, EnumIter};

/// Where the program counter sits relative to attestation code
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumIter, Serialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum RomPosition {
    First,
    Mid,
    Last,
    Outside,
}

/// Region membership of one `(pc, data address)` pair.
///
/// Each flag is computed from its own comparison rather than derived from
/// the others, so the rom-position flags can be checked against each other.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AddressPredicates {
    pub pc: Addr,
    pub data_addr: Addr,

    /// `key.min <= data_addr < key.max`.  The upper bound is exclusive, so
    /// the last key address does not count as a key access.
    pub key_access: bool,
    pub data_in_key: bool,
    pub data_in_lock_table: bool,
    pub data_in_hmac_output: bool,
    pub data_in_exclusive_stack: bool,
    pub data_in_attested_region: bool,
    pub data_in_rom: bool,

    pub is_first_rom: bool,
    pub is_mid_rom: bool,
    pub is_last_rom: bool,
    pub is_in_rom: bool,
    pub is_outside_rom: bool,

    pub pc_at_reset: bool,
    pub pc_after_auth: bool,
}

impl AddressPredicates {
    pub fn rom_position(&self) -> RomPosition {
        if self.is_first_rom {
            RomPosition::First
        } else if self.is_mid_rom {
            RomPosition::Mid
        } else if self.is_last_rom {
            RomPosition::Last
        } else {
            RomPosition::Outside
        }
    }
}

impl MemoryLayout {
    pub fn classify(&self, pc: Addr, data_addr: Addr) -> AddressPredicates {
        let rom = self.rom();
        let key = self.key();
        AddressPredicates {
            pc,
            data_addr,
            key_access: data_addr >= key.min && data_addr < key.max,
            data_in_key: key.contains(data_addr),
            data_in_lock_table: self.lock_table().contains(data_addr),
            data_in_hmac_output: self.hmac_output().contains(data_addr),
            data_in_exclusive_stack: self.exclusive_stack().contains(data_addr),
            data_in_attested_region: self.attested_region().contains(data_addr),
            data_in_rom: rom.contains(data_addr),
            is_first_rom: pc == rom.min,
            is_mid_rom: pc > rom.min && pc < rom.max,
            is_last_rom: pc == rom.max,
            is_in_rom: pc >= rom.min && pc <= rom.max,
            is_outside_rom: pc < rom.min || pc > rom.max,
            pc_at_reset: pc == self.reset_address(),
            pc_after_auth: pc == self.after_auth_pc(),
        }
    }

    pub fn rom_position(&self, pc: Addr) -> RomPosition {
        self.classify(pc, 0).rom_position()
    }
}
