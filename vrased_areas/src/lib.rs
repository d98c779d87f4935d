// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Memory layout of the attestation root of trust
//!
//! Every guard in `vrased_monitor` reasons about the same handful of address
//! windows: the secret key, the lock management table, the HMAC output
//! buffer, the stack reserved for attestation code, the attestation code
//! itself and the attested region.  This crate owns those windows, checks
//! that a layout is sane before anything is built on top of it, and maps a
//! `(pc, data address)` pair onto the region predicates the guards consume.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

mod classify;

pub use classify::{AddressPredicates, RomPosition};

/// Addresses are plain 32-bit integers; nothing here assumes a word size.
pub type Addr = u32;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum LayoutError {
    #[error("{kind} is empty: max {max:#x} is below min {min:#x}")]
    EmptyRegion { kind: RegionKind, min: Addr, max: Addr },

    #[error("{kind} has a size of zero")]
    ZeroSize { kind: RegionKind },

    #[error("{kind} at {base:#x} with size {size:#x} does not fit in the address space")]
    RegionOverflow {
        kind: RegionKind,
        base: Addr,
        size: Addr,
    },

    #[error("{first} [{:#x}, {:#x}] overlaps {second} [{:#x}, {:#x}]",
        .first_region.min, .first_region.max, .second_region.min, .second_region.max)]
    Overlap {
        first: RegionKind,
        first_region: Region,
        second: RegionKind,
        second_region: Region,
    },

    #[error("ROM must span at least 3 addresses (first, middle, last), got {size}")]
    RomTooSmall { size: u64 },

    #[error("after-auth pc {pc:#x} is outside ROM [{:#x}, {:#x}]", .rom.min, .rom.max)]
    AfterAuthOutsideRom { pc: Addr, rom: Region },

    #[error("reset vector {addr:#x} lies inside ROM [{:#x}, {:#x}]", .rom.min, .rom.max)]
    ResetVectorInRom { addr: Addr, rom: Region },
}

/// Names of the protected windows, used in diagnostics and reports
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumIter, EnumString, Serialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum RegionKind {
    LockTable,
    Key,
    HmacOutput,
    ExclusiveStack,
    Rom,
    AttestedRegion,
}

/// An inclusive address window `[min, max]`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Region {
    pub min: Addr,
    pub max: Addr,
}

impl Region {
    pub const fn new(min: Addr, max: Addr) -> Region {
        Region { min, max }
    }

    /// Builds `[base, base + size - 1]`.
    pub fn from_base_size(kind: RegionKind, base: Addr, size: Addr) -> Result<Region, LayoutError> {
        if size == 0 {
            return Err(LayoutError::ZeroSize { kind });
        }
        let max = base
            .checked_add(size - 1)
            .ok_or(LayoutError::RegionOverflow { kind, base, size })?;
        Ok(Region { min: base, max })
    }

    pub fn contains(&self, addr: Addr) -> bool {
        addr >= self.min && addr <= self.max
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        self.min <= other.max && other.min <= self.max
    }

    /// Number of addresses covered; `u64` so that `[0, u32::MAX]` fits.
    pub fn size(&self) -> u64 {
        u64::from(self.max) - u64::from(self.min) + 1
    }
}

// Default layout of the reference design
pub const LOCK_TABLE: Region = Region::new(2, 3);
pub const KEY_MIN: Addr = 4;
pub const KEY_SIZE: Addr = 4;
pub const HMAC_OUTPUT: Region = Region::new(8, 9);
pub const EXCLUSIVE_STACK: Region = Region::new(32, 63);
pub const ROM_MIN: Addr = 64;
pub const ROM_SIZE: Addr = 1024;
pub const AFTER_AUTH_PC: Addr = 65;
pub const ATTESTED_REGION: Region = Region::new(1088, 1344);
pub const RESET_ADDRESS: Addr = 0;

/// A validated memory layout.
///
/// The fields are private so that every `MemoryLayout` in existence has gone
/// through [`MemoryLayout::new`]; the guards rely on the regions being
/// pairwise disjoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MemoryLayout {
    lock_table: Region,
    key: Region,
    hmac_output: Region,
    exclusive_stack: Region,
    rom: Region,
    attested_region: Region,
    reset_address: Addr,
    after_auth_pc: Addr,
}

impl Default for MemoryLayout {
    fn default() -> MemoryLayout {
        MemoryLayout {
            lock_table: LOCK_TABLE,
            key: Region::new(KEY_MIN, KEY_MIN + KEY_SIZE - 1),
            hmac_output: HMAC_OUTPUT,
            exclusive_stack: EXCLUSIVE_STACK,
            rom: Region::new(ROM_MIN, ROM_MIN + ROM_SIZE - 1),
            attested_region: ATTESTED_REGION,
            reset_address: RESET_ADDRESS,
            after_auth_pc: AFTER_AUTH_PC,
        }
    }
}

impl MemoryLayout {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lock_table: Region,
        key: Region,
        hmac_output: Region,
        exclusive_stack: Region,
        rom: Region,
        attested_region: Region,
        reset_address: Addr,
        after_auth_pc: Addr,
    ) -> Result<MemoryLayout, LayoutError> {
        let layout = MemoryLayout {
            lock_table,
            key,
            hmac_output,
            exclusive_stack,
            rom,
            attested_region,
            reset_address,
            after_auth_pc,
        };
        layout.validate()?;
        Ok(layout)
    }

    fn validate(&self) -> Result<(), LayoutError> {
        let regions = self.regions();
        for (kind, r) in regions {
            if r.max < r.min {
                return Err(LayoutError::EmptyRegion {
                    kind,
                    min: r.min,
                    max: r.max,
                });
            }
        }
        for (i, (first, a)) in regions.iter().enumerate() {
            for (second, b) in &regions[i + 1..] {
                if a.overlaps(b) {
                    return Err(LayoutError::Overlap {
                        first: *first,
                        first_region: *a,
                        second: *second,
                        second_region: *b,
                    });
                }
            }
        }
        if self.rom.size() < 3 {
            return Err(LayoutError::RomTooSmall {
                size: self.rom.size(),
            });
        }
        if !self.rom.contains(self.after_auth_pc) {
            return Err(LayoutError::AfterAuthOutsideRom {
                pc: self.after_auth_pc,
                rom: self.rom,
            });
        }
        if self.rom.contains(self.reset_address) {
            return Err(LayoutError::ResetVectorInRom {
                addr: self.reset_address,
                rom: self.rom,
            });
        }
        Ok(())
    }

    /// Every protected window, in a fixed order
    pub fn regions(&self) -> [(RegionKind, Region); 6] {
        [
            (RegionKind::LockTable, self.lock_table),
            (RegionKind::Key, self.key),
            (RegionKind::HmacOutput, self.hmac_output),
            (RegionKind::ExclusiveStack, self.exclusive_stack),
            (RegionKind::Rom, self.rom),
            (RegionKind::AttestedRegion, self.attested_region),
        ]
    }

    pub fn region(&self, kind: RegionKind) -> Region {
        match kind {
            RegionKind::LockTable => self.lock_table,
            RegionKind::Key => self.key,
            RegionKind::HmacOutput => self.hmac_output,
            RegionKind::ExclusiveStack => self.exclusive_stack,
            RegionKind::Rom => self.rom,
            RegionKind::AttestedRegion => self.attested_region,
        }
    }

    pub fn lock_table(&self) -> Region {
        self.lock_table
    }

    pub fn key(&self) -> Region {
        self.key
    }

    pub fn hmac_output(&self) -> Region {
        self.hmac_output
    }

    pub fn exclusive_stack(&self) -> Region {
        self.exclusive_stack
    }

    pub fn rom(&self) -> Region {
        self.rom
    }

    pub fn attested_region(&self) -> Region {
        self.attested_region
    }

    pub fn reset_address(&self) -> Addr {
        self.reset_address
    }

    pub fn after_auth_pc(&self) -> Addr {
        self.after_auth_pc
    }

    /// True when no data region shares an address with ROM, so a data
    /// access can never land on attestation code.
    pub fn data_regions_exclude_rom(&self) -> bool {
        self.regions()
            .iter()
            .filter(|(kind, _)| *kind != RegionKind::Rom)
            .all(|(_, r)| !r.overlaps(&self.rom))
    }

    pub fn regions_pairwise_disjoint(&self) -> bool {
        let regions = self.regions();
        regions
            .iter()
            .enumerate()
            .all(|(i, (_, a))| regions[i + 1..].iter().all(|(_, b)| !a.overlaps(b)))
    }
}

/// Layout overrides, as read from a TOML file.
///
/// Anything left out keeps the reference value.  ROM and key are described
/// by base and size; the other windows are given as explicit inclusive
/// bounds.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LayoutConfig {
    pub rom_min: Option<Addr>,
    pub rom_size: Option<Addr>,
    pub key_min: Option<Addr>,
    pub key_size: Option<Addr>,
    pub lock_table: Option<Region>,
    pub hmac_output: Option<Region>,
    pub exclusive_stack: Option<Region>,
    pub attested_region: Option<Region>,
    pub reset_address: Option<Addr>,
    pub after_auth_pc: Option<Addr>,
}

impl LayoutConfig {
    pub fn build(&self) -> Result<MemoryLayout, LayoutError> {
        let rom = Region::from_base_size(
            RegionKind::Rom,
            self.rom_min.unwrap_or(ROM_MIN),
            self.rom_size.unwrap_or(ROM_SIZE),
        )?;
        let key = Region::from_base_size(
            RegionKind::Key,
            self.key_min.unwrap_or(KEY_MIN),
            self.key_size.unwrap_or(KEY_SIZE),
        )?;
        MemoryLayout::new(
            self.lock_table.unwrap_or(LOCK_TABLE),
            key,
            self.hmac_output.unwrap_or(HMAC_OUTPUT),
            self.exclusive_stack.unwrap_or(EXCLUSIVE_STACK),
            rom,
            self.attested_region.unwrap_or(ATTESTED_REGION),
            self.reset_address.unwrap_or(RESET_ADDRESS),
            self.after_auth_pc.unwrap_or(AFTER_AUTH_PC),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn default_layout_matches_reference_design() {
        let l = MemoryLayout::default();
        assert_eq!(l.lock_table(), Region::new(2, 3));
        assert_eq!(l.key(), Region::new(4, 7));
        assert_eq!(l.hmac_output(), Region::new(8, 9));
        assert_eq!(l.exclusive_stack(), Region::new(32, 63));
        assert_eq!(l.rom(), Region::new(64, 1087));
        assert_eq!(l.rom().size(), 1024);
        assert_eq!(l.attested_region(), Region::new(1088, 1344));
        assert_eq!(l.after_auth_pc(), 65);
        assert_eq!(l.reset_address(), 0);
    }

    #[test]
    fn default_layout_validates() {
        let l = MemoryLayout::default();
        assert_eq!(l.validate(), Ok(()));
        assert!(l.regions_pairwise_disjoint());
        assert!(l.data_regions_exclude_rom());
        assert_eq!(LayoutConfig::default().build(), Ok(l));
    }

    #[test]
    fn every_region_kind_is_listed_once() {
        let l = MemoryLayout::default();
        for kind in RegionKind::iter() {
            assert_eq!(l.regions().iter().filter(|(k, _)| *k == kind).count(), 1);
            assert!(l.regions().contains(&(kind, l.region(kind))));
        }
    }

    #[test]
    fn region_kind_names_parse() {
        use std::str::FromStr;
        let l = MemoryLayout::default();
        let kind = RegionKind::from_str("attested-region").unwrap();
        assert_eq!(kind, RegionKind::AttestedRegion);
        assert_eq!(l.region(kind), Region::new(1088, 1344));
        assert_eq!(RegionKind::from_str("hmac-output"), Ok(RegionKind::HmacOutput));
        assert!(RegionKind::from_str("attested_region").is_err());
        for kind in RegionKind::iter() {
            assert_eq!(RegionKind::from_str(&kind.to_string()), Ok(kind));
        }
    }

    // The attested region ends at min + size rather than min + size - 1;
    // both ends are kept as the reference design states them.
    #[test]
    fn attested_region_spans_257_addresses() {
        assert_eq!(ATTESTED_REGION.size(), 257);
        assert!(ATTESTED_REGION.contains(1344));
        assert!(!ATTESTED_REGION.contains(1345));
    }

    #[test]
    fn overlap_is_rejected() {
        let cfg = LayoutConfig {
            exclusive_stack: Some(Region::new(9, 40)),
            ..Default::default()
        };
        assert_eq!(
            cfg.build(),
            Err(LayoutError::Overlap {
                first: RegionKind::HmacOutput,
                first_region: HMAC_OUTPUT,
                second: RegionKind::ExclusiveStack,
                second_region: Region::new(9, 40),
            })
        );
    }

    #[test]
    fn attested_region_overlapping_rom_is_rejected() {
        let cfg = LayoutConfig {
            attested_region: Some(Region::new(1087, 1344)),
            ..Default::default()
        };
        assert!(matches!(
            cfg.build(),
            Err(LayoutError::Overlap {
                first: RegionKind::Rom,
                second: RegionKind::AttestedRegion,
                ..
            })
        ));
    }

    #[test]
    fn inverted_region_is_rejected() {
        let cfg = LayoutConfig {
            lock_table: Some(Region::new(3, 2)),
            ..Default::default()
        };
        assert_eq!(
            cfg.build(),
            Err(LayoutError::EmptyRegion {
                kind: RegionKind::LockTable,
                min: 3,
                max: 2
            })
        );
    }

    #[test]
    fn size_options_derive_inclusive_ends() {
        let cfg = LayoutConfig {
            rom_size: Some(512),
            key_size: Some(2),
            ..Default::default()
        };
        let l = cfg.build().unwrap();
        assert_eq!(l.rom(), Region::new(64, 575));
        assert_eq!(l.key(), Region::new(4, 5));
    }

    #[test]
    fn bad_sizes_are_rejected() {
        let zero = LayoutConfig {
            key_size: Some(0),
            ..Default::default()
        };
        assert_eq!(
            zero.build(),
            Err(LayoutError::ZeroSize {
                kind: RegionKind::Key
            })
        );

        let tiny = LayoutConfig {
            rom_size: Some(2),
            after_auth_pc: Some(64),
            ..Default::default()
        };
        assert_eq!(tiny.build(), Err(LayoutError::RomTooSmall { size: 2 }));

        let wrap = LayoutConfig {
            rom_min: Some(u32::MAX - 4),
            ..Default::default()
        };
        assert!(matches!(
            wrap.build(),
            Err(LayoutError::RegionOverflow {
                kind: RegionKind::Rom,
                ..
            })
        ));
    }

    #[test]
    fn control_addresses_are_checked() {
        let after_auth = LayoutConfig {
            after_auth_pc: Some(2000),
            ..Default::default()
        };
        assert!(matches!(
            after_auth.build(),
            Err(LayoutError::AfterAuthOutsideRom { pc: 2000, .. })
        ));

        let reset = LayoutConfig {
            reset_address: Some(100),
            ..Default::default()
        };
        assert!(matches!(
            reset.build(),
            Err(LayoutError::ResetVectorInRom { addr: 100, .. })
        ));
    }

    #[test]
    fn config_parses_from_toml() {
        let cfg: LayoutConfig = toml::from_str(
            r#"
            rom-size = 2048
            key-min = 16
            key-size = 8
            attested-region = { min = 2200, max = 2400 }
            "#,
        )
        .unwrap();
        let l = cfg.build().unwrap();
        assert_eq!(l.rom(), Region::new(64, 2111));
        assert_eq!(l.key(), Region::new(16, 23));
        assert_eq!(l.attested_region(), Region::new(2200, 2400));
    }

    #[test]
    fn config_rejects_unknown_keys() {
        assert!(toml::from_str::<LayoutConfig>("rom-length = 4").is_err());
    }
}
