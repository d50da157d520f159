// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pending interrupt flags, set by the device emulation and sampled by the core.

use bitflags::bitflags;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

bitflags! {
    /// The interrupt sources of a Macintosh emulator.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct IntFlag: u32 {
        /// 60.15Hz VBL.
        const VBL_60HZ = 1;
        /// One-second interrupt.
        const ONE_HZ = 2;
        const SERIAL = 4;
        const ETHER = 8;
        /// Audio block read.
        const AUDIO = 16;
        /// Time Manager.
        const TIMER = 32;
        const ADB = 64;
        const NMI = 128;
    }
}

/// Something the core can ask for the level of the highest pending interrupt.
pub trait InterruptSource {
    /// Returns the level (1 to 7) of the highest pending interrupt, or 0 if none is pending.
    fn pending_level(&self) -> u8;
}

/// Shared handle to the pending interrupt bitmask.
///
/// Clones share the same flags, so a device thread can set a flag that the core samples before its next instruction.
/// All the device interrupts are multiplexed on level 1, and NMI uses level 7.
#[derive(Clone, Debug, Default)]
pub struct InterruptFlags(Arc<AtomicU32>);

impl InterruptFlags {
    /// Creates a new handle with no interrupt pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the given sources as pending.
    pub fn set(&self, flags: IntFlag) {
        self.0.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    /// Acknowledges the given sources.
    pub fn clear(&self, flags: IntFlag) {
        self.0.fetch_and(!flags.bits(), Ordering::AcqRel);
    }

    /// The currently pending sources.
    pub fn pending(&self) -> IntFlag {
        IntFlag::from_bits_truncate(self.0.load(Ordering::Acquire))
    }
}

impl InterruptSource for InterruptFlags {
    fn pending_level(&self) -> u8 {
        let pending = self.pending();
        if pending.contains(IntFlag::NMI) {
            7
        } else if !pending.is_empty() {
            1
        } else {
            0
        }
    }
}
