// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration of the emulated CPU.

use thiserror::Error;

/// The emulated CPU model, which gates the available opcodes and some flag refinements.
///
/// Cast to u8 to get the numeric level used by [lookup](crate::isa::lookup).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CpuLevel {
    #[default]
    Mc68000 = 0,
    Mc68010 = 1,
    Mc68020 = 2,
    Mc68030 = 3,
    Mc68040 = 4,
}

impl TryFrom<u8> for CpuLevel {
    type Error = ConfigError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Self::Mc68000),
            1 => Ok(Self::Mc68010),
            2 => Ok(Self::Mc68020),
            3 => Ok(Self::Mc68030),
            4 => Ok(Self::Mc68040),
            _ => Err(ConfigError::CpuLevel(level)),
        }
    }
}

/// Where floating-point (line 1111) opcodes go.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FpuMode {
    /// Every line 1111 opcode raises the Line F Emulator exception.
    #[default]
    Trapped,
    /// Line 1111 opcodes are given to the [Coprocessor](crate::Coprocessor) installed on the core.
    External,
}

/// Errors found while validating a [Config].
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported CPU level {0}, expected 0 to 4")]
    CpuLevel(u8),
    #[error("an external FPU requires a 68020 or later")]
    FpuNeeds68020,
}

/// Configuration of a [Cpu](crate::Cpu).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// The emulated CPU.
    pub cpu_level: CpuLevel,
    /// How line 1111 opcodes are handled.
    pub fpu: FpuMode,
    /// Extra fault-path fidelity: odd branch targets raise the address error at the branch instead of at the fetch.
    ///
    /// Never changes the semantics of instructions that do not fault.
    pub diagnostic_fidelity: bool,
    /// Decodes the 0x7100-0x713F extended opcodes used by the host to patch the ROM.
    pub emul_ops: bool,
}

impl Default for Config {
    /// A plain 68000 without FPU nor extended opcodes.
    fn default() -> Self {
        Self {
            cpu_level: CpuLevel::Mc68000,
            fpu: FpuMode::Trapped,
            diagnostic_fidelity: false,
            emul_ops: false,
        }
    }
}

impl Config {
    /// A configuration suitable to run a Macintosh ROM: extended opcodes enabled.
    pub fn basilisk(cpu_level: CpuLevel) -> Self {
        Self {
            cpu_level,
            emul_ops: true,
            ..Self::default()
        }
    }

    /// The numeric CPU level.
    #[inline(always)]
    pub const fn level(&self) -> u8 {
        self.cpu_level as u8
    }

    /// Checks the consistency of the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fpu == FpuMode::External && self.cpu_level < CpuLevel::Mc68020 {
            return Err(ConfigError::FpuNeeds68020);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_from_raw() {
        assert_eq!(CpuLevel::try_from(3), Ok(CpuLevel::Mc68030));
        assert_eq!(CpuLevel::try_from(5), Err(ConfigError::CpuLevel(5)));
    }

    #[test]
    fn external_fpu_needs_020() {
        let mut config = Config::default();
        config.fpu = FpuMode::External;
        assert_eq!(config.validate(), Err(ConfigError::FpuNeeds68020));
        config.cpu_level = CpuLevel::Mc68040;
        assert_eq!(config.validate(), Ok(()));
    }
}
