//! CPU architecture (ABI) types and device environment

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Android ABIs an artifact can be built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Abi {
    /// 64-bit ARM
    #[serde(rename = "arm64-v8a")]
    Arm64V8a,
    /// 32-bit ARM
    #[serde(rename = "armeabi-v7a")]
    ArmeabiV7a,
    /// 64-bit x86
    #[serde(rename = "x86_64")]
    X86_64,
    /// 32-bit x86
    #[serde(rename = "x86")]
    X86,
}

impl Abi {
    /// Returns the canonical Android name of this ABI
    pub fn as_str(&self) -> &'static str {
        match self {
            Abi::Arm64V8a => "arm64-v8a",
            Abi::ArmeabiV7a => "armeabi-v7a",
            Abi::X86_64 => "x86_64",
            Abi::X86 => "x86",
        }
    }

    pub fn is_64bit(&self) -> bool {
        matches!(self, Abi::Arm64V8a | Abi::X86_64)
    }

    /// Returns all ABIs, 64-bit ARM first
    pub fn all() -> &'static [Abi] {
        &[Abi::Arm64V8a, Abi::ArmeabiV7a, Abi::X86_64, Abi::X86]
    }

    /// ABIs a machine with the given `std::env::consts::ARCH` can run
    pub fn for_arch(arch: &str) -> Vec<Abi> {
        match arch {
            "aarch64" => vec![Abi::Arm64V8a, Abi::ArmeabiV7a],
            "arm" => vec![Abi::ArmeabiV7a],
            "x86_64" => vec![Abi::X86_64, Abi::X86],
            "x86" => vec![Abi::X86],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Abi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Abi {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Abi::all()
            .iter()
            .copied()
            .find(|abi| abi.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownAbi {
                value: s.to_string(),
            })
    }
}

/// Properties of the device the updates are meant for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEnvironment {
    /// Supported ABIs in order of preference
    pub abis: Vec<Abi>,
    /// Platform API level
    pub api_level: u32,
    /// Prefer 32-bit builds even on 64-bit devices
    pub prefer_32bit: bool,
}

impl DeviceEnvironment {
    pub fn new(abis: Vec<Abi>, api_level: u32) -> Self {
        Self {
            abis,
            api_level,
            prefer_32bit: false,
        }
    }

    pub fn with_prefer_32bit(mut self, prefer_32bit: bool) -> Self {
        self.prefer_32bit = prefer_32bit;
        self
    }

    /// Pick the best ABI of the device that the app is built for
    ///
    /// Device order wins; with `prefer_32bit` a supported 32-bit ABI is
    /// taken over any 64-bit one.
    pub fn best_abi(&self, supported: &[Abi]) -> Option<Abi> {
        let mut candidates = self.abis.iter().copied().filter(|abi| supported.contains(abi));
        if self.prefer_32bit {
            let all: Vec<Abi> = candidates.collect();
            return all
                .iter()
                .copied()
                .find(|abi| !abi.is_64bit())
                .or_else(|| all.first().copied());
        }
        candidates.next()
    }

    /// Human readable list of the device ABIs
    pub fn abi_list(&self) -> String {
        self.abis
            .iter()
            .map(Abi::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
