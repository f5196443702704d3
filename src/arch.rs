//! Logical build architectures and their vendor-specific identifiers.
//!
//! Every architecture-dependent string in the pipeline derives from the
//! `Arch` enum: the toolchain identifier used in OTP download URLs, the
//! output identifier used in artifact names and directory layout, and the
//! needle used to match assets on the vendor page.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;

use crate::error::ReleaseError;

/// A supported build architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Arch {
    Amd64,
    Arm64,
}

impl Arch {
    /// All supported architectures, in the order the container runner
    /// iterates them when none is requested explicitly.
    pub const ALL: [Arch; 2] = [Arch::Amd64, Arch::Arm64];

    /// The architecture string expected by the OTP distribution vendor.
    pub fn toolchain(self) -> &'static str {
        match self {
            Arch::Amd64 => "x86_64",
            Arch::Arm64 => "aarch64",
        }
    }

    /// The architecture segment used in output filenames and `dist/`
    /// subdirectories.
    pub fn output(self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
        }
    }

    /// The substring used to match an architecture-specific asset when
    /// scraping the vendor page.
    pub fn needle(self) -> &'static str {
        match self {
            Arch::Amd64 => "x86_64",
            Arch::Arm64 => "aarch64",
        }
    }

    /// Infer the architecture from a target triple's leading segment
    /// (e.g., "x86_64-unknown-linux-gnu" → amd64).
    ///
    /// Used to default a local `build` invocation to the host architecture.
    /// An explicit `--arch` or `ARCH_IN` always takes precedence.
    pub fn from_target_triple(triple: &str) -> Result<Self, ReleaseError> {
        match triple.split('-').next() {
            Some("x86_64") => Ok(Arch::Amd64),
            Some("aarch64") => Ok(Arch::Arm64),
            _ => Err(ReleaseError::UnsupportedArchitecture(triple.to_string())),
        }
    }
}

impl FromStr for Arch {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amd64" => Ok(Arch::Amd64),
            "arm64" => Ok(Arch::Arm64),
            other => Err(ReleaseError::UnsupportedArchitecture(other.to_string())),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.output())
    }
}
