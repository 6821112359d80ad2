//! Platform detection and artifact naming
//!
//! Bazel publishes one binary per `(version, os, arch)`; the filename encodes
//! all three so cached downloads never collide.

use crate::error::{BazeliskError, BazeliskResult};

/// Operating systems Bazel publishes binaries for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    MacOS,
    Windows,
}

/// Machine architectures Bazel publishes binaries for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Arm64,
}

/// A concrete `(os, arch)` target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    /// Detect the current platform
    pub fn detect() -> BazeliskResult<Self> {
        let os = match std::env::consts::OS {
            "linux" => Os::Linux,
            "macos" => Os::MacOS,
            "windows" => Os::Windows,
            other => {
                return Err(BazeliskError::UnsupportedPlatform(format!(
                    "operating system \"{}\", must be Linux, macOS or Windows",
                    other
                )))
            }
        };

        let arch = match std::env::consts::ARCH {
            "x86_64" => Arch::X86_64,
            "aarch64" => Arch::Arm64,
            other => {
                return Err(BazeliskError::UnsupportedPlatform(format!(
                    "machine architecture \"{}\", must be x86_64 or arm64",
                    other
                )))
            }
        };

        Ok(Self { os, arch })
    }

    /// OS component of artifact names
    pub fn os_name(&self) -> &'static str {
        match self.os {
            Os::Linux => "linux",
            Os::MacOS => "darwin",
            Os::Windows => "windows",
        }
    }

    /// Architecture component of artifact names
    pub fn machine_name(&self) -> &'static str {
        match self.arch {
            Arch::X86_64 => "x86_64",
            Arch::Arm64 => "arm64",
        }
    }

    /// Suffix of executables on this platform
    pub fn executable_suffix(&self) -> &'static str {
        match self.os {
            Os::Windows => ".exe",
            Os::Linux | Os::MacOS => "",
        }
    }

    /// Name of the platform directory used by CI artifacts built at a commit
    pub fn commit_platform_name(&self) -> &'static str {
        match (self.os, self.arch) {
            (Os::Linux, Arch::X86_64) => "ubuntu1404",
            (Os::Linux, Arch::Arm64) => "ubuntu2004_arm64",
            (Os::MacOS, Arch::X86_64) => "macos",
            (Os::MacOS, Arch::Arm64) => "macos_arm64",
            (Os::Windows, Arch::X86_64) => "windows",
            (Os::Windows, Arch::Arm64) => "windows_arm64",
        }
    }

    /// Published filename: `bazel-<version>-<os>-<arch><suffix>`
    pub fn bazel_filename(&self, version: &str) -> String {
        format!(
            "bazel-{}-{}-{}{}",
            version,
            self.os_name(),
            self.machine_name(),
            self.executable_suffix()
        )
    }

    /// Cache directory name for a version, unique per `(version, platform)`
    pub fn artifact_dir_name(&self, version: &str) -> String {
        format!("bazel-{}-{}-{}", version, self.os_name(), self.machine_name())
    }

    /// Name of the executable inside the cache's `bin` directory
    pub fn executable_name(&self) -> String {
        format!("bazel{}", self.executable_suffix())
    }
}
