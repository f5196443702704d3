//! Build parameter resolution: defaults, environment overrides, derived values.
//!
//! All configuration flows through an explicit [`BuildParams`] value assembled
//! once at pipeline start. Process environment is only touched at two
//! boundaries: [`Overrides::from_env`] / [`CiContext::from_env`] read it, and
//! [`BuildParams::publish_to_env_file`] / [`BuildParams::child_env`] write
//! resolved values back out for CI and the downstream build script.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::arch::Arch;
use crate::error::ReleaseError;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default OpenSSL version baked into the OTP tarball query string.
pub const DEFAULT_OPENSSL_VERSION: &str = "3.5.1";

/// Default musl version baked into the OTP tarball query string.
pub const DEFAULT_MUSL_VERSION: &str = "1.2.5";

/// CDN hosting the prebuilt static OTP distributions.
pub const DEFAULT_OTP_CDN_BASE_URL: &str = "https://beam-machine-universal.b-cdn.net";

/// Vendor home page scraped for the musl runtime shared-library link.
pub const DEFAULT_HOME_URL: &str = "https://beammachine.cloud";

/// Canonical rebar3 escript download location.
pub const DEFAULT_REBAR3_URL: &str = "https://s3.amazonaws.com/rebar3/rebar3";

/// Downstream build script invoked with the resolved parameter set.
pub const DEFAULT_BUILD_SCRIPT: &str = "./build.sh";

/// Directory rebar3 is installed into when not already on PATH.
pub const DEFAULT_INSTALL_DIR: &str = "/usr/local/bin";

/// Shared output directory the build script writes into and the pipeline
/// normalizes out of.
pub const DIST_DIR: &str = "dist";

/// Leading segment of produced binary names.
pub const BIN_PREFIX: &str = "bombom";

// ---------------------------------------------------------------------------
// Environment boundary (read side)
// ---------------------------------------------------------------------------

/// Read an environment variable, treating unset and blank as absent.
pub fn env_nonempty(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(_) => None,
    }
}

/// Optional inputs read from the process environment, each falling back to a
/// documented default (or to derivation) when absent.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub otp_version: Option<String>,
    pub openssl_version: Option<String>,
    pub musl_version: Option<String>,
    pub cdn_base_url: Option<String>,
    pub home_url: Option<String>,
    pub rebar3_url: Option<String>,
    pub otp_tarball_url: Option<String>,
    pub musl_so_url: Option<String>,
    pub output: Option<String>,
    pub app_ver: Option<String>,
    pub build_script: Option<String>,
    pub install_dir: Option<String>,
}

impl Overrides {
    /// Snapshot the recognized override variables from the process
    /// environment.
    pub fn from_env() -> Self {
        Self {
            otp_version: env_nonempty("OTP_VERSION"),
            openssl_version: env_nonempty("OPENSSL_VERSION"),
            musl_version: env_nonempty("MUSL_VERSION"),
            cdn_base_url: env_nonempty("OTP_CDN_BASE_URL"),
            home_url: env_nonempty("BEAMMACHINE_HOME_URL"),
            rebar3_url: env_nonempty("REBAR3_URL"),
            otp_tarball_url: env_nonempty("OTP_TARBALL_URL"),
            musl_so_url: env_nonempty("MUSL_SO_URL"),
            output: env_nonempty("OUTPUT"),
            app_ver: env_nonempty("APP_VER"),
            build_script: env_nonempty("BUILD_SCRIPT"),
            install_dir: env_nonempty("REBAR3_INSTALL_DIR"),
        }
    }
}

/// CI workflow context used for version-label derivation and for publishing
/// resolved values back to the workflow environment file.
#[derive(Debug, Clone, Default)]
pub struct CiContext {
    pub ref_type: Option<String>,
    pub ref_name: Option<String>,
    pub sha: Option<String>,
    pub env_file: Option<PathBuf>,
}

impl CiContext {
    /// Snapshot the GitHub Actions context variables.
    pub fn from_env() -> Self {
        Self {
            ref_type: env_nonempty("GITHUB_REF_TYPE"),
            ref_name: env_nonempty("GITHUB_REF_NAME"),
            sha: env_nonempty("GITHUB_SHA"),
            env_file: env_nonempty("GITHUB_ENV").map(PathBuf::from),
        }
    }
}

// ---------------------------------------------------------------------------
// Derivation helpers
// ---------------------------------------------------------------------------

/// Format the OTP runtime tarball download URL.
///
/// Pure string formatting; reachability is the downstream build step's
/// concern, not ours.
pub fn otp_tarball_url(
    cdn_base_url: &str,
    otp_version: &str,
    toolchain_arch: &str,
    openssl_version: &str,
    musl_version: &str,
) -> String {
    let base = cdn_base_url.trim_end_matches('/');
    format!(
        "{base}/OTP-{otp_version}/linux/{toolchain_arch}/any/\
         otp_{otp_version}_linux_any_{toolchain_arch}.tar.gz\
         ?openssl={openssl_version}&musl={musl_version}"
    )
}

/// Default output filename for an architecture.
pub fn output_filename(arch: Arch) -> String {
    format!("{BIN_PREFIX}-linux-{}.bin", arch.output())
}

/// Derive the version label stamped into the build.
///
/// Precedence: explicit `APP_VER` override, then the tag name when running
/// under a tag-triggered workflow, then `dev-` plus the first seven commit
/// characters, then `dev-local`.
pub fn version_label(app_ver: Option<&str>, ci: &CiContext) -> String {
    if let Some(explicit) = app_ver {
        return explicit.to_string();
    }

    if ci.ref_type.as_deref() == Some("tag") {
        if let Some(tag) = ci.ref_name.as_deref() {
            return tag.to_string();
        }
    }

    if let Some(sha) = ci.sha.as_deref() {
        let short = &sha[..sha.len().min(7)];
        return format!("dev-{short}");
    }

    "dev-local".to_string()
}

// ---------------------------------------------------------------------------
// BuildParams
// ---------------------------------------------------------------------------

/// The full parameter set for one architecture's pipeline run.
///
/// Assembled once at orchestration start. `musl_so_url` is the only field
/// filled in later (by the asset resolver) when not overridden; everything
/// else is immutable after [`BuildParams::resolve`].
#[derive(Debug, Clone)]
pub struct BuildParams {
    pub arch: Arch,
    pub otp_version: String,
    pub openssl_version: String,
    pub musl_version: String,
    pub cdn_base_url: String,
    pub home_url: String,
    pub rebar3_url: String,
    pub otp_tarball_url: String,
    pub musl_so_url: Option<String>,
    pub output: String,
    pub app_ver: String,
    pub build_script: PathBuf,
    pub install_dir: PathBuf,
}

impl BuildParams {
    /// Assemble the parameter set from the architecture, the override
    /// snapshot, and the CI context.
    ///
    /// Fails fast when `OTP_VERSION` is absent; every other input has a
    /// default or is derived.
    pub fn resolve(arch: Arch, overrides: &Overrides, ci: &CiContext) -> Result<Self, ReleaseError> {
        let otp_version = overrides
            .otp_version
            .clone()
            .ok_or(ReleaseError::MissingInput("OTP_VERSION"))?;

        let openssl_version = overrides
            .openssl_version
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENSSL_VERSION.to_string());
        let musl_version = overrides
            .musl_version
            .clone()
            .unwrap_or_else(|| DEFAULT_MUSL_VERSION.to_string());
        let cdn_base_url = overrides
            .cdn_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OTP_CDN_BASE_URL.to_string());
        let home_url = overrides
            .home_url
            .clone()
            .unwrap_or_else(|| DEFAULT_HOME_URL.to_string());
        let rebar3_url = overrides
            .rebar3_url
            .clone()
            .unwrap_or_else(|| DEFAULT_REBAR3_URL.to_string());

        let tarball = overrides.otp_tarball_url.clone().unwrap_or_else(|| {
            otp_tarball_url(
                &cdn_base_url,
                &otp_version,
                arch.toolchain(),
                &openssl_version,
                &musl_version,
            )
        });

        let output = overrides
            .output
            .clone()
            .unwrap_or_else(|| output_filename(arch));
        let app_ver = version_label(overrides.app_ver.as_deref(), ci);

        let build_script = PathBuf::from(
            overrides
                .build_script
                .clone()
                .unwrap_or_else(|| DEFAULT_BUILD_SCRIPT.to_string()),
        );
        let install_dir = PathBuf::from(
            overrides
                .install_dir
                .clone()
                .unwrap_or_else(|| DEFAULT_INSTALL_DIR.to_string()),
        );

        Ok(Self {
            arch,
            otp_version,
            openssl_version,
            musl_version,
            cdn_base_url,
            home_url,
            rebar3_url,
            otp_tarball_url: tarball,
            musl_so_url: overrides.musl_so_url.clone(),
            output,
            app_ver,
            build_script,
            install_dir,
        })
    }

    // -----------------------------------------------------------------------
    // Environment boundary (write side)
    // -----------------------------------------------------------------------

    /// The resolved parameter set as `KEY=VALUE` pairs for the downstream
    /// build script's environment.
    pub fn child_env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            ("ARCH_IN".to_string(), self.arch.output().to_string()),
            (
                "TOOLCHAIN_ARCH".to_string(),
                self.arch.toolchain().to_string(),
            ),
            ("OTP_VERSION".to_string(), self.otp_version.clone()),
            ("OPENSSL_VERSION".to_string(), self.openssl_version.clone()),
            ("MUSL_VERSION".to_string(), self.musl_version.clone()),
            ("OTP_CDN_BASE_URL".to_string(), self.cdn_base_url.clone()),
            ("BEAMMACHINE_HOME_URL".to_string(), self.home_url.clone()),
            ("REBAR3_URL".to_string(), self.rebar3_url.clone()),
            ("OTP_TARBALL_URL".to_string(), self.otp_tarball_url.clone()),
            ("OUTPUT".to_string(), self.output.clone()),
            ("APP_VER".to_string(), self.app_ver.clone()),
        ];
        if let Some(musl_so_url) = &self.musl_so_url {
            env.push(("MUSL_SO_URL".to_string(), musl_so_url.clone()));
        }
        env
    }

    /// Append the resolved parameter set as `KEY=VALUE` lines to the CI
    /// environment file, making the values visible to later workflow steps.
    pub fn publish_to_env_file(&self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open CI env file {}", path.display()))?;

        for (key, value) in self.child_env() {
            writeln!(file, "{key}={value}")
                .with_context(|| format!("failed to append to CI env file {}", path.display()))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
