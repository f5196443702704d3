//! Container-based pipeline driver.
//!
//! Builds (or reuses) one container image per requested architecture and
//! runs the release pipeline inside it, with the working tree mounted
//! read-write so artifacts land in the shared `dist/` tree on the host.
//! Architectures run strictly one at a time; a failure records the
//! architecture and moves on, and the overall run fails if any did.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::arch::Arch;
use crate::config;
use crate::error::ReleaseError;
use crate::output;

/// Image repository for per-architecture build images.
pub const IMAGE_PREFIX: &str = "bombom-build";

/// Image whose entrypoint registers QEMU binfmt handlers for foreign
/// architectures.
const BINFMT_IMAGE: &str = "tonistiigi/binfmt";

/// Pipeline inputs forwarded from the host environment into the container.
const FORWARDED_ENV: &[&str] = &[
    "OTP_VERSION",
    "OPENSSL_VERSION",
    "MUSL_VERSION",
    "OTP_CDN_BASE_URL",
    "BEAMMACHINE_HOME_URL",
    "REBAR3_URL",
    "OTP_TARBALL_URL",
    "MUSL_SO_URL",
    "OUTPUT",
    "APP_VER",
    "GITHUB_REF_TYPE",
    "GITHUB_REF_NAME",
    "GITHUB_SHA",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct DockerOptions {
    /// Rebuild the image even when it already exists.
    pub rebuild: bool,
}

/// Parse the CLI architecture argument: a single token, or absent meaning
/// every supported architecture.
pub fn parse_arch_list(token: Option<&str>) -> Result<Vec<Arch>, ReleaseError> {
    match token {
        None => Ok(Arch::ALL.to_vec()),
        Some(t) if t.is_empty() => Ok(Arch::ALL.to_vec()),
        Some(t) => t
            .parse::<Arch>()
            .map(|arch| vec![arch])
            .map_err(|_| ReleaseError::InvalidArchitecture(t.to_string())),
    }
}

/// Tag for an architecture's build image.
pub fn image_tag(arch: Arch) -> String {
    format!("{IMAGE_PREFIX}:{}", arch.output())
}

/// Docker platform string for an architecture.
pub fn platform(arch: Arch) -> String {
    format!("linux/{}", arch.output())
}

/// Arguments for `docker build` of an architecture's image.
pub fn build_args(arch: Arch) -> Vec<String> {
    vec![
        "build".to_string(),
        "--platform".to_string(),
        platform(arch),
        "-t".to_string(),
        image_tag(arch),
        ".".to_string(),
    ]
}

/// Arguments for the `docker run` invocation that executes the pipeline
/// inside the container. `env` is the list of forwarded KEY=VALUE pairs.
pub fn run_args(arch: Arch, workdir: &Path, env: &[(String, String)]) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "--platform".to_string(),
        platform(arch),
        "-v".to_string(),
        format!("{}:/work", workdir.display()),
        "-w".to_string(),
        "/work".to_string(),
    ];
    for (key, value) in env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(image_tag(arch));
    args.extend(
        [
            "bombom-release",
            "build",
            "--arch",
            arch.output(),
            "--yes",
        ]
        .map(str::to_string),
    );
    args
}

/// Snapshot the forwarded pipeline variables from the host environment.
fn forwarded_env() -> Vec<(String, String)> {
    FORWARDED_ENV
        .iter()
        .filter_map(|key| config::env_nonempty(key).map(|value| (key.to_string(), value)))
        .collect()
}

// ---------------------------------------------------------------------------
// docker invocation helpers
// ---------------------------------------------------------------------------

/// Run a docker command, streaming its output. Non-zero exit is an error.
fn docker_passthrough(args: &[String]) -> Result<()> {
    let status = Command::new("docker")
        .args(args)
        .status()
        .context("failed to execute docker")?;

    if !status.success() {
        bail!("docker {} failed with {status}", args.join(" "));
    }
    Ok(())
}

/// One record per image in `docker image inspect` output.
#[derive(Debug, Deserialize)]
struct ImageRecord {
    #[serde(rename = "Id")]
    id: String,
}

/// Whether the architecture's build image already exists locally.
///
/// `docker image inspect` exits non-zero for unknown images; a success with
/// a non-empty JSON array means the image can be reused.
fn image_exists(arch: Arch) -> Result<bool> {
    let inspect = Command::new("docker")
        .args(["image", "inspect", &image_tag(arch)])
        .output()
        .context("failed to execute docker image inspect")?;

    if !inspect.status.success() {
        return Ok(false);
    }

    let records: Vec<ImageRecord> = serde_json::from_slice(&inspect.stdout)
        .context("failed to parse docker image inspect output")?;

    match records.first() {
        Some(record) => {
            let short = record.id.trim_start_matches("sha256:");
            output::detail(&format!(
                "reusing image {} ({})",
                image_tag(arch),
                &short[..short.len().min(12)]
            ));
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Register QEMU binfmt handlers so foreign-architecture containers can run.
///
/// Best-effort: registration may already be in place, or the host may not
/// allow privileged containers. Either way the subsequent build will surface
/// a real problem.
fn register_binfmt(arch: Arch) {
    let result = Command::new("docker")
        .args([
            "run",
            "--privileged",
            "--rm",
            BINFMT_IMAGE,
            "--install",
            arch.output(),
        ])
        .output();

    match result {
        Ok(reg) if reg.status.success() => {}
        Ok(reg) => {
            let stderr = String::from_utf8_lossy(&reg.stderr);
            output::note(&format!(
                "binfmt registration for {arch} failed (may already be installed): {}",
                stderr.trim()
            ));
        }
        Err(e) => {
            output::note(&format!("could not run binfmt registration: {e}"));
        }
    }
}

// ---------------------------------------------------------------------------
// Per-architecture loop
// ---------------------------------------------------------------------------

/// Run the containerized pipeline for each architecture in turn.
///
/// Errors are per-architecture: a failure does not stop the remaining
/// architectures, but any failure makes the overall run fail.
pub fn run_for(archs: &[Arch], opts: DockerOptions) -> Result<()> {
    let workdir = std::env::current_dir().context("failed to determine working directory")?;

    let mut failures = 0usize;
    for &arch in archs {
        output::action("Container", &format!("building for {arch}"));
        if let Err(e) = run_one(arch, &workdir, opts) {
            output::fail("Failed", &format!("{arch}: {e:#}"));
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{failures} of {} architecture build(s) failed", archs.len());
    }
    Ok(())
}

fn run_one(arch: Arch, workdir: &Path, opts: DockerOptions) -> Result<()> {
    register_binfmt(arch);

    if opts.rebuild || !image_exists(arch)? {
        docker_passthrough(&build_args(arch))?;
    }

    docker_passthrough(&run_args(arch, workdir, &forwarded_env()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
