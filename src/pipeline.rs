//! The per-architecture release pipeline.
//!
//! Sequences parameter resolution, runtime asset resolution, tool bootstrap,
//! the downstream build script, and artifact normalization. Every step is
//! fatal on failure; nothing is retried here (the HTTP layer owns the only
//! retry budget) and no partial-success state is reported.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};

use crate::arch::Arch;
use crate::bootstrap::{self, Installer, SystemInstaller};
use crate::config::{BuildParams, CiContext, DIST_DIR, Overrides};
use crate::error::ReleaseError;
use crate::output;
use crate::resolver;

/// Files produced by one architecture's run, after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    pub binary: PathBuf,
    pub checksum: Option<PathBuf>,
}

/// Run the pipeline for one architecture in the current directory, reading
/// overrides and CI context from the process environment.
pub fn run(arch: Arch, assume_yes: bool) -> Result<ArtifactSet> {
    let overrides = Overrides::from_env();
    let ci = CiContext::from_env();
    let installer = SystemInstaller { assume_yes };
    run_with(arch, &overrides, &ci, &installer, Path::new("."))
}

/// Pipeline core with injected inputs, used directly by tests.
pub fn run_with(
    arch: Arch,
    overrides: &Overrides,
    ci: &CiContext,
    installer: &dyn Installer,
    workdir: &Path,
) -> Result<ArtifactSet> {
    let mut params = BuildParams::resolve(arch, overrides, ci)?;
    output::action(
        "Release",
        &format!("{} for {}", params.app_ver, params.arch),
    );
    output::detail(&format!("otp tarball: {}", params.otp_tarball_url));

    if params.musl_so_url.is_none() {
        let asset = resolver::resolve_runtime_url(&params.home_url, arch.needle())?;
        params.musl_so_url = Some(asset);
    }
    // Parameter set is complete and frozen from here on.
    let params = params;
    if let Some(asset) = &params.musl_so_url {
        output::detail(&format!("musl runtime: {asset}"));
    }

    bootstrap::ensure_rebar3(&params, installer)?;

    if let Some(env_file) = &ci.env_file {
        params.publish_to_env_file(env_file)?;
    }

    run_build_script(&params, workdir)?;
    normalize_artifacts(&params, workdir)
}

/// Invoke the downstream build script with the resolved parameter set in its
/// environment. Its exit status is the sole success signal; any non-zero
/// status fails the run unretried.
fn run_build_script(params: &BuildParams, workdir: &Path) -> Result<()> {
    let script = workdir.join(&params.build_script);
    output::action("Build", &params.build_script.display().to_string());

    let status = Command::new(&script)
        .current_dir(workdir)
        .envs(params.child_env())
        .status()
        .with_context(|| format!("failed to execute build script {}", script.display()))?;

    if !status.success() {
        bail!(
            "build script {} exited with {status}",
            params.build_script.display()
        );
    }
    Ok(())
}

/// Move the produced binary (and its optional checksum sidecar) from the
/// shared output directory into the architecture-named subdirectory.
fn normalize_artifacts(params: &BuildParams, workdir: &Path) -> Result<ArtifactSet> {
    let dist = workdir.join(DIST_DIR);
    let produced = dist.join(&params.output);

    if !produced.is_file() {
        return Err(ReleaseError::ArtifactMissing(produced).into());
    }

    let sidecar_name = format!("{}.sha256", params.output);
    let sidecar = dist.join(&sidecar_name);
    let has_sidecar = sidecar.is_file();
    if has_sidecar {
        verify_sidecar(&produced, &sidecar)?;
    }

    let arch_dir = dist.join(params.arch.output());
    std::fs::create_dir_all(&arch_dir)
        .with_context(|| format!("failed to create {}", arch_dir.display()))?;

    let binary_dest = arch_dir.join(&params.output);
    std::fs::rename(&produced, &binary_dest).with_context(|| {
        format!(
            "failed to move {} to {}",
            produced.display(),
            binary_dest.display()
        )
    })?;

    let checksum = if has_sidecar {
        let sidecar_dest = arch_dir.join(&sidecar_name);
        std::fs::rename(&sidecar, &sidecar_dest).with_context(|| {
            format!(
                "failed to move {} to {}",
                sidecar.display(),
                sidecar_dest.display()
            )
        })?;
        Some(sidecar_dest)
    } else {
        None
    };

    output::success("Done", &binary_dest.display().to_string());
    Ok(ArtifactSet {
        binary: binary_dest,
        checksum,
    })
}

/// Check the `.sha256` sidecar against the binary it describes.
///
/// Accepts both a bare hash and the GNU coreutils `<hash>  <filename>`
/// line format. A present-but-wrong sidecar is treated as corruption and
/// aborts normalization.
fn verify_sidecar(binary: &Path, sidecar: &Path) -> Result<()> {
    let content = std::fs::read_to_string(sidecar)
        .with_context(|| format!("failed to read checksum sidecar {}", sidecar.display()))?;

    let expected = content
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_lowercase();

    if expected.len() != 64 || !expected.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!(
            "checksum sidecar {} does not contain a SHA256 hash",
            sidecar.display()
        );
    }

    let actual = sha256_file(binary)?;
    if actual != expected {
        bail!(
            "checksum mismatch for {}:\nexpected: {expected}\nactual:   {actual}",
            binary.display()
        );
    }
    Ok(())
}

/// SHA256 of a file as a lowercase hex string, streaming.
fn sha256_file(path: &Path) -> Result<String> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)
        .with_context(|| format!("failed to open file for checksum: {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("failed to read file for checksum: {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::output_filename;

    fn params_for(arch: Arch, workdir: &Path) -> BuildParams {
        let overrides = Overrides {
            otp_version: Some("27.2".to_string()),
            install_dir: Some(workdir.display().to_string()),
            ..Overrides::default()
        };
        BuildParams::resolve(arch, &overrides, &CiContext::default()).unwrap()
    }

    fn write_artifact(workdir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let dist = workdir.join(DIST_DIR);
        std::fs::create_dir_all(&dist).unwrap();
        let path = dist.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    // -- sha256_file ---------------------------------------------------------

    #[test]
    fn sha256_of_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known.bin");
        std::fs::write(&path, b"hello world").unwrap();

        assert_eq!(
            sha256_file(&path).unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn sha256_of_missing_file_errors() {
        assert!(sha256_file(Path::new("/nonexistent/file")).is_err());
    }

    // -- normalize_artifacts -------------------------------------------------

    #[test]
    fn normalize_moves_binary_into_arch_directory() {
        let dir = tempfile::tempdir().unwrap();
        let params = params_for(Arch::Amd64, dir.path());
        let produced = write_artifact(dir.path(), &params.output, b"binary");

        let artifacts = normalize_artifacts(&params, dir.path()).unwrap();

        let expected = dir
            .path()
            .join(DIST_DIR)
            .join("amd64")
            .join(output_filename(Arch::Amd64));
        assert_eq!(artifacts.binary, expected);
        assert!(expected.is_file());
        assert!(!produced.exists(), "pre-move location must be emptied");
        assert!(artifacts.checksum.is_none());
    }

    #[test]
    fn normalize_moves_sidecar_alongside_binary() {
        let dir = tempfile::tempdir().unwrap();
        let params = params_for(Arch::Arm64, dir.path());
        let produced = write_artifact(dir.path(), &params.output, b"hello world");
        write_artifact(
            dir.path(),
            &format!("{}.sha256", params.output),
            format!(
                "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9  {}\n",
                params.output
            )
            .as_bytes(),
        );

        let artifacts = normalize_artifacts(&params, dir.path()).unwrap();

        let arch_dir = dir.path().join(DIST_DIR).join("arm64");
        assert_eq!(
            artifacts.checksum,
            Some(arch_dir.join(format!("{}.sha256", params.output)))
        );
        assert!(artifacts.checksum.as_ref().unwrap().is_file());
        assert!(!produced.exists());
    }

    #[test]
    fn normalize_fails_when_binary_missing() {
        let dir = tempfile::tempdir().unwrap();
        let params = params_for(Arch::Amd64, dir.path());
        std::fs::create_dir_all(dir.path().join(DIST_DIR)).unwrap();

        let err = normalize_artifacts(&params, dir.path()).unwrap_err();
        assert!(
            err.to_string().contains("artifact is missing"),
            "got: {err}"
        );
    }

    #[test]
    fn normalize_rejects_mismatched_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let params = params_for(Arch::Amd64, dir.path());
        write_artifact(dir.path(), &params.output, b"actual contents");
        write_artifact(
            dir.path(),
            &format!("{}.sha256", params.output),
            b"0000000000000000000000000000000000000000000000000000000000000000  x\n",
        );

        let err = normalize_artifacts(&params, dir.path()).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"), "got: {err}");
    }

    #[test]
    fn normalize_rejects_malformed_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let params = params_for(Arch::Amd64, dir.path());
        write_artifact(dir.path(), &params.output, b"contents");
        write_artifact(
            dir.path(),
            &format!("{}.sha256", params.output),
            b"not-a-hash\n",
        );

        let err = normalize_artifacts(&params, dir.path()).unwrap_err();
        assert!(
            err.to_string().contains("does not contain a SHA256 hash"),
            "got: {err}"
        );
    }

    #[test]
    fn verify_sidecar_accepts_bare_hash() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("bin");
        std::fs::write(&binary, b"hello world").unwrap();
        let sidecar = dir.path().join("bin.sha256");
        std::fs::write(
            &sidecar,
            "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9\n",
        )
        .unwrap();

        verify_sidecar(&binary, &sidecar).unwrap();
    }

    // -- run_build_script ----------------------------------------------------

    #[cfg(unix)]
    fn write_script(workdir: &Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let script = workdir.join("fake-build.sh");
        std::fs::write(&script, format!("#!/bin/sh\n{body}")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        "fake-build.sh".to_string()
    }

    #[cfg(unix)]
    #[test]
    fn build_script_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "exit 3\n");

        let overrides = Overrides {
            otp_version: Some("27.2".to_string()),
            build_script: Some(script),
            ..Overrides::default()
        };
        let params =
            BuildParams::resolve(Arch::Amd64, &overrides, &CiContext::default()).unwrap();

        let err = run_build_script(&params, dir.path()).unwrap_err();
        assert!(err.to_string().contains("exited with"), "got: {err}");
    }

    #[cfg(unix)]
    #[test]
    fn build_script_sees_resolved_environment() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "printf '%s %s %s' \"$ARCH_IN\" \"$TOOLCHAIN_ARCH\" \"$OUTPUT\" > env-probe\n",
        );

        let overrides = Overrides {
            otp_version: Some("27.2".to_string()),
            build_script: Some(script),
            ..Overrides::default()
        };
        let params =
            BuildParams::resolve(Arch::Arm64, &overrides, &CiContext::default()).unwrap();

        run_build_script(&params, dir.path()).unwrap();

        let probe = std::fs::read_to_string(dir.path().join("env-probe")).unwrap();
        assert_eq!(probe, "arm64 aarch64 bombom-linux-arm64.bin");
    }
}
