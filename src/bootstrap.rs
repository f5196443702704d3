//! rebar3 bootstrap: locate the tool on PATH, or download and install it.
//!
//! Installation goes through the [`Installer`] trait so the privileged path
//! can be exercised with a fake in tests. The real installer copies into the
//! target directory when it is writable and falls back to `sudo install`
//! otherwise, asking for confirmation first when running interactively.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};

use crate::config::BuildParams;
use crate::error::ReleaseError;
use crate::http;
use crate::output;

/// Name of the build tool the pipeline requires.
pub const TOOL_NAME: &str = "rebar3";

// ---------------------------------------------------------------------------
// Installer capability
// ---------------------------------------------------------------------------

/// Capability to place a staged executable at its final destination.
///
/// `needs_elevation` is true when the destination directory is not writable
/// by the current user.
pub trait Installer {
    fn install(&self, staged: &Path, dest: &Path, needs_elevation: bool) -> Result<()>;
}

/// The real installer: plain copy, or `sudo install -m 0755` when elevation
/// is required.
pub struct SystemInstaller {
    /// Skip the interactive confirmation before elevating.
    pub assume_yes: bool,
}

impl Installer for SystemInstaller {
    fn install(&self, staged: &Path, dest: &Path, needs_elevation: bool) -> Result<()> {
        if !needs_elevation {
            std::fs::copy(staged, dest).with_context(|| {
                format!("failed to copy {} to {}", staged.display(), dest.display())
            })?;
            set_executable(dest)?;
            return Ok(());
        }

        if !confirm_elevation(dest, self.assume_yes)? {
            bail!("installation into {} declined", dest.display());
        }

        let install_output = Command::new("sudo")
            .args(["install", "-m", "0755"])
            .arg(staged)
            .arg(dest)
            .output()
            .context("failed to execute sudo install")?;

        if !install_output.status.success() {
            let stderr = String::from_utf8_lossy(&install_output.stderr);
            bail!("sudo install failed: {}", stderr.trim());
        }
        Ok(())
    }
}

/// Ask before running sudo. Skipped with `--yes` or when stderr is not a
/// terminal (CI), where prompting would hang the run.
fn confirm_elevation(dest: &Path, assume_yes: bool) -> Result<bool> {
    if assume_yes || !output::is_stderr_tty() {
        return Ok(true);
    }

    let answer = dialoguer::Confirm::new()
        .with_prompt(format!(
            "Install {TOOL_NAME} into {} with sudo?",
            dest.display()
        ))
        .default(false)
        .interact_opt()
        .context("failed to read confirmation for elevated install")?;

    // None means the prompt was interrupted.
    Ok(answer.unwrap_or(false))
}

// ---------------------------------------------------------------------------
// PATH lookup
// ---------------------------------------------------------------------------

/// Search a PATH-style string for an executable file with the given name.
pub fn find_in_path(name: &str, path_value: &str) -> Option<PathBuf> {
    for dir in std::env::split_paths(path_value) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let candidate = dir.join(name);
        if is_executable_file(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Search the process PATH for an executable with the given name.
pub fn find_on_system(name: &str) -> Option<PathBuf> {
    let path_value = std::env::var("PATH").ok()?;
    find_in_path(name, &path_value)
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match path.metadata() {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

// ---------------------------------------------------------------------------
// Bootstrap flow
// ---------------------------------------------------------------------------

/// Ensure rebar3 is available, downloading and installing it when absent.
///
/// Idempotent: when the tool already resolves on PATH, no download happens;
/// the version probe is best-effort and its failure is non-fatal.
pub fn ensure_rebar3(params: &BuildParams, installer: &dyn Installer) -> Result<()> {
    if let Some(existing) = find_on_system(TOOL_NAME) {
        probe_version(&existing);
        return Ok(());
    }

    output::action("Bootstrap", &format!("downloading {TOOL_NAME}"));

    // Scoped download dir: removed on every exit path, including errors.
    let tmp = tempfile::tempdir().context("failed to create temporary download directory")?;

    let filename = download_filename(&params.rebar3_url);
    let downloaded = http::download_to_file(&params.rebar3_url, tmp.path(), &filename)?;

    let staged = if filename.ends_with(".tar.gz") {
        extract_tool(&downloaded, tmp.path())?
    } else {
        downloaded
    };
    set_executable(&staged)?;

    let dest = params.install_dir.join(TOOL_NAME);
    let needs_elevation = !dir_writable(&params.install_dir);

    installer
        .install(&staged, &dest, needs_elevation)
        .map_err(|e| ReleaseError::Install {
            tool: TOOL_NAME.to_string(),
            reason: format!("{e:#}"),
        })?;

    output::success("Installed", &dest.display().to_string());
    Ok(())
}

/// Last path segment of the download URL, used as the local filename.
fn download_filename(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|segment| !segment.is_empty())
        .unwrap_or_else(|| TOOL_NAME.to_string())
}

/// Run `rebar3 --version` and report the result. Failure to print a version
/// is noted but never fails the run.
fn probe_version(path: &Path) {
    match Command::new(path).arg("--version").output() {
        Ok(probe) if probe.status.success() => {
            let version = String::from_utf8_lossy(&probe.stdout);
            output::detail(&format!("{TOOL_NAME} present: {}", version.trim()));
        }
        _ => {
            output::note(&format!(
                "{TOOL_NAME} found at {} but did not report a version",
                path.display()
            ));
        }
    }
}

/// Extract the tool entry from a gzipped tarball into `dest_dir`.
fn extract_tool(archive_path: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let file = std::fs::File::open(archive_path)
        .with_context(|| format!("failed to open archive: {}", archive_path.display()))?;

    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);

    for entry_result in archive.entries().context("failed to read tar entries")? {
        let mut entry = entry_result.context("failed to read tar entry")?;
        let entry_path = entry.path().context("failed to read tar entry path")?;

        // Match the tool name at any nesting depth.
        let file_name = entry_path.file_name().and_then(|n| n.to_str()).unwrap_or("");

        if file_name == TOOL_NAME {
            let dest = dest_dir.join(TOOL_NAME);
            entry
                .unpack(&dest)
                .with_context(|| format!("failed to extract '{TOOL_NAME}' from archive"))?;
            return Ok(dest);
        }
    }

    bail!(
        "archive does not contain a '{TOOL_NAME}' entry: {}",
        archive_path.display()
    )
}

/// Whether the current user can create files in `dir`, probed by actually
/// creating one.
fn dir_writable(dir: &Path) -> bool {
    tempfile::Builder::new()
        .prefix(".writable-probe")
        .tempfile_in(dir)
        .is_ok()
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .with_context(|| format!("failed to mark {} executable", path.display()))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
