use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;

use bombom_release::arch::Arch;
use bombom_release::{config, docker, output, pipeline, resolver};

/// bombom release automation: per-architecture runtime resolution, build
/// orchestration, and artifact normalization.
#[derive(Parser, Debug)]
#[command(
    name = "bombom-release",
    version,
    about,
    after_help = "Examples:\n  bombom-release build --arch amd64\n  bombom-release docker\n  bombom-release docker arm64 --rebuild\n  bombom-release resolve-runtime --arch arm64"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the release pipeline in place for one architecture.
    Build {
        /// Target architecture; defaults to ARCH_IN, then the host triple.
        #[arg(long, value_enum)]
        arch: Option<Arch>,

        /// Skip the confirmation prompt before privilege elevation.
        #[arg(long)]
        yes: bool,
    },

    /// Run the pipeline inside per-platform containers.
    Docker {
        /// Architecture token (amd64 or arm64); omit to build both.
        arch: Option<String>,

        /// Rebuild the container image even when it already exists.
        #[arg(long)]
        rebuild: bool,
    },

    /// Print the musl runtime asset URL for an architecture.
    ResolveRuntime {
        /// Architecture whose asset to look up.
        #[arg(long, value_enum)]
        arch: Arch,

        /// Vendor page to scrape.
        #[arg(long, default_value = config::DEFAULT_HOME_URL)]
        home_url: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Build { arch, yes } => run_build(arch, yes),
        Command::Docker { arch, rebuild } => run_docker(arch.as_deref(), rebuild),
        Command::ResolveRuntime { arch, home_url } => run_resolve(arch, &home_url),
    };

    if let Err(e) = result {
        output::fail("Error", &format!("{e:#}"));
        process::exit(1);
    }
}

/// Pick the build architecture: explicit flag, then `ARCH_IN`, then the
/// compile-time host triple.
fn resolve_build_arch(flag: Option<Arch>) -> Result<Arch> {
    if let Some(arch) = flag {
        return Ok(arch);
    }
    if let Some(token) = config::env_nonempty("ARCH_IN") {
        return Ok(token.parse::<Arch>()?);
    }
    Ok(Arch::from_target_triple(env!("TARGET"))?)
}

fn run_build(arch: Option<Arch>, yes: bool) -> Result<()> {
    let arch = resolve_build_arch(arch)?;
    pipeline::run(arch, yes)?;
    Ok(())
}

fn run_docker(arch: Option<&str>, rebuild: bool) -> Result<()> {
    let archs = docker::parse_arch_list(arch)?;
    docker::run_for(&archs, docker::DockerOptions { rebuild })
}

fn run_resolve(arch: Arch, home_url: &str) -> Result<()> {
    let url = resolver::resolve_runtime_url(home_url, arch.needle())?;
    println!("{url}");
    Ok(())
}
