// build.rs — Expose the compile-time target triple as a rustc env var.
//
// Cargo provides the `TARGET` env var to build scripts, which contains the
// canonical target triple (e.g., "x86_64-unknown-linux-gnu"). We re-export it
// as `cargo:rustc-env=TARGET=...` so that runtime code can access it via
// `env!("TARGET")` to infer the host build architecture when neither
// `--arch` nor `ARCH_IN` is given.

fn main() {
    let target = std::env::var("TARGET")
        .expect("TARGET env var not set by Cargo. This should never happen in a normal build.");

    println!("cargo:rustc-env=TARGET={target}");
}
