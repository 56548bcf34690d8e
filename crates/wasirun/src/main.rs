//! # wasirun
//!
//! Command-line front end for `wasihost`: loads host files into a fresh
//! in-memory filesystem, runs one module, copies requested files back out and
//! exits with the guest's code.

pub mod cli;

#[cfg(test)]
mod tests;

use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use memfs::VirtualFileSystem;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use wasihost::FsFetch;
use wasihost::HostBuilder;
use wasihost::Runtime;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => ExitCode::from(process_exit_code(code)),
        Err(e) => {
            eprintln!("wasirun: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Host exit status for a guest code. Codes outside `0..=255` would wrap
/// (256 into success), so they become 1.
fn process_exit_code(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let fs = VirtualFileSystem::new();
    for (guest, host) in &cli.files {
        let bytes = tokio::fs::read(host)
            .await
            .with_context(|| format!("Failed to read --file {}={}", guest, host))?;
        fs.add_file(guest, bytes)
            .with_context(|| format!("Failed to place {} in the guest filesystem", guest))?;
    }

    let mut builder = HostBuilder::new()
        .args(cli.argv())
        .envs(cli.env.iter().cloned())
        .fs(fs.clone())
        .entry(&cli.entry)
        .trap_unknown_imports(!cli.strict_imports)
        .stdout(|line| {
            let mut out = std::io::stdout().lock();
            if let Err(e) = out.write_all(line.as_bytes()).and_then(|_| out.flush()) {
                warn!(error = %e, "failed to write guest stdout");
            }
        })
        .stderr(|line| eprint!("{}", line));
    if let Some(path) = &cli.stdin {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read --stdin {}", path.display()))?;
        builder = builder.stdin(bytes);
    }
    let host = builder.build()?;

    let runtime = Runtime::new()?;
    let location = cli.module.to_string_lossy();
    let instance = runtime
        .instantiate_streaming(&FsFetch::new(), &location, host)
        .await?;
    let status = instance.start().await?;
    info!(code = status.code, "guest exited");

    for (guest, host) in &cli.dumps {
        match fs.read_file(guest) {
            Some(bytes) => tokio::fs::write(host, bytes)
                .await
                .with_context(|| format!("Failed to write --dump {}={}", guest, host))?,
            None => warn!(path = %guest, "nothing to dump: not a file in the guest filesystem"),
        }
    }

    Ok(status.code)
}
