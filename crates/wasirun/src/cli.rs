use std::path::PathBuf;

use clap::Parser;

/// Runs a WASI preview1 module against an in-memory filesystem.
#[derive(Parser, Debug)]
#[command(name = "wasirun", version, about)]
pub struct Cli {
    /// Module to run, binary or WAT text.
    pub module: PathBuf,

    /// Environment variable for the guest. Repeatable.
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_pair)]
    pub env: Vec<(String, String)>,

    /// Host file copied into the guest filesystem before the run. Repeatable.
    #[arg(long = "file", value_name = "GUEST=HOST", value_parser = parse_pair)]
    pub files: Vec<(String, String)>,

    /// Guest file copied back to the host after the run. Repeatable.
    #[arg(long = "dump", value_name = "GUEST=HOST", value_parser = parse_pair)]
    pub dumps: Vec<(String, String)>,

    /// Host file fed to the guest's standard input.
    #[arg(long)]
    pub stdin: Option<PathBuf>,

    /// Exported function to run.
    #[arg(long, default_value = "_start")]
    pub entry: String,

    /// Fail at link time on imports no provider supplies.
    #[arg(long, default_value_t = false)]
    pub strict_imports: bool,

    /// Arguments passed to the guest after its program name.
    #[arg(last = true)]
    pub args: Vec<String>,
}

/// Splits `LEFT=RIGHT` at the first `=`.
pub fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((left, right)) if !left.is_empty() => Ok((left.to_string(), right.to_string())),
        _ => Err(format!("expected LEFT=RIGHT, got {:?}", raw)),
    }
}

impl Cli {
    /// The guest's argv: the module's file stem, then the trailing arguments.
    pub fn argv(&self) -> Vec<String> {
        let program = self
            .module
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.module.display().to_string());
        std::iter::once(program).chain(self.args.iter().cloned()).collect()
    }
}
