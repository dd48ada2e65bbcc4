//! ctmn xtask - Build automation tasks
//!
//! ## Usage
//!
//! ```bash
//! # Build the ctmn binary
//! cargo xtask build
//!
//! # Run all tests
//! cargo xtask test
//!
//! # Run lints (rustfmt check + clippy)
//! cargo xtask lint
//!
//! # Everything CI runs, with a markdown report
//! cargo xtask ci --report report.md
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fmt::Write as _;
use std::path::PathBuf;
use xshell::{cmd, Shell};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation for ctmn")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the ctmn binary
    Build {
        /// Build in release mode
        #[arg(long)]
        release: bool,
    },
    /// Run all tests
    Test,
    /// Run lints (clippy and rustfmt check)
    Lint,
    /// Format code
    Fmt {
        /// Check formatting without making changes
        #[arg(long)]
        check: bool,
    },
    /// Install ctmn locally
    Install,
    /// Clean build artifacts
    Clean,
    /// Run CI checks (lint, test)
    Ci {
        /// Append a markdown summary to this file
        #[arg(long, env = "GITHUB_STEP_SUMMARY")]
        report: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    let project_root = project_root()?;
    sh.change_dir(&project_root);

    match cli.command {
        Commands::Build { release } => build(&sh, release)?,
        Commands::Test => test(&sh)?,
        Commands::Lint => lint(&sh)?,
        Commands::Fmt { check } => fmt(&sh, check)?,
        Commands::Install => install(&sh)?,
        Commands::Clean => clean(&sh)?,
        Commands::Ci { report } => ci(&sh, report)?,
    }

    Ok(())
}

fn project_root() -> Result<PathBuf> {
    let output = std::process::Command::new("cargo")
        .args(["locate-project", "--workspace", "--message-format=plain"])
        .output()
        .context("Failed to run cargo locate-project")?;

    let path = String::from_utf8(output.stdout)?;
    let manifest = PathBuf::from(path.trim());

    manifest
        .parent()
        .map(|p| p.to_path_buf())
        .context("Failed to find project root")
}

fn build(sh: &Shell, release: bool) -> Result<()> {
    println!("🔨 Building ctmn...");

    if release {
        cmd!(sh, "cargo build --release --bin ctmn").run()?;
    } else {
        cmd!(sh, "cargo build --bin ctmn").run()?;
    }

    println!("✅ Build complete!");
    Ok(())
}

fn test(sh: &Shell) -> Result<()> {
    println!("🧪 Running tests...");
    cmd!(sh, "cargo test --workspace").run()?;
    println!("✅ All tests passed!");
    Ok(())
}

fn lint(sh: &Shell) -> Result<()> {
    println!("🔍 Running lints...");

    println!("  Checking formatting...");
    cmd!(sh, "cargo fmt --all -- --check").run()?;

    println!("  Running clippy...");
    cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?;

    println!("✅ All lints passed!");
    Ok(())
}

fn fmt(sh: &Shell, check: bool) -> Result<()> {
    println!("🎨 Formatting code...");

    if check {
        cmd!(sh, "cargo fmt --all -- --check").run()?;
    } else {
        cmd!(sh, "cargo fmt --all").run()?;
    }

    println!("✅ Formatting complete!");
    Ok(())
}

fn install(sh: &Shell) -> Result<()> {
    println!("📥 Installing ctmn locally...");
    cmd!(sh, "cargo install --path .").run()?;
    println!("✅ Installation complete!");
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    println!("🧹 Cleaning build artifacts...");
    cmd!(sh, "cargo clean").run()?;
    println!("✅ Clean complete!");
    Ok(())
}

fn ci(sh: &Shell, report: Option<PathBuf>) -> Result<()> {
    println!("🤖 Running CI checks...");

    let steps: [(&str, fn(&Shell) -> Result<()>); 2] = [("lint", lint), ("test", test)];
    let mut summary = String::from("## ctmn code quality\n\n| step | result |\n|---|---|\n");
    let mut failed = Vec::new();

    for (name, step) in steps {
        let outcome = step(sh);
        let status = if outcome.is_ok() { "✅ passed" } else { "❌ failed" };
        writeln!(summary, "| {} | {} |", name, status)?;
        if let Err(e) = outcome {
            eprintln!("{} failed: {:#}", name, e);
            failed.push(name);
        }
    }

    if let Some(path) = report {
        let mut existing = std::fs::read_to_string(&path).unwrap_or_default();
        existing.push_str(&summary);
        std::fs::write(&path, existing)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    if !failed.is_empty() {
        anyhow::bail!("CI checks failed: {}", failed.join(", "));
    }

    println!("✅ All CI checks passed!");
    Ok(())
}
