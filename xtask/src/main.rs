//! Development tasks for hamstercage.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::fs;
use std::path::Path;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask", about = "Build automation for hamstercage")]
enum Task {
    /// Generate man pages from the clap definitions
    GenerateManPages {
        /// Output directory for man pages
        #[arg(short, long, default_value = "man")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    match Task::parse() {
        Task::GenerateManPages { output } => generate_man_pages(&output),
    }
}

fn render(cmd: clap::Command, path: &Path) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("Failed to create man page: {}", path.display()))?;
    clap_mangen::Man::new(cmd).render(&mut std::io::BufWriter::new(file))?;
    println!("Generated: {}", path.display());
    Ok(())
}

fn generate_man_pages(output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create directory: {}", output_dir.display()))?;

    let cmd = hamstercage::cli::Cli::command();
    render(cmd.clone(), &output_dir.join("hamstercage.1"))?;

    // hamstercage-<sub>.1 for every subcommand but completion
    for sub in cmd.get_subcommands() {
        let name = sub.get_name();
        if name == "completion" {
            continue;
        }
        render(sub.clone(), &output_dir.join(format!("hamstercage-{name}.1")))?;
    }

    println!("\nTo view: man {}/hamstercage.1", output_dir.display());
    Ok(())
}
