use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::{Generator, generate};
use colored::Colorize;
use hamstercage::cli::{Cli, Commands};
use hamstercage::hooks::HookPolicy;
use hamstercage::output::{self, Verbosity};
use hamstercage::{CageContext, commands};
use std::io;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("{} {e:#}", "Error:".red().bold());
            process::exit(1);
        }
    }
}

/// Log to stderr; `RUST_LOG` wins over `-v`
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "error",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("hamstercage={level}")),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run() -> Result<bool> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);
    output::set_verbosity(if cli.quiet {
        Verbosity::Quiet
    } else if cli.verbose > 0 {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    });

    if let Commands::Completion { shell } = &cli.command {
        print_completions(*shell, &mut Cli::command());
        return Ok(true);
    }

    let policy = if cli.strict_hooks {
        HookPolicy::Gate
    } else {
        HookPolicy::Report
    };
    let ctx = CageContext::new(cli.directory, cli.file, cli.repo, cli.hostname)?
        .with_tags(cli.tags)
        .with_hook_policy(policy);

    match cli.command {
        Commands::Init => commands::init::execute(&ctx),
        Commands::Add { tag, force, paths } => commands::add::execute(&ctx, &tag, &paths, force),
        Commands::Apply { paths } => commands::apply::execute(&ctx, &paths),
        Commands::Save { paths } => commands::save::execute(&ctx, &paths),
        Commands::Diff { paths } => commands::diff::execute(&ctx, &paths),
        Commands::List { long, tabs, paths } => commands::list::execute(&ctx, &paths, long, tabs),
        Commands::Remove { tag, purge, paths } => {
            commands::remove::execute(&ctx, &tag, &paths, purge)
        }
        Commands::Tag { name, description } => {
            commands::tag::execute(&ctx, &name, description.as_deref())
        }
        Commands::Check => commands::check::execute(&ctx),
        Commands::Completion { .. } => Ok(true),
    }
}

fn print_completions<G: Generator>(g: G, cmd: &mut clap::Command) {
    generate(g, cmd, cmd.get_name().to_string(), &mut io::stdout());
}
