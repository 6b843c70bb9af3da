//! Command-line interface definitions for hamstercage.
//!
//! The definitions are shared between the main binary and xtask, which
//! renders man pages from them.
//!
//! Field-level documentation is provided via clap attributes, so missing_docs
//! is allowed for this module.

#![allow(missing_docs)]
#![allow(clippy::missing_docs_in_private_items)]

use clap::{ArgAction, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Main CLI structure for hamstercage.
#[derive(Parser)]
#[command(
    name = "hamstercage",
    version = crate::VERSION,
    about = "Keep configuration files of many hosts in one repository",
    long_about = "Tracks files, directories and symlinks of target machines in a repository, \
                  grouped into tags and mapped to hosts, with owner and mode preserved"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Root of the target tree
    #[arg(short, long, env = "HAMSTERCAGE_TARGET", default_value = "/")]
    pub directory: PathBuf,

    /// Name of this host
    #[arg(short = 'n', long, env = "HAMSTERCAGE_HOSTNAME")]
    pub hostname: Option<String>,

    /// Manifest file to use
    #[arg(
        short,
        long,
        env = "HAMSTERCAGE_MANIFEST",
        default_value = crate::DEFAULT_MANIFEST_FILE
    )]
    pub file: PathBuf,

    /// Repository directory (default: the manifest's directory)
    #[arg(short, long, env = "HAMSTERCAGE_REPO")]
    pub repo: Option<PathBuf>,

    /// Work on these tags instead of the host's tags
    #[arg(short, long = "tag", action = ArgAction::Append)]
    pub tags: Vec<String>,

    /// Verbose output, repeat for more detail
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Suppress informational messages
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Skip a tag's entries when its pre hook fails
    #[arg(long)]
    pub strict_hooks: bool,
}

/// All available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Create a new manifest for this host
    Init,

    /// Add files to a tag, copying them into the repository
    Add {
        /// Tag to add the files to
        #[arg(short, long)]
        tag: String,

        /// Replace entries that already exist in the tag
        #[arg(short, long)]
        force: bool,

        /// Files to add
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Write files from the repository to the target
    Apply {
        /// Limit to these files or glob patterns
        paths: Vec<String>,
    },

    /// Copy target files into the repository
    Save {
        /// Limit to these files or glob patterns
        paths: Vec<String>,
    },

    /// Show differences between target and repository
    Diff {
        /// Limit to these files or glob patterns
        paths: Vec<String>,
    },

    /// List managed files
    #[command(alias = "ls")]
    List {
        /// Long format with status, mode, owner, size and date
        #[arg(short, long)]
        long: bool,

        /// Separate columns with tabs instead of spaces
        #[arg(long)]
        tabs: bool,

        /// Limit to these files or glob patterns
        paths: Vec<String>,
    },

    /// Stop managing files; target files are left alone
    #[command(visible_aliases = ["rm", "del"])]
    Remove {
        /// Tag to remove the files from
        #[arg(short, long)]
        tag: String,

        /// Also delete the stored copies from the repository
        #[arg(long)]
        purge: bool,

        /// Files to remove
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Create a new tag
    Tag {
        /// Tag name
        name: String,

        /// Description for this tag
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Validate the manifest
    Check,

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_options() {
        let cli = Cli::try_parse_from([
            "hamstercage",
            "-d",
            "/mnt/target",
            "-n",
            "web1",
            "-t",
            "all",
            "-t",
            "web",
            "--strict-hooks",
            "apply",
            "-vv",
            "etc/*",
        ])
        .unwrap();
        assert_eq!(cli.directory, PathBuf::from("/mnt/target"));
        assert_eq!(cli.hostname.as_deref(), Some("web1"));
        assert_eq!(cli.tags, ["all", "web"]);
        assert_eq!(cli.verbose, 2);
        assert!(cli.strict_hooks);
        assert!(matches!(cli.command, Commands::Apply { paths } if paths == ["etc/*"]));
    }

    #[test]
    fn test_add_options() {
        let cli = Cli::try_parse_from(["hamstercage", "add", "-t", "web", "-f", "etc/nginx"]).unwrap();
        match cli.command {
            Commands::Add { tag, force, paths } => {
                assert_eq!(tag, "web");
                assert!(force);
                assert_eq!(paths, ["etc/nginx"]);
            }
            _ => panic!("expected add"),
        }
        assert!(Cli::try_parse_from(["hamstercage", "add", "-t", "web"]).is_err());
    }

    #[test]
    fn test_remove_aliases() {
        for name in ["remove", "rm", "del"] {
            let cli = Cli::try_parse_from(["hamstercage", name, "-t", "web", "etc/nginx"]).unwrap();
            match cli.command {
                Commands::Remove { tag, purge, paths } => {
                    assert_eq!(tag, "web");
                    assert!(!purge);
                    assert_eq!(paths, ["etc/nginx"]);
                }
                _ => panic!("expected remove for {name}"),
            }
        }
    }
}
