use crate::manifest::Tag;
use serde::Serialize;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, trace};

/// Interpreter used when a script has no `#!` line
const DEFAULT_INTERPRETER: &str = "sh";

/// The tag a hook belongs to, as handed to hooks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagSummary {
    /// Tag name
    pub name: String,
    /// Free-form description of the tag
    pub description: String,
    /// Paths of the tag's entries
    pub entries: Vec<String>,
}

impl TagSummary {
    /// Summary of `tag` as it currently is
    #[must_use]
    pub fn of(tag: &Tag) -> Self {
        Self {
            name: tag.name.clone(),
            description: tag.description.clone(),
            entries: tag.entries.iter().map(|entry| entry.path.clone()).collect(),
        }
    }

    /// Summary of a tag the manifest does not define
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Values exposed to a `script-in-process` hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptBindings {
    /// Command being run (`apply`, `save`, ...)
    pub cmd: String,
    /// Path of the manifest file
    pub manifest: PathBuf,
    /// Name of the hook being run
    pub hook: String,
    /// Repository base directory
    pub repo: PathBuf,
    /// `pre` or `post`
    pub step: String,
    /// Tag the hook belongs to
    pub tag: TagSummary,
}

impl ScriptBindings {
    /// The bindings as `HAMSTERCAGE_*` environment variables
    #[must_use]
    pub fn environment(&self) -> Vec<(&'static str, String)> {
        vec![
            ("HAMSTERCAGE_CMD", self.cmd.clone()),
            ("HAMSTERCAGE_MANIFEST", self.manifest.display().to_string()),
            ("HAMSTERCAGE_HOOK", self.hook.clone()),
            ("HAMSTERCAGE_REPO", self.repo.display().to_string()),
            ("HAMSTERCAGE_STEP", self.step.clone()),
            ("HAMSTERCAGE_TAG", self.tag.name.clone()),
        ]
    }

    /// Directory holding the manifest
    #[must_use]
    pub fn manifest_dir(&self) -> &Path {
        match self.manifest.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }
}

/// Runs the script of a `script-in-process` hook.
///
/// Returning `Err` marks the hook as failed; the message is shown to the user.
pub trait ScriptHost {
    /// Run `script` with `bindings` in scope.
    ///
    /// # Errors
    ///
    /// A description of why the script failed
    fn run(&self, script: &Path, bindings: &ScriptBindings) -> Result<(), String>;
}

/// Runs scripts through the interpreter named on their `#!` line.
///
/// The bindings are exported as environment variables and written to the
/// script's standard input as a YAML document. Scripts run in the directory
/// holding the manifest.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterpreterHost;

impl InterpreterHost {
    /// Interpreter command line for `script`
    fn interpreter(script: &Path) -> Result<Vec<String>, String> {
        let file = fs::File::open(script)
            .map_err(|e| format!("unable to open {}: {e}", script.display()))?;
        let mut first = String::new();
        // a binary first line is not a shebang; fall back to the default
        if io::BufReader::new(file).read_line(&mut first).is_err() {
            first.clear();
        }

        match first.strip_prefix("#!") {
            Some(line) => {
                let argv = shell_words::split(line.trim())
                    .map_err(|e| format!("bad interpreter line in {}: {e}", script.display()))?;
                if argv.is_empty() {
                    Ok(vec![DEFAULT_INTERPRETER.to_string()])
                } else {
                    Ok(argv)
                }
            }
            None => Ok(vec![DEFAULT_INTERPRETER.to_string()]),
        }
    }
}

impl ScriptHost for InterpreterHost {
    fn run(&self, script: &Path, bindings: &ScriptBindings) -> Result<(), String> {
        let argv = Self::interpreter(script)?;
        let document = serde_yaml::to_string(bindings).map_err(|e| e.to_string())?;
        debug!(script = %script.display(), interpreter = ?argv, "running script hook");

        let (program, args) = argv
            .split_first()
            .ok_or_else(|| "empty interpreter".to_string())?;
        let mut child = Command::new(program)
            .args(args)
            .arg(script)
            .envs(bindings.environment())
            .current_dir(bindings.manifest_dir())
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| format!("unable to run {program}: {e}"))?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(document.as_bytes()) {
                Ok(()) => {}
                // scripts are free to ignore their input
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    trace!("script closed stdin early");
                }
                Err(e) => return Err(format!("unable to write bindings: {e}")),
            }
        }

        let status = child.wait().map_err(|e| e.to_string())?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("{} {status}", script.display()))
        }
    }
}
