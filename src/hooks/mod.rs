//! Hook dispatcher.
//!
//! A tag may define hooks that run before (`pre`) and after (`post`) the
//! tag's entries are processed by `add`, `apply`, `diff` or `save`. The most
//! specific definition wins: `<step>-<command>`, then `*-<command>`, then
//! `<step>-*`, then `*`.
//!
//! Three hook types exist. `exec` runs a program with the arguments
//! `<command> <step> <tag>`, `shell` hands the command line to `sh -c`, and
//! `script-in-process` gives a script to a [`ScriptHost`] together with the
//! [`ScriptBindings`] of the current invocation.

/// Script hosts for `script-in-process` hooks
pub mod script;

pub use script::{InterpreterHost, ScriptBindings, ScriptHost, TagSummary};

use crate::error::{CageError, Result};
use crate::manifest::{HookSpec, HookType, Tag};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::info;

/// When a hook runs relative to the tag's entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Before the first entry of the tag
    Pre,
    /// After the last entry of the tag
    Post,
}

impl Step {
    /// Name used in hook names and passed to hooks
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pre => "pre",
            Self::Post => "post",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands that fire hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookCommand {
    /// `add`
    Add,
    /// `apply`
    Apply,
    /// `diff`
    Diff,
    /// `save`
    Save,
}

impl HookCommand {
    /// Name used in hook names and passed to hooks
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Apply => "apply",
            Self::Diff => "diff",
            Self::Save => "save",
        }
    }
}

impl fmt::Display for HookCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a failing hook does to the rest of the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HookPolicy {
    /// Record the failure and carry on
    #[default]
    Report,
    /// A failing `pre` hook also skips the tag's entries
    Gate,
}

/// Everything a hook needs to know about the running command
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    /// Path of the manifest file
    pub manifest_path: &'a Path,
    /// Repository base directory
    pub repo: &'a Path,
    /// Command being run
    pub command: HookCommand,
    /// Pre or post
    pub step: Step,
    /// Tag whose hook is run
    pub tag: &'a TagSummary,
}

impl HookContext<'_> {
    /// Directory relative hook commands and scripts are resolved against
    fn manifest_dir(&self) -> &Path {
        match self.manifest_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    /// Bindings handed to script hosts
    fn bindings(&self, hook: &str) -> ScriptBindings {
        ScriptBindings {
            cmd: self.command.as_str().to_string(),
            manifest: self.manifest_path.to_path_buf(),
            hook: hook.to_string(),
            repo: self.repo.to_path_buf(),
            step: self.step.as_str().to_string(),
            tag: self.tag.clone(),
        }
    }
}

/// Finds and runs hooks.
pub struct HookDispatcher {
    host: Box<dyn ScriptHost>,
}

impl fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookDispatcher").finish_non_exhaustive()
    }
}

impl Default for HookDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HookDispatcher {
    /// Dispatcher running scripts through their `#!` interpreter
    #[must_use]
    pub fn new() -> Self {
        Self::with_host(Box::new(InterpreterHost))
    }

    /// Dispatcher handing scripts to `host`
    #[must_use]
    pub fn with_host(host: Box<dyn ScriptHost>) -> Self {
        Self { host }
    }

    /// The hook of `tag` that fires for `step` of `command`, if any
    #[must_use]
    pub fn resolve<'t>(tag: &'t Tag, step: Step, command: HookCommand) -> Option<&'t HookSpec> {
        tag.find_hook(step.as_str(), command.as_str())
    }

    /// Run one hook.
    ///
    /// # Errors
    ///
    /// `HookExecution` if the hook cannot be started, exits non-zero or its
    /// script fails
    pub fn invoke(&self, hook: &HookSpec, ctx: &HookContext<'_>) -> Result<()> {
        info!(
            hook = %hook.name,
            kind = %hook.kind,
            tag = %ctx.tag.name,
            "running hook"
        );
        match hook.kind {
            HookType::Exec => {
                let program = resolve_program(&hook.command, ctx.manifest_dir())
                    .map_err(|message| failure(hook, message))?;
                let mut command = Command::new(program);
                command.args([
                    ctx.command.as_str(),
                    ctx.step.as_str(),
                    ctx.tag.name.as_str(),
                ]);
                run(hook, command, ctx)
            }
            HookType::Shell => {
                let mut command = Command::new("sh");
                command.args([
                    "-c",
                    hook.command.as_str(),
                    "hamstercage",
                    ctx.command.as_str(),
                    ctx.step.as_str(),
                    ctx.tag.name.as_str(),
                ]);
                run(hook, command, ctx)
            }
            HookType::Script => {
                let script = relative_to(ctx.manifest_dir(), &hook.command);
                self.host
                    .run(&script, &ctx.bindings(&hook.name))
                    .map_err(|message| failure(hook, message))
            }
        }
    }
}

fn failure(hook: &HookSpec, message: String) -> CageError {
    CageError::HookExecution {
        hook: hook.name.clone(),
        message,
    }
}

/// Spawn `command` with the hook environment and wait for it.
fn run(hook: &HookSpec, mut command: Command, ctx: &HookContext<'_>) -> Result<()> {
    let status = command
        .envs(ctx.bindings(&hook.name).environment())
        .current_dir(ctx.manifest_dir())
        .stdin(Stdio::null())
        .status()
        .map_err(|e| failure(hook, format!("unable to run \"{}\": {e}", hook.command)))?;
    if status.success() {
        Ok(())
    } else {
        Err(failure(hook, format!("\"{}\" {status}", hook.command)))
    }
}

/// `path` as given if absolute, else below `base`
fn relative_to(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Locate the program of an `exec` hook.
///
/// A command containing a path separator, or naming a file next to the
/// manifest, is taken relative to the manifest directory; anything else is
/// looked up on `PATH`.
fn resolve_program(command: &str, manifest_dir: &Path) -> std::result::Result<PathBuf, String> {
    if command.contains('/') {
        return Ok(relative_to(manifest_dir, command));
    }
    let local = manifest_dir.join(command);
    if local.is_file() {
        return Ok(local);
    }
    which::which(command).map_err(|e| format!("unable to find \"{command}\": {e}"))
}
