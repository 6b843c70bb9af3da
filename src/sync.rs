//! The sync engine: moves entries between the target tree and the repository.
//!
//! Every operation works on a resolved, ordered set of `(tag, path)` pairs.
//! Pre and post hooks fire once per tag around that tag's entries. A failure
//! on one entry is recorded in the [`SyncReport`] and the batch carries on;
//! only problems found while resolving the entry set abort an operation, and
//! they do so before anything is changed.

use crate::CageContext;
use crate::compare::{self, Comparison, files_equal};
use crate::error::{CageError, IoResultExt, Result};
use crate::hooks::{HookCommand, HookDispatcher, HookPolicy, Step, TagSummary};
use crate::manifest::entry::capture;
use crate::manifest::{Entry, EntryKind, HookSpec, Manifest, validate_tag_name};
use crate::utils::paths::ensure_parent_dirs_owned;
use crate::utils::permissions::RepoOwnership;
use glob::{MatchOptions, Pattern};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{Level, debug, info, span, warn};

/// What happened to one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The destination was changed
    Updated,
    /// Nothing needed to change
    Unchanged,
    /// Target and repository disagree (`diff` only)
    Differs(Comparison),
    /// The entry could not be processed
    Failed(String),
}

impl Outcome {
    /// True for [`Outcome::Failed`]
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Outcome of one `(tag, path)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryReport {
    /// Tag the entry was processed for
    pub tag: String,
    /// Entry path
    pub path: String,
    /// What happened
    pub outcome: Outcome,
}

/// A hook that failed during an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookFailure {
    /// Tag defining the hook
    pub tag: String,
    /// Hook name
    pub hook: String,
    /// Error message
    pub message: String,
}

/// Result of a sync operation
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Per-entry outcomes in processing order
    pub entries: Vec<EntryReport>,
    /// Hooks that failed
    pub hook_failures: Vec<HookFailure>,
    /// Non-fatal problems found while resolving entries
    pub warnings: Vec<String>,
}

impl SyncReport {
    fn record(&mut self, tag: &str, path: String, outcome: Outcome) {
        match &outcome {
            Outcome::Failed(reason) => warn!(tag, path = %path, reason = %reason, "entry failed"),
            outcome => debug!(tag, path = %path, ?outcome, "entry done"),
        }
        self.entries.push(EntryReport {
            tag: tag.to_string(),
            path,
            outcome,
        });
    }

    fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.entries.iter().filter(|e| predicate(&e.outcome)).count()
    }

    /// Number of entries changed
    #[must_use]
    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Updated))
    }

    /// Number of entries left alone
    #[must_use]
    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Unchanged))
    }

    /// Number of entries with differences
    #[must_use]
    pub fn differing(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Differs(_)))
    }

    /// Number of entries that failed
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(Outcome::is_failure)
    }

    /// True if any entry or hook failed
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed() > 0 || !self.hook_failures.is_empty()
    }

    /// Outcome for `path`, if it was processed
    #[must_use]
    pub fn outcome_of(&self, path: &str) -> Option<&Outcome> {
        self.entries
            .iter()
            .find(|e| e.path == path)
            .map(|e| &e.outcome)
    }

    /// Entries that failed, with their reasons
    pub fn failures(&self) -> impl Iterator<Item = (&EntryReport, &str)> {
        self.entries.iter().filter_map(|e| match &e.outcome {
            Outcome::Failed(reason) => Some((e, reason.as_str())),
            _ => None,
        })
    }

    /// One-line summary such as `2 updated, 5 unchanged, 0 failed`
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("{} updated", self.updated())];
        parts.push(format!("{} unchanged", self.unchanged()));
        if self.differing() > 0 {
            parts.push(format!("{} differ", self.differing()));
        }
        parts.push(format!("{} failed", self.failed()));
        match self.hook_failures.len() {
            0 => {}
            1 => parts.push("1 hook failed".to_string()),
            n => parts.push(format!("{n} hooks failed")),
        }
        parts.join(", ")
    }
}

/// Entries of one tag selected for an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagBatch {
    /// Tag name
    pub tag: String,
    /// Entry paths in manifest order
    pub paths: Vec<String>,
}

/// The ordered entry set of an operation
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// One batch per affected tag, in tag order
    pub batches: Vec<TagBatch>,
    /// Dangling host tags, shadowed entries, filters matching nothing
    pub warnings: Vec<String>,
}

impl Resolution {
    /// All selected `(tag, path)` pairs in processing order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.batches.iter().flat_map(|b| {
            b.paths
                .iter()
                .map(move |p| (b.tag.as_str(), p.as_str()))
        })
    }

    /// Number of selected entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.batches.iter().map(|b| b.paths.len()).sum()
    }

    /// True if no entry was selected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A path given on the command line, exact or a glob pattern
#[derive(Debug)]
enum PathFilter {
    Exact(String),
    Pattern(Pattern),
}

impl PathFilter {
    fn parse(ctx: &CageContext, input: &str) -> Result<Self> {
        let normalized = ctx.normalize(input)?;
        if normalized.contains(['*', '?', '[']) {
            Pattern::new(&normalized)
                .map(Self::Pattern)
                .map_err(|e| CageError::Validation(format!("bad pattern {input:?}: {e}")))
        } else {
            Ok(Self::Exact(normalized))
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(exact) => exact == path,
            Self::Pattern(pattern) => pattern.matches_with(
                path,
                MatchOptions {
                    require_literal_separator: true,
                    ..MatchOptions::default()
                },
            ),
        }
    }
}

/// Tags an operation works on: the explicit ones, else the host's.
fn selected_tags(
    manifest: &Manifest,
    ctx: &CageContext,
    filtered: bool,
    warnings: &mut Vec<String>,
) -> Result<Vec<String>> {
    let mut tags: Vec<String> = Vec::new();
    if !ctx.tags.is_empty() {
        for name in &ctx.tags {
            manifest.tag(name)?;
            if !tags.contains(name) {
                tags.push(name.clone());
            }
        }
        return Ok(tags);
    }

    match manifest.host(&ctx.hostname) {
        Some(host) => {
            for name in &host.tags {
                if !manifest.tags.contains_key(name) {
                    let message = format!("host {} references unknown tag {name}", host.name);
                    warn!("{message}");
                    warnings.push(message);
                } else if !tags.contains(name) {
                    tags.push(name.clone());
                }
            }
            Ok(tags)
        }
        // a file filter alone searches the whole manifest
        None if filtered => Ok(manifest.tags.keys().cloned().collect()),
        None => Err(CageError::UnknownHost(ctx.hostname.clone())),
    }
}

/// Resolve the entries an operation works on.
///
/// Tags come from the context, or from the host entry of the context's
/// hostname. `files` narrows the set to matching entries (exact paths or glob
/// patterns); without it every entry of every selected tag is included, and
/// so is every selected tag even when it has no entries. A path held by more
/// than one selected tag is processed for the first one only.
///
/// # Errors
///
/// `NotFound` for an unknown explicit tag, `UnknownHost` if no tags are given
/// and the host is not in the manifest, `Validation` for malformed paths
pub fn resolve_entries(
    manifest: &Manifest,
    ctx: &CageContext,
    files: &[String],
) -> Result<Resolution> {
    let filters = files
        .iter()
        .map(|f| PathFilter::parse(ctx, f))
        .collect::<Result<Vec<_>>>()?;
    let mut resolution = Resolution::default();
    let tags = selected_tags(manifest, ctx, !filters.is_empty(), &mut resolution.warnings)?;

    let mut owners: HashMap<&str, &str> = HashMap::new();
    let mut matched = vec![false; filters.len()];
    for name in &tags {
        let tag = manifest.tag(name)?;
        let mut paths = Vec::new();
        for entry in &tag.entries {
            if !filters.is_empty() {
                let mut hit = false;
                for (filter, seen) in filters.iter().zip(matched.iter_mut()) {
                    if filter.matches(&entry.path) {
                        *seen = true;
                        hit = true;
                    }
                }
                if !hit {
                    continue;
                }
            }
            if let Some(first) = owners.get(entry.path.as_str()) {
                let message = format!(
                    "{} is in tags {first} and {name}, using tag {first}",
                    entry.path
                );
                warn!("{message}");
                resolution.warnings.push(message);
                continue;
            }
            owners.insert(&entry.path, name);
            paths.push(entry.path.clone());
        }
        if filters.is_empty() || !paths.is_empty() {
            resolution.batches.push(TagBatch {
                tag: name.clone(),
                paths,
            });
        }
    }

    for (file, seen) in files.iter().zip(&matched) {
        if !seen {
            resolution
                .warnings
                .push(format!("{file} does not match any entry"));
        }
    }
    debug!(
        tags = resolution.batches.len(),
        entries = resolution.len(),
        "entries resolved"
    );
    Ok(resolution)
}

/// A batch together with the hooks that fire around it
struct Planned {
    batch: TagBatch,
    pre: Option<HookSpec>,
    post: Option<HookSpec>,
    /// The tag as hooks see it
    summary: TagSummary,
}

fn plan(manifest: &Manifest, command: HookCommand, batches: Vec<TagBatch>) -> Vec<Planned> {
    batches
        .into_iter()
        .map(|batch| {
            let tag = manifest.tags.get(&batch.tag);
            let hook = |step| tag.and_then(|t| HookDispatcher::resolve(t, step, command)).cloned();
            Planned {
                pre: hook(Step::Pre),
                post: hook(Step::Post),
                summary: tag.map_or_else(|| TagSummary::named(&batch.tag), TagSummary::of),
                batch,
            }
        })
        .collect()
}

/// Runs `save`, `apply`, `add`, `remove` and `diff` for a [`CageContext`].
#[derive(Debug)]
pub struct SyncEngine<'c> {
    ctx: &'c CageContext,
    hooks: HookDispatcher,
    /// Applied to directories created below the repository
    repo_owner: Option<RepoOwnership>,
}

impl<'c> SyncEngine<'c> {
    /// Engine using the default hook dispatcher
    #[must_use]
    pub fn new(ctx: &'c CageContext) -> Self {
        Self::with_dispatcher(ctx, HookDispatcher::new())
    }

    /// Engine using `hooks` to run hooks.
    ///
    /// Owner, group and mode of the manifest file are recorded here and given
    /// to every directory the engine creates in the repository.
    #[must_use]
    pub fn with_dispatcher(ctx: &'c CageContext, hooks: HookDispatcher) -> Self {
        let repo_owner = RepoOwnership::of_file(&ctx.manifest_path).unwrap_or_else(|e| {
            warn!(error = %e, "cannot read manifest ownership, repository directories get defaults");
            None
        });
        Self {
            ctx,
            hooks,
            repo_owner,
        }
    }

    /// Copy entries from the repository to the target.
    ///
    /// # Errors
    ///
    /// Only resolution errors; per-entry failures are in the report
    pub fn apply(&self, manifest: &Manifest, files: &[String]) -> Result<SyncReport> {
        let resolution = resolve_entries(manifest, self.ctx, files)?;
        let report = self.run(
            HookCommand::Apply,
            plan(manifest, HookCommand::Apply, resolution.batches),
            resolution.warnings,
            |tag, path| self.apply_entry(manifest, tag, path),
        );
        info!(summary = %report.summary(), "apply finished");
        Ok(report)
    }

    /// Copy entries from the target to the repository, refreshing their
    /// metadata in the manifest.
    ///
    /// # Errors
    ///
    /// Only resolution errors; per-entry failures are in the report
    pub fn save(&self, manifest: &mut Manifest, files: &[String]) -> Result<SyncReport> {
        let resolution = resolve_entries(manifest, self.ctx, files)?;
        let planned = plan(manifest, HookCommand::Save, resolution.batches);
        let report = self.run(
            HookCommand::Save,
            planned,
            resolution.warnings,
            |tag, path| self.save_entry(manifest, tag, path),
        );
        info!(summary = %report.summary(), "save finished");
        Ok(report)
    }

    /// Compare entries without changing anything.
    ///
    /// # Errors
    ///
    /// Only resolution errors; per-entry failures are in the report
    pub fn diff(&self, manifest: &Manifest, files: &[String]) -> Result<SyncReport> {
        let resolution = resolve_entries(manifest, self.ctx, files)?;
        let report = self.run(
            HookCommand::Diff,
            plan(manifest, HookCommand::Diff, resolution.batches),
            resolution.warnings,
            |tag, path| {
                let entry = manifest.entry(tag, path)?;
                let comparison = compare::compare(entry, &self.ctx.target, &self.ctx.tag_storage(tag))?;
                Ok(if comparison.is_identical() {
                    Outcome::Unchanged
                } else {
                    Outcome::Differs(comparison)
                })
            },
        );
        info!(summary = %report.summary(), "diff finished");
        Ok(report)
    }

    /// Start managing `paths` in `tag`, capturing them from the target.
    ///
    /// # Errors
    ///
    /// A tag that does not exist yet is created.
    ///
    /// # Errors
    ///
    /// `DuplicateEntry` if a path is already in the tag and `force` is not
    /// set, `Validation` for malformed paths or tag names. All of these are
    /// raised before anything changes.
    pub fn add(
        &self,
        manifest: &mut Manifest,
        tag: &str,
        paths: &[String],
        force: bool,
    ) -> Result<SyncReport> {
        validate_tag_name(tag)?;
        let normalized = self.normalize_all(paths)?;
        if !force
            && let Some(existing) = manifest.tags.get(tag)
            && let Some(path) = normalized.iter().find(|p| existing.entries.contains(p))
        {
            return Err(CageError::DuplicateEntry {
                tag: tag.to_string(),
                path: path.clone(),
            });
        }
        if manifest.ensure_tag(tag, "") {
            info!(tag, "created tag");
        }

        let mut warnings = Vec::new();
        for path in &normalized {
            for other in manifest.tags.values() {
                if other.name != tag && other.entries.contains(path) {
                    warnings.push(format!("{path} is also in tag {}", other.name));
                }
            }
        }

        let batch = TagBatch {
            tag: tag.to_string(),
            paths: normalized,
        };
        let planned = plan(manifest, HookCommand::Add, vec![batch]);
        let report = self.run(HookCommand::Add, planned, warnings, |tag, path| {
            self.add_entry(manifest, tag, path)
        });
        info!(tag, summary = %report.summary(), "add finished");
        Ok(report)
    }

    /// Stop managing `paths` in `tag`. The target is never touched; the
    /// stored blob is kept unless `purge` is set.
    ///
    /// # Errors
    ///
    /// `NotFound` if the tag does not exist, `Validation` for malformed paths
    pub fn remove(
        &self,
        manifest: &mut Manifest,
        tag: &str,
        paths: &[String],
        purge: bool,
    ) -> Result<SyncReport> {
        let normalized = self.normalize_all(paths)?;
        manifest.tag(tag)?;

        let mut report = SyncReport::default();
        for path in normalized {
            let outcome = match self.remove_entry(manifest, tag, &path, purge) {
                Ok(()) => Outcome::Updated,
                Err(e) => Outcome::Failed(e.to_string()),
            };
            report.record(tag, path, outcome);
        }
        info!(tag, summary = %report.summary(), "remove finished");
        Ok(report)
    }

    fn normalize_all(&self, paths: &[String]) -> Result<Vec<String>> {
        let mut normalized: Vec<String> = Vec::with_capacity(paths.len());
        for path in paths {
            let path = self.ctx.normalize(path)?;
            if !normalized.contains(&path) {
                normalized.push(path);
            }
        }
        Ok(normalized)
    }

    /// Drive `per_entry` over the planned batches, firing hooks per tag.
    fn run<F>(
        &self,
        command: HookCommand,
        planned: Vec<Planned>,
        warnings: Vec<String>,
        mut per_entry: F,
    ) -> SyncReport
    where
        F: FnMut(&str, &str) -> Result<Outcome>,
    {
        let mut report = SyncReport {
            warnings,
            ..SyncReport::default()
        };

        for Planned {
            batch,
            pre,
            post,
            mut summary,
        } in planned
        {
            let span = span!(Level::DEBUG, "tag", tag = %batch.tag, %command);
            let _guard = span.enter();

            if let Some(hook) = &pre
                && !self.fire(hook, command, Step::Pre, &summary, &mut report)
                && self.ctx.hook_policy == HookPolicy::Gate
            {
                for path in batch.paths {
                    let reason = format!("skipped, hook {} failed", hook.name);
                    report.record(&batch.tag, path, Outcome::Failed(reason));
                }
                continue;
            }

            for path in batch.paths {
                let outcome = per_entry(&batch.tag, &path)
                    .unwrap_or_else(|e| Outcome::Failed(e.to_string()));
                // post hooks see entries added by this run
                if !outcome.is_failure() && !summary.entries.contains(&path) {
                    summary.entries.push(path.clone());
                }
                report.record(&batch.tag, path, outcome);
            }

            if let Some(hook) = &post {
                self.fire(hook, command, Step::Post, &summary, &mut report);
            }
        }
        report
    }

    /// Run one hook; a failure is logged and recorded. Returns success.
    fn fire(
        &self,
        hook: &HookSpec,
        command: HookCommand,
        step: Step,
        tag: &TagSummary,
        report: &mut SyncReport,
    ) -> bool {
        match self
            .hooks
            .invoke(hook, &self.ctx.hook_context(command, step, tag))
        {
            Ok(()) => true,
            Err(e) => {
                warn!(hook = %hook.name, tag = %tag.name, error = %e, "hook failed");
                report.hook_failures.push(HookFailure {
                    tag: tag.name.clone(),
                    hook: hook.name.clone(),
                    message: e.to_string(),
                });
                false
            }
        }
    }

    fn apply_entry(&self, manifest: &Manifest, tag: &str, path: &str) -> Result<Outcome> {
        let entry = manifest.entry(tag, path)?;
        let comparison = compare::compare(entry, &self.ctx.target, &self.ctx.tag_storage(tag))?;
        if comparison.is_identical() {
            return Ok(Outcome::Unchanged);
        }
        entry.apply_to(&self.ctx.target, &self.ctx.blob_path(tag, path))?;
        Ok(Outcome::Updated)
    }

    fn save_entry(&self, manifest: &mut Manifest, tag: &str, path: &str) -> Result<Outcome> {
        let existing = manifest.entry(tag, path)?.clone();
        let captured = capture(&self.ctx.target, path)?;
        let mut updated = Entry::from_capture(path, &captured);
        if captured.kind == existing.kind && captured.kind != EntryKind::Link {
            // owner and group stay unmanaged if they were
            if existing.owner.is_none() {
                updated.owner = None;
            }
            if existing.group.is_none() {
                updated.group = None;
            }
        }

        let blob = self.ctx.blob_path(tag, path);
        let mut changed = existing != updated;
        if captured.kind == EntryKind::File {
            changed |= store_blob(&self.ctx.target_path(path), &blob, self.repo_owner.as_ref())?;
        } else if existing.kind == EntryKind::File {
            changed |= drop_blob(&blob)?;
        }
        if existing.kind != captured.kind {
            info!(tag, path, from = %existing.kind, to = %captured.kind, "entry type changed");
        }

        manifest.insert_entry(tag, updated)?;
        Ok(if changed {
            Outcome::Updated
        } else {
            Outcome::Unchanged
        })
    }

    fn add_entry(&self, manifest: &mut Manifest, tag: &str, path: &str) -> Result<Outcome> {
        let captured = capture(&self.ctx.target, path)?;
        let entry = Entry::from_capture(path, &captured);
        let previous = manifest.tag(tag)?.entry(path).cloned();

        let blob = self.ctx.blob_path(tag, path);
        let mut changed = previous.as_ref() != Some(&entry);
        if captured.kind == EntryKind::File {
            changed |= store_blob(&self.ctx.target_path(path), &blob, self.repo_owner.as_ref())?;
        } else {
            changed |= drop_blob(&blob)?;
        }

        manifest.insert_entry(tag, entry)?;
        Ok(if changed {
            Outcome::Updated
        } else {
            Outcome::Unchanged
        })
    }

    fn remove_entry(&self, manifest: &mut Manifest, tag: &str, path: &str, purge: bool) -> Result<()> {
        let removed = manifest.remove_entry(tag, path)?;
        if purge && removed.kind == EntryKind::File {
            drop_blob(&self.ctx.blob_path(tag, path))?;
        }
        Ok(())
    }
}

/// Copy `source` to `blob` unless it already holds the same bytes.
/// Returns true if the blob was written.
fn store_blob(source: &Path, blob: &Path, owner: Option<&RepoOwnership>) -> Result<bool> {
    let existing = match fs::symlink_metadata(blob) {
        Ok(metadata) => Some(metadata),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(CageError::from_io(blob, e)),
    };
    if let Some(metadata) = existing {
        if metadata.is_file() && files_equal(source, blob)? {
            return Ok(false);
        }
        // replaced rather than overwritten: the old blob may be read-only
        fs::remove_file(blob).at(blob)?;
    } else {
        ensure_parent_dirs_owned(blob, owner)?;
    }

    let content = fs::read(source).at(source)?;
    fs::write(blob, content).at(blob)?;
    debug!(blob = %blob.display(), "blob stored");
    Ok(true)
}

/// Delete a blob if there is one. Returns true if something was deleted.
fn drop_blob(blob: &Path) -> Result<bool> {
    match fs::symlink_metadata(blob) {
        Ok(metadata) if metadata.is_file() => {
            fs::remove_file(blob).at(blob)?;
            debug!(blob = %blob.display(), "blob removed");
            Ok(true)
        }
        Ok(_) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CageError::from_io(blob, e)),
    }
}
