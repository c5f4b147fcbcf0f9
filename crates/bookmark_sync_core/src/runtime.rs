use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::filesystem::display_path;

pub const STATE_DIR_NAME: &str = ".bookmark_sync";
pub const PROJECT_ROOT_ENV: &str = "BOOKMARK_SYNC_PROJECT_ROOT";
pub const CONFIG_ENV: &str = "BOOKMARK_SYNC_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Heuristic,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Heuristic => "heuristic",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
    pub executable_dir: Option<PathBuf>,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        let executable_dir = env::current_exe()
            .ok()
            .and_then(|path| path.parent().map(Path::to_path_buf));
        Ok(Self {
            cwd,
            executable_dir,
        })
    }
}

/// Every directory a run reads from or writes to.
#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub state_dir: PathBuf,
    pub chrome_snapshot_dir: PathBuf,
    pub safari_snapshot_dir: PathBuf,
    pub merged_dir: PathBuf,
    pub chrome_sync_dir: PathBuf,
    pub safari_sync_dir: PathBuf,
    pub backups_dir: PathBuf,
    pub config_path: PathBuf,
    pub root_source: ValueSource,
    pub config_source: ValueSource,
}

impl ResolvedPaths {
    /// Layout rooted at `project_root` with the default config location.
    pub fn for_project_root(project_root: &Path) -> Self {
        let state_dir = project_root.join(STATE_DIR_NAME);
        Self {
            project_root: project_root.to_path_buf(),
            chrome_snapshot_dir: state_dir.join("chrome"),
            safari_snapshot_dir: state_dir.join("safari"),
            merged_dir: state_dir.join("merged"),
            chrome_sync_dir: state_dir.join("chrome_sync"),
            safari_sync_dir: state_dir.join("safari_sync"),
            backups_dir: state_dir.join("backups"),
            config_path: state_dir.join("config.toml"),
            state_dir,
            root_source: ValueSource::Flag,
            config_source: ValueSource::Default,
        }
    }

    pub fn stage_dirs(&self) -> [&Path; 6] {
        [
            &self.chrome_snapshot_dir,
            &self.safari_snapshot_dir,
            &self.merged_dir,
            &self.chrome_sync_dir,
            &self.safari_sync_dir,
            &self.backups_dir,
        ]
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\nstate_dir={}\nchrome_snapshot_dir={}\nsafari_snapshot_dir={}\nmerged_dir={}\nchrome_sync_dir={}\nsafari_sync_dir={}\nbackups_dir={}\nconfig_path={} ({})",
            display_path(&self.project_root),
            self.root_source.as_str(),
            display_path(&self.state_dir),
            display_path(&self.chrome_snapshot_dir),
            display_path(&self.safari_snapshot_dir),
            display_path(&self.merged_dir),
            display_path(&self.chrome_sync_dir),
            display_path(&self.safari_sync_dir),
            display_path(&self.backups_dir),
            display_path(&self.config_path),
            self.config_source.as_str(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeStatus {
    pub state_dir_exists: bool,
    pub config_exists: bool,
    pub missing_stage_dirs: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

pub fn inspect_runtime(paths: &ResolvedPaths) -> RuntimeStatus {
    let state_dir_exists = paths.state_dir.exists();
    let config_exists = paths.config_path.exists();
    let missing_stage_dirs: Vec<PathBuf> = paths
        .stage_dirs()
        .into_iter()
        .filter(|dir| !dir.exists())
        .map(Path::to_path_buf)
        .collect();

    let mut warnings = Vec::new();
    if !state_dir_exists {
        warnings.push(format!(
            "{STATE_DIR_NAME}/ is missing; run `bookmark-sync init` first"
        ));
    } else if !missing_stage_dirs.is_empty() {
        warnings.push(format!(
            "{} stage directories are missing; they will be created on demand",
            missing_stage_dirs.len()
        ));
    }
    if !config_exists {
        warnings.push(
            "config.toml is missing; source files must come from flags or environment".to_string(),
        );
    }

    RuntimeStatus {
        state_dir_exists,
        config_exists,
        missing_stage_dirs,
        warnings,
    }
}

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub materialize_config: bool,
    pub force: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            materialize_config: true,
            force: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InitReport {
    pub created_dirs: Vec<PathBuf>,
    pub wrote_config: bool,
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (project_root, root_source) = resolve_project_root(context, overrides, &lookup_env);
    let mut paths = ResolvedPaths::for_project_root(&project_root);
    paths.root_source = root_source;

    if let Some(path) = overrides.config.as_deref() {
        paths.config_path = absolutize(path, &project_root);
        paths.config_source = ValueSource::Flag;
    } else if let Some(value) = lookup_env(CONFIG_ENV).filter(|value| !value.trim().is_empty()) {
        paths.config_path = absolutize(Path::new(value.trim()), &project_root);
        paths.config_source = ValueSource::Env;
    }

    Ok(paths)
}

pub fn init_layout(paths: &ResolvedPaths, options: &InitOptions) -> Result<InitReport> {
    let mut created_dirs = Vec::new();
    let mut required_dirs = vec![paths.state_dir.as_path()];
    required_dirs.extend(paths.stage_dirs());

    for dir in required_dirs {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            created_dirs.push(dir.to_path_buf());
        }
    }

    let wrote_config = if options.materialize_config {
        write_text_file(&paths.config_path, &render_materialized_config(), options.force)?
    } else {
        false
    };

    Ok(InitReport {
        created_dirs,
        wrote_config,
    })
}

pub fn render_materialized_config() -> String {
    "# bookmark-sync configuration (materialized by `bookmark-sync init`)\n# Relative paths are resolved against the project root; a leading ~ is the home directory.\n# BOOKMARK_SYNC_CHROME / BOOKMARK_SYNC_SAFARI override these values.\n\n[sources]\n# chrome = \"~/.config/google-chrome/Default/Bookmarks\"\n# safari = \"~/Library/Safari/Bookmarks.plist\"\n\n[sync]\n# Replace the live Chrome bookmarks file during `sync chrome` (a backup is kept).\nwrite_live_chrome = true\n".to_string()
}

/// Resolve a possibly relative path against the project root.
pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn resolve_project_root<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: &F,
) -> (PathBuf, ValueSource)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = overrides.project_root.as_deref() {
        return (absolutize(path, &context.cwd), ValueSource::Flag);
    }

    if let Some(value) = lookup_env(PROJECT_ROOT_ENV).filter(|value| !value.trim().is_empty()) {
        return (
            absolutize(Path::new(value.trim()), &context.cwd),
            ValueSource::Env,
        );
    }

    detect_project_root_heuristic(&context.cwd, context.executable_dir.as_deref())
}

fn detect_project_root_heuristic(
    cwd: &Path,
    executable_dir: Option<&Path>,
) -> (PathBuf, ValueSource) {
    let mut seen = HashSet::new();
    for candidate in candidate_roots(cwd, executable_dir) {
        let key = display_path(&candidate);
        if !seen.insert(key) {
            continue;
        }
        if candidate.join(STATE_DIR_NAME).is_dir() {
            return (candidate, ValueSource::Heuristic);
        }
    }
    (cwd.to_path_buf(), ValueSource::Default)
}

fn candidate_roots(cwd: &Path, executable_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = cwd.ancestors().map(Path::to_path_buf).collect();
    if let Some(exe_dir) = executable_dir {
        out.extend(exe_dir.ancestors().map(Path::to_path_buf));
    }
    out
}

fn write_text_file(path: &Path, content: &str, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }

    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}
