//! Project layout on disk: where the mirror, the index and the config live.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

pub const DOCS_DIRNAME: &str = "docs";
pub const STATE_DIRNAME: &str = ".sqldocset";
pub const INDEX_FILENAME: &str = "docSet.dsidx";

const EMBEDDED_CONFIG: &str = include_str!("../../../config/default-config.toml");

const ROOT_ENV: &str = "SQLDOCSET_PROJECT_ROOT";
const DATA_DIR_ENV: &str = "SQLDOCSET_DATA_DIR";
const CONFIG_ENV: &str = "SQLDOCSET_CONFIG";

/// Which layer supplied a resolved path.
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

/// Paths given on the command line.
#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self { cwd })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub docs_dir: PathBuf,
    pub state_dir: PathBuf,
    pub data_dir: PathBuf,
    pub dumps_dir: PathBuf,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub root_source: ValueSource,
    pub data_source: ValueSource,
    pub config_source: ValueSource,
}

impl ResolvedPaths {
    /// Layout rooted at `project_root` with every other path at its default.
    pub fn under(project_root: &Path) -> Self {
        let state_dir = project_root.join(STATE_DIRNAME);
        let data_dir = state_dir.join("data");
        Self {
            docs_dir: project_root.join(DOCS_DIRNAME),
            dumps_dir: state_dir.join("dumps"),
            db_path: data_dir.join(INDEX_FILENAME),
            config_path: state_dir.join("config.toml"),
            project_root: project_root.to_path_buf(),
            state_dir,
            data_dir,
            root_source: ValueSource::Flag,
            data_source: ValueSource::Default,
            config_source: ValueSource::Default,
        }
    }

    pub fn diagnostics(&self) -> String {
        let rows = [
            ("project_root", &self.project_root, Some(self.root_source)),
            ("docs_dir", &self.docs_dir, None),
            ("state_dir", &self.state_dir, None),
            ("data_dir", &self.data_dir, Some(self.data_source)),
            ("dumps_dir", &self.dumps_dir, None),
            ("db_path", &self.db_path, None),
            ("config_path", &self.config_path, Some(self.config_source)),
        ];
        rows.iter()
            .map(|(key, path, source)| match source {
                Some(source) => format!("{key}={} ({})", normalize_for_display(path), source.as_str()),
                None => format!("{key}={}", normalize_for_display(path)),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeStatus {
    pub docs_dir_exists: bool,
    pub db_size_bytes: Option<u64>,
    pub warnings: Vec<String>,
}

pub fn inspect_runtime(paths: &ResolvedPaths) -> Result<RuntimeStatus> {
    let docs_dir_exists = paths.docs_dir.is_dir();
    let db_size_bytes = match fs::metadata(&paths.db_path) {
        Ok(metadata) => Some(metadata.len()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => None,
        Err(error) => {
            return Err(error)
                .with_context(|| format!("failed to inspect {}", paths.db_path.display()));
        }
    };

    let mut warnings = Vec::new();
    if !docs_dir_exists {
        warnings.push(format!(
            "{DOCS_DIRNAME}/ is missing; mirror the reference site into it before `build`"
        ));
    }
    if !paths.config_path.exists() {
        warnings.push("config.toml is missing; embedded defaults are in effect".to_string());
    }

    Ok(RuntimeStatus {
        docs_dir_exists,
        db_size_bytes,
        warnings,
    })
}

pub fn ensure_runtime_ready_for_build(paths: &ResolvedPaths, status: &RuntimeStatus) -> Result<()> {
    if !status.docs_dir_exists {
        bail!(
            "No mirrored documentation found at {}.\nRun the fetch stage first, then: sqldocset build --project-root {}",
            normalize_for_display(&paths.docs_dir),
            normalize_for_display(&paths.project_root)
        );
    }
    Ok(())
}

pub fn resolve_paths(context: &ResolutionContext, overrides: &PathOverrides) -> Result<ResolvedPaths> {
    resolve_with(context, overrides, |key| env::var(key).ok())
}

fn resolve_with(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedPaths> {
    let (project_root, root_source) =
        match layered(overrides.project_root.as_deref(), ROOT_ENV, &lookup_env, &context.cwd) {
            Some(found) => found,
            None => (nearest_mirror_root(&context.cwd), ValueSource::Heuristic),
        };
    let mut paths = ResolvedPaths::under(&project_root);
    paths.root_source = root_source;

    if let Some((data_dir, source)) =
        layered(overrides.data_dir.as_deref(), DATA_DIR_ENV, &lookup_env, &project_root)
    {
        paths.db_path = data_dir.join(INDEX_FILENAME);
        paths.data_dir = data_dir;
        paths.data_source = source;
    }
    if let Some((config_path, source)) =
        layered(overrides.config.as_deref(), CONFIG_ENV, &lookup_env, &project_root)
    {
        paths.config_path = config_path;
        paths.config_source = source;
    }
    Ok(paths)
}

/// A flag beats its env var; relative values resolve against `base`.
fn layered(
    flag: Option<&Path>,
    env_key: &str,
    lookup_env: &impl Fn(&str) -> Option<String>,
    base: &Path,
) -> Option<(PathBuf, ValueSource)> {
    if let Some(path) = flag {
        return Some((base.join(path), ValueSource::Flag));
    }
    let value = lookup_env(env_key)?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    Some((base.join(value), ValueSource::Env))
}

/// Closest ancestor of `cwd` holding a `docs/` mirror, else `cwd` itself.
fn nearest_mirror_root(cwd: &Path) -> PathBuf {
    cwd.ancestors()
        .find(|dir| dir.join(DOCS_DIRNAME).is_dir())
        .unwrap_or(cwd)
        .to_path_buf()
}

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct InitReport {
    pub created_dirs: Vec<PathBuf>,
    pub wrote_config: bool,
}

pub fn init_layout(paths: &ResolvedPaths, options: &InitOptions) -> Result<InitReport> {
    let mut created_dirs = Vec::new();
    for dir in [
        &paths.docs_dir,
        &paths.state_dir,
        &paths.data_dir,
        &paths.dumps_dir,
    ] {
        if dir.is_dir() {
            continue;
        }
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        created_dirs.push(dir.clone());
    }

    let wrote_config = if paths.config_path.exists() && !options.force {
        false
    } else {
        if let Some(parent) = paths.config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&paths.config_path, EMBEDDED_CONFIG)
            .with_context(|| format!("failed to write {}", paths.config_path.display()))?;
        true
    };

    Ok(InitReport {
        created_dirs,
        wrote_config,
    })
}

pub fn embedded_config() -> &'static str {
    EMBEDDED_CONFIG
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
