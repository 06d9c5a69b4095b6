//! Build configuration: an optional TOML file layered over defaults, resolved
//! once into absolute paths and a concrete platform so every pipeline step
//! receives explicit state instead of reading the environment or changing
//! directory.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::tags::{TagLayout, TagSpec};

fn default_root_dir() -> String {
    ".".into()
}

fn default_artifact_dir() -> String {
    "build".into()
}

fn default_keys_dir() -> String {
    "tls".into()
}

fn default_source_root() -> String {
    "cmd".into()
}

fn default_os() -> String {
    "linux".into()
}

fn default_arch() -> String {
    "amd64".into()
}

fn default_compiler_program() -> String {
    "go".into()
}

fn default_compiler_args() -> Vec<String> {
    ["build", "-ldflags", "-s -w", "-o", "{output}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_compiler_env() -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("CGO_ENABLED".to_string(), "0".to_string());
    env
}

fn default_true() -> bool {
    true
}

fn default_post_program() -> String {
    "upx".into()
}

fn default_post_args() -> Vec<String> {
    vec!["-9".into(), "{output}".into()]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkspaceSection {
    #[serde(default = "default_root_dir")]
    pub root_dir: String,
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,
    #[serde(default = "default_keys_dir")]
    pub keys_dir: String,
    #[serde(default = "default_source_root")]
    pub source_root: String,
}

impl Default for WorkspaceSection {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            artifact_dir: default_artifact_dir(),
            keys_dir: default_keys_dir(),
            source_root: default_source_root(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlatformSection {
    #[serde(default = "default_os")]
    pub os: String,
    #[serde(default = "default_arch")]
    pub arch: String,
}

impl Default for PlatformSection {
    fn default() -> Self {
        Self {
            os: default_os(),
            arch: default_arch(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerSection {
    #[serde(default = "default_compiler_program")]
    pub program: String,
    #[serde(default = "default_compiler_args")]
    pub args: Vec<String>,
    #[serde(default = "default_compiler_env")]
    pub env: BTreeMap<String, String>,
}

impl Default for CompilerSection {
    fn default() -> Self {
        Self {
            program: default_compiler_program(),
            args: default_compiler_args(),
            env: default_compiler_env(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostProcessSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_post_program")]
    pub program: String,
    #[serde(default = "default_post_args")]
    pub args: Vec<String>,
}

impl Default for PostProcessSection {
    fn default() -> Self {
        Self {
            enabled: true,
            program: default_post_program(),
            args: default_post_args(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagSpecConfig {
    pub placeholder: String,
    pub files: Vec<String>,
}

impl TagSpecConfig {
    fn into_spec(self) -> TagSpec {
        TagSpec {
            placeholder: self.placeholder,
            files: self.files,
        }
    }
}

fn spec_config(spec: &TagSpec) -> TagSpecConfig {
    TagSpecConfig {
        placeholder: spec.placeholder.clone(),
        files: spec.files.clone(),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TagsSection {
    pub ca: TagSpecConfig,
    pub endpoint: TagSpecConfig,
    pub indicator: TagSpecConfig,
    pub build_id: TagSpecConfig,
}

impl Default for TagsSection {
    fn default() -> Self {
        let layout = TagLayout::standard();
        Self {
            ca: spec_config(&layout.ca),
            endpoint: spec_config(&layout.endpoint),
            indicator: spec_config(&layout.indicator),
            build_id: spec_config(&layout.build_id),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub workspace: WorkspaceSection,
    pub platform: PlatformSection,
    pub compiler: CompilerSection,
    pub post_process: PostProcessSection,
    pub tags: TagsSection,
}

#[derive(Debug, Clone)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct PostProcessConfig {
    pub enabled: bool,
    pub program: String,
    pub args: Vec<String>,
}

/// Fully resolved configuration: absolute directories, concrete platform.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub root: PathBuf,
    pub artifact_dir: PathBuf,
    pub keys_dir: PathBuf,
    pub source_root: PathBuf,
    pub platform: Platform,
    pub compiler: CompilerConfig,
    pub post_process: PostProcessConfig,
    pub tags: TagLayout,
}

impl BuildConfig {
    pub fn target_source_dir(&self, name: &str) -> PathBuf {
        self.root.join(&self.source_root).join(name)
    }

    pub fn endpoint_cache_file(&self) -> PathBuf {
        self.artifact_dir.join("endpoint.txt")
    }

    pub fn indicator_cache_file(&self) -> PathBuf {
        self.artifact_dir.join("indicator.txt")
    }
}

/// Load `path` when it exists, otherwise fall back to pure defaults. Relative
/// workspace paths are rooted at the config file's directory.
pub fn load(path: &Path) -> Result<BuildConfig> {
    let raw = if path.exists() {
        let data = fs::read_to_string(path)
            .map_err(|e| Error::msg(format!("failed to read config {}: {e}", path.display())))?;
        toml::from_str(&data)
            .map_err(|e| Error::msg(format!("TOML parse error in {}: {e}", path.display())))?
    } else {
        RawConfig::default()
    };

    let cwd = env::current_dir().map_err(|e| Error::msg(format!("cwd error: {e}")))?;
    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| cwd.join(p))
        .unwrap_or(cwd);
    resolve(raw, &base)
}

pub fn resolve(raw: RawConfig, base: &Path) -> Result<BuildConfig> {
    let root = resolve_dir(base, &raw.workspace.root_dir)?;
    let artifact_dir = resolve_dir(&root, &raw.workspace.artifact_dir)?;
    let keys_dir = resolve_dir(&root, &raw.workspace.keys_dir)?;

    let source_root = raw.workspace.source_root.trim();
    if source_root.is_empty() {
        return Err(Error::msg("empty workspace source_root"));
    }

    let platform = resolve_platform(
        &raw.platform,
        env::var("GOOS").ok(),
        env::var("GOARCH").ok(),
    );

    Ok(BuildConfig {
        root,
        artifact_dir,
        keys_dir,
        source_root: PathBuf::from(source_root),
        platform,
        compiler: CompilerConfig {
            program: raw.compiler.program,
            args: raw.compiler.args,
            env: raw.compiler.env,
        },
        post_process: PostProcessConfig {
            enabled: raw.post_process.enabled,
            program: raw.post_process.program,
            args: raw.post_process.args,
        },
        tags: TagLayout {
            ca: raw.tags.ca.into_spec(),
            endpoint: raw.tags.endpoint.into_spec(),
            indicator: raw.tags.indicator.into_spec(),
            build_id: raw.tags.build_id.into_spec(),
        },
    })
}

/// Environment overrides win over the config section, which wins over the
/// fixed linux/amd64 default.
pub fn resolve_platform(
    section: &PlatformSection,
    env_os: Option<String>,
    env_arch: Option<String>,
) -> Platform {
    let pick = |env_val: Option<String>, cfg_val: &str| {
        env_val
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| cfg_val.to_string())
    };
    Platform {
        os: pick(env_os, &section.os),
        arch: pick(env_arch, &section.arch),
    }
}

fn resolve_dir(base: &Path, raw: &str) -> Result<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::msg("empty workspace dir"));
    }
    let pb = PathBuf::from(raw);
    Ok(if pb.is_absolute() { pb } else { base.join(pb) })
}
