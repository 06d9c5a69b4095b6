//! The build pipeline: certificates, staging, tag injection, one compiler
//! invocation, post-processing, restoration. Strictly sequential; the source
//! tree and the certificate cache are single-writer by assumption.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{info, warn};
use uuid::Uuid;

use crate::certs::{self, CA_CERT_FILE, SERVER_CERT_FILE, SERVER_KEY_FILE};
use crate::config::BuildConfig;
use crate::error::{Error, Result};
use crate::tags::{self, TagValues};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Server,
    Agent,
}

impl Target {
    pub fn name(self) -> &'static str {
        match self {
            Target::Server => "server",
            Target::Agent => "agent",
        }
    }
}

/// Build one target binary with the given endpoint compiled in. Returns the
/// artifact path.
///
/// Once tag injection has started, every exit path restores the placeholders:
/// the guard returned by [`tags::inject`] does so from `Drop` on failure and
/// is restored explicitly as the last step on success.
pub fn run_build(
    cfg: &BuildConfig,
    target: Target,
    endpoint: &str,
    indicator: Option<&str>,
) -> Result<PathBuf> {
    fs::create_dir_all(&cfg.artifact_dir).map_err(|e| {
        Error::msg(format!(
            "failed to create artifact dir {}: {e}",
            cfg.artifact_dir.display()
        ))
    })?;

    let build_id = Uuid::new_v4().to_string();
    let bundle = certs::ensure_certificates(cfg, endpoint, &build_id)?;
    stage_certificates(cfg)?;

    let src_dir = cfg.target_source_dir(target.name());
    if !src_dir.is_dir() {
        // Must stay ahead of tag injection: the only abort that owes no
        // restoration.
        return Err(Error::TargetNotFound(src_dir));
    }

    let values = TagValues {
        ca_certificate: bundle.ca_cert_pem.clone(),
        endpoint: endpoint.to_string(),
        indicator: indicator.map(str::to_string),
        build_id: build_id.clone(),
    };
    let guard = tags::inject(&cfg.root, &cfg.tags, &values)?;

    let artifact = cfg.artifact_dir.join(target.name());
    compile(cfg, &src_dir, &artifact)?;
    post_process(cfg, &artifact)?;
    write_manifest(cfg, target, &build_id, &artifact)?;

    guard.restore()?;
    info!(
        "built {} for {}/{}",
        artifact.display(),
        cfg.platform.os,
        cfg.platform.arch
    );
    Ok(artifact)
}

/// Delete generated certificates, caches and staged artifacts. Every removal
/// is individually best-effort; the source tree is never touched.
pub fn clean(cfg: &BuildConfig) -> Result<()> {
    remove_matching_files(&cfg.artifact_dir, |_| true);
    remove_matching_files(&cfg.keys_dir, |name| {
        name.ends_with(".pem") || name.ends_with(".csr")
    });
    Ok(())
}

fn stage_certificates(cfg: &BuildConfig) -> Result<()> {
    for name in [CA_CERT_FILE, SERVER_CERT_FILE, SERVER_KEY_FILE] {
        let from = cfg.keys_dir.join(name);
        let to = cfg.artifact_dir.join(name);
        fs::copy(&from, &to)
            .map_err(|e| Error::msg(format!("failed to stage {}: {e}", from.display())))?;
    }
    Ok(())
}

fn compile(cfg: &BuildConfig, src_dir: &Path, artifact: &Path) -> Result<()> {
    let compiler = &cfg.compiler;
    let mut cmd = Command::new(&compiler.program);
    for arg in &compiler.args {
        cmd.arg(expand_arg(arg, artifact));
    }
    // The artifact path is absolute, so pointing the child at the target's
    // source directory does not move the output.
    cmd.current_dir(src_dir);
    cmd.env("GOOS", &cfg.platform.os);
    cmd.env("GOARCH", &cfg.platform.arch);
    for (k, v) in &compiler.env {
        cmd.env(k, v);
    }

    info!("compiling {} in {}", artifact.display(), src_dir.display());
    let status = cmd
        .status()
        .map_err(|e| Error::Compile(format!("failed to spawn {}: {e}", compiler.program)))?;
    if !status.success() {
        return Err(Error::Compile(format!(
            "{} exited with {status}",
            compiler.program
        )));
    }
    Ok(())
}

fn post_process(cfg: &BuildConfig, artifact: &Path) -> Result<()> {
    let pp = &cfg.post_process;
    if !pp.enabled {
        return Ok(());
    }
    let mut cmd = Command::new(&pp.program);
    for arg in &pp.args {
        cmd.arg(expand_arg(arg, artifact));
    }
    let status = cmd
        .status()
        .map_err(|e| Error::PostProcess(format!("failed to spawn {}: {e}", pp.program)))?;
    if !status.success() {
        return Err(Error::PostProcess(format!(
            "{} exited with {status}",
            pp.program
        )));
    }
    Ok(())
}

fn write_manifest(cfg: &BuildConfig, target: Target, build_id: &str, artifact: &Path) -> Result<()> {
    let manifest = serde_json::json!({
        "target": target.name(),
        "os": cfg.platform.os,
        "arch": cfg.platform.arch,
        "build_id": build_id,
        "artifact": artifact.file_name().and_then(|s| s.to_str()),
    });
    let text = serde_json::to_string_pretty(&manifest)
        .map_err(|e| Error::msg(format!("manifest encode error: {e}")))?;
    let path = cfg.artifact_dir.join(format!("{}.json", target.name()));
    fs::write(&path, text)
        .map_err(|e| Error::msg(format!("failed to write {}: {e}", path.display())))?;
    Ok(())
}

fn expand_arg(raw: &str, artifact: &Path) -> String {
    raw.replace("{output}", &artifact.display().to_string())
}

fn remove_matching_files(dir: &Path, matches: impl Fn(&str) -> bool) {
    // A missing directory leaves nothing to clean.
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name();
        if !matches(&name.to_string_lossy()) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => info!("removed {}", path.display()),
            Err(e) => warn!("failed to remove {}: {e}", path.display()),
        }
    }
}
