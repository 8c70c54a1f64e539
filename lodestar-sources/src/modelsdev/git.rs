//! Build the models.dev document from a git checkout.
//!
//! Clones (or updates) the community repository into the cache directory
//! and runs its JS build to produce `dist/api.json`. Falls back to the
//! http source when git or a JS runtime is unavailable, which the pipeline
//! arranges by declaring this source optional.

use crate::deps::Dependency;
use crate::{FetchOptions, Source, SourceId};
use async_trait::async_trait;
use lodestar_core::{Catalog, Error, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

const REPO_URL: &str = "https://github.com/sst/models.dev.git";

static DEPENDENCIES: &[Dependency] = &[
    Dependency {
        tool: "git",
        display_name: "Git",
        required: true,
        probe_commands: &[&["git", "--version"]],
        min_version: Some((2, 0, 0)),
        install_url: "https://git-scm.com/downloads",
        auto_install: None,
        rationale: "clones and updates the community metadata repository",
    },
    Dependency {
        tool: "node",
        display_name: "Node.js (or Bun)",
        required: false,
        probe_commands: &[&["node", "--version"], &["bun", "--version"]],
        min_version: None,
        install_url: "https://nodejs.org/en/download",
        auto_install: None,
        rationale: "runs the community repository's build producing api.json",
    },
];

pub struct ModelsDevGitSource {
    repo_dir: PathBuf,
    catalog: Option<Catalog>,
}

impl ModelsDevGitSource {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            repo_dir: cache_dir.join("models-dev-repo"),
            catalog: None,
        }
    }

    async fn run(
        &self,
        ctx: &CancellationToken,
        operation: &str,
        cwd: Option<&Path>,
        cmd: &str,
        args: &[&str],
    ) -> Result<()> {
        let command_line = std::iter::once(cmd)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        let mut command = Command::new(cmd);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        let output = tokio::select! {
            _ = ctx.cancelled() => {
                return Err(Error::Canceled {
                    operation: operation.to_string(),
                })
            }
            out = command.output() => out.map_err(|e| Error::Subprocess {
                operation: operation.to_string(),
                command: command_line.clone(),
                exit_code: None,
                output: e.to_string(),
            })?,
        };
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::Subprocess {
                operation: operation.to_string(),
                command: command_line,
                exit_code: output.status.code(),
                output: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }

    async fn clone_or_update(&self, ctx: &CancellationToken) -> Result<()> {
        let repo_dir = self.repo_dir.to_string_lossy().into_owned();
        if self.repo_dir.join(".git").is_dir() {
            self.run(
                ctx,
                "update models.dev checkout",
                None,
                "git",
                &["-C", &repo_dir, "pull", "--ff-only", "--quiet"],
            )
            .await
        } else {
            if let Some(parent) = self.repo_dir.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::io("create dir", parent, e))?;
            }
            self.run(
                ctx,
                "clone models.dev",
                None,
                "git",
                &["clone", "--depth", "1", "--quiet", REPO_URL, &repo_dir],
            )
            .await
        }
    }

    async fn build(&self, ctx: &CancellationToken) -> Result<()> {
        // Prefer bun when present; otherwise node >= 22 can run package
        // scripts directly.
        if which_ok("bun").await {
            self.run(ctx, "build models.dev document", Some(&self.repo_dir), "bun", &["run", "build"])
                .await
        } else {
            self.run(ctx, "build models.dev document", Some(&self.repo_dir), "node", &["--run", "build"])
                .await
        }
    }
}

async fn which_ok(tool: &str) -> bool {
    Command::new(tool)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

#[async_trait]
impl Source for ModelsDevGitSource {
    fn id(&self) -> SourceId {
        SourceId::ModelsDevGit
    }

    fn dependencies(&self) -> Vec<Dependency> {
        DEPENDENCIES.to_vec()
    }

    async fn fetch(&mut self, ctx: CancellationToken, _options: &FetchOptions) -> Result<()> {
        self.clone_or_update(&ctx).await?;
        self.build(&ctx).await?;

        let api_json = self.repo_dir.join("dist").join("api.json");
        let body = std::fs::read_to_string(&api_json)
            .map_err(|e| Error::io("read build output", &api_json, e))?;
        self.catalog = Some(super::parse_document(&body, &api_json.to_string_lossy())?);
        Ok(())
    }

    fn catalog(&self) -> Result<Catalog> {
        match &self.catalog {
            Some(c) => c.copy(),
            None => Ok(Catalog::new()),
        }
    }

    fn cleanup(&mut self) -> Result<()> {
        // The checkout is a cache by design; only build output is removed.
        let dist = self.repo_dir.join("dist");
        if dist.is_dir() {
            std::fs::remove_dir_all(&dist).map_err(|e| Error::io("remove dir", &dist, e))?;
        }
        Ok(())
    }
}
