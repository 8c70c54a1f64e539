//! External-tool dependency declarations and the probe/resolve machinery.

use lodestar_core::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::process::Command;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").expect("version regex"));

/// Declaration of an external tool a source needs.
#[derive(Debug, Clone)]
pub struct Dependency {
    /// Executable name probed on PATH.
    pub tool: &'static str,
    pub display_name: &'static str,
    /// When false, the owning source can fall back without this tool.
    pub required: bool,
    /// Commands probed in order; the first that runs wins.
    pub probe_commands: &'static [&'static [&'static str]],
    pub min_version: Option<(u64, u64, u64)>,
    pub install_url: &'static str,
    /// Shell command that installs the tool unattended, when one exists.
    pub auto_install: Option<&'static str>,
    pub rationale: &'static str,
}

/// Result of probing one dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Found { version: Option<(u64, u64, u64)> },
    TooOld { version: (u64, u64, u64) },
    Missing,
}

impl Dependency {
    /// Probe for the tool. Absence of the executable, a non-zero exit, or a
    /// probe timeout all count as missing.
    pub async fn probe(&self) -> ProbeOutcome {
        for probe in self.probe_commands {
            let Some((cmd, args)) = probe.split_first() else {
                continue;
            };
            let output = tokio::time::timeout(
                PROBE_TIMEOUT,
                Command::new(cmd)
                    .args(args.iter())
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .output(),
            )
            .await;
            let Ok(Ok(output)) = output else { continue };
            if !output.status.success() {
                continue;
            }
            let stdout = String::from_utf8_lossy(&output.stdout);
            let version = extract_version(&stdout);
            if let (Some(min), Some(found)) = (self.min_version, version) {
                if found < min {
                    return ProbeOutcome::TooOld { version: found };
                }
            }
            return ProbeOutcome::Found { version };
        }
        ProbeOutcome::Missing
    }

    /// Run the declared auto-install command through the shell.
    pub async fn auto_install(&self) -> Result<()> {
        let Some(command) = self.auto_install else {
            return Err(Error::Dependency {
                tool: self.tool.to_string(),
                message: "no auto-install command declared".to_string(),
            });
        };
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Subprocess {
                operation: format!("install {}", self.tool),
                command: command.to_string(),
                exit_code: None,
                output: e.to_string(),
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::Subprocess {
                operation: format!("install {}", self.tool),
                command: command.to_string(),
                exit_code: output.status.code(),
                output: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

fn extract_version(stdout: &str) -> Option<(u64, u64, u64)> {
    let caps = VERSION_RE.captures(stdout)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = caps.get(2)?.as_str().parse().ok()?;
    let patch = caps
        .get(3)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    Some((major, minor, patch))
}

/// How missing dependencies are handled during source resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionMode {
    /// Ask the operator: install, skip the source, or abort.
    #[default]
    Interactive,
    /// Run declared auto-install commands; skip optional sources whose
    /// install fails, abort for required ones.
    AutoInstall,
    /// Silently skip optional sources with missing deps; abort when a
    /// required source is missing deps.
    SkipPrompts,
}

/// Outcome of resolving one source's dependency set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Ready,
    Skip { reason: String },
}

/// Probes dependency declarations and applies the resolution policy.
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver {
    pub mode: ResolutionMode,
}

impl DependencyResolver {
    pub fn new(mode: ResolutionMode) -> Self {
        Self { mode }
    }

    /// Resolve the dependencies of a source.
    ///
    /// `source_optional` comes from `Source::is_optional`; a missing
    /// dependency of a non-optional source always aborts.
    pub async fn resolve(
        &self,
        source_name: &str,
        source_optional: bool,
        dependencies: &[Dependency],
    ) -> Result<Resolution> {
        for dep in dependencies {
            let outcome = dep.probe().await;
            let missing_reason = match outcome {
                ProbeOutcome::Found { .. } => continue,
                ProbeOutcome::TooOld { version } => format!(
                    "{} {}.{}.{} older than required",
                    dep.tool, version.0, version.1, version.2
                ),
                ProbeOutcome::Missing => format!("{} not found on PATH", dep.tool),
            };
            tracing::debug!(source = source_name, tool = dep.tool, reason = %missing_reason, "dependency probe failed");

            match self.mode {
                ResolutionMode::AutoInstall => {
                    match dep.auto_install().await {
                        Ok(()) => {
                            if dep.probe().await == ProbeOutcome::Missing {
                                return self.missing(source_name, source_optional, dep, missing_reason);
                            }
                        }
                        Err(err) => {
                            tracing::warn!(tool = dep.tool, error = %err, "auto-install failed");
                            return self.missing(source_name, source_optional, dep, missing_reason);
                        }
                    }
                }
                ResolutionMode::SkipPrompts => {
                    return self.missing(source_name, source_optional, dep, missing_reason);
                }
                ResolutionMode::Interactive => {
                    match prompt_operator(source_name, dep, &missing_reason).await? {
                        OperatorChoice::Install => {
                            dep.auto_install().await?;
                            if dep.probe().await == ProbeOutcome::Missing {
                                return self.missing(source_name, source_optional, dep, missing_reason);
                            }
                        }
                        OperatorChoice::Skip => {
                            return self.missing(source_name, source_optional, dep, missing_reason);
                        }
                        OperatorChoice::Abort => {
                            return Err(Error::Dependency {
                                tool: dep.tool.to_string(),
                                message: format!("aborted by operator: {missing_reason}"),
                            });
                        }
                    }
                }
            }
        }
        Ok(Resolution::Ready)
    }

    fn missing(
        &self,
        source_name: &str,
        source_optional: bool,
        dep: &Dependency,
        reason: String,
    ) -> Result<Resolution> {
        // An optional source is dropped from the sync; a required source
        // cannot run without its tools.
        if source_optional {
            Ok(Resolution::Skip { reason })
        } else {
            Err(Error::Dependency {
                tool: dep.tool.to_string(),
                message: format!("{source_name} requires {}: {reason}", dep.display_name),
            })
        }
    }
}

enum OperatorChoice {
    Install,
    Skip,
    Abort,
}

/// Ask on stderr, read the answer from stdin.
async fn prompt_operator(
    source_name: &str,
    dep: &Dependency,
    reason: &str,
) -> Result<OperatorChoice> {
    eprintln!(
        "source {source_name}: {reason} ({}). See {}",
        dep.rationale, dep.install_url
    );
    let has_install = dep.auto_install.is_some();
    if has_install {
        eprint!("[i]nstall, [s]kip source, or [a]bort? ");
    } else {
        eprint!("[s]kip source or [a]bort? ");
    }
    let mut line = String::new();
    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
    stdin
        .read_line(&mut line)
        .await
        .map_err(|e| Error::io("read stdin", "/dev/stdin", e))?;
    match line.trim().to_lowercase().as_str() {
        "i" | "install" if has_install => Ok(OperatorChoice::Install),
        "s" | "skip" | "" => Ok(OperatorChoice::Skip),
        _ => Ok(OperatorChoice::Abort),
    }
}
