//! Bootstrap sequence: the one-shot first-boot script of a worker.
//!
//! The script runs once, as root, with no arguments. Steps run in order and
//! `set -e` stops the script at the first failing step. Nothing reports back
//! to the controller; a worker whose bootstrap fails simply never answers its
//! health probe.

use std::fmt::Write;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Where the worker application comes from and how it is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSource {
    /// Git repository cloned onto every worker.
    pub repository_url: String,

    /// Directory the repository is cloned into.
    pub base_dir: PathBuf,

    /// Name of the checkout directory under `base_dir`.
    pub checkout_dir: String,

    /// Dependency manifest, relative to the checkout.
    pub manifest: String,

    /// Entry-point script, relative to the checkout.
    pub entry_point: String,

    /// Interpreter used to build the virtual environment.
    pub interpreter: String,

    /// System packages installed before cloning.
    pub packages: Vec<String>,

    /// Log file for the detached worker process, relative to the checkout.
    pub log_file: String,
}

impl Default for WorkerSource {
    fn default() -> Self {
        Self {
            repository_url: "https://github.com/deepakgonda/jmeter-distributed-load-test.git"
                .to_string(),
            base_dir: PathBuf::from("/home/ubuntu/load-test"),
            checkout_dir: "jmeter-distributed-load-test".to_string(),
            manifest: "requirements.txt".to_string(),
            entry_point: "slave.py".to_string(),
            interpreter: "python3".to_string(),
            packages: vec![
                "git".to_string(),
                "python3-venv".to_string(),
                "python3-pip".to_string(),
            ],
            log_file: "worker.log".to_string(),
        }
    }
}

impl WorkerSource {
    /// Check that every field can be rendered into a working script.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |msg: String| Err(ConfigurationError::InvalidSource(msg));

        if self.repository_url.trim().is_empty() {
            return invalid("repository_url is empty".into());
        }
        if self.repository_url.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return invalid(format!("repository_url '{}' contains whitespace", self.repository_url));
        }
        if !self.base_dir.is_absolute() {
            return invalid(format!("base_dir '{}' must be absolute", self.base_dir.display()));
        }
        for (field, value) in [
            ("checkout_dir", &self.checkout_dir),
            ("manifest", &self.manifest),
            ("entry_point", &self.entry_point),
            ("log_file", &self.log_file),
        ] {
            if !is_contained_relative(value) {
                return invalid(format!("{field} '{value}' must be a relative path inside the checkout"));
            }
        }
        if self.checkout_dir.contains('/') {
            return invalid(format!("checkout_dir '{}' must be a single directory name", self.checkout_dir));
        }
        if !is_package_name(&self.interpreter) {
            return invalid(format!("interpreter '{}' is not a plain command name", self.interpreter));
        }
        if let Some(bad) = self.packages.iter().find(|p| !is_package_name(p)) {
            return invalid(format!("package name '{bad}' is not valid"));
        }
        Ok(())
    }

    /// Absolute path of the checkout.
    pub fn checkout_path(&self) -> PathBuf {
        self.base_dir.join(&self.checkout_dir)
    }

    /// Absolute path of the virtual environment inside the checkout.
    pub fn venv_path(&self) -> PathBuf {
        self.checkout_path().join("venv")
    }
}

fn is_contained_relative(value: &str) -> bool {
    let path = Path::new(value);
    !value.trim().is_empty()
        && !value.chars().any(char::is_control)
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

fn is_package_name(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-' | '_'))
}

/// One step of the bootstrap script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum BootstrapStep {
    /// Refresh the package-manager index.
    RefreshPackageIndex,
    /// Install system packages.
    InstallPackages { packages: Vec<String> },
    /// Create a directory (and parents) if missing.
    EnsureDirectory { path: PathBuf },
    /// Clone a repository into `dest`.
    CloneRepository { url: String, dest: PathBuf },
    /// Create an isolated dependency environment.
    CreateVirtualEnv { interpreter: String, dir: PathBuf },
    /// Activate the environment and install the declared dependencies.
    InstallDependencies { venv: PathBuf, manifest: PathBuf },
    /// Start the worker detached so it survives the end of the script.
    LaunchDetached {
        workdir: PathBuf,
        venv: PathBuf,
        entry_point: String,
        log: PathBuf,
    },
}

impl BootstrapStep {
    /// Human-readable description used in the script's step comments.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::RefreshPackageIndex => "refresh package index",
            Self::InstallPackages { .. } => "install system packages",
            Self::EnsureDirectory { .. } => "ensure working directory",
            Self::CloneRepository { .. } => "fetch worker source",
            Self::CreateVirtualEnv { .. } => "create dependency environment",
            Self::InstallDependencies { .. } => "install dependencies",
            Self::LaunchDetached { .. } => "launch worker process",
        }
    }

    fn render_into(&self, out: &mut String) {
        let lines: Vec<String> = match self {
            Self::RefreshPackageIndex => vec!["apt-get update -y".to_string()],
            Self::InstallPackages { packages } => {
                let names: Vec<String> = packages.iter().map(|p| shell_quote(p)).collect();
                vec![format!("apt-get install -y {}", names.join(" "))]
            }
            Self::EnsureDirectory { path } => {
                vec![format!("mkdir -p {}", quote_path(path))]
            }
            Self::CloneRepository { url, dest } => {
                vec![format!("git clone {} {}", shell_quote(url), quote_path(dest))]
            }
            Self::CreateVirtualEnv { interpreter, dir } => {
                vec![format!("{} -m venv {}", shell_quote(interpreter), quote_path(dir))]
            }
            Self::InstallDependencies { venv, manifest } => vec![
                format!(". {}", quote_path(&venv.join("bin").join("activate"))),
                format!("pip install -r {}", quote_path(manifest)),
            ],
            Self::LaunchDetached {
                workdir,
                venv,
                entry_point,
                log,
            } => vec![
                format!("cd {}", quote_path(workdir)),
                format!(
                    "nohup {} {} > {} 2>&1 < /dev/null &",
                    quote_path(&venv.join("bin").join("python")),
                    shell_quote(entry_point),
                    quote_path(log)
                ),
            ],
        };
        for line in lines {
            out.push_str(&line);
            out.push('\n');
        }
    }
}

/// Ordered list of bootstrap steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapSequence {
    steps: Vec<BootstrapStep>,
}

impl BootstrapSequence {
    /// Build a sequence from explicit steps.
    pub fn new(steps: Vec<BootstrapStep>) -> Self {
        Self { steps }
    }

    /// The reference sequence for a worker source: refresh the index, install
    /// packages, clone, build the venv, install dependencies, launch.
    pub fn canonical(source: &WorkerSource) -> Result<Self, ConfigurationError> {
        source.validate()?;

        let checkout = source.checkout_path();
        let venv = source.venv_path();

        Ok(Self::new(vec![
            BootstrapStep::RefreshPackageIndex,
            BootstrapStep::InstallPackages {
                packages: source.packages.clone(),
            },
            BootstrapStep::EnsureDirectory {
                path: source.base_dir.clone(),
            },
            BootstrapStep::CloneRepository {
                url: source.repository_url.clone(),
                dest: checkout.clone(),
            },
            BootstrapStep::CreateVirtualEnv {
                interpreter: source.interpreter.clone(),
                dir: venv.clone(),
            },
            BootstrapStep::InstallDependencies {
                venv: venv.clone(),
                manifest: checkout.join(&source.manifest),
            },
            BootstrapStep::LaunchDetached {
                workdir: checkout.clone(),
                venv,
                entry_point: source.entry_point.clone(),
                log: checkout.join(&source.log_file),
            },
        ]))
    }

    pub fn steps(&self) -> &[BootstrapStep] {
        &self.steps
    }

    /// Render the shell script. Output depends only on the steps.
    pub fn render(&self) -> String {
        let mut out = String::from("#!/bin/bash\nset -e\nexport DEBIAN_FRONTEND=noninteractive\n");
        for (i, step) in self.steps.iter().enumerate() {
            write!(out, "\n# step {}: {}\n", i + 1, step.describe()).ok();
            step.render_into(&mut out);
        }
        out
    }
}

/// Single-quote a value for POSIX shells.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn quote_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}
