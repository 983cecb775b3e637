//! Installable container templates.
//!
//! # Design Decisions
//! - Package managers are probed in a fixed preference order; the first one present is queried
//! - "No package manager" and "no templates" are distinct errors
//! - Query output is one template path per line; only the file name is kept

use dashmap::DashMap;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;

/// How to list templates with one package manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageQuery {
    /// Program whose presence selects this query.
    pub manager: &'static str,
    pub program: &'static str,
    pub args: &'static [&'static str],
}

/// Preference order: Debian, CentOS, Fedora, then the template directory itself.
pub const PACKAGE_QUERIES: &[PackageQuery] = &[
    PackageQuery {
        manager: "apt-get",
        program: "dpkg",
        args: &["-L", "lxc-templates"],
    },
    PackageQuery {
        manager: "yum",
        program: "repoquery",
        args: &["-l", "lxc-templates"],
    },
    PackageQuery {
        manager: "dnf",
        program: "dnf",
        args: &["repoquery", "-l", "lxc-templates"],
    },
    PackageQuery {
        manager: "ls",
        program: "ls",
        args: &["/usr/share/lxc/templates"],
    },
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("no supported package manager")]
    NoPackageManager,

    #[error("no templates found")]
    NoTemplates,

    #[error("template query {program} failed: {reason}")]
    Query { program: String, reason: String },
}

/// Access to the host's package tooling.
pub trait TemplateBackend: Send + Sync {
    /// Whether `manager` is available.
    fn probe(&self, manager: &str) -> bool;

    /// Raw output of `query`.
    fn query(&self, query: &PackageQuery) -> Result<String, TemplateError>;
}

/// Templates installable through the first available package manager.
pub fn discover(backend: &dyn TemplateBackend) -> Result<Vec<String>, TemplateError> {
    let query = PACKAGE_QUERIES
        .iter()
        .find(|q| backend.probe(q.manager))
        .ok_or(TemplateError::NoPackageManager)?;
    tracing::debug!(manager = query.manager, program = query.program, "Listing templates");

    let output = backend.query(query)?;
    let templates: Vec<String> = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    if templates.is_empty() {
        return Err(TemplateError::NoTemplates);
    }
    Ok(templates)
}

/// Package tooling found on `PATH`.
#[derive(Debug, Clone)]
pub struct SystemTemplates {
    search: Vec<PathBuf>,
}

impl SystemTemplates {
    /// Search the directories of the process `PATH`.
    pub fn from_env() -> Self {
        let search = std::env::var_os("PATH")
            .map(|path| std::env::split_paths(&path).collect())
            .unwrap_or_default();
        Self { search }
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        self.search.iter().map(|dir| dir.join(program)).find(|p| p.is_file())
    }
}

impl TemplateBackend for SystemTemplates {
    fn probe(&self, manager: &str) -> bool {
        self.locate(manager).is_some()
    }

    fn query(&self, query: &PackageQuery) -> Result<String, TemplateError> {
        let failed = |reason: String| TemplateError::Query {
            program: query.program.to_string(),
            reason,
        };
        let program = self
            .locate(query.program)
            .ok_or_else(|| failed("not installed".to_string()))?;
        let output = Command::new(program)
            .args(query.args)
            .output()
            .map_err(|e| failed(e.to_string()))?;
        if !output.status.success() {
            return Err(failed(output.status.to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Canned package managers and query output, for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryTemplates {
    installed: DashMap<&'static str, String>,
}

impl MemoryTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `manager` available with the given query output.
    pub fn install(&self, manager: &'static str, output: impl Into<String>) {
        self.installed.insert(manager, output.into());
    }
}

impl TemplateBackend for MemoryTemplates {
    fn probe(&self, manager: &str) -> bool {
        self.installed.contains_key(manager)
    }

    fn query(&self, query: &PackageQuery) -> Result<String, TemplateError> {
        self.installed
            .get(query.manager)
            .map(|output| output.value().clone())
            .ok_or_else(|| TemplateError::Query {
                program: query.program.to_string(),
                reason: "not installed".to_string(),
            })
    }
}
