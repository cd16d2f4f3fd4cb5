//! Error types shared across runtime components.

use std::path::PathBuf;

use thiserror::Error;

use crate::compiler::{Diagnostic, Fault, render};
use crate::core::AppId;
use crate::process::ProcessId;
use crate::registry::manifest::ManifestError;

/// A fault raised under an app process that no app owns.
#[derive(Debug, Error)]
#[error("host fault while running {app} ({pid}): {fault}")]
pub struct HostFault {
    pub pid: ProcessId,
    pub app: AppId,
    #[source]
    pub fault: Fault,
}

/// Failure of the host loop itself.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Every unattributed fault of one tick, in the order they were raised.
    #[error("{}", host_faults_text(.0))]
    HostFaults(Vec<HostFault>),
}

fn host_faults_text(faults: &[HostFault]) -> String {
    match faults {
        [one] => one.to_string(),
        many => {
            let lines: Vec<_> = many.iter().map(|fault| format!("  {fault}")).collect();
            format!("{} host faults:\n{}", many.len(), lines.join("\n"))
        }
    }
}

/// Why an app failed to load or reload.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("cannot read sources of `{}`", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("no `.hd` source files in `{}`", .0.display())]
    NoSources(PathBuf),

    #[error("{app} failed to compile:\n{}", render(.diagnostics))]
    Compile { app: AppId, diagnostics: Vec<Diagnostic> },

    #[error("{app}: entry point `{entry}` not found")]
    MissingEntry { app: AppId, entry: String },

    #[error("{app}: entry point `{entry}` takes {arity} parameters (expected 0 or 1)")]
    UnsupportedArity { app: AppId, entry: String, arity: usize },

    #[error("{0} is not registered")]
    NotRegistered(AppId),

    #[error("manifest of {expected} now declares `{found}`")]
    IdChanged { expected: AppId, found: AppId },
}

impl LoadError {
    /// Compiler diagnostics carried by this error, if any.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::Compile { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("`{}` is not an app directory", .0.display())]
    NotAnApp(PathBuf, #[source] ManifestError),

    #[error("{0} is already installed")]
    AlreadyInstalled(AppId),

    #[error("{0} is busy (reload or install in progress)")]
    Busy(AppId),

    #[error("{0} is not installed")]
    NotInstalled(AppId),

    #[error("cannot copy `{}` to `{}`", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot remove `{}`", .0.display())]
    Remove(PathBuf, #[source] std::io::Error),

    #[error("{0} was copied but failed to load")]
    LoadFailed(AppId, #[source] LoadError),
}
