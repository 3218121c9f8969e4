//! Lexical path resolution and sandbox containment.

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::verdict::DenyReason;

/// Normalize a path by resolving `.` and `..` components lexically.
///
/// `..` never climbs above the root. The filesystem is not consulted, so the
/// path does not need to exist.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

/// The current working directory of one session.
///
/// Every relative path argument is resolved against this value. It is only
/// replaced by a successful `cd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingDirectory(PathBuf);

impl WorkingDirectory {
    /// Create a working directory from an absolute path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(normalize_path(&path.into()))
    }

    /// Start from the process working directory.
    pub fn from_process() -> io::Result<Self> {
        std::env::current_dir().map(Self::new)
    }

    /// The directory as a path.
    pub fn path(&self) -> &Path {
        &self.0
    }

    pub(crate) fn set(&mut self, path: PathBuf) {
        self.0 = path;
    }
}

impl AsRef<Path> for WorkingDirectory {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// Containment checks against a fixed boundary directory.
///
/// The boundary is normalized once at construction. An empty or relative
/// boundary leaves the sandbox without a boundary, and then nothing is inside.
#[derive(Debug, Clone)]
pub struct PathSandbox {
    boundary: Option<PathBuf>,
}

impl PathSandbox {
    /// Create a sandbox rooted at `boundary`.
    pub fn new(boundary: impl AsRef<Path>) -> Self {
        let boundary = boundary.as_ref();
        if boundary.as_os_str().is_empty() {
            tracing::warn!("sandbox boundary is empty; every path check will fail");
            return Self::unbounded();
        }
        if !boundary.is_absolute() {
            tracing::warn!(
                boundary = %boundary.display(),
                "sandbox boundary is not absolute; every path check will fail"
            );
            return Self::unbounded();
        }
        Self {
            boundary: Some(normalize_path(boundary)),
        }
    }

    /// A sandbox with no boundary. Every containment check fails.
    pub fn unbounded() -> Self {
        Self { boundary: None }
    }

    /// The normalized boundary, if one is configured.
    pub fn boundary(&self) -> Option<&Path> {
        self.boundary.as_deref()
    }

    /// Resolve `path` against `cwd` and normalize the result.
    pub fn resolve(&self, path: impl AsRef<Path>, cwd: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            normalize_path(path)
        } else {
            normalize_path(&cwd.as_ref().join(path))
        }
    }

    /// Check if an absolute path is the boundary or lies beneath it.
    ///
    /// Comparison is component-wise, so `/work-evil` is not inside `/work`.
    pub fn is_within(&self, path: impl AsRef<Path>) -> bool {
        let Some(boundary) = &self.boundary else {
            return false;
        };
        let path = path.as_ref();
        if !path.is_absolute() {
            return false;
        }
        normalize_path(path).starts_with(boundary)
    }

    /// Resolve `path` and require it to be inside the boundary.
    pub fn check(
        &self,
        path: impl AsRef<Path>,
        cwd: impl AsRef<Path>,
    ) -> Result<PathBuf, DenyReason> {
        let resolved = self.resolve(path, cwd);
        if self.is_within(&resolved) {
            Ok(resolved)
        } else {
            tracing::debug!(
                path = %resolved.display(),
                boundary = ?self.boundary,
                "path escapes sandbox boundary"
            );
            Err(DenyReason::PathOutsideSandbox { path: resolved })
        }
    }
}
