//! Companion app presence checks
//!
//! A registry answers whether a package is installed. Lookups never fail:
//! any error is logged and reported as "not installed".

use std::io;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Query against the installed-application registry
pub trait CompanionRegistry: Send + Sync {
    /// Whether the given package is installed
    fn is_installed(&self, package_id: &str) -> bool;
}

/// Directory-backed registry: a package is installed when `<root>/<package_id>` exists
#[derive(Debug, Clone)]
pub struct InstalledPackages {
    root: PathBuf,
}

impl InstalledPackages {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn lookup(&self, package_id: &str) -> io::Result<bool> {
        if package_id.is_empty()
            || package_id.contains(['/', '\\'])
            || matches!(package_id, "." | "..")
        {
            return Ok(false);
        }
        match std::fs::metadata(self.root.join(package_id)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl CompanionRegistry for InstalledPackages {
    fn is_installed(&self, package_id: &str) -> bool {
        match self.lookup(package_id) {
            Ok(found) => {
                debug!("Package {} installed: {}", package_id, found);
                found
            }
            Err(e) => {
                warn!("Failed to determine whether {} is installed: {}", package_id, e);
                false
            }
        }
    }
}

/// Registry with a fixed answer
#[derive(Debug, Clone, Copy)]
pub struct StaticRegistry {
    installed: bool,
}

impl StaticRegistry {
    pub fn installed() -> Self {
        Self { installed: true }
    }

    pub fn missing() -> Self {
        Self { installed: false }
    }
}

impl CompanionRegistry for StaticRegistry {
    fn is_installed(&self, _package_id: &str) -> bool {
        self.installed
    }
}
