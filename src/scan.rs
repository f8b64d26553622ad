//! Candidate-type discovery
//!
//! Scans configured roots — directory trees and zip-style archives — for
//! class-bearing entries, deduplicates them, and feeds every candidate name
//! to a sink. The scanner performs no annotation filtering; it only tags
//! each candidate with the root's discovery mode so the validator can
//! decide. Package prefixes are validated before any I/O happens.

use crate::error::{ContainerError, Result};
use dashmap::DashSet;
use rayon::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// File suffix marking a class-bearing entry
const CLASS_SUFFIX: &str = ".class";

/// Reserved metadata folder never scanned for candidates
const META_FOLDER: &str = "META-INF/";

/// Reserved meta name never a candidate
const MODULE_INFO: &str = "module-info";

/// Whether every type in a root is a bean candidate, or only types that
/// carry a bean-defining annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    All,
    Annotated,
}

/// Receives every discovered candidate. Implementations must be
/// thread-safe and idempotent on duplicate class names: the parallel
/// scanner delivers from a worker pool.
pub trait ScanSink: Send + Sync {
    fn add(&self, class_name: &str, mode: DiscoveryMode);
}

/// A discovery root
#[derive(Debug, Clone)]
pub enum ScanRoot {
    /// Recursive directory walk; relative paths become dotted names
    Directory(PathBuf),
    /// Zip-style archive; entries are enumerated, never extracted
    Archive(PathBuf),
}

/// Sequential scanner over configured roots
pub struct Scanner {
    prefixes: Vec<String>,
    roots: Vec<(ScanRoot, DiscoveryMode)>,
    seen: DashSet<String, ahash::RandomState>,
}

impl Scanner {
    /// Scan everything under the given roots (no package restriction)
    pub fn new(roots: Vec<(ScanRoot, DiscoveryMode)>) -> Self {
        Self {
            prefixes: Vec::new(),
            roots,
            seen: DashSet::with_hasher(ahash::RandomState::new()),
        }
    }

    /// Restrict to package prefixes. Prefixes are validated up front;
    /// an empty list means *all packages*.
    pub fn with_prefixes(
        roots: Vec<(ScanRoot, DiscoveryMode)>,
        prefixes: Vec<String>,
    ) -> Result<Self> {
        for prefix in &prefixes {
            validate_package(prefix)?;
        }
        Ok(Self {
            prefixes,
            roots,
            seen: DashSet::with_hasher(ahash::RandomState::new()),
        })
    }

    /// Run the scan, feeding each new candidate to the sink.
    /// Returns the number of distinct candidates delivered.
    pub fn scan(&self, sink: &dyn ScanSink) -> Result<usize> {
        let mut delivered = 0;
        for (root, mode) in &self.roots {
            let names = self.collect_root(root)?;
            for name in names {
                if self.seen.insert(name.clone()) {
                    sink.add(&name, *mode);
                    delivered += 1;
                }
            }
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "contexture",
            roots = self.roots.len(),
            candidates = delivered,
            "Scan complete"
        );

        Ok(delivered)
    }

    fn collect_root(&self, root: &ScanRoot) -> Result<Vec<String>> {
        match root {
            ScanRoot::Directory(path) => self.collect_directory(path),
            ScanRoot::Archive(path) => self.collect_archive(path),
        }
    }

    fn collect_directory(&self, root: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = entry.map_err(|e| ContainerError::Scan {
                path: root.display().to_string(),
                source: std::io::Error::other(e),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");
            if let Some(name) = self.candidate_name(&relative) {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn collect_archive(&self, path: &Path) -> Result<Vec<String>> {
        let file = File::open(path).map_err(|e| ContainerError::Scan {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| ContainerError::Scan {
            path: path.display().to_string(),
            source: std::io::Error::other(e),
        })?;

        let mut names = Vec::new();
        for index in 0..archive.len() {
            // entries that cannot be read are not valid candidates
            let Ok(entry) = archive.by_index(index) else {
                #[cfg(feature = "logging")]
                trace!(target: "contexture", index, "Skipping unreadable archive entry");
                continue;
            };
            if entry.is_dir() {
                continue;
            }
            if let Some(name) = self.candidate_name(entry.name()) {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Turn an entry path into a candidate class name, applying the
    /// reserved-name and prefix filters
    fn candidate_name(&self, entry: &str) -> Option<String> {
        if entry.starts_with(META_FOLDER) {
            return None;
        }
        let stem = entry.strip_suffix(CLASS_SUFFIX)?;
        let name = stem.replace('/', ".");
        let simple = name.rsplit('.').next().unwrap_or(&name);
        if simple == MODULE_INFO {
            return None;
        }
        if self.prefixes.is_empty()
            || self
                .prefixes
                .iter()
                .any(|p| name == *p || name.starts_with(&format!("{p}.")))
        {
            Some(name)
        } else {
            None
        }
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("roots", &self.roots.len())
            .field("prefixes", &self.prefixes)
            .finish()
    }
}

/// Parallel scanner: enumerates candidates per root sequentially (the
/// I/O), then delivers them to the sink from a worker pool. The sink's
/// thread-safety and idempotence contract does the rest.
pub struct ParallelScanner {
    inner: Scanner,
}

impl ParallelScanner {
    pub fn new(roots: Vec<(ScanRoot, DiscoveryMode)>) -> Self {
        Self {
            inner: Scanner::new(roots),
        }
    }

    pub fn with_prefixes(
        roots: Vec<(ScanRoot, DiscoveryMode)>,
        prefixes: Vec<String>,
    ) -> Result<Self> {
        Ok(Self {
            inner: Scanner::with_prefixes(roots, prefixes)?,
        })
    }

    pub fn scan(&self, sink: &(dyn ScanSink)) -> Result<usize> {
        let mut delivered = 0;
        for (root, mode) in &self.inner.roots {
            let names = self.inner.collect_root(root)?;
            let fresh: Vec<String> = names
                .into_iter()
                .filter(|name| self.inner.seen.insert(name.clone()))
                .collect();
            delivered += fresh.len();
            fresh.par_iter().for_each(|name| sink.add(name, *mode));
        }
        Ok(delivered)
    }
}

/// Reject syntactically invalid package prefixes before any I/O
pub fn validate_package(prefix: &str) -> Result<()> {
    let valid_segment = |segment: &str| {
        let mut chars = segment.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    if !prefix.is_empty() && prefix.split('.').all(valid_segment) {
        Ok(())
    } else {
        Err(ContainerError::definition(format!(
            "invalid package prefix {prefix:?}"
        )))
    }
}
