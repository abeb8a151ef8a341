//! Manifest discovery across configured search paths.
//!
//! # Responsibility
//! - Expand search-path patterns into manifest files.
//! - Derive catalog keys from manifest locations.
//! - Build the full catalog for one detection pass.
//!
//! # Invariants
//! - Detection is fail-fast: a reserved name or undecodable manifest aborts
//!   the pass and no partial catalog is returned.
//! - A later search path overwrites an earlier one for the same name.
//! - Reserved names are never registered.

use crate::extension::files::FileAccess;
use crate::extension::manifest::{
    manifest_dir, ExtensionDescriptor, ManifestError, APP_EXTENSION_NAME, MANIFEST_FILENAME,
};
use log::{debug, error, info};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Result of one detection pass, keyed by extension name.
pub type Catalog = BTreeMap<String, ExtensionDescriptor>;

pub type DetectResult<T> = Result<T, DetectError>;

/// Identifiers that can never be registered as extension names.
pub const RESERVED_NAMES: &[&str] = &[
    "orchestra",
    "resources",
    "orchestra/asset",
    "orchestra/auth",
    "orchestra/extension",
    "orchestra/facile",
    "orchestra/foundation",
    "orchestra/html",
    "orchestra/memory",
    "orchestra/model",
    "orchestra/platform",
    "orchestra/resources",
    "orchestra/routing",
    "orchestra/services",
    "orchestra/support",
    "orchestra/testbench",
    "orchestra/view",
    "orchestra/widget",
];

/// Walks search paths and decodes every manifest found.
pub struct Finder {
    files: Arc<dyn FileAccess>,
    app_path: PathBuf,
    paths: Vec<String>,
    manifest_filename: String,
    reserved: BTreeSet<String>,
}

impl Finder {
    /// Creates a finder over the application root plus `vendor/*/*` and
    /// `workbench/*/*` package directories under `base_path`.
    pub fn new(files: Arc<dyn FileAccess>, app_path: &Path, base_path: &Path) -> Self {
        let base = trim_trailing_slash(&base_path.to_string_lossy()).to_string();
        Self {
            files,
            app_path: normalize_dir(app_path),
            paths: vec![
                format!("{}/", trim_trailing_slash(&app_path.to_string_lossy())),
                format!("{base}/vendor/*/*/"),
                format!("{base}/workbench/*/*/"),
            ],
            manifest_filename: MANIFEST_FILENAME.to_string(),
            reserved: RESERVED_NAMES.iter().map(|name| name.to_string()).collect(),
        }
    }

    /// Overrides the manifest filename matched in each search path.
    pub fn with_manifest_filename(mut self, filename: impl Into<String>) -> Self {
        self.manifest_filename = filename.into();
        self
    }

    /// Appends a search-path pattern unless the exact string is already known.
    pub fn add_path(&mut self, path: impl Into<String>) -> &mut Self {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
        self
    }

    /// Adds one name to the reserved set.
    pub fn reserve(&mut self, name: impl Into<String>) -> &mut Self {
        self.reserved.insert(name.into());
        self
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn manifest_filename(&self) -> &str {
        &self.manifest_filename
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(name)
    }

    /// Detects every extension reachable from the configured search paths.
    ///
    /// # Errors
    /// - [`DetectError::ReservedName`] when a derived name is reserved.
    /// - [`DetectError::Manifest`] when a manifest cannot be decoded.
    /// - [`DetectError::Read`] when a matched manifest cannot be read.
    pub fn detect(&self) -> DetectResult<Catalog> {
        let started_at = Instant::now();
        let mut catalog = Catalog::new();

        for path in &self.paths {
            let pattern = manifest_pattern(path.as_str(), self.manifest_filename.as_str());

            for manifest in self.files.glob(&pattern) {
                let Some(name) = self.derive_name(&manifest) else {
                    debug!(
                        "event=manifest_skip module=finder status=skip path={}",
                        manifest.display()
                    );
                    continue;
                };

                if self.is_reserved(name.as_str()) {
                    error!(
                        "event=extension_detect module=finder status=error error_code=reserved_name name={}",
                        name
                    );
                    return Err(DetectError::ReservedName(name));
                }

                let descriptor = self.read_descriptor(name.as_str(), &manifest)?;
                catalog.insert(name, descriptor);
            }
        }

        info!(
            "event=extension_detect module=finder status=ok count={} duration_ms={}",
            catalog.len(),
            started_at.elapsed().as_millis()
        );
        Ok(catalog)
    }

    fn read_descriptor(&self, name: &str, manifest: &Path) -> DetectResult<ExtensionDescriptor> {
        let raw = self.files.read(manifest).map_err(|err| DetectError::Read {
            path: manifest.to_path_buf(),
            message: err.to_string(),
        })?;

        ExtensionDescriptor::from_manifest(name, manifest_dir(manifest), &raw).map_err(|source| {
            error!(
                "event=extension_detect module=finder status=error error_code=manifest_decode path={}",
                manifest.display()
            );
            DetectError::Manifest {
                path: manifest.to_path_buf(),
                source,
            }
        })
    }

    /// Derives `app` or `vendor/package` from a manifest location.
    ///
    /// Returns `None` when fewer than two directory segments precede the
    /// manifest.
    fn derive_name(&self, manifest: &Path) -> Option<String> {
        let dir = manifest.parent()?;
        if normalize_dir(dir) == self.app_path {
            return Some(APP_EXTENSION_NAME.to_string());
        }

        let segments: Vec<String> = dir
            .components()
            .filter_map(|component| match component {
                Component::Normal(segment) => Some(segment.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        match segments.as_slice() {
            [.., vendor, package] => Some(format!("{vendor}/{package}")),
            _ => None,
        }
    }
}

/// Drops `.` components so `./app` and glob's `app` compare equal.
fn normalize_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

fn manifest_pattern(path: &str, filename: &str) -> String {
    match trim_trailing_slash(path) {
        "/" => format!("/{filename}"),
        dir => format!("{dir}/{filename}"),
    }
}

fn trim_trailing_slash(value: &str) -> &str {
    let trimmed = value.trim_end_matches('/');
    if trimmed.is_empty() && value.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}

/// Detection errors. Every variant aborts the whole pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectError {
    ReservedName(String),
    Manifest {
        path: PathBuf,
        source: ManifestError,
    },
    Read {
        path: PathBuf,
        message: String,
    },
}

impl Display for DetectError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReservedName(name) => {
                write!(f, "unable to register reserved name [{name}] as extension")
            }
            Self::Manifest { path, source } => {
                write!(f, "cannot decode manifest [{}]: {source}", path.display())
            }
            Self::Read { path, message } => {
                write!(f, "cannot read manifest [{}]: {message}", path.display())
            }
        }
    }
}

impl Error for DetectError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Manifest { source, .. } => Some(source),
            Self::ReservedName(_) | Self::Read { .. } => None,
        }
    }
}
