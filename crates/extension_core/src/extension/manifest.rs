//! Extension manifest decoding and descriptor model.
//!
//! # Responsibility
//! - Decode one manifest document into a fixed-shape descriptor.
//! - Apply documented defaults for every optional manifest field.
//!
//! # Invariants
//! - Decoding is all-or-nothing: malformed input never yields a partially
//!   populated descriptor.
//! - `path` and `name` are derived from the manifest location, never read from
//!   manifest contents.
//! - Unknown manifest keys are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Fixed manifest filename looked up in every search path.
pub const MANIFEST_FILENAME: &str = "orchestra.json";
/// Version marker used when a manifest does not declare `version`.
pub const ANY_VERSION: &str = ">0";
/// Catalog key reserved for the manifest living in the application root.
pub const APP_EXTENSION_NAME: &str = "app";

/// Free-form configuration attached to an extension.
pub type ConfigMap = serde_json::Map<String, Value>;

pub type ManifestResult<T> = Result<T, ManifestError>;

/// Descriptive metadata declared by a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionMetadata {
    /// Display name declared in the manifest, distinct from the catalog key.
    pub title: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub url: Option<String>,
    /// Version constraint string; [`ANY_VERSION`] when undeclared.
    pub version: String,
}

impl Default for ExtensionMetadata {
    fn default() -> Self {
        Self {
            title: None,
            description: None,
            author: None,
            url: None,
            version: ANY_VERSION.to_string(),
        }
    }
}

/// Normalized record for one discovered extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionDescriptor {
    /// Catalog key: `app` or `vendor/package`.
    pub name: String,
    /// Directory containing the manifest.
    pub path: PathBuf,
    pub metadata: ExtensionMetadata,
    #[serde(default)]
    pub config: ConfigMap,
    /// Service identifiers registered when the extension starts.
    #[serde(default)]
    pub provides: Vec<String>,
}

impl ExtensionDescriptor {
    /// Decodes raw manifest bytes into a descriptor for `name` at `path`.
    ///
    /// # Errors
    /// - Returns [`ManifestError`] when the document is malformed, empty,
    ///   `null`, not an object, carries mistyped fields, or when `name` is
    ///   blank.
    pub fn from_manifest(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        raw: &[u8],
    ) -> ManifestResult<Self> {
        parse_manifest(raw)?.into_descriptor(name, path)
    }

    /// Validates descriptor-level invariants.
    pub fn validate(&self) -> ManifestResult<()> {
        if self.name.trim().is_empty() {
            return Err(ManifestError::EmptyName);
        }
        if self.metadata.version.trim().is_empty() {
            return Err(ManifestError::InvalidField(
                "version must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Decoded manifest contents before location-derived fields are attached.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ManifestDocument {
    pub name: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub url: Option<String>,
    pub version: Option<String>,
    pub config: Option<ConfigMap>,
    pub provide: Option<Vec<String>>,
}

impl ManifestDocument {
    /// Attaches the derived catalog key and directory, filling defaults.
    pub fn into_descriptor(
        self,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> ManifestResult<ExtensionDescriptor> {
        let descriptor = ExtensionDescriptor {
            name: name.into(),
            path: path.into(),
            metadata: ExtensionMetadata {
                title: self.name,
                description: self.description,
                author: self.author,
                url: self.url,
                version: self.version.unwrap_or_else(|| ANY_VERSION.to_string()),
            },
            config: self.config.unwrap_or_default(),
            provides: self.provide.unwrap_or_default(),
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}

/// Decodes one manifest document.
///
/// # Errors
/// - [`ManifestError::Empty`] for blank input.
/// - [`ManifestError::Syntax`] when the input is not valid JSON.
/// - [`ManifestError::NullDocument`] / [`ManifestError::NotAnObject`] for
///   well-formed JSON that is not a manifest object.
/// - [`ManifestError::InvalidField`] when a known key has the wrong type.
pub fn parse_manifest(raw: &[u8]) -> ManifestResult<ManifestDocument> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(ManifestError::Empty);
    }

    let value: Value =
        serde_json::from_slice(raw).map_err(|err| ManifestError::Syntax(err.to_string()))?;
    match value {
        Value::Null => Err(ManifestError::NullDocument),
        Value::Object(_) => serde_json::from_value(value)
            .map_err(|err| ManifestError::InvalidField(err.to_string())),
        _ => Err(ManifestError::NotAnObject),
    }
}

/// Returns the directory a manifest file lives in.
pub fn manifest_dir(manifest: &Path) -> PathBuf {
    manifest
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

/// Manifest decode errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    Empty,
    Syntax(String),
    NullDocument,
    NotAnObject,
    InvalidField(String),
    EmptyName,
}

impl Display for ManifestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "manifest is empty"),
            Self::Syntax(reason) => write!(f, "manifest is not valid JSON: {reason}"),
            Self::NullDocument => write!(f, "manifest decodes to null"),
            Self::NotAnObject => write!(f, "manifest must be a JSON object"),
            Self::InvalidField(reason) => write!(f, "manifest field is invalid: {reason}"),
            Self::EmptyName => write!(f, "extension name must not be empty"),
        }
    }
}

impl Error for ManifestError {}
