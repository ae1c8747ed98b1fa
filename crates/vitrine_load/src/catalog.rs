//! Asset catalog: the declarative list of assets and their candidate formats.
//!
//! The catalog is built once at startup from `CatalogEntry` records (the
//! configuration shape) and never mutated afterwards.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while building a catalog.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Asset name is empty")]
    EmptyName,

    #[error("Invalid asset name {0:?}: names must be a single path component")]
    InvalidName(String),

    #[error("Duplicate asset name: {0}")]
    DuplicateName(String),
}

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Storage formats a candidate can be decoded from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FormatTag {
    /// Binary glTF 2.0
    Glb,
    /// JSON glTF 2.0
    Gltf,
    /// Wavefront OBJ with an MTL material sidecar
    Obj,
    /// Stanford polygon file
    Ply,
}

/// Decoding strategy behind a format tag.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FormatKind {
    /// Geometry plus hierarchy in one resource
    BundledScene,
    /// Geometry resource plus a material sidecar that must decode first
    GeometryMaterialPair,
    /// Geometry only; the material is synthesized
    RawGeometry,
}

impl FormatTag {
    pub const ALL: [FormatTag; 4] = [FormatTag::Glb, FormatTag::Gltf, FormatTag::Obj, FormatTag::Ply];

    /// File extension of the primary resource.
    pub fn extension(self) -> &'static str {
        match self {
            FormatTag::Glb => "glb",
            FormatTag::Gltf => "gltf",
            FormatTag::Obj => "obj",
            FormatTag::Ply => "ply",
        }
    }

    pub fn kind(self) -> FormatKind {
        match self {
            FormatTag::Glb | FormatTag::Gltf => FormatKind::BundledScene,
            FormatTag::Obj => FormatKind::GeometryMaterialPair,
            FormatTag::Ply => FormatKind::RawGeometry,
        }
    }

    /// Extension of the sidecar resource living next to the primary one.
    pub fn sidecar_extension(self) -> Option<&'static str> {
        match self.kind() {
            FormatKind::GeometryMaterialPair => Some("mtl"),
            _ => None,
        }
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A format string that names no supported decoder.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown format tag: {0}")]
pub struct UnknownFormat(pub String);

impl FromStr for FormatTag {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ext = s.trim().trim_start_matches('.');
        FormatTag::ALL
            .into_iter()
            .find(|tag| tag.extension().eq_ignore_ascii_case(ext))
            .ok_or_else(|| UnknownFormat(s.to_string()))
    }
}

/// Catalog input record, as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,

    #[serde(alias = "exts")]
    pub formats: Vec<String>,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>, formats: &[&str]) -> Self {
        Self {
            name: name.into(),
            formats: formats.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// One named asset and its candidate formats in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDescriptor {
    name: String,
    formats: Vec<FormatTag>,
}

impl AssetDescriptor {
    pub fn new(name: impl Into<String>, formats: Vec<FormatTag>) -> Self {
        Self {
            name: name.into(),
            formats,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Candidate formats, first declared first tried.
    pub fn formats(&self) -> &[FormatTag] {
        &self.formats
    }

    /// Convert a configuration record. Unknown format strings are skipped
    /// with a warning; repeated formats keep their first position.
    pub fn from_entry(entry: &CatalogEntry) -> Self {
        let mut formats = Vec::with_capacity(entry.formats.len());
        for raw in &entry.formats {
            match raw.parse::<FormatTag>() {
                Ok(tag) if formats.contains(&tag) => {
                    log::warn!("Asset {}: format {} listed twice, keeping first", entry.name, tag);
                }
                Ok(tag) => formats.push(tag),
                Err(e) => log::warn!("Asset {}: {}, skipping", entry.name, e),
            }
        }
        Self::new(entry.name.clone(), formats)
    }
}

/// The immutable, ordered set of asset descriptors.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    descriptors: Vec<Arc<AssetDescriptor>>,
}

impl Catalog {
    /// Build a catalog, validating names.
    pub fn new(descriptors: Vec<AssetDescriptor>) -> CatalogResult<Self> {
        let mut seen = HashSet::new();
        for descriptor in &descriptors {
            validate_name(descriptor.name())?;
            if !seen.insert(descriptor.name().to_string()) {
                return Err(CatalogError::DuplicateName(descriptor.name().to_string()));
            }
            if descriptor.formats().is_empty() {
                log::warn!("Asset {} has no usable formats and will never load", descriptor.name());
            }
        }

        Ok(Self {
            descriptors: descriptors.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn from_entries(entries: &[CatalogEntry]) -> CatalogResult<Self> {
        Self::new(entries.iter().map(AssetDescriptor::from_entry).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<AssetDescriptor>> {
        self.descriptors.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<AssetDescriptor>> {
        self.descriptors.iter().find(|d| d.name() == name)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn validate_name(name: &str) -> CatalogResult<()> {
    if name.is_empty() {
        return Err(CatalogError::EmptyName);
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(CatalogError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Where an asset's resources live: `<asset_root>/<name>/<name>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLocation {
    dir: PathBuf,
    name: String,
}

impl AssetLocation {
    pub fn new(asset_root: &Path, name: &str) -> Self {
        Self {
            dir: asset_root.join(name),
            name: name.to_string(),
        }
    }

    /// Folder holding every resource of the asset.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<dir>/<name>.<ext>` for any extension.
    pub fn file(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", self.name, extension))
    }

    /// Primary resource for a format.
    pub fn primary(&self, format: FormatTag) -> PathBuf {
        self.file(format.extension())
    }

    /// Resource referenced from inside another resource, relative to the folder.
    pub fn relative(&self, uri: &str) -> PathBuf {
        self.dir.join(uri)
    }
}
