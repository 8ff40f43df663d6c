// src/catalog.rs

//! Package catalog
//!
//! The catalog maps a package build (name, version, OS, architecture) to the
//! URL it can be installed from. It arrives from the control plane as a
//! whole document and is never edited in place: each update replaces the
//! previous snapshot entirely.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A resolved, downloadable package build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    #[serde(rename = "package")]
    pub name: String,
    pub version: String,
    #[serde(rename = "platform")]
    pub os: String,
    pub arch: String,
    pub url: String,
}

/// Target platform of a package build, in catalog naming
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Platform of the running host
    ///
    /// Catalogs use `amd64`/`arm64`/`386` for architectures.
    pub fn host() -> Self {
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "386",
            other => other,
        };
        Self::new(std::env::consts::OS, arch)
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::host()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PackageKey {
    name: String,
    version: String,
    os: String,
    arch: String,
}

impl PackageKey {
    fn of(package: &Package) -> Self {
        Self {
            name: package.name.clone(),
            version: package.version.clone(),
            os: package.os.clone(),
            arch: package.arch.clone(),
        }
    }
}

/// Wire shape of a catalog update
#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    packages: Vec<Package>,
}

/// Immutable lookup table of package builds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "CatalogDocument", into = "CatalogDocument")]
pub struct Catalog {
    packages: HashMap<PackageKey, Package>,
}

impl Catalog {
    /// Build a catalog; a later duplicate of the same build wins
    pub fn new(packages: impl IntoIterator<Item = Package>) -> Self {
        let packages = packages
            .into_iter()
            .map(|package| (PackageKey::of(&package), package))
            .collect();
        Self { packages }
    }

    /// Look up one build
    pub fn resolve(&self, name: &str, version: &str, platform: &Platform) -> Option<&Package> {
        let key = PackageKey {
            name: name.to_string(),
            version: version.to_string(),
            os: platform.os.clone(),
            arch: platform.arch.clone(),
        };
        self.packages.get(&key)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl From<CatalogDocument> for Catalog {
    fn from(document: CatalogDocument) -> Self {
        Catalog::new(document.packages)
    }
}

impl From<Catalog> for CatalogDocument {
    fn from(catalog: Catalog) -> Self {
        let mut packages: Vec<Package> = catalog.packages.into_values().collect();
        packages.sort_by(|a, b| {
            (&a.name, &a.version, &a.os, &a.arch).cmp(&(&b.name, &b.version, &b.os, &b.arch))
        });
        CatalogDocument { packages }
    }
}
