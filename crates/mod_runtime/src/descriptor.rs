//! Mod manifests and the immutable descriptors built from them.

use crate::error::{ModError, Result};
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Raw manifest record as found in a mod directory (`mod.json`).
///
/// Every field except `id` may be absent; defaults are applied when the
/// manifest is frozen into a [`ModDescriptor`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModManifest {
    pub id: String,
    pub display_name: String,
    pub author: String,
    pub version: String,
    /// Minimum manager version this mod requires.
    pub manager_version: String,
    /// Minimum host version this mod requires.
    pub host_version: String,
    /// Each entry is `"<id>-<major.minor.patch>"` or a bare id.
    pub requirements: Vec<String>,
    /// Defaults to `<id>.<platform dylib extension>` when empty.
    pub artifact_name: String,
    /// `[<artifactFile>]<Namespace.Class>.<Method>`.
    pub entry_point: String,
    /// Remote release-feed URL polled by the update checker.
    pub repository: String,
}

/// A required mod reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub id: String,
    /// Minimum acceptable version, when the manifest entry carried one.
    pub min_version: Option<Version>,
}

impl Requirement {
    /// Parse `"<id>-<d.d.d>"` into an id plus minimum version; anything
    /// that does not end in a dotted-numeric suffix is a bare id.
    pub fn parse(raw: &str) -> Requirement {
        if let Some(pos) = raw.rfind('-') {
            let suffix = &raw[pos + 1..];
            if looks_like_version(suffix) {
                return Requirement {
                    id: raw[..pos].to_string(),
                    min_version: Some(Version::parse(suffix)),
                };
            }
        }
        Requirement {
            id: raw.to_string(),
            min_version: None,
        }
    }
}

fn looks_like_version(s: &str) -> bool {
    let mut segments = 0;
    for segment in s.split('.') {
        if !segment.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            return false;
        }
        segments += 1;
    }
    segments >= 3
}

/// How the final entry-point segment is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Method,
    /// `ctor` — instance-constructor semantics.
    Constructor,
    /// `cctor` — static-initializer semantics.
    StaticConstructor,
}

/// Parsed `[<artifactFile>]<Namespace.Class>.<Method>` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// Bracketed artifact filename, when present.
    pub artifact: Option<String>,
    /// Dotted class path, everything up to the final segment.
    pub class_path: String,
    /// The final segment.
    pub method: String,
}

impl EntryPoint {
    pub fn parse(raw: &str) -> Result<EntryPoint> {
        let (artifact, rest) = match raw.strip_prefix('[') {
            Some(stripped) => match stripped.split_once(']') {
                Some((file, rest)) => (Some(file.to_string()), rest),
                None => {
                    return Err(ModError::Validation(format!(
                        "unterminated artifact reference in entry point '{raw}'"
                    )))
                }
            },
            None => (None, raw),
        };

        let (class_path, method) = rest.rsplit_once('.').ok_or_else(|| {
            ModError::Validation(format!("entry point '{raw}' has no method separator"))
        })?;
        if class_path.is_empty() || method.is_empty() {
            return Err(ModError::Validation(format!(
                "entry point '{raw}' is missing a class path or method name"
            )));
        }

        Ok(EntryPoint {
            artifact,
            class_path: class_path.to_string(),
            method: method.to_string(),
        })
    }

    pub fn kind(&self) -> EntryKind {
        match self.method.as_str() {
            "ctor" => EntryKind::Constructor,
            "cctor" => EntryKind::StaticConstructor,
            _ => EntryKind::Method,
        }
    }

    /// `<class_path>.<method>`, the invocation-cache key for the entry call.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.class_path, self.method)
    }
}

/// Immutable metadata describing one discovered mod.
///
/// Built once at discovery; the owning [`crate::instance::ModInstance`]
/// shares its lifetime.
#[derive(Debug, Clone)]
pub struct ModDescriptor {
    pub id: String,
    pub display_name: String,
    pub author: String,
    pub version: Version,
    /// Zero when the manifest did not declare a minimum manager version.
    pub manager_version: Version,
    /// Zero when the manifest did not declare a minimum host version.
    pub host_version: Version,
    pub requirements: Vec<Requirement>,
    pub artifact_name: String,
    /// Raw entry-point string; validated when the mod is loaded, not here,
    /// so a broken entry point still yields an instance that can report
    /// its error state.
    pub entry_point: String,
    pub repository: Option<String>,
    /// The mod's directory.
    pub dir: PathBuf,
}

impl ModDescriptor {
    /// Validate and freeze a raw manifest.
    ///
    /// Only the id is required here; everything else is defaulted or
    /// checked later during `Load()`.
    pub fn from_manifest(manifest: ModManifest, dir: PathBuf) -> Result<Self> {
        if manifest.id.trim().is_empty() {
            return Err(ModError::Validation(format!(
                "manifest in '{}' has no id",
                dir.display()
            )));
        }

        let artifact_name = if manifest.artifact_name.is_empty() {
            format!("{}.{}", manifest.id, artifact_extension())
        } else {
            manifest.artifact_name
        };
        let display_name = if manifest.display_name.is_empty() {
            manifest.id.clone()
        } else {
            manifest.display_name
        };

        Ok(ModDescriptor {
            version: Version::parse(&manifest.version),
            manager_version: if manifest.manager_version.is_empty() {
                Version::ZERO
            } else {
                Version::parse(&manifest.manager_version)
            },
            host_version: if manifest.host_version.is_empty() {
                Version::ZERO
            } else {
                Version::parse(&manifest.host_version)
            },
            requirements: manifest
                .requirements
                .iter()
                .map(|raw| Requirement::parse(raw))
                .collect(),
            id: manifest.id,
            display_name,
            author: manifest.author,
            artifact_name,
            entry_point: manifest.entry_point,
            repository: if manifest.repository.is_empty() {
                None
            } else {
                Some(manifest.repository)
            },
            dir,
        })
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.dir.join(&self.artifact_name)
    }

    /// Artifact path, honoring an entry point that names its own file
    /// (`[<file>]...`). Falls back to [`Self::artifact_path`] when the
    /// entry point has no bracketed reference or does not parse.
    pub fn resolved_artifact_path(&self) -> PathBuf {
        match EntryPoint::parse(&self.entry_point) {
            Ok(EntryPoint {
                artifact: Some(file),
                ..
            }) => self.dir.join(file),
            _ => self.artifact_path(),
        }
    }
}

/// Read and freeze a manifest file.
pub fn read_manifest(path: &Path) -> Result<ModDescriptor> {
    let raw = std::fs::read_to_string(path)?;
    let manifest: ModManifest = serde_json::from_str(&raw)?;
    let dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    ModDescriptor::from_manifest(manifest, dir)
}

/// Platform dynamic-library extension used for defaulted artifact names.
pub fn artifact_extension() -> &'static str {
    #[cfg(target_os = "windows")]
    return "dll";

    #[cfg(target_os = "macos")]
    return "dylib";

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    return "so";
}
