use anyhow::{bail, Result};
use dockerfile_ast::Reference;
use serde::Serialize;
use std::{
    collections::{BTreeMap as Map, BTreeSet as Set},
    fmt,
    path::PathBuf,
};

/// Logical image name: the recipe's directory relative to the scan root,
/// `.` for a recipe at the root itself.
#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RecipeName(pub String);

impl RecipeName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "."
    }
}

impl fmt::Display for RecipeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What one recipe depends on, in directive order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepRecord {
    pub from: Reference,
    pub add_paths: Vec<String>,
}

/// Where a recipe's base image comes from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BaseImage {
    /// Tagged `local`: built by another recipe in the tree.
    Local { target: RecipeName },
    /// Hosted on our own registry, so buildable from the tree as well.
    RegistryRelative { target: RecipeName },
    /// Pulled from elsewhere and used as is.
    Remote { reference: Reference },
}

impl BaseImage {
    /// The recipe this base image is built from, if any.
    pub fn local_target(&self) -> Option<&RecipeName> {
        match self {
            BaseImage::Local { target } | BaseImage::RegistryRelative { target } => Some(target),
            BaseImage::Remote { .. } => None,
        }
    }
}

/// Collects one record per recipe while the tree is scanned.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Map<RecipeName, DepRecord>,
}

impl RecordStore {
    pub fn new() -> RecordStore {
        RecordStore::default()
    }

    pub fn insert(&mut self, name: RecipeName, record: DepRecord) -> Result<()> {
        if self.records.contains_key(&name) {
            bail!("more than one recipe maps to the image name {:?}", name.0);
        }

        self.records.insert(name, record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Ends the scan phase.
    pub fn freeze(self) -> Records {
        Records(self.records)
    }
}

/// Read-only view of a fully populated [`RecordStore`], ordered by name.
#[derive(Debug)]
pub struct Records(Map<RecipeName, DepRecord>);

impl Records {
    pub fn contains(&self, name: &RecipeName) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RecipeName, &DepRecord)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// A recipe with its base image classified and its staged files resolved.
#[derive(Clone, Debug, Serialize)]
pub struct ImageNode {
    pub name: RecipeName,
    /// Repository the image is built as, registry prefix included.
    pub image: String,
    /// Build context relative to the scan root.
    pub context: PathBuf,
    pub base: BaseImage,
    /// Every staged file, relative to the scan root.
    pub files: Vec<PathBuf>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ImageGraph {
    pub images: Vec<ImageNode>,
}

impl ImageGraph {
    /// Distinct remote base images, in order.
    pub fn remotes(&self) -> Set<&Reference> {
        self.images
            .iter()
            .filter_map(|node| match &node.base {
                BaseImage::Remote { reference } => Some(reference),
                _ => None,
            })
            .collect()
    }
}
