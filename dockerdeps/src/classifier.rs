use anyhow::{anyhow, Result};
use dockerfile_ast::Reference;

use crate::models::{BaseImage, RecipeName};

/// Tag marking a base image as built from this tree rather than pulled.
pub const LOCAL_TAG: &str = "local";

pub struct Classifier {
    registry: Option<String>,
}

impl Classifier {
    pub fn new(registry: Option<String>) -> Classifier {
        Classifier {
            registry: registry.filter(|registry| !registry.is_empty()),
        }
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn classify(&self, reference: &Reference) -> Result<BaseImage> {
        if reference.tag() == Some(LOCAL_TAG) {
            let target = self.strip_registry(reference.name()).ok_or_else(|| {
                anyhow!(
                    "FROM {} uses a registry other than {:?}",
                    reference,
                    self.registry.as_deref().unwrap_or_default()
                )
            })?;

            return Ok(BaseImage::Local {
                target: RecipeName(target.into()),
            });
        }

        if self.registry.is_some() {
            if let Some(target) = self.strip_registry(reference.name()) {
                return Ok(BaseImage::RegistryRelative {
                    target: RecipeName(target.into()),
                });
            }
        }

        Ok(BaseImage::Remote {
            reference: reference.clone(),
        })
    }

    /// Repository path below the registry prefix. Without a registry the
    /// whole name is the path.
    fn strip_registry<'a>(&self, name: &'a str) -> Option<&'a str> {
        let prefix = match &self.registry {
            Some(prefix) => prefix,
            None => return Some(name),
        };

        let rest = name.strip_prefix(prefix.as_str())?;
        let rest = if prefix.ends_with('/') {
            rest
        } else {
            rest.strip_prefix('/')?
        };

        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}
