use anyhow::{anyhow, Context, Result};
use dockerfile_ast::Reference;
use log::{debug, info, warn};
use std::path::PathBuf;

use crate::{
    classifier::{Classifier, LOCAL_TAG},
    filedeps::file_dependencies,
    models::{ImageGraph, ImageNode, RecipeName, RecordStore, Records},
    scanner::find_recipes,
    services::{RecipeFrontend, RulesBackend},
};

pub struct Controller {
    root: PathBuf,
    records: Records,
}

impl Controller {
    /// Reads every recipe below `root`. Any recipe that fails to parse
    /// fails the whole scan.
    pub fn scan<P, F>(root: P, file_name: &str, frontend: &mut F) -> Result<Controller>
    where
        P: Into<PathBuf>,
        F: RecipeFrontend,
    {
        let root = root.into();
        let recipes = find_recipes(&root, file_name)?;
        info!("found {} recipes below {:?}", recipes.len(), root);

        let mut store = RecordStore::new();
        for (name, recipe_path) in recipes {
            let record = frontend.dependencies(&recipe_path)?;
            debug!(
                "{}: from {}, {} staged paths",
                name,
                record.from,
                record.add_paths.len()
            );

            store
                .insert(name, record)
                .with_context(|| format!("while reading {:?}", recipe_path))?;
        }

        debug!("stored {} records", store.len());

        Ok(Controller {
            root,
            records: store.freeze(),
        })
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    /// Classifies every base image and resolves every staged file.
    pub fn graph(&self, classifier: &Classifier) -> Result<ImageGraph> {
        let mut graph = ImageGraph::default();

        for (name, record) in self.records.iter() {
            let base = classifier
                .classify(&record.from)
                .with_context(|| format!("in recipe {}", name))?;

            if let Some(target) = base.local_target() {
                if !self.records.contains(target) {
                    warn!(
                        "{}: no recipe below {:?} builds the base image {}",
                        name, self.root, record.from
                    );
                }
            }

            let files = file_dependencies(&self.root, name, &record.add_paths)?;

            let image = self.image_name(name, classifier.registry())?;
            if Reference::parse(&format!("{}:{}", image, LOCAL_TAG)).is_err() {
                warn!("{}: {:?} is not a valid image name", name, image);
            }

            graph.images.push(ImageNode {
                name: name.clone(),
                image,
                context: PathBuf::from(name.as_str()),
                base,
                files,
            });
        }

        info!(
            "resolved {} images with {} remote base images",
            graph.images.len(),
            graph.remotes().len()
        );

        Ok(graph)
    }

    /// Renders the whole graph into memory, so a failure never leaves
    /// partial rules behind.
    pub fn rules(&self, classifier: &Classifier, backend: &mut dyn RulesBackend) -> Result<Vec<u8>> {
        let graph = self.graph(classifier)?;

        let mut rules = Vec::new();
        backend.render(&graph, &mut rules)?;

        Ok(rules)
    }

    /// Repository an image is built as. The root recipe borrows the name
    /// of the root directory.
    fn image_name(&self, name: &RecipeName, registry: Option<&str>) -> Result<String> {
        let repository = if name.is_root() {
            let root = self.root.canonicalize()?;
            root.file_name()
                .and_then(|path| path.to_str())
                .ok_or_else(|| anyhow!("Couldn't determine an image name for the recipe in {:?}.", root))?
                .to_string()
        } else {
            name.as_str().to_string()
        };

        let image = match registry {
            Some(prefix) if prefix.ends_with('/') => format!("{}{}", prefix, repository),
            Some(prefix) => format!("{}/{}", prefix, repository),
            None => repository,
        };

        Ok(image)
    }
}
