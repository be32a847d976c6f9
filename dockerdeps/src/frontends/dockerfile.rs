use anyhow::{Context, Result};
use dockerfile_ast::Dockerfile;
use std::{fs::File, path::Path};

use crate::{extractor::Extractor, models::DepRecord, services::RecipeFrontend};

pub struct DockerfileFrontend {
    extractor: Extractor,
}

impl DockerfileFrontend {
    pub fn new() -> Result<DockerfileFrontend> {
        Ok(DockerfileFrontend {
            extractor: Extractor::new()?,
        })
    }
}

impl RecipeFrontend for DockerfileFrontend {
    fn dependencies<P: AsRef<Path>>(&mut self, recipe_path: P) -> Result<DepRecord> {
        let recipe_path = recipe_path.as_ref();
        let recipe_file = File::open(recipe_path)
            .with_context(|| format!("couldn't open {:?}", recipe_path))?;

        let dockerfile = Dockerfile::from_reader(recipe_file)
            .with_context(|| format!("couldn't parse {:?}", recipe_path))?;

        self.extractor
            .extract(&dockerfile)
            .with_context(|| format!("in {:?}", recipe_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn reads_dependencies_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Dockerfile");
        fs::write(&path, "FROM registry.example.com/base:local\nCOPY src/ /app\n").unwrap();

        let record = DockerfileFrontend::new().unwrap().dependencies(&path).unwrap();

        assert_eq!(record.from.name(), "registry.example.com/base");
        assert_eq!(record.add_paths, vec!["src/"]);
    }

    #[test]
    fn errors_name_the_recipe() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Dockerfile");
        fs::write(&path, "FROM scratch\nCOPY --chown=root\n").unwrap();

        let err = DockerfileFrontend::new()
            .unwrap()
            .dependencies(&path)
            .unwrap_err();

        let message = format!("{:#}", err);
        assert!(message.contains("Dockerfile"), "{}", message);
        assert!(message.contains("missing its source path"), "{}", message);
    }

    #[test]
    fn syntax_errors_are_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Dockerfile");
        fs::write(&path, "# escape=x\nFROM scratch\n").unwrap();

        let err = DockerfileFrontend::new()
            .unwrap()
            .dependencies(&path)
            .unwrap_err();

        let message = format!("{:#}", err);
        assert!(message.contains("couldn't parse"), "{}", message);
        assert!(message.contains("invalid escape token"), "{}", message);
    }
}
