use anyhow::{anyhow, Context, Result};
use dockerfile_ast::{Dockerfile, Node, Reference};
use log::debug;
use regex::Regex;

use crate::models::DepRecord;

/// Reads the base image and staged source paths out of a parsed recipe.
pub struct Extractor {
    flag: Regex,
    stage: Regex,
    url: Regex,
}

impl Extractor {
    pub fn new() -> Result<Extractor> {
        Ok(Extractor {
            flag: Regex::new(r"^--[a-z][a-z-]*(?:=|$)")?,
            stage: Regex::new(r"^--from=")?,
            url: Regex::new(r"^\S+://")?,
        })
    }

    /// Single pass over the top level instructions. The last `FROM` wins,
    /// `ADD` and `COPY` contribute their first source path.
    pub fn extract(&self, dockerfile: &Dockerfile) -> Result<DepRecord> {
        let mut from = None;
        let mut add_paths = Vec::new();

        for node in dockerfile.children.iter() {
            match node.value.as_str() {
                "from" => {
                    from = Some(self.base_image(node)?);
                }
                "add" | "copy" => {
                    if let Some(path) = self.staged_path(node)? {
                        add_paths.push(path.to_string());
                    }
                }
                _ => (),
            }
        }

        let from = from.ok_or_else(|| anyhow!("no FROM instruction found"))?;

        Ok(DepRecord { from, add_paths })
    }

    fn base_image(&self, node: &Node) -> Result<Reference> {
        let image = node
            .args
            .iter()
            .find(|arg| !self.flag.is_match(arg))
            .ok_or_else(|| anyhow!("line {}: FROM requires an image", node.start_line))?;

        let reference = Reference::parse(image)
            .with_context(|| format!("line {}: couldn't parse FROM {}", node.start_line, image))?;
        debug!("line {}: base image {}", node.start_line, reference);

        Ok(reference)
    }

    /// The local source a staging instruction copies from, or `None` when it
    /// copies from a URL, another build stage or an inline here-document.
    fn staged_path<'a>(&self, node: &'a Node) -> Result<Option<&'a str>> {
        let mut index = 0;
        while let Some(arg) = node.arg(index) {
            if !self.flag.is_match(arg) {
                break;
            }
            if self.stage.is_match(arg) {
                debug!("line {}: skipping {}, sources come from {}", node.start_line, node.value, arg);
                return Ok(None);
            }
            index += 1;
        }

        let path = node.arg(index).ok_or_else(|| {
            anyhow!(
                "line {}: {} is missing its source path: {}",
                node.start_line,
                node.value.to_uppercase(),
                node.original
            )
        })?;

        if self.url.is_match(path) {
            debug!("line {}: skipping remote source {}", node.start_line, path);
            return Ok(None);
        }

        if path.starts_with("<<") {
            debug!("line {}: skipping inline source {}", node.start_line, path);
            return Ok(None);
        }

        Ok(Some(path))
    }
}
