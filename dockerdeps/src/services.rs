use anyhow::Result;
use std::{io::Write, path::Path};

use crate::models::{DepRecord, ImageGraph};

pub trait RecipeFrontend {
    /// Reads one recipe file and returns what it depends on.
    fn dependencies<P: AsRef<Path>>(&mut self, recipe_path: P) -> Result<DepRecord>;
}

pub trait RulesBackend {
    fn render(&mut self, graph: &ImageGraph, out: &mut dyn Write) -> Result<()>;
}
