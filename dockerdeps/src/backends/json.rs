use anyhow::Result;
use dockerfile_ast::Reference;
use serde::Serialize;
use std::io::Write;

use crate::{
    backends::pull_marker,
    models::{ImageGraph, ImageNode},
    services::RulesBackend,
};

#[derive(Serialize)]
struct Document<'a> {
    images: &'a [ImageNode],
    remotes: Vec<Remote<'a>>,
}

#[derive(Serialize)]
struct Remote<'a> {
    reference: &'a Reference,
    marker: String,
}

/// Dumps the image graph as JSON, for tooling that wants the dependencies
/// without parsing Make syntax.
pub struct JsonBackend;

impl JsonBackend {
    pub fn new() -> JsonBackend {
        JsonBackend
    }
}

impl RulesBackend for JsonBackend {
    fn render(&mut self, graph: &ImageGraph, out: &mut dyn Write) -> Result<()> {
        let remotes = graph
            .remotes()
            .into_iter()
            .map(|reference| Remote {
                reference,
                marker: pull_marker(reference),
            })
            .collect();

        let document = Document {
            images: &graph.images,
            remotes,
        };

        serde_json::to_writer_pretty(&mut *out, &document)?;
        writeln!(out)?;

        Ok(())
    }
}
