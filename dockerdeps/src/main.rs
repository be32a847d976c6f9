use anyhow::{anyhow, Result};
use log::info;
use std::{path::PathBuf, str::FromStr};
use structopt::StructOpt;

use backends::{JsonBackend, MakeBackend};
use classifier::Classifier;
use controller::Controller;
use frontends::DockerfileFrontend;
use services::RulesBackend;

mod backends;
mod classifier;
mod controller;
mod extractor;
mod filedeps;
mod frontends;
mod models;
mod output;
mod scanner;
mod services;

#[derive(Debug)]
enum Format {
    Make,
    Json,
}

impl FromStr for Format {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "make" => Ok(Format::Make),
            "json" => Ok(Format::Json),
            other => Err(anyhow!("unknown output format {:?}", other)),
        }
    }
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "dockerdeps",
    about = "Generates Make rules that rebuild Docker images when their sources or base images change."
)]
struct Opt {
    /// Directory tree to search for Dockerfiles.
    #[structopt(parse(from_os_str))]
    root: PathBuf,

    /// Registry prefix of images built from this tree, e.g. registry.example.com/
    #[structopt(env = "DOCKERDEPS_REGISTRY")]
    registry: Option<String>,

    /// File name of the recipes to look for.
    #[structopt(long = "file", default_value = "Dockerfile")]
    file_name: String,

    /// Container CLI used by the generated rules.
    #[structopt(long, default_value = "docker", env = "DOCKER")]
    docker: String,

    #[structopt(long, default_value = "make", possible_values = &["make", "json"])]
    format: Format,

    /// Write the rules to this file instead of stdout.
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    pretty_env_logger::init_custom_env("LOG");

    let opt = Opt::from_args();

    if !opt.root.is_dir() {
        return Err(anyhow!("{:?} is not a directory.", opt.root));
    }

    let mut frontend = DockerfileFrontend::new()?;
    let controller = Controller::scan(&opt.root, &opt.file_name, &mut frontend)?;
    info!("read {} recipes", controller.records().len());

    let classifier = Classifier::new(opt.registry);

    let mut backend: Box<dyn RulesBackend> = match opt.format {
        Format::Make => Box::new(MakeBackend::new(opt.docker)),
        Format::Json => Box::new(JsonBackend::new()),
    };

    let rules = controller.rules(&classifier, backend.as_mut())?;
    output::write_rules(&rules, opt.output.as_deref())?;

    Ok(())
}
