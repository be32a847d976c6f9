use anyhow::{anyhow, Context, Result};
use ignore::WalkBuilder;
use log::debug;
use std::path::{Component, Path, PathBuf};

use crate::models::RecipeName;

/// Finds every file called `file_name` below `root`, paired with the image
/// name derived from its directory.
pub fn find_recipes<P: AsRef<Path>>(root: P, file_name: &str) -> Result<Vec<(RecipeName, PathBuf)>> {
    let root = root.as_ref();

    let walk = WalkBuilder::new(root)
        .ignore(false)
        .git_global(false)
        .git_ignore(false)
        .git_exclude(false)
        .hidden(false)
        .parents(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut recipes = Vec::new();
    for result in walk {
        let entry = result?;

        let is_file = entry.file_type().map_or(false, |file_type| !file_type.is_dir());
        if !is_file || entry.file_name() != file_name {
            continue;
        }

        let name = recipe_name(root, entry.path())?;
        debug!("found recipe {:?} at {:?}", name.0, entry.path());
        recipes.push((name, entry.into_path()));
    }

    Ok(recipes)
}

/// The recipe's directory relative to `root`, `/` separated.
pub fn recipe_name(root: &Path, recipe_path: &Path) -> Result<RecipeName> {
    let relative = recipe_path
        .strip_prefix(root)
        .with_context(|| format!("{:?} is not below {:?}", recipe_path, root))?;

    let directory = relative.parent().unwrap_or_else(|| Path::new(""));

    let mut components = Vec::new();
    for component in directory.components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| anyhow!("the recipe path {:?} is not valid utf-8", recipe_path))?;
                components.push(part);
            }
            Component::CurDir => (),
            _ => return Err(anyhow!("unexpected component in recipe path {:?}", recipe_path)),
        }
    }

    if components.is_empty() {
        Ok(RecipeName(".".into()))
    } else {
        Ok(RecipeName(components.join("/")))
    }
}
