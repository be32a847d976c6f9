use anyhow::{Context, Result};
use ignore::WalkBuilder;
use log::{debug, warn};
use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use crate::models::RecipeName;

/// Lists every file staged by `add_paths`, relative to `root`.
///
/// Each path is resolved inside the recipe's context directory and walked
/// recursively. Directories never appear in the result, only the files
/// beneath them.
pub fn file_dependencies(root: &Path, name: &RecipeName, add_paths: &[String]) -> Result<Vec<PathBuf>> {
    let mut dependencies = Vec::new();

    for add_path in add_paths {
        let relative = normalize(&Path::new(name.as_str()).join(add_path.trim_start_matches('/')));
        let source = if relative.as_os_str().is_empty() {
            root.to_path_buf()
        } else {
            root.join(&relative)
        };

        match source.symlink_metadata() {
            Ok(_) => (),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!("{}: staged path {:?} does not exist, skipping it", name, add_path);
                continue;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("{}: couldn't read {:?}", name, source))
            }
        }

        let walk = WalkBuilder::new(&source)
            .ignore(false)
            .git_global(false)
            .git_ignore(false)
            .git_exclude(false)
            .hidden(false)
            .parents(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        let before = dependencies.len();
        for result in walk {
            let entry = result.with_context(|| format!("{}: couldn't walk {:?}", name, source))?;

            if entry.file_type().map_or(true, |file_type| file_type.is_dir()) {
                continue;
            }

            let dependency = entry
                .path()
                .strip_prefix(root)
                .with_context(|| format!("{:?} is not below {:?}", entry.path(), root))?;
            dependencies.push(dependency.to_path_buf());
        }

        debug!(
            "{}: {:?} stages {} files",
            name,
            add_path,
            dependencies.len() - before
        );
    }

    Ok(dependencies)
}

/// Folds `.` and `..` components without touching the filesystem. A `..`
/// that climbs above the start is kept.
fn normalize(path: &Path) -> PathBuf {
    let mut components: Vec<Component> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => (),
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                _ => components.push(component),
            },
            component => components.push(component),
        }
    }

    components.iter().collect()
}
