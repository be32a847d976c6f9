use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use std::{
    fs,
    io::{self, Write},
    path::Path,
};
use tempfile::NamedTempFile;

/// Writes the rendered rules to `path`, or to stdout without one.
///
/// Files are replaced atomically and left alone when their contents are
/// already up to date, so their modification time only moves when the
/// rules actually change.
pub fn write_rules(rules: &[u8], path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => {
            let stdout = io::stdout();
            let mut stdout = stdout.lock();
            stdout.write_all(rules)?;
            stdout.flush()?;
            return Ok(());
        }
    };

    match fs::read(path) {
        Ok(current) if current == rules => {
            debug!("{:?} is up to date", path);
            return Ok(());
        }
        Ok(_) => (),
        Err(err) if err.kind() == io::ErrorKind::NotFound => (),
        Err(err) => return Err(err).with_context(|| format!("couldn't read {:?}", path)),
    }

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp_file = NamedTempFile::new_in(directory)
        .with_context(|| format!("couldn't create a temporary file in {:?}", directory))?;
    temp_file.write_all(rules)?;
    temp_file
        .persist(path)
        .map_err(|err| anyhow!("couldn't write {:?}: {}", path, err.error))?;

    info!("wrote {:?}", path);
    Ok(())
}
