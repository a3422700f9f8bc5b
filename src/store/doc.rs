//! Loading and saving of JSON table documents.

use crate::Result;
use ohno::IntoAppError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

const LOG_TARGET: &str = "     store";

/// Load a document, returning `T::default()` if the file does not exist yet.
pub fn load_or_default<T>(path: impl AsRef<Path>) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Default,
{
    let path = path.as_ref();

    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::trace!(target: LOG_TARGET, "No document at '{}', starting empty", path.display());
            return Ok(T::default());
        }
        Err(e) => return Err(e).into_app_err_with(|| format!("unable to open file '{}'", path.display())),
    };

    let reader = BufReader::new(file);
    serde_json::from_reader(reader).into_app_err_with(|| format!("unable to parse file '{}'", path.display()))
}

/// Save a document, replacing any previous version.
///
/// The data is written to a sibling temporary file first and then renamed over the
/// target, so readers never observe a partially written document.
pub fn save<T>(data: &T, path: impl AsRef<Path>) -> Result<()>
where
    T: Serialize,
{
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).into_app_err_with(|| format!("unable to create directory '{}'", parent.display()))?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let file = File::create(&tmp_path).into_app_err_with(|| format!("unable to create file '{}'", tmp_path.display()))?;
    let mut writer = BufWriter::new(file);

    // Pretty in debug builds for easier inspection
    #[cfg(debug_assertions)]
    let result = serde_json::to_writer_pretty(&mut writer, data);
    #[cfg(not(debug_assertions))]
    let result = serde_json::to_writer(&mut writer, data);

    result.into_app_err_with(|| format!("unable to write file '{}'", tmp_path.display()))?;
    writer
        .flush()
        .into_app_err_with(|| format!("unable to flush file '{}'", tmp_path.display()))?;
    drop(writer);

    fs::rename(&tmp_path, path).into_app_err_with(|| format!("unable to replace file '{}'", path.display()))?;
    Ok(())
}
