//! # SiteFlow Config
//!
//! Loads `siteflowd`'s configuration from an optional TOML file merged
//! with environment variable overrides (`${VAR}` interpolation inside
//! the file, `envy`-parsed env struct taking priority over the file).

use std::path::Path;

use colored::Colorize;
use serde::{Serialize, de::DeserializeOwned};

mod error;
mod load;
mod merge;

pub use error::Error;
pub use merge::{merge_config, merge_objects};

pub type Result<T> = ::core::result::Result<T, Error>;

/// Loads `path` (if it exists) as a TOML file with `${VAR}` environment
/// interpolation, falling back to `T::default()`-shaped JSON null when
/// absent. Callers then merge in environment overrides with
/// [`merge_config`].
pub fn load_file<T: DeserializeOwned>(
  path: &Path,
  debug_print: bool,
) -> Result<Option<T>> {
  if !path.exists() {
    if debug_print {
      println!(
        "{}: {}: {path:?}",
        "DEBUG".cyan(),
        "No config file found at".dimmed()
      );
    }
    return Ok(None);
  }
  if debug_print {
    println!("{}: {}: {path:?}", "DEBUG".cyan(), "Loading config file".dimmed());
  }
  load::load_parse_config_file(path).map(Some)
}

/// Serializes `base` and `overrides` to JSON, merges (overrides win on
/// conflicts, nested objects merged, arrays replaced), then deserializes
/// back to `T`.
pub fn apply_overrides<T: Serialize + DeserializeOwned>(
  base: T,
  overrides: T,
) -> Result<T> {
  merge_config(base, overrides, true, false)
}
