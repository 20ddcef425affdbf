use std::{fs::File, io::Read, path::Path};

use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Loads and parses a single TOML config file, interpolating `${VAR}`
/// environment references before parsing.
pub fn load_parse_config_file<T: DeserializeOwned>(
  file: &Path,
) -> Result<T> {
  let mut file_handle = File::open(file).map_err(|e| Error::FileOpen {
    e,
    path: file.to_path_buf(),
  })?;
  let mut contents = String::new();
  file_handle.read_to_string(&mut contents).map_err(|e| {
    Error::ReadFileContents { e, path: file.to_path_buf() }
  })?;
  let contents = interpolate_env(&contents);
  toml::from_str(&contents).map_err(|e| Error::ParseToml {
    e,
    path: file.to_path_buf(),
  })
}

/// Only supports `${VAR}` syntax, applied twice so a variable that
/// expands to another `${VAR}` reference is also resolved.
fn interpolate_env(input: &str) -> String {
  let re = regex::Regex::new(r"\$\{([A-Za-z0-9_]+)\}").unwrap();
  let first_pass = re
    .replace_all(input, |caps: &regex::Captures| {
      std::env::var(&caps[1]).unwrap_or_default()
    })
    .into_owned();
  re.replace_all(&first_pass, |caps: &regex::Captures| {
    std::env::var(&caps[1]).unwrap_or_default()
  })
  .into_owned()
}
