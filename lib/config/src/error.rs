use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error(
    "Types on field {key} do not match | got {value:?}, expected object"
  )]
  ObjectFieldTypeMismatch {
    key: String,
    value: serde_json::Value,
  },

  #[error(
    "Types on field {key} do not match | got {value:?}, expected array"
  )]
  ArrayFieldTypeMismatch {
    key: String,
    value: serde_json::Value,
  },

  #[error("Failed to open file at {path:?} | {e:?}")]
  FileOpen { e: std::io::Error, path: PathBuf },

  #[error("Failed to read contents of file at {path:?} | {e:?}")]
  ReadFileContents { e: std::io::Error, path: PathBuf },

  #[error("Failed to parse toml file at {path:?} | {e:?}")]
  ParseToml { e: toml::de::Error, path: PathBuf },

  #[error("Failed to parse merged config into final type | {e:?}")]
  ParseFinalJson { e: serde_json::Error },

  #[error("Failed to serialize config to json string | {e:?}")]
  SerializeJson { e: serde_json::Error },

  #[error("Parsed value is not object")]
  ValueIsNotObject,
}
