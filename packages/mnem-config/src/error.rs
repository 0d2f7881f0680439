use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Cannot read config {}: {source}", path.display())]
	ReadConfig { path: PathBuf, source: std::io::Error },
	#[error("Config {} is not valid TOML: {source}", path.display())]
	ParseConfig { path: PathBuf, source: toml::de::Error },
	/// A field is out of range or inconsistent with another field.
	#[error("Invalid config: {message}")]
	Validation { message: String },
}
