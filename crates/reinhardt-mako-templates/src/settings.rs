//! Mako settings
//!
//! Settings are read from the application's configuration map, where they
//! live under `MAKO_*` keys, or from a TOML document. Every key is optional.
//!
//! | Field | Key | Default |
//! |---|---|---|
//! | `input_encoding` | `MAKO_INPUT_ENCODING` | `utf-8` |
//! | `output_encoding` | `MAKO_OUTPUT_ENCODING` | `utf-8` |
//! | `module_directory` | `MAKO_MODULE_DIRECTORY`, `MAKO_CACHE_DIR` | none |
//! | `collection_size` | `MAKO_COLLECTION_SIZE`, `MAKO_CACHE_SIZE` | `-1` (unbounded) |
//! | `imports` | `MAKO_IMPORTS` | none |
//! | `filesystem_checks` | `MAKO_FILESYSTEM_CHECKS` | `true` |
//! | `translate_exceptions` | `MAKO_TRANSLATE_EXCEPTIONS` | `true` |
//! | `default_filters` | `MAKO_DEFAULT_FILTERS` | none |
//! | `preprocessors` | `MAKO_PREPROCESSOR` | none |

use crate::app::ConfigMap;
use crate::error::ConfigurationError;
use reinhardt_mako_engine::{Encoding, ImportSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Prefix shared by every settings key in an application's configuration
pub const KEY_PREFIX: &str = "MAKO_";

/// Older key names and the keys they stand for
const KEY_ALIASES: &[(&str, &str)] = &[
	("MAKO_CACHE_DIR", "MAKO_MODULE_DIRECTORY"),
	("MAKO_CACHE_SIZE", "MAKO_COLLECTION_SIZE"),
];

/// Settings of one application's template lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MakoSettings {
	#[serde(alias = "MAKO_INPUT_ENCODING")]
	pub input_encoding: String,

	#[serde(alias = "MAKO_OUTPUT_ENCODING")]
	pub output_encoding: String,

	/// Directory generated modules are persisted in
	#[serde(alias = "MAKO_MODULE_DIRECTORY")]
	pub module_directory: Option<PathBuf>,

	/// Bound of the compiled template cache; zero or negative is unbounded
	#[serde(alias = "MAKO_COLLECTION_SIZE")]
	pub collection_size: i64,

	/// Import statements injected into every template
	#[serde(alias = "MAKO_IMPORTS")]
	pub imports: Vec<String>,

	/// Recompile templates whose file changed since they were cached
	#[serde(alias = "MAKO_FILESYSTEM_CHECKS")]
	pub filesystem_checks: bool,

	#[serde(alias = "MAKO_TRANSLATE_EXCEPTIONS")]
	pub translate_exceptions: bool,

	#[serde(alias = "MAKO_DEFAULT_FILTERS")]
	pub default_filters: Option<Vec<String>>,

	/// Names of preprocessors registered on the application, applied in order
	#[serde(alias = "MAKO_PREPROCESSOR", alias = "MAKO_PREPROCESSORS")]
	pub preprocessors: Vec<String>,
}

impl Default for MakoSettings {
	fn default() -> Self {
		Self {
			input_encoding: "utf-8".to_string(),
			output_encoding: "utf-8".to_string(),
			module_directory: None,
			collection_size: -1,
			imports: Vec::new(),
			filesystem_checks: true,
			translate_exceptions: true,
			default_filters: None,
			preprocessors: Vec::new(),
		}
	}
}

impl MakoSettings {
	/// Parse settings from TOML
	///
	/// Keys may sit at the top level or in a `[mako]` table.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_mako_templates::MakoSettings;
	///
	/// let settings = MakoSettings::from_toml_str(r#"
	/// [mako]
	/// output_encoding = "ascii"
	/// collection_size = 50
	/// "#).unwrap();
	///
	/// assert_eq!(settings.output_encoding, "ascii");
	/// assert_eq!(settings.collection_size, 50);
	/// assert!(settings.filesystem_checks);
	/// ```
	pub fn from_toml_str(source: &str) -> Result<Self, ConfigurationError> {
		let mut table: toml::Table = source.parse()?;
		let value = match table.remove("mako") {
			Some(section @ toml::Value::Table(_)) => section,
			_ => toml::Value::Table(table),
		};
		Ok(value.try_into()?)
	}

	/// Read the `MAKO_*` keys of an application configuration map
	///
	/// Keys set to `null` count as unset. An older key name is used only when
	/// the key it stands for is unset.
	pub fn from_config_map(config: &ConfigMap) -> Result<Self, ConfigurationError> {
		let mut keys: serde_json::Map<String, JsonValue> = config
			.iter()
			.filter(|(key, value)| key.starts_with(KEY_PREFIX) && !value.is_null())
			.map(|(key, value)| (key.clone(), value.clone()))
			.collect();
		for (alias, key) in KEY_ALIASES {
			if let Some(value) = keys.remove(*alias) {
				keys.entry(key.to_string()).or_insert(value);
			}
		}
		serde_json::from_value(JsonValue::Object(keys)).map_err(|e| {
			ConfigurationError::InvalidSetting {
				key: format!("{}*", KEY_PREFIX),
				message: e.to_string(),
			}
		})
	}

	/// Fill in the defaults of every unset key, keeping values already present
	///
	/// Keys given under an older name are left unset so the older name
	/// still takes effect.
	pub fn apply_defaults(config: &mut ConfigMap) {
		let defaults = [
			("MAKO_INPUT_ENCODING", JsonValue::from("utf-8")),
			("MAKO_OUTPUT_ENCODING", JsonValue::from("utf-8")),
			("MAKO_MODULE_DIRECTORY", JsonValue::Null),
			("MAKO_COLLECTION_SIZE", JsonValue::from(-1)),
			("MAKO_IMPORTS", JsonValue::Null),
			("MAKO_FILESYSTEM_CHECKS", JsonValue::Bool(true)),
			("MAKO_TRANSLATE_EXCEPTIONS", JsonValue::Bool(true)),
		];
		for (key, value) in defaults {
			let aliased = KEY_ALIASES
				.iter()
				.any(|(alias, target)| *target == key && config.contains_key(*alias));
			if !aliased {
				config.entry(key.to_string()).or_insert(value);
			}
		}
	}

	pub fn with_input_encoding(mut self, encoding: impl Into<String>) -> Self {
		self.input_encoding = encoding.into();
		self
	}

	pub fn with_output_encoding(mut self, encoding: impl Into<String>) -> Self {
		self.output_encoding = encoding.into();
		self
	}

	pub fn with_module_directory(mut self, directory: impl Into<PathBuf>) -> Self {
		self.module_directory = Some(directory.into());
		self
	}

	pub fn with_collection_size(mut self, size: i64) -> Self {
		self.collection_size = size;
		self
	}

	pub fn with_import(mut self, statement: impl Into<String>) -> Self {
		self.imports.push(statement.into());
		self
	}

	pub fn with_filesystem_checks(mut self, enabled: bool) -> Self {
		self.filesystem_checks = enabled;
		self
	}

	pub fn with_translate_exceptions(mut self, enabled: bool) -> Self {
		self.translate_exceptions = enabled;
		self
	}

	pub fn with_default_filters<I, S>(mut self, filters: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.default_filters = Some(filters.into_iter().map(Into::into).collect());
		self
	}

	pub fn with_preprocessor(mut self, name: impl Into<String>) -> Self {
		self.preprocessors.push(name.into());
		self
	}

	pub fn input_encoding(&self) -> Result<Encoding, ConfigurationError> {
		parse_encoding(&self.input_encoding)
	}

	pub fn output_encoding(&self) -> Result<Encoding, ConfigurationError> {
		parse_encoding(&self.output_encoding)
	}

	/// Cache bound, `None` when unbounded
	pub fn collection_limit(&self) -> Option<NonZeroUsize> {
		usize::try_from(self.collection_size)
			.ok()
			.and_then(NonZeroUsize::new)
	}

	/// Parsed form of the configured import statements
	pub fn import_specs(&self) -> Result<Vec<ImportSpec>, ConfigurationError> {
		ImportSpec::parse_all(&self.imports).map_err(ConfigurationError::InvalidImport)
	}
}

fn parse_encoding(label: &str) -> Result<Encoding, ConfigurationError> {
	Encoding::from_label(label).ok_or_else(|| ConfigurationError::UnknownEncoding(label.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	fn config(entries: &[(&str, JsonValue)]) -> ConfigMap {
		entries
			.iter()
			.map(|(k, v)| (k.to_string(), v.clone()))
			.collect()
	}

	#[rstest]
	fn test_defaults() {
		let settings = MakoSettings::default();

		assert_eq!(settings.input_encoding().unwrap(), Encoding::Utf8);
		assert_eq!(settings.collection_limit(), None);
		assert!(settings.filesystem_checks);
		assert!(settings.translate_exceptions);
	}

	#[rstest]
	fn test_config_map_aliases() {
		// Arrange
		let map = config(&[
			("MAKO_CACHE_DIR", json!("/tmp/mako")),
			("MAKO_CACHE_SIZE", json!(10)),
			("MAKO_IMPORTS", json!(["from string import ascii_letters"])),
			("MAKO_TRANSLATE_EXCEPTIONS", json!(false)),
			("DEBUG", json!(true)),
		]);

		// Act
		let settings = MakoSettings::from_config_map(&map).unwrap();

		// Assert
		assert_eq!(settings.module_directory, Some(PathBuf::from("/tmp/mako")));
		assert_eq!(settings.collection_limit(), NonZeroUsize::new(10));
		assert_eq!(settings.imports, vec!["from string import ascii_letters"]);
		assert!(!settings.translate_exceptions);
	}

	#[rstest]
	fn test_aliases_survive_applied_defaults() {
		// Arrange
		let mut map = config(&[("MAKO_CACHE_SIZE", json!(10))]);
		MakoSettings::apply_defaults(&mut map);

		// Act
		let settings = MakoSettings::from_config_map(&map).unwrap();

		// Assert
		assert!(!map.contains_key("MAKO_COLLECTION_SIZE"));
		assert_eq!(settings.collection_size, 10);
	}

	#[rstest]
	fn test_null_keys_are_unset() {
		let map = config(&[("MAKO_MODULE_DIRECTORY", JsonValue::Null), ("MAKO_IMPORTS", JsonValue::Null)]);

		let settings = MakoSettings::from_config_map(&map).unwrap();

		assert_eq!(settings, MakoSettings::default());
	}

	#[rstest]
	fn test_invalid_value_is_reported() {
		let map = config(&[("MAKO_COLLECTION_SIZE", json!("large"))]);

		let error = MakoSettings::from_config_map(&map).unwrap_err();

		assert!(matches!(error, ConfigurationError::InvalidSetting { .. }));
	}

	#[rstest]
	fn test_apply_defaults_keeps_existing_values() {
		let mut map = config(&[("MAKO_OUTPUT_ENCODING", json!("ascii"))]);

		MakoSettings::apply_defaults(&mut map);

		assert_eq!(map["MAKO_OUTPUT_ENCODING"], json!("ascii"));
		assert_eq!(map["MAKO_INPUT_ENCODING"], json!("utf-8"));
		assert_eq!(map["MAKO_COLLECTION_SIZE"], json!(-1));
	}

	#[rstest]
	fn test_toml_top_level_keys() {
		let settings = MakoSettings::from_toml_str("input_encoding = \"latin-1\"\nimports = [\"import string\"]").unwrap();

		assert_eq!(settings.input_encoding().unwrap(), Encoding::Latin1);
		assert_eq!(settings.import_specs().unwrap().len(), 1);
	}

	#[rstest]
	#[case("ebcdic")]
	#[case("")]
	fn test_unknown_encoding(#[case] label: &str) {
		let settings = MakoSettings::default().with_output_encoding(label);

		assert!(matches!(
			settings.output_encoding(),
			Err(ConfigurationError::UnknownEncoding(_))
		));
	}
}
