//! Per-application template lookup and compiled template cache
//!
//! A [`TemplateLookup`] finds templates on its search path, compiles them
//! with the application's engine options and keeps the compiled templates in
//! an LRU cache. File templates are keyed by resolved path and recompiled when
//! the file changed (with filesystem checks on). Inline templates are keyed
//! by the SHA-256 digest of their source.
//!
//! With a module directory configured, generated modules of file templates
//! are persisted as JSON and reused by later lookups as long as the source
//! file and the compile options are unchanged.

use crate::app::Application;
use crate::error::{ConfigurationError, RenderError, RenderResult};
use crate::helpers::{
	FRAMEWORK_IMPORTS, HELPERS_MODULE, I18N_EXTENSION, I18N_IMPORTS, I18N_MODULE, helpers_namespace,
	i18n_namespace,
};
use crate::path_resolver::{SearchPath, find_template, normalize_name, resolve_search_path};
use crate::settings::MakoSettings;
use lru::LruCache;
use parking_lot::Mutex;
use reinhardt_mako_engine::{EngineOptions, Encoding, GeneratedModule, ImportSpec, Template};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, trace, warn};

/// Format version of persisted modules
const MODULE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
	File(PathBuf),
	Inline(String),
}

#[derive(Debug, Clone)]
struct CacheEntry {
	template: Arc<Template>,
	modified: Option<SystemTime>,
}

#[derive(Serialize, Deserialize)]
struct PersistedModule {
	version: u32,
	source_mtime: SystemTime,
	module: GeneratedModule,
}

/// Template lookup of one application
pub struct TemplateLookup {
	search_path: SearchPath,
	settings: MakoSettings,
	engine: Arc<EngineOptions>,
	inline_engine: Arc<EngineOptions>,
	cache: Mutex<LruCache<CacheKey, CacheEntry>>,
}

impl TemplateLookup {
	/// Create a lookup with the engine defaults
	pub fn new(search_path: SearchPath, settings: MakoSettings) -> Result<Self, ConfigurationError> {
		Self::with_engine(search_path, settings, EngineOptions::default())
	}

	/// Create a lookup on top of `base` engine options
	///
	/// Encodings and default filters come from the settings. The settings'
	/// import statements run before those of `base`.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_mako_templates::{MakoSettings, SearchPath, TemplateLookup};
	/// use reinhardt_mako_templates::engine::Context;
	///
	/// let lookup = TemplateLookup::new(SearchPath::default(), MakoSettings::default()).unwrap();
	/// let template = lookup.compile_source("1 + 1 = ${1 + 1}").unwrap();
	///
	/// assert_eq!(template.render(&Context::new()).unwrap(), b"1 + 1 = 2");
	/// assert!(template.uri().starts_with("memory:"));
	/// ```
	pub fn with_engine(
		search_path: SearchPath,
		settings: MakoSettings,
		base: EngineOptions,
	) -> Result<Self, ConfigurationError> {
		let mut imports = settings.import_specs()?;
		imports.extend(base.imports);
		let mut engine = EngineOptions {
			input_encoding: settings.input_encoding()?,
			output_encoding: settings.output_encoding()?,
			imports,
			..base
		};
		if let Some(filters) = &settings.default_filters {
			engine.default_filters = filters.clone();
		}
		let inline_engine = engine.clone().with_input_encoding(Encoding::Utf8);
		let cache = match settings.collection_limit() {
			Some(limit) => LruCache::new(limit),
			None => LruCache::unbounded(),
		};
		info!(
			search_path = %search_path,
			collection_size = settings.collection_size,
			filesystem_checks = settings.filesystem_checks,
			"created template lookup"
		);
		Ok(Self {
			search_path,
			settings,
			engine: Arc::new(engine),
			inline_engine: Arc::new(inline_engine),
			cache: Mutex::new(cache),
		})
	}

	/// Create the lookup of an application from its configuration
	///
	/// Framework helpers are always importable and imported; the i18n
	/// functions are imported when the application registers the `i18n`
	/// extension.
	pub fn for_application(app: &Application) -> Result<Self, ConfigurationError> {
		let settings = MakoSettings::from_config_map(&app.config())?;

		let mut statements = vec![FRAMEWORK_IMPORTS];
		if app.has_extension(I18N_EXTENSION) {
			statements.push(I18N_IMPORTS);
		}
		let imports = ImportSpec::parse_all(&statements).map_err(ConfigurationError::InvalidImport)?;
		let modules = app
			.module_registry()
			.with_module(HELPERS_MODULE, helpers_namespace())
			.with_module(I18N_MODULE, i18n_namespace());

		let mut base = EngineOptions::default()
			.with_imports(imports)
			.with_modules(modules);
		for name in &settings.preprocessors {
			let preprocessor = app
				.preprocessor(name)
				.ok_or_else(|| ConfigurationError::UnknownPreprocessor(name.clone()))?;
			base.preprocessors.push(preprocessor);
		}

		Self::with_engine(resolve_search_path(app), settings, base)
	}

	/// Path of the first file named `name` on the search path
	///
	/// Names that climb out of their directory never resolve.
	pub fn resolve(&self, name: &str) -> Option<PathBuf> {
		find_template(&self.search_path, name)
	}

	/// Compiled template for `name`, from the cache when it is fresh
	pub fn get_template(&self, name: &str) -> RenderResult<Arc<Template>> {
		let path = self.resolve(name).ok_or_else(|| RenderError::NotFound {
			name: name.to_string(),
			search_path: self.search_path.clone(),
		})?;
		self.get_resolved_template(name, &path)
	}

	/// Compiled template for a path already resolved from `name`
	pub fn get_resolved_template(&self, name: &str, path: &Path) -> RenderResult<Arc<Template>> {
		let modified = if self.settings.filesystem_checks {
			fs::metadata(path).and_then(|m| m.modified()).ok()
		} else {
			None
		};
		let key = CacheKey::File(path.to_path_buf());

		if let Some(entry) = self.cache.lock().get(&key)
			&& (!self.settings.filesystem_checks || entry.modified == modified)
		{
			trace!(template = name, "template cache hit");
			return Ok(entry.template.clone());
		}

		debug!(template = name, path = %path.display(), "template cache miss");
		let template = Arc::new(self.load_file(name, path, modified)?);
		self.cache.lock().put(
			key,
			CacheEntry {
				template: template.clone(),
				modified,
			},
		);
		Ok(template)
	}

	/// Compile an inline template, cached by its source
	pub fn compile_source(&self, source: &str) -> RenderResult<Arc<Template>> {
		let digest = hex::encode(Sha256::digest(source.as_bytes()));
		let key = CacheKey::Inline(digest.clone());
		if let Some(entry) = self.cache.lock().get(&key) {
			return Ok(entry.template.clone());
		}

		let uri = format!("memory:{}", digest);
		debug!(uri = %uri, "compiling inline template");
		let template = Arc::new(Template::compile(
			&uri,
			None,
			source.as_bytes(),
			self.inline_engine.clone(),
		)?);
		self.cache.lock().put(
			key,
			CacheEntry {
				template: template.clone(),
				modified: None,
			},
		);
		Ok(template)
	}

	/// Drop the cached template of `name`; returns whether one was cached
	pub fn invalidate(&self, name: &str) -> bool {
		self.resolve(name)
			.is_some_and(|path| self.cache.lock().pop(&CacheKey::File(path)).is_some())
	}

	/// Drop every compiled template
	pub fn clear(&self) {
		self.cache.lock().clear();
	}

	/// Number of cached templates
	pub fn len(&self) -> usize {
		self.cache.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn search_path(&self) -> &SearchPath {
		&self.search_path
	}

	pub fn settings(&self) -> &MakoSettings {
		&self.settings
	}

	pub fn engine_options(&self) -> &Arc<EngineOptions> {
		&self.engine
	}

	pub fn translate_exceptions(&self) -> bool {
		self.settings.translate_exceptions
	}

	fn load_file(
		&self,
		name: &str,
		path: &Path,
		modified: Option<SystemTime>,
	) -> RenderResult<Template> {
		let uri = template_uri(name);
		let filename = path.display().to_string();
		// Persisted modules are keyed on the source mtime even when freshness
		// checks are off
		let persisted = self.settings.module_directory.as_ref().and_then(|directory| {
			let mtime = modified.or_else(|| fs::metadata(path).and_then(|m| m.modified()).ok())?;
			Some((directory.join(format!("{}.json", uri)), mtime))
		});

		if let Some((module_path, mtime)) = &persisted
			&& let Some(module) = self.read_module(module_path, *mtime, &filename)
		{
			debug!(template = name, module = %module_path.display(), "reusing persisted module");
			return Ok(Template::from_module(module, self.engine.clone()));
		}

		let bytes = fs::read(path).map_err(RenderError::io(path))?;
		let template = Template::compile(&uri, Some(&filename), &bytes, self.engine.clone())?;
		if let Some((module_path, mtime)) = persisted {
			write_module(&module_path, mtime, template.module());
		}
		Ok(template)
	}

	fn read_module(&self, path: &Path, mtime: SystemTime, filename: &str) -> Option<GeneratedModule> {
		let json = fs::read(path).ok()?;
		let persisted: PersistedModule = match serde_json::from_slice(&json) {
			Ok(persisted) => persisted,
			Err(e) => {
				debug!(module = %path.display(), error = %e, "ignoring unreadable persisted module");
				return None;
			}
		};
		let module = persisted.module;
		let current = persisted.version == MODULE_FORMAT_VERSION
			&& persisted.source_mtime == mtime
			&& module.filename.as_deref() == Some(filename)
			&& module.imports == self.engine.imports
			&& module.default_filters == self.engine.default_filters;
		current.then_some(module)
	}
}

impl std::fmt::Debug for TemplateLookup {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TemplateLookup")
			.field("search_path", &self.search_path)
			.field("settings", &self.settings)
			.field("cached", &self.len())
			.finish_non_exhaustive()
	}
}

fn write_module(path: &Path, mtime: SystemTime, module: &GeneratedModule) {
	let persisted = PersistedModule {
		version: MODULE_FORMAT_VERSION,
		source_mtime: mtime,
		module: module.clone(),
	};
	let result = serde_json::to_vec(&persisted)
		.map_err(std::io::Error::other)
		.and_then(|json| {
			if let Some(parent) = path.parent() {
				fs::create_dir_all(parent)?;
			}
			fs::write(path, json)
		});
	if let Err(e) = result {
		warn!(module = %path.display(), error = %e, "failed to persist generated module");
	}
}

/// URI of a file template: its normalized name with `/` separators
fn template_uri(name: &str) -> String {
	normalize_name(name)
		.map(|relative| {
			relative
				.components()
				.map(|c| c.as_os_str().to_string_lossy().into_owned())
				.collect::<Vec<_>>()
				.join("/")
		})
		.unwrap_or_else(|| name.to_string())
}
