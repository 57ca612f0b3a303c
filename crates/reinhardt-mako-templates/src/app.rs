//! The host application as seen by the template layer
//!
//! An [`Application`] carries everything rendering needs from the host:
//! where templates live, its settings, the extensions registered on it and
//! the hooks that feed template globals (context processors, a URL builder
//! and translations).

use crate::context::{ContextProcessorRegistry, RenderContext};
use crate::request::RequestContext;
use indexmap::IndexMap;
use parking_lot::RwLock;
use reinhardt_mako_engine::{ModuleRegistry, Namespace, Preprocessor, Value};
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Application settings, keyed by setting name
pub type ConfigMap = IndexMap<String, JsonValue>;

/// Template folder used when an application does not name one
pub const DEFAULT_TEMPLATE_FOLDER: &str = "templates";

static NEXT_APP_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an [`Application`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppId(u64);

impl AppId {
	fn next() -> Self {
		Self(NEXT_APP_ID.fetch_add(1, Ordering::Relaxed))
	}
}

impl fmt::Display for AppId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "app#{}", self.0)
	}
}

/// Builds URLs for endpoints, backing `url_for` in templates
pub trait UrlBuilder: Send + Sync {
	/// Build the URL of `endpoint` with the given values
	fn build(&self, endpoint: &str, values: &IndexMap<String, Value>) -> Result<String, String>;
}

impl<F> UrlBuilder for F
where
	F: Fn(&str, &IndexMap<String, Value>) -> Result<String, String> + Send + Sync,
{
	fn build(&self, endpoint: &str, values: &IndexMap<String, Value>) -> Result<String, String> {
		self(endpoint, values)
	}
}

/// Message catalog backing the i18n functions in templates
pub trait Translations: Send + Sync {
	fn gettext(&self, message: &str) -> String;

	fn ngettext(&self, singular: &str, plural: &str, n: i64) -> String;

	fn pgettext(&self, _context: &str, message: &str) -> String {
		self.gettext(message)
	}

	fn npgettext(&self, _context: &str, singular: &str, plural: &str, n: i64) -> String {
		self.ngettext(singular, plural, n)
	}
}

/// Catalog returning every message untranslated
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTranslations;

impl Translations for NullTranslations {
	fn gettext(&self, message: &str) -> String {
		message.to_string()
	}

	fn ngettext(&self, singular: &str, plural: &str, n: i64) -> String {
		let message = if n == 1 { singular } else { plural };
		message.to_string()
	}
}

/// A sub-module of an application that may ship its own templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blueprint {
	name: String,
	root_path: PathBuf,
	template_folders: Vec<PathBuf>,
}

impl Blueprint {
	/// Create a blueprint without template folders
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_mako_templates::Blueprint;
	///
	/// let blueprint = Blueprint::new("admin", "/srv/app/admin").with_template_folder("templates");
	/// assert_eq!(blueprint.template_folders().len(), 1);
	/// ```
	pub fn new(name: impl Into<String>, root_path: impl Into<PathBuf>) -> Self {
		Self {
			name: name.into(),
			root_path: root_path.into(),
			template_folders: Vec::new(),
		}
	}

	/// Add a template folder, absolute or relative to the blueprint root
	pub fn with_template_folder(mut self, folder: impl Into<PathBuf>) -> Self {
		self.template_folders.push(folder.into());
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn root_path(&self) -> &Path {
		&self.root_path
	}

	pub fn template_folders(&self) -> &[PathBuf] {
		&self.template_folders
	}
}

/// A host application
///
/// Applications are shared as `Arc<Application>`; everything that may change
/// after construction sits behind a lock.
pub struct Application {
	id: AppId,
	name: String,
	root_path: PathBuf,
	template_folder: Option<PathBuf>,
	blueprints: RwLock<Vec<Blueprint>>,
	config: RwLock<ConfigMap>,
	extensions: RwLock<Vec<String>>,
	context_processors: ContextProcessorRegistry,
	url_builder: RwLock<Option<Arc<dyn UrlBuilder>>>,
	translations: RwLock<Option<Arc<dyn Translations>>>,
	modules: RwLock<IndexMap<String, Namespace>>,
	preprocessors: RwLock<IndexMap<String, Preprocessor>>,
}

impl Application {
	/// Create an application rooted at `root_path`, with templates in its
	/// `templates` folder
	pub fn new(name: impl Into<String>, root_path: impl Into<PathBuf>) -> Self {
		Self {
			id: AppId::next(),
			name: name.into(),
			root_path: root_path.into(),
			template_folder: Some(PathBuf::from(DEFAULT_TEMPLATE_FOLDER)),
			blueprints: RwLock::new(Vec::new()),
			config: RwLock::new(ConfigMap::new()),
			extensions: RwLock::new(Vec::new()),
			context_processors: ContextProcessorRegistry::new(),
			url_builder: RwLock::new(None),
			translations: RwLock::new(None),
			modules: RwLock::new(IndexMap::new()),
			preprocessors: RwLock::new(IndexMap::new()),
		}
	}

	/// Use another template folder, absolute or relative to the root path
	pub fn with_template_folder(mut self, folder: impl Into<PathBuf>) -> Self {
		self.template_folder = Some(folder.into());
		self
	}

	pub fn without_template_folder(mut self) -> Self {
		self.template_folder = None;
		self
	}

	pub fn with_config(self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
		self.set_config(key, value);
		self
	}

	pub fn id(&self) -> AppId {
		self.id
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn root_path(&self) -> &Path {
		&self.root_path
	}

	pub fn template_folder(&self) -> Option<&Path> {
		self.template_folder.as_deref()
	}

	pub fn register_blueprint(&self, blueprint: Blueprint) {
		self.blueprints.write().push(blueprint);
	}

	/// Registered blueprints in registration order
	pub fn blueprints(&self) -> Vec<Blueprint> {
		self.blueprints.read().clone()
	}

	pub fn set_config(&self, key: impl Into<String>, value: impl Into<JsonValue>) {
		self.config.write().insert(key.into(), value.into());
	}

	pub fn config_value(&self, key: &str) -> Option<JsonValue> {
		self.config.read().get(key).cloned()
	}

	pub fn config(&self) -> ConfigMap {
		self.config.read().clone()
	}

	/// Edit the configuration under its lock
	pub fn update_config<F: FnOnce(&mut ConfigMap)>(&self, update: F) {
		update(&mut self.config.write());
	}

	/// Record an extension; returns `false` when it was already registered
	pub fn register_extension(&self, name: impl Into<String>) -> bool {
		let name = name.into();
		let mut extensions = self.extensions.write();
		if extensions.contains(&name) {
			return false;
		}
		extensions.push(name);
		true
	}

	pub fn has_extension(&self, name: &str) -> bool {
		self.extensions.read().iter().any(|e| e == name)
	}

	pub fn context_processors(&self) -> &ContextProcessorRegistry {
		&self.context_processors
	}

	/// Register a function contributing template globals on every render
	pub fn add_context_processor<F>(&self, processor: F)
	where
		F: Fn(&RequestContext) -> RenderContext + Send + Sync + 'static,
	{
		self.context_processors.register(processor);
	}

	pub fn set_url_builder(&self, builder: impl UrlBuilder + 'static) {
		*self.url_builder.write() = Some(Arc::new(builder));
	}

	pub fn url_builder(&self) -> Option<Arc<dyn UrlBuilder>> {
		self.url_builder.read().clone()
	}

	pub fn set_translations(&self, translations: impl Translations + 'static) {
		*self.translations.write() = Some(Arc::new(translations));
	}

	pub fn translations(&self) -> Option<Arc<dyn Translations>> {
		self.translations.read().clone()
	}

	/// Make a module available to template import statements
	pub fn register_module(&self, name: impl Into<String>, namespace: Namespace) {
		self.modules.write().insert(name.into(), namespace);
	}

	/// Engine modules: the builtin ones plus those registered here
	pub fn module_registry(&self) -> ModuleRegistry {
		let mut registry = ModuleRegistry::new();
		for (name, namespace) in self.modules.read().iter() {
			registry.register(name.clone(), namespace.clone());
		}
		registry
	}

	/// Register a named source transform that settings can enable
	pub fn register_preprocessor<F>(&self, name: impl Into<String>, preprocessor: F)
	where
		F: Fn(&str) -> String + Send + Sync + 'static,
	{
		self.preprocessors
			.write()
			.insert(name.into(), Arc::new(preprocessor));
	}

	pub fn preprocessor(&self, name: &str) -> Option<Preprocessor> {
		self.preprocessors.read().get(name).cloned()
	}
}

impl fmt::Debug for Application {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Application")
			.field("id", &self.id)
			.field("name", &self.name)
			.field("root_path", &self.root_path)
			.field("template_folder", &self.template_folder)
			.field("blueprints", &self.blueprints.read().len())
			.field("extensions", &*self.extensions.read())
			.finish_non_exhaustive()
	}
}
