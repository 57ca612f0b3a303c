//! The Mako extension object

use crate::app::Application;
use crate::error::{ConfigurationError, RenderResult};
use crate::lookup::TemplateLookup;
use crate::registry::LookupRegistry;
use crate::settings::MakoSettings;
use parking_lot::RwLock;
use reinhardt_mako_engine::Template;
use std::sync::{Arc, Weak};
use tracing::info;

/// Name the extension registers under on an application
pub const EXTENSION_NAME: &str = "mako";

/// Binds Mako templates to one application
///
/// # Examples
///
/// ```
/// use reinhardt_mako_templates::{Application, MakoTemplates};
/// use std::sync::Arc;
///
/// let app = Arc::new(Application::new("app", "/srv/app"));
/// let mako = MakoTemplates::new();
/// mako.init_app(&app).unwrap();
///
/// assert!(app.has_extension("mako"));
/// assert!(app.config_value("MAKO_TRANSLATE_EXCEPTIONS").is_some());
/// assert!(mako.init_app(&app).is_err());
/// ```
#[derive(Debug)]
pub struct MakoTemplates {
	app: RwLock<Option<Weak<Application>>>,
	registry: LookupRegistry,
}

impl Default for MakoTemplates {
	fn default() -> Self {
		Self::new()
	}
}

impl MakoTemplates {
	/// Create an unbound extension using the process-wide lookup registry
	pub fn new() -> Self {
		Self::with_registry(LookupRegistry::global())
	}

	pub fn with_registry(registry: LookupRegistry) -> Self {
		Self {
			app: RwLock::new(None),
			registry,
		}
	}

	/// Create the extension and bind it to `app`
	pub fn for_app(app: &Arc<Application>) -> Result<Self, ConfigurationError> {
		let extension = Self::new();
		extension.init_app(app)?;
		Ok(extension)
	}

	/// Initialize `app` for Mako templates and bind this extension to it
	///
	/// Unset `MAKO_*` settings receive their defaults. Initializing an
	/// application twice, or binding the extension to a second live
	/// application, fails and leaves the existing state untouched.
	pub fn init_app(&self, app: &Arc<Application>) -> Result<(), ConfigurationError> {
		let mut bound = self.app.write();
		if let Some(existing) = bound.as_ref().and_then(Weak::upgrade)
			&& !Arc::ptr_eq(&existing, app)
		{
			return Err(ConfigurationError::AlreadyBound(existing.name().to_string()));
		}
		if app.has_extension(EXTENSION_NAME) {
			return Err(ConfigurationError::AlreadyInitialized(app.name().to_string()));
		}

		app.update_config(MakoSettings::apply_defaults);
		app.register_extension(EXTENSION_NAME);
		*bound = Some(Arc::downgrade(app));
		info!(app = app.name(), id = %app.id(), "initialized Mako templates");
		Ok(())
	}

	/// The bound application, while it is alive
	pub fn app(&self) -> Option<Arc<Application>> {
		self.app.read().as_ref().and_then(Weak::upgrade)
	}

	pub fn registry(&self) -> &LookupRegistry {
		&self.registry
	}

	/// Lookup of the bound application
	pub fn lookup(&self) -> Result<Arc<TemplateLookup>, ConfigurationError> {
		let app = self.app().ok_or(ConfigurationError::Unbound)?;
		self.registry.get_or_create(&app)
	}

	pub fn get_template(&self, name: &str) -> RenderResult<Arc<Template>> {
		self.lookup()?.get_template(name)
	}

	/// Compile template source text for the bound application
	pub fn from_string(&self, source: &str) -> RenderResult<Arc<Template>> {
		self.lookup()?.compile_source(source)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::{fixture, rstest};
	use serde_json::json;

	#[fixture]
	fn app() -> Arc<Application> {
		Arc::new(Application::new("app", "/srv/app").with_config("MAKO_OUTPUT_ENCODING", json!("ascii")))
	}

	#[rstest]
	fn test_init_applies_defaults(app: Arc<Application>) {
		// Arrange
		let mako = MakoTemplates::with_registry(LookupRegistry::new());

		// Act
		mako.init_app(&app).unwrap();

		// Assert
		assert_eq!(app.config_value("MAKO_OUTPUT_ENCODING"), Some(json!("ascii")));
		assert_eq!(app.config_value("MAKO_COLLECTION_SIZE"), Some(json!(-1)));
		assert!(Arc::ptr_eq(&mako.app().unwrap(), &app));
	}

	#[rstest]
	fn test_second_init_keeps_lookup(app: Arc<Application>) {
		// Arrange
		let mako = MakoTemplates::with_registry(LookupRegistry::new());
		mako.init_app(&app).unwrap();
		let lookup = mako.lookup().unwrap();

		// Act
		let error = mako.init_app(&app).unwrap_err();

		// Assert
		assert!(matches!(error, ConfigurationError::AlreadyInitialized(_)));
		assert!(Arc::ptr_eq(&lookup, &mako.lookup().unwrap()));
	}

	#[rstest]
	fn test_bound_to_one_application(app: Arc<Application>) {
		let mako = MakoTemplates::with_registry(LookupRegistry::new());
		mako.init_app(&app).unwrap();
		let other = Arc::new(Application::new("other", "/srv/other"));

		let error = mako.init_app(&other).unwrap_err();

		assert!(matches!(error, ConfigurationError::AlreadyBound(name) if name == "app"));
		assert!(!other.has_extension(EXTENSION_NAME));
	}

	#[rstest]
	fn test_unbound_extension() {
		let mako = MakoTemplates::with_registry(LookupRegistry::new());

		let error = mako.from_string("x").unwrap_err();

		assert!(error.to_string().contains("not bound"));
	}

	#[rstest]
	fn test_from_string_uses_app_settings(app: Arc<Application>) {
		let mako = MakoTemplates::with_registry(LookupRegistry::new());
		mako.init_app(&app).unwrap();

		let template = mako.from_string("caf\u{e9}").unwrap();

		assert!(template.render(&Default::default()).is_err());
	}
}
