//! Registry of template lookups, one per application

use crate::app::{AppId, Application};
use crate::error::ConfigurationError;
use crate::lookup::TemplateLookup;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

static GLOBAL_REGISTRY: Lazy<LookupRegistry> = Lazy::new(LookupRegistry::new);

/// Maps applications to their template lookup
///
/// Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct LookupRegistry {
	lookups: Arc<RwLock<HashMap<AppId, Arc<TemplateLookup>>>>,
}

impl LookupRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// The process-wide registry
	pub fn global() -> Self {
		GLOBAL_REGISTRY.clone()
	}

	pub fn get(&self, app: &Application) -> Option<Arc<TemplateLookup>> {
		self.lookups.read().get(&app.id()).cloned()
	}

	/// Lookup of `app`, created on first use
	///
	/// Concurrent first calls construct the lookup once.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_mako_templates::{Application, LookupRegistry};
	/// use std::sync::Arc;
	///
	/// let registry = LookupRegistry::new();
	/// let app = Application::new("app", "/srv/app");
	///
	/// let first = registry.get_or_create(&app).unwrap();
	/// let second = registry.get_or_create(&app).unwrap();
	/// assert!(Arc::ptr_eq(&first, &second));
	/// ```
	pub fn get_or_create(&self, app: &Application) -> Result<Arc<TemplateLookup>, ConfigurationError> {
		if let Some(lookup) = self.get(app) {
			return Ok(lookup);
		}

		let mut lookups = self.lookups.write();
		if let Some(lookup) = lookups.get(&app.id()) {
			return Ok(lookup.clone());
		}
		debug!(app = app.name(), id = %app.id(), "creating template lookup");
		let lookup = Arc::new(TemplateLookup::for_application(app)?);
		lookups.insert(app.id(), lookup.clone());
		Ok(lookup)
	}

	/// Register a lookup built elsewhere; fails when `app` already has one
	pub fn insert(&self, app: &Application, lookup: TemplateLookup) -> Result<Arc<TemplateLookup>, ConfigurationError> {
		let mut lookups = self.lookups.write();
		if lookups.contains_key(&app.id()) {
			return Err(ConfigurationError::AlreadyInitialized(app.name().to_string()));
		}
		let lookup = Arc::new(lookup);
		lookups.insert(app.id(), lookup.clone());
		Ok(lookup)
	}

	/// Drop the lookup of `app`; the next `get_or_create` rebuilds it
	pub fn invalidate(&self, app: &Application) -> bool {
		self.lookups.write().remove(&app.id()).is_some()
	}

	pub fn len(&self) -> usize {
		self.lookups.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.lookups.read().is_empty()
	}
}

impl std::fmt::Debug for LookupRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LookupRegistry")
			.field("lookups", &self.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::path_resolver::SearchPath;
	use crate::settings::MakoSettings;
	use rstest::{fixture, rstest};
	use std::thread;

	#[fixture]
	fn app() -> Arc<Application> {
		Arc::new(Application::new("app", "/srv/app"))
	}

	#[rstest]
	fn test_lookups_are_per_application(app: Arc<Application>) {
		// Arrange
		let registry = LookupRegistry::new();
		let other = Application::new("other", "/srv/app");

		// Act
		let first = registry.get_or_create(&app).unwrap();
		let second = registry.get_or_create(&other).unwrap();

		// Assert
		assert!(!Arc::ptr_eq(&first, &second));
		assert_eq!(registry.len(), 2);
	}

	#[rstest]
	fn test_concurrent_creation_yields_one_lookup(app: Arc<Application>) {
		// Arrange
		let registry = LookupRegistry::new();

		// Act
		let lookups: Vec<Arc<TemplateLookup>> = (0..8)
			.map(|_| {
				let registry = registry.clone();
				let app = app.clone();
				thread::spawn(move || registry.get_or_create(&app).unwrap())
			})
			.collect::<Vec<_>>()
			.into_iter()
			.map(|handle| handle.join().unwrap())
			.collect();

		// Assert
		assert!(lookups.iter().all(|l| Arc::ptr_eq(l, &lookups[0])));
	}

	#[rstest]
	fn test_invalidate_rebuilds(app: Arc<Application>) {
		let registry = LookupRegistry::new();
		let first = registry.get_or_create(&app).unwrap();

		assert!(registry.invalidate(&app));
		let second = registry.get_or_create(&app).unwrap();

		assert!(!Arc::ptr_eq(&first, &second));
	}

	#[rstest]
	fn test_insert_rejects_second_lookup(app: Arc<Application>) {
		let registry = LookupRegistry::new();
		let lookup = || TemplateLookup::new(SearchPath::default(), MakoSettings::default()).unwrap();
		registry.insert(&app, lookup()).unwrap();

		let error = registry.insert(&app, lookup()).unwrap_err();

		assert!(matches!(error, ConfigurationError::AlreadyInitialized(_)));
	}
}
