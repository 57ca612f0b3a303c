//! Render context assembly
//!
//! Every render sees three layers of bindings, merged in a fixed order with
//! later layers winning:
//! 1. framework globals (`request`, `session`, `g`, `config`, `url_for`,
//!    `get_flashed_messages`, and the i18n functions when enabled)
//! 2. the output of the application's context processors, in registration
//!    order
//! 3. the values passed by the caller

use crate::helpers::{I18N_EXTENSION, flashed_messages_function, i18n_functions, url_for_function};
use crate::request::RequestContext;
use parking_lot::RwLock;
use reinhardt_mako_engine::{Context, Value};
use std::sync::Arc;

/// Bindings passed to a template
pub type RenderContext = Context;

/// Context processor function type
///
/// A context processor receives the request being handled and returns the
/// bindings it contributes.
pub type ContextProcessor = Arc<dyn Fn(&RequestContext) -> RenderContext + Send + Sync>;

/// Registry for context processors
#[derive(Clone, Default)]
pub struct ContextProcessorRegistry {
	processors: Arc<RwLock<Vec<ContextProcessor>>>,
}

impl ContextProcessorRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a context processor
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_mako_templates::{Application, ContextProcessorRegistry, RenderContext, RequestContext};
	/// use reinhardt_mako_templates::engine::Value;
	/// use std::sync::Arc;
	///
	/// let registry = ContextProcessorRegistry::new();
	/// registry.register(|_request: &RequestContext| {
	///     let mut context = RenderContext::new();
	///     context.insert("site_name".to_string(), Value::from("My Site"));
	///     context
	/// });
	///
	/// let request = RequestContext::new(Arc::new(Application::new("app", "/srv/app")));
	/// let context = registry.get_context(&request);
	/// assert_eq!(context.get("site_name"), Some(&Value::from("My Site")));
	/// ```
	pub fn register<F>(&self, processor: F)
	where
		F: Fn(&RequestContext) -> RenderContext + Send + Sync + 'static,
	{
		self.processors.write().push(Arc::new(processor));
	}

	/// Merged output of every processor, in registration order
	pub fn get_context(&self, request: &RequestContext) -> RenderContext {
		let processors = self.processors.read().clone();
		let mut context = RenderContext::new();
		for processor in processors {
			context.extend(processor(request));
		}
		context
	}

	pub fn len(&self) -> usize {
		self.processors.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.processors.read().is_empty()
	}

	/// Clear all registered processors
	pub fn clear(&self) {
		self.processors.write().clear();
	}
}

/// Bindings the framework provides to every template
pub fn framework_globals(request: &RequestContext) -> RenderContext {
	let app = request.app();
	let config: RenderContext = app
		.config()
		.into_iter()
		.map(|(key, value)| (key, Value::from(value)))
		.collect();

	let mut globals = RenderContext::new();
	globals.insert("request".to_string(), request.request().clone());
	globals.insert("session".to_string(), request.session().clone());
	globals.insert("g".to_string(), request.g());
	globals.insert("config".to_string(), Value::Map(config));
	globals.insert(
		"url_for".to_string(),
		url_for_function(app.clone()).into(),
	);
	globals.insert(
		"get_flashed_messages".to_string(),
		flashed_messages_function(request.flashes()).into(),
	);
	if app.has_extension(I18N_EXTENSION) {
		globals.extend(i18n_functions(app));
	}
	globals
}

/// Merge the three binding layers; later layers shadow earlier ones
pub fn assemble(
	globals: RenderContext,
	processors: RenderContext,
	caller: &RenderContext,
) -> RenderContext {
	let mut context = globals;
	context.extend(processors);
	context.extend(caller.iter().map(|(k, v)| (k.clone(), v.clone())));
	context
}

/// Assemble the context of a render for the given request
pub fn assemble_for_request(request: &RequestContext, caller: &RenderContext) -> RenderContext {
	assemble(
		framework_globals(request),
		request.app().context_processors().get_context(request),
		caller,
	)
}
