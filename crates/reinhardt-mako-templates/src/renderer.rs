//! The render pipeline
//!
//! A render resolves the template through the application's lookup,
//! assembles the context, executes the template (or one of its defs) and
//! either returns the output after notifying `template_rendered` receivers
//! or reports the failure, translated onto template source when the
//! application enables it.

use crate::context::{RenderContext, assemble_for_request};
use crate::error::{ConfigurationError, RenderError, RenderResult};
use crate::extension::EXTENSION_NAME;
use crate::registry::LookupRegistry;
use crate::request::RequestContext;
use crate::signals::{TemplateRendered, TemplateRenderedSignal};
use crate::translator::ErrorTranslator;
use bytes::Bytes;
use once_cell::sync::Lazy;
use reinhardt_mako_engine::Template;
use std::sync::Arc;
use tracing::trace;

static GLOBAL_RENDERER: Lazy<Renderer> = Lazy::new(|| Renderer::new(LookupRegistry::global()));

/// What to render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateSource<'a> {
	/// A template file found on the search path
	Named(&'a str),
	/// Template source text
	Inline(&'a str),
	/// A def of a template file
	Def { template: &'a str, def_name: &'a str },
}

/// Stage a render is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
	Idle,
	Resolving,
	Compiling,
	Executing,
	Succeeded,
	Failed,
}

/// Renders templates for the applications of one registry
#[derive(Debug, Clone)]
pub struct Renderer {
	registry: LookupRegistry,
	signal: TemplateRenderedSignal,
	translator: ErrorTranslator,
}

impl Renderer {
	pub fn new(registry: LookupRegistry) -> Self {
		Self {
			registry,
			signal: TemplateRenderedSignal::new(),
			translator: ErrorTranslator::default(),
		}
	}

	pub fn with_translator(mut self, translator: ErrorTranslator) -> Self {
		self.translator = translator;
		self
	}

	/// The renderer behind the render shortcuts
	pub fn global() -> &'static Renderer {
		&GLOBAL_RENDERER
	}

	/// The `template_rendered` signal of this renderer
	pub fn signal(&self) -> &TemplateRenderedSignal {
		&self.signal
	}

	pub fn registry(&self) -> &LookupRegistry {
		&self.registry
	}

	/// Render `source` for the application of `request`
	///
	/// `context` values shadow framework globals and context processor
	/// output.
	pub fn render(
		&self,
		request: &RequestContext,
		source: TemplateSource<'_>,
		context: &RenderContext,
	) -> RenderResult<Bytes> {
		let app = request.app();
		let mut phase = RenderPhase::Idle;
		trace!(?phase, ?source, app = app.name());
		if !app.has_extension(EXTENSION_NAME) {
			return Err(ConfigurationError::NotInitialized(app.name().to_string()).into());
		}
		let lookup = self.registry.get_or_create(app)?;

		let (template, def_name) = match source {
			TemplateSource::Named(name) => {
				advance(&mut phase, RenderPhase::Resolving);
				(lookup.get_template(name)?, None)
			}
			TemplateSource::Inline(text) => {
				advance(&mut phase, RenderPhase::Compiling);
				(lookup.compile_source(text)?, None)
			}
			TemplateSource::Def { template, def_name } => {
				advance(&mut phase, RenderPhase::Resolving);
				let compiled = lookup.get_template(template)?;
				if !compiled.has_def(def_name) {
					return Err(RenderError::DefNotFound {
						template: template.to_string(),
						def_name: def_name.to_string(),
					});
				}
				(compiled, Some(def_name))
			}
		};

		let context = assemble_for_request(request, context);
		advance(&mut phase, RenderPhase::Executing);
		let result = match def_name.and_then(|name| template.get_def(name)) {
			Some(def) => def.render(&context),
			None => template.render(&context),
		};

		match result {
			Ok(output) => {
				advance(&mut phase, RenderPhase::Succeeded);
				self.signal.send(&TemplateRendered {
					app: app.id(),
					template: template.clone(),
					def_name: def_name.map(str::to_string),
					context,
				});
				Ok(Bytes::from(output))
			}
			Err(failure) => {
				advance(&mut phase, RenderPhase::Failed);
				if lookup.translate_exceptions() {
					Err(self.translator.translate(&template, &failure).into())
				} else {
					Err(failure.error.into())
				}
			}
		}
	}

	/// Render a template file by name
	pub fn render_template(
		&self,
		request: &RequestContext,
		name: &str,
		context: &RenderContext,
	) -> RenderResult<Bytes> {
		self.render(request, TemplateSource::Named(name), context)
	}

	/// Compile-or-reuse then render template source text
	pub fn render_template_string(
		&self,
		request: &RequestContext,
		source: &str,
		context: &RenderContext,
	) -> RenderResult<Bytes> {
		self.render(request, TemplateSource::Inline(source), context)
	}

	/// Render one def of a template file
	pub fn render_template_def(
		&self,
		request: &RequestContext,
		name: &str,
		def_name: &str,
		context: &RenderContext,
	) -> RenderResult<Bytes> {
		self.render(
			request,
			TemplateSource::Def {
				template: name,
				def_name,
			},
			context,
		)
	}

	/// Compiled template for `name` in the application of `request`
	pub fn get_template(&self, request: &RequestContext, name: &str) -> RenderResult<Arc<Template>> {
		self.registry.get_or_create(request.app())?.get_template(name)
	}
}

fn advance(phase: &mut RenderPhase, next: RenderPhase) {
	trace!(from = ?*phase, to = ?next, "render phase");
	*phase = next;
}
