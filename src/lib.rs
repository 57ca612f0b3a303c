//! # Reinhardt Mako
//!
//! Mako-style templates for Reinhardt applications.
//!
//! ## Feature Flags
//!
//! - `engine` - The template language alone: compiler, runtime and
//!   template-aware tracebacks
//! - `templates` (default) - Application integration: per-application
//!   lookups, the render pipeline, the `template_rendered` signal and
//!   translation of runtime failures onto template source
//! - `full` - All features enabled
//!
//! ## Example
//!
//! ```
//! use reinhardt_mako::prelude::*;
//! use std::sync::Arc;
//!
//! let app = Arc::new(Application::new("app", "/srv/app"));
//! MakoTemplates::new().init_app(&app).unwrap();
//! let _request = RequestContext::new(app).push();
//!
//! let mut context = RenderContext::new();
//! context.insert("items".to_string(), Value::from(vec!["a", "b"]));
//! let output = render_template_string("${len(items)}: ${items[1]}", &context).unwrap();
//! assert_eq!(&output[..], b"2: b");
//! ```

#[cfg(feature = "engine")]
pub use reinhardt_mako_engine as engine;

#[cfg(feature = "templates")]
pub use reinhardt_mako_templates as templates;

#[cfg(feature = "engine")]
pub use reinhardt_mako_engine::{
	CompileError, Context, EngineOptions, ErrorKind, ExecutionFailure, RuntimeError, Template,
	Value,
};

#[cfg(feature = "templates")]
pub use reinhardt_mako_templates::{
	Application, Blueprint, ConfigurationError, MakoSettings, MakoTemplates, RenderContext,
	RenderError, RenderResult, Renderer, RequestContext, TemplateError, render_template,
	render_template_def, render_template_string,
};

/// Convenience re-exports
pub mod prelude {
	#[cfg(feature = "engine")]
	pub use crate::{Context, EngineOptions, Template, Value};

	#[cfg(feature = "templates")]
	pub use crate::{
		Application, Blueprint, MakoTemplates, RenderContext, RenderError, RequestContext,
		render_template, render_template_def, render_template_string,
	};
}
