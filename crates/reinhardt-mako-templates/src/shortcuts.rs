//! Render shortcuts for request handlers
//!
//! Each shortcut renders for the application of the request context pushed
//! on the calling thread, through [`Renderer::global`].
//!
//! # Examples
//!
//! ```
//! use reinhardt_mako_templates::{Application, MakoTemplates, RenderContext, RequestContext};
//! use reinhardt_mako_templates::shortcuts::render_template_string;
//! use reinhardt_mako_templates::engine::Value;
//! use std::sync::Arc;
//!
//! let app = Arc::new(Application::new("app", "/srv/app"));
//! MakoTemplates::new().init_app(&app).unwrap();
//! let _request = RequestContext::new(app).push();
//!
//! let mut context = RenderContext::new();
//! context.insert("name".to_string(), Value::from("World"));
//! let output = render_template_string("Hello ${name}!", &context).unwrap();
//! assert_eq!(&output[..], b"Hello World!");
//! ```

use crate::context::RenderContext;
use crate::error::{ConfigurationError, RenderResult};
use crate::renderer::Renderer;
use crate::request::RequestContext;
use bytes::Bytes;
use std::sync::Arc;

fn current_request() -> Result<Arc<RequestContext>, ConfigurationError> {
	RequestContext::current().ok_or(ConfigurationError::NoRequestContext)
}

/// Render the template file `name`
pub fn render_template(name: &str, context: &RenderContext) -> RenderResult<Bytes> {
	let request = current_request()?;
	Renderer::global().render_template(&request, name, context)
}

/// Render template source text
pub fn render_template_string(source: &str, context: &RenderContext) -> RenderResult<Bytes> {
	let request = current_request()?;
	Renderer::global().render_template_string(&request, source, context)
}

/// Render the def `def_name` of the template file `name`
pub fn render_template_def(name: &str, def_name: &str, context: &RenderContext) -> RenderResult<Bytes> {
	let request = current_request()?;
	Renderer::global().render_template_def(&request, name, def_name, context)
}
