//! # Reinhardt Mako Templates
//!
//! Mako templates for Reinhardt applications.
//!
//! ## Features
//!
//! - Template search path: the application folder first, then blueprint
//!   folders in registration order
//! - One template lookup per application with an LRU cache of compiled
//!   templates, refreshed when template files change
//! - Inline templates cached by source digest
//! - Framework globals (`request`, `session`, `g`, `config`, `url_for`,
//!   `get_flashed_messages`), context processors and optional i18n functions
//! - `template_rendered` signal
//! - Runtime failures translated onto template file and line
//!
//! ## Example
//!
//! ```
//! use reinhardt_mako_templates::{Application, MakoTemplates, RenderContext, RequestContext};
//! use reinhardt_mako_templates::shortcuts::render_template;
//! use std::fs;
//! use std::sync::Arc;
//!
//! let root = tempfile::tempdir().unwrap();
//! fs::create_dir_all(root.path().join("templates")).unwrap();
//! fs::write(root.path().join("templates/index.html"), "% for i in range(3):\n${i}\n% endfor\n").unwrap();
//!
//! let app = Arc::new(Application::new("app", root.path()));
//! MakoTemplates::new().init_app(&app).unwrap();
//!
//! let _request = RequestContext::new(app).push();
//! let output = render_template("index.html", &RenderContext::new()).unwrap();
//! assert_eq!(&output[..], b"0\n1\n2\n");
//! ```

pub mod app;
pub mod context;
pub mod error;
pub mod extension;
pub mod helpers;
pub mod lookup;
pub mod path_resolver;
pub mod registry;
pub mod renderer;
pub mod request;
pub mod settings;
pub mod shortcuts;
pub mod signals;
pub mod translator;

pub use reinhardt_mako_engine as engine;

pub use app::{AppId, Application, Blueprint, ConfigMap, NullTranslations, Translations, UrlBuilder};
pub use context::{ContextProcessor, ContextProcessorRegistry, RenderContext, assemble, framework_globals};
pub use error::{ConfigurationError, RenderError, RenderResult};
pub use extension::{EXTENSION_NAME, MakoTemplates};
pub use lookup::TemplateLookup;
pub use path_resolver::{SearchPath, resolve_search_path};
pub use registry::LookupRegistry;
pub use renderer::{RenderPhase, Renderer, TemplateSource};
pub use request::{Flash, RequestContext, RequestGuard};
pub use settings::MakoSettings;
pub use shortcuts::{render_template, render_template_def, render_template_string};
pub use signals::{TemplateRendered, TemplateRenderedSignal};
pub use translator::{ErrorTranslator, TemplateError, TranslatedFrame, source_listing, translate_frames};
