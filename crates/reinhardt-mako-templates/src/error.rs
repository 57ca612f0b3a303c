//! Error types for template lookup and rendering

use crate::path_resolver::SearchPath;
use crate::translator::TemplateError;
use reinhardt_mako_engine::{CompileError, RuntimeError};
use std::path::PathBuf;
use thiserror::Error;

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Invalid setup of the extension or of an application's settings
#[derive(Debug, Error)]
pub enum ConfigurationError {
	/// `init_app` ran a second time for the same application
	#[error("Application '{0}' is already initialized for Mako templates")]
	AlreadyInitialized(String),

	/// The extension object is already bound to another application
	#[error("Mako extension is already bound to application '{0}'")]
	AlreadyBound(String),

	/// Rendering was requested for an application `init_app` never ran for
	#[error("Application '{0}' is not initialized for Mako templates")]
	NotInitialized(String),

	/// The extension object has not been bound to any application
	#[error("Mako extension is not bound to an application")]
	Unbound,

	#[error("Unknown encoding '{0}'")]
	UnknownEncoding(String),

	#[error("Invalid setting {key}: {message}")]
	InvalidSetting { key: String, message: String },

	/// A shortcut ran outside of a pushed request context
	#[error("Working outside of request context")]
	NoRequestContext,

	#[error("Unknown preprocessor '{0}'")]
	UnknownPreprocessor(String),

	#[error("Invalid template import: {0}")]
	InvalidImport(#[source] CompileError),

	#[error("Failed to parse settings: {0}")]
	Parse(#[from] toml::de::Error),
}

/// Failure of a render call
#[derive(Debug, Error)]
pub enum RenderError {
	/// No directory of the search path holds the template
	#[error("Template '{name}' not found in search path {search_path}")]
	NotFound {
		name: String,
		search_path: SearchPath,
	},

	#[error("Template '{template}' has no def named '{def_name}'")]
	DefNotFound { template: String, def_name: String },

	/// Template source does not compile; never translated
	#[error(transparent)]
	Compile(#[from] CompileError),

	/// Runtime failure translated onto template source
	#[error(transparent)]
	Template(Box<TemplateError>),

	/// Runtime failure as raised, when translation is disabled
	#[error(transparent)]
	Runtime(#[from] RuntimeError),

	#[error(transparent)]
	Configuration(#[from] ConfigurationError),

	#[error("I/O error on '{}': {source}", .path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

impl RenderError {
	pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
		let path = path.into();
		move |source| Self::Io { path, source }
	}

	/// Whether the error means the requested template or def does not exist
	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound { .. } | Self::DefNotFound { .. })
	}

	/// The translated template error, when this is one
	pub fn as_template_error(&self) -> Option<&TemplateError> {
		match self {
			Self::Template(error) => Some(error),
			_ => None,
		}
	}
}

impl From<TemplateError> for RenderError {
	fn from(error: TemplateError) -> Self {
		Self::Template(Box::new(error))
	}
}
