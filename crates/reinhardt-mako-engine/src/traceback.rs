//! Maps execution failures back onto template source

use crate::error::RuntimeError;
use crate::module::GeneratedModule;
use crate::runtime::{ExecutionFailure, FrameKind};

/// Position inside a template that a generated frame was executing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateLocation {
	pub uri: String,
	pub filename: Option<String>,
	pub line: usize,
	pub function: String,
}

impl TemplateLocation {
	/// Filename when the template came from disk, else its URI
	pub fn display_name(&self) -> &str {
		self.filename.as_deref().unwrap_or(&self.uri)
	}
}

/// Template-aware view of an [`ExecutionFailure`]
///
/// `records` runs parallel to the failure's frames: a frame executing
/// generated code of the module gets the template location it corresponds
/// to, every other frame gets `None`.
///
/// # Examples
///
/// ```
/// use reinhardt_mako_engine::{Context, EngineOptions, Template};
///
/// let template = Template::compile(
///     "page.html",
///     None,
///     b"first\nsecond ${missing}\n",
///     EngineOptions::default().into(),
/// )
/// .unwrap();
/// let failure = template.render(&Context::new()).unwrap_err();
///
/// let traceback = template.rich_traceback(&failure);
/// assert_eq!(traceback.lineno, 2);
/// assert_eq!(traceback.records.len(), failure.frames.len());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RichTraceback {
	pub error: RuntimeError,
	pub records: Vec<Option<TemplateLocation>>,
	/// Full template source
	pub source: String,
	/// Template line of the innermost template frame, 0 when none
	pub lineno: usize,
}

impl RichTraceback {
	pub fn new(failure: &ExecutionFailure, module: &GeneratedModule) -> Self {
		let records: Vec<Option<TemplateLocation>> = failure
			.frames
			.iter()
			.map(|frame| {
				(frame.kind == FrameKind::Generated && frame.file == module.module_file).then(|| {
					TemplateLocation {
						uri: module.uri.clone(),
						filename: module.filename.clone(),
						line: module.source_line_for(frame.line).unwrap_or(1),
						function: frame.function.clone(),
					}
				})
			})
			.collect();
		let lineno = records
			.iter()
			.rev()
			.flatten()
			.next()
			.map_or(0, |location| location.line);
		Self {
			error: failure.error.clone(),
			records,
			source: module.source.clone(),
			lineno,
		}
	}

	/// Innermost template location
	pub fn innermost(&self) -> Option<&TemplateLocation> {
		self.records.iter().rev().flatten().next()
	}
}
