//! Translation of runtime failures onto template source
//!
//! The engine reports a failure with the execution frames that were live,
//! most of them running generated code. The translator rewrites the frames
//! running generated code of the failing template so they name the template
//! file and line, and exposes the bindings the template could see instead
//! of the runtime's bookkeeping.

use indexmap::IndexMap;
use reinhardt_mako_engine::runtime::CONTEXT_LOCAL;
use reinhardt_mako_engine::{
	ErrorKind, ExecutionFailure, FrameKind, NativeFrame, RuntimeError, Template, TemplateLocation,
	Value,
};
use std::fmt::Write;
use thiserror::Error;

/// Source lines shown around the failing line by default
pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// One frame of a translated traceback
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedFrame {
	/// Template filename (or URI) for template frames, host file otherwise
	pub filename: String,
	pub line: usize,
	pub function: String,
	/// Bindings visible to the frame
	pub locals: IndexMap<String, Value>,
	/// Runtime bookkeeping of template frames
	pub internals: IndexMap<String, Value>,
	pub is_template: bool,
	/// Template source line, for template frames
	pub source_line: Option<String>,
}

/// A runtime failure translated onto template source
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TemplateError {
	pub message: String,
	pub template_uri: String,
	/// The failure as raised by the runtime
	#[source]
	pub original: RuntimeError,
	/// Traceback summary followed by the source listing
	pub text: String,
	/// Failing template source with the failing line marked
	pub listing: String,
	/// Translated frames, oldest first
	pub frames: Vec<TranslatedFrame>,
	/// Template line of the failure, 0 when no template frame was live
	pub lineno: usize,
}

impl TemplateError {
	pub fn kind(&self) -> ErrorKind {
		self.original.kind
	}

	/// Innermost frame running template code
	pub fn template_frame(&self) -> Option<&TranslatedFrame> {
		self.frames.iter().rev().find(|frame| frame.is_template)
	}
}

/// Rewrite raw frames using the parallel traceback records
///
/// A frame with a record becomes a template frame; a frame without one is
/// kept as it is. The innermost frame is dropped when it is the runtime's
/// interception frame.
pub fn translate_frames(
	frames: &[NativeFrame],
	records: &[Option<TemplateLocation>],
	source_line: impl Fn(usize) -> Option<String>,
) -> Vec<TranslatedFrame> {
	let live = match frames.last() {
		Some(last) if last.kind == FrameKind::Interception => &frames[..frames.len() - 1],
		_ => frames,
	};
	live.iter()
		.enumerate()
		.map(|(index, frame)| match records.get(index).and_then(Option::as_ref) {
			Some(location) => template_frame(frame, location, &source_line),
			None => TranslatedFrame {
				filename: frame.file.clone(),
				line: frame.line,
				function: frame.function.clone(),
				locals: frame.locals.clone(),
				internals: IndexMap::new(),
				is_template: false,
				source_line: None,
			},
		})
		.collect()
}

fn template_frame(
	frame: &NativeFrame,
	location: &TemplateLocation,
	source_line: &impl Fn(usize) -> Option<String>,
) -> TranslatedFrame {
	let mut locals = IndexMap::new();
	let mut internals = IndexMap::new();
	for (name, value) in &frame.locals {
		match (name.as_str(), value) {
			(CONTEXT_LOCAL, Value::Map(bindings)) => locals = bindings.clone(),
			_ => {
				internals.insert(name.clone(), value.clone());
			}
		}
	}
	TranslatedFrame {
		filename: location.display_name().to_string(),
		line: location.line,
		function: location.function.clone(),
		locals,
		internals,
		is_template: true,
		source_line: source_line(location.line).map(|text| text.trim().to_string()),
	}
}

/// Lines around `lineno`, the failing one marked with `>>`
///
/// # Examples
///
/// ```
/// use reinhardt_mako_templates::source_listing;
///
/// let listing = source_listing("a\nb\nc\nd", 2, 1);
/// assert_eq!(listing, "      1 | a\n>>    2 | b\n      3 | c\n");
/// ```
pub fn source_listing(source: &str, lineno: usize, context: usize) -> String {
	let mut output = String::new();
	if lineno == 0 {
		return output;
	}
	let first = lineno.saturating_sub(context).max(1);
	let last = lineno + context;
	for (index, text) in source.lines().enumerate() {
		let number = index + 1;
		if number < first || number > last {
			continue;
		}
		let marker = if number == lineno { ">>" } else { "  " };
		let _ = writeln!(output, "{} {:4} | {}", marker, number, text);
	}
	output
}

/// Turns execution failures of a template into [`TemplateError`]s
#[derive(Debug, Clone, Copy)]
pub struct ErrorTranslator {
	context_lines: usize,
}

impl Default for ErrorTranslator {
	fn default() -> Self {
		Self {
			context_lines: DEFAULT_CONTEXT_LINES,
		}
	}
}

impl ErrorTranslator {
	pub fn new() -> Self {
		Self::default()
	}

	/// Show `lines` source lines on each side of the failing line
	pub fn with_context_lines(mut self, lines: usize) -> Self {
		self.context_lines = lines;
		self
	}

	/// Translate a failure raised while rendering `template`
	pub fn translate(&self, template: &Template, failure: &ExecutionFailure) -> TemplateError {
		let traceback = template.rich_traceback(failure);
		let module = template.module();
		let frames = translate_frames(&failure.frames, &traceback.records, |line| {
			module.source_line_text(line).map(str::to_string)
		});
		let listing = source_listing(&traceback.source, traceback.lineno, self.context_lines);

		let mut text = String::from("Traceback (most recent call last):\n");
		for frame in &frames {
			let _ = writeln!(
				text,
				"  File \"{}\", line {}, in {}",
				frame.filename, frame.line, frame.function
			);
			if let Some(line) = &frame.source_line {
				let _ = writeln!(text, "    {}", line);
			}
		}
		let _ = writeln!(text, "{}", failure.error);
		text.push_str(&listing);

		TemplateError {
			message: format!("Error occurred while rendering template '{}'", template.uri()),
			template_uri: template.uri().to_string(),
			original: failure.error.clone(),
			text,
			listing,
			frames,
			lineno: traceback.lineno,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use reinhardt_mako_engine::{Context, EngineOptions};
	use rstest::{fixture, rstest};

	#[fixture]
	fn template() -> Template {
		let source = b"<%def name=\"broken(item)\">\n${item.missing}\n</%def>\nfirst\n${broken(value)}\n";
		Template::compile("broken.html", Some("/srv/broken.html"), source, EngineOptions::default().into())
			.unwrap()
	}

	fn failure(template: &Template) -> ExecutionFailure {
		let mut context = Context::new();
		context.insert("value".to_string(), Value::from("text"));
		template.render(&context).unwrap_err()
	}

	#[rstest]
	fn test_template_frames_point_at_source(template: Template) {
		// Arrange
		let failure = failure(&template);

		// Act
		let error = ErrorTranslator::new().translate(&template, &failure);

		// Assert
		let lines: Vec<(&str, usize)> = error
			.frames
			.iter()
			.filter(|f| f.is_template)
			.map(|f| (f.function.as_str(), f.line))
			.collect();
		assert_eq!(lines, vec![("render_body", 5), ("render_broken", 2)]);
		assert_eq!(error.lineno, 2);
		assert_eq!(error.kind(), ErrorKind::MissingAttribute);
		assert_eq!(error.to_string(), "Error occurred while rendering template 'broken.html'");
	}

	#[rstest]
	fn test_interception_frame_dropped(template: Template) {
		let failure = failure(&template);

		let error = ErrorTranslator::new().translate(&template, &failure);

		assert_eq!(error.frames.len(), failure.frames.len() - 1);
		assert!(error.frames.iter().all(|f| f.function != "Runtime::raise"));
	}

	#[rstest]
	fn test_template_locals_and_internals(template: Template) {
		// Arrange
		let failure = failure(&template);

		// Act
		let error = ErrorTranslator::new().translate(&template, &failure);

		// Assert
		let frame = error.template_frame().unwrap();
		assert_eq!(frame.locals["item"], Value::from("text"));
		assert!(!frame.internals.contains_key("context"));
		assert!(frame.internals.keys().all(|k| k.starts_with("__")));
		assert_eq!(frame.source_line.as_deref(), Some("${item.missing}"));
		assert_eq!(frame.filename, "/srv/broken.html");
	}

	#[rstest]
	fn test_text_contains_summary_and_listing(template: Template) {
		let failure = failure(&template);

		let error = ErrorTranslator::new().with_context_lines(0).translate(&template, &failure);

		assert!(error.text.starts_with("Traceback (most recent call last):\n"));
		assert!(error.text.contains("File \"/srv/broken.html\", line 2, in render_broken"));
		assert!(error.text.ends_with(">>    2 | ${item.missing}\n"));
		assert_eq!(error.listing, ">>    2 | ${item.missing}\n");
	}

	#[rstest]
	fn test_host_frames_kept() {
		// Arrange
		let host = NativeFrame {
			kind: FrameKind::Host,
			file: "src/app.rs".to_string(),
			function: "handler".to_string(),
			line: 10,
			locals: IndexMap::new(),
		};
		let interception = NativeFrame {
			kind: FrameKind::Interception,
			..host.clone()
		};

		// Act
		let frames = translate_frames(&[host.clone(), interception], &[None, None], |_| None);

		// Assert
		assert_eq!(frames.len(), 1);
		assert_eq!(frames[0].filename, "src/app.rs");
		assert!(!frames[0].is_template);
	}

	#[rstest]
	#[case(1, "a")]
	#[case(4, "d")]
	fn test_listing_window_clamped(#[case] lineno: usize, #[case] marked: &str) {
		let listing = source_listing("a\nb\nc\nd", lineno, 5);

		assert_eq!(listing.lines().count(), 4);
		assert!(listing.contains(&format!(">> {:4} | {}", lineno, marked)));
	}

	#[rstest]
	fn test_no_template_line_no_listing() {
		assert_eq!(source_listing("a\nb", 0, 3), "");
	}
}
