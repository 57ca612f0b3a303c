//! Compiled templates and the options they are compiled with

use crate::codegen::{ModuleHeader, generate};
use crate::encoding::Encoding;
use crate::error::CompileError;
use crate::filters::DEFAULT_FILTERS;
use crate::imports::{ImportSpec, ModuleRegistry};
use crate::module::GeneratedModule;
use crate::parser::parse;
use crate::runtime::{CallSite, Entry, ExecutionFailure, Runtime};
use crate::traceback::RichTraceback;
use crate::value::Context;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Source transform applied before a template is lexed
pub type Preprocessor = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Settings shared by every template compiled from one environment
#[derive(Clone)]
pub struct EngineOptions {
	pub input_encoding: Encoding,
	pub output_encoding: Encoding,
	pub default_filters: Vec<String>,
	pub imports: Vec<ImportSpec>,
	pub preprocessors: Vec<Preprocessor>,
	pub modules: ModuleRegistry,
}

impl Default for EngineOptions {
	fn default() -> Self {
		Self {
			input_encoding: Encoding::Utf8,
			output_encoding: Encoding::Utf8,
			default_filters: DEFAULT_FILTERS.iter().map(|f| f.to_string()).collect(),
			imports: Vec::new(),
			preprocessors: Vec::new(),
			modules: ModuleRegistry::new(),
		}
	}
}

impl fmt::Debug for EngineOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EngineOptions")
			.field("input_encoding", &self.input_encoding)
			.field("output_encoding", &self.output_encoding)
			.field("default_filters", &self.default_filters)
			.field("imports", &self.imports)
			.field("preprocessors", &self.preprocessors.len())
			.field("modules", &self.modules.names().collect::<Vec<_>>())
			.finish()
	}
}

impl EngineOptions {
	pub fn with_input_encoding(mut self, encoding: Encoding) -> Self {
		self.input_encoding = encoding;
		self
	}

	pub fn with_output_encoding(mut self, encoding: Encoding) -> Self {
		self.output_encoding = encoding;
		self
	}

	pub fn with_default_filters<I, S>(mut self, filters: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.default_filters = filters.into_iter().map(Into::into).collect();
		self
	}

	pub fn with_imports(mut self, imports: Vec<ImportSpec>) -> Self {
		self.imports = imports;
		self
	}

	pub fn with_preprocessor<F>(mut self, preprocessor: F) -> Self
	where
		F: Fn(&str) -> String + Send + Sync + 'static,
	{
		self.preprocessors.push(Arc::new(preprocessor));
		self
	}

	pub fn with_modules(mut self, modules: ModuleRegistry) -> Self {
		self.modules = modules;
		self
	}
}

/// A compiled template
///
/// Cloning is cheap; clones share the generated module.
///
/// # Examples
///
/// ```
/// use reinhardt_mako_engine::{Context, EngineOptions, Template, Value};
///
/// let template = Template::compile(
///     "hello.html",
///     None,
///     b"Hello ${name | h}!",
///     EngineOptions::default().into(),
/// )
/// .unwrap();
///
/// let mut context = Context::new();
/// context.insert("name".to_string(), Value::from("<world>"));
/// assert_eq!(template.render(&context).unwrap(), b"Hello &lt;world&gt;!");
/// ```
#[derive(Debug, Clone)]
pub struct Template {
	module: Arc<GeneratedModule>,
	options: Arc<EngineOptions>,
}

impl Template {
	/// Decode, preprocess and compile template source
	pub fn compile(
		uri: &str,
		filename: Option<&str>,
		bytes: &[u8],
		options: Arc<EngineOptions>,
	) -> Result<Self, CompileError> {
		let decoded = options
			.input_encoding
			.decode(bytes)
			.map_err(|failure| CompileError::Decode {
				template: uri.to_string(),
				encoding: options.input_encoding.to_string(),
				offset: failure.offset,
			})?;
		let source = options
			.preprocessors
			.iter()
			.fold(decoded, |source, preprocess| preprocess(&source));
		let document = parse(&source, uri)?;
		let module = generate(
			&document,
			&ModuleHeader {
				uri,
				filename,
				source: &source,
				imports: &options.imports,
				default_filters: &options.default_filters,
			},
		);
		debug!(uri, defs = document.defs.len(), "compiled template");
		Ok(Self::from_module(module, options))
	}

	/// Wrap an already generated module, for example one loaded from disk
	pub fn from_module(module: GeneratedModule, options: Arc<EngineOptions>) -> Self {
		Self {
			module: Arc::new(module),
			options,
		}
	}

	pub fn uri(&self) -> &str {
		&self.module.uri
	}

	pub fn filename(&self) -> Option<&str> {
		self.module.filename.as_deref()
	}

	pub fn module(&self) -> &GeneratedModule {
		&self.module
	}

	pub fn options(&self) -> &EngineOptions {
		&self.options
	}

	/// Generated program listing
	pub fn code(&self) -> &str {
		&self.module.code
	}

	/// Render the template body, encoded with the output encoding
	pub fn render(&self, context: &Context) -> Result<Vec<u8>, ExecutionFailure> {
		self.execute(
			Entry::Body,
			context,
			CallSite::new("Template::render", file!(), line!()),
		)
	}

	pub fn has_def(&self, name: &str) -> bool {
		self.module.def(name).is_some()
	}

	pub fn def_names(&self) -> impl Iterator<Item = &str> {
		self.module.def_names()
	}

	/// The def `name` as a renderable template
	pub fn get_def(&self, name: &str) -> Option<DefTemplate> {
		self.has_def(name).then(|| DefTemplate {
			template: self.clone(),
			name: name.to_string(),
		})
	}

	pub fn rich_traceback(&self, failure: &ExecutionFailure) -> RichTraceback {
		RichTraceback::new(failure, &self.module)
	}

	fn execute(
		&self,
		entry: Entry<'_>,
		context: &Context,
		caller: CallSite,
	) -> Result<Vec<u8>, ExecutionFailure> {
		Runtime::new(&self.module, context, &self.options.modules).execute(
			entry,
			self.options.output_encoding,
			caller,
		)
	}
}

/// A def of a compiled template
///
/// Rendering a def produces only the def body. Its parameters are taken
/// from the context by name, falling back to their defaults.
#[derive(Debug, Clone)]
pub struct DefTemplate {
	template: Template,
	name: String,
}

impl DefTemplate {
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn template(&self) -> &Template {
		&self.template
	}

	pub fn render(&self, context: &Context) -> Result<Vec<u8>, ExecutionFailure> {
		self.template.execute(
			Entry::Def(&self.name),
			context,
			CallSite::new("DefTemplate::render", file!(), line!()),
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value::Value;
	use rstest::{fixture, rstest};

	#[fixture]
	fn options() -> Arc<EngineOptions> {
		Arc::new(EngineOptions::default())
	}

	#[rstest]
	fn test_decode_failure_is_a_compile_error() {
		// Arrange
		let options = Arc::new(EngineOptions::default().with_input_encoding(Encoding::Ascii));

		// Act
		let error = Template::compile("t.html", None, "caf\u{e9}".as_bytes(), options).unwrap_err();

		// Assert
		assert_eq!(
			error,
			CompileError::Decode {
				template: "t.html".to_string(),
				encoding: "ascii".to_string(),
				offset: 3,
			}
		);
	}

	#[rstest]
	fn test_preprocessors_run_in_order() {
		let options = EngineOptions::default()
			.with_preprocessor(|s| s.replace("[[", "${"))
			.with_preprocessor(|s| s.replace("]]", "}"));

		let template = Template::compile("t.html", None, b"[[1 + 1]]", options.into()).unwrap();

		assert_eq!(template.render(&Context::new()).unwrap(), b"2");
	}

	#[rstest]
	fn test_default_filters_can_be_replaced() {
		let options = EngineOptions::default().with_default_filters(["str", "h"]);

		let template =
			Template::compile("t.html", None, b"${'<a>'}${'<b>' | n}", options.into()).unwrap();

		assert_eq!(template.render(&Context::new()).unwrap(), b"&lt;a&gt;<b>");
	}

	#[rstest]
	fn test_def_renders_only_its_body(options: Arc<EngineOptions>) {
		// Arrange
		let source = b"outside\n<%def name=\"test_def()\">inside</%def>\n";
		let template = Template::compile("t.html", None, source, options).unwrap();

		// Act
		let output = template.get_def("test_def").unwrap().render(&Context::new()).unwrap();

		// Assert
		assert_eq!(output, b"inside");
		assert!(template.get_def("other").is_none());
	}

	#[rstest]
	fn test_latin1_output(options: Arc<EngineOptions>) {
		let options = Arc::new((*options).clone().with_output_encoding(Encoding::Latin1));
		let template = Template::compile("t.html", None, b"${word}", options).unwrap();
		let mut context = Context::new();
		context.insert("word".to_string(), Value::from("caf\u{e9}"));

		assert_eq!(template.render(&context).unwrap(), b"caf\xe9");
	}

	#[rstest]
	fn test_rich_traceback_points_at_template_line(options: Arc<EngineOptions>) {
		// Arrange
		let template = Template::compile(
			"t.html",
			Some("/srv/templates/t.html"),
			b"one\ntwo\n${error}\n",
			options,
		)
		.unwrap();
		let failure = template.render(&Context::new()).unwrap_err();

		// Act
		let traceback = template.rich_traceback(&failure);

		// Assert
		assert_eq!(traceback.lineno, 3);
		let location = traceback.innermost().unwrap();
		assert_eq!(location.display_name(), "/srv/templates/t.html");
		assert_eq!(location.function, "render_body");
		assert!(traceback.records[0].is_none());
		assert!(traceback.records.last().unwrap().is_none());
	}
}
