//! Template language tests
//!
//! End-to-end tests compiling template source and rendering it through the
//! public API.

use reinhardt_mako_engine::{
	CompileError, Context, EngineOptions, ErrorKind, FrameKind, ImportSpec, ModuleRegistry,
	Namespace, Template, Value,
};
use rstest::{fixture, rstest};
use serde::Serialize;
use std::sync::Arc;

// =============================================================================
// Fixtures
// =============================================================================

#[fixture]
fn options() -> Arc<EngineOptions> {
	Arc::new(EngineOptions::default())
}

#[derive(Serialize)]
struct Post {
	title: String,
	tags: Vec<String>,
	draft: bool,
}

#[fixture]
fn posts_context() -> Context {
	let posts = vec![
		Post {
			title: "First <post>".to_string(),
			tags: vec!["rust".to_string(), "web".to_string()],
			draft: false,
		},
		Post {
			title: "Second".to_string(),
			tags: vec![],
			draft: true,
		},
	];
	let mut context = Context::new();
	context.insert("posts".to_string(), Value::from_serialize(&posts).unwrap());
	context
}

fn render(source: &str, options: Arc<EngineOptions>, context: &Context) -> String {
	let template = Template::compile("test.html", None, source.as_bytes(), options).unwrap();
	String::from_utf8(template.render(context).unwrap()).unwrap()
}

// =============================================================================
// Happy Path Tests
// =============================================================================

/// Test rendering nested loops and conditionals over serialized data
///
/// **Category**: Happy Path
/// **Verifies**: Control lines, attribute access and filters compose
#[rstest]
fn test_nested_blocks(options: Arc<EngineOptions>, posts_context: Context) {
	// Arrange
	let source = "\
% for post in posts:
% if not post.draft:
<h1>${post.title | h}</h1>
% for tag in post.tags:
<span>${tag.upper()}</span>
% endfor
% else:
<p>draft: ${post.title}</p>
% endif
% endfor
";

	// Act
	let output = render(source, options, &posts_context);

	// Assert
	assert_eq!(
		output,
		"<h1>First &lt;post&gt;</h1>\n<span>RUST</span>\n<span>WEB</span>\n<p>draft: Second</p>\n"
	);
}

/// Test comments, doc blocks and escaped percent lines
///
/// **Category**: Happy Path
/// **Verifies**: Non-output constructs produce no text
#[rstest]
fn test_comments_and_escapes(options: Arc<EngineOptions>) {
	let source = "## hidden\n<%doc>\nnotes\n</%doc>\n%% literal\nvisible \\\njoined";

	let output = render(source, options, &Context::new());

	assert_eq!(output, "\n% literal\nvisible joined");
}

/// Test calling defs with arguments from the body
///
/// **Category**: Happy Path
/// **Verifies**: Defs receive positional, keyword and default arguments
#[rstest]
fn test_def_arguments(options: Arc<EngineOptions>) {
	let source = "<%def name=\"cell(value, tag='td')\"><${tag}>${value}</${tag}></%def>\
${cell(1)}${cell('x', tag='th')}";

	let output = render(source, options, &Context::new());

	assert_eq!(output, "<td>1</td><th>x</th>");
}

/// Test host functions receive evaluated arguments
///
/// **Category**: Happy Path
/// **Verifies**: Native functions are callable with keyword arguments
#[rstest]
fn test_native_function_call(options: Arc<EngineOptions>) {
	// Arrange
	let mut context = Context::new();
	context.insert(
		"link".to_string(),
		Value::function("link", |args| {
			let endpoint = args.expect_str(0, "endpoint")?;
			let page = args.keyword("page").map(Value::to_string).unwrap_or_default();
			Ok(Value::from(format!("/{}?page={}", endpoint, page)))
		}),
	);

	// Act
	let output = render("${link('posts', page=2)}", options, &context);

	// Assert
	assert_eq!(output, "/posts?page=2");
}

/// Test names provided by a registered import module
///
/// **Category**: Happy Path
/// **Verifies**: Import statements bind names from the module registry
#[rstest]
fn test_registered_module_import() {
	// Arrange
	let mut site = Namespace::new();
	site.insert("title".to_string(), Value::from("Example"));
	let options = EngineOptions::default()
		.with_modules(ModuleRegistry::new().with_module("site", site))
		.with_imports(ImportSpec::parse_all(&["import site", "from string import digits"]).unwrap());

	// Act
	let output = render("${site.title} ${digits[0]}", options.into(), &Context::new());

	// Assert
	assert_eq!(output, "Example 0");
}

// =============================================================================
// Error Path Tests
// =============================================================================

/// Test syntax errors report the template line
///
/// **Category**: Error Path
/// **Verifies**: Unclosed blocks are compile errors
#[rstest]
fn test_unclosed_block(options: Arc<EngineOptions>) {
	let error = Template::compile("bad.html", None, b"a\n% for x in y:\nb\n", options).unwrap_err();

	assert!(matches!(error, CompileError::Syntax { line: 2, .. }), "{}", error);
}

/// Test unsupported tags are rejected
///
/// **Category**: Error Path
/// **Verifies**: Inheritance tags are not part of the language
#[rstest]
fn test_inherit_is_rejected(options: Arc<EngineOptions>) {
	let error =
		Template::compile("bad.html", None, b"<%inherit file=\"base.html\"/>", options).unwrap_err();

	assert!(error.to_string().contains("unsupported tag"), "{}", error);
}

/// Test a failure inside a def called from the body
///
/// **Category**: Error Path
/// **Verifies**: Both template frames map to their own lines
#[rstest]
fn test_failure_inside_def(options: Arc<EngineOptions>) {
	// Arrange
	let source = "<%def name=\"broken()\">\n${1 // 0}\n</%def>\nbefore\n${broken()}\n";
	let template = Template::compile("def.html", None, source.as_bytes(), options).unwrap();

	// Act
	let failure = template.render(&Context::new()).unwrap_err();
	let traceback = template.rich_traceback(&failure);

	// Assert
	assert_eq!(failure.error.kind, ErrorKind::DivisionByZero);
	assert_eq!(failure.frames.last().unwrap().kind, FrameKind::Interception);
	let lines: Vec<(String, usize)> = traceback
		.records
		.iter()
		.flatten()
		.map(|location| (location.function.clone(), location.line))
		.collect();
	assert_eq!(
		lines,
		vec![("render_body".to_string(), 5), ("render_broken".to_string(), 2)]
	);
}
