//! # Reinhardt Mako Engine
//!
//! Mako-style template language: compiler, generated modules, runtime and
//! template-aware tracebacks.
//!
//! ## Syntax
//!
//! - Substitution: `${expression}`, `${expression | h, trim}`
//! - Control lines: `% for x in items:` / `% endfor`, `% if` / `% elif` /
//!   `% else` / `% endif`
//! - Named blocks: `<%def name="row(item, css='odd')">...</%def>`, called as
//!   `${row(item)}` or rendered on their own
//! - `##` comment lines, `<%doc>` blocks, `%%` for a literal `%`
//!
//! ## Example
//!
//! ```
//! use reinhardt_mako_engine::{Context, EngineOptions, Template, Value};
//!
//! let source = b"% for arg in arguments:\n${arg}\n% endfor\n";
//! let template = Template::compile("list.txt", None, source, EngineOptions::default().into())
//!     .unwrap();
//!
//! let mut context = Context::new();
//! context.insert("arguments".to_string(), Value::from(vec!["testing", "123"]));
//! assert_eq!(template.render(&context).unwrap(), b"testing\n123\n");
//! ```
//!
//! Failures are returned as an [`ExecutionFailure`] carrying the frames that
//! were live when it was raised. [`Template::rich_traceback`] maps the frames
//! executing generated code back to template lines.

pub mod ast;
pub mod codegen;
pub mod encoding;
pub mod error;
pub mod expr;
pub mod filters;
pub mod imports;
pub mod lexer;
pub mod module;
pub mod parser;
pub mod runtime;
pub mod template;
pub mod traceback;
pub mod value;

pub use encoding::{Encoding, EncodingFailure};
pub use error::{CompileError, ErrorKind, RuntimeError};
pub use imports::{ImportSpec, ModuleRegistry, Namespace};
pub use module::{GeneratedFunction, GeneratedModule, Instruction};
pub use runtime::{CallSite, ExecutionFailure, FrameKind, NativeFrame};
pub use template::{DefTemplate, EngineOptions, Preprocessor, Template};
pub use traceback::{RichTraceback, TemplateLocation};
pub use value::{Arguments, Context, Function, Value};
