//! Generated modules: the compiled form of a template
//!
//! A template compiles to a [`GeneratedModule`] holding one
//! [`GeneratedFunction`] for the template body and one per `<%def>`. Every
//! instruction sits on its own line of the generated program text, and the
//! module keeps a map from generated lines back to template lines so failures
//! inside generated code can be reported against the template source.

use crate::ast::Param;
use crate::expr::Expr;
use crate::imports::ImportSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the generated function rendering the template body
pub const BODY_FUNCTION: &str = "render_body";

/// Name of the generated function rendering the def `name`
pub fn def_function_name(name: &str) -> String {
	format!("render_{}", name)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
	/// Append literal text
	Write(String),
	/// Evaluate, filter and append an expression
	Emit { expr: Expr, filters: Vec<String> },
	/// Begin a loop; jumps to `exit` when the iterable is empty
	ForStart {
		targets: Vec<String>,
		iter: Expr,
		exit: usize,
	},
	/// Bind the next item of the loop opened at `start`, or leave the loop
	ForNext { start: usize },
	/// Jump to `target` when the condition is falsy
	JumpUnless { cond: Expr, target: usize },
	Jump(usize),
	Return,
}

impl fmt::Display for Instruction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Write(text) => write!(f, "write({:?})", text),
			Self::Emit { expr, filters } if filters.is_empty() => write!(f, "emit({})", expr),
			Self::Emit { expr, filters } => write!(f, "emit({} | {})", expr, filters.join(", ")),
			Self::ForStart {
				targets,
				iter,
				exit,
			} => write!(f, "for {} in {} else goto {}", targets.join(", "), iter, exit),
			Self::ForNext { start } => write!(f, "next {} else exit", start),
			Self::JumpUnless { cond, target } => write!(f, "unless {} goto {}", cond, target),
			Self::Jump(target) => write!(f, "goto {}", target),
			Self::Return => f.write_str("return"),
		}
	}
}

/// An instruction and its placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
	pub instruction: Instruction,
	/// Line of the generated program text this instruction occupies
	pub generated_line: usize,
	/// Template line the instruction was compiled from
	pub source_line: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedFunction {
	pub name: String,
	/// Def name for def functions, `None` for the body
	pub def_name: Option<String>,
	pub params: Vec<Param>,
	pub header_line: usize,
	pub source_line: usize,
	pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedModule {
	pub uri: String,
	pub filename: Option<String>,
	/// Name the generated program is known by in execution frames
	pub module_file: String,
	/// Decoded template source
	pub source: String,
	/// Generated program text
	pub code: String,
	pub imports: Vec<ImportSpec>,
	/// Generated line of each import, parallel to `imports`
	pub import_lines: Vec<usize>,
	pub default_filters: Vec<String>,
	pub functions: Vec<GeneratedFunction>,
	pub line_map: BTreeMap<usize, usize>,
}

impl GeneratedModule {
	pub fn body(&self) -> Option<&GeneratedFunction> {
		self.functions.iter().find(|f| f.def_name.is_none())
	}

	pub fn def(&self, name: &str) -> Option<&GeneratedFunction> {
		self.functions
			.iter()
			.find(|f| f.def_name.as_deref() == Some(name))
	}

	pub fn def_names(&self) -> impl Iterator<Item = &str> {
		self.functions.iter().filter_map(|f| f.def_name.as_deref())
	}

	/// Template line for a generated line: the nearest mapped line at or
	/// before it
	pub fn source_line_for(&self, generated_line: usize) -> Option<usize> {
		self.line_map
			.range(..=generated_line)
			.next_back()
			.map(|(_, &line)| line)
	}

	/// Text of a template source line (1-based)
	pub fn source_line_text(&self, line: usize) -> Option<&str> {
		line.checked_sub(1).and_then(|i| self.source.lines().nth(i))
	}

	/// Display name for diagnostics: the filename when known, else the URI
	pub fn display_name(&self) -> &str {
		self.filename.as_deref().unwrap_or(&self.uri)
	}

	pub fn to_json(&self) -> serde_json::Result<String> {
		serde_json::to_string(self)
	}

	pub fn from_json(json: &str) -> serde_json::Result<Self> {
		serde_json::from_str(json)
	}
}
