//! Import statements and the modules they are resolved against
//!
//! A template environment receives names through import statements such as
//! `from string import ascii_letters` or `import helpers as h`. Statements
//! are parsed when a template is compiled and resolved each time it runs.

use crate::error::{CompileError, ErrorKind, RuntimeError};
use crate::value::{Arguments, Value};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

static FROM_IMPORT: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"^from\s+([A-Za-z_][\w.]*)\s+import\s+(.+)$").expect("valid regex")
});
static MODULE_IMPORT: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"^import\s+([A-Za-z_][\w.]*)(?:\s+as\s+([A-Za-z_]\w*))?$").expect("valid regex")
});
static IMPORTED_NAME: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"^([A-Za-z_]\w*)(?:\s+as\s+([A-Za-z_]\w*))?$").expect("valid regex")
});

/// Names exported by a module
pub type Namespace = IndexMap<String, Value>;

/// A parsed import statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportSpec {
	/// `import module [as alias]`
	Module {
		module: String,
		alias: Option<String>,
	},
	/// `from module import name [as alias], ...`
	Names {
		module: String,
		names: Vec<(String, Option<String>)>,
	},
	/// `from module import *`
	Glob { module: String },
}

impl ImportSpec {
	pub fn module(&self) -> &str {
		match self {
			Self::Module { module, .. } | Self::Names { module, .. } | Self::Glob { module } => {
				module
			}
		}
	}

	/// Parse every statement, reporting the first malformed one
	pub fn parse_all<S: AsRef<str>>(statements: &[S]) -> Result<Vec<Self>, CompileError> {
		statements
			.iter()
			.flat_map(|s| s.as_ref().split(';'))
			.map(str::trim)
			.filter(|s| !s.is_empty())
			.map(str::parse)
			.collect()
	}
}

impl FromStr for ImportSpec {
	type Err = CompileError;

	fn from_str(statement: &str) -> Result<Self, Self::Err> {
		let statement = statement.trim();
		let invalid = |message: &str| CompileError::Import {
			statement: statement.to_string(),
			message: message.to_string(),
		};
		if let Some(captures) = MODULE_IMPORT.captures(statement) {
			return Ok(Self::Module {
				module: captures[1].to_string(),
				alias: captures.get(2).map(|m| m.as_str().to_string()),
			});
		}
		let Some(captures) = FROM_IMPORT.captures(statement) else {
			return Err(invalid("expected 'import <module>' or 'from <module> import <names>'"));
		};
		let module = captures[1].to_string();
		let names = captures[2].trim();
		if names == "*" {
			return Ok(Self::Glob { module });
		}
		let names = names
			.trim_start_matches('(')
			.trim_end_matches(')')
			.split(',')
			.map(str::trim)
			.filter(|n| !n.is_empty())
			.map(|n| {
				IMPORTED_NAME
					.captures(n)
					.map(|c| (c[1].to_string(), c.get(2).map(|m| m.as_str().to_string())))
					.ok_or_else(|| invalid(&format!("invalid imported name '{}'", n)))
			})
			.collect::<Result<Vec<_>, _>>()?;
		if names.is_empty() {
			return Err(invalid("no names imported"));
		}
		Ok(Self::Names { module, names })
	}
}

impl fmt::Display for ImportSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Module { module, alias: None } => write!(f, "import {}", module),
			Self::Module {
				module,
				alias: Some(alias),
			} => write!(f, "import {} as {}", module, alias),
			Self::Glob { module } => write!(f, "from {} import *", module),
			Self::Names { module, names } => {
				write!(f, "from {} import ", module)?;
				for (i, (name, alias)) in names.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					match alias {
						Some(alias) => write!(f, "{} as {}", name, alias)?,
						None => f.write_str(name)?,
					}
				}
				Ok(())
			}
		}
	}
}

/// Modules available to import statements
///
/// Always provides the `string` module with the usual character classes.
#[derive(Debug, Clone)]
pub struct ModuleRegistry {
	modules: IndexMap<String, Arc<Namespace>>,
}

impl Default for ModuleRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl ModuleRegistry {
	pub fn new() -> Self {
		let mut modules = IndexMap::new();
		modules.insert("string".to_string(), Arc::new(string_module()));
		Self { modules }
	}

	/// Register or replace a module
	pub fn register(&mut self, name: impl Into<String>, namespace: Namespace) {
		self.modules.insert(name.into(), Arc::new(namespace));
	}

	pub fn with_module(mut self, name: impl Into<String>, namespace: Namespace) -> Self {
		self.register(name, namespace);
		self
	}

	pub fn get(&self, name: &str) -> Option<&Namespace> {
		self.modules.get(name).map(Arc::as_ref)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.modules.contains_key(name)
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.modules.keys().map(String::as_str)
	}

	/// Bindings introduced by one import statement
	pub fn resolve(&self, spec: &ImportSpec) -> Result<Vec<(String, Value)>, RuntimeError> {
		let module = spec.module();
		let Some(namespace) = self.get(module) else {
			return Err(RuntimeError::new(
				ErrorKind::Import,
				format!("no module named '{}'", module),
			));
		};
		match spec {
			ImportSpec::Module { alias, .. } => {
				let bound = alias.clone().unwrap_or_else(|| module.to_string());
				Ok(vec![(bound, Value::Map(namespace.clone()))])
			}
			ImportSpec::Glob { .. } => Ok(namespace
				.iter()
				.map(|(name, value)| (name.clone(), value.clone()))
				.collect()),
			ImportSpec::Names { names, .. } => names
				.iter()
				.map(|(name, alias)| {
					let value = namespace.get(name).cloned().ok_or_else(|| {
						RuntimeError::new(
							ErrorKind::Import,
							format!("cannot import name '{}' from '{}'", name, module),
						)
					})?;
					Ok((alias.clone().unwrap_or_else(|| name.clone()), value))
				})
				.collect(),
		}
	}
}

fn string_module() -> Namespace {
	const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
	const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
	const DIGITS: &str = "0123456789";
	const PUNCTUATION: &str = r##"!"#$%&'()*+,-./:;<=>?@[\]^_`{|}~"##;
	let mut namespace = Namespace::new();
	namespace.insert("ascii_lowercase".into(), Value::from(LOWER));
	namespace.insert("ascii_uppercase".into(), Value::from(UPPER));
	namespace.insert("ascii_letters".into(), Value::from(format!("{}{}", LOWER, UPPER)));
	namespace.insert("digits".into(), Value::from(DIGITS));
	namespace.insert("hexdigits".into(), Value::from("0123456789abcdefABCDEF"));
	namespace.insert("punctuation".into(), Value::from(PUNCTUATION));
	namespace.insert(
		"capwords".into(),
		Value::function("string.capwords", |args: &Arguments| {
			let text = args.expect_str(0, "s")?;
			let words: Vec<String> = text
				.split_whitespace()
				.map(|word| {
					let mut chars = word.chars();
					match chars.next() {
						Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
						None => String::new(),
					}
				})
				.collect();
			Ok(Value::from(words.join(" ")))
		}),
	);
	namespace
}
