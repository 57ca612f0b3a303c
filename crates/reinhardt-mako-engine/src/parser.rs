//! Builds the node tree from lexer tokens

use crate::ast::{Branch, DefNode, Document, Node, Param};
use crate::error::CompileError;
use crate::expr::{Expr, is_identifier, parse_expression};
use crate::lexer::{self, Token, split_filters};
use once_cell::sync::Lazy;
use regex::Regex;

static FOR_LINE: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^for\s+(.+?)\s+in\s+(.+?)\s*:$").expect("valid regex"));
static IF_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^if\s+(.+?)\s*:$").expect("valid regex"));
static ELIF_LINE: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^elif\s+(.+?)\s*:$").expect("valid regex"));
static ELSE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^else\s*:$").expect("valid regex"));
static DEF_SIGNATURE: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^\s*([A-Za-z_]\w*)\s*\((.*)\)\s*$").expect("valid regex"));

enum Block {
	For {
		targets: Vec<String>,
		iter: Expr,
		body: Vec<Node>,
		line: usize,
	},
	If {
		branches: Vec<Branch>,
		otherwise: Option<Vec<Node>>,
		line: usize,
	},
	Def(DefNode),
}

impl Block {
	fn keyword(&self) -> &'static str {
		match self {
			Self::For { .. } => "for",
			Self::If { .. } => "if",
			Self::Def(_) => "<%def>",
		}
	}

	fn line(&self) -> usize {
		match self {
			Self::For { line, .. } | Self::If { line, .. } => *line,
			Self::Def(def) => def.line,
		}
	}

	fn push(&mut self, node: Node) {
		match self {
			Self::For { body, .. } => body.push(node),
			Self::If {
				branches,
				otherwise,
				..
			} => match otherwise {
				Some(nodes) => nodes.push(node),
				None => {
					if let Some(branch) = branches.last_mut() {
						branch.body.push(node);
					}
				}
			},
			Self::Def(def) => def.body.push(node),
		}
	}
}

struct TemplateParser<'a> {
	uri: &'a str,
	stack: Vec<Block>,
	document: Document,
}

/// Parse template source into a [`Document`]
pub fn parse(source: &str, uri: &str) -> Result<Document, CompileError> {
	let tokens = lexer::tokenize(source, uri)?;
	let mut parser = TemplateParser {
		uri,
		stack: Vec::new(),
		document: Document::default(),
	};
	for token in tokens {
		parser.token(token)?;
	}
	parser.finish()
}

impl TemplateParser<'_> {
	fn error(&self, line: usize, message: impl Into<String>) -> CompileError {
		CompileError::syntax(self.uri, line, message)
	}

	fn expression(&self, code: &str, line: usize) -> Result<Expr, CompileError> {
		parse_expression(code).map_err(|message| self.error(line, format!("{} in '{}'", message, code)))
	}

	fn push(&mut self, node: Node) {
		match self.stack.last_mut() {
			Some(block) => block.push(node),
			None => self.document.body.push(node),
		}
	}

	fn token(&mut self, token: Token) -> Result<(), CompileError> {
		match token {
			Token::Text { text, line } => self.push(Node::Text { text, line }),
			Token::Expression { code, line } => {
				let (code, filters) = split_filters(&code);
				if let Some(bad) = filters.iter().find(|f| !is_identifier(f)) {
					return Err(self.error(line, format!("invalid filter name '{}'", bad)));
				}
				let expr = self.expression(code, line)?;
				self.push(Node::Expression {
					expr,
					filters,
					line,
				});
			}
			Token::Control { code, line } => self.control(&code, line)?,
			Token::DefStart { signature, line } => {
				let def = self.def_signature(&signature, line)?;
				self.stack.push(Block::Def(def));
			}
			Token::DefEnd { line } => match self.stack.pop() {
				Some(Block::Def(def)) => {
					if self.document.defs.iter().any(|d| d.name == def.name) {
						return Err(self.error(def.line, format!("def '{}' is already defined", def.name)));
					}
					self.document.defs.push(def);
				}
				Some(block) => {
					return Err(self.error(
						line,
						format!(
							"'</%def>' closes '{}' opened at line {}",
							block.keyword(),
							block.line()
						),
					));
				}
				None => return Err(self.error(line, "'</%def>' without matching '<%def>'")),
			},
		}
		Ok(())
	}

	fn control(&mut self, code: &str, line: usize) -> Result<(), CompileError> {
		let keyword = code
			.split(|c: char| c.is_whitespace() || c == ':')
			.next()
			.unwrap_or_default();
		match keyword {
			"for" => {
				let Some(captures) = FOR_LINE.captures(code) else {
					return Err(self.error(line, format!("malformed for line '% {}'", code)));
				};
				let targets = self.loop_targets(&captures[1], line)?;
				let iter = self.expression(&captures[2], line)?;
				self.stack.push(Block::For {
					targets,
					iter,
					body: Vec::new(),
					line,
				});
			}
			"if" => {
				let Some(captures) = IF_LINE.captures(code) else {
					return Err(self.error(line, format!("malformed if line '% {}'", code)));
				};
				let cond = self.expression(&captures[1], line)?;
				self.stack.push(Block::If {
					branches: vec![Branch {
						cond,
						body: Vec::new(),
						line,
					}],
					otherwise: None,
					line,
				});
			}
			"elif" => {
				let Some(captures) = ELIF_LINE.captures(code) else {
					return Err(self.error(line, format!("malformed elif line '% {}'", code)));
				};
				let cond = self.expression(&captures[1], line)?;
				match self.stack.last_mut() {
					Some(Block::If {
						branches,
						otherwise: None,
						..
					}) => branches.push(Branch {
						cond,
						body: Vec::new(),
						line,
					}),
					_ => return Err(self.error(line, "'elif' without matching 'if'")),
				}
			}
			"else" => {
				if !ELSE_LINE.is_match(code) {
					return Err(self.error(line, format!("malformed else line '% {}'", code)));
				}
				match self.stack.last_mut() {
					Some(Block::If { otherwise, .. }) if otherwise.is_none() => {
						*otherwise = Some(Vec::new());
					}
					_ => return Err(self.error(line, "'else' without matching 'if'")),
				}
			}
			"endfor" | "endif" => {
				let expected = &keyword[3..];
				let node = match self.stack.pop() {
					Some(Block::For {
						targets,
						iter,
						body,
						line,
					}) if expected == "for" => Node::For {
						targets,
						iter,
						body,
						line,
					},
					Some(Block::If {
						branches,
						otherwise,
						line,
					}) if expected == "if" => Node::If {
						branches,
						otherwise,
						line,
					},
					Some(block) => {
						return Err(self.error(
							line,
							format!(
								"'{}' closes '{}' opened at line {}",
								keyword,
								block.keyword(),
								block.line()
							),
						));
					}
					None => {
						return Err(self.error(line, format!("'{}' without matching '{}'", keyword, expected)));
					}
				};
				self.push(node);
			}
			_ => {
				return Err(self.error(line, format!("unsupported control line '% {}'", code)));
			}
		}
		Ok(())
	}

	fn loop_targets(&self, raw: &str, line: usize) -> Result<Vec<String>, CompileError> {
		let raw = raw.trim();
		let raw = raw
			.strip_prefix('(')
			.and_then(|r| r.strip_suffix(')'))
			.unwrap_or(raw);
		let targets: Vec<String> = raw
			.split(',')
			.map(|t| t.trim().to_string())
			.filter(|t| !t.is_empty())
			.collect();
		if targets.is_empty() || targets.iter().any(|t| !is_identifier(t)) {
			return Err(self.error(line, format!("invalid loop target '{}'", raw)));
		}
		Ok(targets)
	}

	fn def_signature(&self, signature: &str, line: usize) -> Result<DefNode, CompileError> {
		let Some(captures) = DEF_SIGNATURE.captures(signature) else {
			return Err(self.error(line, format!("invalid def signature '{}'", signature)));
		};
		let name = captures[1].to_string();
		if !is_identifier(&name) {
			return Err(self.error(line, format!("invalid def name '{}'", name)));
		}
		let mut params: Vec<Param> = Vec::new();
		for raw in split_top_level(&captures[2]) {
			let (param_name, default) = match raw.split_once('=') {
				Some((n, d)) => (n.trim(), Some(self.expression(d.trim(), line)?)),
				None => (raw.trim(), None),
			};
			if !is_identifier(param_name) {
				return Err(self.error(line, format!("invalid parameter '{}' in def '{}'", raw.trim(), name)));
			}
			if params.iter().any(|p| p.name == param_name) {
				return Err(self.error(line, format!("duplicate parameter '{}' in def '{}'", param_name, name)));
			}
			if default.is_none() && params.iter().any(|p| p.default.is_some()) {
				return Err(self.error(line, format!("parameter '{}' without default follows a default", param_name)));
			}
			params.push(Param {
				name: param_name.to_string(),
				default,
			});
		}
		Ok(DefNode {
			name,
			params,
			body: Vec::new(),
			line,
		})
	}

	fn finish(mut self) -> Result<Document, CompileError> {
		if let Some(block) = self.stack.pop() {
			return Err(self.error(
				block.line(),
				format!("'{}' block opened at line {} is never closed", block.keyword(), block.line()),
			));
		}
		Ok(self.document)
	}
}

/// Split on commas outside brackets and string literals
fn split_top_level(source: &str) -> Vec<&str> {
	let mut parts = Vec::new();
	let mut depth = 0usize;
	let mut quote: Option<char> = None;
	let mut start = 0;
	for (i, ch) in source.char_indices() {
		if let Some(q) = quote {
			if ch == q {
				quote = None;
			}
			continue;
		}
		match ch {
			'\'' | '"' => quote = Some(ch),
			'(' | '[' | '{' => depth += 1,
			')' | ']' | '}' => depth = depth.saturating_sub(1),
			',' if depth == 0 => {
				parts.push(&source[start..i]);
				start = i + 1;
			}
			_ => {}
		}
	}
	parts.push(&source[start..]);
	parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::expr::Literal;
	use rstest::rstest;

	#[rstest]
	fn test_parse_for_loop() {
		// Arrange
		let source = "% for arg in arguments:\n${arg}\n% endfor\n";

		// Act
		let document = parse(source, "loop.html").unwrap();

		// Assert
		assert_eq!(document.body.len(), 1);
		let Node::For {
			targets,
			body,
			line,
			..
		} = &document.body[0]
		else {
			panic!("expected a for node");
		};
		assert_eq!(targets, &vec!["arg".to_string()]);
		assert_eq!(*line, 1);
		assert_eq!(body.len(), 2);
	}

	#[rstest]
	fn test_parse_if_chain() {
		let source = "% if a:\nA\n% elif b:\nB\n% else:\nC\n% endif\n";

		let document = parse(source, "t").unwrap();

		let Node::If {
			branches,
			otherwise,
			..
		} = &document.body[0]
		else {
			panic!("expected an if node");
		};
		assert_eq!(branches.len(), 2);
		assert_eq!(branches[1].line, 3);
		assert_eq!(otherwise.as_ref().map(Vec::len), Some(1));
	}

	#[rstest]
	fn test_defs_are_hoisted() {
		let source = "above\n<%def name=\"row(item, sep=', ')\">${item}${sep}</%def>\nbelow\n";

		let document = parse(source, "t").unwrap();

		assert_eq!(document.defs.len(), 1);
		let def = &document.defs[0];
		assert_eq!(def.name, "row");
		assert_eq!(def.params[0].default, None);
		assert_eq!(
			def.params[1].default,
			Some(Expr::Literal(Literal::Str(", ".to_string())))
		);
		assert!(document.body.iter().all(|n| matches!(n, Node::Text { .. })));
	}

	#[rstest]
	#[case("% for x in y:\n", "never closed")]
	#[case("% endif\n", "without matching 'if'")]
	#[case("% for x in y:\n% endif\n", "'endif' closes 'for'")]
	#[case("% while x:\n", "unsupported control line")]
	#[case("${a + }", "at line 1")]
	#[case("<%def name=\"a()\"></%def><%def name=\"a()\"></%def>", "already defined")]
	#[case("% else:\n", "'else' without matching 'if'")]
	#[case("${x | not a filter}", "invalid filter name")]
	fn test_parse_errors(#[case] source: &str, #[case] fragment: &str) {
		let error = parse(source, "broken.html").unwrap_err();

		assert!(error.to_string().contains(fragment), "{}", error);
	}

	#[rstest]
	fn test_tuple_loop_targets() {
		let document = parse("% for (k, v) in pairs:\n% endfor\n", "t").unwrap();

		let Node::For { targets, .. } = &document.body[0] else {
			panic!("expected a for node");
		};
		assert_eq!(targets, &vec!["k".to_string(), "v".to_string()]);
	}
}
