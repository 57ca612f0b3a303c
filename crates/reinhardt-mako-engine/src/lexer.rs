//! Splits template source into text, substitutions, control lines and tags

use crate::error::CompileError;
use nom::{
	IResult, Parser,
	branch::alt,
	bytes::complete::{escaped, take_while1},
	character::complete::{anychar, char, none_of},
	combinator::{opt, recognize},
	multi::many0_count,
	sequence::delimited,
};
use once_cell::sync::Lazy;
use regex::Regex;

static DEF_NAME_ATTR: Lazy<Regex> =
	Lazy::new(|| Regex::new(r#"\bname\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex"));

/// A lexical unit of template source, tagged with the line it starts on
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
	Text { text: String, line: usize },
	Expression { code: String, line: usize },
	Control { code: String, line: usize },
	DefStart { signature: String, line: usize },
	DefEnd { line: usize },
}

struct Lexer<'a> {
	source: &'a str,
	uri: &'a str,
	pos: usize,
	line: usize,
	at_line_start: bool,
	text: String,
	text_line: usize,
	tokens: Vec<Token>,
}

/// Tokenize decoded template source
pub fn tokenize(source: &str, uri: &str) -> Result<Vec<Token>, CompileError> {
	let mut lexer = Lexer {
		source,
		uri,
		pos: 0,
		line: 1,
		at_line_start: true,
		text: String::new(),
		text_line: 1,
		tokens: Vec::new(),
	};
	lexer.run()?;
	Ok(lexer.tokens)
}

impl Lexer<'_> {
	fn run(&mut self) -> Result<(), CompileError> {
		while self.pos < self.source.len() {
			if self.at_line_start && self.line_directive() {
				continue;
			}
			self.at_line_start = false;
			let rest = &self.source[self.pos..];
			if rest.starts_with("${") {
				self.expression()?;
			} else if rest.starts_with("<%doc>") {
				self.doc_block()?;
			} else if rest.starts_with("<%def") {
				self.def_start()?;
			} else if rest.starts_with("</%def>") {
				self.flush_text();
				self.tokens.push(Token::DefEnd { line: self.line });
				self.pos += "</%def>".len();
			} else if rest.starts_with("<%") || rest.starts_with("</%") {
				let tag: String = rest
					.chars()
					.take_while(|c| !c.is_whitespace() && *c != '>')
					.collect();
				return Err(CompileError::syntax(
					self.uri,
					self.line,
					format!("unsupported tag '{}'", tag),
				));
			} else if rest.starts_with("\\\n") {
				self.pos += 2;
				self.line += 1;
				self.at_line_start = true;
			} else if let Some(ch) = rest.chars().next() {
				self.push_text(ch);
				self.pos += ch.len_utf8();
				if ch == '\n' {
					self.line += 1;
					self.at_line_start = true;
				}
			}
		}
		self.flush_text();
		Ok(())
	}

	/// Consume a `%` control line or `##` comment starting at the current line.
	/// Returns `false` when the line is ordinary text.
	fn line_directive(&mut self) -> bool {
		let rest = &self.source[self.pos..];
		let line_end = rest.find('\n').unwrap_or(rest.len());
		let line_text = &rest[..line_end];
		let trimmed = line_text.trim_start_matches([' ', '\t']);
		let indent = line_text.len() - trimmed.len();
		let consumed = (line_end + 1).min(rest.len());

		if trimmed.starts_with("##") {
			self.flush_text();
			self.pos += consumed;
			self.line += 1;
			return true;
		}
		if trimmed.starts_with("%%") {
			for ch in line_text[..indent].chars() {
				self.push_text(ch);
			}
			self.push_text('%');
			self.pos += indent + 2;
			self.at_line_start = false;
			return true;
		}
		if let Some(code) = trimmed.strip_prefix('%') {
			self.flush_text();
			self.tokens.push(Token::Control {
				code: code.trim().to_string(),
				line: self.line,
			});
			self.pos += consumed;
			self.line += 1;
			return true;
		}
		false
	}

	fn expression(&mut self) -> Result<(), CompileError> {
		self.flush_text();
		let start_line = self.line;
		let body_start = self.pos + 2;
		let Some(len) = scan_expression(&self.source[body_start..]) else {
			return Err(CompileError::syntax(
				self.uri,
				start_line,
				"unterminated '${' expression",
			));
		};
		let code = &self.source[body_start..body_start + len];
		self.line += code.matches('\n').count();
		self.tokens.push(Token::Expression {
			code: code.trim().to_string(),
			line: start_line,
		});
		self.pos = body_start + len + 1;
		Ok(())
	}

	fn doc_block(&mut self) -> Result<(), CompileError> {
		self.flush_text();
		let rest = &self.source[self.pos..];
		let Some(end) = rest.find("</%doc>") else {
			return Err(CompileError::syntax(self.uri, self.line, "unclosed '<%doc>' block"));
		};
		self.line += rest[..end].matches('\n').count();
		self.pos += end + "</%doc>".len();
		Ok(())
	}

	fn def_start(&mut self) -> Result<(), CompileError> {
		self.flush_text();
		let rest = &self.source[self.pos..];
		let Some(end) = rest.find('>') else {
			return Err(CompileError::syntax(self.uri, self.line, "unclosed '<%def' tag"));
		};
		let tag = &rest[..end];
		let Some(captures) = DEF_NAME_ATTR.captures(tag) else {
			return Err(CompileError::syntax(
				self.uri,
				self.line,
				"'<%def>' requires a name attribute",
			));
		};
		let signature = captures
			.get(1)
			.or_else(|| captures.get(2))
			.map(|m| m.as_str().to_string())
			.unwrap_or_default();
		self.tokens.push(Token::DefStart {
			signature,
			line: self.line,
		});
		self.line += tag.matches('\n').count();
		self.pos += end + 1;
		Ok(())
	}

	fn push_text(&mut self, ch: char) {
		if self.text.is_empty() {
			self.text_line = self.line;
		}
		self.text.push(ch);
	}

	fn flush_text(&mut self) {
		if !self.text.is_empty() {
			self.tokens.push(Token::Text {
				text: std::mem::take(&mut self.text),
				line: self.text_line,
			});
		}
	}
}

/// Characters that open or close a nested group or a string literal
const GROUPING: &str = "'\"()[]{}";

/// Source text with brackets balanced and string literals taken whole,
/// ending before an unmatched closer or any character of `stops`
fn balanced<'a>(input: &'a str, stops: &str) -> IResult<&'a str, &'a str> {
	recognize(many0_count(alt((
		take_while1(|c: char| !GROUPING.contains(c) && !stops.contains(c)),
		quoted_literal,
		group,
	))))
	.parse(input)
}

fn nested(input: &str) -> IResult<&str, &str> {
	balanced(input, "")
}

fn group(input: &str) -> IResult<&str, &str> {
	alt((
		recognize(delimited(char('('), nested, char(')'))),
		recognize(delimited(char('['), nested, char(']'))),
		recognize(delimited(char('{'), nested, char('}'))),
	))
	.parse(input)
}

fn quoted_literal(input: &str) -> IResult<&str, &str> {
	alt((
		recognize(delimited(char('\''), opt(escaped(none_of("\\'"), '\\', anychar)), char('\''))),
		recognize(delimited(char('"'), opt(escaped(none_of("\\\""), '\\', anychar)), char('"'))),
	))
	.parse(input)
}

/// Length of the expression body up to its closing `}`
fn scan_expression(body: &str) -> Option<usize> {
	let (rest, _) = balanced(body, "}").ok()?;
	rest.starts_with('}').then(|| body.len() - rest.len())
}

/// Split `expr | f1, f2` at the top-level pipe
pub fn split_filters(code: &str) -> (&str, Vec<String>) {
	match balanced(code, "|") {
		Ok((rest, expr)) if rest.starts_with('|') => {
			let filters = rest[1..]
				.split(',')
				.map(|f| f.trim().to_string())
				.filter(|f| !f.is_empty())
				.collect();
			(expr.trim(), filters)
		}
		_ => (code.trim(), Vec::new()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn text(text: &str, line: usize) -> Token {
		Token::Text {
			text: text.to_string(),
			line,
		}
	}

	#[rstest]
	fn test_control_lines_and_substitutions() {
		// Arrange
		let source = "\n% for arg in arguments:\n    ${arg}\n% endfor\n";

		// Act
		let tokens = tokenize(source, "loop.html").unwrap();

		// Assert
		assert_eq!(
			tokens,
			vec![
				text("\n", 1),
				Token::Control {
					code: "for arg in arguments:".to_string(),
					line: 2
				},
				text("    ", 3),
				Token::Expression {
					code: "arg".to_string(),
					line: 3
				},
				text("\n", 3),
				Token::Control {
					code: "endfor".to_string(),
					line: 4
				},
			]
		);
	}

	#[rstest]
	fn test_comments_doc_and_escapes() {
		let source = "## comment\n<%doc>\nignored\n</%doc>\n%% literal\n";

		let tokens = tokenize(source, "t").unwrap();

		assert_eq!(tokens, vec![text("\n% literal\n", 4)]);
	}

	#[rstest]
	fn test_backslash_joins_lines() {
		let tokens = tokenize("a\\\nb", "t").unwrap();

		assert_eq!(tokens, vec![text("ab", 1)]);
	}

	#[rstest]
	fn test_def_tags() {
		let tokens = tokenize("<%def name=\"greet(who)\">hi</%def>", "t").unwrap();

		assert_eq!(
			tokens,
			vec![
				Token::DefStart {
					signature: "greet(who)".to_string(),
					line: 1
				},
				text("hi", 1),
				Token::DefEnd { line: 1 },
			]
		);
	}

	#[rstest]
	fn test_nested_braces_in_expression() {
		let tokens = tokenize("${ {'a': '}'}['a'] }", "t").unwrap();

		assert_eq!(
			tokens,
			vec![Token::Expression {
				code: "{'a': '}'}['a']".to_string(),
				line: 1
			}]
		);
	}

	#[rstest]
	fn test_escaped_quote_in_expression() {
		let tokens = tokenize("${'}\\'}' + x}!", "t").unwrap();

		assert_eq!(
			tokens,
			vec![
				Token::Expression {
					code: "'}\\'}' + x".to_string(),
					line: 1
				},
				text("!", 1),
			]
		);
	}

	#[rstest]
	#[case("${oops", "unterminated")]
	#[case("${'open}", "unterminated")]
	#[case("<%inherit file=\"base.html\"/>", "unsupported tag '<%inherit'")]
	#[case("<%doc> never closed", "unclosed")]
	fn test_lexer_errors(#[case] source: &str, #[case] fragment: &str) {
		let error = tokenize(source, "broken.html").unwrap_err();

		assert!(error.to_string().contains(fragment), "{}", error);
	}

	#[rstest]
	#[case("x | h", "x", vec!["h"])]
	#[case("a or b | n, trim", "a or b", vec!["n", "trim"])]
	#[case("'a|b'", "'a|b'", vec![])]
	#[case("f('|', [x | y]) | h", "f('|', [x | y])", vec!["h"])]
	#[case("'it\\'s|' | u", "'it\\'s|'", vec!["u"])]
	fn test_split_filters(#[case] code: &str, #[case] expr: &str, #[case] filters: Vec<&str>) {
		let (parsed, parsed_filters) = split_filters(code);

		assert_eq!(parsed, expr);
		assert_eq!(parsed_filters, filters);
	}
}
