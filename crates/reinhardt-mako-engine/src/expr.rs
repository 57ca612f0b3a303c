//! Expression language used inside `${...}` substitutions and control lines

use nom::{
	IResult, Parser,
	branch::alt,
	bytes::complete::{escaped_transform, tag, take_while},
	character::complete::{anychar, char, digit1, multispace0, none_of, satisfy},
	combinator::{all_consuming, map, map_res, not, opt, recognize, value},
	error::{ErrorKind, FromExternalError, ParseError},
	multi::{many0, many1, separated_list1},
	sequence::{delimited, pair, preceded, separated_pair, terminated},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Literal constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
	None,
	Bool(bool),
	Int(i64),
	Float(f64),
	Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
	Not,
	Neg,
	Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
	Add,
	Sub,
	Mul,
	Div,
	FloorDiv,
	Mod,
	Eq,
	Ne,
	Lt,
	Le,
	Gt,
	Ge,
	In,
	NotIn,
}

impl BinaryOp {
	pub fn symbol(&self) -> &'static str {
		match self {
			Self::Add => "+",
			Self::Sub => "-",
			Self::Mul => "*",
			Self::Div => "/",
			Self::FloorDiv => "//",
			Self::Mod => "%",
			Self::Eq => "==",
			Self::Ne => "!=",
			Self::Lt => "<",
			Self::Le => "<=",
			Self::Gt => ">",
			Self::Ge => ">=",
			Self::In => "in",
			Self::NotIn => "not in",
		}
	}
}

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
	Literal(Literal),
	Name(String),
	List(Vec<Expr>),
	Dict(Vec<(Expr, Expr)>),
	Attr(Box<Expr>, String),
	Index(Box<Expr>, Box<Expr>),
	Call {
		callee: Box<Expr>,
		args: Vec<Expr>,
		kwargs: Vec<(String, Expr)>,
	},
	Unary(UnaryOp, Box<Expr>),
	Binary(BinaryOp, Box<Expr>, Box<Expr>),
	And(Box<Expr>, Box<Expr>),
	Or(Box<Expr>, Box<Expr>),
	Conditional {
		cond: Box<Expr>,
		then: Box<Expr>,
		otherwise: Box<Expr>,
	},
}

const KEYWORDS: &[&str] = &["and", "or", "not", "in", "if", "else", "for", "is"];

/// Check whether `name` can be bound by a template
pub fn is_identifier(name: &str) -> bool {
	all_consuming(identifier_token).parse(name).is_ok() && !KEYWORDS.contains(&name)
}

// ============================================================================
// Errors
// ============================================================================

/// Parse failure positioned at the input that could not be parsed
#[derive(Debug, Clone, PartialEq)]
struct SyntaxError<'a> {
	input: &'a str,
	message: Option<String>,
}

impl<'a> SyntaxError<'a> {
	fn new(input: &'a str, message: impl Into<String>) -> Self {
		Self {
			input,
			message: Some(message.into()),
		}
	}

	fn describe(&self) -> String {
		self.message
			.clone()
			.unwrap_or_else(|| format!("unexpected {}", found(self.input)))
	}
}

impl<'a> ParseError<&'a str> for SyntaxError<'a> {
	fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
		Self { input, message: None }
	}

	fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
		other
	}

	fn or(self, other: Self) -> Self {
		if other.message.is_none() && self.message.is_some() {
			self
		} else {
			other
		}
	}
}

impl<'a, E: fmt::Display> FromExternalError<&'a str, E> for SyntaxError<'a> {
	fn from_external_error(input: &'a str, _kind: ErrorKind, error: E) -> Self {
		Self::new(input, error.to_string())
	}
}

type PResult<'a, T> = IResult<&'a str, T, SyntaxError<'a>>;

fn found(input: &str) -> String {
	match input.split_whitespace().next() {
		Some(token) => format!("'{}'", token),
		None => "end of expression".to_string(),
	}
}

fn failure<'a>(input: &'a str, message: impl Into<String>) -> nom::Err<SyntaxError<'a>> {
	nom::Err::Failure(SyntaxError::new(input, message))
}

/// Commit to `parser`: a recoverable error becomes a failure naming `what`
fn expect<'a, O, P>(what: &'static str, mut parser: P) -> impl FnMut(&'a str) -> PResult<'a, O>
where
	P: Parser<&'a str, Output = O, Error = SyntaxError<'a>>,
{
	move |input| match parser.parse(input) {
		Err(nom::Err::Error(_)) => Err(failure(
			input,
			format!("expected {}, found {}", what, found(input)),
		)),
		result => result,
	}
}

// ============================================================================
// Tokens
// ============================================================================

fn is_identifier_char(c: char) -> bool {
	c.is_alphanumeric() || c == '_'
}

fn identifier_token(input: &str) -> PResult<'_, &str> {
	recognize(pair(
		satisfy(|c: char| c.is_alphabetic() || c == '_'),
		take_while(is_identifier_char),
	))
	.parse(input)
}

fn identifier(input: &str) -> PResult<'_, &str> {
	preceded(multispace0, identifier_token).parse(input)
}

fn symbol<'a>(text: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
	move |input| preceded(multispace0, tag(text)).parse(input)
}

fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
	move |input| {
		preceded(multispace0, terminated(tag(word), not(satisfy(is_identifier_char)))).parse(input)
	}
}

fn number(input: &str) -> PResult<'_, Literal> {
	map_res(
		preceded(multispace0, recognize(pair(digit1, opt(pair(char('.'), digit1))))),
		|text: &str| {
			if text.contains('.') {
				text.parse::<f64>()
					.map(Literal::Float)
					.map_err(|_| format!("invalid number '{}'", text))
			} else {
				text.parse::<i64>()
					.map(Literal::Int)
					.map_err(|_| format!("integer literal '{}' is too large", text))
			}
		},
	)
	.parse(input)
}

fn escape_sequence(input: &str) -> PResult<'_, char> {
	alt((
		value('\n', char('n')),
		value('\t', char('t')),
		value('\r', char('r')),
		value('\0', char('0')),
		anychar,
	))
	.parse(input)
}

fn quoted<'a>(quote: char, plain: &'static str) -> impl FnMut(&'a str) -> PResult<'a, String> {
	move |input| {
		delimited(
			char(quote),
			map(
				opt(escaped_transform(none_of(plain), '\\', escape_sequence)),
				Option::unwrap_or_default,
			),
			expect("closing quote", char(quote)),
		)
		.parse(input)
	}
}

fn string_literal(input: &str) -> PResult<'_, String> {
	preceded(multispace0, alt((quoted('\'', "\\'"), quoted('"', "\\\"")))).parse(input)
}

// ============================================================================
// Precedence table, loosest first:
//   conditional, or, and, not, comparison, additive, multiplicative, unary,
//   postfix, primary
// ============================================================================

fn expression(input: &str) -> PResult<'_, Expr> {
	let (input, then) = or_expr(input)?;
	let (input, branch) = opt(preceded(
		keyword("if"),
		pair(
			expect("condition", or_expr),
			preceded(expect("'else'", keyword("else")), expect("expression", expression)),
		),
	))
	.parse(input)?;
	let expr = match branch {
		Some((cond, otherwise)) => Expr::Conditional {
			cond: Box::new(cond),
			then: Box::new(then),
			otherwise: Box::new(otherwise),
		},
		None => then,
	};
	Ok((input, expr))
}

fn or_expr(input: &str) -> PResult<'_, Expr> {
	let (input, first) = and_expr(input)?;
	let (input, rest) = many0(preceded(keyword("or"), expect("operand", and_expr))).parse(input)?;
	let expr = rest
		.into_iter()
		.fold(first, |left, right| Expr::Or(Box::new(left), Box::new(right)));
	Ok((input, expr))
}

fn and_expr(input: &str) -> PResult<'_, Expr> {
	let (input, first) = not_expr(input)?;
	let (input, rest) = many0(preceded(keyword("and"), expect("operand", not_expr))).parse(input)?;
	let expr = rest
		.into_iter()
		.fold(first, |left, right| Expr::And(Box::new(left), Box::new(right)));
	Ok((input, expr))
}

fn not_expr(input: &str) -> PResult<'_, Expr> {
	alt((
		map(preceded(keyword("not"), expect("operand", not_expr)), |operand| {
			Expr::Unary(UnaryOp::Not, Box::new(operand))
		}),
		comparison,
	))
	.parse(input)
}

/// Left-associative chain of `operand (operator operand)*`
fn left_assoc<'a>(
	operand: fn(&'a str) -> PResult<'a, Expr>,
	operator: fn(&'a str) -> PResult<'a, BinaryOp>,
) -> impl FnMut(&'a str) -> PResult<'a, Expr> {
	move |input| {
		let (input, first) = operand(input)?;
		let (input, rest) = many0(pair(operator, expect("operand", operand))).parse(input)?;
		let expr = rest.into_iter().fold(first, |left, (op, right)| {
			Expr::Binary(op, Box::new(left), Box::new(right))
		});
		Ok((input, expr))
	}
}

fn comparison_op(input: &str) -> PResult<'_, BinaryOp> {
	alt((
		value(BinaryOp::Eq, symbol("==")),
		value(BinaryOp::Ne, symbol("!=")),
		value(BinaryOp::Le, symbol("<=")),
		value(BinaryOp::Ge, symbol(">=")),
		value(BinaryOp::Lt, symbol("<")),
		value(BinaryOp::Gt, symbol(">")),
		value(BinaryOp::NotIn, pair(keyword("not"), keyword("in"))),
		value(BinaryOp::In, keyword("in")),
	))
	.parse(input)
}

fn additive_op(input: &str) -> PResult<'_, BinaryOp> {
	alt((value(BinaryOp::Add, symbol("+")), value(BinaryOp::Sub, symbol("-")))).parse(input)
}

fn multiplicative_op(input: &str) -> PResult<'_, BinaryOp> {
	alt((
		value(BinaryOp::Mul, symbol("*")),
		value(BinaryOp::FloorDiv, symbol("//")),
		value(BinaryOp::Div, symbol("/")),
		value(BinaryOp::Mod, symbol("%")),
	))
	.parse(input)
}

fn comparison(input: &str) -> PResult<'_, Expr> {
	left_assoc(additive, comparison_op).parse(input)
}

fn additive(input: &str) -> PResult<'_, Expr> {
	left_assoc(multiplicative, additive_op).parse(input)
}

fn multiplicative(input: &str) -> PResult<'_, Expr> {
	left_assoc(unary, multiplicative_op).parse(input)
}

fn unary(input: &str) -> PResult<'_, Expr> {
	alt((
		map(preceded(symbol("-"), expect("operand", unary)), |operand| {
			Expr::Unary(UnaryOp::Neg, Box::new(operand))
		}),
		map(preceded(symbol("+"), expect("operand", unary)), |operand| {
			Expr::Unary(UnaryOp::Pos, Box::new(operand))
		}),
		postfix,
	))
	.parse(input)
}

enum Suffix {
	Attr(String),
	Index(Expr),
	Call(Vec<Expr>, Vec<(String, Expr)>),
}

fn suffix(input: &str) -> PResult<'_, Suffix> {
	alt((
		map(preceded(symbol("."), expect("attribute name", identifier)), |name: &str| {
			Suffix::Attr(name.to_string())
		}),
		map(
			delimited(symbol("["), expect("index", expression), expect("']'", symbol("]"))),
			Suffix::Index,
		),
		map(preceded(symbol("("), call_arguments), |(args, kwargs)| {
			Suffix::Call(args, kwargs)
		}),
	))
	.parse(input)
}

fn postfix(input: &str) -> PResult<'_, Expr> {
	let (input, target) = primary(input)?;
	let (input, suffixes) = many0(suffix).parse(input)?;
	let expr = suffixes.into_iter().fold(target, |expr, suffix| match suffix {
		Suffix::Attr(name) => Expr::Attr(Box::new(expr), name),
		Suffix::Index(index) => Expr::Index(Box::new(expr), Box::new(index)),
		Suffix::Call(args, kwargs) => Expr::Call {
			callee: Box::new(expr),
			args,
			kwargs,
		},
	});
	Ok((input, expr))
}

/// Comma separated `item`s, trailing comma allowed
fn items<'a, O>(item: fn(&'a str) -> PResult<'a, O>) -> impl FnMut(&'a str) -> PResult<'a, Vec<O>> {
	move |input| {
		map(
			opt(terminated(separated_list1(symbol(","), item), opt(symbol(",")))),
			Option::unwrap_or_default,
		)
		.parse(input)
	}
}

enum Argument {
	Positional(Expr),
	Keyword(String, Expr),
}

fn argument(input: &str) -> PResult<'_, Argument> {
	alt((
		map(
			separated_pair(identifier, pair(symbol("="), not(char('='))), expression),
			|(name, arg): (&str, Expr)| Argument::Keyword(name.to_string(), arg),
		),
		map(expression, Argument::Positional),
	))
	.parse(input)
}

fn call_arguments(input: &str) -> PResult<'_, (Vec<Expr>, Vec<(String, Expr)>)> {
	let (rest, arguments) = terminated(items(argument), expect("')'", symbol(")"))).parse(input)?;
	let mut args = Vec::new();
	let mut kwargs: Vec<(String, Expr)> = Vec::new();
	for argument in arguments {
		match argument {
			Argument::Keyword(name, arg) => {
				if kwargs.iter().any(|(k, _)| *k == name) {
					return Err(failure(input, format!("keyword argument '{}' repeated", name)));
				}
				kwargs.push((name, arg));
			}
			Argument::Positional(arg) => {
				if !kwargs.is_empty() {
					return Err(failure(input, "positional argument follows keyword argument"));
				}
				args.push(arg);
			}
		}
	}
	Ok((rest, (args, kwargs)))
}

fn dict_entry(input: &str) -> PResult<'_, (Expr, Expr)> {
	separated_pair(expression, expect("':'", symbol(":")), expect("value", expression)).parse(input)
}

fn name_or_constant(input: &str) -> PResult<'_, Expr> {
	map_res(identifier, |name: &str| match name {
		"True" | "true" => Ok(Expr::Literal(Literal::Bool(true))),
		"False" | "false" => Ok(Expr::Literal(Literal::Bool(false))),
		"None" | "none" => Ok(Expr::Literal(Literal::None)),
		word if KEYWORDS.contains(&word) => Err(format!("unexpected keyword '{}'", word)),
		_ => Ok(Expr::Name(name.to_string())),
	})
	.parse(input)
}

fn primary(input: &str) -> PResult<'_, Expr> {
	alt((
		map(number, Expr::Literal),
		map(many1(string_literal), |parts: Vec<String>| Expr::Literal(Literal::Str(parts.concat()))),
		name_or_constant,
		delimited(symbol("("), expect("expression", expression), expect("')'", symbol(")"))),
		map(
			delimited(symbol("["), items(expression), expect("']'", symbol("]"))),
			Expr::List,
		),
		map(
			delimited(symbol("{"), items(dict_entry), expect("'}'", symbol("}"))),
			Expr::Dict,
		),
	))
	.parse(input)
}

/// Parse a complete expression
///
/// The error message does not carry a location; callers attach the template
/// line the expression came from.
///
/// # Examples
///
/// ```
/// use reinhardt_mako_engine::expr::{parse_expression, Expr};
///
/// let expr = parse_expression("request.args['page']").unwrap();
/// assert_eq!(expr.to_string(), "request.args[\"page\"]");
/// assert!(parse_expression("a +").is_err());
/// ```
pub fn parse_expression(source: &str) -> Result<Expr, String> {
	if source.trim().is_empty() {
		return Err("empty expression".to_string());
	}
	all_consuming(terminated(expression, multispace0))
		.parse(source)
		.map(|(_, expr)| expr)
		.map_err(|error| match error {
			nom::Err::Error(error) | nom::Err::Failure(error) => error.describe(),
			nom::Err::Incomplete(_) => "incomplete expression".to_string(),
		})
}

impl fmt::Display for Literal {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::None => f.write_str("None"),
			Self::Bool(true) => f.write_str("True"),
			Self::Bool(false) => f.write_str("False"),
			Self::Int(n) => write!(f, "{}", n),
			Self::Float(x) => write!(f, "{:?}", x),
			Self::Str(s) => write!(f, "{:?}", s),
		}
	}
}

fn write_joined<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
	for (i, item) in items.iter().enumerate() {
		if i > 0 {
			f.write_str(", ")?;
		}
		write!(f, "{}", item)?;
	}
	Ok(())
}

impl fmt::Display for Expr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Literal(literal) => write!(f, "{}", literal),
			Self::Name(name) => f.write_str(name),
			Self::List(items) => {
				f.write_str("[")?;
				write_joined(f, items)?;
				f.write_str("]")
			}
			Self::Dict(entries) => {
				f.write_str("{")?;
				for (i, (key, value)) in entries.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{}: {}", key, value)?;
				}
				f.write_str("}")
			}
			Self::Attr(target, name) => write!(f, "{}.{}", target, name),
			Self::Index(target, index) => write!(f, "{}[{}]", target, index),
			Self::Call {
				callee,
				args,
				kwargs,
			} => {
				write!(f, "{}(", callee)?;
				write_joined(f, args)?;
				for (i, (name, value)) in kwargs.iter().enumerate() {
					if i > 0 || !args.is_empty() {
						f.write_str(", ")?;
					}
					write!(f, "{}={}", name, value)?;
				}
				f.write_str(")")
			}
			Self::Unary(UnaryOp::Not, operand) => write!(f, "(not {})", operand),
			Self::Unary(UnaryOp::Neg, operand) => write!(f, "(-{})", operand),
			Self::Unary(UnaryOp::Pos, operand) => write!(f, "(+{})", operand),
			Self::Binary(op, left, right) => write!(f, "({} {} {})", left, op.symbol(), right),
			Self::And(left, right) => write!(f, "({} and {})", left, right),
			Self::Or(left, right) => write!(f, "({} or {})", left, right),
			Self::Conditional {
				cond,
				then,
				otherwise,
			} => write!(f, "({} if {} else {})", then, cond, otherwise),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case("1 + 2 * 3", "(1 + (2 * 3))")]
	#[case("not a and b", "((not a) and b)")]
	#[case("x not in items", "(x not in items)")]
	#[case("a if flag else b", "(a if flag else b)")]
	#[case("url_for('test', page=2)", "url_for(\"test\", page=2)")]
	#[case("{'a': [1, 2.5]}", "{\"a\": [1, 2.5]}")]
	#[case("-x // 2", "((-x) // 2)")]
	#[case("a < b <= c", "((a < b) <= c)")]
	#[case("f(x, )[0].name", "f(x)[0].name")]
	#[case("'it\\'s' + \"\\n\"", "(\"it's\" + \"\\n\")")]
	#[case("order or notes", "(order or notes)")]
	fn test_parse_precedence(#[case] source: &str, #[case] expected: &str) {
		// Act
		let expr = parse_expression(source).unwrap();

		// Assert
		assert_eq!(expr.to_string(), expected);
	}

	#[rstest]
	#[case("")]
	#[case("a +")]
	#[case("f(a=1, 2)")]
	#[case("'unterminated")]
	#[case("a b")]
	#[case("x = 1")]
	#[case("[1, 2")]
	#[case("99999999999999999999")]
	fn test_parse_errors(#[case] source: &str) {
		assert!(parse_expression(source).is_err());
	}

	#[rstest]
	#[case("a +", "expected operand, found end of expression")]
	#[case("f(a=1, 2)", "positional argument follows keyword argument")]
	#[case("f(a=1, a=2)", "keyword argument 'a' repeated")]
	#[case("99999999999999999999", "integer literal '99999999999999999999' is too large")]
	#[case("a b", "unexpected 'b'")]
	#[case("x if y", "expected 'else', found end of expression")]
	fn test_parse_error_messages(#[case] source: &str, #[case] message: &str) {
		let error = parse_expression(source).unwrap_err();

		assert_eq!(error, message);
	}

	#[rstest]
	fn test_adjacent_strings_concatenate() {
		let expr = parse_expression("'a' \"b\"").unwrap();

		assert_eq!(expr, Expr::Literal(Literal::Str("ab".to_string())));
	}

	#[rstest]
	#[case("arg", true)]
	#[case("_private", true)]
	#[case("in", false)]
	#[case("1abc", false)]
	fn test_is_identifier(#[case] name: &str, #[case] expected: bool) {
		assert_eq!(is_identifier(name), expected);
	}
}
