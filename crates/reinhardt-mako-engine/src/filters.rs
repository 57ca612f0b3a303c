//! Built-in expression filters
//!
//! Filters are applied to the value of a `${...}` substitution before it is
//! written. The template's default filters run first, then the filters named
//! after `|` in order. Naming `n` disables the defaults for that expression.
//!
//! Escaped characters for `h`:
//! - `<` → `&lt;`
//! - `>` → `&gt;`
//! - `&` → `&amp;`
//! - `"` → `&quot;`
//! - `'` → `&#x27;`

use crate::value::Value;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Filters applied to every substitution unless configured otherwise
pub const DEFAULT_FILTERS: &[&str] = &["str"];

/// Pseudo-filter that disables the default filters for one expression
pub const NO_DEFAULTS: &str = "n";

/// Bytes escaped by `u`: everything but the unreserved URL characters
const QUOTE_PLUS: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// A built-in filter function
pub type Filter = fn(Value) -> Value;

/// Look up a built-in filter by name
pub fn builtin(name: &str) -> Option<Filter> {
	let filter: Filter = match name {
		"str" => to_str,
		"h" => html,
		"u" => url,
		"trim" => trim,
		_ => return None,
	};
	Some(filter)
}

fn to_str(value: Value) -> Value {
	match value {
		Value::Str(_) => value,
		other => Value::Str(other.to_string()),
	}
}

fn html(value: Value) -> Value {
	Value::Str(escape_html(&value.to_string()))
}

fn url(value: Value) -> Value {
	Value::Str(escape_url(&value.to_string()))
}

fn trim(value: Value) -> Value {
	Value::Str(value.to_string().trim().to_string())
}

/// Escape HTML special characters
///
/// # Examples
///
/// ```
/// use reinhardt_mako_engine::filters::escape_html;
///
/// assert_eq!(escape_html("<b>'x' & \"y\"</b>"),
///            "&lt;b&gt;&#x27;x&#x27; &amp; &quot;y&quot;&lt;/b&gt;");
/// ```
pub fn escape_html(s: &str) -> String {
	let mut out = String::with_capacity(s.len());
	for c in s.chars() {
		match c {
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'&' => out.push_str("&amp;"),
			'"' => out.push_str("&quot;"),
			'\'' => out.push_str("&#x27;"),
			_ => out.push(c),
		}
	}
	out
}

/// Percent-encode everything outside the unreserved URL characters
///
/// Spaces become `+`.
///
/// # Examples
///
/// ```
/// use reinhardt_mako_engine::filters::escape_url;
///
/// assert_eq!(escape_url("a b/c?d=é"), "a+b%2Fc%3Fd%3D%C3%A9");
/// ```
pub fn escape_url(s: &str) -> String {
	// `%` itself is escaped, so any `%20` in the output came from a space
	utf8_percent_encode(s, QUOTE_PLUS).to_string().replace("%20", "+")
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case("str", Value::Int(3), "3")]
	#[case("h", Value::from("<a>"), "&lt;a&gt;")]
	#[case("u", Value::from("x y"), "x+y")]
	#[case("u", Value::from("a b*c~%20"), "a+b%2Ac~%2520")]
	#[case("trim", Value::from("  pad  "), "pad")]
	#[case("str", Value::None, "")]
	fn test_builtin_filters(#[case] name: &str, #[case] input: Value, #[case] expected: &str) {
		let filter = builtin(name).unwrap();

		assert_eq!(filter(input), Value::from(expected));
	}

	#[rstest]
	fn test_unknown_filter() {
		assert!(builtin("shout").is_none());
		assert!(builtin(NO_DEFAULTS).is_none());
	}
}
