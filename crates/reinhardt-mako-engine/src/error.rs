//! Error types for template compilation and execution

use std::fmt;
use thiserror::Error;

/// Failure raised while turning template source into a generated module.
///
/// Compile errors are reported before any output is produced and always
/// refer to the template source directly.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompileError {
	/// The template source could not be parsed
	#[error("{message} in template '{template}' at line {line}")]
	Syntax {
		template: String,
		line: usize,
		message: String,
	},
	/// The raw bytes are not valid in the configured input encoding
	#[error(
		"cannot decode template '{template}' as {encoding}: invalid byte at offset {offset}"
	)]
	Decode {
		template: String,
		encoding: String,
		offset: usize,
	},
	/// A configured import statement is malformed
	#[error("invalid import statement '{statement}': {message}")]
	Import { statement: String, message: String },
}

impl CompileError {
	pub(crate) fn syntax(template: &str, line: usize, message: impl Into<String>) -> Self {
		Self::Syntax {
			template: template.to_string(),
			line,
			message: message.into(),
		}
	}

	/// Template line the error points at, when known
	pub fn line(&self) -> Option<usize> {
		match self {
			Self::Syntax { line, .. } => Some(*line),
			_ => None,
		}
	}
}

/// Classification of a runtime failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// A name is bound nowhere in the execution environment
	UndefinedName,
	/// Attribute access on a value without that attribute
	MissingAttribute,
	/// Mapping subscript with an unknown key
	MissingKey,
	/// Sequence subscript outside the sequence
	IndexOutOfRange,
	/// Operation applied to values of the wrong type
	TypeMismatch,
	/// Division or modulo by zero
	DivisionByZero,
	/// An import could not be satisfied
	Import,
	/// Output could not be encoded with the output encoding
	Encoding,
	/// A native function reported a failure
	Function,
	/// A value that is not callable was called
	NotCallable,
	/// Def calls nested too deeply
	Recursion,
	/// Arithmetic or repetition result too large to represent
	Overflow,
}

impl ErrorKind {
	/// Get the error kind name
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::UndefinedName => "UndefinedName",
			Self::MissingAttribute => "MissingAttribute",
			Self::MissingKey => "MissingKey",
			Self::IndexOutOfRange => "IndexOutOfRange",
			Self::TypeMismatch => "TypeMismatch",
			Self::DivisionByZero => "DivisionByZero",
			Self::Import => "ImportError",
			Self::Encoding => "EncodingError",
			Self::Function => "FunctionError",
			Self::NotCallable => "NotCallable",
			Self::Recursion => "RecursionError",
			Self::Overflow => "OverflowError",
		}
	}
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A failure raised while executing a generated template module.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{kind}: {message}")]
pub struct RuntimeError {
	pub kind: ErrorKind,
	pub message: String,
}

impl RuntimeError {
	pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
		Self {
			kind,
			message: message.into(),
		}
	}

	pub fn undefined(name: &str) -> Self {
		Self::new(ErrorKind::UndefinedName, format!("'{}' is not defined", name))
	}

	pub fn type_mismatch(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::TypeMismatch, message)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case(ErrorKind::UndefinedName, "UndefinedName")]
	#[case(ErrorKind::Import, "ImportError")]
	#[case(ErrorKind::Encoding, "EncodingError")]
	fn test_error_kind_names(#[case] kind: ErrorKind, #[case] expected: &str) {
		assert_eq!(kind.to_string(), expected);
	}

	#[rstest]
	fn test_runtime_error_display() {
		// Arrange
		let error = RuntimeError::undefined("error");

		// Act
		let message = error.to_string();

		// Assert
		assert_eq!(message, "UndefinedName: 'error' is not defined");
	}

	#[rstest]
	fn test_compile_error_reports_line() {
		let error = CompileError::syntax("page.html", 4, "unexpected 'endfor'");

		assert_eq!(error.line(), Some(4));
		assert_eq!(
			error.to_string(),
			"unexpected 'endfor' in template 'page.html' at line 4"
		);
	}
}
