//! Runtime values seen by template code
//!
//! Templates operate on a small dynamic value model. Host data enters it
//! through [`Value::from_serialize`] and host behavior through native
//! [`Function`]s.

use crate::error::{ErrorKind, RuntimeError};
use indexmap::IndexMap;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Name bindings passed to a template when it is rendered
pub type Context = IndexMap<String, Value>;

type NativeFn = dyn Fn(&Arguments) -> Result<Value, String> + Send + Sync;

/// A host function callable from template expressions.
#[derive(Clone)]
pub struct Function {
	name: Arc<str>,
	call: Arc<NativeFn>,
}

impl Function {
	/// Wrap a closure as a template-callable function
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_mako_engine::{Arguments, Function, Value};
	///
	/// let shout = Function::new("shout", |args: &Arguments| {
	///     let text = args.expect_str(0, "text")?;
	///     Ok(Value::from(text.to_uppercase()))
	/// });
	/// let result = shout.call(&Arguments::new(vec![Value::from("hi")]));
	/// assert_eq!(result, Ok(Value::from("HI")));
	/// ```
	pub fn new<F>(name: impl Into<String>, call: F) -> Self
	where
		F: Fn(&Arguments) -> Result<Value, String> + Send + Sync + 'static,
	{
		Self {
			name: Arc::from(name.into()),
			call: Arc::new(call),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn call(&self, args: &Arguments) -> Result<Value, String> {
		(self.call)(args)
	}
}

impl fmt::Debug for Function {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "<function {}>", self.name)
	}
}

impl PartialEq for Function {
	fn eq(&self, other: &Self) -> bool {
		std::ptr::addr_eq(Arc::as_ptr(&self.call), Arc::as_ptr(&other.call))
	}
}

/// Arguments of a native function call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
	pub positional: Vec<Value>,
	pub keywords: IndexMap<String, Value>,
}

impl Arguments {
	pub fn new(positional: Vec<Value>) -> Self {
		Self {
			positional,
			keywords: IndexMap::new(),
		}
	}

	pub fn with_keyword(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.keywords.insert(name.into(), value.into());
		self
	}

	pub fn get(&self, index: usize) -> Option<&Value> {
		self.positional.get(index)
	}

	pub fn keyword(&self, name: &str) -> Option<&Value> {
		self.keywords.get(name)
	}

	/// Positional argument at `index`, falling back to the keyword `name`
	pub fn arg(&self, index: usize, name: &str) -> Option<&Value> {
		self.get(index).or_else(|| self.keyword(name))
	}

	pub fn expect_str(&self, index: usize, name: &str) -> Result<&str, String> {
		match self.arg(index, name) {
			Some(Value::Str(s)) => Ok(s),
			Some(other) => Err(format!(
				"argument '{}' must be str, not {}",
				name,
				other.type_name()
			)),
			None => Err(format!("missing argument '{}'", name)),
		}
	}

	pub fn expect_int(&self, index: usize, name: &str) -> Result<i64, String> {
		match self.arg(index, name) {
			Some(Value::Int(n)) => Ok(*n),
			Some(Value::Bool(b)) => Ok(i64::from(*b)),
			Some(other) => Err(format!(
				"argument '{}' must be int, not {}",
				name,
				other.type_name()
			)),
			None => Err(format!("missing argument '{}'", name)),
		}
	}

	pub fn len(&self) -> usize {
		self.positional.len()
	}

	pub fn is_empty(&self) -> bool {
		self.positional.is_empty() && self.keywords.is_empty()
	}
}

/// A dynamically typed template value
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
	#[default]
	None,
	Bool(bool),
	Int(i64),
	Float(f64),
	Str(String),
	List(Vec<Value>),
	Map(IndexMap<String, Value>),
	Function(Function),
}

impl Value {
	/// Convert any serializable host value
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_mako_engine::Value;
	/// use serde::Serialize;
	///
	/// #[derive(Serialize)]
	/// struct User {
	///     name: String,
	///     age: u32,
	/// }
	///
	/// let value = Value::from_serialize(&User { name: "ann".into(), age: 31 }).unwrap();
	/// assert_eq!(value.get_attr("age").unwrap(), Value::Int(31));
	/// ```
	pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
		serde_json::to_value(value).map(Self::from)
	}

	/// Build a function value from a closure
	pub fn function<F>(name: impl Into<String>, call: F) -> Self
	where
		F: Fn(&Arguments) -> Result<Value, String> + Send + Sync + 'static,
	{
		Self::Function(Function::new(name, call))
	}

	pub fn type_name(&self) -> &'static str {
		match self {
			Self::None => "none",
			Self::Bool(_) => "bool",
			Self::Int(_) => "int",
			Self::Float(_) => "float",
			Self::Str(_) => "str",
			Self::List(_) => "list",
			Self::Map(_) => "map",
			Self::Function(_) => "function",
		}
	}

	pub fn is_truthy(&self) -> bool {
		match self {
			Self::None => false,
			Self::Bool(b) => *b,
			Self::Int(n) => *n != 0,
			Self::Float(f) => *f != 0.0,
			Self::Str(s) => !s.is_empty(),
			Self::List(items) => !items.is_empty(),
			Self::Map(map) => !map.is_empty(),
			Self::Function(_) => true,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Str(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_int(&self) -> Option<i64> {
		match self {
			Self::Int(n) => Some(*n),
			_ => None,
		}
	}

	pub fn len(&self) -> Option<usize> {
		match self {
			Self::Str(s) => Some(s.chars().count()),
			Self::List(items) => Some(items.len()),
			Self::Map(map) => Some(map.len()),
			_ => None,
		}
	}

	/// Debug-style representation used inside containers and diagnostics
	pub fn repr(&self) -> String {
		match self {
			Self::None => "none".to_string(),
			Self::Str(s) => format!("{:?}", s),
			other => other.to_string(),
		}
	}

	pub fn get_attr(&self, name: &str) -> Result<Value, RuntimeError> {
		if let Self::Map(map) = self
			&& let Some(value) = map.get(name)
		{
			return Ok(value.clone());
		}
		if let Some(method) = self.method(name) {
			return Ok(method);
		}
		Err(RuntimeError::new(
			ErrorKind::MissingAttribute,
			format!("'{}' value has no attribute '{}'", self.type_name(), name),
		))
	}

	pub fn get_item(&self, key: &Value) -> Result<Value, RuntimeError> {
		match (self, key) {
			(Self::Map(map), Self::Str(k)) => map.get(k).cloned().ok_or_else(|| {
				RuntimeError::new(ErrorKind::MissingKey, format!("key {:?} not found", k))
			}),
			(Self::List(items), Self::Int(index)) => resolve_index(*index, items.len())
				.map(|i| items[i].clone())
				.ok_or_else(|| {
					RuntimeError::new(
						ErrorKind::IndexOutOfRange,
						format!("index {} out of range for list of length {}", index, items.len()),
					)
				}),
			(Self::Str(s), Self::Int(index)) => {
				let chars: Vec<char> = s.chars().collect();
				resolve_index(*index, chars.len())
					.map(|i| Value::Str(chars[i].to_string()))
					.ok_or_else(|| {
						RuntimeError::new(
							ErrorKind::IndexOutOfRange,
							format!("index {} out of range for str of length {}", index, chars.len()),
						)
					})
			}
			(Self::Map(_), other) => Err(RuntimeError::type_mismatch(format!(
				"map keys must be str, not {}",
				other.type_name()
			))),
			(Self::List(_) | Self::Str(_), other) => Err(RuntimeError::type_mismatch(format!(
				"indices must be int, not {}",
				other.type_name()
			))),
			_ => Err(RuntimeError::type_mismatch(format!(
				"'{}' value is not subscriptable",
				self.type_name()
			))),
		}
	}

	/// Items produced when the value is the subject of a `for` loop
	pub fn iterate(&self) -> Result<Vec<Value>, RuntimeError> {
		match self {
			Self::List(items) => Ok(items.clone()),
			Self::Map(map) => Ok(map.keys().map(|k| Value::Str(k.clone())).collect()),
			Self::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
			other => Err(RuntimeError::type_mismatch(format!(
				"'{}' value is not iterable",
				other.type_name()
			))),
		}
	}

	pub fn contains(&self, item: &Value) -> Result<bool, RuntimeError> {
		match (self, item) {
			(Self::List(items), _) => Ok(items.iter().any(|v| v.loose_eq(item))),
			(Self::Map(map), Self::Str(key)) => Ok(map.contains_key(key)),
			(Self::Str(haystack), Self::Str(needle)) => Ok(haystack.contains(needle.as_str())),
			_ => Err(RuntimeError::type_mismatch(format!(
				"'in' is not supported between {} and {}",
				item.type_name(),
				self.type_name()
			))),
		}
	}

	/// Equality that treats numerically equal ints and floats as equal
	pub fn loose_eq(&self, other: &Value) -> bool {
		match (self, other) {
			(Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
			_ => self == other,
		}
	}

	pub fn compare(&self, other: &Value) -> Result<Ordering, RuntimeError> {
		let ordering = match (self, other) {
			(Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
			(Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
			(Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
			_ => match (self.as_number(), other.as_number()) {
				(Some(a), Some(b)) => a.partial_cmp(&b),
				_ => None,
			},
		};
		ordering.ok_or_else(|| {
			RuntimeError::type_mismatch(format!(
				"cannot compare {} and {}",
				self.type_name(),
				other.type_name()
			))
		})
	}

	pub fn add(&self, rhs: &Value) -> Result<Value, RuntimeError> {
		match (self, rhs) {
			(Self::Int(a), Self::Int(b)) => a.checked_add(*b).map(Value::Int).ok_or_else(overflow),
			(Self::Str(a), Self::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
			(Self::List(a), Self::List(b)) => Ok(Value::List(a.iter().chain(b).cloned().collect())),
			_ => self.float_op(rhs, "+", |a, b| a + b),
		}
	}

	pub fn sub(&self, rhs: &Value) -> Result<Value, RuntimeError> {
		match (self, rhs) {
			(Self::Int(a), Self::Int(b)) => a.checked_sub(*b).map(Value::Int).ok_or_else(overflow),
			_ => self.float_op(rhs, "-", |a, b| a - b),
		}
	}

	pub fn mul(&self, rhs: &Value) -> Result<Value, RuntimeError> {
		match (self, rhs) {
			(Self::Int(a), Self::Int(b)) => a.checked_mul(*b).map(Value::Int).ok_or_else(overflow),
			(Self::Str(s), Self::Int(n)) | (Self::Int(n), Self::Str(s)) => {
				let times = repeat_count(s.len(), *n)?;
				Ok(Value::Str(s.repeat(times)))
			}
			(Self::List(items), Self::Int(n)) | (Self::Int(n), Self::List(items)) => {
				let times = repeat_count(items.len(), *n)?;
				Ok(Value::List(
					std::iter::repeat_n(items.iter(), times)
						.flatten()
						.cloned()
						.collect(),
				))
			}
			_ => self.float_op(rhs, "*", |a, b| a * b),
		}
	}

	pub fn div(&self, rhs: &Value) -> Result<Value, RuntimeError> {
		if rhs.as_number() == Some(0.0) {
			return Err(division_by_zero());
		}
		self.float_op(rhs, "/", |a, b| a / b)
	}

	pub fn floor_div(&self, rhs: &Value) -> Result<Value, RuntimeError> {
		match (self, rhs) {
			(Self::Int(_), Self::Int(0)) => Err(division_by_zero()),
			(Self::Int(a), Self::Int(b)) => {
				let quotient = a.checked_div(*b).ok_or_else(overflow)?;
				if a % b != 0 && ((*a < 0) != (*b < 0)) {
					Ok(Value::Int(quotient - 1))
				} else {
					Ok(Value::Int(quotient))
				}
			}
			_ => {
				if rhs.as_number() == Some(0.0) {
					return Err(division_by_zero());
				}
				self.float_op(rhs, "//", |a, b| (a / b).floor())
			}
		}
	}

	pub fn rem(&self, rhs: &Value) -> Result<Value, RuntimeError> {
		match (self, rhs) {
			(Self::Int(_), Self::Int(0)) => Err(division_by_zero()),
			(Self::Int(a), Self::Int(b)) => {
				let r = a.checked_rem(*b).ok_or_else(overflow)?;
				if r != 0 && ((r < 0) != (*b < 0)) {
					Ok(Value::Int(r + b))
				} else {
					Ok(Value::Int(r))
				}
			}
			_ => {
				if rhs.as_number() == Some(0.0) {
					return Err(division_by_zero());
				}
				self.float_op(rhs, "%", |a, b| a - b * (a / b).floor())
			}
		}
	}

	pub fn neg(&self) -> Result<Value, RuntimeError> {
		match self {
			Self::Int(n) => n.checked_neg().map(Value::Int).ok_or_else(overflow),
			Self::Float(f) => Ok(Value::Float(-f)),
			other => Err(RuntimeError::type_mismatch(format!(
				"bad operand type for unary -: {}",
				other.type_name()
			))),
		}
	}

	pub fn pos(&self) -> Result<Value, RuntimeError> {
		match self {
			Self::Int(_) | Self::Float(_) => Ok(self.clone()),
			other => Err(RuntimeError::type_mismatch(format!(
				"bad operand type for unary +: {}",
				other.type_name()
			))),
		}
	}

	fn as_number(&self) -> Option<f64> {
		match self {
			Self::Int(n) => Some(*n as f64),
			Self::Float(f) => Some(*f),
			_ => None,
		}
	}

	fn float_op(
		&self,
		rhs: &Value,
		symbol: &str,
		op: impl Fn(f64, f64) -> f64,
	) -> Result<Value, RuntimeError> {
		match (self.as_number(), rhs.as_number()) {
			(Some(a), Some(b)) => Ok(Value::Float(op(a, b))),
			_ => Err(RuntimeError::type_mismatch(format!(
				"unsupported operand types for {}: {} and {}",
				symbol,
				self.type_name(),
				rhs.type_name()
			))),
		}
	}

	fn method(&self, name: &str) -> Option<Value> {
		let qualified = format!("{}.{}", self.type_name(), name);
		match self {
			Self::Map(map) => {
				let map = map.clone();
				match name {
					"items" => Some(Value::function(qualified, move |_| {
						Ok(Value::List(
							map.iter()
								.map(|(k, v)| Value::List(vec![Value::Str(k.clone()), v.clone()]))
								.collect(),
						))
					})),
					"keys" => Some(Value::function(qualified, move |_| {
						Ok(Value::List(map.keys().map(|k| Value::Str(k.clone())).collect()))
					})),
					"values" => Some(Value::function(qualified, move |_| {
						Ok(Value::List(map.values().cloned().collect()))
					})),
					"get" => Some(Value::function(qualified, move |args| {
						let key = args.expect_str(0, "key")?;
						Ok(map
							.get(key)
							.cloned()
							.or_else(|| args.arg(1, "default").cloned())
							.unwrap_or_default())
					})),
					_ => None,
				}
			}
			Self::Str(s) => {
				let s = s.clone();
				match name {
					"upper" => Some(Value::function(qualified, move |_| Ok(Value::Str(s.to_uppercase())))),
					"lower" => Some(Value::function(qualified, move |_| Ok(Value::Str(s.to_lowercase())))),
					"strip" => Some(Value::function(qualified, move |_| Ok(Value::Str(s.trim().to_string())))),
					"startswith" => Some(Value::function(qualified, move |args| {
						Ok(Value::Bool(s.starts_with(args.expect_str(0, "prefix")?)))
					})),
					"endswith" => Some(Value::function(qualified, move |args| {
						Ok(Value::Bool(s.ends_with(args.expect_str(0, "suffix")?)))
					})),
					"replace" => Some(Value::function(qualified, move |args| {
						let old = args.expect_str(0, "old")?;
						let new = args.expect_str(1, "new")?;
						Ok(Value::Str(s.replace(old, new)))
					})),
					"split" => Some(Value::function(qualified, move |args| {
						let parts: Vec<Value> = match args.arg(0, "sep") {
							Some(Value::Str(sep)) => s.split(sep.as_str()).map(Value::from).collect(),
							_ => s.split_whitespace().map(Value::from).collect(),
						};
						Ok(Value::List(parts))
					})),
					"join" => Some(Value::function(qualified, move |args| match args.arg(0, "items") {
						Some(Value::List(items)) => Ok(Value::Str(
							items.iter().map(Value::to_string).collect::<Vec<_>>().join(s.as_str()),
						)),
						_ => Err("join expects a list".to_string()),
					})),
					_ => None,
				}
			}
			_ => None,
		}
	}
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
	let len = i64::try_from(len).ok()?;
	let resolved = if index < 0 { len + index } else { index };
	if (0..len).contains(&resolved) {
		usize::try_from(resolved).ok()
	} else {
		None
	}
}

/// Largest string (in bytes) or list a repetition may produce
pub const MAX_REPEAT_LEN: usize = 1 << 24;

fn overflow() -> RuntimeError {
	RuntimeError::new(ErrorKind::Overflow, "integer overflow")
}

/// Repetition count for a sequence of `len`, negative counts yielding empty
fn repeat_count(len: usize, n: i64) -> Result<usize, RuntimeError> {
	let times = usize::try_from(n).unwrap_or(0);
	match len.checked_mul(times) {
		Some(total) if total <= MAX_REPEAT_LEN => Ok(times),
		_ => Err(RuntimeError::new(
			ErrorKind::Overflow,
			format!("repeated sequence exceeds {} elements", MAX_REPEAT_LEN),
		)),
	}
}

fn division_by_zero() -> RuntimeError {
	RuntimeError::new(ErrorKind::DivisionByZero, "division by zero")
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::None => Ok(()),
			Self::Bool(b) => write!(f, "{}", b),
			Self::Int(n) => write!(f, "{}", n),
			Self::Float(x) => write!(f, "{}", x),
			Self::Str(s) => f.write_str(s),
			Self::List(items) => {
				f.write_str("[")?;
				for (i, item) in items.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					f.write_str(&item.repr())?;
				}
				f.write_str("]")
			}
			Self::Map(map) => {
				f.write_str("{")?;
				for (i, (key, value)) in map.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{:?}: {}", key, value.repr())?;
				}
				f.write_str("}")
			}
			Self::Function(func) => write!(f, "<function {}>", func.name()),
		}
	}
}

impl From<serde_json::Value> for Value {
	fn from(value: serde_json::Value) -> Self {
		match value {
			serde_json::Value::Null => Self::None,
			serde_json::Value::Bool(b) => Self::Bool(b),
			serde_json::Value::Number(n) => match n.as_i64() {
				Some(i) => Self::Int(i),
				None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
			},
			serde_json::Value::String(s) => Self::Str(s),
			serde_json::Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
			serde_json::Value::Object(map) => {
				Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
			}
		}
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Self {
		Self::Str(s.to_string())
	}
}

impl From<String> for Value {
	fn from(s: String) -> Self {
		Self::Str(s)
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Self::Bool(b)
	}
}

impl From<i64> for Value {
	fn from(n: i64) -> Self {
		Self::Int(n)
	}
}

impl From<i32> for Value {
	fn from(n: i32) -> Self {
		Self::Int(i64::from(n))
	}
}

impl From<usize> for Value {
	fn from(n: usize) -> Self {
		Self::Int(i64::try_from(n).unwrap_or(i64::MAX))
	}
}

impl From<f64> for Value {
	fn from(x: f64) -> Self {
		Self::Float(x)
	}
}

impl<T: Into<Value>> From<Vec<T>> for Value {
	fn from(items: Vec<T>) -> Self {
		Self::List(items.into_iter().map(Into::into).collect())
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(value: Option<T>) -> Self {
		value.map(Into::into).unwrap_or_default()
	}
}

impl From<IndexMap<String, Value>> for Value {
	fn from(map: IndexMap<String, Value>) -> Self {
		Self::Map(map)
	}
}

impl From<Function> for Value {
	fn from(func: Function) -> Self {
		Self::Function(func)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case(Value::None, "")]
	#[case(Value::Bool(true), "true")]
	#[case(Value::Int(-3), "-3")]
	#[case(Value::Float(2.5), "2.5")]
	#[case(Value::from("testing"), "testing")]
	#[case(Value::from(vec!["testing", "123"]), r#"["testing", "123"]"#)]
	fn test_display(#[case] value: Value, #[case] expected: &str) {
		assert_eq!(value.to_string(), expected);
	}

	#[rstest]
	fn test_from_serialize_nested_map() {
		// Arrange
		let json = serde_json::json!({"args": {"page": "2"}, "new": true});

		// Act
		let value = Value::from_serialize(&json).unwrap();

		// Assert
		let args = value.get_attr("args").unwrap();
		assert_eq!(args.get_item(&Value::from("page")).unwrap(), Value::from("2"));
		assert_eq!(value.get_attr("new").unwrap(), Value::Bool(true));
	}

	#[rstest]
	#[case(Value::Int(7), Value::Int(2), Value::Int(3))]
	#[case(Value::Int(-7), Value::Int(2), Value::Int(-4))]
	#[case(Value::Float(7.0), Value::Int(2), Value::Float(3.0))]
	fn test_floor_div(#[case] lhs: Value, #[case] rhs: Value, #[case] expected: Value) {
		assert_eq!(lhs.floor_div(&rhs).unwrap(), expected);
	}

	#[rstest]
	fn test_rem_follows_divisor_sign() {
		assert_eq!(Value::Int(-7).rem(&Value::Int(3)).unwrap(), Value::Int(2));
	}

	#[rstest]
	fn test_division_by_zero() {
		let error = Value::Int(1).div(&Value::Int(0)).unwrap_err();

		assert_eq!(error.kind, ErrorKind::DivisionByZero);
	}

	#[rstest]
	fn test_missing_attribute_kind() {
		let error = Value::Int(1).get_attr("real").unwrap_err();

		assert_eq!(error.kind, ErrorKind::MissingAttribute);
	}

	#[rstest]
	fn test_negative_list_index() {
		let list = Value::from(vec![1, 2, 3]);

		assert_eq!(list.get_item(&Value::Int(-1)).unwrap(), Value::Int(3));
		assert_eq!(
			list.get_item(&Value::Int(3)).unwrap_err().kind,
			ErrorKind::IndexOutOfRange
		);
	}

	#[rstest]
	fn test_map_items_method() {
		// Arrange
		let mut map = IndexMap::new();
		map.insert("a".to_string(), Value::Int(1));
		let value = Value::Map(map);

		// Act
		let items = value.get_attr("items").unwrap();
		let Value::Function(items) = items else {
			panic!("items should be a function");
		};
		let result = items.call(&Arguments::default()).unwrap();

		// Assert
		assert_eq!(result, Value::List(vec![Value::List(vec![Value::from("a"), Value::Int(1)])]));
	}

	#[rstest]
	fn test_string_join_method() {
		let sep = Value::from(", ");
		let Value::Function(join) = sep.get_attr("join").unwrap() else {
			panic!("join should be a function");
		};

		let joined = join
			.call(&Arguments::new(vec![Value::from(vec!["a", "b"])]))
			.unwrap();

		assert_eq!(joined, Value::from("a, b"));
	}

	#[rstest]
	fn test_loose_equality_across_numbers() {
		assert!(Value::Int(1).loose_eq(&Value::Float(1.0)));
		assert!(Value::from(vec![1]).contains(&Value::Float(1.0)).unwrap());
	}
}
