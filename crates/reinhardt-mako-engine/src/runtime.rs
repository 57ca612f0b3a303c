//! Executes generated modules
//!
//! The runtime keeps an explicit stack of execution frames: the host call
//! site that started the render, one generated frame per active template
//! function, and a host frame for every native function being called. When
//! anything fails, the stack is snapshotted into an [`ExecutionFailure`]
//! whose innermost frame is the interception frame of [`Runtime`] itself.

use crate::encoding::Encoding;
use crate::error::{ErrorKind, RuntimeError};
use crate::expr::{BinaryOp, Expr, Literal, UnaryOp};
use crate::filters::{self, NO_DEFAULTS};
use crate::imports::{ModuleRegistry, Namespace};
use crate::module::{GeneratedFunction, GeneratedModule, Instruction};
use crate::value::{Arguments, Context, Function, Value};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use tracing::trace;

/// Maximum nesting of generated function calls
pub const MAX_CALL_DEPTH: usize = 64;

/// Generated frame local holding the bindings visible to template code
pub const CONTEXT_LOCAL: &str = "context";

/// File reported for frames of native functions
pub const NATIVE_FILE: &str = "<native>";

/// Function name of the interception frame
pub const INTERCEPTION_FUNCTION: &str = "Runtime::raise";

static BUILTINS: Lazy<Namespace> = Lazy::new(builtins);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
	/// Host code: the render call site or a native function
	Host,
	/// A generated template function
	Generated,
	/// The runtime's own failure capture point
	Interception,
}

/// Snapshot of one execution frame, taken when a failure is raised
#[derive(Debug, Clone, PartialEq)]
pub struct NativeFrame {
	pub kind: FrameKind,
	pub file: String,
	pub function: String,
	pub line: usize,
	pub locals: IndexMap<String, Value>,
}

/// A runtime error together with the execution stack at the point it was
/// raised, oldest frame first
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{error}")]
pub struct ExecutionFailure {
	pub error: RuntimeError,
	pub frames: Vec<NativeFrame>,
}

/// Host location that starts an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
	pub function: &'static str,
	pub file: &'static str,
	pub line: u32,
}

impl CallSite {
	pub const fn new(function: &'static str, file: &'static str, line: u32) -> Self {
		Self {
			function,
			file,
			line,
		}
	}
}

/// Which generated function an execution starts in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry<'a> {
	Body,
	Def(&'a str),
}

struct LoopState {
	items: Vec<Value>,
	next: usize,
}

struct LiveFrame<'m> {
	kind: FrameKind,
	function: String,
	file: String,
	line: usize,
	code: Option<&'m GeneratedFunction>,
	pc: usize,
	scopes: Vec<IndexMap<String, Value>>,
	loops: Vec<LoopState>,
	host_locals: IndexMap<String, Value>,
}

impl<'m> LiveFrame<'m> {
	fn host(
		function: impl Into<String>,
		file: impl Into<String>,
		line: usize,
		host_locals: IndexMap<String, Value>,
	) -> Self {
		Self {
			kind: FrameKind::Host,
			function: function.into(),
			file: file.into(),
			line,
			code: None,
			pc: 0,
			scopes: Vec::new(),
			loops: Vec::new(),
			host_locals,
		}
	}

	fn generated(
		module: &GeneratedModule,
		code: &'m GeneratedFunction,
		params: IndexMap<String, Value>,
	) -> Self {
		Self {
			kind: FrameKind::Generated,
			function: code.name.clone(),
			file: module.module_file.clone(),
			line: code.header_line,
			code: Some(code),
			pc: 0,
			scopes: vec![params],
			loops: Vec::new(),
			host_locals: IndexMap::new(),
		}
	}

	fn module_init(module: &GeneratedModule) -> Self {
		Self {
			kind: FrameKind::Generated,
			function: "<module>".to_string(),
			file: module.module_file.clone(),
			line: 0,
			code: None,
			pc: 0,
			scopes: Vec::new(),
			loops: Vec::new(),
			host_locals: IndexMap::new(),
		}
	}

	fn current_line(&self) -> usize {
		match self.code {
			Some(code) => code
				.steps
				.get(self.pc)
				.map_or(code.header_line, |step| step.generated_line),
			None => self.line,
		}
	}
}

/// Executes one render of a generated module
pub struct Runtime<'m> {
	module: &'m GeneratedModule,
	context: &'m Context,
	modules: &'m ModuleRegistry,
	globals: Namespace,
	buffer: String,
	frames: Vec<LiveFrame<'m>>,
}

impl<'m> Runtime<'m> {
	pub fn new(module: &'m GeneratedModule, context: &'m Context, modules: &'m ModuleRegistry) -> Self {
		Self {
			module,
			context,
			modules,
			globals: Namespace::new(),
			buffer: String::new(),
			frames: Vec::new(),
		}
	}

	/// Run `entry` and encode the produced text
	pub fn execute(
		mut self,
		entry: Entry<'_>,
		encoding: Encoding,
		caller: CallSite,
	) -> Result<Vec<u8>, ExecutionFailure> {
		let module = self.module;
		let mut call_locals = IndexMap::new();
		call_locals.insert("uri".to_string(), Value::from(module.uri.as_str()));
		if let Entry::Def(name) = entry {
			call_locals.insert("def_name".to_string(), Value::from(name));
		}
		self.frames.push(LiveFrame::host(
			caller.function,
			caller.file,
			caller.line as usize,
			call_locals,
		));
		trace!(uri = %module.uri, ?entry, "executing generated module");

		self.import_names()?;
		match entry {
			Entry::Body => {
				let Some(body) = module.body() else {
					return Err(self.raise(RuntimeError::undefined("render_body")));
				};
				self.call_generated(body, IndexMap::new())?;
			}
			Entry::Def(name) => {
				let Some(def) = module.def(name) else {
					return Err(self.raise(RuntimeError::new(
						ErrorKind::UndefinedName,
						format!("def '{}' is not defined", name),
					)));
				};
				let keywords = def
					.params
					.iter()
					.filter_map(|p| self.context.get(&p.name).map(|v| (p.name.clone(), v.clone())))
					.collect();
				let params = self.bind_params(def, Vec::new(), keywords)?;
				self.call_generated(def, params)?;
			}
		}

		let text = std::mem::take(&mut self.buffer);
		match encoding.encode(&text) {
			Ok(bytes) => Ok(bytes),
			Err(failure) => {
				let ch = text.chars().nth(failure.offset).unwrap_or(char::REPLACEMENT_CHARACTER);
				Err(self.raise(RuntimeError::new(
					ErrorKind::Encoding,
					format!(
						"{} codec cannot encode character {:?} in position {}",
						encoding, ch, failure.offset
					),
				)))
			}
		}
	}

	fn import_names(&mut self) -> Result<(), ExecutionFailure> {
		let module = self.module;
		if module.imports.is_empty() {
			return Ok(());
		}
		self.frames.push(LiveFrame::module_init(module));
		for (index, spec) in module.imports.iter().enumerate() {
			if let Some(frame) = self.frames.last_mut() {
				frame.line = module.import_lines.get(index).copied().unwrap_or_default();
			}
			let bindings = self.modules.resolve(spec).map_err(|e| self.raise(e))?;
			self.globals.extend(bindings);
		}
		self.frames.pop();
		Ok(())
	}

	fn call_generated(
		&mut self,
		function: &'m GeneratedFunction,
		params: IndexMap<String, Value>,
	) -> Result<(), ExecutionFailure> {
		let depth = self
			.frames
			.iter()
			.filter(|f| f.kind == FrameKind::Generated)
			.count();
		if depth >= MAX_CALL_DEPTH {
			return Err(self.raise(RuntimeError::new(
				ErrorKind::Recursion,
				format!("maximum def call depth of {} exceeded", MAX_CALL_DEPTH),
			)));
		}
		self.frames
			.push(LiveFrame::generated(self.module, function, params));
		self.run(function)?;
		self.frames.pop();
		Ok(())
	}

	fn run(&mut self, function: &'m GeneratedFunction) -> Result<(), ExecutionFailure> {
		let index = self.frames.len() - 1;
		loop {
			let pc = self.frames[index].pc;
			let Some(step) = function.steps.get(pc) else {
				return Ok(());
			};
			let next = match &step.instruction {
				Instruction::Write(text) => {
					self.buffer.push_str(text);
					pc + 1
				}
				Instruction::Emit { expr, filters } => {
					let value = self.eval(expr)?;
					let text = self.apply_filters(value, filters)?;
					self.buffer.push_str(&text);
					pc + 1
				}
				Instruction::ForStart {
					targets,
					iter,
					exit,
				} => {
					let items = self.eval(iter)?.iterate().map_err(|e| self.raise(e))?;
					if items.is_empty() {
						*exit
					} else {
						let scope = self.bind_targets(targets, items[0].clone())?;
						let frame = &mut self.frames[index];
						frame.scopes.push(scope);
						frame.loops.push(LoopState { items, next: 1 });
						pc + 1
					}
				}
				Instruction::ForNext { start } => {
					let Some(Instruction::ForStart { targets, .. }) =
						function.steps.get(*start).map(|s| &s.instruction)
					else {
						return Err(self.raise(RuntimeError::type_mismatch(
							"loop continuation without a loop",
						)));
					};
					let item = self.frames[index].loops.last_mut().and_then(|state| {
						let item = state.items.get(state.next).cloned();
						state.next += 1;
						item
					});
					match item {
						Some(item) => {
							let scope = self.bind_targets(targets, item)?;
							if let Some(current) = self.frames[index].scopes.last_mut() {
								*current = scope;
							}
							start + 1
						}
						None => {
							let frame = &mut self.frames[index];
							frame.loops.pop();
							frame.scopes.pop();
							pc + 1
						}
					}
				}
				Instruction::JumpUnless { cond, target } => {
					if self.eval(cond)?.is_truthy() {
						pc + 1
					} else {
						*target
					}
				}
				Instruction::Jump(target) => *target,
				Instruction::Return => return Ok(()),
			};
			self.frames[index].pc = next;
		}
	}

	fn bind_targets(
		&self,
		targets: &[String],
		item: Value,
	) -> Result<IndexMap<String, Value>, ExecutionFailure> {
		let mut scope = IndexMap::new();
		if let [target] = targets {
			scope.insert(target.clone(), item);
			return Ok(scope);
		}
		match item {
			Value::List(values) if values.len() == targets.len() => {
				scope.extend(targets.iter().cloned().zip(values));
				Ok(scope)
			}
			other => Err(self.raise(RuntimeError::type_mismatch(format!(
				"cannot unpack {} into {} loop targets",
				other.repr(),
				targets.len()
			)))),
		}
	}

	fn bind_params(
		&mut self,
		function: &GeneratedFunction,
		positional: Vec<Value>,
		mut keywords: IndexMap<String, Value>,
	) -> Result<IndexMap<String, Value>, ExecutionFailure> {
		let def_name = function.def_name.as_deref().unwrap_or(&function.name);
		if positional.len() > function.params.len() {
			return Err(self.raise(RuntimeError::type_mismatch(format!(
				"{}() takes {} arguments but {} were given",
				def_name,
				function.params.len(),
				positional.len()
			))));
		}
		let mut bound = IndexMap::with_capacity(function.params.len());
		let mut positional = positional.into_iter();
		for param in &function.params {
			let value = if let Some(value) = positional.next() {
				if keywords.contains_key(&param.name) {
					return Err(self.raise(RuntimeError::type_mismatch(format!(
						"{}() got multiple values for argument '{}'",
						def_name, param.name
					))));
				}
				value
			} else if let Some(value) = keywords.shift_remove(&param.name) {
				value
			} else if let Some(default) = &param.default {
				self.eval(default)?
			} else {
				return Err(self.raise(RuntimeError::type_mismatch(format!(
					"{}() missing required argument '{}'",
					def_name, param.name
				))));
			};
			bound.insert(param.name.clone(), value);
		}
		if let Some(unexpected) = keywords.keys().next() {
			return Err(self.raise(RuntimeError::type_mismatch(format!(
				"{}() got an unexpected keyword argument '{}'",
				def_name, unexpected
			))));
		}
		Ok(bound)
	}

	fn eval(&mut self, expr: &Expr) -> Result<Value, ExecutionFailure> {
		match expr {
			Expr::Literal(literal) => Ok(literal_value(literal)),
			Expr::Name(name) => self.lookup(name),
			Expr::List(items) => {
				let values = items
					.iter()
					.map(|item| self.eval(item))
					.collect::<Result<Vec<_>, _>>()?;
				Ok(Value::List(values))
			}
			Expr::Dict(entries) => {
				let mut map = IndexMap::with_capacity(entries.len());
				for (key, value) in entries {
					let key = match self.eval(key)? {
						Value::Str(s) => s,
						other => other.to_string(),
					};
					let value = self.eval(value)?;
					map.insert(key, value);
				}
				Ok(Value::Map(map))
			}
			Expr::Attr(target, name) => {
				let target = self.eval(target)?;
				target.get_attr(name).map_err(|e| self.raise(e))
			}
			Expr::Index(target, index) => {
				let target = self.eval(target)?;
				let index = self.eval(index)?;
				target.get_item(&index).map_err(|e| self.raise(e))
			}
			Expr::Call {
				callee,
				args,
				kwargs,
			} => self.call(callee, args, kwargs),
			Expr::Unary(op, operand) => {
				let value = self.eval(operand)?;
				let result = match op {
					UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
					UnaryOp::Neg => value.neg(),
					UnaryOp::Pos => value.pos(),
				};
				result.map_err(|e| self.raise(e))
			}
			Expr::Binary(op, left, right) => {
				let left = self.eval(left)?;
				let right = self.eval(right)?;
				binary(*op, &left, &right).map_err(|e| self.raise(e))
			}
			Expr::And(left, right) => {
				let left = self.eval(left)?;
				if left.is_truthy() { self.eval(right) } else { Ok(left) }
			}
			Expr::Or(left, right) => {
				let left = self.eval(left)?;
				if left.is_truthy() { Ok(left) } else { self.eval(right) }
			}
			Expr::Conditional {
				cond,
				then,
				otherwise,
			} => {
				if self.eval(cond)?.is_truthy() {
					self.eval(then)
				} else {
					self.eval(otherwise)
				}
			}
		}
	}

	fn call(
		&mut self,
		callee: &Expr,
		args: &[Expr],
		kwargs: &[(String, Expr)],
	) -> Result<Value, ExecutionFailure> {
		let module = self.module;
		if let Expr::Name(name) = callee
			&& !self.is_bound(name)
			&& let Some(def) = module.def(name)
		{
			let arguments = self.arguments(args, kwargs)?;
			let params = self.bind_params(def, arguments.positional, arguments.keywords)?;
			self.call_generated(def, params)?;
			return Ok(Value::Str(String::new()));
		}
		let target = self.eval(callee)?;
		let arguments = self.arguments(args, kwargs)?;
		match target {
			Value::Function(function) => self.call_native(&function, &arguments),
			other => Err(self.raise(RuntimeError::new(
				ErrorKind::NotCallable,
				format!("'{}' value is not callable", other.type_name()),
			))),
		}
	}

	fn arguments(
		&mut self,
		args: &[Expr],
		kwargs: &[(String, Expr)],
	) -> Result<Arguments, ExecutionFailure> {
		let mut arguments = Arguments::new(Vec::with_capacity(args.len()));
		for arg in args {
			let value = self.eval(arg)?;
			arguments.positional.push(value);
		}
		for (name, expr) in kwargs {
			let value = self.eval(expr)?;
			arguments.keywords.insert(name.clone(), value);
		}
		Ok(arguments)
	}

	fn call_native(&mut self, function: &Function, arguments: &Arguments) -> Result<Value, ExecutionFailure> {
		let mut locals = IndexMap::new();
		locals.insert("args".to_string(), Value::List(arguments.positional.clone()));
		locals.insert("kwargs".to_string(), Value::Map(arguments.keywords.clone()));
		self.frames
			.push(LiveFrame::host(function.name(), NATIVE_FILE, 0, locals));
		match function.call(arguments) {
			Ok(value) => {
				self.frames.pop();
				Ok(value)
			}
			Err(message) => Err(self.raise(RuntimeError::new(
				ErrorKind::Function,
				format!("{}: {}", function.name(), message),
			))),
		}
	}

	fn apply_filters(&mut self, value: Value, filters: &[String]) -> Result<String, ExecutionFailure> {
		let module = self.module;
		let defaults: &[String] = if filters.iter().any(|f| f == NO_DEFAULTS) {
			&[]
		} else {
			&module.default_filters
		};
		let mut value = value;
		for name in defaults
			.iter()
			.chain(filters.iter().filter(|f| *f != NO_DEFAULTS))
		{
			value = match filters::builtin(name) {
				Some(filter) => filter(value),
				None => match self.lookup(name)? {
					Value::Function(function) => {
						self.call_native(&function, &Arguments::new(vec![value]))?
					}
					other => {
						return Err(self.raise(RuntimeError::new(
							ErrorKind::NotCallable,
							format!("filter '{}' is a {}, not a function", name, other.type_name()),
						)));
					}
				},
			};
		}
		Ok(value.to_string())
	}

	fn current_scopes(&self) -> &[IndexMap<String, Value>] {
		match self.frames.last() {
			Some(frame) if frame.kind == FrameKind::Generated => &frame.scopes,
			_ => &[],
		}
	}

	fn is_bound(&self, name: &str) -> bool {
		self.current_scopes().iter().any(|s| s.contains_key(name))
			|| self.context.contains_key(name)
			|| self.globals.contains_key(name)
	}

	fn lookup(&self, name: &str) -> Result<Value, ExecutionFailure> {
		let found = self
			.current_scopes()
			.iter()
			.rev()
			.find_map(|scope| scope.get(name))
			.or_else(|| self.context.get(name))
			.or_else(|| self.globals.get(name));
		if let Some(value) = found {
			return Ok(value.clone());
		}
		if self.module.def(name).is_some() {
			return Err(self.raise(RuntimeError::type_mismatch(format!(
				"def '{}' can only be called",
				name
			))));
		}
		match BUILTINS.get(name) {
			Some(value) => Ok(value.clone()),
			None => Err(self.raise(RuntimeError::undefined(name))),
		}
	}

	fn snapshot(&self, frame: &LiveFrame<'_>) -> NativeFrame {
		let locals = match frame.kind {
			FrameKind::Generated => {
				let mut bindings = self.context.clone();
				for scope in &frame.scopes {
					bindings.extend(scope.iter().map(|(k, v)| (k.clone(), v.clone())));
				}
				let mut locals = IndexMap::new();
				locals.insert(CONTEXT_LOCAL.to_string(), Value::Map(bindings));
				locals.insert("__pc".to_string(), Value::from(frame.pc));
				locals.insert("__loop_depth".to_string(), Value::from(frame.loops.len()));
				locals.insert("__buffer_len".to_string(), Value::from(self.buffer.len()));
				locals.insert(
					"__imports".to_string(),
					Value::List(self.globals.keys().map(|k| Value::from(k.as_str())).collect()),
				);
				locals
			}
			_ => frame.host_locals.clone(),
		};
		NativeFrame {
			kind: frame.kind,
			file: frame.file.clone(),
			function: frame.function.clone(),
			line: frame.current_line(),
			locals,
		}
	}

	fn raise(&self, error: RuntimeError) -> ExecutionFailure {
		let mut frames: Vec<NativeFrame> = self.frames.iter().map(|f| self.snapshot(f)).collect();
		frames.push(NativeFrame {
			kind: FrameKind::Interception,
			file: file!().to_string(),
			function: INTERCEPTION_FUNCTION.to_string(),
			line: line!() as usize,
			locals: IndexMap::new(),
		});
		trace!(error = %error, depth = frames.len(), "template execution failed");
		ExecutionFailure { error, frames }
	}
}

fn literal_value(literal: &Literal) -> Value {
	match literal {
		Literal::None => Value::None,
		Literal::Bool(b) => Value::Bool(*b),
		Literal::Int(n) => Value::Int(*n),
		Literal::Float(x) => Value::Float(*x),
		Literal::Str(s) => Value::Str(s.clone()),
	}
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
	match op {
		BinaryOp::Add => left.add(right),
		BinaryOp::Sub => left.sub(right),
		BinaryOp::Mul => left.mul(right),
		BinaryOp::Div => left.div(right),
		BinaryOp::FloorDiv => left.floor_div(right),
		BinaryOp::Mod => left.rem(right),
		BinaryOp::Eq => Ok(Value::Bool(left.loose_eq(right))),
		BinaryOp::Ne => Ok(Value::Bool(!left.loose_eq(right))),
		BinaryOp::Lt => left.compare(right).map(|o| Value::Bool(o.is_lt())),
		BinaryOp::Le => left.compare(right).map(|o| Value::Bool(o.is_le())),
		BinaryOp::Gt => left.compare(right).map(|o| Value::Bool(o.is_gt())),
		BinaryOp::Ge => left.compare(right).map(|o| Value::Bool(o.is_ge())),
		BinaryOp::In => right.contains(left).map(Value::Bool),
		BinaryOp::NotIn => right.contains(left).map(|found| Value::Bool(!found)),
	}
}

fn builtins() -> Namespace {
	let mut namespace = Namespace::new();
	namespace.insert(
		"len".to_string(),
		Value::function("len", |args: &Arguments| {
			args.get(0)
				.and_then(Value::len)
				.map(Value::from)
				.ok_or_else(|| "expects a str, list or map".to_string())
		}),
	);
	namespace.insert(
		"str".to_string(),
		Value::function("str", |args: &Arguments| {
			Ok(Value::Str(args.get(0).map(Value::to_string).unwrap_or_default()))
		}),
	);
	namespace.insert(
		"int".to_string(),
		Value::function("int", |args: &Arguments| match args.get(0) {
			Some(Value::Int(n)) => Ok(Value::Int(*n)),
			Some(Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
			Some(Value::Float(x)) if x.is_finite() => Ok(Value::Int(x.trunc() as i64)),
			Some(Value::Str(s)) => s
				.trim()
				.parse::<i64>()
				.map(Value::Int)
				.map_err(|_| format!("invalid literal {:?}", s)),
			Some(other) => Err(format!("cannot convert {} to int", other.type_name())),
			None => Ok(Value::Int(0)),
		}),
	);
	namespace.insert(
		"range".to_string(),
		Value::function("range", |args: &Arguments| {
			let (start, stop, step) = match args.len() {
				1 => (0, args.expect_int(0, "stop")?, 1),
				2 => (args.expect_int(0, "start")?, args.expect_int(1, "stop")?, 1),
				3 => (
					args.expect_int(0, "start")?,
					args.expect_int(1, "stop")?,
					args.expect_int(2, "step")?,
				),
				n => return Err(format!("expected 1 to 3 arguments, got {}", n)),
			};
			if step == 0 {
				return Err("step must not be zero".to_string());
			}
			let mut items = Vec::new();
			let mut current = start;
			while (step > 0 && current < stop) || (step < 0 && current > stop) {
				items.push(Value::Int(current));
				match current.checked_add(step) {
					Some(next) => current = next,
					None => break,
				}
			}
			Ok(Value::List(items))
		}),
	);
	namespace.insert(
		"enumerate".to_string(),
		Value::function("enumerate", |args: &Arguments| {
			let items = match args.get(0) {
				Some(value) => value.iterate().map_err(|e| e.message)?,
				None => return Err("missing argument 'iterable'".to_string()),
			};
			Ok(Value::List(
				items
					.into_iter()
					.enumerate()
					.map(|(i, item)| Value::List(vec![Value::from(i), item]))
					.collect(),
			))
		}),
	);
	namespace
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::codegen::{ModuleHeader, generate};
	use crate::imports::ImportSpec;
	use crate::parser::parse;
	use rstest::{fixture, rstest};

	const SITE: CallSite = CallSite::new("tests::render", file!(), line!());

	fn compile_with(source: &str, imports: &[&str]) -> GeneratedModule {
		let document = parse(source, "t.html").unwrap();
		let imports = ImportSpec::parse_all(imports).unwrap();
		generate(
			&document,
			&ModuleHeader {
				uri: "t.html",
				filename: Some("/templates/t.html"),
				source,
				imports: &imports,
				default_filters: &["str".to_string()],
			},
		)
	}

	fn render(source: &str, context: &Context) -> Result<String, ExecutionFailure> {
		let module = compile_with(source, &[]);
		let modules = ModuleRegistry::new();
		Runtime::new(&module, context, &modules)
			.execute(Entry::Body, Encoding::Utf8, SITE)
			.map(|bytes| String::from_utf8(bytes).unwrap())
	}

	#[fixture]
	fn context() -> Context {
		let mut context = Context::new();
		context.insert("arguments".to_string(), Value::from(vec!["testing", "123"]));
		context.insert("name".to_string(), Value::from("<b>"));
		context
	}

	#[rstest]
	fn test_loop_renders_each_item(context: Context) {
		// Arrange
		let source = "% for arg in arguments:\n${arg}\n% endfor\n";

		// Act
		let output = render(source, &context).unwrap();

		// Assert
		assert_eq!(output, "testing\n123\n");
	}

	#[rstest]
	#[case("${name}", "<b>")]
	#[case("${name | h}", "&lt;b&gt;")]
	#[case("${'a' if len(arguments) == 2 else 'b'}", "a")]
	#[case("% if 'testing' in arguments:\nyes\n% else:\nno\n% endif\n", "yes\n")]
	#[case("% for i, arg in enumerate(arguments):\n${i}=${arg};\n% endfor\n", "0=testing;\n1=123;\n")]
	#[case("${range(3)}", "[0, 1, 2]")]
	#[case("${missing if False else 'short-circuit'}", "short-circuit")]
	#[case("% for x in []:\nnever\n% endfor\nafter", "after")]
	fn test_render_expressions(context: Context, #[case] source: &str, #[case] expected: &str) {
		assert_eq!(render(source, &context).unwrap(), expected);
	}

	#[rstest]
	fn test_def_call_writes_in_place(context: Context) {
		let source = "<%def name=\"item(x, suffix='!')\">[${x}${suffix}]</%def>a${item('b')}c${item(x='d', suffix='?')}";

		let output = render(source, &context).unwrap();

		assert_eq!(output, "a[b!]c[d?]");
	}

	#[rstest]
	fn test_failure_captures_generated_frame(context: Context) {
		// Arrange
		let source = "\n% for arg in arguments:\n    ${error}\n% endfor\n";
		let module = compile_with(source, &[]);
		let modules = ModuleRegistry::new();

		// Act
		let failure = Runtime::new(&module, &context, &modules)
			.execute(Entry::Body, Encoding::Utf8, SITE)
			.unwrap_err();

		// Assert
		assert_eq!(failure.error.kind, ErrorKind::UndefinedName);
		let kinds: Vec<FrameKind> = failure.frames.iter().map(|f| f.kind).collect();
		assert_eq!(
			kinds,
			vec![FrameKind::Host, FrameKind::Generated, FrameKind::Interception]
		);
		let generated = &failure.frames[1];
		assert_eq!(generated.file, "t.html.gen");
		assert_eq!(module.source_line_for(generated.line), Some(3));
		let Some(Value::Map(bindings)) = generated.locals.get(CONTEXT_LOCAL) else {
			panic!("generated frame should expose its bindings");
		};
		assert_eq!(bindings.get("arg"), Some(&Value::from("testing")));
		assert!(generated.locals.contains_key("__pc"));
	}

	#[rstest]
	fn test_native_failure_adds_host_frame() {
		// Arrange
		let mut context = Context::new();
		context.insert(
			"boom".to_string(),
			Value::function("boom", |_: &Arguments| Err("exploded".to_string())),
		);
		let module = compile_with("${boom()}", &[]);
		let modules = ModuleRegistry::new();

		// Act
		let failure = Runtime::new(&module, &context, &modules)
			.execute(Entry::Body, Encoding::Utf8, SITE)
			.unwrap_err();

		// Assert
		assert_eq!(failure.error.kind, ErrorKind::Function);
		assert_eq!(failure.error.message, "boom: exploded");
		let native = &failure.frames[2];
		assert_eq!(native.kind, FrameKind::Host);
		assert_eq!(native.file, NATIVE_FILE);
		assert_eq!(native.function, "boom");
	}

	#[rstest]
	fn test_imports_bind_names() {
		let module = compile_with("${ascii_letters[0]}${digits[-1]}", &["from string import ascii_letters, digits"]);
		let modules = ModuleRegistry::new();
		let context = Context::new();

		let bytes = Runtime::new(&module, &context, &modules)
			.execute(Entry::Body, Encoding::Utf8, SITE)
			.unwrap();

		assert_eq!(bytes, b"a9");
	}

	#[rstest]
	fn test_failed_import_raises_in_module_frame() {
		let module = compile_with("text", &["from nowhere import x"]);
		let modules = ModuleRegistry::new();
		let context = Context::new();

		let failure = Runtime::new(&module, &context, &modules)
			.execute(Entry::Body, Encoding::Utf8, SITE)
			.unwrap_err();

		assert_eq!(failure.error.kind, ErrorKind::Import);
		assert_eq!(failure.frames[1].function, "<module>");
		assert_eq!(failure.frames[1].line, module.import_lines[0]);
	}

	#[rstest]
	fn test_def_entry_binds_params_from_context(context: Context) {
		let module = compile_with("outside\n<%def name=\"show(name)\">inside ${name}</%def>", &[]);
		let modules = ModuleRegistry::new();

		let bytes = Runtime::new(&module, &context, &modules)
			.execute(Entry::Def("show"), Encoding::Utf8, SITE)
			.unwrap();

		assert_eq!(bytes, b"inside <b>");
	}

	#[rstest]
	fn test_output_encoding_failure() {
		let module = compile_with("\u{a2}", &[]);
		let modules = ModuleRegistry::new();
		let context = Context::new();

		let failure = Runtime::new(&module, &context, &modules)
			.execute(Entry::Body, Encoding::Ascii, SITE)
			.unwrap_err();

		assert_eq!(failure.error.kind, ErrorKind::Encoding);
		assert_eq!(failure.frames.len(), 2);
		assert_eq!(failure.frames[0].function, "tests::render");
	}

	#[rstest]
	fn test_unbounded_recursion_is_stopped() {
		let module = compile_with("<%def name=\"again()\">${again()}</%def>${again()}", &[]);
		let modules = ModuleRegistry::new();
		let context = Context::new();

		let failure = Runtime::new(&module, &context, &modules)
			.execute(Entry::Body, Encoding::Utf8, SITE)
			.unwrap_err();

		assert_eq!(failure.error.kind, ErrorKind::Recursion);
	}

	#[rstest]
	#[case("${x.y}", ErrorKind::UndefinedName)]
	#[case("${1 / 0}", ErrorKind::DivisionByZero)]
	#[case("${'a'()}", ErrorKind::NotCallable)]
	#[case("${[1][5]}", ErrorKind::IndexOutOfRange)]
	#[case("${1 < 'a'}", ErrorKind::TypeMismatch)]
	#[case("${'ab' * 9223372036854775807}", ErrorKind::Overflow)]
	#[case("${[1, 2] * 9223372036854775807}", ErrorKind::Overflow)]
	#[case("${9223372036854775807 + 1}", ErrorKind::Overflow)]
	fn test_runtime_error_kinds(#[case] source: &str, #[case] kind: ErrorKind) {
		let error = render(source, &Context::new()).unwrap_err().error;

		assert_eq!(error.kind, kind);
	}
}
