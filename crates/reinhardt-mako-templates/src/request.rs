//! Ambient per-thread request state
//!
//! The render shortcuts find the current application through the request
//! context pushed by the host for the request being handled. Contexts form a
//! per-thread stack; [`RequestContext::push`] returns a guard that pops the
//! context again when dropped.

use crate::app::Application;
use indexmap::IndexMap;
use parking_lot::Mutex;
use reinhardt_mako_engine::Value;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

thread_local! {
	static STACK: RefCell<Vec<Arc<RequestContext>>> = const { RefCell::new(Vec::new()) };
}

/// A flashed message and its category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
	pub category: String,
	pub message: String,
}

/// State of the request being handled
#[derive(Debug)]
pub struct RequestContext {
	app: Arc<Application>,
	request: Value,
	session: Value,
	g: Mutex<IndexMap<String, Value>>,
	flashes: Mutex<Vec<Flash>>,
}

impl RequestContext {
	pub fn new(app: Arc<Application>) -> Self {
		Self {
			app,
			request: Value::Map(IndexMap::new()),
			session: Value::Map(IndexMap::new()),
			g: Mutex::new(IndexMap::new()),
			flashes: Mutex::new(Vec::new()),
		}
	}

	/// Attach the request as seen by templates
	pub fn with_request(mut self, request: impl Into<Value>) -> Self {
		self.request = request.into();
		self
	}

	pub fn with_session(mut self, session: impl Into<Value>) -> Self {
		self.session = session.into();
		self
	}

	pub fn app(&self) -> &Arc<Application> {
		&self.app
	}

	pub fn request(&self) -> &Value {
		&self.request
	}

	pub fn session(&self) -> &Value {
		&self.session
	}

	/// Set a name on the request-scoped `g` namespace
	pub fn set_g(&self, name: impl Into<String>, value: impl Into<Value>) {
		self.g.lock().insert(name.into(), value.into());
	}

	/// Snapshot of `g`
	pub fn g(&self) -> Value {
		Value::Map(self.g.lock().clone())
	}

	pub fn flash(&self, message: impl Into<String>, category: impl Into<String>) {
		self.flashes.lock().push(Flash {
			category: category.into(),
			message: message.into(),
		});
	}

	/// Messages flashed during this request, oldest first
	pub fn flashes(&self) -> Vec<Flash> {
		self.flashes.lock().clone()
	}

	/// Make this context current on the calling thread
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_mako_templates::{Application, RequestContext};
	/// use std::sync::Arc;
	///
	/// let app = Arc::new(Application::new("app", "/srv/app"));
	/// {
	///     let _guard = RequestContext::new(app.clone()).push();
	///     assert!(RequestContext::current().is_some());
	/// }
	/// assert!(RequestContext::current().is_none());
	/// ```
	pub fn push(self) -> RequestGuard {
		let context = Arc::new(self);
		STACK.with(|stack| stack.borrow_mut().push(context.clone()));
		RequestGuard {
			context,
			_not_send: PhantomData,
		}
	}

	/// Innermost context pushed on the calling thread
	pub fn current() -> Option<Arc<RequestContext>> {
		STACK.with(|stack| stack.borrow().last().cloned())
	}
}

/// Keeps a [`RequestContext`] current until dropped
#[must_use = "the request context is popped as soon as the guard is dropped"]
pub struct RequestGuard {
	context: Arc<RequestContext>,
	_not_send: PhantomData<*const ()>,
}

impl RequestGuard {
	pub fn context(&self) -> &Arc<RequestContext> {
		&self.context
	}
}

impl Drop for RequestGuard {
	fn drop(&mut self) {
		STACK.with(|stack| {
			let mut stack = stack.borrow_mut();
			if let Some(position) = stack.iter().rposition(|c| Arc::ptr_eq(c, &self.context)) {
				stack.remove(position);
			}
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::{fixture, rstest};

	#[fixture]
	fn app() -> Arc<Application> {
		Arc::new(Application::new("app", "/srv/app"))
	}

	#[rstest]
	fn test_nested_contexts(app: Arc<Application>) {
		// Arrange
		let outer = RequestContext::new(app.clone()).push();
		outer.context().set_g("level", "outer");

		// Act
		let current = {
			let inner = RequestContext::new(app.clone()).push();
			inner.context().set_g("level", "inner");
			RequestContext::current().unwrap()
		};

		// Assert
		assert_eq!(current.g().get_attr("level").unwrap(), Value::from("inner"));
		let restored = RequestContext::current().unwrap();
		assert!(Arc::ptr_eq(&restored, outer.context()));
	}

	#[rstest]
	fn test_flashes_keep_order(app: Arc<Application>) {
		let context = RequestContext::new(app);

		context.flash("saved", "message");
		context.flash("careful", "warning");

		let messages: Vec<String> = context.flashes().into_iter().map(|f| f.message).collect();
		assert_eq!(messages, vec!["saved", "careful"]);
	}
}
