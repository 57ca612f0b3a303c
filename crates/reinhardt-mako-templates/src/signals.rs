//! `template_rendered` signal
//!
//! Receivers run synchronously, in connection order, after a template
//! rendered successfully and before the output is returned.

use crate::app::AppId;
use crate::context::RenderContext;
use parking_lot::RwLock;
use reinhardt_mako_engine::Template;
use std::sync::Arc;
use tracing::trace;

/// Payload of the `template_rendered` signal
#[derive(Debug, Clone)]
pub struct TemplateRendered {
	pub app: AppId,
	pub template: Arc<Template>,
	/// The def rendered, `None` for whole-template renders
	pub def_name: Option<String>,
	/// The assembled context the template saw
	pub context: RenderContext,
}

/// Receiver function type
pub type RenderedReceiverFn = Arc<dyn Fn(&TemplateRendered) + Send + Sync>;

struct ReceiverInfo {
	dispatch_uid: String,
	sender: Option<AppId>,
	receiver: RenderedReceiverFn,
}

/// Listener list of the `template_rendered` signal
#[derive(Clone, Default)]
pub struct TemplateRenderedSignal {
	receivers: Arc<RwLock<Vec<ReceiverInfo>>>,
}

impl TemplateRenderedSignal {
	pub fn new() -> Self {
		Self::default()
	}

	/// Connect a receiver for renders of every application
	///
	/// A receiver connected under an existing `dispatch_uid` replaces it.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_mako_templates::TemplateRenderedSignal;
	///
	/// let signal = TemplateRenderedSignal::new();
	/// signal.connect("audit", |event| println!("rendered {}", event.template.uri()));
	/// assert_eq!(signal.receiver_count(), 1);
	/// assert!(signal.disconnect("audit"));
	/// ```
	pub fn connect<F>(&self, dispatch_uid: impl Into<String>, receiver: F)
	where
		F: Fn(&TemplateRendered) + Send + Sync + 'static,
	{
		self.add(dispatch_uid.into(), None, Arc::new(receiver));
	}

	/// Connect a receiver for renders of one application
	pub fn connect_for<F>(&self, app: AppId, dispatch_uid: impl Into<String>, receiver: F)
	where
		F: Fn(&TemplateRendered) + Send + Sync + 'static,
	{
		self.add(dispatch_uid.into(), Some(app), Arc::new(receiver));
	}

	fn add(&self, dispatch_uid: String, sender: Option<AppId>, receiver: RenderedReceiverFn) {
		let mut receivers = self.receivers.write();
		receivers.retain(|r| r.dispatch_uid != dispatch_uid);
		receivers.push(ReceiverInfo {
			dispatch_uid,
			sender,
			receiver,
		});
	}

	/// Disconnect a receiver by dispatch_uid
	pub fn disconnect(&self, dispatch_uid: &str) -> bool {
		let mut receivers = self.receivers.write();
		let original_len = receivers.len();
		receivers.retain(|r| r.dispatch_uid != dispatch_uid);
		receivers.len() < original_len
	}

	pub fn disconnect_all(&self) {
		self.receivers.write().clear();
	}

	pub fn receiver_count(&self) -> usize {
		self.receivers.read().len()
	}

	/// Deliver `event` to every matching receiver; returns how many ran
	///
	/// Receivers run outside the listener lock and may connect or disconnect
	/// receivers themselves.
	pub fn send(&self, event: &TemplateRendered) -> usize {
		let receivers: Vec<RenderedReceiverFn> = self
			.receivers
			.read()
			.iter()
			.filter(|r| r.sender.is_none_or(|app| app == event.app))
			.map(|r| r.receiver.clone())
			.collect();
		trace!(template = event.template.uri(), receivers = receivers.len(), "sending template_rendered");
		for receiver in &receivers {
			receiver(event);
		}
		receivers.len()
	}
}

impl std::fmt::Debug for TemplateRenderedSignal {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TemplateRenderedSignal")
			.field("receivers", &self.receiver_count())
			.finish()
	}
}
