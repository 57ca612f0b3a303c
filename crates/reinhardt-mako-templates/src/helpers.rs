//! Framework functions exposed to templates
//!
//! Two importable modules are provided. `helpers` carries `url_for` and
//! `get_flashed_messages` and is imported into every template of an
//! application. `i18n` carries the gettext family and is imported when the
//! application registers the `i18n` extension.

use crate::app::{Application, NullTranslations, Translations};
use crate::request::{Flash, RequestContext};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use reinhardt_mako_engine::{Arguments, Function, Namespace, Value};
use std::sync::Arc;

/// Name of the framework helpers module
pub const HELPERS_MODULE: &str = "helpers";

/// Name of the translation functions module
pub const I18N_MODULE: &str = "i18n";

/// Extension name enabling the i18n import
pub const I18N_EXTENSION: &str = "i18n";

/// Import statement injected into every template
pub const FRAMEWORK_IMPORTS: &str = "from helpers import url_for, get_flashed_messages";

/// Import statement injected when the i18n extension is registered
pub const I18N_IMPORTS: &str = "from i18n import gettext as _, gettext, ngettext, pgettext, npgettext";

static PLACEHOLDER: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"%\((\w+)\)s").expect("valid regex"));

/// The `helpers` module, resolving the application from the current request
pub fn helpers_namespace() -> Namespace {
	let mut namespace = Namespace::new();
	namespace.insert(
		"url_for".to_string(),
		Value::function("url_for", |args| {
			let context = current_request()?;
			build_url(context.app(), args)
		}),
	);
	namespace.insert(
		"get_flashed_messages".to_string(),
		Value::function("get_flashed_messages", |args| {
			let context = current_request()?;
			Ok(flashed_messages(&context.flashes(), args))
		}),
	);
	namespace
}

/// `url_for` bound to one application
pub fn url_for_function(app: Arc<Application>) -> Function {
	Function::new("url_for", move |args| build_url(&app, args))
}

/// `get_flashed_messages` over a fixed set of flashes
pub fn flashed_messages_function(flashes: Vec<Flash>) -> Function {
	Function::new("get_flashed_messages", move |args| {
		Ok(flashed_messages(&flashes, args))
	})
}

/// The `i18n` module, resolving translations from the current request
pub fn i18n_namespace() -> Namespace {
	let mut namespace = Namespace::new();
	for name in ["gettext", "ngettext", "pgettext", "npgettext"] {
		namespace.insert(
			name.to_string(),
			Value::function(name, move |args| {
				let translations = current_translations();
				translate(name, translations.as_ref(), args)
			}),
		);
	}
	namespace
}

/// The gettext family bound to one application, keyed by template name
pub fn i18n_functions(app: &Application) -> Namespace {
	let translations: Arc<dyn Translations> =
		app.translations().unwrap_or_else(|| Arc::new(NullTranslations));
	let mut namespace = Namespace::new();
	for name in ["gettext", "ngettext", "pgettext", "npgettext"] {
		let translations = translations.clone();
		namespace.insert(
			name.to_string(),
			Value::function(name, move |args| translate(name, translations.as_ref(), args)),
		);
	}
	if let Some(gettext) = namespace.get("gettext").cloned() {
		namespace.insert("_".to_string(), gettext);
	}
	namespace
}

fn current_request() -> Result<Arc<RequestContext>, String> {
	RequestContext::current().ok_or_else(|| "working outside of request context".to_string())
}

fn current_translations() -> Arc<dyn Translations> {
	RequestContext::current()
		.and_then(|context| context.app().translations())
		.unwrap_or_else(|| Arc::new(NullTranslations))
}

fn build_url(app: &Application, args: &Arguments) -> Result<Value, String> {
	let endpoint = args.expect_str(0, "endpoint")?;
	let Some(builder) = app.url_builder() else {
		return Err(format!(
			"could not build url for endpoint '{}': no url builder",
			endpoint
		));
	};
	let values: IndexMap<String, Value> = args
		.keywords
		.iter()
		.filter(|(name, _)| name.as_str() != "endpoint")
		.map(|(name, value)| (name.clone(), value.clone()))
		.collect();
	builder.build(endpoint, &values).map(Value::from)
}

fn flashed_messages(flashes: &[Flash], args: &Arguments) -> Value {
	let with_categories = args
		.arg(0, "with_categories")
		.is_some_and(Value::is_truthy);
	let filter: Vec<String> = match args.arg(1, "category_filter") {
		Some(Value::List(items)) => items.iter().map(ToString::to_string).collect(),
		Some(Value::Str(category)) => vec![category.clone()],
		_ => Vec::new(),
	};
	flashes
		.iter()
		.filter(|flash| filter.is_empty() || filter.contains(&flash.category))
		.map(|flash| {
			if with_categories {
				Value::from(vec![flash.category.as_str(), flash.message.as_str()])
			} else {
				Value::from(flash.message.as_str())
			}
		})
		.collect::<Vec<_>>()
		.into()
}

fn translate(name: &str, translations: &dyn Translations, args: &Arguments) -> Result<Value, String> {
	let (translated, num) = match name {
		"gettext" => (translations.gettext(args.expect_str(0, "message")?), None),
		"ngettext" => {
			let n = args.expect_int(2, "num")?;
			(
				translations.ngettext(
					args.expect_str(0, "singular")?,
					args.expect_str(1, "plural")?,
					n,
				),
				Some(n),
			)
		}
		"pgettext" => (
			translations.pgettext(args.expect_str(0, "context")?, args.expect_str(1, "message")?),
			None,
		),
		_ => {
			let n = args.expect_int(3, "num")?;
			(
				translations.npgettext(
					args.expect_str(0, "context")?,
					args.expect_str(1, "singular")?,
					args.expect_str(2, "plural")?,
					n,
				),
				Some(n),
			)
		}
	};
	Ok(Value::from(interpolate(&translated, &args.keywords, num)))
}

/// Replace `%(name)s` placeholders with keyword values; `num` is available
/// to plural forms
fn interpolate(message: &str, keywords: &IndexMap<String, Value>, num: Option<i64>) -> String {
	PLACEHOLDER
		.replace_all(message, |caps: &regex::Captures<'_>| {
			let name = &caps[1];
			match (keywords.get(name), name, num) {
				(Some(value), _, _) => value.to_string(),
				(None, "num", Some(n)) => n.to_string(),
				_ => caps[0].to_string(),
			}
		})
		.into_owned()
}
