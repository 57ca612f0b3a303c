//! Template search path resolution
//!
//! An application's templates are looked up in its own template folder
//! first, then in the template folders of its blueprints in registration
//! order. Folders that do not exist are skipped, as are folders already on
//! the path.

use crate::app::Application;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Ordered, duplicate-free list of template directories
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath(Vec<PathBuf>);

impl SearchPath {
	/// Build a search path, keeping the first occurrence of each directory
	pub fn new(directories: impl IntoIterator<Item = PathBuf>) -> Self {
		let mut unique: Vec<PathBuf> = Vec::new();
		for directory in directories {
			if !unique.contains(&directory) {
				unique.push(directory);
			}
		}
		Self(unique)
	}

	pub fn iter(&self) -> impl Iterator<Item = &Path> {
		self.0.iter().map(PathBuf::as_path)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn as_slice(&self) -> &[PathBuf] {
		&self.0
	}
}

impl fmt::Display for SearchPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("[")?;
		for (i, directory) in self.0.iter().enumerate() {
			if i > 0 {
				f.write_str(", ")?;
			}
			write!(f, "'{}'", directory.display())?;
		}
		f.write_str("]")
	}
}

/// Template directories of an application, its own folder first
///
/// # Examples
///
/// ```
/// use reinhardt_mako_templates::{Application, Blueprint, resolve_search_path};
///
/// let root = tempfile::tempdir().unwrap();
/// std::fs::create_dir_all(root.path().join("templates")).unwrap();
/// std::fs::create_dir_all(root.path().join("admin/templates")).unwrap();
///
/// let app = Application::new("app", root.path());
/// app.register_blueprint(
///     Blueprint::new("admin", root.path().join("admin")).with_template_folder("templates"),
/// );
///
/// let search_path = resolve_search_path(&app);
/// assert_eq!(search_path.len(), 2);
/// assert!(search_path.as_slice()[0].ends_with("templates"));
/// ```
pub fn resolve_search_path(app: &Application) -> SearchPath {
	let mut candidates: Vec<PathBuf> = Vec::new();
	if let Some(folder) = app.template_folder() {
		candidates.push(app.root_path().join(folder));
	}
	for blueprint in app.blueprints() {
		for folder in blueprint.template_folders() {
			candidates.push(blueprint.root_path().join(folder));
		}
	}

	let directories = candidates.into_iter().filter_map(|candidate| {
		if !candidate.is_dir() {
			debug!(path = %candidate.display(), "skipping missing template directory");
			return None;
		}
		Some(fs::canonicalize(&candidate).unwrap_or(candidate))
	});
	let search_path = SearchPath::new(directories);
	debug!(app = app.name(), search_path = %search_path, "resolved template search path");
	search_path
}

/// Normalized relative form of a template name
///
/// A leading `/` is stripped. Names climbing out of a directory or naming
/// an absolute location are rejected.
pub(crate) fn normalize_name(name: &str) -> Option<PathBuf> {
	let normalized = Path::new(name.trim_start_matches('/'));
	let mut relative = PathBuf::new();
	for component in normalized.components() {
		match component {
			Component::Normal(part) => relative.push(part),
			Component::CurDir => {}
			Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
		}
	}
	(!relative.as_os_str().is_empty()).then_some(relative)
}

/// First file named `name` in the search path
pub(crate) fn find_template(search_path: &SearchPath, name: &str) -> Option<PathBuf> {
	let relative = normalize_name(name)?;
	search_path.iter().find_map(|directory| {
		let candidate = directory.join(&relative);
		let resolved = fs::canonicalize(&candidate).ok()?;
		(resolved.starts_with(directory) && resolved.is_file()).then_some(resolved)
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::app::Blueprint;
	use rstest::{fixture, rstest};
	use tempfile::TempDir;

	#[fixture]
	fn root() -> TempDir {
		let root = tempfile::tempdir().unwrap();
		for folder in ["templates", "blog/templates", "shop/views", "shop/templates"] {
			fs::create_dir_all(root.path().join(folder)).unwrap();
		}
		root
	}

	fn canonical(path: PathBuf) -> PathBuf {
		fs::canonicalize(path).unwrap()
	}

	#[rstest]
	fn test_application_folder_first(root: TempDir) {
		// Arrange
		let app = Application::new("app", root.path());
		app.register_blueprint(
			Blueprint::new("blog", root.path().join("blog")).with_template_folder("templates"),
		);
		app.register_blueprint(
			Blueprint::new("shop", root.path().join("shop"))
				.with_template_folder("views")
				.with_template_folder("templates"),
		);

		// Act
		let search_path = resolve_search_path(&app);

		// Assert
		assert_eq!(
			search_path.as_slice(),
			&[
				canonical(root.path().join("templates")),
				canonical(root.path().join("blog/templates")),
				canonical(root.path().join("shop/views")),
				canonical(root.path().join("shop/templates")),
			]
		);
	}

	#[rstest]
	fn test_missing_and_duplicate_folders_skipped(root: TempDir) {
		let app = Application::new("app", root.path());
		app.register_blueprint(
			Blueprint::new("dup", root.path())
				.with_template_folder("templates")
				.with_template_folder("missing"),
		);

		let search_path = resolve_search_path(&app);

		assert_eq!(search_path.len(), 1);
	}

	#[rstest]
	fn test_no_folders_is_empty(root: TempDir) {
		let app = Application::new("app", root.path()).without_template_folder();

		assert!(resolve_search_path(&app).is_empty());
	}

	#[rstest]
	#[case("index.html", Some("index.html"))]
	#[case("/index.html", Some("index.html"))]
	#[case("./pages/index.html", Some("pages/index.html"))]
	#[case("../secret.txt", None)]
	#[case("pages/../../secret.txt", None)]
	#[case("", None)]
	fn test_normalize_name(#[case] name: &str, #[case] expected: Option<&str>) {
		assert_eq!(normalize_name(name), expected.map(PathBuf::from));
	}

	#[rstest]
	fn test_find_template_first_match(root: TempDir) {
		// Arrange
		fs::write(root.path().join("blog/templates/shared.html"), "blog").unwrap();
		fs::write(root.path().join("shop/templates/shared.html"), "shop").unwrap();
		let search_path = SearchPath::new([
			canonical(root.path().join("blog/templates")),
			canonical(root.path().join("shop/templates")),
		]);

		// Act
		let found = find_template(&search_path, "shared.html").unwrap();

		// Assert
		assert_eq!(fs::read_to_string(found).unwrap(), "blog");
	}

	#[rstest]
	fn test_directories_are_not_templates(root: TempDir) {
		let search_path = SearchPath::new([canonical(root.path().to_path_buf())]);

		assert_eq!(find_template(&search_path, "templates"), None);
	}

	#[rstest]
	fn test_display_lists_directories() {
		let search_path = SearchPath::new([PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("/a")]);

		assert_eq!(search_path.to_string(), "['/a', '/b']");
	}
}
