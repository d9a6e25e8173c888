//! URL handling module
//!
//! Link resolution against a page's base URL, path-shape helpers used by the
//! extractor, and the mapping from version URLs to local download directories.

mod paths;
mod resolve;

pub use paths::{path_segments, sanitize_file_name, version_directory};
pub use resolve::{href_path, resolve_link};
