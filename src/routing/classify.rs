//! File naming conventions.
//!
//! # Responsibilities
//! - Decide what a directory entry means from its name alone
//!
//! # Design Decisions
//! - Skip markers win over everything, including directories
//! - Only recognized module extensions are stripped; `get.yaml` is not `GET`
//! - Setting stems match case-sensitively, method stems case-insensitively

use crate::routing::method::HttpMethod;

/// What a directory entry turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// A sub-directory: a nested route prefix.
    Directory,
    /// The directory's setting file.
    Setting,
    /// A route file for the given method.
    Handler(HttpMethod),
    /// Ignored entirely.
    Skip,
    /// A file whose uppercased stem is not a supported method.
    Unsupported(String),
}

/// Naming conventions for a route tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conventions {
    /// Substring that excludes an entry, e.g. `.skip.`.
    pub skip_marker: String,
    /// Stem of setting files, e.g. `setting`.
    pub setting_stem: String,
    /// Module extensions without the dot, e.g. `toml`.
    pub extensions: Vec<String>,
}

impl Default for Conventions {
    fn default() -> Self {
        Self {
            skip_marker: ".skip.".to_string(),
            setting_stem: "setting".to_string(),
            extensions: vec!["toml".to_string(), "json".to_string()],
        }
    }
}

impl Conventions {
    pub fn classify(&self, name: &str, is_dir: bool) -> EntryKind {
        if name.contains(&self.skip_marker) {
            return EntryKind::Skip;
        }
        if is_dir {
            return EntryKind::Directory;
        }
        match self.strip_extension(name) {
            Some(stem) if stem == self.setting_stem => EntryKind::Setting,
            Some(stem) => {
                let method = stem.to_uppercase();
                match method.parse::<HttpMethod>() {
                    Ok(method) => EntryKind::Handler(method),
                    Err(_) => EntryKind::Unsupported(method),
                }
            }
            None => EntryKind::Unsupported(name.to_uppercase()),
        }
    }

    /// The name without a recognized module extension, if it has one.
    pub fn strip_extension<'a>(&self, name: &'a str) -> Option<&'a str> {
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        self.extensions.iter().any(|e| e == ext).then_some(stem)
    }
}
