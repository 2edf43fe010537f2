//! Small shared helpers: case-insensitive name comparison.
//!
//! Class, variable, function and constant names compare case-insensitively
//! throughout, implemented with plain folded string keys rather than
//! runtime reflection: every map keyed by a language-level name (instance
//! fields, functions, constants, classes) stores `fold_name(name)` as the
//! key and keeps the original spelling alongside when it needs to be shown
//! back to the host.

/// Folds a name to the canonical form used for case-insensitive comparison
/// and hashing.
pub fn fold_name(name: &str) -> String {
    name.to_lowercase()
}
