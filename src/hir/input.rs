//! Paths of the files a scope model knows about.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::base::FileId;

/// Maps every [`FileId`] a snapshot mentions to its path.
///
/// Declarations only carry a `FileId`; anything shown to a user (alternative
/// labels, diagnostics) goes through here.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceRoot {
    files: IndexMap<FileId, Arc<str>>,
}

impl SourceRoot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file: FileId, path: impl Into<Arc<str>>) {
        self.files.insert(file, path.into());
    }

    pub fn remove(&mut self, file: FileId) -> Option<Arc<str>> {
        self.files.swap_remove(&file)
    }

    pub fn path(&self, file: FileId) -> Option<&str> {
        self.files.get(&file).map(|s| s.as_ref())
    }

    /// The last path component, used in user-facing labels.
    pub fn display_name(&self, file: FileId) -> Option<&str> {
        self.path(file)
            .map(|path| path.rsplit(['/', '\\']).next().unwrap_or(path))
    }

    pub fn contains(&self, file: FileId) -> bool {
        self.files.contains_key(&file)
    }

    /// Files whose path ends with `suffix` on a path-component boundary.
    pub fn files_ending_with<'a>(&'a self, suffix: &'a str) -> impl Iterator<Item = FileId> + 'a {
        let mut suffix = suffix;
        while let Some(rest) = suffix
            .strip_prefix("./")
            .or_else(|| suffix.strip_prefix("../"))
            .or_else(|| suffix.strip_prefix('/'))
        {
            suffix = rest;
        }
        self.files.iter().filter_map(move |(&id, path)| {
            let matches = !suffix.is_empty()
                && path.ends_with(suffix)
                && (path.len() == suffix.len()
                    || path[..path.len() - suffix.len()].ends_with(['/', '\\']));
            matches.then_some(id)
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileId, &str)> + '_ {
        self.files.iter().map(|(&id, path)| (id, path.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_root_display_name() {
        let mut root = SourceRoot::new();
        root.insert(FileId::new(0), "/project/src/Model/User.php");
        root.insert(FileId::new(1), "C:\\www\\index.php");

        assert_eq!(root.display_name(FileId::new(0)), Some("User.php"));
        assert_eq!(root.display_name(FileId::new(1)), Some("index.php"));
        assert_eq!(root.display_name(FileId::new(9)), None);
    }

    #[test]
    fn test_files_ending_with_respects_components() {
        let mut root = SourceRoot::new();
        root.insert(FileId::new(0), "/p/lib/a.php");
        root.insert(FileId::new(1), "/p/lib/data.php");
        root.insert(FileId::new(2), "/p/other/a.php");

        let hits: Vec<_> = root.files_ending_with("lib/a.php").collect();
        assert_eq!(hits, vec![FileId::new(0)]);

        let hits: Vec<_> = root.files_ending_with("./a.php").collect();
        assert_eq!(hits, vec![FileId::new(0), FileId::new(2)]);

        let hits: Vec<_> = root.files_ending_with("/data.php").collect();
        assert_eq!(hits, vec![FileId::new(1)]);
    }

    #[test]
    fn test_source_root_remove() {
        let mut root = SourceRoot::new();
        let file = FileId::new(0);
        root.insert(file, "/a.php");
        assert!(root.contains(file));
        root.remove(file);
        assert!(!root.contains(file));
        assert!(root.is_empty());
    }
}
