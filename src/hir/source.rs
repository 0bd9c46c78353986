//! Project files and the declarations they export.
//!
//! [`FileSet`] assigns stable ids to paths and keeps the current text of
//! every file. [`ProjectIndex`] holds, per file, the declarations other
//! files can resolve to; a snapshot of one file imports the entries of all
//! the others.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::index::NewDeclaration;
use super::lower::{export_declarations, lower_file};
use crate::base::FileId;
use crate::syntax::{lex, parse};

// ============================================================================
// FILE SET
// ============================================================================

/// Path ↔ [`FileId`] mapping plus file contents.
#[derive(Debug, Default)]
pub struct FileSet {
    inner: RwLock<FileSetInner>,
}

#[derive(Debug, Default)]
struct FileSetInner {
    path_to_id: IndexMap<Arc<str>, FileId>,
    id_to_path: IndexMap<FileId, Arc<str>>,
    contents: IndexMap<FileId, Arc<str>>,
    next_id: u32,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or assign the id of `path`.
    pub fn file_id(&self, path: &str) -> FileId {
        {
            let inner = self.inner.read();
            if let Some(&id) = inner.path_to_id.get(path) {
                return id;
            }
        }

        let mut inner = self.inner.write();
        // another writer may have won the race
        if let Some(&id) = inner.path_to_id.get(path) {
            return id;
        }
        let id = FileId::new(inner.next_id);
        inner.next_id += 1;
        let path: Arc<str> = Arc::from(path);
        inner.path_to_id.insert(path.clone(), id);
        inner.id_to_path.insert(id, path);
        id
    }

    pub fn path(&self, file: FileId) -> Option<Arc<str>> {
        self.inner.read().id_to_path.get(&file).cloned()
    }

    pub fn set_contents(&self, file: FileId, contents: impl Into<Arc<str>>) {
        self.inner.write().contents.insert(file, contents.into());
    }

    pub fn contents(&self, file: FileId) -> Option<Arc<str>> {
        self.inner.read().contents.get(&file).cloned()
    }

    pub fn remove(&self, file: FileId) {
        let mut inner = self.inner.write();
        if let Some(path) = inner.id_to_path.swap_remove(&file) {
            inner.path_to_id.swap_remove(&path);
        }
        inner.contents.swap_remove(&file);
    }

    pub fn len(&self) -> usize {
        self.inner.read().path_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn files(&self) -> Vec<FileId> {
        self.inner.read().id_to_path.keys().copied().collect()
    }
}

// ============================================================================
// PROJECT INDEX
// ============================================================================

/// Declarations one file contributes to the project.
#[derive(Clone, Debug)]
pub struct IndexedFile {
    pub path: Arc<str>,
    /// Fully qualified, without file or scope.
    pub declarations: Arc<[NewDeclaration]>,
}

/// Exported declarations of every project file.
///
/// Cheap to clone: entries are shared, so a snapshot keeps the project
/// state it was built from.
#[derive(Clone, Debug, Default)]
pub struct ProjectIndex {
    files: IndexMap<FileId, IndexedFile>,
}

impl ProjectIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lex, parse and lower `text` on its own and record what it exports.
    pub fn index_file(&mut self, file: FileId, path: impl Into<Arc<str>>, text: &str) {
        let path = path.into();
        let tokens = lex(text);
        let ast = parse(&tokens);
        let model = lower_file(file, path.clone(), &tokens, &ast, &ProjectIndex::new());
        let declarations = export_declarations(&model);
        self.insert(file, path, declarations);
    }

    pub fn insert(&mut self, file: FileId, path: impl Into<Arc<str>>, declarations: Vec<NewDeclaration>) {
        self.files.insert(
            file,
            IndexedFile {
                path: path.into(),
                declarations: declarations.into(),
            },
        );
    }

    pub fn remove(&mut self, file: FileId) -> Option<IndexedFile> {
        self.files.swap_remove(&file)
    }

    pub fn get(&self, file: FileId) -> Option<&IndexedFile> {
        self.files.get(&file)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileId, &IndexedFile)> + '_ {
        self.files.iter().map(|(&id, indexed)| (id, indexed))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
