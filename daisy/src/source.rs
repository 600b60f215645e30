//! Loaded source files and the path resolver that feeds them.

use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::location::TextRange;

/// Handle of a loaded [`SourceFile`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u32);

impl FileId {
    /// Raw table index
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Resolves a path to file contents, or `None` if the file cannot be read.
///
/// The default resolver reads from disk; tests and embedders can substitute
/// an in-memory one.
pub type FileResolver = Rc<dyn Fn(&Path) -> Option<String>>;

/// A loaded file with its line index
#[derive(Debug)]
pub struct SourceFile {
    name: String,
    path: PathBuf,
    text: Rc<str>,
    line_starts: Vec<usize>,
    pub(crate) once: bool,
}

impl SourceFile {
    fn new(name: String, path: PathBuf, text: String) -> Self {
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            name,
            path,
            text: Rc::from(text),
            line_starts,
            once: false,
        }
    }

    /// The name the file was requested under
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The normalized lookup path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A fresh range over the whole content
    #[must_use]
    pub fn text(&self) -> TextRange {
        TextRange::new(Rc::clone(&self.text))
    }

    /// Number of lines, counting a trailing partial line
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// The text of a 1-based line without its terminator
    #[must_use]
    pub fn line(&self, line: u32) -> Option<&str> {
        let index = usize::try_from(line).ok()?.checked_sub(1)?;
        let start = *self.line_starts.get(index)?;
        let end = self
            .line_starts
            .get(index + 1)
            .map_or(self.text.len(), |next| next - 1);
        self.text.get(start..end)
    }

    /// Whether `#pragma once` has been seen in this file
    #[must_use]
    pub const fn is_once(&self) -> bool {
        self.once
    }
}

/// All files loaded by one compilation unit
pub struct SourceFiles {
    files: Vec<SourceFile>,
    by_path: FxHashMap<PathBuf, FileId>,
    resolver: FileResolver,
}

impl SourceFiles {
    /// Create an empty table using `resolver`, or the filesystem if `None`
    #[must_use]
    pub fn new(resolver: Option<FileResolver>) -> Self {
        Self {
            files: Vec::new(),
            by_path: FxHashMap::default(),
            resolver: resolver.unwrap_or_else(|| Rc::new(read_from_disk)),
        }
    }

    /// Load a file, reusing an earlier load of the same normalized path
    pub fn load(&mut self, name: &str, path: &Path) -> Option<FileId> {
        let path = normalize_path(path);
        if let Some(&id) = self.by_path.get(&path) {
            return Some(id);
        }
        let text = (self.resolver)(&path)?;
        log::debug!("loaded `{}` ({} bytes)", path.display(), text.len());
        Some(self.insert(name.to_owned(), path, text))
    }

    /// Register text that does not come from the resolver
    pub fn add_virtual(&mut self, name: &str, text: &str) -> FileId {
        let path = normalize_path(Path::new(name));
        self.insert(name.to_owned(), path, text.to_owned())
    }

    fn insert(&mut self, name: String, path: PathBuf, text: String) -> FileId {
        let id = FileId(u32::try_from(self.files.len()).unwrap_or(u32::MAX));
        self.by_path.insert(path.clone(), id);
        self.files.push(SourceFile::new(name, path, text));
        id
    }

    /// Look up a loaded file
    ///
    /// # Panics
    /// Panics if `id` was not produced by this table.
    #[must_use]
    pub fn get(&self, id: FileId) -> &SourceFile {
        &self.files[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: FileId) -> &mut SourceFile {
        &mut self.files[id.index()]
    }

    /// Number of loaded files
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether nothing has been loaded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn read_from_disk(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Lexically normalize a path: drop `.` components and fold `..` where possible
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_index_returns_lines_without_terminator() {
        let mut files = SourceFiles::new(Some(Rc::new(|_: &Path| None)));
        let id = files.add_virtual("main.dsy", "let a;\nlet b;\n\nend");
        let file = files.get(id);
        assert_eq!(file.line_count(), 4);
        assert_eq!(file.line(1), Some("let a;"));
        assert_eq!(file.line(3), Some(""));
        assert_eq!(file.line(4), Some("end"));
        assert_eq!(file.line(5), None);
        assert_eq!(file.line(0), None);
    }

    #[test]
    fn load_reuses_normalized_path() {
        let resolver: FileResolver = Rc::new(|path: &Path| {
            (path == Path::new("inc/defs.dsy")).then(|| "#define X 1\n".to_owned())
        });
        let mut files = SourceFiles::new(Some(resolver));
        let first = files.load("defs.dsy", Path::new("inc/./defs.dsy"));
        let second = files.load("defs.dsy", Path::new("inc/sub/../defs.dsy"));
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(files.len(), 1);
        assert!(files.load("missing.dsy", Path::new("missing.dsy")).is_none());
    }

    #[test]
    fn normalize_keeps_leading_parent_components() {
        assert_eq!(normalize_path(Path::new("../a/./b/../c")), PathBuf::from("../a/c"));
    }
}
