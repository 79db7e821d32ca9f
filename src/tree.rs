use indextree::{Arena, NodeId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::node::TreemapNode;

/// One file system entry while a scan is being assembled
#[derive(Debug, Clone)]
struct Entry {
    path: PathBuf,
    name: String,
    /// Own size as reported by metadata
    size: u64,
    is_dir: bool,
    /// Own size plus everything below, filled by `calculate_sizes`
    total: u64,
}

impl Entry {
    fn new(path: PathBuf, size: u64, is_dir: bool) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            path,
            name,
            size,
            is_dir,
            total: size,
        }
    }
}

/// Arena-backed builder that turns flat scanner records into a tree
pub struct FileTree {
    arena: Arena<Entry>,
    root: NodeId,
    index: HashMap<PathBuf, NodeId>,
}

impl FileTree {
    /// Create a tree holding only its root. The root counts as a directory
    /// until a record for the root path itself says otherwise.
    pub fn new<P: AsRef<Path>>(root_path: P) -> Self {
        let path = root_path.as_ref().to_path_buf();
        let mut arena = Arena::new();
        let root = arena.new_node(Entry::new(path.clone(), 0, true));
        Self {
            arena,
            root,
            index: HashMap::from([(path, root)]),
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.arena[self.root].get().path
    }

    /// Insert or update a record. Missing ancestors between the root and
    /// `path` are created as directories; paths outside the root are ignored.
    pub fn upsert_node(&mut self, path: PathBuf, size: u64, is_dir: bool) {
        if let Some(&id) = self.index.get(&path) {
            let entry = self.arena[id].get_mut();
            entry.size = size;
            entry.is_dir = is_dir;
            return;
        }

        if !path.starts_with(self.root_path()) {
            tracing::trace!("Ignoring {} outside scan root", path.display());
            return;
        }

        let Some(parent) = path.parent().and_then(|p| self.ensure_dir(p)) else {
            return;
        };
        let id = self.arena.new_node(Entry::new(path.clone(), size, is_dir));
        parent.append(id, &mut self.arena);
        self.index.insert(path, id);
    }

    fn ensure_dir(&mut self, path: &Path) -> Option<NodeId> {
        if !self.index.contains_key(path) {
            if !path.starts_with(self.root_path()) {
                return None;
            }
            self.upsert_node(path.to_path_buf(), 0, true);
        }
        self.index.get(path).copied()
    }

    /// Fill in cumulative sizes. Directories sum their children, files keep
    /// their own size.
    pub fn calculate_sizes(&mut self) {
        // Reverse pre-order visits every child before its parent
        let order: Vec<NodeId> = self.root.descendants(&self.arena).collect();
        for &id in order.iter().rev() {
            let children_total = id
                .children(&self.arena)
                .map(|child| self.arena[child].get().total)
                .fold(0u64, u64::saturating_add);
            let entry = self.arena[id].get_mut();
            entry.total = if entry.is_dir {
                children_total
            } else {
                entry.size.saturating_add(children_total)
            };
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True while nothing but the root has been inserted.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.index.contains_key(path)
    }

    pub fn total_size(&self) -> u64 {
        self.arena[self.root].get().total
    }

    /// Number of non-directory entries
    pub fn file_count(&self) -> u64 {
        self.root
            .descendants(&self.arena)
            .filter(|&id| !self.arena[id].get().is_dir)
            .count() as u64
    }

    /// Freeze into the immutable snapshot consumed by the layout engine.
    /// Call [`FileTree::calculate_sizes`] first.
    pub fn to_treemap_node(&self) -> TreemapNode {
        self.convert(self.root)
    }

    fn convert(&self, id: NodeId) -> TreemapNode {
        let entry = self.arena[id].get();
        TreemapNode {
            name: entry.name.clone(),
            path: entry.path.display().to_string(),
            size: entry.total as f64,
            is_dir: entry.is_dir,
            children: id
                .children(&self.arena)
                .map(|child| self.convert(child))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn built(records: &[(&str, u64, bool)]) -> FileTree {
        let mut tree = FileTree::new("/scan");
        for &(path, size, is_dir) in records {
            tree.upsert_node(PathBuf::from(path), size, is_dir);
        }
        tree.calculate_sizes();
        tree
    }

    #[test]
    fn test_directory_sizes_sum_files() {
        let tree = built(&[
            ("/scan/file1.txt", 100, false),
            ("/scan/dir1", 4096, true),
            ("/scan/dir1/file2.txt", 200, false),
        ]);

        assert_eq!(tree.total_size(), 300);
        assert_eq!(tree.file_count(), 2);
    }

    #[test]
    fn test_children_before_parents() {
        let tree = built(&[("/scan/a/b/deep.bin", 50, false), ("/scan/a", 4096, true)]);

        assert!(tree.contains(Path::new("/scan/a/b")));
        assert_eq!(tree.total_size(), 50);
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_outside_root_is_ignored() {
        let tree = built(&[("/elsewhere/x", 10, false)]);
        assert!(tree.is_empty());
        assert_eq!(tree.total_size(), 0);
    }

    #[test]
    fn test_file_root_becomes_leaf() {
        let mut tree = FileTree::new("/data/one.bin");
        tree.upsert_node(PathBuf::from("/data/one.bin"), 1234, false);
        tree.calculate_sizes();

        assert_eq!(tree.total_size(), 1234);
        assert_eq!(tree.file_count(), 1);
        let root = tree.to_treemap_node();
        assert!(!root.is_dir);
        assert_eq!(root.size, 1234.0);
    }

    #[test]
    fn test_to_treemap_node() {
        let tree = built(&[
            ("/scan/dir1/file2.txt", 200, false),
            ("/scan/file1.txt", 100, false),
        ]);

        let root = tree.to_treemap_node();
        assert_eq!(root.name, "scan");
        assert!(root.is_dir);
        assert_eq!(root.size, 300.0);
        assert_eq!(root.children.len(), 2);

        let dir1 = root.find("/scan/dir1").unwrap();
        assert!(dir1.is_dir);
        assert_eq!(dir1.size, 200.0);
        assert_eq!(dir1.children[0].name, "file2.txt");
    }
}
