//! Lazily expanded, path-indexed cache of the remote file tree.
//!
//! The tree is persistent: every node lives behind an `Arc`, and an update
//! rebuilds only the nodes on the path from the root to the target while every
//! untouched subtree is shared by reference. Holders of an older root keep a
//! consistent snapshot, and no node is ever mutated after construction.
//!
//! Fetching and applying are separate steps. [`TreeCache::expand`] returns the
//! children without touching the cache so the caller can show a loading marker
//! around the fetch; [`TreeCache::apply_children`] (or
//! [`TreeCache::settle_expansion`]) installs the result afterwards.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::RemoteError;
use crate::locator::RepoRef;
use crate::remote::{EntryKind, RemoteEntry, RepoReader};

/// An immutable, shareable sequence of sibling nodes.
pub type Nodes = Arc<[Arc<TreeNode>]>;

/// Extensions (lower-case, without the dot) of documents shown in the tree.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["md", "markdown"];

/// One file or directory in the remote tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub name: String,
    /// Slash-separated path from the repository root; unique within the tree.
    pub path: String,
    pub kind: EntryKind,
    pub revision: String,
    pub size: Option<u64>,
    /// `None` until the directory has been expanded. `Some` of an empty
    /// sequence means "fetched, nothing to show". Always `None` for files.
    pub children: Option<Nodes>,
}

impl TreeNode {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_expanded(&self) -> bool {
        self.children.is_some()
    }
}

impl From<RemoteEntry> for TreeNode {
    fn from(entry: RemoteEntry) -> Self {
        Self {
            name: entry.name,
            path: entry.path,
            kind: entry.kind,
            revision: entry.revision,
            size: entry.size,
            children: None,
        }
    }
}

/// Returns an empty sibling sequence.
pub fn empty_nodes() -> Nodes {
    Arc::from(Vec::<Arc<TreeNode>>::new())
}

/// `true` when a file name carries a markdown-family extension (any case).
pub fn is_document_name(name: &str) -> bool {
    name.rsplit_once('.')
        .is_some_and(|(_, ext)| DOCUMENT_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Sibling order: directories first, then case-sensitive lexical by name.
pub fn sibling_order(a: &TreeNode, b: &TreeNode) -> Ordering {
    match (a.is_dir(), b.is_dir()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.name.cmp(&b.name),
    }
}

/// Turns one raw directory listing into a filtered, ordered sibling sequence.
///
/// Files without a document extension are dropped; directories are always
/// kept because they may contain documents further down.
pub fn build_level(entries: Vec<RemoteEntry>) -> Nodes {
    let mut nodes: Vec<TreeNode> = entries
        .into_iter()
        .filter(|e| e.kind == EntryKind::Directory || is_document_name(&e.name))
        .map(TreeNode::from)
        .collect();
    nodes.sort_by(sibling_order);
    nodes.into_iter().map(Arc::new).collect()
}

/// Fetches and prepares one directory level. `""` is the repository root.
pub async fn fetch_level(
    reader: &dyn RepoReader,
    repo: &RepoRef,
    path: &str,
) -> Result<Nodes, RemoteError> {
    let entries = reader.list(repo, path).await?;
    tracing::debug!(repo = %repo, path, entries = entries.len(), "listed remote directory");
    Ok(build_level(entries))
}

/// Returns a new tree in which the directory at `path` has `children`.
///
/// Only the nodes from the root down to the target are rebuilt; every other
/// `Arc<TreeNode>` is reused. When no directory with that path exists the
/// input is returned unchanged (same allocation).
pub fn apply_children(nodes: &Nodes, path: &str, children: Nodes) -> Nodes {
    match replace_in(nodes, path, &children) {
        Some(updated) => updated,
        None => Arc::clone(nodes),
    }
}

fn replace_in(nodes: &Nodes, path: &str, children: &Nodes) -> Option<Nodes> {
    // Paths are unique and hierarchical, so at most one sibling can be the
    // target or one of its ancestors. Only that branch is descended.
    let (index, node) = nodes
        .iter()
        .enumerate()
        .find(|(_, n)| n.path == path || is_ancestor(&n.path, path))?;

    let replacement = if node.path == path {
        if !node.is_dir() {
            return None;
        }
        TreeNode { children: Some(Arc::clone(children)), ..TreeNode::clone(node) }
    } else {
        let current = node.children.as_ref()?;
        TreeNode { children: Some(replace_in(current, path, children)?), ..TreeNode::clone(node) }
    };

    let mut updated: Vec<Arc<TreeNode>> = nodes.iter().cloned().collect();
    updated[index] = Arc::new(replacement);
    Some(updated.into())
}

fn is_ancestor(candidate: &str, path: &str) -> bool {
    path.len() > candidate.len()
        && path.starts_with(candidate)
        && path.as_bytes()[candidate.len()] == b'/'
}

fn find_in(nodes: &Nodes, path: &str) -> Option<Arc<TreeNode>> {
    let node = nodes.iter().find(|n| n.path == path || is_ancestor(&n.path, path))?;
    if node.path == path {
        return Some(Arc::clone(node));
    }
    find_in(node.children.as_ref()?, path)
}

/// The in-memory tree for one repository.
#[derive(Debug, Clone)]
pub struct TreeCache {
    repo: Option<RepoRef>,
    roots: Nodes,
    generation: u64,
}

impl Default for TreeCache {
    fn default() -> Self {
        Self { repo: None, roots: empty_nodes(), generation: 0 }
    }
}

impl TreeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn repo(&self) -> Option<&RepoRef> {
        self.repo.as_ref()
    }

    /// The current root sequence. Cloning it is cheap and yields a snapshot
    /// that later updates will not disturb.
    pub fn roots(&self) -> &Nodes {
        &self.roots
    }

    /// Incremented on every repository change. Background results tagged with
    /// an older generation belong to a previous tree and must be dropped.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Forgets the current tree and points the cache at `repo`.
    pub fn reset(&mut self, repo: RepoRef) -> u64 {
        self.repo = Some(repo);
        self.roots = empty_nodes();
        self.generation += 1;
        self.generation
    }

    /// Installs a freshly fetched root level for the current repository.
    pub fn set_roots(&mut self, roots: Nodes) {
        self.roots = roots;
    }

    /// Replaces the whole tree with the top level of `repo`.
    ///
    /// On failure the tree stays empty (pointed at `repo`) and the error is
    /// returned for the caller to present. Nothing is retried.
    pub async fn load_root(
        &mut self,
        reader: &dyn RepoReader,
        repo: RepoRef,
    ) -> Result<Nodes, RemoteError> {
        self.reset(repo.clone());
        let roots = fetch_level(reader, &repo, "").await?;
        self.set_roots(Arc::clone(&roots));
        tracing::info!(repo = %repo, entries = roots.len(), "loaded repository root");
        Ok(roots)
    }

    /// Fetches the children of the directory at `path` without touching the
    /// cache. Pair with [`TreeCache::settle_expansion`].
    pub async fn expand(&self, reader: &dyn RepoReader, path: &str) -> Result<Nodes, RemoteError> {
        let repo = self
            .repo
            .as_ref()
            .ok_or_else(|| RemoteError::transport(None, "no repository is open"))?;
        fetch_level(reader, repo, path).await
    }

    /// Installs `children` under the directory at `path`. A no-op when the
    /// path is not in the tree.
    pub fn apply_children(&mut self, path: &str, children: Nodes) {
        self.roots = apply_children(&self.roots, path, children);
    }

    /// Applies the outcome of an expansion.
    ///
    /// A failure is stored as an empty child sequence so the directory does
    /// not re-fetch in a loop; the error is handed back for display.
    pub fn settle_expansion(
        &mut self,
        path: &str,
        result: Result<Nodes, RemoteError>,
    ) -> Option<RemoteError> {
        match result {
            Ok(children) => {
                self.apply_children(path, children);
                None
            }
            Err(err) => {
                tracing::warn!(path, error = %err, "directory expansion failed; showing it as empty");
                self.apply_children(path, empty_nodes());
                Some(err)
            }
        }
    }

    pub fn find(&self, path: &str) -> Option<Arc<TreeNode>> {
        find_in(&self.roots, path)
    }

    /// `true` for a known directory whose children have not been fetched.
    pub fn needs_fetch(&self, path: &str) -> bool {
        self.find(path).is_some_and(|n| n.is_dir() && !n.is_expanded())
    }
}
