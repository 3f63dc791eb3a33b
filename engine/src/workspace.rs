//! Filesystem collaborator: the project tree the editor opens files from.
//!
//! All paths handed to a [`Workspace`] are relative to its root. They are
//! resolved lexically first (no `..`, no absolute paths) and then checked
//! against the canonical root, so symlinks cannot lead outside it either.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::Local;
use onpoint_utils::{atomic_write, recover_bak_file};
use thiserror::Error;

/// Directory under the root holding previous file versions.
pub const VERSIONS_DIR: &str = ".onpoint_versions";

const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const STAMP_LEN: usize = 14;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("path `{0}` is outside the workspace")]
    OutsideRoot(String),
    #[error("`{0}` not found in the workspace")]
    NotFound(String),
    #[error("no version `{version}` of `{path}`")]
    VersionNotFound { path: String, version: String },
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl WorkspaceError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub name: String,
    pub kind: NodeKind,
    /// Empty for files.
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    fn order(a: &Self, b: &Self) -> Ordering {
        let rank = |node: &Self| u8::from(node.kind == NodeKind::File);
        rank(a).cmp(&rank(b)).then_with(|| a.name.cmp(&b.name))
    }
}

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    keep_versions: bool,
}

impl Workspace {
    /// Open the directory at `root`. Versioning is on by default.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let root = root.as_ref();
        let root = fs::canonicalize(root).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => WorkspaceError::NotFound(root.display().to_string()),
            _ => WorkspaceError::io(root, e),
        })?;
        if !root.is_dir() {
            return Err(WorkspaceError::NotFound(root.display().to_string()));
        }
        tracing::info!(root = %root.display(), "Workspace opened");
        Ok(Self {
            root,
            keep_versions: true,
        })
    }

    #[must_use]
    pub fn with_versions(mut self, keep_versions: bool) -> Self {
        self.keep_versions = keep_versions;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn keeps_versions(&self) -> bool {
        self.keep_versions
    }

    /// Resolve `rel` to an absolute path inside the root.
    ///
    /// The target need not exist; its deepest existing ancestor is
    /// canonicalized and must lie inside the root. The version store is
    /// reachable only through [`Self::versions`] and [`Self::restore`].
    pub fn resolve(&self, rel: &str) -> Result<PathBuf, WorkspaceError> {
        let input = Path::new(rel);
        if input
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(WorkspaceError::OutsideRoot(rel.to_string()));
        }
        if input
            .components()
            .find(|c| *c != Component::CurDir)
            .is_some_and(|c| c.as_os_str() == VERSIONS_DIR)
        {
            return Err(WorkspaceError::OutsideRoot(rel.to_string()));
        }

        let joined = self.root.join(input);
        let mut existing = joined.as_path();
        while !existing.exists() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => return Err(WorkspaceError::OutsideRoot(rel.to_string())),
            }
        }
        let canonical = fs::canonicalize(existing).map_err(|e| WorkspaceError::io(existing, e))?;
        if !canonical.starts_with(&self.root) {
            tracing::warn!(path = rel, resolved = %canonical.display(), "Path escapes workspace");
            return Err(WorkspaceError::OutsideRoot(rel.to_string()));
        }
        Ok(joined)
    }

    /// Recursive listing of the whole root, directories first.
    pub fn tree(&self) -> Result<Vec<TreeNode>, WorkspaceError> {
        read_tree(&self.root)
    }

    /// Read `rel`, first restoring it from a `.bak` left by an interrupted save.
    pub fn read(&self, rel: &str) -> Result<String, WorkspaceError> {
        let path = self.resolve(rel)?;
        recover_bak_file(&path);
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => WorkspaceError::NotFound(rel.to_string()),
            _ => WorkspaceError::io(&path, e),
        })
    }

    /// Persist `text` at `rel`, snapshotting the previous content first when
    /// versioning is on.
    pub fn write(&self, rel: &str, text: &str) -> Result<(), WorkspaceError> {
        let path = self.resolve(rel)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| WorkspaceError::io(parent, e))?;
        }

        if self.keep_versions && path.is_file() {
            self.snapshot(rel, &path)?;
        }

        atomic_write(&path, text.as_bytes()).map_err(|e| WorkspaceError::io(&path, e))?;
        tracing::info!(path = rel, bytes = text.len(), "File saved");
        Ok(())
    }

    /// Version ids of `rel`, newest first.
    pub fn versions(&self, rel: &str) -> Result<Vec<String>, WorkspaceError> {
        let (dir, prefix) = self.version_location(rel)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WorkspaceError::io(&dir, e)),
        };

        let mut versions: Vec<(String, u32)> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let id = name.strip_prefix(&prefix)?;
                let counter = parse_version_id(id)?;
                Some((id.to_string(), counter))
            })
            .collect();
        versions.sort_by(|a, b| b.0[..STAMP_LEN].cmp(&a.0[..STAMP_LEN]).then(b.1.cmp(&a.1)));
        Ok(versions.into_iter().map(|(id, _)| id).collect())
    }

    /// Bring back `version` of `rel`. The current content is itself
    /// snapshotted, so a restore can be undone.
    pub fn restore(&self, rel: &str, version: &str) -> Result<String, WorkspaceError> {
        if parse_version_id(version).is_none() {
            return Err(WorkspaceError::VersionNotFound {
                path: rel.to_string(),
                version: version.to_string(),
            });
        }
        let (dir, prefix) = self.version_location(rel)?;
        let snapshot = dir.join(format!("{prefix}{version}"));
        let text = fs::read_to_string(&snapshot).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => WorkspaceError::VersionNotFound {
                path: rel.to_string(),
                version: version.to_string(),
            },
            _ => WorkspaceError::io(&snapshot, e),
        })?;
        self.write(rel, &text)?;
        Ok(text)
    }

    /// One-level listing of `rel` for the chat context.
    ///
    /// At most `max_entries` lines are produced; a trailing `...` marks a
    /// truncated listing.
    pub fn listing(&self, rel: &str, max_entries: usize) -> Result<String, WorkspaceError> {
        let dir = self.resolve(rel)?;
        let mut nodes = read_level(&dir)?;
        nodes.sort_by(TreeNode::order);

        let mut lines: Vec<String> = nodes
            .iter()
            .take(max_entries)
            .map(|node| match node.kind {
                NodeKind::Directory => format!("[D] {}/", node.name),
                NodeKind::File => format!("[F] {}", node.name),
            })
            .collect();
        if nodes.len() > max_entries {
            lines.push("...".to_string());
        }
        Ok(lines.join("\n"))
    }

    fn version_location(&self, rel: &str) -> Result<(PathBuf, String), WorkspaceError> {
        let path = self.resolve(rel)?;
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| WorkspaceError::OutsideRoot(rel.to_string()))?;
        let name = relative
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| WorkspaceError::NotFound(rel.to_string()))?;

        let mut dir = self.root.join(VERSIONS_DIR);
        if let Some(parent) = relative.parent() {
            dir.push(parent);
        }
        Ok((dir, format!("{name}.")))
    }

    fn snapshot(&self, rel: &str, path: &Path) -> Result<(), WorkspaceError> {
        let (dir, prefix) = self.version_location(rel)?;
        fs::create_dir_all(&dir).map_err(|e| WorkspaceError::io(&dir, e))?;

        let stamp = Local::now().format(STAMP_FORMAT).to_string();
        let mut target = dir.join(format!("{prefix}{stamp}"));
        let mut counter = 1;
        while target.exists() {
            target = dir.join(format!("{prefix}{stamp}-{counter}"));
            counter += 1;
        }

        fs::copy(path, &target).map_err(|e| WorkspaceError::io(&target, e))?;
        tracing::debug!(path = rel, snapshot = %target.display(), "Version saved");
        Ok(())
    }
}

/// Counter of a version id (`YYYYmmddHHMMSS` or `YYYYmmddHHMMSS-N`), zero
/// when absent.
fn parse_version_id(id: &str) -> Option<u32> {
    let stamp = id.get(..STAMP_LEN)?;
    if !stamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match &id[STAMP_LEN..] {
        "" => Some(0),
        rest => rest.strip_prefix('-')?.parse().ok(),
    }
}

fn read_level(dir: &Path) -> Result<Vec<TreeNode>, WorkspaceError> {
    let entries = fs::read_dir(dir).map_err(|e| WorkspaceError::io(dir, e))?;
    let mut nodes = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| WorkspaceError::io(dir, e))?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name == VERSIONS_DIR {
            continue;
        }
        let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
        nodes.push(TreeNode {
            name,
            kind: if is_dir {
                NodeKind::Directory
            } else {
                NodeKind::File
            },
            children: Vec::new(),
        });
    }
    Ok(nodes)
}

fn read_tree(dir: &Path) -> Result<Vec<TreeNode>, WorkspaceError> {
    let mut nodes = read_level(dir)?;
    for node in &mut nodes {
        if node.kind == NodeKind::Directory {
            node.children = read_tree(&dir.join(&node.name))?;
        }
    }
    nodes.sort_by(TreeNode::order);
    Ok(nodes)
}
