use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

/// One entry of a directory listing.
///
/// Trees are rebuilt on every listing and replaced wholesale; nothing mutates a
/// node after it has been produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileNode>>,
}

impl FileNode {
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Depth-first walk yielding every file path in display order.
    #[must_use]
    pub fn file_paths(nodes: &[FileNode]) -> Vec<String> {
        let mut out = Vec::new();
        for node in nodes {
            match (&node.kind, &node.children) {
                (NodeKind::File, _) => out.push(node.path.clone()),
                (NodeKind::Directory, Some(children)) => out.extend(Self::file_paths(children)),
                (NodeKind::Directory, None) => {}
            }
        }
        out
    }
}
