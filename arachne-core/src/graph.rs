use arachne_scanner::EdgeMap;
use serde::Serialize;

/// One identifier in the discovered hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub url: String,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn leaf(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(TreeNode::node_count).sum::<usize>()
    }
}

/// Builds the tree rooted at `root` from recorded edge sets.
///
/// Backlinks become leaves and only new children are expanded. A child is
/// new to its parent only if it was unclaimed when the parent finished, so
/// following new edges always moves forward in claim order and the walk
/// cannot loop. Children are sorted by identifier.
pub fn build_tree(root: &str, edges: &EdgeMap) -> TreeNode {
    let Some(partition) = edges.get(root) else {
        return TreeNode::leaf(root);
    };

    let mut children: Vec<TreeNode> = partition
        .backlinks
        .iter()
        .map(TreeNode::leaf)
        .chain(partition.new.iter().map(|child| build_tree(child, edges)))
        .collect();
    children.sort_by(|a, b| a.url.cmp(&b.url));

    TreeNode {
        url: root.to_string(),
        children,
    }
}
