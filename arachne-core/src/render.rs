use crate::graph::TreeNode;

const BRANCH: &str = "├───";
const LAST_BRANCH: &str = "└───";
const CONTINUATION: &str = "│\t";
const BLANK: &str = "\t";

/// Renders `tree` as an indented box-drawing outline, one line per node.
///
/// The root is drawn as the last (only) entry of the top level.
pub fn render_tree(tree: &TreeNode) -> String {
    let mut output = String::new();
    render_siblings(std::slice::from_ref(tree), "", &mut output);
    output
}

fn render_siblings(nodes: &[TreeNode], indent: &str, output: &mut String) {
    for (i, node) in nodes.iter().enumerate() {
        let is_last = i == nodes.len() - 1;
        let (prefix, extension) = if is_last {
            (LAST_BRANCH, BLANK)
        } else {
            (BRANCH, CONTINUATION)
        };

        output.push_str(indent);
        output.push_str(prefix);
        output.push_str(&node.url);
        output.push('\n');

        let child_indent = format!("{}{}", indent, extension);
        render_siblings(&node.children, &child_indent, output);
    }
}
