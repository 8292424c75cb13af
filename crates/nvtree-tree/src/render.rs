use std::fmt::Write;

use nvtree_types::{ItemKind, Value};

use crate::node::NodeId;
use crate::tree::Tree;

/// Iterator over the direct children of a group.
pub struct Children<'a> {
    tree: &'a Tree,
    next: Option<NodeId>,
}

impl<'a> Children<'a> {
    pub(crate) fn new(tree: &'a Tree, first: Option<NodeId>) -> Self {
        Self { tree, next: first }
    }
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.tree.get(id).and_then(|item| item.next);
        Some(id)
    }
}

/// Depth-first, pre-order walk yielding `(depth, id)`.
///
/// This is the order items appear in a packed image.
pub struct Walk<'a> {
    tree: &'a Tree,
    stack: Vec<(usize, NodeId)>,
}

impl<'a> Walk<'a> {
    pub(crate) fn new(tree: &'a Tree, from: NodeId) -> Self {
        let mut walk = Self {
            tree,
            stack: Vec::new(),
        };
        walk.push_children(0, from);
        walk
    }

    fn push_children(&mut self, depth: usize, parent: NodeId) {
        let start = self.stack.len();
        self.stack
            .extend(self.tree.children(parent).map(|id| (depth, id)));
        self.stack[start..].reverse();
    }
}

impl Iterator for Walk<'_> {
    type Item = (usize, NodeId);

    fn next(&mut self) -> Option<(usize, NodeId)> {
        let (depth, id) = self.stack.pop()?;
        if self.tree.get(id).is_some_and(|item| item.is_group()) {
            self.push_children(depth + 1, id);
        }
        Some((depth, id))
    }
}

impl Tree {
    /// Human-readable listing of `from` and everything below it.
    pub fn render(&self, from: NodeId) -> String {
        let mut out = String::new();
        let Some(top) = self.get(from) else {
            return out;
        };
        if from == self.root() {
            let _ = writeln!(out, "Total length ({})", self.total_len());
        } else {
            let _ = writeln!(out, "{} ({})", top.name(), top.len());
        }
        let base = usize::from(from != self.root());
        for (depth, id) in self.walk(from) {
            let Some(item) = self.get(id) else { continue };
            let indent = "  ".repeat(depth + base);
            let _ = match (item.kind(), item.value()) {
                (ItemKind::Group, _) => writeln!(out, "{indent}{} ({})", item.name(), item.len()),
                (ItemKind::Text(len), Some(Value::Text(text))) => {
                    writeln!(out, "{indent}{} (STR,{len}) {:.<8} {text}", item.name(), "")
                }
                (kind, Some(value)) => {
                    writeln!(out, "{indent}{} ({}) {:.<8} {value}", item.name(), kind.label(), "")
                }
                (_, None) => Ok(()),
            };
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use nvtree_types::FormatVersion;

    use super::*;

    fn sample() -> (Tree, NodeId) {
        let mut t = Tree::new(FormatVersion::Compat, 1024);
        let net = t.add(t.root(), "net", ItemKind::Group).unwrap();
        let name = t.add(net, "name", ItemKind::Text(5)).unwrap();
        t.fill(name, b"eth0").unwrap();
        let mtu = t.add(net, "mtu", ItemKind::Fixed(2)).unwrap();
        t.fill(mtu, &1500u16.to_be_bytes()).unwrap();
        t.add(t.root(), "flags", ItemKind::Fixed(1)).unwrap();
        (t, net)
    }

    #[test]
    fn walk_is_preorder() {
        let (t, _) = sample();
        let names: Vec<(usize, String)> = t
            .walk(t.root())
            .map(|(d, id)| (d, t.item(id).unwrap().name().to_string()))
            .collect();
        assert_eq!(
            names,
            vec![
                (0, "net".to_string()),
                (1, "name".to_string()),
                (1, "mtu".to_string()),
                (0, "flags".to_string()),
            ]
        );
    }

    #[test]
    fn render_lists_values() {
        let (t, net) = sample();
        let out = t.render(t.root());
        assert!(out.starts_with(&format!("Total length ({})", t.total_len())));
        assert!(out.contains("  name (STR,5) ........ eth0"));
        assert!(out.contains("mtu (UINT16)"));
        assert!(out.contains("1500 (0x05dc)"));

        let sub = t.render(net);
        assert!(sub.starts_with("net ("));
        assert!(!sub.contains("flags"));
    }
}
