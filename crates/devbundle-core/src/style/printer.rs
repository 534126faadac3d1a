//! Serializer for the style syntax tree.

use super::ast::{Node, Stylesheet};

/// Print a style sheet back to text.
#[must_use]
pub fn print(sheet: &Stylesheet) -> String {
    let mut out = String::new();
    print_nodes(&sheet.nodes, &mut out);
    out.push_str(&sheet.raws.after);
    out
}

fn print_nodes(nodes: &[Node], out: &mut String) {
    for (i, node) in nodes.iter().enumerate() {
        print_node(node, out);
        let statement = match node {
            Node::Declaration(_) => true,
            Node::AtRule(at) => at.nodes.is_none(),
            Node::Rule(_) | Node::Comment(_) => false,
        };
        // A statement that gained a following sibling must be terminated.
        let followed = nodes[i + 1..].iter().any(|n| !matches!(n, Node::Comment(_)));
        if statement && (node.raws().semicolon || followed) {
            out.push(';');
        }
    }
}

fn print_node(node: &Node, out: &mut String) {
    out.push_str(&node.raws().before);
    match node {
        Node::Comment(comment) => {
            if comment.inline {
                out.push_str("//");
                out.push_str(&comment.text);
            } else {
                out.push_str("/*");
                out.push_str(&comment.text);
                out.push_str("*/");
            }
        }
        Node::Declaration(decl) => {
            out.push_str(&decl.prop);
            if decl.raws.between.is_empty() {
                out.push_str(": ");
            } else {
                out.push_str(&decl.raws.between);
            }
            out.push_str(&decl.value);
            out.push_str(&decl.raws.after);
        }
        Node::Rule(rule) => {
            out.push_str(&rule.selector);
            out.push_str(&rule.raws.between);
            out.push('{');
            print_nodes(&rule.nodes, out);
            out.push_str(&rule.raws.after);
            out.push('}');
        }
        Node::AtRule(at) => {
            out.push('@');
            out.push_str(&at.name);
            if at.raws.after_name.is_empty() && !at.params.is_empty() {
                out.push(' ');
            } else {
                out.push_str(&at.raws.after_name);
            }
            out.push_str(&at.params);
            out.push_str(&at.raws.between);
            if let Some(children) = &at.nodes {
                out.push('{');
                print_nodes(children, out);
                out.push_str(&at.raws.after);
                out.push('}');
            }
        }
    }
}
