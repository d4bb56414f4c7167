//! Presentation of copied syntax trees.
//!
//! The engine links the arguments of a statement, and the statements of a block, through
//! `next`. [`group_next_nodes`] regroups every such chain under the node that owns it:
//! a node collects the tail of its `left` chain, then the tail of its `right` chain, and
//! the root also collects the top-level statements that follow it.

use std::fmt::Write;

use csound_api::{SyntaxNode, Token};
use serde::Serialize;

/// A node shaped for display. Keys serialize in sorted order with `left`, `right` and
/// `nextNodes` last; `next` links are never emitted.
#[derive(Debug, Serialize)]
pub struct PresentedNode<'a> {
    pub len: i32,
    pub line: i32,
    pub locn: u64,
    pub rate: i32,
    #[serde(rename = "type")]
    pub kind: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<PresentedToken<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<Box<PresentedNode<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<Box<PresentedNode<'a>>>,
    #[serde(rename = "nextNodes", skip_serializing_if = "Vec::is_empty")]
    pub next_nodes: Vec<PresentedNode<'a>>,
}

#[derive(Debug, Serialize)]
pub struct PresentedToken<'a> {
    pub fvalue: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexeme: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optype: Option<&'a str>,
    #[serde(rename = "type")]
    pub kind: i32,
    pub value: i32,
}

pub fn group_next_nodes(root: &SyntaxNode) -> PresentedNode<'_> {
    let mut presented = present(root);
    presented.next_nodes.extend(root.siblings().skip(1).map(present));
    presented
}

fn present(node: &SyntaxNode) -> PresentedNode<'_> {
    let mut next_nodes = Vec::new();
    for child in [node.left.as_deref(), node.right.as_deref()].into_iter().flatten() {
        next_nodes.extend(child.siblings().skip(1).map(present));
    }
    PresentedNode {
        len: node.len,
        line: node.line,
        locn: node.locn,
        rate: node.rate,
        kind: node.kind,
        value: node.value.as_ref().map(present_token),
        left: node.left.as_deref().map(|left| Box::new(present(left))),
        right: node.right.as_deref().map(|right| Box::new(present(right))),
        next_nodes,
    }
}

fn present_token(token: &Token) -> PresentedToken<'_> {
    PresentedToken {
        fvalue: token.fvalue,
        lexeme: token.lexeme.as_deref(),
        optype: token.optype.as_deref(),
        kind: token.kind,
        value: token.value,
    }
}

/// Indented outline: one line per node, statement chains at their owner's depth + 1.
pub fn outline(root: &SyntaxNode) -> String {
    let mut text = String::new();
    for node in root.siblings() {
        write_node(&mut text, node, 0);
    }
    text
}

fn write_node(text: &mut String, node: &SyntaxNode, depth: usize) {
    let label = node.lexeme().map_or_else(|| format!("<{}>", node.kind), str::to_string);
    // Writing to a String cannot fail.
    let indent = depth * 2;
    let _ = writeln!(text, "{:indent$}{} (type {}, line {})", "", label, node.kind, node.line);
    for child in [node.left.as_deref(), node.right.as_deref()].into_iter().flatten() {
        for sibling in child.siblings() {
            write_node(text, sibling, depth + 1);
        }
    }
}
