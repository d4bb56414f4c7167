use std::ptr::NonNull;

use csound_sys::{ORCTOKEN, TREE};
use serde::Serialize;

use super::string_from_ptr;
use crate::registry::InstanceId;

/// Lexical token attached to a syntax node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    #[serde(rename = "type")]
    pub kind: i32,
    pub lexeme: Option<String>,
    pub value: i32,
    pub fvalue: f64,
    pub optype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<Box<Token>>,
}

/// Owned copy of one orchestra syntax tree node.
///
/// The shape is the engine's: `next` links statements at the top level and arguments
/// further down. No regrouping is applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyntaxNode {
    #[serde(rename = "type")]
    pub kind: i32,
    pub value: Option<Token>,
    pub rate: i32,
    pub len: i32,
    pub line: i32,
    pub locn: u64,
    pub left: Option<Box<SyntaxNode>>,
    pub right: Option<Box<SyntaxNode>>,
    pub next: Option<Box<SyntaxNode>>,
}

impl SyntaxNode {
    /// Iterates this node followed by every node reachable through `next`.
    pub fn siblings(&self) -> Siblings<'_> {
        Siblings { cursor: Some(self) }
    }

    pub fn lexeme(&self) -> Option<&str> {
        self.value.as_ref().and_then(|token| token.lexeme.as_deref())
    }
}

// Statement chains can be long; unlink them iteratively.
impl Drop for SyntaxNode {
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(mut node) = next {
            next = node.next.take();
        }
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(mut token) = next {
            next = token.next.take();
        }
    }
}

pub struct Siblings<'a> {
    cursor: Option<&'a SyntaxNode>,
}

impl<'a> Iterator for Siblings<'a> {
    type Item = &'a SyntaxNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.cursor?;
        self.cursor = node.next.as_deref();
        Some(node)
    }
}

/// Deep-copies a native syntax tree.
///
/// `next` chains are walked iteratively, `left`/`right` recursively.
///
/// # Safety
///
/// `root` must be null or point to a well-formed tree that stays alive for the duration
/// of the call.
pub unsafe fn syntax_tree_from_native(root: *const TREE) -> Option<SyntaxNode> {
    let mut chain = Vec::new();
    let mut cursor = root;
    while let Some(node) = cursor.as_ref() {
        chain.push(copy_node(node));
        cursor = node.next;
    }

    let mut linked: Option<Box<SyntaxNode>> = None;
    while let Some(mut node) = chain.pop() {
        node.next = linked;
        linked = Some(Box::new(node));
    }
    linked.map(|node| *node)
}

unsafe fn copy_node(node: &TREE) -> SyntaxNode {
    SyntaxNode {
        kind: node.type_,
        value: token_from_native(node.value),
        rate: node.rate,
        len: node.len,
        line: node.line,
        locn: node.locn,
        left: syntax_tree_from_native(node.left).map(Box::new),
        right: syntax_tree_from_native(node.right).map(Box::new),
        next: None,
    }
}

unsafe fn token_from_native(token: *const ORCTOKEN) -> Option<Token> {
    let mut chain = Vec::new();
    let mut cursor = token;
    while let Some(token) = cursor.as_ref() {
        chain.push(Token {
            kind: token.type_,
            lexeme: string_from_ptr(token.lexeme),
            value: token.value,
            fvalue: token.fvalue,
            optype: string_from_ptr(token.optype),
            next: None,
        });
        cursor = token.next;
    }

    let mut linked: Option<Box<Token>> = None;
    while let Some(mut token) = chain.pop() {
        token.next = linked;
        linked = Some(Box::new(token));
    }
    linked.map(|token| *token)
}

/// A parsed orchestra: the owned copy plus the native tree it was taken from.
///
/// The native tree stays allocated until it is released through
/// [`Host::delete_tree`](crate::Host::delete_tree); the copy outlives the release.
#[derive(Debug)]
pub struct ParsedTree {
    owner: InstanceId,
    native: Option<NonNull<TREE>>,
    root: SyntaxNode,
}

impl ParsedTree {
    pub(crate) fn new(owner: InstanceId, native: NonNull<TREE>, root: SyntaxNode) -> Self {
        Self {
            owner,
            native: Some(native),
            root,
        }
    }

    pub fn root(&self) -> &SyntaxNode {
        &self.root
    }

    pub fn owner(&self) -> InstanceId {
        self.owner
    }

    pub fn is_released(&self) -> bool {
        self.native.is_none()
    }

    pub(crate) fn native(&self) -> Option<NonNull<TREE>> {
        self.native
    }

    pub(crate) fn take_native(&mut self) -> Option<NonNull<TREE>> {
        self.native.take()
    }
}

impl Drop for ParsedTree {
    fn drop(&mut self) {
        if self.native.is_some() {
            log::warn!(
                "Syntax tree of instance {} dropped without delete_tree; held until destroy.",
                self.owner
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;
    use std::ptr;

    use super::*;

    fn token(lexeme: &CString) -> ORCTOKEN {
        ORCTOKEN {
            type_: 258,
            lexeme: lexeme.as_ptr() as *mut _,
            value: 0,
            fvalue: 0.0,
            optype: ptr::null_mut(),
            next: ptr::null_mut(),
        }
    }

    fn node(value: *mut ORCTOKEN) -> TREE {
        TREE {
            type_: 61,
            value,
            rate: 0,
            len: 0,
            line: 1,
            locn: 0,
            left: ptr::null_mut(),
            right: ptr::null_mut(),
            next: ptr::null_mut(),
            markup: ptr::null_mut(),
        }
    }

    #[test]
    fn null_root_copies_to_none() {
        assert!(unsafe { syntax_tree_from_native(ptr::null()) }.is_none());
    }

    #[test]
    fn copies_children_and_statement_chain() {
        let sr = CString::new("sr").unwrap();
        let rate = CString::new("44100").unwrap();
        let ksmps = CString::new("ksmps").unwrap();
        let mut sr_token = token(&sr);
        let mut rate_token = token(&rate);
        let mut ksmps_token = token(&ksmps);

        let mut lhs = node(&mut sr_token);
        let mut rhs = node(&mut rate_token);
        let mut second = node(&mut ksmps_token);
        second.line = 2;
        let mut first = node(ptr::null_mut());
        first.left = &mut lhs;
        first.right = &mut rhs;
        first.next = &mut second;

        let copy = unsafe { syntax_tree_from_native(&first) }.expect("tree");
        assert!(copy.value.is_none());
        assert_eq!(copy.left.as_ref().and_then(|n| n.lexeme()), Some("sr"));
        assert_eq!(copy.right.as_ref().and_then(|n| n.lexeme()), Some("44100"));

        let statements: Vec<_> = copy.siblings().collect();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1].line, 2);
        assert_eq!(statements[1].lexeme(), Some("ksmps"));

        // Mutating the native tree afterwards does not reach the copy.
        second.line = 99;
        assert_eq!(copy.next.as_ref().map(|n| n.line), Some(2));
    }

    #[test]
    fn long_statement_chains_copy_and_drop() {
        let mut nodes: Vec<TREE> = (0..50_000).map(|_| node(ptr::null_mut())).collect();
        for index in 0..nodes.len() - 1 {
            let next: *mut TREE = &mut nodes[index + 1];
            nodes[index].next = next;
        }

        let copy = unsafe { syntax_tree_from_native(&nodes[0]) }.expect("tree");
        assert_eq!(copy.siblings().count(), 50_000);
        drop(copy);
    }

    #[test]
    fn serializes_kind_as_type() {
        let lexeme = CString::new("instr").unwrap();
        let mut tok = token(&lexeme);
        let root = node(&mut tok);
        let copy = unsafe { syntax_tree_from_native(&root) }.expect("tree");
        let json = serde_json::to_value(&copy).unwrap();
        assert_eq!(json["type"], 61);
        assert_eq!(json["value"]["lexeme"], "instr");
    }
}
