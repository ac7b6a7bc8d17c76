//! Partial syntax trees
//!
//!     [AstNode] is a persistent tree: children are held behind `Arc`, and every mutation
//!     copies only the path from the root down to the modified node. All other subtrees are
//!     shared with the parent tree. Hypotheses that descend from a common ancestor therefore
//!     never observe each other's extensions, and extending a hypothesis costs O(depth)
//!     allocations instead of a full copy.
//!
//!     Frontier
//!
//!         A node is on the frontier (open) when it is a non-terminal without a rule, or a
//!         terminal that has not been closed by a Reduce. Every node caches the number of open
//!         nodes in its subtree, so completeness checks are O(1) and the search for the next
//!         frontier node skips closed subtrees.
//!
//!     Traversal order
//!
//!         The next frontier node is the first open node in depth-first pre-order, visiting
//!         children either left-to-right or right-to-left ([TraversalOrder]). The order fixes
//!         the linearization of a tree into actions, so it must match the order the scoring
//!         model was trained with.

use crate::codegen::error::GrammarViolation;
use crate::codegen::grammar::{Grammar, NodeType, Rule, RuleId, Symbol};
use crate::codegen::vocab::TokenId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Child-index path from the root to a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        NodePath(Vec::new())
    }

    pub fn child(&self, index: usize) -> Self {
        let mut steps = self.0.clone();
        steps.push(index);
        NodePath(steps)
    }

    pub fn steps(&self) -> &[usize] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<usize>> for NodePath {
    fn from(steps: Vec<usize>) -> Self {
        NodePath(steps)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for step in &self.0 {
            write!(f, "/{}", step)?;
        }
        Ok(())
    }
}

/// Child visiting order for the depth-first frontier search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraversalOrder {
    #[default]
    LeftToRight,
    RightToLeft,
}

impl TraversalOrder {
    /// Child indices of a node with `len` children, in visiting order.
    pub fn indices(self, len: usize) -> Box<dyn Iterator<Item = usize>> {
        match self {
            TraversalOrder::LeftToRight => Box::new(0..len),
            TraversalOrder::RightToLeft => Box::new((0..len).rev()),
        }
    }
}

impl std::str::FromStr for TraversalOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left-to-right" => Ok(TraversalOrder::LeftToRight),
            "right-to-left" => Ok(TraversalOrder::RightToLeft),
            other => Err(format!(
                "unknown traversal order '{}' (expected left-to-right or right-to-left)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeKind {
    NonTerminal { rule: Option<RuleId> },
    Terminal { tokens: Vec<TokenId>, closed: bool },
}

/// A node of a (possibly partial) derivation tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AstNode {
    node_type: NodeType,
    kind: NodeKind,
    children: Vec<Arc<AstNode>>,
    size: usize,
    open: usize,
}

impl AstNode {
    fn assemble(node_type: NodeType, kind: NodeKind, children: Vec<Arc<AstNode>>) -> Self {
        let self_open = match &kind {
            NodeKind::NonTerminal { rule } => rule.is_none(),
            NodeKind::Terminal { closed, .. } => !closed,
        };
        let size = 1 + children.iter().map(|c| c.size).sum::<usize>();
        let open = usize::from(self_open) + children.iter().map(|c| c.open).sum::<usize>();
        AstNode {
            node_type,
            kind,
            children,
            size,
            open,
        }
    }

    /// An unexpanded frontier node for `symbol`.
    pub fn open(symbol: Symbol) -> Self {
        let kind = match symbol {
            Symbol::Terminal(_) => NodeKind::Terminal {
                tokens: Vec::new(),
                closed: false,
            },
            Symbol::NonTerminal(_) => NodeKind::NonTerminal { rule: None },
        };
        Self::assemble(symbol.node_type(), kind, Vec::new())
    }

    /// The empty derivation: a single open node of the grammar's root type.
    pub fn root(grammar: &Grammar) -> Self {
        Self::open(grammar.symbol(grammar.root()))
    }

    /// A closed terminal holding `tokens`.
    pub fn terminal(node_type: NodeType, tokens: Vec<TokenId>) -> Self {
        Self::assemble(
            node_type,
            NodeKind::Terminal {
                tokens,
                closed: true,
            },
            Vec::new(),
        )
    }

    /// A non-terminal expanded with `rule` over the given children.
    pub fn expanded(node_type: NodeType, rule: RuleId, children: Vec<AstNode>) -> Self {
        Self::assemble(
            node_type,
            NodeKind::NonTerminal { rule: Some(rule) },
            children.into_iter().map(Arc::new).collect(),
        )
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, NodeKind::Terminal { .. })
    }

    /// The rule this node was expanded with, if any.
    pub fn rule(&self) -> Option<RuleId> {
        match &self.kind {
            NodeKind::NonTerminal { rule } => *rule,
            NodeKind::Terminal { .. } => None,
        }
    }

    /// Tokens generated into this node so far (empty for non-terminals).
    pub fn tokens(&self) -> &[TokenId] {
        match &self.kind {
            NodeKind::Terminal { tokens, .. } => tokens,
            NodeKind::NonTerminal { .. } => &[],
        }
    }

    /// Whether this node itself is on the frontier.
    pub fn is_open(&self) -> bool {
        match &self.kind {
            NodeKind::NonTerminal { rule } => rule.is_none(),
            NodeKind::Terminal { closed, .. } => !closed,
        }
    }

    pub fn children(&self) -> impl ExactSizeIterator<Item = &AstNode> + DoubleEndedIterator {
        self.children.iter().map(Arc::as_ref)
    }

    pub fn child(&self, index: usize) -> Option<&AstNode> {
        self.children.get(index).map(Arc::as_ref)
    }

    /// Number of nodes in this subtree.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of open nodes in this subtree.
    pub fn frontier_count(&self) -> usize {
        self.open
    }

    pub fn is_complete(&self) -> bool {
        self.open == 0
    }

    pub fn get(&self, path: &NodePath) -> Option<&AstNode> {
        let mut node = self;
        for &step in path.steps() {
            node = node.child(step)?;
        }
        Some(node)
    }

    /// Locate the next node to expand, or `None` when the tree is complete.
    pub fn next_frontier(&self, order: TraversalOrder) -> Option<(NodePath, &AstNode)> {
        if self.open == 0 {
            return None;
        }
        let mut path = Vec::new();
        let mut node = self;
        while !node.is_open() {
            let index = order
                .indices(node.children.len())
                .find(|&i| node.children[i].open > 0)?;
            path.push(index);
            node = &node.children[index];
        }
        Some((NodePath(path), node))
    }

    /// Expand the open non-terminal at `path` with `rule`.
    pub fn apply_rule(&self, path: &NodePath, rule: &Rule) -> Result<AstNode, GrammarViolation> {
        self.rewrite(path, 0, &|node: &AstNode| {
            match &node.kind {
                NodeKind::Terminal { .. } => {
                    return Err(GrammarViolation::ExpectedNonTerminal { path: path.clone() })
                }
                NodeKind::NonTerminal { rule: Some(_) } => {
                    return Err(GrammarViolation::NotOpen { path: path.clone() })
                }
                NodeKind::NonTerminal { rule: None } => {}
            }
            if rule.lhs != node.node_type {
                return Err(GrammarViolation::TypeMismatch {
                    path: path.clone(),
                    rule: rule.id.index(),
                    expected: rule.lhs.0.to_string(),
                    found: node.node_type.0.to_string(),
                });
            }
            let children = rule
                .rhs
                .iter()
                .map(|symbol| Arc::new(AstNode::open(*symbol)))
                .collect();
            Ok(AstNode::assemble(
                node.node_type,
                NodeKind::NonTerminal {
                    rule: Some(rule.id),
                },
                children,
            ))
        })
    }

    /// Append `token` to the open terminal at `path`.
    pub fn gen_token(&self, path: &NodePath, token: TokenId) -> Result<AstNode, GrammarViolation> {
        self.rewrite(path, 0, &|node: &AstNode| match &node.kind {
            NodeKind::NonTerminal { .. } => {
                Err(GrammarViolation::ExpectedTerminal { path: path.clone() })
            }
            NodeKind::Terminal { closed: true, .. } => {
                Err(GrammarViolation::NotOpen { path: path.clone() })
            }
            NodeKind::Terminal {
                tokens,
                closed: false,
            } => {
                let mut tokens = tokens.clone();
                tokens.push(token);
                Ok(AstNode::assemble(
                    node.node_type,
                    NodeKind::Terminal {
                        tokens,
                        closed: false,
                    },
                    Vec::new(),
                ))
            }
        })
    }

    /// Close the open terminal at `path`.
    pub fn reduce(&self, path: &NodePath) -> Result<AstNode, GrammarViolation> {
        self.rewrite(path, 0, &|node: &AstNode| match &node.kind {
            NodeKind::NonTerminal { .. } => {
                Err(GrammarViolation::ExpectedTerminal { path: path.clone() })
            }
            NodeKind::Terminal { closed: true, .. } => {
                Err(GrammarViolation::NotOpen { path: path.clone() })
            }
            NodeKind::Terminal { tokens, .. } if tokens.is_empty() => {
                Err(GrammarViolation::NoTokens { path: path.clone() })
            }
            NodeKind::Terminal { tokens, .. } => {
                Ok(AstNode::terminal(node.node_type, tokens.clone()))
            }
        })
    }

    fn rewrite<F>(
        &self,
        path: &NodePath,
        depth: usize,
        edit: &F,
    ) -> Result<AstNode, GrammarViolation>
    where
        F: Fn(&AstNode) -> Result<AstNode, GrammarViolation>,
    {
        let Some(&index) = path.steps().get(depth) else {
            return edit(self);
        };
        let child = self
            .children
            .get(index)
            .ok_or_else(|| GrammarViolation::InvalidPath { path: path.clone() })?;
        let replaced = Arc::new(child.rewrite(path, depth + 1, edit)?);
        let mut children = self.children.clone();
        children[index] = replaced;
        Ok(AstNode::assemble(self.node_type, self.kind.clone(), children))
    }

    /// Whether `other` shares this subtree's allocation (used to verify structural sharing).
    pub fn shares_child(&self, other: &AstNode, index: usize) -> bool {
        match (self.children.get(index), other.children.get(index)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::grammar::{Grammar, GrammarDef};

    fn binop_grammar() -> Grammar {
        GrammarDef::new("BinOp")
            .terminal("Num")
            .rule("BinOp", &["Num", "Num"])
            .build()
            .unwrap()
    }

    fn root(grammar: &Grammar) -> AstNode {
        AstNode::root(grammar)
    }

    #[test]
    fn test_root_is_single_open_node() {
        let grammar = binop_grammar();
        let tree = root(&grammar);
        assert_eq!(tree.size(), 1);
        assert_eq!(tree.frontier_count(), 1);
        let (path, node) = tree.next_frontier(TraversalOrder::LeftToRight).unwrap();
        assert_eq!(path, NodePath::root());
        assert_eq!(node.node_type(), grammar.root());
    }

    #[test]
    fn test_apply_rule_opens_children() {
        let grammar = binop_grammar();
        let rule = grammar.rule(RuleId(0)).unwrap();
        let tree = root(&grammar).apply_rule(&NodePath::root(), rule).unwrap();
        assert_eq!(tree.size(), 3);
        assert_eq!(tree.frontier_count(), 2);
        assert_eq!(tree.rule(), Some(RuleId(0)));

        let (left, _) = tree.next_frontier(TraversalOrder::LeftToRight).unwrap();
        let (right, _) = tree.next_frontier(TraversalOrder::RightToLeft).unwrap();
        assert_eq!(left, NodePath::from(vec![0]));
        assert_eq!(right, NodePath::from(vec![1]));
    }

    #[test]
    fn test_terminal_lifecycle() {
        let grammar = binop_grammar();
        let rule = grammar.rule(RuleId(0)).unwrap();
        let first = NodePath::from(vec![0]);
        let tree = root(&grammar)
            .apply_rule(&NodePath::root(), rule)
            .unwrap()
            .gen_token(&first, TokenId(3))
            .unwrap();
        // Still open until reduced
        assert_eq!(tree.frontier_count(), 2);
        assert_eq!(tree.get(&first).unwrap().tokens(), &[TokenId(3)]);

        let tree = tree.reduce(&first).unwrap();
        assert_eq!(tree.frontier_count(), 1);
        let (next, _) = tree.next_frontier(TraversalOrder::LeftToRight).unwrap();
        assert_eq!(next, NodePath::from(vec![1]));
    }

    #[test]
    fn test_reduce_without_tokens_fails() {
        let grammar = binop_grammar();
        let rule = grammar.rule(RuleId(0)).unwrap();
        let tree = root(&grammar).apply_rule(&NodePath::root(), rule).unwrap();
        let err = tree.reduce(&NodePath::from(vec![0])).unwrap_err();
        assert!(matches!(err, GrammarViolation::NoTokens { .. }));
    }

    #[test]
    fn test_rule_on_terminal_fails() {
        let grammar = binop_grammar();
        let rule = grammar.rule(RuleId(0)).unwrap();
        let tree = root(&grammar).apply_rule(&NodePath::root(), rule).unwrap();
        let err = tree.apply_rule(&NodePath::from(vec![0]), rule).unwrap_err();
        assert!(matches!(err, GrammarViolation::ExpectedNonTerminal { .. }));
    }

    #[test]
    fn test_rule_on_expanded_node_fails() {
        let grammar = binop_grammar();
        let rule = grammar.rule(RuleId(0)).unwrap();
        let tree = root(&grammar).apply_rule(&NodePath::root(), rule).unwrap();
        let err = tree.apply_rule(&NodePath::root(), rule).unwrap_err();
        assert!(matches!(err, GrammarViolation::NotOpen { .. }));
    }

    #[test]
    fn test_token_on_nonterminal_fails() {
        let grammar = binop_grammar();
        let err = root(&grammar)
            .gen_token(&NodePath::root(), TokenId(1))
            .unwrap_err();
        assert!(matches!(err, GrammarViolation::ExpectedTerminal { .. }));
    }

    #[test]
    fn test_invalid_path() {
        let grammar = binop_grammar();
        let err = root(&grammar)
            .gen_token(&NodePath::from(vec![4]), TokenId(1))
            .unwrap_err();
        assert!(matches!(err, GrammarViolation::InvalidPath { .. }));
    }

    #[test]
    fn test_mutation_leaves_parent_untouched() {
        let grammar = binop_grammar();
        let rule = grammar.rule(RuleId(0)).unwrap();
        let parent = root(&grammar).apply_rule(&NodePath::root(), rule).unwrap();
        let left = parent.gen_token(&NodePath::from(vec![0]), TokenId(1)).unwrap();
        let right = parent.gen_token(&NodePath::from(vec![0]), TokenId(2)).unwrap();

        assert!(parent.child(0).unwrap().tokens().is_empty());
        assert_eq!(left.child(0).unwrap().tokens(), &[TokenId(1)]);
        assert_eq!(right.child(0).unwrap().tokens(), &[TokenId(2)]);
        // The untouched sibling is shared, not copied
        assert!(parent.shares_child(&left, 1));
        assert!(left.shares_child(&right, 1));
    }

    #[test]
    fn test_complete_tree_has_no_frontier() {
        let grammar = binop_grammar();
        let num = grammar.type_id("Num").unwrap();
        let tree = AstNode::expanded(
            grammar.root(),
            RuleId(0),
            vec![
                AstNode::terminal(num, vec![TokenId(1)]),
                AstNode::terminal(num, vec![TokenId(2)]),
            ],
        );
        assert!(tree.is_complete());
        assert_eq!(tree.size(), 3);
        assert!(tree.next_frontier(TraversalOrder::LeftToRight).is_none());
    }

    #[test]
    fn test_path_display() {
        assert_eq!(NodePath::root().to_string(), "/");
        assert_eq!(NodePath::from(vec![0, 2]).to_string(), "/0/2");
    }

    #[test]
    fn test_traversal_order_from_str() {
        assert_eq!(
            "right-to-left".parse::<TraversalOrder>().unwrap(),
            TraversalOrder::RightToLeft
        );
        assert!("pre-order".parse::<TraversalOrder>().is_err());
    }
}
