//! Grammar definitions
//!
//!     A grammar is a set of production rules over interned node types. Each rule names the
//!     node type it expands (its left-hand side) and the ordered child types it creates. Node
//!     types are either terminal, filled by token generation, or non-terminal, filled by
//!     applying one of their rules.
//!
//!     Grammars are built once from a [GrammarDef] (usually deserialized from the dataset
//!     bundle) and then shared read-only across every decode call.
//!
//!     Validation guarantees, for any [Grammar] value:
//!
//!         - the root type is a non-terminal
//!         - every non-terminal has at least one rule, and no terminal has any
//!         - no two rules share the same left-hand side and right-hand side, so the shape of
//!           a finished node identifies the rule that produced it

use crate::codegen::error::GrammarError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Interned node type id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeType(pub u32);

impl NodeType {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Stable rule id (the rule's position in the grammar).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub u32);

impl RuleId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A right-hand-side entry of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    Terminal(NodeType),
    NonTerminal(NodeType),
}

impl Symbol {
    pub fn node_type(&self) -> NodeType {
        match self {
            Symbol::Terminal(t) | Symbol::NonTerminal(t) => *t,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Symbol::Terminal(_))
    }
}

/// A production rule `lhs -> rhs...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub id: RuleId,
    pub lhs: NodeType,
    pub rhs: Vec<Symbol>,
}

/// Bidirectional mapping between type names and [NodeType] ids.
#[derive(Debug, Clone, Default)]
struct TypeTable {
    by_name: HashMap<String, NodeType>,
    names: Vec<String>,
}

impl TypeTable {
    fn get_or_insert(&mut self, name: &str) -> NodeType {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = NodeType(self.names.len() as u32);
        self.by_name.insert(name.to_string(), id);
        self.names.push(name.to_string());
        id
    }
}

/// Serializable grammar description.
///
/// Also doubles as a builder:
///
/// ```text
/// GrammarDef::new("Expr")
///     .terminal("Num")
///     .rule("Expr", &["Num", "Num"])
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarDef {
    pub root: String,
    #[serde(default)]
    pub terminals: Vec<String>,
    pub rules: Vec<RuleDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDef {
    pub lhs: String,
    #[serde(default)]
    pub rhs: Vec<String>,
}

impl GrammarDef {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            terminals: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn terminal(mut self, name: impl Into<String>) -> Self {
        self.terminals.push(name.into());
        self
    }

    pub fn rule(mut self, lhs: impl Into<String>, rhs: &[&str]) -> Self {
        self.rules.push(RuleDef {
            lhs: lhs.into(),
            rhs: rhs.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn build(self) -> Result<Grammar, GrammarError> {
        Grammar::from_def(&self)
    }
}

/// A validated, immutable grammar.
#[derive(Debug, Clone)]
pub struct Grammar {
    root: NodeType,
    types: TypeTable,
    terminal: Vec<bool>,
    rules: Vec<Rule>,
    by_lhs: Vec<Vec<RuleId>>,
    by_shape: HashMap<(NodeType, Vec<NodeType>), RuleId>,
}

impl Grammar {
    pub fn from_def(def: &GrammarDef) -> Result<Self, GrammarError> {
        let mut types = TypeTable::default();
        let root = types.get_or_insert(&def.root);
        for name in &def.terminals {
            types.get_or_insert(name);
        }
        for rule in &def.rules {
            types.get_or_insert(&rule.lhs);
            for child in &rule.rhs {
                types.get_or_insert(child);
            }
        }

        let mut terminal = vec![false; types.names.len()];
        for name in &def.terminals {
            terminal[types.by_name[name.as_str()].index()] = true;
        }
        if terminal[root.index()] {
            return Err(GrammarError::TerminalRoot(def.root.clone()));
        }

        let mut rules = Vec::with_capacity(def.rules.len());
        let mut by_lhs = vec![Vec::new(); types.names.len()];
        let mut by_shape = HashMap::new();
        for (index, rule) in def.rules.iter().enumerate() {
            let id = RuleId(index as u32);
            let lhs = types.by_name[rule.lhs.as_str()];
            if terminal[lhs.index()] {
                return Err(GrammarError::TerminalLhs(rule.lhs.clone()));
            }
            let rhs: Vec<Symbol> = rule
                .rhs
                .iter()
                .map(|name| {
                    let t = types.by_name[name.as_str()];
                    if terminal[t.index()] {
                        Symbol::Terminal(t)
                    } else {
                        Symbol::NonTerminal(t)
                    }
                })
                .collect();
            let shape = (lhs, rhs.iter().map(Symbol::node_type).collect::<Vec<_>>());
            if by_shape.insert(shape, id).is_some() {
                return Err(GrammarError::DuplicateRule(format!(
                    "{} -> {}",
                    rule.lhs,
                    rule.rhs.join(" ")
                )));
            }
            by_lhs[lhs.index()].push(id);
            rules.push(Rule { id, lhs, rhs });
        }

        for (index, name) in types.names.iter().enumerate() {
            if !terminal[index] && by_lhs[index].is_empty() {
                return Err(GrammarError::NoRules(name.clone()));
            }
        }

        Ok(Grammar {
            root,
            types,
            terminal,
            rules,
            by_lhs,
            by_shape,
        })
    }

    /// Reconstruct the serializable description.
    pub fn to_def(&self) -> GrammarDef {
        GrammarDef {
            root: self.type_name(self.root).to_string(),
            terminals: self
                .types
                .names
                .iter()
                .enumerate()
                .filter(|(index, _)| self.terminal[*index])
                .map(|(_, name)| name.clone())
                .collect(),
            rules: self
                .rules
                .iter()
                .map(|rule| RuleDef {
                    lhs: self.type_name(rule.lhs).to_string(),
                    rhs: rule
                        .rhs
                        .iter()
                        .map(|s| self.type_name(s.node_type()).to_string())
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn root(&self) -> NodeType {
        self.root
    }

    pub fn is_terminal(&self, node_type: NodeType) -> bool {
        self.terminal.get(node_type.index()).copied().unwrap_or(false)
    }

    /// Rules that may expand `node_type`; empty iff the type is terminal.
    pub fn rules_for(&self, node_type: NodeType) -> &[RuleId] {
        self.by_lhs
            .get(node_type.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(id.index())
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn num_rules(&self) -> usize {
        self.rules.len()
    }

    pub fn num_types(&self) -> usize {
        self.types.names.len()
    }

    pub fn type_name(&self, node_type: NodeType) -> &str {
        self.types
            .names
            .get(node_type.index())
            .map(String::as_str)
            .unwrap_or("?")
    }

    pub fn type_id(&self, name: &str) -> Option<NodeType> {
        self.types.by_name.get(name).copied()
    }

    pub fn symbol(&self, node_type: NodeType) -> Symbol {
        if self.is_terminal(node_type) {
            Symbol::Terminal(node_type)
        } else {
            Symbol::NonTerminal(node_type)
        }
    }

    /// Find the rule whose left-hand side and child types match exactly.
    pub fn rule_for_children(&self, lhs: NodeType, children: &[NodeType]) -> Option<RuleId> {
        self.by_shape.get(&(lhs, children.to_vec())).copied()
    }

    /// Human-readable `lhs -> rhs` form of a rule.
    pub fn describe_rule(&self, id: RuleId) -> String {
        match self.rule(id) {
            Some(rule) => {
                let rhs: Vec<&str> = rule
                    .rhs
                    .iter()
                    .map(|s| self.type_name(s.node_type()))
                    .collect();
                format!("{} -> {}", self.type_name(rule.lhs), rhs.join(" "))
            }
            None => format!("<unknown rule {}>", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr_grammar() -> Grammar {
        GrammarDef::new("Expr")
            .terminal("Num")
            .terminal("Op")
            .rule("Expr", &["BinOp"])
            .rule("Expr", &["Num"])
            .rule("BinOp", &["Expr", "Op", "Expr"])
            .build()
            .expect("grammar to build")
    }

    #[test]
    fn test_rules_for_nonterminal() {
        let grammar = expr_grammar();
        let expr = grammar.type_id("Expr").unwrap();
        let rules = grammar.rules_for(expr);
        assert_eq!(rules, &[RuleId(0), RuleId(1)]);
        assert_eq!(grammar.describe_rule(rules[0]), "Expr -> BinOp");
    }

    #[test]
    fn test_terminals_have_no_rules() {
        let grammar = expr_grammar();
        let num = grammar.type_id("Num").unwrap();
        assert!(grammar.is_terminal(num));
        assert!(grammar.rules_for(num).is_empty());
        assert!(!grammar.is_terminal(grammar.root()));
    }

    #[test]
    fn test_rhs_symbols_carry_terminality() {
        let grammar = expr_grammar();
        let binop = grammar.rule(RuleId(2)).unwrap();
        assert!(!binop.rhs[0].is_terminal());
        assert!(binop.rhs[1].is_terminal());
        assert_eq!(grammar.type_name(binop.rhs[1].node_type()), "Op");
    }

    #[test]
    fn test_rule_for_children() {
        let grammar = expr_grammar();
        let expr = grammar.type_id("Expr").unwrap();
        let num = grammar.type_id("Num").unwrap();
        assert_eq!(grammar.rule_for_children(expr, &[num]), Some(RuleId(1)));
        assert_eq!(grammar.rule_for_children(expr, &[num, num]), None);
    }

    #[test]
    fn test_missing_rules_rejected() {
        let err = GrammarDef::new("Expr")
            .rule("Expr", &["Stmt"])
            .build()
            .unwrap_err();
        assert_eq!(err, GrammarError::NoRules("Stmt".to_string()));
    }

    #[test]
    fn test_terminal_root_rejected() {
        let err = GrammarDef::new("Num").terminal("Num").build().unwrap_err();
        assert_eq!(err, GrammarError::TerminalRoot("Num".to_string()));
    }

    #[test]
    fn test_terminal_lhs_rejected() {
        let err = GrammarDef::new("Expr")
            .terminal("Num")
            .rule("Expr", &["Num"])
            .rule("Num", &[])
            .build()
            .unwrap_err();
        assert_eq!(err, GrammarError::TerminalLhs("Num".to_string()));
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let err = GrammarDef::new("Expr")
            .terminal("Num")
            .rule("Expr", &["Num"])
            .rule("Expr", &["Num"])
            .build()
            .unwrap_err();
        assert!(matches!(err, GrammarError::DuplicateRule(_)));
    }

    #[test]
    fn test_def_round_trip() {
        let grammar = expr_grammar();
        let rebuilt = Grammar::from_def(&grammar.to_def()).unwrap();
        assert_eq!(rebuilt.num_rules(), grammar.num_rules());
        assert_eq!(rebuilt.describe_rule(RuleId(2)), "BinOp -> Expr Op Expr");
    }

    #[test]
    fn test_deserialize_definition() {
        let json = r#"{"root": "Expr", "terminals": ["Num"], "rules": [{"lhs": "Expr", "rhs": ["Num"]}]}"#;
        let def: GrammarDef = serde_json::from_str(json).unwrap();
        let grammar = def.build().unwrap();
        assert_eq!(grammar.num_types(), 2);
    }
}
