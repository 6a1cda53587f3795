//! Flow-sensitive type and permission checking.
//!
//! Walks the tree computing a value kind per subexpression, threading the
//! type environment the same way the interpreter threads bindings:
//! - `Let` binds in the current scope and `Block` shares it.
//! - `Fn` bodies and `If` branches check in a copy.
//!
//! Unknown is compatible with every expected kind.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::ast::{AttrValue, Diagnostic, Node, ValueKind};
use crate::capability;
use crate::runtime::split_names;
use crate::stack::ensure_sufficient_stack;

use super::structure::{self, check_shape, shape_of};

pub type TypeEnv = HashMap<String, ValueKind>;

/// Reusable validator. Each `validate` call starts from a clean state.
#[derive(Debug, Default)]
pub struct Validator {
    diagnostics: Vec<Diagnostic>,
    ids: HashSet<String>,
    namespaces: HashSet<String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `root`. With `run_structural` the structural pass runs
    /// first and, when it reports anything, the flow pass is skipped.
    pub fn validate(
        &mut self,
        root: &Node,
        env_types: Option<&TypeEnv>,
        permissions: &HashSet<String>,
        run_structural: bool,
    ) -> Vec<Diagnostic> {
        self.diagnostics.clear();
        self.ids.clear();
        self.namespaces.clear();

        if run_structural {
            let structural = structure::check_structure(root);
            if !structural.is_empty() {
                return structural;
            }
        }

        let mut env = env_types.cloned().unwrap_or_default();
        self.predeclare(root, &mut env);
        self.check(root, &mut env, permissions);
        std::mem::take(&mut self.diagnostics)
    }

    /// Whole-tree pre-pass: every `Let{Fn}` name is callable everywhere,
    /// and every `Import` namespace is known.
    fn predeclare(&mut self, root: &Node, env: &mut TypeEnv) {
        root.walk(&mut |node| match node.kind.as_str() {
            "Let" => {
                if let (Some(name), [child]) = (node.ident_attr("name"), node.children.as_slice()) {
                    if child.is_kind("Fn") {
                        env.insert(name.to_string(), ValueKind::Function);
                    }
                }
            }
            "Import" => {
                if let Some(path) = node.text_attr("path") {
                    let namespace = match node.text_attr("as") {
                        Some(alias) => alias.to_string(),
                        None => Path::new(path)
                            .file_stem()
                            .map(|stem| stem.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                    };
                    self.namespaces.insert(namespace);
                }
            }
            _ => {}
        });
    }

    fn report(&mut self, code: &str, message: impl Into<String>, node: &Node) {
        self.diagnostics.push(Diagnostic::at_node(code, message, node));
    }

    /// True when `name` is `ns.member` for an imported namespace.
    fn is_imported(&self, name: &str) -> bool {
        capability::namespace(name).is_some_and(|ns| self.namespaces.contains(ns))
    }

    fn check(&mut self, node: &Node, env: &mut TypeEnv, perms: &HashSet<String>) -> ValueKind {
        ensure_sufficient_stack(|| self.check_node(node, env, perms))
    }

    fn check_node(&mut self, node: &Node, env: &mut TypeEnv, perms: &HashSet<String>) -> ValueKind {
        if !self.ids.insert(node.id.clone()) {
            self.report("VAL001", format!("Duplicate node id '{}'.", node.id), node);
        }

        let Some(shape) = shape_of(&node.kind) else {
            self.report("VAL999", format!("Unknown node kind '{}'.", node.kind), node);
            return ValueKind::Unknown;
        };
        check_shape(node, &shape, &mut self.diagnostics);

        match node.kind.as_str() {
            "Program" => {
                for child in &node.children {
                    self.check(child, env, perms);
                }
                ValueKind::Void
            }
            "Block" => {
                let mut last = ValueKind::Void;
                for child in &node.children {
                    last = self.check(child, env, perms);
                }
                last
            }
            "Let" => {
                let name = node.ident_attr("name");
                if let (Some(name), [child]) = (name, node.children.as_slice()) {
                    if child.is_kind("Fn") {
                        env.insert(name.to_string(), ValueKind::Function);
                    }
                }
                let kind = match node.children.as_slice() {
                    [child] => self.check(child, env, perms),
                    _ => ValueKind::Unknown,
                };
                if let Some(name) = name {
                    env.insert(name.to_string(), kind);
                }
                ValueKind::Void
            }
            "Var" => match node.ident_attr("name") {
                Some(name) => match env.get(name) {
                    Some(kind) => *kind,
                    None if self.is_imported(name) => ValueKind::Unknown,
                    None => {
                        self.report("VAL010", format!("Unknown variable '{}'.", name), node);
                        ValueKind::Unknown
                    }
                },
                None => ValueKind::Unknown,
            },
            "Lit" => match node.attr("value") {
                Some(AttrValue::String(_)) => ValueKind::String,
                Some(AttrValue::Int(_)) => ValueKind::Int,
                Some(AttrValue::Bool(_)) => ValueKind::Bool,
                _ => ValueKind::Unknown,
            },
            "Call" => {
                let arg_kinds: Vec<ValueKind> = node
                    .children
                    .iter()
                    .map(|child| self.check(child, env, perms))
                    .collect();
                let target = node.text_attr("target").unwrap_or("");
                self.check_call(node, target, &arg_kinds, env, perms)
            }
            "Fn" => {
                if let [body] = node.children.as_slice() {
                    if !body.is_kind("Block") {
                        self.report("VAL050", "Fn body must be Block.", node);
                    }
                    let mut fn_env = env.clone();
                    if let Some(params) = node.text_attr("params") {
                        for param in split_names(params) {
                            fn_env.insert(param, ValueKind::Unknown);
                        }
                    }
                    self.check(body, &mut fn_env, perms);
                }
                ValueKind::Function
            }
            "If" => self.check_if(node, env, perms),
            "Return" => match node.children.first() {
                Some(child) => self.check(child, env, perms),
                None => ValueKind::Void,
            },
            "Import" => ValueKind::Void,
            "Export" => {
                match (node.children.first(), node.text_attr("name")) {
                    (Some(child), _) => {
                        self.check(child, env, perms);
                    }
                    (None, Some(name)) if !env.contains_key(name) => {
                        self.report("VAL010", format!("Unknown variable '{}'.", name), node);
                    }
                    _ => {}
                }
                ValueKind::Void
            }
            _ => self.check_operator(node, env, perms),
        }
    }

    fn check_if(&mut self, node: &Node, env: &mut TypeEnv, perms: &HashSet<String>) -> ValueKind {
        if let Some(cond) = node.children.first() {
            let cond_kind = self.check(cond, env, perms);
            if !cond_kind.is_compatible(ValueKind::Bool) {
                self.report("VAL020", "If condition must be bool.", node);
            }
        }
        if node.children.get(1).is_some_and(|then| !then.is_kind("Block")) {
            self.report("VAL021", "If then-branch must be Block.", node);
        }
        if node.children.get(2).is_some_and(|otherwise| !otherwise.is_kind("Block")) {
            self.report("VAL022", "If else-branch must be Block.", node);
        }

        let then_kind = match node.children.get(1) {
            Some(then) => self.check(then, &mut env.clone(), perms),
            None => ValueKind::Void,
        };
        let else_kind = match node.children.get(2) {
            Some(otherwise) => self.check(otherwise, &mut env.clone(), perms),
            None => return ValueKind::Void,
        };

        if then_kind == else_kind {
            then_kind
        } else if then_kind == ValueKind::Unknown || else_kind == ValueKind::Unknown {
            ValueKind::Unknown
        } else {
            self.report("VAL023", "If branches must return the same type.", node);
            ValueKind::Unknown
        }
    }

    fn check_call(
        &mut self,
        node: &Node,
        target: &str,
        arg_kinds: &[ValueKind],
        env: &TypeEnv,
        perms: &HashSet<String>,
    ) -> ValueKind {
        if target.trim().is_empty() {
            self.report("VAL030", "Call target is required.", node);
            return ValueKind::Unknown;
        }

        if let Some(contract) = capability::lookup(target) {
            if !perms.contains(contract.permission) {
                self.report(
                    "VAL040",
                    format!("Permission '{}' denied.", contract.permission),
                    node,
                );
            }
            for (code, message) in contract.check(arg_kinds) {
                self.report(code, message, node);
            }
            return contract.returns;
        }

        if !target.contains('.') && env.get(target) == Some(&ValueKind::Function) {
            return ValueKind::Unknown;
        }
        if self.is_imported(target) {
            return ValueKind::Unknown;
        }

        self.report("VAL036", format!("Unknown call target '{}'.", target), node);
        ValueKind::Unknown
    }

    /// Operators and AST-construction primitives.
    fn check_operator(&mut self, node: &Node, env: &mut TypeEnv, perms: &HashSet<String>) -> ValueKind {
        let kinds: Vec<ValueKind> = node
            .children
            .iter()
            .map(|child| self.check(child, env, perms))
            .collect();
        let expect = |index: usize, expected: ValueKind| {
            kinds.get(index).map_or(true, |k| k.is_compatible(expected))
        };
        let arity_ok = shape_of(&node.kind)
            .is_some_and(|shape| shape.max_children == Some(kinds.len()));

        match node.kind.as_str() {
            "Eq" => {
                if let [left, right] = kinds.as_slice() {
                    if left != right && *left != ValueKind::Unknown && *right != ValueKind::Unknown {
                        self.report("VAL051", "Eq operands must have same type.", node);
                    }
                }
                ValueKind::Bool
            }
            "Add" => {
                if arity_ok && !expect(0, ValueKind::Int) {
                    self.report("VAL052", "Add left operand must be int.", node);
                }
                if arity_ok && !expect(1, ValueKind::Int) {
                    self.report("VAL053", "Add right operand must be int.", node);
                }
                ValueKind::Int
            }
            "ToString" => {
                if arity_ok && !expect(0, ValueKind::Int) && !expect(0, ValueKind::Bool) {
                    self.report("VAL054", "ToString expects int or bool.", node);
                }
                ValueKind::String
            }
            "StrConcat" => {
                if arity_ok && !expect(0, ValueKind::String) {
                    self.report("VAL055", "StrConcat left operand must be string.", node);
                }
                if arity_ok && !expect(1, ValueKind::String) {
                    self.report("VAL056", "StrConcat right operand must be string.", node);
                }
                ValueKind::String
            }
            "StrEscape" => {
                if arity_ok && !expect(0, ValueKind::String) {
                    self.report("VAL057", "StrEscape expects string.", node);
                }
                ValueKind::String
            }
            "NodeKind" | "NodeId" => {
                if arity_ok && !expect(0, ValueKind::Node) {
                    self.report("VAL060", format!("{} expects node.", node.kind), node);
                }
                ValueKind::String
            }
            "AttrCount" | "ChildCount" => {
                if arity_ok && !expect(0, ValueKind::Node) {
                    self.report("VAL061", format!("{} expects node.", node.kind), node);
                }
                ValueKind::Int
            }
            "AttrKey" | "AttrValueKind" | "AttrValueString" | "AttrValueInt" | "AttrValueBool"
            | "ChildAt" => {
                let (code, result) = match node.kind.as_str() {
                    "AttrValueInt" => ("VAL063", ValueKind::Int),
                    "AttrValueBool" => ("VAL064", ValueKind::Bool),
                    "ChildAt" => ("VAL065", ValueKind::Node),
                    _ => ("VAL062", ValueKind::String),
                };
                if arity_ok && !expect(0, ValueKind::Node) {
                    self.report(code, format!("{} expects node as first child.", node.kind), node);
                }
                if arity_ok && !expect(1, ValueKind::Int) {
                    self.report(code, format!("{} expects int index as second child.", node.kind), node);
                }
                result
            }
            "MakeBlock" => {
                if arity_ok && !expect(0, ValueKind::String) {
                    self.report("VAL066", "MakeBlock expects string id.", node);
                }
                ValueKind::Node
            }
            "AppendChild" => {
                if arity_ok && !(expect(0, ValueKind::Node) && expect(1, ValueKind::Node)) {
                    self.report("VAL067", "AppendChild expects two nodes.", node);
                }
                ValueKind::Node
            }
            "MakeErr" => {
                if arity_ok && !(0..4).all(|i| expect(i, ValueKind::String)) {
                    self.report("VAL068", "MakeErr expects four strings.", node);
                }
                ValueKind::Node
            }
            "MakeLitString" => {
                if arity_ok && !(0..2).all(|i| expect(i, ValueKind::String)) {
                    self.report("VAL069", "MakeLitString expects two strings.", node);
                }
                ValueKind::Node
            }
            _ => ValueKind::Unknown,
        }
    }
}
