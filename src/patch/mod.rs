//! Structural edits on a Node tree, addressed by node id.
//!
//! ```text
//! Op#p1(kind=replaceNode id=lit1) { Lit#lit1(value=2) }
//! Op#p2(kind=deleteNode id=stmt3)
//! Op#p3(kind=insertChild parentId=blk1 slot=statements index=0) { ... }
//! ```
//!
//! Ops apply in order. A failing op adds a diagnostic and is skipped; the
//! rest of the batch still applies.

use tracing::debug;

use crate::ast::{AttrValue, Diagnostic, Node, Span};

/// Apply `ops` to `root` in place and return one diagnostic per failed op.
pub fn apply_patch(root: &mut Node, ops: &[Node]) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for op in ops {
        if let Err(diagnostic) = apply_op(root, op) {
            debug!(op = %op.id, code = %diagnostic.code, "patch op skipped");
            diagnostics.push(diagnostic);
        }
    }
    diagnostics
}

/// Apply the children of a patch document such as `Patch#p { Op#.. }`.
pub fn apply_patch_document(root: &mut Node, patch: &Node) -> Vec<Diagnostic> {
    apply_patch(root, &patch.children)
}

fn apply_op(root: &mut Node, op: &Node) -> Result<(), Diagnostic> {
    let Some(kind) = op.ident_attr("kind") else {
        return Err(Diagnostic::at_node("PAT001", "Patch op missing kind.", op));
    };
    match kind {
        "replaceNode" => {
            let id = op
                .ident_attr("id")
                .ok_or_else(|| Diagnostic::at_node("PAT002", "replaceNode requires id.", op))?;
            let [replacement] = op.children.as_slice() else {
                return Err(Diagnostic::at_node(
                    "PAT003",
                    "replaceNode requires one child node.",
                    op,
                ));
            };
            replace_node(root, id, replacement.clone())
        }
        "deleteNode" => {
            let id = op
                .ident_attr("id")
                .ok_or_else(|| Diagnostic::at_node("PAT004", "deleteNode requires id.", op))?;
            delete_node(root, id)
        }
        "insertChild" => insert_child(root, op),
        other => Err(Diagnostic::at_node(
            "PAT999",
            format!("Unknown patch op '{}'.", other),
            op,
        )),
    }
}

/// Lookup failures point at the missing id, spanned at the root.
fn not_found(span: Span, id: &str) -> Diagnostic {
    Diagnostic {
        node_id: Some(id.to_string()),
        ..Diagnostic::at_span("PAT005", format!("Node '{}' not found.", id), span)
    }
}

fn replace_node(root: &mut Node, id: &str, replacement: Node) -> Result<(), Diagnostic> {
    if root.id == id {
        *root = replacement;
        return Ok(());
    }
    let span = root.span;
    match root.find_parent_mut(id) {
        Some((parent, index)) => {
            parent.children[index] = replacement;
            Ok(())
        }
        None => Err(not_found(span, id)),
    }
}

fn delete_node(root: &mut Node, id: &str) -> Result<(), Diagnostic> {
    if root.id == id {
        return Err(Diagnostic {
            node_id: Some(id.to_string()),
            ..Diagnostic::at_span("PAT006", "Cannot delete root node.", root.span)
        });
    }
    let span = root.span;
    match root.find_parent_mut(id) {
        Some((parent, index)) => {
            parent.children.remove(index);
            Ok(())
        }
        None => Err(not_found(span, id)),
    }
}

fn insert_child(root: &mut Node, op: &Node) -> Result<(), Diagnostic> {
    let parent_id = op
        .ident_attr("parentId")
        .ok_or_else(|| Diagnostic::at_node("PAT007", "insertChild requires parentId.", op))?;
    let slot = op
        .ident_attr("slot")
        .ok_or_else(|| Diagnostic::at_node("PAT008", "insertChild requires slot.", op))?;
    let index = op
        .attr("index")
        .and_then(AttrValue::as_int)
        .ok_or_else(|| Diagnostic::at_node("PAT009", "insertChild requires index.", op))?;
    let [child] = op.children.as_slice() else {
        return Err(Diagnostic::at_node(
            "PAT010",
            "insertChild requires one child node.",
            op,
        ));
    };

    let Some(parent) = root.find_mut(parent_id) else {
        return Err(Diagnostic::at_node(
            "PAT011",
            format!("Parent '{}' not found.", parent_id),
            op,
        ));
    };
    if !slot_allowed(&parent.kind, slot) {
        return Err(Diagnostic::at_node(
            "PAT012",
            format!("Slot '{}' not valid for {}.", slot, parent.kind),
            op,
        ));
    }
    match usize::try_from(index) {
        Ok(at) if at <= parent.children.len() => {
            parent.children.insert(at, child.clone());
            Ok(())
        }
        _ => Err(Diagnostic::at_node("PAT013", "Insert index out of range.", op)),
    }
}

/// Child slot names accepted per parent kind.
fn slot_allowed(kind: &str, slot: &str) -> bool {
    matches!(
        (kind, slot),
        ("Program", "declarations") | ("Block", "statements") | ("Call", "args")
    )
}
