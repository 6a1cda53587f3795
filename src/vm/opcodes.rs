//! AOS bytecode instruction set.
//!
//! Instructions travel as string mnemonics with generic `a`/`b`/`s`
//! operands; the VM decodes each mnemonic to an `Opcode` once at load.

use std::fmt;

use crate::runtime::ops::Op;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ── Stack & locals ───────────────────────────────────────────────
    Nop,
    /// Push constants[a]
    Const,
    PushInt,
    /// Push `a != 0`
    PushBool,
    PushVoid,
    Pop,
    Dup,
    LoadLocal,
    /// Pop → locals[a]
    StoreLocal,

    // ── Control flow (absolute targets) ──────────────────────────────
    Jump,
    /// Pop; jump to a when false
    JumpIfFalse,
    /// Peek; jump to a when the top is an Err node
    JumpIfErr,

    // ── Operators ────────────────────────────────────────────────────
    Eq,
    Add,
    ToString,
    StrConcat,
    StrEscape,
    NodeKind,
    NodeId,
    AttrCount,
    AttrKey,
    AttrValueKind,
    AttrValueString,
    AttrValueInt,
    AttrValueBool,
    ChildCount,
    ChildAt,
    MakeBlock,
    AppendChild,
    MakeErr,
    MakeLitString,

    // ── Calls ────────────────────────────────────────────────────────
    /// Call function s with a arguments
    Call,
    /// Capability call to target s with a arguments
    CallSys,
    Return,
    Halt,
}

const TABLE: &[(Opcode, &str)] = &[
    (Opcode::Nop, "NOP"),
    (Opcode::Const, "CONST"),
    (Opcode::PushInt, "PUSH_INT"),
    (Opcode::PushBool, "PUSH_BOOL"),
    (Opcode::PushVoid, "PUSH_VOID"),
    (Opcode::Pop, "POP"),
    (Opcode::Dup, "DUP"),
    (Opcode::LoadLocal, "LOAD_LOCAL"),
    (Opcode::StoreLocal, "STORE_LOCAL"),
    (Opcode::Jump, "JUMP"),
    (Opcode::JumpIfFalse, "JUMP_IF_FALSE"),
    (Opcode::JumpIfErr, "JUMP_IF_ERR"),
    (Opcode::Eq, "EQ"),
    (Opcode::Add, "ADD"),
    (Opcode::ToString, "TO_STRING"),
    (Opcode::StrConcat, "STR_CONCAT"),
    (Opcode::StrEscape, "STR_ESCAPE"),
    (Opcode::NodeKind, "NODE_KIND"),
    (Opcode::NodeId, "NODE_ID"),
    (Opcode::AttrCount, "ATTR_COUNT"),
    (Opcode::AttrKey, "ATTR_KEY"),
    (Opcode::AttrValueKind, "ATTR_VALUE_KIND"),
    (Opcode::AttrValueString, "ATTR_VALUE_STRING"),
    (Opcode::AttrValueInt, "ATTR_VALUE_INT"),
    (Opcode::AttrValueBool, "ATTR_VALUE_BOOL"),
    (Opcode::ChildCount, "CHILD_COUNT"),
    (Opcode::ChildAt, "CHILD_AT"),
    (Opcode::MakeBlock, "MAKE_BLOCK"),
    (Opcode::AppendChild, "APPEND_CHILD"),
    (Opcode::MakeErr, "MAKE_ERR"),
    (Opcode::MakeLitString, "MAKE_LIT_STRING"),
    (Opcode::Call, "CALL"),
    (Opcode::CallSys, "CALL_SYS"),
    (Opcode::Return, "RETURN"),
    (Opcode::Halt, "HALT"),
];

impl Opcode {
    pub fn from_mnemonic(text: &str) -> Option<Opcode> {
        TABLE.iter().find(|(_, m)| *m == text).map(|(op, _)| *op)
    }

    pub fn mnemonic(self) -> &'static str {
        TABLE
            .iter()
            .find(|(op, _)| *op == self)
            .map(|(_, m)| *m)
            .unwrap_or("NOP")
    }

    /// The shared operator an opcode applies, if it is one.
    pub fn operator(self) -> Option<Op> {
        let op = match self {
            Opcode::Eq => Op::Eq,
            Opcode::Add => Op::Add,
            Opcode::ToString => Op::ToString,
            Opcode::StrConcat => Op::StrConcat,
            Opcode::StrEscape => Op::StrEscape,
            Opcode::NodeKind => Op::NodeKind,
            Opcode::NodeId => Op::NodeId,
            Opcode::AttrCount => Op::AttrCount,
            Opcode::AttrKey => Op::AttrKey,
            Opcode::AttrValueKind => Op::AttrValueKind,
            Opcode::AttrValueString => Op::AttrValueString,
            Opcode::AttrValueInt => Op::AttrValueInt,
            Opcode::AttrValueBool => Op::AttrValueBool,
            Opcode::ChildCount => Op::ChildCount,
            Opcode::ChildAt => Op::ChildAt,
            Opcode::MakeBlock => Op::MakeBlock,
            Opcode::AppendChild => Op::AppendChild,
            Opcode::MakeErr => Op::MakeErr,
            Opcode::MakeLitString => Op::MakeLitString,
            _ => return None,
        };
        Some(op)
    }

    /// Opcode for a shared operator; the compiler's direction.
    pub fn for_operator(op: Op) -> Opcode {
        TABLE
            .iter()
            .map(|(code, _)| *code)
            .find(|code| code.operator() == Some(op))
            .unwrap_or(Opcode::Nop)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
