pub mod lexer;
pub mod ast;
pub mod parser;
pub mod format;
pub mod verify;
pub mod capability;
pub mod runtime;
pub mod vm;
pub mod debug;
pub mod patch;
pub mod stack;
