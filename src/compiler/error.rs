use std::fmt;

use crate::span::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum CompileErrorKind {
    Redefinition(String),
    UndefinedVariable(String),
    InvalidAssignmentTarget,
    UnknownOperator(String),
    TextSizeOutOfRange(u32),
    DuplicateLocal(String),
    VectorSizeOutOfRange(u32),
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileErrorKind::Redefinition(name) => write!(f, "redefinition of '{name}'"),
            CompileErrorKind::UndefinedVariable(name) => write!(f, "undefined variable '{name}'"),
            CompileErrorKind::InvalidAssignmentTarget => write!(f, "invalid assignment target"),
            CompileErrorKind::UnknownOperator(op) => write!(f, "unknown operator '{op}'"),
            CompileErrorKind::TextSizeOutOfRange(n) => write!(f, "text capacity {n} out of range"),
            CompileErrorKind::DuplicateLocal(name) => write!(f, "duplicate local '{name}'"),
            CompileErrorKind::VectorSizeOutOfRange(n) => write!(f, "vector size {n} out of range"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub span: Span,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.span, self.kind)
    }
}

impl std::error::Error for CompileError {}

pub type CResult<T> = Result<T, CompileError>;
