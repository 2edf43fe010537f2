//! Compiled-class records and cross-unit linking.

mod loader;

pub use loader::{ClassLoader, LinkError, ResolvedBases};

use ahash::AHashMap;

use crate::ast::TypeName;
use crate::bytecode::Code;
use crate::intern::StringPool;
use crate::value::Value;

/// One instance or common field as laid out by the compiler.
#[derive(Debug, Clone)]
pub struct VariableDesc {
    pub name: String,
    pub ty: TypeName,
    pub common: bool,
    pub sav: bool,
    pub offset: u32,
    pub size: u32,
    /// Element count for a `tipo nome[N]` vector declaration; `None` for a
    /// plain scalar field.
    pub vector_size: Option<u32>,
}

/// A constant's payload: either a value known at compile time, or a
/// bytecode thunk evaluated lazily on first use.
#[derive(Debug, Clone)]
pub enum ConstantValue {
    Immediate(Value),
    Thunk(Code),
}

#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub name: String,
    pub code: Code,
    pub is_virtual: bool,
}

/// One compiled class, as produced by the compiler for a single `classe`
/// declaration. Base-class names are unresolved strings until a
/// [`ClassLoader`] links a set of units together.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub class_name: String,
    pub base_names: Vec<String>,
    pub variables: Vec<VariableDesc>,
    pub functions: AHashMap<String, CompiledFunction>,
    pub constants: AHashMap<String, ConstantValue>,
    pub strings: StringPool,
    pub total_variable_size: u32,
}

impl CompiledUnit {
    pub fn new(class_name: String, base_names: Vec<String>) -> Self {
        Self {
            class_name,
            base_names,
            variables: Vec::new(),
            functions: AHashMap::new(),
            constants: AHashMap::new(),
            strings: StringPool::new(),
            total_variable_size: 0,
        }
    }

    pub fn find_function(&self, folded_name: &str) -> Option<&CompiledFunction> {
        self.functions.get(folded_name)
    }

    pub fn find_variable(&self, folded_name: &str) -> Option<&VariableDesc> {
        self.variables.iter().find(|v| crate::util::fold_name(&v.name) == folded_name)
    }
}
