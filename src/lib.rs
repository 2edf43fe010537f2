//! Compiler and bytecode virtual machine for a small Portuguese-keyword
//! object-oriented scripting language.
//!
//! Pipeline: source text → [`lexer`] → token stream → [`parser`] → AST →
//! [`compiler`] → one [`class::CompiledUnit`] per class → [`class::ClassLoader`]
//! (resolves inheritance across units) → [`vm`] executes a named entry
//! function on a constructed object. [`host`] is the thin façade a host
//! application actually drives; most callers want [`host::Program`] rather
//! than the lower-level pipeline stages directly.

pub mod ast;
pub mod builtins;
pub mod bytecode;
pub mod class;
pub mod compiler;
pub mod host;
pub mod intern;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod resource;
pub mod span;
pub mod tracer;
pub mod typehandler;
pub mod util;
pub mod value;
pub mod vm;

pub use host::{compile, Program, ProgramError};
pub use object::ObjectId;
pub use resource::{NoLimitTracker, QuotaExceeded, QuotaTracker, ResourceTracker};
pub use tracer::{NoopTracer, StderrTracer, VmTracer};
pub use typehandler::{DomainValue, TypeHandler, TypeHandlerCtx};
pub use value::{Number, Value};
pub use vm::{RunFault, Vm};
