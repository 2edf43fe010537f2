//! The embedding surface a host application drives: source text in,
//! `Value`s and side effects out.
//!
//! `Program` bundles a linked [`ClassLoader`] with a [`Vm`], mirroring how a
//! host actually uses this crate — compile once, then create instances and
//! call methods against the same loaded classes for the life of the
//! session. Keeping the two separate at the `Vm` level (see `vm::Vm`'s own
//! doc comment) would make every host call site thread the loader through
//! by hand; `Program` is that convenience wrapper.

use std::fmt;

use crate::class::{ClassLoader, CompiledUnit, LinkError};
use crate::compiler::{self, CompileError};
use crate::lexer::{self, LexError};
use crate::object::ObjectId;
use crate::parser::{self, ParseError};
use crate::resource::{QuotaTracker, ResourceTracker};
use crate::tracer::{NoopTracer, VmTracer};
use crate::value::Value;
use crate::vm::{RunFault, Vm};

/// Every failure mode a host can hit before it has a running `Program`,
/// separated by pipeline stage so a host can react without string matching.
#[derive(Debug, Clone)]
pub enum ProgramError {
    Lex(LexError),
    /// Parsing accumulates and returns every recoverable error it found,
    /// up to `parser::MAX_PARSE_ERRORS`, rather than stopping at the first.
    Parse(Vec<ParseError>),
    Compile(CompileError),
    Link(LinkError),
}

impl fmt::Display for ProgramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramError::Lex(e) => write!(f, "{e}"),
            ProgramError::Parse(errs) => {
                for (i, e) in errs.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{e}")?;
                }
                Ok(())
            }
            ProgramError::Compile(e) => write!(f, "{e}"),
            ProgramError::Link(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ProgramError {}

impl From<LexError> for ProgramError {
    fn from(e: LexError) -> Self {
        ProgramError::Lex(e)
    }
}

impl From<CompileError> for ProgramError {
    fn from(e: CompileError) -> Self {
        ProgramError::Compile(e)
    }
}

impl From<LinkError> for ProgramError {
    fn from(e: LinkError) -> Self {
        ProgramError::Link(e)
    }
}

/// Lexes, parses and compiles one source file into its per-class bytecode
/// units.
///
/// Does not link or load the units into a `Program` — a host typically
/// compiles several files this way and hands the concatenated unit list to
/// [`Program::load_program`] once.
pub fn compile(source: &str, file_name: &str) -> Result<Vec<CompiledUnit>, ProgramError> {
    let tokens = lexer::tokenize(source)?;
    let ast = parser::parse(&tokens, file_name).map_err(ProgramError::Parse)?;
    Ok(compiler::compile(&ast)?)
}

/// A loaded, linked program ready to create instances and run methods.
///
/// Generic over the tracing hook `T` exactly like `Vm`; the instruction
/// budget always uses [`QuotaTracker`] here, since `setMaxInstructions` is
/// part of this type's public contract and needs somewhere to land.
pub struct Program<T: VmTracer = NoopTracer> {
    loader: ClassLoader,
    vm: Vm<QuotaTracker, T>,
}

/// No quota until a host calls `set_max_instructions`.
const UNBOUNDED: u64 = u64::MAX;

impl<T: VmTracer + Default> Program<T> {
    pub fn new() -> Self {
        Self {
            loader: ClassLoader::new(),
            vm: Vm::with_tracker_and_tracer(QuotaTracker::new(UNBOUNDED), T::default()),
        }
    }
}

impl<T: VmTracer + Default> Default for Program<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: VmTracer> Program<T> {
    pub fn with_tracer(tracer: T) -> Self {
        Self {
            loader: ClassLoader::new(),
            vm: Vm::with_tracker_and_tracer(QuotaTracker::new(UNBOUNDED), tracer),
        }
    }

    /// Adds the compiled units to the program and re-links the whole class
    /// graph. Units from earlier calls are kept, so a host may load a
    /// standard-library file and a user file in two calls.
    pub fn load_program(&mut self, units: Vec<CompiledUnit>) -> Result<(), LinkError> {
        for unit in units {
            self.loader.add_unit(unit);
        }
        self.loader.link()
    }

    /// Constructs an instance of `class_name`, running its `construtor` if
    /// declared.
    pub fn create_instance(&mut self, class_name: &str, args: Vec<Value>) -> Result<Value, RunFault> {
        self.vm.create_instance(&self.loader, class_name, args)
    }

    /// Invokes `method_name` on a live object.
    pub fn call_method(&mut self, object: ObjectId, method_name: &str, args: Vec<Value>) -> Result<Value, RunFault> {
        self.vm.call_method(&self.loader, object, method_name, args)
    }

    /// Runs `destrutor` if declared, then tombstones the object.
    pub fn delete_instance(&mut self, object: ObjectId) -> Result<(), RunFault> {
        self.vm.delete_instance(&self.loader, object)
    }

    /// Installs the sink for `imprime`.
    pub fn on_output(&mut self, sink: impl FnMut(&str) + 'static) {
        self.vm.on_output(sink);
    }

    /// Installs the source for `le`.
    pub fn set_input(&mut self, source: impl FnMut() -> String + 'static) {
        self.vm.set_input(source);
    }

    /// Caps every subsequent top-level `create_instance`/`call_method`
    /// invocation's total instruction count. Does not reset the count
    /// already accrued.
    pub fn set_max_instructions(&mut self, n: u64) {
        self.vm.tracker_mut().set_limit(n);
    }

    pub fn instruction_count(&self) -> u64 {
        self.vm.instruction_count()
    }

    pub fn loader(&self) -> &ClassLoader {
        &self.loader
    }

    pub fn vm(&self) -> &Vm<QuotaTracker, T> {
        &self.vm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_and_run_a_one_class_program() {
        let source = r#"
classe Saudacao {
  func ola:
    ret "ola"
}
"#;
        let units = compile(source, "saudacao.escriba").expect("compiles");
        let mut program: Program = Program::new();
        program.load_program(units).expect("links");
        let obj = program.create_instance("Saudacao", Vec::new()).expect("constructs");
        let Value::Object(id) = obj else { panic!("expected an object") };
        let result = program.call_method(id, "ola", Vec::new()).expect("calls");
        assert!(matches!(result, Value::Str(s) if &*s == "ola"));
    }

    #[test]
    fn quota_exceeded_surfaces_as_a_run_fault() {
        let source = r#"
classe Laco {
  func roda:
    enquanto 1
    efim
    ret 0
}
"#;
        let units = compile(source, "laco.escriba").expect("compiles");
        let mut program: Program = Program::new();
        program.load_program(units).expect("links");
        program.set_max_instructions(100);
        let obj = program.create_instance("Laco", Vec::new()).expect("constructs");
        let Value::Object(id) = obj else { panic!("expected an object") };
        let result = program.call_method(id, "roda", Vec::new());
        assert!(matches!(result, Err(RunFault::Quota(_))));
    }
}
