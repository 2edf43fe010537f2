//! The seam to host-supplied domain value types: files, directories,
//! sockets, timers, object lists, fixed-width text buffers.
//!
//! The core never knows the concrete representation of a domain value; it
//! only calls through this trait, treating builtin-type behavior as
//! implementations of a shared trait rather than hardcoded matches in the
//! VM.

use std::fmt;

use crate::value::Value;

/// An opaque piece of host-managed state (a file handle, a socket, a timer)
/// tagged with the handler that knows how to operate on it.
pub struct DomainValue {
    pub type_name: &'static str,
    pub memory: Box<dyn std::any::Any>,
}

impl fmt::Debug for DomainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainValue").field("type_name", &self.type_name).finish()
    }
}

impl DomainValue {
    pub fn new(type_name: &'static str, memory: Box<dyn std::any::Any>) -> Self {
        Self { type_name, memory }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn display(&self) -> String {
        format!("<{}>", self.type_name)
    }
}

/// Execution context passed to [`TypeHandler::execute_function`]: the
/// handler may need to read globals, call back into a builtin, or raise a
/// fault, but never touches VM internals directly.
pub struct TypeHandlerCtx<'a> {
    pub args: &'a [Value],
}

/// Implemented once per host-side domain value type; instances are consumed
/// through `&dyn TypeHandler` so the core never depends on concrete file,
/// socket, or timer types.
pub trait TypeHandler {
    /// Size in memory-units this instruction's typed storage occupies.
    fn size(&self, instruction: &str) -> usize;

    fn initialize(&self, memory: &mut dyn std::any::Any);

    fn get_bool(&self, memory: &dyn std::any::Any) -> bool;
    fn get_int(&self, memory: &dyn std::any::Any) -> i64;
    fn get_double(&self, memory: &dyn std::any::Any) -> f64;
    fn get_text(&self, memory: &dyn std::any::Any) -> String;

    fn set_int(&self, memory: &mut dyn std::any::Any, value: i64);
    fn set_double(&self, memory: &mut dyn std::any::Any, value: f64);
    fn set_text(&self, memory: &mut dyn std::any::Any, value: &str);

    fn assign(&self, dest: &mut dyn std::any::Any, source: &dyn std::any::Any);
    fn compare(&self, a: &dyn std::any::Any, b: &dyn std::any::Any) -> std::cmp::Ordering;
    fn equals(&self, a: &dyn std::any::Any, b: &dyn std::any::Any) -> bool;

    fn execute_function(&self, memory: &mut dyn std::any::Any, name: &str, ctx: TypeHandlerCtx<'_>) -> Value;
}
