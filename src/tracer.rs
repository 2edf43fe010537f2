//! Zero-cost execution tracing.
//!
//! Every hook has a no-op default so a `NoopTracer` compiles away entirely;
//! hosts that want instruction-level visibility plug in [`StderrTracer`] or
//! their own implementation.

use crate::bytecode::Opcode;

pub trait VmTracer: std::fmt::Debug {
    fn on_instruction(&mut self, _ip: usize, _opcode: Opcode, _stack_depth: usize, _frame_depth: usize) {}
    fn on_call(&mut self, _func_name: &str, _depth: usize) {}
    fn on_return(&mut self, _depth: usize) {}
    fn on_new(&mut self, _class_name: &str) {}
    fn on_delete(&mut self, _class_name: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Prints each dispatched instruction to stderr; useful for debugging a
/// single compile-and-run session, not meant for production hosts.
#[derive(Debug, Default)]
pub struct StderrTracer {
    count: u64,
}

impl VmTracer for StderrTracer {
    fn on_instruction(&mut self, ip: usize, opcode: Opcode, stack_depth: usize, frame_depth: usize) {
        eprintln!("[{ip:>5}] {opcode}  stack={stack_depth}  frames={frame_depth}");
        self.count += 1;
    }

    fn on_call(&mut self, func_name: &str, depth: usize) {
        eprintln!("  >>> CALL {func_name:<20} depth={depth}");
    }

    fn on_return(&mut self, depth: usize) {
        eprintln!("  <<< RETURN depth={depth}");
    }

    fn on_new(&mut self, class_name: &str) {
        eprintln!("  +++ NEW {class_name}");
    }

    fn on_delete(&mut self, class_name: &str) {
        eprintln!("  --- DELETE {class_name}");
    }
}
