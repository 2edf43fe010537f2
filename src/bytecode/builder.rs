//! Emits bytecode during compilation, handling jump patching and source
//! location tracking.

use super::code::{Code, LineEntry};
use super::op::Opcode;

#[derive(Debug, Default)]
pub struct CodeBuilder {
    bytecode: Vec<u8>,
    lines: Vec<LineEntry>,
    current_line: u32,
    current_stack_depth: i32,
    max_stack_depth: i32,
    start_line: u32,
}

/// Label returned by [`CodeBuilder::emit_jump`]; pass to
/// [`CodeBuilder::patch_jump`] once the target is known.
#[derive(Debug, Clone, Copy)]
pub struct JumpLabel(usize);

impl CodeBuilder {
    pub fn new(start_line: u32) -> Self {
        Self {
            start_line,
            current_line: start_line,
            ..Default::default()
        }
    }

    pub fn set_line(&mut self, line: u32) {
        if line == self.current_line {
            return;
        }
        self.current_line = line;
        self.lines.push(LineEntry {
            offset: self.bytecode.len() as u32,
            line,
        });
    }

    pub fn current_offset(&self) -> usize {
        self.bytecode.len()
    }

    fn track(&mut self, effect: i32) {
        self.current_stack_depth += effect;
        if self.current_stack_depth > self.max_stack_depth {
            self.max_stack_depth = self.current_stack_depth;
        }
    }

    pub fn emit(&mut self, op: Opcode) {
        self.bytecode.push(op as u8);
        if let Some(effect) = op.stack_effect() {
            self.track(effect);
        }
    }

    /// Emits an opcode whose net stack effect isn't fixed (calls, `New`,
    /// the dynamic-name opcodes); the caller supplies the computed effect.
    pub fn emit_with_effect(&mut self, op: Opcode, effect: i32) {
        self.bytecode.push(op as u8);
        self.track(effect);
    }

    pub fn emit_u8(&mut self, op: Opcode, operand: u8) {
        self.emit(op);
        self.bytecode.push(operand);
    }

    pub fn emit_u8_with_effect(&mut self, op: Opcode, operand: u8, effect: i32) {
        self.emit_with_effect(op, effect);
        self.bytecode.push(operand);
    }

    pub fn emit_u16(&mut self, op: Opcode, operand: u16) {
        self.emit(op);
        self.bytecode.extend_from_slice(&operand.to_le_bytes());
    }

    pub fn emit_u16_with_effect(&mut self, op: Opcode, operand: u16, effect: i32) {
        self.emit_with_effect(op, effect);
        self.bytecode.extend_from_slice(&operand.to_le_bytes());
    }

    pub fn emit_u16_u8_with_effect(&mut self, op: Opcode, a: u16, b: u8, effect: i32) {
        self.emit_with_effect(op, effect);
        self.bytecode.extend_from_slice(&a.to_le_bytes());
        self.bytecode.push(b);
    }

    pub fn emit_u16_u16(&mut self, op: Opcode, a: u16, b: u16) {
        self.emit(op);
        self.bytecode.extend_from_slice(&a.to_le_bytes());
        self.bytecode.extend_from_slice(&b.to_le_bytes());
    }

    pub fn emit_i32(&mut self, op: Opcode, operand: i32) {
        self.emit(op);
        self.bytecode.extend_from_slice(&operand.to_le_bytes());
    }

    pub fn emit_f64(&mut self, op: Opcode, operand: f64) {
        self.emit(op);
        self.bytecode.extend_from_slice(&operand.to_le_bytes());
    }

    /// Emits a forward jump with a placeholder offset, returning a label to
    /// patch once the target is known.
    pub fn emit_jump(&mut self, op: Opcode) -> JumpLabel {
        let label = JumpLabel(self.bytecode.len());
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&0i16.to_le_bytes());
        if let Some(effect) = op.stack_effect() {
            self.track(effect);
        }
        label
    }

    /// Patches a forward jump to target the current bytecode position.
    pub fn patch_jump(&mut self, label: JumpLabel) {
        let target = self.bytecode.len();
        self.retarget_jump(label, target);
    }

    /// Patches a previously emitted jump to target an arbitrary, already
    /// known bytecode offset (used for `continuar`, whose target is a
    /// loop's condition or increment, not "here").
    pub fn retarget_jump(&mut self, label: JumpLabel, target: usize) {
        let raw = target as i64 - label.0 as i64 - 3;
        let offset = i16::try_from(raw).expect("jump offset exceeds i16 range; function too large");
        let bytes = offset.to_le_bytes();
        self.bytecode[label.0 + 1] = bytes[0];
        self.bytecode[label.0 + 2] = bytes[1];
    }

    /// Emits a backward jump to an already-known target (loop heads).
    pub fn emit_jump_to(&mut self, op: Opcode, target: usize) {
        let current = self.bytecode.len() as i64;
        let raw = target as i64 - (current + 3);
        let offset = i16::try_from(raw).expect("jump offset exceeds i16 range; function too large");
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&offset.to_le_bytes());
        if let Some(effect) = op.stack_effect() {
            self.track(effect);
        }
    }

    pub fn build(self, num_locals: u16) -> Code {
        Code {
            bytecode: self.bytecode,
            num_locals,
            max_stack_depth: self.max_stack_depth.max(0) as u16,
            lines: self.lines,
            start_line: self.start_line,
        }
    }
}
