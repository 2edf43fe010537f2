//! The bytecode interpreter.
//!
//! `run_frames` is a single iterative dispatch loop: one shared operand
//! stack plus an explicit `Vec<Frame>` call stack. `CallMethod`/
//! `CallMethodDynamic`/`CallDynamic` push a new frame and loop rather than
//! recursing through Rust's call stack, so ordinary method-call chains
//! can nest arbitrarily deep without a stack overflow. Constructors,
//! destructors and lazily-evaluated constants are comparatively rare and
//! shallow, so those go through genuine (bounded) Rust recursion instead —
//! see `call::eval_thunk`/`exec_new`/`exec_delete`.

mod arith;
mod call;
mod dynamic;

use std::fmt;

use ahash::AHashMap;

use crate::bytecode::{Code, Opcode};
use crate::class::ClassLoader;
use crate::intern::{StringId, StringPool};
use crate::object::{ObjectId, ObjectTable};
use crate::resource::{NoLimitTracker, QuotaExceeded, ResourceTracker};
use crate::tracer::{NoopTracer, VmTracer};
use crate::util::fold_name;
use crate::value::Value;

/// One active function invocation. Borrows straight into the owning
/// `ClassLoader`'s compiled data (`'u` = the loader's lifetime), so no
/// bytecode or string pool is ever copied per call.
pub struct Frame<'u> {
    code: &'u Code,
    strings: &'u StringPool,
    defining_class: &'u str,
    ip: usize,
    locals: Vec<Value>,
    /// The object this function runs on, if any (`None` for a constant
    /// thunk or class-level-only evaluation).
    receiver: Option<ObjectId>,
    args: Vec<Value>,
}

/// Conditions that abort interpretation outright. Ordinary source-language
/// misuse (calling an uncallable value, indexing out of range) is
/// deliberately *not* modeled here — it degrades to a default `Value` and
/// execution continues.
#[derive(Debug)]
pub enum RunFault {
    Quota(QuotaExceeded),
    StackUnderflow,
    NoFrame,
    CorruptBytecode(String),
}

impl fmt::Display for RunFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunFault::Quota(e) => write!(f, "{e}"),
            RunFault::StackUnderflow => write!(f, "operand stack underflow"),
            RunFault::NoFrame => write!(f, "no active call frame"),
            RunFault::CorruptBytecode(msg) => write!(f, "corrupt bytecode: {msg}"),
        }
    }
}

impl std::error::Error for RunFault {}

fn next_u8(code: &Code, ip: &mut usize) -> Result<u8, RunFault> {
    let b = *code.bytecode.get(*ip).ok_or_else(|| RunFault::CorruptBytecode("truncated u8 operand".into()))?;
    *ip += 1;
    Ok(b)
}

fn next_u16(code: &Code, ip: &mut usize) -> Result<u16, RunFault> {
    let bytes = code
        .bytecode
        .get(*ip..*ip + 2)
        .ok_or_else(|| RunFault::CorruptBytecode("truncated u16 operand".into()))?;
    *ip += 2;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn next_i16(code: &Code, ip: &mut usize) -> Result<i16, RunFault> {
    Ok(next_u16(code, ip)? as i16)
}

fn next_i32(code: &Code, ip: &mut usize) -> Result<i32, RunFault> {
    let bytes = code
        .bytecode
        .get(*ip..*ip + 4)
        .ok_or_else(|| RunFault::CorruptBytecode("truncated i32 operand".into()))?;
    *ip += 4;
    Ok(i32::from_le_bytes(bytes.try_into().expect("slice of len 4")))
}

fn next_f64(code: &Code, ip: &mut usize) -> Result<f64, RunFault> {
    let bytes = code
        .bytecode
        .get(*ip..*ip + 8)
        .ok_or_else(|| RunFault::CorruptBytecode("truncated f64 operand".into()))?;
    *ip += 8;
    Ok(f64::from_le_bytes(bytes.try_into().expect("slice of len 8")))
}

/// The bytecode interpreter. Generic over an instruction-budget tracker and
/// a tracing hook, each defaulting to a zero-cost no-op implementation.
///
/// Deliberately does not own a `ClassLoader`: callers pass one in by
/// reference to every entry point, which avoids a self-referential struct
/// (frames borrow straight out of the loader's compiled units).
#[derive(Debug)]
pub struct Vm<R: ResourceTracker = NoLimitTracker, T: VmTracer = NoopTracer> {
    objects: ObjectTable,
    tracker: R,
    tracer: T,
    /// Backs `LoadGlobal`/`StoreGlobal`, a flat namespace independent of any
    /// class or instance.
    globals: AHashMap<String, Value>,
    /// Common (class-shared) variables and ad hoc class-level dynamic
    /// fields, keyed by folded owning-class name then folded field name.
    commons: AHashMap<String, AHashMap<String, Value>>,
    output: Option<Box<dyn FnMut(&str)>>,
    input: Option<Box<dyn FnMut() -> String>>,
}

impl<R: ResourceTracker + Default, T: VmTracer + Default> Default for Vm<R, T> {
    fn default() -> Self {
        Self {
            objects: ObjectTable::new(),
            tracker: R::default(),
            tracer: T::default(),
            globals: AHashMap::new(),
            commons: AHashMap::new(),
            output: None,
            input: None,
        }
    }
}

impl<R: ResourceTracker + Default, T: VmTracer + Default> Vm<R, T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: ResourceTracker, T: VmTracer> Vm<R, T> {
    pub fn with_tracker_and_tracer(tracker: R, tracer: T) -> Self {
        Self {
            objects: ObjectTable::new(),
            tracker,
            tracer,
            globals: AHashMap::new(),
            commons: AHashMap::new(),
            output: None,
            input: None,
        }
    }

    pub fn objects(&self) -> &ObjectTable {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut ObjectTable {
        &mut self.objects
    }

    pub fn instruction_count(&self) -> u64 {
        self.tracker.instruction_count()
    }

    pub fn tracker_mut(&mut self) -> &mut R {
        &mut self.tracker
    }

    /// Installs the sink for `imprime`.
    pub fn on_output(&mut self, sink: impl FnMut(&str) + 'static) {
        self.output = Some(Box::new(sink));
    }

    /// Installs the source for `le`.
    pub fn set_input(&mut self, source: impl FnMut() -> String + 'static) {
        self.input = Some(Box::new(source));
    }

    /// Allocates and constructs an instance, running `construtor` if the
    /// class declares one.
    pub fn create_instance(&mut self, loader: &ClassLoader, class_name: &str, args: Vec<Value>) -> Result<Value, RunFault> {
        self.exec_new(loader, class_name, args)
    }

    /// Invokes a method on a live object by name. Returns `nulo` if the
    /// object is gone or the class has no such method — the same
    /// graceful-degradation contract method dispatch uses internally.
    pub fn call_method(&mut self, loader: &ClassLoader, object: ObjectId, method_name: &str, args: Vec<Value>) -> Result<Value, RunFault> {
        let Some(class_name) = self.objects.get(object).map(|o| o.class_name.clone()) else {
            return Ok(Value::Null);
        };
        let folded = fold_name(method_name);
        let Some((owner, func)) = loader.find_method(&class_name, &folded) else {
            return Ok(Value::Null);
        };
        let strings = &loader.unit(owner).expect("owner returned by find_method").strings;
        let mut frames = vec![Frame {
            code: &func.code,
            strings,
            defining_class: owner,
            ip: 0,
            locals: vec![Value::Null; func.code.num_locals as usize],
            receiver: Some(object),
            args,
        }];
        let mut stack = Vec::new();
        self.run_frames(loader, &mut frames, &mut stack)
    }

    /// Deletes an object, running `destrutor` if present.
    pub fn delete_instance(&mut self, loader: &ClassLoader, object: ObjectId) -> Result<(), RunFault> {
        self.exec_delete(loader, Value::Object(object))
    }

    /// Indexes a string (by character) or a vector field. Out-of-range on a
    /// vector surfaces the declared type's default value rather than
    /// faulting; anything else not indexable reads as `nulo`.
    fn resolve_index(haystack: &Value, index: &Value) -> Value {
        let Some(i) = index.as_number().map(|n| n.as_f64() as i64) else {
            return Value::Null;
        };
        match haystack {
            Value::Str(s) => {
                if i < 0 {
                    return Value::Null;
                }
                s.chars().nth(i as usize).map(|c| Value::str(c.to_string())).unwrap_or(Value::Null)
            }
            Value::Vector(v) => v.borrow().get(i),
            _ => Value::Null,
        }
    }

    /// Writes into a vector field's element at `index`. Unlike a scalar
    /// `StoreField`, the write is not truncated to the element's declared
    /// type — a vector has no per-element type tag to truncate against once
    /// allocated. Out-of-range writes and writes through anything but a
    /// vector are silent no-ops — there is no mutable indexed string type to
    /// write through.
    fn store_index(haystack: &Value, index: &Value, value: Value) {
        let Value::Vector(v) = haystack else { return };
        let Some(i) = index.as_number().map(|n| n.as_f64() as i64) else {
            return;
        };
        v.borrow_mut().set(i, value);
    }

    /// The core dispatch loop, usable both as the top-level entry point and
    /// (via `call::eval_thunk`/`exec_new`/`exec_delete`) recursively for
    /// constructors, destructors and constant thunks.
    fn run_frames<'u>(&mut self, loader: &'u ClassLoader, frames: &mut Vec<Frame<'u>>, stack: &mut Vec<Value>) -> Result<Value, RunFault> {
        loop {
            self.tracker.on_instruction().map_err(RunFault::Quota)?;

            let frame = frames.last_mut().ok_or(RunFault::NoFrame)?;
            let start_ip = frame.ip;
            let opcode_byte = next_u8(frame.code, &mut frame.ip)?;
            let opcode = Opcode::from_repr(opcode_byte)
                .ok_or_else(|| RunFault::CorruptBytecode(format!("unknown opcode byte {opcode_byte} at {start_ip}")))?;
            self.tracer.on_instruction(start_ip, opcode, stack.len(), frames.len());

            match opcode {
                Opcode::Nop | Opcode::Debug | Opcode::Line => {}

                Opcode::Pop => {
                    stack.pop();
                }
                Opcode::Dup => {
                    let v = stack.last().cloned().unwrap_or(Value::Null);
                    stack.push(v);
                }
                Opcode::Swap => {
                    let len = stack.len();
                    if len >= 2 {
                        stack.swap(len - 1, len - 2);
                    }
                }

                Opcode::PushNull => stack.push(Value::Null),
                Opcode::PushTrue => stack.push(Value::Int(1)),
                Opcode::PushFalse => stack.push(Value::Int(0)),
                Opcode::PushInt => {
                    let v = next_i32(frame.code, &mut frame.ip)?;
                    stack.push(Value::Int(v as i64));
                }
                Opcode::PushDouble => {
                    let v = next_f64(frame.code, &mut frame.ip)?;
                    stack.push(Value::Double(v));
                }
                Opcode::PushString => {
                    let id = next_u16(frame.code, &mut frame.ip)?;
                    stack.push(Value::str(frame.strings.get(StringId::from_index(id))));
                }

                Opcode::LoadLocal => {
                    let slot = next_u16(frame.code, &mut frame.ip)?;
                    stack.push(frame.locals.get(slot as usize).cloned().unwrap_or(Value::Null));
                }
                Opcode::StoreLocal => {
                    let slot = next_u16(frame.code, &mut frame.ip)?;
                    let v = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    if let Some(l) = frame.locals.get_mut(slot as usize) {
                        *l = v;
                    }
                }
                Opcode::LoadGlobal => {
                    let id = next_u16(frame.code, &mut frame.ip)?;
                    let name = fold_name(frame.strings.get(StringId::from_index(id)));
                    stack.push(self.globals.get(&name).cloned().unwrap_or(Value::Null));
                }
                Opcode::StoreGlobal => {
                    let id = next_u16(frame.code, &mut frame.ip)?;
                    let name = fold_name(frame.strings.get(StringId::from_index(id)));
                    let v = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    self.globals.insert(name, v);
                }

                Opcode::LoadArg => {
                    let idx = next_u8(frame.code, &mut frame.ip)?;
                    stack.push(frame.args.get(idx as usize).cloned().unwrap_or(Value::Null));
                }
                Opcode::StoreArg => {
                    let idx = next_u8(frame.code, &mut frame.ip)?;
                    let v = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    if let Some(a) = frame.args.get_mut(idx as usize) {
                        *a = v;
                    }
                }
                Opcode::LoadArgCount => stack.push(Value::Int(frame.args.len() as i64)),
                Opcode::LoadThis => stack.push(frame.receiver.map(Value::Object).unwrap_or(Value::Null)),

                Opcode::LoadIndex => {
                    let index = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let obj = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    stack.push(Self::resolve_index(&obj, &index));
                }
                Opcode::StoreIndex => {
                    // Stack order is [obj, index, value], value on top.
                    // Writing through a `txt` string (immutable `Rc<str>`)
                    // or any other non-vector is a silent no-op; the
                    // assignment expression's result still evaluates to
                    // `value` via the compiler's own temp-local pattern.
                    let value = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let index = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let obj = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    Self::store_index(&obj, &index, value);
                }

                Opcode::LoadField => {
                    let id = next_u16(frame.code, &mut frame.ip)?;
                    let folded_name = fold_name(frame.strings.get(StringId::from_index(id)));
                    let receiver = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let value = self.load_member_value(loader, &receiver, &folded_name)?;
                    stack.push(value);
                }
                Opcode::StoreField => {
                    let id = next_u16(frame.code, &mut frame.ip)?;
                    let folded_name = fold_name(frame.strings.get(StringId::from_index(id)));
                    let value = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let receiver = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    self.store_member_value(loader, &receiver, &folded_name, value);
                }
                Opcode::LoadFieldDynamic => {
                    let name_val = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let receiver = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let folded_name = fold_name(&name_val.stringify());
                    let value = self.load_member_value(loader, &receiver, &folded_name)?;
                    stack.push(value);
                }
                Opcode::StoreFieldDynamic => {
                    let value = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let name_val = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let receiver = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let folded_name = fold_name(&name_val.stringify());
                    self.store_member_value(loader, &receiver, &folded_name, value);
                }

                Opcode::LoadClass => {
                    let id = next_u16(frame.code, &mut frame.ip)?;
                    stack.push(Value::str(frame.strings.get(StringId::from_index(id))));
                }
                Opcode::LoadClassMember => {
                    let id = next_u16(frame.code, &mut frame.ip)?;
                    let folded_name = fold_name(frame.strings.get(StringId::from_index(id)));
                    let receiver = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let value = self.load_member_value(loader, &receiver, &folded_name)?;
                    stack.push(value);
                }
                Opcode::StoreClassMember => {
                    let id = next_u16(frame.code, &mut frame.ip)?;
                    let folded_name = fold_name(frame.strings.get(StringId::from_index(id)));
                    let value = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let receiver = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    self.store_member_value(loader, &receiver, &folded_name, value);
                }
                Opcode::LoadClassMemberDynamic => {
                    let name_val = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let receiver = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let folded_name = fold_name(&name_val.stringify());
                    let value = self.load_member_value(loader, &receiver, &folded_name)?;
                    stack.push(value);
                }
                Opcode::StoreClassMemberDynamic => {
                    let value = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let name_val = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let receiver = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let folded_name = fold_name(&name_val.stringify());
                    self.store_member_value(loader, &receiver, &folded_name, value);
                }

                Opcode::Concat => {
                    let b = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let a = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    stack.push(arith::concat(&a, &b));
                }
                Opcode::LoadDynamic => {
                    // Reused by the compiler both for a bare dynamic
                    // identifier and for a dynamically-computed class
                    // reference (`$<expr>.membro`, `Classe(<expr>).met()`):
                    // if the computed name names a known class, it IS the
                    // class value (what `LoadClass` would have pushed for a
                    // static name); otherwise it resolves like any other
                    // name against the current defining class/receiver.
                    let name_val = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let raw_name = name_val.stringify();
                    if let Some(unit) = loader.unit(&raw_name) {
                        stack.push(Value::str(unit.class_name.clone()));
                    } else {
                        let folded_name = fold_name(&raw_name);
                        let class_name = frame.defining_class;
                        let receiver = frame.receiver;
                        let value = self.load_member_by_class(loader, class_name, receiver, &folded_name)?;
                        stack.push(value);
                    }
                }
                Opcode::StoreDynamic => {
                    let value = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let name_val = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let folded_name = fold_name(&name_val.stringify());
                    let class_name = frame.defining_class.to_owned();
                    let receiver = frame.receiver;
                    dynamic::store_member(loader, &mut self.objects, &mut self.commons, &class_name, receiver, &folded_name, value);
                }

                Opcode::Add => binary(stack, arith::add)?,
                Opcode::Sub => binary(stack, arith::sub)?,
                Opcode::Mul => binary(stack, arith::mul)?,
                Opcode::Div => binary(stack, arith::div)?,
                Opcode::Mod => binary(stack, arith::rem)?,
                Opcode::Neg => unary(stack, arith::neg)?,
                Opcode::BitAnd => binary(stack, arith::bitand)?,
                Opcode::BitOr => binary(stack, arith::bitor)?,
                Opcode::BitXor => binary(stack, arith::bitxor)?,
                Opcode::BitNot => unary(stack, arith::bitnot)?,
                Opcode::Shl => binary(stack, arith::shl)?,
                Opcode::Shr => binary(stack, arith::shr)?,
                Opcode::CmpEq => binary(stack, arith::cmp_eq)?,
                Opcode::CmpStrictEq => binary(stack, arith::cmp_strict_eq)?,
                Opcode::CmpNotEq => binary(stack, arith::cmp_not_eq)?,
                Opcode::CmpStrictNotEq => binary(stack, arith::cmp_strict_not_eq)?,
                Opcode::CmpLt => binary(stack, arith::cmp_lt)?,
                Opcode::CmpGt => binary(stack, arith::cmp_gt)?,
                Opcode::CmpLtEq => binary(stack, arith::cmp_lt_eq)?,
                Opcode::CmpGtEq => binary(stack, arith::cmp_gt_eq)?,
                Opcode::Not => unary(stack, arith::not)?,

                Opcode::Jump => {
                    let offset = next_i16(frame.code, &mut frame.ip)?;
                    frame.ip = (frame.ip as i64 + offset as i64) as usize;
                }
                Opcode::JumpIfTrue => {
                    let offset = next_i16(frame.code, &mut frame.ip)?;
                    let v = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    if v.is_truthy() {
                        frame.ip = (frame.ip as i64 + offset as i64) as usize;
                    }
                }
                Opcode::JumpIfFalse => {
                    let offset = next_i16(frame.code, &mut frame.ip)?;
                    let v = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    if !v.is_truthy() {
                        frame.ip = (frame.ip as i64 + offset as i64) as usize;
                    }
                }
                Opcode::JumpIfNull => {
                    let offset = next_i16(frame.code, &mut frame.ip)?;
                    let v = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    if v.is_null() {
                        frame.ip = (frame.ip as i64 + offset as i64) as usize;
                    }
                }
                Opcode::JumpIfNotNull => {
                    let offset = next_i16(frame.code, &mut frame.ip)?;
                    let v = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    if !v.is_null() {
                        frame.ip = (frame.ip as i64 + offset as i64) as usize;
                    }
                }

                Opcode::TypeOf => {
                    let v = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    stack.push(Value::str(v.type_name()));
                }
                Opcode::InstanceOf => {
                    // Never emitted by this compiler (no source construct
                    // lowers to it); kept for wire-format completeness.
                    stack.pop().ok_or(RunFault::StackUnderflow)?;
                    stack.push(Value::Int(0));
                }

                Opcode::CallBuiltin => {
                    let id = next_u16(frame.code, &mut frame.ip)?;
                    let argc = next_u8(frame.code, &mut frame.ip)?;
                    let name = frame.strings.get(StringId::from_index(id)).to_owned();
                    let mut args = Vec::with_capacity(argc as usize);
                    for _ in 0..argc {
                        args.push(stack.pop().ok_or(RunFault::StackUnderflow)?);
                    }
                    args.reverse();
                    let output = &mut self.output;
                    let input = &mut self.input;
                    let result = crate::builtins::call(
                        &name,
                        &args,
                        &mut |s: &str| {
                            if let Some(f) = output {
                                f(s);
                            }
                        },
                        &mut || input.as_mut().map(|f| f()).unwrap_or_default(),
                    );
                    stack.push(result);
                }

                Opcode::CallMethod => {
                    let id = next_u16(frame.code, &mut frame.ip)?;
                    let argc = next_u8(frame.code, &mut frame.ip)?;
                    let folded_name = fold_name(frame.strings.get(StringId::from_index(id)));
                    let mut args = Vec::with_capacity(argc as usize);
                    for _ in 0..argc {
                        args.push(stack.pop().ok_or(RunFault::StackUnderflow)?);
                    }
                    args.reverse();
                    let receiver_val = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    self.dispatch_call(loader, frames, stack, &receiver_val, &folded_name, args)?;
                }
                Opcode::CallMethodDynamic => {
                    let argc = next_u8(frame.code, &mut frame.ip)?;
                    let name_val = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    let folded_name = fold_name(&name_val.stringify());
                    let mut args = Vec::with_capacity(argc as usize);
                    for _ in 0..argc {
                        args.push(stack.pop().ok_or(RunFault::StackUnderflow)?);
                    }
                    args.reverse();
                    let receiver_val = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    self.dispatch_call(loader, frames, stack, &receiver_val, &folded_name, args)?;
                }
                Opcode::CallDynamic => {
                    let argc = next_u8(frame.code, &mut frame.ip)?;
                    let mut args = Vec::with_capacity(argc as usize);
                    for _ in 0..argc {
                        args.push(stack.pop().ok_or(RunFault::StackUnderflow)?);
                    }
                    args.reverse();
                    let callee = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    // No first-class function value exists in this `Value`
                    // model; the only representable indirect call is an
                    // object exposing a conventionally-named `executar`
                    // method.
                    self.dispatch_call(loader, frames, stack, &callee, "executar", args)?;
                }
                Opcode::Call => {
                    let argc = next_u8(frame.code, &mut frame.ip)?;
                    for _ in 0..argc {
                        stack.pop().ok_or(RunFault::StackUnderflow)?;
                    }
                    stack.pop().ok_or(RunFault::StackUnderflow)?;
                    stack.push(Value::Null);
                }

                Opcode::Return => {
                    frames.pop();
                    self.tracer.on_return(frames.len());
                    if frames.is_empty() {
                        return Ok(Value::Null);
                    }
                    stack.push(Value::Null);
                }
                Opcode::ReturnValue => {
                    let v = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    frames.pop();
                    self.tracer.on_return(frames.len());
                    if frames.is_empty() {
                        return Ok(v);
                    }
                    stack.push(v);
                }

                Opcode::New => {
                    let id = next_u16(frame.code, &mut frame.ip)?;
                    let argc = next_u8(frame.code, &mut frame.ip)?;
                    let class_name = frame.strings.get(StringId::from_index(id)).to_owned();
                    let mut args = Vec::with_capacity(argc as usize);
                    for _ in 0..argc {
                        args.push(stack.pop().ok_or(RunFault::StackUnderflow)?);
                    }
                    args.reverse();
                    let v = self.exec_new(loader, &class_name, args)?;
                    stack.push(v);
                }
                Opcode::Delete => {
                    let v = stack.pop().ok_or(RunFault::StackUnderflow)?;
                    self.exec_delete(loader, v)?;
                }

                Opcode::Terminate => {
                    // Halts this call (the current `call_method`/
                    // `create_instance` invocation, or nested constructor/
                    // destructor/constant evaluation) immediately. Does not
                    // unwind past that boundary into an enclosing call.
                    frames.clear();
                    return Ok(Value::Null);
                }
            }
        }
    }

    fn load_member_value<'u>(&mut self, loader: &'u ClassLoader, receiver: &Value, folded_name: &str) -> Result<Value, RunFault> {
        let Some((class_name, receiver_object)) = self.resolve_receiver(receiver) else {
            return Ok(Value::Null);
        };
        self.load_member_by_class(loader, &class_name, receiver_object, folded_name)
    }

    fn load_member_by_class<'u>(
        &mut self,
        loader: &'u ClassLoader,
        class_name: &str,
        receiver_object: Option<ObjectId>,
        folded_name: &str,
    ) -> Result<Value, RunFault> {
        match dynamic::load_member(loader, &self.objects, &self.commons, class_name, receiver_object, folded_name) {
            dynamic::MemberLoad::Value(v) => Ok(v),
            dynamic::MemberLoad::Thunk { code, strings, owner_class } => self.eval_thunk(loader, code, strings, owner_class, receiver_object),
        }
    }

    fn store_member_value(&mut self, loader: &ClassLoader, receiver: &Value, folded_name: &str, value: Value) {
        let Some((class_name, receiver_object)) = self.resolve_receiver(receiver) else {
            return;
        };
        dynamic::store_member(loader, &mut self.objects, &mut self.commons, &class_name, receiver_object, folded_name, value);
    }

    /// Shared tail of `CallMethod`/`CallMethodDynamic`/`CallDynamic`:
    /// resolves the receiver and method, then pushes a new frame (graceful
    /// `nulo` result if either is uncallable/unresolvable).
    fn dispatch_call<'u>(
        &mut self,
        loader: &'u ClassLoader,
        frames: &mut Vec<Frame<'u>>,
        stack: &mut Vec<Value>,
        receiver: &Value,
        folded_name: &str,
        args: Vec<Value>,
    ) -> Result<(), RunFault> {
        let Some((class_name, receiver_object)) = self.resolve_receiver(receiver) else {
            stack.push(Value::Null);
            return Ok(());
        };
        let Some((owner, func)) = loader.find_method(&class_name, folded_name) else {
            stack.push(Value::Null);
            return Ok(());
        };
        let strings = &loader.unit(owner).expect("owner returned by find_method").strings;
        self.tracer.on_call(&func.name, frames.len() + 1);
        frames.push(Frame {
            code: &func.code,
            strings,
            defining_class: owner,
            ip: 0,
            locals: vec![Value::Null; func.code.num_locals as usize],
            receiver: receiver_object,
            args,
        });
        Ok(())
    }
}

fn binary(stack: &mut Vec<Value>, f: impl Fn(&Value, &Value) -> Value) -> Result<(), RunFault> {
    let b = stack.pop().ok_or(RunFault::StackUnderflow)?;
    let a = stack.pop().ok_or(RunFault::StackUnderflow)?;
    stack.push(f(&a, &b));
    Ok(())
}

fn unary(stack: &mut Vec<Value>, f: impl Fn(&Value) -> Value) -> Result<(), RunFault> {
    let v = stack.pop().ok_or(RunFault::StackUnderflow)?;
    stack.push(f(&v));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TypeName;
    use crate::bytecode::CodeBuilder;
    use crate::class::{CompiledFunction, CompiledUnit, VariableDesc};

    fn int_type() -> TypeName {
        TypeName { name: "int32".into(), capacity: None }
    }

    /// Builds a single-class `ClassLoader` with one `soma` method that
    /// returns `arg(0) + arg(1)`, to exercise `CallMethod`/`ReturnValue`.
    fn loader_with_soma() -> ClassLoader {
        let mut builder = CodeBuilder::new(1);
        builder.emit_u8(Opcode::LoadArg, 0);
        builder.emit_u8(Opcode::LoadArg, 1);
        builder.emit(Opcode::Add);
        builder.emit(Opcode::ReturnValue);
        let code = builder.build(0);

        let mut unit = CompiledUnit::new("Calculadora".into(), Vec::new());
        unit.functions.insert("soma".into(), CompiledFunction { name: "soma".into(), code, is_virtual: false });

        let mut loader = ClassLoader::new();
        loader.add_unit(unit);
        loader.link().expect("single class links trivially");
        loader
    }

    #[test]
    fn call_method_adds_its_two_arguments() {
        let loader = loader_with_soma();
        let mut vm: Vm = Vm::new();
        let obj = vm.create_instance(&loader, "Calculadora", Vec::new()).expect("construct");
        let Value::Object(id) = obj else { panic!("expected an object") };
        let result = vm.call_method(&loader, id, "soma", vec![Value::Int(2), Value::Int(3)]).expect("call succeeds");
        assert!(matches!(result, Value::Int(5)));
    }

    #[test]
    fn calling_an_unknown_method_degrades_to_null() {
        let loader = loader_with_soma();
        let mut vm: Vm = Vm::new();
        let obj = vm.create_instance(&loader, "Calculadora", Vec::new()).expect("construct");
        let Value::Object(id) = obj else { panic!("expected an object") };
        let result = vm.call_method(&loader, id, "nao_existe", Vec::new()).expect("graceful degrade");
        assert!(result.is_null());
    }

    #[test]
    fn instance_field_defaults_to_zero_for_its_declared_type() {
        let mut unit = CompiledUnit::new("Ponto".into(), Vec::new());
        unit.variables.push(VariableDesc {
            name: "x".into(),
            ty: int_type(),
            common: false,
            sav: false,
            offset: 0,
            size: 4,
        });
        let mut loader = ClassLoader::new();
        loader.add_unit(unit);
        loader.link().unwrap();

        let mut vm: Vm = Vm::new();
        let obj = vm.create_instance(&loader, "Ponto", Vec::new()).unwrap();
        let Value::Object(id) = obj else { panic!() };
        assert!(matches!(vm.objects().get(id).unwrap().get_field("x"), Some(Value::Int(0))));
    }

    #[test]
    fn common_variable_is_shared_across_instances() {
        let mut unit = CompiledUnit::new("Contador".into(), Vec::new());
        unit.variables.push(VariableDesc {
            name: "total".into(),
            ty: int_type(),
            common: true,
            sav: false,
            offset: 0,
            size: 4,
        });
        let mut loader = ClassLoader::new();
        loader.add_unit(unit);
        loader.link().unwrap();

        let mut vm: Vm = Vm::new();
        let a = vm.create_instance(&loader, "Contador", Vec::new()).unwrap();
        let b = vm.create_instance(&loader, "Contador", Vec::new()).unwrap();
        let (Value::Object(a), Value::Object(b)) = (a, b) else { panic!() };

        let loaded_a = vm.load_member_value(&loader, &Value::Object(a), "total").unwrap();
        assert!(matches!(loaded_a, Value::Int(0)));
        vm.store_member_value(&loader, &Value::Object(b), "total", Value::Int(7));
        let loaded_a_after = vm.load_member_value(&loader, &Value::Object(a), "total").unwrap();
        assert!(matches!(loaded_a_after, Value::Int(7)));
    }
}
