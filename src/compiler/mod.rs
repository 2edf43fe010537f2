//! Lowers the AST to bytecode.

mod error;
mod scope;

pub use error::{CompileError, CompileErrorKind, CResult};
pub use scope::{Resolution, Scope};

use crate::ast::*;
use crate::bytecode::{Code, CodeBuilder, JumpLabel, Opcode};
use crate::class::{CompiledFunction, CompiledUnit, ConstantValue, VariableDesc};
use crate::intern::StringPool;
use crate::span::Span;
use crate::util::fold_name;
use crate::value::Value;

/// Compiles a whole parsed file into one [`CompiledUnit`] per class.
pub fn compile(unit: &CompilationUnit) -> CResult<Vec<CompiledUnit>> {
    unit.classes.iter().map(compile_class).collect()
}

fn compile_class(class: &ClassDef) -> CResult<CompiledUnit> {
    let mut out = CompiledUnit::new(class.name.clone(), class.bases.clone());
    let mut seen_names: ahash::AHashMap<String, ()> = ahash::AHashMap::new();

    let mut field_names = Vec::new();
    let mut constant_names = Vec::new();
    for member in &class.members {
        let name = member_name(member);
        let folded = fold_name(name);
        if seen_names.insert(folded, ()).is_some() {
            return Err(CompileError {
                kind: CompileErrorKind::Redefinition(name.to_owned()),
                span: member_span(member),
            });
        }
        match member {
            Member::Var(_) => field_names.push(name.to_owned()),
            Member::Constant(_) | Member::VarConstant(_) => constant_names.push(name.to_owned()),
            Member::Function(_) | Member::VarFunc(_) => {}
        }
    }

    let mut offset = 0u32;
    for member in &class.members {
        if let Member::Var(decl) = member {
            let elem_size = primitive_size(&decl.ty);
            let vector_size = match &decl.vector_size {
                Some(expr) => Some(eval_vector_size(expr, decl.span)?),
                None => None,
            };
            let size = vector_size.map(|n| elem_size * n).unwrap_or(elem_size);
            out.variables.push(VariableDesc {
                name: decl.name.clone(),
                ty: decl.ty.clone(),
                common: decl.modifiers.common,
                sav: decl.modifiers.sav,
                offset,
                size,
                vector_size,
            });
            offset += size;
        }
    }
    out.total_variable_size = offset;

    for member in &class.members {
        match member {
            Member::Function(f) => {
                let code = compile_function_body(f, &field_names, &constant_names, &mut out.strings)?;
                out.functions.insert(fold_name(&f.name), CompiledFunction { name: f.name.clone(), code, is_virtual: false });
            }
            Member::VarFunc(f) => {
                let code = compile_function_body(f, &field_names, &constant_names, &mut out.strings)?;
                out.functions.insert(fold_name(&f.name), CompiledFunction { name: f.name.clone(), code, is_virtual: true });
            }
            Member::Constant(c) | Member::VarConstant(c) => {
                let value = compile_constant(c, &field_names, &constant_names, &mut out.strings)?;
                out.constants.insert(fold_name(&c.name), value);
            }
            Member::Var(_) => {}
        }
    }

    Ok(out)
}

fn member_name(member: &Member) -> &str {
    match member {
        Member::Var(v) => &v.name,
        Member::Function(f) | Member::VarFunc(f) => &f.name,
        Member::Constant(c) | Member::VarConstant(c) => &c.name,
    }
}

fn member_span(member: &Member) -> Span {
    match member {
        Member::Var(v) => v.span,
        Member::Function(f) | Member::VarFunc(f) => f.span,
        Member::Constant(c) | Member::VarConstant(c) => c.span,
    }
}

/// Byte size used for the `CompiledUnit` variable layout. The VM itself
/// stores fields by name in `RuntimeObject::fields`, not at this offset —
/// see `DESIGN.md` for why no byte-addressed memory segment was built: the
/// concrete domain value types that would occupy one are an external
/// collaborator, out of scope here.
fn primitive_size(ty: &TypeName) -> u32 {
    match ty.name.as_str() {
        "int1" => 1,
        "int8" | "uint8" => 1,
        "int16" | "uint16" => 2,
        "int32" | "uint32" => 4,
        "real" | "real2" => 8,
        "txt1" | "txt2" => ty.capacity.unwrap_or(64),
        _ => 8,
    }
}

fn compile_constant(
    def: &ConstantDef,
    field_names: &[String],
    constant_names: &[String],
    pool: &mut StringPool,
) -> CResult<ConstantValue> {
    if def.side_effects.is_empty() {
        if let Some(v) = literal_value(&def.value) {
            return Ok(ConstantValue::Immediate(v));
        }
    }
    let mut stmts: Vec<Stmt> = def
        .side_effects
        .iter()
        .cloned()
        .map(|e| Stmt::Expr { exprs: vec![e], span: def.span })
        .collect();
    stmts.push(Stmt::Return { cond: None, value: Some(def.value.clone()), span: def.span });
    let synthetic = FunctionDef {
        name: def.name.clone(),
        body: stmts,
        span: def.span,
        start_line: def.span.line,
    };
    let code = compile_function_body(&synthetic, field_names, constant_names, pool)?;
    Ok(ConstantValue::Thunk(code))
}

fn literal_value(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Number { value: Number::Int(i), .. } => Some(Value::Int(*i)),
        Expr::Number { value: Number::Double(d), .. } => Some(Value::Double(*d)),
        Expr::Str { value, .. } => Some(Value::str(value.clone())),
        Expr::Null { .. } => Some(Value::Null),
        _ => None,
    }
}

/// A `tipo nome[N]` vector size must be a positive integer literal known at
/// compile time, the same constraint `txt1(N)`/`txt2(N)` capacities carry.
fn eval_vector_size(expr: &Expr, span: Span) -> CResult<u32> {
    let n = match literal_value(expr) {
        Some(Value::Int(i)) if i >= 0 && i <= u32::MAX as i64 => i as u32,
        _ => return Err(CompileError { kind: CompileErrorKind::VectorSizeOutOfRange(0), span }),
    };
    if n == 0 || n > 65536 {
        return Err(CompileError { kind: CompileErrorKind::VectorSizeOutOfRange(n), span });
    }
    Ok(n)
}

/// Pending jump labels for one active loop, patched once the loop's break
/// target (after the loop) and continue target (condition/increment) are
/// known.
struct LoopContext {
    break_jumps: Vec<JumpLabel>,
    continue_jumps: Vec<JumpLabel>,
}

struct FnCtx<'a> {
    builder: CodeBuilder,
    scope: Scope,
    pool: &'a mut StringPool,
    loops: Vec<LoopContext>,
}

impl<'a> FnCtx<'a> {
    fn intern(&mut self, text: &str) -> u16 {
        self.pool.intern(text).expect("string pool exhausted").index()
    }

    fn temp_slot(&mut self) -> u16 {
        self.scope.declare_local("__temp")
    }
}

fn compile_function_body(
    func: &FunctionDef,
    field_names: &[String],
    constant_names: &[String],
    pool: &mut StringPool,
) -> CResult<Code> {
    let mut ctx = FnCtx {
        builder: CodeBuilder::new(func.start_line),
        scope: Scope::new(field_names.iter().cloned(), constant_names.iter().cloned()),
        pool,
        loops: Vec::new(),
    };
    compile_block(&mut ctx, &func.body)?;
    ctx.builder.emit(Opcode::Return);
    let num_locals = ctx.scope.total_locals();
    Ok(ctx.builder.build(num_locals))
}

fn compile_block(ctx: &mut FnCtx, stmts: &[Stmt]) -> CResult<()> {
    ctx.scope.push_block();
    for stmt in stmts {
        compile_stmt(ctx, stmt)?;
    }
    ctx.scope.pop_block();
    Ok(())
}

fn compile_stmt(ctx: &mut FnCtx, stmt: &Stmt) -> CResult<()> {
    ctx.builder.set_line(stmt.span().line);
    match stmt {
        Stmt::Expr { exprs, .. } => {
            for e in exprs {
                compile_expr(ctx, e)?;
                ctx.builder.emit(Opcode::Pop);
            }
            Ok(())
        }
        Stmt::LocalVar { decl } => {
            if ctx.scope.is_declared_in_current_block(&decl.name) {
                return Err(CompileError {
                    kind: CompileErrorKind::DuplicateLocal(decl.name.clone()),
                    span: decl.span,
                });
            }
            if let Some(capacity) = decl.ty.capacity {
                if capacity == 0 || capacity > 65536 {
                    return Err(CompileError {
                        kind: CompileErrorKind::TextSizeOutOfRange(capacity),
                        span: decl.span,
                    });
                }
            }
            if let Some(init) = &decl.init {
                compile_expr(ctx, init)?;
            } else {
                ctx.builder.emit(Opcode::PushNull);
            }
            let slot = ctx.scope.declare_local(&decl.name);
            ctx.builder.emit_u16(Opcode::StoreLocal, slot);
            Ok(())
        }
        Stmt::RefVar { name, target, .. } => {
            compile_expr(ctx, target)?;
            let slot = ctx.scope.declare_local(name);
            ctx.builder.emit_u16(Opcode::StoreLocal, slot);
            Ok(())
        }
        Stmt::If { branches, else_body, .. } => {
            let mut end_jumps = Vec::new();
            for (cond, body) in branches {
                compile_expr(ctx, cond)?;
                let skip = ctx.builder.emit_jump(Opcode::JumpIfFalse);
                compile_block(ctx, body)?;
                end_jumps.push(ctx.builder.emit_jump(Opcode::Jump));
                ctx.builder.patch_jump(skip);
            }
            if let Some(body) = else_body {
                compile_block(ctx, body)?;
            }
            for j in end_jumps {
                ctx.builder.patch_jump(j);
            }
            Ok(())
        }
        Stmt::While { cond, body, .. } => {
            let loop_start = ctx.builder.current_offset();
            compile_expr(ctx, cond)?;
            let exit = ctx.builder.emit_jump(Opcode::JumpIfFalse);
            ctx.loops.push(LoopContext { break_jumps: Vec::new(), continue_jumps: Vec::new() });
            compile_block(ctx, body)?;
            let finished = ctx.loops.pop().expect("pushed above");
            for j in finished.continue_jumps {
                ctx.builder.retarget_jump(j, loop_start);
            }
            ctx.builder.emit_jump_to(Opcode::Jump, loop_start);
            ctx.builder.patch_jump(exit);
            for j in finished.break_jumps {
                ctx.builder.patch_jump(j);
            }
            Ok(())
        }
        Stmt::For { init, cond, incr, body, .. } => {
            ctx.scope.push_block();
            if let Some(init) = init {
                compile_stmt(ctx, init)?;
            }
            let cond_start = ctx.builder.current_offset();
            let mut exit = None;
            if let Some(cond) = cond {
                compile_expr(ctx, cond)?;
                exit = Some(ctx.builder.emit_jump(Opcode::JumpIfFalse));
            }
            ctx.loops.push(LoopContext { break_jumps: Vec::new(), continue_jumps: Vec::new() });
            compile_block(ctx, body)?;
            let finished = ctx.loops.pop().expect("pushed above");
            let incr_start = ctx.builder.current_offset();
            for j in finished.continue_jumps {
                ctx.builder.retarget_jump(j, incr_start);
            }
            if let Some(incr) = incr {
                compile_expr(ctx, incr)?;
                ctx.builder.emit(Opcode::Pop);
            }
            ctx.builder.emit_jump_to(Opcode::Jump, cond_start);
            if let Some(exit) = exit {
                ctx.builder.patch_jump(exit);
            }
            for j in finished.break_jumps {
                ctx.builder.patch_jump(j);
            }
            ctx.scope.pop_block();
            Ok(())
        }
        Stmt::Foreach { var, collection, body, .. } => {
            // Desugars into a hidden index/collection pair, bounded by
            // the `tam` built-in.
            ctx.scope.push_block();
            compile_expr(ctx, collection)?;
            let col_slot = ctx.scope.declare_local("__col");
            ctx.builder.emit_u16(Opcode::StoreLocal, col_slot);
            ctx.builder.emit_i32(Opcode::PushInt, 0);
            let idx_slot = ctx.scope.declare_local("__idx");
            ctx.builder.emit_u16(Opcode::StoreLocal, idx_slot);

            let loop_start = ctx.builder.current_offset();
            ctx.builder.emit_u16(Opcode::LoadLocal, idx_slot);
            ctx.builder.emit_u16(Opcode::LoadLocal, col_slot);
            let tam_id = ctx.intern("tam");
            ctx.builder.emit_u16_u8_with_effect(Opcode::CallBuiltin, tam_id, 1, 0);
            ctx.builder.emit(Opcode::CmpLt);
            let exit = ctx.builder.emit_jump(Opcode::JumpIfFalse);

            ctx.builder.emit_u16(Opcode::LoadLocal, col_slot);
            ctx.builder.emit_u16(Opcode::LoadLocal, idx_slot);
            ctx.builder.emit(Opcode::LoadIndex);
            let var_slot = ctx.scope.declare_local(var);
            ctx.builder.emit_u16(Opcode::StoreLocal, var_slot);

            ctx.loops.push(LoopContext { break_jumps: Vec::new(), continue_jumps: Vec::new() });
            compile_block(ctx, body)?;
            let finished = ctx.loops.pop().expect("pushed above");
            let incr_start = ctx.builder.current_offset();
            for j in finished.continue_jumps {
                ctx.builder.retarget_jump(j, incr_start);
            }
            ctx.builder.emit_u16(Opcode::LoadLocal, idx_slot);
            ctx.builder.emit_i32(Opcode::PushInt, 1);
            ctx.builder.emit(Opcode::Add);
            ctx.builder.emit_u16(Opcode::StoreLocal, idx_slot);
            ctx.builder.emit_jump_to(Opcode::Jump, loop_start);
            ctx.builder.patch_jump(exit);
            for j in finished.break_jumps {
                ctx.builder.patch_jump(j);
            }
            ctx.scope.pop_block();
            Ok(())
        }
        Stmt::Switch { value, cases, default, .. } => {
            compile_expr(ctx, value)?;
            let mut arm_ends = Vec::new();
            let mut pending_no_match: Vec<JumpLabel> = Vec::new();
            for (label, body) in cases {
                for j in pending_no_match.drain(..) {
                    ctx.builder.patch_jump(j);
                }
                ctx.builder.emit(Opcode::Dup);
                let label_id = ctx.intern(label);
                ctx.builder.emit_u16(Opcode::PushString, label_id);
                ctx.builder.emit(Opcode::CmpEq);
                let no_match = ctx.builder.emit_jump(Opcode::JumpIfFalse);
                ctx.builder.emit(Opcode::Pop);
                compile_block(ctx, body)?;
                arm_ends.push(ctx.builder.emit_jump(Opcode::Jump));
                pending_no_match.push(no_match);
            }
            for j in pending_no_match {
                ctx.builder.patch_jump(j);
            }
            ctx.builder.emit(Opcode::Pop);
            if let Some(default_body) = default {
                compile_block(ctx, default_body)?;
            }
            for j in arm_ends {
                ctx.builder.patch_jump(j);
            }
            Ok(())
        }
        Stmt::Return { cond, value, .. } => match (cond, value) {
            (Some(cond), Some(value)) => {
                compile_expr(ctx, cond)?;
                let skip = ctx.builder.emit_jump(Opcode::JumpIfFalse);
                compile_expr(ctx, value)?;
                ctx.builder.emit(Opcode::ReturnValue);
                ctx.builder.patch_jump(skip);
                Ok(())
            }
            (None, Some(value)) => {
                compile_expr(ctx, value)?;
                ctx.builder.emit(Opcode::ReturnValue);
                Ok(())
            }
            _ => {
                ctx.builder.emit(Opcode::Return);
                Ok(())
            }
        },
        Stmt::Exit { cond, .. } => emit_loop_control(ctx, cond, true),
        Stmt::Continue { cond, .. } => emit_loop_control(ctx, cond, false),
        Stmt::Terminate { .. } => {
            ctx.builder.emit(Opcode::Terminate);
            Ok(())
        }
    }
}

fn emit_loop_control(ctx: &mut FnCtx, cond: &Option<Expr>, is_break: bool) -> CResult<()> {
    if ctx.loops.is_empty() {
        // `sair`/`continuar` outside a loop isn't in the `CompileError`
        // taxonomy; evaluate the condition for its side effects and drop
        // it rather than reject.
        if let Some(cond) = cond {
            compile_expr(ctx, cond)?;
            ctx.builder.emit(Opcode::Pop);
        }
        return Ok(());
    }
    let label = if let Some(cond) = cond {
        compile_expr(ctx, cond)?;
        ctx.builder.emit_jump(Opcode::JumpIfTrue)
    } else {
        ctx.builder.emit_jump(Opcode::Jump)
    };
    let top = ctx.loops.last_mut().expect("checked non-empty above");
    if is_break {
        top.break_jumps.push(label);
    } else {
        top.continue_jumps.push(label);
    }
    Ok(())
}

fn compile_expr(ctx: &mut FnCtx, expr: &Expr) -> CResult<()> {
    match expr {
        Expr::Number { value: Number::Int(i), .. } => {
            let v = i32::try_from(*i).unwrap_or(*i as i32);
            ctx.builder.emit_i32(Opcode::PushInt, v);
            Ok(())
        }
        Expr::Number { value: Number::Double(d), .. } => {
            ctx.builder.emit_f64(Opcode::PushDouble, *d);
            Ok(())
        }
        Expr::Str { value, .. } => {
            let id = ctx.intern(value);
            ctx.builder.emit_u16(Opcode::PushString, id);
            Ok(())
        }
        Expr::Null { .. } => {
            ctx.builder.emit(Opcode::PushNull);
            Ok(())
        }
        Expr::This { .. } => {
            ctx.builder.emit(Opcode::LoadThis);
            Ok(())
        }
        Expr::ArgRef { index, .. } => {
            ctx.builder.emit_u8(Opcode::LoadArg, *index);
            Ok(())
        }
        Expr::ArgsCount { .. } => {
            ctx.builder.emit(Opcode::LoadArgCount);
            Ok(())
        }
        Expr::Identifier { name, .. } => {
            load_name(ctx, name);
            Ok(())
        }
        Expr::DynamicIdentifier { parts, countdown, .. } => {
            compile_name_parts(ctx, parts, *countdown)?;
            ctx.builder.emit_with_effect(Opcode::LoadDynamic, 0);
            Ok(())
        }
        Expr::MemberAccess { object, member, .. } => {
            compile_expr(ctx, object)?;
            match member {
                MemberName::Static(name) => {
                    let id = ctx.intern(name);
                    ctx.builder.emit_u16(Opcode::LoadField, id);
                }
                MemberName::Dynamic(parts) => {
                    compile_name_parts(ctx, parts, false)?;
                    ctx.builder.emit(Opcode::LoadFieldDynamic);
                }
            }
            Ok(())
        }
        Expr::Index { object, index, .. } => {
            compile_expr(ctx, object)?;
            compile_expr(ctx, index)?;
            ctx.builder.emit(Opcode::LoadIndex);
            Ok(())
        }
        Expr::Call { callee, args, .. } => compile_call(ctx, callee, args),
        Expr::New { class_name, args, .. } => {
            for a in args {
                compile_expr(ctx, a)?;
            }
            let id = ctx.intern(class_name);
            let argc = u8::try_from(args.len()).expect("argc fits u8");
            ctx.builder.emit_u16_u8_with_effect(Opcode::New, id, argc, 1 - i32::from(argc));
            Ok(())
        }
        Expr::Delete { target, .. } => {
            compile_expr(ctx, target)?;
            ctx.builder.emit(Opcode::Delete);
            Ok(())
        }
        Expr::Unary { op, operand, .. } => {
            match op {
                UnOp::Neg => {
                    compile_expr(ctx, operand)?;
                    ctx.builder.emit(Opcode::Neg);
                }
                UnOp::Not => {
                    compile_expr(ctx, operand)?;
                    ctx.builder.emit(Opcode::Not);
                }
                UnOp::BitNot => {
                    compile_expr(ctx, operand)?;
                    ctx.builder.emit(Opcode::BitNot);
                }
                UnOp::PreInc | UnOp::PreDec => {
                    compile_incdec(ctx, operand, matches!(op, UnOp::PreInc), true)?;
                }
            }
            Ok(())
        }
        Expr::Postfix { op, operand, .. } => compile_incdec(ctx, operand, matches!(op, PostfixOp::Inc), false),
        Expr::Binary { op, lhs, rhs, .. } => compile_binary(ctx, *op, lhs, rhs),
        Expr::Conditional { cond, then_branch, else_branch, .. } => {
            compile_expr(ctx, cond)?;
            let else_label = ctx.builder.emit_jump(Opcode::JumpIfFalse);
            compile_expr(ctx, then_branch)?;
            let end_label = ctx.builder.emit_jump(Opcode::Jump);
            ctx.builder.patch_jump(else_label);
            compile_expr(ctx, else_branch)?;
            ctx.builder.patch_jump(end_label);
            Ok(())
        }
        Expr::NullCoalesce { lhs, rhs, .. } => {
            compile_expr(ctx, lhs)?;
            ctx.builder.emit(Opcode::Dup);
            let has_value = ctx.builder.emit_jump(Opcode::JumpIfNotNull);
            ctx.builder.emit(Opcode::Pop);
            compile_expr(ctx, rhs)?;
            ctx.builder.patch_jump(has_value);
            Ok(())
        }
        Expr::Assign { target, op, value, .. } => compile_assign(ctx, target, *op, value),
        Expr::DollarRef { class, .. } => {
            match class {
                Some(MemberName::Static(name)) => {
                    let id = ctx.intern(name);
                    ctx.builder.emit_u16(Opcode::LoadClass, id);
                }
                Some(MemberName::Dynamic(parts)) => {
                    compile_name_parts(ctx, parts, false)?;
                    ctx.builder.emit_with_effect(Opcode::LoadDynamic, 0);
                }
                None => {
                    ctx.builder.emit(Opcode::LoadThis);
                }
            }
            Ok(())
        }
        Expr::ClassRef { class, member, .. } => compile_class_ref_load(ctx, class, member),
    }
}

fn load_name(ctx: &mut FnCtx, name: &str) {
    match ctx.scope.resolve(name) {
        Resolution::Local(slot) => ctx.builder.emit_u16(Opcode::LoadLocal, slot),
        Resolution::Field | Resolution::Constant => {
            let id = ctx.intern(name);
            ctx.builder.emit(Opcode::LoadThis);
            ctx.builder.emit_u16(Opcode::LoadField, id);
        }
        Resolution::Global => {
            let id = ctx.intern(name);
            ctx.builder.emit_u16(Opcode::LoadGlobal, id);
        }
    }
}

/// Builds a dynamic name by starting from the empty string and
/// concatenating each literal or expression part in turn, then the `@`
/// countdown suffix if present — one uniform lowering for every dynamic
/// name shape.
fn compile_name_parts(ctx: &mut FnCtx, parts: &[NamePart], countdown: bool) -> CResult<()> {
    let empty = ctx.intern("");
    ctx.builder.emit_u16(Opcode::PushString, empty);
    for part in parts {
        match part {
            NamePart::Literal(lit) => {
                let id = ctx.intern(lit);
                ctx.builder.emit_u16(Opcode::PushString, id);
            }
            NamePart::Expr(e) => compile_expr(ctx, e)?,
        }
        ctx.builder.emit(Opcode::Concat);
    }
    if countdown {
        let at = ctx.intern("@");
        ctx.builder.emit_u16(Opcode::PushString, at);
        ctx.builder.emit(Opcode::Concat);
    }
    Ok(())
}

fn compile_class_ref_load_target(ctx: &mut FnCtx, class: &MemberName) -> CResult<()> {
    match class {
        MemberName::Static(cls) => {
            let id = ctx.intern(cls);
            ctx.builder.emit_u16(Opcode::LoadClass, id);
        }
        MemberName::Dynamic(parts) => {
            compile_name_parts(ctx, parts, false)?;
            ctx.builder.emit_with_effect(Opcode::LoadDynamic, 0);
        }
    }
    Ok(())
}

fn compile_class_ref_load(ctx: &mut FnCtx, class: &MemberName, member: &MemberName) -> CResult<()> {
    compile_class_ref_load_target(ctx, class)?;
    match member {
        MemberName::Static(name) => {
            let id = ctx.intern(name);
            ctx.builder.emit_u16(Opcode::LoadClassMember, id);
        }
        MemberName::Dynamic(parts) => {
            compile_name_parts(ctx, parts, false)?;
            ctx.builder.emit(Opcode::LoadClassMemberDynamic);
        }
    }
    Ok(())
}

fn compile_call(ctx: &mut FnCtx, callee: &Expr, args: &[Expr]) -> CResult<()> {
    match callee {
        Expr::Identifier { name, .. } if crate::builtins::is_builtin(name) => {
            for a in args {
                compile_expr(ctx, a)?;
            }
            let id = ctx.intern(name);
            let argc = u8::try_from(args.len()).expect("argc fits u8");
            ctx.builder.emit_u16_u8_with_effect(Opcode::CallBuiltin, id, argc, 1 - i32::from(argc));
            Ok(())
        }
        Expr::Identifier { name, .. } => {
            ctx.builder.emit(Opcode::LoadThis);
            for a in args {
                compile_expr(ctx, a)?;
            }
            let id = ctx.intern(name);
            let argc = u8::try_from(args.len()).expect("argc fits u8");
            ctx.builder.emit_u16_u8_with_effect(Opcode::CallMethod, id, argc, -i32::from(argc));
            Ok(())
        }
        Expr::MemberAccess { object, member, .. } => {
            compile_expr(ctx, object)?;
            for a in args {
                compile_expr(ctx, a)?;
            }
            let argc = u8::try_from(args.len()).expect("argc fits u8");
            match member {
                MemberName::Static(name) => {
                    let id = ctx.intern(name);
                    ctx.builder.emit_u16_u8_with_effect(Opcode::CallMethod, id, argc, -i32::from(argc));
                }
                MemberName::Dynamic(parts) => {
                    compile_name_parts(ctx, parts, false)?;
                    ctx.builder.emit_u8_with_effect(Opcode::CallMethodDynamic, argc, -1 - i32::from(argc));
                }
            }
            Ok(())
        }
        Expr::ClassRef { class, member, .. } => {
            compile_class_ref_load_target(ctx, class)?;
            for a in args {
                compile_expr(ctx, a)?;
            }
            let argc = u8::try_from(args.len()).expect("argc fits u8");
            match member {
                MemberName::Static(name) => {
                    let id = ctx.intern(name);
                    ctx.builder.emit_u16_u8_with_effect(Opcode::CallMethod, id, argc, -i32::from(argc));
                }
                MemberName::Dynamic(parts) => {
                    compile_name_parts(ctx, parts, false)?;
                    ctx.builder.emit_u8_with_effect(Opcode::CallMethodDynamic, argc, -1 - i32::from(argc));
                }
            }
            Ok(())
        }
        other => {
            compile_expr(ctx, other)?;
            for a in args {
                compile_expr(ctx, a)?;
            }
            let argc = u8::try_from(args.len()).expect("argc fits u8");
            ctx.builder.emit_u8_with_effect(Opcode::CallDynamic, argc, -i32::from(argc));
            Ok(())
        }
    }
}

fn emit_compound_op(ctx: &mut FnCtx, op: AssignOp) {
    let opcode = match op {
        AssignOp::AddAssign => Opcode::Add,
        AssignOp::SubAssign => Opcode::Sub,
        AssignOp::MulAssign => Opcode::Mul,
        AssignOp::DivAssign => Opcode::Div,
        AssignOp::ModAssign => Opcode::Mod,
        AssignOp::AndAssign => Opcode::BitAnd,
        AssignOp::OrAssign => Opcode::BitOr,
        AssignOp::XorAssign => Opcode::BitXor,
        AssignOp::ShlAssign => Opcode::Shl,
        AssignOp::ShrAssign => Opcode::Shr,
        AssignOp::Assign => unreachable!("plain assignment has no compound opcode"),
    };
    ctx.builder.emit(opcode);
}

/// Shared shape for `this.x`-like assignment targets: a side-effect-free
/// receiver (re-pushed via `push_receiver`, so it must never be an
/// arbitrary expression — callers that have one stash it in a local first)
/// plus a load/store opcode pair keyed by one `u16` operand.
fn compile_field_like_assign(
    ctx: &mut FnCtx,
    op: AssignOp,
    value: &Expr,
    push_receiver: impl Fn(&mut FnCtx),
    load: Opcode,
    load_operand: u16,
    store: Opcode,
    store_operand: u16,
) -> CResult<()> {
    if op == AssignOp::Assign {
        compile_expr(ctx, value)?;
    } else {
        push_receiver(ctx);
        ctx.builder.emit_u16(load, load_operand);
        compile_expr(ctx, value)?;
        emit_compound_op(ctx, op);
    }
    let result_slot = ctx.temp_slot();
    ctx.builder.emit_u16(Opcode::StoreLocal, result_slot);
    push_receiver(ctx);
    ctx.builder.emit_u16(Opcode::LoadLocal, result_slot);
    ctx.builder.emit_u16(store, store_operand);
    ctx.builder.emit_u16(Opcode::LoadLocal, result_slot);
    Ok(())
}

fn compile_dynamic_field_assign(ctx: &mut FnCtx, obj_slot: u16, parts: &[NamePart], op: AssignOp, value: &Expr) -> CResult<()> {
    compile_name_parts(ctx, parts, false)?;
    let name_slot = ctx.temp_slot();
    ctx.builder.emit_u16(Opcode::StoreLocal, name_slot);
    if op == AssignOp::Assign {
        compile_expr(ctx, value)?;
    } else {
        ctx.builder.emit_u16(Opcode::LoadLocal, obj_slot);
        ctx.builder.emit_u16(Opcode::LoadLocal, name_slot);
        ctx.builder.emit(Opcode::LoadFieldDynamic);
        compile_expr(ctx, value)?;
        emit_compound_op(ctx, op);
    }
    let result_slot = ctx.temp_slot();
    ctx.builder.emit_u16(Opcode::StoreLocal, result_slot);
    ctx.builder.emit_u16(Opcode::LoadLocal, obj_slot);
    ctx.builder.emit_u16(Opcode::LoadLocal, name_slot);
    ctx.builder.emit_u16(Opcode::LoadLocal, result_slot);
    ctx.builder.emit(Opcode::StoreFieldDynamic);
    ctx.builder.emit_u16(Opcode::LoadLocal, result_slot);
    Ok(())
}

fn compile_dynamic_class_ref_assign(ctx: &mut FnCtx, class: &MemberName, member: &MemberName, op: AssignOp, value: &Expr) -> CResult<()> {
    compile_class_ref_load_target(ctx, class)?;
    let cls_slot = ctx.temp_slot();
    ctx.builder.emit_u16(Opcode::StoreLocal, cls_slot);

    let static_id = match member {
        MemberName::Static(name) => Some(ctx.intern(name)),
        MemberName::Dynamic(_) => None,
    };
    let name_slot = match member {
        MemberName::Static(_) => None,
        MemberName::Dynamic(parts) => {
            compile_name_parts(ctx, parts, false)?;
            let slot = ctx.temp_slot();
            ctx.builder.emit_u16(Opcode::StoreLocal, slot);
            Some(slot)
        }
    };

    if op == AssignOp::Assign {
        compile_expr(ctx, value)?;
    } else {
        ctx.builder.emit_u16(Opcode::LoadLocal, cls_slot);
        match (static_id, name_slot) {
            (Some(id), None) => ctx.builder.emit_u16(Opcode::LoadClassMember, id),
            (None, Some(slot)) => {
                ctx.builder.emit_u16(Opcode::LoadLocal, slot);
                ctx.builder.emit(Opcode::LoadClassMemberDynamic);
            }
            _ => unreachable!("member is either static or dynamic"),
        }
        compile_expr(ctx, value)?;
        emit_compound_op(ctx, op);
    }

    let result_slot = ctx.temp_slot();
    ctx.builder.emit_u16(Opcode::StoreLocal, result_slot);
    ctx.builder.emit_u16(Opcode::LoadLocal, cls_slot);
    match (static_id, name_slot) {
        (Some(id), None) => {
            ctx.builder.emit_u16(Opcode::LoadLocal, result_slot);
            ctx.builder.emit_u16(Opcode::StoreClassMember, id);
        }
        (None, Some(slot)) => {
            ctx.builder.emit_u16(Opcode::LoadLocal, slot);
            ctx.builder.emit_u16(Opcode::LoadLocal, result_slot);
            ctx.builder.emit(Opcode::StoreClassMemberDynamic);
        }
        _ => unreachable!("member is either static or dynamic"),
    }
    ctx.builder.emit_u16(Opcode::LoadLocal, result_slot);
    Ok(())
}

fn compile_assign(ctx: &mut FnCtx, target: &Expr, op: AssignOp, value: &Expr) -> CResult<()> {
    match target {
        Expr::Identifier { name, .. } => {
            match ctx.scope.resolve(name) {
                Resolution::Local(slot) => {
                    if op == AssignOp::Assign {
                        compile_expr(ctx, value)?;
                    } else {
                        ctx.builder.emit_u16(Opcode::LoadLocal, slot);
                        compile_expr(ctx, value)?;
                        emit_compound_op(ctx, op);
                    }
                    ctx.builder.emit(Opcode::Dup);
                    ctx.builder.emit_u16(Opcode::StoreLocal, slot);
                }
                Resolution::Field | Resolution::Constant => {
                    let id = ctx.intern(name);
                    compile_field_like_assign(ctx, op, value, |c| c.builder.emit(Opcode::LoadThis), Opcode::LoadField, id, Opcode::StoreField, id)?;
                }
                Resolution::Global => {
                    let id = ctx.intern(name);
                    if op == AssignOp::Assign {
                        compile_expr(ctx, value)?;
                    } else {
                        ctx.builder.emit_u16(Opcode::LoadGlobal, id);
                        compile_expr(ctx, value)?;
                        emit_compound_op(ctx, op);
                    }
                    ctx.builder.emit(Opcode::Dup);
                    ctx.builder.emit_u16(Opcode::StoreGlobal, id);
                }
            }
            Ok(())
        }
        Expr::ArgRef { index, .. } => {
            if op == AssignOp::Assign {
                compile_expr(ctx, value)?;
            } else {
                ctx.builder.emit_u8(Opcode::LoadArg, *index);
                compile_expr(ctx, value)?;
                emit_compound_op(ctx, op);
            }
            ctx.builder.emit(Opcode::Dup);
            ctx.builder.emit_u8(Opcode::StoreArg, *index);
            Ok(())
        }
        Expr::MemberAccess { object, member, .. } => {
            compile_expr(ctx, object)?;
            let obj_slot = ctx.temp_slot();
            ctx.builder.emit_u16(Opcode::StoreLocal, obj_slot);
            match member {
                MemberName::Static(name) => {
                    let id = ctx.intern(name);
                    compile_field_like_assign(
                        ctx,
                        op,
                        value,
                        move |c| c.builder.emit_u16(Opcode::LoadLocal, obj_slot),
                        Opcode::LoadField,
                        id,
                        Opcode::StoreField,
                        id,
                    )
                }
                MemberName::Dynamic(parts) => compile_dynamic_field_assign(ctx, obj_slot, parts, op, value),
            }
        }
        Expr::ClassRef { class, member, .. } => match (class, member) {
            (MemberName::Static(cls), MemberName::Static(mem)) => {
                let cls_id = ctx.intern(cls);
                let mem_id = ctx.intern(mem);
                compile_field_like_assign(
                    ctx,
                    op,
                    value,
                    move |c| c.builder.emit_u16(Opcode::LoadClass, cls_id),
                    Opcode::LoadClassMember,
                    mem_id,
                    Opcode::StoreClassMember,
                    mem_id,
                )
            }
            (class, member) => compile_dynamic_class_ref_assign(ctx, class, member, op, value),
        },
        Expr::Index { object, index, .. } => {
            compile_expr(ctx, object)?;
            let obj_slot = ctx.temp_slot();
            ctx.builder.emit_u16(Opcode::StoreLocal, obj_slot);
            compile_expr(ctx, index)?;
            let idx_slot = ctx.temp_slot();
            ctx.builder.emit_u16(Opcode::StoreLocal, idx_slot);
            if op == AssignOp::Assign {
                compile_expr(ctx, value)?;
            } else {
                ctx.builder.emit_u16(Opcode::LoadLocal, obj_slot);
                ctx.builder.emit_u16(Opcode::LoadLocal, idx_slot);
                ctx.builder.emit(Opcode::LoadIndex);
                compile_expr(ctx, value)?;
                emit_compound_op(ctx, op);
            }
            let result_slot = ctx.temp_slot();
            ctx.builder.emit_u16(Opcode::StoreLocal, result_slot);
            ctx.builder.emit_u16(Opcode::LoadLocal, obj_slot);
            ctx.builder.emit_u16(Opcode::LoadLocal, idx_slot);
            ctx.builder.emit_u16(Opcode::LoadLocal, result_slot);
            ctx.builder.emit(Opcode::StoreIndex);
            ctx.builder.emit_u16(Opcode::LoadLocal, result_slot);
            Ok(())
        }
        Expr::DynamicIdentifier { parts, countdown, .. } => {
            compile_name_parts(ctx, parts, *countdown)?;
            let name_slot = ctx.temp_slot();
            ctx.builder.emit_u16(Opcode::StoreLocal, name_slot);
            if op == AssignOp::Assign {
                compile_expr(ctx, value)?;
            } else {
                ctx.builder.emit_u16(Opcode::LoadLocal, name_slot);
                ctx.builder.emit_with_effect(Opcode::LoadDynamic, 0);
                compile_expr(ctx, value)?;
                emit_compound_op(ctx, op);
            }
            let result_slot = ctx.temp_slot();
            ctx.builder.emit_u16(Opcode::StoreLocal, result_slot);
            ctx.builder.emit_u16(Opcode::LoadLocal, name_slot);
            ctx.builder.emit_u16(Opcode::LoadLocal, result_slot);
            ctx.builder.emit_with_effect(Opcode::StoreDynamic, -2);
            ctx.builder.emit_u16(Opcode::LoadLocal, result_slot);
            Ok(())
        }
        _ => Err(CompileError { kind: CompileErrorKind::InvalidAssignmentTarget, span: target.span() }),
    }
}

/// Desugars `++x`/`x++`/`--x`/`x--` into `x = x +/- 1` (prefix) or
/// `{ tmp = x; x = x +/- 1; tmp }` (postfix), reusing [`compile_assign`].
/// For a non-trivial receiver (e.g. `lista[f()]++`), the receiver
/// subexpression is evaluated twice — once for the bare old-value read,
/// once inside the reused assignment — a documented simplification rather
/// than a fully side-effect-safe lowering.
fn compile_incdec(ctx: &mut FnCtx, operand: &Expr, increment: bool, is_prefix: bool) -> CResult<()> {
    let span = operand.span();
    let one = Expr::Number { value: Number::Int(1), span };
    let op = if increment { AssignOp::AddAssign } else { AssignOp::SubAssign };
    if is_prefix {
        compile_assign(ctx, operand, op, &one)
    } else {
        compile_expr(ctx, operand)?;
        compile_assign(ctx, operand, op, &one)?;
        ctx.builder.emit(Opcode::Pop);
        Ok(())
    }
}

fn compile_binary(ctx: &mut FnCtx, op: BinOp, lhs: &Expr, rhs: &Expr) -> CResult<()> {
    match op {
        BinOp::And => {
            compile_expr(ctx, lhs)?;
            ctx.builder.emit(Opcode::Dup);
            let short = ctx.builder.emit_jump(Opcode::JumpIfFalse);
            ctx.builder.emit(Opcode::Pop);
            compile_expr(ctx, rhs)?;
            ctx.builder.patch_jump(short);
            Ok(())
        }
        BinOp::Or => {
            compile_expr(ctx, lhs)?;
            ctx.builder.emit(Opcode::Dup);
            let short = ctx.builder.emit_jump(Opcode::JumpIfTrue);
            ctx.builder.emit(Opcode::Pop);
            compile_expr(ctx, rhs)?;
            ctx.builder.patch_jump(short);
            Ok(())
        }
        _ => {
            compile_expr(ctx, lhs)?;
            compile_expr(ctx, rhs)?;
            let opcode = match op {
                BinOp::Add => Opcode::Add,
                BinOp::Sub => Opcode::Sub,
                BinOp::Mul => Opcode::Mul,
                BinOp::Div => Opcode::Div,
                BinOp::Mod => Opcode::Mod,
                BinOp::BitAnd => Opcode::BitAnd,
                BinOp::BitOr => Opcode::BitOr,
                BinOp::BitXor => Opcode::BitXor,
                BinOp::Shl => Opcode::Shl,
                BinOp::Shr => Opcode::Shr,
                BinOp::Eq => Opcode::CmpEq,
                BinOp::StrictEq => Opcode::CmpStrictEq,
                BinOp::NotEq => Opcode::CmpNotEq,
                BinOp::StrictNotEq => Opcode::CmpStrictNotEq,
                BinOp::Lt => Opcode::CmpLt,
                BinOp::Gt => Opcode::CmpGt,
                BinOp::LtEq => Opcode::CmpLtEq,
                BinOp::GtEq => Opcode::CmpGtEq,
                BinOp::And | BinOp::Or => unreachable!("handled above"),
            };
            ctx.builder.emit(opcode);
            Ok(())
        }
    }
}
