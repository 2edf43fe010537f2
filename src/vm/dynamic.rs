//! Field, common-variable and constant resolution.
//!
//! `LoadField`/`StoreField`/`LoadClassMember`/`StoreClassMember` and their
//! dynamic-name counterparts all funnel through [`load_member`]/
//! [`store_member`], parameterized by an ancestor-search root class and an
//! optional receiver object: `receiver_object = Some(id)` for an instance
//! access, `None` for a class-level (`$Classe.membro`) access. `LoadDynamic`/
//! `StoreDynamic` use the same two functions with the current frame's
//! defining class and receiver — there is no separate "locals" resolution
//! tier here, since a name that could be known at compile time (and so could
//! match a local) would never have been compiled to a dynamic-name opcode in
//! the first place.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

use crate::ast::TypeName;
use crate::bytecode::Code;
use crate::class::{ClassLoader, ConstantValue, VariableDesc};
use crate::intern::StringPool;
use crate::object::{ObjectId, ObjectTable};
use crate::util::fold_name;
use crate::value::{Number, Value, VectorData};

/// The zero value declared-but-unassigned fields take, by declared type.
pub fn default_for_type(ty: &TypeName) -> Value {
    match ty.name.to_lowercase().as_str() {
        "int1" | "int8" | "uint8" | "int16" | "uint16" | "int32" | "uint32" => Value::Int(0),
        "real" | "real2" => Value::Double(0.0),
        "txt1" | "txt2" => Value::str(""),
        _ => Value::Null,
    }
}

/// The zero value a declared field takes: a scalar default per
/// [`default_for_type`], or a fixed-length [`Value::Vector`] of that
/// default for a `tipo nome[N]` declaration.
pub fn default_for_variable(desc: &VariableDesc) -> Value {
    let scalar = default_for_type(&desc.ty);
    match desc.vector_size {
        Some(n) => Value::Vector(Rc::new(RefCell::new(VectorData::new(n, scalar)))),
        None => scalar,
    }
}

/// Masks a value written to a narrow-integer typed field to its declared
/// width.
pub fn truncate_for_type(ty: &TypeName, value: Value) -> Value {
    let mask: Option<i64> = match ty.name.to_lowercase().as_str() {
        "int1" => Some(0b1),
        "int8" | "uint8" => Some(0xFF),
        "int16" | "uint16" => Some(0xFFFF),
        "int32" | "uint32" => Some(0xFFFF_FFFF),
        _ => None,
    };
    let Some(mask) = mask else { return value };
    let i = match value.as_number() {
        Some(Number::Int(i)) => i,
        Some(Number::Double(d)) => d as i64,
        None => return value,
    };
    Value::Int(i & mask)
}

/// Result of [`load_member`]: either a ready value, or a lazily-evaluated
/// constant thunk the caller must run through the VM (`vm::Vm::eval_thunk`)
/// since this module has no bytecode dispatcher of its own.
pub enum MemberLoad<'u> {
    Value(Value),
    Thunk { code: &'u Code, strings: &'u StringPool, owner_class: &'u str },
}

/// Resolves a read of `folded_name`, searching `class_name` and its
/// ancestors for a declared instance/common variable, then a constant, and
/// finally falling back to an ad hoc field never declared anywhere.
pub fn load_member<'u>(
    loader: &'u ClassLoader,
    objects: &ObjectTable,
    commons: &AHashMap<String, AHashMap<String, Value>>,
    class_name: &str,
    receiver_object: Option<ObjectId>,
    folded_name: &str,
) -> MemberLoad<'u> {
    if let Some(owner) = loader.find_variable_owner(class_name, folded_name) {
        let owner_unit = loader.unit(owner).expect("owner returned by find_variable_owner");
        let desc = owner_unit.find_variable(folded_name).expect("owner declares this variable");
        let value = if desc.common {
            commons
                .get(&fold_name(owner))
                .and_then(|m| m.get(folded_name))
                .cloned()
                .unwrap_or_else(|| default_for_variable(desc))
        } else if let Some(id) = receiver_object {
            objects
                .get(id)
                .and_then(|o| o.get_field(folded_name))
                .cloned()
                .unwrap_or_else(|| default_for_variable(desc))
        } else {
            default_for_variable(desc)
        };
        return MemberLoad::Value(value);
    }

    if let Some((owner, constant)) = loader.find_constant(class_name, folded_name) {
        return match constant {
            ConstantValue::Immediate(v) => MemberLoad::Value(v.clone()),
            ConstantValue::Thunk(code) => {
                let strings = &loader.unit(owner).expect("owner returned by find_constant").strings;
                MemberLoad::Thunk { code, strings, owner_class: owner }
            }
        };
    }

    let value = if let Some(id) = receiver_object {
        objects.get(id).and_then(|o| o.get_field(folded_name)).cloned().unwrap_or(Value::Null)
    } else {
        commons.get(&fold_name(class_name)).and_then(|m| m.get(folded_name)).cloned().unwrap_or(Value::Null)
    };
    MemberLoad::Value(value)
}

/// Mirrors [`load_member`]'s precedence for writes: a declared variable
/// truncates per its type and lands in the object's fields or the shared
/// `commons` map; a constant name is immutable and the write is silently
/// dropped; anything else creates or updates an ad hoc field.
pub fn store_member(
    loader: &ClassLoader,
    objects: &mut ObjectTable,
    commons: &mut AHashMap<String, AHashMap<String, Value>>,
    class_name: &str,
    receiver_object: Option<ObjectId>,
    folded_name: &str,
    value: Value,
) {
    if let Some(owner) = loader.find_variable_owner(class_name, folded_name) {
        let owner_unit = loader.unit(owner).expect("owner returned by find_variable_owner");
        let desc = owner_unit.find_variable(folded_name).expect("owner declares this variable");
        let truncated = truncate_for_type(&desc.ty, value);
        if desc.common {
            commons.entry(fold_name(owner)).or_default().insert(folded_name.to_owned(), truncated);
        } else if let Some(id) = receiver_object {
            if let Some(obj) = objects.get_mut(id) {
                obj.set_field(folded_name, truncated);
            }
        }
        return;
    }

    if loader.find_constant(class_name, folded_name).is_some() {
        return;
    }

    if let Some(id) = receiver_object {
        if let Some(obj) = objects.get_mut(id) {
            obj.set_field(folded_name, value);
        }
    } else {
        commons.entry(fold_name(class_name)).or_default().insert(folded_name.to_owned(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TypeName;

    #[test]
    fn default_for_type_covers_every_primitive_family() {
        let int_ty = TypeName { name: "int32".into(), capacity: None };
        let real_ty = TypeName { name: "real".into(), capacity: None };
        let txt_ty = TypeName { name: "txt1".into(), capacity: Some(8) };
        assert!(matches!(default_for_type(&int_ty), Value::Int(0)));
        assert!(matches!(default_for_type(&real_ty), Value::Double(d) if d == 0.0));
        assert!(matches!(default_for_type(&txt_ty), Value::Str(s) if s.is_empty()));
    }

    #[test]
    fn truncate_masks_narrow_integers() {
        let ty = TypeName { name: "uint8".into(), capacity: None };
        let truncated = truncate_for_type(&ty, Value::Int(0x1FF));
        assert!(matches!(truncated, Value::Int(0xFF)));
    }
}
