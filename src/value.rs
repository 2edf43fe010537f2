//! The operand-stack value representation.

use std::cell::RefCell;
use std::rc::Rc;

use crate::object::ObjectId;
use crate::typehandler::DomainValue;

/// A tagged union of everything that can live on the operand stack or in a
/// variable slot.
///
/// Runtime strings are `Rc<str>` rather than `StringId`: string-pool ids only
/// identify *literals* inside one compiled unit, but `Concat` and built-ins
/// synthesize strings at runtime that never belong to any pool.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Int(i64),
    Double(f64),
    Str(Rc<str>),
    Object(ObjectId),
    Domain(Rc<DomainValue>),
    Vector(Rc<RefCell<VectorData>>),
}

/// Backing storage for a fixed-size `VarDecl` vector field: a flat element
/// list plus the declared type's zero value, returned in place of an
/// out-of-range index instead of faulting.
#[derive(Debug, Clone)]
pub struct VectorData {
    pub items: Vec<Value>,
    pub element_default: Value,
}

impl VectorData {
    pub fn new(size: u32, element_default: Value) -> Self {
        Self { items: vec![element_default.clone(); size as usize], element_default }
    }

    pub fn get(&self, index: i64) -> Value {
        if index < 0 {
            return self.element_default.clone();
        }
        self.items.get(index as usize).cloned().unwrap_or_else(|| self.element_default.clone())
    }

    pub fn set(&mut self, index: i64, value: Value) {
        if index < 0 {
            return;
        }
        if let Some(slot) = self.items.get_mut(index as usize) {
            *slot = value;
        }
    }
}

impl Value {
    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness used by `JumpIfTrue`/`JumpIfFalse` and `&&`/`||`
    /// short-circuiting: null and zero are false, everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Int(i) => *i != 0,
            Value::Double(d) => *d != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) | Value::Domain(_) => true,
            Value::Vector(v) => !v.borrow().items.is_empty(),
        }
    }

    /// Stringifies a value for `Concat`/string-coercion contexts.
    pub fn stringify(&self) -> Rc<str> {
        match self {
            Value::Null => Rc::from("nulo"),
            Value::Int(i) => Rc::from(i.to_string()),
            Value::Double(d) => Rc::from(format_double(*d)),
            Value::Str(s) => s.clone(),
            Value::Object(id) => Rc::from(format!("<obj#{}>", id.0)),
            Value::Domain(d) => Rc::from(d.display()),
            Value::Vector(v) => Rc::from(format!("<vetor#{}>", v.borrow().items.len())),
        }
    }

    /// Attempts a numeric interpretation of a string, for mixed `==`
    /// comparisons.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Double(d) => Some(Number::Double(*d)),
            Value::Str(s) => {
                let t = s.trim();
                if let Ok(i) = t.parse::<i64>() {
                    Some(Number::Int(i))
                } else {
                    t.parse::<f64>().ok().map(Number::Double)
                }
            }
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "nulo",
            Value::Int(_) => "int",
            Value::Double(_) => "real",
            Value::Str(_) => "txt",
            Value::Object(_) => "obj",
            Value::Domain(d) => d.type_name(),
            Value::Vector(_) => "vetor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Double(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Double(d) => d,
        }
    }
}

/// "General" floating-point formatting: integral doubles print without a
/// fractional part, matching the `real`/`real2` type handlers' display
/// convention.
fn format_double(d: f64) -> String {
    if d.fract() == 0.0 && d.is_finite() && d.abs() < 1e15 {
        format!("{d:.0}")
    } else {
        format!("{d}")
    }
}
