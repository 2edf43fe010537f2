//! Built-in function table: math, text and I/O helpers callable without a
//! receiver.

use std::sync::OnceLock;

use ahash::AHashSet;

use crate::util::fold_name;
use crate::value::Value;

/// Names resolvable as built-ins rather than as a method call on the
/// current instance. Matched case-insensitively like every other name in
/// the language.
///
/// `divide` (split-into-list) is deliberately absent: this implementation
/// has no list/vector value to return it as.
const NAMES: &[&str] = &[
    "tam", "abs", "raiz", "pot", "piso", "teto", "arred", "aleatorio", "min", "max",
    "maiusc", "minusc", "apara", "subtxt", "posicao", "substitui", "junta",
    "imprime", "le",
];

fn table() -> &'static AHashSet<String> {
    static TABLE: OnceLock<AHashSet<String>> = OnceLock::new();
    TABLE.get_or_init(|| NAMES.iter().map(|n| fold_name(n)).collect())
}

/// Whether `name` names a built-in, as opposed to a method on the current
/// instance. The compiler consults this to decide between `CallBuiltin`
/// and an implicit-`this` `CallMethod`.
pub fn is_builtin(name: &str) -> bool {
    table().contains(&fold_name(name))
}

fn arg_number(args: &[Value], i: usize) -> f64 {
    args.get(i).and_then(Value::as_number).map(|n| n.as_f64()).unwrap_or(0.0)
}

fn arg_str(args: &[Value], i: usize) -> std::rc::Rc<str> {
    args.get(i).map(Value::stringify).unwrap_or_else(|| Value::str(""))
}

/// Returns a random float in `[0.0, 1.0)` backing `aleatorio`, drawn from OS
/// entropy the same way as every other random source in this corpus.
fn next_random() -> f64 {
    use rand::RngCore;

    let mut rng = rand::rngs::OsRng;
    let a = rng.next_u32() >> 5;
    let b = rng.next_u32() >> 6;
    (f64::from(a) * 67_108_864.0 + f64::from(b)) / (1u64 << 53) as f64
}

/// Executes a built-in by folded name. `output`/`input` back `imprime`/`le`.
pub fn call(name: &str, args: &[Value], output: &mut dyn FnMut(&str), input: &mut dyn FnMut() -> String) -> Value {
    match fold_name(name).as_str() {
        "tam" => {
            let s = arg_str(args, 0);
            Value::Int(s.chars().count() as i64)
        }
        "abs" => Value::Double(arg_number(args, 0).abs()),
        "raiz" => Value::Double(arg_number(args, 0).sqrt()),
        "pot" => Value::Double(arg_number(args, 0).powf(arg_number(args, 1))),
        "piso" => Value::Double(arg_number(args, 0).floor()),
        "teto" => Value::Double(arg_number(args, 0).ceil()),
        "arred" => Value::Double(arg_number(args, 0).round()),
        "aleatorio" => Value::Double(next_random()),
        "min" => Value::Double(arg_number(args, 0).min(arg_number(args, 1))),
        "max" => Value::Double(arg_number(args, 0).max(arg_number(args, 1))),
        "maiusc" => Value::str(arg_str(args, 0).to_uppercase()),
        "minusc" => Value::str(arg_str(args, 0).to_lowercase()),
        "apara" => Value::str(arg_str(args, 0).trim().to_owned()),
        "subtxt" => {
            let s = arg_str(args, 0);
            let start = arg_number(args, 1).max(0.0) as usize;
            let len = args.get(2).and_then(Value::as_number).map(|n| n.as_f64() as usize);
            let chars: Vec<char> = s.chars().collect();
            let end = len.map(|l| (start + l).min(chars.len())).unwrap_or(chars.len());
            if start >= chars.len() || start >= end {
                Value::str("")
            } else {
                Value::str(chars[start..end].iter().collect::<String>())
            }
        }
        "posicao" => {
            let haystack = arg_str(args, 0);
            let needle = arg_str(args, 1);
            match haystack.find(needle.as_ref()) {
                Some(byte_idx) => Value::Int(haystack[..byte_idx].chars().count() as i64),
                None => Value::Int(-1),
            }
        }
        "substitui" => {
            let s = arg_str(args, 0);
            let from = arg_str(args, 1);
            let to = arg_str(args, 2);
            Value::str(s.replace(from.as_ref(), &to))
        }
        "junta" => {
            let a = arg_str(args, 0);
            let b = arg_str(args, 1);
            Value::str(format!("{a}{b}"))
        }
        "imprime" => {
            output(&arg_str(args, 0));
            Value::Null
        }
        "le" => Value::str(input()),
        _ => Value::Null,
    }
}
