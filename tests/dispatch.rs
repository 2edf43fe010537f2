//! Method dispatch and field-resolution semantics: virtual overrides search
//! the ancestor chain most-derived-first, `comum` fields are shared across
//! every instance of a class, and name lookups are case-insensitive.

use escriba::host;
use escriba::{Program, Value};

fn as_int(v: Value) -> i64 {
    match v {
        Value::Int(i) => i,
        other => panic!("expected Int, got {other:?}"),
    }
}

#[test]
fn common_fields_are_shared_across_instances() {
    let source = r#"
classe contador {
  comum int32 total = 0
  func incrementa: total = total + 1 ret total
}
"#;
    let units = host::compile(source, "common.escriba").expect("compiles");
    let mut program: Program = Program::new();
    program.load_program(units).expect("links");

    let a = program.create_instance("contador", Vec::new()).expect("constructs");
    let b = program.create_instance("contador", Vec::new()).expect("constructs");
    let Value::Object(a_id) = a else { panic!() };
    let Value::Object(b_id) = b else { panic!() };

    let first = program.call_method(a_id, "incrementa", Vec::new()).expect("calls");
    assert_eq!(as_int(first), 1);
    let second = program.call_method(b_id, "incrementa", Vec::new()).expect("calls");
    assert_eq!(as_int(second), 2, "comum field must be shared, not per-instance");
}

#[test]
fn method_names_are_resolved_case_insensitively() {
    let source = "classe c { func Soma: ret arg0 + arg1 }";
    let units = host::compile(source, "case.escriba").expect("compiles");
    let mut program: Program = Program::new();
    program.load_program(units).expect("links");
    let obj = program.create_instance("c", Vec::new()).expect("constructs");
    let Value::Object(id) = obj else { panic!() };
    let result = program
        .call_method(id, "SOMA", vec![Value::Int(2), Value::Int(3)])
        .expect("calls despite case mismatch");
    assert_eq!(as_int(result), 5);
}

#[test]
fn derived_class_inherits_unoverridden_methods() {
    let source = r#"
classe base {
  func saudacao: ret "ola"
}
classe derivada herda base {
  func extra: ret 1
}
"#;
    let units = host::compile(source, "inherit.escriba").expect("compiles");
    let mut program: Program = Program::new();
    program.load_program(units).expect("links");
    let obj = program.create_instance("derivada", Vec::new()).expect("constructs");
    let Value::Object(id) = obj else { panic!() };
    let result = program.call_method(id, "saudacao", Vec::new()).expect("calls inherited method");
    assert!(matches!(result, Value::Str(s) if &*s == "ola"));
}

#[test]
fn calling_an_undeclared_method_degrades_to_null_instead_of_faulting() {
    let source = "classe c { func f: ret 1 }";
    let units = host::compile(source, "nomethod.escriba").expect("compiles");
    let mut program: Program = Program::new();
    program.load_program(units).expect("links");
    let obj = program.create_instance("c", Vec::new()).expect("constructs");
    let Value::Object(id) = obj else { panic!() };
    let result = program
        .call_method(id, "nao_existe", Vec::new())
        .expect("unresolved calls degrade rather than fault");
    assert!(result.is_null());
}
