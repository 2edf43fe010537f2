//! End-to-end scenarios exercising the compile → link → run pipeline through
//! `host::Program`, one per documented behavior.

use escriba::{host, Program, Value};

fn run(source: &str, file: &str, class: &str, method: &str, args: Vec<Value>) -> Value {
    let units = host::compile(source, file).expect("compiles");
    let mut program: Program = Program::new();
    program.load_program(units).expect("links");
    let obj = program.create_instance(class, Vec::new()).expect("constructs");
    let Value::Object(id) = obj else { panic!("expected an object") };
    program.call_method(id, method, args).expect("calls")
}

fn as_int(v: Value) -> i64 {
    match v {
        Value::Int(i) => i,
        other => panic!("expected Int, got {other:?}"),
    }
}

fn as_str(v: Value) -> String {
    match v {
        Value::Str(s) => s.to_string(),
        other => panic!("expected Str, got {other:?}"),
    }
}

#[test]
fn arithmetic_and_args() {
    let source = "classe c { func soma: ret arg0 + arg1 }";
    let result = run(source, "s1.escriba", "c", "soma", vec![Value::Int(10), Value::Int(32)]);
    assert_eq!(as_int(result), 42);
}

#[test]
fn while_sum() {
    let source = r#"
classe c {
  func soma_ate:
    int32 total = 0
    int32 i = 1
    enquanto i <= arg0
      total = total + i
      i = i + 1
    efim
    ret total
}
"#;
    let result = run(source, "s2.escriba", "c", "soma_ate", vec![Value::Int(10)]);
    assert_eq!(as_int(result), 55);

    let result = run(source, "s2.escriba", "c", "soma_ate", vec![Value::Int(0)]);
    assert_eq!(as_int(result), 0);
}

#[test]
fn conditional_return() {
    let source = "classe c { func f: ret arg0 == 0, nulo\n ret \"pos\" }";
    let result = run(source, "s3.escriba", "c", "f", vec![Value::Int(0)]);
    assert!(result.is_null());

    let result = run(source, "s3.escriba", "c", "f", vec![Value::Int(5)]);
    assert_eq!(as_str(result), "pos");
}

#[test]
fn virtual_dispatch() {
    let source = r#"
classe forma {
  varfunc area: ret 0
}
classe retangulo herda forma {
  int32 w
  int32 h
  func define:
    w = arg0
    h = arg1
  func area: ret w * h
}
"#;
    let units = host::compile(source, "s4.escriba").expect("compiles");
    let mut program: Program = Program::new();
    program.load_program(units).expect("links");

    let rect = program.create_instance("retangulo", Vec::new()).expect("constructs");
    let Value::Object(rect_id) = rect else { panic!() };
    program
        .call_method(rect_id, "define", vec![Value::Int(10), Value::Int(5)])
        .expect("sets fields");
    let area = program.call_method(rect_id, "area", Vec::new()).expect("calls");
    assert_eq!(as_int(area), 50);

    let base = program.create_instance("forma", Vec::new()).expect("constructs");
    let Value::Object(base_id) = base else { panic!() };
    let area = program.call_method(base_id, "area", Vec::new()).expect("calls");
    assert_eq!(as_int(area), 0);
}

#[test]
fn dynamic_name_read_and_write() {
    let source = r#"
classe c {
  txt1 passo0 = "a"
  txt1 passo1 = "b"
  txt1 passo2 = "c"
  int32 tpasso = 1

  func ler: ret passo[tpasso]
  func escrever: passo[tpasso] = arg0
}
"#;
    let units = host::compile(source, "s5.escriba").expect("compiles");
    let mut program: Program = Program::new();
    program.load_program(units).expect("links");
    let obj = program.create_instance("c", Vec::new()).expect("constructs");
    let Value::Object(id) = obj else { panic!() };

    let result = program.call_method(id, "ler", Vec::new()).expect("calls");
    assert_eq!(as_str(result), "b");

    program
        .call_method(id, "escrever", vec![Value::str("x")])
        .expect("calls");
    let result = program.call_method(id, "ler", Vec::new()).expect("calls");
    assert_eq!(as_str(result), "x");
}

#[test]
fn switch_with_default() {
    let source = r#"
classe c {
  func escolhe:
    casovar arg0 {
      casose "a": ret 1
      casose "b": ret 2
      casose: ret -1
    } casofim
}
"#;
    assert_eq!(as_int(run(source, "s6.escriba", "c", "escolhe", vec![Value::str("a")])), 1);
    assert_eq!(as_int(run(source, "s6.escriba", "c", "escolhe", vec![Value::str("b")])), 2);
    assert_eq!(as_int(run(source, "s6.escriba", "c", "escolhe", vec![Value::str("c")])), -1);
}

#[test]
fn postfix_vs_prefix_increment() {
    let source = r#"
classe c {
  int32 v = 10
  func pos: ret v++
  func pre: ret ++v
}
"#;
    let units = host::compile(source, "s7.escriba").expect("compiles");
    let mut program: Program = Program::new();
    program.load_program(units).expect("links");
    let obj = program.create_instance("c", Vec::new()).expect("constructs");
    let Value::Object(id) = obj else { panic!() };

    let result = program.call_method(id, "pos", Vec::new()).expect("calls");
    assert_eq!(as_int(result), 10);
    let result = program.call_method(id, "pre", Vec::new()).expect("calls");
    assert_eq!(as_int(result), 12);
}

#[test]
fn string_concatenation() {
    let source = "classe c { func juntar: ret arg0 + arg1 }";
    let result = run(
        source,
        "s8.escriba",
        "c",
        "juntar",
        vec![Value::str("Hello, "), Value::str("World!")],
    );
    assert_eq!(as_str(result), "Hello, World!");
}
