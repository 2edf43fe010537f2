//! Class-loader linking failures: an unknown base class and an inheritance
//! cycle across multiple compiled units.

use escriba::class::LinkError;
use escriba::host;
use escriba::Program;

#[test]
fn inheriting_from_an_unknown_class_fails_to_link() {
    let source = "classe filho herda paidesconhecido { func f: ret 1 }";
    let units = host::compile(source, "unknown_base.escriba").expect("compiles");
    let mut program: Program = Program::new();
    let err = program.load_program(units).expect_err("unknown base should fail to link");
    match err {
        LinkError::UnknownBase { class, base } => {
            assert_eq!(class, "filho");
            assert_eq!(base, "paidesconhecido");
        }
        other => panic!("expected UnknownBase, got {other}"),
    }
}

#[test]
fn a_two_class_inheritance_cycle_fails_to_link() {
    let source = r#"
classe a herda b { func f: ret 1 }
classe b herda a { func g: ret 2 }
"#;
    let units = host::compile(source, "cycle.escriba").expect("compiles");
    let mut program: Program = Program::new();
    let err = program.load_program(units).expect_err("cycle should fail to link");
    assert!(matches!(err, LinkError::InheritanceCycle { .. }));
}

#[test]
fn loading_a_second_file_can_supply_a_missing_base() {
    let base_source = "classe base { func f: ret 1 }";
    let derived_source = "classe derivada herda base { func g: ret 2 }";
    let base_units = host::compile(base_source, "base.escriba").expect("compiles");
    let derived_units = host::compile(derived_source, "derived.escriba").expect("compiles");

    let mut program: Program = Program::new();
    // Loading the derived class alone fails...
    let mut program_fail: Program = Program::new();
    program_fail
        .load_program(derived_units.clone())
        .expect_err("base not yet loaded");

    // ...but loading both together across two calls succeeds.
    program.load_program(base_units).expect("base links");
    program.load_program(derived_units).expect("derived links once base is present");
}
