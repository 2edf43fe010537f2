//! Compile-time error taxonomy: redefinition, duplicate locals, invalid
//! assignment targets, and out-of-range text capacities.

use escriba::compiler::CompileErrorKind;
use escriba::host;
use escriba::ProgramError;

fn compile_err(source: &str, file: &str) -> ProgramError {
    host::compile(source, file).expect_err("expected a compile error")
}

#[test]
fn redefining_a_member_name_is_an_error() {
    let source = r#"
classe c {
  func f: ret 1
  func f: ret 2
}
"#;
    match compile_err(source, "redef.escriba") {
        ProgramError::Compile(e) => {
            assert!(matches!(e.kind, CompileErrorKind::Redefinition(ref name) if name == "f"));
        }
        other => panic!("expected a compile error, got {other}"),
    }
}

#[test]
fn duplicate_local_in_the_same_block_is_an_error() {
    let source = r#"
classe c {
  func f:
    int32 x = 1
    int32 x = 2
    ret x
}
"#;
    match compile_err(source, "dup.escriba") {
        ProgramError::Compile(e) => {
            assert!(matches!(e.kind, CompileErrorKind::DuplicateLocal(ref name) if name == "x"));
        }
        other => panic!("expected a compile error, got {other}"),
    }
}

#[test]
fn assigning_to_a_literal_is_an_invalid_assignment_target() {
    let source = "classe c { func f: 1 = 2 }";
    match compile_err(source, "badassign.escriba") {
        ProgramError::Compile(e) => {
            assert!(matches!(e.kind, CompileErrorKind::InvalidAssignmentTarget));
        }
        other => panic!("expected a compile error, got {other}"),
    }
}

#[test]
fn zero_text_capacity_is_out_of_range() {
    let source = "classe c { func f: txt1(0) s = \"x\" }";
    match compile_err(source, "cap.escriba") {
        ProgramError::Compile(e) => {
            assert!(matches!(e.kind, CompileErrorKind::TextSizeOutOfRange(0)));
        }
        other => panic!("expected a compile error, got {other}"),
    }
}
