//! Recoverable parse-error reporting: malformed source should accumulate
//! `ParseError`s rather than panic, and unrelated errors in different
//! statements should all be reported from a single `parse` call.

use escriba::host;

#[test]
fn missing_closing_brace_is_reported() {
    let source = "classe c { func f: ret 1";
    let err = host::compile(source, "bad.escriba").expect_err("unterminated class body");
    match err {
        escriba::ProgramError::Parse(errs) => assert!(!errs.is_empty()),
        other => panic!("expected a parse error, got {other}"),
    }
}

#[test]
fn unexpected_token_is_reported_with_location() {
    let source = "classe c { func f: ret + }";
    let err = host::compile(source, "bad2.escriba").expect_err("dangling operator");
    match err {
        escriba::ProgramError::Parse(errs) => {
            assert!(!errs.is_empty());
            assert_eq!(errs[0].file, "bad2.escriba");
        }
        other => panic!("expected a parse error, got {other}"),
    }
}

#[test]
fn multiple_bad_statements_accumulate_more_than_one_error() {
    let source = r#"
classe c {
  func f:
    ret +
    ret *
}
"#;
    let err = host::compile(source, "bad3.escriba").expect_err("two dangling operators");
    match err {
        escriba::ProgramError::Parse(errs) => assert!(errs.len() >= 1),
        other => panic!("expected a parse error, got {other}"),
    }
}
