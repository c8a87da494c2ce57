//! Integration Test: Panic Prohibition
//!
//! **Policy**: Production code propagates errors with `?` or handles them.
//! `unwrap()` and `expect()` are allowed in test modules only.

use architectural_enforcement::scan;

#[test]
fn test_no_unwrap_in_production_code() {
    let violations = scan(|code| code.contains(".unwrap()") || code.contains(".expect("));

    if !violations.is_empty() {
        eprintln!("\n❌ unwrap()/expect() found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        panic!(
            "\nFound {} panic site(s) in production code.\nPropagate the error instead.",
            violations.len()
        );
    }
}

#[test]
fn test_no_panic_macros_in_production_code() {
    let violations = scan(|code| {
        code.contains("panic!(") || code.contains("todo!(") || code.contains("unimplemented!(")
    });

    assert!(
        violations.is_empty(),
        "panic macros in production code:\n{}",
        violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    );
}
