use kaleido::ast::{Prototype, ANON_FN_NAME};
use kaleido::interpreter::Interpreter;
use kaleido::lexer::Lexer;
use kaleido::{Driver, Parser, Summary};
use pretty_assertions::assert_eq;

type SessionDriver<'a> = Driver<std::str::Chars<'a>, Interpreter<Vec<u8>>, Vec<u8>>;

fn session(source: &str) -> (SessionDriver<'_>, Summary) {
    let parser = Parser::new(Lexer::new(source.chars()));
    let mut driver = Driver::new(parser, Interpreter::new(Vec::new()), Vec::new());
    let summary = driver.run().expect("console writes to a Vec never fail");
    (driver, summary)
}

fn console(driver: &SessionDriver<'_>) -> String {
    String::from_utf8(driver.console().clone()).unwrap()
}

fn error_lines(driver: &SessionDriver<'_>) -> Vec<String> {
    console(driver)
        .lines()
        .filter(|line| line.starts_with("Error: "))
        .map(str::to_string)
        .collect()
}

#[test]
fn evaluates_a_small_program() {
    let source = r#"
# squares and sums
extern sqrt(x);
def sq(x) x * x;
def hyp(a b) sqrt(sq(a) + sq(b));
hyp(3, 4);
1 - 2 - 3;
"#;
    let (driver, summary) = session(source);
    assert_eq!(
        summary,
        Summary {
            definitions: 2,
            externs: 1,
            evaluations: 2,
            errors: 0,
        }
    );
    assert_eq!(
        console(&driver),
        "Parsed an extern.\n\
         Parsed a function definition.\n\
         Parsed a function definition.\n\
         Evaluated to: 5\n\
         Evaluated to: -4\n"
    );
}

#[test]
fn recovers_after_malformed_definition() {
    let (driver, summary) = session("def f( x\n1+1;\n");
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.evaluations, 1);
    assert_eq!(
        error_lines(&driver),
        vec!["Error: expected ')' in prototype but found number 1"]
    );
    assert!(console(&driver).ends_with("Evaluated to: 2\n"));
    assert!(!driver.registry().contains("f"));
}

#[test]
fn extern_then_definition_keeps_latest_prototype() {
    let (driver, summary) = session("extern foo(a);\ndef foo(b) b * 2;\nfoo(21);");
    assert_eq!(summary.errors, 0);
    assert_eq!(
        driver.registry().get("foo"),
        Some(&Prototype::new("foo", vec!["b".to_string()]))
    );
    assert_eq!(driver.registry().arity("foo"), Some(1));
    assert!(console(&driver).ends_with("Evaluated to: 42\n"));
}

#[test]
fn calls_need_earlier_units() {
    let (driver, summary) = session("later(1);\ndef later(x) x;\nlater(1);");
    assert_eq!(summary.errors, 1);
    assert_eq!(error_lines(&driver), vec!["Error: unknown function later"]);
    assert!(console(&driver).ends_with("Evaluated to: 1\n"));
}

#[test]
fn failed_definition_is_not_registered() {
    let (driver, summary) = session("def broken(x) y;\nbroken(1);");
    assert_eq!(summary.errors, 2);
    assert_eq!(
        error_lines(&driver),
        vec![
            "Error: unknown variable referenced y",
            "Error: unknown function broken",
        ]
    );
    assert!(driver.registry().is_empty());
}

#[test]
fn wrong_arity_is_reported() {
    let (driver, _) = session("def add(a b) a + b;\nadd(1);");
    assert_eq!(
        error_lines(&driver),
        vec!["Error: invalid number of args in call add expected 2 found 1"]
    );
}

#[test]
fn reserved_anonymous_name_cannot_be_defined() {
    let source = format!("def {}() 1\n2;", ANON_FN_NAME);
    let (driver, summary) = session(&source);
    assert_eq!(summary.definitions, 0);
    assert!(!driver.registry().contains(ANON_FN_NAME));
    assert_eq!(
        error_lines(&driver)[0],
        "Error: expected function name in prototype but found '_'"
    );
    assert!(console(&driver).ends_with("Evaluated to: 2\n"));
}

#[test]
fn incomplete_input_terminates() {
    let (driver, summary) = session("1 +");
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.evaluations, 0);
    assert_eq!(
        error_lines(&driver),
        vec!["Error: unknown token end of input when expecting an expression"]
    );
}

#[test]
fn missing_call_paren_does_not_crash() {
    let (driver, summary) = session("extern sin(x);\nsin(0;\nsin(0);");
    assert_eq!(summary.errors, 1);
    assert_eq!(
        error_lines(&driver),
        vec!["Error: expected ')' or ',' in argument list but found ';'"]
    );
    assert!(console(&driver).ends_with("Evaluated to: 0\n"));
}

#[test]
fn builtin_output_goes_to_interpreter() {
    let (driver, _) = session("extern putchard(c);\nputchard(72) + putchard(105);");
    assert_eq!(driver.backend().output(), &b"Hi".to_vec());
}

#[test]
fn overlong_chain_is_an_error_not_a_crash() {
    let source = format!("1{};\n2 * 3;\n", "+1".repeat(10_000));
    let (driver, summary) = session(&source);
    assert!(summary.errors > 0);
    for line in error_lines(&driver) {
        assert_eq!(line, "Error: expression nested deeper than 256 levels");
    }
    assert!(console(&driver).ends_with("Evaluated to: 6\n"));
}
