/// End-to-end tests: source text → Trigger → serialized conditions
use trigscript::{
    parse_expression, CompileOptions, Compiler, Error, ErrorClass, Evaluator, Expression, Trigger,
};

fn compile(source: &str) -> String {
    Compiler::default()
        .compile(source)
        .unwrap_or_else(|e| panic!("{} failed: {}", source, e))
        .serialize()
}

fn compile_err(source: &str) -> Error {
    Compiler::default()
        .compile(source)
        .expect_err("compilation should fail")
}

#[test]
fn test_common_factor_is_divided_out() {
    let expr = parse_expression("byte(0x1234) * 10 == byte(0x2345) * 50").unwrap();
    let normalized = Evaluator::new().evaluate(&expr).unwrap();
    assert_eq!(normalized.to_string(), "byte(0x002345) * 5 == byte(0x001234)");
}

#[test]
fn test_negative_difference_is_inverted() {
    assert_eq!(compile("byte(1) - byte(2) == -1"), "B:0xH000001_0xH000002=1");
}

#[test]
fn test_bcd_constant_is_encoded() {
    assert_eq!(compile("bcd(byte(1)) == 24"), "0xH000001=36");
}

#[test]
fn test_out_of_range_comparison_is_false() {
    let expr = parse_expression("byte(0x1234) > 256").unwrap();
    assert_eq!(
        Evaluator::new().evaluate(&expr).unwrap(),
        Expression::Boolean(false)
    );
    assert_eq!(compile("byte(0x1234) > 256"), "0=1");
}

#[test]
fn test_shared_disjunct_is_factored() {
    // (A || B) && (A || C)  =>  A || (B && C)
    assert_eq!(
        compile("(byte(1) == 1 || byte(2) == 2) && (byte(1) == 1 || byte(3) == 3)"),
        "S0xH000001=1S0xH000002=2_0xH000003=3"
    );
}

#[test]
fn test_reset_next_is_promoted() {
    assert_eq!(
        compile("repeated(10, byte(1) == 1 && never(byte(2) == 0))"),
        "R:0xH000002=0_0xH000001=1.10."
    );
}

#[test]
fn test_flags() {
    assert_eq!(
        compile("unless(byte(3) == 1) && byte(1) == 2"),
        "P:0xH000003=1_0xH000001=2"
    );
    assert_eq!(
        compile("measured(byte(1) == 5, when=byte(2) == 1)"),
        "M:0xH000001=5_Q:0xH000002=1"
    );
}

#[test]
fn test_shared_pointer() {
    assert_eq!(
        compile("byte(dword(0x10) + 4) == byte(dword(0x10) + 8)"),
        "I:0xX000010_0xH000004=0xH000008"
    );
}

#[test]
fn test_error_classes() {
    assert_eq!(compile_err("byte(1) +"), Error::UnexpectedEof);
    assert_eq!(compile_err("byte(1) +").class(), ErrorClass::Syntax);

    assert_eq!(
        compile_err("byte(1) & 1.5 == 1").class(),
        ErrorClass::IllegalOperation
    );
    assert_eq!(
        compile_err("(byte(1) == 1 || byte(2) == 2) && (byte(3) == 3 || never(byte(4) == 4))")
            .class(),
        ErrorClass::Structural
    );
    assert!(matches!(
        compile_err("lives == 3"),
        Error::UndefinedIdentifier { .. }
    ));
}

#[test]
fn test_unoptimized_output_keeps_duplicates() {
    let compiler = Compiler::new(CompileOptions {
        optimize: false,
        ..CompileOptions::default()
    });
    let trigger = compiler.compile("byte(1) > 1 && byte(1) > 2").unwrap();
    assert_eq!(trigger.serialize(), "0xH000001>1_0xH000001>2");
    assert_eq!(compile("byte(1) > 1 && byte(1) > 2"), "0xH000001>2");
}

#[test]
fn test_serialized_trigger_parses_back() {
    let trigger = Compiler::default()
        .compile("once(byte(1) == 1) && (word(2) < 100 || prev(byte(4)) != byte(4))")
        .unwrap();
    let text = trigger.serialize();
    assert_eq!(Trigger::parse(&text).unwrap(), trigger);
}

#[test]
fn test_batch_matches_sequential() {
    let sources = [
        "byte(1) == 1",
        "once(byte(2) == 2) && never(byte(3) == 3)",
        "byte(4) == 4 || byte(5) == 5",
        "byte(6) ==",
    ];
    let compiler = Compiler::new(CompileOptions {
        threads: Some(4),
        ..CompileOptions::default()
    });
    let batch = compiler.compile_batch(&sources).unwrap();
    for (source, result) in sources.iter().zip(batch) {
        assert_eq!(result, compiler.compile(source));
    }
}
