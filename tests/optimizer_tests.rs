//! Optimizer properties
//!
//! Random requirement trees over four byte fields are compiled with and
//! without the optimizer, then evaluated by the reference engine for every
//! assignment of the fields and compared with direct evaluation of the tree.
//! Scripts with hit counts, resets and pauses are instead run over frame
//! sequences, and the optimized trigger must fire on exactly the same frames.

use proptest::prelude::*;
use trigscript::expr::FieldSize;
use trigscript::{optimize, CompileOptions, Compiler, Engine, Error, Memory, Trigger};

// =============================================================================
// STRATEGY GENERATORS
// =============================================================================

const OPS: [&str; 6] = ["==", "!=", "<", "<=", ">", ">="];
const VALUES: [u32; 4] = [0, 1, 2, 3];

#[derive(Debug, Clone)]
enum Req {
    Compare { address: u32, op: &'static str, value: u32 },
    And(Vec<Req>),
    Or(Vec<Req>),
}

impl Req {
    fn source(&self) -> String {
        match self {
            Req::Compare { address, op, value } => format!("byte({}) {} {}", address, op, value),
            Req::And(parts) => join(parts, " && "),
            Req::Or(parts) => join(parts, " || "),
        }
    }

    fn eval(&self, memory: &[u32; 5]) -> bool {
        match self {
            Req::Compare { address, op, value } => {
                let actual = memory[*address as usize];
                match *op {
                    "==" => actual == *value,
                    "!=" => actual != *value,
                    "<" => actual < *value,
                    "<=" => actual <= *value,
                    ">" => actual > *value,
                    _ => actual >= *value,
                }
            }
            Req::And(parts) => parts.iter().all(|p| p.eval(memory)),
            Req::Or(parts) => parts.iter().any(|p| p.eval(memory)),
        }
    }
}

fn join(parts: &[Req], separator: &str) -> String {
    let inner: Vec<String> = parts.iter().map(Req::source).collect();
    format!("({})", inner.join(separator))
}

fn compare() -> impl Strategy<Value = Req> {
    (1u32..=4, prop::sample::select(OPS.to_vec()), 0u32..=3)
        .prop_map(|(address, op, value)| Req::Compare { address, op, value })
}

fn requirement() -> impl Strategy<Value = Req> {
    compare().prop_recursive(3, 12, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 2..4).prop_map(Req::And),
            prop::collection::vec(inner, 2..4).prop_map(Req::Or),
        ]
    })
}

const FLAG_OPS: [&str; 4] = ["==", "!=", "<", ">"];

#[derive(Debug, Clone)]
struct Cmp {
    address: u32,
    op: &'static str,
    value: u32,
}

impl Cmp {
    fn source(&self) -> String {
        format!("byte({}) {} {}", self.address, self.op, self.value)
    }
}

/// Group-level clause of a script with hit counts, resets and pauses
#[derive(Debug, Clone)]
enum Clause {
    Plain(Cmp),
    Once(Cmp),
    Repeated(u32, Cmp),
    Never(Cmp),
    Unless(Cmp),
    GuardedRepeat(u32, Cmp, Cmp),
    OnceEither(Cmp, Cmp),
}

impl Clause {
    fn source(&self) -> String {
        match self {
            Clause::Plain(c) => c.source(),
            Clause::Once(c) => format!("once({})", c.source()),
            Clause::Repeated(n, c) => format!("repeated({}, {})", n, c.source()),
            Clause::Never(c) => format!("never({})", c.source()),
            Clause::Unless(c) => format!("unless({})", c.source()),
            Clause::GuardedRepeat(n, c, reset) => {
                format!("repeated({}, {} && never({}))", n, c.source(), reset.source())
            }
            Clause::OnceEither(a, b) => format!("once({} || {})", a.source(), b.source()),
        }
    }
}

#[derive(Debug, Clone)]
struct Script {
    core: Vec<Clause>,
    alts: Vec<Vec<Clause>>,
}

impl Script {
    fn source(&self) -> String {
        let mut parts: Vec<String> = self.core.iter().map(Clause::source).collect();
        if !self.alts.is_empty() {
            let alts: Vec<String> = self
                .alts
                .iter()
                .map(|alt| {
                    let clauses: Vec<String> = alt.iter().map(Clause::source).collect();
                    format!("({})", clauses.join(" && "))
                })
                .collect();
            parts.push(format!("({})", alts.join(" || ")));
        }
        parts.join(" && ")
    }
}

fn cmp() -> impl Strategy<Value = Cmp> {
    (1u32..=3, prop::sample::select(FLAG_OPS.to_vec()), 1u32..=2)
        .prop_map(|(address, op, value)| Cmp { address, op, value })
}

fn clause() -> impl Strategy<Value = Clause> {
    prop_oneof![
        3 => cmp().prop_map(Clause::Plain),
        2 => cmp().prop_map(Clause::Once),
        2 => (2u32..=3, cmp()).prop_map(|(n, c)| Clause::Repeated(n, c)),
        2 => cmp().prop_map(Clause::Never),
        1 => cmp().prop_map(Clause::Unless),
        1 => (2u32..=3, cmp(), cmp()).prop_map(|(n, c, r)| Clause::GuardedRepeat(n, c, r)),
        1 => (cmp(), cmp()).prop_map(|(a, b)| Clause::OnceEither(a, b)),
    ]
}

fn script() -> impl Strategy<Value = Script> {
    let alts = prop_oneof![
        Just(Vec::new()).boxed(),
        prop::collection::vec(prop::collection::vec(clause(), 1..3), 2..4).boxed(),
    ];
    (prop::collection::vec(clause(), 1..4), alts).prop_map(|(core, alts)| Script { core, alts })
}

fn frames() -> impl Strategy<Value = Vec<[u8; 3]>> {
    prop::collection::vec(prop::array::uniform3(0u8..=3), 4..16)
}

// =============================================================================
// HELPERS
// =============================================================================

fn compiler(optimize: bool) -> Compiler {
    Compiler::new(CompileOptions {
        optimize,
        ..CompileOptions::default()
    })
}

/// Every assignment of `VALUES` to `byte(1)..=byte(4)`
fn assignments() -> impl Iterator<Item = [u32; 5]> {
    VALUES.into_iter().flat_map(|a| {
        VALUES.into_iter().flat_map(move |b| {
            VALUES
                .into_iter()
                .flat_map(move |c| VALUES.into_iter().map(move |d| [0, a, b, c, d]))
        })
    })
}

fn memory(values: &[u32; 5]) -> Memory {
    let mut memory = Memory::new(values.len());
    for (address, value) in values.iter().enumerate() {
        memory.write(FieldSize::Byte, address as u32, *value);
    }
    memory
}

fn assert_equivalent(source: &str, trigger: &Trigger, expected: impl Fn(&[u32; 5]) -> bool) {
    for values in assignments() {
        assert_eq!(
            Engine::evaluate(trigger, &memory(&values)),
            expected(&values),
            "{} compiled to {} with {:?}",
            source,
            trigger.serialize(),
            &values[1..]
        );
    }
}

/// Run both triggers over `frames` and compare the frames on which they fire
fn assert_same_frames(source: &str, unoptimized: &Trigger, optimized: &Trigger, frames: &[[u8; 3]]) {
    let mut original = Engine::new(unoptimized.clone());
    let mut rewritten = Engine::new(optimized.clone());
    for (i, frame) in frames.iter().enumerate() {
        let memory = Memory::from_bytes(vec![0, frame[0], frame[1], frame[2]]);
        assert_eq!(
            rewritten.do_frame(&memory),
            original.do_frame(&memory),
            "{} optimized to {} from {}, diverged at frame {} of {:?}",
            source,
            optimized.serialize(),
            unoptimized.serialize(),
            i,
            frames
        );
    }
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[test]
fn test_hit_counts_survive_optimization() {
    let frames: Vec<[u8; 3]> = vec![
        [1, 1, 0],
        [1, 1, 0],
        [0, 2, 1],
        [1, 1, 0],
        [1, 2, 0],
        [1, 1, 1],
        [1, 1, 0],
        [1, 1, 0],
        [1, 2, 0],
    ];
    let sources = [
        "repeated(3, byte(1) == 1 && never(byte(3) == 1)) && byte(2) != 0",
        "once(byte(1) == 1) && ((byte(2) == 1 && never(byte(3) == 1)) || (byte(2) == 2 && never(byte(3) == 1)))",
        "(repeated(2, byte(1) == 1) && byte(2) == 1) || (repeated(2, byte(1) == 1) && unless(byte(3) == 1))",
        "repeated(2, byte(2) == 1 && never(byte(3) == 1)) && never(byte(1) == 0)",
    ];

    for source in sources {
        let unoptimized = compiler(false).compile(source).unwrap();
        let optimized = compiler(true).compile(source).unwrap();
        assert_same_frames(source, &unoptimized, &optimized, &frames);
    }
}

#[test]
fn test_alternates_match_direct_evaluation() {
    let cases: Vec<(&str, fn(&[u32; 5]) -> bool)> = vec![
        (
            "(byte(1) == 1 || byte(2) == 1) && (byte(1) == 1 || byte(3) == 1)",
            |m| (m[1] == 1 || m[2] == 1) && (m[1] == 1 || m[3] == 1),
        ),
        (
            "byte(4) == 2 && (byte(1) == 1 || byte(2) == 2 || byte(3) < 2)",
            |m| m[4] == 2 && (m[1] == 1 || m[2] == 2 || m[3] < 2),
        ),
        (
            "(byte(1) > 0 && byte(2) > 0) || (byte(1) > 0 && byte(3) > 0)",
            |m| (m[1] > 0 && m[2] > 0) || (m[1] > 0 && m[3] > 0),
        ),
        (
            "(byte(1) == 0 || byte(1) == 1) && byte(2) >= 1 && byte(2) <= 1",
            |m| m[1] <= 1 && m[2] == 1,
        ),
        (
            "byte(1) == 1 || byte(1) == 2 || byte(1) == 3",
            |m| (1..=3).contains(&m[1]),
        ),
        (
            "(byte(1) == 1 || byte(2) == 2) && (byte(3) == 3 || byte(4) == 0) && (byte(1) != 2 || byte(4) > 1)",
            |m| (m[1] == 1 || m[2] == 2) && (m[3] == 3 || m[4] == 0) && (m[1] != 2 || m[4] > 1),
        ),
    ];

    for (source, expected) in cases {
        for optimized in [false, true] {
            let trigger = compiler(optimized).compile(source).unwrap();
            assert_equivalent(source, &trigger, expected);
        }
    }
}

#[test]
fn test_bits_merge_into_byte() {
    let source = (0..8)
        .map(|i| format!("bit{}(1) == 0", i))
        .collect::<Vec<_>>()
        .join(" && ");
    let trigger = compiler(true).compile(&source).unwrap();
    assert_eq!(trigger.serialize(), "0xH000001=0");
}

#[test]
fn test_alternate_limit_keeps_or_chain() {
    let source = "(byte(1) == 1 || byte(1) == 3) && (byte(2) == 1 || byte(2) == 3)";
    let trigger = Compiler::new(CompileOptions {
        optimizer: trigscript::OptimizerOptions {
            max_alternates: 1,
            ..Default::default()
        },
        ..CompileOptions::default()
    })
    .compile(source)
    .unwrap();
    assert!(trigger.serialize().contains("O:"));
    assert_equivalent(source, &trigger, |m| {
        (m[1] == 1 || m[1] == 3) && (m[2] == 1 || m[2] == 3)
    });
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_optimize_is_idempotent(req in requirement()) {
        let source = req.source();
        let trigger = match compiler(true).compile(&source) {
            Ok(trigger) => trigger,
            Err(Error::Structural { .. }) => return Ok(()),
            Err(e) => panic!("{} failed: {}", source, e),
        };
        prop_assert_eq!(optimize(&trigger).unwrap(), trigger);
    }

    #[test]
    fn prop_stateful_trigger_fires_on_same_frames(script in script(), frames in frames()) {
        let source = script.source();
        let unoptimized = match compiler(false).compile(&source) {
            Ok(trigger) => trigger,
            Err(Error::Structural { .. }) => return Ok(()),
            Err(e) => panic!("{} failed: {}", source, e),
        };
        let optimized = compiler(true).compile(&source).unwrap();
        assert_same_frames(&source, &unoptimized, &optimized, &frames);
    }

    #[test]
    fn prop_optimized_trigger_is_equivalent(req in requirement()) {
        let source = req.source();
        for optimized in [false, true] {
            let trigger = match compiler(optimized).compile(&source) {
                Ok(trigger) => trigger,
                Err(Error::Structural { .. }) => return Ok(()),
                Err(e) => panic!("{} failed: {}", source, e),
            };
            assert_equivalent(&source, &trigger, |m| req.eval(m));
        }
    }
}
