//! Reference frame evaluator
//!
//! Runs a [`Trigger`] against memory snapshots with the runtime's semantics:
//! 32-bit wrapping accumulation, float promotion, indirect addressing,
//! remembered values, chained conditions, hit counts, resets and pauses.

use super::condition::{Condition, ConditionFlag, Operand, Operator, RequirementGroup, Trigger};
use crate::expr::{decode_bcd, ComparisonOp, FieldSize, ModifierOp, Temporal, ValueTransform};
use std::collections::HashMap;

/// Flat little-endian memory snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    /// Zeroed memory of `size` bytes
    pub fn new(size: usize) -> Self {
        Memory {
            bytes: vec![0; size],
        }
    }

    /// Memory holding the given bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Memory { bytes }
    }

    fn byte(&self, address: u32, index: u32) -> u32 {
        (address as usize)
            .checked_add(index as usize)
            .and_then(|a| self.bytes.get(a))
            .copied()
            .unwrap_or(0) as u32
    }

    fn le(&self, address: u32, count: u32) -> u32 {
        (0..count).fold(0, |acc, i| acc | self.byte(address, i) << (8 * i))
    }

    fn be(&self, address: u32, count: u32) -> u32 {
        (0..count).fold(0, |acc, i| acc << 8 | self.byte(address, i))
    }

    /// Raw field value (float formats return their 32 encoded bits)
    pub fn read_raw(&self, size: FieldSize, address: u32) -> u32 {
        if let Some(bit) = size.bit_index() {
            return (self.byte(address, 0) >> bit) & 1;
        }

        match size {
            FieldSize::LowNibble => self.byte(address, 0) & 0x0F,
            FieldSize::HighNibble => self.byte(address, 0) >> 4,
            FieldSize::BitCount => self.byte(address, 0).count_ones(),
            FieldSize::Byte => self.byte(address, 0),
            FieldSize::Word => self.le(address, 2),
            FieldSize::TByte => self.le(address, 3),
            FieldSize::WordBE => self.be(address, 2),
            FieldSize::TByteBE => self.be(address, 3),
            FieldSize::DWordBE | FieldSize::FloatBE | FieldSize::MBF32 | FieldSize::Double32BE => {
                self.be(address, 4)
            }
            _ => self.le(address, 4),
        }
    }

    fn set(&mut self, address: u32, value: u8) {
        let address = address as usize;
        if address >= self.bytes.len() {
            self.bytes.resize(address + 1, 0);
        }
        self.bytes[address] = value;
    }

    /// Write an integer field, growing the snapshot as needed
    pub fn write(&mut self, size: FieldSize, address: u32, value: u32) {
        if let Some(bit) = size.bit_index() {
            let byte = self.byte(address, 0) as u8;
            let byte = (byte & !(1 << bit)) | (((value & 1) as u8) << bit);
            self.set(address, byte);
            return;
        }

        let byte = self.byte(address, 0) as u8;
        let (count, big_endian) = match size {
            FieldSize::LowNibble => return self.set(address, (byte & 0xF0) | (value as u8 & 0x0F)),
            FieldSize::HighNibble => return self.set(address, (byte & 0x0F) | ((value as u8 & 0x0F) << 4)),
            FieldSize::WordBE => (2, true),
            FieldSize::TByteBE => (3, true),
            FieldSize::DWordBE | FieldSize::FloatBE | FieldSize::MBF32 | FieldSize::Double32BE => (4, true),
            other => (other.byte_count(), false),
        };

        for i in 0..count {
            let shift = if big_endian { 8 * (count - 1 - i) } else { 8 * i };
            self.set(address + i, (value >> shift) as u8);
        }
    }

    /// Write an IEEE-754 value in a float format
    pub fn write_float(&mut self, size: FieldSize, address: u32, value: f64) {
        let bits = match size {
            FieldSize::Double32 | FieldSize::Double32BE => (value.to_bits() >> 32) as u32,
            _ => (value as f32).to_bits(),
        };
        let size = match size {
            FieldSize::FloatBE | FieldSize::Double32BE => FieldSize::DWordBE,
            _ => FieldSize::DWord,
        };
        self.write(size, address, bits);
    }
}

fn decode_float(size: FieldSize, raw: u32) -> f64 {
    match size {
        FieldSize::Float | FieldSize::FloatBE => f32::from_bits(raw) as f64,
        FieldSize::Double32 | FieldSize::Double32BE => f64::from_bits((raw as u64) << 32),
        _ => {
            let exponent = raw >> 24;
            if exponent == 0 {
                return 0.0;
            }
            let mantissa = ((raw & 0x7F_FFFF) | 0x80_0000) as f64;
            let value = mantissa * 2f64.powi(exponent as i32 - 152);
            if raw & 0x80_0000 != 0 {
                -value
            } else {
                value
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Int(u32),
    Float(f64),
}

impl Value {
    fn as_f64(self) -> f64 {
        match self {
            Value::Int(v) => v as f64,
            Value::Float(v) => v,
        }
    }

    fn as_u32(self) -> u32 {
        match self {
            Value::Int(v) => v,
            Value::Float(v) => v as u32,
        }
    }

    fn add(self, other: Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(b)),
            (a, b) => Value::Float(a.as_f64() + b.as_f64()),
        }
    }

    fn sub(self, other: Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_sub(b)),
            (a, b) => Value::Float(a.as_f64() - b.as_f64()),
        }
    }

    fn modify(self, op: ModifierOp, other: Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Value::Int(match op {
                ModifierOp::Multiply => a.wrapping_mul(b),
                ModifierOp::Divide => a.checked_div(b).unwrap_or(0),
                ModifierOp::Modulus => a.checked_rem(b).unwrap_or(0),
                ModifierOp::BitwiseAnd => a & b,
                ModifierOp::BitwiseXor => a ^ b,
            }),
            (a, b) => match op {
                ModifierOp::Multiply => Value::Float(a.as_f64() * b.as_f64()),
                ModifierOp::Divide if b.as_f64() == 0.0 => Value::Float(0.0),
                ModifierOp::Divide => Value::Float(a.as_f64() / b.as_f64()),
                ModifierOp::Modulus if b.as_f64() == 0.0 => Value::Float(0.0),
                ModifierOp::Modulus => Value::Float(a.as_f64() % b.as_f64()),
                ModifierOp::BitwiseAnd => Value::Int(a.as_u32() & b.as_u32()),
                ModifierOp::BitwiseXor => Value::Int(a.as_u32() ^ b.as_u32()),
            },
        }
    }

    fn compare(self, op: ComparisonOp, other: Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => op.test(a, b),
            (a, b) => op.test(a.as_f64(), b.as_f64()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct MemRefState {
    current: u32,
    prev: u32,
    prior: u32,
}

/// Memory access for one frame
struct Frame<'a> {
    memory: &'a Memory,
    memrefs: &'a mut HashMap<(FieldSize, u32), MemRefState>,
}

impl Frame<'_> {
    fn read(&mut self, operand: &Operand, offset: u32, recall: Value) -> Value {
        match *operand {
            Operand::Memory {
                size,
                address,
                temporal,
                transform,
            } => {
                let address = address.wrapping_add(offset);
                let memory = self.memory;
                let state = self
                    .memrefs
                    .entry((size, address))
                    .or_insert_with(|| MemRefState {
                        current: memory.read_raw(size, address),
                        prev: 0,
                        prior: 0,
                    });
                let raw = match temporal {
                    Temporal::Current => state.current,
                    Temporal::Prev => state.prev,
                    Temporal::Prior => state.prior,
                };
                let raw = match transform {
                    ValueTransform::None => raw,
                    ValueTransform::Bcd => decode_bcd(raw),
                    ValueTransform::Invert => !raw & size.max_value(),
                };
                if size.is_float() {
                    Value::Float(decode_float(size, raw))
                } else {
                    Value::Int(raw)
                }
            }
            Operand::Value(v) => Value::Int(v),
            Operand::Float(v) => Value::Float(v),
            Operand::Recall => recall,
        }
    }
}

#[derive(Debug, Default)]
struct GroupOutcome {
    satisfied: bool,
    reset: bool,
}

/// Stateful evaluator for one trigger
#[derive(Debug, Clone)]
pub struct Engine {
    trigger: Trigger,
    hits: Vec<Vec<u32>>,
    memrefs: HashMap<(FieldSize, u32), MemRefState>,
}

impl Engine {
    /// Engine with zeroed hit counts
    pub fn new(trigger: Trigger) -> Self {
        let hits = trigger
            .groups()
            .map(|g| vec![0; g.conditions.len()])
            .collect();
        Engine {
            trigger,
            hits,
            memrefs: HashMap::new(),
        }
    }

    /// Evaluate a single frame with fresh state
    pub fn evaluate(trigger: &Trigger, memory: &Memory) -> bool {
        Engine::new(trigger.clone()).do_frame(memory)
    }

    /// Current hit counts, core first
    pub fn hits(&self) -> &[Vec<u32>] {
        &self.hits
    }

    /// Clear every hit count
    pub fn reset(&mut self) {
        for group in &mut self.hits {
            group.iter_mut().for_each(|h| *h = 0);
        }
    }

    /// Advance one frame and report whether the trigger fires
    pub fn do_frame(&mut self, memory: &Memory) -> bool {
        for (&(size, address), state) in self.memrefs.iter_mut() {
            let value = memory.read_raw(size, address);
            state.prev = state.current;
            if value != state.current {
                state.prior = state.current;
            }
            state.current = value;
        }

        let Engine {
            trigger,
            hits,
            memrefs,
        } = self;
        let mut frame = Frame { memory, memrefs };

        let outcomes: Vec<GroupOutcome> = trigger
            .groups()
            .zip(hits.iter_mut())
            .map(|(group, hits)| evaluate_group(group, hits, &mut frame))
            .collect();

        if outcomes.iter().any(|o| o.reset) {
            self.reset();
            return false;
        }

        let core = outcomes[0].satisfied;
        let alts = &outcomes[1..];
        core && (alts.is_empty() || alts.iter().any(|o| o.satisfied))
    }
}

fn unit_ranges(group: &RequirementGroup) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = 0;
    for (i, condition) in group.conditions.iter().enumerate() {
        if !condition.flag.is_chaining() {
            ranges.push((start, i + 1));
            start = i + 1;
        }
    }
    if start < group.conditions.len() {
        ranges.push((start, group.conditions.len()));
    }
    ranges
}

fn evaluate_group(group: &RequirementGroup, hits: &mut [u32], frame: &mut Frame<'_>) -> GroupOutcome {
    let ranges = unit_ranges(group);
    let is_pause = |(_, end): &(usize, usize)| group.conditions[end - 1].flag == ConditionFlag::PauseIf;

    for range in ranges.iter().filter(|r| is_pause(r)) {
        let (start, end) = *range;
        if evaluate_unit(&group.conditions[start..end], &mut hits[start..end], frame) {
            return GroupOutcome::default();
        }
    }

    let mut outcome = GroupOutcome {
        satisfied: true,
        reset: false,
    };
    for range in ranges.iter().filter(|r| !is_pause(r)) {
        let (start, end) = *range;
        let satisfied = evaluate_unit(&group.conditions[start..end], &mut hits[start..end], frame);
        match group.conditions[end - 1].flag {
            ConditionFlag::ResetIf => outcome.reset |= satisfied,
            _ => outcome.satisfied &= satisfied,
        }
    }

    if outcome.reset {
        outcome.satisfied = false;
    }
    outcome
}

fn evaluate_unit(conditions: &[Condition], hits: &mut [u32], frame: &mut Frame<'_>) -> bool {
    let mut accumulator = Value::Int(0);
    let mut address = 0u32;
    let mut recall = Value::Int(0);
    let mut chain: Option<(bool, bool)> = None;
    let mut added_hits = 0i64;
    let mut reset_next = false;
    let mut result = false;

    for (i, condition) in conditions.iter().enumerate() {
        let offset = address;
        address = 0;

        let left = frame.read(&condition.left, offset, recall);
        let value = match condition.op {
            Operator::Modify(op) => left.modify(op, frame.read(&condition.right, offset, recall)),
            _ => left,
        };

        match condition.flag {
            ConditionFlag::AddSource => {
                accumulator = accumulator.add(value);
                continue;
            }
            ConditionFlag::SubSource => {
                accumulator = accumulator.sub(value);
                continue;
            }
            ConditionFlag::AddAddress => {
                address = value.as_u32();
                continue;
            }
            ConditionFlag::Remember => {
                recall = accumulator.add(value);
                accumulator = Value::Int(0);
                continue;
            }
            _ => {}
        }

        let lhs = accumulator.add(left);
        accumulator = Value::Int(0);
        let mut truth = match condition.op {
            Operator::Compare(op) => lhs.compare(op, frame.read(&condition.right, offset, recall)),
            _ => lhs.as_f64() != 0.0,
        };
        if let Some((is_and, previous)) = chain.take() {
            truth = if is_and { previous && truth } else { previous || truth };
        }

        let counts_hits = condition.hit_target > 0
            || !condition.flag.is_chaining()
            || matches!(condition.flag, ConditionFlag::AddHits | ConditionFlag::SubHits);
        let reset = reset_next && counts_hits;
        if reset {
            hits[i] = 0;
            reset_next = false;
        } else if truth && (condition.hit_target == 0 || hits[i] < condition.hit_target) {
            hits[i] += 1;
        }

        let total = hits[i] as i64 + added_hits;
        let satisfied = if reset {
            false
        } else if condition.hit_target > 0 {
            total >= condition.hit_target as i64
        } else {
            truth
        };

        match condition.flag {
            ConditionFlag::AndNext => chain = Some((true, satisfied)),
            ConditionFlag::OrNext => chain = Some((false, satisfied)),
            ConditionFlag::ResetNextIf => reset_next = satisfied,
            ConditionFlag::AddHits => added_hits += hits[i] as i64,
            ConditionFlag::SubHits => added_hits -= hits[i] as i64,
            _ => {
                result = satisfied;
                added_hits = 0;
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str, memory: &Memory) -> bool {
        Engine::evaluate(&Trigger::parse(text).unwrap(), memory)
    }

    #[test]
    fn test_reads_sizes() {
        let memory = Memory::from_bytes(vec![0x12, 0x34, 0x56, 0x78, 0xA5]);
        assert_eq!(memory.read_raw(FieldSize::Word, 0), 0x3412);
        assert_eq!(memory.read_raw(FieldSize::WordBE, 0), 0x1234);
        assert_eq!(memory.read_raw(FieldSize::TByte, 1), 0x785634);
        assert_eq!(memory.read_raw(FieldSize::DWordBE, 0), 0x12345678);
        assert_eq!(memory.read_raw(FieldSize::HighNibble, 4), 0xA);
        assert_eq!(memory.read_raw(FieldSize::Bit0, 4), 1);
        assert_eq!(memory.read_raw(FieldSize::Bit1, 4), 0);
        assert_eq!(memory.read_raw(FieldSize::BitCount, 4), 4);
        assert_eq!(memory.read_raw(FieldSize::Byte, 100), 0);
    }

    #[test]
    fn test_write_reads_back() {
        let mut memory = Memory::new(8);
        memory.write(FieldSize::TByteBE, 1, 0xABCDEF);
        assert_eq!(memory.read_raw(FieldSize::TByteBE, 1), 0xABCDEF);
        memory.write(FieldSize::Bit3, 0, 1);
        assert_eq!(memory.read_raw(FieldSize::Byte, 0), 8);
        memory.write_float(FieldSize::Float, 4, 1.5);
        assert_eq!(decode_float(FieldSize::Float, memory.read_raw(FieldSize::Float, 4)), 1.5);
    }

    #[test]
    fn test_mbf32_decodes() {
        // 10.0 in MBF: exponent 0x84, mantissa 0x200000
        let memory = Memory::from_bytes(vec![0x84, 0x20, 0x00, 0x00]);
        let raw = memory.read_raw(FieldSize::MBF32, 0);
        assert_eq!(decode_float(FieldSize::MBF32, raw), 10.0);
    }

    #[test]
    fn test_accumulator_wraps() {
        let memory = Memory::from_bytes(vec![1, 2]);
        assert!(run("B:0xH000001_0xH000000=4294967295", &memory));
        assert!(run("A:0xH000000*3_0xH000001=5", &memory));
    }

    #[test]
    fn test_add_address() {
        let memory = Memory::from_bytes(vec![2, 0, 7, 9]);
        assert!(run("I:0xH000000_0xH000001=9", &memory));
        assert!(run("I:0xH000000_0xH000000=7", &memory));
    }

    #[test]
    fn test_remember_recall() {
        let memory = Memory::from_bytes(vec![3, 5]);
        assert!(run("A:0xH000000_K:0xH000001_{recall}=8", &memory));
        assert!(run("K:0xH000001_A:{recall}/2_0xH000000=5", &memory));
    }

    #[test]
    fn test_chains() {
        let memory = Memory::from_bytes(vec![1, 0]);
        assert!(run("O:0xH000000=1_0xH000001=1", &memory));
        assert!(!run("N:0xH000000=1_0xH000001=1", &memory));
    }

    #[test]
    fn test_hits_and_resets() {
        let trigger = Trigger::parse("0xH000000=1.2._R:0xH000001=1").unwrap();
        let mut engine = Engine::new(trigger);
        let mut memory = Memory::from_bytes(vec![1, 0]);
        assert!(!engine.do_frame(&memory));
        assert!(engine.do_frame(&memory));

        memory.write(FieldSize::Byte, 1, 1);
        assert!(!engine.do_frame(&memory));
        assert_eq!(engine.hits()[0][0], 0);
    }

    #[test]
    fn test_pause_freezes_hits() {
        let trigger = Trigger::parse("0xH000000=1.3._P:0xH000001=1").unwrap();
        let mut engine = Engine::new(trigger);
        let mut memory = Memory::from_bytes(vec![1, 1]);
        assert!(!engine.do_frame(&memory));
        assert_eq!(engine.hits()[0][0], 0);
        memory.write(FieldSize::Byte, 1, 0);
        engine.do_frame(&memory);
        assert_eq!(engine.hits()[0][0], 1);
    }

    #[test]
    fn test_add_hits() {
        let trigger = Trigger::parse("C:0xH000000=1_0xH000001=1.3.").unwrap();
        let mut engine = Engine::new(trigger);
        let memory = Memory::from_bytes(vec![1, 1]);
        assert!(!engine.do_frame(&memory));
        assert!(engine.do_frame(&memory));
    }

    #[test]
    fn test_prev_and_prior() {
        let trigger = Trigger::parse("0xH000000>d0xH000000_p0xH000000=4").unwrap();
        let mut engine = Engine::new(trigger);
        engine.do_frame(&Memory::from_bytes(vec![4]));
        assert!(!engine.do_frame(&Memory::from_bytes(vec![4])));
        assert!(engine.do_frame(&Memory::from_bytes(vec![6])));
    }

    #[test]
    fn test_alternates() {
        let memory = Memory::from_bytes(vec![1, 0, 1]);
        assert!(run("0xH000000=1S0xH000001=1S0xH000002=1", &memory));
        assert!(!run("0xH000000=1S0xH000001=1", &memory));
    }
}
