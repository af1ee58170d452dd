//! Text form of compiled triggers
//!
//! ```text
//! trigger   := group ('S' group)*
//! group     := condition ('_' condition)*
//! condition := (flag ':')? operand (op operand)? ('.' hits '.')?
//! operand   := prefix? '0x' size hex | 'f' size hex | number | 'f' float | '{recall}'
//! ```

use super::condition::{Condition, ConditionFlag, Operand, Operator, RequirementGroup, Trigger};
use crate::error::{Error, Result};
use crate::expr::{ComparisonOp, FieldSize, ModifierOp, Temporal, ValueTransform};
use std::fmt;
use std::str::FromStr;

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Memory {
                size,
                address,
                temporal,
                transform,
            } => {
                write!(f, "{}", temporal.prefix())?;
                match transform {
                    ValueTransform::None => {}
                    ValueTransform::Bcd => write!(f, "b")?,
                    ValueTransform::Invert => write!(f, "~")?,
                }
                if size.is_float() {
                    write!(f, "f{}", size.code())?;
                } else {
                    write!(f, "0x{}", size.code())?;
                }
                if *address > 0xFF_FFFF {
                    write!(f, "{:08x}", address)
                } else {
                    write!(f, "{:06x}", address)
                }
            }
            Operand::Value(v) => write!(f, "{}", v),
            Operand::Float(v) if v.fract() == 0.0 => write!(f, "f{:.1}", v),
            Operand::Float(v) => write!(f, "f{}", v),
            Operand::Recall => write!(f, "{{recall}}"),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = self.flag.prefix() {
            write!(f, "{}:", prefix)?;
        }
        write!(f, "{}", self.left)?;
        if self.op != Operator::None {
            write!(f, "{}{}", self.op.symbol(), self.right)?;
        }
        if self.hit_target > 0 {
            write!(f, ".{}.", self.hit_target)?;
        }
        Ok(())
    }
}

impl fmt::Display for RequirementGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, condition) in self.conditions.iter().enumerate() {
            if i > 0 {
                write!(f, "_")?;
            }
            write!(f, "{}", condition)?;
        }
        Ok(())
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.core)?;
        for alt in &self.alts {
            write!(f, "S{}", alt)?;
        }
        Ok(())
    }
}

impl Trigger {
    /// Serialize to the engine's text form
    pub fn serialize(&self) -> String {
        self.to_string()
    }

    /// Read a trigger from the engine's text form
    pub fn parse(text: &str) -> Result<Trigger> {
        TriggerReader::new(text).read_trigger()
    }
}

impl FromStr for Trigger {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Trigger::parse(s)
    }
}

/// Cursor over serialized trigger text
struct TriggerReader<'a> {
    source: &'a [u8],
    current: usize,
}

impl<'a> TriggerReader<'a> {
    fn new(text: &'a str) -> Self {
        TriggerReader {
            source: text.as_bytes(),
            current: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::InvalidTrigger {
            offset: self.current,
            message: message.into(),
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.current).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.source.get(self.current + 1).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.current += 1;
        Some(c)
    }

    fn match_byte(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn read_trigger(&mut self) -> Result<Trigger> {
        let core = self.read_group()?;
        let mut alts = Vec::new();
        while self.match_byte(b'S') {
            alts.push(self.read_group()?);
        }

        if !self.is_at_end() {
            return Err(self.error(format!("unexpected character '{}'", self.source[self.current] as char)));
        }

        Ok(Trigger { core, alts })
    }

    fn read_group(&mut self) -> Result<RequirementGroup> {
        let mut conditions = Vec::new();
        if self.is_at_end() || self.peek() == Some(b'S') {
            return Ok(RequirementGroup::new(conditions));
        }

        loop {
            conditions.push(self.read_condition()?);
            if !self.match_byte(b'_') {
                break;
            }
        }
        Ok(RequirementGroup::new(conditions))
    }

    fn read_condition(&mut self) -> Result<Condition> {
        let mut flag = ConditionFlag::None;
        if self.peek_next() == Some(b':') {
            let prefix = self.advance().unwrap_or_default() as char;
            flag = ConditionFlag::from_prefix(prefix)
                .ok_or_else(|| self.error(format!("unknown flag '{}'", prefix)))?;
            self.current += 1;
        }

        let left = self.read_operand()?;
        let op = self.read_operator()?;
        let right = if op == Operator::None {
            Operand::Value(0)
        } else {
            self.read_operand()?
        };

        let mut hit_target = 0;
        if self.match_byte(b'.') {
            hit_target = self.read_decimal()? as u32;
            if !self.match_byte(b'.') {
                return Err(self.error("expected '.' after hit target"));
            }
        }

        Ok(Condition {
            flag,
            left,
            op,
            right,
            hit_target,
        })
    }

    fn read_operator(&mut self) -> Result<Operator> {
        let op = match self.peek() {
            Some(b'=') => {
                self.current += 1;
                self.match_byte(b'=');
                Operator::Compare(ComparisonOp::Eq)
            }
            Some(b'!') => {
                self.current += 1;
                if !self.match_byte(b'=') {
                    return Err(self.error("expected '=' after '!'"));
                }
                Operator::Compare(ComparisonOp::Ne)
            }
            Some(b'<') => {
                self.current += 1;
                if self.match_byte(b'=') {
                    Operator::Compare(ComparisonOp::Le)
                } else {
                    Operator::Compare(ComparisonOp::Lt)
                }
            }
            Some(b'>') => {
                self.current += 1;
                if self.match_byte(b'=') {
                    Operator::Compare(ComparisonOp::Ge)
                } else {
                    Operator::Compare(ComparisonOp::Gt)
                }
            }
            Some(b'*') => self.single(Operator::Modify(ModifierOp::Multiply)),
            Some(b'/') => self.single(Operator::Modify(ModifierOp::Divide)),
            Some(b'%') => self.single(Operator::Modify(ModifierOp::Modulus)),
            Some(b'&') => self.single(Operator::Modify(ModifierOp::BitwiseAnd)),
            Some(b'^') => self.single(Operator::Modify(ModifierOp::BitwiseXor)),
            _ => Operator::None,
        };
        Ok(op)
    }

    fn single(&mut self, op: Operator) -> Operator {
        self.current += 1;
        op
    }

    fn read_operand(&mut self) -> Result<Operand> {
        if self.source[self.current..].starts_with(b"{recall}") {
            self.current += "{recall}".len();
            return Ok(Operand::Recall);
        }

        let mut temporal = Temporal::Current;
        let mut transform = ValueTransform::None;
        loop {
            match self.peek() {
                Some(b'd') | Some(b'D') => temporal = Temporal::Prev,
                Some(b'p') | Some(b'P') => temporal = Temporal::Prior,
                Some(b'b') | Some(b'B') => transform = ValueTransform::Bcd,
                Some(b'~') => transform = ValueTransform::Invert,
                _ => break,
            }
            self.current += 1;
        }

        match (self.peek(), self.peek_next()) {
            (Some(b'0'), Some(b'x')) | (Some(b'0'), Some(b'X')) => {
                self.current += 2;
                let size = self.read_size_code(false)?;
                let address = self.read_hex()?;
                Ok(Operand::Memory {
                    size,
                    address,
                    temporal,
                    transform,
                })
            }
            (Some(b'f'), Some(c)) | (Some(b'F'), Some(c)) if c.is_ascii_alphabetic() => {
                self.current += 1;
                let size = self.read_size_code(true)?;
                let address = self.read_hex()?;
                Ok(Operand::Memory {
                    size,
                    address,
                    temporal,
                    transform,
                })
            }
            (Some(b'f'), _) | (Some(b'F'), _) => {
                self.current += 1;
                self.read_float().map(Operand::Float)
            }
            (Some(b'h'), _) | (Some(b'H'), _) => {
                self.current += 1;
                Ok(Operand::Value(self.read_hex()?))
            }
            (Some(b'v'), _) | (Some(b'V'), _) => {
                self.current += 1;
                self.read_value()
            }
            (Some(c), _) if c.is_ascii_digit() || c == b'-' => self.read_value(),
            _ => Err(self.error("expected operand")),
        }
    }

    fn read_size_code(&mut self, float: bool) -> Result<FieldSize> {
        match self.peek() {
            Some(c) if c == b' ' || (c.is_ascii_alphabetic() && (float || !c.is_ascii_hexdigit())) => {
                self.current += 1;
                FieldSize::from_code(c as char, float)
                    .ok_or_else(|| self.error(format!("unknown size '{}'", c as char)))
            }
            // Legacy form: 0x1234 reads a 16-bit value
            Some(c) if c.is_ascii_hexdigit() && !float => Ok(FieldSize::Word),
            _ => Err(self.error("expected size")),
        }
    }

    fn read_hex(&mut self) -> Result<u32> {
        let start = self.current;
        while self.peek().map_or(false, |c| c.is_ascii_hexdigit()) {
            self.current += 1;
        }
        let digits = std::str::from_utf8(&self.source[start..self.current]).unwrap_or_default();
        u32::from_str_radix(digits, 16).map_err(|_| self.error("expected hex address"))
    }

    fn read_decimal(&mut self) -> Result<u64> {
        let start = self.current;
        while self.peek().map_or(false, |c| c.is_ascii_digit()) {
            self.current += 1;
        }
        let digits = std::str::from_utf8(&self.source[start..self.current]).unwrap_or_default();
        digits.parse().map_err(|_| self.error("expected number"))
    }

    fn read_value(&mut self) -> Result<Operand> {
        let negative = self.match_byte(b'-');
        let value = self.read_decimal()?;
        if value > u32::MAX as u64 {
            return Err(self.error("value out of range"));
        }
        let value = value as u32;
        Ok(Operand::Value(if negative { value.wrapping_neg() } else { value }))
    }

    fn read_float(&mut self) -> Result<f64> {
        let start = self.current;
        if self.peek() == Some(b'-') {
            self.current += 1;
        }
        while self.peek().map_or(false, |c| c.is_ascii_digit() || c == b'.') {
            // stop before a hit target marker such as `f1.5.3.`
            if self.peek() == Some(b'.') && !self.peek_next().map_or(false, |c| c.is_ascii_digit()) {
                break;
            }
            if self.peek() == Some(b'.') && self.source[start..self.current].contains(&b'.') {
                break;
            }
            self.current += 1;
        }
        let text = std::str::from_utf8(&self.source[start..self.current]).unwrap_or_default();
        text.parse().map_err(|_| self.error("expected float"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_operands() {
        let word = Operand::Memory {
            size: FieldSize::Word,
            address: 0x1234,
            temporal: Temporal::Prev,
            transform: ValueTransform::None,
        };
        assert_eq!(word.to_string(), "d0x 001234");

        let float = Operand::Memory {
            size: FieldSize::MBF32,
            address: 0x10,
            temporal: Temporal::Current,
            transform: ValueTransform::None,
        };
        assert_eq!(float.to_string(), "fM000010");

        let wide = Operand::Memory {
            size: FieldSize::DWord,
            address: 0x8001_0000,
            temporal: Temporal::Current,
            transform: ValueTransform::Bcd,
        };
        assert_eq!(wide.to_string(), "b0xX80010000");
        assert_eq!(Operand::Float(1.5).to_string(), "f1.5");
        assert_eq!(Operand::Recall.to_string(), "{recall}");
    }

    #[test]
    fn test_parse_reads_back() {
        let text = "A:0xH000001*2_0xH000002=5.3.SR:d0xL000010!=0_P:0xX000020>=f2.5S1=1";
        let trigger = Trigger::parse(text).unwrap();
        assert_eq!(trigger.alts.len(), 2);
        assert_eq!(trigger.core.conditions[1].hit_target, 3);
        assert_eq!(trigger.alts[0].conditions[0].flag, ConditionFlag::ResetIf);
        assert_eq!(trigger.serialize(), text);
    }

    #[test]
    fn test_parse_legacy_forms() {
        let trigger: Trigger = "0x1234=h10".parse().unwrap();
        let condition = trigger.core.conditions[0];
        assert_eq!(
            condition.left,
            Operand::Memory {
                size: FieldSize::Word,
                address: 0x1234,
                temporal: Temporal::Current,
                transform: ValueTransform::None,
            }
        );
        assert_eq!(condition.right, Operand::Value(16));
    }

    #[test]
    fn test_parse_errors_carry_offset() {
        match Trigger::parse("0xH000001=1_X:2") {
            Err(Error::InvalidTrigger { offset, .. }) => assert_eq!(offset, 13),
            other => panic!("unexpected {:?}", other),
        }
    }
}
