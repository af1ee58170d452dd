//! Memory field descriptors and accessors

use super::value::MemoryValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width and encoding of a memory read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldSize {
    /// Bit 0 of a byte
    Bit0,
    /// Bit 1 of a byte
    Bit1,
    /// Bit 2 of a byte
    Bit2,
    /// Bit 3 of a byte
    Bit3,
    /// Bit 4 of a byte
    Bit4,
    /// Bit 5 of a byte
    Bit5,
    /// Bit 6 of a byte
    Bit6,
    /// Bit 7 of a byte
    Bit7,
    /// Bits 0-3 of a byte
    LowNibble,
    /// Bits 4-7 of a byte
    HighNibble,
    /// 8-bit value
    Byte,
    /// 16-bit little-endian value
    Word,
    /// 24-bit little-endian value
    TByte,
    /// 32-bit little-endian value
    DWord,
    /// 16-bit big-endian value
    WordBE,
    /// 24-bit big-endian value
    TByteBE,
    /// 32-bit big-endian value
    DWordBE,
    /// Number of set bits in a byte
    BitCount,
    /// IEEE-754 32-bit float, little-endian
    Float,
    /// IEEE-754 32-bit float, big-endian
    FloatBE,
    /// Microsoft Binary Format float, big-endian
    MBF32,
    /// Microsoft Binary Format float, little-endian
    MBF32LE,
    /// Upper 32 bits of an IEEE-754 double, little-endian
    Double32,
    /// Upper 32 bits of an IEEE-754 double, big-endian
    Double32BE,
}

const BITS: [FieldSize; 8] = [
    FieldSize::Bit0,
    FieldSize::Bit1,
    FieldSize::Bit2,
    FieldSize::Bit3,
    FieldSize::Bit4,
    FieldSize::Bit5,
    FieldSize::Bit6,
    FieldSize::Bit7,
];

impl FieldSize {
    /// All sizes, in declaration order
    pub const ALL: [FieldSize; 24] = [
        FieldSize::Bit0,
        FieldSize::Bit1,
        FieldSize::Bit2,
        FieldSize::Bit3,
        FieldSize::Bit4,
        FieldSize::Bit5,
        FieldSize::Bit6,
        FieldSize::Bit7,
        FieldSize::LowNibble,
        FieldSize::HighNibble,
        FieldSize::Byte,
        FieldSize::Word,
        FieldSize::TByte,
        FieldSize::DWord,
        FieldSize::WordBE,
        FieldSize::TByteBE,
        FieldSize::DWordBE,
        FieldSize::BitCount,
        FieldSize::Float,
        FieldSize::FloatBE,
        FieldSize::MBF32,
        FieldSize::MBF32LE,
        FieldSize::Double32,
        FieldSize::Double32BE,
    ];

    /// Size for a single bit index (0-7)
    pub fn bit(index: u32) -> Option<FieldSize> {
        BITS.get(index as usize).copied()
    }

    /// Bit index for single-bit sizes
    pub fn bit_index(self) -> Option<u32> {
        BITS.iter().position(|b| *b == self).map(|i| i as u32)
    }

    /// Number of significant bits in the value
    pub fn bits(self) -> u32 {
        match self {
            FieldSize::Bit0
            | FieldSize::Bit1
            | FieldSize::Bit2
            | FieldSize::Bit3
            | FieldSize::Bit4
            | FieldSize::Bit5
            | FieldSize::Bit6
            | FieldSize::Bit7 => 1,
            FieldSize::LowNibble | FieldSize::HighNibble | FieldSize::BitCount => 4,
            FieldSize::Byte => 8,
            FieldSize::Word | FieldSize::WordBE => 16,
            FieldSize::TByte | FieldSize::TByteBE => 24,
            _ => 32,
        }
    }

    /// Number of bytes read from memory
    pub fn byte_count(self) -> u32 {
        match self {
            FieldSize::Word | FieldSize::WordBE => 2,
            FieldSize::TByte | FieldSize::TByteBE => 3,
            FieldSize::DWord
            | FieldSize::DWordBE
            | FieldSize::Float
            | FieldSize::FloatBE
            | FieldSize::MBF32
            | FieldSize::MBF32LE
            | FieldSize::Double32
            | FieldSize::Double32BE => 4,
            _ => 1,
        }
    }

    /// Largest value the field can hold
    pub fn max_value(self) -> u32 {
        match self {
            FieldSize::BitCount => 8,
            FieldSize::DWord | FieldSize::DWordBE => u32::MAX,
            s if s.is_float() => u32::MAX,
            s => (1u32 << s.bits()) - 1,
        }
    }

    /// Whether the field is read as a floating point number
    pub fn is_float(self) -> bool {
        matches!(
            self,
            FieldSize::Float
                | FieldSize::FloatBE
                | FieldSize::MBF32
                | FieldSize::MBF32LE
                | FieldSize::Double32
                | FieldSize::Double32BE
        )
    }

    /// Serialization code following the `0x` (integer) or `f` (float) prefix
    pub fn code(self) -> &'static str {
        match self {
            FieldSize::Bit0 => "M",
            FieldSize::Bit1 => "N",
            FieldSize::Bit2 => "O",
            FieldSize::Bit3 => "P",
            FieldSize::Bit4 => "Q",
            FieldSize::Bit5 => "R",
            FieldSize::Bit6 => "S",
            FieldSize::Bit7 => "T",
            FieldSize::LowNibble => "L",
            FieldSize::HighNibble => "U",
            FieldSize::Byte => "H",
            FieldSize::Word => " ",
            FieldSize::TByte => "W",
            FieldSize::DWord => "X",
            FieldSize::WordBE => "I",
            FieldSize::TByteBE => "J",
            FieldSize::DWordBE => "G",
            FieldSize::BitCount => "K",
            FieldSize::Float => "F",
            FieldSize::FloatBE => "B",
            FieldSize::MBF32 => "M",
            FieldSize::MBF32LE => "L",
            FieldSize::Double32 => "H",
            FieldSize::Double32BE => "I",
        }
    }

    /// Parse a serialization code (`float` selects the `f` prefix table)
    pub fn from_code(code: char, float: bool) -> Option<FieldSize> {
        let code = code.to_ascii_uppercase();
        FieldSize::ALL
            .iter()
            .copied()
            .filter(|s| s.is_float() == float)
            .find(|s| s.code().starts_with(code))
    }

    /// Script function that reads this size
    pub fn function_name(self) -> &'static str {
        match self {
            FieldSize::Bit0 => "bit0",
            FieldSize::Bit1 => "bit1",
            FieldSize::Bit2 => "bit2",
            FieldSize::Bit3 => "bit3",
            FieldSize::Bit4 => "bit4",
            FieldSize::Bit5 => "bit5",
            FieldSize::Bit6 => "bit6",
            FieldSize::Bit7 => "bit7",
            FieldSize::LowNibble => "low4",
            FieldSize::HighNibble => "high4",
            FieldSize::Byte => "byte",
            FieldSize::Word => "word",
            FieldSize::TByte => "tbyte",
            FieldSize::DWord => "dword",
            FieldSize::WordBE => "word_be",
            FieldSize::TByteBE => "tbyte_be",
            FieldSize::DWordBE => "dword_be",
            FieldSize::BitCount => "bitcount",
            FieldSize::Float => "float",
            FieldSize::FloatBE => "float_be",
            FieldSize::MBF32 => "mbf32",
            FieldSize::MBF32LE => "mbf32_le",
            FieldSize::Double32 => "double32",
            FieldSize::Double32BE => "double32_be",
        }
    }

    /// Look up a size by script function name
    pub fn from_function_name(name: &str) -> Option<FieldSize> {
        FieldSize::ALL
            .iter()
            .copied()
            .find(|s| s.function_name() == name)
    }
}

/// Which frame a value is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Temporal {
    /// Value in the current frame
    #[default]
    Current,
    /// Value in the previous frame
    Prev,
    /// Last value that differed from the current one
    Prior,
}

impl Temporal {
    /// Serialization prefix
    pub fn prefix(self) -> &'static str {
        match self {
            Temporal::Current => "",
            Temporal::Prev => "d",
            Temporal::Prior => "p",
        }
    }

    /// Script wrapper function name
    pub fn function_name(self) -> Option<&'static str> {
        match self {
            Temporal::Current => None,
            Temporal::Prev => Some("prev"),
            Temporal::Prior => Some("prior"),
        }
    }
}

/// Transformation the engine applies to the raw value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValueTransform {
    /// Raw value
    #[default]
    None,
    /// Binary coded decimal decode
    Bcd,
    /// Bitwise complement within the field width
    Invert,
}

/// Decode a binary coded decimal value (each nibble is one digit)
pub fn decode_bcd(raw: u32) -> u32 {
    let mut result = 0u32;
    let mut scale = 1u32;
    let mut value = raw;
    while value != 0 {
        result = result.wrapping_add((value & 0x0F).wrapping_mul(scale));
        scale = scale.wrapping_mul(10);
        value >>= 4;
    }
    result
}

/// Encode a decimal value as binary coded decimal
pub fn encode_bcd(value: u32) -> Option<u32> {
    if value > 99_999_999 {
        return None;
    }

    let mut result = 0u32;
    let mut shift = 0;
    let mut remaining = value;
    while remaining != 0 {
        result |= (remaining % 10) << shift;
        remaining /= 10;
        shift += 4;
    }
    Some(result)
}

/// Memory location: size, address, and optional pointer base
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// Width and encoding of the read
    pub size: FieldSize,
    /// Absolute address, or offset from the pointer base
    pub address: u32,
    /// Runtime value the address is relative to
    pub pointer: Option<Box<MemoryValue>>,
}

/// A read of one memory field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryAccessor {
    /// What is read
    pub field: Field,
    /// Which frame it is read from
    pub temporal: Temporal,
    /// Transformation applied by the engine
    pub transform: ValueTransform,
}

impl MemoryAccessor {
    /// Create a direct read of the current value
    pub fn new(size: FieldSize, address: u32) -> Self {
        MemoryAccessor {
            field: Field {
                size,
                address,
                pointer: None,
            },
            temporal: Temporal::Current,
            transform: ValueTransform::None,
        }
    }

    /// Create a read relative to a pointer value
    pub fn with_pointer(size: FieldSize, pointer: MemoryValue, offset: u32) -> Self {
        MemoryAccessor {
            field: Field {
                size,
                address: offset,
                pointer: Some(Box::new(pointer)),
            },
            temporal: Temporal::Current,
            transform: ValueTransform::None,
        }
    }

    /// Copy with a different temporal
    pub fn with_temporal(mut self, temporal: Temporal) -> Self {
        self.temporal = temporal;
        self
    }

    /// Copy with a different transform
    pub fn with_transform(mut self, transform: ValueTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Copy without a transform
    pub fn untransformed(&self) -> Self {
        self.clone().with_transform(ValueTransform::None)
    }

    /// Field size
    pub fn size(&self) -> FieldSize {
        self.field.size
    }

    /// Pointer base, if indirect
    pub fn pointer(&self) -> Option<&MemoryValue> {
        self.field.pointer.as_deref()
    }

    /// Whether both accessors are read through the same pointer base
    pub fn same_base(&self, other: &MemoryAccessor) -> bool {
        self.field.pointer == other.field.pointer
    }

    /// Whether the read produces a float
    pub fn is_float(&self) -> bool {
        self.field.size.is_float()
    }

    /// Largest value the engine can produce for this accessor
    pub fn max_value(&self) -> u32 {
        let max = self.field.size.max_value();
        match self.transform {
            ValueTransform::Bcd => decode_bcd(max),
            _ => max,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.size.function_name();
        match &self.pointer {
            None => write!(f, "{}(0x{:06X})", name, self.address),
            Some(pointer) if self.address == 0 => write!(f, "{}({})", name, pointer),
            Some(pointer) => write!(f, "{}({} + 0x{:06X})", name, pointer, self.address),
        }
    }
}

impl fmt::Display for MemoryAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = match self.temporal.function_name() {
            Some(wrapper) => format!("{}({})", wrapper, self.field),
            None => self.field.to_string(),
        };

        match self.transform {
            ValueTransform::None => write!(f, "{}", inner),
            ValueTransform::Bcd => write!(f, "bcd({})", inner),
            ValueTransform::Invert => write!(f, "~{}", inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bcd_roundtrip_values() {
        assert_eq!(encode_bcd(24), Some(0x24));
        assert_eq!(decode_bcd(0x24), 24);
        assert_eq!(decode_bcd(0xFF), 165);
        assert_eq!(encode_bcd(100_000_000), None);
    }

    #[test]
    fn test_size_limits() {
        assert_eq!(FieldSize::Bit3.max_value(), 1);
        assert_eq!(FieldSize::HighNibble.max_value(), 15);
        assert_eq!(FieldSize::Byte.max_value(), 255);
        assert_eq!(FieldSize::TByteBE.max_value(), 0xFF_FFFF);
        assert_eq!(FieldSize::DWord.max_value(), u32::MAX);
        assert_eq!(FieldSize::BitCount.max_value(), 8);
    }

    #[test]
    fn test_codes_resolve_back() {
        for size in FieldSize::ALL {
            let code = size.code().chars().next().unwrap();
            assert_eq!(FieldSize::from_code(code, size.is_float()), Some(size));
        }
    }

    #[test]
    fn test_display() {
        let accessor = MemoryAccessor::new(FieldSize::Byte, 0x1234).with_temporal(Temporal::Prev);
        assert_eq!(accessor.to_string(), "prev(byte(0x001234))");

        let pointer = MemoryValue::from(MemoryAccessor::new(FieldSize::DWord, 0x10));
        let indirect = MemoryAccessor::with_pointer(FieldSize::Word, pointer, 8);
        assert_eq!(indirect.to_string(), "word(dword(0x000010) + 0x000008)");
    }
}
