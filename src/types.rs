//! Module `types` define the closed set of column element types and the
//! trait bridging them into generic storage/sort/scan routines.

use arbitrary::Arbitrary;

use std::{cmp, convert::TryFrom, fmt};

use crate::{Error, Result};

/// Element type for a column, with fixed byte widths. `Text` is
/// variable length, all other types are fixed width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Arbitrary)]
pub enum ElementType {
    Byte,
    UByte,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    /// 4-byte code into a per-column dictionary file.
    Category,
    /// Null-terminated strings packed back-to-back, with a `.sp`
    /// companion file of start offsets.
    Text,
    /// 8-byte object identifier, stored as two u32 words.
    Oid,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::result::Result<(), fmt::Error> {
        write!(f, "{}", self.as_name())
    }
}

impl ElementType {
    /// Fixed width of one element in bytes, 0 for variable-length.
    pub fn element_size(&self) -> usize {
        use ElementType::*;

        match self {
            Byte | UByte => 1,
            Short | UShort => 2,
            Int | UInt | Float | Category => 4,
            Long | ULong | Double | Oid => 8,
            Text => 0,
        }
    }

    pub fn as_name(&self) -> &'static str {
        use ElementType::*;

        match self {
            Byte => "byte",
            UByte => "ubyte",
            Short => "short",
            UShort => "ushort",
            Int => "int",
            UInt => "uint",
            Long => "long",
            ULong => "ulong",
            Float => "float",
            Double => "double",
            Category => "category",
            Text => "text",
            Oid => "oid",
        }
    }

    /// Stable one-byte code used in the partition metadata file.
    pub fn to_code(&self) -> u8 {
        use ElementType::*;

        match self {
            Byte => 1,
            UByte => 2,
            Short => 3,
            UShort => 4,
            Int => 5,
            UInt => 6,
            Long => 7,
            ULong => 8,
            Float => 9,
            Double => 10,
            Category => 11,
            Text => 12,
            Oid => 13,
        }
    }

    pub fn from_code(code: u8) -> Result<ElementType> {
        use ElementType::*;

        match code {
            1 => Ok(Byte),
            2 => Ok(UByte),
            3 => Ok(Short),
            4 => Ok(UShort),
            5 => Ok(Int),
            6 => Ok(UInt),
            7 => Ok(Long),
            8 => Ok(ULong),
            9 => Ok(Float),
            10 => Ok(Double),
            11 => Ok(Category),
            12 => Ok(Text),
            13 => Ok(Oid),
            _ => err_at!(FailConvert, msg: "bad element-type code {}", code),
        }
    }

    /// Whether numeric range predicates apply to this type.
    pub fn is_numeric(&self) -> bool {
        use ElementType::*;

        !matches!(self, Text | Oid)
    }

    pub fn is_integer(&self) -> bool {
        use ElementType::*;

        matches!(
            self,
            Byte | UByte | Short | UShort | Int | UInt | Long | ULong | Category
        )
    }

    pub fn is_string(&self) -> bool {
        use ElementType::*;

        matches!(self, Category | Text)
    }

    /// Whether values of `self` convert to `to` without loss:
    /// signed to wider signed, unsigned to wider unsigned or to a
    /// signed type of at least double the width, integers to a float
    /// with sufficient mantissa, float to double.
    pub fn widens_to(&self, to: &ElementType) -> bool {
        use ElementType::*;

        if self == to {
            return true;
        }
        match self {
            Byte => matches!(to, Short | Int | Long | Float | Double),
            UByte => matches!(to, UShort | UInt | ULong | Short | Int | Long | Float | Double),
            Short => matches!(to, Int | Long | Float | Double),
            UShort => matches!(to, UInt | ULong | Int | Long | Float | Double),
            Int => matches!(to, Long | Double),
            UInt => matches!(to, ULong | Long | Double),
            Long => false,
            ULong => false,
            Float => matches!(to, Double),
            Category => matches!(to, UInt | ULong | Long | Double),
            _ => false,
        }
    }
}

/// Trait binding a fixed-width element type into the generic storage,
/// sort and scan routines. One implementation per primitive; the
/// algorithms that genuinely differ (strings) live outside this trait.
pub trait Element:
    Copy + PartialEq + PartialOrd + Default + Send + Sync + fmt::Debug + fmt::Display + 'static
{
    /// The corresponding tag in [ElementType].
    const TYPE: ElementType;
    /// Byte width of one element on disk.
    const SIZE: usize;
    /// Value written for rows appended without a source value. The
    /// null-mask bit is cleared regardless; the sentinel exists only
    /// for readers that ignore masks.
    const SENTINEL: Self;

    fn from_le_bytes(buf: &[u8]) -> Self;
    fn write_le_bytes(&self, buf: &mut Vec<u8>);

    fn to_f64(self) -> f64;
    fn from_f64(val: f64) -> Self;

    /// Total order; NaN sorts after every number so sort/segment see a
    /// consistent ordering.
    fn total_cmp(&self, other: &Self) -> cmp::Ordering;
}

macro_rules! impl_element_int {
    ($type:ty, $tag:ident, $size:expr, $sentinel:expr) => {
        impl Element for $type {
            const TYPE: ElementType = ElementType::$tag;
            const SIZE: usize = $size;
            const SENTINEL: $type = $sentinel;

            fn from_le_bytes(buf: &[u8]) -> $type {
                <$type>::from_le_bytes(TryFrom::try_from(&buf[..$size]).unwrap())
            }

            fn write_le_bytes(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(&self.to_le_bytes())
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(val: f64) -> $type {
                val as $type
            }

            fn total_cmp(&self, other: &$type) -> cmp::Ordering {
                self.cmp(other)
            }
        }
    };
}

macro_rules! impl_element_float {
    ($type:ty, $tag:ident, $size:expr) => {
        impl Element for $type {
            const TYPE: ElementType = ElementType::$tag;
            const SIZE: usize = $size;
            const SENTINEL: $type = <$type>::NAN;

            fn from_le_bytes(buf: &[u8]) -> $type {
                <$type>::from_le_bytes(TryFrom::try_from(&buf[..$size]).unwrap())
            }

            fn write_le_bytes(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(&self.to_le_bytes())
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(val: f64) -> $type {
                val as $type
            }

            fn total_cmp(&self, other: &$type) -> cmp::Ordering {
                match self.partial_cmp(other) {
                    Some(ord) => ord,
                    None if self.is_nan() && other.is_nan() => cmp::Ordering::Equal,
                    None if self.is_nan() => cmp::Ordering::Greater,
                    None => cmp::Ordering::Less,
                }
            }
        }
    };
}

impl_element_int!(i8, Byte, 1, 0x7F);
impl_element_int!(u8, UByte, 1, 0xFF);
impl_element_int!(i16, Short, 2, 0x7FFF);
impl_element_int!(u16, UShort, 2, 0xFFFF);
impl_element_int!(i32, Int, 4, 0x7FFF_FFFF);
impl_element_int!(u32, UInt, 4, 0xFFFF_FFFF);
impl_element_int!(i64, Long, 8, 0x7FFF_FFFF_FFFF_FFFF);
impl_element_int!(u64, ULong, 8, 0xFFFF_FFFF_FFFF_FFFF);
impl_element_float!(f32, Float, 4);
impl_element_float!(f64, Double, 8);

/// A single dynamically-typed value, as handed out by row cursors and
/// the dump path.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Byte(i8),
    UByte(u8),
    Short(i16),
    UShort(u16),
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Float(f32),
    Double(f64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::result::Result<(), fmt::Error> {
        use Scalar::*;

        match self {
            Byte(v) => write!(f, "{}", v),
            UByte(v) => write!(f, "{}", v),
            Short(v) => write!(f, "{}", v),
            UShort(v) => write!(f, "{}", v),
            Int(v) => write!(f, "{}", v),
            UInt(v) => write!(f, "{}", v),
            Long(v) => write!(f, "{}", v),
            ULong(v) => write!(f, "{}", v),
            Float(v) => write!(f, "{}", v),
            Double(v) => write!(f, "{}", v),
            Text(v) => write!(f, "{}", v),
        }
    }
}

impl Scalar {
    pub fn element_type(&self) -> ElementType {
        use Scalar::*;

        match self {
            Byte(_) => ElementType::Byte,
            UByte(_) => ElementType::UByte,
            Short(_) => ElementType::Short,
            UShort(_) => ElementType::UShort,
            Int(_) => ElementType::Int,
            UInt(_) => ElementType::UInt,
            Long(_) => ElementType::Long,
            ULong(_) => ElementType::ULong,
            Float(_) => ElementType::Float,
            Double(_) => ElementType::Double,
            Text(_) => ElementType::Text,
        }
    }

    /// Numeric view of the value; strings return None.
    pub fn to_f64(&self) -> Option<f64> {
        use Scalar::*;

        match self {
            Byte(v) => Some(*v as f64),
            UByte(v) => Some(*v as f64),
            Short(v) => Some(*v as f64),
            UShort(v) => Some(*v as f64),
            Int(v) => Some(*v as f64),
            UInt(v) => Some(*v as f64),
            Long(v) => Some(*v as f64),
            ULong(v) => Some(*v as f64),
            Float(v) => Some(*v as f64),
            Double(v) => Some(*v),
            Text(_) => None,
        }
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
