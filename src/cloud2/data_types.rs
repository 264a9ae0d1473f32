use std::convert::TryFrom;
use std::fmt::{Debug, Formatter};

use serde::{Deserialize, Serialize};

/// The scalar binary type of one field dimension.
///
/// Wire messages identify the type by a numeric code; codes outside this
/// table have no representation here and are excluded from decoding by the
/// layout planner.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
pub enum FieldDatatype {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl FieldDatatype {
    /// Byte width of one scalar of this type.
    pub fn size(&self) -> usize {
        match self {
            Self::I8 => 1,
            Self::U8 => 1,
            Self::I16 => 2,
            Self::U16 => 2,
            Self::I32 => 4,
            Self::U32 => 4,
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// The numeric code identifying this type on the wire.
    pub fn code(&self) -> u8 {
        match self {
            Self::I8 => 1,
            Self::U8 => 2,
            Self::I16 => 3,
            Self::U16 => 4,
            Self::I32 => 5,
            Self::U32 => 6,
            Self::F32 => 7,
            Self::F64 => 8,
        }
    }
}

impl TryFrom<u8> for FieldDatatype {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::I8),
            2 => Ok(Self::U8),
            3 => Ok(Self::I16),
            4 => Ok(Self::U16),
            5 => Ok(Self::I32),
            6 => Ok(Self::U32),
            7 => Ok(Self::F32),
            8 => Ok(Self::F64),
            _ => Err(format!("Unknown point field datatype code: {value}")),
        }
    }
}

/// The information for one named dimension of a point record.
///
/// Descriptors need not be sorted by offset, contiguous, or unique; the
/// layout planner sorts and pads as needed. `datatype` is kept as the raw
/// wire code so that descriptors with codes outside the known table survive
/// deserialization intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointField {
    pub name: String,
    /// Byte offset from the start of the point record.
    pub offset: u32,
    /// Numeric datatype code as it appears on the wire.
    pub datatype: u8,
    /// Number of consecutive scalars of `datatype` starting at `offset`.
    pub count: u32,
}

impl PointField {
    pub fn new(name: &str, offset: u32, datatype: FieldDatatype, count: u32) -> Self {
        Self {
            name: name.to_string(),
            offset,
            datatype: datatype.code(),
            count,
        }
    }
}

/// Byte order of every scalar in a cloud's data buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Endian {
    Big,
    Little,
}

impl From<bool> for Endian {
    /// Converts a message's `is_bigendian` flag.
    fn from(is_bigendian: bool) -> Self {
        if is_bigendian {
            Self::Big
        } else {
            Self::Little
        }
    }
}

/// A decoded organized point-cloud message.
///
/// Mirrors the wire message field for field so a container deserializer can
/// produce it directly. `data` holds `height` rows of `row_step` bytes,
/// each row holding `width` point records of `point_step` bytes; the record
/// for grid cell `(u, v)` starts at byte `row_step * v + point_step * u`.
#[derive(Clone, Serialize, Deserialize)]
pub struct CloudMessage {
    pub height: u32,
    pub width: u32,
    pub fields: Vec<PointField>,
    pub is_bigendian: bool,
    pub point_step: u32,
    pub row_step: u32,
    pub data: Vec<u8>,
    pub is_dense: bool,
}

impl CloudMessage {
    pub fn endian(&self) -> Endian {
        Endian::from(self.is_bigendian)
    }
}

impl Debug for CloudMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CloudMessage {}x{} ({} fields, {} bytes)",
            self.width,
            self.height,
            self.fields.len(),
            self.data.len()
        )
    }
}

/// One decoded scalar value.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub enum PointValue {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    F32(f32),
    F64(f64),
}

impl PointValue {
    /// True for a floating-point not-a-number. Integer values are never NaN.
    pub fn is_nan(&self) -> bool {
        match self {
            Self::F32(v) => v.is_nan(),
            Self::F64(v) => v.is_nan(),
            _ => false,
        }
    }

    pub fn datatype(&self) -> FieldDatatype {
        match self {
            Self::I8(_) => FieldDatatype::I8,
            Self::U8(_) => FieldDatatype::U8,
            Self::I16(_) => FieldDatatype::I16,
            Self::U16(_) => FieldDatatype::U16,
            Self::I32(_) => FieldDatatype::I32,
            Self::U32(_) => FieldDatatype::U32,
            Self::F32(_) => FieldDatatype::F32,
            Self::F64(_) => FieldDatatype::F64,
        }
    }

    /// Numeric view of the value. Every variant's range is representable in
    /// an `f64` without loss.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::I8(v) => v as f64,
            Self::U8(v) => v as f64,
            Self::I16(v) => v as f64,
            Self::U16(v) => v as f64,
            Self::I32(v) => v as f64,
            Self::U32(v) => v as f64,
            Self::F32(v) => v as f64,
            Self::F64(v) => v,
        }
    }
}
