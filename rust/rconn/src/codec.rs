//! Fixed-width scalar (de)serialization for `readBin`/`writeBin`.
//!
//! Byte order is always *native-relative*: the codec starts from the host's
//! endianness and flips it when `swap` is set. `swap = true` therefore means
//! big-endian on x86 and little-endian on a big-endian host.

use crate::error::{ConnError, ConnResult};

// ---------------------------------------------------------------------------
// NA sentinels
// ---------------------------------------------------------------------------

/// Missing value for integer vectors.
pub const NA_INTEGER: i32 = i32::MIN;
/// Missing value for logical vectors (stored as 4-byte ints).
pub const NA_LOGICAL: i32 = i32::MIN;
/// Bit pattern of the missing double: a NaN whose low word is 1954.
pub const NA_REAL_BITS: u64 = 0x7FF0_0000_0000_07A2;

pub fn na_real() -> f64 {
    f64::from_bits(NA_REAL_BITS)
}

/// True for the missing-double NaN, false for every other value including
/// ordinary NaNs.
pub fn is_na_real(x: f64) -> bool {
    x.is_nan() && (x.to_bits() & 0xFFFF_FFFF) == 1954
}

// ---------------------------------------------------------------------------
// Byte order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        }
    }

    /// Native order, flipped when `swap` is set.
    pub fn from_swap(swap: bool) -> Self {
        let native = Self::native();
        if swap {
            native.flipped()
        } else {
            native
        }
    }

    /// Resolve an `endian` argument (`"big"`, `"little"`, `"swap"`) to the
    /// equivalent `swap` flag.
    pub fn swap_for(endian: &str) -> ConnResult<bool> {
        match endian {
            "big" => Ok(Self::native() != ByteOrder::Big),
            "little" => Ok(Self::native() != ByteOrder::Little),
            "swap" => Ok(true),
            _ => Err(ConnError::InvalidArgument("endian".into())),
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            ByteOrder::Little => ByteOrder::Big,
            ByteOrder::Big => ByteOrder::Little,
        }
    }
}

// ---------------------------------------------------------------------------
// Element types and vectors
// ---------------------------------------------------------------------------

/// The `what` argument of `readBin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinType {
    Integer,
    Double,
    Complex,
    Logical,
    Raw,
    Character,
}

impl BinType {
    pub fn parse(what: &str) -> ConnResult<Self> {
        match what {
            "integer" | "int" => Ok(BinType::Integer),
            "double" | "numeric" => Ok(BinType::Double),
            "complex" => Ok(BinType::Complex),
            "logical" => Ok(BinType::Logical),
            "raw" => Ok(BinType::Raw),
            "character" => Ok(BinType::Character),
            _ => Err(ConnError::InvalidArgument("what".into())),
        }
    }

    /// Width used when no `size` is given. Character data has no fixed width.
    pub fn natural_size(self) -> Option<usize> {
        match self {
            BinType::Integer | BinType::Logical => Some(4),
            BinType::Double => Some(8),
            BinType::Complex => Some(16),
            BinType::Raw => Some(1),
            BinType::Character => None,
        }
    }

    /// Validate a requested element width.
    pub fn element_size(self, size: Option<usize>) -> ConnResult<usize> {
        let Some(natural) = self.natural_size() else {
            return Err(ConnError::InvalidArgument("what".into()));
        };
        let size = size.unwrap_or(natural);
        let ok = match self {
            BinType::Integer => matches!(size, 1 | 2 | 4),
            BinType::Double => matches!(size, 4 | 8),
            BinType::Complex => size == 16,
            BinType::Logical => size == 4,
            BinType::Raw => size == 1,
            BinType::Character => false,
        };
        if ok {
            Ok(size)
        } else {
            Err(ConnError::InvalidArgument("size".into()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

/// A homogeneous vector as read or written by the binary builtins.
#[derive(Debug, Clone, PartialEq)]
pub enum BinVector {
    Integer(Vec<i32>),
    Double(Vec<f64>),
    Complex(Vec<Complex>),
    Logical(Vec<i32>),
    Raw(Vec<u8>),
    Character(Vec<String>),
}

impl BinVector {
    pub fn bin_type(&self) -> BinType {
        match self {
            BinVector::Integer(_) => BinType::Integer,
            BinVector::Double(_) => BinType::Double,
            BinVector::Complex(_) => BinType::Complex,
            BinVector::Logical(_) => BinType::Logical,
            BinVector::Raw(_) => BinType::Raw,
            BinVector::Character(_) => BinType::Character,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BinVector::Integer(v) | BinVector::Logical(v) => v.len(),
            BinVector::Double(v) => v.len(),
            BinVector::Complex(v) => v.len(),
            BinVector::Raw(v) => v.len(),
            BinVector::Character(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn empty(what: BinType) -> Self {
        match what {
            BinType::Integer => BinVector::Integer(Vec::new()),
            BinType::Double => BinVector::Double(Vec::new()),
            BinType::Complex => BinVector::Complex(Vec::new()),
            BinType::Logical => BinVector::Logical(Vec::new()),
            BinType::Raw => BinVector::Raw(Vec::new()),
            BinType::Character => BinVector::Character(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

macro_rules! put {
    ($out:expr, $order:expr, $v:expr) => {
        match $order {
            ByteOrder::Little => $out.extend_from_slice(&$v.to_le_bytes()),
            ByteOrder::Big => $out.extend_from_slice(&$v.to_be_bytes()),
        }
    };
}

macro_rules! get {
    ($ty:ty, $order:expr, $chunk:expr) => {{
        let mut raw = [0u8; std::mem::size_of::<$ty>()];
        raw.copy_from_slice($chunk);
        match $order {
            ByteOrder::Little => <$ty>::from_le_bytes(raw),
            ByteOrder::Big => <$ty>::from_be_bytes(raw),
        }
    }};
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteOrderCodec {
    order: ByteOrder,
}

impl ByteOrderCodec {
    pub fn new(swap: bool) -> Self {
        Self {
            order: ByteOrder::from_swap(swap),
        }
    }

    pub fn with_order(order: ByteOrder) -> Self {
        Self { order }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Encode `values` at `size` bytes per element (natural width when
    /// `None`). Narrow integer widths keep the low-order bytes.
    pub fn encode(&self, values: &BinVector, size: Option<usize>) -> ConnResult<Vec<u8>> {
        if let BinVector::Character(strings) = values {
            let mut out = Vec::with_capacity(strings.iter().map(|s| s.len() + 1).sum());
            for s in strings {
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
            return Ok(out);
        }

        let width = values.bin_type().element_size(size)?;
        let mut out = Vec::with_capacity(values.len() * width);
        let order = self.order;
        match values {
            BinVector::Integer(v) | BinVector::Logical(v) => {
                for &x in v {
                    match width {
                        1 => out.push(x as u8),
                        2 => put!(out, order, x as i16),
                        _ => put!(out, order, x),
                    }
                }
            }
            BinVector::Double(v) => {
                for &x in v {
                    if width == 4 {
                        put!(out, order, x as f32);
                    } else {
                        put!(out, order, x);
                    }
                }
            }
            BinVector::Complex(v) => {
                for c in v {
                    put!(out, order, c.re);
                    put!(out, order, c.im);
                }
            }
            BinVector::Raw(v) => out.extend_from_slice(v),
            BinVector::Character(_) => {}
        }
        Ok(out)
    }

    /// Decode at most `n` elements from `bytes`. A trailing partial element is
    /// ignored; fewer than `n` complete elements is not an error. `signed`
    /// only affects 1-byte integers; 2-byte integers are always signed.
    pub fn decode(
        &self,
        bytes: &[u8],
        what: BinType,
        size: Option<usize>,
        signed: bool,
        n: usize,
    ) -> ConnResult<BinVector> {
        if what == BinType::Character {
            return Ok(BinVector::Character(decode_strings(bytes, n).0));
        }
        let width = what.element_size(size)?;
        let count = n.min(bytes.len() / width);
        let chunks = bytes.chunks_exact(width).take(count);
        let order = self.order;
        let vector = match what {
            BinType::Integer => BinVector::Integer(
                chunks
                    .map(|c| match width {
                        1 if signed => i32::from(c[0] as i8),
                        1 => i32::from(c[0]),
                        2 => i32::from(get!(i16, order, c)),
                        _ => get!(i32, order, c),
                    })
                    .collect(),
            ),
            BinType::Logical => {
                BinVector::Logical(chunks.map(|c| normalize_logical(get!(i32, order, c))).collect())
            }
            BinType::Double => BinVector::Double(
                chunks
                    .map(|c| {
                        if width == 4 {
                            f64::from(get!(f32, order, c))
                        } else {
                            get!(f64, order, c)
                        }
                    })
                    .collect(),
            ),
            BinType::Complex => BinVector::Complex(
                chunks
                    .map(|c| Complex {
                        re: get!(f64, order, &c[..8]),
                        im: get!(f64, order, &c[8..]),
                    })
                    .collect(),
            ),
            BinType::Raw => BinVector::Raw(chunks.map(|c| c[0]).collect()),
            BinType::Character => BinVector::empty(what),
        };
        Ok(vector)
    }
}

fn normalize_logical(x: i32) -> i32 {
    match x {
        NA_LOGICAL => NA_LOGICAL,
        0 => 0,
        _ => 1,
    }
}

/// Split up to `n` NUL-terminated strings off `bytes`. Returns the strings and
/// the number of bytes consumed. Unterminated trailing bytes form a final
/// string.
pub fn decode_strings(bytes: &[u8], n: usize) -> (Vec<String>, usize) {
    let mut out = Vec::new();
    let mut consumed = 0;
    while out.len() < n && consumed < bytes.len() {
        let rest = &bytes[consumed..];
        match rest.iter().position(|&b| b == 0) {
            Some(end) => {
                out.push(String::from_utf8_lossy(&rest[..end]).into_owned());
                consumed += end + 1;
            }
            None => {
                out.push(String::from_utf8_lossy(rest).into_owned());
                consumed = bytes.len();
            }
        }
    }
    (out, consumed)
}
