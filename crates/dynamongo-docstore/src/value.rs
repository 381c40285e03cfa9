//! Native document values.
//!
//! [`NativeValue`] mirrors the BSON type family that document databases
//! expose: several numeric representations, binary payloads, engine-assigned
//! object ids and UTC timestamps. Values carry a total order that follows the
//! MongoDB cross-type comparison rules so that sorting and range predicates
//! behave identically regardless of which numeric representation was stored.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

use bigdecimal::BigDecimal;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// An ordered field map; the native equivalent of a JSON object.
pub type Document = BTreeMap<String, NativeValue>;

/// A value stored inside a [`Document`].
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// IEEE-754 double.
    Double(f64),
    /// Arbitrary-precision decimal.
    Decimal(BigDecimal),
    /// UTF-8 string.
    String(String),
    /// Raw binary payload.
    Binary(Bytes),
    /// Ordered array.
    Array(Vec<NativeValue>),
    /// Embedded document.
    Document(Document),
    /// Engine-assigned 12-byte object identifier.
    ObjectId(ObjectId),
    /// UTC timestamp with millisecond precision.
    DateTime(DateTime<Utc>),
}

impl NativeValue {
    /// Returns a short name of the value's type, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int32(_) => "int",
            Self::Int64(_) => "long",
            Self::Double(_) => "double",
            Self::Decimal(_) => "decimal",
            Self::String(_) => "string",
            Self::Binary(_) => "binData",
            Self::Array(_) => "array",
            Self::Document(_) => "object",
            Self::ObjectId(_) => "objectId",
            Self::DateTime(_) => "date",
        }
    }

    /// Returns `true` for any of the numeric representations.
    #[must_use]
    pub fn is_number(&self) -> bool {
        matches!(
            self,
            Self::Int32(_) | Self::Int64(_) | Self::Double(_) | Self::Decimal(_)
        )
    }

    /// Returns the string content, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the embedded document, if this is a document.
    #[must_use]
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Self::Document(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the array elements, if this is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&[NativeValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Converts a finite numeric value to an exact decimal.
    ///
    /// Doubles go through their shortest round-trip representation, so
    /// `0.1_f64` becomes exactly `0.1` rather than its binary expansion.
    #[must_use]
    pub fn to_decimal(&self) -> Option<BigDecimal> {
        match self {
            Self::Int32(v) => Some(BigDecimal::from(*v)),
            Self::Int64(v) => Some(BigDecimal::from(*v)),
            Self::Double(v) if v.is_finite() => BigDecimal::from_str(&v.to_string()).ok(),
            Self::Decimal(d) => Some(d.clone()),
            _ => None,
        }
    }

    /// Rank of the value's type bracket in the cross-type ordering.
    fn type_rank(&self) -> u8 {
        match self {
            Self::Null => 1,
            Self::Int32(_) | Self::Int64(_) | Self::Double(_) | Self::Decimal(_) => 2,
            Self::String(_) => 3,
            Self::Document(_) => 4,
            Self::Array(_) => 5,
            Self::Binary(_) => 6,
            Self::ObjectId(_) => 7,
            Self::Bool(_) => 8,
            Self::DateTime(_) => 9,
        }
    }

    /// Returns `true` if both values fall into the same comparison bracket.
    ///
    /// Range operators only match values of the same bracket; a string is
    /// never "greater than" a number.
    #[must_use]
    pub fn same_bracket(&self, other: &Self) -> bool {
        self.type_rank() == other.type_rank()
    }

    /// Total order across all values.
    ///
    /// Brackets order as null, numbers, strings, documents, arrays, binary,
    /// object ids, booleans, dates. Numbers compare by value regardless of
    /// representation; binary compares bytewise.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        let rank = self.type_rank().cmp(&other.type_rank());
        if rank != Ordering::Equal {
            return rank;
        }
        match (self, other) {
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Binary(a), Self::Binary(b)) => a.as_ref().cmp(b.as_ref()),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::ObjectId(a), Self::ObjectId(b)) => a.cmp(b),
            (Self::DateTime(a), Self::DateTime(b)) => a.cmp(b),
            (Self::Array(a), Self::Array(b)) => compare_sequences(a.iter(), b.iter()),
            (Self::Document(a), Self::Document(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    let ord = ka.cmp(kb).then_with(|| va.compare(vb));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (a, b) if a.is_number() => compare_numbers(a, b),
            _ => Ordering::Equal,
        }
    }

    /// Value equality under the engine's comparison rules (`1 == 1.0`).
    #[must_use]
    pub fn loosely_equals(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

fn compare_sequences<'a>(
    mut a: impl Iterator<Item = &'a NativeValue>,
    mut b: impl Iterator<Item = &'a NativeValue>,
) -> Ordering {
    loop {
        match (a.next(), b.next()) {
            (Some(x), Some(y)) => {
                let ord = x.compare(y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (None, None) => return Ordering::Equal,
        }
    }
}

/// Sort key for numbers: NaN sorts below every number, infinities at the ends.
fn numeric_key(v: &NativeValue) -> (i8, Option<BigDecimal>) {
    match v {
        NativeValue::Double(f) if f.is_nan() => (-2, None),
        NativeValue::Double(f) if f.is_infinite() => (if *f > 0.0 { 1 } else { -1 }, None),
        other => (0, other.to_decimal()),
    }
}

fn compare_numbers(a: &NativeValue, b: &NativeValue) -> Ordering {
    let (ka, da) = numeric_key(a);
    let (kb, db) = numeric_key(b);
    ka.cmp(&kb).then_with(|| da.cmp(&db))
}

impl fmt::Display for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "NumberLong({v})"),
            Self::Double(v) => write!(f, "{v:?}"),
            Self::Decimal(d) => write!(f, "NumberDecimal(\"{d}\")"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Binary(b) => write!(f, "BinData(0, {})", hex::encode(b)),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Document(doc) => write!(f, "{}", DisplayDocument(doc)),
            Self::ObjectId(id) => write!(f, "ObjectId(\"{id}\")"),
            Self::DateTime(dt) => write!(f, "ISODate(\"{}\")", dt.to_rfc3339()),
        }
    }
}

/// Formats a [`Document`] in shell notation for log output.
#[derive(Debug, Clone, Copy)]
pub struct DisplayDocument<'a>(pub &'a Document);

impl fmt::Display for DisplayDocument<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key:?}: {value}")?;
        }
        f.write_str("}")
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<&str> for NativeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for NativeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for NativeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for NativeValue {
    fn from(value: i32) -> Self {
        Self::Int32(value)
    }
}

impl From<i64> for NativeValue {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for NativeValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<BigDecimal> for NativeValue {
    fn from(value: BigDecimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<Bytes> for NativeValue {
    fn from(value: Bytes) -> Self {
        Self::Binary(value)
    }
}

impl From<Vec<NativeValue>> for NativeValue {
    fn from(value: Vec<NativeValue>) -> Self {
        Self::Array(value)
    }
}

impl From<Document> for NativeValue {
    fn from(value: Document) -> Self {
        Self::Document(value)
    }
}

impl From<ObjectId> for NativeValue {
    fn from(value: ObjectId) -> Self {
        Self::ObjectId(value)
    }
}

impl From<DateTime<Utc>> for NativeValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value)
    }
}

/// Builds a [`Document`] from `key => value` pairs.
///
/// Values go through `NativeValue::from`, so literals, strings, nested
/// documents and arrays can be mixed freely.
///
/// ```
/// use dynamongo_docstore::{doc, NativeValue};
///
/// let filter = doc! { "tenant" => "acme", "age" => doc! { "$gte" => 18_i64 } };
/// assert_eq!(filter.len(), 2);
/// assert_eq!(filter["tenant"], NativeValue::from("acme"));
/// ```
#[macro_export]
macro_rules! doc {
    () => {
        $crate::Document::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut document = $crate::Document::new();
        $(
            document.insert(::std::string::String::from($key), $crate::NativeValue::from($value));
        )+
        document
    }};
}

// ---------------------------------------------------------------------------
// ObjectId
// ---------------------------------------------------------------------------

/// A 12-byte identifier: 4 bytes of seconds since the epoch, 5 bytes of
/// per-process entropy, 3 bytes of a wrapping counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

static PROCESS_ENTROPY: LazyLock<[u8; 5]> = LazyLock::new(|| {
    let seed = uuid::Uuid::new_v4();
    let bytes = seed.as_bytes();
    [bytes[0], bytes[1], bytes[2], bytes[3], bytes[4]]
});

static COUNTER: LazyLock<AtomicU32> = LazyLock::new(|| {
    let seed = uuid::Uuid::new_v4();
    let bytes = seed.as_bytes();
    AtomicU32::new(u32::from_be_bytes([0, bytes[5], bytes[6], bytes[7]]))
});

impl ObjectId {
    /// Generates a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        let seconds = u32::try_from(Utc::now().timestamp()).unwrap_or(u32::MAX);
        let count = COUNTER.fetch_add(1, AtomicOrdering::Relaxed) & 0x00FF_FFFF;
        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_ENTROPY);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Wraps raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Parses a 24-character hex string.
    pub fn parse_str(s: &str) -> Result<Self, StoreError> {
        let raw = hex::decode(s).map_err(|e| StoreError::InvalidValue {
            message: format!("invalid object id '{s}': {e}"),
        })?;
        let bytes: [u8; 12] = raw.try_into().map_err(|_| StoreError::InvalidValue {
            message: format!("object id '{s}' must be 12 bytes"),
        })?;
        Ok(Self(bytes))
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
