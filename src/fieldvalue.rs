use hashbrown::HashMap;

use crate::bitreader::{self, BitReader};
use crate::fieldpath::{self, walk_fields};
use crate::flattenedserializers::Dt;
use crate::propertyserializers;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // crate
    #[error(transparent)]
    BitReader(#[from] bitreader::Error),
    #[error(transparent)]
    FieldPath(#[from] fieldpath::Error),
    #[error(transparent)]
    PropertyDecode(#[from] propertyserializers::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A decoded property value.
///
/// NOTE: not all strings coming out of a replay are valid utf8; wire strings
/// are carried lossily converted, raw byte runs live in the `Bytes` variant.
#[derive(Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    Str(Box<str>),
    Bytes(Box<[u8]>),
    Seq(Vec<Value>),
    Map(HashMap<Box<str>, Value>),
}

macro_rules! impl_as {
    ($($fn:ident, $variant:ident => $ty:ty),+ $(,)?) => {
        $(
            #[inline]
            pub fn $fn(&self) -> Option<$ty> {
                match self {
                    Self::$variant(value) => Some(*value),
                    _ => None,
                }
            }
        )+
    };
}

impl Value {
    impl_as! {
        as_bool, Bool => bool,
        as_i32, I32 => i32,
        as_i64, I64 => i64,
        as_u32, U32 => u32,
        as_u64, U64 => u64,
        as_f32, F32 => f32,
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(value) => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Self::Seq(value) => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn as_map(&self) -> Option<&HashMap<Box<str>, Value>> {
        match self {
            Self::Map(value) => Some(value),
            _ => None,
        }
    }
}

macro_rules! impl_debug {
    ($($variant:ident),+ $(,)?) => {
        impl std::fmt::Debug for Value {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant(value) => f.debug_tuple(stringify!($variant)).field(value).finish(),)+
                }
            }
        }
    };
}

impl_debug! {
    Bool, I32, I64, U32, U64, F32, Str, Bytes, Seq, Map,
}

/// A set of decoded properties keyed by dotted field path
/// (e.g. `m_AbilityDraftAbilities.0003`).
#[derive(Debug, Clone, Default)]
pub struct Properties {
    kv: HashMap<Box<str>, Value>,
}

impl Properties {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.kv.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.kv.is_empty()
    }

    #[inline]
    pub(crate) fn insert(&mut self, key: String, value: Value) {
        self.kv.insert(key.into_boxed_str(), value);
    }

    #[inline]
    pub fn fetch(&self, key: &str) -> Option<&Value> {
        self.kv.get(key)
    }

    #[inline]
    pub fn fetch_bool(&self, key: &str) -> Option<bool> {
        self.fetch(key).and_then(Value::as_bool)
    }

    #[inline]
    pub fn fetch_i32(&self, key: &str) -> Option<i32> {
        self.fetch(key).and_then(Value::as_i32)
    }

    #[inline]
    pub fn fetch_u32(&self, key: &str) -> Option<u32> {
        self.fetch(key).and_then(Value::as_u32)
    }

    #[inline]
    pub fn fetch_u64(&self, key: &str) -> Option<u64> {
        self.fetch(key).and_then(Value::as_u64)
    }

    #[inline]
    pub fn fetch_f32(&self, key: &str) -> Option<f32> {
        self.fetch(key).and_then(Value::as_f32)
    }

    #[inline]
    pub fn fetch_str(&self, key: &str) -> Option<&str> {
        self.fetch(key).and_then(Value::as_str)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.kv.iter().map(|(k, v)| (k.as_ref(), v))
    }
}

impl From<Properties> for Value {
    fn from(props: Properties) -> Self {
        Value::Map(props.kv)
    }
}

/// Decodes an entity payload against a serializer table: walks the
/// huffman-coded field paths first, then reads every addressed value in
/// emission order.
pub fn read_properties(br: &mut BitReader, table: &Dt) -> Result<Properties> {
    let mut result = Properties::new();

    let fields = walk_fields(br, table)?;

    for item in fields {
        let field = item.field;
        // a container decoder, when present, takes precedence; a field with
        // no decoder at all is a bare varint on the wire
        let decoder = field
            .serializer
            .as_deref()
            .and_then(|ser| ser.decode_container.or(ser.decode));
        let value = match decoder {
            Some(decode) => decode(br, field)?,
            None => Value::U32(br.read_varuint32()?),
        };
        log::trace!(
            "decoded {} ({}) pos={} value={:?}",
            item.name,
            field.field_type,
            br.pos(),
            value
        );
        result.insert(item.name, value);
    }

    Ok(result)
}
