use std::rc::Rc;

use hashbrown::HashMap;

use crate::bitreader::{self, BitReader};
use crate::fieldvalue::Value;
use crate::flattenedserializers::DtField;
use crate::quantizedfloat::{self, QuantizedFloat};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // crate
    #[error(transparent)]
    BitReader(#[from] bitreader::Error),
    #[error(transparent)]
    QuantizedFloat(#[from] quantizedfloat::Error),
    // mod
    #[error("unknown array length ident: {0}")]
    UnknownArrayLenIdent(String),
}

pub type Result<T> = std::result::Result<T, Error>;

// simulation times travel as tick counts; dota's tick interval is constant
const TICK_INTERVAL: f32 = 1.0 / 30.0;

// dynamic vectors don't announce a capacity in their type name; they get a
// fixed-size expansion large enough for every container observed in replays
const DYNAMIC_ARRAY_LENGTH: u32 = 128;

pub type PropertyDecodeFn = fn(&mut BitReader, &DtField) -> Result<Value>;

/// Wire-format descriptor for one type name: how to decode a primitive value
/// (`decode`), how to decode a whole container in place (`decode_container`,
/// takes precedence when set), and the element metadata driving array
/// expansion. A descriptor with neither decode hook decodes as a varint.
pub struct PropertySerializer {
    pub name: Box<str>,
    pub is_array: bool,
    pub length: u32,
    pub decode: Option<PropertyDecodeFn>,
    pub decode_container: Option<PropertyDecodeFn>,
    pub array_serializer: Option<Rc<PropertySerializer>>,
}

/// Dictionary from type-name string to [`PropertySerializer`]. Resolution is
/// lazy and memoized: template and array types recurse into their element
/// types on first sight.
#[derive(Default)]
pub struct PropertySerializerTable {
    serializers: HashMap<Box<str>, Rc<PropertySerializer>>,
}

impl PropertySerializerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves and attaches the serializer for a field. A handful of fields
    /// need special treatment keyed on the variable name rather than the
    /// type; everything else resolves through the type-name table.
    pub fn fill_serializer(&mut self, field: &mut DtField) -> Result<()> {
        let serializer = match field.name.as_ref() {
            "m_flSimulationTime" | "m_flAnimTime" => {
                self.get_special(field.name.as_ref(), decode_simtime)
            }
            "m_flRuneTime" => self.get_special(field.name.as_ref(), decode_float),
            _ => self.get_by_name(&field.field_type)?,
        };
        field.serializer = Some(serializer);
        Ok(())
    }

    pub fn get_by_name(&mut self, name: &str) -> Result<Rc<PropertySerializer>> {
        if let Some(serializer) = self.serializers.get(name) {
            return Ok(Rc::clone(serializer));
        }
        let serializer = Rc::new(self.build_serializer(name)?);
        self.serializers.insert(name.into(), Rc::clone(&serializer));
        Ok(serializer)
    }

    fn get_special(&mut self, key: &str, decode: PropertyDecodeFn) -> Rc<PropertySerializer> {
        if let Some(serializer) = self.serializers.get(key) {
            return Rc::clone(serializer);
        }
        let serializer = Rc::new(PropertySerializer {
            name: key.into(),
            is_array: false,
            length: 0,
            decode: Some(decode),
            decode_container: None,
            array_serializer: None,
        });
        self.serializers.insert(key.into(), Rc::clone(&serializer));
        serializer
    }

    fn build_serializer(&mut self, name: &str) -> Result<PropertySerializer> {
        // fixed arrays: `T[N]`. char arrays are wire strings, not arrays.
        if let Some((element, length)) = split_array(name) {
            if element == "char" {
                return Ok(PropertySerializer {
                    name: name.into(),
                    is_array: false,
                    length: 0,
                    decode: Some(decode_string),
                    decode_container: None,
                    array_serializer: None,
                });
            }
            let length = parse_array_length(length)?;
            let array_serializer = self.get_by_name(element)?;
            return Ok(PropertySerializer {
                name: element.into(),
                is_array: true,
                length,
                decode: None,
                decode_container: None,
                array_serializer: Some(array_serializer),
            });
        }

        // templates: vectors expand like arrays and additionally know how to
        // decode themselves inline; handle templates delegate to their ident
        if let Some((ident, argument)) = split_template(name) {
            return match ident {
                "CUtlVector" | "CNetworkUtlVectorBase" | "CUtlVectorEmbeddedNetworkVar" => {
                    let array_serializer = self.get_by_name(argument)?;
                    Ok(PropertySerializer {
                        name: argument.into(),
                        is_array: true,
                        length: DYNAMIC_ARRAY_LENGTH,
                        decode: None,
                        decode_container: Some(decode_dynamic_array),
                        array_serializer: Some(array_serializer),
                    })
                }
                _ => Ok(primitive_serializer(ident)),
            };
        }

        // pointers decode as a presence flag
        if name.ends_with('*') || is_pointer_ident(name) {
            return Ok(PropertySerializer {
                name: name.into(),
                is_array: false,
                length: 0,
                decode: Some(decode_boolean),
                decode_container: None,
                array_serializer: None,
            });
        }

        Ok(primitive_serializer(name))
    }
}

fn primitive_serializer(name: &str) -> PropertySerializer {
    let decode: Option<PropertyDecodeFn> = match name {
        "int8" | "int16" | "int32" => Some(decode_signed),
        "int64" => Some(decode_signed64),
        "uint8" | "uint16" | "uint32" | "Color" | "color32" | "CUtlStringToken"
        | "CGameSceneNodeHandle" => Some(decode_unsigned),
        "uint64" | "CStrongHandle" | "itemid_t" | "MatchID_t" => Some(decode_uint64),
        "bool" => Some(decode_boolean),
        "float32" | "CNetworkedQuantizedFloat" | "GameTime_t" => Some(decode_float),
        "CUtlString" | "CUtlSymbolLarge" => Some(decode_string),
        "Vector" => Some(decode_vector),
        "Vector2D" => Some(decode_vector2d),
        "Vector4D" => Some(decode_vector4d),
        "QAngle" => Some(decode_qangle),
        "CHandle" | "CEntityHandle" => Some(decode_unsigned),
        // enums and anything else unrecognized fall back to the varint path
        _ => None,
    };
    PropertySerializer {
        name: name.into(),
        is_array: false,
        length: 0,
        decode,
        decode_container: None,
        array_serializer: None,
    }
}

fn is_pointer_ident(name: &str) -> bool {
    matches!(
        name,
        "CBodyComponent" | "CLightComponent" | "CRenderComponent" | "CPhysicsComponent"
    )
}

/// Splits `T[N]` into `(T, N)`. The length part may be an ident.
fn split_array(name: &str) -> Option<(&str, &str)> {
    let name = name.strip_suffix(']')?;
    let open = name.rfind('[')?;
    Some((&name[..open], &name[open + 1..]))
}

fn parse_array_length(raw: &str) -> Result<u32> {
    if let Ok(length) = raw.parse::<u32>() {
        return Ok(length);
    }
    match raw {
        "MAX_ABILITY_DRAFT_ABILITIES" => Ok(48),
        _ => Err(Error::UnknownArrayLenIdent(raw.to_string())),
    }
}

/// Splits `Outer< Inner >` into `(Outer, Inner)`.
fn split_template(name: &str) -> Option<(&str, &str)> {
    let open = name.find('<')?;
    let close = name.rfind('>')?;
    if close <= open {
        return None;
    }
    let ident = name[..open].trim_end();
    let argument = name[open + 1..close].trim();
    Some((ident, argument))
}

// ---- decode functions ----

fn decode_signed(br: &mut BitReader, _field: &DtField) -> Result<Value> {
    Ok(Value::I32(br.read_varint32()?))
}

fn decode_signed64(br: &mut BitReader, _field: &DtField) -> Result<Value> {
    Ok(Value::I64(br.read_varint64()?))
}

fn decode_unsigned(br: &mut BitReader, _field: &DtField) -> Result<Value> {
    Ok(Value::U32(br.read_varuint32()?))
}

fn decode_uint64(br: &mut BitReader, field: &DtField) -> Result<Value> {
    if field.encoder.as_deref() == Some("fixed64") {
        let bytes = br.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes);
        return Ok(Value::U64(u64::from_le_bytes(buf)));
    }
    Ok(Value::U64(br.read_varuint64()?))
}

fn decode_boolean(br: &mut BitReader, _field: &DtField) -> Result<Value> {
    Ok(Value::Bool(br.read_bool()?))
}

fn decode_string(br: &mut BitReader, _field: &DtField) -> Result<Value> {
    Ok(Value::Str(br.read_string()?.into()))
}

fn decode_simtime(br: &mut BitReader, _field: &DtField) -> Result<Value> {
    Ok(Value::F32(br.read_varuint32()? as f32 * TICK_INTERVAL))
}

fn read_float_inner(br: &mut BitReader, field: &DtField) -> Result<f32> {
    if field.encoder.as_deref() == Some("coord") {
        return Ok(br.read_bitcoord()?);
    }
    let bit_count = field.bit_count.unwrap_or_default();
    if bit_count <= 0 || bit_count >= 32 {
        return Ok(br.read_bitfloat()?);
    }
    let qf = QuantizedFloat::new(
        bit_count,
        field.flags.unwrap_or_default(),
        field.low_value.unwrap_or_default(),
        field.high_value.unwrap_or_default(),
    )?;
    Ok(qf.decode(br)?)
}

fn decode_float(br: &mut BitReader, field: &DtField) -> Result<Value> {
    Ok(Value::F32(read_float_inner(br, field)?))
}

fn decode_vector(br: &mut BitReader, field: &DtField) -> Result<Value> {
    if field.encoder.as_deref() == Some("normal") {
        let v = br.read_bitvec3normal()?;
        return Ok(Value::Seq(v.iter().copied().map(Value::F32).collect()));
    }
    let mut out = Vec::with_capacity(3);
    for _ in 0..3 {
        out.push(Value::F32(read_float_inner(br, field)?));
    }
    Ok(Value::Seq(out))
}

fn decode_vector2d(br: &mut BitReader, field: &DtField) -> Result<Value> {
    let mut out = Vec::with_capacity(2);
    for _ in 0..2 {
        out.push(Value::F32(read_float_inner(br, field)?));
    }
    Ok(Value::Seq(out))
}

fn decode_vector4d(br: &mut BitReader, field: &DtField) -> Result<Value> {
    let mut out = Vec::with_capacity(4);
    for _ in 0..4 {
        out.push(Value::F32(read_float_inner(br, field)?));
    }
    Ok(Value::Seq(out))
}

fn decode_qangle(br: &mut BitReader, field: &DtField) -> Result<Value> {
    let bit_count = field.bit_count.unwrap_or_default();

    if field.encoder.as_deref() == Some("qangle_pitch_yaw") {
        let x = br.read_bitangle(bit_count as usize)?;
        let y = br.read_bitangle(bit_count as usize)?;
        return Ok(Value::Seq(vec![
            Value::F32(x),
            Value::F32(y),
            Value::F32(0.0),
        ]));
    }

    if bit_count != 0 {
        let mut out = Vec::with_capacity(3);
        for _ in 0..3 {
            out.push(Value::F32(br.read_bitangle(bit_count as usize)?));
        }
        return Ok(Value::Seq(out));
    }

    let has_x = br.read_bool()?;
    let has_y = br.read_bool()?;
    let has_z = br.read_bool()?;
    let mut angles = [0f32; 3];
    if has_x {
        angles[0] = br.read_bitcoord()?;
    }
    if has_y {
        angles[1] = br.read_bitcoord()?;
    }
    if has_z {
        angles[2] = br.read_bitcoord()?;
    }
    Ok(Value::Seq(angles.iter().copied().map(Value::F32).collect()))
}

fn decode_dynamic_array(br: &mut BitReader, field: &DtField) -> Result<Value> {
    let count = br.read_varuint32()?;
    let element_decode = field
        .serializer
        .as_deref()
        .and_then(|ser| ser.array_serializer.as_deref())
        .and_then(|ser| ser.decode);
    let mut out = Vec::with_capacity(count.min(DYNAMIC_ARRAY_LENGTH) as usize);
    for _ in 0..count {
        let value = match element_decode {
            Some(decode) => decode(br, field)?,
            None => Value::U32(br.read_varuint32()?),
        };
        out.push(value);
    }
    Ok(Value::Seq(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_type_names() {
        assert_eq!(split_array("int32[4]"), Some(("int32", "4")));
        assert_eq!(split_array("char[129]"), Some(("char", "129")));
        assert_eq!(split_array("int32"), None);
        assert_eq!(
            split_template("CUtlVector< CHandle< CBaseEntity > >"),
            Some(("CUtlVector", "CHandle< CBaseEntity >"))
        );
        assert_eq!(split_template("uint64"), None);
    }

    #[test]
    fn test_fixed_array_metadata() {
        let mut pst = PropertySerializerTable::new();
        let ser = pst.get_by_name("int32[4]").unwrap();
        assert!(ser.is_array);
        assert_eq!(ser.length, 4);
        assert_eq!(ser.name.as_ref(), "int32");
        let element = ser.array_serializer.as_deref().unwrap();
        assert_eq!(element.name.as_ref(), "int32");
        assert!(element.decode.is_some());
    }

    #[test]
    fn test_char_array_is_a_string() {
        let mut pst = PropertySerializerTable::new();
        let ser = pst.get_by_name("char[129]").unwrap();
        assert!(!ser.is_array);
        assert!(ser.decode.is_some());
    }

    #[test]
    fn test_vector_template_metadata() {
        let mut pst = PropertySerializerTable::new();
        let ser = pst.get_by_name("CUtlVector< uint32 >").unwrap();
        assert!(ser.is_array);
        assert_eq!(ser.length, DYNAMIC_ARRAY_LENGTH);
        assert!(ser.decode_container.is_some());
        assert_eq!(
            ser.array_serializer.as_deref().unwrap().name.as_ref(),
            "uint32"
        );
    }

    #[test]
    fn test_handle_template_decodes_as_unsigned() {
        let mut pst = PropertySerializerTable::new();
        let ser = pst.get_by_name("CHandle< CBaseEntity >").unwrap();
        assert!(!ser.is_array);
        assert!(ser.decode.is_some());
    }

    #[test]
    fn test_unknown_type_has_no_decoder() {
        let mut pst = PropertySerializerTable::new();
        let ser = pst.get_by_name("MoveType_t").unwrap();
        assert!(ser.decode.is_none());
        assert!(ser.decode_container.is_none());
    }

    #[test]
    fn test_unknown_array_length_ident() {
        let mut pst = PropertySerializerTable::new();
        assert!(matches!(
            pst.get_by_name("int32[NOT_A_LENGTH]"),
            Err(Error::UnknownArrayLenIdent(_))
        ));
    }

    #[test]
    fn test_memoization_shares_descriptors() {
        let mut pst = PropertySerializerTable::new();
        let a = pst.get_by_name("uint32").unwrap();
        let b = pst.get_by_name("uint32").unwrap();
        assert!(Rc::ptr_eq(&a, &b));
    }
}
