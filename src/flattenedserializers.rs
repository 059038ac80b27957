use std::hash::BuildHasherDefault;
use std::rc::Rc;

use hashbrown::HashMap;
use nohash::NoHashHasher;
use prost::Message;

use crate::bitreader::{self, BitReader};
use crate::propertyserializers::{self, PropertySerializer, PropertySerializerTable};
use crate::protos::{CDemoSendTables, CsvcMsgFlattenedSerializer, ProtoFlattenedSerializerT};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // 3rd party crates
    #[error(transparent)]
    Decode(#[from] prost::DecodeError),
    // crate
    #[error(transparent)]
    BitReader(#[from] bitreader::Error),
    #[error(transparent)]
    PropertySerializers(#[from] propertyserializers::Error),
    // mod
    #[error("send tables length prefix says {expected} bytes, {got} remain")]
    LengthMismatch { expected: usize, got: usize },
    #[error("symbol index {0} is out of range")]
    SymbolOutOfRange(i32),
    #[error("field index {0} is out of range")]
    FieldIndexOutOfRange(i32),
    #[error("serializer {name} v{version} referenced before it was built")]
    MissingSubTable { name: String, version: i32 },
}

pub type Result<T> = std::result::Result<T, Error>;

/// A flattened leaf field descriptor.
#[derive(Clone)]
pub struct DtField {
    pub name: Box<str>,
    pub field_type: Box<str>,
    pub encoder: Option<Box<str>>,
    /// -1 for a plain field, the element ordinal for expanded array entries.
    pub index: i32,

    pub flags: Option<i32>,
    pub bit_count: Option<i32>,
    pub low_value: Option<f32>,
    pub high_value: Option<f32>,
    pub version: Option<i32>,

    pub serializer: Option<Rc<PropertySerializer>>,

    /// The game build this field was materialized under.
    pub build: u32,
}

/// Field is always present, table only for composites (sub-serializers and
/// expanded arrays).
#[derive(Clone)]
pub struct DtProperty {
    pub field: DtField,
    pub table: Option<Rc<Dt>>,
}

/// A single named, versioned node of the serializer graph. Property order is
/// exactly the order the encoder emitted.
#[derive(Clone)]
pub struct Dt {
    pub name: Box<str>,
    pub version: i32,
    pub flags: Option<i32>,
    pub properties: Vec<DtProperty>,
}

impl Dt {
    // shallow clone used by array expansion: same properties, new name
    fn renamed(&self, name: &str) -> Self {
        Self {
            name: name.into(),
            version: self.version,
            flags: self.flags,
            properties: self.properties.clone(),
        }
    }
}

type VersionMap = HashMap<i32, Rc<Dt>, BuildHasherDefault<NoHashHasher<i32>>>;

/// Two-level registry of flattened serializer tables: name, then sparse
/// version. Populated once from `CDemoSendTables` and immutable thereafter.
#[derive(Default)]
pub struct Serializers {
    map: HashMap<Box<str>, VersionMap>,
}

impl Serializers {
    /// Parses the send-tables payload: a varint length prefix followed by a
    /// `CSVCMsg_FlattenedSerializer` protobuf. Serializer descriptors are
    /// built strictly in emission order so that sub-table references always
    /// resolve against already-built entries.
    pub fn parse(
        cmd: CDemoSendTables,
        pst: &mut PropertySerializerTable,
        build: u32,
    ) -> Result<Self> {
        let data = cmd.data.unwrap_or_default();
        let mut br = BitReader::new(&data);

        let expected = br.read_varuint32()? as usize;
        let got = br.rem_bytes();
        if expected != got {
            return Err(Error::LengthMismatch { expected, got });
        }

        let buf = br.read_bytes(expected)?;
        let msg = CsvcMsgFlattenedSerializer::decode(&buf[..])?;

        let mut serializers = Self::default();
        for desc in &msg.serializers {
            let table = build_table(&msg, desc, pst, &serializers, build)?;
            let name = Box::from(table.name.as_ref());
            let version = table.version;
            serializers
                .map
                .entry(name)
                .or_default()
                .insert(version, Rc::new(table));
        }
        Ok(serializers)
    }

    #[inline]
    pub fn by_name_version(&self, name: &str, version: i32) -> Option<Rc<Dt>> {
        self.map
            .get(name)
            .and_then(|versions| versions.get(&version))
            .cloned()
    }

    #[inline]
    pub fn contains_name(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    #[inline]
    pub fn tables(&self) -> impl Iterator<Item = &Rc<Dt>> {
        self.map.values().flat_map(|versions| versions.values())
    }
}

fn symbol<'a>(msg: &'a CsvcMsgFlattenedSerializer, index: i32) -> Result<&'a str> {
    msg.symbols
        .get(index as usize)
        .map(String::as_str)
        .ok_or(Error::SymbolOutOfRange(index))
}

fn build_table(
    msg: &CsvcMsgFlattenedSerializer,
    desc: &ProtoFlattenedSerializerT,
    pst: &mut PropertySerializerTable,
    serializers: &Serializers,
    build: u32,
) -> Result<Dt> {
    let mut table = Dt {
        name: symbol(msg, desc.serializer_name_sym.unwrap_or_default())?.into(),
        version: desc.serializer_version.unwrap_or_default(),
        flags: None,
        properties: Vec::with_capacity(desc.fields_index.len()),
    };

    for field_index in &desc.fields_index {
        let fd = msg
            .fields
            .get(*field_index as usize)
            .ok_or(Error::FieldIndexOutOfRange(*field_index))?;

        let mut field = DtField {
            name: symbol(msg, fd.var_name_sym.unwrap_or_default())?.into(),
            field_type: symbol(msg, fd.var_type_sym.unwrap_or_default())?.into(),
            encoder: None,
            index: -1,
            flags: fd.encode_flags,
            bit_count: fd.bit_count,
            low_value: fd.low_value,
            high_value: fd.high_value,
            version: fd.field_serializer_version,
            serializer: None,
            build,
        };

        pst.fill_serializer(&mut field)?;

        if let Some(encoder_sym) = fd.var_encoder_sym {
            field.encoder = Some(symbol(msg, encoder_sym)?.into());
        } else {
            patch_encoder(&mut field, &table.name, build);
        }

        // sub-tables must already exist: the descriptor stream is
        // dependency-ordered, so a miss here means the stream is broken
        let mut prop_table: Option<Rc<Dt>> = None;
        if let Some(sub_sym) = fd.field_serializer_name_sym {
            let sub_name = symbol(msg, sub_sym)?;
            let sub_version = fd.field_serializer_version.unwrap_or_default();
            prop_table = Some(
                serializers
                    .by_name_version(sub_name, sub_version)
                    .ok_or_else(|| Error::MissingSubTable {
                        name: sub_name.to_string(),
                        version: sub_version,
                    })?,
            );
        }

        if let Some(serializer) = field.serializer.clone() {
            if serializer.is_array {
                prop_table = Some(Rc::new(expand_array(&field, &serializer, &prop_table)));
            }
        }

        table.properties.push(DtProperty {
            field,
            table: prop_table,
        });
    }

    Ok(table)
}

/// Replaces an array property's sub-table with a synthesized table named
/// after the field, holding one zero-padded entry per element. Each entry
/// inherits the parent's numeric hints and encoder, indexes itself, and
/// decodes through the element serializer. A sub-table carried by the parent
/// is cloned under the element's name.
fn expand_array(
    parent: &DtField,
    serializer: &Rc<PropertySerializer>,
    sub_table: &Option<Rc<Dt>>,
) -> Dt {
    let mut expanded = Dt {
        name: parent.name.clone(),
        version: 0,
        flags: None,
        properties: Vec::with_capacity(serializer.length as usize),
    };

    for i in 0..serializer.length {
        let element_name = format!("{i:04}");
        let element_table = sub_table
            .as_deref()
            .map(|table| Rc::new(table.renamed(&element_name)));

        expanded.properties.push(DtProperty {
            field: DtField {
                name: element_name.into(),
                field_type: serializer.name.clone(),
                encoder: parent.encoder.clone(),
                index: i as i32,
                flags: parent.flags,
                bit_count: parent.bit_count,
                low_value: parent.low_value,
                high_value: parent.high_value,
                version: parent.version,
                serializer: serializer.array_serializer.clone(),
                build: parent.build,
            },
            table: element_table,
        });
    }

    expanded
}

const QANGLE_PATCH_FIELDS: &[&str] = &[
    "angExtraLocalAngles",
    "angLocalAngles",
    "m_angInitialAngles",
    "m_angRotation",
    "m_ragAngles",
    "m_vLightDirection",
];

const COORD_PATCH_FIELDS: &[&str] = &[
    "dirPrimary",
    "localSound",
    "m_flElasticity",
    "m_location",
    "m_poolOrigin",
    "m_ragPos",
    "m_vecEndPos",
    "m_vecLadderDir",
    "m_vecPlayerMountPositionBottom",
    "m_vecPlayerMountPositionTop",
    "m_viewtarget",
    "m_WorldMaxs",
    "m_WorldMins",
    "origin",
    "vecLocalOrigin",
];

const FIXED64_PATCH_FIELDS: &[&str] = &[
    "m_bItemWhiteList",
    "m_bWorldTreeState",
    "m_iPlayerIDsInControl",
    "m_iPlayerSteamID",
    "m_ulTeamBannerLogo",
    "m_ulTeamBaseLogo",
    "m_ulTeamLogo",
];

// Fills in encoder tags for builds that shipped incomplete encoder
// information: builds up to 990 carried none for angle/coordinate fields,
// builds 1016..=1027 dropped fixed64. Applied only when the descriptor did
// not name an encoder itself.
fn patch_encoder(field: &mut DtField, table_name: &str, build: u32) {
    match build {
        b if b <= 990 => {
            let name = field.name.as_ref();
            if QANGLE_PATCH_FIELDS.contains(&name) {
                field.encoder = Some(
                    if table_name == "CBodyComponentBaseAnimatingOverlay" {
                        "qangle_pitch_yaw"
                    } else {
                        "QAngle"
                    }
                    .into(),
                );
            } else if COORD_PATCH_FIELDS.contains(&name) {
                field.encoder = Some("coord".into());
            } else if name == "m_vecLadderNormal" {
                field.encoder = Some("normal".into());
            }
        }
        1016..=1027 => {
            if FIXED64_PATCH_FIELDS.contains(&field.name.as_ref()) {
                field.encoder = Some("fixed64".into());
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::protos::ProtoFlattenedSerializerFieldT;

    struct MsgBuilder {
        msg: CsvcMsgFlattenedSerializer,
    }

    impl MsgBuilder {
        fn new() -> Self {
            Self {
                msg: CsvcMsgFlattenedSerializer::default(),
            }
        }

        fn sym(&mut self, s: &str) -> i32 {
            if let Some(i) = self.msg.symbols.iter().position(|existing| existing == s) {
                return i as i32;
            }
            self.msg.symbols.push(s.to_string());
            (self.msg.symbols.len() - 1) as i32
        }

        fn field(&mut self, var_name: &str, var_type: &str) -> i32 {
            let field = ProtoFlattenedSerializerFieldT {
                var_name_sym: Some(self.sym(var_name)),
                var_type_sym: Some(self.sym(var_type)),
                ..Default::default()
            };
            self.msg.fields.push(field);
            (self.msg.fields.len() - 1) as i32
        }

        fn serializer(&mut self, name: &str, version: i32, fields_index: Vec<i32>) {
            let desc = ProtoFlattenedSerializerT {
                serializer_name_sym: Some(self.sym(name)),
                serializer_version: Some(version),
                fields_index,
            };
            self.msg.serializers.push(desc);
        }

        fn into_send_tables(self) -> CDemoSendTables {
            let encoded = self.msg.encode_to_vec();
            let mut data = Vec::with_capacity(encoded.len() + 4);
            prost::encoding::encode_varint(encoded.len() as u64, &mut data);
            data.extend_from_slice(&encoded);
            CDemoSendTables { data: Some(data) }
        }
    }

    fn parse(builder: MsgBuilder, build: u32) -> Result<Serializers> {
        let mut pst = PropertySerializerTable::new();
        Serializers::parse(builder.into_send_tables(), &mut pst, build)
    }

    fn encoder_of(sers: &Serializers, table: &str, prop: usize) -> Option<String> {
        let table = sers.by_name_version(table, 0).unwrap();
        table.properties[prop]
            .field
            .encoder
            .as_deref()
            .map(str::to_owned)
    }

    #[test]
    fn test_legacy_build_qangle_patch() {
        let mut b = MsgBuilder::new();
        let f = b.field("m_angRotation", "QAngle");
        b.serializer("CBodyComponentBaseAnimatingOverlay", 0, vec![f]);
        b.serializer("CBodyComponentPoint", 0, vec![f]);
        let sers = parse(b, 500).unwrap();

        assert_eq!(
            encoder_of(&sers, "CBodyComponentBaseAnimatingOverlay", 0).as_deref(),
            Some("qangle_pitch_yaw")
        );
        assert_eq!(
            encoder_of(&sers, "CBodyComponentPoint", 0).as_deref(),
            Some("QAngle")
        );
    }

    #[test]
    fn test_legacy_build_coord_and_normal_patch() {
        let mut b = MsgBuilder::new();
        let origin = b.field("origin", "Vector");
        let normal = b.field("m_vecLadderNormal", "Vector");
        b.serializer("CFuncLadder", 0, vec![origin, normal]);
        let sers = parse(b, 990).unwrap();

        assert_eq!(encoder_of(&sers, "CFuncLadder", 0).as_deref(), Some("coord"));
        assert_eq!(
            encoder_of(&sers, "CFuncLadder", 1).as_deref(),
            Some("normal")
        );
    }

    #[test]
    fn test_mid_range_build_fixed64_patch() {
        let mut b = MsgBuilder::new();
        let f = b.field("m_ulTeamLogo", "uint64");
        b.serializer("CDOTA_DataNonSpectator", 0, vec![f]);
        let sers = parse(b, 1020).unwrap();
        assert_eq!(
            encoder_of(&sers, "CDOTA_DataNonSpectator", 0).as_deref(),
            Some("fixed64")
        );

        let mut b = MsgBuilder::new();
        let f = b.field("m_ulTeamLogo", "uint64");
        b.serializer("CDOTA_DataNonSpectator", 0, vec![f]);
        let sers = parse(b, 1028).unwrap();
        assert_eq!(encoder_of(&sers, "CDOTA_DataNonSpectator", 0), None);
    }

    #[test]
    fn test_explicit_encoder_is_never_patched() {
        let mut b = MsgBuilder::new();
        let f = b.field("m_angRotation", "QAngle");
        let enc = b.sym("qangle_precise");
        b.msg.fields[f as usize].var_encoder_sym = Some(enc);
        b.serializer("CBodyComponentPoint", 0, vec![f]);
        let sers = parse(b, 500).unwrap();
        assert_eq!(
            encoder_of(&sers, "CBodyComponentPoint", 0).as_deref(),
            Some("qangle_precise")
        );
    }

    #[test]
    fn test_array_expansion() {
        let mut b = MsgBuilder::new();
        let f = b.field("m_vec", "uint32[4]");
        b.serializer("CTestClass", 0, vec![f]);
        let sers = parse(b, 2000).unwrap();

        let table = sers.by_name_version("CTestClass", 0).unwrap();
        let prop = &table.properties[0];
        assert_eq!(prop.field.index, -1);

        let expanded = prop.table.as_deref().unwrap();
        assert_eq!(expanded.name.as_ref(), "m_vec");
        assert_eq!(expanded.properties.len(), 4);
        for (i, element) in expanded.properties.iter().enumerate() {
            assert_eq!(element.field.name.as_ref(), format!("{i:04}"));
            assert_eq!(element.field.index, i as i32);
            assert_eq!(element.field.field_type.as_ref(), "uint32");
            assert!(element.field.serializer.is_some());
            assert!(element.table.is_none());
        }
    }

    #[test]
    fn test_sub_table_attachment_and_missing_reference() {
        let mut b = MsgBuilder::new();
        let cell = b.field("m_cellX", "uint32");
        b.serializer("CBodyComponent", 0, vec![cell]);

        let body = b.field("CBodyComponent", "CBodyComponent");
        let sub = b.sym("CBodyComponent");
        b.msg.fields[body as usize].field_serializer_name_sym = Some(sub);
        b.serializer("CWorld", 0, vec![body]);

        let sers = parse(b, 2000).unwrap();
        let world = sers.by_name_version("CWorld", 0).unwrap();
        let attached = world.properties[0].table.as_deref().unwrap();
        assert_eq!(attached.name.as_ref(), "CBodyComponent");
        assert_eq!(attached.properties[0].field.name.as_ref(), "m_cellX");

        // referencing a serializer that was never built is fatal
        let mut b = MsgBuilder::new();
        let body = b.field("CBodyComponent", "CBodyComponent");
        let sub = b.sym("CMissingComponent");
        b.msg.fields[body as usize].field_serializer_name_sym = Some(sub);
        b.serializer("CWorld", 0, vec![body]);
        assert!(matches!(
            parse(b, 2000),
            Err(Error::MissingSubTable { .. })
        ));
    }

    #[test]
    fn test_length_prefix_mismatch() {
        let mut data = Vec::new();
        prost::encoding::encode_varint(99, &mut data);
        data.extend_from_slice(&[0u8; 4]);
        let cmd = CDemoSendTables { data: Some(data) };
        let mut pst = PropertySerializerTable::new();
        assert!(matches!(
            Serializers::parse(cmd, &mut pst, 2000),
            Err(Error::LengthMismatch {
                expected: 99,
                got: 4
            })
        ));
    }

    #[test]
    fn test_versioned_tables_coexist() {
        let mut b = MsgBuilder::new();
        let f0 = b.field("m_iHealth", "uint32");
        let f1 = b.field("m_iMana", "uint32");
        b.serializer("CDOTA_Hero", 0, vec![f0]);
        b.serializer("CDOTA_Hero", 1, vec![f0, f1]);
        let sers = parse(b, 2000).unwrap();

        assert_eq!(
            sers.by_name_version("CDOTA_Hero", 0)
                .unwrap()
                .properties
                .len(),
            1
        );
        assert_eq!(
            sers.by_name_version("CDOTA_Hero", 1)
                .unwrap()
                .properties
                .len(),
            2
        );
        assert!(sers.by_name_version("CDOTA_Hero", 2).is_none());
    }

    #[test]
    fn test_expanded_array_dump() {
        let mut b = MsgBuilder::new();
        let f = b.field("m_vecStatViewer", "float32[2]");
        b.serializer("CTestClass", 0, vec![f]);
        let sers = parse(b, 2000).unwrap();

        let table = sers.by_name_version("CTestClass", 0).unwrap();
        let mut dump = String::new();
        for prop in &table.properties {
            dump.push_str(&format!(
                "{} ({})\n",
                prop.field.name, prop.field.field_type
            ));
            if let Some(sub) = prop.table.as_deref() {
                for sub_prop in &sub.properties {
                    dump.push_str(&format!(
                        "  {} ({}) index={}\n",
                        sub_prop.field.name, sub_prop.field.field_type, sub_prop.field.index
                    ));
                }
            }
        }
        expect![[r#"
            m_vecStatViewer (float32[2])
              0000 (float32) index=0
              0001 (float32) index=1
        "#]]
        .assert_eq(&dump);
    }
}
