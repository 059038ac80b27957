use std::hash::BuildHasherDefault;

use hashbrown::HashMap;
use nohash::NoHashHasher;

use crate::bitreader::BitReader;
use crate::entityclasses::EntityClasses;
use crate::fieldvalue::{self, read_properties, Properties};
use crate::flattenedserializers::Serializers;
use crate::stringtables::{StringTable, StringTableItem};

pub const INSTANCE_BASELINE_TABLE_NAME: &str = "instancebaseline";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // crate
    #[error(transparent)]
    Properties(#[from] fieldvalue::Error),
    // mod
    #[error("invalid instancebaseline key '{key}'")]
    InvalidKey {
        key: String,
        source: std::num::ParseIntError,
    },
    #[error("no class info for instancebaseline key {0}")]
    UnknownClass(i32),
    #[error("no serializer named {name} for class {class_id}")]
    MissingSerializer { class_id: i32, name: String },
}

pub type Result<T> = std::result::Result<T, Error>;

type BaselineMap = HashMap<i32, Properties, BuildHasherDefault<NoHashHasher<i32>>>;

/// Decoded baseline property sets by class id. Entries are fully rebuilt
/// from the `instancebaseline` string table whenever its inputs refresh;
/// downstream consumers only ever read them.
#[derive(Default)]
pub struct ClassBaselines {
    baselines: BaselineMap,
}

impl ClassBaselines {
    #[inline]
    pub fn by_id(&self, class_id: i32) -> Option<&Properties> {
        self.baselines.get(&class_id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.baselines.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (i32, &Properties)> {
        self.baselines.iter().map(|(id, props)| (*id, props))
    }

    /// Rebuilds the baseline of every class present in the table. Item keys
    /// are decimal class ids; each one must be known to the class registry
    /// and have a serializer under its network name.
    pub(crate) fn update(
        &mut self,
        table: &StringTable,
        classes: &EntityClasses,
        serializers: &Serializers,
    ) -> Result<()> {
        for item in table.items() {
            self.update_item(item, classes, serializers)?;
        }
        Ok(())
    }

    fn update_item(
        &mut self,
        item: &StringTableItem,
        classes: &EntityClasses,
        serializers: &Serializers,
    ) -> Result<()> {
        let class_id: i32 = item.key.parse().map_err(|source| Error::InvalidKey {
            key: item.key.clone(),
            source,
        })?;

        let class_name = classes
            .by_id(class_id)
            .ok_or(Error::UnknownClass(class_id))?;

        self.baselines.entry(class_id).or_default();

        // baselines always decode against serializer version 0
        let serializer = serializers.by_name_version(class_name, 0).ok_or_else(|| {
            Error::MissingSerializer {
                class_id,
                name: class_name.to_string(),
            }
        })?;

        if item.value.is_empty() {
            return Ok(());
        }

        log::debug!("parsing entity baseline {}", serializer.name);
        let mut br = BitReader::new(&item.value);
        let properties = read_properties(&mut br, &serializer)?;

        // more than 8 trailing bits means the decoder drifted off the
        // encoder somewhere along the walk
        debug_assert!(
            br.rem_bits() <= 8,
            "{} bits left over after decoding baseline for {}",
            br.rem_bits(),
            serializer.name
        );

        self.baselines.insert(class_id, properties);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protos::{c_demo_class_info::ClassT, CDemoClassInfo};
    use crate::stringtables::StringTables;

    fn baseline_table(items: Vec<StringTableItem>) -> StringTables {
        let mut tables = StringTables::new();
        let table = tables
            .create(INSTANCE_BASELINE_TABLE_NAME, false, 0)
            .unwrap();
        table.insert_items(items);
        tables
    }

    #[test]
    fn test_non_numeric_key_is_fatal() {
        let tables = baseline_table(vec![StringTableItem {
            index: 0,
            key: "not-a-number".to_string(),
            value: Vec::new(),
        }]);

        let mut baselines = ClassBaselines::default();
        let classes = EntityClasses::default();
        let serializers = Serializers::default();
        let table = tables.by_name(INSTANCE_BASELINE_TABLE_NAME).unwrap();
        assert!(matches!(
            baselines.update(table, &classes, &serializers),
            Err(Error::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_unknown_class_is_fatal() {
        let tables = baseline_table(vec![StringTableItem {
            index: 0,
            key: "17".to_string(),
            value: Vec::new(),
        }]);

        let mut baselines = ClassBaselines::default();
        let classes = EntityClasses::default();
        let serializers = Serializers::default();
        let table = tables.by_name(INSTANCE_BASELINE_TABLE_NAME).unwrap();
        assert!(matches!(
            baselines.update(table, &classes, &serializers),
            Err(Error::UnknownClass(17))
        ));
    }

    #[test]
    fn test_missing_serializer_is_fatal() {
        let tables = baseline_table(vec![StringTableItem {
            index: 0,
            key: "17".to_string(),
            value: Vec::new(),
        }]);

        let cmd = CDemoClassInfo {
            classes: vec![ClassT {
                class_id: Some(17),
                network_name: Some("CDOTA_Hero".to_string()),
                table_name: None,
            }],
        };
        let classes = EntityClasses::parse(&cmd);

        let mut baselines = ClassBaselines::default();
        let serializers = Serializers::default();
        let table = tables.by_name(INSTANCE_BASELINE_TABLE_NAME).unwrap();
        assert!(matches!(
            baselines.update(table, &classes, &serializers),
            Err(Error::MissingSerializer { class_id: 17, .. })
        ));
    }
}
