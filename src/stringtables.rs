use std::hash::BuildHasherDefault;

use hashbrown::HashMap;
use nohash::NoHashHasher;

use crate::bitreader::{self, BitReader};

// some info about string tables is available at
// https://developer.valvesoftware.com/wiki/Networking_Events_%26_Messages

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // crate
    #[error(transparent)]
    BitReader(#[from] bitreader::Error),
    // mod
    #[error("tried to create string table '{0}' twice")]
    DuplicateStringTable(String),
}

pub type Result<T> = std::result::Result<T, Error>;

const KEY_HISTORY_SIZE: usize = 32;

const KEY_HISTORY_POS_BITS: usize = 5;
const KEY_HISTORY_SIZE_BITS: usize = 5;

const VALUE_SIZE_BITS: usize = 14;

/// One entry of a string table. Entries are created on first reference and
/// mutated in place by later updates.
#[derive(Debug, Clone)]
pub struct StringTableItem {
    pub index: i32,
    pub key: String,
    pub value: Vec<u8>,
}

type ItemMap = HashMap<i32, StringTableItem, BuildHasherDefault<NoHashHasher<i32>>>;

#[derive(Debug)]
pub struct StringTable {
    index: i32,
    name: Box<str>,
    user_data_fixed_size: bool,
    user_data_size: i32,
    items: ItemMap,
}

impl StringTable {
    #[inline]
    pub fn index(&self) -> i32 {
        self.index
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn user_data_fixed_size(&self) -> bool {
        self.user_data_fixed_size
    }

    #[inline]
    pub fn user_data_size(&self) -> i32 {
        self.user_data_size
    }

    #[inline]
    pub fn item(&self, index: i32) -> Option<&StringTableItem> {
        self.items.get(&index)
    }

    #[inline]
    pub fn items(&self) -> impl Iterator<Item = &StringTableItem> {
        self.items.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Inserts freshly parsed items of a create message, keyed by index.
    pub(crate) fn insert_items(&mut self, items: Vec<StringTableItem>) {
        for item in items {
            self.items.insert(item.index, item);
        }
    }

    /// Applies update items: an existing entry keeps its key unless the
    /// update carries a different non-empty one, and keeps its value unless
    /// the update carries a non-empty one; an unseen index is inserted as-is.
    pub(crate) fn update_items(&mut self, items: Vec<StringTableItem>) {
        for item in items {
            match self.items.get_mut(&item.index) {
                Some(existing) => {
                    if !item.key.is_empty() && item.key != existing.key {
                        log::trace!(
                            "table {} item {} key '{}' -> '{}'",
                            self.name,
                            item.index,
                            existing.key,
                            item.key
                        );
                        existing.key = item.key;
                    }
                    if !item.value.is_empty() {
                        existing.value = item.value;
                    }
                }
                None => {
                    self.items.insert(item.index, item);
                }
            }
        }
    }
}

type TableMap = HashMap<i32, StringTable, BuildHasherDefault<NoHashHasher<i32>>>;

/// Registry of all named string tables of a parse. Indices are assigned
/// monotonically in creation order; a name registers at most once.
#[derive(Default)]
pub struct StringTables {
    tables: TableMap,
    name_index: HashMap<Box<str>, i32>,
    next_index: i32,
}

impl StringTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        name: &str,
        user_data_fixed_size: bool,
        user_data_size: i32,
    ) -> Result<&mut StringTable> {
        if self.name_index.contains_key(name) {
            return Err(Error::DuplicateStringTable(name.to_string()));
        }

        let index = self.next_index;
        self.next_index += 1;

        let table = StringTable {
            index,
            name: name.into(),
            user_data_fixed_size,
            user_data_size,
            items: ItemMap::default(),
        };

        self.name_index.insert(name.into(), index);
        Ok(self.tables.entry(index).or_insert(table))
    }

    #[inline]
    pub fn by_id(&self, index: i32) -> Option<&StringTable> {
        self.tables.get(&index)
    }

    #[inline]
    pub(crate) fn by_id_mut(&mut self, index: i32) -> Option<&mut StringTable> {
        self.tables.get_mut(&index)
    }

    #[inline]
    pub fn by_name(&self, name: &str) -> Option<&StringTable> {
        self.name_index
            .get(name)
            .and_then(|index| self.tables.get(index))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    #[inline]
    pub fn tables(&self) -> impl Iterator<Item = &StringTable> {
        self.tables.values()
    }
}

/// Parses a string-table data blob into a list of item updates.
///
/// Each entry is a tuple of {index, key, value}. The index either increments
/// from the previous position or is read explicitly. Keys may back-reference
/// a sliding window of the 32 most recent keys, in which case a prefix of the
/// referenced key is glued to a freshly read suffix. Values are either fixed
/// size (bit width networked at table creation) or carry a 14-bit byte count.
pub fn parse_items(
    buf: &[u8],
    num_updates: i32,
    user_data_fixed_size: bool,
    user_data_size: i32,
) -> Result<Vec<StringTableItem>> {
    let mut items = Vec::new();

    // some tables have no data
    if buf.is_empty() {
        return Ok(items);
    }

    let mut br = BitReader::new(buf);
    let mut index: i32 = -1;
    let mut keys: Vec<String> = Vec::with_capacity(KEY_HISTORY_SIZE);

    for _ in 0..num_updates {
        index = if br.read_bool()? {
            index + 1
        } else {
            br.read_varuint32()? as i32 + 1
        };

        let mut key = String::new();
        if br.read_bool()? {
            let use_history = br.read_bool()?;
            if use_history {
                let pos = br.read_ubit32(KEY_HISTORY_POS_BITS)? as usize;
                let size = br.read_ubit32(KEY_HISTORY_SIZE_BITS)? as usize;

                if pos >= keys.len() {
                    key.push_str(&br.read_string()?);
                } else {
                    let prefix = keys[pos].as_bytes();
                    let take = size.min(prefix.len());
                    key.push_str(&String::from_utf8_lossy(&prefix[..take]));
                    key.push_str(&br.read_string()?);
                }
            } else {
                key = br.read_string()?;
            }

            if keys.len() >= KEY_HISTORY_SIZE {
                keys.remove(0);
            }
            keys.push(key.clone());
        }

        let mut value = Vec::new();
        if br.read_bool()? {
            if user_data_fixed_size {
                value = br.read_bits_as_bytes(user_data_size as usize)?;
            } else {
                let size = br.read_ubit32(VALUE_SIZE_BITS)? as usize;
                // the encoder emits 3 extra bits here; their meaning is
                // unconfirmed, they are skipped as-is
                br.read_ubit32(3)?;
                value = br.read_bytes(size)?;
            }
        }

        items.push(StringTableItem { index, key, value });
    }

    Ok(items)
}
