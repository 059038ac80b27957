use anyhow::{bail, Result};

use crate::compression;
use crate::entityclasses::{game_build_from_game_dir, EntityClasses};
use crate::flattenedserializers::Serializers;
use crate::instancebaseline::{ClassBaselines, INSTANCE_BASELINE_TABLE_NAME};
use crate::propertyserializers::PropertySerializerTable;
use crate::protos::{
    CDemoClassInfo, CDemoSendTables, CsvcMsgCreateStringTable, CsvcMsgServerInfo,
    CsvcMsgUpdateStringTable,
};
use crate::stringtables::{parse_items, StringTables};

/// Orchestrates the state stream of a single demo: dispatches server-info,
/// send-tables, class-info and string-table messages in whatever order the
/// demo delivers them, and re-runs the baseline join whenever one of its
/// prerequisites becomes newly satisfied.
///
/// Processing is strictly single-threaded; one message is handled to
/// completion before the next.
#[derive(Default)]
pub struct Parser {
    game_build: u32,
    class_id_size: Option<u32>,
    tick: i32,

    entity_classes: Option<EntityClasses>,
    serializers: Option<Serializers>,
    string_tables: StringTables,
    class_baselines: ClassBaselines,
    pst: PropertySerializerTable,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extracts the game build from the game dir and the class-id bit width
    /// from the class count. Both are set once and immutable afterwards.
    pub fn on_server_info(&mut self, msg: &CsvcMsgServerInfo) -> Result<()> {
        // consumers read class ids from entity packets with this bit width
        let max_classes = msg.max_classes.unwrap_or_default();
        self.class_id_size = Some((max_classes as f32).log2().ceil() as u32);

        let game_dir = msg.game_dir.as_deref().unwrap_or_default();
        self.game_build = game_build_from_game_dir(game_dir)?;

        Ok(())
    }

    /// Builds the serializer graph. Send tables arrive once per demo; a
    /// second arrival is ignored.
    pub fn on_send_tables(&mut self, cmd: CDemoSendTables) -> Result<()> {
        if self.serializers.is_some() {
            return Ok(());
        }
        self.serializers = Some(Serializers::parse(cmd, &mut self.pst, self.game_build)?);
        Ok(())
    }

    /// Registers the class-id mapping and checks that every class has a
    /// serializer under its network name, then retries the baseline join.
    pub fn on_class_info(&mut self, cmd: &CDemoClassInfo) -> Result<()> {
        if self.entity_classes.is_some() {
            return Ok(());
        }

        let Some(serializers) = self.serializers.as_ref() else {
            bail!("class info arrived before send tables");
        };

        let classes = EntityClasses::parse(cmd);
        for (class_id, network_name) in classes.iter() {
            if !serializers.contains_name(network_name) {
                bail!("unable to find serializer for class {class_id} ({network_name})");
            }
        }

        self.entity_classes = Some(classes);
        self.update_instance_baseline()
    }

    pub fn on_create_string_table(&mut self, msg: &CsvcMsgCreateStringTable) -> Result<()> {
        let name = msg.name.as_deref().unwrap_or_default();
        let user_data_fixed_size = msg.user_data_fixed_size.unwrap_or_default();
        let user_data_size = msg.user_data_size.unwrap_or_default();

        let string_data = msg.string_data.as_deref().unwrap_or_default();
        let decompressed;
        let buf: &[u8] = if msg.data_compressed.unwrap_or_default() {
            decompressed = compression::decompress(string_data)?;
            &decompressed
        } else {
            string_data
        };

        let items = parse_items(
            buf,
            msg.num_entries.unwrap_or_default(),
            user_data_fixed_size,
            user_data_size,
        )?;

        let table = self
            .string_tables
            .create(name, user_data_fixed_size, user_data_size)?;
        table.insert_items(items);

        if name == INSTANCE_BASELINE_TABLE_NAME {
            self.update_instance_baseline()?;
        }
        Ok(())
    }

    pub fn on_update_string_table(&mut self, msg: &CsvcMsgUpdateStringTable) -> Result<()> {
        let table_id = msg.table_id.unwrap_or_default();
        let Some(table) = self.string_tables.by_id_mut(table_id) else {
            bail!("missing string table {table_id}");
        };

        log::trace!(
            "tick={} name={} changed_entries={} buflen={}",
            self.tick,
            table.name(),
            msg.num_changed_entries.unwrap_or_default(),
            msg.string_data.as_deref().unwrap_or_default().len()
        );

        let items = parse_items(
            msg.string_data.as_deref().unwrap_or_default(),
            msg.num_changed_entries.unwrap_or_default(),
            table.user_data_fixed_size(),
            table.user_data_size(),
        )?;
        table.update_items(items);

        let is_baseline = table.name() == INSTANCE_BASELINE_TABLE_NAME;
        if is_baseline {
            self.update_instance_baseline()?;
        }
        Ok(())
    }

    // The join is opportunistic: until class info and send tables have both
    // arrived, or while there is no instancebaseline table, this is a no-op
    // and will simply run again on the next trigger.
    fn update_instance_baseline(&mut self) -> Result<()> {
        let Some(entity_classes) = self.entity_classes.as_ref() else {
            log::debug!("skipping baseline update: no class info yet");
            return Ok(());
        };
        let Some(serializers) = self.serializers.as_ref() else {
            log::debug!("skipping baseline update: no send tables yet");
            return Ok(());
        };
        let Some(table) = self.string_tables.by_name(INSTANCE_BASELINE_TABLE_NAME) else {
            log::debug!("skipping baseline update: no instancebaseline string table");
            return Ok(());
        };

        self.class_baselines
            .update(table, entity_classes, serializers)?;
        Ok(())
    }

    /// Current demo tick, fed in by the outer framer; carried for tracing.
    #[inline]
    pub fn set_tick(&mut self, tick: i32) {
        self.tick = tick;
    }

    #[inline]
    pub fn tick(&self) -> i32 {
        self.tick
    }

    #[inline]
    pub fn game_build(&self) -> u32 {
        self.game_build
    }

    #[inline]
    pub fn class_id_size(&self) -> Option<u32> {
        self.class_id_size
    }

    #[inline]
    pub fn entity_classes(&self) -> Option<&EntityClasses> {
        self.entity_classes.as_ref()
    }

    #[inline]
    pub fn serializers(&self) -> Option<&Serializers> {
        self.serializers.as_ref()
    }

    #[inline]
    pub fn string_tables(&self) -> &StringTables {
        &self.string_tables
    }

    #[inline]
    pub fn class_baselines(&self) -> &ClassBaselines {
        &self.class_baselines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_info_sets_build_and_class_id_size() {
        let mut parser = Parser::new();
        parser
            .on_server_info(&CsvcMsgServerInfo {
                max_classes: Some(100),
                game_dir: Some("/dota/game/dota_v2000/bin".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(parser.game_build(), 2000);
        assert_eq!(parser.class_id_size(), Some(7));
    }

    #[test]
    fn test_server_info_without_build_marker_fails() {
        let mut parser = Parser::new();
        assert!(parser
            .on_server_info(&CsvcMsgServerInfo {
                max_classes: Some(100),
                game_dir: Some("no-pattern".to_string()),
                ..Default::default()
            })
            .is_err());
    }

    #[test]
    fn test_update_of_unknown_table_fails() {
        let mut parser = Parser::new();
        assert!(parser
            .on_update_string_table(&CsvcMsgUpdateStringTable {
                table_id: Some(3),
                num_changed_entries: Some(0),
                string_data: None,
            })
            .is_err());
    }

    #[test]
    fn test_create_string_table_without_prerequisites_is_benign() {
        // an instancebaseline table showing up before class info must not
        // fail; the join is retried later
        let mut parser = Parser::new();
        parser
            .on_create_string_table(&CsvcMsgCreateStringTable {
                name: Some(INSTANCE_BASELINE_TABLE_NAME.to_string()),
                num_entries: Some(0),
                ..Default::default()
            })
            .unwrap();

        assert!(parser.class_baselines().is_empty());
        assert_eq!(parser.string_tables().len(), 1);
    }
}
