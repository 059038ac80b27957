use std::hash::BuildHasherDefault;

use hashbrown::HashMap;
use nohash::NoHashHasher;

use crate::protos::CDemoClassInfo;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // std
    #[error(transparent)]
    ParseInt(#[from] std::num::ParseIntError),
    // mod
    #[error("unable to determine game build from '{0}'")]
    MissingGameBuild(String),
}

pub type Result<T> = std::result::Result<T, Error>;

const GAME_BUILD_MARKER: &str = "/dota_v";

/// Extracts the game build from the server-info game dir by locating the
/// `/dota_v<digits>/` path segment. A plain substring scan; the pattern is
/// too simple to warrant a regex.
pub fn game_build_from_game_dir(game_dir: &str) -> Result<u32> {
    let mut search = game_dir;
    while let Some(pos) = search.find(GAME_BUILD_MARKER) {
        let tail = &search[pos + GAME_BUILD_MARKER.len()..];
        let digits_end = tail
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(tail.len());
        if digits_end > 0 && tail[digits_end..].starts_with('/') {
            return Ok(tail[..digits_end].parse::<u32>()?);
        }
        search = &search[pos + 1..];
    }
    Err(Error::MissingGameBuild(game_dir.to_string()))
}

type ClassMap = HashMap<i32, Box<str>, BuildHasherDefault<NoHashHasher<i32>>>;

/// Registry mapping class ids to network names. Entries are created once
/// from class-info and are immutable thereafter.
#[derive(Default)]
pub struct EntityClasses {
    classes: ClassMap,
}

impl EntityClasses {
    pub fn parse(cmd: &CDemoClassInfo) -> Self {
        let mut classes = ClassMap::with_capacity_and_hasher(
            cmd.classes.len(),
            BuildHasherDefault::default(),
        );
        for class in &cmd.classes {
            classes.insert(
                class.class_id.unwrap_or_default(),
                class.network_name.as_deref().unwrap_or_default().into(),
            );
        }
        Self { classes }
    }

    #[inline]
    pub fn by_id(&self, class_id: i32) -> Option<&str> {
        self.classes.get(&class_id).map(AsRef::as_ref)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (i32, &str)> {
        self.classes.iter().map(|(id, name)| (*id, name.as_ref()))
    }
}
