// The changes suggested by this lint usually make the code more cluttered and less clear:
#![allow(clippy::needless_range_loop)]

use anyhow::{bail, ensure, Context, Result};
use hashbrown::{HashMap, HashSet};
use log::info;
use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};
use std::borrow::ToOwned;
use std::fmt::{self, Display, Formatter};
use std::fs::File;
use std::hash::Hash;
use std::path::Path;
use strum_macros::{EnumString, VariantNames};

pub type Capacity = i32; // Data type used to represent accumulated pieces of a progression resource
pub type CheckIdx = usize; // Index into LogicGraph.checks: locations (gourds, bosses, alchemy), then rule nodes
pub type ItemIdx = usize; // Index into LogicGraph.items: gourd drops, boss drops (in boss drop order), alchemy
pub type BossDropIdx = usize; // Index into GameData.boss_drop_names

const VANILLA_JSON: &str = include_str!("../data/vanilla.json");

#[derive(Clone, Debug)]
pub struct IndexedVec<T: Hash + Eq> {
    pub keys: Vec<T>,
    pub index_by_key: HashMap<T, usize>,
}

impl<T: Hash + Eq> Default for IndexedVec<T> {
    fn default() -> Self {
        IndexedVec {
            keys: vec![],
            index_by_key: HashMap::new(),
        }
    }
}

impl<T: Hash + Eq> IndexedVec<T> {
    pub fn add<U: ToOwned<Owned = T> + ?Sized>(&mut self, name: &U) -> usize {
        if !self.index_by_key.contains_key(&name.to_owned()) {
            let idx = self.keys.len();
            self.index_by_key.insert(name.to_owned(), self.keys.len());
            self.keys.push(name.to_owned());
            idx
        } else {
            self.index_by_key[&name.to_owned()]
        }
    }
}

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    VariantNames,
    TryFromPrimitive,
    Serialize,
    Deserialize,
    PartialOrd,
    Ord,
)]
#[repr(usize)]
// Note: the ordering of these is significant; it must correspond to the check type tags used by the patcher:
pub enum CheckType {
    None,    // 0
    Alchemy, // 1
    Boss,    // 2
    Gourd,   // 3
    Npc,     // 4
    Rule,    // 5
}

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    VariantNames,
    TryFromPrimitive,
    Serialize,
    Deserialize,
    PartialOrd,
    Ord,
)]
#[repr(usize)]
// Note: the ordering of these is significant; it must correspond to the progression tags used by the patcher:
pub enum Progress {
    None,       // 0
    Weapon,     // 1
    RockSkip,   // 2
    Rocket,     // 3
    EnergyCore, // 4
    FinalBoss,  // 5
    JaguarRing, // 6
}

pub const NUM_PROGRESS: usize = 7;

impl Progress {
    /// All real progression kinds, i.e. everything except the `None` sentinel.
    pub fn all() -> impl Iterator<Item = Progress> {
        (1..NUM_PROGRESS).filter_map(|i| Progress::try_from(i).ok())
    }
}

/// Unique key of a check (or of an item, within the item namespace).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CheckKey {
    #[serde(rename = "type")]
    pub check_type: CheckType,
    pub index: usize,
}

impl CheckKey {
    pub fn new(check_type: CheckType, index: usize) -> Self {
        CheckKey { check_type, index }
    }
}

impl Display for CheckKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} #{}", self.check_type, self.index)
    }
}

/// A (pieces, progress) pair as supplied by the data provider. Lists of these may be
/// terminated early by a sentinel entry (progress `None`, or pieces <= 0).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProgressPair(pub Capacity, pub Progress);

impl RawProgressPair {
    pub fn is_sentinel(&self) -> bool {
        self.1 == Progress::None || self.0 <= 0
    }
}

/// Rule table entry: requirements and provisions attached to a location or rule node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckTreeItem {
    #[serde(rename = "type")]
    pub check_type: CheckType,
    pub index: usize,
    #[serde(default)]
    pub requires: Vec<RawProgressPair>,
    #[serde(default)]
    pub provides: Vec<RawProgressPair>,
}

impl CheckTreeItem {
    pub fn key(&self) -> CheckKey {
        CheckKey::new(self.check_type, self.index)
    }
}

/// Drop table entry: provisions granted by obtaining an item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropTreeItem {
    #[serde(rename = "type")]
    pub check_type: CheckType,
    pub index: usize,
    #[serde(default)]
    pub provides: Vec<RawProgressPair>,
}

impl DropTreeItem {
    pub fn key(&self) -> CheckKey {
        CheckKey::new(self.check_type, self.index)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTable {
    pub check_tree: Vec<CheckTreeItem>,
    pub drops: Vec<DropTreeItem>,
}

// Rule nodes share this shape, with `check_type` = Rule and possibly an empty name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub key: CheckKey,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub key: CheckKey,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameDataFile {
    gourds: Vec<String>,
    gourd_drops: Vec<String>,
    bosses: Vec<String>,
    boss_drop_names: Vec<String>,
    boss_drops: Vec<BossDropIdx>,
    alchemy: Vec<String>,
    #[serde(default)]
    rules: Vec<String>,
    goal: CheckKey,
    #[serde(default)]
    check_tree: Vec<CheckTreeItem>,
    #[serde(default)]
    drops: Vec<DropTreeItem>,
}

// Static tables describing the game. Built once at startup and never mutated afterward.
#[derive(Clone, Debug)]
pub struct GameData {
    pub gourd_names: Vec<String>,
    pub gourd_drop_names: Vec<String>,
    pub boss_names: Vec<String>,
    pub boss_drop_names: Vec<String>,
    pub boss_drops: Vec<BossDropIdx>, // Vanilla drop of each boss, which is also the canonical boss drop order
    pub alchemy_names: Vec<String>,
    pub rule_names: Vec<String>,
    pub goal: CheckKey,
    pub rule_table: RuleTable,
}

fn read_json_str(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("unable to open {}", path.display()))?;
    let json_str = std::io::read_to_string(file)
        .with_context(|| format!("unable to read {}", path.display()))?;
    Ok(json_str)
}

impl GameData {
    pub fn load_vanilla() -> Result<GameData> {
        GameData::from_json_str(VANILLA_JSON).context("Loading built-in vanilla tables")
    }

    pub fn load(path: &Path) -> Result<GameData> {
        let json_str = read_json_str(path)?;
        GameData::from_json_str(&json_str)
            .with_context(|| format!("unable to load game data from {}", path.display()))
    }

    pub fn from_json_str(json_str: &str) -> Result<GameData> {
        let file: GameDataFile = serde_json::from_str(json_str).context("Parsing game data")?;
        let game_data = GameData {
            gourd_names: file.gourds,
            gourd_drop_names: file.gourd_drops,
            boss_names: file.bosses,
            boss_drop_names: file.boss_drop_names,
            boss_drops: file.boss_drops,
            alchemy_names: file.alchemy,
            rule_names: file.rules,
            goal: file.goal,
            rule_table: RuleTable {
                check_tree: file.check_tree,
                drops: file.drops,
            },
        };
        game_data.check_boss_drops()?;
        info!(
            "Loaded game data: {} gourds, {} bosses, {} alchemy, {} rules, {} rule entries, {} drops",
            game_data.gourd_names.len(),
            game_data.boss_names.len(),
            game_data.alchemy_names.len(),
            game_data.rule_names.len(),
            game_data.rule_table.check_tree.len(),
            game_data.rule_table.drops.len()
        );
        Ok(game_data)
    }

    fn check_boss_drops(&self) -> Result<()> {
        ensure!(
            self.boss_drops.len() == self.boss_names.len(),
            "Expected one boss drop per boss, got {} drops for {} bosses",
            self.boss_drops.len(),
            self.boss_names.len()
        );
        let mut seen: HashSet<BossDropIdx> = HashSet::new();
        for &drop_idx in &self.boss_drops {
            if drop_idx >= self.boss_drop_names.len() {
                bail!(
                    "Boss drop index {} out of range ({} boss drop names)",
                    drop_idx,
                    self.boss_drop_names.len()
                );
            }
            if !seen.insert(drop_idx) {
                bail!("Boss drop index {} listed more than once", drop_idx);
            }
        }
        Ok(())
    }

    /// All physical locations: gourds, then bosses, then alchemy.
    pub fn get_locations(&self) -> Vec<Location> {
        let mut out: Vec<Location> = Vec::with_capacity(
            self.gourd_names.len() + self.boss_names.len() + self.alchemy_names.len(),
        );
        for (i, name) in self.gourd_names.iter().enumerate() {
            out.push(Location {
                name: name.clone(),
                key: CheckKey::new(CheckType::Gourd, i),
            });
        }
        for (i, name) in self.boss_names.iter().enumerate() {
            out.push(Location {
                name: name.clone(),
                key: CheckKey::new(CheckType::Boss, i),
            });
        }
        for (i, name) in self.alchemy_names.iter().enumerate() {
            out.push(Location {
                name: name.clone(),
                key: CheckKey::new(CheckType::Alchemy, i),
            });
        }
        out
    }

    pub fn get_rule_checks(&self) -> Vec<Location> {
        self.rule_names
            .iter()
            .enumerate()
            .map(|(i, name)| Location {
                name: name.clone(),
                key: CheckKey::new(CheckType::Rule, i),
            })
            .collect()
    }

    /// All items: gourd drops, then boss drops in canonical boss drop order, then alchemy.
    /// Boss drops are keyed by their drop index, not by the boss that drops them.
    pub fn get_items(&self) -> Vec<Item> {
        let mut out: Vec<Item> = Vec::with_capacity(
            self.gourd_drop_names.len() + self.boss_drops.len() + self.alchemy_names.len(),
        );
        for (i, name) in self.gourd_drop_names.iter().enumerate() {
            out.push(Item {
                name: name.clone(),
                key: CheckKey::new(CheckType::Gourd, i),
            });
        }
        for &drop_idx in &self.boss_drops {
            out.push(Item {
                name: self.boss_drop_names[drop_idx].clone(),
                key: CheckKey::new(CheckType::Boss, drop_idx),
            });
        }
        for (i, name) in self.alchemy_names.iter().enumerate() {
            out.push(Item {
                name: name.clone(),
                key: CheckKey::new(CheckType::Alchemy, i),
            });
        }
        out
    }

    /// Vanilla assignment as (location key, item key) pairs.
    pub fn vanilla_placement(&self) -> Vec<(CheckKey, CheckKey)> {
        let mut out: Vec<(CheckKey, CheckKey)> = vec![];
        for i in 0..self.gourd_names.len().min(self.gourd_drop_names.len()) {
            out.push((
                CheckKey::new(CheckType::Gourd, i),
                CheckKey::new(CheckType::Gourd, i),
            ));
        }
        for (boss_idx, &drop_idx) in self.boss_drops.iter().enumerate() {
            out.push((
                CheckKey::new(CheckType::Boss, boss_idx),
                CheckKey::new(CheckType::Boss, drop_idx),
            ));
        }
        for i in 0..self.alchemy_names.len() {
            out.push((
                CheckKey::new(CheckType::Alchemy, i),
                CheckKey::new(CheckType::Alchemy, i),
            ));
        }
        out
    }
}
