use evermizer_game::{
    Capacity, CheckIdx, CheckKey, CheckType, GameData, IndexedVec, Item, ItemIdx, Location,
    Progress, RawProgressPair, RuleTable,
};
use log::{debug, info};
use serde::Serialize;
use thiserror::Error;

use crate::ProgressPair;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogicGraphError {
    #[error("Rule table entry references unknown check {0}")]
    UnresolvedCheckReference(CheckKey),
    #[error("Drop table entry references unknown item {0}")]
    UnresolvedItemReference(CheckKey),
    #[error("Check {0} appears more than once in the catalog")]
    DuplicateCheck(CheckKey),
    #[error("Item {0} appears more than once in the catalog")]
    DuplicateItem(CheckKey),
    #[error("More than one rule table entry for check {0}")]
    DuplicateRuleEntry(CheckKey),
    #[error("More than one drop table entry for item {0}")]
    DuplicateDropEntry(CheckKey),
    #[error("Pair [{pieces}, {progress:?}] at position {position} of {key} has non-positive pieces")]
    AmbiguousSentinel {
        key: CheckKey,
        position: usize,
        pieces: Capacity,
        progress: Progress,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LogicCheck {
    pub key: CheckKey,
    pub name: String,
    pub requires: Vec<ProgressPair>,
    pub provides: Vec<ProgressPair>,
}

impl LogicCheck {
    /// Whether an item can be placed here. Rule nodes have no physical location.
    pub fn is_location(&self) -> bool {
        !matches!(self.key.check_type, CheckType::Rule | CheckType::None)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LogicItem {
    pub key: CheckKey,
    pub name: String,
    pub provides: Vec<ProgressPair>,
    // TODO: decide whether wings, call beads, armor and ammo should count as progression
    // once they carry provisions of their own.
    pub progression: bool,
}

/// Checks and items with their requirement and provision lists resolved. Immutable once
/// built; solves only read from it, so it can be shared freely across threads.
#[derive(Clone, Debug)]
pub struct LogicGraph {
    pub checks: Vec<LogicCheck>,
    pub items: Vec<LogicItem>,
    check_isv: IndexedVec<CheckKey>,
    item_isv: IndexedVec<CheckKey>,
}

impl LogicGraph {
    pub fn build(
        game_data: &GameData,
        rule_table: &RuleTable,
    ) -> Result<LogicGraph, LogicGraphError> {
        let mut builder = LogicGraphBuilder::new();
        for location in game_data
            .get_locations()
            .iter()
            .chain(game_data.get_rule_checks().iter())
        {
            builder.add_check(location)?;
        }
        for item in &game_data.get_items() {
            builder.add_item(item)?;
        }
        builder.build(rule_table)
    }

    pub fn from_game_data(game_data: &GameData) -> Result<LogicGraph, LogicGraphError> {
        LogicGraph::build(game_data, &game_data.rule_table)
    }

    pub fn check_idx(&self, key: CheckKey) -> Option<CheckIdx> {
        self.check_isv.index_by_key.get(&key).copied()
    }

    pub fn item_idx(&self, key: CheckKey) -> Option<ItemIdx> {
        self.item_isv.index_by_key.get(&key).copied()
    }

    pub fn num_checks(&self) -> usize {
        self.checks.len()
    }

    pub fn location_idxs(&self) -> impl Iterator<Item = CheckIdx> + '_ {
        (0..self.checks.len()).filter(|&i| self.checks[i].is_location())
    }
}

fn resolve_pairs(
    key: CheckKey,
    raw: &[RawProgressPair],
) -> Result<Vec<ProgressPair>, LogicGraphError> {
    let mut out: Vec<ProgressPair> = Vec::with_capacity(raw.len());
    for (position, pair) in raw.iter().enumerate() {
        if !pair.is_sentinel() {
            out.push(ProgressPair::new(pair.0, pair.1));
            continue;
        }
        // Only a `None` tag terminates the list.
        if pair.1 != Progress::None {
            return Err(LogicGraphError::AmbiguousSentinel {
                key,
                position,
                pieces: pair.0,
                progress: pair.1,
            });
        }
        break;
    }
    Ok(out)
}

/// Collects checks and items, then joins the rule table against them in a single pass.
/// Nothing is published until every entry has resolved.
#[derive(Default)]
pub struct LogicGraphBuilder {
    check_isv: IndexedVec<CheckKey>,
    check_names: Vec<String>,
    item_isv: IndexedVec<CheckKey>,
    item_names: Vec<String>,
}

impl LogicGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_check(&mut self, location: &Location) -> Result<CheckIdx, LogicGraphError> {
        if self.check_isv.index_by_key.contains_key(&location.key) {
            return Err(LogicGraphError::DuplicateCheck(location.key));
        }
        self.check_names.push(location.name.clone());
        Ok(self.check_isv.add(&location.key))
    }

    pub fn add_item(&mut self, item: &Item) -> Result<ItemIdx, LogicGraphError> {
        if self.item_isv.index_by_key.contains_key(&item.key) {
            return Err(LogicGraphError::DuplicateItem(item.key));
        }
        self.item_names.push(item.name.clone());
        Ok(self.item_isv.add(&item.key))
    }

    pub fn build(self, rule_table: &RuleTable) -> Result<LogicGraph, LogicGraphError> {
        let num_checks = self.check_isv.keys.len();
        let mut check_requires: Vec<Vec<ProgressPair>> = vec![vec![]; num_checks];
        let mut check_provides: Vec<Vec<ProgressPair>> = vec![vec![]; num_checks];
        let mut check_has_entry: Vec<bool> = vec![false; num_checks];
        for entry in &rule_table.check_tree {
            let key = entry.key();
            let idx = *self
                .check_isv
                .index_by_key
                .get(&key)
                .ok_or(LogicGraphError::UnresolvedCheckReference(key))?;
            if check_has_entry[idx] {
                return Err(LogicGraphError::DuplicateRuleEntry(key));
            }
            check_has_entry[idx] = true;
            check_requires[idx] = resolve_pairs(key, &entry.requires)?;
            check_provides[idx] = resolve_pairs(key, &entry.provides)?;
        }

        let num_items = self.item_isv.keys.len();
        let mut item_provides: Vec<Vec<ProgressPair>> = vec![vec![]; num_items];
        let mut item_has_entry: Vec<bool> = vec![false; num_items];
        for entry in &rule_table.drops {
            let key = entry.key();
            let idx = *self
                .item_isv
                .index_by_key
                .get(&key)
                .ok_or(LogicGraphError::UnresolvedItemReference(key))?;
            if item_has_entry[idx] {
                return Err(LogicGraphError::DuplicateDropEntry(key));
            }
            item_has_entry[idx] = true;
            item_provides[idx] = resolve_pairs(key, &entry.provides)?;
        }

        let checks: Vec<LogicCheck> = self
            .check_isv
            .keys
            .iter()
            .zip(self.check_names)
            .zip(check_requires.into_iter().zip(check_provides))
            .map(|((&key, name), (requires, provides))| LogicCheck {
                key,
                name,
                requires,
                provides,
            })
            .collect();
        let items: Vec<LogicItem> = self
            .item_isv
            .keys
            .iter()
            .zip(self.item_names)
            .zip(item_provides)
            .map(|((&key, name), provides)| LogicItem {
                key,
                name,
                progression: !provides.is_empty(),
                provides,
            })
            .collect();

        for check in &checks {
            if !check.requires.is_empty() {
                debug!("{} ({}) requires {:?}", check.key, check.name, check.requires);
            }
        }
        info!(
            "Built logic graph: {} checks ({} locations), {} items ({} progression)",
            checks.len(),
            checks.iter().filter(|x| x.is_location()).count(),
            items.len(),
            items.iter().filter(|x| x.progression).count()
        );

        Ok(LogicGraph {
            checks,
            items,
            check_isv: self.check_isv,
            item_isv: self.item_isv,
        })
    }
}
