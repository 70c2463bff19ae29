use crate::settings::{RandomizerSettings, WinCondition};
use crate::spoiler_log::{get_spoiler_log, SpoilerLog};
use crate::traverse::Traverser;
use anyhow::{bail, ensure, Result};
use evermizer_game::{Capacity, CheckIdx, CheckKey, GameData, ItemIdx, Progress};
use evermizer_logic::{LogicGraph, ProgressCounts, Shortfall};
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedItem {
    pub location: CheckKey,
    pub item: CheckKey,
}

/// Candidate item-to-location assignment. Locations left out hold nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub items: Vec<PlacedItem>,
}

impl Placement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vanilla(game_data: &GameData) -> Self {
        let mut placement = Placement::new();
        for (location, item) in game_data.vanilla_placement() {
            placement.place(location, item);
        }
        placement
    }

    pub fn place(&mut self, location: CheckKey, item: CheckKey) {
        self.items.push(PlacedItem { location, item });
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlacementError {
    #[error("Placement references unknown location {0}")]
    UnknownLocation(CheckKey),
    #[error("Placement references unknown item {0}")]
    UnknownItem(CheckKey),
    #[error("Check {0} is a rule node, not a location")]
    NotALocation(CheckKey),
    #[error("More than one item placed at location {0}")]
    LocationAssignedTwice(CheckKey),
    #[error("Item {0} placed more than once")]
    ItemPlacedTwice(CheckKey),
    #[error("Win condition references unknown check {0}")]
    UnknownGoalCheck(CheckKey),
    #[error("Win condition progress [{pieces}, {progress:?}] is not a positive resource amount")]
    InvalidGoalProgress { pieces: Capacity, progress: Progress },
}

/// Resolves a placement against the graph, giving the item held by each check.
pub fn resolve_placement(
    graph: &LogicGraph,
    placement: &Placement,
) -> Result<Vec<Option<ItemIdx>>, PlacementError> {
    let mut item_by_check: Vec<Option<ItemIdx>> = vec![None; graph.num_checks()];
    let mut item_placed: Vec<bool> = vec![false; graph.items.len()];
    for placed in &placement.items {
        let check_idx = graph
            .check_idx(placed.location)
            .ok_or(PlacementError::UnknownLocation(placed.location))?;
        if !graph.checks[check_idx].is_location() {
            return Err(PlacementError::NotALocation(placed.location));
        }
        let item_idx = graph
            .item_idx(placed.item)
            .ok_or(PlacementError::UnknownItem(placed.item))?;
        if item_by_check[check_idx].is_some() {
            return Err(PlacementError::LocationAssignedTwice(placed.location));
        }
        if item_placed[item_idx] {
            return Err(PlacementError::ItemPlacedTwice(placed.item));
        }
        item_by_check[check_idx] = Some(item_idx);
        item_placed[item_idx] = true;
    }
    Ok(item_by_check)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreachedCheck {
    pub key: CheckKey,
    pub name: String,
    pub missing: Vec<Shortfall>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletabilityReport {
    pub completable: bool,
    pub fully_explorable: bool,
    // In acquisition order:
    pub reached: Vec<CheckKey>,
    pub counts: ProgressCounts,
    pub unmet_goal_checks: Vec<CheckKey>,
    pub unmet_goal_progress: Vec<Shortfall>,
    // Sorted by key:
    pub unreached: Vec<UnreachedCheck>,
    // Unreached checks that stay shut even if every other unreached check were reached
    // (sorted by key):
    pub blocked: Vec<CheckKey>,
}

impl CompletabilityReport {
    fn new(traverser: &Traverser, win_condition: &WinCondition) -> Self {
        let graph = traverser.graph();
        let reached: Vec<CheckKey> = traverser
            .acquisition_order
            .iter()
            .map(|&i| graph.checks[i].key)
            .collect();
        let mut unreached: Vec<UnreachedCheck> = traverser
            .unreached()
            .map(|i| {
                let check = &graph.checks[i];
                UnreachedCheck {
                    key: check.key,
                    name: check.name.clone(),
                    missing: traverser.counts.shortfall(&check.requires),
                }
            })
            .collect();
        unreached.sort_by_key(|x| x.key);

        let mut potential = ProgressCounts::new();
        for i in traverser.unreached() {
            potential.collect(&traverser.check_provides(i));
        }
        let blocked: Vec<CheckKey> = unreached
            .iter()
            .filter(|x| {
                let mut own = ProgressCounts::new();
                if let Some(i) = graph.check_idx(x.key) {
                    own.collect(&traverser.check_provides(i));
                }
                x.missing.iter().any(|s| {
                    let others = potential.get(s.progress).saturating_sub(own.get(s.progress));
                    s.held.saturating_add(others) < s.needed
                })
            })
            .map(|x| x.key)
            .collect();
        let unmet_goal_checks: Vec<CheckKey> = win_condition
            .checks
            .iter()
            .copied()
            .filter(|&key| !traverser.is_reached(key))
            .collect();
        let unmet_goal_progress = traverser.counts.shortfall(&win_condition.progress);
        CompletabilityReport {
            completable: unmet_goal_checks.is_empty() && unmet_goal_progress.is_empty(),
            fully_explorable: unreached.is_empty(),
            reached,
            counts: traverser.counts,
            unmet_goal_checks,
            unmet_goal_progress,
            unreached,
            blocked,
        }
    }
}

fn check_win_condition(
    graph: &LogicGraph,
    win_condition: &WinCondition,
) -> Result<(), PlacementError> {
    for &key in &win_condition.checks {
        if graph.check_idx(key).is_none() {
            return Err(PlacementError::UnknownGoalCheck(key));
        }
    }
    for pair in &win_condition.progress {
        if pair.pieces <= 0 || pair.progress == Progress::None {
            return Err(PlacementError::InvalidGoalProgress {
                pieces: pair.pieces,
                progress: pair.progress,
            });
        }
    }
    Ok(())
}

fn get_placement_traverser<'a>(
    graph: &'a LogicGraph,
    item_by_check: &[Option<ItemIdx>],
    initial_counts: ProgressCounts,
) -> Traverser<'a> {
    let mut traverser = Traverser::new(graph, initial_counts);
    for (check_idx, item) in item_by_check.iter().enumerate() {
        if let Some(item_idx) = *item {
            traverser.add_provides(check_idx, &graph.items[item_idx].provides);
        }
    }
    traverser.traverse();
    traverser
}

/// Certifies a placement from empty starting counts.
pub fn validate(
    graph: &LogicGraph,
    placement: &Placement,
    win_condition: &WinCondition,
) -> Result<CompletabilityReport, PlacementError> {
    validate_from(graph, placement, win_condition, ProgressCounts::new())
}

pub fn validate_from(
    graph: &LogicGraph,
    placement: &Placement,
    win_condition: &WinCondition,
    initial_counts: ProgressCounts,
) -> Result<CompletabilityReport, PlacementError> {
    check_win_condition(graph, win_condition)?;
    let item_by_check = resolve_placement(graph, placement)?;
    let traverser = get_placement_traverser(graph, &item_by_check, initial_counts);
    let report = CompletabilityReport::new(&traverser, win_condition);
    debug!(
        "Validated placement of {} items: completable={}, {} checks unreached",
        placement.items.len(),
        report.completable,
        report.unreached.len()
    );
    Ok(report)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Randomization {
    pub seed: u64,
    pub attempt_num: usize,
    pub placement: Placement,
    pub report: CompletabilityReport,
    pub spoiler_log: SpoilerLog,
}

/// Assumed-fill item placement, certified by `validate_from`.
pub struct Randomizer<'a> {
    pub graph: &'a LogicGraph,
    pub settings: &'a RandomizerSettings,
}

impl<'a> Randomizer<'a> {
    pub fn new(graph: &'a LogicGraph, settings: &'a RandomizerSettings) -> Self {
        Randomizer { graph, settings }
    }

    fn initial_counts(&self) -> ProgressCounts {
        self.settings.item_placement_settings.starting_counts()
    }

    // Places progression items one at a time, each into a location reachable while assuming
    // every still-unplaced progression item is already held. Filler goes in afterward.
    fn place_items<R: rand::Rng>(&self, rng: &mut R) -> Option<Vec<Option<ItemIdx>>> {
        let graph = self.graph;
        let mut empty_locations: Vec<CheckIdx> = graph.location_idxs().collect();
        let mut progression_items: Vec<ItemIdx> = (0..graph.items.len())
            .filter(|&i| graph.items[i].progression)
            .collect();
        let mut filler_items: Vec<ItemIdx> = (0..graph.items.len())
            .filter(|&i| !graph.items[i].progression)
            .collect();
        progression_items.shuffle(rng);
        filler_items.shuffle(rng);

        let mut item_by_check: Vec<Option<ItemIdx>> = vec![None; graph.num_checks()];
        while let Some(item_idx) = progression_items.pop() {
            let mut assumed_counts = self.initial_counts();
            for &i in &progression_items {
                assumed_counts.collect(&graph.items[i].provides);
            }
            let traverser = get_placement_traverser(graph, &item_by_check, assumed_counts);
            let candidates: Vec<CheckIdx> = empty_locations
                .iter()
                .copied()
                .filter(|&i| traverser.reached[i])
                .collect();
            let Some(&check_idx) = candidates.choose(rng) else {
                debug!(
                    "No reachable location left for {}",
                    graph.items[item_idx].name
                );
                return None;
            };
            item_by_check[check_idx] = Some(item_idx);
            empty_locations.retain(|&i| i != check_idx);
        }

        empty_locations.shuffle(rng);
        for (check_idx, item_idx) in empty_locations.into_iter().zip(filler_items) {
            item_by_check[check_idx] = Some(item_idx);
        }
        Some(item_by_check)
    }

    fn get_placement(&self, item_by_check: &[Option<ItemIdx>]) -> Placement {
        let mut placement = Placement::new();
        for (check_idx, item) in item_by_check.iter().enumerate() {
            if let Some(item_idx) = *item {
                placement.place(
                    self.graph.checks[check_idx].key,
                    self.graph.items[item_idx].key,
                );
            }
        }
        placement
    }

    pub fn randomize(&self, seed: u64) -> Result<Randomization> {
        let num_locations = self.graph.location_idxs().count();
        ensure!(
            self.graph.items.len() <= num_locations,
            "{} items do not fit in {} locations",
            self.graph.items.len(),
            num_locations
        );
        let mut rng_seed = [0u8; 32];
        rng_seed[..8].copy_from_slice(&seed.to_le_bytes());
        let mut rng = rand::rngs::StdRng::from_seed(rng_seed);

        let max_attempts = self.settings.item_placement_settings.max_attempts;
        for attempt_num in 0..max_attempts {
            let Some(item_by_check) = self.place_items(&mut rng) else {
                info!("Attempt {attempt_num}: ran out of reachable locations");
                continue;
            };
            let placement = self.get_placement(&item_by_check);
            let report = validate_from(
                self.graph,
                &placement,
                &self.settings.win_condition,
                self.initial_counts(),
            )?;
            if !report.completable {
                info!(
                    "Attempt {attempt_num}: placement not completable, unmet goals {:?}",
                    report.unmet_goal_checks
                );
                continue;
            }
            let traverser =
                get_placement_traverser(self.graph, &item_by_check, self.initial_counts());
            let spoiler_log = get_spoiler_log(&traverser, &item_by_check);
            info!(
                "Placed {} items on attempt {attempt_num} (seed {seed})",
                placement.items.len()
            );
            return Ok(Randomization {
                seed,
                attempt_num,
                placement,
                report,
                spoiler_log,
            });
        }
        bail!("Failed to place items after {} attempts", max_attempts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evermizer_game::CheckType;
    use evermizer_logic::ProgressPair;

    fn vanilla() -> (GameData, LogicGraph) {
        let game_data = GameData::load_vanilla().unwrap();
        let graph = LogicGraph::from_game_data(&game_data).unwrap();
        (game_data, graph)
    }

    #[test]
    fn test_vanilla_placement_is_completable() {
        let (game_data, graph) = vanilla();
        let placement = Placement::vanilla(&game_data);
        let report = validate(
            &graph,
            &placement,
            &WinCondition::goal_check(game_data.goal),
        )
        .unwrap();
        assert!(report.completable);
        assert!(report.fully_explorable);
        assert!(report.unreached.is_empty());
        assert_eq!(report.reached.len(), graph.num_checks());
        assert_eq!(report.counts.get(Progress::Weapon), 11);
        assert_eq!(report.counts.get(Progress::FinalBoss), 1);
    }

    #[test]
    fn test_empty_placement_is_not_completable() {
        let (game_data, graph) = vanilla();
        let report = validate(
            &graph,
            &Placement::new(),
            &WinCondition::goal_check(game_data.goal),
        )
        .unwrap();
        assert!(!report.completable);
        assert!(!report.fully_explorable);
        assert_eq!(report.unmet_goal_checks, vec![game_data.goal]);
        let goal = report
            .unreached
            .iter()
            .find(|x| x.key == game_data.goal)
            .unwrap();
        assert_eq!(goal.name, "Carltron's Robot");
        // Nothing left unreached supplies weapons or the Energy Core, but fueling the rocket
        // would still supply the Rocket.
        assert!(report.blocked.contains(&game_data.goal));
        assert!(report.blocked.contains(&CheckKey::new(CheckType::Rule, 2)));
        assert!(!report.blocked.contains(&CheckKey::new(CheckType::Gourd, 14)));
        assert_eq!(
            goal.missing,
            vec![
                Shortfall {
                    progress: Progress::Rocket,
                    needed: 1,
                    held: 0
                },
                Shortfall {
                    progress: Progress::Weapon,
                    needed: 10,
                    held: 1
                }
            ]
        );
    }

    #[test]
    fn test_large_provisions_saturate() {
        let game_data = GameData::from_json_str(
            r#"{
                "gourds": ["A", "B", "Vault"],
                "gourdDrops": ["Petal", "Nectar", "Honey"],
                "bosses": [], "bossDropNames": [], "bossDrops": [],
                "alchemy": [],
                "goal": {"type": "Gourd", "index": 2},
                "checkTree": [
                    {"type": "Gourd", "index": 0, "provides": [[2000000000, "Weapon"]]},
                    {"type": "Gourd", "index": 1, "provides": [[2000000000, "Weapon"]]},
                    {"type": "Gourd", "index": 2, "requires": [[2147483647, "Weapon"]]}
                ]
            }"#,
        )
        .unwrap();
        let graph = LogicGraph::from_game_data(&game_data).unwrap();
        let report = validate(
            &graph,
            &Placement::new(),
            &WinCondition::goal_check(game_data.goal),
        )
        .unwrap();
        assert_eq!(report.counts.get(Progress::Weapon), Capacity::MAX);
        assert!(report.completable);
    }

    #[test]
    fn test_large_starting_progress_saturates() {
        let (game_data, graph) = vanilla();
        let mut initial_counts = ProgressCounts::new();
        initial_counts.add(ProgressPair::new(Capacity::MAX, Progress::Weapon));
        let report = validate_from(
            &graph,
            &Placement::vanilla(&game_data),
            &WinCondition::goal_check(game_data.goal),
            initial_counts,
        )
        .unwrap();
        assert_eq!(report.counts.get(Progress::Weapon), Capacity::MAX);
        assert!(report.completable);
    }

    #[test]
    fn test_invalid_goal_progress() {
        let (_, graph) = vanilla();
        let bad_pairs = [
            (0, Progress::Weapon),
            (-1, Progress::Rocket),
            (1, Progress::None),
        ];
        for (pieces, progress) in bad_pairs {
            let win_condition = WinCondition {
                checks: vec![],
                progress: vec![ProgressPair::new(pieces, progress)],
            };
            assert_eq!(
                validate(&graph, &Placement::new(), &win_condition).unwrap_err(),
                PlacementError::InvalidGoalProgress { pieces, progress }
            );
        }
    }

    #[test]
    fn test_progress_win_condition() {
        let (_, graph) = vanilla();
        let win_condition = WinCondition {
            checks: vec![],
            progress: vec![ProgressPair::new(3, Progress::Weapon)],
        };
        let mut placement = Placement::new();
        // Two weapons on checks reachable with the starting weapon alone.
        placement.place(
            CheckKey::new(CheckType::Gourd, 0),
            CheckKey::new(CheckType::Boss, 0),
        );
        placement.place(
            CheckKey::new(CheckType::Gourd, 1),
            CheckKey::new(CheckType::Boss, 1),
        );
        let report = validate(&graph, &placement, &win_condition).unwrap();
        assert!(report.completable);
        assert!(report.unmet_goal_progress.is_empty());

        let mut placement = Placement::new();
        placement.place(
            CheckKey::new(CheckType::Gourd, 0),
            CheckKey::new(CheckType::Boss, 0),
        );
        let report = validate(&graph, &placement, &win_condition).unwrap();
        assert!(!report.completable);
        assert_eq!(
            report.unmet_goal_progress,
            vec![Shortfall {
                progress: Progress::Weapon,
                needed: 3,
                held: 2
            }]
        );
    }

    #[test]
    fn test_placement_input_errors() {
        let (game_data, graph) = vanilla();
        let win_condition = WinCondition::goal_check(game_data.goal);
        let gourd = CheckKey::new(CheckType::Gourd, 0);
        let boss_item = CheckKey::new(CheckType::Boss, 0);

        let mut placement = Placement::new();
        placement.place(CheckKey::new(CheckType::Gourd, 99), boss_item);
        assert_eq!(
            validate(&graph, &placement, &win_condition).unwrap_err(),
            PlacementError::UnknownLocation(CheckKey::new(CheckType::Gourd, 99))
        );

        let mut placement = Placement::new();
        placement.place(gourd, CheckKey::new(CheckType::Npc, 0));
        assert_eq!(
            validate(&graph, &placement, &win_condition).unwrap_err(),
            PlacementError::UnknownItem(CheckKey::new(CheckType::Npc, 0))
        );

        let mut placement = Placement::new();
        placement.place(CheckKey::new(CheckType::Rule, 0), boss_item);
        assert_eq!(
            validate(&graph, &placement, &win_condition).unwrap_err(),
            PlacementError::NotALocation(CheckKey::new(CheckType::Rule, 0))
        );

        let mut placement = Placement::new();
        placement.place(gourd, boss_item);
        placement.place(gourd, CheckKey::new(CheckType::Boss, 1));
        assert_eq!(
            validate(&graph, &placement, &win_condition).unwrap_err(),
            PlacementError::LocationAssignedTwice(gourd)
        );

        let mut placement = Placement::new();
        placement.place(gourd, boss_item);
        placement.place(CheckKey::new(CheckType::Gourd, 1), boss_item);
        assert_eq!(
            validate(&graph, &placement, &win_condition).unwrap_err(),
            PlacementError::ItemPlacedTwice(boss_item)
        );

        let bad_goal = WinCondition::goal_check(CheckKey::new(CheckType::Rule, 42));
        assert_eq!(
            validate(&graph, &Placement::new(), &bad_goal).unwrap_err(),
            PlacementError::UnknownGoalCheck(CheckKey::new(CheckType::Rule, 42))
        );
    }

    #[test]
    fn test_validate_is_idempotent() {
        let (game_data, graph) = vanilla();
        let settings = RandomizerSettings::default_for(&game_data);
        let randomization = Randomizer::new(&graph, &settings).randomize(7).unwrap();
        let a = validate(&graph, &randomization.placement, &settings.win_condition).unwrap();
        let b = validate(&graph, &randomization.placement, &settings.win_condition).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_randomize_is_completable_and_deterministic() {
        let (game_data, graph) = vanilla();
        let settings = RandomizerSettings::default_for(&game_data);
        let randomizer = Randomizer::new(&graph, &settings);
        for seed in 0..20 {
            let a = randomizer.randomize(seed).unwrap();
            assert!(a.report.completable);
            assert_eq!(a.placement.items.len(), graph.items.len());
            let b = randomizer.randomize(seed).unwrap();
            assert_eq!(a.placement, b.placement);
        }
    }

    #[test]
    fn test_randomize_with_starting_progress() {
        let (game_data, graph) = vanilla();
        let mut settings = RandomizerSettings::default_for(&game_data);
        settings.item_placement_settings.starting_progress =
            vec![ProgressPair::new(1, Progress::JaguarRing)];
        let randomization = Randomizer::new(&graph, &settings).randomize(3).unwrap();
        assert!(randomization.report.completable);
        assert_eq!(randomization.report.counts.get(Progress::JaguarRing), 2);
    }

    #[test]
    fn test_parallel_validation() {
        let (game_data, graph) = vanilla();
        let win_condition = WinCondition::goal_check(game_data.goal);
        let placement = Placement::vanilla(&game_data);
        let expected = validate(&graph, &placement, &win_condition).unwrap();
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| validate(&graph, &placement, &win_condition).unwrap()))
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), expected);
            }
        });
    }
}
