use evermizer_game::{Capacity, CheckKey, ItemIdx, Progress};
use evermizer_logic::{ProgressCounts, ProgressPair};
use serde::{Deserialize, Serialize};
use strum::VariantNames;

use crate::traverse::Traverser;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoilerCheck {
    pub key: CheckKey,
    pub name: String,
    pub item: Option<String>,
    pub provides: Vec<ProgressPair>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoilerCount {
    pub progress: String,
    pub pieces: Capacity,
}

/// Checks first reached in one productive pass of the solver, sorted by key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoilerSphere {
    pub step: usize,
    pub checks: Vec<SpoilerCheck>,
    pub counts: Vec<SpoilerCount>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoilerLog {
    pub spheres: Vec<SpoilerSphere>,
}

fn get_spoiler_counts(counts: &ProgressCounts) -> Vec<SpoilerCount> {
    Progress::all()
        .filter(|&p| counts.get(p) != 0)
        .map(|p| SpoilerCount {
            progress: Progress::VARIANTS[p as usize].to_string(),
            pieces: counts.get(p),
        })
        .collect()
}

/// Builds the sphere listing from a settled traversal. `item_by_check` gives the item
/// placed at each check, as returned by `resolve_placement`.
pub fn get_spoiler_log(tr: &Traverser, item_by_check: &[Option<ItemIdx>]) -> SpoilerLog {
    let graph = tr.graph();
    let mut spheres: Vec<SpoilerSphere> = vec![];
    for step in &tr.past_steps {
        let mut checks: Vec<SpoilerCheck> = step
            .reached
            .iter()
            .map(|&idx| {
                let check = &graph.checks[idx];
                let item = item_by_check[idx].map(|i| &graph.items[i]);
                let mut provides = check.provides.clone();
                if let Some(item) = item {
                    provides.extend_from_slice(&item.provides);
                }
                SpoilerCheck {
                    key: check.key,
                    name: check.name.clone(),
                    item: item.map(|x| x.name.clone()),
                    provides,
                }
            })
            .collect();
        checks.sort_by_key(|x| x.key);
        spheres.push(SpoilerSphere {
            step: step.step_num,
            checks,
            counts: get_spoiler_counts(&step.counts),
        });
    }
    SpoilerLog { spheres }
}
