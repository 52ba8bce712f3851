// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tile ownership state machine.
//!
//! Each tile touched by a run moves through:
//! - unclaimed: taken by the runner at strength 1
//! - owned by the runner: strength + 1, no history
//! - owned by a rival at strength > 1: strength - 1, no history
//! - owned by a rival at strength 1: taken by the runner at strength 1
//!
//! Everything here is pure. Storage backends read the current rows under
//! their own locks, build a [`ConquestPlan`] and write it back atomically.

use crate::models::{FlipEvent, Territory, TerritoryHistory, TileClaim, TileOutcome, TileTransition};
use std::collections::{BTreeMap, HashMap};

/// New state of one tile after a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TileResolution {
    pub territory: Territory,
    /// Set only when the owner changes
    pub history: Option<TerritoryHistory>,
    pub outcome: TileOutcome,
}

/// Apply one run's effect to one tile.
pub fn resolve_tile(
    current: Option<&Territory>,
    claim: &TileClaim,
    user_id: &str,
    run_id: &str,
    now: &str,
) -> TileResolution {
    let take = |from_owner: Option<String>, transition: TileTransition| {
        let territory = Territory {
            tile_id: claim.tile_id.clone(),
            owner_id: user_id.to_string(),
            strength: 1,
            last_claimed_at: now.to_string(),
            geometry: claim.geometry.clone(),
        };
        let history = TerritoryHistory {
            tile_id: claim.tile_id.clone(),
            from_owner: from_owner.clone(),
            to_owner: user_id.to_string(),
            run_id: run_id.to_string(),
            changed_at: now.to_string(),
        };
        let outcome = TileOutcome {
            tile_id: claim.tile_id.clone(),
            owner_id: user_id.to_string(),
            strength: 1,
            flipped: from_owner.is_some(),
            previous_owner: from_owner,
            transition,
        };
        TileResolution {
            territory,
            history: Some(history),
            outcome,
        }
    };

    let Some(current) = current else {
        return take(None, TileTransition::Claimed);
    };

    if current.owner_id == user_id {
        let territory = Territory {
            strength: current.strength.saturating_add(1),
            last_claimed_at: now.to_string(),
            ..current.clone()
        };
        return unchanged_owner(territory, TileTransition::Reinforced);
    }

    // Rival tile: one incursion removes one point of strength
    let remaining = current.strength.saturating_sub(1);
    if remaining == 0 {
        return take(Some(current.owner_id.clone()), TileTransition::Flipped);
    }

    let territory = Territory {
        strength: remaining,
        last_claimed_at: now.to_string(),
        ..current.clone()
    };
    unchanged_owner(territory, TileTransition::Contested)
}

fn unchanged_owner(territory: Territory, transition: TileTransition) -> TileResolution {
    let outcome = TileOutcome {
        tile_id: territory.tile_id.clone(),
        owner_id: territory.owner_id.clone(),
        strength: territory.strength,
        previous_owner: Some(territory.owner_id.clone()),
        transition,
        flipped: false,
    };
    TileResolution {
        territory,
        history: None,
        outcome,
    }
}

/// Every write one run makes to territory state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConquestPlan {
    /// Post-run rows for every touched tile
    pub territories: Vec<Territory>,
    /// Ownership changes, one per claimed or flipped tile
    pub history: Vec<TerritoryHistory>,
    pub outcomes: Vec<TileOutcome>,
    /// Tiles taken from another user
    pub flips: Vec<FlipEvent>,
    /// Tiles the runner now owns that they did not own before
    pub gained: u32,
    /// Tiles lost, per previous owner
    pub losses: BTreeMap<String, u32>,
}

impl ConquestPlan {
    /// Resolve every claimed tile against the rows read from storage.
    ///
    /// `existing` is keyed by tile id; missing entries are unclaimed tiles.
    pub fn build(
        claims: &[TileClaim],
        existing: &HashMap<String, Territory>,
        user_id: &str,
        run_id: &str,
        now: &str,
    ) -> Self {
        let mut plan = Self::default();

        for claim in claims {
            let resolution = resolve_tile(existing.get(&claim.tile_id), claim, user_id, run_id, now);

            match resolution.outcome.transition {
                TileTransition::Claimed => plan.gained += 1,
                TileTransition::Flipped => {
                    plan.gained += 1;
                    if let Some(prev) = &resolution.outcome.previous_owner {
                        *plan.losses.entry(prev.clone()).or_insert(0) += 1;
                        plan.flips.push(FlipEvent {
                            tile_id: claim.tile_id.clone(),
                            new_owner: user_id.to_string(),
                            previous_owner: prev.clone(),
                        });
                    }
                }
                TileTransition::Reinforced | TileTransition::Contested => {}
            }

            plan.territories.push(resolution.territory);
            plan.history.extend(resolution.history);
            plan.outcomes.push(resolution.outcome);
        }

        tracing::debug!(
            user_id,
            run_id,
            tiles = plan.territories.len(),
            gained = plan.gained,
            flips = plan.flips.len(),
            "Conquest plan built"
        );

        plan
    }

    /// Users other than the runner whose territory count this run reduces.
    pub fn losers(&self) -> impl Iterator<Item = &str> {
        self.losses.keys().map(String::as_str)
    }

    /// Tiles `user_id` lost in this run.
    pub fn lost_by(&self, user_id: &str) -> u32 {
        self.losses.get(user_id).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: &str = "2026-05-01T12:00:00Z";

    fn claim(tile_id: &str) -> TileClaim {
        TileClaim {
            tile_id: tile_id.to_string(),
            geometry: format!("{{\"tile\":\"{}\"}}", tile_id),
        }
    }

    fn owned(tile_id: &str, owner: &str, strength: u32) -> Territory {
        Territory {
            tile_id: tile_id.to_string(),
            owner_id: owner.to_string(),
            strength,
            last_claimed_at: "2026-04-01T00:00:00Z".to_string(),
            geometry: "stored".to_string(),
        }
    }

    #[test]
    fn test_unclaimed_tile_is_claimed() {
        let r = resolve_tile(None, &claim("9q9hvu7"), "bob", "run1", NOW);
        assert_eq!(r.territory.owner_id, "bob");
        assert_eq!(r.territory.strength, 1);
        assert_eq!(r.territory.geometry, claim("9q9hvu7").geometry);
        assert_eq!(r.outcome.transition, TileTransition::Claimed);
        assert!(!r.outcome.flipped);

        let history = r.history.unwrap();
        assert_eq!(history.from_owner, None);
        assert_eq!(history.to_owner, "bob");
        assert_eq!(history.document_id(), "run1_9q9hvu7");
    }

    #[test]
    fn test_strength_one_flips() {
        let current = owned("9q9hvu7", "alice", 1);
        let r = resolve_tile(Some(&current), &claim("9q9hvu7"), "bob", "run1", NOW);

        assert_eq!(r.territory.owner_id, "bob");
        assert_eq!(r.territory.strength, 1);
        assert_eq!(r.outcome.transition, TileTransition::Flipped);
        assert!(r.outcome.flipped);
        assert_eq!(r.outcome.previous_owner.as_deref(), Some("alice"));

        let history = r.history.unwrap();
        assert_eq!(history.from_owner.as_deref(), Some("alice"));
        assert_eq!(history.to_owner, "bob");
    }

    #[test]
    fn test_strength_three_erodes_without_history() {
        let current = owned("9q9hvu7", "alice", 3);
        let r = resolve_tile(Some(&current), &claim("9q9hvu7"), "bob", "run1", NOW);

        assert_eq!(r.territory.owner_id, "alice");
        assert_eq!(r.territory.strength, 2);
        assert_eq!(r.territory.geometry, "stored");
        assert_eq!(r.territory.last_claimed_at, NOW);
        assert_eq!(r.outcome.transition, TileTransition::Contested);
        assert!(r.history.is_none());
    }

    #[test]
    fn test_zero_strength_row_flips() {
        // Not produced by this engine, but must never underflow
        let current = owned("9q9hvu7", "alice", 0);
        let r = resolve_tile(Some(&current), &claim("9q9hvu7"), "bob", "run1", NOW);
        assert_eq!(r.outcome.transition, TileTransition::Flipped);
        assert_eq!(r.territory.strength, 1);
    }

    #[test]
    fn test_own_tile_is_reinforced() {
        let current = owned("9q9hvu7", "alice", 4);
        let r = resolve_tile(Some(&current), &claim("9q9hvu7"), "alice", "run1", NOW);
        assert_eq!(r.territory.owner_id, "alice");
        assert_eq!(r.territory.strength, 5);
        assert_eq!(r.outcome.transition, TileTransition::Reinforced);
        assert!(r.history.is_none());
    }

    #[test]
    fn test_plan_counts_gains_and_losses() {
        let existing: HashMap<String, Territory> = [
            owned("aaaaaaa", "alice", 1),
            owned("bbbbbbb", "alice", 2),
            owned("ccccccc", "carol", 1),
            owned("ddddddd", "bob", 7),
        ]
        .into_iter()
        .map(|t| (t.tile_id.clone(), t))
        .collect();

        let claims: Vec<TileClaim> = ["aaaaaaa", "bbbbbbb", "ccccccc", "ddddddd", "eeeeeee"]
            .into_iter()
            .map(claim)
            .collect();

        let plan = ConquestPlan::build(&claims, &existing, "bob", "run1", NOW);

        assert_eq!(plan.territories.len(), 5);
        assert_eq!(plan.outcomes.len(), 5);
        // aaaaaaa and ccccccc flipped, eeeeeee claimed
        assert_eq!(plan.gained, 3);
        assert_eq!(plan.history.len(), 3);
        assert_eq!(plan.flips.len(), 2);
        assert_eq!(plan.lost_by("alice"), 1);
        assert_eq!(plan.lost_by("carol"), 1);
        assert_eq!(plan.lost_by("bob"), 0);
        assert_eq!(plan.losers().collect::<Vec<_>>(), vec!["alice", "carol"]);

        let reinforced = plan
            .territories
            .iter()
            .find(|t| t.tile_id == "ddddddd")
            .unwrap();
        assert_eq!(reinforced.strength, 8);
    }
}
