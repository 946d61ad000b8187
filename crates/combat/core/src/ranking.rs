//! Target ranking strategies for rotations.
//!
//! A [`TargetRanking`] orders observed combatants by how urgently they need
//! attention; rotations fan their per-target variants out over the top of
//! the ranking.

/// Snapshot of one combatant as observed from the combat log.
#[derive(Debug, Clone, Default)]
pub struct Combatant {
    pub name: String,
    pub alive: bool,
    /// Hitpoint damage taken over the observation window.
    pub recent_damage: f64,
    /// Warding and healing received over the observation window.
    pub recent_wards: f64,
}

impl Combatant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alive: true,
            recent_damage: 0.0,
            recent_wards: 0.0,
        }
    }

    pub fn damaged(mut self, damage: f64) -> Self {
        self.recent_damage = damage;
        self
    }

    pub fn warded(mut self, wards: f64) -> Self {
        self.recent_wards = wards;
        self
    }
}

/// Orders combatants best-target-first, capped at the strategy's width.
pub trait TargetRanking: Send + Sync {
    fn rank(&self, combatants: &[Combatant]) -> Vec<String>;
}

fn top_by_score(
    combatants: &[Combatant],
    max_targets: usize,
    score: impl Fn(&Combatant) -> f64,
) -> Vec<String> {
    let mut scored: Vec<(f64, &Combatant)> = combatants
        .iter()
        .filter(|c| c.alive && c.recent_damage > 0.0)
        .map(|c| (score(c), c))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored
        .into_iter()
        .take(max_targets)
        .map(|(_, c)| c.name.clone())
        .collect()
}

/// Whoever took the most hitpoint damage comes first.
pub struct RankingByIncomingDamage {
    pub max_targets: usize,
}

impl TargetRanking for RankingByIncomingDamage {
    fn rank(&self, combatants: &[Combatant]) -> Vec<String> {
        top_by_score(combatants, self.max_targets, |c| c.recent_damage)
    }
}

/// Damage taken weighed against warding already received; a combatant that
/// is both hurt and unprotected ranks highest.
pub struct RankingByHealNeed {
    pub max_targets: usize,
}

impl TargetRanking for RankingByHealNeed {
    fn rank(&self, combatants: &[Combatant]) -> Vec<String> {
        top_by_score(combatants, self.max_targets, |c| {
            (c.recent_damage + 1.0) / (c.recent_wards + 1.0)
        })
    }
}
