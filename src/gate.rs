use std::collections::HashMap;

use rand::Rng;
use tracing::warn;

use crate::config::{AnimationWeights, LimitsConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnimationKind {
    /// Stationary; bobbing is left to the renderer.
    Float,
    /// Launched upward, then falls and bounces inside the viewport.
    Physics,
    /// Falls along a fixed angle and leaves through the bottom edge.
    Rain,
}

impl AnimationKind {
    /// Declaration order of the weighted scan.
    pub const ORDER: [AnimationKind; 3] = [
        AnimationKind::Float,
        AnimationKind::Physics,
        AnimationKind::Rain,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnimationKind::Float => "float",
            AnimationKind::Physics => "physics",
            AnimationKind::Rain => "rain",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    RateLimited,
    Spam,
    ComboNotReached,
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnDecision {
    Admit(AnimationKind),
    Reject(Rejection),
}

impl SpawnDecision {
    pub fn is_admit(&self) -> bool {
        matches!(self, SpawnDecision::Admit(_))
    }
}

/// Weights in [`AnimationKind::ORDER`], already normalized so that at least
/// one entry is positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KindWeights([f64; 3]);

impl KindWeights {
    pub fn from_config(weights: &AnimationWeights) -> Self {
        let raw = [weights.float, weights.physics, weights.rain].map(|w| {
            if w.is_finite() && w > 0.0 {
                w
            } else {
                0.0
            }
        });
        if raw.iter().sum::<f64>() <= 0.0 {
            warn!("all animation weights are 0; falling back to float");
            return Self([1.0, 0.0, 0.0]);
        }
        Self(raw)
    }

    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn get(&self, kind: AnimationKind) -> f64 {
        match kind {
            AnimationKind::Float => self.0[0],
            AnimationKind::Physics => self.0[1],
            AnimationKind::Rain => self.0[2],
        }
    }

    /// Cumulative scan: the first kind whose running total exceeds `draw`
    /// wins. `draw` is expected in `[0, total)`.
    pub fn pick(&self, draw: f64) -> AnimationKind {
        let mut accumulated = 0.0;
        let mut last_weighted = AnimationKind::Float;
        for kind in AnimationKind::ORDER {
            let weight = self.get(kind);
            if weight <= 0.0 {
                continue;
            }
            accumulated += weight;
            last_weighted = kind;
            if draw < accumulated {
                return kind;
            }
        }
        // Only reachable through float rounding at the upper bound.
        last_weighted
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> AnimationKind {
        let draw = rng.gen::<f64>() * self.total();
        self.pick(draw)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpawnDecisionState {
    pub last_spawn_ms: Option<u64>,
    pub last_shown_ms: HashMap<String, u64>,
    pub combo_name: Option<String>,
    pub combo_count: u32,
}

/// Admission rules for candidates: rate limit, spam window, combo and
/// duplicate suppression, checked in that order.
#[derive(Debug, Clone)]
pub struct SpawnGate {
    limits: LimitsConfig,
    weights: KindWeights,
    state: SpawnDecisionState,
}

impl SpawnGate {
    pub fn new(limits: LimitsConfig, weights: &AnimationWeights) -> Self {
        Self {
            limits,
            weights: KindWeights::from_config(weights),
            state: SpawnDecisionState::default(),
        }
    }

    pub fn state(&self) -> &SpawnDecisionState {
        &self.state
    }

    pub fn weights(&self) -> KindWeights {
        self.weights
    }

    pub fn evaluate<R: Rng + ?Sized>(
        &mut self,
        name: &str,
        now_ms: u64,
        rng: &mut R,
    ) -> SpawnDecision {
        if self.limits.max_per_second > 0 {
            let min_gap_ms = 1_000.0 / f64::from(self.limits.max_per_second);
            if let Some(last) = self.state.last_spawn_ms {
                if (now_ms.saturating_sub(last) as f64) < min_gap_ms {
                    return SpawnDecision::Reject(Rejection::RateLimited);
                }
            }
        }

        if self.limits.spam_filter_enabled {
            if let Some(last) = self.state.last_shown_ms.get(name) {
                if now_ms.saturating_sub(*last) < self.limits.spam_filter_ms {
                    return SpawnDecision::Reject(Rejection::Spam);
                }
            }
        }

        let previous = self.state.combo_name.replace(name.to_owned());
        let repeated = previous.as_deref() == Some(name);

        if self.limits.combo_requirement > 0 {
            if repeated {
                self.state.combo_count = self.state.combo_count.saturating_add(1);
            } else {
                self.state.combo_count = 1;
            }
            if self.state.combo_count < self.limits.combo_requirement {
                return SpawnDecision::Reject(Rejection::ComboNotReached);
            }
        }

        // With combos on, the tracked name has already been set to `name`.
        let duplicate = if self.limits.combo_requirement > 0 {
            self.state.combo_name.as_deref() == Some(name)
        } else {
            repeated
        };
        if self.limits.ignore_duplicates && duplicate {
            return SpawnDecision::Reject(Rejection::Duplicate);
        }

        self.state.last_spawn_ms = Some(now_ms);
        self.state.last_shown_ms.insert(name.to_owned(), now_ms);
        SpawnDecision::Admit(self.weights.sample(rng))
    }
}
