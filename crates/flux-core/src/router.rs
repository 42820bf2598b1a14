//! Agent selection.
//!
//! Each agent is scored against the current capsule: how close its preferred
//! state is to the capsule's state, plus banded compatibility terms for
//! curvature, entropy, density, energy and ψ, plus bonuses from its static
//! signatures. An optional consistency bias nudges the score by at most ±10%.
//! Selection is a deterministic argmax with first-seen tie-break.

use serde::Serialize;

use crate::agent::Agent;
use crate::capsule::Capsule;
use crate::constants::{
    BIAS_NUDGE, PHI, ROUTE_AMPLITUDE_BONUS, ROUTE_CURVATURE_WEIGHT, ROUTE_DENSITY_WEIGHT,
    ROUTE_ENERGY_WEIGHT, ROUTE_ENTROPY_WEIGHT, ROUTE_HISTORY, ROUTE_PSI_WEIGHT,
    ROUTE_RANGE_BONUS, ROUTE_STATE_WEIGHT, SQRT2,
};
use crate::history::History;
use crate::state::State;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteRecord {
    pub agent: Agent,
    pub score: f64,
    pub state: State,
}

#[derive(Clone, Debug)]
pub struct Router {
    history: History<RouteRecord>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(ROUTE_HISTORY)
    }
}

/// 1.0 for the favoured agent, `other` for everyone else.
fn favour(agent: Agent, favoured: Agent, other: f64) -> f64 {
    if agent == favoured { 1.0 } else { other }
}

fn curvature_term(curvature: f64, agent: Agent) -> f64 {
    if curvature < SQRT2 {
        favour(agent, Agent::Collapse, 0.3)
    } else if curvature < std::f64::consts::PI / PHI {
        favour(agent, Agent::Expand, 0.5)
    } else {
        favour(agent, Agent::Shape, 0.3)
    }
}

fn entropy_term(entropy: f64, agent: Agent) -> f64 {
    if entropy > 1.5 {
        favour(agent, Agent::Expand, 0.3)
    } else if entropy > 0.8 {
        favour(agent, Agent::Shape, 0.5)
    } else {
        favour(agent, Agent::Collapse, 0.3)
    }
}

fn density_term(density: f64, agent: Agent) -> f64 {
    if density > 0.5 {
        favour(agent, Agent::Shape, 0.4)
    } else if density < 0.2 {
        favour(agent, Agent::Collapse, 0.4)
    } else {
        favour(agent, Agent::Expand, 0.5)
    }
}

/// Above φ² the capsule is ready to collapse.
fn energy_term(energy: f64, agent: Agent) -> f64 {
    if energy > PHI * PHI {
        if agent == Agent::Collapse { 1.5 } else { 0.2 }
    } else {
        0.5
    }
}

fn psi_term(psi: f64, agent: Agent) -> f64 {
    if psi < 0.6 {
        favour(agent, Agent::Expand, 0.3)
    } else if (0.8..=1.2).contains(&psi) {
        favour(agent, Agent::Shape, 0.5)
    } else {
        favour(agent, Agent::Collapse, 0.3)
    }
}

impl Router {
    pub fn new(history: usize) -> Self {
        Self {
            history: History::new(history),
        }
    }

    /// Score one agent. `bias` comes from an experience tracker, roughly in [-1, 1].
    pub fn score(&self, capsule: &Capsule, agent: Agent, bias: Option<f64>) -> f64 {
        let flux = agent.flux_signature();
        let entropy_sig = agent.entropy_signature();

        let similarity = 1.0 - capsule.state.distance(flux.preferred_state) as f64 / 3.0;

        let mut score = ROUTE_STATE_WEIGHT * similarity
            + ROUTE_CURVATURE_WEIGHT * curvature_term(capsule.curvature, agent)
            + ROUTE_ENTROPY_WEIGHT * entropy_term(capsule.entropy, agent)
            + ROUTE_DENSITY_WEIGHT * density_term(capsule.density, agent)
            + ROUTE_ENERGY_WEIGHT * energy_term(capsule.energy, agent)
            + ROUTE_PSI_WEIGHT * psi_term(capsule.psi, agent);

        score += flux.amplitude.abs() * ROUTE_AMPLITUDE_BONUS;
        if entropy_sig.contains(capsule.entropy) {
            score += ROUTE_RANGE_BONUS;
        }

        if let Some(bias) = bias {
            let nudge = bias.clamp(-1.0, 1.0) * entropy_sig.tendency.alignment();
            score *= 1.0 + BIAS_NUDGE * nudge;
        }
        score
    }

    /// Scores in the order the agents were supplied.
    pub fn score_all(
        &self,
        capsule: &Capsule,
        agents: &[Agent],
        bias: Option<f64>,
    ) -> Vec<(Agent, f64)> {
        agents
            .iter()
            .map(|&agent| (agent, self.score(capsule, agent, bias)))
            .collect()
    }

    /// Highest score wins; on a tie the earliest entry wins. `None` if empty.
    pub fn select(scores: &[(Agent, f64)]) -> Option<Agent> {
        let mut best: Option<(Agent, f64)> = None;
        for &(agent, score) in scores {
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((agent, score)),
            }
        }
        best.map(|(agent, _)| agent)
    }

    pub fn record(&mut self, agent: Agent, score: f64, state: State) {
        tracing::debug!(agent = agent.name(), score, state = state.as_str(), "routed");
        self.history.push(RouteRecord {
            agent,
            score,
            state,
        });
    }

    pub fn history(&self) -> &History<RouteRecord> {
        &self.history
    }
}
