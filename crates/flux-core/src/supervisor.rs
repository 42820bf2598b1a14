//! The closed loop: process → route → transform → integrate → learn.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::capsule::Capsule;
use crate::config::PipelineConfig;
use crate::experience::{ConsistencyTracker, ExperienceTracker};
use crate::orchestrator::{Orchestrator, OrchestratorSnapshot};
use crate::router::Router;
use crate::state::State;
use crate::tokenizer::Hints;

/// Everything needed to resume a pipeline in another process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    pub orchestrator: OrchestratorSnapshot,
    #[serde(default)]
    pub bias_vector: f64,
}

#[derive(Clone, Debug)]
pub struct StepOutcome {
    /// Capsule as emitted by the orchestrator, before any agent ran.
    pub raw: Capsule,
    /// Capsule after the selected agent, as integrated.
    pub capsule: Capsule,
    /// `None` only when the supervisor has no agents.
    pub agent: Option<Agent>,
    pub scores: Vec<(Agent, f64)>,
    pub state: State,
}

pub struct Supervisor {
    orchestrator: Orchestrator,
    router: Router,
    agents: Vec<Agent>,
    tracker: Option<Box<dyn ExperienceTracker>>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl Supervisor {
    /// All built-in agents and a [`ConsistencyTracker`].
    pub fn new(config: PipelineConfig) -> Self {
        let router = Router::new(config.route_history);
        Self {
            orchestrator: Orchestrator::new(config),
            router,
            agents: Agent::ALL.to_vec(),
            tracker: Some(Box::new(ConsistencyTracker::new())),
        }
    }

    /// Agents are scored in this order; ties go to the earlier one.
    pub fn with_agents(mut self, agents: Vec<Agent>) -> Self {
        self.agents = agents;
        self
    }

    pub fn with_tracker(mut self, tracker: Box<dyn ExperienceTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn without_tracker(mut self) -> Self {
        self.tracker = None;
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Current consistency bias, 0 without a tracker.
    pub fn bias(&self, capsule: &Capsule) -> f64 {
        self.tracker.as_ref().map_or(0.0, |t| t.bias(capsule))
    }

    pub fn step<S: AsRef<str>>(
        &mut self,
        tokens: &[S],
        hints: Option<&Hints>,
        rng: &mut impl Rng,
    ) -> StepOutcome {
        let raw = self.orchestrator.process_with_hints(tokens, hints, rng);

        let bias = self.tracker.as_ref().map(|t| t.bias(&raw));
        let scores = self.router.score_all(&raw, &self.agents, bias);
        let agent = Router::select(&scores);

        let capsule = match agent {
            Some(agent) => {
                let score = scores
                    .iter()
                    .find(|(a, _)| *a == agent)
                    .map_or(0.0, |(_, s)| *s);
                self.router.record(agent, score, raw.state);
                let mut out = agent.transform(&raw);
                out.agent_trace.push(agent.name().to_string());
                out
            }
            None => raw.clone(),
        };

        let state = self.orchestrator.integrate(&capsule);
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.update(&capsule, state);
        }

        StepOutcome {
            raw,
            capsule,
            agent,
            scores,
            state,
        }
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            orchestrator: self.orchestrator.snapshot(),
            bias_vector: self.tracker.as_ref().map_or(0.0, |t| t.bias_vector()),
        }
    }

    /// Rebuild from a snapshot with the built-in agents and a consistency tracker.
    pub fn restore(config: PipelineConfig, snapshot: &PipelineSnapshot) -> Self {
        let router = Router::new(config.route_history);
        let mut tracker = ConsistencyTracker::new();
        tracker.set_bias_vector(snapshot.bias_vector);
        Self {
            orchestrator: Orchestrator::restore(config, &snapshot.orchestrator),
            router,
            agents: Agent::ALL.to_vec(),
            tracker: Some(Box::new(tracker)),
        }
    }
}
