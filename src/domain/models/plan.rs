//! Investigation plan model.
//!
//! A plan is an ordered list of steps addressed to named agents. The
//! dependency graph induced by `depends_on` must be a DAG, and every
//! dependency name must be introduced by an earlier step.

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};

/// One step of an investigation plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Name of the agent executing this step.
    pub agent: String,
    /// Action to request from the agent.
    pub action: String,
    /// Action parameters.
    #[serde(default)]
    pub parameters: serde_json::Value,
    /// Agent names this step depends on (must appear in earlier steps).
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl PlanStep {
    pub fn new(agent: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            action: action.into(),
            parameters: serde_json::Value::Null,
            depends_on: Vec::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_dependencies(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }
}

/// Quality thresholds an investigation should meet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityCriteria {
    pub min_confidence: f64,
    pub min_findings: usize,
    pub min_sources: usize,
}

impl Default for QualityCriteria {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            min_findings: 1,
            min_sources: 1,
        }
    }
}

/// Plan for conducting an investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationPlan {
    /// Investigation objective (human-readable).
    pub objective: String,
    /// Ordered investigation steps.
    pub steps: Vec<PlanStep>,
    /// Distinct agents appearing in `steps`.
    pub required_agents: Vec<String>,
    /// Estimated execution time in seconds.
    pub estimated_time_seconds: u64,
    /// Quality criteria for the run.
    pub quality_criteria: QualityCriteria,
    /// Human-readable fallback strategies.
    #[serde(default)]
    pub fallback_strategies: Vec<String>,
}

impl InvestigationPlan {
    /// Validate the plan invariants.
    ///
    /// Every name in `depends_on` must be introduced by an earlier step,
    /// which also guarantees the induced graph is acyclic. `required_agents`
    /// must equal the distinct set of step agents.
    pub fn validate(&self) -> DomainResult<()> {
        let mut introduced: Vec<&str> = Vec::new();
        for step in &self.steps {
            for dep in &step.depends_on {
                if !introduced.contains(&dep.as_str()) {
                    return Err(DomainError::InternalInvariant(format!(
                        "step '{}' depends on '{}' which no earlier step introduces",
                        step.agent, dep
                    )));
                }
            }
            if !introduced.contains(&step.agent.as_str()) {
                introduced.push(&step.agent);
            }
        }

        for agent in &self.required_agents {
            if !introduced.contains(&agent.as_str()) {
                return Err(DomainError::InternalInvariant(format!(
                    "required agent '{agent}' has no step"
                )));
            }
        }
        for agent in &introduced {
            if !self.required_agents.iter().any(|a| a == agent) {
                return Err(DomainError::InternalInvariant(format!(
                    "step agent '{agent}' missing from required_agents"
                )));
            }
        }
        Ok(())
    }

    /// Group steps into an ordered sequence of mutually independent groups.
    ///
    /// Iterates steps in order; a step joins the current group iff none of
    /// its `depends_on` names have appeared in that group and its own agent
    /// has not appeared in that group. Otherwise a new group starts (and the
    /// seen-set resets to the new step's agent). Yields a topologically
    /// valid sequence where within-group steps can run concurrently.
    pub fn parallel_groups(&self) -> Vec<Vec<PlanStep>> {
        let mut groups: Vec<Vec<PlanStep>> = Vec::new();
        let mut current: Vec<PlanStep> = Vec::new();
        let mut seen_agents: Vec<String> = Vec::new();

        for step in &self.steps {
            let depends_on_current = step
                .depends_on
                .iter()
                .any(|dep| seen_agents.iter().any(|a| a == dep));

            if depends_on_current || seen_agents.iter().any(|a| a == &step.agent) {
                if !current.is_empty() {
                    groups.push(std::mem::take(&mut current));
                }
                seen_agents = vec![step.agent.clone()];
                current.push(step.clone());
            } else {
                seen_agents.push(step.agent.clone());
                current.push(step.clone());
            }
        }

        if !current.is_empty() {
            groups.push(current);
        }

        groups
    }

    /// Append new steps, keeping `required_agents` deduplicated.
    pub fn merge_steps(&mut self, new_steps: Vec<PlanStep>) {
        for step in new_steps {
            if !self.required_agents.iter().any(|a| a == &step.agent) {
                self.required_agents.push(step.agent.clone());
            }
            self.steps.push(step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_with(steps: Vec<PlanStep>) -> InvestigationPlan {
        let mut required: Vec<String> = Vec::new();
        for step in &steps {
            if !required.contains(&step.agent) {
                required.push(step.agent.clone());
            }
        }
        InvestigationPlan {
            objective: "test".to_string(),
            steps,
            required_agents: required,
            estimated_time_seconds: 30,
            quality_criteria: QualityCriteria::default(),
            fallback_strategies: vec![],
        }
    }

    #[test]
    fn test_validate_accepts_forward_dependencies() {
        let plan = plan_with(vec![
            PlanStep::new("anomaly_detector", "detect_anomalies"),
            PlanStep::new("pattern_analyst", "analyze_patterns")
                .with_dependencies(vec!["anomaly_detector".to_string()]),
        ]);
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_dependency() {
        let plan = plan_with(vec![PlanStep::new("pattern_analyst", "analyze_patterns")
            .with_dependencies(vec!["anomaly_detector".to_string()])]);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_forward_reference() {
        // Dependency on an agent that only appears later is a cycle seed.
        let plan = plan_with(vec![
            PlanStep::new("pattern_analyst", "analyze_patterns")
                .with_dependencies(vec!["anomaly_detector".to_string()]),
            PlanStep::new("anomaly_detector", "detect_anomalies"),
        ]);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_validate_required_agents_mismatch() {
        let mut plan = plan_with(vec![PlanStep::new("anomaly_detector", "detect_anomalies")]);
        plan.required_agents.push("ghost".to_string());
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_parallel_groups_independent_steps_share_group() {
        let plan = plan_with(vec![
            PlanStep::new("anomaly_detector", "detect_anomalies"),
            PlanStep::new("regional_analyst", "analyze_regions"),
        ]);
        let groups = plan.parallel_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn test_parallel_groups_dependency_splits() {
        let plan = plan_with(vec![
            PlanStep::new("anomaly_detector", "detect_anomalies"),
            PlanStep::new("pattern_analyst", "analyze_patterns")
                .with_dependencies(vec!["anomaly_detector".to_string()]),
        ]);
        let groups = plan.parallel_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0][0].agent, "anomaly_detector");
        assert_eq!(groups[1][0].agent, "pattern_analyst");
    }

    #[test]
    fn test_parallel_groups_repeated_agent_splits() {
        let plan = plan_with(vec![
            PlanStep::new("anomaly_detector", "detect_anomalies"),
            PlanStep::new("anomaly_detector", "detect_anomalies"),
        ]);
        let groups = plan.parallel_groups();
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_parallel_groups_no_shared_agent_within_group() {
        let plan = plan_with(vec![
            PlanStep::new("a", "x"),
            PlanStep::new("b", "x"),
            PlanStep::new("c", "x").with_dependencies(vec!["a".to_string()]),
            PlanStep::new("d", "x"),
        ]);
        for group in plan.parallel_groups() {
            let mut agents: Vec<&str> = group.iter().map(|s| s.agent.as_str()).collect();
            let before = agents.len();
            agents.dedup();
            assert_eq!(before, agents.len());
            // No step may depend on a name from earlier in the same group.
            for (i, step) in group.iter().enumerate() {
                for dep in &step.depends_on {
                    assert!(!group[..i].iter().any(|s| &s.agent == dep));
                }
            }
        }
    }

    #[test]
    fn test_merge_steps_dedups_required_agents() {
        let mut plan = plan_with(vec![PlanStep::new("anomaly_detector", "detect_anomalies")]);
        plan.merge_steps(vec![
            PlanStep::new("anomaly_detector", "detect_anomalies"),
            PlanStep::new("regional_analyst", "analyze_regions"),
        ]);
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(
            plan.required_agents,
            vec!["anomaly_detector".to_string(), "regional_analyst".to_string()]
        );
    }
}
