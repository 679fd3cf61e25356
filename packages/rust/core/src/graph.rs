//! Stage dependency graph.
//!
//! Stages are registered one at a time and may only depend on stages that
//! are already registered, so a graph built through [`StageGraph::add_stage`]
//! is acyclic by construction. [`StageGraph::validate`] still runs a full
//! topological check before execution.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use eascope_shared::{EascopeError, Result, StageConfig};

/// One registered stage: its id, what it reads, and what it writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub id: String,
    /// Ids of stages whose artifacts this stage consumes, in declared order.
    pub dependencies: Vec<String>,
    /// Key the stage's output is stored under.
    pub artifact_key: String,
}

impl StageSpec {
    pub fn new(
        id: impl Into<String>,
        artifact_key: impl Into<String>,
        dependencies: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: id.into(),
            artifact_key: artifact_key.into(),
            dependencies: dependencies.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<&StageConfig> for StageSpec {
    fn from(config: &StageConfig) -> Self {
        Self::new(&config.id, &config.artifact_key, &config.depends_on)
    }
}

/// Registered stages in declaration order.
#[derive(Debug, Clone, Default)]
pub struct StageGraph {
    stages: Vec<StageSpec>,
    index: HashMap<String, usize>,
    artifact_keys: HashSet<String>,
}

impl StageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from stage config entries, in order.
    pub fn from_config(stages: &[StageConfig]) -> Result<Self> {
        let mut graph = Self::new();
        for stage in stages {
            graph.add_stage(StageSpec::from(stage))?;
        }
        Ok(graph)
    }

    /// Register a stage.
    ///
    /// Fails if the id or artifact key is taken, or if a dependency is not
    /// registered yet (which includes a stage naming itself).
    pub fn add_stage(&mut self, spec: StageSpec) -> Result<()> {
        if self.index.contains_key(&spec.id) {
            return Err(EascopeError::DuplicateStage {
                what: "stage id",
                name: spec.id,
            });
        }
        if self.artifact_keys.contains(&spec.artifact_key) {
            return Err(EascopeError::DuplicateStage {
                what: "artifact key",
                name: spec.artifact_key,
            });
        }
        if let Some(missing) = spec
            .dependencies
            .iter()
            .find(|dep| !self.index.contains_key(*dep))
        {
            return Err(EascopeError::UnknownDependency {
                stage: spec.id.clone(),
                dependency: missing.clone(),
            });
        }

        debug!(stage = %spec.id, deps = ?spec.dependencies, "stage registered");
        self.insert(spec);
        Ok(())
    }

    fn insert(&mut self, spec: StageSpec) {
        self.index.insert(spec.id.clone(), self.stages.len());
        self.artifact_keys.insert(spec.artifact_key.clone());
        self.stages.push(spec);
    }

    /// Check that every stage can be ordered.
    pub fn validate(&self) -> Result<()> {
        self.topological_order().map(|_| ())
    }

    /// Stage ids with every dependency ahead of its dependents.
    ///
    /// Kahn's algorithm; among stages that are ready at the same time, the
    /// one declared first goes first, so the order is deterministic.
    pub fn topological_order(&self) -> Result<Vec<&str>> {
        let mut pending: Vec<usize> = self
            .stages
            .iter()
            .map(|s| s.dependencies.iter().collect::<HashSet<_>>().len())
            .collect();

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.stages.len()];
        for (i, stage) in self.stages.iter().enumerate() {
            let deps: HashSet<&String> = stage.dependencies.iter().collect();
            for dep in deps {
                if let Some(&d) = self.index.get(dep) {
                    dependents[d].push(i);
                }
            }
        }

        let mut ready: BTreeSet<usize> = pending
            .iter()
            .enumerate()
            .filter(|(_, n)| **n == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.stages.len());
        while let Some(next) = ready.pop_first() {
            order.push(self.stages[next].id.as_str());
            for &child in &dependents[next] {
                pending[child] -= 1;
                if pending[child] == 0 {
                    ready.insert(child);
                }
            }
        }

        if order.len() < self.stages.len() {
            let stuck = pending
                .iter()
                .enumerate()
                .filter(|(_, n)| **n > 0)
                .map(|(i, _)| self.stages[i].id.clone())
                .collect();
            return Err(EascopeError::Cycle { stages: stuck });
        }

        Ok(order)
    }

    /// Stage by id.
    pub fn get(&self, id: &str) -> Option<&StageSpec> {
        self.index.get(id).map(|&i| &self.stages[i])
    }

    /// Every stage that depends on `id`, directly or transitively, in
    /// declaration order.
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        let mut reached: HashSet<&str> = HashSet::from([id]);
        let mut found = Vec::new();

        // A dependent is always declared after what it depends on.
        for stage in &self.stages {
            if stage
                .dependencies
                .iter()
                .any(|d| reached.contains(d.as_str()))
                && reached.insert(stage.id.as_str())
            {
                found.push(stage.id.as_str());
            }
        }
        found
    }

    /// Stages in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &StageSpec> {
        self.stages.iter()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
