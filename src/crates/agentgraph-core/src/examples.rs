//! Few-shot examples
//!
//! An [`ExampleSource`] returns historical interactions for an assistant; the
//! run's [`ExamplePolicy`] picks which of them are rendered into the system
//! prompt. The selected set is stored in the `examples` channel of the input
//! checkpoint, so a resumed run reuses it instead of fetching again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{AgentError, Result};

/// One historical interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub input: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Example {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            created_at: None,
        }
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// Where examples come from, e.g. a trace-logging service
#[async_trait]
pub trait ExampleSource: Send + Sync {
    async fn fetch(&self, assistant_id: Option<&str>, scope: Option<&str>) -> Result<Vec<Example>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Newest first; examples without a timestamp sort last
    #[default]
    Recent,
    /// Uniform sample without replacement
    Random,
}

/// How many examples to inject and which
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExamplePolicy {
    pub max_examples: usize,
    pub strategy: SelectionStrategy,
}

impl Default for ExamplePolicy {
    fn default() -> Self {
        Self {
            max_examples: 3,
            strategy: SelectionStrategy::Recent,
        }
    }
}

impl ExamplePolicy {
    pub fn recent(max_examples: usize) -> Self {
        Self {
            max_examples,
            strategy: SelectionStrategy::Recent,
        }
    }

    pub fn random(max_examples: usize) -> Self {
        Self {
            max_examples,
            strategy: SelectionStrategy::Random,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_examples == 0 {
            return Err(AgentError::invalid_input(
                "example policy must allow at least one example",
            ));
        }
        Ok(())
    }

    pub fn select(&self, mut candidates: Vec<Example>) -> Vec<Example> {
        match self.strategy {
            SelectionStrategy::Recent => {
                candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                candidates.truncate(self.max_examples);
                candidates
            }
            SelectionStrategy::Random => {
                let mut rng = rand::thread_rng();
                candidates
                    .choose_multiple(&mut rng, self.max_examples)
                    .cloned()
                    .collect()
            }
        }
    }
}

/// Examples held in memory, keyed by assistant id
#[derive(Debug, Default)]
pub struct InMemoryExampleSource {
    examples: RwLock<HashMap<String, Vec<Example>>>,
}

impl InMemoryExampleSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, assistant_id: impl Into<String>, example: Example) {
        self.examples
            .write()
            .entry(assistant_id.into())
            .or_default()
            .push(example);
    }
}

#[async_trait]
impl ExampleSource for InMemoryExampleSource {
    async fn fetch(&self, assistant_id: Option<&str>, _scope: Option<&str>) -> Result<Vec<Example>> {
        let Some(assistant_id) = assistant_id else {
            return Ok(Vec::new());
        };
        Ok(self
            .examples
            .read()
            .get(assistant_id)
            .cloned()
            .unwrap_or_default())
    }
}
