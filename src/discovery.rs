//! Iterative, sample-based metric discovery.
//!
//! Each round draws a fresh batch of demonstrations from a shrinking pool and
//! asks the model for its top metrics. Proposals are unioned across rounds.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::ValidationItem;
use crate::gateway::{GenerateOptions, TextGenerator};
use crate::payload::parse_json_block;
use crate::prompts;

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("{iterations} rounds of {batch_size} items need {needed} items, validation set has {available}")]
    PoolExhausted {
        iterations: usize,
        batch_size: usize,
        needed: usize,
        available: usize,
    },
}

fn default_batch_size() -> usize {
    10
}

fn default_iterations() -> usize {
    3
}

fn default_selection_tokens() -> u32 {
    512
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryOptions {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    #[serde(default = "default_selection_tokens")]
    pub max_output_tokens: u32,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            iterations: default_iterations(),
            max_output_tokens: default_selection_tokens(),
        }
    }
}

pub struct MetricDiscovery<'a> {
    generator: &'a dyn TextGenerator,
    task_type: String,
    generate: GenerateOptions,
    rng_seed: Option<u64>,
}

impl<'a> MetricDiscovery<'a> {
    pub fn new(generator: &'a dyn TextGenerator, task_type: impl Into<String>) -> Self {
        Self {
            generator,
            task_type: task_type.into(),
            generate: GenerateOptions::default().max_output_tokens(default_selection_tokens()),
            rng_seed: None,
        }
    }

    /// Base options for selection calls; temperature and retries carry over.
    pub fn generate_options(mut self, opts: GenerateOptions) -> Self {
        self.generate = opts;
        self
    }

    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.generate = self.generate.max_output_tokens(tokens);
        self
    }

    pub fn rng_seed(mut self, seed: Option<u64>) -> Self {
        self.rng_seed = seed;
        self
    }

    /// Run `iterations` selection rounds of `batch_size` demonstrations each.
    ///
    /// Returns the sorted union of every parsable proposal. Items are drawn
    /// without replacement across the whole run.
    pub async fn discover(
        &self,
        items: &[ValidationItem],
        batch_size: usize,
        iterations: usize,
    ) -> Result<Vec<String>, DiscoveryError> {
        if batch_size == 0 || iterations == 0 {
            return Ok(Vec::new());
        }

        let needed = batch_size.saturating_mul(iterations);
        if needed > items.len() {
            return Err(DiscoveryError::PoolExhausted {
                iterations,
                batch_size,
                needed,
                available: items.len(),
            });
        }

        let mut rng = match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut pool: Vec<&ValidationItem> = items.iter().collect();
        let mut metrics = BTreeSet::new();

        for round in 0..iterations {
            let batch = draw_batch(&mut pool, batch_size, &mut rng);
            let prompt = prompts::metric_selection(&self.task_type, &batch);
            let raw = self.generator.generate(&prompt, self.generate).await;

            match parse_json_block::<Vec<String>>(&raw) {
                Ok(names) => {
                    debug!(round, proposed = names.len(), "metric selection round parsed");
                    metrics.extend(names.into_iter().map(|n| n.trim().to_string()));
                }
                Err(err) => {
                    debug!(round, error = %err, "metric selection round skipped");
                }
            }
        }

        metrics.remove("");
        info!(
            task_type = %self.task_type,
            metrics = metrics.len(),
            "metric discovery finished"
        );
        Ok(metrics.into_iter().collect())
    }
}

/// Draw `n` distinct entries uniformly at random and remove them from `pool`.
fn draw_batch<'p>(
    pool: &mut Vec<&'p ValidationItem>,
    n: usize,
    rng: &mut StdRng,
) -> Vec<&'p ValidationItem> {
    let mut picked = rand::seq::index::sample(rng, pool.len(), n).into_vec();
    let batch: Vec<_> = picked.iter().map(|&i| pool[i]).collect();

    picked.sort_unstable_by(|a, b| b.cmp(a));
    for i in picked {
        pool.swap_remove(i);
    }
    batch
}
