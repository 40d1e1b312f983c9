//! Task-complexity scorer.
//!
//! Maps task text to a score in [0.0, 1.0] through a transparent weighted
//! sum: length and token-count signals, curated heavy/light/domain keyword
//! lists, and an optional semantic-similarity signal against a small set of
//! exemplar phrases. The weight table and keyword lists live in
//! [`ScorerConfig`] so operators can retune routing without recompiling.
//!
//! The scorer never errors: empty input scores 0.0, a disabled scorer scores
//! 0.0, and an unavailable semantic backend degrades to the keyword-only
//! score with a logged warning.

use std::sync::Arc;

use tracing::warn;

use crate::config::{ConfigStore, ScorerConfig};
use crate::error::SemanticError;

/// Exemplar phrases the semantic signal compares against.
const HEAVY_EXEMPLARS: [&str; 3] = [
    "optimize algorithm",
    "comprehensive data analysis",
    "compile project",
];
const LIGHT_EXEMPLARS: [&str; 3] = ["list files", "check status", "echo hello"];

/// Optional embedding backend for the semantic-similarity signal.
///
/// Implementations wrap whatever sentence-embedding capability the host
/// system has. The scorer treats any error as "backend unavailable" and
/// proceeds without the signal.
pub trait SemanticBackend: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, SemanticError>;
}

struct ExemplarEmbeddings {
    heavy: Vec<Vec<f32>>,
    light: Vec<Vec<f32>>,
}

/// Complexity scorer with live configuration and an optional semantic
/// backend.
pub struct TaskScorer {
    store: Arc<ConfigStore>,
    backend: Option<Arc<dyn SemanticBackend>>,
    exemplars: Option<ExemplarEmbeddings>,
}

impl TaskScorer {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self {
            store,
            backend: None,
            exemplars: None,
        }
    }

    /// Attach a semantic backend and pre-embed the exemplar phrases. A
    /// failure here disables the semantic signal for the scorer's lifetime.
    pub fn with_backend(store: Arc<ConfigStore>, backend: Arc<dyn SemanticBackend>) -> Self {
        let exemplars = match embed_exemplars(backend.as_ref()) {
            Ok(exemplars) => Some(exemplars),
            Err(e) => {
                warn!("[Scorer] semantic backend unavailable, keyword-only scoring: {}", e);
                None
            }
        };
        Self {
            store,
            backend: Some(backend),
            exemplars,
        }
    }

    /// Score a task's text. Pure apart from the configuration read and the
    /// optional semantic backend call.
    pub fn score(&self, text: &str) -> f64 {
        let config = self.store.scorer();
        if !config.enabled {
            return 0.0;
        }
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return 0.0;
        }

        let lower = trimmed.to_lowercase();
        let weights = &config.weights;
        let mut score = 0.0;

        // Length and token-count signals, saturating at their scales.
        let chars = trimmed.chars().count() as f64;
        score += weights.length_weight * (chars / weights.length_scale as f64).min(1.0);
        let words = trimmed.split_whitespace().count() as f64;
        score += weights.token_weight * (words / weights.token_scale as f64).min(1.0);

        let heavy_hits = count_distinct_matches(&lower, &config.heavy_keywords);
        score += (heavy_hits as f64 * weights.heavy_keyword_weight).min(weights.heavy_keyword_cap);

        let domain_hits = count_distinct_matches(&lower, &config.domain_keywords);
        score +=
            (domain_hits as f64 * weights.domain_keyword_weight).min(weights.domain_keyword_cap);

        // Domain matches suppress the triviality penalty: "list containers"
        // is not a trivial task on this hardware.
        if domain_hits == 0 {
            let light_hits = count_distinct_matches(&lower, &config.light_keywords);
            score -= (light_hits as f64 * weights.light_keyword_penalty)
                .min(weights.light_keyword_cap);
        }

        score += weights.semantic_weight * self.semantic_signal(trimmed);

        score.clamp(0.0, 1.0)
    }

    /// Current scorer configuration snapshot (for introspection endpoints).
    pub fn config(&self) -> ScorerConfig {
        self.store.scorer()
    }

    /// Rescaled heavy-vs-light similarity in roughly [0, 1]; 0.0 whenever
    /// the backend is absent or failing.
    fn semantic_signal(&self, text: &str) -> f64 {
        let (Some(backend), Some(exemplars)) = (&self.backend, &self.exemplars) else {
            return 0.0;
        };
        let embedding = match backend.embed(text) {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("[Scorer] embedding failed, skipping semantic signal: {}", e);
                return 0.0;
            }
        };
        let heavy_sim = max_cosine(&embedding, &exemplars.heavy);
        let light_sim = max_cosine(&embedding, &exemplars.light);
        ((heavy_sim - light_sim) + 1.0) / 2.0
    }
}

fn embed_exemplars(backend: &dyn SemanticBackend) -> Result<ExemplarEmbeddings, SemanticError> {
    let embed_all = |phrases: &[&str]| -> Result<Vec<Vec<f32>>, SemanticError> {
        phrases.iter().map(|p| backend.embed(p)).collect()
    };
    Ok(ExemplarEmbeddings {
        heavy: embed_all(&HEAVY_EXEMPLARS)?,
        light: embed_all(&LIGHT_EXEMPLARS)?,
    })
}

fn count_distinct_matches(lower: &str, keywords: &[String]) -> usize {
    keywords
        .iter()
        .filter(|k| !k.is_empty() && lower.contains(k.to_lowercase().as_str()))
        .count()
}

fn max_cosine(embedding: &[f32], against: &[Vec<f32>]) -> f64 {
    against
        .iter()
        .map(|other| cosine_similarity(embedding, other))
        .fold(f64::MIN, f64::max)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn scorer() -> (tempfile::TempDir, TaskScorer) {
        let dir = tempdir().unwrap();
        let store = Arc::new(ConfigStore::open(dir.path()).unwrap());
        (dir, TaskScorer::new(store))
    }

    #[test]
    fn test_empty_and_whitespace_score_zero() {
        let (_dir, scorer) = scorer();
        assert_eq!(scorer.score(""), 0.0);
        assert_eq!(scorer.score("   "), 0.0);
        assert_eq!(scorer.score("\n\t"), 0.0);
    }

    #[test]
    fn test_deterministic_without_backend() {
        let (_dir, scorer) = scorer();
        let text = "analyze container performance and generate a detailed report";
        assert_eq!(scorer.score(text), scorer.score(text));
    }

    #[test]
    fn test_disabled_scorer_returns_zero() {
        let dir = tempdir().unwrap();
        let store = Arc::new(ConfigStore::open(dir.path()).unwrap());
        store.set_scorer_enabled(false).unwrap();
        let scorer = TaskScorer::new(store);
        assert_eq!(scorer.score("comprehensive analysis of everything"), 0.0);
    }

    #[test]
    fn test_light_tasks_score_low() {
        let (_dir, scorer) = scorer();
        assert!(scorer.score("show status") < 0.3);
        assert!(scorer.score("list files") < 0.3);
        assert!(scorer.score("echo hello") < 0.3);
    }

    #[test]
    fn test_heavy_task_crosses_default_threshold() {
        let (_dir, scorer) = scorer();
        let text = "Please provide a comprehensive analysis of network security \
                    vulnerabilities and generate detailed optimization recommendations";
        assert!(scorer.score(text) >= 0.7, "score was {}", scorer.score(text));
    }

    #[test]
    fn test_monotonic_keyword_effect() {
        let (_dir, scorer) = scorer();
        let light = "list files";
        let heavier =
            "list files and comprehensively analyze and optimize the architecture";
        assert!(scorer.score(light) < scorer.score(heavier));
    }

    #[test]
    fn test_domain_keywords_suppress_light_penalty() {
        let (_dir, scorer) = scorer();
        // Both mention "list"; the container variant must not be penalized
        // below the plain one.
        assert!(scorer.score("list containers") > scorer.score("list files"));
    }

    #[test]
    fn test_keyword_stuffing_is_capped() {
        let (_dir, scorer) = scorer();
        let stuffed = "optimize optimize analyze build develop compile refactor debug \
                       benchmark plan research implement generate";
        assert!(scorer.score(stuffed) <= 1.0);
        // The heavy contribution is capped, so stuffing cannot dominate the
        // two reference signals by more than the configured cap.
        let single = "optimize the thing";
        let diff = scorer.score(stuffed) - scorer.score(single);
        assert!(diff < 0.45);
    }

    #[test]
    fn test_score_is_clamped() {
        let (_dir, scorer) = scorer();
        let text = "comprehensive detailed analysis optimization security performance \
                    architecture orchestration kubernetes docker container deployment "
            .repeat(20);
        let score = scorer.score(&text);
        assert!((0.0..=1.0).contains(&score));
    }

    struct FixedBackend {
        value: Vec<f32>,
    }

    impl SemanticBackend for FixedBackend {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, SemanticError> {
            Ok(self.value.clone())
        }
    }

    struct FailingBackend;

    impl SemanticBackend for FailingBackend {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, SemanticError> {
            Err(SemanticError::Unavailable("model not loaded".to_string()))
        }
    }

    #[test]
    fn test_failing_backend_degrades_to_keyword_score() {
        let dir = tempdir().unwrap();
        let store = Arc::new(ConfigStore::open(dir.path()).unwrap());
        let plain = TaskScorer::new(store.clone());
        let degraded = TaskScorer::with_backend(store, Arc::new(FailingBackend));
        let text = "analyze system performance";
        assert_eq!(plain.score(text), degraded.score(text));
    }

    #[test]
    fn test_uniform_backend_adds_neutral_semantic_signal() {
        let dir = tempdir().unwrap();
        let store = Arc::new(ConfigStore::open(dir.path()).unwrap());
        let backend = Arc::new(FixedBackend {
            value: vec![0.5, 0.5, 0.5],
        });
        let scorer = TaskScorer::with_backend(store.clone(), backend);
        let plain = TaskScorer::new(store);
        // Identical embeddings for everything: heavy and light similarity
        // cancel, leaving the rescaled midpoint times the semantic weight.
        let text = "check containers";
        let expected = plain.score(text) + 0.20 * 0.5;
        assert!((scorer.score(text) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }
}
