//! Classification engine seams.
//!
//! The worker executes lifecycle and consistency logic; the actual
//! indexing, training, and inference are behind these traits so the
//! dispatch subsystem never depends on a concrete ML stack. The
//! deterministic implementations here back tests and local development.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use lexiclass_core::{Error, Result};

/// One labelled training example: document content plus its class.
#[derive(Debug, Clone)]
pub struct TrainingExample {
    pub document_id: i64,
    pub class_id: Uuid,
    pub content: Vec<u8>,
}

/// Evaluation results of a finished training run.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub accuracy: Option<f64>,
    pub metrics: Option<JsonValue>,
}

/// A single class assignment produced by inference.
#[derive(Debug, Clone)]
pub struct ClassPrediction {
    pub class_id: Uuid,
    pub confidence: Option<f64>,
}

/// Builds the search index entry for one document.
#[async_trait]
pub trait Indexer: Send + Sync {
    async fn index_document(&self, document_id: i64, content: &[u8]) -> Result<()>;
}

/// Trains one model version for a field.
#[async_trait]
pub trait Trainer: Send + Sync {
    async fn train(&self, field_id: Uuid, examples: &[TrainingExample])
        -> Result<TrainingOutcome>;
}

/// Runs inference for one field against one document.
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(
        &self,
        field_id: Uuid,
        candidate_classes: &[Uuid],
        content: &[u8],
    ) -> Result<ClassPrediction>;
}

/// Indexer that accepts everything. Backs tests and smoke deployments.
#[derive(Default)]
pub struct NoOpIndexer;

#[async_trait]
impl Indexer for NoOpIndexer {
    async fn index_document(&self, _document_id: i64, _content: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// Trainer that requires at least two examples and reports a fixed
/// accuracy. Deterministic, so tests can assert on stored metrics.
#[derive(Default)]
pub struct ThresholdTrainer;

#[async_trait]
impl Trainer for ThresholdTrainer {
    async fn train(
        &self,
        field_id: Uuid,
        examples: &[TrainingExample],
    ) -> Result<TrainingOutcome> {
        if examples.len() < 2 {
            return Err(Error::Internal(format!(
                "field {} has {} training examples, need at least 2",
                field_id,
                examples.len()
            )));
        }
        Ok(TrainingOutcome {
            accuracy: Some(0.5),
            metrics: Some(json!({ "examples": examples.len() })),
        })
    }
}

/// Predictor that hashes content onto the candidate class list.
/// Deterministic: the same content always lands on the same class.
#[derive(Default)]
pub struct HashingPredictor;

#[async_trait]
impl Predictor for HashingPredictor {
    async fn predict(
        &self,
        field_id: Uuid,
        candidate_classes: &[Uuid],
        content: &[u8],
    ) -> Result<ClassPrediction> {
        if candidate_classes.is_empty() {
            return Err(Error::Internal(format!("field {} has no classes", field_id)));
        }
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        let index = (hasher.finish() % candidate_classes.len() as u64) as usize;
        Ok(ClassPrediction {
            class_id: candidate_classes[index],
            confidence: Some(0.5),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_threshold_trainer_needs_two_examples() {
        let trainer = ThresholdTrainer;
        let field_id = Uuid::new_v4();

        let one = vec![TrainingExample {
            document_id: 1,
            class_id: Uuid::new_v4(),
            content: b"a".to_vec(),
        }];
        assert!(trainer.train(field_id, &one).await.is_err());

        let mut two = one.clone();
        two.push(TrainingExample {
            document_id: 2,
            class_id: Uuid::new_v4(),
            content: b"b".to_vec(),
        });
        let outcome = trainer.train(field_id, &two).await.unwrap();
        assert_eq!(outcome.accuracy, Some(0.5));
    }

    #[tokio::test]
    async fn test_hashing_predictor_is_deterministic() {
        let predictor = HashingPredictor;
        let field_id = Uuid::new_v4();
        let classes = vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];

        let first = predictor
            .predict(field_id, &classes, b"same content")
            .await
            .unwrap();
        let second = predictor
            .predict(field_id, &classes, b"same content")
            .await
            .unwrap();
        assert_eq!(first.class_id, second.class_id);
        assert!(classes.contains(&first.class_id));
    }

    #[tokio::test]
    async fn test_hashing_predictor_rejects_empty_class_list() {
        let predictor = HashingPredictor;
        assert!(predictor
            .predict(Uuid::new_v4(), &[], b"content")
            .await
            .is_err());
    }
}
