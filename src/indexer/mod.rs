pub mod classifier;
pub mod decoder;
pub mod normalizer;
pub mod selectors;
pub mod types;

pub use classifier::TransactionClassifier;
pub use normalizer::{EventNormalizer, SaveOutcome};
