//! Per-counterparty template learning and anomaly detection.

pub mod matcher;
pub mod model;
pub mod store;

pub use matcher::{match_template, AnomalyReport};
pub use model::{identifier_shape, FrequencyEntry, FrequencyList, Template, TemplateStats};
pub use store::{LearnOutcome, TemplateStore};
