//! Optional educational layer (C6): annotates RLM iterations with
//! human-readable phase explanations and code-pattern callouts for UIs that
//! want to show "what is the model doing right now".
//!
//! Ported from `original_source/server/educational/`.

pub mod annotations;
pub mod enricher;

pub use annotations::{Annotation, CodeAnnotator, Importance};
pub use enricher::{Education, EducationalEnricher};
