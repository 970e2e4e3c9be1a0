//! Educational content enricher for RLM iterations. Adds explanations and
//! annotations without modifying core data.
//!
//! Ported from `original_source/server/educational/enricher.py`.

use super::annotations::{phase_info, Annotation, CodeAnnotator};
use crate::types::RlmIteration;
use serde::{Deserialize, Serialize};

/// Educational context attached to an [`RlmIteration`] before it's emitted
/// as an [`crate::types::Event::Iteration`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Education {
    pub phase: String,
    pub phase_icon: String,
    pub phase_title: String,
    pub phase_explanation: String,
    pub phase_importance: String,
    pub what_happened: String,
    pub code_annotations: Vec<Annotation>,
}

/// Adds educational context to RLM iterations. Does not modify iteration
/// data - only augments.
#[derive(Debug, Default)]
pub struct EducationalEnricher {
    annotator: CodeAnnotator,
}

impl EducationalEnricher {
    pub fn new() -> Self {
        Self { annotator: CodeAnnotator::new() }
    }

    pub fn enrich(&self, iteration: &RlmIteration) -> Education {
        let phase = self.detect_phase(iteration);
        let info = phase_info(phase).expect("detect_phase only returns known phases");

        let mut all_annotations = Vec::new();
        let mut sub_calls = 0usize;
        for block in &iteration.code_blocks {
            all_annotations.extend(self.annotator.annotate(&block.code));
            if let Some(result) = &block.result {
                sub_calls += result.rlm_calls.len();
            }
        }

        let what_happened = self.summarize(iteration, sub_calls);

        Education {
            phase: phase.to_string(),
            phase_icon: info.icon.to_string(),
            phase_title: info.title.to_string(),
            phase_explanation: info.explanation.to_string(),
            phase_importance: info.importance.to_string(),
            what_happened,
            code_annotations: all_annotations,
        }
    }

    fn detect_phase(&self, iteration: &RlmIteration) -> &'static str {
        if iteration.final_answer.is_some() {
            return "answering";
        }

        let has_llm_query = iteration
            .code_blocks
            .iter()
            .any(|b| b.code.contains("llm_query"));
        let has_buffer = iteration
            .code_blocks
            .iter()
            .any(|b| b.code.contains("buffer") || b.code.contains("answer"));

        if has_llm_query && has_buffer {
            return "synthesizing";
        }
        if has_llm_query {
            return "analyzing";
        }
        let response_lower = iteration.response.to_lowercase();
        if response_lower.contains("chunk") || response_lower.contains("split") {
            return "analyzing";
        }

        "exploring"
    }

    fn summarize(&self, iteration: &RlmIteration, sub_calls: usize) -> String {
        if iteration.final_answer.is_some() {
            return "RLM found the answer after analyzing the document.".to_string();
        }
        if sub_calls > 0 {
            return format!("RLM called {sub_calls} sub-LM(s) to analyze parts of the document.");
        }
        if !iteration.code_blocks.is_empty() {
            return format!(
                "RLM wrote {} code block(s) to explore the document.",
                iteration.code_blocks.len()
            );
        }
        "RLM is thinking about how to approach the question.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CodeBlock;
    use std::time::Duration;

    fn iteration(response: &str, code_blocks: Vec<CodeBlock>, final_answer: Option<&str>) -> RlmIteration {
        RlmIteration {
            iteration: 1,
            prompt: "p".to_string(),
            response: response.to_string(),
            code_blocks,
            final_answer: final_answer.map(str::to_string),
            iteration_time: Duration::ZERO,
        }
    }

    #[test]
    fn final_answer_detects_answering_phase() {
        let enricher = EducationalEnricher::new();
        let it = iteration("done", vec![], Some("42"));
        assert_eq!(enricher.enrich(&it).phase, "answering");
    }

    #[test]
    fn llm_query_without_buffer_is_analyzing() {
        let enricher = EducationalEnricher::new();
        let it = iteration("", vec![CodeBlock::new("x = llm_query('summarize')")], None);
        assert_eq!(enricher.enrich(&it).phase, "analyzing");
    }

    #[test]
    fn llm_query_with_buffer_is_synthesizing() {
        let enricher = EducationalEnricher::new();
        let it = iteration(
            "",
            vec![CodeBlock::new("buffer = []\nbuffer.append(llm_query('x'))")],
            None,
        );
        assert_eq!(enricher.enrich(&it).phase, "synthesizing");
    }

    #[test]
    fn no_code_blocks_is_exploring() {
        let enricher = EducationalEnricher::new();
        let it = iteration("Let me think about this.", vec![], None);
        assert_eq!(enricher.enrich(&it).phase, "exploring");
    }

    #[test]
    fn summary_mentions_sub_calls() {
        use crate::types::{ChatCompletion, PromptInput, ReplResult, Usage};
        let mut block = CodeBlock::new("llm_query('x')");
        block.result = Some(ReplResult::success(
            String::new(),
            Default::default(),
            Duration::ZERO,
            vec![ChatCompletion {
                prompt: PromptInput::Text("x".to_string()),
                response: "y".to_string(),
                usage: Usage::default(),
                execution_time: Duration::ZERO,
                parent_iteration: Some(1),
            }],
        ));
        let enricher = EducationalEnricher::new();
        let it = iteration("", vec![block], None);
        let education = enricher.enrich(&it);
        assert!(education.what_happened.contains("sub-LM"));
    }
}
