//! Code annotation patterns and phase explanations for educational display.
//!
//! Ported from `original_source/server/educational/annotations.py`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Key,
    Context,
    Detail,
}

struct CodePattern {
    regex: &'static str,
    explanation: &'static str,
    importance: Importance,
}

static CODE_PATTERNS: LazyLock<Vec<(Regex, &'static str, Importance)>> = LazyLock::new(|| {
    const RAW: &[CodePattern] = &[
        CodePattern {
            regex: r"context\[.*\]|context\[:|\bcontext\b",
            explanation: "Accessing the transcript data. RLM treats your document as a variable it can slice and analyze.",
            importance: Importance::Key,
        },
        CodePattern {
            regex: r"llm_query\(",
            explanation: "Calling a sub-LM (recursive call). This is where RLM delegates part of the analysis to another language model.",
            importance: Importance::Key,
        },
        CodePattern {
            regex: r"llm_query_batched\(",
            explanation: "Calling multiple sub-LMs in parallel. This dramatically speeds up analysis of multiple chunks.",
            importance: Importance::Key,
        },
        CodePattern {
            regex: r"for .* in .*chunk|for .* in .*section",
            explanation: "Iterating over chunks of the document. RLM breaks large texts into manageable pieces.",
            importance: Importance::Context,
        },
        CodePattern {
            regex: r"buffer.*=|buffers\.append|answers\.append",
            explanation: "Accumulating information across iterations. RLM builds up knowledge step by step.",
            importance: Importance::Context,
        },
        CodePattern {
            regex: r"print\(",
            explanation: "Outputting to the REPL. RLM can see this output in the next iteration to guide its reasoning.",
            importance: Importance::Detail,
        },
        CodePattern {
            regex: r"len\(context\)|len\(",
            explanation: "Measuring the size of data. RLM often checks lengths to decide how to chunk.",
            importance: Importance::Detail,
        },
        CodePattern {
            regex: r"FINAL\(|FINAL_VAR\(",
            explanation: "Signaling the final answer! This tells RLM that it has found the answer.",
            importance: Importance::Key,
        },
    ];
    RAW.iter()
        .map(|p| (Regex::new(p.regex).expect("invalid pattern"), p.explanation, p.importance))
        .collect()
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseInfo {
    pub icon: &'static str,
    pub title: &'static str,
    pub explanation: &'static str,
    pub importance: &'static str,
}

pub fn phase_info(phase: &str) -> Option<PhaseInfo> {
    let (icon, title, explanation, importance) = match phase {
        "exploring" => (
            "magnifying_glass",
            "Exploring",
            "The RLM is examining your document to understand its structure. It's figuring out how long the text is, what format it's in, and planning how to break it into chunks.",
            "This exploration phase is crucial. RLM can handle documents of any length by first understanding what it's working with.",
        ),
        "analyzing" => (
            "chart_bar",
            "Analyzing",
            "The RLM is breaking your document into chunks and analyzing each one. It uses sub-LMs (smaller language models) to process each chunk, extracting relevant information to answer your question.",
            "This is where RLM's recursive nature shines. By dividing the problem, it can handle documents that would be too large for a single LLM call.",
        ),
        "synthesizing" => (
            "link",
            "Synthesizing",
            "The RLM is combining results from different chunks. It's using buffers to accumulate findings and may query additional sub-LMs to resolve conflicts or fill gaps in the information.",
            "Synthesis is how RLM builds coherent understanding from fragmented analysis. It's like assembling pieces of a puzzle.",
        ),
        "answering" => (
            "check_circle",
            "Answering",
            "The RLM has gathered enough information and is formulating the final answer. It uses FINAL() or FINAL_VAR() to signal that it has completed its analysis.",
            "The answer emerges from the iterative process. RLM doesn't guess - it builds up to the answer through systematic analysis.",
        ),
        _ => return None,
    };
    Some(PhaseInfo { icon, title, explanation, importance })
}

/// A single annotation for a line of code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub line: usize,
    pub explanation: String,
    pub importance: Importance,
}

/// Annotates code with educational explanations.
#[derive(Debug, Default)]
pub struct CodeAnnotator;

impl CodeAnnotator {
    pub fn new() -> Self {
        Self
    }

    /// Return annotations for code lines, one per matching line (first
    /// matching pattern wins).
    pub fn annotate(&self, code: &str) -> Vec<Annotation> {
        let mut annotations = Vec::new();
        for (i, line) in code.lines().enumerate() {
            for (regex, explanation, importance) in CODE_PATTERNS.iter() {
                if regex.is_match(line) {
                    annotations.push(Annotation {
                        line: i + 1,
                        explanation: explanation.to_string(),
                        importance: *importance,
                    });
                    break;
                }
            }
        }
        annotations
    }

    /// Return only `key`-importance annotations.
    pub fn key_annotations(&self, code: &str) -> Vec<Annotation> {
        self.annotate(code)
            .into_iter()
            .filter(|a| a.importance == Importance::Key)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotates_llm_query_as_key() {
        let annotator = CodeAnnotator::new();
        let annotations = annotator.annotate("result = llm_query('summarize this')");
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].importance, Importance::Key);
    }

    #[test]
    fn one_annotation_per_line() {
        let annotator = CodeAnnotator::new();
        let annotations = annotator.annotate("x = llm_query(context)\nprint(x)");
        assert_eq!(annotations.len(), 2);
        assert_eq!(annotations[0].line, 1);
        assert_eq!(annotations[1].line, 2);
    }

    #[test]
    fn key_annotations_filters_by_importance() {
        let annotator = CodeAnnotator::new();
        let code = "print(context)\nFINAL(x)";
        let keys = annotator.key_annotations(code);
        assert!(keys.iter().all(|a| a.importance == Importance::Key));
        assert!(!keys.is_empty());
    }

    #[test]
    fn unmatched_lines_are_unannotated() {
        let annotator = CodeAnnotator::new();
        let annotations = annotator.annotate("x = 1 + 2");
        assert!(annotations.is_empty());
    }

    #[test]
    fn phase_info_known_phases() {
        for phase in ["exploring", "analyzing", "synthesizing", "answering"] {
            assert!(phase_info(phase).is_some(), "{phase}");
        }
        assert!(phase_info("unknown").is_none());
    }
}
