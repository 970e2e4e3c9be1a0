//! Response parsing (C2): code-block extraction, `FINAL`/`FINAL_VAR`
//! sentinel detection, result formatting for the next prompt turn, and
//! context coercion for the sandbox.
//!
//! Grounded in `original_source/tests/test_parsing.py`, which pins down the
//! exact precedence and edge-case rules reproduced here.

use crate::types::{CodeBlock, ContextInput, Message, ReplResult, RlmIteration, Role};
use regex::Regex;
use std::sync::LazyLock;

// Only the exact fence tag `repl` is recognized - unlike the teacher, which
// also accepted `python`.
static CODE_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```repl\n([\s\S]*?)```").expect("invalid regex"));

/// Extract the bodies of fenced regions whose opening tag is exactly `repl`,
/// in source order. Fence lines themselves are stripped.
pub fn find_code_blocks(text: &str) -> Vec<String> {
    CODE_BLOCK_RE
        .captures_iter(text)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Build the code-block list from a response's extracted fragments,
/// without executing them.
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    find_code_blocks(text).into_iter().map(CodeBlock::new).collect()
}

/// A non-empty string matching the identifier grammar `[A-Za-z_][A-Za-z0-9_]*`.
pub fn looks_like_variable(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn at_line_start(text: &str, pos: usize) -> bool {
    pos == 0 || text[..pos].rsplit('\n').next().unwrap_or("").trim().is_empty()
}

/// Find the first `FINAL_VAR(name)` sentinel at line start, returning the
/// raw name (unquoted).
fn find_final_var(text: &str) -> Option<String> {
    let marker = "FINAL_VAR(";
    let mut search_start = 0;
    while let Some(pos) = text[search_start..].find(marker) {
        let start_pos = search_start + pos;
        if at_line_start(text, start_pos) {
            let content_start = start_pos + marker.len();
            if let Some(end) = text[content_start..].find(')') {
                let name = text[content_start..content_start + end].trim();
                let name = name.trim_matches(|c| c == '\'' || c == '"');
                if looks_like_variable(name) {
                    return Some(name.to_string());
                }
            }
        }
        search_start = start_pos + 1;
    }
    None
}

/// Find the first `FINAL(...)` sentinel at line start, handling nested
/// parens and quoted strings inside the payload.
fn find_final_content(text: &str) -> Option<String> {
    let marker = "FINAL(";
    let mut search_start = 0;

    while let Some(pos) = text[search_start..].find(marker) {
        let start_pos = search_start + pos;
        if !at_line_start(text, start_pos) {
            search_start = start_pos + 1;
            continue;
        }

        let content_start = start_pos + marker.len();
        if let Some(end) = balanced_close(&text[content_start..]) {
            let content = text[content_start..content_start + end].trim().to_string();
            return Some(unescape_string_literal(&content));
        }

        search_start = start_pos + 1;
    }

    None
}

/// Offset (relative to `s`) of the `)` balancing the implied opening `(`,
/// skipping parens inside quoted strings.
fn balanced_close(s: &str) -> Option<usize> {
    let mut depth = 1i32;
    let mut in_string: Option<char> = None;

    for (i, ch) in s.char_indices() {
        if let Some(q) = in_string {
            if ch == q && !s[..i].ends_with('\\') {
                in_string = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => in_string = Some(ch),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn unescape_string_literal(s: &str) -> String {
    let t = s.trim();
    let quoted = (t.starts_with('"') && t.ends_with('"') && t.len() >= 2)
        || (t.starts_with('\'') && t.ends_with('\'') && t.len() >= 2);
    if !quoted {
        return s.to_string();
    }
    t[1..t.len() - 1].replace("\\n", "\n").replace("\\t", "\t")
}

/// Resolve a sandbox-bound identifier to its printable value.
pub trait VariableResolver {
    /// Returns `None` when `name` is not bound in scope.
    fn resolve(&mut self, name: &str) -> Option<String>;
}

impl<F: FnMut(&str) -> Option<String>> VariableResolver for F {
    fn resolve(&mut self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Detect a final answer per the precedence rules:
/// 1. `FINAL_VAR(name)` at line start - resolved via `resolver` if given.
/// 2. `FINAL(content)` at line start - smart variable substitution when
///    `content` is a bare identifier whose resolved value is strictly
///    longer than the identifier itself.
pub fn find_final_answer(text: &str, resolver: Option<&mut dyn VariableResolver>) -> Option<String> {
    if let Some(name) = find_final_var(text) {
        return resolver.map(|resolver| {
            resolver
                .resolve(&name)
                .unwrap_or_else(|| format!("Error: variable '{name}' not found in scope"))
        });
    }

    let content = find_final_content(text)?;
    if looks_like_variable(&content) {
        if let Some(resolver) = resolver {
            if let Some(value) = resolver.resolve(&content) {
                if value.len() > content.len() {
                    return Some(value);
                }
            }
        }
    }
    Some(content)
}

/// Render one [`ReplResult`] for inclusion in the next prompt turn.
pub fn format_execution_result(result: &ReplResult) -> String {
    let mut parts = Vec::new();
    if !result.stdout.is_empty() {
        parts.push(result.stdout.trim_end().to_string());
    }
    if !result.stderr.is_empty() {
        parts.push(result.stderr.trim_end().to_string());
    }
    if let Some(err) = &result.error {
        parts.push(format!("Error: {err}"));
    }
    if !result.locals.is_empty() {
        let mut names: Vec<_> = result
            .locals
            .keys()
            .filter(|n| !n.starts_with('_'))
            .cloned()
            .collect();
        names.sort();
        if !names.is_empty() {
            let rendered = names
                .iter()
                .map(|n| format!("{n} = {}", result.locals[n]))
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(format!("locals:\n{rendered}"));
        }
    }
    if parts.is_empty() {
        "No output".to_string()
    } else {
        parts.join("\n")
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let total = s.chars().count();
    let truncated: String = s.chars().take(max_chars).collect();
    format!("{truncated}...[truncated, {total} chars total]")
}

/// Format an [`RlmIteration`] into the assistant + user-role messages that
/// get appended to the conversation for the next round.
pub fn format_iteration(iteration: &RlmIteration, max_character_length: usize) -> Vec<Message> {
    let mut messages = vec![Message::assistant(&iteration.response)];

    if !iteration.code_blocks.is_empty() {
        let mut body = String::new();
        for block in &iteration.code_blocks {
            body.push_str("```repl\n");
            body.push_str(&block.code);
            body.push_str("\n```\n");
            if let Some(result) = &block.result {
                let formatted = truncate(&format_execution_result(result), max_character_length);
                body.push_str(&formatted);
                body.push('\n');
            }
        }
        messages.push(Message::user(body.trim_end()));
    }

    messages
}

/// Coercion rules for the sandbox's `context` variable.
#[derive(Debug, Clone)]
pub enum ContextData {
    Mapping(serde_json::Map<String, serde_json::Value>),
    List(Vec<String>),
}

/// Coerce a caller-supplied [`ContextInput`] into the `(context_data,
/// context_str)` pair the sandbox expects. Exactly one side is `Some`.
pub fn convert_context_for_repl(input: ContextInput) -> (Option<ContextData>, Option<String>) {
    match input {
        ContextInput::Text(s) => (None, Some(s)),
        ContextInput::Mapping(m) => (Some(ContextData::Mapping(m)), None),
        ContextInput::List(items) => (Some(ContextData::List(items)), None),
        ContextInput::Messages(msgs) => {
            let contents = msgs.into_iter().map(|m| m.content).collect();
            (Some(ContextData::List(contents)), None)
        }
    }
}

pub fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn extracts_single_repl_block() {
        let text = "Here's code:\n```repl\nx = 1\nprint(x)\n```\nDone.";
        let blocks = find_code_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].contains("x = 1"));
    }

    #[test]
    fn ignores_python_fence() {
        let text = "```python\nx = 1\n```";
        assert!(find_code_blocks(text).is_empty());
    }

    #[test]
    fn extracts_multiple_blocks_in_order() {
        let text = "```repl\na = 1\n```\nmiddle\n```repl\nb = 2\n```";
        let blocks = find_code_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].contains("a = 1"));
        assert!(blocks[1].contains("b = 2"));
    }

    #[test]
    fn final_simple() {
        assert_eq!(find_final_answer("FINAL(42)", None), Some("42".to_string()));
    }

    #[test]
    fn final_not_at_line_start_is_ignored() {
        assert_eq!(find_final_answer("The answer is FINAL(42)", None), None);
    }

    #[test]
    fn final_after_newline() {
        assert_eq!(
            find_final_answer("thinking...\nFINAL(the answer)", None),
            Some("the answer".to_string())
        );
    }

    #[test]
    fn final_nested_parens() {
        assert_eq!(
            find_final_answer("FINAL(foo(x) + bar(y, z))", None),
            Some("foo(x) + bar(y, z)".to_string())
        );
    }

    #[test]
    fn final_var_without_resolver_is_none() {
        assert_eq!(find_final_answer("FINAL_VAR(x)", None), None);
    }

    #[test]
    fn final_var_resolves_via_resolver() {
        let mut resolver = |name: &str| (name == "x").then(|| "42".to_string());
        assert_eq!(
            find_final_answer("FINAL_VAR(x)", Some(&mut resolver)),
            Some("42".to_string())
        );
    }

    #[test]
    fn final_var_missing_is_error_shaped() {
        let mut resolver = |_: &str| None;
        let result = find_final_answer("FINAL_VAR(missing)", Some(&mut resolver)).unwrap();
        assert!(result.contains("Error") || result.to_lowercase().contains("not found"));
    }

    #[test]
    fn final_var_wins_over_final() {
        let mut resolver = |name: &str| (name == "result").then(|| "var_value".to_string());
        let text = "FINAL_VAR(result)\nFINAL(direct_answer)";
        assert_eq!(
            find_final_answer(text, Some(&mut resolver)),
            Some("var_value".to_string())
        );
    }

    #[test]
    fn smart_substitution_when_longer() {
        let long = "A".repeat(5874);
        let long_clone = long.clone();
        let mut resolver = move |name: &str| (name == "minutes").then(|| long_clone.clone());
        assert_eq!(
            find_final_answer("FINAL(minutes)", Some(&mut resolver)),
            Some(long)
        );
    }

    #[test]
    fn no_substitution_when_not_longer() {
        let mut resolver = |name: &str| (name == "result").then(|| "ok".to_string());
        assert_eq!(
            find_final_answer("FINAL(result)", Some(&mut resolver)),
            Some("result".to_string())
        );
    }

    #[test]
    fn prose_content_is_returned_literally() {
        assert_eq!(
            find_final_answer("FINAL(This is the answer)", None),
            Some("This is the answer".to_string())
        );
    }

    #[test]
    fn looks_like_variable_grammar() {
        for ok in ["x", "result", "_private", "CamelCase", "var123"] {
            assert!(looks_like_variable(ok), "{ok}");
        }
        for bad in ["This is prose", "42", "123abc", "hello-world", "", "foo.bar"] {
            assert!(!looks_like_variable(bad), "{bad}");
        }
    }

    #[test]
    fn format_execution_result_empty_is_no_output() {
        let r = ReplResult::success(String::new(), HashMap::new(), Duration::ZERO, Vec::new());
        assert_eq!(format_execution_result(&r), "No output");
    }

    #[test]
    fn format_execution_result_excludes_private_vars() {
        let mut locals = HashMap::new();
        locals.insert("_private".to_string(), "1".to_string());
        locals.insert("public".to_string(), "2".to_string());
        let r = ReplResult::success(String::new(), locals, Duration::ZERO, Vec::new());
        let formatted = format_execution_result(&r);
        assert!(formatted.contains("public"));
        assert!(!formatted.contains("_private"));
    }

    #[test]
    fn format_iteration_with_code_blocks_has_two_messages() {
        let mut locals = HashMap::new();
        locals.insert("x".to_string(), "3".to_string());
        let result = ReplResult::success("3".to_string(), locals, Duration::ZERO, Vec::new());
        let mut block = CodeBlock::new("x = 1 + 2\nprint(x)");
        block.result = Some(result);
        let iteration = RlmIteration {
            iteration: 1,
            prompt: "Calculate 1+2".to_string(),
            response: "Let me calculate that.".to_string(),
            code_blocks: vec![block],
            final_answer: None,
            iteration_time: Duration::ZERO,
        };
        let messages = format_iteration(&iteration, 25_000);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::Assistant);
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.contains("x = 1 + 2"));
    }

    #[test]
    fn format_iteration_without_code_blocks_has_one_message() {
        let iteration = RlmIteration {
            iteration: 1,
            prompt: "p".to_string(),
            response: "I'm considering the options.".to_string(),
            code_blocks: vec![],
            final_answer: None,
            iteration_time: Duration::ZERO,
        };
        assert_eq!(format_iteration(&iteration, 25_000).len(), 1);
    }

    #[test]
    fn format_iteration_truncates_long_results() {
        let long_output = "x".repeat(30_000);
        let result = ReplResult::success(long_output, HashMap::new(), Duration::ZERO, Vec::new());
        let mut block = CodeBlock::new("print('x' * 30000)");
        block.result = Some(result);
        let iteration = RlmIteration {
            iteration: 1,
            prompt: "p".to_string(),
            response: "Running...".to_string(),
            code_blocks: vec![block],
            final_answer: None,
            iteration_time: Duration::ZERO,
        };
        let messages = format_iteration(&iteration, 100);
        assert!(messages[1].content.len() < 30_000);
    }

    #[test]
    fn convert_context_string_roundtrip() {
        let (data, s) = convert_context_for_repl(ContextInput::Text("hello".to_string()));
        assert!(data.is_none());
        assert_eq!(s, Some("hello".to_string()));
    }

    #[test]
    fn convert_context_list_roundtrip() {
        let input = ContextInput::List(vec!["a".to_string(), "b".to_string()]);
        let (data, s) = convert_context_for_repl(input);
        assert!(s.is_none());
        assert!(matches!(data, Some(ContextData::List(v)) if v == vec!["a", "b"]));
    }
}
