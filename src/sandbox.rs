//! Persistent, GIL-backed Python execution environment (C1) - the "REPL"
//! the running model writes `repl` code blocks against.
//!
//! No repo in the retrieval pack embeds a Python interpreter, so this is
//! grounded directly in PyO3's own documented patterns: `Python::attach`
//! for interpreter access, `PyCFunction::new_closure` for exposing Rust
//! closures as callables without a `#[pymodule]`, and `Python::detach` to
//! release the GIL while a sub-call blocks on network I/O.

use crate::error::{Result, RlmError};
use crate::parsing::ContextData;
use crate::types::{ChatCompletion, PromptInput, ReplResult, Usage};
use pyo3::exceptions::PyRuntimeError;
use pyo3::ffi::c_str;
use pyo3::prelude::*;
use pyo3::types::{PyCFunction, PyDict, PyList, PyTuple};
use std::collections::HashMap;
use std::ffi::CString;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Dispatches a single sub-LM call. `Err` carries a human-readable message,
/// surfaced to running code as a Python exception rather than a panic.
pub type LlmQueryFn = Arc<dyn Fn(&str) -> std::result::Result<(String, Usage), String> + Send + Sync>;

struct SharedState {
    query_fn: LlmQueryFn,
    calls: Vec<ChatCompletion>,
    current_iteration: Option<u32>,
}

const RESERVED_NAMES: &[&str] = &["__builtins__", "llm_query", "llm_query_batched", "context"];

/// Bounded-concurrency dispatch of `llm_query_batched`'s prompt list.
/// Order-preserving; a failed sub-call becomes an `[ERROR: ...]` sentinel
/// string in its slot rather than aborting the whole batch.
fn run_batch(
    query_fn: &LlmQueryFn,
    iteration: Option<u32>,
    prompts: Vec<String>,
    max_concurrency: usize,
) -> (Vec<String>, Vec<ChatCompletion>) {
    let mut answers = vec![String::new(); prompts.len()];
    let mut calls = Vec::new();
    let indexed: Vec<(usize, String)> = prompts.into_iter().enumerate().collect();

    for chunk in indexed.chunks(max_concurrency.max(1)) {
        std::thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .iter()
                .map(|(idx, prompt)| {
                    let idx = *idx;
                    let prompt = prompt.clone();
                    scope.spawn(move || {
                        let start = Instant::now();
                        let outcome = query_fn(&prompt);
                        (idx, prompt, outcome, start.elapsed())
                    })
                })
                .collect();

            for handle in handles {
                let (idx, prompt, outcome, elapsed) =
                    handle.join().expect("sub-call worker thread panicked");
                match outcome {
                    Ok((response, usage)) => {
                        answers[idx] = response.clone();
                        calls.push(ChatCompletion {
                            prompt: PromptInput::Text(prompt),
                            response,
                            usage,
                            execution_time: elapsed,
                            parent_iteration: iteration,
                        });
                    }
                    Err(err) => answers[idx] = format!("[ERROR: {err}]"),
                }
            }
        });
    }

    (answers, calls)
}

/// Convert a [`ContextData`] value into its Python object, bound to `py`.
fn context_data_to_py<'py>(py: Python<'py>, data: &ContextData) -> PyResult<Bound<'py, PyAny>> {
    match data {
        ContextData::List(items) => Ok(PyList::new(py, items)?.into_any()),
        ContextData::Mapping(map) => {
            let dict = PyDict::new(py);
            for (k, v) in map {
                dict.set_item(k, json_value_to_py(py, v)?)?;
            }
            Ok(dict.into_any())
        }
    }
}

fn json_value_to_py<'py>(py: Python<'py>, value: &serde_json::Value) -> PyResult<Bound<'py, PyAny>> {
    use serde_json::Value;
    match value {
        Value::Null => Ok(py.None().into_bound(py)),
        Value::Bool(b) => Ok(b.into_pyobject(py)?.to_owned().into_any()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i.into_pyobject(py)?.into_any())
            } else {
                Ok(n.as_f64().unwrap_or_default().into_pyobject(py)?.into_any())
            }
        }
        Value::String(s) => Ok(s.into_pyobject(py)?.into_any()),
        Value::Array(items) => {
            let list = PyList::empty(py);
            for item in items {
                list.append(json_value_to_py(py, item)?)?;
            }
            Ok(list.into_any())
        }
        Value::Object(map) => {
            let dict = PyDict::new(py);
            for (k, v) in map {
                dict.set_item(k, json_value_to_py(py, v)?)?;
            }
            Ok(dict.into_any())
        }
    }
}

/// A persistent Python execution environment. One instance lives for the
/// whole `Rlm::completion` call so that variables a fragment defines stay
/// visible to the next fragment - the thing that makes it feel like a REPL
/// rather than a series of disconnected `eval` calls.
pub struct PyO3Repl {
    globals: Py<PyDict>,
    state: Arc<Mutex<SharedState>>,
    fragment_timeout: Duration,
}

impl PyO3Repl {
    /// Build a fresh environment with `llm_query`/`llm_query_batched` bound
    /// to `query_fn` and no other globals set.
    pub fn new(
        query_fn: LlmQueryFn,
        max_batch_concurrency: usize,
        fragment_timeout: Duration,
    ) -> Result<Self> {
        let state = Arc::new(Mutex::new(SharedState {
            query_fn,
            calls: Vec::new(),
            current_iteration: None,
        }));

        let globals = Python::attach(|py| -> PyResult<Py<PyDict>> {
            let globals = PyDict::new(py);
            let builtins = PyModule::import(py, "builtins")?;
            globals.set_item("__builtins__", builtins)?;

            let state_for_query = state.clone();
            let llm_query = PyCFunction::new_closure(
                py,
                Some(c_str!("llm_query")),
                None,
                move |args: &Bound<'_, PyTuple>, _kwargs| -> PyResult<String> {
                    let (prompt,): (String,) = args.extract()?;
                    let mut guard = state_for_query.lock().unwrap();
                    let iteration = guard.current_iteration;
                    match (guard.query_fn)(&prompt) {
                        Ok((response, usage)) => {
                            guard.calls.push(ChatCompletion {
                                prompt: PromptInput::Text(prompt),
                                response: response.clone(),
                                usage,
                                execution_time: Duration::ZERO,
                                parent_iteration: iteration,
                            });
                            Ok(response)
                        }
                        Err(e) => Err(PyRuntimeError::new_err(e)),
                    }
                },
            )?;
            globals.set_item("llm_query", llm_query)?;

            let state_for_batch = state.clone();
            let max_conc = max_batch_concurrency.max(1);
            let llm_query_batched = PyCFunction::new_closure(
                py,
                Some(c_str!("llm_query_batched")),
                None,
                move |args: &Bound<'_, PyTuple>, _kwargs| -> PyResult<Vec<String>> {
                    let (prompts,): (Vec<String>,) = args.extract()?;
                    let py = args.py();
                    let (query_fn, iteration) = {
                        let guard = state_for_batch.lock().unwrap();
                        (guard.query_fn.clone(), guard.current_iteration)
                    };
                    let (answers, mut calls) =
                        py.detach(|| run_batch(&query_fn, iteration, prompts, max_conc));
                    state_for_batch.lock().unwrap().calls.append(&mut calls);
                    Ok(answers)
                },
            )?;
            globals.set_item("llm_query_batched", llm_query_batched)?;

            Ok(globals.unbind())
        })
        .map_err(RlmError::PyO3)?;

        Ok(Self { globals, state, fragment_timeout })
    }

    /// Bind `name` to a plain string context payload.
    pub fn add_context(&self, name: &str, value: &str) -> Result<()> {
        Python::attach(|py| self.globals.bind(py).set_item(name, value)).map_err(RlmError::PyO3)
    }

    /// Bind `name` to a structured (list/mapping) context payload.
    pub fn add_context_data(&self, name: &str, data: &ContextData) -> Result<()> {
        Python::attach(|py| {
            let value = context_data_to_py(py, data)?;
            self.globals.bind(py).set_item(name, value)
        })
        .map_err(RlmError::PyO3)
    }

    /// Execute one code fragment, capturing stdout/stderr and running any
    /// `llm_query`/`llm_query_batched` calls it makes, tagged with
    /// `iteration` for the resulting sub-call descriptors.
    ///
    /// Enforces `fragment_timeout` on a best-effort basis: PyO3 exposes no
    /// safe way to preempt arbitrary running bytecode, so a fragment that
    /// blows the deadline is reported as a failed [`ReplResult`] while its
    /// worker thread is abandoned to finish (or hang) on its own.
    pub fn execute(&self, code: &str, iteration: u32) -> Result<ReplResult> {
        let start = Instant::now();
        {
            let mut guard = self.state.lock().unwrap();
            guard.current_iteration = Some(iteration);
            guard.calls.clear();
        }

        let before = self.snapshot_locals()?;

        let code_owned = code.to_string();
        let globals = Python::attach(|py| self.globals.clone_ref(py));
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            let outcome = Python::attach(|py| -> PyResult<(String, String, Option<String>)> {
                let globals = globals.bind(py);
                let sys = PyModule::import(py, "sys")?;
                let io = PyModule::import(py, "io")?;
                let stdout_capture = io.getattr("StringIO")?.call0()?;
                let stderr_capture = io.getattr("StringIO")?.call0()?;
                let old_stdout = sys.getattr("stdout")?;
                let old_stderr = sys.getattr("stderr")?;
                sys.setattr("stdout", &stdout_capture)?;
                sys.setattr("stderr", &stderr_capture)?;

                let code_c = CString::new(code_owned.replace('\0', ""))
                    .expect("NUL bytes stripped above");
                let run_result = py.run(&code_c, Some(globals), None);

                sys.setattr("stdout", &old_stdout)?;
                sys.setattr("stderr", &old_stderr)?;

                let stdout_val: String = stdout_capture.call_method0("getvalue")?.extract()?;
                let stderr_val: String = stderr_capture.call_method0("getvalue")?.extract()?;

                Ok(match run_result {
                    Ok(()) => (stdout_val, stderr_val, None),
                    Err(err) => (stdout_val, stderr_val, Some(err.to_string())),
                })
            });
            let _ = tx.send(outcome);
        });

        match rx.recv_timeout(self.fragment_timeout) {
            Ok(Ok((stdout, stderr, error))) => {
                let calls = {
                    let mut guard = self.state.lock().unwrap();
                    std::mem::take(&mut guard.calls)
                };
                let locals = self.diff_locals(&before)?;
                let elapsed = start.elapsed();
                Ok(match error {
                    None => ReplResult::success(stdout, locals, elapsed, calls),
                    Some(err) => {
                        let mut result = ReplResult::failure(err, stderr, elapsed);
                        result.stdout = stdout;
                        result.rlm_calls = calls;
                        result.locals = locals;
                        result
                    }
                })
            }
            Ok(Err(e)) => Err(RlmError::PyO3(e)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(ReplResult::failure(
                format!(
                    "fragment execution exceeded the {:?} timeout",
                    self.fragment_timeout
                ),
                String::new(),
                start.elapsed(),
            )),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(RlmError::Python(
                "sandbox worker thread terminated without a result".to_string(),
            )),
        }
    }

    /// All top-level variables currently bound in the persistent globals
    /// dict, excluding builtins and the injected `llm_query`/`context`
    /// bindings. This is a full scope snapshot, not a per-fragment diff -
    /// see [`Self::diff_locals`] for the latter.
    pub fn snapshot_locals(&self) -> Result<HashMap<String, String>> {
        Python::attach(|py| -> PyResult<HashMap<String, String>> {
            let globals = self.globals.bind(py);
            let mut locals = HashMap::new();
            for (key, value) in globals.iter() {
                let key: String = key.extract()?;
                if key.starts_with('_') || RESERVED_NAMES.contains(&key.as_str()) {
                    continue;
                }
                if let Ok(s) = value.str() {
                    locals.insert(key, s.to_string());
                }
            }
            Ok(locals)
        })
        .map_err(RlmError::PyO3)
    }

    /// Names bound or rebound by the fragment that ran between `before`
    /// (a snapshot taken right before execution) and now: anything absent
    /// from `before`, or present with a different repr, is reported; names
    /// the fragment left untouched are not.
    fn diff_locals(&self, before: &HashMap<String, String>) -> Result<HashMap<String, String>> {
        let after = self.snapshot_locals()?;
        Ok(after
            .into_iter()
            .filter(|(key, value)| before.get(key) != Some(value))
            .collect())
    }

    /// Resolve a bound identifier to its printable value, for `FINAL_VAR`.
    pub fn resolve_variable(&self, name: &str) -> Option<String> {
        Python::attach(|py| {
            let globals = self.globals.bind(py);
            match globals.get_item(name) {
                Ok(Some(value)) => value.str().ok().map(|s| s.to_string()),
                _ => None,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repl() -> PyO3Repl {
        let query_fn: LlmQueryFn = Arc::new(|prompt: &str| {
            Ok((format!("echo: {prompt}"), Usage::new(1, 1)))
        });
        PyO3Repl::new(query_fn, 4, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn executes_simple_arithmetic() {
        let repl = repl();
        let result = repl.execute("x = 1 + 2\nprint(x)", 1).unwrap();
        assert!(result.success);
        assert_eq!(result.stdout.trim(), "3");
        assert_eq!(result.locals.get("x").unwrap(), "3");
    }

    #[test]
    fn persists_variables_across_fragments() {
        let repl = repl();
        repl.execute("x = 10", 1).unwrap();
        let result = repl.execute("print(x * 2)", 2).unwrap();
        assert_eq!(result.stdout.trim(), "20");
        // x is visible to this fragment but wasn't (re)bound by it.
        assert!(!result.locals.contains_key("x"));
    }

    #[test]
    fn locals_only_reports_names_bound_or_rebound_this_fragment() {
        let repl = repl();
        repl.execute("x = 10\ny = 1", 1).unwrap();
        let result = repl.execute("print(x * 2)\ny = 2\nz = 3", 2).unwrap();
        assert!(!result.locals.contains_key("x"), "x was only read, not rebound");
        assert_eq!(result.locals.get("y").unwrap(), "2");
        assert_eq!(result.locals.get("z").unwrap(), "3");
    }

    #[test]
    fn captures_stderr_and_failure_on_exception() {
        let repl = repl();
        let result = repl.execute("raise ValueError('boom')", 1).unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("boom"));
    }

    #[test]
    fn llm_query_invokes_callback_and_records_call() {
        let repl = repl();
        let result = repl.execute("answer = llm_query('hello')\nprint(answer)", 1).unwrap();
        assert!(result.success);
        assert_eq!(result.stdout.trim(), "echo: hello");
        assert_eq!(result.rlm_calls.len(), 1);
        assert_eq!(result.rlm_calls[0].parent_iteration, Some(1));
    }

    #[test]
    fn llm_query_batched_preserves_order() {
        let repl = repl();
        let result = repl
            .execute(
                "out = llm_query_batched(['a', 'b', 'c'])\nprint(out)",
                1,
            )
            .unwrap();
        assert!(result.success);
        assert_eq!(
            result.stdout.trim(),
            "['echo: a', 'echo: b', 'echo: c']"
        );
        assert_eq!(result.rlm_calls.len(), 3);
    }

    #[test]
    fn batched_partial_failure_uses_error_sentinel() {
        let query_fn: LlmQueryFn = Arc::new(|prompt: &str| {
            if prompt == "bad" {
                Err("boom".to_string())
            } else {
                Ok((format!("ok:{prompt}"), Usage::default()))
            }
        });
        let repl = PyO3Repl::new(query_fn, 2, Duration::from_secs(5)).unwrap();
        let result = repl
            .execute("out = llm_query_batched(['good', 'bad'])\nprint(out)", 1)
            .unwrap();
        assert!(result.stdout.contains("ok:good"));
        assert!(result.stdout.contains("[ERROR: boom]"));
    }

    #[test]
    fn add_context_binds_string_variable() {
        let repl = repl();
        repl.add_context("context", "hello world").unwrap();
        let result = repl.execute("print(len(context))", 1).unwrap();
        assert_eq!(result.stdout.trim(), "11");
    }

    #[test]
    fn add_context_data_binds_list() {
        let repl = repl();
        repl.add_context_data(
            "context",
            &ContextData::List(vec!["a".to_string(), "b".to_string()]),
        )
        .unwrap();
        let result = repl.execute("print(len(context))", 1).unwrap();
        assert_eq!(result.stdout.trim(), "2");
    }

    #[test]
    fn resolve_variable_reads_bound_value() {
        let repl = repl();
        repl.execute("answer = 42", 1).unwrap();
        assert_eq!(repl.resolve_variable("answer"), Some("42".to_string()));
        assert_eq!(repl.resolve_variable("missing"), None);
    }

    #[test]
    fn snapshot_locals_excludes_injected_names() {
        let repl = repl();
        repl.execute("y = 5", 1).unwrap();
        let locals = repl.snapshot_locals().unwrap();
        assert!(locals.contains_key("y"));
        assert!(!locals.contains_key("llm_query"));
        assert!(!locals.contains_key("context"));
    }

    #[test]
    fn timeout_reports_failure() {
        let repl = PyO3Repl::new(
            Arc::new(|_: &str| Ok((String::new(), Usage::default()))),
            1,
            Duration::from_millis(50),
        )
        .unwrap();
        let result = repl.execute("import time\ntime.sleep(2)", 1).unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timeout"));
    }
}
