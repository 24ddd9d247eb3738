//! Python bindings for `monarch`.
//!
//! Exposes a `Tokenizer` compiled from a JSON grammar description and the
//! opaque `LineState` threaded from one line to the next. Offsets handed to
//! Python are character offsets into the `str` that was tokenized.

use monarch::{LexicalState, Token};
use pyo3::create_exception;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

create_exception!(_monarch, CompileError, PyValueError);
create_exception!(_monarch, TokenizeError, PyValueError);

/// The state carried from the end of one line to the start of the next.
#[pyclass(name = "LineState", module = "monarch", frozen, eq, hash)]
#[derive(Clone, PartialEq, Eq, Hash)]
struct PyLineState(LexicalState);

#[pymethods]
impl PyLineState {
    /// The host grammar's state stack, innermost state first.
    #[getter]
    fn stack(&self) -> Vec<String> {
        self.0.stack().states().map(str::to_string).collect()
    }

    /// The id of the embedded language active at this point, if any.
    #[getter]
    fn embedded(&self) -> Option<String> {
        self.0.embedded().map(|context| context.language_id.to_string())
    }

    fn __repr__(&self) -> String {
        let stack = self.stack().join(", ");
        match self.embedded() {
            Some(language) => format!("LineState([{stack}], embedded={language:?})"),
            None => format!("LineState([{stack}])"),
        }
    }
}

/// A line tokenizer compiled from a JSON grammar description.
#[pyclass(name = "Tokenizer", module = "monarch", frozen)]
struct PyTokenizer(monarch::Tokenizer);

#[pymethods]
impl PyTokenizer {
    #[new]
    fn new(language_id: &str, definition_json: &str) -> PyResult<Self> {
        monarch::Tokenizer::from_json(language_id, definition_json)
            .map(Self)
            .map_err(|err| CompileError::new_err(err.to_string()))
    }

    /// The language id the grammar was compiled for.
    #[getter]
    fn language_id(&self) -> &str {
        self.0.language_id()
    }

    /// The state the first line of a document starts in.
    fn initial_state(&self) -> PyLineState {
        PyLineState(self.0.initial_state())
    }

    /// Tokenizes one line, returning `([(offset, classification)], end_state)`.
    #[pyo3(signature = (line, state, has_eol = true))]
    fn tokenize(
        &self,
        py: Python<'_>,
        line: &str,
        state: &PyLineState,
        has_eol: bool,
    ) -> PyResult<(Vec<(usize, String)>, PyLineState)> {
        let result = py
            .allow_threads(|| self.0.tokenize(line, has_eol, &state.0))
            .map_err(|err| TokenizeError::new_err(err.to_string()))?;
        Ok((
            char_offsets(line, result.tokens),
            PyLineState(result.end_state),
        ))
    }

    fn __repr__(&self) -> String {
        format!("Tokenizer({:?})", self.0.language_id())
    }
}

/// Rewrites byte offsets as character offsets. Tokens arrive in offset order.
fn char_offsets(line: &str, tokens: Vec<Token>) -> Vec<(usize, String)> {
    let mut chars = 0;
    let mut bytes = 0;
    tokens
        .into_iter()
        .map(|token| {
            let end = token.offset.min(line.len());
            if end > bytes {
                chars += line[bytes..end].chars().count();
                bytes = end;
            }
            (chars, token.classification)
        })
        .collect()
}

#[pymodule]
fn _monarch(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyTokenizer>()?;
    m.add_class::<PyLineState>()?;
    m.add("CompileError", m.py().get_type::<CompileError>())?;
    m.add("TokenizeError", m.py().get_type::<TokenizeError>())?;
    Ok(())
}
