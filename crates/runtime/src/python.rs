// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Minimal Python bindings for the program lifecycle, mirroring the
//! `#[pyclass]`/`#[pymethods]` + `#[new]` shape used elsewhere in this
//! workspace's adapters for a thin wrapper around a Rust type.
//!
//! This is deliberately not a full scripting-language embedding: marshaling
//! [`vellum_value::Value`] to and from Python objects, and accepting
//! `Node` trees built by a Python-side parser, are both out of scope here
//! (the lexer/parser is an excluded collaborator — see the workspace's
//! scope note). What this module gives a Python host is the bit set and
//! the create/destroy lifecycle; running an actual program still goes
//! through [`crate::Program::run`] from Rust.

use pyo3::prelude::*;

use crate::parse_options::ParseOptions;
use crate::program::Program;

/// A Python-visible handle onto a [`Program`].
#[pyclass(name = "Program")]
#[derive(Debug)]
pub struct PyProgram {
    inner: Program,
}

#[pymethods]
impl PyProgram {
    /// Creates a program restricted by the named parse options, e.g.
    /// `Program(["no-network", "no-filesystem"])`.
    #[new]
    #[pyo3(signature = (options=vec![]))]
    fn py_new(options: Vec<String>) -> PyResult<Self> {
        let mut bits = ParseOptions::empty();
        for name in &options {
            let bit = ParseOptions::parse_name(name).map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))?;
            bits.insert(bit);
        }
        Ok(Self { inner: Program::create(bits) })
    }

    /// The currently-set option names, in declaration order.
    fn options(&self) -> Vec<&'static str> {
        self.inner.options().iter_names().collect()
    }

    fn __repr__(&self) -> String {
        format!("Program(options={})", self.inner.options())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_py_new_rejects_unknown_option_name() {
        let result = PyProgram::py_new(vec!["no-such-option".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn test_py_new_accepts_known_option_names() {
        let program = PyProgram::py_new(vec!["no-network".to_string()]).unwrap();
        assert_eq!(program.options(), vec!["no-network"]);
    }
}
