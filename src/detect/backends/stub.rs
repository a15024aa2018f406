use std::collections::VecDeque;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawTensor;
use crate::error::{CounterError, Result};
use crate::frame::Frame;

enum Scripted {
    Output(Vec<RawTensor>),
    Failure(String),
}

/// Stub backend for testing and dry runs.
///
/// Scripted responses are served in order; once the script is exhausted every
/// call returns the fallback output.
pub struct StubBackend {
    script: VecDeque<Scripted>,
    fallback: Vec<RawTensor>,
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            fallback: Vec::new(),
            calls: 0,
        }
    }

    /// Return `output` for every frame.
    pub fn with_output(output: Vec<RawTensor>) -> Self {
        Self {
            fallback: output,
            ..Self::new()
        }
    }

    pub fn push_output(&mut self, output: Vec<RawTensor>) -> &mut Self {
        self.script.push_back(Scripted::Output(output));
        self
    }

    pub fn push_failure(&mut self, reason: &str) -> &mut Self {
        self.script.push_back(Scripted::Failure(reason.to_string()));
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn infer(&mut self, _frame: &Frame) -> Result<Vec<RawTensor>> {
        self.calls += 1;
        match self.script.pop_front() {
            Some(Scripted::Output(output)) => Ok(output),
            Some(Scripted::Failure(reason)) => Err(CounterError::Inference(reason)),
            None => Ok(self.fallback.clone()),
        }
    }
}
