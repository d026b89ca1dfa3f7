//! Classify a finished worker's stderr into `no_err` / `mem_err` / `other_err`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of matching a worker's stderr against the classification rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// No failure marker found.
    #[serde(rename = "no_err")]
    NoError,
    /// Transient device memory / driver condition; candidate for resubmission.
    #[serde(rename = "mem_err")]
    Memory,
    /// Any other fatal condition; terminal for this job.
    #[serde(rename = "other_err")]
    Other,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorClass::NoError => "no_err",
            ErrorClass::Memory => "mem_err",
            ErrorClass::Other => "other_err",
        };
        f.write_str(s)
    }
}

/// `marker` found anywhere in stderr means `class`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifyRule {
    pub marker: String,
    pub class: ErrorClass,
}

impl ClassifyRule {
    pub fn new(marker: impl Into<String>, class: ErrorClass) -> Self {
        Self {
            marker: marker.into(),
            class,
        }
    }
}

/// Built-in rules. The driver-unload message is checked first; it is the only
/// condition treated as recoverable. Whether it really is recoverable is not
/// established, which is why the rules live in configuration.
pub fn default_rules() -> Vec<ClassifyRule> {
    vec![
        ClassifyRule::new("cudaErrorCudartUnloading", ErrorClass::Memory),
        ClassifyRule::new("core dumped", ErrorClass::Other),
        ClassifyRule::new("Can't open", ErrorClass::Other),
        ClassifyRule::new("cuda", ErrorClass::Other),
        ClassifyRule::new("bad_alloc", ErrorClass::Other),
        ClassifyRule::new("Aborted", ErrorClass::Other),
    ]
}

/// Ordered rule list; the first rule (in list order) whose marker occurs wins.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<ClassifyRule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl Classifier {
    pub fn new(rules: Vec<ClassifyRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ClassifyRule] {
        &self.rules
    }

    pub fn classify(&self, stderr: &str) -> ErrorClass {
        self.rules
            .iter()
            .find(|r| !r.marker.is_empty() && stderr.contains(&r.marker))
            .map(|r| r.class)
            .unwrap_or(ErrorClass::NoError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_output_is_no_err() {
        let c = Classifier::default();
        assert_eq!(c.classify(""), ErrorClass::NoError);
        assert_eq!(c.classify("Aligning 12 segments\nDone.\n"), ErrorClass::NoError);
    }

    #[test]
    fn driver_unload_is_mem_err() {
        let c = Classifier::default();
        let stderr = "GPU 0: cuda call failed: cudaErrorCudartUnloading\n";
        assert_eq!(c.classify(stderr), ErrorClass::Memory);
    }

    #[test]
    fn driver_unload_wins_over_other_markers_regardless_of_position() {
        let c = Classifier::default();
        let stderr = "Aborted (core dumped)\n... cudaErrorCudartUnloading\n";
        assert_eq!(c.classify(stderr), ErrorClass::Memory);
    }

    #[test]
    fn fatal_markers_are_other_err() {
        let c = Classifier::default();
        for s in [
            "Segfault (core dumped)",
            "Can't open /data/chunk_3",
            "terminate called after throwing an instance of 'std::bad_alloc'",
            "Aborted",
            "cudaErrorMemoryAllocation: out of memory on cuda device",
        ] {
            assert_eq!(c.classify(s), ErrorClass::Other, "stderr: {s}");
        }
    }

    #[test]
    fn custom_rules_follow_list_order() {
        let c = Classifier::new(vec![
            ClassifyRule::new("benign warning", ErrorClass::NoError),
            ClassifyRule::new("warning", ErrorClass::Other),
            ClassifyRule::new("", ErrorClass::Other),
        ]);
        assert_eq!(c.classify("benign warning: x"), ErrorClass::NoError);
        assert_eq!(c.classify("warning: y"), ErrorClass::Other);
        assert_eq!(c.classify("all fine"), ErrorClass::NoError);
    }
}
