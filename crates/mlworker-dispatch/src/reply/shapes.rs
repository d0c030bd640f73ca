//! Terminal reply payloads, one per verb.
//!
//! Only the top-level layout is typed. Nested test, slice and model data is
//! kept as raw JSON for the callers that understand it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reply to `getInfo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerInfo {
    /// Host platform description.
    pub platform: Value,
    /// Interpreter executable.
    pub interpreter: String,
    /// Interpreter version string.
    pub interpreter_version: String,
    /// Installed package names mapped to versions.
    #[serde(default)]
    pub installed_packages: BTreeMap<String, String>,
    /// Address of the worker's internal RPC endpoint.
    #[serde(default)]
    pub internal_grpc_address: String,
    /// Whether the worker runs outside the coordinator's host.
    pub is_remote: bool,
    /// Worker process id.
    pub pid: u64,
    /// Worker start time, seconds since the Unix epoch.
    pub process_start_time: u64,
    /// Version of the worker's client library.
    #[serde(default)]
    pub giskard_client_version: String,
}

/// Reply to `runAdHocTest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdHocTestResult {
    /// One entry per executed test argument set.
    pub results: Vec<Value>,
}

/// Reply to `datasetProcessing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetProcessingResult {
    /// Processed dataset.
    pub dataset_id: String,
    /// Row count before filtering.
    pub total_rows: u64,
    /// Indices of rows removed by slicing functions.
    #[serde(default)]
    pub filtered_rows: Vec<u64>,
    /// Cell modifications made by transformation functions.
    #[serde(default)]
    pub modifications: Vec<Value>,
}

/// Reply to `runTestSuite`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSuiteResult {
    /// Whether any test errored.
    pub is_error: bool,
    /// Whether every test passed.
    pub is_pass: bool,
    /// Per-test results.
    #[serde(default)]
    pub results: Vec<Value>,
    /// Captured worker log output.
    #[serde(default)]
    pub logs: String,
}

/// Reply to `runModelForDataFrame`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrameModelResult {
    /// Predicted label or value per row.
    pub prediction: Vec<String>,
    /// Per-class predictions, when the model is a classifier.
    #[serde(default)]
    pub all_predictions: Option<Value>,
    /// Probability of the predicted class per row.
    #[serde(default)]
    pub probabilities: Option<Vec<f64>>,
    /// Raw regression output per row.
    #[serde(default)]
    pub raw_prediction: Option<Vec<f64>>,
}

/// Reply to `explain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainResult {
    /// Feature contributions keyed by label.
    pub explanations: BTreeMap<String, Value>,
}

/// Reply to `explainText`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainTextResult {
    /// Tokens of the explained text.
    pub words: Vec<String>,
    /// Per-label token weights.
    pub weights: BTreeMap<String, Value>,
}

/// Reply to `echo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoMessage {
    /// Message sent back by the worker.
    pub msg: String,
}

/// Reply to `generateTestSuite`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSuiteGenerationResult {
    /// Generated test definitions.
    pub tests: Vec<Value>,
}

/// Reply to `getCatalog`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Tests keyed by identifier.
    pub tests: BTreeMap<String, Value>,
    /// Slicing functions keyed by identifier.
    pub slices: BTreeMap<String, Value>,
    /// Transformation functions keyed by identifier.
    pub transformations: BTreeMap<String, Value>,
}
