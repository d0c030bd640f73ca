//! Action verbs and the reply shape each verb expects.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Operations the coordinator can request from a worker.
///
/// The wire name is the camel-cased variant (`getInfo`, `runAdHocTest`, ...).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Action {
    /// Worker platform and interpreter details.
    GetInfo,
    /// Run a single test with ad-hoc arguments.
    RunAdHocTest,
    /// Apply slicing and transformation functions to a dataset.
    DatasetProcessing,
    /// Run a whole test suite.
    RunTestSuite,
    /// Run a model over a stored dataset; completion only.
    RunModel,
    /// Run a model over an inline data frame.
    RunModelForDataFrame,
    /// Explain a tabular prediction.
    Explain,
    /// Explain a text prediction.
    ExplainText,
    /// Round-trip a message through the worker.
    Echo,
    /// Generate a test suite for a project.
    GenerateTestSuite,
    /// List the tests, slices and transformations the worker knows.
    GetCatalog,
    /// Ask the worker to stop; completion only.
    StopWorker,
    /// Build a slicing function from a query; completion only.
    GenerateQueryBasedSlicingFunction,
}

/// Shape of the body carried by a verb's terminal reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ReplyShape {
    /// [`crate::reply::WorkerInfo`].
    WorkerInfo,
    /// [`crate::reply::AdHocTestResult`].
    AdHocTestResult,
    /// [`crate::reply::DatasetProcessingResult`].
    DatasetProcessingResult,
    /// [`crate::reply::TestSuiteResult`].
    TestSuiteResult,
    /// [`crate::reply::DataFrameModelResult`].
    DataFrameModelResult,
    /// [`crate::reply::ExplainResult`].
    ExplainResult,
    /// [`crate::reply::ExplainTextResult`].
    ExplainTextResult,
    /// [`crate::reply::EchoMessage`].
    EchoMessage,
    /// [`crate::reply::TestSuiteGenerationResult`].
    TestSuiteGenerationResult,
    /// [`crate::reply::Catalog`].
    Catalog,
    /// The terminal reply only acknowledges completion.
    NoPayload,
}

impl Action {
    /// Returns the shape the terminal reply body must decode into.
    #[must_use]
    pub const fn reply_shape(self) -> ReplyShape {
        match self {
            Self::GetInfo => ReplyShape::WorkerInfo,
            Self::RunAdHocTest => ReplyShape::AdHocTestResult,
            Self::DatasetProcessing => ReplyShape::DatasetProcessingResult,
            Self::RunTestSuite => ReplyShape::TestSuiteResult,
            Self::RunModelForDataFrame => ReplyShape::DataFrameModelResult,
            Self::Explain => ReplyShape::ExplainResult,
            Self::ExplainText => ReplyShape::ExplainTextResult,
            Self::Echo => ReplyShape::EchoMessage,
            Self::GenerateTestSuite => ReplyShape::TestSuiteGenerationResult,
            Self::GetCatalog => ReplyShape::Catalog,
            Self::RunModel | Self::StopWorker | Self::GenerateQueryBasedSlicingFunction => {
                ReplyShape::NoPayload
            }
        }
    }

    /// Returns `true` when the verb's terminal reply carries a body.
    #[must_use]
    pub const fn expects_payload(self) -> bool {
        !matches!(self.reply_shape(), ReplyShape::NoPayload)
    }
}
