//! Decoding of terminal reply bodies.
//!
//! Each verb maps to one [`ReplyShape`]. A body that does not fit its
//! shape is retried as a [`WorkerErrorBody`] so worker-side failures surface
//! as remote errors rather than decode errors.

mod shapes;

use serde::de::DeserializeOwned;

pub use self::shapes::{
    AdHocTestResult, Catalog, DataFrameModelResult, DatasetProcessingResult, EchoMessage,
    ExplainResult, ExplainTextResult, TestSuiteGenerationResult, TestSuiteResult, WorkerInfo,
};
use crate::action::{Action, ReplyShape};
use crate::protocol::WorkerErrorBody;

/// Decoded terminal reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    /// `getInfo`.
    WorkerInfo(WorkerInfo),
    /// `runAdHocTest`.
    AdHocTest(AdHocTestResult),
    /// `datasetProcessing`.
    DatasetProcessing(DatasetProcessingResult),
    /// `runTestSuite`.
    TestSuite(TestSuiteResult),
    /// `runModelForDataFrame`.
    DataFrameModel(DataFrameModelResult),
    /// `explain`.
    Explain(ExplainResult),
    /// `explainText`.
    ExplainText(ExplainTextResult),
    /// `echo`.
    Echo(EchoMessage),
    /// `generateTestSuite`.
    GeneratedTestSuite(TestSuiteGenerationResult),
    /// `getCatalog`.
    Catalog(Catalog),
    /// Completion of a verb whose reply carries no payload.
    NoPayload,
}

impl ReplyBody {
    /// Shape of this body.
    #[must_use]
    pub const fn shape(&self) -> ReplyShape {
        match self {
            Self::WorkerInfo(_) => ReplyShape::WorkerInfo,
            Self::AdHocTest(_) => ReplyShape::AdHocTestResult,
            Self::DatasetProcessing(_) => ReplyShape::DatasetProcessingResult,
            Self::TestSuite(_) => ReplyShape::TestSuiteResult,
            Self::DataFrameModel(_) => ReplyShape::DataFrameModelResult,
            Self::Explain(_) => ReplyShape::ExplainResult,
            Self::ExplainText(_) => ReplyShape::ExplainTextResult,
            Self::Echo(_) => ReplyShape::EchoMessage,
            Self::GeneratedTestSuite(_) => ReplyShape::TestSuiteGenerationResult,
            Self::Catalog(_) => ReplyShape::Catalog,
            Self::NoPayload => ReplyShape::NoPayload,
        }
    }
}

/// Why a terminal body could not be turned into a [`ReplyBody`].
#[derive(Debug)]
pub enum DecodeFailure {
    /// The worker reported an error instead of a result.
    Remote(WorkerErrorBody),
    /// The body matched neither the verb's shape nor the error layout.
    Malformed(serde_json::Error),
}

type Decoder = fn(&str) -> serde_json::Result<ReplyBody>;

fn parse<T: DeserializeOwned>(body: &str) -> serde_json::Result<T> {
    serde_json::from_str(body)
}

fn decoder_for(shape: ReplyShape) -> Option<Decoder> {
    let decoder: Decoder = match shape {
        ReplyShape::WorkerInfo => |body| parse(body).map(ReplyBody::WorkerInfo),
        ReplyShape::AdHocTestResult => |body| parse(body).map(ReplyBody::AdHocTest),
        ReplyShape::DatasetProcessingResult => |body| parse(body).map(ReplyBody::DatasetProcessing),
        ReplyShape::TestSuiteResult => |body| parse(body).map(ReplyBody::TestSuite),
        ReplyShape::DataFrameModelResult => |body| parse(body).map(ReplyBody::DataFrameModel),
        ReplyShape::ExplainResult => |body| parse(body).map(ReplyBody::Explain),
        ReplyShape::ExplainTextResult => |body| parse(body).map(ReplyBody::ExplainText),
        ReplyShape::EchoMessage => |body| parse(body).map(ReplyBody::Echo),
        ReplyShape::TestSuiteGenerationResult => {
            |body| parse(body).map(ReplyBody::GeneratedTestSuite)
        }
        ReplyShape::Catalog => |body| parse(body).map(ReplyBody::Catalog),
        ReplyShape::NoPayload => return None,
    };
    Some(decoder)
}

/// Decodes the terminal body of `action`.
///
/// Completion-only verbs yield [`ReplyBody::NoPayload`] unless the body is a
/// worker error.
///
/// # Errors
///
/// Returns [`DecodeFailure::Remote`] when the worker reported an error and
/// [`DecodeFailure::Malformed`] when the body fits no known layout.
pub fn decode_reply(action: Action, body: &str) -> Result<ReplyBody, DecodeFailure> {
    let Some(decode) = decoder_for(action.reply_shape()) else {
        return parse::<WorkerErrorBody>(body)
            .map_or(Ok(ReplyBody::NoPayload), |error| Err(DecodeFailure::Remote(error)));
    };
    decode(body).map_err(|shape_error| {
        parse::<WorkerErrorBody>(body)
            .map_or_else(|_| DecodeFailure::Malformed(shape_error), DecodeFailure::Remote)
    })
}
