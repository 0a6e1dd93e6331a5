use thiserror::Error;

/// Conditions raised by the framed spectrum analyzer.
///
/// None of these are fatal for a run: the pipeline reports them and moves on
/// to the next stage.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("requested frame {requested} but only {available} frames were computed")]
    InvalidFrameIndex { requested: usize, available: usize },

    #[error("invalid frame length: {0}")]
    InvalidFrameLength(String),

    #[error("cannot analyze an empty signal")]
    EmptySignal,

    #[error("invalid input: {0}")]
    InvalidInput(String),
}
