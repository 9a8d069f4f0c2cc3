use thiserror::Error;

use crate::geom::TriangulateError;
use crate::gpu::{GpuError, ProgramError};
use crate::paint::ImageError;
use crate::shader::SelectError;

/// Why a draw was skipped.
///
/// Public drawing entry points never return these; they log them and bump
/// [`EngineStats::skipped_draws`](super::EngineStats::skipped_draws).
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error(transparent)]
    Program(#[from] ProgramError),

    #[error(transparent)]
    Triangulation(#[from] TriangulateError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("painter path exceeds +/-32767 pixels")]
    GeometryTooLarge,

    #[error("no source for the fragment color")]
    NoBrush,

    #[error("shader program `{0}` is unavailable")]
    ProgramUnavailable(String),

    #[error("shader selection failed: {0}")]
    Selection(SelectError),
}

impl From<SelectError> for RenderError {
    fn from(err: SelectError) -> Self {
        match err {
            SelectError::Unavailable(label) => RenderError::ProgramUnavailable(label),
            SelectError::NoSource => RenderError::NoBrush,
            other => RenderError::Selection(other),
        }
    }
}

impl RenderError {
    /// The caller asked for something the engine cannot express, as opposed
    /// to a resource or backend failure.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, RenderError::NoBrush | RenderError::Selection(_))
    }
}
