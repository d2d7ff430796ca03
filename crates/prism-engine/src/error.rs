use std::fmt;

use crate::coords::SingularMatrixError;
use crate::device::GpuHandle;

/// Errors surfaced by the renderer and its devices.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// A matrix inversion was requested on a singular matrix.
    SingularMatrix,
    /// The graphics context could not be created (unsupported or refused).
    ContextCreation(String),
    /// The device context is lost; the renderer absorbs this and waits for a restore.
    ContextLost,
    /// A batching precondition was violated (mixed base textures, bad sizes).
    BatchConstraint(String),
    /// The named operation was called after `destroy()`.
    DestroyedUse(&'static str),
    /// A device handle does not name a live resource of the expected kind.
    InvalidHandle { kind: &'static str, handle: GpuHandle },
    /// Resource parameters were rejected (sizes, pixel data, frames).
    InvalidResource(String),
    /// No object renderer with this name is registered.
    UnknownPlugin(&'static str),
    /// Backend failure that is not a context loss.
    Device(String),
}

pub type RenderResult<T> = Result<T, RenderError>;

impl RenderError {
    #[inline]
    pub fn is_context_lost(&self) -> bool {
        matches!(self, RenderError::ContextLost)
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::SingularMatrix => f.write_str("matrix is singular and cannot be inverted"),
            RenderError::ContextCreation(msg) => write!(f, "failed to create graphics context: {msg}"),
            RenderError::ContextLost => f.write_str("graphics context lost"),
            RenderError::BatchConstraint(msg) => write!(f, "batch constraint violated: {msg}"),
            RenderError::DestroyedUse(op) => write!(f, "`{op}` called on a destroyed renderer"),
            RenderError::InvalidHandle { kind, handle } => {
                write!(f, "invalid {kind} handle {}", handle.raw())
            }
            RenderError::InvalidResource(msg) => write!(f, "invalid resource: {msg}"),
            RenderError::UnknownPlugin(name) => write!(f, "no object renderer named `{name}`"),
            RenderError::Device(msg) => write!(f, "device error: {msg}"),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<SingularMatrixError> for RenderError {
    fn from(_: SingularMatrixError) -> Self {
        RenderError::SingularMatrix
    }
}
