//! Scene loading errors.

use stimply_resources::ResourceError;
use stimply_rhi::RhiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SceneError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("Mesh '{0}' has no vertices or indices")]
    EmptyMesh(String),

    #[error("Mesh loader thread {0} panicked")]
    WorkerPanicked(usize),
}

pub type SceneResult<T> = Result<T, SceneError>;

impl From<SceneError> for stimply_core::Error {
    fn from(err: SceneError) -> Self {
        match err {
            SceneError::Rhi(e) => e.into(),
            SceneError::Resource(e) => e.into(),
            e @ SceneError::EmptyMesh(_) => stimply_core::Error::Asset(e.to_string()),
            e @ SceneError::WorkerPanicked(_) => stimply_core::Error::Internal(e.to_string()),
        }
    }
}
