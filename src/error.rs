use thiserror::Error;

/// Failure modes of outline construction and baking.
///
/// Expected outcomes stay in plain return values (`Shape::validate`,
/// `Containment`, a zero winding); these variants cover invalid usage and
/// input the sweep cannot triangulate.
#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("edge resolution must be at least 3, got {value}")]
    InvalidEdgeResolution { value: u32 },

    #[error("contour has no edge to continue from")]
    EmptyContour,

    #[error("contour {contour} is not a closed loop")]
    OpenContour { contour: usize },

    #[error("duplicate outline point at ({x}, {y})")]
    DuplicatePoint { x: f32, y: f32 },

    #[error("collinear constraint points not supported")]
    CollinearConstraint,

    #[error("sweep failed: {message}")]
    SweepFailed { message: String },
}

pub type GeometryResult<T> = Result<T, GeometryError>;
