//! Shadow mapping errors

use thiserror::Error;

/// Errors raised while configuring or rendering the shadow map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShadowError {
    /// The device cannot hold a depth texture of the requested size.
    #[error("shadow map resolution {requested} exceeds the device limit of {limit}")]
    ResourceAllocation { requested: u32, limit: u32 },

    /// A zero-sized shadow map was requested.
    #[error("invalid shadow map resolution {0}")]
    InvalidResolution(u32),

    /// The depth attachment has not been allocated.
    #[error("shadow depth target is incomplete")]
    IncompleteFramebuffer,

    /// The up hint is parallel to the light's viewing direction.
    #[error("light up vector is parallel to its viewing direction")]
    DegenerateOrientation,
}
