//! Camera controls
//!
//! Map window input to camera motion.

mod fly;
mod orbit;

pub use fly::FlyControl;
pub use orbit::OrbitControl;
