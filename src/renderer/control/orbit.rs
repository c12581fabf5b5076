//! Mouse-mode camera control
//!
//! Left drag orbits around the camera target, shift + left drag tracks the
//! camera and its target sideways, the wheel dollies toward the target.

use crate::renderer::viewer::Camera;
use crate::window::event::{Event, MouseButton};
use glam::{Quat, Vec3};

/// Orbit camera control.
#[derive(Debug, Clone)]
pub struct OrbitControl {
    /// Closest allowed distance to the target.
    pub min_distance: f32,
    /// Farthest allowed distance to the target.
    pub max_distance: f32,
    /// Radians per pixel of drag.
    pub rotate_speed: f32,
    /// Fraction of the distance moved per wheel unit.
    pub dolly_speed: f32,
    /// Fraction of the distance tracked per pixel of drag.
    pub track_speed: f32,
    dragging: bool,
}

impl OrbitControl {
    pub fn new(min_distance: f32, max_distance: f32) -> Self {
        Self {
            min_distance,
            max_distance,
            rotate_speed: 0.005,
            dolly_speed: 0.002,
            track_speed: 0.0015,
            dragging: false,
        }
    }

    /// Consume mouse events and move the camera.
    pub fn handle_events(&mut self, camera: &mut Camera, events: &mut [Event]) {
        for event in events.iter_mut() {
            if event.is_handled() {
                continue;
            }

            match event {
                Event::MousePress {
                    button: MouseButton::Left,
                    ..
                } => {
                    self.dragging = true;
                    event.set_handled();
                }
                Event::MouseRelease {
                    button: MouseButton::Left,
                    ..
                } => {
                    self.dragging = false;
                    event.set_handled();
                }
                Event::MouseMotion {
                    delta, modifiers, ..
                } if self.dragging => {
                    if modifiers.shift {
                        self.track(camera, delta.0, delta.1);
                    } else {
                        self.orbit(camera, delta.0, delta.1);
                    }
                    event.set_handled();
                }
                Event::MouseWheel { delta, .. } => {
                    self.dolly(camera, delta.1);
                    event.set_handled();
                }
                _ => {}
            }
        }
    }

    /// Rotate the camera around its target.
    pub fn orbit(&self, camera: &mut Camera, dx: f32, dy: f32) {
        let offset = camera.position - camera.target;
        let yaw = Quat::from_axis_angle(camera.up, -dx * self.rotate_speed);
        let mut rotated = yaw * offset;

        let right = camera.up.cross(rotated).normalize_or_zero();
        if right != Vec3::ZERO {
            let pitched = Quat::from_axis_angle(right, -dy * self.rotate_speed) * rotated;
            // Stay clear of the poles where the view basis degenerates.
            if pitched.normalize().dot(camera.up).abs() < 0.995 {
                rotated = pitched;
            }
        }

        camera.position = camera.target + rotated;
    }

    /// Move the camera and target together in the view plane.
    pub fn track(&self, camera: &mut Camera, dx: f32, dy: f32) {
        let distance = (camera.position - camera.target).length();
        let right = camera.right();
        let up = right.cross(camera.forward()).normalize();
        let shift = (right * -dx + up * dy) * self.track_speed * distance;
        camera.position += shift;
        camera.target += shift;
    }

    /// Move toward (positive) or away from the target.
    pub fn dolly(&self, camera: &mut Camera, amount: f32) {
        let offset = camera.position - camera.target;
        let distance = offset.length();
        if distance <= f32::EPSILON {
            return;
        }
        let new_distance = (distance * (1.0 - amount * self.dolly_speed))
            .clamp(self.min_distance, self.max_distance);
        camera.position = camera.target + offset / distance * new_distance;
    }
}

impl Default for OrbitControl {
    fn default() -> Self {
        Self::new(1.0, 200.0)
    }
}
