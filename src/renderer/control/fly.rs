//! Fly-mode camera control
//!
//! W/S dolly along the view direction, A/D track sideways, Q/E move up and
//! down. Dragging with the left button turns the view.

use crate::renderer::viewer::Camera;
use crate::window::event::{Event, Key, MouseButton};
use glam::{Quat, Vec3};

/// Keyboard-driven fly camera.
#[derive(Debug, Clone)]
pub struct FlyControl {
    /// Units per second.
    pub move_speed: f32,
    /// Radians per pixel of drag.
    pub turn_speed: f32,
    forward: bool,
    backward: bool,
    left: bool,
    right: bool,
    up: bool,
    down: bool,
    turning: bool,
}

impl FlyControl {
    pub fn new(move_speed: f32, turn_speed: f32) -> Self {
        Self {
            move_speed,
            turn_speed,
            forward: false,
            backward: false,
            left: false,
            right: false,
            up: false,
            down: false,
            turning: false,
        }
    }

    /// Consume movement keys and drags, then move the camera.
    pub fn handle_events(&mut self, camera: &mut Camera, events: &mut [Event], delta_time: f32) {
        for event in events.iter_mut() {
            if event.is_handled() {
                continue;
            }

            match event {
                Event::KeyPress { key, .. } => {
                    if self.set_key(*key, true) {
                        event.set_handled();
                    }
                }
                Event::KeyRelease { key, .. } => {
                    if self.set_key(*key, false) {
                        event.set_handled();
                    }
                }
                Event::MousePress {
                    button: MouseButton::Left,
                    ..
                } => {
                    self.turning = true;
                    event.set_handled();
                }
                Event::MouseRelease {
                    button: MouseButton::Left,
                    ..
                } => {
                    self.turning = false;
                    event.set_handled();
                }
                Event::MouseMotion { delta, .. } if self.turning => {
                    self.turn(camera, delta.0, delta.1);
                    event.set_handled();
                }
                _ => {}
            }
        }

        self.advance(camera, delta_time);
    }

    /// Release every held key, e.g. when leaving fly mode.
    pub fn reset(&mut self) {
        *self = Self::new(self.move_speed, self.turn_speed);
    }

    fn set_key(&mut self, key: Key, pressed: bool) -> bool {
        let flag = match key {
            Key::W => &mut self.forward,
            Key::S => &mut self.backward,
            Key::A => &mut self.left,
            Key::D => &mut self.right,
            Key::Q => &mut self.up,
            Key::E => &mut self.down,
            _ => return false,
        };
        *flag = pressed;
        true
    }

    fn advance(&self, camera: &mut Camera, delta_time: f32) {
        let axis = |positive: bool, negative: bool| positive as i32 as f32 - negative as i32 as f32;
        let dolly = axis(self.forward, self.backward);
        let track = axis(self.right, self.left);
        let lift = axis(self.up, self.down);
        if dolly == 0.0 && track == 0.0 && lift == 0.0 {
            return;
        }

        let step = self.move_speed * delta_time;
        let motion =
            (camera.forward() * dolly + camera.right() * track + camera.up * lift) * step;
        camera.position += motion;
        camera.target += motion;
    }

    /// Yaw around the up axis and pitch around the camera's right axis.
    fn turn(&self, camera: &mut Camera, dx: f32, dy: f32) {
        let offset = camera.target - camera.position;
        let yaw = Quat::from_axis_angle(camera.up, -dx * self.turn_speed);
        let pitch = Quat::from_axis_angle(camera.right(), -dy * self.turn_speed);
        let turned = yaw * pitch * offset;
        if turned.normalize().dot(camera.up).abs() < 0.995 {
            camera.target = camera.position + turned;
        } else {
            camera.target = camera.position + yaw * offset;
        }
    }
}

impl Default for FlyControl {
    fn default() -> Self {
        Self::new(6.0, 0.004)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::event::Modifiers;

    fn camera() -> Camera {
        Camera::new_perspective(
            Vec3::new(0.0, 2.0, 10.0),
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::Y,
            45.0,
            1.0,
            0.5,
            1000.0,
        )
    }

    fn key(key: Key, pressed: bool) -> Event {
        if pressed {
            Event::KeyPress {
                key,
                modifiers: Modifiers::default(),
                handled: false,
            }
        } else {
            Event::KeyRelease {
                key,
                modifiers: Modifiers::default(),
                handled: false,
            }
        }
    }

    #[test]
    fn test_w_dollies_forward() {
        let mut camera = camera();
        let mut control = FlyControl::new(2.0, 0.01);
        control.handle_events(&mut camera, &mut [key(Key::W, true)], 0.5);
        assert!((camera.position - Vec3::new(0.0, 2.0, 9.0)).length() < 1e-5);
        assert!((camera.target - Vec3::new(0.0, 2.0, -1.0)).length() < 1e-5);

        control.handle_events(&mut camera, &mut [key(Key::W, false)], 0.5);
        assert!((camera.position - Vec3::new(0.0, 2.0, 9.0)).length() < 1e-5);
    }

    #[test]
    fn test_q_e_move_vertically() {
        let mut camera = camera();
        let mut control = FlyControl::new(1.0, 0.01);
        control.handle_events(&mut camera, &mut [key(Key::Q, true)], 1.0);
        assert!((camera.position.y - 3.0).abs() < 1e-5);
        control.handle_events(
            &mut camera,
            &mut [key(Key::Q, false), key(Key::E, true)],
            2.0,
        );
        assert!((camera.position.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_other_keys_pass_through() {
        let mut camera = camera();
        let mut events = [key(Key::F, true)];
        FlyControl::default().handle_events(&mut camera, &mut events, 1.0);
        assert!(!events[0].is_handled());
    }

    #[test]
    fn test_drag_turns_view() {
        let mut camera = camera();
        let mut control = FlyControl::new(1.0, 0.01);
        let mut events = [
            Event::MousePress {
                button: MouseButton::Left,
                position: (0.0, 0.0),
                modifiers: Modifiers::default(),
                handled: false,
            },
            Event::MouseMotion {
                delta: (100.0, 0.0),
                position: (100.0, 0.0),
                modifiers: Modifiers::default(),
                handled: false,
            },
        ];
        control.handle_events(&mut camera, &mut events, 0.0);
        assert_eq!(camera.position, Vec3::new(0.0, 2.0, 10.0));
        assert!(camera.forward().x > 0.5);
    }
}
