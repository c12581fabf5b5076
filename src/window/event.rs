//! Input events
//!
//! Platform-independent mouse and keyboard events, translated from winit.

/// Mouse button type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn from_winit(button: winit::event::MouseButton) -> Option<Self> {
        match button {
            winit::event::MouseButton::Left => Some(MouseButton::Left),
            winit::event::MouseButton::Right => Some(MouseButton::Right),
            winit::event::MouseButton::Middle => Some(MouseButton::Middle),
            _ => None,
        }
    }
}

/// Keys the viewer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    A,
    C,
    D,
    E,
    F,
    P,
    Q,
    R,
    S,
    W,
    X,
    Z,
    Key1,
    Key2,
    Key3,
    Key4,
    Key5,
    Escape,
    Tab,
    PageUp,
    PageDown,
    Left,
    Right,
    Up,
    Down,
    Shift,
}

impl Key {
    /// Convert from a winit logical key.
    pub fn from_winit(key: &winit::keyboard::Key) -> Option<Self> {
        use winit::keyboard::{Key as WKey, NamedKey};

        match key {
            WKey::Character(c) => match c.chars().next()?.to_ascii_lowercase() {
                'a' => Some(Key::A),
                'c' => Some(Key::C),
                'd' => Some(Key::D),
                'e' => Some(Key::E),
                'f' => Some(Key::F),
                'p' => Some(Key::P),
                'q' => Some(Key::Q),
                'r' => Some(Key::R),
                's' => Some(Key::S),
                'w' => Some(Key::W),
                'x' => Some(Key::X),
                'z' => Some(Key::Z),
                '1' => Some(Key::Key1),
                '2' => Some(Key::Key2),
                '3' => Some(Key::Key3),
                '4' => Some(Key::Key4),
                '5' => Some(Key::Key5),
                _ => None,
            },
            WKey::Named(named) => match named {
                NamedKey::Escape => Some(Key::Escape),
                NamedKey::Tab => Some(Key::Tab),
                NamedKey::PageUp => Some(Key::PageUp),
                NamedKey::PageDown => Some(Key::PageDown),
                NamedKey::ArrowLeft => Some(Key::Left),
                NamedKey::ArrowRight => Some(Key::Right),
                NamedKey::ArrowUp => Some(Key::Up),
                NamedKey::ArrowDown => Some(Key::Down),
                NamedKey::Shift => Some(Key::Shift),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Modifier key state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl Modifiers {
    pub fn from_winit(state: winit::keyboard::ModifiersState) -> Self {
        Self {
            shift: state.shift_key(),
            ctrl: state.control_key(),
            alt: state.alt_key(),
        }
    }

    pub fn any(&self) -> bool {
        self.shift || self.ctrl || self.alt
    }
}

/// Input event.
#[derive(Debug, Clone)]
pub enum Event {
    MousePress {
        button: MouseButton,
        position: (f32, f32),
        modifiers: Modifiers,
        handled: bool,
    },
    MouseRelease {
        button: MouseButton,
        position: (f32, f32),
        modifiers: Modifiers,
        handled: bool,
    },
    MouseMotion {
        delta: (f32, f32),
        position: (f32, f32),
        modifiers: Modifiers,
        handled: bool,
    },
    MouseWheel {
        delta: (f32, f32),
        position: (f32, f32),
        modifiers: Modifiers,
        handled: bool,
    },
    KeyPress {
        key: Key,
        modifiers: Modifiers,
        handled: bool,
    },
    KeyRelease {
        key: Key,
        modifiers: Modifiers,
        handled: bool,
    },
    Resize {
        width: u32,
        height: u32,
    },
}

impl Event {
    fn handled_flag(&mut self) -> Option<&mut bool> {
        match self {
            Event::MousePress { handled, .. }
            | Event::MouseRelease { handled, .. }
            | Event::MouseMotion { handled, .. }
            | Event::MouseWheel { handled, .. }
            | Event::KeyPress { handled, .. }
            | Event::KeyRelease { handled, .. } => Some(handled),
            Event::Resize { .. } => None,
        }
    }

    /// Whether a handler already consumed this event.
    pub fn is_handled(&self) -> bool {
        match self {
            Event::MousePress { handled, .. }
            | Event::MouseRelease { handled, .. }
            | Event::MouseMotion { handled, .. }
            | Event::MouseWheel { handled, .. }
            | Event::KeyPress { handled, .. }
            | Event::KeyRelease { handled, .. } => *handled,
            Event::Resize { .. } => false,
        }
    }

    /// Mark the event as consumed. Resize events are never consumed.
    pub fn set_handled(&mut self) {
        if let Some(handled) = self.handled_flag() {
            *handled = true;
        }
    }
}
