//! Window settings

/// Settings for creating a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSettings {
    pub title: String,
    /// Initial inner size (width, height) in logical pixels.
    pub size: (u32, u32),
    pub resizable: bool,
    pub vsync: bool,
    pub maximized: bool,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            title: "umbra".to_string(),
            size: (1280, 720),
            resizable: true,
            vsync: true,
            maximized: false,
        }
    }
}

impl WindowSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.size = (width, height);
        self
    }

    pub fn resizable(mut self, resizable: bool) -> Self {
        self.resizable = resizable;
        self
    }

    pub fn vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub fn maximized(mut self, maximized: bool) -> Self {
        self.maximized = maximized;
        self
    }

    /// Present mode matching the vsync setting.
    pub(crate) fn present_mode(&self) -> wgpu::PresentMode {
        if self.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let settings = WindowSettings::new()
            .title("forest")
            .size(800, 600)
            .vsync(false);
        assert_eq!(settings.title, "forest");
        assert_eq!(settings.size, (800, 600));
        assert_eq!(settings.present_mode(), wgpu::PresentMode::AutoNoVsync);
        assert!(settings.resizable);
    }
}
