use glam::Vec3;
use umbra::{
    screen_target, Camera, ConfigChange, FlyControl, FrameInput, FrameOutcome, FrameOutput, Key,
    LightingSettings, OrbitControl, Scene, ShadowLight, ShadowMapConfig, ShadowPipeline,
    ShadowSettings, Window, WindowSettings,
};

const RESOLUTIONS: [u32; 5] = [256, 512, 1024, 2048, 4096];
const BIAS_FACTOR_STEP: f32 = 0.5;
const BIAS_UNITS_STEP: f32 = 1.0;
const PCF_STEP: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlMode {
    Mouse,
    Fly,
}

struct ForestViewer {
    scene: Scene,
    settings: ShadowSettings,
    light: ShadowLight,
    camera: Camera,
    orbit: OrbitControl,
    fly: FlyControl,
    mode: ControlMode,
    // Created on the first frame, once the surface format is known.
    pipeline: Option<ShadowPipeline>,
}

impl ForestViewer {
    fn new() -> Self {
        Self {
            scene: Scene::forest(),
            settings: ShadowSettings::new(ShadowMapConfig::default()),
            light: ShadowLight::default(),
            camera: Camera::new_perspective(
                Vec3::new(0.0, 6.0, 20.0),
                Vec3::new(0.0, 2.0, 0.0),
                Vec3::Y,
                45.0,
                1.0,
                0.5,
                1000.0,
            ),
            orbit: OrbitControl::default(),
            fly: FlyControl::default(),
            mode: ControlMode::Mouse,
            pipeline: None,
        }
    }

    fn frame(&mut self, mut input: FrameInput<'_>) -> FrameOutput {
        let ctx = input.ctx;
        if self.pipeline.is_none() {
            match ShadowPipeline::new(
                ctx,
                input.surface_format,
                *self.settings.config(),
                LightingSettings::default(),
            ) {
                Ok(pipeline) => self.pipeline = Some(pipeline),
                Err(e) => {
                    log::error!("Failed to create shadow pipeline: {:#}", e);
                    return FrameOutput::exit();
                }
            }
        }
        let Some(pipeline) = self.pipeline.as_mut() else {
            return FrameOutput::exit();
        };

        match self.mode {
            ControlMode::Mouse => self.orbit.handle_events(&mut self.camera, &mut input.events),
            ControlMode::Fly => self.fly.handle_events(
                &mut self.camera,
                &mut input.events,
                input.delta_time as f32,
            ),
        }

        for (key, _) in input.take_key_presses() {
            match key {
                Key::Escape => return FrameOutput::exit(),
                Key::Key1 | Key::Key2 | Key::Key3 | Key::Key4 | Key::Key5 => {
                    let index = match key {
                        Key::Key1 => 0,
                        Key::Key2 => 1,
                        Key::Key3 => 2,
                        Key::Key4 => 3,
                        _ => 4,
                    };
                    self.settings.push(ConfigChange::Resolution(RESOLUTIONS[index]));
                }
                Key::F => self.settings.push(ConfigChange::ToggleFilter),
                Key::C => self.settings.push(ConfigChange::ToggleCullFrontFaces),
                Key::Up | Key::Down => {
                    let step = if key == Key::Up {
                        BIAS_FACTOR_STEP
                    } else {
                        -BIAS_FACTOR_STEP
                    };
                    let factor = self.settings.requested().bias.factor + step;
                    self.settings.push(ConfigChange::BiasFactor(factor));
                }
                Key::Right | Key::Left => {
                    let step = if key == Key::Right {
                        BIAS_UNITS_STEP
                    } else {
                        -BIAS_UNITS_STEP
                    };
                    let units = self.settings.requested().bias.units + step;
                    self.settings.push(ConfigChange::BiasUnits(units));
                }
                Key::PageUp | Key::PageDown => {
                    let step = if key == Key::PageUp { PCF_STEP } else { -PCF_STEP };
                    let offset = self.settings.requested().pcf_offset + step;
                    self.settings.push(ConfigChange::PcfOffset(offset));
                }
                Key::X | Key::Z => {
                    let lighting = pipeline.lighting_mut();
                    let scale = if key == Key::X { 2.0 } else { 0.5 };
                    lighting.set_exposure(lighting.exposure * scale);
                    log::info!("Exposure {}", lighting.exposure);
                }
                Key::Tab => {
                    self.mode = match self.mode {
                        ControlMode::Mouse => ControlMode::Fly,
                        ControlMode::Fly => ControlMode::Mouse,
                    };
                    self.fly.reset();
                    log::info!("Control mode {:?}", self.mode);
                }
                Key::P => self.camera.toggle_projection(),
                Key::R => self.camera.reset(),
                _ => {}
            }
        }

        let had_pending = self.settings.has_pending();
        let applied = match pipeline.begin_frame(ctx, &mut self.settings) {
            Ok(applied) => applied,
            Err(e) => {
                log::error!("Failed to rebuild shadow pipeline: {:#}", e);
                return FrameOutput::exit();
            }
        };
        if had_pending {
            let config = self.settings.config();
            log::info!(
                "Shadow map {}x{} {}, bias factor {} units {}, pcf {}, cull front {}",
                config.resolution,
                config.resolution,
                config.filter,
                config.bias.factor,
                config.bias.units,
                config.pcf_offset,
                config.cull_front_faces
            );
        }
        if let Some(e) = applied.rejected {
            log::warn!("Shadow map change rejected: {}", e);
        }

        let uploaded = self.scene.poll_loads(ctx);
        if uploaded > 0 {
            log::debug!("Uploaded {} meshes", uploaded);
        }

        self.camera.set_viewport(input.viewport);
        let target = screen_target(&input);
        let items = self.scene.draw_list();

        let mut encoder = ctx.create_encoder(Some("forest frame"));
        let outcome = pipeline.render(
            ctx,
            &mut encoder,
            &target,
            &self.camera,
            &self.light,
            &items,
        );
        ctx.submit([encoder.finish()]);

        if let FrameOutcome::Skipped(e) = outcome {
            log::debug!("Frame skipped: {}", e);
        }
        FrameOutput::new()
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let settings = WindowSettings::default().title("umbra forest");
    Window::new(settings).render_loop(ForestViewer::new(), |viewer, input| viewer.frame(input))
}
