//! Debug overlay hooks.
//!
//! The renderer calls a [`UiOverlay`] at three points of every frame:
//! `new_frame` after recording begins, `draw` after the scene and `end_frame`
//! before the render pass closes.

use std::ops::RangeInclusive;

use glam::Vec3;
use tracing::info;

use stimply_rhi::command::CommandBuffer;
use stimply_scene::PointLight;

pub const POSITION_RANGE: RangeInclusive<f32> = -100.0..=100.0;
pub const COLOR_RANGE: RangeInclusive<f32> = 0.0..=1.0;
pub const CONSTANT_RANGE: RangeInclusive<f32> = 0.0..=2.0;
pub const LINEAR_RANGE: RangeInclusive<f32> = 0.0..=1.0;
pub const QUADRATIC_RANGE: RangeInclusive<f32> = 0.0..=0.1;

/// State the overlay may read and edit.
pub struct OverlayState<'a> {
    pub lights: &'a mut [PointLight],
    pub camera_pitch: f32,
    pub camera_yaw: f32,
    pub dt: f32,
}

pub trait UiOverlay {
    fn new_frame(&mut self, dt: f32);

    fn draw(&mut self, state: &mut OverlayState<'_>);

    /// Records overlay draw commands into the frame's command buffer.
    fn end_frame(&mut self, cmd: &CommandBuffer);
}

/// Overlay that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOverlay;

impl UiOverlay for NoOverlay {
    fn new_frame(&mut self, _dt: f32) {}

    fn draw(&mut self, _state: &mut OverlayState<'_>) {}

    fn end_frame(&mut self, _cmd: &CommandBuffer) {}
}

fn clamp(value: f32, range: &RangeInclusive<f32>) -> f32 {
    value.clamp(*range.start(), *range.end())
}

fn clamp_vec(value: Vec3, range: &RangeInclusive<f32>) -> Vec3 {
    value.clamp(Vec3::splat(*range.start()), Vec3::splat(*range.end()))
}

/// Clamps every field of `light` into its editor range.
pub fn clamp_light(light: &mut PointLight) {
    light.position = clamp_vec(light.position, &POSITION_RANGE);
    light.color = clamp_vec(light.color, &COLOR_RANGE);
    light.constant = clamp(light.constant, &CONSTANT_RANGE);
    light.linear = clamp(light.linear, &LINEAR_RANGE);
    light.quadratic = clamp(light.quadratic, &QUADRATIC_RANGE);
}

/// Step a color channel advances by per [`LightEdit::CycleColor`].
pub const COLOR_STEP: f32 = 0.25;

/// One change to a light, applied at the next `draw` and then clamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightEdit {
    Position(Vec3),
    /// Moves the light by an offset.
    Move(Vec3),
    Color(Vec3),
    /// Advances channel 0, 1 or 2 by [`COLOR_STEP`], wrapping past 1 to 0.
    CycleColor(usize),
    Attenuation {
        constant: f32,
        linear: f32,
        quadratic: f32,
    },
    /// Multiplies the quadratic term.
    ScaleQuadratic(f32),
}

impl LightEdit {
    fn apply(self, light: &mut PointLight) {
        match self {
            Self::Position(position) => light.position = position,
            Self::Move(offset) => light.position += offset,
            Self::Color(color) => light.color = color,
            Self::CycleColor(channel) => {
                if let Some(value) = light.color.as_mut().get_mut(channel) {
                    let next = *value + COLOR_STEP;
                    *value = if next > *COLOR_RANGE.end() + f32::EPSILON {
                        0.0
                    } else {
                        next
                    };
                }
            }
            Self::Attenuation {
                constant,
                linear,
                quadratic,
            } => {
                light.constant = constant;
                light.linear = linear;
                light.quadratic = quadratic;
            }
            Self::ScaleQuadratic(factor) => light.quadratic *= factor,
        }
    }
}

/// Frame statistics, camera readout and a light editor.
#[derive(Debug, Default)]
pub struct DebugOverlay {
    frames: u32,
    accumulated: f32,
    fps: f32,
    camera: (f32, f32),
    pending: Vec<(usize, LightEdit)>,
}

impl DebugOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames per second over the last full second.
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Camera (pitch, yaw) seen by the last `draw`.
    pub fn camera(&self) -> (f32, f32) {
        self.camera
    }

    /// Queues `edit` for light `index`.
    pub fn edit_light(&mut self, index: usize, edit: LightEdit) {
        self.pending.push((index, edit));
    }
}

impl UiOverlay for DebugOverlay {
    fn new_frame(&mut self, dt: f32) {
        self.frames += 1;
        self.accumulated += dt;
        if self.accumulated >= 1.0 {
            self.fps = self.frames as f32 / self.accumulated;
            info!(
                "FPS: {:.1} ({:.3} ms/frame)",
                self.fps,
                self.accumulated * 1000.0 / self.frames as f32
            );
            self.frames = 0;
            self.accumulated = 0.0;
        }
    }

    fn draw(&mut self, state: &mut OverlayState<'_>) {
        self.camera = (state.camera_pitch, state.camera_yaw);

        for (index, edit) in self.pending.drain(..) {
            let Some(light) = state.lights.get_mut(index) else {
                tracing::warn!("Light edit for missing light {}", index);
                continue;
            };
            edit.apply(light);
        }

        state.lights.iter_mut().for_each(clamp_light);
    }

    fn end_frame(&mut self, _cmd: &CommandBuffer) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn draw_with(overlay: &mut DebugOverlay, lights: &mut [PointLight]) {
        let mut state = OverlayState {
            lights,
            camera_pitch: 10.0,
            camera_yaw: -20.0,
            dt: 0.016,
        };
        overlay.draw(&mut state);
    }

    #[test]
    fn test_clamp_light() {
        let mut light = PointLight::new(Vec3::new(500.0, -500.0, 3.0))
            .with_attenuation(5.0, -1.0, 0.5);
        light.color = Vec3::new(2.0, -1.0, 0.5);
        clamp_light(&mut light);

        assert_eq!(light.position, Vec3::new(100.0, -100.0, 3.0));
        assert_eq!(light.color, Vec3::new(1.0, 0.0, 0.5));
        assert_eq!(light.constant, 2.0);
        assert_eq!(light.linear, 0.0);
        assert_eq!(light.quadratic, 0.1);
    }

    #[test]
    fn test_pending_edits_applied_and_clamped() {
        let mut overlay = DebugOverlay::new();
        let mut lights = vec![PointLight::default()];

        overlay.edit_light(0, LightEdit::Position(Vec3::new(0.0, 150.0, 0.0)));
        overlay.edit_light(0, LightEdit::Color(Vec3::new(0.2, 0.4, 0.6)));
        overlay.edit_light(
            0,
            LightEdit::Attenuation {
                constant: 1.5,
                linear: 0.3,
                quadratic: 0.02,
            },
        );
        overlay.edit_light(7, LightEdit::Color(Vec3::ONE));
        draw_with(&mut overlay, &mut lights);

        assert_eq!(lights[0].position, Vec3::new(0.0, 100.0, 0.0));
        assert_eq!(lights[0].color, Vec3::new(0.2, 0.4, 0.6));
        assert_relative_eq!(lights[0].constant, 1.5);
        assert_relative_eq!(lights[0].linear, 0.3);
        assert_relative_eq!(lights[0].quadratic, 0.02);
        assert_eq!(overlay.camera(), (10.0, -20.0));

        // Edits are consumed.
        lights[0].position = Vec3::ZERO;
        draw_with(&mut overlay, &mut lights);
        assert_eq!(lights[0].position, Vec3::ZERO);
    }

    #[test]
    fn test_relative_edits() {
        let mut overlay = DebugOverlay::new();
        let mut lights =
            vec![PointLight::new(Vec3::new(0.0, 99.0, 0.0)).with_attenuation(1.0, 0.1, 0.04)];
        lights[0].color = Vec3::new(1.0, 0.5, 0.0);

        overlay.edit_light(0, LightEdit::Move(Vec3::new(1.0, 2.0, -1.0)));
        overlay.edit_light(0, LightEdit::CycleColor(0));
        overlay.edit_light(0, LightEdit::CycleColor(1));
        overlay.edit_light(0, LightEdit::CycleColor(5));
        overlay.edit_light(0, LightEdit::ScaleQuadratic(2.0));
        draw_with(&mut overlay, &mut lights);

        assert_eq!(lights[0].position, Vec3::new(1.0, 100.0, -1.0));
        assert_eq!(lights[0].color, Vec3::new(0.0, 0.75, 0.0));
        assert_relative_eq!(lights[0].quadratic, 0.08);

        overlay.edit_light(0, LightEdit::ScaleQuadratic(2.0));
        draw_with(&mut overlay, &mut lights);
        assert_relative_eq!(lights[0].quadratic, 0.1);
    }

    #[test]
    fn test_fps_updates_once_per_second() {
        let mut overlay = DebugOverlay::new();
        for _ in 0..3 {
            overlay.new_frame(0.25);
        }
        assert_eq!(overlay.fps(), 0.0);

        overlay.new_frame(0.25);
        assert_relative_eq!(overlay.fps(), 4.0);
    }
}
