//! First-person fly camera in the left-handed world frame.

use glam::{Mat4, Vec3};

/// Mouse sensitivity in degrees per raw mouse unit.
pub const MOUSE_SENSITIVITY: f32 = 0.5;
/// Pitch is clamped to this many degrees either side of the horizon.
pub const PITCH_LIMIT: f32 = 89.0;
/// Speed multiplier while the fast key is held.
pub const FAST_MULTIPLIER: f32 = 4.0;

/// Movement keys held this frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CameraInput {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub fast: bool,
}

/// Perspective projection settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Perspective {
    /// Vertical field of view in degrees
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Perspective {
    fn default() -> Self {
        Self {
            fov_y: 45.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 10_000.0,
        }
    }
}

/// Yaw/pitch camera. Input only moves it while it is captured, which the
/// renderer ties to the cursor being hidden.
#[derive(Clone, Debug)]
pub struct FlyCamera {
    /// Camera position in world space
    pub position: Vec3,
    /// Degrees. Zero looks down +Z.
    pub yaw: f32,
    /// Degrees, within `±PITCH_LIMIT`.
    pub pitch: f32,
    pub projection: Perspective,
    captured: bool,
}

impl Default for FlyCamera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, -3.0),
            yaw: 0.0,
            pitch: 0.0,
            projection: Perspective::default(),
            captured: false,
        }
    }
}

impl FlyCamera {
    pub fn new(aspect: f32) -> Self {
        let mut camera = Self::default();
        camera.set_aspect(aspect);
        camera
    }

    /// Update the aspect ratio. Degenerate sizes are ignored.
    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.projection.aspect = aspect;
        }
    }

    pub fn set_captured(&mut self, captured: bool) {
        self.captured = captured;
    }

    #[inline]
    pub fn is_captured(&self) -> bool {
        self.captured
    }

    /// Applies a raw mouse delta. Ignored unless captured.
    pub fn process_mouse(&mut self, dx: f64, dy: f64) {
        if !self.captured {
            return;
        }
        self.yaw -= dx as f32 * MOUSE_SENSITIVITY;
        self.pitch = (self.pitch - dy as f32 * MOUSE_SENSITIVITY).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Moves along the view axes. Speed is one unit per second. Ignored
    /// unless captured.
    pub fn update(&mut self, dt: f32, input: &CameraInput) {
        if !self.captured {
            return;
        }
        let speed = if input.fast { dt * FAST_MULTIPLIER } else { dt };
        let forward = self.forward();
        let right = self.right();
        let up = self.up();

        let mut delta = Vec3::ZERO;
        if input.forward {
            delta += forward;
        }
        if input.back {
            delta -= forward;
        }
        if input.right {
            delta += right;
        }
        if input.left {
            delta -= right;
        }
        if input.up {
            delta += up;
        }
        if input.down {
            delta -= up;
        }
        self.position += delta * speed;
    }

    /// Get the forward direction vector.
    pub fn forward(&self) -> Vec3 {
        let yaw = (self.yaw + 90.0).to_radians();
        let pitch = self.pitch.to_radians();
        Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize()
    }

    /// Get the right direction vector.
    pub fn right(&self) -> Vec3 {
        Vec3::Y.cross(self.forward()).normalize()
    }

    /// Get the up direction vector.
    pub fn up(&self) -> Vec3 {
        self.forward().cross(self.right())
    }

    /// Get the view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_lh(self.position, self.position + self.forward(), Vec3::Y)
    }

    /// Get the projection matrix. The viewport flips Y, so no flip here.
    pub fn projection_matrix(&self) -> Mat4 {
        let p = &self.projection;
        Mat4::perspective_lh(p.fov_y.to_radians(), p.aspect, p.near, p.far)
    }

    /// Get the view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn captured() -> FlyCamera {
        let mut camera = FlyCamera::default();
        camera.set_captured(true);
        camera
    }

    #[test]
    fn test_camera_starts_looking_down_z() {
        let camera = FlyCamera::default();
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, -3.0));
        let forward = camera.forward();
        assert_relative_eq!(forward.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(forward.z, 1.0, epsilon = 1e-6);
        let right = camera.right();
        assert_relative_eq!(right.x, 1.0, epsilon = 1e-6);
        let up = camera.up();
        assert_relative_eq!(up.y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = captured();
        camera.process_mouse(0.0, -1000.0);
        assert_eq!(camera.pitch, PITCH_LIMIT);
        camera.process_mouse(0.0, 1000.0);
        assert_eq!(camera.pitch, -PITCH_LIMIT);
    }

    #[test]
    fn test_mouse_ignored_when_not_captured() {
        let mut camera = FlyCamera::default();
        camera.process_mouse(10.0, 10.0);
        assert_eq!(camera.yaw, 0.0);
        assert_eq!(camera.pitch, 0.0);

        camera.set_captured(true);
        camera.process_mouse(10.0, 4.0);
        assert_eq!(camera.yaw, -5.0);
        assert_eq!(camera.pitch, -2.0);
    }

    #[test]
    fn test_forward_movement_and_fast_key() {
        let mut camera = captured();
        let input = CameraInput {
            forward: true,
            ..Default::default()
        };
        camera.update(0.5, &input);
        assert_relative_eq!(camera.position.z, -2.5, epsilon = 1e-6);

        let fast = CameraInput {
            forward: true,
            fast: true,
            ..Default::default()
        };
        camera.update(0.5, &fast);
        assert_relative_eq!(camera.position.z, -0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_strafe_and_vertical_movement() {
        let mut camera = captured();
        let input = CameraInput {
            right: true,
            up: true,
            ..Default::default()
        };
        camera.update(1.0, &input);
        assert_relative_eq!(camera.position.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(camera.position.y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_movement_ignored_when_not_captured() {
        let mut camera = FlyCamera::default();
        let input = CameraInput {
            forward: true,
            ..Default::default()
        };
        camera.update(1.0, &input);
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, -3.0));
    }

    #[test]
    fn test_view_places_target_in_front() {
        let camera = FlyCamera::default();
        // A point ahead of the camera lands on +Z in view space.
        let p = camera.view_matrix().transform_point3(Vec3::new(0.0, 0.0, 2.0));
        assert_relative_eq!(p.z, 5.0, epsilon = 1e-5);
    }

    #[test]
    fn test_degenerate_aspect_ignored() {
        let mut camera = FlyCamera::new(2.0);
        camera.set_aspect(0.0);
        assert_eq!(camera.projection.aspect, 2.0);
        camera.set_aspect(f32::NAN);
        assert_eq!(camera.projection.aspect, 2.0);
    }
}
