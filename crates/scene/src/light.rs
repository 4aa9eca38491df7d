//! Point light with distance attenuation.

use glam::Vec3;

/// Omnidirectional light. Attenuation is
/// `1 / (constant + linear * d + quadratic * d^2)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    /// Light position in world space
    pub position: Vec3,
    /// Light color
    pub color: Vec3,
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            constant: 1.0,
            linear: 0.25,
            quadratic: 0.08,
        }
    }
}

impl PointLight {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn with_attenuation(mut self, constant: f32, linear: f32, quadratic: f32) -> Self {
        self.constant = constant;
        self.linear = linear;
        self.quadratic = quadratic;
        self
    }

    /// Attenuation factor at distance `d`.
    pub fn attenuation(&self, d: f32) -> f32 {
        1.0 / (self.constant + self.linear * d + self.quadratic * d * d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_point_light_defaults() {
        let light = PointLight::default();
        assert_eq!(light.color, Vec3::ONE);
        assert_eq!(light.constant, 1.0);
        assert_eq!(light.linear, 0.25);
        assert_eq!(light.quadratic, 0.08);
    }

    #[test]
    fn test_attenuation() {
        let light = PointLight::new(Vec3::ZERO).with_attenuation(1.0, 0.08, 0.01);
        assert_relative_eq!(light.attenuation(0.0), 1.0);
        assert_relative_eq!(light.attenuation(10.0), 1.0 / 2.8);
    }
}
