//! Camera system for 3D rendering

use glam::{Mat4, Vec3};

/// What the passes need to know about the viewer
pub trait CameraView {
    fn projection(&self) -> Mat4;

    fn view(&self) -> Mat4;

    /// Eye position in world space
    fn position(&self) -> Vec3;
}

/// Perspective camera orbiting a target point
#[derive(Debug, Clone)]
pub struct Camera {
    /// Point the camera looks at and orbits around
    pub target: Vec3,
    /// Distance from the target
    pub distance: f32,
    /// Up vector
    pub up: Vec3,
    /// Field of view in radians
    pub fov: f32,
    /// Near clipping plane
    pub near: f32,
    /// Far clipping plane
    pub far: f32,
    /// Aspect ratio (width / height)
    pub aspect: f32,
    /// Yaw angle (rotation around Y axis)
    yaw: f32,
    /// Pitch angle (elevation above the target)
    pitch: f32,
}

impl Camera {
    /// Create a new camera with default settings
    pub fn new() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 10.0,
            up: Vec3::Y,
            fov: std::f32::consts::FRAC_PI_4, // 45 degrees
            near: 0.1,
            far: 1000.0,
            aspect: 16.0 / 9.0,
            yaw: 0.0,
            pitch: 0.3,
        }
    }

    /// Create a camera at a specific position looking at a target
    pub fn look_at(position: Vec3, target: Vec3, up: Vec3) -> Self {
        let offset = position - target;
        let distance = offset.length().max(f32::EPSILON);

        let mut camera = Self::new();
        camera.target = target;
        camera.distance = distance;
        camera.up = up;
        camera.yaw = offset.x.atan2(offset.z);
        camera.pitch = (offset.y / distance).clamp(-1.0, 1.0).asin();
        camera
    }

    /// Eye position derived from yaw, pitch and distance
    pub fn eye(&self) -> Vec3 {
        let offset = Vec3::new(
            self.yaw.sin() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.cos() * self.pitch.cos(),
        );
        self.target + offset * self.distance
    }

    /// Get the view matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), self.target, self.up)
    }

    /// Get the projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }

    /// Update aspect ratio
    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    /// Orbit around the target by angle deltas in radians
    pub fn orbit(&mut self, delta_yaw: f32, delta_pitch: f32) {
        self.yaw += delta_yaw;

        // Clamp pitch to avoid flipping over the pole
        let max_pitch = 89.0_f32.to_radians();
        self.pitch = (self.pitch + delta_pitch).clamp(-max_pitch, max_pitch);
    }

    /// Move toward or away from the target
    pub fn zoom(&mut self, amount: f32) {
        self.distance = (self.distance - amount).max(self.near * 2.0);
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraView for Camera {
    fn projection(&self) -> Mat4 {
        self.projection_matrix()
    }

    fn view(&self) -> Mat4 {
        self.view_matrix()
    }

    fn position(&self) -> Vec3 {
        self.eye()
    }
}

/// Camera with fixed matrices, handy for tests and offline renders
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedCamera {
    pub projection: Mat4,
    pub view: Mat4,
    pub position: Vec3,
}

impl FixedCamera {
    /// Identity projection looking down -Z from `position`
    #[must_use]
    pub fn at(position: Vec3) -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::from_translation(-position),
            position,
        }
    }
}

impl CameraView for FixedCamera {
    fn projection(&self) -> Mat4 {
        self.projection
    }

    fn view(&self) -> Mat4 {
        self.view
    }

    fn position(&self) -> Vec3 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_look_at_round_trips_position() {
        let position = Vec3::new(3.0, 4.0, 8.0);
        let camera = Camera::look_at(position, Vec3::ZERO, Vec3::Y);
        assert!(camera.eye().abs_diff_eq(position, 1e-4));
    }

    #[test]
    fn test_orbit_keeps_distance() {
        let mut camera = Camera::look_at(Vec3::new(0.0, 2.0, 8.0), Vec3::ZERO, Vec3::Y);
        let before = camera.eye().length();
        camera.orbit(0.5, 0.2);
        assert!((camera.eye().length() - before).abs() < 0.001);
    }

    #[test]
    fn test_pitch_clamped() {
        let mut camera = Camera::new();
        camera.orbit(0.0, 10.0);
        assert!(camera.eye().y < camera.distance);
        assert!(!camera.view_matrix().is_nan());
    }

    #[test]
    fn test_aspect_ignores_zero_height() {
        let mut camera = Camera::new();
        camera.set_aspect(800, 0);
        assert!(camera.aspect.is_finite());
    }
}
