//! Cubemap skybox drawn after opaque geometry

use glam::Mat4;

use super::camera::CameraView;
use super::command::{DepthCompare, DrawApi, FrameUniform};
use super::handles::{CubemapHandle, MeshHandle, ShaderHandle};

/// Remove translation from a view matrix so the sky stays centred on the camera
#[must_use]
pub fn strip_translation(view: Mat4) -> Mat4 {
    let mut rotation_only = view;
    rotation_only.w_axis.x = 0.0;
    rotation_only.w_axis.y = 0.0;
    rotation_only.w_axis.z = 0.0;
    rotation_only
}

/// Environment cube
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Skybox {
    /// Inward-facing unit cube
    pub mesh: MeshHandle,
    pub cubemap: CubemapHandle,
}

impl Skybox {
    #[must_use]
    pub const fn new(mesh: MeshHandle, cubemap: CubemapHandle) -> Self {
        Self { mesh, cubemap }
    }

    /// Draw behind everything already in the depth buffer
    ///
    /// Depth writes are off and the compare is less-or-equal while the sky is
    /// drawn; both are restored before returning.
    pub fn draw(
        &self,
        camera: &dyn CameraView,
        time: f32,
        shader: ShaderHandle,
        cmds: &mut impl DrawApi,
    ) {
        cmds.set_depth_write(false);
        cmds.set_depth_compare(DepthCompare::LessEqual);

        cmds.bind_shader(shader);
        cmds.set_frame(FrameUniform::new(
            camera.projection(),
            strip_translation(camera.view()),
            camera.position(),
            time,
        ));
        cmds.bind_cubemap(self.cubemap);
        cmds.draw_mesh(self.mesh);

        cmds.set_depth_compare(DepthCompare::Less);
        cmds.set_depth_write(true);
    }
}
