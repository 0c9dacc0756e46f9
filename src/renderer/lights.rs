//! Light registry and uniform marshalling
//!
//! Three homogeneous collections (directional, point, spot). Registering a
//! light is a two-step contract: the light is appended to its render
//! collection *and* a [`DebugLightEntry`] is appended to the debug list.
//! Both happen inside the `add_*` call and both are observable.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

use crate::scene::{NodeId, SceneError, SceneGraph};

/// Uniform array capacity for directional lights
pub const MAX_DIRECTIONAL_LIGHTS: usize = 4;
/// Uniform array capacity for point lights
pub const MAX_POINT_LIGHTS: usize = 16;
/// Uniform array capacity for spot lights
pub const MAX_SPOT_LIGHTS: usize = 8;

const MIN_RANGE: f32 = 1e-4;

/// GPU layout of a directional light
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GpuDirectionalLight {
    pub direction: [f32; 3],
    _padding0: f32,
    pub color: [f32; 3],
    _padding1: f32,
}

/// GPU layout of a point light
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GpuPointLight {
    pub position: [f32; 3],
    /// Inverse-square range coefficient
    pub range: f32,
    pub color: [f32; 3],
    _padding: f32,
}

/// GPU layout of a spot light
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GpuSpotLight {
    pub position: [f32; 3],
    /// Inverse-square range coefficient
    pub range: f32,
    pub direction: [f32; 3],
    _padding0: f32,
    pub color: [f32; 3],
    _padding1: f32,
    /// Cosines of the inner and outer half-angles
    pub angles: [f32; 2],
    _padding2: [f32; 2],
}

/// The whole light set as one uniform block
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightUniforms {
    /// Directional, point and spot counts; the fourth lane is unused
    pub counts: [u32; 4],
    /// Ambient colour in `xyz`
    pub ambient: [f32; 4],
    pub directional: [GpuDirectionalLight; MAX_DIRECTIONAL_LIGHTS],
    pub point: [GpuPointLight; MAX_POINT_LIGHTS],
    pub spot: [GpuSpotLight; MAX_SPOT_LIGHTS],
}

impl Default for LightUniforms {
    fn default() -> Self {
        Self::zeroed()
    }
}

macro_rules! emitter {
    ($($ty:ty),*) => {
        $(
            impl $ty {
                /// `color * intensity`, or black while inactive
                #[must_use]
                pub fn intensified_color(&self) -> Vec3 {
                    if self.active {
                        self.color * self.intensity
                    } else {
                        Vec3::ZERO
                    }
                }

                /// Set the base colour
                #[must_use]
                pub fn with_color(mut self, color: Vec3) -> Self {
                    self.color = color;
                    self
                }

                /// Set the intensity multiplier
                #[must_use]
                pub fn with_intensity(mut self, intensity: f32) -> Self {
                    self.intensity = intensity;
                    self
                }
            }
        )*
    };
}

/// Directional light (like the sun)
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    pub name: String,
    pub active: bool,
    pub color: Vec3,
    pub intensity: f32,
    /// Direction the light travels in; need not be normalized
    pub direction: Vec3,
}

impl DirectionalLight {
    /// Create a new directional light
    pub fn new(name: impl Into<String>, direction: Vec3) -> Self {
        Self {
            name: name.into(),
            active: true,
            color: Vec3::ONE,
            intensity: 1.0,
            direction,
        }
    }

    /// Convert to GPU light
    #[must_use]
    pub fn to_gpu(&self) -> GpuDirectionalLight {
        GpuDirectionalLight {
            direction: self.direction.normalize_or_zero().into(),
            color: self.intensified_color().into(),
            ..Default::default()
        }
    }
}

/// Point light, optionally following a scene node
#[derive(Debug, Clone, PartialEq)]
pub struct PointLight {
    pub name: String,
    pub active: bool,
    pub color: Vec3,
    pub intensity: f32,
    /// Maximum reach in world units
    pub range: f32,
    /// Position in the parent's space, or world space without a parent
    pub offset: Vec3,
    parent: Option<NodeId>,
    position: Vec3,
}

impl PointLight {
    /// Create a new point light at a position
    pub fn new(name: impl Into<String>, offset: Vec3) -> Self {
        Self {
            name: name.into(),
            active: true,
            color: Vec3::ONE,
            intensity: 1.0,
            range: 10.0,
            offset,
            parent: None,
            position: offset,
        }
    }

    /// Set the range
    #[must_use]
    pub fn with_range(mut self, range: f32) -> Self {
        self.range = range;
        self
    }

    /// Node the light follows, if any
    #[must_use]
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// World position as of the last [`LightRegistry::resolve_parents`]
    #[must_use]
    pub fn position(&self) -> Vec3 {
        match self.parent {
            Some(_) => self.position,
            None => self.offset,
        }
    }

    /// `1 / range²`, consumed by the shader as a falloff coefficient
    #[must_use]
    pub fn inverse_squared_range(&self) -> f32 {
        inverse_squared(self.range)
    }

    fn resolve(&mut self, parent_world: Mat4) {
        self.position = parent_world.transform_point3(self.offset);
    }

    /// Convert to GPU light
    #[must_use]
    pub fn to_gpu(&self) -> GpuPointLight {
        GpuPointLight {
            position: self.position().into(),
            range: self.inverse_squared_range(),
            color: self.intensified_color().into(),
            ..Default::default()
        }
    }
}

/// Spot light, optionally following a scene node
#[derive(Debug, Clone, PartialEq)]
pub struct SpotLight {
    pub name: String,
    pub active: bool,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
    pub offset: Vec3,
    pub direction: Vec3,
    /// Full inner cone angle in degrees
    inner_angle: f32,
    /// Full outer cone angle in degrees
    outer_angle: f32,
    parent: Option<NodeId>,
    position: Vec3,
}

impl SpotLight {
    /// Create a new spot light
    pub fn new(name: impl Into<String>, offset: Vec3, direction: Vec3) -> Self {
        Self {
            name: name.into(),
            active: true,
            color: Vec3::ONE,
            intensity: 1.0,
            range: 10.0,
            offset,
            direction,
            inner_angle: 25.0,
            outer_angle: 35.0,
            parent: None,
            position: offset,
        }
    }

    /// Set the range
    #[must_use]
    pub fn with_range(mut self, range: f32) -> Self {
        self.range = range;
        self
    }

    /// Set cone angles
    #[must_use]
    pub fn with_angles(mut self, inner_degrees: f32, outer_degrees: f32) -> Self {
        self.set_input_angles(inner_degrees, outer_degrees);
        self
    }

    /// Set the full cone angles in degrees
    ///
    /// Angles are clamped to `[0, 179]` and the inner cone never exceeds the
    /// outer one.
    pub fn set_input_angles(&mut self, inner_degrees: f32, outer_degrees: f32) {
        let outer = outer_degrees.clamp(0.0, 179.0);
        let inner = inner_degrees.clamp(0.0, 179.0);
        if inner > outer {
            log::warn!(
                "spot light \"{}\": inner angle {inner} exceeds outer angle {outer}, clamping",
                self.name
            );
        }
        self.inner_angle = inner.min(outer);
        self.outer_angle = outer;
    }

    /// Full cone angles in degrees as `(inner, outer)`
    #[must_use]
    pub const fn input_angles(&self) -> (f32, f32) {
        (self.inner_angle, self.outer_angle)
    }

    /// Shader-ready `(cos(inner / 2), cos(outer / 2))`
    #[must_use]
    pub fn calculated_angles(&self) -> Vec2 {
        Vec2::new(
            (self.inner_angle * 0.5).to_radians().cos(),
            (self.outer_angle * 0.5).to_radians().cos(),
        )
    }

    #[must_use]
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// World position as of the last [`LightRegistry::resolve_parents`]
    #[must_use]
    pub fn position(&self) -> Vec3 {
        match self.parent {
            Some(_) => self.position,
            None => self.offset,
        }
    }

    #[must_use]
    pub fn inverse_squared_range(&self) -> f32 {
        inverse_squared(self.range)
    }

    fn resolve(&mut self, parent_world: Mat4) {
        self.position = parent_world.transform_point3(self.offset);
    }

    /// Convert to GPU light
    #[must_use]
    pub fn to_gpu(&self) -> GpuSpotLight {
        GpuSpotLight {
            position: self.position().into(),
            range: self.inverse_squared_range(),
            direction: self.direction.normalize_or_zero().into(),
            color: self.intensified_color().into(),
            angles: self.calculated_angles().into(),
            ..Default::default()
        }
    }
}

emitter!(DirectionalLight, PointLight, SpotLight);

fn inverse_squared(range: f32) -> f32 {
    1.0 / range.max(MIN_RANGE).powi(2)
}

/// Handle to a registered directional light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectionalLightId(usize);

/// Handle to a registered point light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointLightId(usize);

/// Handle to a registered spot light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpotLightId(usize);

/// Any registered light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightHandle {
    Directional(DirectionalLightId),
    Point(PointLightId),
    Spot(SpotLightId),
}

/// Entry in the debug-draw list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugLightEntry {
    pub light: LightHandle,
}

/// Position and colour of a light marker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightMarker {
    pub position: Vec3,
    pub color: Vec3,
}

/// Distance at which directional lights are drawn as markers
const DIRECTIONAL_MARKER_DISTANCE: f32 = 10.0;

/// Owner of every light in the scene
#[derive(Debug)]
pub struct LightRegistry {
    directional: Vec<DirectionalLight>,
    point: Vec<PointLight>,
    spot: Vec<SpotLight>,
    debug: Vec<DebugLightEntry>,
    /// Ambient colour
    pub ambient: Vec3,
}

impl LightRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            directional: Vec::new(),
            point: Vec::new(),
            spot: Vec::new(),
            debug: Vec::new(),
            ambient: Vec3::splat(0.05),
        }
    }

    /// Register a directional light for rendering and for debug drawing
    pub fn add_directional(&mut self, light: DirectionalLight) -> DirectionalLightId {
        let id = DirectionalLightId(self.directional.len());
        self.directional.push(light);
        self.debug.push(DebugLightEntry {
            light: LightHandle::Directional(id),
        });
        id
    }

    /// Register a point light for rendering and for debug drawing
    pub fn add_point(&mut self, light: PointLight) -> PointLightId {
        let id = PointLightId(self.point.len());
        self.point.push(light);
        self.debug.push(DebugLightEntry {
            light: LightHandle::Point(id),
        });
        id
    }

    /// Register a spot light for rendering and for debug drawing
    pub fn add_spot(&mut self, light: SpotLight) -> SpotLightId {
        let id = SpotLightId(self.spot.len());
        self.spot.push(light);
        self.debug.push(DebugLightEntry {
            light: LightHandle::Spot(id),
        });
        id
    }

    /// Make a point light follow a node
    ///
    /// # Errors
    ///
    /// Fails if `node` does not belong to `graph`.
    pub fn attach_point(
        &mut self,
        id: PointLightId,
        node: NodeId,
        graph: &SceneGraph,
    ) -> Result<(), SceneError> {
        graph.check(node)?;
        let light = &mut self.point[id.0];
        light.parent = Some(node);
        light.resolve(graph.world_matrix(node));
        Ok(())
    }

    /// Make a spot light follow a node
    ///
    /// # Errors
    ///
    /// Fails if `node` does not belong to `graph`.
    pub fn attach_spot(
        &mut self,
        id: SpotLightId,
        node: NodeId,
        graph: &SceneGraph,
    ) -> Result<(), SceneError> {
        graph.check(node)?;
        let light = &mut self.spot[id.0];
        light.parent = Some(node);
        light.resolve(graph.world_matrix(node));
        Ok(())
    }

    /// Recompute positions of parented lights from the current hierarchy
    ///
    /// Call once per frame after animation has moved the parents.
    pub fn resolve_parents(&mut self, graph: &SceneGraph) {
        for light in &mut self.point {
            if let Some(parent) = light.parent {
                light.resolve(graph.world_matrix(parent));
            }
        }
        for light in &mut self.spot {
            if let Some(parent) = light.parent {
                light.resolve(graph.world_matrix(parent));
            }
        }
    }

    #[must_use]
    pub fn directional(&self, id: DirectionalLightId) -> &DirectionalLight {
        &self.directional[id.0]
    }

    pub fn directional_mut(&mut self, id: DirectionalLightId) -> &mut DirectionalLight {
        &mut self.directional[id.0]
    }

    #[must_use]
    pub fn point(&self, id: PointLightId) -> &PointLight {
        &self.point[id.0]
    }

    pub fn point_mut(&mut self, id: PointLightId) -> &mut PointLight {
        &mut self.point[id.0]
    }

    #[must_use]
    pub fn spot(&self, id: SpotLightId) -> &SpotLight {
        &self.spot[id.0]
    }

    pub fn spot_mut(&mut self, id: SpotLightId) -> &mut SpotLight {
        &mut self.spot[id.0]
    }

    /// Look a light up by name across all three collections
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::NodeNotFound`] naming the missing light.
    pub fn find(&self, name: &str) -> Result<LightHandle, SceneError> {
        if let Some(index) = self.directional.iter().position(|l| l.name == name) {
            return Ok(LightHandle::Directional(DirectionalLightId(index)));
        }
        if let Some(index) = self.point.iter().position(|l| l.name == name) {
            return Ok(LightHandle::Point(PointLightId(index)));
        }
        if let Some(index) = self.spot.iter().position(|l| l.name == name) {
            return Ok(LightHandle::Spot(SpotLightId(index)));
        }
        Err(SceneError::NodeNotFound(name.to_string()))
    }

    /// The shadow-casting light: the first directional light registered
    #[must_use]
    pub fn primary_directional(&self) -> Option<&DirectionalLight> {
        self.directional.first()
    }

    pub fn directional_lights(&self) -> &[DirectionalLight] {
        &self.directional
    }

    pub fn point_lights(&self) -> &[PointLight] {
        &self.point
    }

    pub fn spot_lights(&self) -> &[SpotLight] {
        &self.spot
    }

    /// Lights registered for debug drawing, in registration order
    pub fn debug_entries(&self) -> &[DebugLightEntry] {
        &self.debug
    }

    /// Get total number of lights
    #[must_use]
    pub fn light_count(&self) -> usize {
        self.directional.len() + self.point.len() + self.spot.len()
    }

    /// Marker positions and colours for the debug-draw list
    pub fn debug_markers(&self) -> Vec<LightMarker> {
        self.debug
            .iter()
            .map(|entry| match entry.light {
                LightHandle::Directional(id) => {
                    let light = self.directional(id);
                    LightMarker {
                        position: -light.direction.normalize_or_zero()
                            * DIRECTIONAL_MARKER_DISTANCE,
                        color: light.intensified_color(),
                    }
                }
                LightHandle::Point(id) => {
                    let light = self.point(id);
                    LightMarker {
                        position: light.position(),
                        color: light.intensified_color(),
                    }
                }
                LightHandle::Spot(id) => {
                    let light = self.spot(id);
                    LightMarker {
                        position: light.position(),
                        color: light.intensified_color(),
                    }
                }
            })
            .collect()
    }

    /// Build the uniform block
    ///
    /// Counts are the collection sizes, not the number of active lights;
    /// inactive lights keep their slot with a zero colour. Collections larger
    /// than the uniform arrays are truncated.
    #[must_use]
    pub fn build_uniforms(&self) -> LightUniforms {
        let mut uniforms = LightUniforms {
            ambient: self.ambient.extend(0.0).into(),
            ..Default::default()
        };

        let directional = clamp_count("directional", self.directional.len(), MAX_DIRECTIONAL_LIGHTS);
        for (slot, light) in uniforms.directional.iter_mut().zip(&self.directional) {
            *slot = light.to_gpu();
        }

        let point = clamp_count("point", self.point.len(), MAX_POINT_LIGHTS);
        for (slot, light) in uniforms.point.iter_mut().zip(&self.point) {
            *slot = light.to_gpu();
        }

        let spot = clamp_count("spot", self.spot.len(), MAX_SPOT_LIGHTS);
        for (slot, light) in uniforms.spot.iter_mut().zip(&self.spot) {
            *slot = light.to_gpu();
        }

        uniforms.counts = [directional, point, spot, 0];
        uniforms
    }
}

impl Default for LightRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_count(kind: &str, len: usize, max: usize) -> u32 {
    if len > max {
        log::warn!("{len} {kind} lights registered, only the first {max} are uploaded");
    }
    len.min(max) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Transform;

    #[test]
    fn test_inactive_light_is_dark_but_keeps_parameters() {
        let mut light = PointLight::new("Gem", Vec3::ZERO)
            .with_color(Vec3::new(0.0, 0.0, 1.0))
            .with_intensity(2.0);
        assert_eq!(light.intensified_color(), Vec3::new(0.0, 0.0, 2.0));

        light.active = false;
        assert_eq!(light.intensified_color(), Vec3::ZERO);
        assert_eq!(light.color, Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(light.intensity, 2.0);
        assert_eq!(light.to_gpu().color, [0.0; 3]);
    }

    #[test]
    fn test_registration_feeds_render_and_debug_lists() {
        let mut lights = LightRegistry::new();
        let sun = lights.add_directional(DirectionalLight::new("Sun", Vec3::NEG_Y));
        let gem = lights.add_point(PointLight::new("Gem", Vec3::ZERO));
        let spot = lights.add_spot(SpotLight::new("Spot", Vec3::Y, Vec3::NEG_Y));

        assert_eq!(lights.directional_lights().len(), 1);
        assert_eq!(lights.point_lights().len(), 1);
        assert_eq!(lights.spot_lights().len(), 1);

        let debug: Vec<LightHandle> = lights.debug_entries().iter().map(|e| e.light).collect();
        assert_eq!(
            debug,
            vec![
                LightHandle::Directional(sun),
                LightHandle::Point(gem),
                LightHandle::Spot(spot)
            ]
        );
    }

    #[test]
    fn test_counts_include_inactive_lights() {
        let mut lights = LightRegistry::new();
        lights.add_point(PointLight::new("A", Vec3::ZERO));
        let b = lights.add_point(PointLight::new("B", Vec3::X));
        lights.point_mut(b).active = false;

        let uniforms = lights.build_uniforms();
        assert_eq!(uniforms.counts, [0, 2, 0, 0]);
        assert_eq!(uniforms.point[1].color, [0.0; 3]);
        assert_eq!(uniforms.point[1].position, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_counts_clamped_to_capacity() {
        let mut lights = LightRegistry::new();
        for i in 0..MAX_POINT_LIGHTS + 3 {
            lights.add_point(PointLight::new(format!("P{i}"), Vec3::ZERO));
        }
        assert_eq!(lights.build_uniforms().counts[1], MAX_POINT_LIGHTS as u32);
    }

    #[test]
    fn test_inverse_squared_range() {
        let light = PointLight::new("P", Vec3::ZERO).with_range(5.0);
        assert!((light.inverse_squared_range() - 0.04).abs() < 1e-6);

        let degenerate = PointLight::new("Q", Vec3::ZERO).with_range(0.0);
        assert!(degenerate.inverse_squared_range().is_finite());
    }

    #[test]
    fn test_parented_point_light_follows_parent_translation() {
        let mut graph = SceneGraph::new();
        let base = graph
            .add_pivot(
                "Base",
                Transform::from_parts(
                    Vec3::new(0.1, -1.7, 2.7),
                    Vec3::new(0.0, 30.0, 0.0),
                    Vec3::splat(2.0),
                ),
                None,
            )
            .unwrap();
        let gem = graph
            .add_pivot("Gem", Transform::from_position(Vec3::new(1.6, 0.0, 0.0)), Some(base))
            .unwrap();

        let mut lights = LightRegistry::new();
        let light = lights.add_point(PointLight::new("Gem Light", Vec3::ZERO));
        lights.attach_point(light, gem, &graph).unwrap();

        let expected = graph.world_matrix(gem).col(3).truncate();
        assert!(lights.point(light).position().abs_diff_eq(expected, 1e-5));

        // Parent moves, light follows after the next resolve
        graph.node_mut(gem).transform.position.y = 3.0;
        lights.resolve_parents(&graph);
        let expected = graph.world_matrix(gem).col(3).truncate();
        assert!(lights.point(light).position().abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn test_attach_to_foreign_node_fails() {
        let mut graph = SceneGraph::new();
        let mut other = SceneGraph::new();
        other.add_pivot("A", Transform::new(), None).unwrap();
        let foreign = other.add_pivot("B", Transform::new(), None).unwrap();
        graph.add_pivot("Only", Transform::new(), None).unwrap();

        let mut lights = LightRegistry::new();
        let light = lights.add_point(PointLight::new("P", Vec3::ZERO));
        assert_eq!(
            lights.attach_point(light, foreign, &graph),
            Err(SceneError::UnknownNode(foreign))
        );
        assert_eq!(lights.point(light).parent(), None);
    }

    #[test]
    fn test_spot_angles_stay_ordered() {
        let spot = SpotLight::new("Spot", Vec3::Y, Vec3::NEG_Y).with_angles(20.0, 40.0);
        let (inner, outer) = spot.input_angles();
        assert!(inner <= outer);

        let angles = spot.calculated_angles();
        assert!((angles.x - 10.0_f32.to_radians().cos()).abs() < 1e-6);
        assert!((angles.y - 20.0_f32.to_radians().cos()).abs() < 1e-6);
        // Cosine is decreasing: a wider cone has the smaller cosine
        assert!(angles.x >= angles.y);
        assert!(angles.x.acos() <= angles.y.acos());

        let swapped = SpotLight::new("Swapped", Vec3::Y, Vec3::NEG_Y).with_angles(50.0, 30.0);
        let (inner, outer) = swapped.input_angles();
        assert_eq!((inner, outer), (30.0, 30.0));
    }

    #[test]
    fn test_find_light_by_name() {
        let mut lights = LightRegistry::new();
        let fire = lights.add_point(PointLight::new("Fire Light 1", Vec3::ZERO));
        assert_eq!(lights.find("Fire Light 1"), Ok(LightHandle::Point(fire)));
        assert!(lights.find("Fire Light 9").is_err());
    }

    #[test]
    fn test_debug_marker_for_directional_light() {
        let mut lights = LightRegistry::new();
        lights.add_directional(DirectionalLight::new("Sun", Vec3::NEG_Y).with_intensity(0.5));

        let markers = lights.debug_markers();
        assert_eq!(markers.len(), 1);
        assert!(markers[0].position.abs_diff_eq(Vec3::Y * 10.0, 1e-5));
        assert_eq!(markers[0].color, Vec3::splat(0.5));
    }
}
