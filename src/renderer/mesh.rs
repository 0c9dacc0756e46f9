//! Mesh and vertex definitions

use std::path::Path;

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};
use wgpu::util::DeviceExt;

use super::loader::AssetError;

/// Vertex with position, normal, and UV coordinates
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    /// Create a new vertex
    pub const fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }

    /// Get the vertex buffer layout for wgpu
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                // Position
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // Normal
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // UV
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// Triangle mesh in CPU memory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Create a mesh from vertices and indices
    pub fn from_data(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Create a unit cube centered at origin
    pub fn cube() -> Self {
        let vertices = vec![
            // Front face
            Vertex::new([-0.5, -0.5, 0.5], [0.0, 0.0, 1.0], [0.0, 1.0]),
            Vertex::new([0.5, -0.5, 0.5], [0.0, 0.0, 1.0], [1.0, 1.0]),
            Vertex::new([0.5, 0.5, 0.5], [0.0, 0.0, 1.0], [1.0, 0.0]),
            Vertex::new([-0.5, 0.5, 0.5], [0.0, 0.0, 1.0], [0.0, 0.0]),
            // Back face
            Vertex::new([0.5, -0.5, -0.5], [0.0, 0.0, -1.0], [0.0, 1.0]),
            Vertex::new([-0.5, -0.5, -0.5], [0.0, 0.0, -1.0], [1.0, 1.0]),
            Vertex::new([-0.5, 0.5, -0.5], [0.0, 0.0, -1.0], [1.0, 0.0]),
            Vertex::new([0.5, 0.5, -0.5], [0.0, 0.0, -1.0], [0.0, 0.0]),
            // Top face
            Vertex::new([-0.5, 0.5, 0.5], [0.0, 1.0, 0.0], [0.0, 1.0]),
            Vertex::new([0.5, 0.5, 0.5], [0.0, 1.0, 0.0], [1.0, 1.0]),
            Vertex::new([0.5, 0.5, -0.5], [0.0, 1.0, 0.0], [1.0, 0.0]),
            Vertex::new([-0.5, 0.5, -0.5], [0.0, 1.0, 0.0], [0.0, 0.0]),
            // Bottom face
            Vertex::new([-0.5, -0.5, -0.5], [0.0, -1.0, 0.0], [0.0, 1.0]),
            Vertex::new([0.5, -0.5, -0.5], [0.0, -1.0, 0.0], [1.0, 1.0]),
            Vertex::new([0.5, -0.5, 0.5], [0.0, -1.0, 0.0], [1.0, 0.0]),
            Vertex::new([-0.5, -0.5, 0.5], [0.0, -1.0, 0.0], [0.0, 0.0]),
            // Right face
            Vertex::new([0.5, -0.5, 0.5], [1.0, 0.0, 0.0], [0.0, 1.0]),
            Vertex::new([0.5, -0.5, -0.5], [1.0, 0.0, 0.0], [1.0, 1.0]),
            Vertex::new([0.5, 0.5, -0.5], [1.0, 0.0, 0.0], [1.0, 0.0]),
            Vertex::new([0.5, 0.5, 0.5], [1.0, 0.0, 0.0], [0.0, 0.0]),
            // Left face
            Vertex::new([-0.5, -0.5, -0.5], [-1.0, 0.0, 0.0], [0.0, 1.0]),
            Vertex::new([-0.5, -0.5, 0.5], [-1.0, 0.0, 0.0], [1.0, 1.0]),
            Vertex::new([-0.5, 0.5, 0.5], [-1.0, 0.0, 0.0], [1.0, 0.0]),
            Vertex::new([-0.5, 0.5, -0.5], [-1.0, 0.0, 0.0], [0.0, 0.0]),
        ];

        let indices = vec![
            0, 1, 2, 2, 3, 0, // Front
            4, 5, 6, 6, 7, 4, // Back
            8, 9, 10, 10, 11, 8, // Top
            12, 13, 14, 14, 15, 12, // Bottom
            16, 17, 18, 18, 19, 16, // Right
            20, 21, 22, 22, 23, 20, // Left
        ];

        Self::from_data(vertices, indices)
    }

    /// Cube seen from the inside, for the environment map
    ///
    /// Winding is flipped so back-face culling keeps the inner faces.
    pub fn skybox() -> Self {
        let mut mesh = Self::cube();
        for triangle in mesh.indices.chunks_exact_mut(3) {
            triangle.swap(1, 2);
        }
        for vertex in &mut mesh.vertices {
            vertex.normal = (-Vec3::from(vertex.normal)).into();
        }
        mesh
    }

    /// Create a UV sphere
    pub fn sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for ring in 0..=rings {
            let phi = std::f32::consts::PI * ring as f32 / rings as f32;
            let y = radius * phi.cos();
            let ring_radius = radius * phi.sin();

            for segment in 0..=segments {
                let theta = 2.0 * std::f32::consts::PI * segment as f32 / segments as f32;
                let x = ring_radius * theta.cos();
                let z = ring_radius * theta.sin();

                let position = Vec3::new(x, y, z);
                let normal = position.normalize_or_zero();

                vertices.push(Vertex::new(
                    position.into(),
                    normal.into(),
                    [segment as f32 / segments as f32, ring as f32 / rings as f32],
                ));
            }
        }

        for ring in 0..rings {
            for segment in 0..segments {
                let current = ring * (segments + 1) + segment;
                let next = current + segments + 1;

                indices.push(current);
                indices.push(current + 1);
                indices.push(next);

                indices.push(current + 1);
                indices.push(next + 1);
                indices.push(next);
            }
        }

        Self::from_data(vertices, indices)
    }

    /// Load a mesh file, picking the importer by extension
    ///
    /// `.obj` goes through the Wavefront importer, `.gltf` and `.glb`
    /// through the glTF importer.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown extensions or when the import fails
    pub fn load(path: &Path) -> Result<Self, AssetError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("obj") => Self::from_obj(path),
            Some("gltf" | "glb") => Self::from_gltf(path),
            _ => Err(AssetError::UnsupportedMesh {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Load every model of a Wavefront OBJ file into a single mesh
    ///
    /// Faces are triangulated and attributes re-indexed to one index per
    /// vertex. Missing normals default to +Y and missing UVs to zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or holds no triangles
    pub fn from_obj(path: &Path) -> Result<Self, AssetError> {
        let options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        };
        let (models, _materials) =
            tobj::load_obj(path, &options).map_err(|source| AssetError::Obj {
                path: path.to_path_buf(),
                source,
            })?;

        let mut mesh = Self::default();
        for model in &models {
            mesh.append_obj(&model.mesh);
        }

        if mesh.indices.is_empty() {
            return Err(AssetError::EmptyMesh {
                path: path.to_path_buf(),
            });
        }

        log::debug!(
            "Loaded {} ({} vertices, {} triangles)",
            path.display(),
            mesh.vertices.len(),
            mesh.triangle_count()
        );
        Ok(mesh)
    }

    fn append_obj(&mut self, obj: &tobj::Mesh) {
        let base = self.vertices.len() as u32;
        for (i, position) in obj.positions.chunks_exact(3).enumerate() {
            let normal = obj
                .normals
                .get(i * 3..i * 3 + 3)
                .map_or([0.0, 1.0, 0.0], |n| [n[0], n[1], n[2]]);
            // OBJ puts v = 0 at the bottom of the image
            let uv = obj
                .texcoords
                .get(i * 2..i * 2 + 2)
                .map_or([0.0; 2], |t| [t[0], 1.0 - t[1]]);
            self.vertices.push(Vertex::new(
                [position[0], position[1], position[2]],
                normal,
                uv,
            ));
        }
        self.indices
            .extend(obj.indices.iter().map(|&index| base + index));
    }

    /// Load every triangle primitive of a glTF file into a single mesh
    ///
    /// Node transforms of the default scene are baked into the vertices.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be imported or holds no triangles
    pub fn from_gltf(path: &Path) -> Result<Self, AssetError> {
        let (document, buffers, _) = gltf::import(path).map_err(|source| AssetError::Gltf {
            path: path.to_path_buf(),
            source,
        })?;

        let mut mesh = Self::default();
        match document.default_scene().or_else(|| document.scenes().next()) {
            Some(scene) => {
                for node in scene.nodes() {
                    mesh.append_node(&node, Mat4::IDENTITY, &buffers);
                }
            }
            None => {
                for gltf_mesh in document.meshes() {
                    mesh.append_primitives(&gltf_mesh, Mat4::IDENTITY, &buffers);
                }
            }
        }

        if mesh.indices.is_empty() {
            return Err(AssetError::EmptyMesh {
                path: path.to_path_buf(),
            });
        }

        log::debug!(
            "Loaded {} ({} vertices, {} triangles)",
            path.display(),
            mesh.vertices.len(),
            mesh.triangle_count()
        );
        Ok(mesh)
    }

    fn append_node(&mut self, node: &gltf::Node<'_>, parent: Mat4, buffers: &[gltf::buffer::Data]) {
        let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
        if let Some(gltf_mesh) = node.mesh() {
            self.append_primitives(&gltf_mesh, world, buffers);
        }
        for child in node.children() {
            self.append_node(&child, world, buffers);
        }
    }

    fn append_primitives(
        &mut self,
        gltf_mesh: &gltf::Mesh<'_>,
        transform: Mat4,
        buffers: &[gltf::buffer::Data],
    ) {
        let normal_matrix = Mat3::from_mat4(transform).inverse().transpose();

        for primitive in gltf_mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                continue;
            }

            let reader =
                primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
            let Some(positions) = reader.read_positions() else {
                continue;
            };
            let positions: Vec<[f32; 3]> = positions.collect();
            let normals: Vec<[f32; 3]> = reader
                .read_normals()
                .map(|normals| normals.collect())
                .unwrap_or_default();
            let uvs: Vec<[f32; 2]> = reader
                .read_tex_coords(0)
                .map(|uvs| uvs.into_f32().collect())
                .unwrap_or_default();

            let base = self.vertices.len() as u32;
            for (i, position) in positions.iter().enumerate() {
                let position = transform.transform_point3(Vec3::from(*position));
                let normal = normals.get(i).map_or(Vec3::Y, |n| {
                    (normal_matrix * Vec3::from(*n)).normalize_or_zero()
                });
                let uv = uvs.get(i).copied().unwrap_or([0.0; 2]);
                self.vertices
                    .push(Vertex::new(position.into(), normal.into(), uv));
            }

            match reader.read_indices() {
                Some(indices) => self
                    .indices
                    .extend(indices.into_u32().map(|index| base + index)),
                None => self.indices.extend(base..base + positions.len() as u32),
            }
        }
    }

    /// Get the number of indices
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Vertex and index buffers of an uploaded mesh
#[derive(Debug)]
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    /// Upload a mesh to GPU
    pub fn upload(device: &wgpu::Device, mesh: &Mesh, label: &str) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Vertex Buffer")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Index Buffer")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count(),
        }
    }
}
