use nalgebra_glm::{Vec2, Vec3, Vec4, vec4};
use std::borrow::Cow;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv0: Vec2,
    pub uv1: Vec2,
    pub color: Vec4,
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            normal: Vec3::z(),
            uv0: Vec2::zeros(),
            uv1: Vec2::zeros(),
            color: vec4(1.0, 1.0, 1.0, 1.0),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Indices {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl Indices {
    pub fn to_vec_u32(&self) -> Cow<'_, Vec<u32>> {
        match &self {
            Indices::U16(v) => Cow::Owned(v.iter().map(|&r| r as u32).collect()),
            Indices::U32(v) => Cow::Borrowed(v),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Indices::U16(v) => v.len(),
            Indices::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn from_points<'a>(points: impl Iterator<Item = &'a Vec3> + Clone) -> Self {
        let mut min = Vec3::from_element(f32::MAX);
        let mut max = Vec3::from_element(f32::MIN);
        let mut any = false;

        for p in points.clone() {
            min = nalgebra_glm::min2(&min, p);
            max = nalgebra_glm::max2(&max, p);
            any = true;
        }

        if !any {
            return Self {
                center: Vec3::zeros(),
                radius: 0.0,
            };
        }

        let center = (min + max) * 0.5;
        let radius = points.map(|p| nalgebra_glm::distance(&center, p)).fold(0.0f32, f32::max);

        Self { center, radius }
    }
}

/// Immutable triangle mesh asset shared between nodes.
pub struct StaticMesh {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Indices,
    pub has_vertex_color: bool,
    pub bounds: BoundingSphere,
}

impl StaticMesh {
    pub fn new(name: impl Into<String>, vertices: Vec<Vertex>, indices: Indices, has_vertex_color: bool) -> Self {
        let bounds = BoundingSphere::from_points(vertices.iter().map(|v| &v.position));

        Self {
            name: name.into(),
            vertices,
            indices,
            has_vertex_color,
            bounds,
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn triangles(&self) -> Vec<[u32; 3]> {
        self.indices
            .to_vec_u32()
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect()
    }
}
