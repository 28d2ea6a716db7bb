use crate::mesh::{Indices, StaticMesh, Vertex};
use nalgebra_glm::{Vec3, vec2, vec3, vec4};
use std::f32::consts::PI;

/// Square grid on the XY plane facing +Z with `(subdivisions + 1)^2` vertices.
pub fn plane_grid(size: f32, subdivisions: u32) -> StaticMesh {
    let cells = subdivisions.max(1);
    let row = cells + 1;
    let step = size / cells as f32;
    let half = size * 0.5;

    let mut vertices = Vec::with_capacity((row * row) as usize);
    for y in 0..row {
        for x in 0..row {
            vertices.push(Vertex {
                position: vec3(x as f32 * step - half, y as f32 * step - half, 0.0),
                normal: Vec3::z(),
                uv0: vec2(x as f32 / cells as f32, y as f32 / cells as f32),
                uv1: vec2(x as f32 / cells as f32, y as f32 / cells as f32),
                color: vec4(1.0, 1.0, 1.0, 1.0),
            });
        }
    }

    let mut indices = Vec::with_capacity((cells * cells * 6) as usize);
    for y in 0..cells {
        for x in 0..cells {
            let i = y * row + x;
            indices.extend_from_slice(&[i, i + 1, i + row + 1, i, i + row + 1, i + row]);
        }
    }

    StaticMesh::new("plane", vertices, Indices::U32(indices), false)
}

/// Axis aligned cube centered on the origin with split vertices per face.
pub fn cube(size: f32) -> StaticMesh {
    let h = size * 0.5;
    let faces: [(Vec3, Vec3, Vec3); 6] = [
        (Vec3::x(), Vec3::y(), Vec3::z()),
        (-Vec3::x(), -Vec3::y(), Vec3::z()),
        (Vec3::y(), -Vec3::x(), Vec3::z()),
        (-Vec3::y(), Vec3::x(), Vec3::z()),
        (Vec3::z(), Vec3::x(), Vec3::y()),
        (-Vec3::z(), Vec3::x(), -Vec3::y()),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (normal, u, v) in faces {
        let base = vertices.len() as u16;

        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            vertices.push(Vertex {
                position: (normal + u * su + v * sv) * h,
                normal,
                uv0: vec2((su + 1.0) * 0.5, (sv + 1.0) * 0.5),
                uv1: vec2((su + 1.0) * 0.5, (sv + 1.0) * 0.5),
                color: vec4(1.0, 1.0, 1.0, 1.0),
            });
        }

        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    StaticMesh::new("cube", vertices, Indices::U16(indices), false)
}

pub fn uv_sphere(radius: f32, segments: u32, rings: u32) -> StaticMesh {
    let segments = segments.max(3);
    let rings = rings.max(2);

    let mut vertices = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);
    for r in 0..=rings {
        let theta = PI * r as f32 / rings as f32;

        for s in 0..=segments {
            let phi = 2.0 * PI * s as f32 / segments as f32;
            let normal = vec3(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos());
            let uv = vec2(s as f32 / segments as f32, r as f32 / rings as f32);

            vertices.push(Vertex {
                position: normal * radius,
                normal,
                uv0: uv,
                uv1: uv,
                color: vec4(1.0, 1.0, 1.0, 1.0),
            });
        }
    }

    let row = segments + 1;
    let mut indices = Vec::with_capacity((segments * rings * 6) as usize);
    for r in 0..rings {
        for s in 0..segments {
            let i = r * row + s;
            indices.extend_from_slice(&[i, i + row, i + row + 1, i, i + row + 1, i + 1]);
        }
    }

    StaticMesh::new("sphere", vertices, Indices::U32(indices), false)
}
