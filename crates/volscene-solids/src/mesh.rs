//! Triangle meshes used by tessellated shapes.

use volscene_math::{Aabb, Point3, Vec3};

use crate::error::SolidError;

/// Indexed triangle mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleMesh {
    /// Flat array of vertex positions: `[x0, y0, z0, x1, y1, z1, ...]` (mm).
    pub vertices: Vec<f64>,
    /// Flat array of triangle indices: `[i0, i1, i2, ...]`.
    pub indices: Vec<u32>,
}

impl TriangleMesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Create a mesh from flat vertex and index arrays.
    pub fn from_parts(vertices: Vec<f64>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Number of triangles.
    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Position of vertex `i`.
    pub fn vertex(&self, i: usize) -> Point3 {
        Point3::new(
            self.vertices[3 * i],
            self.vertices[3 * i + 1],
            self.vertices[3 * i + 2],
        )
    }

    /// Merge another mesh into this one.
    pub fn merge(&mut self, other: &TriangleMesh) {
        let offset = self.num_vertices() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.indices
            .extend(other.indices.iter().map(|&i| i + offset));
    }

    /// Check that the mesh is non-empty and every index is in range.
    pub fn validate(&self) -> Result<(), SolidError> {
        let bad = |reason: String| SolidError::InvalidParameter {
            shape: "TessellatedMesh",
            parameter: "mesh",
            reason,
        };
        if self.vertices.len() % 3 != 0 {
            return Err(bad(format!(
                "vertex array length {} is not a multiple of 3",
                self.vertices.len()
            )));
        }
        if self.indices.is_empty() || self.indices.len() % 3 != 0 {
            return Err(bad(format!(
                "index array length {} is not a positive multiple of 3",
                self.indices.len()
            )));
        }
        if self.vertices.iter().any(|v| !v.is_finite()) {
            return Err(bad("non-finite vertex coordinate".to_string()));
        }
        let n = self.num_vertices();
        if let Some(&i) = self.indices.iter().find(|&&i| i as usize >= n) {
            return Err(bad(format!("index {i} out of range for {n} vertices")));
        }
        Ok(())
    }

    /// Bounds of all vertices.
    pub fn bounds(&self) -> Aabb {
        let mut aabb = Aabb::empty();
        for i in 0..self.num_vertices() {
            aabb.include_point(&self.vertex(i));
        }
        aabb
    }

    /// Enclosed volume via the divergence theorem.
    ///
    /// Only meaningful for closed, consistently oriented meshes; the sign
    /// depends on the winding, so callers usually take the absolute value.
    pub fn signed_volume(&self) -> f64 {
        self.indices
            .chunks_exact(3)
            .map(|tri| {
                let a: Vec3 = self.vertex(tri[0] as usize).coords;
                let b: Vec3 = self.vertex(tri[1] as usize).coords;
                let c: Vec3 = self.vertex(tri[2] as usize).coords;
                a.dot(&b.cross(&c))
            })
            .sum::<f64>()
            / 6.0
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) fn unit_tetrahedron() -> TriangleMesh {
    TriangleMesh::from_parts(
        vec![
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0,
        ],
        // outward winding
        vec![0, 2, 1, 0, 1, 3, 0, 3, 2, 1, 2, 3],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn tetrahedron_volume() {
        let mesh = unit_tetrahedron();
        assert_eq!(mesh.num_triangles(), 4);
        assert!(mesh.validate().is_ok());
        assert_abs_diff_eq!(mesh.signed_volume(), 1.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn out_of_range_index() {
        let mut mesh = unit_tetrahedron();
        mesh.indices[5] = 9;
        let err = mesh.validate().unwrap_err();
        assert!(err.to_string().contains("index 9 out of range"));
    }

    #[test]
    fn merge_offsets_indices() {
        let mut a = unit_tetrahedron();
        let b = unit_tetrahedron();
        a.merge(&b);
        assert_eq!(a.num_vertices(), 8);
        assert_eq!(a.indices[12], 4);
    }
}
