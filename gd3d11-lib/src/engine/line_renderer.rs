use super::resources::ExVertex;
use crate::{BBox3D, Color, Vec3};

fn line_vertex(position: Vec3, color: Color) -> ExVertex {
    ExVertex {
        position: [position.x, position.y, position.z],
        color: color.dword(),
        ..Default::default()
    }
}

/// Debug lines in world space, collected during a frame and drawn as one
/// line list.
#[derive(Debug, Default)]
pub struct LineRenderer {
    vertices: Vec<ExVertex>,
}

impl LineRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_line(&mut self, from: Vec3, to: Vec3, color: Color) {
        self.vertices.push(line_vertex(from, color));
        self.vertices.push(line_vertex(to, color));
    }

    pub fn add_triangle(&mut self, a: Vec3, b: Vec3, c: Vec3, color: Color) {
        self.add_line(a, b, color);
        self.add_line(b, c, color);
        self.add_line(c, a, color);
    }

    /// Three axis aligned lines crossing at `location`.
    pub fn add_point_locator(&mut self, location: Vec3, size: f32, color: Color) {
        let Vec3 { x, y, z } = location;
        self.add_line(Vec3::new(x - size, y, z), Vec3::new(x + size, y, z), color);
        self.add_line(Vec3::new(x, y - size, z), Vec3::new(x, y + size, z), color);
        self.add_line(Vec3::new(x, y, z - size), Vec3::new(x, y, z + size), color);
    }

    /// The twelve edges of `bbox`.
    pub fn add_aabb(&mut self, bbox: &BBox3D, color: Color) {
        let (min, max) = (bbox.min, bbox.max);
        let corner = |i: usize| {
            Vec3::new(
                if i & 1 == 0 { min.x } else { max.x },
                if i & 2 == 0 { min.y } else { max.y },
                if i & 4 == 0 { min.z } else { max.z },
            )
        };
        for i in 0..8 {
            for bit in [1, 2, 4] {
                if i & bit == 0 {
                    self.add_line(corner(i), corner(i | bit), color);
                }
            }
        }
    }

    pub fn line_count(&self) -> usize {
        self.vertices.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertices(&self) -> &[ExVertex] {
        &self.vertices
    }

    pub fn clear_cache(&mut self) {
        self.vertices.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aabb_has_twelve_edges_of_axis_length() {
        let mut lines = LineRenderer::new();
        lines.add_aabb(
            &BBox3D {
                min: Vec3::new(0.0, 0.0, 0.0),
                max: Vec3::new(1.0, 2.0, 3.0),
            },
            Color::WHITE,
        );
        assert_eq!(lines.line_count(), 12);
        let mut lengths: Vec<f32> = lines
            .vertices()
            .chunks(2)
            .map(|pair| {
                (0..3)
                    .map(|i| (pair[1].position[i] - pair[0].position[i]).abs())
                    .sum()
            })
            .collect();
        lengths.sort_by(f32::total_cmp);
        assert_eq!(lengths, [1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0, 3.0, 3.0, 3.0, 3.0]);
    }

    #[test]
    fn lines_accumulate_until_cleared() {
        let mut lines = LineRenderer::new();
        lines.add_line(Vec3::default(), Vec3::new(1.0, 0.0, 0.0), Color::WHITE);
        lines.add_triangle(
            Vec3::default(),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Color::new(0, 0, 255, 255),
        );
        lines.add_point_locator(Vec3::new(5.0, 5.0, 5.0), 1.0, Color::WHITE);
        assert_eq!(lines.line_count(), 7);
        assert_eq!(lines.vertices()[2].color, Color::new(0, 0, 255, 255).dword());
        lines.clear_cache();
        assert!(lines.is_empty());
    }
}
