use crate::coords::{Matrix, Vec2};

/// Local placement of a scene object.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform {
    pub position: Vec2,
    pub scale: Vec2,
    /// Local origin for rotation and scale.
    pub pivot: Vec2,
    pub skew: Vec2,
    /// Radians, clockwise on screen.
    pub rotation: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec2::zero(),
            scale: Vec2::splat(1.0),
            pivot: Vec2::zero(),
            skew: Vec2::zero(),
            rotation: 0.0,
        }
    }
}

impl Transform {
    pub fn local_matrix(&self) -> Matrix {
        let mut m = Matrix::IDENTITY;
        m.set_transform(
            self.position.x,
            self.position.y,
            self.pivot.x,
            self.pivot.y,
            self.scale.x,
            self.scale.y,
            self.rotation,
            self.skew.x,
            self.skew.y,
        );
        m
    }

    /// `parent * local`.
    pub fn world_matrix(&self, parent: &Matrix) -> Matrix {
        let mut world = *parent;
        world.append(&self.local_matrix());
        world
    }
}
