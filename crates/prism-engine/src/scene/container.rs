use crate::coords::Matrix;
use crate::error::RenderResult;
use crate::render::Renderer;

use super::{DisplayObject, Transform};

/// Groups display objects under one transform and alpha.
pub struct Container {
    pub transform: Transform,
    pub alpha: f32,
    pub visible: bool,
    children: Vec<Box<dyn DisplayObject>>,
    world_transform: Matrix,
    world_alpha: f32,
}

impl Default for Container {
    fn default() -> Self {
        Self {
            transform: Transform::default(),
            alpha: 1.0,
            visible: true,
            children: Vec::new(),
            world_transform: Matrix::IDENTITY,
            world_alpha: 1.0,
        }
    }
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_child(&mut self, child: Box<dyn DisplayObject>) -> usize {
        self.children.push(child);
        self.children.len() - 1
    }

    pub fn remove_child(&mut self, index: usize) -> Option<Box<dyn DisplayObject>> {
        (index < self.children.len()).then(|| self.children.remove(index))
    }

    pub fn children(&self) -> &[Box<dyn DisplayObject>] {
        &self.children
    }

    pub fn child_mut(&mut self, index: usize) -> Option<&mut (dyn DisplayObject + 'static)> {
        self.children.get_mut(index).map(|c| c.as_mut())
    }
}

impl DisplayObject for Container {
    fn update_transform(&mut self, parent: &Matrix, parent_alpha: f32) {
        self.world_transform = self.transform.world_matrix(parent);
        self.world_alpha = self.alpha * parent_alpha;
        for child in &mut self.children {
            child.update_transform(&self.world_transform, self.world_alpha);
        }
    }

    fn world_transform(&self) -> Matrix {
        self.world_transform
    }

    fn world_alpha(&self) -> f32 {
        self.world_alpha
    }

    fn visible(&self) -> bool {
        self.visible
    }

    fn render_using(&mut self, renderer: &mut Renderer) -> RenderResult<()> {
        if !self.visible || self.world_alpha <= 0.0 {
            return Ok(());
        }
        for child in &mut self.children {
            if child.visible() {
                child.render_using(renderer)?;
            }
        }
        Ok(())
    }
}
