use crate::coords::Matrix;
use crate::error::RenderResult;
use crate::render::Renderer;

/// Anything the renderer can traverse.
pub trait DisplayObject {
    /// Recomputes the world transform and alpha from the parent's.
    fn update_transform(&mut self, parent: &Matrix, parent_alpha: f32);

    fn world_transform(&self) -> Matrix;

    fn world_alpha(&self) -> f32;

    fn visible(&self) -> bool {
        true
    }

    /// Draws this object (and its children) through `renderer`, usually by
    /// calling [`Renderer::render_object`] with the plugin that handles it.
    fn render_using(&mut self, renderer: &mut Renderer) -> RenderResult<()>;
}
