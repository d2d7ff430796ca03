use std::rc::Rc;

use crate::coords::Rect;
use crate::error::{RenderError, RenderResult};

use super::BaseTexture;

/// Normalized texture coordinates of a frame's four corners.
///
/// Corner order is top-left, top-right, bottom-right, bottom-left, matching
/// the quad vertex order used by the particle batcher.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct TextureUvs {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub x3: f32,
    pub y3: f32,
}

impl TextureUvs {
    fn from_frame(frame: Rect, width: u32, height: u32) -> Self {
        let tw = width as f32;
        let th = height as f32;
        let left = frame.x() / tw;
        let top = frame.y() / th;
        let right = (frame.x() + frame.width()) / tw;
        let bottom = (frame.y() + frame.height()) / th;
        Self {
            x0: left,
            y0: top,
            x1: right,
            y1: top,
            x2: right,
            y2: bottom,
            x3: left,
            y3: bottom,
        }
    }

    /// Corners in order as `[u, v]` pairs.
    pub fn corners(&self) -> [[f32; 2]; 4] {
        [[self.x0, self.y0], [self.x1, self.y1], [self.x2, self.y2], [self.x3, self.y3]]
    }
}

/// A rectangular view into a [`BaseTexture`].
///
/// - `frame`: the region of the base texture, in texels
/// - `orig`: the untrimmed size of the source image (origin unused)
/// - `trim`: where `frame` sits inside `orig` when transparent borders were cut
#[derive(Debug, Clone)]
pub struct Texture {
    base: Rc<BaseTexture>,
    frame: Rect,
    orig: Rect,
    trim: Option<Rect>,
    uvs: TextureUvs,
}

impl Texture {
    pub fn new(base: Rc<BaseTexture>, frame: Rect, orig: Rect, trim: Option<Rect>) -> RenderResult<Self> {
        let bounds = Rect::from_size(base.width() as f32, base.height() as f32);
        if frame.is_empty() || !bounds.contains_rect(frame) {
            return Err(RenderError::InvalidResource(format!(
                "frame {frame:?} does not fit base texture {}x{}",
                base.width(),
                base.height()
            )));
        }
        if let Some(t) = trim {
            if t.width() != frame.width() || t.height() != frame.height() {
                return Err(RenderError::InvalidResource(format!(
                    "trim {t:?} must have the size of frame {frame:?}"
                )));
            }
        }
        let uvs = TextureUvs::from_frame(frame, base.width(), base.height());
        Ok(Self { base, frame, orig, trim, uvs })
    }

    /// A frame covering the whole base texture.
    pub fn from_base(base: Rc<BaseTexture>) -> Self {
        let full = Rect::from_size(base.width() as f32, base.height() as f32);
        let uvs = TextureUvs::from_frame(full, base.width(), base.height());
        Self { base, frame: full, orig: full, trim: None, uvs }
    }

    #[inline]
    pub fn base(&self) -> &Rc<BaseTexture> {
        &self.base
    }

    #[inline]
    pub fn frame(&self) -> Rect {
        self.frame
    }

    #[inline]
    pub fn orig(&self) -> Rect {
        self.orig
    }

    #[inline]
    pub fn trim(&self) -> Option<Rect> {
        self.trim
    }

    #[inline]
    pub fn uvs(&self) -> &TextureUvs {
        &self.uvs
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.orig.width()
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.orig.height()
    }
}
