#![allow(dead_code)]

use std::rc::Rc;

use prism_engine::coords::Vec2;
use prism_engine::device::SoftwareDevice;
use prism_engine::paint::Color;
use prism_engine::render::{Renderer, RendererOptions};
use prism_engine::scene::Sprite;
use prism_engine::texture::{BaseTexture, ScaleMode, Texture};

pub const RED: [u8; 4] = [255, 0, 0, 255];
pub const BLUE: [u8; 4] = [0, 0, 255, 255];

pub fn renderer(width: u32, height: u32) -> Renderer {
    prism_engine::logging::init_test_logging();
    let options = RendererOptions::default()
        .with_size(width, height)
        .with_background(Color::from_rgba8(BLUE));
    Renderer::software(options).expect("software renderer")
}

pub fn device(r: &Renderer) -> &SoftwareDevice {
    r.device_as::<SoftwareDevice>().expect("software device")
}

pub fn device_mut(r: &mut Renderer) -> &mut SoftwareDevice {
    r.device_as_mut::<SoftwareDevice>().expect("software device")
}

pub fn solid(color: [u8; 4]) -> Rc<BaseTexture> {
    Rc::new(
        BaseTexture::solid(1, 1, Color::from_rgba8(color))
            .expect("texture")
            .with_scale_mode(ScaleMode::Nearest),
    )
}

/// A sprite centered on `(x, y)` covering `size x size` pixels of `base`.
pub fn particle(base: &Rc<BaseTexture>, x: f32, y: f32, size: f32) -> Sprite {
    let texture = Texture::from_base(base.clone());
    let mut s = Sprite::new(texture);
    s.anchor = Vec2::splat(0.5);
    s.transform.position = Vec2::new(x, y);
    s.transform.scale = Vec2::splat(size / base.width() as f32);
    s
}
