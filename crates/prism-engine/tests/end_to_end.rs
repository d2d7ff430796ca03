mod common;

use std::rc::Rc;

use prism_engine::coords::{Matrix, Rect, Vec2};
use prism_engine::scene::{Container, ParticleContainer, Sprite};
use prism_engine::texture::{BaseTexture, ScaleMode, Texture};

use common::{BLUE, RED, device, particle, renderer, solid};

#[test]
fn centered_quad_has_fill_color_and_clear_corners() {
    let mut r = renderer(100, 100);
    let red = solid(RED);
    let mut particles = ParticleContainer::new(16);
    particles.add_child(particle(&red, 50.0, 50.0, 10.0));

    r.render_root(&mut particles).unwrap();

    let dev = device(&r);
    assert_eq!(dev.pixel(50, 50), Some(RED));
    for (x, y) in [(0, 0), (99, 0), (0, 99), (99, 99)] {
        assert_eq!(dev.pixel(x, y), Some(BLUE), "corner ({x}, {y})");
    }
    assert_eq!(r.last_frame_stats().draw_calls, 1);
}

#[test]
fn unit_quad_covers_exactly_one_pixel() {
    let mut r = renderer(100, 100);
    let red = solid(RED);
    let mut particles = ParticleContainer::new(1);
    particles.add_child(particle(&red, 50.5, 50.5, 1.0));

    r.render_root(&mut particles).unwrap();

    let dev = device(&r);
    assert_eq!(dev.pixel(50, 50), Some(RED));
    assert_eq!(dev.pixel(49, 50), Some(BLUE));
    assert_eq!(dev.pixel(51, 50), Some(BLUE));
    assert_eq!(dev.pixel(50, 51), Some(BLUE));
    assert_eq!(dev.counters().pixels_written, 1);
}

#[test]
fn trimmed_and_untrimmed_frames_render_identically() {
    // 4x4 image with an opaque 2x2 center.
    let mut full = vec![0u8; 4 * 4 * 4];
    for y in 1..3 {
        for x in 1..3 {
            let i = (y * 4 + x) * 4;
            full[i..i + 4].copy_from_slice(&RED);
        }
    }
    let untrimmed_base = Rc::new(BaseTexture::from_rgba8(4, 4, full).unwrap().with_scale_mode(ScaleMode::Nearest));
    let untrimmed = Texture::from_base(untrimmed_base);

    let trimmed_base = Rc::new(BaseTexture::from_rgba8(2, 2, RED.repeat(4)).unwrap().with_scale_mode(ScaleMode::Nearest));
    let trimmed = Texture::new(
        trimmed_base,
        Rect::new(0.0, 0.0, 2.0, 2.0),
        Rect::from_size(4.0, 4.0),
        Some(Rect::new(1.0, 1.0, 2.0, 2.0)),
    )
    .unwrap();

    let draw = |texture: Texture| {
        let mut r = renderer(100, 100);
        let mut s = Sprite::new(texture);
        s.anchor = Vec2::splat(0.5);
        s.transform.position = Vec2::new(50.0, 50.0);
        s.transform.scale = Vec2::splat(5.0);
        let mut particles = ParticleContainer::new(1);
        particles.add_child(s);
        r.render_root(&mut particles).unwrap();
        r.extract_pixels(None).unwrap()
    };

    let a = draw(untrimmed);
    let b = draw(trimmed);
    assert_eq!(a.len(), 100 * 100 * 4);
    assert!(a == b, "trimmed and untrimmed sprites differ");
    // The opaque region spans pixels 45..55.
    let at = |x: usize, y: usize| &a[(y * 100 + x) * 4..(y * 100 + x) * 4 + 4];
    assert_eq!(at(45, 45), &RED);
    assert_eq!(at(54, 54), &RED);
    assert_eq!(at(44, 50), &BLUE);
    assert_eq!(at(55, 50), &BLUE);
}

#[test]
fn container_transform_and_alpha_apply_to_the_batch() {
    let mut r = renderer(100, 100);
    let red = solid(RED);

    let mut particles = ParticleContainer::new(4);
    particles.add_child(particle(&red, 0.0, 0.0, 10.0));
    particles.transform.position = Vec2::new(30.0, 70.0);
    particles.alpha = 0.5;

    let mut root = Container::new();
    root.add_child(Box::new(particles));
    r.render_root(&mut root).unwrap();

    // Half-transparent red over opaque blue.
    let px = device(&r).pixel(30, 70).unwrap();
    assert!(px[0].abs_diff(128) <= 1 && px[2].abs_diff(128) <= 1 && px[3] == 255, "{px:?}");
    assert_eq!(device(&r).pixel(50, 50), Some(BLUE));
}

#[test]
fn render_transform_shifts_the_frame() {
    let mut r = renderer(100, 100);
    let red = solid(RED);
    let mut particles = ParticleContainer::new(1);
    particles.add_child(particle(&red, 50.0, 50.0, 10.0));

    let shift = Matrix::new(1.0, 0.0, 0.0, 1.0, 20.0, 0.0);
    r.render(&mut particles, None, None, Some(shift), false).unwrap();

    assert_eq!(device(&r).pixel(70, 50), Some(RED));
    assert_eq!(device(&r).pixel(50, 50), Some(BLUE));
}

#[test]
fn offscreen_target_is_extracted_without_touching_the_root() {
    let mut r = renderer(100, 100);
    let red = solid(RED);
    let target = r.create_render_target(20, 20, false).unwrap();

    let mut particles = ParticleContainer::new(1);
    particles.add_child(particle(&red, 10.0, 10.0, 4.0));
    r.render(&mut particles, Some(target), Some(true), None, false).unwrap();

    let image = r.extract_image(Some(target)).unwrap();
    assert_eq!(image.dimensions(), (20, 20));
    assert_eq!(image.get_pixel(10, 10).0, RED);
    assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 0]);

    // The root framebuffer was never cleared or drawn to.
    assert_eq!(device(&r).pixel(10, 10), Some([0, 0, 0, 0]));

    r.release_render_target(target).unwrap();
    assert!(r.extract_pixels(Some(target)).is_err());
}

#[test]
fn skip_update_transform_keeps_previous_world_transform() {
    let mut r = renderer(100, 100);
    let red = solid(RED);
    let mut particles = ParticleContainer::new(1);
    particles.add_child(particle(&red, 50.0, 50.0, 10.0));

    r.render_root(&mut particles).unwrap();
    particles.transform.position = Vec2::new(-30.0, 0.0);
    r.render(&mut particles, None, None, None, true).unwrap();

    assert_eq!(device(&r).pixel(50, 50), Some(RED));
    assert_eq!(device(&r).pixel(20, 50), Some(BLUE));
}
