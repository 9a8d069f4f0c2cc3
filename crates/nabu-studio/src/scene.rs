//! Demonstration scene.
//!
//! The canvas is split into a 3×2 grid of panels. Every panel exercises
//! one family of paint calls.

use std::f32::consts::{FRAC_PI_4, PI};

use anyhow::{Context, Result};
use nabu_engine::coords::{Rect, Transform, Vec2};
use nabu_engine::engine::{ClipOperation, FragmentHints, ImageFragment};
use nabu_engine::geom::{FillRule, PathBuilder, VectorPath};
use nabu_engine::gpu::RenderContext;
use nabu_engine::paint::{
    Brush, BrushPattern, CapStyle, Color, ColorStop, CompositionMode, Gradient, Image, ImageFormat, JoinStyle, Pen,
    PenStyle, SpreadMode,
};
use nabu_engine::text::{FontId, FontSystem};
use nabu_engine::PaintEngine;

const PANEL: f32 = 320.0;

pub fn paint<C: RenderContext>(engine: &mut PaintEngine<C>, fonts: &mut FontSystem, font: Option<FontId>) -> Result<()> {
    in_panel(engine, 0, 0, |e| {
        fills(e);
        Ok(())
    })?;
    in_panel(engine, 1, 0, |e| {
        strokes(e);
        Ok(())
    })?;
    in_panel(engine, 2, 0, |e| {
        gradients(e);
        Ok(())
    })?;
    in_panel(engine, 0, 1, |e| {
        clips(e);
        Ok(())
    })?;
    in_panel(engine, 1, 1, images)?;
    in_panel(engine, 2, 1, |e| {
        text(e, fonts, font);
        Ok(())
    })
}

/// Runs `f` with the origin at the top-left corner of panel (`col`, `row`).
fn in_panel<C: RenderContext>(
    engine: &mut PaintEngine<C>,
    col: u32,
    row: u32,
    f: impl FnOnce(&mut PaintEngine<C>) -> Result<()>,
) -> Result<()> {
    engine.save();
    engine.set_transform(Transform::translation(col as f32 * PANEL, row as f32 * PANEL));
    engine.clip_rect(Rect::new(0.0, 0.0, PANEL, PANEL), ClipOperation::ReplaceClip);
    let result = f(engine);
    engine.restore();
    result
}

fn star(center: Vec2, outer: f32, inner: f32, points: u32) -> Vec<Vec2> {
    (0..points * 2)
        .map(|i| {
            let r = if i % 2 == 0 { outer } else { inner };
            let a = i as f32 * PI / points as f32 - PI / 2.0;
            center + Vec2::new(a.cos(), a.sin()) * r
        })
        .collect()
}

/// Pentagram whose inner pentagon has winding number 2.
fn pentagram(center: Vec2, radius: f32, rule: FillRule) -> VectorPath {
    let corner = |i: u32| {
        let a = (i * 2 % 5) as f32 * 2.0 * PI / 5.0 - PI / 2.0;
        center + Vec2::new(a.cos(), a.sin()) * radius
    };
    let mut builder = PathBuilder::new().fill_rule(rule);
    builder.move_to(corner(0));
    for i in 1..5 {
        builder.line_to(corner(i));
    }
    builder.close();
    builder.build()
}

fn fills<C: RenderContext>(engine: &mut PaintEngine<C>) {
    engine.fill_rect(Rect::new(20.0, 20.0, 120.0, 80.0), &Brush::solid(Color::from_rgba8(230, 57, 70, 255)));

    let mut convex = PathBuilder::new().convex(true);
    convex.add_polygon(&[
        Vec2::new(180.0, 20.0),
        Vec2::new(300.0, 40.0),
        Vec2::new(280.0, 100.0),
        Vec2::new(170.0, 90.0),
    ]);
    engine.fill_path(&convex.build(), &Brush::solid(Color::from_rgba8(69, 123, 157, 255)));

    let blue = Brush::solid(Color::from_rgba8(29, 53, 87, 255));
    engine.fill_path(&pentagram(Vec2::new(80.0, 200.0), 70.0, FillRule::Winding), &blue);
    engine.fill_path(&pentagram(Vec2::new(240.0, 200.0), 70.0, FillRule::OddEven), &blue);

    let mut spiky = PathBuilder::new();
    spiky.add_polygon(&star(Vec2::new(160.0, 270.0), 45.0, 18.0, 7));
    spiky.add_ellipse(Rect::new(130.0, 240.0, 60.0, 60.0));
    engine.fill_path(&spiky.build(), &Brush::solid(Color::from_rgba8(42, 157, 143, 160)));
}

fn strokes<C: RenderContext>(engine: &mut PaintEngine<C>) {
    let mut wave = PathBuilder::new();
    wave.move_to(Vec2::new(20.0, 60.0));
    for i in 0..4 {
        let x = 20.0 + i as f32 * 70.0;
        wave.cubic_to(Vec2::new(x + 20.0, 10.0), Vec2::new(x + 50.0, 110.0), Vec2::new(x + 70.0, 60.0));
    }
    let wave = wave.build();
    let ink = Color::from_rgba8(38, 70, 83, 255);
    engine.stroke_path(&wave, &Pen::solid(ink, 6.0).with_cap(CapStyle::Round).with_join(JoinStyle::Round));

    let mut zigzag = PathBuilder::new();
    zigzag.move_to(Vec2::new(20.0, 140.0));
    for i in 1..8 {
        let y = if i % 2 == 0 { 140.0 } else { 190.0 };
        zigzag.line_to(Vec2::new(20.0 + i as f32 * 40.0, y));
    }
    let zigzag = zigzag.build();
    engine.stroke_path(&zigzag, &Pen::solid(Color::from_rgba8(244, 162, 97, 255), 8.0).with_join(JoinStyle::Miter));

    // Translucent and self-overlapping: every pixel is blended once.
    let mut knot = PathBuilder::new();
    knot.move_to(Vec2::new(40.0, 220.0));
    knot.line_to(Vec2::new(280.0, 300.0));
    knot.line_to(Vec2::new(280.0, 220.0));
    knot.line_to(Vec2::new(40.0, 300.0));
    knot.close();
    let knot = knot.build();
    engine.stroke_path(&knot, &Pen::solid(Color::from_rgba8(231, 111, 81, 140), 14.0));

    let dashed = Pen::solid(ink, 2.0).with_style(PenStyle::DashDot).with_cap(CapStyle::Flat);
    engine.stroke_path(&PathBuilder::new().add_rect(Rect::new(10.0, 10.0, 300.0, 300.0)).build(), &dashed);

    // Cosmetic pens stay one pixel wide under any transform.
    engine.save();
    engine.set_transform(engine.transform().pre_scale(1.0, 3.0));
    engine.stroke_path(&PathBuilder::new().add_ellipse(Rect::new(140.0, 70.0, 40.0, 20.0)).build(), &Pen::solid(ink, 0.0));
    engine.restore();
}

fn gradients<C: RenderContext>(engine: &mut PaintEngine<C>) {
    let stops = vec![
        ColorStop::new(0.0, Color::from_rgba8(38, 70, 83, 255)),
        ColorStop::new(0.5, Color::from_rgba8(233, 196, 106, 255)),
        ColorStop::new(1.0, Color::from_rgba8(231, 111, 81, 255)),
    ];

    let linear = Gradient::linear(Vec2::new(20.0, 0.0), Vec2::new(140.0, 0.0), stops.clone());
    engine.fill_rect(Rect::new(20.0, 20.0, 130.0, 130.0), &Brush::gradient(linear));

    let radial = Gradient::radial_focal(Vec2::new(235.0, 85.0), 65.0, Vec2::new(215.0, 65.0), 5.0, stops.clone())
        .with_spread(SpreadMode::Reflect);
    let circle = PathBuilder::new().add_ellipse(Rect::new(170.0, 20.0, 130.0, 130.0)).build();
    engine.fill_path(&circle, &Brush::gradient(radial));

    let conical = Gradient::conical(Vec2::new(85.0, 235.0), 0.0, stops.clone());
    let wheel = PathBuilder::new().add_ellipse(Rect::new(20.0, 170.0, 130.0, 130.0)).build();
    engine.fill_path(&wheel, &Brush::gradient(conical));

    let repeating = Gradient::linear(Vec2::new(0.0, 170.0), Vec2::new(0.0, 190.0), stops).with_spread(SpreadMode::Repeat);
    let pattern = Brush::pattern(BrushPattern::DiagCross, Color::from_rgba8(29, 53, 87, 255))
        .with_transform(Transform::rotation(FRAC_PI_4));
    engine.fill_rect(Rect::new(170.0, 170.0, 130.0, 60.0), &Brush::gradient(repeating));
    engine.fill_rect(Rect::new(170.0, 240.0, 130.0, 60.0), &pattern);
}

fn clips<C: RenderContext>(engine: &mut PaintEngine<C>) {
    let stripes = Brush::pattern(BrushPattern::Horizontal, Color::from_rgba8(69, 123, 157, 255));

    engine.save();
    let ring = PathBuilder::new().add_ellipse(Rect::new(20.0, 20.0, 280.0, 280.0)).build();
    engine.clip_path(&ring, ClipOperation::IntersectClip);
    engine.fill_rect(Rect::new(0.0, 0.0, PANEL, PANEL), &stripes);

    // Nested: only where the star and the circle overlap.
    let mut star_path = PathBuilder::new();
    star_path.add_polygon(&star(Vec2::new(160.0, 160.0), 150.0, 60.0, 5));
    engine.clip_path(&star_path.build(), ClipOperation::IntersectClip);
    engine.fill_rect(Rect::new(0.0, 0.0, PANEL, PANEL), &Brush::solid(Color::from_rgba8(230, 57, 70, 200)));

    engine.save();
    engine.clip_rect(Rect::new(120.0, 0.0, 80.0, PANEL), ClipOperation::IntersectClip);
    engine.set_composition_mode(CompositionMode::Multiply);
    engine.fill_rect(Rect::new(0.0, 0.0, PANEL, PANEL), &Brush::solid(Color::from_rgba8(233, 196, 106, 255)));
    engine.restore();
    engine.restore();

    // Clipping off: the corner marks ignore everything above.
    engine.save();
    engine.set_clip_enabled(false);
    let mark = Brush::solid(Color::from_rgba8(38, 70, 83, 255));
    engine.fill_rect(Rect::new(0.0, 0.0, 12.0, 12.0), &mark);
    engine.fill_rect(Rect::new(PANEL - 12.0, PANEL - 12.0, 12.0, 12.0), &mark);
    engine.restore();
}

/// 64×64 straight-alpha checkerboard with a translucent diagonal.
fn checkerboard() -> Result<Image> {
    const SIDE: u32 = 64;
    let mut pixels = Vec::with_capacity((SIDE * SIDE * 4) as usize);
    for y in 0..SIDE {
        for x in 0..SIDE {
            let px = if x.abs_diff(y) < 4 {
                [255, 255, 255, 128]
            } else if (x / 8 + y / 8) % 2 == 0 {
                [42, 157, 143, 255]
            } else {
                [233, 196, 106, 255]
            };
            pixels.extend_from_slice(&px);
        }
    }
    Image::new(SIDE, SIDE, ImageFormat::Rgba8, pixels).context("checkerboard image")
}

fn images<C: RenderContext>(engine: &mut PaintEngine<C>) -> Result<()> {
    let board = checkerboard()?;
    let full = Rect::new(0.0, 0.0, 64.0, 64.0);
    engine.draw_image(Rect::new(20.0, 20.0, 128.0, 128.0), &board, full);

    engine.save();
    engine.set_opacity(0.5);
    engine.set_transform(engine.transform().pre_translate(240.0, 84.0));
    engine.set_transform(Transform::rotation(0.3).then(engine.transform()));
    engine.draw_image(Rect::new(-64.0, -64.0, 128.0, 128.0), &board, full);
    engine.restore();

    let fragments: Vec<ImageFragment> = (0..6)
        .map(|i| {
            let t = i as f32;
            ImageFragment::new(Vec2::new(40.0 + t * 48.0, 240.0), Rect::new(0.0, 0.0, 32.0, 32.0))
                .with_rotation(t * 15.0)
                .with_scale(1.0, 1.0 + t * 0.1)
                .with_opacity(1.0 - t * 0.12)
        })
        .collect();
    engine.draw_image_fragments(&fragments, &board, FragmentHints::empty());

    let mask_pixels: Vec<u8> = (0..32 * 32).map(|i: u32| ((i % 32) * 8) as u8).collect();
    let mask = Image::new(32, 32, ImageFormat::Alpha8, mask_pixels).context("alpha mask image")?;
    engine.save();
    engine.set_pen(Pen::solid(Color::from_rgba8(230, 57, 70, 255), 1.0));
    engine.draw_image(Rect::new(20.0, 280.0, 280.0, 24.0), &mask, Rect::new(0.0, 0.0, 32.0, 32.0));
    engine.restore();
    Ok(())
}

fn text<C: RenderContext>(engine: &mut PaintEngine<C>, fonts: &mut FontSystem, font: Option<FontId>) {
    let Some(font) = font else {
        return;
    };
    let ink = Color::from_rgba8(29, 53, 87, 255);
    let lines = [(14.0, "The quick brown fox"), (22.0, "jumps over"), (36.0, "the lazy dog")];

    engine.save();
    engine.set_pen(Pen::solid(ink, 1.0));
    let mut y = 30.0;
    for (size, line) in lines {
        let Some(face) = fonts.engine(font, size) else {
            continue;
        };
        let run = fonts.layout(line, font, size, Vec2::new(20.0, y));
        engine.draw_glyphs(&run, face.as_ref());
        y += size * 1.4;
    }

    let stops = vec![
        ColorStop::new(0.0, Color::from_rgba8(230, 57, 70, 255)),
        ColorStop::new(1.0, Color::from_rgba8(69, 123, 157, 255)),
    ];
    let gradient = Gradient::linear(Vec2::new(20.0, 0.0), Vec2::new(300.0, 0.0), stops);
    engine.set_pen(Pen::new(Brush::gradient(gradient), 1.0));
    if let Some(face) = fonts.engine(font, 28.0) {
        let run = fonts.layout("Gradient ink", font, 28.0, Vec2::new(20.0, 200.0));
        engine.draw_glyphs(&run, face.as_ref());

        // Scaled and rotated runs go through the glyph cache for their scale.
        engine.set_transform(engine.transform().pre_translate(40.0, 280.0).pre_scale(1.5, 1.5));
        engine.draw_glyphs(&fonts.layout("scaled", font, 28.0, Vec2::zero()), face.as_ref());
        engine.set_transform(Transform::rotation(-0.2).then(engine.transform()));
        engine.draw_glyphs(&fonts.layout("   rotated", font, 28.0, Vec2::new(80.0, 0.0)), face.as_ref());
    }
    engine.restore();
}
