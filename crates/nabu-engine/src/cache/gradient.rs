use std::num::NonZeroUsize;

use lru::LruCache;

use crate::coords::IRect;
use crate::gpu::{GpuError, OwnedTexture, RenderContext, TextureFormat, TextureId};
use crate::paint::{Color, ColorStop, Gradient, InterpolationMode};

/// Cache key: the stop content plus everything that changes the ramp.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct GradientKey {
    stops: u64,
    opacity: u32,
    interpolation: InterpolationMode,
}

/// A ramp and the stops it was generated from; a hash match alone is not
/// trusted.
struct Entry {
    stops: Vec<ColorStop>,
    texture: OwnedTexture,
}

/// Color ramps for gradient brushes, one `ramp_size × 1` RGBA texture per
/// distinct (stops, opacity, interpolation).
///
/// Callers normally pass an opacity of 1 and apply the painter's opacity in
/// the shader, so gradients that only differ in opacity share a ramp.
pub struct GradientCache {
    entries: LruCache<GradientKey, Entry>,
    ramp_size: u32,
}

impl GradientCache {
    pub fn new(capacity: usize, ramp_size: u32) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { entries: LruCache::new(capacity), ramp_size: ramp_size.max(2) }
    }

    #[inline]
    pub fn ramp_size(&self) -> u32 {
        self.ramp_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ramp texture for `gradient` at `opacity`, generated and uploaded on a
    /// miss. The least recently used ramp is released when the cache is full.
    pub fn get_or_create(
        &mut self,
        ctx: &mut dyn RenderContext,
        gradient: &Gradient,
        opacity: f32,
    ) -> Result<TextureId, GpuError> {
        let key = GradientKey {
            stops: gradient.stops_hash(),
            opacity: opacity.to_bits(),
            interpolation: gradient.interpolation,
        };
        self.get_or_create_keyed(ctx, key, &gradient.stops, opacity)
    }

    fn get_or_create_keyed(
        &mut self,
        ctx: &mut dyn RenderContext,
        key: GradientKey,
        stops: &[ColorStop],
        opacity: f32,
    ) -> Result<TextureId, GpuError> {
        if let Some(entry) = self.entries.get(&key) {
            if same_stops(&entry.stops, stops) {
                return Ok(entry.texture.id());
            }
            log::debug!("GradientCache: stop hash collision, regenerating ramp");
        }

        let ramp = generate_ramp(stops, key.interpolation, opacity, self.ramp_size);
        let texture = OwnedTexture::create(ctx, self.ramp_size, 1, TextureFormat::Rgba8)?;
        if let Err(err) = ctx.upload_texture(texture.id(), IRect::new(0, 0, self.ramp_size as i32, 1), &ramp) {
            texture.release(ctx);
            return Err(err);
        }

        let id = texture.id();
        // Also hands back a colliding entry replaced under the same key.
        if let Some((_, evicted)) = self.entries.push(key, Entry { stops: stops.to_vec(), texture }) {
            log::debug!("GradientCache: evicting ramp {:?}", evicted.texture.id());
            evicted.texture.release(ctx);
        }
        Ok(id)
    }

    pub fn clear(&mut self, ctx: &mut dyn RenderContext) {
        while let Some((_, entry)) = self.entries.pop_lru() {
            entry.texture.release(ctx);
        }
    }
}

/// Bitwise, matching what the key hashes.
fn same_stops(a: &[ColorStop], b: &[ColorStop]) -> bool {
    let bits = |s: &ColorStop| (s.t.to_bits(), s.color.to_array().map(f32::to_bits));
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| bits(x) == bits(y))
}

/// Premultiplied RGBA8 texels of a ramp sampled at texel centers.
///
/// The first texel always carries the first stop color so a padded
/// gradient starts exactly on it.
pub(crate) fn generate_ramp(
    stops: &[ColorStop],
    interpolation: InterpolationMode,
    opacity: f32,
    size: u32,
) -> Vec<u8> {
    let mut sorted: Vec<ColorStop> = stops.iter().copied().filter(|s| s.t.is_finite()).collect();
    sorted.sort_by(|a, b| a.t.total_cmp(&b.t));

    let opacity = opacity.clamp(0.0, 1.0);
    let Some((first, last)) = sorted.first().copied().zip(sorted.last().copied()) else {
        return vec![0; size as usize * 4];
    };

    let mut out = Vec::with_capacity(size as usize * 4);
    let mut segment = 0usize;
    for i in 0..size {
        let t = if i == 0 { first.t } else { (i as f32 + 0.5) / size as f32 };
        let color = if t <= first.t {
            first.color
        } else if t >= last.t {
            last.color
        } else {
            while segment + 1 < sorted.len() && sorted[segment + 1].t < t {
                segment += 1;
            }
            let (a, b) = (sorted[segment], sorted[(segment + 1).min(sorted.len() - 1)]);
            let span = b.t - a.t;
            let f = if span > 0.0 { (t - a.t) / span } else { 1.0 };
            interpolate(a.color, b.color, f, interpolation)
        };
        out.extend_from_slice(&color.scaled(opacity).to_rgba8_premul());
    }
    out
}

fn interpolate(a: Color, b: Color, f: f32, mode: InterpolationMode) -> Color {
    let lerp = |x: f32, y: f32| x + (y - x) * f;
    match mode {
        InterpolationMode::Color => {
            Color::from_premul(lerp(a.r, b.r), lerp(a.g, b.g), lerp(a.b, b.b), lerp(a.a, b.a))
        }
        InterpolationMode::Component => {
            let (ar, ag, ab, aa) = a.to_straight();
            let (br, bg, bb, ba) = b.to_straight();
            Color::from_straight(lerp(ar, br), lerp(ag, bg), lerp(ab, bb), lerp(aa, ba))
        }
    }
}
