use image::{Rgba, RgbaImage};

/// Draws `layer` over `background` at opacity `alpha`.
///
/// The layer may be stored at a lower resolution than the background; it is
/// sampled nearest-neighbour in that case.
pub fn composite_layer(background: &RgbaImage, layer: &RgbaImage, alpha: f64) -> RgbaImage {
    let mut output = background.clone();
    blend_in_place(&mut output, layer, alpha);
    output
}

pub fn composite_over_blank(
    layer: &RgbaImage,
    width: u32,
    height: u32,
    background: Rgba<u8>,
    alpha: f64,
) -> RgbaImage {
    let mut output = RgbaImage::from_pixel(width, height, background);
    blend_in_place(&mut output, layer, alpha);
    output
}

fn blend_in_place(base: &mut RgbaImage, layer: &RgbaImage, alpha: f64) {
    let (bw, bh) = base.dimensions();
    let (lw, lh) = layer.dimensions();
    if bw == 0 || bh == 0 || lw == 0 || lh == 0 {
        return;
    }
    let alpha = alpha.clamp(0.0, 1.0) as f32;
    for (x, y, dst) in base.enumerate_pixels_mut() {
        let lx = (u64::from(x) * u64::from(lw) / u64::from(bw)) as u32;
        let ly = (u64::from(y) * u64::from(lh) / u64::from(bh)) as u32;
        let src = layer.get_pixel(lx.min(lw - 1), ly.min(lh - 1));
        *dst = blend_pixel(*dst, *src, alpha);
    }
}

fn blend_pixel(bottom: Rgba<u8>, top: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let sa = top.0[3] as f32 / 255.0 * opacity;
    let da = bottom.0[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);

    if out_a <= f32::EPSILON {
        return Rgba([0, 0, 0, 0]);
    }

    let blend = |s: u8, d: u8| -> u8 {
        (((s as f32 * sa) + (d as f32 * da * (1.0 - sa))) / out_a)
            .round()
            .clamp(0.0, 255.0) as u8
    };

    Rgba([
        blend(top.0[0], bottom.0[0]),
        blend(top.0[1], bottom.0[1]),
        blend(top.0[2], bottom.0[2]),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}
