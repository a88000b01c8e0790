//! Equirectangular-to-pinhole reprojection for 360 source video (spec.md
//! §4.5): eight 90°-FOV perspective views per source frame, yaw angles
//! 0/45/.../315, pitch 0, bilinear source interpolation.

use image::{DynamicImage, GenericImageView, Rgb, RgbImage};

/// Fixed yaw sweep the extractor synthesizes per equirectangular frame.
pub const YAW_ANGLES_DEG: [f64; 8] = [0.0, 45.0, 90.0, 135.0, 180.0, 225.0, 270.0, 315.0];
pub const FIELD_OF_VIEW_DEG: f64 = 90.0;

/// Re-project `source` (an equirectangular panorama) into a pinhole view
/// looking at `yaw_deg`/`pitch_deg` with the given horizontal+vertical field
/// of view, producing a square `out_size`x`out_size` image.
pub fn reproject_pinhole(source: &DynamicImage, yaw_deg: f64, pitch_deg: f64, fov_deg: f64, out_size: u32) -> RgbImage {
    let (src_w, src_h) = source.dimensions();
    let rgb_source = source.to_rgb8();

    let yaw = yaw_deg.to_radians();
    let pitch = pitch_deg.to_radians();
    let half_fov = fov_deg.to_radians() / 2.0;
    let focal = (out_size as f64 / 2.0) / half_fov.tan();

    let mut out = RgbImage::new(out_size, out_size);
    let half = out_size as f64 / 2.0;

    for y in 0..out_size {
        for x in 0..out_size {
            let camera_x = x as f64 - half + 0.5;
            let camera_y = y as f64 - half + 0.5;
            let camera_z = focal;

            // Camera-space ray, then pitch (about X) then yaw (about Y).
            let (cy, sy_) = (pitch.cos(), pitch.sin());
            let py = camera_y * cy - camera_z * sy_;
            let pz = camera_y * sy_ + camera_z * cy;
            let px = camera_x;

            let (cyaw, syaw) = (yaw.cos(), yaw.sin());
            let wx = px * cyaw + pz * syaw;
            let wz = -px * syaw + pz * cyaw;
            let wy = py;

            let norm = (wx * wx + wy * wy + wz * wz).sqrt();
            let (dx, dy, dz) = (wx / norm, wy / norm, wz / norm);

            let longitude = dx.atan2(dz);
            let latitude = dy.asin();

            let u = (longitude + std::f64::consts::PI) / (2.0 * std::f64::consts::PI) * src_w as f64;
            let v = (std::f64::consts::FRAC_PI_2 - latitude) / std::f64::consts::PI * src_h as f64;

            let pixel = bilinear_sample(&rgb_source, src_w, src_h, u, v);
            out.put_pixel(x, y, pixel);
        }
    }
    out
}

fn bilinear_sample(img: &RgbImage, width: u32, height: u32, u: f64, v: f64) -> Rgb<u8> {
    let wrap_u = |x: f64| -> f64 {
        let w = width as f64;
        let mut r = x % w;
        if r < 0.0 {
            r += w;
        }
        r
    };
    let u = wrap_u(u);
    let v = v.clamp(0.0, (height - 1) as f64);

    let x0 = u.floor() as u32 % width;
    let x1 = (x0 + 1) % width;
    let y0 = v.floor() as u32;
    let y1 = (y0 + 1).min(height - 1);

    let fx = u.fract();
    let fy = v.fract();

    let p00 = img.get_pixel(x0, y0).0;
    let p10 = img.get_pixel(x1, y0).0;
    let p01 = img.get_pixel(x0, y1).0;
    let p11 = img.get_pixel(x1, y1).0;

    let mut out = [0u8; 3];
    for channel in 0..3 {
        let top = p00[channel] as f64 * (1.0 - fx) + p10[channel] as f64 * fx;
        let bottom = p01[channel] as f64 * (1.0 - fx) + p11[channel] as f64 * fx;
        out[channel] = (top * (1.0 - fy) + bottom * fy).round() as u8;
    }
    Rgb(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn reprojection_produces_requested_square_size() {
        let source = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(512, 256, Rgba([128, 64, 32, 255])));
        let out = reproject_pinhole(&source, 0.0, 0.0, FIELD_OF_VIEW_DEG, 128);
        assert_eq!(out.dimensions(), (128, 128));
    }

    #[test]
    fn uniform_source_reprojects_to_uniform_output() {
        let source = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(512, 256, Rgba([10, 20, 30, 255])));
        let out = reproject_pinhole(&source, 90.0, 0.0, FIELD_OF_VIEW_DEG, 32);
        for pixel in out.pixels() {
            assert_eq!(pixel.0, [10, 20, 30]);
        }
    }

    #[test]
    fn eight_yaw_angles_are_evenly_spaced() {
        for pair in YAW_ANGLES_DEG.windows(2) {
            assert!((pair[1] - pair[0] - 45.0).abs() < 1e-9);
        }
    }
}
