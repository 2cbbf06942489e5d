//! Show image information.

use std::path::PathBuf;

use anyhow::Context;
use image::RgbaImage;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    let decoded =
        image::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
    let color = decoded.color();
    let rgba = decoded.to_rgba8();
    let stats = AlphaStats::measure(&rgba);

    println!("Image: {}", path.display());
    println!("  Dimensions: {}x{}", rgba.width(), rgba.height());
    println!("  Color type: {color:?}");
    println!("  Has alpha: {}", color.has_alpha());
    println!();

    println!("Alpha coverage:");
    println!("  Opaque: {:.1}%", stats.percent(stats.opaque));
    println!("  Partial: {:.1}%", stats.percent(stats.partial));
    println!("  Transparent: {:.1}%", stats.percent(stats.transparent));
    println!("  Mean alpha: {:.1}", stats.mean_alpha);
    match stats.visible_bounds {
        Some((x0, y0, x1, y1)) => println!(
            "  Visible bounds: ({x0}, {y0}) to ({x1}, {y1}), {}x{}",
            x1 - x0 + 1,
            y1 - y0 + 1
        ),
        None => println!("  Visible bounds: none (fully transparent)"),
    }

    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
struct AlphaStats {
    total: u64,
    opaque: u64,
    partial: u64,
    transparent: u64,
    mean_alpha: f64,
    /// Inclusive `(min_x, min_y, max_x, max_y)` of pixels with alpha > 0.
    visible_bounds: Option<(u32, u32, u32, u32)>,
}

impl AlphaStats {
    fn measure(image: &RgbaImage) -> Self {
        let mut stats = AlphaStats {
            total: 0,
            opaque: 0,
            partial: 0,
            transparent: 0,
            mean_alpha: 0.0,
            visible_bounds: None,
        };
        let mut alpha_sum = 0u64;

        for (x, y, pixel) in image.enumerate_pixels() {
            let a = pixel.0[3];
            stats.total += 1;
            alpha_sum += u64::from(a);
            match a {
                0 => {
                    stats.transparent += 1;
                    continue;
                }
                255 => stats.opaque += 1,
                _ => stats.partial += 1,
            }
            stats.visible_bounds = Some(match stats.visible_bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }

        if stats.total > 0 {
            stats.mean_alpha = alpha_sum as f64 / stats.total as f64;
        }
        stats
    }

    fn percent(&self, count: u64) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 * 100.0 / self.total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_alpha_stats() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        img.put_pixel(1, 2, Rgba([9, 9, 9, 255]));
        img.put_pixel(3, 1, Rgba([9, 9, 9, 128]));

        let stats = AlphaStats::measure(&img);
        assert_eq!(stats.total, 16);
        assert_eq!((stats.opaque, stats.partial, stats.transparent), (1, 1, 14));
        assert_eq!(stats.visible_bounds, Some((1, 1, 3, 2)));
        assert!((stats.mean_alpha - 383.0 / 16.0).abs() < 1e-9);
        assert_eq!(stats.percent(stats.transparent), 87.5);
    }

    #[test]
    fn test_fully_transparent_has_no_bounds() {
        let img = RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 0]));
        let stats = AlphaStats::measure(&img);
        assert_eq!(stats.visible_bounds, None);
        assert_eq!(stats.mean_alpha, 0.0);
    }
}
