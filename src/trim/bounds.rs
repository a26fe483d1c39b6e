use image::{imageops, RgbaImage};

/// Pixel rectangle with inclusive bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl BoundingBox {
    /// The whole of a `width`x`height` canvas
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            min_x: 0,
            min_y: 0,
            max_x: width.saturating_sub(1),
            max_y: height.saturating_sub(1),
        }
    }

    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    /// Grow by `pad` pixels on every side, clamped to a `width`x`height` canvas
    pub fn expand(self, pad: u32, width: u32, height: u32) -> Self {
        Self {
            min_x: self.min_x.saturating_sub(pad),
            min_y: self.min_y.saturating_sub(pad),
            max_x: self.max_x.saturating_add(pad).min(width.saturating_sub(1)),
            max_y: self.max_y.saturating_add(pad).min(height.saturating_sub(1)),
        }
    }

    pub fn padded(self, padding: Padding, width: u32, height: u32) -> Self {
        self.expand(padding.pixels_for(&self), width, height)
    }
}

/// Margin kept around the visible content when cropping
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Padding {
    /// Fixed number of pixels on each side
    Pixels(u32),
    /// Fraction of the longer side of the content box, on each side
    Relative(f32),
}

impl Padding {
    pub fn pixels_for(self, bounds: &BoundingBox) -> u32 {
        match self {
            Self::Pixels(pixels) => pixels,
            Self::Relative(fraction) => {
                let longer = bounds.width().max(bounds.height()) as f32;
                (fraction.max(0.0) * longer).round() as u32
            }
        }
    }
}

/// Smallest box containing every pixel whose alpha exceeds `alpha_threshold`.
///
/// `None` when the image has no such pixel.
pub fn find_bounds(image: &RgbaImage, alpha_threshold: u8) -> Option<BoundingBox> {
    let _span = tracing::debug_span!("find_bounds").entered();

    let mut bounds: Option<BoundingBox> = None;
    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel[3] <= alpha_threshold {
            continue;
        }
        bounds = Some(match bounds {
            None => BoundingBox {
                min_x: x,
                min_y: y,
                max_x: x,
                max_y: y,
            },
            Some(b) => BoundingBox {
                min_x: b.min_x.min(x),
                min_y: b.min_y.min(y),
                max_x: b.max_x.max(x),
                max_y: b.max_y.max(y),
            },
        });
    }
    bounds
}

pub fn crop(image: &RgbaImage, bounds: BoundingBox) -> RgbaImage {
    imageops::crop_imm(
        image,
        bounds.min_x,
        bounds.min_y,
        bounds.width(),
        bounds.height(),
    )
    .to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn with_rect(width: u32, height: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
                Rgba([200, 0, 0, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        })
    }

    #[test]
    fn bounds_cover_opaque_rectangle() {
        let img = with_rect(1000, 2000, 400, 800, 600, 1200);
        let bounds = find_bounds(&img, 10).unwrap();

        assert_eq!(
            bounds,
            BoundingBox {
                min_x: 400,
                min_y: 800,
                max_x: 599,
                max_y: 1199
            }
        );
        assert_eq!((bounds.width(), bounds.height()), (200, 400));
    }

    #[test]
    fn faint_pixels_are_ignored() {
        let mut img = with_rect(50, 50, 20, 20, 30, 30);
        img.put_pixel(0, 0, Rgba([255, 255, 255, 10]));
        img.put_pixel(49, 49, Rgba([255, 255, 255, 11]));

        let bounds = find_bounds(&img, 10).unwrap();
        assert_eq!((bounds.min_x, bounds.min_y), (20, 20));
        assert_eq!((bounds.max_x, bounds.max_y), (49, 49));
    }

    #[test]
    fn transparent_image_has_no_bounds() {
        assert_eq!(find_bounds(&RgbaImage::new(8, 8), 10), None);
    }

    #[test]
    fn expansion_clamps_to_canvas() {
        let bounds = BoundingBox {
            min_x: 3,
            min_y: 5,
            max_x: 90,
            max_y: 40,
        };
        let grown = bounds.expand(10, 95, 100);
        assert_eq!(
            grown,
            BoundingBox {
                min_x: 0,
                min_y: 0,
                max_x: 94,
                max_y: 50
            }
        );
    }

    #[test]
    fn relative_padding_uses_longer_side() {
        let bounds = BoundingBox {
            min_x: 0,
            min_y: 0,
            max_x: 99,
            max_y: 199,
        };
        assert_eq!(Padding::Relative(0.035).pixels_for(&bounds), 7);
        assert_eq!(Padding::Pixels(10).pixels_for(&bounds), 10);
    }

    #[test]
    fn pixel_padding_sets_content_fraction() {
        let img = with_rect(300, 300, 100, 100, 200, 200);
        let bounds = find_bounds(&img, 10).unwrap().padded(Padding::Pixels(10), 300, 300);
        let cropped = crop(&img, bounds);

        // content occupies 1 - 2P/size of the output
        let size = cropped.width();
        assert_eq!(size, 120);
        let opaque_columns = (0..size).filter(|&x| cropped.get_pixel(x, 60)[3] > 0).count();
        let expected = (1.0 - 2.0 * 10.0 / size as f32) * size as f32;
        assert!((opaque_columns as f32 - expected).abs() <= 1.0);
    }
}
