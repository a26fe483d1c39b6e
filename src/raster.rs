use image::{imageops, ImageFormat, RgbaImage};
use std::io::Cursor;

/// Downscale so the longer side is at most `max_dimension`, preserving aspect ratio.
///
/// Images already within bounds are returned unchanged. Never upscales.
pub fn downscale_to_fit(image: &RgbaImage, max_dimension: u32) -> RgbaImage {
    let (width, height) = image.dimensions();
    let longer = width.max(height);
    if max_dimension == 0 || longer <= max_dimension {
        return image.clone();
    }

    let scale = max_dimension as f32 / longer as f32;
    let new_width = ((width as f32 * scale).round() as u32).clamp(1, max_dimension);
    let new_height = ((height as f32 * scale).round() as u32).clamp(1, max_dimension);

    tracing::debug!(
        "Downscaling {}x{} -> {}x{}",
        width,
        height,
        new_width,
        new_height
    );

    imageops::resize(image, new_width, new_height, imageops::FilterType::Lanczos3)
}

/// Centre `content` on a transparent `size`x`size` canvas.
///
/// Content larger than `fit_fraction` of the canvas is scaled down to fit;
/// smaller content keeps its native size.
pub fn center_on_canvas(content: &RgbaImage, size: u32, fit_fraction: f32) -> RgbaImage {
    let (width, height) = content.dimensions();
    let budget = size as f32 * fit_fraction.clamp(0.0, 1.0);
    let scale = (budget / width as f32).min(budget / height as f32).min(1.0);

    let scaled = if scale < 1.0 {
        let new_width = ((width as f32 * scale).round() as u32).max(1);
        let new_height = ((height as f32 * scale).round() as u32).max(1);
        imageops::resize(content, new_width, new_height, imageops::FilterType::Lanczos3)
    } else {
        content.clone()
    };

    let mut canvas = RgbaImage::new(size, size);
    let x = (i64::from(size) - i64::from(scaled.width())) / 2;
    let y = (i64::from(size) - i64::from(scaled.height())) / 2;
    imageops::overlay(&mut canvas, &scaled, x, y);
    canvas
}

/// Encode as PNG, keeping the alpha channel
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let _span = tracing::debug_span!("encode_png").entered();
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}
