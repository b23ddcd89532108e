use image::RgbaImage;

/// Decode PNG (or any format `image` detects) bytes into an RGBA buffer
pub fn decode_rgba(image_data: &[u8]) -> Result<RgbaImage, anyhow::Error> {
    // Auto-detect the image format and decode
    let img = image::load_from_memory(image_data)?;
    Ok(img.to_rgba8())
}

/// Hand an RGBA buffer to Slint without re-encoding
pub fn rgba_to_slint_image(rgba_img: &RgbaImage) -> slint::Image {
    let pixel_buffer = slint::SharedPixelBuffer::<slint::Rgba8Pixel>::clone_from_slice(
        rgba_img.as_raw(),
        rgba_img.width(),
        rgba_img.height(),
    );
    slint::Image::from_rgba8(pixel_buffer)
}

/// Parse "#rrggbb"
pub fn parse_hex_color(hex: &str) -> Option<[u8; 3]> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

pub fn slint_color(hex: &str) -> slint::Color {
    let [r, g, b] = parse_hex_color(hex).unwrap_or([148, 163, 184]);
    slint::Color::from_rgb_u8(r, g, b)
}
