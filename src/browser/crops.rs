//! Full-page screenshot partitioning for the content-locating procedure and
//! the next-goal probe.

use base64::Engine as _;

use crate::errors::{AgentError, AgentResult};

/// Split a full-page screenshot (base64 PNG) into fixed-height horizontal
/// crops, ordered top to bottom. The last crop may be shorter.
pub fn partition_screenshot(full_page_b64: &str, crop_height: u32) -> AgentResult<Vec<String>> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(full_page_b64)
        .map_err(|e| AgentError::Execution(format!("full-page screenshot decode: {e}")))?;
    let img = image::load_from_memory(&bytes)?;
    let (width, height) = (img.width(), img.height());

    let num_crops = height.div_ceil(crop_height);
    let mut crops = Vec::with_capacity(num_crops as usize);
    for i in 0..num_crops {
        let top = i * crop_height;
        let slice_height = crop_height.min(height - top);
        let crop = img.crop_imm(0, top, width, slice_height);

        let mut png_bytes = Vec::new();
        crop.write_to(
            &mut std::io::Cursor::new(&mut png_bytes),
            image::ImageFormat::Png,
        )?;
        crops.push(base64::engine::general_purpose::STANDARD.encode(&png_bytes));
    }

    Ok(crops)
}
