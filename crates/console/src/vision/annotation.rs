//! CPU annotation: box and label drawing plus JPEG encoding for preview
//! packets.

use anyhow::{Result, anyhow};
use detect_core::{Detection, LabelMap};
use image::{DynamicImage, ImageBuffer, Rgba, codecs::jpeg::JpegEncoder};

use crate::vision::data::{DetectionSummary, Frame, FramePacket};

/// Rendering toggles resolved once per pipeline run.
pub(crate) struct AnnotationStyle {
    pub(crate) draw_boxes: bool,
    pub(crate) draw_labels: bool,
    pub(crate) jpeg_quality: i32,
}

pub(crate) fn annotate_frame(
    frame: &Frame,
    frame_number: u64,
    fps: f32,
    detections: &[Detection],
    labels: &LabelMap,
    style: &AnnotationStyle,
) -> Result<FramePacket> {
    let width = frame.width;
    let height = frame.height;
    let rgba = bgr_to_rgba(&frame.data);
    let mut image = Canvas::from_vec(width, height, rgba)
        .ok_or_else(|| anyhow!("frame bytes do not form a {width}x{height} canvas"))?;

    if style.draw_boxes {
        for det in detections {
            let [r, g, b] = labels.color(det.class_id);
            draw_rectangle(
                &mut image,
                det.x1.round() as i32,
                det.y1.round() as i32,
                det.x2.round() as i32,
                det.y2.round() as i32,
                Rgba([r, g, b, 255]),
            );
        }
    }

    if style.draw_labels {
        for det in detections {
            let caption = labels.caption(det);
            let label_x = det.x1.clamp(0.0, width.saturating_sub(1) as f32).round() as i32;
            let label_y =
                (det.y1.clamp(0.0, height.saturating_sub(1) as f32).round() as i32 - 12).max(0);
            let text_width = caption.chars().count() as i32 * GLYPH_ADVANCE;
            fill_rect(
                &mut image,
                label_x,
                label_y,
                label_x + text_width,
                label_y + 8,
                Rgba([0, 0, 0, 180]),
            );
            let [r, g, b] = labels.color(det.class_id);
            draw_label(&mut image, label_x, label_y, &caption, Rgba([r, g, b, 255]));
        }
    }

    let info = format!("FRAME {:06}  FPS {:4.1}", frame_number, fps);
    let info_width = (info.chars().count() as i32 * GLYPH_ADVANCE).min(width as i32);
    let info_x = (width as i32 - info_width - 4).max(0);
    let info_y = (height as i32 - 12).max(0);
    fill_rect(
        &mut image,
        info_x,
        info_y,
        info_x + info_width + 4,
        info_y + 8,
        Rgba([0, 0, 0, 180]),
    );
    draw_label(
        &mut image,
        info_x + 2,
        info_y,
        &info,
        Rgba([255, 255, 255, 255]),
    );

    let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
    let mut buffer = Vec::new();
    let quality = style.jpeg_quality.clamp(1, 100) as u8;
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(&rgb)
        .map_err(|err| anyhow!("JPEG encode failed: {err}"))?;

    let summaries = detections
        .iter()
        .map(|det| DetectionSummary {
            class: labels.name(det.class_id),
            score: det.score,
            bbox: [det.x1, det.y1, det.x2, det.y2],
        })
        .collect();

    Ok(FramePacket {
        jpeg: buffer,
        detections: summaries,
        timestamp_ms: frame.timestamp_ms,
        frame_number,
        fps,
    })
}

fn bgr_to_rgba(input: &[u8]) -> Vec<u8> {
    let pixels = input.len() / 3;
    let mut output = Vec::with_capacity(pixels * 4);
    for chunk in input.chunks_exact(3) {
        output.push(chunk[2]);
        output.push(chunk[1]);
        output.push(chunk[0]);
        output.push(255);
    }
    output
}

type Canvas = ImageBuffer<Rgba<u8>, Vec<u8>>;
type Rect = (i32, i32, i32, i32);

/// Clamp rectangle corners to the canvas, as `(left, top, right, bottom)`.
/// `None` for an empty canvas.
fn clamp_rect(canvas: &Canvas, left: i32, top: i32, right: i32, bottom: i32) -> Option<Rect> {
    if canvas.width() == 0 || canvas.height() == 0 {
        return None;
    }
    let max_x = canvas.width() as i32 - 1;
    let max_y = canvas.height() as i32 - 1;
    Some((
        left.clamp(0, max_x),
        top.clamp(0, max_y),
        right.clamp(0, max_x),
        bottom.clamp(0, max_y),
    ))
}

fn draw_rectangle(canvas: &mut Canvas, l: i32, t: i32, r: i32, b: i32, color: Rgba<u8>) {
    let Some((left, top, right, bottom)) = clamp_rect(canvas, l, t, r, b) else {
        return;
    };
    for x in left..=right {
        *canvas.get_pixel_mut(x as u32, top as u32) = color;
        *canvas.get_pixel_mut(x as u32, bottom as u32) = color;
    }
    for y in top..=bottom {
        *canvas.get_pixel_mut(left as u32, y as u32) = color;
        *canvas.get_pixel_mut(right as u32, y as u32) = color;
    }
}

fn fill_rect(canvas: &mut Canvas, l: i32, t: i32, r: i32, b: i32, color: Rgba<u8>) {
    let Some((left, top, right, bottom)) = clamp_rect(canvas, l, t, r, b) else {
        return;
    };
    for y in top..=bottom {
        for x in left..=right {
            *canvas.get_pixel_mut(x as u32, y as u32) = color;
        }
    }
}

const GLYPH_ROWS: i32 = 7;
const GLYPH_COLS: i32 = 5;
/// Per-character advance; one blank column between glyphs.
const GLYPH_ADVANCE: i32 = 6;

fn draw_label(canvas: &mut Canvas, mut x: i32, y: i32, text: &str, color: Rgba<u8>) {
    let width = canvas.width() as i32;
    let height = canvas.height() as i32;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for row in 0..GLYPH_ROWS {
                let py = y + row;
                if py < 0 || py >= height {
                    continue;
                }
                for col in 0..GLYPH_COLS {
                    let bit = GLYPH_ROWS * GLYPH_COLS - 1 - (row * GLYPH_COLS + col);
                    if (glyph >> bit) & 1 == 1 {
                        let px = x + col;
                        if px >= 0 && px < width {
                            *canvas.get_pixel_mut(px as u32, py as u32) = color;
                        }
                    }
                }
            }
        }
        x += GLYPH_ADVANCE;
    }
}

/// 5x7 bitmap font covering upper-case letters, digits, and the few symbols
/// captions use. Each glyph packs its seven 5-bit rows top-down into one
/// constant, highest bits first. Unknown characters render as blanks.
fn glyph_bits(ch: char) -> Option<u64> {
    let bits: u64 = match ch {
        'A' => 0b01110_10001_10001_11111_10001_10001_10001,
        'B' => 0b11110_10001_10001_11110_10001_10001_11110,
        'C' => 0b01110_10001_10000_10000_10000_10001_01110,
        'D' => 0b11100_10010_10001_10001_10001_10010_11100,
        'E' => 0b11111_10000_11110_10000_10000_10000_11111,
        'F' => 0b11111_10000_11110_10000_10000_10000_10000,
        'G' => 0b01110_10001_10000_10111_10001_10001_01111,
        'H' => 0b10001_10001_10001_11111_10001_10001_10001,
        'I' => 0b01110_00100_00100_00100_00100_00100_01110,
        'J' => 0b00111_00010_00010_00010_00010_10010_01100,
        'K' => 0b10001_10010_10100_11000_10100_10010_10001,
        'L' => 0b10000_10000_10000_10000_10000_10000_11111,
        'M' => 0b10001_11011_10101_10101_10001_10001_10001,
        'N' => 0b10001_11001_10101_10101_10011_10001_10001,
        'O' => 0b01110_10001_10001_10001_10001_10001_01110,
        'P' => 0b11110_10001_10001_11110_10000_10000_10000,
        'Q' => 0b01110_10001_10001_10001_10101_10010_01101,
        'R' => 0b11110_10001_10001_11110_10100_10010_10001,
        'S' => 0b01111_10000_01110_00001_00001_10001_01110,
        'T' => 0b11111_00100_00100_00100_00100_00100_00100,
        'U' => 0b10001_10001_10001_10001_10001_10001_01110,
        'V' => 0b10001_10001_10001_10001_10001_01010_00100,
        'W' => 0b10001_10001_10001_10101_10101_11011_10001,
        'X' => 0b10001_10001_01010_00100_01010_10001_10001,
        'Y' => 0b10001_10001_01010_00100_00100_00100_00100,
        'Z' => 0b11111_00001_00010_00100_01000_10000_11111,
        '0' => 0b01110_10001_10011_10101_11001_10001_01110,
        '1' => 0b00100_01100_00100_00100_00100_00100_01110,
        '2' => 0b01110_10001_00001_00010_00100_01000_11111,
        '3' => 0b11110_00001_00001_01110_00001_00001_11110,
        '4' => 0b00010_00110_01010_10010_11111_00010_00010,
        '5' => 0b11111_10000_11110_00001_00001_10001_01110,
        '6' => 0b00110_01000_10000_11110_10001_10001_01110,
        '7' => 0b11111_00001_00010_00100_01000_01000_01000,
        '8' => 0b01110_10001_10001_01110_10001_10001_01110,
        '9' => 0b01110_10001_10001_01111_00001_00010_01100,
        '%' => 0b10001_10010_00100_01000_10010_10001_00000,
        '-' => 0b00000_00000_00000_01110_00000_00000_00000,
        '_' => 0b00000_00000_00000_00000_00000_00000_11111,
        '.' => 0b00000_00000_00000_00000_00000_00110_00110,
        ' ' => 0,
        _ => return None,
    };
    Some(bits)
}
