//! Marking predicted click positions on a screenshot.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, Rgba};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};
use thiserror::Error;

use super::screenshot::{Screenshot, ScreenshotDecodeError};
use crate::actions::ParsedAction;

/// Annotation errors.
#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("Failed to decode screenshot: {0}")]
    Decode(#[from] ScreenshotDecodeError),
    #[error("Failed to encode annotated image: {0}")]
    Encode(#[from] image::ImageError),
}

/// Produces a marked-up copy of a screenshot for a set of actions.
pub trait ImageAnnotator: Send + Sync {
    /// Returns the annotated image as base64-encoded PNG.
    fn annotate(
        &self,
        screenshot: &Screenshot,
        actions: &[ParsedAction],
    ) -> Result<String, AnnotateError>;
}

/// Draws a ring at every start/end point and a line for drags.
#[derive(Debug, Clone)]
pub struct MarkerAnnotator {
    pub radius: i32,
    pub color: Rgba<u8>,
}

impl Default for MarkerAnnotator {
    fn default() -> Self {
        Self {
            radius: 14,
            color: Rgba([255, 0, 0, 255]),
        }
    }
}

impl MarkerAnnotator {
    fn mark(&self, canvas: &mut image::RgbaImage, center: (i32, i32)) {
        draw_hollow_circle_mut(canvas, center, self.radius, self.color);
        draw_hollow_circle_mut(canvas, center, self.radius + 1, self.color);
        draw_filled_circle_mut(canvas, center, 3, self.color);
    }
}

impl ImageAnnotator for MarkerAnnotator {
    fn annotate(
        &self,
        screenshot: &Screenshot,
        actions: &[ParsedAction],
    ) -> Result<String, AnnotateError> {
        let mut canvas = screenshot.decode()?.to_rgba8();
        let (width, height) = canvas.dimensions();

        for action in actions {
            let inputs = &action.action_inputs;
            let start = inputs.start.map(|p| p.to_pixels(width, height));
            let end = inputs.end.map(|p| p.to_pixels(width, height));

            if let Some(start) = start {
                self.mark(&mut canvas, start);
            }
            if let Some(end) = end {
                self.mark(&mut canvas, end);
            }
            if let (Some(s), Some(e)) = (start, end) {
                draw_line_segment_mut(
                    &mut canvas,
                    (s.0 as f32, s.1 as f32),
                    (e.0 as f32, e.1 as f32),
                    self.color,
                );
            }
        }

        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(canvas).write_to(&mut buffer, image::ImageFormat::Png)?;
        Ok(STANDARD.encode(buffer.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionType;
    use crate::device::screenshot::blank_png;

    #[test]
    fn test_marks_click_position() {
        let screenshot = Screenshot::from_png_bytes(&blank_png(100, 100)).unwrap();
        let actions = vec![ParsedAction::new(ActionType::Click).with_start(0.5, 0.5)];

        let annotated = MarkerAnnotator::default()
            .annotate(&screenshot, &actions)
            .unwrap();
        let marked = Screenshot::new(annotated, 100, 100).decode().unwrap().to_rgba8();

        assert_eq!(marked.get_pixel(50, 50), &Rgba([255, 0, 0, 255]));
        assert_eq!(marked.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_invalid_payload_fails() {
        let screenshot = Screenshot::new("%%%", 10, 10);
        let result = MarkerAnnotator::default().annotate(&screenshot, &[]);
        assert!(matches!(result, Err(AnnotateError::Decode(_))));
    }
}
