//! Detection markers drawn onto the read region

use image::Rgba;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::error::VisionResult;
use super::geometry::{unfold, Origin, PixelRect, Space};
use super::Detection;
use crate::capture::frame::Frame;

/// Marker stroke color
pub const MARKER_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Marker stroke width in pixels, centered on the rectangle border
pub const MARKER_WIDTH: u32 = 4;

/// Which detections receive a marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerPolicy {
    /// Only the highest-ranked detection
    FirstOnly,
    /// Every detection
    All,
    /// Stay on the line whose text matches the remembered one
    #[default]
    MatchPrevious,
}

/// Single-slot memory of the last locked-on text line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextMemory {
    previous: Option<String>,
}

impl TextMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remembered(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    /// Overwrite the remembered text
    pub fn remember(&mut self, text: impl Into<String>) {
        self.previous = Some(text.into());
    }

    pub fn clear(&mut self) {
        self.previous = None;
    }
}

/// Output of annotating one read region
#[derive(Debug, Clone)]
pub struct Annotation {
    /// Region pixels with markers drawn
    pub frame: Frame,
    /// Indices into the detection list that were drawn
    pub selected: Vec<usize>,
    /// Top text of the (first) selected detection
    pub text: Option<String>,
    /// Top-left read-region rectangles of the drawn markers, in selection order
    pub markers: Vec<PixelRect>,
}

/// Draws detection markers onto copies of the read region
#[derive(Debug, Clone)]
pub struct Annotator {
    color: Rgba<u8>,
    stroke_width: u32,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            color: MARKER_COLOR,
            stroke_width: MARKER_WIDTH,
        }
    }
}

impl Annotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick detections under `policy`, updating `memory` for lock-on
    pub fn select(detections: &[Detection], policy: MarkerPolicy, memory: &mut TextMemory) -> Vec<usize> {
        if detections.is_empty() {
            return vec![];
        }

        match policy {
            MarkerPolicy::FirstOnly => vec![0],
            MarkerPolicy::All => (0..detections.len()).collect(),
            MarkerPolicy::MatchPrevious => {
                let matched = memory.remembered().and_then(|prev| {
                    detections.iter().position(|d| d.top_text() == Some(prev))
                });

                match matched {
                    Some(index) => {
                        trace!("Lock-on kept detection {}", index);
                        vec![index]
                    }
                    None => {
                        match detections[0].top_text() {
                            Some(text) => {
                                debug!("Lock-on moved to {:?}", text);
                                memory.remember(text);
                            }
                            None => {
                                debug!("Lock-on moved to a line without text");
                                memory.clear();
                            }
                        }
                        vec![0]
                    }
                }
            }
        }
    }

    /// Draw markers for the selected detections onto a copy of `region`
    pub fn annotate(
        &self,
        region: &Frame,
        detections: &[Detection],
        policy: MarkerPolicy,
        memory: &mut TextMemory,
    ) -> VisionResult<Annotation> {
        let selected = Self::select(detections, policy, memory);
        let text = selected
            .first()
            .and_then(|&i| detections[i].top_text())
            .map(str::to_string);

        if selected.is_empty() {
            return Ok(Annotation {
                frame: region.clone(),
                selected,
                text,
                markers: vec![],
            });
        }

        let size = region.size_in(Space::ReadRegion)?;
        let mut canvas = region.image().clone();
        let mut markers = Vec::with_capacity(selected.len());

        for &index in &selected {
            let marker = unfold(&detections[index].bounding_box, size)?.to_origin(Origin::TopLeft, size.height);
            let bounds = marker.to_top_left_pixels()?;
            self.stroke(&mut canvas, bounds.x, bounds.y, bounds.width, bounds.height);
            markers.push(marker);
        }

        Ok(Annotation {
            frame: region.with_image(canvas),
            selected,
            text,
            markers,
        })
    }

    /// Stroke a rectangle border, half the width outside and half inside
    fn stroke(&self, canvas: &mut image::RgbaImage, x: i32, y: i32, width: u32, height: u32) {
        let half = (self.stroke_width / 2) as i32;
        for step in 0..self.stroke_width as i32 {
            let inset = step - half;
            let w = width as i32 - 2 * inset;
            let h = height as i32 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(x + inset, y + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(canvas, rect, self.color);
        }
    }
}
