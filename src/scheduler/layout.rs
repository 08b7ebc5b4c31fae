use crate::speaker::{Color, SpeakerId};

use super::slots::LINES_PER_SOURCE;

/// Text measurement supplied by whatever draws the glyphs.
pub trait FontMetrics {
    fn text_width(&self, text: &str, scale: f32) -> f32;
    fn line_height(&self, scale: f32) -> f32;
}

/// Every glyph has the same advance.
#[derive(Debug, Clone, Copy)]
pub struct FixedAdvance {
    pub advance: f32,
    pub height: f32,
}

impl FontMetrics for FixedAdvance {
    fn text_width(&self, text: &str, scale: f32) -> f32 {
        text.chars().count() as f32 * self.advance * scale
    }

    fn line_height(&self, scale: f32) -> f32 {
        self.height * scale
    }
}

/// Static caption layout settings, in virtual screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConfig {
    pub scale: f32,
    /// Maximum caption width before wrapping.
    pub width: f32,
    /// Maximum wrapped rows per caption line.
    pub lines: usize,
    pub screen_width: f32,
    pub screen_height: f32,
    pub bottom_margin: f32,
    /// How far captions move up while an on-screen message is shown.
    pub message_offset: f32,
    /// Scale and width factor applied while the minimap is shown.
    pub minimap_scale: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            width: 1000.0,
            lines: 2,
            screen_width: 1280.0,
            screen_height: 720.0,
            bottom_margin: 40.0,
            message_offset: 64.0,
            minimap_scale: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawLine {
    pub rows: Vec<String>,
    /// Horizontal center.
    pub x: f32,
    /// Top edge of the first row.
    pub y: f32,
    pub row_height: f32,
    pub scale: f32,
    pub color: Color,
    pub speaker: SpeakerId,
    pub offscreen: bool,
    pub merged: bool,
}

impl DrawLine {
    pub fn text(&self) -> String {
        self.rows.join(" ")
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.rows.len() as f32 * self.row_height
    }
}

pub type DrawList = Vec<DrawLine>;

/// Geometry for one frame, derived from the config and the frame's
/// message/minimap flags.
pub(crate) struct Frame<'a> {
    config: &'a LayoutConfig,
    metrics: &'a dyn FontMetrics,
    scale: f32,
    width: f32,
    row_height: f32,
    baseline: f32,
}

impl<'a> Frame<'a> {
    pub(crate) fn new(
        config: &'a LayoutConfig,
        metrics: &'a dyn FontMetrics,
        have_message: bool,
        have_minimap: bool,
    ) -> Self {
        let squeeze = if have_minimap { config.minimap_scale } else { 1.0 };
        let scale = config.scale * squeeze;
        let mut baseline = config.screen_height - config.bottom_margin;
        if have_message {
            baseline -= config.message_offset;
        }
        Self {
            config,
            metrics,
            scale,
            width: config.width * squeeze,
            row_height: metrics.line_height(scale),
            baseline,
        }
    }

    /// Height reserved per lane: every display line of a source at its
    /// maximum wrapped height.
    fn lane_pitch(&self) -> f32 {
        (LINES_PER_SOURCE * self.config.lines.max(1)) as f32 * self.row_height
    }

    /// Bottom edge of `lane`. Lane 0 sits on the baseline and higher lanes
    /// stack upwards.
    pub(crate) fn lane_bottom(&self, lane: usize) -> f32 {
        self.baseline - lane as f32 * self.lane_pitch()
    }

    pub(crate) fn baseline(&self) -> f32 {
        self.baseline
    }

    /// Places `text` so that its last row ends at `bottom`.
    pub(crate) fn place(
        &self,
        text: &str,
        bottom: f32,
        color: Color,
        speaker: SpeakerId,
        offscreen: bool,
        merged: bool,
    ) -> DrawLine {
        let rows = wrap_text(text, self.metrics, self.scale, self.width, self.config.lines);
        let y = bottom - rows.len() as f32 * self.row_height;
        DrawLine {
            rows,
            x: self.config.screen_width / 2.0,
            y,
            row_height: self.row_height,
            scale: self.scale,
            color: if offscreen { color.dimmed() } else { color },
            speaker,
            offscreen,
            merged,
        }
    }
}

const ELLIPSIS: &str = "...";

/// Greedy word wrap into at most `max_rows` rows. Text that still does not
/// fit has its last row cut and ellipsized.
pub fn wrap_text(
    text: &str,
    metrics: &dyn FontMetrics,
    scale: f32,
    width: f32,
    max_rows: usize,
) -> Vec<String> {
    let max_rows = max_rows.max(1);
    let mut rows: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut overflow = false;

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if current.is_empty() || metrics.text_width(&candidate, scale) <= width {
            current = candidate;
            continue;
        }
        if rows.len() + 1 == max_rows {
            overflow = true;
            break;
        }
        rows.push(std::mem::replace(&mut current, word.to_string()));
    }
    if !current.is_empty() || rows.is_empty() {
        rows.push(current);
    }

    if overflow {
        if let Some(last) = rows.last_mut() {
            while !last.is_empty()
                && metrics.text_width(&format!("{last}{ELLIPSIS}"), scale) > width
            {
                last.pop();
            }
            last.push_str(ELLIPSIS);
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    const METRICS: FixedAdvance = FixedAdvance {
        advance: 10.0,
        height: 20.0,
    };

    #[test]
    fn short_text_is_one_row() {
        assert_eq!(wrap_text("Hello there", &METRICS, 1.0, 200.0, 2), vec!["Hello there"]);
    }

    #[test]
    fn wraps_on_word_boundaries() {
        let rows = wrap_text("one two three four", &METRICS, 1.0, 90.0, 3);
        assert_eq!(rows, vec!["one two", "three", "four"]);
    }

    #[test]
    fn overflow_is_ellipsized() {
        let rows = wrap_text("one two three four", &METRICS, 1.0, 90.0, 2);
        assert_eq!(rows, vec!["one two", "three..."]);
    }

    #[test]
    fn empty_text_still_takes_a_row() {
        assert_eq!(wrap_text("", &METRICS, 1.0, 90.0, 2), vec![""]);
    }

    #[test]
    fn message_raises_and_minimap_shrinks() {
        let config = LayoutConfig::default();
        let plain = Frame::new(&config, &METRICS, false, false);
        let message = Frame::new(&config, &METRICS, true, false);
        let minimap = Frame::new(&config, &METRICS, false, true);

        assert_eq!(plain.baseline(), 680.0);
        assert_eq!(message.baseline(), 616.0);
        assert!(minimap.row_height < plain.row_height);
        assert!(plain.lane_bottom(1) < plain.lane_bottom(0));
    }

    #[test]
    fn offscreen_lines_are_dimmed_in_place() {
        let config = LayoutConfig::default();
        let frame = Frame::new(&config, &METRICS, false, false);
        let color = Color::rgb(200, 100, 50);
        let normal = frame.place("Hey", 500.0, color, SpeakerId::Jak, false, false);
        let offscreen = frame.place("Hey", 500.0, color, SpeakerId::Jak, true, false);
        assert_eq!(normal.y, offscreen.y);
        assert_eq!(normal.color, color);
        assert_eq!(offscreen.color, color.dimmed());
        assert_eq!(normal.bottom(), 500.0);
    }
}
