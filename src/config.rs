use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::bank::DEFAULT_HEAP_BUDGET;
use crate::scheduler::{FixedAdvance, LayoutConfig};

#[derive(Debug, Parser, Clone)]
#[command(
    name = "captions",
    version,
    about = "Overlay timed captions for the voice audio that is playing right now"
)]
pub struct Cli {
    /// Caption bank to load.
    #[arg(long, env = "CAPTIONS_BANK")]
    pub bank: PathBuf,

    /// JSON scenario describing the simulated audio channels.
    #[arg(long)]
    pub scenario: Option<PathBuf>,

    /// Size (bytes) of the region a caption bank must fit in.
    #[arg(long, default_value_t = DEFAULT_HEAP_BUDGET)]
    pub heap_budget: usize,

    /// Frames per second of the caption loop.
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// Stop after this many seconds of scenario time (runs until Ctrl-C if omitted).
    #[arg(long)]
    pub duration: Option<f32>,

    /// Run without the on-screen overlay (prints captions to stdout).
    #[arg(long)]
    pub no_ui: bool,

    /// Start with an on-screen message occupying the lower area.
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub message: bool,

    /// Start with the minimap shown.
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub minimap: bool,

    /// Caption text scale.
    #[arg(long, default_value_t = 1.0)]
    pub scale: f32,

    /// Maximum caption width (virtual pixels) before wrapping.
    #[arg(long, default_value_t = 1000.0)]
    pub width: f32,

    /// Maximum wrapped rows per caption line.
    #[arg(long, default_value_t = 2)]
    pub lines: usize,

    /// Virtual screen width.
    #[arg(long, default_value_t = 1280.0)]
    pub screen_width: f32,

    /// Virtual screen height.
    #[arg(long, default_value_t = 720.0)]
    pub screen_height: f32,

    /// Glyph height (virtual pixels) at scale 1.
    #[arg(long, default_value_t = 32.0)]
    pub font_height: f32,

    /// Glyph advance (virtual pixels) at scale 1.
    #[arg(long, default_value_t = 16.0)]
    pub glyph_advance: f32,
}

impl Cli {
    pub fn layout(&self) -> LayoutConfig {
        LayoutConfig {
            scale: self.scale,
            width: self.width,
            lines: self.lines.max(1),
            screen_width: self.screen_width,
            screen_height: self.screen_height,
            ..LayoutConfig::default()
        }
    }

    pub fn metrics(&self) -> FixedAdvance {
        FixedAdvance {
            advance: self.glyph_advance,
            height: self.font_height,
        }
    }

    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let cli = Cli::try_parse_from(["captions", "--bank", "jak2.bank"]).unwrap();
        assert_eq!(cli.heap_budget, DEFAULT_HEAP_BUDGET);
        assert_eq!(cli.layout().lines, 2);
        assert!(!cli.no_ui);
        assert_eq!(cli.frame_interval(), std::time::Duration::from_secs_f64(1.0 / 60.0));
    }

    #[test]
    fn layout_flags_reach_the_config() {
        let cli = Cli::try_parse_from([
            "captions", "--bank", "x", "--scale", "0.5", "--lines", "0", "--minimap", "true",
        ])
        .unwrap();
        let layout = cli.layout();
        assert_eq!(layout.scale, 0.5);
        assert_eq!(layout.lines, 1);
        assert!(cli.minimap);
    }
}
