use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::bank::{CaptionLine, LineFlags};
use crate::speaker::SpeakerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    #[default]
    Dialog,
    /// Cinematic audio; its captions arrive through the movie hand-off.
    Movie,
    /// Reserved for the caption system itself.
    Subtitle,
}

/// One playing channel as seen in the current frame.
#[derive(Debug, Clone, Copy)]
pub struct ChannelInfo<'a> {
    pub id: ChannelId,
    pub kind: ChannelKind,
    /// Identity matched against caption script names.
    pub name: &'a str,
    /// Playback position in seconds.
    pub position: f32,
}

/// Reports which audio channels are playing right now.
pub trait ChannelEnumerator {
    fn list_active_channels(&self, excluding: &[ChannelKind]) -> Vec<ChannelInfo<'_>>;

    /// Current position of `channel`, or `None` once it stopped playing.
    fn position(&self, channel: ChannelId) -> Option<f32>;
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub sounds: Vec<SoundCue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SoundCue {
    pub name: String,
    #[serde(default)]
    pub kind: ChannelKind,
    /// Clock time (seconds) the sound starts playing.
    pub start: f32,
    pub length: f32,
    #[serde(default)]
    pub looped: bool,
    /// Caption handed to the movie path while this cue plays.
    #[serde(default)]
    pub movie_line: Option<MovieCue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MovieCue {
    pub text: String,
    pub speaker: SpeakerId,
    pub start_time: f32,
    pub end_time: f32,
    #[serde(default)]
    pub offscreen: bool,
}

impl MovieCue {
    pub fn to_line(&self) -> CaptionLine {
        CaptionLine {
            start_time: self.start_time,
            end_time: self.end_time,
            text: self.text.clone(),
            speaker: self.speaker,
            flags: LineFlags {
                offscreen: self.offscreen,
                merged: true,
            },
        }
    }
}

impl Scenario {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("failed to parse scenario {}", path.display()))
    }
}

/// Plays a [`Scenario`] against a clock that the caller advances each frame.
#[derive(Debug, Clone)]
pub struct ScriptedChannels {
    cues: Vec<SoundCue>,
    clock: f32,
}

impl ScriptedChannels {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            cues: scenario.sounds,
            clock: 0.0,
        }
    }

    pub fn set_clock(&mut self, clock: f32) {
        self.clock = clock;
    }

    pub fn clock(&self) -> f32 {
        self.clock
    }

    fn cue_position(&self, cue: &SoundCue) -> Option<f32> {
        let elapsed = self.clock - cue.start;
        if elapsed < 0.0 {
            return None;
        }
        if cue.looped && cue.length > 0.0 {
            Some(elapsed.rem_euclid(cue.length))
        } else if elapsed < cue.length {
            Some(elapsed)
        } else {
            None
        }
    }

    /// The first playing movie cue that carries a caption.
    pub fn active_movie_cue(&self) -> Option<(ChannelId, &MovieCue)> {
        self.cues.iter().enumerate().find_map(|(index, cue)| {
            let movie_line = cue.movie_line.as_ref()?;
            if cue.kind != ChannelKind::Movie {
                return None;
            }
            self.cue_position(cue)?;
            Some((channel_id(index), movie_line))
        })
    }

    /// True once every non-looping cue has finished.
    pub fn finished(&self) -> bool {
        self.cues
            .iter()
            .all(|cue| !cue.looped && self.clock >= cue.start + cue.length)
    }
}

fn channel_id(index: usize) -> ChannelId {
    ChannelId(index as u32 + 1)
}

impl ChannelEnumerator for ScriptedChannels {
    fn list_active_channels(&self, excluding: &[ChannelKind]) -> Vec<ChannelInfo<'_>> {
        self.cues
            .iter()
            .enumerate()
            .filter(|(_, cue)| !excluding.contains(&cue.kind))
            .filter_map(|(index, cue)| {
                Some(ChannelInfo {
                    id: channel_id(index),
                    kind: cue.kind,
                    name: &cue.name,
                    position: self.cue_position(cue)?,
                })
            })
            .collect()
    }

    fn position(&self, channel: ChannelId) -> Option<f32> {
        let index = (channel.0 as usize).checked_sub(1)?;
        self.cue_position(self.cues.get(index)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"{
        "sounds": [
            { "name": "intro", "start": 1.0, "length": 4.0 },
            { "name": "hum", "start": 0.0, "length": 2.0, "looped": true },
            {
                "name": "cutscene-1", "kind": "movie", "start": 2.0, "length": 3.0,
                "movie_line": { "text": "Look out!", "speaker": "daxter", "start_time": 0.0, "end_time": 2.0 }
            }
        ]
    }"#;

    fn channels() -> ScriptedChannels {
        ScriptedChannels::new(serde_json::from_str(SCENARIO).unwrap())
    }

    #[test]
    fn lists_playing_channels_with_positions() {
        let mut channels = channels();
        channels.set_clock(2.5);
        let active = channels.list_active_channels(&[]);
        let names: Vec<_> = active.iter().map(|c| (c.name, c.position)).collect();
        assert_eq!(names, vec![("intro", 1.5), ("hum", 0.5), ("cutscene-1", 0.5)]);
    }

    #[test]
    fn excluded_kinds_are_filtered() {
        let mut channels = channels();
        channels.set_clock(2.5);
        let active = channels.list_active_channels(&[ChannelKind::Movie, ChannelKind::Subtitle]);
        assert!(active.iter().all(|c| c.kind == ChannelKind::Dialog));
        assert_eq!(active.len(), 2);
    }

    #[test]
    fn stopped_channels_have_no_position() {
        let mut channels = channels();
        channels.set_clock(0.5);
        assert_eq!(channels.position(ChannelId(1)), None);
        channels.set_clock(5.0);
        assert_eq!(channels.position(ChannelId(1)), None);
        assert_eq!(channels.position(ChannelId(2)), Some(1.0));
        assert_eq!(channels.position(ChannelId(0)), None);
        assert_eq!(channels.position(ChannelId(9)), None);
    }

    #[test]
    fn movie_cue_is_found_while_playing() {
        let mut channels = channels();
        channels.set_clock(3.0);
        let (id, cue) = channels.active_movie_cue().unwrap();
        assert_eq!(id, ChannelId(3));
        assert!(cue.to_line().flags.merged);
        channels.set_clock(6.0);
        assert!(channels.active_movie_cue().is_none());
        assert!(!channels.finished());
    }
}
