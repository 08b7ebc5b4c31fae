//! The caption process: binds playing audio sources to caption scripts,
//! resolves the active lines every frame and lays them out on screen.

mod debug;
mod layout;
mod slots;

use std::fmt::Write;

use crate::bank::{CaptionBank, CaptionLine};
use crate::channels::{ChannelEnumerator, ChannelId, ChannelKind};
use crate::speaker::{SpeakerColorTable, SpeakerId, DEFAULT_COLOR};

pub use debug::{describe_line, wrap_step, DebugState};
pub use layout::{wrap_text, DrawLine, DrawList, FixedAdvance, FontMetrics, LayoutConfig};
pub use slots::{ActiveSource, LineDisplay, SlotTable, LINES_PER_SOURCE, MAX_ACTIVE_SOURCES};

use layout::Frame;

/// Channels whose captions never come through slot matching.
pub const EXCLUDED_CHANNELS: [ChannelKind; 2] = [ChannelKind::Movie, ChannelKind::Subtitle];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayFlags {
    /// An on-screen message occupies the lower area.
    pub have_message: bool,
    pub have_minimap: bool,
}

/// A caption handed over by the cinematic path.
#[derive(Debug, Clone, PartialEq)]
pub struct MovieLine {
    pub line: CaptionLine,
    pub channel: ChannelId,
    pub position: f32,
}

impl MovieLine {
    fn visible(&self) -> bool {
        self.line.contains(self.position)
    }
}

#[derive(Debug)]
pub struct Scheduler {
    slots: SlotTable,
    /// Generation of the bank the slots' handles point into.
    generation: Option<u64>,
    movie: Option<MovieLine>,
    flags: DisplayFlags,
    have_subtitles: bool,
    debug: DebugState,
    cheat_backup: Option<DisplayFlags>,
    layout: LayoutConfig,
}

impl Scheduler {
    pub fn new(layout: LayoutConfig) -> Self {
        Self {
            slots: SlotTable::new(),
            generation: None,
            movie: None,
            flags: DisplayFlags::default(),
            have_subtitles: false,
            debug: DebugState::Idle,
            cheat_backup: None,
            layout,
        }
    }

    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    pub fn flags(&self) -> DisplayFlags {
        self.flags
    }

    pub fn set_have_message(&mut self, value: bool) {
        self.flags.have_message = value;
    }

    pub fn set_have_minimap(&mut self, value: bool) {
        self.flags.have_minimap = value;
    }

    /// Whether the last drawn frame showed at least one line.
    pub fn have_subtitles(&self) -> bool {
        self.have_subtitles
    }

    pub fn debug_state(&self) -> DebugState {
        self.debug
    }

    pub fn movie_mode(&self) -> bool {
        self.movie.is_some()
    }

    pub fn movie_line(&self) -> Option<&MovieLine> {
        self.movie.as_ref()
    }

    /// One full frame: refresh, resolve, lay out and draw.
    pub fn frame(
        &mut self,
        bank: Option<&CaptionBank>,
        channels: &dyn ChannelEnumerator,
        colors: &SpeakerColorTable,
        metrics: &dyn FontMetrics,
    ) -> DrawList {
        self.update(bank, channels);
        self.draw_subtitles(bank, colors, metrics)
    }

    pub fn update(&mut self, bank: Option<&CaptionBank>, channels: &dyn ChannelEnumerator) {
        self.sync_bank(bank);
        if self.debug.is_active() {
            return;
        }
        self.update_active_sources(bank, channels);
        self.update_lines(bank);
        self.update_movie(channels);
    }

    /// Drops every binding made against a bank that is no longer resident.
    fn sync_bank(&mut self, bank: Option<&CaptionBank>) {
        let generation = bank.map(CaptionBank::generation);
        if generation != self.generation {
            if self.slots.occupancy() > 0 {
                tracing::debug!("caption bank changed; releasing {} sources", self.slots.occupancy());
            }
            self.slots.clear_all();
            self.generation = generation;
            // keep the debug selection inside the new bank
            if let (Some(bank), Some(scene)) = (bank, self.debug.scene()) {
                self.debug = if scene < bank.scripts().len() {
                    self.debug.leave_lines()
                } else {
                    DebugState::Debug { scene: 0 }
                };
            }
        }
    }

    /// Releases sources that stopped playing and binds newly playing ones
    /// that have a caption script.
    pub fn update_active_sources(
        &mut self,
        bank: Option<&CaptionBank>,
        channels: &dyn ChannelEnumerator,
    ) {
        let active = channels.list_active_channels(&EXCLUDED_CHANNELS);

        for index in 0..MAX_ACTIVE_SOURCES {
            let stale = self
                .slots
                .get(index)
                .is_some_and(|source| !active.iter().any(|c| c.id == source.channel));
            if !stale {
                continue;
            }
            if let Some(source) = self.slots.clear_queue(index) {
                tracing::debug!("released {:?} from slot {index}", source.channel);
            }
        }

        let Some(bank) = bank else {
            return;
        };
        for channel in &active {
            if let Some(index) = self.slots.find(channel.id) {
                if let Some(source) = self.slots.get_mut(index) {
                    source.observe(channel.position);
                }
                continue;
            }
            let Some(script) = bank.find_scene(channel.name) else {
                continue;
            };
            match self.slots.add_to_queue(channel.id, script, channel.position) {
                Some(index) => {
                    tracing::debug!("bound {:?} '{}' to slot {index}", channel.id, channel.name)
                }
                None => tracing::debug!(
                    "all {MAX_ACTIVE_SOURCES} caption slots busy; dropping '{}'",
                    channel.name
                ),
            }
        }
    }

    fn update_lines(&mut self, bank: Option<&CaptionBank>) {
        for source in self.slots.iter_mut() {
            let Some(script) = bank.and_then(|bank| bank.script(source.script)) else {
                source.clear_lines();
                continue;
            };
            let position = source.position;
            let first = script.line_index_at_pos(position, source.lines[0].hint);
            let second = first.and_then(|first| {
                script.second_line_index_at_pos(position, source.lines[1].hint, first)
            });
            let handle = source.script;
            source.set_params(0, first.map(|index| handle.line(index)));
            source.set_params(1, second.map(|index| handle.line(index)));
        }
    }

    fn update_movie(&mut self, channels: &dyn ChannelEnumerator) {
        let Some(movie) = &mut self.movie else {
            return;
        };
        match channels.position(movie.channel) {
            Some(position) => movie.position = position,
            None => {
                tracing::debug!("movie channel {:?} stopped; clearing movie line", movie.channel);
                self.movie = None;
            }
        }
    }

    /// Hand-off from the cinematic path. The line is tracked against its own
    /// channel's position and always carries the `merged` flag.
    /// Ignored while debug mode is active.
    pub fn set_movie_line(&mut self, mut line: CaptionLine, channel: ChannelId, position: f32) {
        if self.debug.is_active() {
            tracing::debug!("debug mode active; ignoring movie line from {channel:?}");
            return;
        }
        line.flags.merged = true;
        self.movie = Some(MovieLine {
            line,
            channel,
            position,
        });
    }

    pub fn clear_movie_line(&mut self) {
        self.movie = None;
    }

    /// Lines currently resolved across all sources, plus the movie line.
    pub fn get_active_subtitles(&self) -> usize {
        let native: usize = self.slots.iter().map(|(_, s)| s.visible_lines()).sum();
        native + usize::from(self.movie.is_some())
    }

    /// Lays out every resolved line and returns what to draw.
    ///
    /// Each bound source owns the lane it was given when it bound, so its
    /// captions stay put when other sources come and go. Within a lane the
    /// first display line sits at the bottom. The movie line goes above
    /// everything else.
    pub fn draw_subtitles(
        &mut self,
        bank: Option<&CaptionBank>,
        colors: &SpeakerColorTable,
        metrics: &dyn FontMetrics,
    ) -> DrawList {
        let frame = Frame::new(
            &self.layout,
            metrics,
            self.flags.have_message,
            self.flags.have_minimap,
        );
        let mut out = DrawList::new();

        if self.debug.is_active() {
            if let Some(bank) = bank {
                out.extend(self.debug_line(bank, &frame, colors));
            }
            self.have_subtitles = !out.is_empty();
            return out;
        }

        if let Some(bank) = bank {
            // lanes are unique among bound sources
            for lane in 0..MAX_ACTIVE_SOURCES {
                let Some(source) = self.slots.iter_mut().find(|s| s.lane == lane) else {
                    continue;
                };
                let mut bottom = frame.lane_bottom(lane);
                for display in &mut source.lines {
                    let Some(line) = display.line.and_then(|handle| bank.line(handle)) else {
                        continue;
                    };
                    let drawn = frame.place(
                        &line.text,
                        bottom,
                        colors.color(line.speaker),
                        line.speaker,
                        line.flags.offscreen,
                        line.flags.merged,
                    );
                    display.y_position = drawn.y;
                    bottom = drawn.y;
                    out.push(drawn);
                }
            }
        }

        if let Some(movie) = self.movie.as_ref().filter(|movie| movie.visible()) {
            let bottom = out
                .iter()
                .map(|line| line.y)
                .fold(frame.baseline(), f32::min);
            out.push(frame.place(
                &movie.line.text,
                bottom,
                colors.color(movie.line.speaker),
                movie.line.speaker,
                movie.line.flags.offscreen,
                true,
            ));
        }

        self.have_subtitles = !out.is_empty();
        out
    }

    fn debug_line(
        &self,
        bank: &CaptionBank,
        frame: &Frame<'_>,
        colors: &SpeakerColorTable,
    ) -> Option<DrawLine> {
        let bottom = frame.lane_bottom(0);
        match self.debug {
            DebugState::Idle => None,
            DebugState::Debug { scene } => {
                let script = bank.scripts().get(scene)?;
                let label = format!("{} ({} lines)", script.name, script.lines.len());
                Some(frame.place(&label, bottom, DEFAULT_COLOR, SpeakerId::None, false, false))
            }
            DebugState::CheckingLines { scene, line } => {
                let line = bank.scripts().get(scene)?.lines.get(line)?;
                Some(frame.place(
                    &line.text,
                    bottom,
                    colors.color(line.speaker),
                    line.speaker,
                    line.flags.offscreen,
                    line.flags.merged,
                ))
            }
        }
    }

    /// Suspends audio matching. The current display flags are saved and
    /// restored by [`Scheduler::exit_debug`].
    pub fn enter_debug(&mut self) {
        if self.debug.is_active() {
            return;
        }
        self.slots.clear_all();
        self.movie = None;
        self.cheat_backup = Some(self.flags);
        self.flags = DisplayFlags::default();
        self.debug = DebugState::Debug { scene: 0 };
        tracing::info!("caption debug mode on");
    }

    pub fn exit_debug(&mut self) {
        if !self.debug.is_active() {
            return;
        }
        if let Some(backup) = self.cheat_backup.take() {
            self.flags = backup;
        }
        self.debug = DebugState::Idle;
        tracing::info!("caption debug mode off");
    }

    pub fn step_scene(&mut self, bank: Option<&CaptionBank>, delta: isize) -> Option<String> {
        let bank = bank?;
        self.debug = self.debug.step_scene(delta, bank.scripts().len());
        let DebugState::Debug { scene } = self.debug else {
            return None;
        };
        let script = bank.scripts().get(scene)?;
        Some(format!("scene {scene}: {} ({} lines)", script.name, script.lines.len()))
    }

    /// Debug → line checking within the selected scene. Returns the first
    /// line's description.
    pub fn check_lines(&mut self, bank: Option<&CaptionBank>) -> Option<String> {
        self.debug = self.debug.check_lines();
        self.current_debug_line(bank?)
    }

    pub fn leave_lines(&mut self) {
        self.debug = self.debug.leave_lines();
    }

    pub fn step_line(&mut self, bank: Option<&CaptionBank>, delta: isize) -> Option<String> {
        let bank = bank?;
        let scene = self.debug.scene()?;
        let count = bank.scripts().get(scene)?.lines.len();
        self.debug = self.debug.step_line(delta, count);
        self.current_debug_line(bank)
    }

    fn current_debug_line(&self, bank: &CaptionBank) -> Option<String> {
        let DebugState::CheckingLines { scene, line } = self.debug else {
            return None;
        };
        let script = bank.scripts().get(scene)?;
        let caption = script.lines.get(line)?;
        let description = describe_line(bank, &script.name, line, caption);
        tracing::info!("{description}");
        Some(description)
    }

    pub fn print_queue(&self, bank: Option<&CaptionBank>) -> String {
        let mut out = format!(
            "{}/{MAX_ACTIVE_SOURCES} sources, {} lines active",
            self.slots.occupancy(),
            self.get_active_subtitles()
        );
        for (index, source) in self.slots.iter() {
            let name = bank
                .and_then(|bank| bank.script(source.script))
                .map_or("<stale>", |script| script.name.as_str());
            let _ = write!(
                out,
                "\n  slot {index}: {:?} '{name}' lane {} arrival {} at {:.2}s",
                source.channel, source.lane, source.arrival, source.position
            );
            for (n, display) in source.lines.iter().enumerate() {
                if let Some(handle) = display.line {
                    let _ = write!(
                        out,
                        "\n    line {n}: #{} y={:.1}",
                        handle.index(),
                        display.y_position
                    );
                }
            }
        }
        if let Some(movie) = &self.movie {
            let _ = write!(
                out,
                "\n  movie: {:?} at {:.2}s \"{}\"",
                movie.channel, movie.position, movie.line.text
            );
        }
        out
    }

    pub fn print_speakers(&self, bank: Option<&CaptionBank>, colors: &SpeakerColorTable) -> String {
        let mut out = String::new();
        for speaker in SpeakerId::ALL {
            let name = bank
                .and_then(|bank| bank.speaker_names().get(speaker.index()))
                .map_or("", String::as_str);
            let color = colors.color(speaker);
            let _ = writeln!(
                out,
                "{:>3} {speaker:?} '{name}' #{:02x}{:02x}{:02x}",
                speaker.index(),
                color.r,
                color.g,
                color.b
            );
        }
        out
    }
}
