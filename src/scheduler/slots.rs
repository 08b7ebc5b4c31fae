use crate::bank::{LineHandle, ScriptHandle};
use crate::channels::ChannelId;

pub const MAX_ACTIVE_SOURCES: usize = 5;
pub const LINES_PER_SOURCE: usize = 2;

/// One caption line of a source placed on screen.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LineDisplay {
    pub line: Option<LineHandle>,
    /// Top edge of the rendered block, filled in by layout.
    pub y_position: f32,
    /// Index resolved last time, where the next scan starts.
    pub(crate) hint: usize,
}

/// A playing audio source bound to its caption script.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSource {
    pub channel: ChannelId,
    pub script: ScriptHandle,
    /// Monotonic bind counter.
    pub arrival: u64,
    /// Vertical lane, fixed for as long as the source stays bound.
    pub lane: usize,
    pub position: f32,
    pub lines: [LineDisplay; LINES_PER_SOURCE],
}

impl ActiveSource {
    /// Records this frame's playback position. A position that went backwards
    /// (looped or restarted sound) invalidates the resolution hints.
    pub fn observe(&mut self, position: f32) {
        if position < self.position {
            for display in &mut self.lines {
                display.hint = 0;
            }
        }
        self.position = position;
    }

    pub fn set_params(&mut self, index: usize, line: Option<LineHandle>) {
        let display = &mut self.lines[index];
        display.line = line;
        if let Some(line) = line {
            display.hint = line.index();
        }
    }

    pub fn clear_lines(&mut self) {
        for display in &mut self.lines {
            display.line = None;
        }
    }

    pub fn visible_lines(&self) -> usize {
        self.lines.iter().filter(|d| d.line.is_some()).count()
    }
}

/// Fixed table of bound sources. Slots never move; releasing one only clears
/// that slot.
#[derive(Debug, Clone, Default)]
pub struct SlotTable {
    slots: [Option<ActiveSource>; MAX_ACTIVE_SOURCES],
    next_arrival: u64,
}

impl SlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn occupancy(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.occupancy() == MAX_ACTIVE_SOURCES
    }

    pub fn is_queued(&self, channel: ChannelId) -> bool {
        self.find(channel).is_some()
    }

    pub fn find(&self, channel: ChannelId) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| s.channel == channel))
    }

    pub fn get(&self, index: usize) -> Option<&ActiveSource> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ActiveSource> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    /// Binds `channel` to `script` in the first free slot. Returns `None` when
    /// every slot is taken; the newcomer is dropped.
    pub fn add_to_queue(
        &mut self,
        channel: ChannelId,
        script: ScriptHandle,
        position: f32,
    ) -> Option<usize> {
        debug_assert!(!self.is_queued(channel), "{channel:?} queued twice");
        let index = self.slots.iter().position(Option::is_none)?;
        let lane = self.free_lane();
        let arrival = self.next_arrival;
        self.next_arrival += 1;
        self.slots[index] = Some(ActiveSource {
            channel,
            script,
            arrival,
            lane,
            position,
            lines: Default::default(),
        });
        Some(index)
    }

    /// Lowest lane no bound source holds.
    fn free_lane(&self) -> usize {
        (0..MAX_ACTIVE_SOURCES)
            .find(|&lane| !self.iter().any(|(_, s)| s.lane == lane))
            .unwrap_or(0)
    }

    pub fn clear_queue(&mut self, index: usize) -> Option<ActiveSource> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    pub fn clear_all(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &ActiveSource)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (i, s)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ActiveSource> + '_ {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }
}
