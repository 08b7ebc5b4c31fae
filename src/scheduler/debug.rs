use std::fmt::Write;

use crate::bank::{CaptionBank, CaptionLine};

/// Operator-driven stepping through the loaded scripts. Audio matching is
/// suspended in every state except `Idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DebugState {
    #[default]
    Idle,
    Debug { scene: usize },
    CheckingLines { scene: usize, line: usize },
}

impl DebugState {
    pub fn is_active(self) -> bool {
        self != DebugState::Idle
    }

    pub fn scene(self) -> Option<usize> {
        match self {
            DebugState::Idle => None,
            DebugState::Debug { scene } | DebugState::CheckingLines { scene, .. } => Some(scene),
        }
    }

    pub fn step_scene(self, delta: isize, scene_count: usize) -> Self {
        match self {
            DebugState::Debug { scene } => DebugState::Debug {
                scene: wrap_step(scene, delta, scene_count),
            },
            other => other,
        }
    }

    pub fn check_lines(self) -> Self {
        match self {
            DebugState::Debug { scene } => DebugState::CheckingLines { scene, line: 0 },
            other => other,
        }
    }

    pub fn leave_lines(self) -> Self {
        match self {
            DebugState::CheckingLines { scene, .. } => DebugState::Debug { scene },
            other => other,
        }
    }

    pub fn step_line(self, delta: isize, line_count: usize) -> Self {
        match self {
            DebugState::CheckingLines { scene, line } => DebugState::CheckingLines {
                scene,
                line: wrap_step(line, delta, line_count),
            },
            other => other,
        }
    }
}

/// `current + delta`, wrapping inside `0..len`.
pub fn wrap_step(current: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let len = len as isize;
    (current as isize + delta).rem_euclid(len) as usize
}

pub fn describe_line(bank: &CaptionBank, scene: &str, index: usize, line: &CaptionLine) -> String {
    let speaker = bank
        .speaker_names()
        .get(line.speaker.index())
        .map_or("?", String::as_str);
    let mut out = format!(
        "{scene} #{index}: {:.2}..{:.2} {:?} ({speaker})",
        line.start_time, line.end_time, line.speaker
    );
    if line.flags.offscreen {
        out.push_str(" offscreen");
    }
    if line.flags.merged {
        out.push_str(" merged");
    }
    let _ = write!(out, " \"{}\"", line.text);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_step_both_directions() {
        assert_eq!(wrap_step(0, -1, 3), 2);
        assert_eq!(wrap_step(2, 1, 3), 0);
        assert_eq!(wrap_step(1, 5, 3), 0);
        assert_eq!(wrap_step(4, 1, 0), 0);
    }

    #[test]
    fn transitions_only_apply_in_their_state() {
        let idle = DebugState::Idle;
        assert_eq!(idle.check_lines(), idle);
        assert_eq!(idle.step_scene(1, 4), idle);

        let debug = DebugState::Debug { scene: 3 };
        assert_eq!(debug.step_scene(1, 4), DebugState::Debug { scene: 0 });
        assert_eq!(debug.step_line(1, 4), debug);

        let lines = debug.check_lines();
        assert_eq!(lines, DebugState::CheckingLines { scene: 3, line: 0 });
        assert_eq!(lines.step_scene(1, 4), lines);
        assert_eq!(
            lines.step_line(-1, 5),
            DebugState::CheckingLines { scene: 3, line: 4 }
        );
        assert_eq!(lines.leave_lines(), debug);
        assert_eq!(lines.scene(), Some(3));
        assert!(!idle.is_active());
    }
}
