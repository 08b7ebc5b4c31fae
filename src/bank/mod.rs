mod parse;
mod write;

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::speaker::SpeakerId;

pub use parse::{parse_bank, read_bank_file, BankError};
pub use write::{serialise, write_bank};

pub const BANK_VERSION: i16 = 2;

/// Default size of the region a resident bank must fit in.
pub const DEFAULT_HEAP_BUDGET: usize = 600 * 1024;

#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Language {
    English,
    French,
    German,
    Spanish,
    Italian,
    Japanese,
    Korean,
    UkEnglish,
    Portuguese,
}

impl Language {
    const ALL: [Language; 9] = [
        Language::English,
        Language::French,
        Language::German,
        Language::Spanish,
        Language::Italian,
        Language::Japanese,
        Language::Korean,
        Language::UkEnglish,
        Language::Portuguese,
    ];

    pub fn from_raw(raw: i16) -> Option<Language> {
        usize::try_from(raw)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFlags {
    #[serde(default)]
    pub offscreen: bool,
    /// Injected from the cinematic path rather than loaded from a script.
    #[serde(default)]
    pub merged: bool,
}

impl LineFlags {
    const OFFSCREEN: u16 = 1 << 0;
    const MERGED: u16 = 1 << 1;

    pub fn from_bits(bits: u16) -> Self {
        Self {
            offscreen: bits & Self::OFFSCREEN != 0,
            merged: bits & Self::MERGED != 0,
        }
    }

    pub fn bits(self) -> u16 {
        let mut bits = 0;
        if self.offscreen {
            bits |= Self::OFFSCREEN;
        }
        if self.merged {
            bits |= Self::MERGED;
        }
        bits
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionLine {
    pub start_time: f32,
    pub end_time: f32,
    pub text: String,
    pub speaker: SpeakerId,
    #[serde(default)]
    pub flags: LineFlags,
}

impl CaptionLine {
    /// Both ends are inclusive.
    pub fn contains(&self, position: f32) -> bool {
        self.start_time <= position && position <= self.end_time
    }
}

/// All caption lines for one named audio source, ordered by `start_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionScript {
    pub name: String,
    pub lines: Vec<CaptionLine>,
}

impl CaptionScript {
    /// Resolves the line active at `position`.
    ///
    /// The scan starts at `hint` (the index resolved on the previous frame) and
    /// falls back to the beginning when the position is before that line, e.g.
    /// after a looped sound restarts. When ranges overlap the earliest line in
    /// script order wins, so a position exactly on a shared boundary resolves
    /// to the line that is ending.
    pub fn line_index_at_pos(&self, position: f32, hint: usize) -> Option<usize> {
        self.scan(position, hint, |_, _| true)
    }

    /// A second line active at `position` alongside `first`. Lines that only
    /// touch `first` at a boundary follow it rather than run concurrently, so
    /// they are not reported.
    pub fn second_line_index_at_pos(
        &self,
        position: f32,
        hint: usize,
        first: usize,
    ) -> Option<usize> {
        let first_line = self.lines.get(first)?;
        self.scan(position, hint, |index, line| {
            index != first
                && line.start_time < first_line.end_time
                && first_line.start_time < line.end_time
        })
    }

    fn scan(
        &self,
        position: f32,
        hint: usize,
        accept: impl Fn(usize, &CaptionLine) -> bool,
    ) -> Option<usize> {
        let start = match self.lines.get(hint) {
            Some(line) if line.start_time <= position => hint,
            _ => 0,
        };

        for (index, line) in self.lines.iter().enumerate().skip(start) {
            if line.start_time > position {
                break;
            }
            if line.contains(position) && accept(index, line) {
                return Some(index);
            }
        }
        None
    }

    pub fn get_line_at_pos(&self, position: f32, hint: usize) -> Option<&CaptionLine> {
        self.line_index_at_pos(position, hint)
            .map(|index| &self.lines[index])
    }
}

/// Index of a script in a specific resident bank.
///
/// A handle only resolves against the bank generation that produced it, so
/// slots holding a handle across a bank swap see `None` instead of a
/// different script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptHandle {
    generation: u64,
    index: u32,
}

impl ScriptHandle {
    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u64 {
        self.generation
    }

    pub fn line(self, line: usize) -> LineHandle {
        LineHandle {
            script: self,
            line: line as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineHandle {
    script: ScriptHandle,
    line: u32,
}

impl LineHandle {
    pub fn script(self) -> ScriptHandle {
        self.script
    }

    pub fn index(self) -> usize {
        self.line as usize
    }
}

#[derive(Debug, Clone)]
pub struct CaptionBank {
    pub version: i16,
    pub language: Language,
    scripts: Vec<CaptionScript>,
    speaker_names: Vec<String>,
    by_name: HashMap<String, usize>,
    generation: u64,
}

impl CaptionBank {
    pub fn new(
        language: Language,
        speaker_names: Vec<String>,
        scripts: Vec<CaptionScript>,
    ) -> Self {
        let mut by_name = HashMap::with_capacity(scripts.len());
        for (index, script) in scripts.iter().enumerate() {
            // duplicate names resolve to the first script, same as a linear scan
            by_name.entry(script.name.clone()).or_insert(index);
        }
        Self {
            version: BANK_VERSION,
            language,
            scripts,
            speaker_names,
            by_name,
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn scripts(&self) -> &[CaptionScript] {
        &self.scripts
    }

    pub fn speaker_names(&self) -> &[String] {
        &self.speaker_names
    }

    /// Script whose name equals the audio source identity. Most playing sounds
    /// have no captions, so a miss is an ordinary `None`.
    pub fn get_scene_by_name(&self, name: &str) -> Option<&CaptionScript> {
        self.by_name.get(name).map(|&index| &self.scripts[index])
    }

    pub fn find_scene(&self, name: &str) -> Option<ScriptHandle> {
        self.by_name.get(name).map(|&index| self.handle(index))
    }

    pub fn handle(&self, index: usize) -> ScriptHandle {
        debug_assert!(index < self.scripts.len());
        ScriptHandle {
            generation: self.generation,
            index: index as u32,
        }
    }

    pub fn script(&self, handle: ScriptHandle) -> Option<&CaptionScript> {
        if handle.generation != self.generation {
            return None;
        }
        self.scripts.get(handle.index())
    }

    pub fn line(&self, handle: LineHandle) -> Option<&CaptionLine> {
        self.script(handle.script)
            .and_then(|script| script.lines.get(handle.index()))
    }

    /// Name the bank gives `speaker`. Asking for an id beyond the bank's
    /// speaker table is a caller bug; release builds get a placeholder.
    pub fn get_speaker_name(&self, speaker: SpeakerId) -> &str {
        match self.speaker_names.get(speaker.index()) {
            Some(name) => name,
            None => {
                debug_assert!(
                    false,
                    "speaker {speaker:?} outside the bank's {} names",
                    self.speaker_names.len()
                );
                "?"
            }
        }
    }
}

/// Holds the single resident bank and stamps each newly installed bank with
/// a fresh generation.
#[derive(Debug)]
pub struct BankStore {
    resident: Option<CaptionBank>,
    next_generation: u64,
    heap_budget: usize,
}

impl BankStore {
    pub fn new(heap_budget: usize) -> Self {
        Self {
            resident: None,
            next_generation: 1,
            heap_budget,
        }
    }

    pub fn bank(&self) -> Option<&CaptionBank> {
        self.resident.as_ref()
    }

    pub fn heap_budget(&self) -> usize {
        self.heap_budget
    }

    /// Replaces the resident bank. On error the previous bank stays resident.
    pub fn load(&mut self, path: &Path) -> Result<&CaptionBank, BankError> {
        let bank = read_bank_file(path, self.heap_budget)?;
        tracing::info!(
            "loaded caption bank {} ({:?}, {} scripts)",
            path.display(),
            bank.language,
            bank.scripts.len()
        );
        Ok(self.install(bank))
    }

    pub fn install(&mut self, mut bank: CaptionBank) -> &CaptionBank {
        bank.generation = self.next_generation;
        self.next_generation += 1;
        self.resident.insert(bank)
    }

    pub fn unload(&mut self) {
        if self.resident.take().is_some() {
            tracing::info!("caption bank unloaded");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn line(start: f32, end: f32, text: &str, speaker: SpeakerId) -> CaptionLine {
        CaptionLine {
            start_time: start,
            end_time: end,
            text: text.to_string(),
            speaker,
            flags: LineFlags::default(),
        }
    }

    pub(crate) fn intro() -> CaptionScript {
        CaptionScript {
            name: "intro".to_string(),
            lines: vec![
                line(0.0, 10.0, "Hello", SpeakerId::Jak),
                line(10.0, 20.0, "Bye", SpeakerId::Jak),
            ],
        }
    }

    macro_rules! test_line_at_pos {
        ($($name:ident: $value:expr,)*) => {
        $(
            #[test]
            fn $name() {
                let (position, expected): (f32, Option<&str>) = $value;

                let script = intro();
                let found = script.get_line_at_pos(position, 0).map(|l| l.text.as_str());

                assert_eq!(found, expected);
            }
        )*
        }
    }

    test_line_at_pos! {
        test_line_at_pos_0: (5.0, Some("Hello")),
        test_line_at_pos_1: (0.0, Some("Hello")),
        test_line_at_pos_2: (10.0, Some("Hello")),
        test_line_at_pos_3: (10.5, Some("Bye")),
        test_line_at_pos_4: (20.0, Some("Bye")),
        test_line_at_pos_5: (25.0, None),
        test_line_at_pos_6: (-1.0, None),
    }

    #[test]
    fn monotonic_positions_follow_the_hint() {
        let script = intro();
        let mut hint = 0;
        let mut seen = Vec::new();
        for frame in 0..=50 {
            let position = frame as f32 * 0.5;
            match script.line_index_at_pos(position, hint) {
                Some(index) => {
                    assert!(index >= hint, "hint regressed at {position}");
                    assert!(script.lines[index].contains(position));
                    hint = index;
                    seen.push(index);
                }
                None => assert!(position > 20.0, "miss inside a line at {position}"),
            }
        }
        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&1));
    }

    #[test]
    fn position_before_hint_rescans_from_start() {
        let script = intro();
        assert_eq!(script.line_index_at_pos(3.0, 1), Some(0));
        assert_eq!(script.line_index_at_pos(3.0, 99), Some(0));
    }

    #[test]
    fn overlapping_lines_resolve_in_script_order() {
        let script = CaptionScript {
            name: "crowd".to_string(),
            lines: vec![
                line(0.0, 8.0, "first", SpeakerId::Torn),
                line(2.0, 6.0, "second", SpeakerId::Tess),
                line(3.0, 9.0, "third", SpeakerId::Sig),
            ],
        };
        assert_eq!(script.line_index_at_pos(4.0, 0), Some(0));
        assert_eq!(script.second_line_index_at_pos(4.0, 0, 0), Some(1));
        assert_eq!(script.second_line_index_at_pos(7.0, 0, 0), Some(2));
    }

    #[test]
    fn touching_lines_are_not_concurrent() {
        let script = intro();
        assert_eq!(script.line_index_at_pos(10.0, 0), Some(0));
        assert_eq!(script.second_line_index_at_pos(10.0, 0, 0), None);
    }

    #[test]
    fn handles_do_not_resolve_across_generations() {
        let mut store = BankStore::new(DEFAULT_HEAP_BUDGET);
        let old = store
            .install(CaptionBank::new(Language::English, vec![], vec![intro()]))
            .find_scene("intro")
            .unwrap();
        let bank = store.install(CaptionBank::new(Language::French, vec![], vec![intro()]));

        assert!(bank.script(old).is_none());
        assert!(bank.line(old.line(0)).is_none());
        let fresh = bank.find_scene("intro").unwrap();
        assert_eq!(bank.line(fresh.line(1)).unwrap().text, "Bye");
    }

    #[test]
    fn unknown_scene_is_a_quiet_miss() {
        let bank = CaptionBank::new(Language::English, vec![], vec![intro()]);
        assert!(bank.get_scene_by_name("ambient-wind").is_none());
        assert_eq!(bank.get_scene_by_name("intro").unwrap().lines.len(), 2);
    }

    #[test]
    fn speaker_names_are_indexed_by_id() {
        let names = vec!["".to_string(), "Computer".to_string(), "Jak".to_string()];
        let bank = CaptionBank::new(Language::English, names, vec![]);
        assert_eq!(bank.get_speaker_name(SpeakerId::Jak), "Jak");
    }

    #[test]
    fn line_flags_bits() {
        let flags = LineFlags {
            offscreen: true,
            merged: false,
        };
        assert_eq!(flags.bits(), 1);
        assert_eq!(LineFlags::from_bits(3), LineFlags { offscreen: true, merged: true });
    }
}
