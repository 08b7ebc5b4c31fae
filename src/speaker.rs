use serde::{Deserialize, Serialize};

/// Fixed speaker identities used to color-code caption text.
///
/// The discriminant is the on-disk id and the index into both the bank's
/// speaker-name table and [`SpeakerColorTable`].
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpeakerId {
    None,
    Computer,
    Jak,
    Darkjak,
    Daxter,
    Samos,
    Keira,
    Kid,
    Kor,
    Metalkor,
    Baron,
    Errol,
    Torn,
    Tess,
    Guard,
    GuardA,
    GuardB,
    Krew,
    Sig,
    Brutter,
    Vin,
    YoungSamos,
    Pecker,
    Onin,
    Ashelin,
    Jinx,
    Mog,
    Grim,
    Agent,
    CitizenMale,
    CitizenFemale,
    Oracle,
    Precursor,
}

impl SpeakerId {
    pub const ALL: [SpeakerId; 33] = [
        SpeakerId::None,
        SpeakerId::Computer,
        SpeakerId::Jak,
        SpeakerId::Darkjak,
        SpeakerId::Daxter,
        SpeakerId::Samos,
        SpeakerId::Keira,
        SpeakerId::Kid,
        SpeakerId::Kor,
        SpeakerId::Metalkor,
        SpeakerId::Baron,
        SpeakerId::Errol,
        SpeakerId::Torn,
        SpeakerId::Tess,
        SpeakerId::Guard,
        SpeakerId::GuardA,
        SpeakerId::GuardB,
        SpeakerId::Krew,
        SpeakerId::Sig,
        SpeakerId::Brutter,
        SpeakerId::Vin,
        SpeakerId::YoungSamos,
        SpeakerId::Pecker,
        SpeakerId::Onin,
        SpeakerId::Ashelin,
        SpeakerId::Jinx,
        SpeakerId::Mog,
        SpeakerId::Grim,
        SpeakerId::Agent,
        SpeakerId::CitizenMale,
        SpeakerId::CitizenFemale,
        SpeakerId::Oracle,
        SpeakerId::Precursor,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn from_raw(raw: i16) -> Option<SpeakerId> {
        usize::try_from(raw)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Same hue at reduced brightness and opacity, used for offscreen speakers.
    pub fn dimmed(self) -> Self {
        Self {
            r: (self.r as u16 * 3 / 5) as u8,
            g: (self.g as u16 * 3 / 5) as u8,
            b: (self.b as u16 * 3 / 5) as u8,
            a: (self.a as u16 * 4 / 5) as u8,
        }
    }
}

/// Color used for `SpeakerId::None` and any speaker without an override.
pub const DEFAULT_COLOR: Color = Color::rgb(0xe0, 0xe0, 0xe0);

const OVERRIDES: &[(SpeakerId, Color)] = &[
    (SpeakerId::Computer, Color::rgb(0x60, 0xd0, 0xf0)),
    (SpeakerId::Jak, Color::rgb(0x90, 0xc8, 0xff)),
    (SpeakerId::Darkjak, Color::rgb(0xb0, 0x80, 0xf0)),
    (SpeakerId::Daxter, Color::rgb(0xff, 0xb0, 0x40)),
    (SpeakerId::Samos, Color::rgb(0x80, 0xe0, 0x70)),
    (SpeakerId::Keira, Color::rgb(0x50, 0xe0, 0xc0)),
    (SpeakerId::Kor, Color::rgb(0xa0, 0xa0, 0x70)),
    (SpeakerId::Baron, Color::rgb(0xf0, 0x50, 0x40)),
    (SpeakerId::Errol, Color::rgb(0xff, 0x70, 0x30)),
    (SpeakerId::Torn, Color::rgb(0xc0, 0xa0, 0x80)),
    (SpeakerId::Tess, Color::rgb(0xff, 0xd0, 0x60)),
    (SpeakerId::Guard, Color::rgb(0xd0, 0x80, 0x80)),
    (SpeakerId::Krew, Color::rgb(0x90, 0xb0, 0x40)),
    (SpeakerId::Sig, Color::rgb(0xd0, 0xb0, 0x40)),
    (SpeakerId::Brutter, Color::rgb(0xf0, 0x90, 0x90)),
    (SpeakerId::Vin, Color::rgb(0xa0, 0xf0, 0xa0)),
    (SpeakerId::Pecker, Color::rgb(0xf0, 0xe0, 0x30)),
    (SpeakerId::Onin, Color::rgb(0xf0, 0xa0, 0xd0)),
    (SpeakerId::Ashelin, Color::rgb(0xff, 0x80, 0x60)),
    (SpeakerId::Jinx, Color::rgb(0xd0, 0xd0, 0x50)),
    (SpeakerId::Mog, Color::rgb(0xb0, 0xd0, 0x90)),
    (SpeakerId::Grim, Color::rgb(0x90, 0x90, 0xd0)),
    (SpeakerId::Agent, Color::rgb(0xa0, 0xa0, 0xa0)),
    (SpeakerId::CitizenMale, Color::rgb(0xc8, 0xc8, 0xb0)),
    (SpeakerId::Oracle, Color::rgb(0x70, 0x70, 0xff)),
    (SpeakerId::Precursor, Color::rgb(0x40, 0xf0, 0xff)),
];

/// `(alias, source)`: the alias takes whatever color the source ends up with.
const ALIASES: &[(SpeakerId, SpeakerId)] = &[
    (SpeakerId::Kid, SpeakerId::Jak),
    (SpeakerId::Metalkor, SpeakerId::Kor),
    (SpeakerId::YoungSamos, SpeakerId::Samos),
    (SpeakerId::GuardA, SpeakerId::Guard),
    (SpeakerId::GuardB, SpeakerId::Guard),
    (SpeakerId::CitizenFemale, SpeakerId::CitizenMale),
];

/// Speaker → text color, built once at startup and read-only afterwards.
#[derive(Debug, Clone)]
pub struct SpeakerColorTable {
    colors: [Color; SpeakerId::COUNT],
}

impl SpeakerColorTable {
    pub fn new() -> Self {
        let mut colors = [DEFAULT_COLOR; SpeakerId::COUNT];
        for &(speaker, color) in OVERRIDES {
            colors[speaker.index()] = color;
        }
        // aliases are applied last so they track overrides of their source
        for &(alias, source) in ALIASES {
            colors[alias.index()] = colors[source.index()];
        }
        Self { colors }
    }

    pub fn color(&self, speaker: SpeakerId) -> Color {
        self.colors[speaker.index()]
    }
}

impl Default for SpeakerColorTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_real_speaker_has_its_own_color() {
        let table = SpeakerColorTable::new();
        assert_eq!(table.color(SpeakerId::None), DEFAULT_COLOR);
        for speaker in SpeakerId::ALL.iter().copied().skip(1) {
            assert_ne!(table.color(speaker), DEFAULT_COLOR, "{speaker:?}");
        }
    }

    #[test]
    fn aliases_match_their_source_exactly() {
        let table = SpeakerColorTable::new();
        assert_eq!(table.color(SpeakerId::Kid), table.color(SpeakerId::Jak));
        for &(alias, source) in ALIASES {
            assert_eq!(table.color(alias), table.color(source), "{alias:?}");
        }
    }

    #[test]
    fn discriminants_follow_table_order() {
        for (i, speaker) in SpeakerId::ALL.iter().enumerate() {
            assert_eq!(speaker.index(), i);
            assert_eq!(SpeakerId::from_raw(i as i16), Some(*speaker));
        }
        assert_eq!(SpeakerId::from_raw(-1), None);
        assert_eq!(SpeakerId::from_raw(SpeakerId::COUNT as i16), None);
    }
}
