use captions::bank::{
    serialise, BankError, BankStore, CaptionBank, CaptionLine, CaptionScript, Language, LineFlags,
};
use captions::speaker::SpeakerId;

fn line(start_time: f32, end_time: f32, text: &str, speaker: SpeakerId) -> CaptionLine {
    CaptionLine {
        start_time,
        end_time,
        text: text.to_string(),
        speaker,
        flags: LineFlags::default(),
    }
}

fn sample_bank() -> CaptionBank {
    let speakers = ["", "Jak", "Daxter", "Samos"]
        .into_iter()
        .map(String::from)
        .collect();
    CaptionBank::new(
        Language::English,
        speakers,
        vec![
            CaptionScript {
                name: "intro".to_string(),
                lines: vec![
                    line(0.0, 10.0, "Hello", SpeakerId::Jak),
                    line(10.0, 20.0, "Bye", SpeakerId::Jak),
                ],
            },
            CaptionScript {
                name: "sage-intro".to_string(),
                lines: vec![line(0.5, 3.25, "Ah, young Jak. Élan!", SpeakerId::Samos)],
            },
        ],
    )
}

#[test]
fn bank_file_loads_into_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("english.bank");
    serialise(&sample_bank(), &path).unwrap();

    let mut store = BankStore::new(captions::bank::DEFAULT_HEAP_BUDGET);
    let bank = store.load(&path).unwrap();
    assert_eq!(bank.language, Language::English);
    assert_eq!(bank.scripts().len(), 2);
    assert_eq!(bank.get_speaker_name(SpeakerId::Daxter), "Daxter");

    let sage = bank.get_scene_by_name("sage-intro").unwrap();
    assert_eq!(sage.lines[0].text, "Ah, young Jak. Élan!");
    assert_eq!(sage.lines[0].end_time, 3.25);
    assert_eq!(
        bank.get_scene_by_name("intro")
            .and_then(|script| script.get_line_at_pos(15.0, 0))
            .map(|line| line.text.as_str()),
        Some("Bye")
    );
}

#[test]
fn failed_reload_keeps_the_resident_bank() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.bank");
    let bad = dir.path().join("bad.bank");
    serialise(&sample_bank(), &good).unwrap();
    std::fs::write(&bad, [2u8, 0, 2, 0]).unwrap();

    let mut store = BankStore::new(captions::bank::DEFAULT_HEAP_BUDGET);
    let generation = store.load(&good).unwrap().generation();

    let err = store.load(&bad).unwrap_err();
    assert!(matches!(err, BankError::Truncated { .. }), "{err}");
    assert_eq!(store.bank().map(CaptionBank::generation), Some(generation));

    let err = store.load(&dir.path().join("missing.bank")).unwrap_err();
    assert!(matches!(err, BankError::Io { .. }), "{err}");
    assert!(err.to_string().contains("missing.bank"), "{err}");
    assert!(store.bank().is_some());
}

#[test]
fn oversized_bank_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("english.bank");
    serialise(&sample_bank(), &path).unwrap();

    let mut store = BankStore::new(16);
    let err = store.load(&path).unwrap_err();
    assert!(matches!(err, BankError::OverBudget { budget: 16, .. }), "{err}");
    assert!(store.bank().is_none());
}
