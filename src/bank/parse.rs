use std::path::{Path, PathBuf};

use nom::bytes::complete::take;
use nom::error::{ErrorKind, ParseError};
use nom::multi::count;
use nom::number::complete::{le_f32, le_i16, le_i32, le_u16};
use nom::sequence::tuple;
use nom::{Err as NomErr, IResult};
use thiserror::Error;

use super::{CaptionBank, CaptionLine, CaptionScript, Language, LineFlags, BANK_VERSION};
use crate::speaker::SpeakerId;

#[derive(Error, Debug)]
pub enum BankError {
    #[error("failed to read caption bank '{}'", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("caption bank is {size} bytes, over the {budget} byte heap budget")]
    OverBudget { size: usize, budget: usize },
    #[error("caption bank truncated at byte {offset}")]
    Truncated { offset: usize },
    #[error("negative {what} count {count} at byte {offset}")]
    NegativeCount {
        what: &'static str,
        count: i32,
        offset: usize,
    },
    #[error("unsupported caption bank version {found} (expected {expected})")]
    UnsupportedVersion { found: i16, expected: i16 },
    #[error("unknown language id {0}")]
    UnknownLanguage(i16),
    #[error("bank names {0} speakers, more than there are speaker ids")]
    TooManySpeakers(i16),
    #[error("unknown speaker id {id} at byte {offset}")]
    UnknownSpeaker { id: i16, offset: usize },
    #[error("invalid UTF-8 string at byte {offset}")]
    InvalidUtf8 { offset: usize },
    #[error("line at byte {offset} ends at {end} before it starts at {start}")]
    InvertedTiming { start: f32, end: f32, offset: usize },
    #[error("{0} trailing bytes after the last script")]
    TrailingBytes(usize),
}

/// What went wrong, without the position; the position is only known once the
/// parser has unwound back to the full input.
#[derive(Debug)]
enum Cause {
    NegativeCount { what: &'static str, count: i32 },
    UnsupportedVersion(i16),
    UnknownLanguage(i16),
    TooManySpeakers(i16),
    UnknownSpeaker(i16),
    InvalidUtf8,
    InvertedTiming { start: f32, end: f32 },
}

impl Cause {
    fn at(self, offset: usize) -> BankError {
        match self {
            Cause::NegativeCount { what, count } => BankError::NegativeCount {
                what,
                count,
                offset,
            },
            Cause::UnsupportedVersion(found) => BankError::UnsupportedVersion {
                found,
                expected: BANK_VERSION,
            },
            Cause::UnknownLanguage(raw) => BankError::UnknownLanguage(raw),
            Cause::TooManySpeakers(raw) => BankError::TooManySpeakers(raw),
            Cause::UnknownSpeaker(id) => BankError::UnknownSpeaker { id, offset },
            Cause::InvalidUtf8 => BankError::InvalidUtf8 { offset },
            Cause::InvertedTiming { start, end } => BankError::InvertedTiming { start, end, offset },
        }
    }
}

#[derive(Debug)]
struct RawError<'a> {
    input: &'a [u8],
    cause: Option<Cause>,
}

impl<'a> ParseError<&'a [u8]> for RawError<'a> {
    fn from_error_kind(input: &'a [u8], _kind: ErrorKind) -> Self {
        RawError { input, cause: None }
    }

    fn append(_input: &'a [u8], _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

type PResult<'a, T> = IResult<&'a [u8], T, RawError<'a>>;

fn fail(input: &[u8], cause: Cause) -> NomErr<RawError<'_>> {
    NomErr::Failure(RawError {
        input,
        cause: Some(cause),
    })
}

struct Header {
    entry_count: usize,
    language: Language,
    speaker_count: usize,
}

/// Parses a complete bank image. Inputs larger than `heap_budget` are refused
/// before any parsing happens.
pub fn parse_bank(input: &[u8], heap_budget: usize) -> Result<CaptionBank, BankError> {
    if input.len() > heap_budget {
        return Err(BankError::OverBudget {
            size: input.len(),
            budget: heap_budget,
        });
    }

    match bank(input) {
        Ok((rest, bank)) if rest.is_empty() => Ok(bank),
        Ok((rest, _)) => Err(BankError::TrailingBytes(rest.len())),
        Err(NomErr::Error(err)) | Err(NomErr::Failure(err)) => {
            let offset = input.len() - err.input.len();
            Err(match err.cause {
                Some(cause) => cause.at(offset),
                None => BankError::Truncated { offset },
            })
        }
        Err(NomErr::Incomplete(_)) => {
            unreachable!("Incomplete data received by non-streaming parser.")
        }
    }
}

pub fn read_bank_file(path: &Path, heap_budget: usize) -> Result<CaptionBank, BankError> {
    let io_err = |source| BankError::Io {
        path: path.to_path_buf(),
        source,
    };
    let size = std::fs::metadata(path).map_err(io_err)?.len();
    if size > heap_budget as u64 {
        return Err(BankError::OverBudget {
            size: usize::try_from(size).unwrap_or(usize::MAX),
            budget: heap_budget,
        });
    }
    let data = std::fs::read(path).map_err(io_err)?;
    parse_bank(&data, heap_budget)
}

fn bank(input: &[u8]) -> PResult<'_, CaptionBank> {
    let (input, header) = header(input)?;
    let (input, speaker_names) = count(string, header.speaker_count)(input)?;
    let (input, mut scripts) = count(script, header.entry_count)(input)?;

    for script in &mut scripts {
        let sorted = script
            .lines
            .windows(2)
            .all(|pair| pair[0].start_time <= pair[1].start_time);
        if !sorted {
            tracing::warn!("script '{}' lines are not ordered by start time; sorting", script.name);
            script
                .lines
                .sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        }
    }

    Ok((
        input,
        CaptionBank::new(header.language, speaker_names, scripts),
    ))
}

fn header(input: &[u8]) -> PResult<'_, Header> {
    let (rest, (entry_count, version, language, speaker_count)) =
        tuple((le_i16, le_i16, le_i16, le_i16))(input)?;

    if entry_count < 0 {
        return Err(fail(
            input,
            Cause::NegativeCount {
                what: "script",
                count: entry_count.into(),
            },
        ));
    }
    if version != BANK_VERSION {
        return Err(fail(input, Cause::UnsupportedVersion(version)));
    }
    let language =
        Language::from_raw(language).ok_or_else(|| fail(input, Cause::UnknownLanguage(language)))?;
    if speaker_count < 0 {
        return Err(fail(
            input,
            Cause::NegativeCount {
                what: "speaker",
                count: speaker_count.into(),
            },
        ));
    }
    if speaker_count as usize > SpeakerId::COUNT {
        return Err(fail(input, Cause::TooManySpeakers(speaker_count)));
    }

    Ok((
        rest,
        Header {
            entry_count: entry_count as usize,
            language,
            speaker_count: speaker_count as usize,
        },
    ))
}

fn string(input: &[u8]) -> PResult<'_, String> {
    let (rest, len) = le_u16(input)?;
    let (rest, bytes) = take(len)(rest)?;
    let text = std::str::from_utf8(bytes).map_err(|_| fail(input, Cause::InvalidUtf8))?;
    Ok((rest, text.to_owned()))
}

fn script(input: &[u8]) -> PResult<'_, CaptionScript> {
    let (rest, name) = string(input)?;
    let count_at = rest;
    let (rest, line_count) = le_i32(rest)?;
    if line_count < 0 {
        return Err(fail(
            count_at,
            Cause::NegativeCount {
                what: "line",
                count: line_count,
            },
        ));
    }
    let (rest, lines) = count(caption_line, line_count as usize)(rest)?;
    Ok((rest, CaptionScript { name, lines }))
}

fn caption_line(input: &[u8]) -> PResult<'_, CaptionLine> {
    let (rest, (start_time, end_time, raw_speaker, raw_flags)) =
        tuple((le_f32, le_f32, le_i16, le_u16))(input)?;

    let speaker = SpeakerId::from_raw(raw_speaker)
        .ok_or_else(|| fail(input, Cause::UnknownSpeaker(raw_speaker)))?;
    // also rejects NaN
    if !(start_time <= end_time) {
        return Err(fail(
            input,
            Cause::InvertedTiming {
                start: start_time,
                end: end_time,
            },
        ));
    }
    let (rest, text) = string(rest)?;

    Ok((
        rest,
        CaptionLine {
            start_time,
            end_time,
            text,
            speaker,
            flags: LineFlags::from_bits(raw_flags),
        },
    ))
}
