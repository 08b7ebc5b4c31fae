//! Packs a JSON caption source into the binary bank format.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use serde::Deserialize;

use captions::bank::{parse_bank, write_bank, CaptionBank, CaptionScript, Language, DEFAULT_HEAP_BUDGET};
use captions::speaker::SpeakerId;

#[derive(Debug, Parser)]
#[command(name = "pack_bank", about = "Pack a JSON caption source into a caption bank")]
struct Args {
    /// JSON source: `{ "language": ..., "speakers": [...], "scripts": [...] }`.
    input: PathBuf,

    /// Bank file to write.
    output: PathBuf,

    /// Refuse to write a bank larger than this many bytes.
    #[arg(long, default_value_t = DEFAULT_HEAP_BUDGET)]
    heap_budget: usize,
}

#[derive(Debug, Deserialize)]
struct Source {
    language: Language,
    /// Display names indexed by speaker id. Defaults to the id names.
    #[serde(default)]
    speakers: Vec<String>,
    scripts: Vec<CaptionScript>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let data = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read '{}'", args.input.display()))?;
    let source: Source = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse '{}'", args.input.display()))?;

    let speakers = if source.speakers.is_empty() {
        SpeakerId::ALL.iter().map(|id| format!("{id:?}")).collect()
    } else {
        source.speakers
    };
    let bank = CaptionBank::new(source.language, speakers, source.scripts);

    let mut bytes = Vec::new();
    write_bank(&mut bytes, &bank)?;
    if bytes.len() > args.heap_budget {
        bail!(
            "bank is {} bytes, over the {} byte budget",
            bytes.len(),
            args.heap_budget
        );
    }
    // must load back through the runtime parser
    parse_bank(&bytes, args.heap_budget).context("packed bank does not load back")?;

    std::fs::write(&args.output, &bytes)
        .with_context(|| format!("Failed to write '{}'", args.output.display()))?;
    tracing::info!(
        "packed {} scripts ({} bytes) into {}",
        bank.scripts().len(),
        bytes.len(),
        args.output.display()
    );
    Ok(())
}
