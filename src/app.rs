use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::bank::{BankStore, CaptionLine};
use crate::channels::{ChannelEnumerator, ChannelId, Scenario, ScriptedChannels};
use crate::config::Cli;
use crate::scheduler::{DebugState, DisplayFlags, DrawLine, DrawList, FixedAdvance, Scheduler};
use crate::speaker::SpeakerColorTable;
use crate::ui::run_overlay;

/// Operator input for the caption loop, applied at the start of a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    EnterDebug,
    ExitDebug,
    StepScene(isize),
    CheckLines,
    LeaveLines,
    StepLine(isize),
    PrintQueue,
    PrintSpeakers,
    SetMessage(bool),
    SetMinimap(bool),
    ToggleMessage,
    ToggleMinimap,
    ReloadBank,
    UnloadBank,
    SetMovieLine {
        line: CaptionLine,
        channel: ChannelId,
        position: f32,
    },
    ClearMovieLine,
}

impl FromStr for EngineCommand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let mut words = s.split_whitespace();
        let command = words.next().unwrap_or_default();
        let arg = words.next();
        let switch = |arg: Option<&str>| match arg {
            Some("on") => Ok(Some(true)),
            Some("off") => Ok(Some(false)),
            None | Some("toggle") => Ok(None),
            Some(other) => Err(anyhow::anyhow!("expected on/off/toggle, got '{other}'")),
        };

        Ok(match command {
            "debug" => EngineCommand::EnterDebug,
            "exit" => EngineCommand::ExitDebug,
            "scene+" | "next" => EngineCommand::StepScene(1),
            "scene-" | "prev" => EngineCommand::StepScene(-1),
            "lines" => EngineCommand::CheckLines,
            "back" => EngineCommand::LeaveLines,
            "line+" => EngineCommand::StepLine(1),
            "line-" => EngineCommand::StepLine(-1),
            "queue" => EngineCommand::PrintQueue,
            "speakers" => EngineCommand::PrintSpeakers,
            "message" => match switch(arg)? {
                Some(value) => EngineCommand::SetMessage(value),
                None => EngineCommand::ToggleMessage,
            },
            "minimap" => match switch(arg)? {
                Some(value) => EngineCommand::SetMinimap(value),
                None => EngineCommand::ToggleMinimap,
            },
            "reload" => EngineCommand::ReloadBank,
            "unload" => EngineCommand::UnloadBank,
            "clear-movie" => EngineCommand::ClearMovieLine,
            other => bail!("unknown command '{other}'"),
        })
    }
}

/// What the last frame put on screen.
#[derive(Debug, Clone, Default)]
pub struct FrameSnapshot {
    pub frame: u64,
    pub clock: f32,
    pub lines: DrawList,
    pub have_subtitles: bool,
    pub flags: DisplayFlags,
    pub active_subtitles: usize,
    pub debug: DebugState,
}

#[derive(Debug, Clone)]
pub struct SharedFrame {
    inner: Arc<Mutex<FrameSnapshot>>,
}

impl SharedFrame {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FrameSnapshot::default())),
        }
    }

    pub fn publish(&self, snapshot: FrameSnapshot) {
        *self.inner.lock() = snapshot;
    }

    pub fn snapshot(&self) -> FrameSnapshot {
        self.inner.lock().clone()
    }
}

impl Default for SharedFrame {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EngineHandle {
    pub stop: Arc<AtomicBool>,
    pub frame: SharedFrame,
    pub commands: Sender<EngineCommand>,
    pub reports: Receiver<String>,
    handle: std::thread::JoinHandle<()>,
}

impl EngineHandle {
    pub fn send(&self, command: EngineCommand) {
        if self.commands.try_send(command).is_err() {
            tracing::warn!("command queue full; dropping command");
        }
    }

    pub fn stop_and_join(self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.handle.join();
    }
}

/// Owns everything the caption loop touches. Lives on the engine thread.
struct Engine {
    bank_path: PathBuf,
    store: BankStore,
    scheduler: Scheduler,
    colors: SpeakerColorTable,
    metrics: FixedAdvance,
    channels: ScriptedChannels,
    movie_channel: Option<ChannelId>,
    scenario_done: bool,
    fps: u32,
    duration: Option<f32>,
    frame: SharedFrame,
    commands: Receiver<EngineCommand>,
    reports: Sender<String>,
    stop: Arc<AtomicBool>,
}

pub fn start_engine(cli: Cli) -> anyhow::Result<EngineHandle> {
    let scenario = match &cli.scenario {
        Some(path) => Scenario::from_file(path)?,
        None => Scenario::default(),
    };

    let mut store = BankStore::new(cli.heap_budget);
    if let Err(err) = store.load(&cli.bank) {
        // keep running without captions; `reload` can retry
        tracing::error!("{:#}", anyhow::Error::new(err));
    }

    let mut scheduler = Scheduler::new(cli.layout());
    scheduler.set_have_message(cli.message);
    scheduler.set_have_minimap(cli.minimap);

    let stop = Arc::new(AtomicBool::new(false));
    let frame = SharedFrame::new();
    let (command_tx, command_rx) = crossbeam_channel::bounded::<EngineCommand>(64);
    let (report_tx, report_rx) = crossbeam_channel::bounded::<String>(64);

    let engine = Engine {
        bank_path: cli.bank.clone(),
        store,
        scheduler,
        colors: SpeakerColorTable::new(),
        metrics: cli.metrics(),
        channels: ScriptedChannels::new(scenario),
        movie_channel: None,
        scenario_done: cli.scenario.is_none(),
        fps: cli.fps.max(1),
        duration: cli.duration,
        frame: frame.clone(),
        commands: command_rx,
        reports: report_tx,
        stop: stop.clone(),
    };

    let interval = cli.frame_interval();
    let handle = std::thread::spawn(move || engine.run(interval));
    tracing::info!("caption engine started at {} fps", cli.fps.max(1));

    Ok(EngineHandle {
        stop,
        frame,
        commands: command_tx,
        reports: report_rx,
        handle,
    })
}

impl Engine {
    fn run(mut self, interval: Duration) {
        let mut frame_no = 0u64;
        while !self.stop.load(Ordering::Relaxed) {
            let started = Instant::now();
            while let Ok(command) = self.commands.try_recv() {
                self.apply(command);
            }

            let clock = frame_no as f32 / self.fps as f32;
            self.channels.set_clock(clock);
            self.drive_movie();

            let lines = self.scheduler.frame(
                self.store.bank(),
                &self.channels,
                &self.colors,
                &self.metrics,
            );
            self.frame.publish(FrameSnapshot {
                frame: frame_no,
                clock,
                lines,
                have_subtitles: self.scheduler.have_subtitles(),
                flags: self.scheduler.flags(),
                active_subtitles: self.scheduler.get_active_subtitles(),
                debug: self.scheduler.debug_state(),
            });

            if !self.scenario_done && self.channels.finished() {
                tracing::info!("scenario finished at {clock:.2}s");
                self.scenario_done = true;
            }
            if self.duration.is_some_and(|duration| clock >= duration) {
                tracing::info!("scenario time {clock:.2}s reached; stopping");
                self.stop.store(true, Ordering::Relaxed);
            }
            frame_no += 1;
            std::thread::sleep(interval.saturating_sub(started.elapsed()));
        }
        tracing::info!("caption engine stopped after {frame_no} frames");
    }

    /// Hands a scenario movie caption to the scheduler once per cue.
    fn drive_movie(&mut self) {
        if self.scheduler.debug_state().is_active() {
            return;
        }
        match self.channels.active_movie_cue() {
            Some((channel, cue)) if self.movie_channel != Some(channel) => {
                let position = self.channels.position(channel).unwrap_or(0.0);
                self.scheduler.set_movie_line(cue.to_line(), channel, position);
                self.movie_channel = Some(channel);
            }
            Some(_) => {}
            None => self.movie_channel = None,
        }
    }

    fn apply(&mut self, command: EngineCommand) {
        let bank = self.store.bank();
        let report = match command {
            EngineCommand::EnterDebug => {
                self.scheduler.enter_debug();
                self.movie_channel = None;
                None
            }
            EngineCommand::ExitDebug => {
                self.scheduler.exit_debug();
                self.movie_channel = None;
                None
            }
            EngineCommand::StepScene(delta) => self.scheduler.step_scene(bank, delta),
            EngineCommand::CheckLines => self.scheduler.check_lines(bank),
            EngineCommand::LeaveLines => {
                self.scheduler.leave_lines();
                None
            }
            EngineCommand::StepLine(delta) => self.scheduler.step_line(bank, delta),
            EngineCommand::PrintQueue => Some(self.scheduler.print_queue(bank)),
            EngineCommand::PrintSpeakers => {
                Some(self.scheduler.print_speakers(bank, &self.colors))
            }
            EngineCommand::SetMessage(value) => {
                self.scheduler.set_have_message(value);
                None
            }
            EngineCommand::SetMinimap(value) => {
                self.scheduler.set_have_minimap(value);
                None
            }
            EngineCommand::ToggleMessage => {
                let value = !self.scheduler.flags().have_message;
                self.scheduler.set_have_message(value);
                None
            }
            EngineCommand::ToggleMinimap => {
                let value = !self.scheduler.flags().have_minimap;
                self.scheduler.set_have_minimap(value);
                None
            }
            EngineCommand::ReloadBank => {
                if let Err(err) = self.store.load(&self.bank_path) {
                    tracing::error!("{:#}", anyhow::Error::new(err));
                }
                None
            }
            EngineCommand::UnloadBank => {
                self.store.unload();
                None
            }
            EngineCommand::SetMovieLine {
                line,
                channel,
                position,
            } => {
                self.scheduler.set_movie_line(line, channel, position);
                None
            }
            EngineCommand::ClearMovieLine => {
                self.scheduler.clear_movie_line();
                None
            }
        };

        if let Some(report) = report {
            if self.reports.try_send(report).is_err() {
                tracing::warn!("report queue full; dropping report");
            }
        }
    }
}

pub fn describe_draw_line(line: &DrawLine) -> String {
    let mut out = format!("{:?}", line.speaker);
    if line.offscreen {
        out.push_str(" (offscreen)");
    }
    if line.merged {
        out.push_str(" [movie]");
    }
    format!("{out}: {}", line.text())
}

fn spawn_stdin_reader(commands: Sender<EngineCommand>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.parse::<EngineCommand>() {
                Ok(command) => {
                    if commands.send(command).is_err() {
                        break;
                    }
                }
                Err(err) => tracing::warn!("{err:#}"),
            }
        }
    });
}

pub fn run_headless(cli: Cli) -> anyhow::Result<()> {
    let engine = start_engine(cli)?;
    {
        let stop = engine.stop.clone();
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::Relaxed);
        })
        .context("failed to set Ctrl-C handler")?;
    }
    spawn_stdin_reader(engine.commands.clone());

    let mut last_lines: Vec<String> = Vec::new();
    loop {
        for report in engine.reports.try_iter() {
            println!("{report}");
        }

        let snapshot = engine.frame.snapshot();
        let lines: Vec<String> = snapshot.lines.iter().map(describe_draw_line).collect();
        if lines != last_lines {
            if lines.is_empty() {
                println!("[{:>7.2}s] -", snapshot.clock);
            }
            for line in &lines {
                println!("[{:>7.2}s] {line}", snapshot.clock);
            }
            last_lines = lines;
        }

        if engine.stop.load(Ordering::Relaxed) {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    engine.stop_and_join();
    Ok(())
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.no_ui {
        return run_headless(cli);
    }

    let layout = cli.layout();
    let engine = start_engine(cli)?;
    let result = run_overlay(&engine, layout);
    engine.stop_and_join();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{FixedAdvance, LayoutConfig};
    use crate::speaker::{Color, SpeakerId};

    #[test]
    fn parses_debug_commands() {
        assert_eq!("debug".parse::<EngineCommand>().unwrap(), EngineCommand::EnterDebug);
        assert_eq!("scene-".parse::<EngineCommand>().unwrap(), EngineCommand::StepScene(-1));
        assert_eq!("line+".parse::<EngineCommand>().unwrap(), EngineCommand::StepLine(1));
        assert_eq!(
            "message on".parse::<EngineCommand>().unwrap(),
            EngineCommand::SetMessage(true)
        );
        assert_eq!(
            "minimap".parse::<EngineCommand>().unwrap(),
            EngineCommand::ToggleMinimap
        );
    }

    #[test]
    fn rejects_unknown_commands() {
        assert!("dance".parse::<EngineCommand>().is_err());
        assert!("message maybe".parse::<EngineCommand>().is_err());
        assert!("".parse::<EngineCommand>().is_err());
    }

    #[test]
    fn draw_lines_are_labelled() {
        let metrics = FixedAdvance {
            advance: 10.0,
            height: 20.0,
        };
        let rows = crate::scheduler::wrap_text("Run!", &metrics, 1.0, LayoutConfig::default().width, 2);
        let line = DrawLine {
            rows,
            x: 0.0,
            y: 0.0,
            row_height: 20.0,
            scale: 1.0,
            color: Color::rgb(255, 255, 255),
            speaker: SpeakerId::Daxter,
            offscreen: true,
            merged: true,
        };
        assert_eq!(describe_draw_line(&line), "Daxter (offscreen) [movie]: Run!");
    }

    const MOVIE_SCENARIO: &str = r#"{
        "sounds": [
            {
                "name": "cutscene-1", "kind": "movie", "start": 0.0, "length": 10.0,
                "movie_line": { "text": "Look out!", "speaker": "daxter", "start_time": 0.0, "end_time": 9.0 }
            }
        ]
    }"#;

    fn engine() -> Engine {
        let (_command_tx, commands) = crossbeam_channel::bounded(1);
        let (reports, _report_rx) = crossbeam_channel::bounded(1);
        Engine {
            bank_path: PathBuf::from("unused.bank"),
            store: BankStore::new(crate::bank::DEFAULT_HEAP_BUDGET),
            scheduler: Scheduler::new(LayoutConfig::default()),
            colors: SpeakerColorTable::new(),
            metrics: FixedAdvance {
                advance: 10.0,
                height: 20.0,
            },
            channels: ScriptedChannels::new(serde_json::from_str(MOVIE_SCENARIO).unwrap()),
            movie_channel: None,
            scenario_done: false,
            fps: 60,
            duration: None,
            frame: SharedFrame::new(),
            commands,
            reports,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn movie_cue_survives_a_debug_round_trip() {
        let mut engine = engine();
        engine.channels.set_clock(1.0);
        engine.drive_movie();
        assert!(engine.scheduler.movie_mode());

        engine.apply(EngineCommand::EnterDebug);
        engine.channels.set_clock(2.0);
        engine.drive_movie();
        assert!(!engine.scheduler.movie_mode());

        engine.apply(EngineCommand::ExitDebug);
        engine.channels.set_clock(3.0);
        engine.drive_movie();
        let movie = engine.scheduler.movie_line().unwrap();
        assert_eq!(movie.line.text, "Look out!");
        assert_eq!(movie.position, 3.0);
    }

    #[test]
    fn cleared_movie_cue_stays_cleared() {
        let mut engine = engine();
        engine.channels.set_clock(1.0);
        engine.drive_movie();
        engine.apply(EngineCommand::ClearMovieLine);
        engine.channels.set_clock(2.0);
        engine.drive_movie();
        assert!(!engine.scheduler.movie_mode());
    }

    #[test]
    fn shared_frame_round_trips_snapshots() {
        let shared = SharedFrame::new();
        shared.publish(FrameSnapshot {
            frame: 7,
            active_subtitles: 2,
            ..FrameSnapshot::default()
        });
        let snapshot = shared.snapshot();
        assert_eq!(snapshot.frame, 7);
        assert_eq!(snapshot.active_subtitles, 2);
    }
}
