use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use eframe::egui;

use crate::app::{EngineCommand, EngineHandle, SharedFrame};
use crate::scheduler::{DebugState, DrawLine, LayoutConfig};

/// Fraction of a row the glyphs occupy.
const GLYPH_FILL: f32 = 0.8;

pub fn run_overlay(engine: &EngineHandle, layout: LayoutConfig) -> anyhow::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Captions")
            .with_always_on_top()
            .with_transparent(true)
            .with_decorations(false)
            .with_resizable(true)
            .with_inner_size([layout.screen_width * 0.75, layout.screen_height * 0.75]),
        ..Default::default()
    };

    let app = OverlayApp {
        frame: engine.frame.clone(),
        commands: engine.commands.clone(),
        reports: engine.reports.clone(),
        stop: engine.stop.clone(),
        layout,
        last_report: String::new(),
        show_controls: true,
    };

    eframe::run_native("Captions", options, Box::new(|_cc| Ok(Box::new(app))))
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(())
}

struct OverlayApp {
    frame: SharedFrame,
    commands: Sender<EngineCommand>,
    reports: Receiver<String>,
    stop: Arc<AtomicBool>,
    layout: LayoutConfig,
    last_report: String,
    show_controls: bool,
}

impl eframe::App for OverlayApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.stop.load(Ordering::Relaxed) || ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.stop.store(true, Ordering::Relaxed);
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            return;
        }

        let snapshot = self.frame.snapshot();
        self.handle_keys(ctx, snapshot.debug);

        if ctx.input(|i| {
            i.pointer.primary_pressed() && (!self.show_controls || i.modifiers.alt)
        }) {
            ctx.send_viewport_cmd(egui::ViewportCommand::StartDrag);
        }

        for report in self.reports.try_iter() {
            tracing::info!("{report}");
            self.last_report = report;
        }

        ctx.request_repaint_after(Duration::from_millis(16));

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(egui::Color32::TRANSPARENT))
            .show(ctx, |ui| {
                if self.show_controls {
                    egui::TopBottomPanel::top("controls")
                        .frame(
                            egui::Frame::none()
                                .fill(egui::Color32::from_rgba_unmultiplied(0, 0, 0, 120))
                                .inner_margin(egui::Margin::symmetric(10.0, 6.0)),
                        )
                        .show_inside(ui, |ui| {
                            ui.horizontal(|ui| {
                                ui.label(format!(
                                    "{:.2}s • {} active • message {} • minimap {} • {}",
                                    snapshot.clock,
                                    snapshot.active_subtitles,
                                    on_off(snapshot.flags.have_message),
                                    on_off(snapshot.flags.have_minimap),
                                    debug_label(snapshot.debug),
                                ));
                                ui.with_layout(
                                    egui::Layout::right_to_left(egui::Align::Center),
                                    |ui| {
                                        ui.label(
                                            "M/N: message/minimap • D: debug • Q/P: print • S: controls • Esc: quit",
                                        );
                                    },
                                );
                            });
                            if let Some(first) = self.last_report.lines().next() {
                                ui.label(first);
                            }
                        });
                }

                let rect = ui.available_rect_before_wrap();
                let painter = ui.painter_at(rect);
                let sx = rect.width() / self.layout.screen_width.max(1.0);
                let sy = rect.height() / self.layout.screen_height.max(1.0);
                for line in &snapshot.lines {
                    paint_line(&painter, rect, sx, sy, line);
                }
            });
    }
}

impl OverlayApp {
    fn send(&self, command: EngineCommand) {
        if self.commands.try_send(command).is_err() {
            tracing::warn!("command queue full; dropping command");
        }
    }

    fn handle_keys(&mut self, ctx: &egui::Context, debug: DebugState) {
        let pressed = |key| ctx.input(|i| i.key_pressed(key));

        if pressed(egui::Key::S) {
            self.show_controls = !self.show_controls;
        }
        if pressed(egui::Key::M) {
            self.send(EngineCommand::ToggleMessage);
        }
        if pressed(egui::Key::N) {
            self.send(EngineCommand::ToggleMinimap);
        }
        if pressed(egui::Key::Q) {
            self.send(EngineCommand::PrintQueue);
        }
        if pressed(egui::Key::P) {
            self.send(EngineCommand::PrintSpeakers);
        }
        if pressed(egui::Key::R) {
            self.send(EngineCommand::ReloadBank);
        }
        if pressed(egui::Key::D) {
            self.send(if debug.is_active() {
                EngineCommand::ExitDebug
            } else {
                EngineCommand::EnterDebug
            });
        }

        match debug {
            DebugState::Idle => {}
            DebugState::Debug { .. } => {
                if pressed(egui::Key::ArrowLeft) {
                    self.send(EngineCommand::StepScene(-1));
                }
                if pressed(egui::Key::ArrowRight) {
                    self.send(EngineCommand::StepScene(1));
                }
                if pressed(egui::Key::L) {
                    self.send(EngineCommand::CheckLines);
                }
            }
            DebugState::CheckingLines { .. } => {
                if pressed(egui::Key::ArrowLeft) {
                    self.send(EngineCommand::StepLine(-1));
                }
                if pressed(egui::Key::ArrowRight) {
                    self.send(EngineCommand::StepLine(1));
                }
                if pressed(egui::Key::B) {
                    self.send(EngineCommand::LeaveLines);
                }
            }
        }
    }
}

/// Paints one caption line, mapping virtual screen coordinates onto `rect`.
fn paint_line(painter: &egui::Painter, rect: egui::Rect, sx: f32, sy: f32, line: &DrawLine) {
    let c = line.color;
    let fg = egui::Color32::from_rgba_unmultiplied(c.r, c.g, c.b, c.a);
    let shadow_color = egui::Color32::from_rgba_unmultiplied(0, 0, 0, 170);
    let font = egui::FontId::proportional((line.row_height * GLYPH_FILL * sy).max(1.0));

    for (n, row) in line.rows.iter().enumerate() {
        let galley = painter.layout_no_wrap(row.clone(), font.clone(), fg);
        let top = egui::pos2(
            rect.left() + line.x * sx,
            rect.top() + (line.y + n as f32 * line.row_height) * sy,
        );
        let galley_rect = egui::Align2::CENTER_TOP.anchor_size(top, galley.size());

        for (dx, dy) in [(-2.0, 0.0), (2.0, 0.0), (0.0, -2.0), (0.0, 2.0)] {
            painter.galley_with_override_text_color(
                galley_rect.min + egui::vec2(dx, dy),
                galley.clone(),
                shadow_color,
            );
        }
        painter.galley(galley_rect.min, galley, fg);
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn debug_label(debug: DebugState) -> String {
    match debug {
        DebugState::Idle => "live".to_string(),
        DebugState::Debug { scene } => format!("debug: scene {scene} (←/→, L)"),
        DebugState::CheckingLines { scene, line } => {
            format!("debug: scene {scene} line {line} (←/→, B)")
        }
    }
}
