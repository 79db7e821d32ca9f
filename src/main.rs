use eframe::egui;
use std::path::{Path, PathBuf};

use diskmap::config::Config;
use diskmap::node::ScanResult;
use diskmap::render::{format_size, HoverTracker, Rgb, SurfaceCache};
use diskmap::worker::ScanWorker;

const SNAPSHOT_FILE: &str = "diskmap-snapshot.json";

struct CliArgs {
    scan_path: Option<String>,
    snapshot: Option<PathBuf>,
}

fn parse_args() -> CliArgs {
    let mut args = std::env::args().skip(1);
    let mut parsed = CliArgs {
        scan_path: None,
        snapshot: None,
    };
    while let Some(arg) = args.next() {
        if arg == "--snapshot" {
            parsed.snapshot = args.next().map(PathBuf::from);
        } else {
            parsed.scan_path = Some(arg);
        }
    }
    parsed
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting diskmap");

    let args = parse_args();
    let config = Config::load_or_default();
    let mut app = DiskMapApp::new(config);

    if let Some(snapshot) = args.snapshot.as_ref() {
        let result = ScanResult::load(snapshot)?;
        tracing::info!("Loaded snapshot {}", snapshot.display());
        app.set_result(result);
    } else if let Some(path) = args.scan_path {
        app.scan_path = path;
        app.start_scan();
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_title("diskmap - Disk Space Treemap"),
        ..Default::default()
    };

    eframe::run_native("diskmap", options, Box::new(|_cc| Box::new(app)))
        .map_err(|e| anyhow::anyhow!("Failed to run window: {}", e))
}

struct DiskMapApp {
    config: Config,
    scan_path: String,
    status: String,
    worker: Option<ScanWorker>,
    scan: Option<ScanResult>,
    /// Bumped whenever `scan` is replaced
    generation: u64,
    surface: SurfaceCache,
    hover: HoverTracker,
    hovered_label: Option<String>,
}

impl DiskMapApp {
    fn new(config: Config) -> Self {
        Self {
            config,
            scan_path: String::from("."),
            status: String::from("Enter a path and press Scan"),
            worker: None,
            scan: None,
            generation: 0,
            surface: SurfaceCache::default(),
            hover: HoverTracker::default(),
            hovered_label: None,
        }
    }

    fn start_scan(&mut self) {
        if self.worker.is_some() {
            return;
        }
        let path = match self.scan_path.trim() {
            "" => ".",
            trimmed => trimmed,
        };
        self.status = format!("Scanning {} ...", path);
        self.worker = Some(ScanWorker::spawn(path, self.config.scan.clone()));
    }

    fn poll_worker(&mut self) {
        let Some(outcome) = self.worker.as_mut().and_then(ScanWorker::poll) else {
            return;
        };
        self.worker = None;
        match outcome {
            Ok(result) => self.set_result(result),
            Err(e) => {
                tracing::error!("Scan failed: {}", e);
                self.status = format!("Scan failed: {}", e);
            }
        }
    }

    fn set_result(&mut self, result: ScanResult) {
        self.status = format!(
            "{} files, {} in {}ms",
            result.file_count,
            format_size(result.total_size),
            result.scan_time_ms
        );
        self.scan = Some(result);
        self.generation += 1;
    }

    fn save_snapshot(&mut self) {
        let Some(scan) = self.scan.as_ref() else {
            return;
        };
        self.status = match scan.save(Path::new(SNAPSHOT_FILE)) {
            Ok(()) => format!("Saved {}", SNAPSHOT_FILE),
            Err(e) => {
                tracing::error!("Failed to save snapshot: {}", e);
                format!("Snapshot failed: {}", e)
            }
        };
    }

    fn draw_treemap(&mut self, ui: &mut egui::Ui) {
        let container = ui.available_rect_before_wrap();
        ui.allocate_rect(container, egui::Sense::hover());

        let Some(scan) = self.scan.as_ref() else {
            ui.painter().text(
                container.center(),
                egui::Align2::CENTER_CENTER,
                "No treemap yet",
                egui::FontId::proportional(16.0),
                egui::Color32::GRAY,
            );
            return;
        };

        let relaid = self.surface.refresh(
            &scan.root,
            self.generation,
            container.width() as f64,
            container.height() as f64,
            &self.config.layout,
        );
        if relaid {
            tracing::debug!(
                "Relayout at {}x{} (generation {})",
                container.width(),
                container.height(),
                self.generation
            );
            self.hover.reset();
            self.hovered_label = None;
        }
        let surface = self.surface.surface();

        let hovered_label = &mut self.hovered_label;
        match ui.input(|i| i.pointer.hover_pos()) {
            Some(pos) => {
                let local = pos - container.min;
                self.hover
                    .pointer_moved(surface, local.x as f64, local.y as f64, |node| {
                        *hovered_label = node.map(|n| {
                            format!("{}  {}", n.path, format_size(n.weight() as u64))
                        });
                    });
            }
            None => {
                if self.hover.hovered().is_some() {
                    self.hover.pointer_leave(|_| *hovered_label = None);
                }
            }
        }

        let painter = ui.painter().with_clip_rect(container);
        for tile in surface.tiles() {
            let rect = egui::Rect::from_min_size(
                container.min + egui::vec2(tile.rect.x as f32, tile.rect.y as f32),
                egui::vec2(tile.rect.width as f32, tile.rect.height as f32),
            );
            let is_hovered = self.hover.hovered() == Some(tile.node.path.as_str());

            painter.rect_filled(rect, 0.0, to_color32(tile.color, is_hovered));
            painter.rect_stroke(
                rect,
                0.0,
                egui::Stroke::new(1.0, egui::Color32::from_rgba_unmultiplied(0, 0, 0, 90)),
            );

            if let Some(label) = tile.label.as_ref() {
                painter
                    .with_clip_rect(rect)
                    .text(
                        rect.left_top() + egui::vec2(4.0, 4.0),
                        egui::Align2::LEFT_TOP,
                        label,
                        egui::FontId::proportional(12.0),
                        egui::Color32::WHITE,
                    );
            }
        }
    }
}

fn to_color32(color: Rgb, highlighted: bool) -> egui::Color32 {
    let Rgb(r, g, b) = color;
    if highlighted {
        let lift = |c: u8| (c as f32 * 1.25).min(255.0) as u8;
        egui::Color32::from_rgb(lift(r), lift(g), lift(b))
    } else {
        egui::Color32::from_rgb(r, g, b)
    }
}

impl eframe::App for DiskMapApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_worker();

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("diskmap");
                ui.separator();

                ui.label("Path:");
                let input = ui.text_edit_singleline(&mut self.scan_path);
                let submitted = input.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

                if ui.button("Scan").clicked() || submitted {
                    self.start_scan();
                }

                if self.scan.is_some() && ui.button("Save snapshot").clicked() {
                    self.save_snapshot();
                }

                if let Some(worker) = self.worker.as_ref() {
                    ui.spinner();
                    if let Some(progress) = worker.progress() {
                        ui.label(progress.summary());
                    }
                }
            });
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            let text = self.hovered_label.as_deref().unwrap_or(self.status.as_str());
            ui.label(text);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.draw_treemap(ui);
        });

        if self.worker.is_some() {
            ctx.request_repaint();
        }
    }
}
