use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers,
    MouseButton, MouseEvent, MouseEventKind,
};
use ratatui::buffer::Buffer;
use ratatui::layout::{Constraint, Layout, Position, Rect as UiRect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Widget};
use ratatui::{DefaultTerminal, Frame};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use diskmap::config::Config;
use diskmap::node::{ScanResult, TreemapNode};
use diskmap::render::{format_size, HoverTracker, Rgb, SurfaceCache, Tile};
use diskmap::treemap::Rect;
use diskmap::worker::ScanWorker;

/// Virtual pixels per terminal cell, so the pixel budgets of the layout
/// keep roughly the same meaning as in the desktop viewer.
const CELL_WIDTH_PX: f64 = 8.0;
const CELL_HEIGHT_PX: f64 = 16.0;

/// Rows taken by the bordered path box at the top
const PATH_ROWS: u16 = 3;

const SNAPSHOT_FILE: &str = "diskmap-snapshot.json";
const KEY_HINTS: &str = "/ edit  r rescan  w save  q quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    EditPath,
    Browse,
}

struct App {
    config: Config,
    mode: Mode,
    path: String,
    status: String,
    worker: Option<ScanWorker>,
    scan: Option<ScanResult>,
    generation: u64,
    surface: SurfaceCache,
    hover: HoverTracker,
    /// Status-line text for the hovered node
    hover_text: Option<String>,
    /// Where the treemap was drawn last frame
    map_area: UiRect,
    quit: bool,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            mode: Mode::EditPath,
            path: String::from("."),
            status: String::from("Type a path and press Enter"),
            worker: None,
            scan: None,
            generation: 0,
            surface: SurfaceCache::default(),
            hover: HoverTracker::default(),
            hover_text: None,
            map_area: UiRect::default(),
            quit: false,
        }
    }

    fn start_scan(&mut self) {
        if self.worker.is_some() {
            return;
        }
        let trimmed = self.path.trim();
        self.path = if trimmed.is_empty() {
            ".".to_string()
        } else {
            trimmed.to_string()
        };
        self.status = format!("Scanning {} ...", self.path);
        self.worker = Some(ScanWorker::spawn(&self.path, self.config.scan.clone()));
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
            result.scan_time_ms,
        );
        self.path = result.root.path.clone();
        self.scan = Some(result);
        self.generation += 1;
    }

    fn save_snapshot(&mut self) {
        let Some(scan) = self.scan.as_ref() else {
            self.status = "Nothing to save yet".to_string();
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

    fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit = true;
            return;
        }

        match (self.mode, key.code) {
            (Mode::EditPath, KeyCode::Enter) => {
                self.mode = Mode::Browse;
                self.start_scan();
            }
            (Mode::EditPath, KeyCode::Esc) => self.mode = Mode::Browse,
            (Mode::EditPath, KeyCode::Backspace) => {
                self.path.pop();
            }
            (Mode::EditPath, KeyCode::Char(ch)) => self.path.push(ch),
            (Mode::Browse, KeyCode::Char('q')) => self.quit = true,
            (Mode::Browse, KeyCode::Char('/')) => self.mode = Mode::EditPath,
            (Mode::Browse, KeyCode::Char('r')) => self.start_scan(),
            (Mode::Browse, KeyCode::Char('w')) => self.save_snapshot(),
            _ => {}
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        let cell = Position::new(mouse.column, mouse.row);
        match mouse.kind {
            MouseEventKind::Moved => self.pointer_at(cell),
            MouseEventKind::Down(MouseButton::Left) if cell.y < PATH_ROWS => {
                self.mode = Mode::EditPath
            }
            _ => {}
        }
    }

    /// Hover against the surface drawn last frame.
    fn pointer_at(&mut self, cell: Position) {
        let hover_text = &mut self.hover_text;
        let observer = |node: Option<&TreemapNode>| *hover_text = node.map(describe);

        if !self.map_area.contains(cell) {
            if self.hover.hovered().is_some() {
                self.hover.pointer_leave(observer);
            }
            return;
        }

        let x = (cell.x - self.map_area.x) as f64 * CELL_WIDTH_PX + CELL_WIDTH_PX / 2.0;
        let y = (cell.y - self.map_area.y) as f64 * CELL_HEIGHT_PX + CELL_HEIGHT_PX / 2.0;
        self.hover.pointer_moved(self.surface.surface(), x, y, observer);
    }

    /// Relayout when the tree or the drawing area changed.
    fn refresh_surface(&mut self, area: UiRect) {
        self.map_area = area;
        let Some(scan) = self.scan.as_ref() else {
            return;
        };
        let width = area.width as f64 * CELL_WIDTH_PX;
        let height = area.height as f64 * CELL_HEIGHT_PX;
        if self
            .surface
            .refresh(&scan.root, self.generation, width, height, &self.config.layout)
        {
            tracing::debug!("Relayout at {}x{} cells", area.width, area.height);
            self.hover.reset();
            self.hover_text = None;
        }
    }

    fn status_line(&self) -> Line<'static> {
        let text = match (&self.hover_text, &self.worker) {
            (Some(hovered), _) => hovered.clone(),
            (None, Some(worker)) => worker
                .progress()
                .map(|p| p.summary())
                .unwrap_or_else(|| self.status.clone()),
            (None, None) => self.status.clone(),
        };
        Line::from(vec![
            Span::raw(text),
            Span::raw("  "),
            Span::styled(KEY_HINTS, Style::default().fg(Color::DarkGray)),
        ])
    }
}

fn describe(node: &TreemapNode) -> String {
    let kind = if node.is_dir { "dir " } else { "file" };
    format!("{} {}  {}", kind, node.path, format_size(node.weight() as u64))
}

fn to_color(color: Rgb) -> Color {
    let Rgb(r, g, b) = color;
    Color::Rgb(r, g, b)
}

/// Cell bounds (inclusive) of a pixel rectangle inside `area`.
fn tile_bounds_in_area(rect: &Rect, area: UiRect) -> Option<(u16, u16, u16, u16)> {
    if area.is_empty() {
        return None;
    }

    let to_cells = |px: f64, cell: f64| (px / cell).round().max(0.0) as u16;
    let (col0, col1) = (to_cells(rect.x, CELL_WIDTH_PX), to_cells(rect.right(), CELL_WIDTH_PX));
    let (row0, row1) = (to_cells(rect.y, CELL_HEIGHT_PX), to_cells(rect.bottom(), CELL_HEIGHT_PX));

    // Rounded to nothing: too small to show in cells
    if col1 <= col0 || row1 <= row0 {
        return None;
    }

    let max_x = area.right() - 1;
    let max_y = area.bottom() - 1;
    Some((
        area.x.saturating_add(col0).min(max_x),
        area.y.saturating_add(row0).min(max_y),
        area.x.saturating_add(col1 - 1).min(max_x),
        area.y.saturating_add(row1 - 1).min(max_y),
    ))
}

struct TreemapWidget<'a> {
    tiles: &'a [Tile],
    hovered: Option<&'a str>,
}

impl Widget for TreemapWidget<'_> {
    fn render(self, area: UiRect, buf: &mut Buffer) {
        buf.set_style(area, Style::default().bg(Color::Rgb(18, 18, 20)));

        for tile in self.tiles {
            let Some((x0, y0, x1, y1)) = tile_bounds_in_area(&tile.rect, area) else {
                continue;
            };

            let bg = to_color(tile.color);
            let edge = if self.hovered == Some(tile.node.path.as_str()) {
                Color::Rgb(246, 211, 101)
            } else {
                Color::Rgb(30, 30, 34)
            };
            let fill = UiRect::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1);
            buf.set_style(fill, Style::default().bg(bg).fg(Color::White));

            // Right and bottom edges separate neighbours
            if x1 > x0 && y1 > y0 {
                for x in x0..=x1 {
                    buf[(x, y1)].set_char('▁').set_fg(edge);
                }
                for y in y0..=y1 {
                    buf[(x1, y)].set_char('▕').set_fg(edge);
                }
            }

            if let Some(label) = tile.label.as_deref() {
                let shown: String = label.chars().take((x1 - x0) as usize).collect();
                buf.set_string(
                    x0,
                    y0,
                    shown,
                    Style::default().fg(Color::White).bg(bg).add_modifier(Modifier::BOLD),
                );
            }
        }
    }
}

fn draw(frame: &mut Frame, app: &mut App) {
    let [path_row, map_row, status_row] = Layout::vertical([
        Constraint::Length(PATH_ROWS),
        Constraint::Min(3),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    let (title, path_style) = match app.mode {
        Mode::EditPath => (" Path (editing) ", Style::default().fg(Color::Yellow)),
        Mode::Browse => (" Path ", Style::default()),
    };
    frame.render_widget(
        Paragraph::new(app.path.as_str())
            .style(path_style)
            .block(Block::default().title(title).borders(Borders::ALL)),
        path_row,
    );

    let map_block = Block::default().title(" diskmap ").borders(Borders::ALL);
    let map_area = map_block.inner(map_row);
    frame.render_widget(map_block, map_row);
    app.refresh_surface(map_area);

    if app.scan.is_some() {
        frame.render_widget(
            TreemapWidget {
                tiles: app.surface.surface().tiles(),
                hovered: app.hover.hovered(),
            },
            map_area,
        );
    } else {
        frame.render_widget(
            Paragraph::new("No treemap yet").style(Style::default().fg(Color::Gray)),
            map_area,
        );
    }

    frame.render_widget(Paragraph::new(app.status_line()), status_row);
}

fn run(terminal: &mut DefaultTerminal, mut app: App) -> anyhow::Result<()> {
    while !app.quit {
        app.poll_worker();
        terminal.draw(|frame| draw(frame, &mut app))?;

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        match event::read()? {
            Event::Key(key) => app.handle_key(key),
            Event::Mouse(mouse) => app.handle_mouse(mouse),
            // The next draw sees the new area and relayouts
            Event::Resize(columns, rows) => {
                tracing::debug!("Terminal resized to {}x{}", columns, rows);
            }
            _ => {}
        }
    }
    Ok(())
}

/// Log to the file named by `DISKMAP_LOG`; stdout belongs to the UI.
fn init_logging() -> anyhow::Result<()> {
    let Some(log_path) = std::env::var_os("DISKMAP_LOG").map(PathBuf::from) else {
        return Ok(());
    };
    let file = std::fs::File::create(&log_path)?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_logging()?;

    let mut app = App::new(Config::load_or_default());
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        app.mode = Mode::Browse;
        if arg == "--snapshot" {
            let Some(file) = args.next() else {
                anyhow::bail!("--snapshot needs a file argument");
            };
            app.set_result(ScanResult::load(Path::new(&file))?);
        } else {
            app.path = arg;
            app.start_scan();
        }
    }

    let mut terminal = ratatui::init();
    crossterm::execute!(std::io::stdout(), EnableMouseCapture)?;
    let outcome = run(&mut terminal, app);
    crossterm::execute!(std::io::stdout(), DisableMouseCapture)?;
    ratatui::restore();
    outcome
}
