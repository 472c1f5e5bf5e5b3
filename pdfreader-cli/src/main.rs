use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, DisableBracketedPaste, EnableBracketedPaste};
use crossterm::terminal;
use pdfreader_core::{
    is_valid_scale, BookmarkStore, DocumentSession, DocumentSource, FileKeyValueStore,
    KeyValueStore, NavigationCommands, OpenOutcome, SessionEvent, ViewerConfig, ViewerPaths,
};
use pdfreader_render::PdfiumEngine;
use pdfreader_tty::chrome::NavBar;
use pdfreader_tty::{
    compose_viewport, write_status_line, DrawParams, EventMapper, KittyRenderer, UiEvent,
};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Pixels scrolled per `j`/`k` press.
const LINE_STEP: f32 = 48.0;
/// Share of the screen kept visible when paging.
const SCREEN_STEP: f32 = 0.9;
const FALLBACK_CELL: (u32, u32) = (10, 20);

#[derive(Debug, Parser)]
#[command(
    name = "pdfreader",
    version,
    about = "Continuous-scroll PDF viewer for kitty-compatible terminals"
)]
struct Args {
    /// PDF to open; the configured sample is opened when omitted
    file: Option<PathBuf>,

    /// Config file to use instead of the per-user one
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Initial zoom factor (0.25 to 5.0)
    #[arg(short = 's', long = "scale")]
    scale: Option<f32>,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, DisableBracketedPaste, cursor::Show);
    }
}

/// Terminal geometry: the page frame fills every row but the last.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Screen {
    columns: u32,
    image_rows: u32,
    status_row: u16,
    frame_width: u32,
    frame_height: u32,
}

impl Screen {
    fn query() -> Result<Self> {
        let window = terminal::window_size()?;
        let columns = u32::from(window.columns).max(1);
        let rows = u32::from(window.rows).max(2);
        let (cell_width, cell_height) = if window.width > 0 && window.height > 0 {
            (
                u32::from(window.width) / columns,
                u32::from(window.height) / rows,
            )
        } else {
            FALLBACK_CELL
        };
        let image_rows = rows - 1;
        Ok(Self {
            columns,
            image_rows,
            status_row: window.rows.saturating_sub(1),
            frame_width: (cell_width * columns).max(1),
            frame_height: (cell_height * image_rows).max(1),
        })
    }
}

enum LoopAction {
    Continue,
    Redraw,
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let paths = ViewerPaths::discover()?;
    let _log_guard = init_logging(&paths.log_dir)?;

    let config_file = args
        .config
        .clone()
        .unwrap_or_else(|| paths.config_file.clone());
    let mut config = ViewerConfig::load(&config_file)
        .with_context(|| format!("failed to load config {:?}", config_file))?;
    if let Some(scale) = args.scale {
        if !is_valid_scale(scale) {
            return Err(anyhow!("scale {} is outside 0.25..=5.0", scale));
        }
        config.initial_scale = scale;
    }
    config.validate()?;

    let store: Arc<dyn KeyValueStore> = Arc::new(FileKeyValueStore::open(paths.bookmarks_file)?);
    let engine = Arc::new(PdfiumEngine::new()?);
    let mut session = DocumentSession::new(engine, BookmarkStore::new(store), &config);
    let mut navbar = NavBar::new(config.zoom_step_percent);

    let outcome = match args.file {
        Some(file) => session.open(DocumentSource::Path(file)).await,
        None => session.open_sample().await,
    };
    let mut notice = describe(&outcome);

    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide, EnableBracketedPaste)?;
    let mut renderer = KittyRenderer::new(stdout);
    renderer.clear_all()?;
    let mut event_mapper = EventMapper::new();
    let mut dirty = true;

    loop {
        if session.pump_metrics() > 0 {
            dirty = true;
        }
        let screen = Screen::query()?;
        if session
            .viewport_mut()
            .set_viewport(screen.frame_width as f32, screen.frame_height as f32)
        {
            dirty = true;
        }
        for event in session.take_events() {
            if let SessionEvent::LoadFailed(message) = &event {
                notice = Some(message.clone());
            }
            dirty = true;
        }

        if dirty {
            let status = status_text(&session, &navbar, &event_mapper, notice.as_deref());
            redraw(&mut renderer, &session, screen, &status)?;
            dirty = false;
            if let Some(page) = session.viewport_mut().commit_layout() {
                debug!(page, "held navigation issued after redraw");
                dirty = true;
            }
        }
        if session.viewport_mut().sync_visibility().is_some() {
            dirty = true;
        }
        if let Some(files) = navbar.drop_zone.take_pasted() {
            let sources = files.into_iter().map(DocumentSource::Path).collect();
            if let Some(outcome) = session.drop_files(sources).await {
                notice = describe(&outcome);
            }
            dirty = true;
        }

        if event::poll(Duration::from_millis(50))? {
            let ui_event = event_mapper.map_event(event::read()?);
            if !matches!(ui_event, UiEvent::None | UiEvent::Resize) {
                notice = None;
            }
            match handle_event(ui_event, &mut session, &mut navbar, screen, &mut notice).await? {
                LoopAction::Redraw => dirty = true,
                LoopAction::Continue => {}
                LoopAction::Quit => break,
            }
        }
    }

    renderer.clear_all()?;
    Ok(())
}

async fn handle_event(
    ui_event: UiEvent,
    session: &mut DocumentSession,
    navbar: &mut NavBar,
    screen: Screen,
    notice: &mut Option<String>,
) -> Result<LoopAction> {
    let changed = match ui_event {
        UiEvent::ScrollLines { lines } => session.viewport_mut().scroll_by(lines as f32 * LINE_STEP),
        UiEvent::ScrollScreens { screens } => session
            .viewport_mut()
            .scroll_by(screens as f32 * screen.frame_height as f32 * SCREEN_STEP),
        UiEvent::JumpPages { delta } => {
            let current = session.viewport().current_page() as i64;
            let last = session.viewport().page_count() as i64;
            session.scroll_to_page((current + delta).clamp(1, last.max(1)))
        }
        UiEvent::GotoPage { page } => session.scroll_to_page(page),
        UiEvent::FirstPage => session.scroll_to_page(1),
        UiEvent::LastPage => {
            let last = session.viewport().page_count() as i64;
            session.scroll_to_page(last)
        }
        UiEvent::BeginEdit { .. } => true,
        UiEvent::FieldEdited { field, text } => {
            navbar.edit(field, &text, session);
            true
        }
        UiEvent::EndEdit => {
            navbar.finish_editing();
            true
        }
        UiEvent::ZoomStep { direction } => navbar.zoom.step(direction, session),
        UiEvent::ToggleBookmark => session.toggle_bookmark(),
        UiEvent::GoToBookmark => session.go_to_bookmark(),
        UiEvent::OpenSample => {
            let outcome = session.open_sample().await;
            *notice = describe(&outcome);
            true
        }
        // opened by the main loop once the overlay frame is on screen
        UiEvent::FilesDropped { paths } => navbar.drop_zone.paste(paths),
        UiEvent::Resize => true,
        UiEvent::Quit => return Ok(LoopAction::Quit),
        UiEvent::None => false,
    };
    Ok(if changed {
        LoopAction::Redraw
    } else {
        LoopAction::Continue
    })
}

fn describe(outcome: &OpenOutcome) -> Option<String> {
    match outcome {
        OpenOutcome::Loaded {
            fingerprint,
            page_count,
            bookmark,
        } => {
            info!(%fingerprint, page_count, bookmark, "document opened");
            None
        }
        OpenOutcome::Failed { message } => Some(message.clone()),
    }
}

fn status_text(
    session: &DocumentSession,
    navbar: &NavBar,
    mapper: &EventMapper,
    notice: Option<&str>,
) -> String {
    let mut status = if session.has_document() || navbar.drop_zone.overlay_visible() {
        navbar.status_line(&session.navigation_state())
    } else {
        "No document. Paste a PDF path to open it, s opens the sample".to_string()
    };
    if let Some(pending) = mapper.pending_input() {
        status.push_str(" | ");
        status.push_str(&pending);
    }
    if let Some(notice) = notice {
        status.push_str(" | ");
        status.push_str(notice);
    }
    status
}

fn redraw(
    renderer: &mut KittyRenderer<io::Stdout>,
    session: &DocumentSession,
    screen: Screen,
    status: &str,
) -> Result<()> {
    renderer.begin_sync_update()?;
    let slices = session.viewport().visible_slices();
    if slices.is_empty() {
        renderer.clear_all()?;
    } else {
        let mut pages = Vec::with_capacity(slices.len());
        for slice in slices {
            match session.render_page(slice.page) {
                Ok(image) => pages.push((slice, image)),
                Err(err) => warn!(page = slice.page, ?err, "failed to render page"),
            }
        }
        let frame = compose_viewport(&pages, screen.frame_width, screen.frame_height);
        {
            let writer = renderer.writer();
            crossterm::queue!(writer, cursor::MoveTo(0, 0))?;
        }
        renderer.draw(
            &frame,
            DrawParams::clamped(screen.columns, screen.image_rows),
        )?;
    }
    write_status_line(renderer.writer(), screen.status_row, status)?;
    renderer.end_sync_update()?;
    prerender_overscan(session);
    Ok(())
}

/// Warms the render cache for mounted pages just outside the screen.
fn prerender_overscan(session: &DocumentSession) {
    let viewport = session.viewport();
    let (Some(mounted), Some(visible)) = (viewport.mounted_pages(), viewport.visible_range())
    else {
        return;
    };
    for page in mounted.filter(|page| !visible.contains(page)) {
        if let Err(err) = session.render_page(page) {
            debug!(page, ?err, "overscan render failed");
        }
    }
}

fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "pdfreader.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // the terminal belongs to the viewer, so only the file receives events
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
