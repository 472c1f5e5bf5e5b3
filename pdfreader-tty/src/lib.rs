pub mod chrome;

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{Clear, ClearType},
};
use pdfreader_core::{PageSlice, RenderImage};
use png::{BitDepth, ColorType, Encoder};

use crate::chrome::{parse_dropped_paths, Field};

const BACKGROUND: [u8; 4] = [0x3c, 0x3c, 0x3c, 0xff];

pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
}

pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Transmits `image` as PNG and places it at the cursor, replacing the
    /// previous frame.
    pub fn draw(&mut self, image: &RenderImage, params: DrawParams) -> Result<()> {
        let mut png_bytes = Vec::new();
        let mut encoder = Encoder::new(&mut png_bytes, image.width.max(1), image.height.max(1));
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut png_writer = encoder.write_header()?;
        png_writer.write_image_data(&image.pixels)?;
        png_writer.finish()?;

        let encoded = BASE64.encode(&png_bytes);
        let mut chunks = encoded.as_bytes().chunks(4096).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = u8::from(chunks.peek().is_some());
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p={},c={},r={},z=-1,m={}",
                    self.image_id, self.placement_id, params.columns, params.rows, more
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", more)?;
            }
            self.writer.write_all(b";")?;
            self.writer.write_all(chunk)?;
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// The terminal shows everything buffered since `begin_sync_update` at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

/// Stacks the visible part of each mounted page into one frame of
/// `width` x `height` pixels. Pages narrower than the frame are centered,
/// wider ones are cropped around their center.
pub fn compose_viewport(
    slices: &[(PageSlice, Arc<RenderImage>)],
    width: u32,
    height: u32,
) -> RenderImage {
    let width = width.max(1);
    let height = height.max(1);
    let stride = width as usize * 4;
    let mut pixels = BACKGROUND.repeat(width as usize * height as usize);

    for (slice, image) in slices {
        if image.width == 0 || image.height == 0 {
            continue;
        }
        let src_stride = image.width as usize * 4;
        let (src_x, dst_x, copy_width) = if image.width <= width {
            (0, (width - image.width) / 2, image.width)
        } else {
            ((image.width - width) / 2, 0, width)
        };
        let src_top = slice.source_top.max(0.0).round() as u32;
        let dst_top = slice.viewport_y.max(0.0).round() as u32;
        let rows = slice.height.max(0.0).round() as u32;

        for row in 0..rows {
            let src_y = src_top + row;
            let dst_y = dst_top + row;
            if src_y >= image.height || dst_y >= height {
                break;
            }
            let src = src_y as usize * src_stride + src_x as usize * 4;
            let dst = dst_y as usize * stride + dst_x as usize * 4;
            let len = copy_width as usize * 4;
            pixels[dst..dst + len].copy_from_slice(&image.pixels[src..src + len]);
        }
    }

    RenderImage {
        width,
        height,
        pixels,
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, row: u16, label: &str) -> io::Result<()> {
    crossterm::queue!(
        writer,
        cursor::MoveTo(0, row),
        Clear(ClearType::CurrentLine)
    )?;
    write!(writer, "{}", label)?;
    writer.flush()
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// Scroll by a number of line steps; negative scrolls up.
    ScrollLines { lines: i64 },
    /// Scroll by whole screens; negative scrolls up.
    ScrollScreens { screens: i64 },
    JumpPages { delta: i64 },
    GotoPage { page: i64 },
    FirstPage,
    LastPage,
    BeginEdit { field: Field },
    FieldEdited { field: Field, text: String },
    EndEdit,
    ZoomStep { direction: i32 },
    ToggleBookmark,
    GoToBookmark,
    OpenSample,
    FilesDropped { paths: Vec<PathBuf> },
    Resize,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    PageField,
    ZoomField,
}

#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    field_buffer: String,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    fn set_mode(&mut self, mode: InputMode) {
        self.reset_count();
        self.field_buffer.clear();
        self.mode = mode;
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Paste(text) => {
                let paths = parse_dropped_paths(&text);
                if paths.is_empty() {
                    UiEvent::None
                } else {
                    UiEvent::FilesDropped { paths }
                }
            }
            Event::Resize(..) => UiEvent::Resize,
            Event::Key(key) if key.kind == KeyEventKind::Release => UiEvent::None,
            Event::Key(key) => match self.mode {
                InputMode::Normal => self.map_key_normal(key),
                InputMode::PageField => self.map_key_field(key, Field::Page),
                InputMode::ZoomField => self.map_key_field(key, Field::Zoom),
            },
            _ => UiEvent::None,
        }
    }

    fn map_key_normal(&mut self, key: KeyEvent) -> UiEvent {
        let KeyEvent {
            code, modifiers, ..
        } = key;
        match (code, modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, _) => {
                let lines = self.take_count() as i64;
                UiEvent::ScrollLines { lines }
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, _) => {
                let lines = self.take_count() as i64;
                UiEvent::ScrollLines { lines: -lines }
            }
            (KeyCode::Char(' '), _) | (KeyCode::PageDown, _) => {
                let screens = self.take_count() as i64;
                UiEvent::ScrollScreens { screens }
            }
            (KeyCode::PageUp, _) => {
                let screens = self.take_count() as i64;
                UiEvent::ScrollScreens { screens: -screens }
            }
            (KeyCode::Char('n'), KeyModifiers::NONE) => {
                let delta = self.take_count() as i64;
                UiEvent::JumpPages { delta }
            }
            (KeyCode::Char('p'), KeyModifiers::NONE) => {
                let delta = self.take_count() as i64;
                UiEvent::JumpPages { delta: -delta }
            }
            (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                self.reset_count();
                UiEvent::FirstPage
            }
            (KeyCode::Char('G'), _) | (KeyCode::End, _) => match self.pending_count.take() {
                Some(page) => {
                    self.pending_digits.clear();
                    UiEvent::GotoPage { page: page as i64 }
                }
                None => UiEvent::LastPage,
            },
            (KeyCode::Char(':'), _) => {
                self.set_mode(InputMode::PageField);
                UiEvent::BeginEdit { field: Field::Page }
            }
            (KeyCode::Char('z'), KeyModifiers::NONE) => {
                self.set_mode(InputMode::ZoomField);
                UiEvent::BeginEdit { field: Field::Zoom }
            }
            (KeyCode::Char('+'), _) | (KeyCode::Char('='), _) => {
                self.reset_count();
                UiEvent::ZoomStep { direction: 1 }
            }
            (KeyCode::Char('-'), _) => {
                self.reset_count();
                UiEvent::ZoomStep { direction: -1 }
            }
            (KeyCode::Char('m'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::ToggleBookmark
            }
            (KeyCode::Char('\''), _) => {
                self.reset_count();
                UiEvent::GoToBookmark
            }
            (KeyCode::Char('s'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::OpenSample
            }
            (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                UiEvent::Quit
            }
            (KeyCode::Char('q'), _) => {
                self.reset_count();
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_key_field(&mut self, key: KeyEvent, field: Field) -> UiEvent {
        match (key.code, key.modifiers) {
            (KeyCode::Esc, _) | (KeyCode::Enter, _) => {
                self.set_mode(InputMode::Normal);
                UiEvent::EndEdit
            }
            (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.set_mode(InputMode::Normal);
                UiEvent::EndEdit
            }
            (KeyCode::Backspace, _) => {
                self.field_buffer.pop();
                UiEvent::FieldEdited {
                    field,
                    text: self.field_buffer.clone(),
                }
            }
            (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                self.field_buffer.push(c);
                UiEvent::FieldEdited {
                    field,
                    text: self.field_buffer.clone(),
                }
            }
            _ => UiEvent::None,
        }
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    /// Count prefix typed so far, shown next to the status line.
    pub fn pending_input(&self) -> Option<String> {
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }
}
