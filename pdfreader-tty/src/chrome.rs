//! Navigation chrome: page field, zoom control, bookmark toggle and drop
//! zone. Everything here only validates input and formats state; mutations
//! go through [`NavigationCommands`].

use std::path::PathBuf;

use pdfreader_core::{NavigationCommands, NavigationState, NO_BOOKMARK};
use tracing::debug;

pub const MIN_ZOOM_PERCENT: i64 = 25;
pub const MAX_ZOOM_PERCENT: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Page,
    Zoom,
}

/// Integer page number, or `None` for anything else (including text the
/// user is still typing).
pub fn parse_page_input(text: &str) -> Option<i64> {
    text.trim().parse().ok()
}

pub fn parse_zoom_percent(text: &str) -> Option<i64> {
    text.trim().trim_end_matches('%').trim_end().parse().ok()
}

pub fn zoom_percent(scale: f32) -> i64 {
    (scale * 100.0).round() as i64
}

#[derive(Debug, Default)]
pub struct PageField {
    editing: Option<String>,
}

impl PageField {
    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    /// Applies every edit immediately; input that is not a page in range
    /// leaves the current page alone.
    pub fn edit(&mut self, text: &str, commands: &mut dyn NavigationCommands) -> bool {
        self.editing = Some(text.to_owned());
        match parse_page_input(text) {
            Some(page) => commands.scroll_to_page(page),
            None => false,
        }
    }

    pub fn finish(&mut self) {
        self.editing = None;
    }

    pub fn display(&self, state: &NavigationState) -> String {
        match &self.editing {
            Some(text) => text.clone(),
            None => state.current_page.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ZoomControl {
    step_percent: i64,
    editing: Option<String>,
}

impl ZoomControl {
    pub fn new(step_percent: u32) -> Self {
        Self {
            step_percent: i64::from(step_percent.max(1)),
            editing: None,
        }
    }

    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    /// `direction` > 0 zooms in by one step, < 0 zooms out.
    pub fn step(&self, direction: i32, commands: &mut dyn NavigationCommands) -> bool {
        let current = zoom_percent(commands.navigation_state().scale);
        let next = current + self.step_percent * i64::from(direction.signum());
        apply_percent(next, commands)
    }

    pub fn edit(&mut self, text: &str, commands: &mut dyn NavigationCommands) -> bool {
        self.editing = Some(text.to_owned());
        match parse_zoom_percent(text) {
            Some(percent) => apply_percent(percent, commands),
            None => false,
        }
    }

    pub fn finish(&mut self) {
        self.editing = None;
    }

    pub fn display(&self, state: &NavigationState) -> String {
        match &self.editing {
            Some(text) => text.clone(),
            None => format!("{}%", zoom_percent(state.scale)),
        }
    }
}

fn apply_percent(percent: i64, commands: &mut dyn NavigationCommands) -> bool {
    if !(MIN_ZOOM_PERCENT..=MAX_ZOOM_PERCENT).contains(&percent) {
        debug!(percent, "zoom outside supported range");
        return false;
    }
    commands.set_scale(percent as f32 / 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookmarkGlyph {
    Filled,
    Outline,
}

impl BookmarkGlyph {
    pub fn symbol(self) -> &'static str {
        match self {
            BookmarkGlyph::Filled => "[*]",
            BookmarkGlyph::Outline => "[ ]",
        }
    }
}

pub fn bookmark_glyph(state: &NavigationState) -> BookmarkGlyph {
    if state.bookmark != NO_BOOKMARK && state.bookmark == state.current_page {
        BookmarkGlyph::Filled
    } else {
        BookmarkGlyph::Outline
    }
}

/// Tracks an in-progress drag so the overlay can be shown while hovering.
///
/// A terminal delivers the whole drag as one paste, so a pasted drop is held
/// here until the frame showing the overlay has been drawn.
#[derive(Debug, Default)]
pub struct DropZone {
    dragging: bool,
    held: Option<Vec<PathBuf>>,
}

impl DropZone {
    pub fn drag_enter(&mut self) {
        self.dragging = true;
    }

    pub fn drag_leave(&mut self) {
        self.dragging = false;
        self.held = None;
    }

    /// Starts a drag carrying `files`. Returns false for an empty paste,
    /// which leaves the zone untouched.
    pub fn paste(&mut self, files: Vec<PathBuf>) -> bool {
        if files.is_empty() {
            return false;
        }
        self.drag_enter();
        self.held = Some(files);
        true
    }

    /// Drops whatever [`Self::paste`] is holding.
    pub fn take_pasted(&mut self) -> Option<Vec<PathBuf>> {
        let files = self.held.take()?;
        self.drop_files(files)
    }

    /// Ends the drag and hands back the dropped files, if any.
    pub fn drop_files(&mut self, files: Vec<PathBuf>) -> Option<Vec<PathBuf>> {
        self.dragging = false;
        if files.is_empty() {
            None
        } else {
            Some(files)
        }
    }

    pub fn overlay_visible(&self) -> bool {
        self.dragging
    }
}

/// Terminals deliver drag-and-drop as pasted text: one path per line,
/// optionally quoted, `file://` prefixed or with backslash-escaped spaces.
pub fn parse_dropped_paths(text: &str) -> Vec<PathBuf> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let line = line
                .strip_prefix('\'')
                .and_then(|l| l.strip_suffix('\''))
                .or_else(|| line.strip_prefix('"').and_then(|l| l.strip_suffix('"')))
                .unwrap_or(line);
            let line = line.strip_prefix("file://").unwrap_or(line);
            PathBuf::from(line.replace("\\ ", " "))
        })
        .collect()
}

pub struct NavBar {
    pub page: PageField,
    pub zoom: ZoomControl,
    pub drop_zone: DropZone,
}

impl NavBar {
    pub fn new(zoom_step_percent: u32) -> Self {
        Self {
            page: PageField::default(),
            zoom: ZoomControl::new(zoom_step_percent),
            drop_zone: DropZone::default(),
        }
    }

    pub fn edit(
        &mut self,
        field: Field,
        text: &str,
        commands: &mut dyn NavigationCommands,
    ) -> bool {
        match field {
            Field::Page => self.page.edit(text, commands),
            Field::Zoom => self.zoom.edit(text, commands),
        }
    }

    pub fn finish_editing(&mut self) {
        self.page.finish();
        self.zoom.finish();
    }

    pub fn status_line(&self, state: &NavigationState) -> String {
        if self.drop_zone.overlay_visible() {
            return "Opening dropped PDF".to_string();
        }
        let title = state.title.as_deref().unwrap_or("No Title");
        format!(
            "{} | page {}/{} | zoom {} | {}",
            title,
            self.page.display(state),
            state.page_count,
            self.zoom.display(state),
            bookmark_glyph(state).symbol()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeCommands {
        state: NavigationState,
        page_calls: Vec<i64>,
    }

    impl FakeCommands {
        fn new(page_count: usize) -> Self {
            Self {
                state: NavigationState {
                    title: None,
                    page_count,
                    current_page: 1,
                    scale: 1.0,
                    bookmark: 0,
                },
                page_calls: Vec::new(),
            }
        }
    }

    impl NavigationCommands for FakeCommands {
        fn navigation_state(&self) -> NavigationState {
            self.state.clone()
        }

        fn scroll_to_page(&mut self, page: i64) -> bool {
            self.page_calls.push(page);
            if page < 1 || page as usize > self.state.page_count {
                return false;
            }
            self.state.current_page = page as usize;
            true
        }

        fn set_scale(&mut self, scale: f32) -> bool {
            if !(0.25..=5.0).contains(&scale) {
                return false;
            }
            self.state.scale = scale;
            true
        }

        fn toggle_bookmark(&mut self) -> bool {
            self.state.bookmark = if self.state.bookmark == self.state.current_page {
                0
            } else {
                self.state.current_page
            };
            true
        }
    }

    #[test]
    fn page_field_ignores_non_numeric_input() {
        let mut commands = FakeCommands::new(50);
        let mut field = PageField::default();

        assert!(field.edit("3", &mut commands));
        assert!(field.edit("37", &mut commands));
        assert!(!field.edit("37x", &mut commands));
        assert!(!field.edit("", &mut commands));
        assert!(!field.edit("4.5", &mut commands));
        assert_eq!(commands.page_calls, vec![3, 37]);
        assert_eq!(commands.state.current_page, 37);
        assert_eq!(field.display(&commands.state), "4.5");

        field.finish();
        assert_eq!(field.display(&commands.state), "37");
    }

    #[test]
    fn page_field_out_of_range_leaves_page() {
        let mut commands = FakeCommands::new(10);
        let mut field = PageField::default();
        assert!(!field.edit("0", &mut commands));
        assert!(!field.edit("11", &mut commands));
        assert_eq!(commands.state.current_page, 1);
    }

    #[test]
    fn zoom_steps_by_ten_points_and_rejects_extremes() {
        let mut commands = FakeCommands::new(1);
        let zoom = ZoomControl::new(10);

        assert!(zoom.step(1, &mut commands));
        assert_eq!(zoom_percent(commands.state.scale), 110);
        assert!(zoom.step(-1, &mut commands));
        assert!(zoom.step(-1, &mut commands));
        assert_eq!(zoom_percent(commands.state.scale), 90);

        commands.state.scale = 0.25;
        assert!(!zoom.step(-1, &mut commands));
        assert_eq!(commands.state.scale, 0.25);
        commands.state.scale = 5.0;
        assert!(!zoom.step(1, &mut commands));
        assert_eq!(commands.state.scale, 5.0);
    }

    #[test]
    fn zoom_entry_accepts_percentages_in_range() {
        let mut commands = FakeCommands::new(1);
        let mut zoom = ZoomControl::new(10);
        assert!(!zoom.edit("600", &mut commands));
        assert_eq!(commands.state.scale, 1.0);
        assert!(!zoom.edit("24", &mut commands));
        assert!(!zoom.edit("abc", &mut commands));
        assert!(zoom.edit("250%", &mut commands));
        assert_eq!(commands.state.scale, 2.5);
        assert_eq!(zoom.display(&commands.state), "250%");
        zoom.finish();
        assert_eq!(zoom.display(&commands.state), "250%");
    }

    #[test]
    fn bookmark_glyph_follows_current_page() {
        let mut commands = FakeCommands::new(20);
        assert_eq!(bookmark_glyph(&commands.state), BookmarkGlyph::Outline);
        commands.toggle_bookmark();
        assert_eq!(bookmark_glyph(&commands.state), BookmarkGlyph::Filled);
        commands.scroll_to_page(5);
        assert_eq!(bookmark_glyph(&commands.state), BookmarkGlyph::Outline);

        let empty = NavigationState {
            title: None,
            page_count: 0,
            current_page: 0,
            scale: 1.0,
            bookmark: 0,
        };
        assert_eq!(bookmark_glyph(&empty), BookmarkGlyph::Outline);
    }

    #[test]
    fn drop_zone_overlay_tracks_drag() {
        let mut zone = DropZone::default();
        zone.drag_enter();
        assert!(zone.overlay_visible());
        zone.drag_leave();
        assert!(!zone.overlay_visible());

        zone.drag_enter();
        assert!(zone.drop_files(Vec::new()).is_none());
        assert!(!zone.overlay_visible());

        zone.drag_enter();
        let files = zone.drop_files(vec![PathBuf::from("/tmp/a.pdf")]).unwrap();
        assert_eq!(files.len(), 1);
        assert!(!zone.overlay_visible());
    }

    #[test]
    fn pasted_drop_shows_overlay_until_taken() {
        let mut zone = DropZone::default();
        assert!(!zone.paste(Vec::new()));
        assert!(!zone.overlay_visible());
        assert!(zone.take_pasted().is_none());

        assert!(zone.paste(vec![PathBuf::from("/tmp/a.pdf"), PathBuf::from("/tmp/b.pdf")]));
        assert!(zone.overlay_visible());
        let files = zone.take_pasted().unwrap();
        assert_eq!(files, vec![PathBuf::from("/tmp/a.pdf"), PathBuf::from("/tmp/b.pdf")]);
        assert!(!zone.overlay_visible());
        assert!(zone.take_pasted().is_none());

        zone.paste(vec![PathBuf::from("/tmp/a.pdf")]);
        zone.drag_leave();
        assert!(!zone.overlay_visible());
        assert!(zone.take_pasted().is_none());
    }

    #[test]
    fn dropped_paths_are_unquoted() {
        let paths = parse_dropped_paths(
            "'/home/me/My Book.pdf'\n\"/tmp/b.pdf\"\nfile:///tmp/c.pdf\n/tmp/with\\ space.pdf\n\n",
        );
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/home/me/My Book.pdf"),
                PathBuf::from("/tmp/b.pdf"),
                PathBuf::from("/tmp/c.pdf"),
                PathBuf::from("/tmp/with space.pdf"),
            ]
        );
        assert!(parse_dropped_paths("  \n").is_empty());
    }

    #[test]
    fn status_line_shows_title_page_zoom_and_bookmark() {
        let mut commands = FakeCommands::new(12);
        commands.state.title = Some("Sample".into());
        commands.state.current_page = 3;
        commands.state.bookmark = 3;
        let mut bar = NavBar::new(10);
        assert_eq!(
            bar.status_line(&commands.state),
            "Sample | page 3/12 | zoom 100% | [*]"
        );

        commands.state.title = None;
        bar.edit(Field::Page, "1", &mut commands);
        assert_eq!(
            bar.status_line(&commands.state),
            "No Title | page 1/12 | zoom 100% | [ ]"
        );

        bar.drop_zone.paste(vec![PathBuf::from("/tmp/a.pdf")]);
        assert_eq!(bar.status_line(&commands.state), "Opening dropped PDF");
    }
}
