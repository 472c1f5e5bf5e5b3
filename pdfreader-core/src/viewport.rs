//! Virtualized scroll window over a document's pages.
//!
//! Pages are stacked vertically with a fixed gap. Only the pages around the
//! visible range are mounted. Current Page has exactly two writers here:
//! [`ViewportController::scroll_to_page`] (a command, which also moves the
//! scroll offset) and [`ViewportController::on_page_became_visible`] (a
//! report, which never scrolls).
//!
//! Every relayout (new scale, newly measured heights, viewport resize)
//! re-anchors the scroll offset on Current Page, so the reader stays on the
//! same page no matter in which order measurements arrive.

use std::ops::RangeInclusive;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tracing::debug;

use crate::engine::PageIndex;
use crate::metrics::{
    MetricsPlan, MetricsUpdate, MetricsWrite, PageMetricsCache, FALLBACK_PAGE_HEIGHT,
};
use crate::visibility::{intersection_ratio, PageVisibility, DEFAULT_VISIBILITY_THRESHOLD};

pub const MIN_SCALE: f32 = 0.25;
pub const MAX_SCALE: f32 = 5.0;

const SCROLL_EPSILON: f32 = 0.5;

pub fn is_valid_scale(scale: f32) -> bool {
    scale.is_finite() && (MIN_SCALE..=MAX_SCALE).contains(&scale)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollAlign {
    #[default]
    Start,
    Center,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportPhase {
    Unloaded,
    Loading,
    Ready,
    Rescaling,
    Navigating,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportOptions {
    pub page_gap: f32,
    pub overscan: usize,
    pub visibility_threshold: f32,
}

impl Default for ViewportOptions {
    fn default() -> Self {
        Self {
            page_gap: 16.0,
            overscan: 1,
            visibility_threshold: DEFAULT_VISIBILITY_THRESHOLD,
        }
    }
}

/// Visible part of one page: rows `[source_top, source_top + height)` of the
/// page land at `viewport_y` in the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSlice {
    pub page: PageIndex,
    pub source_top: f32,
    pub height: f32,
    pub viewport_y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Unloaded,
    Loading,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingScroll {
    page: PageIndex,
    align: ScrollAlign,
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    page: PageIndex,
    fraction: f32,
}

pub struct ViewportController {
    options: ViewportOptions,
    lifecycle: Lifecycle,
    rescaling: bool,
    page_count: usize,
    scale: f32,
    metrics: PageMetricsCache,
    tops: Vec<f32>,
    total_height: f32,
    layout_epoch: u64,
    committed_epoch: Option<u64>,
    scroll_offset: f32,
    viewport_width: f32,
    viewport_height: f32,
    current_page: PageIndex,
    pending: Option<PendingScroll>,
    // set whenever the offset moves for any reason but a user scroll; the next
    // visibility sync only re-arms trackers while Current Page stays on screen
    settling: bool,
    visibility: PageVisibility,
}

impl ViewportController {
    pub fn new(options: ViewportOptions, scale: f32) -> Self {
        Self {
            options,
            lifecycle: Lifecycle::Unloaded,
            rescaling: false,
            page_count: 0,
            scale: if is_valid_scale(scale) { scale } else { 1.0 },
            metrics: PageMetricsCache::new(),
            tops: Vec::new(),
            total_height: 0.0,
            layout_epoch: 0,
            committed_epoch: None,
            scroll_offset: 0.0,
            viewport_width: 0.0,
            viewport_height: 0.0,
            current_page: 0,
            pending: None,
            settling: false,
            visibility: PageVisibility::new(options.visibility_threshold),
        }
    }

    pub fn phase(&self) -> ViewportPhase {
        match self.lifecycle {
            Lifecycle::Unloaded => ViewportPhase::Unloaded,
            Lifecycle::Loading => ViewportPhase::Loading,
            Lifecycle::Ready if self.pending.is_some() => ViewportPhase::Navigating,
            Lifecycle::Ready if self.rescaling => ViewportPhase::Rescaling,
            Lifecycle::Ready => ViewportPhase::Ready,
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// `0` while no document is ready.
    pub fn current_page(&self) -> PageIndex {
        self.current_page
    }

    pub fn pending_page(&self) -> Option<PageIndex> {
        self.pending.map(|pending| pending.page)
    }

    pub fn scroll_offset(&self) -> f32 {
        self.scroll_offset
    }

    pub fn total_height(&self) -> f32 {
        self.total_height
    }

    pub fn viewport_size(&self) -> (f32, f32) {
        (self.viewport_width, self.viewport_height)
    }

    pub fn metrics_complete(&self) -> bool {
        self.metrics.is_complete()
    }

    pub fn metrics_generation(&self) -> u64 {
        self.metrics.generation()
    }

    pub fn live_generation(&self) -> Arc<AtomicU64> {
        self.metrics.live_generation()
    }

    pub fn begin_loading(&mut self) {
        self.reset_document();
        self.lifecycle = Lifecycle::Loading;
    }

    pub fn unload(&mut self) {
        self.reset_document();
        self.lifecycle = Lifecycle::Unloaded;
    }

    fn reset_document(&mut self) {
        self.metrics.clear();
        self.rescaling = false;
        self.page_count = 0;
        self.tops.clear();
        self.total_height = 0.0;
        self.committed_epoch = None;
        self.scroll_offset = 0.0;
        self.current_page = 0;
        self.pending = None;
        self.settling = false;
        self.visibility.clear();
    }

    /// Enters `Ready` for a freshly loaded document of `page_count` pages and
    /// returns the measurement plan for its pages at the current scale.
    pub fn document_ready(&mut self, page_count: usize) -> MetricsPlan {
        self.reset_document();
        self.lifecycle = Lifecycle::Ready;
        self.page_count = page_count;
        self.current_page = if page_count > 0 { 1 } else { 0 };
        let plan = self.metrics.reset(page_count, self.scale);
        self.relayout();
        self.settling = true;
        plan
    }

    pub fn page_height(&self, page: PageIndex) -> f32 {
        self.metrics.height(page).unwrap_or(FALLBACK_PAGE_HEIGHT)
    }

    /// Top of `page` in list coordinates.
    pub fn page_offset(&self, page: PageIndex) -> Option<f32> {
        page.checked_sub(1).and_then(|idx| self.tops.get(idx)).copied()
    }

    fn contains_page(&self, page: i64) -> bool {
        page >= 1 && (page as u64) <= self.page_count as u64
    }

    /// Moves Current Page to `page` and scrolls it into view. Out-of-range
    /// pages are ignored. Before the renderer has committed a layout the
    /// scroll is held back and issued by [`Self::commit_layout`]; a newer
    /// request replaces a held one. Returns whether anything changed.
    pub fn scroll_to_page(&mut self, page: i64, align: ScrollAlign) -> bool {
        if self.lifecycle != Lifecycle::Ready || !self.contains_page(page) {
            debug!(page, page_count = self.page_count, "ignoring page request");
            return false;
        }
        let page = page as PageIndex;

        if !self.layout_committed() {
            let pending = Some(PendingScroll { page, align });
            let changed = self.current_page != page || self.pending != pending;
            self.current_page = page;
            self.pending = pending;
            if changed {
                debug!(page, "deferring scroll until layout is committed");
            }
            return changed;
        }

        let target = self.aligned_offset(page, align);
        let changed =
            self.current_page != page || (self.scroll_offset - target).abs() > SCROLL_EPSILON;
        self.current_page = page;
        self.scroll_offset = target;
        self.pending = None;
        self.settling |= changed;
        changed
    }

    /// Accepts scales in `[0.25, 5]`; anything else leaves all state
    /// untouched. With a document loaded, the height map is invalidated and
    /// the page current before the change stays anchored; the returned plan
    /// re-measures every page at the new scale.
    pub fn set_scale(&mut self, scale: f32) -> Option<MetricsPlan> {
        if !is_valid_scale(scale) {
            debug!(scale, "rejecting scale outside supported range");
            return None;
        }
        let anchor = self.capture_anchor();
        self.scale = scale;
        if self.lifecycle != Lifecycle::Ready {
            return None;
        }

        let plan = self.metrics.reset(self.page_count, scale);
        self.rescaling = true;
        self.relayout();
        self.restore_anchor(anchor);
        self.settling = true;
        debug!(scale, anchor = ?anchor.map(|a| a.page), "rescaled viewport");
        Some(plan)
    }

    /// Writes one page measurement. A stored height relayouts the list.
    pub fn apply_metrics(&mut self, update: MetricsUpdate) -> MetricsWrite {
        let anchor = self.capture_anchor();
        let write = self.metrics.record(update);
        if write == MetricsWrite::Stored {
            self.relayout();
            self.restore_anchor(anchor);
            self.settling = true;
        }
        if self.rescaling && self.metrics.is_complete() {
            self.rescaling = false;
            debug!(scale = self.scale, "page metrics complete");
        }
        write
    }

    /// Report from a visibility tracker. Updates Current Page only.
    pub fn on_page_became_visible(&mut self, page: PageIndex) -> bool {
        if self.lifecycle != Lifecycle::Ready || !self.contains_page(page as i64) {
            return false;
        }
        let changed = self.current_page != page;
        self.current_page = page;
        changed
    }

    /// User scroll. Cancels a held navigation.
    pub fn scroll_by(&mut self, delta: f32) -> bool {
        self.set_scroll_offset(self.scroll_offset + delta)
    }

    pub fn set_scroll_offset(&mut self, offset: f32) -> bool {
        if self.lifecycle != Lifecycle::Ready || !offset.is_finite() {
            return false;
        }
        self.pending = None;
        self.settling = false;
        let clamped = self.clamp_scroll(offset);
        let changed = (clamped - self.scroll_offset).abs() > f32::EPSILON;
        self.scroll_offset = clamped;
        changed
    }

    pub fn set_viewport(&mut self, width: f32, height: f32) -> bool {
        let width = width.max(0.0);
        let height = height.max(0.0);
        if (self.viewport_width - width).abs() < f32::EPSILON
            && (self.viewport_height - height).abs() < f32::EPSILON
        {
            return false;
        }
        let anchor = self.capture_anchor();
        self.viewport_width = width;
        self.viewport_height = height;
        if self.lifecycle == Lifecycle::Ready {
            self.layout_epoch += 1;
            self.restore_anchor(anchor);
            self.settling = true;
        }
        true
    }

    /// Render-complete signal: the renderer has drawn the current layout.
    /// Issues a held navigation, returning its page.
    pub fn commit_layout(&mut self) -> Option<PageIndex> {
        if self.lifecycle != Lifecycle::Ready {
            return None;
        }
        self.committed_epoch = Some(self.layout_epoch);
        let pending = self.pending.take()?;
        self.current_page = pending.page;
        self.scroll_offset = self.aligned_offset(pending.page, pending.align);
        self.settling = true;
        debug!(page = pending.page, "issued held scroll");
        Some(pending.page)
    }

    pub fn layout_committed(&self) -> bool {
        self.committed_epoch == Some(self.layout_epoch)
    }

    pub fn visible_range(&self) -> Option<RangeInclusive<PageIndex>> {
        if self.lifecycle != Lifecycle::Ready || self.page_count == 0 {
            return None;
        }
        let top = self.scroll_offset;
        let bottom = top + self.viewport_height.max(1.0);
        // first page whose bottom edge is below the viewport top
        let first = self
            .tops
            .partition_point(|&page_top| page_top <= top)
            .saturating_sub(1);
        let first = if self.tops[first] + self.page_height(first + 1) <= top {
            first + 1
        } else {
            first
        };
        let last = self
            .tops
            .partition_point(|&page_top| page_top < bottom)
            .max(first + 1);
        let first = (first + 1).min(self.page_count);
        let last = last.min(self.page_count).max(first);
        Some(first..=last)
    }

    /// Visible range widened by the configured overscan.
    pub fn mounted_pages(&self) -> Option<RangeInclusive<PageIndex>> {
        let visible = self.visible_range()?;
        let first = visible.start().saturating_sub(self.options.overscan).max(1);
        let last = (visible.end() + self.options.overscan).min(self.page_count);
        Some(first..=last)
    }

    pub fn visible_slices(&self) -> Vec<PageSlice> {
        let Some(range) = self.visible_range() else {
            return Vec::new();
        };
        let top = self.scroll_offset;
        let bottom = top + self.viewport_height;
        range
            .filter_map(|page| {
                let page_top = self.page_offset(page)?;
                let page_bottom = page_top + self.page_height(page);
                let start = page_top.max(top);
                let end = page_bottom.min(bottom);
                (end > start).then_some(PageSlice {
                    page,
                    source_top: start - page_top,
                    height: end - start,
                    viewport_y: start - top,
                })
            })
            .collect()
    }

    /// Runs the trackers of the mounted pages against the current geometry
    /// and routes their reports into Current Page. Skipped while a held
    /// navigation waits for its layout.
    ///
    /// After any offset change that was not a user scroll (a jump, a zoom,
    /// heights arriving, a resize) the trackers are only re-armed, so the
    /// anchored page keeps Current Page. Whatever happens, Current Page ends
    /// up on screen: if it is not, the most visible mounted page takes over.
    /// Returns the page Current Page was moved to, if any.
    pub fn sync_visibility(&mut self) -> Option<PageIndex> {
        if self.lifecycle != Lifecycle::Ready || self.pending.is_some() {
            return None;
        }
        let mounted = self.mounted_pages();
        self.visibility.sync_mounted(mounted.clone());
        let ratios: Vec<(PageIndex, f32)> = mounted
            .into_iter()
            .flatten()
            .filter_map(|page| {
                let page_top = self.page_offset(page)?;
                let ratio = intersection_ratio(
                    page_top,
                    self.page_height(page),
                    self.scroll_offset,
                    self.viewport_height,
                );
                Some((page, ratio))
            })
            .collect();
        let events = self.visibility.observe(&ratios);
        let settling = std::mem::take(&mut self.settling);
        if settling && on_screen(&ratios, self.current_page) {
            return None;
        }

        let mut reported = None;
        for event in events {
            self.on_page_became_visible(event.page);
            reported = Some(event.page);
        }
        if !on_screen(&ratios, self.current_page) {
            let most_visible = ratios
                .iter()
                .filter(|(_, ratio)| *ratio > 0.0)
                .max_by(|a, b| a.1.total_cmp(&b.1));
            if let Some(&(page, _)) = most_visible {
                debug!(page, stale = self.current_page, "current page left the screen");
                self.current_page = page;
                reported = Some(page);
            }
        }
        reported
    }

    fn relayout(&mut self) {
        self.tops.clear();
        let mut cursor = 0.0;
        for page in 1..=self.page_count {
            if page > 1 {
                cursor += self.options.page_gap;
            }
            self.tops.push(cursor);
            cursor += self.page_height(page);
        }
        self.total_height = cursor;
        self.layout_epoch += 1;
    }

    fn max_scroll(&self) -> f32 {
        (self.total_height - self.viewport_height).max(0.0)
    }

    fn clamp_scroll(&self, offset: f32) -> f32 {
        offset.clamp(0.0, self.max_scroll())
    }

    fn aligned_offset(&self, page: PageIndex, align: ScrollAlign) -> f32 {
        let top = self.page_offset(page).unwrap_or(0.0);
        let height = self.page_height(page);
        let offset = match align {
            ScrollAlign::Start => top,
            ScrollAlign::Center => top + height / 2.0 - self.viewport_height / 2.0,
            ScrollAlign::End => top + height - self.viewport_height,
        };
        self.clamp_scroll(offset)
    }

    fn capture_anchor(&self) -> Option<Anchor> {
        if self.current_page == 0 {
            return None;
        }
        let top = self.page_offset(self.current_page)?;
        let fraction = (self.scroll_offset - top) / self.page_height(self.current_page);
        Some(Anchor {
            page: self.current_page,
            fraction: if fraction.is_finite() { fraction } else { 0.0 },
        })
    }

    fn restore_anchor(&mut self, anchor: Option<Anchor>) {
        if let Some(pending) = self.pending {
            self.scroll_offset = self.aligned_offset(pending.page, pending.align);
            return;
        }
        let Some(anchor) = anchor else {
            self.scroll_offset = self.clamp_scroll(self.scroll_offset);
            return;
        };
        let top = self.page_offset(anchor.page).unwrap_or(0.0);
        let offset = top + anchor.fraction * self.page_height(anchor.page);
        self.scroll_offset = self.clamp_scroll(offset);
    }
}

fn on_screen(ratios: &[(PageIndex, f32)], page: PageIndex) -> bool {
    ratios.iter().any(|&(p, ratio)| p == page && ratio > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn options() -> ViewportOptions {
        ViewportOptions {
            page_gap: 10.0,
            overscan: 1,
            visibility_threshold: 0.1,
        }
    }

    fn ready(pages: usize) -> (ViewportController, MetricsPlan) {
        let mut viewport = ViewportController::new(options(), 1.0);
        viewport.set_viewport(600.0, 800.0);
        let plan = viewport.document_ready(pages);
        viewport.commit_layout();
        (viewport, plan)
    }

    fn measure_all(viewport: &mut ViewportController, plan: &MetricsPlan, height: f32) {
        for page in plan.pages().rev() {
            viewport.apply_metrics(MetricsUpdate {
                generation: plan.generation,
                page,
                result: Ok(height * plan.scale),
            });
        }
    }

    #[test]
    fn scroll_to_valid_page_sets_current_and_is_idempotent() {
        let (mut viewport, _) = ready(10);
        assert!(viewport.scroll_to_page(4, ScrollAlign::Start));
        assert_eq!(viewport.current_page(), 4);
        let offset = viewport.scroll_offset();
        assert_eq!(offset, viewport.page_offset(4).unwrap());

        assert!(!viewport.scroll_to_page(4, ScrollAlign::Start));
        assert_eq!(viewport.current_page(), 4);
        assert_eq!(viewport.scroll_offset(), offset);
    }

    #[test]
    fn out_of_range_pages_are_ignored() {
        let (mut viewport, _) = ready(10);
        viewport.scroll_to_page(3, ScrollAlign::Start);
        for page in [0, -1, 11, i64::MAX, i64::MIN] {
            assert!(!viewport.scroll_to_page(page, ScrollAlign::Start));
            assert_eq!(viewport.current_page(), 3);
        }
    }

    #[test]
    fn scroll_before_document_is_ignored() {
        let mut viewport = ViewportController::new(options(), 1.0);
        assert!(!viewport.scroll_to_page(1, ScrollAlign::Start));
        assert_eq!(viewport.phase(), ViewportPhase::Unloaded);
        viewport.begin_loading();
        assert_eq!(viewport.phase(), ViewportPhase::Loading);
        assert!(!viewport.scroll_to_page(1, ScrollAlign::Start));
    }

    #[test]
    fn rejected_scale_leaves_state_untouched() {
        let (mut viewport, plan) = ready(5);
        measure_all(&mut viewport, &plan, 792.0);
        for scale in [6.0, 0.24, 5.01, f32::NAN, f32::INFINITY] {
            assert!(viewport.set_scale(scale).is_none());
            assert_eq!(viewport.scale(), 1.0);
        }
        assert_eq!(viewport.page_height(2), 792.0);
        assert_eq!(viewport.metrics_generation(), plan.generation);
    }

    #[test]
    fn accepted_scale_invalidates_heights() {
        let (mut viewport, plan) = ready(5);
        measure_all(&mut viewport, &plan, 792.0);
        assert_eq!(viewport.page_height(1), 792.0);

        let rescale = viewport.set_scale(0.25).unwrap();
        assert_eq!(viewport.scale(), 0.25);
        assert_eq!(viewport.page_height(1), FALLBACK_PAGE_HEIGHT);
        assert_eq!(viewport.phase(), ViewportPhase::Rescaling);

        measure_all(&mut viewport, &rescale, 792.0);
        assert_eq!(viewport.page_height(1), 198.0);
        assert_eq!(viewport.phase(), ViewportPhase::Ready);
    }

    #[test]
    fn zoom_keeps_current_page_anchored() {
        let (mut viewport, plan) = ready(50);
        measure_all(&mut viewport, &plan, 792.0);
        viewport.commit_layout();
        viewport.scroll_to_page(37, ScrollAlign::Start);
        assert_eq!(viewport.current_page(), 37);

        let rescale = viewport.set_scale(2.0).unwrap();
        assert_eq!(viewport.current_page(), 37);
        assert_eq!(viewport.scroll_offset(), viewport.page_offset(37).unwrap());

        // heights arrive in arbitrary order; the anchor follows page 37
        for page in [40, 2, 37, 1, 50] {
            viewport.apply_metrics(MetricsUpdate {
                generation: rescale.generation,
                page,
                result: Ok(1584.0),
            });
            assert_eq!(viewport.scroll_offset(), viewport.page_offset(37).unwrap());
        }
        measure_all(&mut viewport, &rescale, 792.0);
        assert_eq!(viewport.current_page(), 37);
        assert_eq!(viewport.scroll_offset(), viewport.page_offset(37).unwrap());

        assert!(!viewport.scroll_to_page(0, ScrollAlign::Start));
        assert_eq!(viewport.current_page(), 37);
    }

    #[test]
    fn zoom_preserves_position_inside_page() {
        let (mut viewport, plan) = ready(10);
        measure_all(&mut viewport, &plan, 1000.0);
        viewport.commit_layout();
        viewport.scroll_to_page(3, ScrollAlign::Start);
        viewport.scroll_by(250.0);

        let rescale = viewport.set_scale(2.0).unwrap();
        measure_all(&mut viewport, &rescale, 1000.0);
        let top = viewport.page_offset(3).unwrap();
        assert!((viewport.scroll_offset() - (top + 500.0)).abs() < 0.01);
    }

    #[test]
    fn navigation_waits_for_committed_layout() {
        let mut viewport = ViewportController::new(options(), 1.0);
        viewport.set_viewport(600.0, 800.0);
        viewport.document_ready(20);

        assert!(viewport.scroll_to_page(12, ScrollAlign::Start));
        assert_eq!(viewport.current_page(), 12);
        assert_eq!(viewport.phase(), ViewportPhase::Navigating);
        assert_eq!(viewport.pending_page(), Some(12));

        assert_eq!(viewport.commit_layout(), Some(12));
        assert_eq!(viewport.phase(), ViewportPhase::Ready);
        assert_eq!(viewport.scroll_offset(), viewport.page_offset(12).unwrap());
        assert_eq!(viewport.commit_layout(), None);
    }

    #[test]
    fn latest_held_navigation_wins() {
        let mut viewport = ViewportController::new(options(), 1.0);
        viewport.set_viewport(600.0, 800.0);
        viewport.document_ready(20);
        viewport.scroll_to_page(5, ScrollAlign::Start);
        viewport.scroll_to_page(9, ScrollAlign::Start);
        assert_eq!(viewport.commit_layout(), Some(9));
        assert_eq!(viewport.current_page(), 9);
    }

    #[test]
    fn rescale_during_held_navigation_lands_on_target() {
        let mut viewport = ViewportController::new(options(), 1.0);
        viewport.set_viewport(600.0, 800.0);
        viewport.document_ready(30);
        viewport.scroll_to_page(17, ScrollAlign::Start);

        let rescale = viewport.set_scale(1.5).unwrap();
        measure_all(&mut viewport, &rescale, 792.0);
        assert_eq!(viewport.commit_layout(), Some(17));
        assert_eq!(viewport.current_page(), 17);
        assert_eq!(viewport.scroll_offset(), viewport.page_offset(17).unwrap());
    }

    #[test]
    fn page_height_falls_back_until_measured() {
        let (mut viewport, plan) = ready(3);
        assert_eq!(viewport.page_height(2), FALLBACK_PAGE_HEIGHT);
        viewport.apply_metrics(MetricsUpdate {
            generation: plan.generation,
            page: 2,
            result: Err(anyhow!("corrupt page")),
        });
        assert_eq!(viewport.page_height(2), FALLBACK_PAGE_HEIGHT);
        viewport.apply_metrics(MetricsUpdate {
            generation: plan.generation,
            page: 3,
            result: Ok(500.0),
        });
        assert_eq!(viewport.page_height(3), 500.0);
        assert_eq!(
            viewport.total_height(),
            FALLBACK_PAGE_HEIGHT * 2.0 + 500.0 + 20.0
        );
    }

    #[test]
    fn visibility_reports_update_current_page_without_scrolling() {
        let (mut viewport, plan) = ready(10);
        measure_all(&mut viewport, &plan, 1000.0);
        viewport.commit_layout();

        viewport.set_scroll_offset(2900.0);
        assert_eq!(viewport.current_page(), 1);
        let offset = viewport.scroll_offset();

        // pages 3 and 4 both cross the threshold; the later report wins
        assert_eq!(viewport.sync_visibility(), Some(4));
        assert_eq!(viewport.current_page(), 4);
        assert_eq!(viewport.scroll_offset(), offset);
        assert_eq!(viewport.sync_visibility(), None);

        assert!(!viewport.on_page_became_visible(11));
        assert!(viewport.on_page_became_visible(2));
        assert_eq!(viewport.current_page(), 2);
        assert_eq!(viewport.scroll_offset(), offset);
    }

    #[test]
    fn command_scroll_is_not_overridden_by_its_own_visibility_reports() {
        let mut viewport = ViewportController::new(options(), 1.0);
        viewport.set_viewport(600.0, 1500.0);
        let plan = viewport.document_ready(10);
        measure_all(&mut viewport, &plan, 1000.0);
        viewport.commit_layout();

        assert!(viewport.scroll_to_page(3, ScrollAlign::Start));
        // pages 3 and 4 are both on screen after the jump
        assert_eq!(viewport.visible_range(), Some(3..=4));
        assert_eq!(viewport.sync_visibility(), None);
        assert_eq!(viewport.current_page(), 3);

        // a later user scroll reports again
        viewport.scroll_by(1100.0);
        assert_eq!(viewport.sync_visibility(), Some(5));
        assert_eq!(viewport.current_page(), 5);
    }

    #[test]
    fn zoom_round_trip_keeps_current_page_through_visibility_sync() {
        let (mut viewport, plan) = ready(50);
        measure_all(&mut viewport, &plan, 792.0);
        viewport.commit_layout();
        viewport.scroll_to_page(37, ScrollAlign::Start);
        assert_eq!(viewport.sync_visibility(), None);

        // zooming out brings page 38 on screen as well
        let zoom_out = viewport.set_scale(0.5).unwrap();
        measure_all(&mut viewport, &zoom_out, 792.0);
        viewport.commit_layout();
        assert_eq!(viewport.visible_range(), Some(37..=38));
        assert_eq!(viewport.sync_visibility(), None);
        assert_eq!(viewport.current_page(), 37);

        let zoom_in = viewport.set_scale(1.0).unwrap();
        measure_all(&mut viewport, &zoom_in, 792.0);
        viewport.commit_layout();
        assert_eq!(viewport.sync_visibility(), None);
        assert_eq!(viewport.current_page(), 37);
        assert!(viewport.visible_range().unwrap().contains(&37));
        assert_eq!(viewport.scroll_offset(), viewport.page_offset(37).unwrap());
    }

    #[test]
    fn heights_arriving_after_sync_do_not_move_current_page() {
        let (mut viewport, plan) = ready(20);
        viewport.scroll_to_page(5, ScrollAlign::Start);
        viewport.sync_visibility();

        // measured pages are much shorter than the fallback height
        measure_all(&mut viewport, &plan, 300.0);
        assert!(viewport.visible_range().unwrap().count() > 1);
        assert_eq!(viewport.sync_visibility(), None);
        assert_eq!(viewport.current_page(), 5);
        assert_eq!(viewport.scroll_offset(), viewport.page_offset(5).unwrap());
    }

    #[test]
    fn current_page_off_screen_is_replaced_by_most_visible_page() {
        let (mut viewport, plan) = ready(10);
        measure_all(&mut viewport, &plan, 1000.0);
        viewport.commit_layout();
        viewport.sync_visibility();
        assert_eq!(viewport.current_page(), 1);

        // page 2 is already reported visible, so moving onto it raises no event
        viewport.set_scroll_offset(900.0);
        viewport.sync_visibility();
        viewport.on_page_became_visible(1);
        viewport.set_scroll_offset(1100.0);
        assert_eq!(viewport.sync_visibility(), Some(2));
        assert_eq!(viewport.current_page(), 2);
    }

    #[test]
    fn mounted_pages_cover_visible_range_plus_overscan() {
        let (mut viewport, plan) = ready(10);
        measure_all(&mut viewport, &plan, 1000.0);
        viewport.commit_layout();
        viewport.set_scroll_offset(2900.0);

        assert_eq!(viewport.visible_range(), Some(3..=4));
        assert_eq!(viewport.mounted_pages(), Some(2..=5));

        let slices = viewport.visible_slices();
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].page, 3);
        assert_eq!(slices[0].source_top, 880.0);
        assert_eq!(slices[0].height, 120.0);
        assert_eq!(slices[0].viewport_y, 0.0);
        assert_eq!(slices[1].page, 4);
        assert_eq!(slices[1].source_top, 0.0);
        assert_eq!(slices[1].viewport_y, 130.0);

        viewport.set_scroll_offset(0.0);
        assert_eq!(viewport.mounted_pages(), Some(1..=2));
    }

    #[test]
    fn unload_clears_document_state() {
        let (mut viewport, _) = ready(10);
        viewport.scroll_to_page(6, ScrollAlign::Start);
        viewport.unload();
        assert_eq!(viewport.phase(), ViewportPhase::Unloaded);
        assert_eq!(viewport.current_page(), 0);
        assert_eq!(viewport.page_count(), 0);
        assert!(viewport.visible_range().is_none());
    }
}
