use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::engine::PageIndex;

pub const DEFAULT_VISIBILITY_THRESHOLD: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityEvent {
    pub page: PageIndex,
    pub ratio: f32,
}

/// Edge-triggered observer for one mounted page: fires once when the visible
/// fraction of the page reaches the threshold and re-arms after it drops
/// below again.
#[derive(Debug, Clone)]
pub struct VisibilityTracker {
    page: PageIndex,
    threshold: f32,
    visible: bool,
}

impl VisibilityTracker {
    pub fn new(page: PageIndex, threshold: f32) -> Self {
        Self {
            page,
            threshold,
            visible: false,
        }
    }

    pub fn page(&self) -> PageIndex {
        self.page
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn observe(&mut self, ratio: f32) -> Option<VisibilityEvent> {
        let now_visible = ratio > 0.0 && ratio >= self.threshold;
        let crossed = now_visible && !self.visible;
        self.visible = now_visible;
        crossed.then_some(VisibilityEvent {
            page: self.page,
            ratio,
        })
    }
}

/// Fraction of a page's area inside the viewport. Pages span the full
/// viewport width, so the vertical overlap decides it.
pub fn intersection_ratio(
    page_top: f32,
    page_height: f32,
    viewport_top: f32,
    viewport_height: f32,
) -> f32 {
    if page_height <= 0.0 || viewport_height <= 0.0 {
        return 0.0;
    }
    let top = page_top.max(viewport_top);
    let bottom = (page_top + page_height).min(viewport_top + viewport_height);
    ((bottom - top).max(0.0) / page_height).clamp(0.0, 1.0)
}

/// Trackers for the currently mounted pages.
#[derive(Debug)]
pub struct PageVisibility {
    threshold: f32,
    trackers: BTreeMap<PageIndex, VisibilityTracker>,
}

impl PageVisibility {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            trackers: BTreeMap::new(),
        }
    }

    /// Unmounted pages lose their tracker; newly mounted pages start unseen.
    pub fn sync_mounted(&mut self, mounted: Option<RangeInclusive<PageIndex>>) {
        let Some(mounted) = mounted else {
            self.trackers.clear();
            return;
        };
        self.trackers.retain(|page, _| mounted.contains(page));
        for page in mounted {
            self.trackers
                .entry(page)
                .or_insert_with(|| VisibilityTracker::new(page, self.threshold));
        }
    }

    /// Feeds each tracker its current ratio. Events come back in page order;
    /// callers apply them last-write-wins.
    pub fn observe(&mut self, ratios: &[(PageIndex, f32)]) -> Vec<VisibilityEvent> {
        ratios
            .iter()
            .filter_map(|&(page, ratio)| self.trackers.get_mut(&page)?.observe(ratio))
            .collect()
    }

    pub fn mounted(&self) -> impl Iterator<Item = PageIndex> + '_ {
        self.trackers.keys().copied()
    }

    pub fn clear(&mut self) {
        self.trackers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_reports_once_per_crossing() {
        let mut tracker = VisibilityTracker::new(4, 0.1);
        assert!(tracker.observe(0.05).is_none());
        assert_eq!(tracker.observe(0.2).map(|e| e.page), Some(4));
        assert!(tracker.observe(0.6).is_none());
        assert!(tracker.observe(1.0).is_none());
        assert!(tracker.observe(0.0).is_none());
        assert!(!tracker.is_visible());
        assert!(tracker.observe(0.1).is_some());
    }

    #[test]
    fn intersection_ratio_covers_partial_and_disjoint_pages() {
        assert_eq!(intersection_ratio(0.0, 100.0, 0.0, 50.0), 0.5);
        assert_eq!(intersection_ratio(0.0, 100.0, 100.0, 50.0), 0.0);
        assert_eq!(intersection_ratio(10.0, 20.0, 0.0, 100.0), 1.0);
        assert_eq!(intersection_ratio(0.0, 0.0, 0.0, 100.0), 0.0);
    }

    #[test]
    fn unmounting_rearms_tracker() {
        let mut visibility = PageVisibility::new(0.1);
        visibility.sync_mounted(Some(1..=2));
        let events = visibility.observe(&[(1, 1.0), (2, 0.3)]);
        assert_eq!(events.iter().map(|e| e.page).collect::<Vec<_>>(), vec![1, 2]);

        visibility.sync_mounted(Some(2..=3));
        assert_eq!(visibility.mounted().collect::<Vec<_>>(), vec![2, 3]);
        assert!(visibility.observe(&[(2, 0.3)]).is_empty());

        visibility.sync_mounted(Some(1..=2));
        let events = visibility.observe(&[(1, 1.0)]);
        assert_eq!(events.len(), 1);

        visibility.sync_mounted(None);
        assert_eq!(visibility.mounted().count(), 0);
    }
}
