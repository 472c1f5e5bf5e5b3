//! Lazily measured page heights for one (document, scale) pair.
//!
//! Every page is measured by its own blocking task, and results come back
//! over a channel in whatever order the tasks finish. Each measurement is
//! tagged with the generation that requested it; a reset (new scale or new
//! document) bumps the generation so late results from the previous one are
//! dropped instead of written into the fresh map. Tasks that have not
//! started yet also check the live generation before touching the document,
//! so a burst of rescales does not queue work behind the document lock.

use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::engine::{DocumentHandle, PageIndex};

/// Height reported for pages that have not been measured (or failed to).
/// Non-zero so virtualized rows never collapse.
pub const FALLBACK_PAGE_HEIGHT: f32 = 1100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsPlan {
    pub generation: u64,
    pub scale: f32,
    pub page_count: usize,
}

impl MetricsPlan {
    pub fn pages(&self) -> RangeInclusive<PageIndex> {
        1..=self.page_count
    }
}

#[derive(Debug)]
pub struct MetricsUpdate {
    pub generation: u64,
    pub page: PageIndex,
    pub result: Result<f32, Error>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsWrite {
    Stored,
    Degraded,
    Stale,
}

#[derive(Debug, Default)]
pub struct PageMetricsCache {
    generation: u64,
    live: Arc<AtomicU64>,
    scale_milli: u32,
    page_count: usize,
    heights: HashMap<PageIndex, f32>,
    degraded: HashSet<PageIndex>,
}

impl PageMetricsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self, page_count: usize, scale: f32) -> MetricsPlan {
        self.bump_generation();
        self.scale_milli = quantize_scale(scale);
        self.page_count = page_count;
        self.heights.clear();
        self.degraded.clear();
        debug!(
            generation = self.generation,
            page_count, scale, "page metrics invalidated"
        );
        MetricsPlan {
            generation: self.generation,
            scale,
            page_count,
        }
    }

    /// Forgets the document entirely. In-flight results become stale.
    pub fn clear(&mut self) {
        self.bump_generation();
        self.page_count = 0;
        self.heights.clear();
        self.degraded.clear();
    }

    fn bump_generation(&mut self) {
        self.generation += 1;
        self.live.store(self.generation, Ordering::Release);
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Shared view of the generation, readable from measurement tasks.
    pub fn live_generation(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.live)
    }

    pub fn height(&self, page: PageIndex) -> Option<f32> {
        self.heights.get(&page).copied()
    }

    pub fn record(&mut self, update: MetricsUpdate) -> MetricsWrite {
        let MetricsUpdate {
            generation,
            page,
            result,
        } = update;
        if generation != self.generation || page == 0 || page > self.page_count {
            return MetricsWrite::Stale;
        }
        match result {
            Ok(height) if height.is_finite() && height > 0.0 => {
                self.degraded.remove(&page);
                self.heights.insert(page, height);
                MetricsWrite::Stored
            }
            Ok(height) => {
                debug!(page, height, "discarding degenerate page height");
                self.degrade(page)
            }
            Err(err) => {
                debug!(page, ?err, "page metrics unavailable, using fallback height");
                self.degrade(page)
            }
        }
    }

    fn degrade(&mut self, page: PageIndex) -> MetricsWrite {
        self.heights.remove(&page);
        self.degraded.insert(page);
        MetricsWrite::Degraded
    }

    /// Pages with a settled answer, measured or degraded.
    pub fn populated(&self) -> usize {
        self.heights.len() + self.degraded.len()
    }

    pub fn is_complete(&self) -> bool {
        self.page_count > 0 && self.populated() == self.page_count
    }

    pub fn scale_milli(&self) -> u32 {
        self.scale_milli
    }
}

/// Starts one blocking measurement per page of `plan`. A task whose plan is
/// no longer `live` when it gets to run returns without measuring or sending.
pub fn spawn_metrics(
    handle: Arc<dyn DocumentHandle>,
    plan: &MetricsPlan,
    live: Arc<AtomicU64>,
    sender: UnboundedSender<MetricsUpdate>,
) {
    for page in plan.pages() {
        let handle = Arc::clone(&handle);
        let live = Arc::clone(&live);
        let sender = sender.clone();
        let generation = plan.generation;
        let scale = plan.scale;
        tokio::task::spawn_blocking(move || {
            if live.load(Ordering::Acquire) != generation {
                debug!(page, generation, "skipping superseded page measurement");
                return;
            }
            let result = handle
                .page_viewport(page, scale)
                .map(|viewport| viewport.height);
            // the handle is released before the result becomes observable
            drop(handle);
            // a closed channel means the session is gone
            let _ = sender.send(MetricsUpdate {
                generation,
                page,
                result,
            });
        });
    }
}

pub(crate) fn quantize_scale(scale: f32) -> u32 {
    let scaled = (scale * 1000.0).round();
    if !scaled.is_finite() || scaled <= 0.0 {
        1
    } else if scaled > u32::MAX as f32 {
        u32::MAX
    } else {
        scaled as u32
    }
}
