use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, instrument, warn};

use crate::bookmark::{toggled_bookmark, BookmarkStore, NO_BOOKMARK};
use crate::config::ViewerConfig;
use crate::engine::{
    DocumentEngine, DocumentHandle, DocumentSource, Fingerprint, LoadError, PageIndex,
    RenderImage,
};
use crate::metrics::{quantize_scale, spawn_metrics, MetricsPlan, MetricsUpdate};
use crate::store::StoreError;
use crate::viewport::{is_valid_scale, ScrollAlign, ViewportController};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    DocumentOpened(Fingerprint),
    DocumentReleased(Fingerprint),
    LoadFailed(String),
    BookmarkChanged(PageIndex),
    RedrawNeeded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpenOutcome {
    Loaded {
        fingerprint: Fingerprint,
        page_count: usize,
        bookmark: PageIndex,
    },
    Failed {
        message: String,
    },
}

/// What the navigation chrome displays.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationState {
    pub title: Option<String>,
    pub page_count: usize,
    pub current_page: PageIndex,
    pub scale: f32,
    pub bookmark: PageIndex,
}

/// Commands the chrome may issue. Invalid input is a silent no-op reported
/// as `false`.
pub trait NavigationCommands {
    fn navigation_state(&self) -> NavigationState;
    fn scroll_to_page(&mut self, page: i64) -> bool;
    fn set_scale(&mut self, scale: f32) -> bool;
    fn toggle_bookmark(&mut self) -> bool;
}

struct OpenDocument {
    handle: Arc<dyn DocumentHandle>,
    fingerprint: Fingerprint,
    source: DocumentSource,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
struct CacheKey {
    page: PageIndex,
    scale_milli: u32,
}

impl CacheKey {
    fn new(page: PageIndex, scale: f32) -> Self {
        Self {
            page,
            scale_milli: quantize_scale(scale),
        }
    }

    fn distance(&self, reference_page: PageIndex) -> usize {
        self.page.abs_diff(reference_page)
    }
}

/// One open file at a time: its handle, fingerprint and bookmark, plus the
/// viewport laid over it.
pub struct DocumentSession {
    engine: Arc<dyn DocumentEngine>,
    bookmarks: BookmarkStore,
    viewport: ViewportController,
    document: Option<OpenDocument>,
    bookmark: PageIndex,
    sample_path: Option<PathBuf>,
    render_cache: Mutex<HashMap<CacheKey, Arc<RenderImage>>>,
    render_cache_capacity: usize,
    metrics_tx: UnboundedSender<MetricsUpdate>,
    metrics_rx: UnboundedReceiver<MetricsUpdate>,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl DocumentSession {
    pub fn new(
        engine: Arc<dyn DocumentEngine>,
        bookmarks: BookmarkStore,
        config: &ViewerConfig,
    ) -> Self {
        let (metrics_tx, metrics_rx) = mpsc::unbounded_channel();
        Self {
            engine,
            bookmarks,
            viewport: ViewportController::new(config.viewport_options(), config.initial_scale),
            document: None,
            bookmark: NO_BOOKMARK,
            sample_path: config.sample_path.clone(),
            render_cache: Mutex::new(HashMap::new()),
            render_cache_capacity: config.render_cache_capacity.max(1),
            metrics_tx,
            metrics_rx,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn take_events(&self) -> Vec<SessionEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    fn emit(&self, event: SessionEvent) {
        self.events.lock().push(event);
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut ViewportController {
        &mut self.viewport
    }

    pub fn has_document(&self) -> bool {
        self.document.is_some()
    }

    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.document.as_ref().map(|doc| &doc.fingerprint)
    }

    pub fn source(&self) -> Option<&DocumentSource> {
        self.document.as_ref().map(|doc| &doc.source)
    }

    pub fn title(&self) -> Option<String> {
        let doc = self.document.as_ref()?;
        doc.handle
            .metadata()
            .title
            .clone()
            .filter(|title| !title.trim().is_empty())
    }

    pub fn bookmark(&self) -> PageIndex {
        self.bookmark
    }

    /// Replaces the open document with `source`. The previous document is
    /// released first. Load failures are logged and leave the session with
    /// no document; they are reported through the outcome, never as errors.
    #[instrument(skip(self, source), fields(source = %source.display_name()))]
    pub async fn open(&mut self, source: DocumentSource) -> OpenOutcome {
        self.release_document();
        self.viewport.begin_loading();

        let loaded = self
            .engine
            .load(&source)
            .await
            .and_then(|handle| self.validate(&source, handle));

        match loaded {
            Ok((handle, fingerprint)) => self.adopt(handle, fingerprint, source),
            Err(err) => {
                warn!(error = %err, "failed to load document");
                self.viewport.unload();
                self.bookmark = NO_BOOKMARK;
                let message = err.to_string();
                self.emit(SessionEvent::LoadFailed(message.clone()));
                self.emit(SessionEvent::RedrawNeeded);
                OpenOutcome::Failed { message }
            }
        }
    }

    pub async fn open_sample(&mut self) -> OpenOutcome {
        match self.sample_path.clone() {
            Some(path) => self.open(DocumentSource::Path(path)).await,
            None => {
                info!("no sample document configured");
                OpenOutcome::Failed {
                    message: "no sample document configured".into(),
                }
            }
        }
    }

    /// Opens the first dropped file. An empty drop changes nothing.
    pub async fn drop_files(&mut self, files: Vec<DocumentSource>) -> Option<OpenOutcome> {
        let mut files = files.into_iter();
        let Some(first) = files.next() else {
            debug!("ignoring drop without files");
            return None;
        };
        let ignored = files.count();
        if ignored > 0 {
            info!(ignored, "opening only the first dropped file");
        }
        Some(self.open(first).await)
    }

    fn validate(
        &self,
        source: &DocumentSource,
        handle: Arc<dyn DocumentHandle>,
    ) -> Result<(Arc<dyn DocumentHandle>, Fingerprint), LoadError> {
        if handle.page_count() == 0 {
            return Err(LoadError::Empty {
                name: source.display_name(),
            });
        }
        let fingerprint = Fingerprint::from_engine(handle.fingerprints()).ok_or_else(|| {
            LoadError::MissingFingerprint {
                name: source.display_name(),
            }
        })?;
        Ok((handle, fingerprint))
    }

    fn adopt(
        &mut self,
        handle: Arc<dyn DocumentHandle>,
        fingerprint: Fingerprint,
        source: DocumentSource,
    ) -> OpenOutcome {
        let page_count = handle.page_count();
        let plan = self.viewport.document_ready(page_count);
        self.spawn_metrics(&handle, &plan);

        self.bookmark = self.bookmarks.load_bookmark(&fingerprint);
        if self.bookmark != NO_BOOKMARK {
            // held until the first layout with this page count is committed
            self.viewport
                .scroll_to_page(self.bookmark as i64, ScrollAlign::Start);
        }

        info!(
            %fingerprint,
            page_count,
            bookmark = self.bookmark,
            "document opened"
        );
        self.emit(SessionEvent::DocumentOpened(fingerprint.clone()));
        self.emit(SessionEvent::RedrawNeeded);
        self.document = Some(OpenDocument {
            handle,
            fingerprint: fingerprint.clone(),
            source,
        });
        OpenOutcome::Loaded {
            fingerprint,
            page_count,
            bookmark: self.bookmark,
        }
    }

    fn release_document(&mut self) {
        if let Some(doc) = self.document.take() {
            debug!(fingerprint = %doc.fingerprint, "releasing document");
            self.render_cache.lock().clear();
            self.emit(SessionEvent::DocumentReleased(doc.fingerprint));
        }
        self.bookmark = NO_BOOKMARK;
    }

    fn spawn_metrics(&self, handle: &Arc<dyn DocumentHandle>, plan: &MetricsPlan) {
        spawn_metrics(
            Arc::clone(handle),
            plan,
            self.viewport.live_generation(),
            self.metrics_tx.clone(),
        );
    }

    /// Applies every measurement that has arrived so far without waiting.
    pub fn pump_metrics(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(update) = self.metrics_rx.try_recv() {
            self.viewport.apply_metrics(update);
            applied += 1;
        }
        if applied > 0 {
            self.emit(SessionEvent::RedrawNeeded);
        }
        applied
    }

    /// Waits until every page of the current generation has been measured.
    pub async fn settle_metrics(&mut self) {
        while self.document.is_some() && !self.viewport.metrics_complete() {
            match self.metrics_rx.recv().await {
                Some(update) => {
                    self.viewport.apply_metrics(update);
                }
                None => break,
            }
        }
        self.emit(SessionEvent::RedrawNeeded);
    }

    /// Sets the bookmark to Current Page, or clears it when Current Page is
    /// already bookmarked, and persists the result.
    pub fn try_toggle_bookmark(&mut self) -> Result<PageIndex, StoreError> {
        let Some(doc) = self.document.as_ref() else {
            return Ok(self.bookmark);
        };
        let next = toggled_bookmark(self.bookmark, self.viewport.current_page());
        self.bookmarks.save_bookmark(&doc.fingerprint, next)?;
        debug!(fingerprint = %doc.fingerprint, bookmark = next, "bookmark updated");
        self.bookmark = next;
        self.emit(SessionEvent::BookmarkChanged(next));
        Ok(next)
    }

    pub fn go_to_bookmark(&mut self) -> bool {
        if self.bookmark == NO_BOOKMARK {
            return false;
        }
        self.scroll_to_page(self.bookmark as i64)
    }

    /// Renders a page at the current scale, reusing recent renders.
    pub fn render_page(&self, page: PageIndex) -> Result<Arc<RenderImage>> {
        let doc = self
            .document
            .as_ref()
            .ok_or_else(|| anyhow!("no document loaded"))?;
        if page == 0 || page > doc.handle.page_count() {
            return Err(anyhow!("page {} out of range", page));
        }
        let scale = self.viewport.scale();
        let key = CacheKey::new(page, scale);
        if let Some(image) = self.render_cache.lock().get(&key).cloned() {
            return Ok(image);
        }

        let image = Arc::new(doc.handle.render_page(page, scale)?);
        self.store_cached_render(key, &image);
        Ok(image)
    }

    fn store_cached_render(&self, key: CacheKey, image: &Arc<RenderImage>) {
        let reference_page = self.viewport.current_page();
        let mut cache = self.render_cache.lock();
        cache.insert(key, Arc::clone(image));

        if cache.len() > self.render_cache_capacity {
            let mut keys: Vec<_> = cache.keys().copied().collect();
            keys.sort_by_key(|k| (k.scale_milli != key.scale_milli, k.distance(reference_page)));
            for stale in keys.into_iter().skip(self.render_cache_capacity) {
                cache.remove(&stale);
            }
        }
    }
}

impl NavigationCommands for DocumentSession {
    fn navigation_state(&self) -> NavigationState {
        NavigationState {
            title: self.title(),
            page_count: self.viewport.page_count(),
            current_page: self.viewport.current_page(),
            scale: self.viewport.scale(),
            bookmark: self.bookmark,
        }
    }

    fn scroll_to_page(&mut self, page: i64) -> bool {
        let changed = self.viewport.scroll_to_page(page, ScrollAlign::Start);
        if changed {
            self.emit(SessionEvent::RedrawNeeded);
        }
        changed
    }

    fn set_scale(&mut self, scale: f32) -> bool {
        if !is_valid_scale(scale) {
            return false;
        }
        if let Some(plan) = self.viewport.set_scale(scale) {
            if let Some(doc) = self.document.as_ref() {
                self.spawn_metrics(&doc.handle, &plan);
            }
        }
        self.emit(SessionEvent::RedrawNeeded);
        true
    }

    fn toggle_bookmark(&mut self) -> bool {
        match self.try_toggle_bookmark() {
            Ok(_) => self.document.is_some(),
            Err(err) => {
                warn!(?err, "failed to persist bookmark");
                false
            }
        }
    }
}
