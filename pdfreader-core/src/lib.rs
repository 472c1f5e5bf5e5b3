pub mod bookmark;
pub mod config;
pub mod engine;
pub mod metrics;
pub mod session;
pub mod store;
pub mod viewport;
pub mod visibility;

pub use bookmark::{toggled_bookmark, BookmarkStore, NO_BOOKMARK};
pub use config::{ConfigError, ViewerConfig, ViewerPaths};
pub use engine::{
    content_fingerprint, DocumentEngine, DocumentHandle, DocumentMetadata, DocumentSource,
    Fingerprint, LoadError, PageIndex, PageViewport, RenderImage,
};
pub use metrics::{MetricsPlan, MetricsUpdate, MetricsWrite, FALLBACK_PAGE_HEIGHT};
pub use session::{
    DocumentSession, NavigationCommands, NavigationState, OpenOutcome, SessionEvent,
};
pub use store::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, StoreError};
pub use viewport::{
    is_valid_scale, PageSlice, ScrollAlign, ViewportController, ViewportOptions, ViewportPhase,
    MAX_SCALE, MIN_SCALE,
};
pub use visibility::{VisibilityEvent, VisibilityTracker, DEFAULT_VISIBILITY_THRESHOLD};
