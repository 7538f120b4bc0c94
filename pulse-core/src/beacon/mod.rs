//! Beacon data model — one immutable-once-built telemetry event.

mod id;
mod kind;

pub use id::BeaconId;
pub use kind::{
    BeaconCategory, BeaconKind, CrashData, CrashType, CustomEventData, HttpRequestData, HttpSize,
    LaunchPhase, PerfMetric,
};

use serde::{Deserialize, Serialize};

use crate::now_millis;

/// Placeholder view name meaning "fill in the currently visible view when the
/// beacon is admitted". Producers that don't know the view at creation time
/// (custom events recorded off the UI thread) use this sentinel.
pub const DEFERRED_VIEW_NAME: &str = "\u{0}pulse.deferred-view";

/// One telemetry event ready for transmission. Identity is assigned at
/// creation and never changes; the record is immutable once admitted to the
/// queue (an unset or deferred view name is resolved at admission, before
/// that).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconRecord {
    pub id: BeaconId,
    /// Creation time, ms since epoch.
    pub timestamp_ms: i64,
    /// Visible view/screen when the event happened, if known.
    pub view_name: Option<String>,
    pub kind: BeaconKind,
}

impl BeaconRecord {
    pub fn new(kind: BeaconKind) -> Self {
        Self::with_timestamp(now_millis(), kind)
    }

    pub fn with_timestamp(timestamp_ms: i64, kind: BeaconKind) -> Self {
        Self {
            id: BeaconId::generate(),
            timestamp_ms,
            view_name: None,
            kind,
        }
    }

    pub fn with_view(mut self, view: impl Into<String>) -> Self {
        self.view_name = Some(view.into());
        self
    }

    pub fn category(&self) -> BeaconCategory {
        self.kind.category()
    }

    /// Whether the view name still awaits resolution against the current view.
    pub fn has_deferred_view(&self) -> bool {
        self.view_name.as_deref() == Some(DEFERRED_VIEW_NAME)
    }

    /// Fill an unset view or the deferred placeholder with the currently
    /// visible view. No-op for explicit view names.
    pub fn resolve_view(&mut self, current_view: Option<&str>) {
        if self.view_name.is_none() || self.has_deferred_view() {
            self.view_name = current_view.map(str::to_owned);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_follows_kind() {
        let record = BeaconRecord::new(BeaconKind::ViewChange {
            view: "Home".into(),
        });
        assert_eq!(record.category(), BeaconCategory::ViewChange);
        assert!(!record.category().is_rate_limit_exempt());
    }

    #[test]
    fn crash_and_session_are_exempt() {
        assert!(BeaconCategory::Crash.is_rate_limit_exempt());
        assert!(BeaconCategory::SessionStart.is_rate_limit_exempt());
        assert!(!BeaconCategory::HttpRequest.is_rate_limit_exempt());
    }

    #[test]
    fn deferred_view_resolves_to_current() {
        let mut record = BeaconRecord::new(BeaconKind::Custom(CustomEventData {
            name: "checkout".into(),
            duration_ms: None,
            backend_tracing_id: None,
            error_message: None,
            meta: Default::default(),
        }))
        .with_view(DEFERRED_VIEW_NAME);
        assert!(record.has_deferred_view());

        record.resolve_view(Some("Cart"));
        assert_eq!(record.view_name.as_deref(), Some("Cart"));
    }

    #[test]
    fn unset_view_resolves_to_current() {
        let mut record = BeaconRecord::new(BeaconKind::ViewChange {
            view: "Home".into(),
        });
        assert!(record.view_name.is_none());

        record.resolve_view(Some("Home"));
        assert_eq!(record.view_name.as_deref(), Some("Home"));
    }

    #[test]
    fn explicit_view_survives_resolution() {
        let mut record = BeaconRecord::new(BeaconKind::ViewChange {
            view: "Home".into(),
        })
        .with_view("Home");
        record.resolve_view(Some("Other"));
        assert_eq!(record.view_name.as_deref(), Some("Home"));
    }
}
