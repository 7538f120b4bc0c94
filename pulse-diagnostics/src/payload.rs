//! Diagnostic payload model: one crash-like event captured by the platform
//! in a previous app run, persisted to disk until it has been turned into a
//! beacon.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pulse_core::beacon::CrashType;
use pulse_core::constants::CRASH_RELEVANCE_WINDOW_MS;

/// Identity of the session the crash happened in (the previous app run),
/// restored from the host's session persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashSession {
    pub id: Uuid,
    pub start_time_ms: i64,
    /// View visible when the session ended; crash beacons inherit it.
    pub view_name: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub connection_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
}

/// Identity of the binary a diagnostic was captured against. Symbolication
/// is only meaningful when the running binary matches it exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryIdentity {
    pub bundle_identifier: String,
    pub app_build_version: String,
    pub os_version: String,
}

/// A raw call-stack frame as recorded by the platform. Fields are all
/// optional; frames missing the binary identity are preserved but cannot be
/// placed in the output document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub binary_uuid: Option<Uuid>,
    pub offset_into_binary_text_segment: Option<u64>,
    pub sample_count: Option<u32>,
    pub sub_frames: Option<Vec<Frame>>,
    pub binary_name: Option<String>,
    pub address: Option<u64>,
}

impl Frame {
    /// Depth-first flattening of this frame and everything below it.
    pub fn flatten_into<'a>(&'a self, out: &mut Vec<&'a Frame>) {
        out.push(self);
        if let Some(children) = &self.sub_frames {
            for child in children {
                child.flatten_into(out);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticThread {
    pub thread_attributed: Option<bool>,
    pub call_stack_root_frames: Vec<Frame>,
}

impl DiagnosticThread {
    /// All frames of this thread in call order.
    pub fn frames(&self) -> Vec<&Frame> {
        let mut out = Vec::new();
        for root in &self.call_stack_root_frames {
            root.flatten_into(&mut out);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStackTree {
    pub call_stacks: Vec<DiagnosticThread>,
    pub call_stack_per_thread: Option<bool>,
}

/// One serialized crash/hang/cpu/disk-write/app-launch diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticPayload {
    pub crash_session: CrashSession,
    /// Connects all diagnostics delivered within one platform batch.
    pub crash_group_id: Uuid,
    pub crash_type: CrashType,
    pub crash_time_ms: i64,
    pub duration_ms: i64,
    #[serde(default)]
    pub error_type: Option<i64>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub payload_version: Option<String>,
    #[serde(default)]
    pub call_stack_tree: Option<CallStackTree>,
    #[serde(default)]
    pub identity: Option<BinaryIdentity>,
    #[serde(default)]
    pub app_version: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub platform_architecture: Option<String>,
    // crash extras
    #[serde(default)]
    pub exception_type: Option<i64>,
    #[serde(default)]
    pub exception_code: Option<i64>,
    #[serde(default)]
    pub signal: Option<i64>,
    #[serde(default)]
    pub termination_reason: Option<String>,
    #[serde(default)]
    pub virtual_memory_region_info: Option<String>,
    // cpu-exception extras
    #[serde(default)]
    pub total_cpu_time: Option<String>,
    #[serde(default)]
    pub total_sampled_time: Option<String>,
    // disk-write extras
    #[serde(default)]
    pub writes_caused: Option<String>,
    // hang extras
    #[serde(default)]
    pub hang_duration: Option<String>,
    // app-launch extras
    #[serde(default)]
    pub launch_duration: Option<String>,
}

impl DiagnosticPayload {
    /// Whether the crash is recent enough to still be worth reporting.
    pub fn is_within_relevance_window(&self, now_ms: i64) -> bool {
        crash_time_within_range(self.crash_time_ms, now_ms)
    }

    /// Symbolication requires a call stack and a binary identity matching
    /// the running process; anything else gets format-only treatment.
    pub fn can_symbolicate(&self, running: &BinaryIdentity) -> bool {
        self.call_stack_tree.is_some() && self.identity.as_ref() == Some(running)
    }

    /// Session/user metadata carried on the crash beacon.
    pub fn session_meta(&self) -> BTreeMap<String, String> {
        let mut meta = BTreeMap::new();
        meta.insert("sid".into(), self.crash_session.id.to_string());
        if let Some(carrier) = &self.crash_session.carrier {
            meta.insert("cn".into(), carrier.clone());
        }
        if let Some(connection) = &self.crash_session.connection_type {
            meta.insert("ct".into(), connection.clone());
        }
        if let Some(user_id) = &self.crash_session.user_id {
            meta.insert("ui".into(), user_id.clone());
        }
        if let Some(user_name) = &self.crash_session.user_name {
            meta.insert("un".into(), user_name.clone());
        }
        if let Some(user_email) = &self.crash_session.user_email {
            meta.insert("ue".into(), user_email.clone());
        }
        if let Some(message) = &self.error_message {
            meta.insert("em".into(), message.clone());
        }
        meta
    }
}

/// A crash time is relevant when it is not in the future and not older than
/// the retention window.
pub fn crash_time_within_range(time_ms: i64, now_ms: i64) -> bool {
    time_ms <= now_ms && now_ms - time_ms < CRASH_RELEVANCE_WINDOW_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> CrashSession {
        CrashSession {
            id: Uuid::new_v4(),
            start_time_ms: 1_700_000_000_000,
            view_name: Some("home".into()),
            carrier: None,
            connection_type: None,
            user_id: None,
            user_name: None,
            user_email: None,
        }
    }

    fn payload(identity: Option<BinaryIdentity>, tree: Option<CallStackTree>) -> DiagnosticPayload {
        DiagnosticPayload {
            crash_session: session(),
            crash_group_id: Uuid::new_v4(),
            crash_type: CrashType::Crash,
            crash_time_ms: 1_700_000_100_000,
            duration_ms: 0,
            error_type: None,
            error_message: None,
            payload_version: None,
            call_stack_tree: tree,
            identity,
            app_version: None,
            device_type: None,
            platform_architecture: None,
            exception_type: None,
            exception_code: None,
            signal: None,
            termination_reason: None,
            virtual_memory_region_info: None,
            total_cpu_time: None,
            total_sampled_time: None,
            writes_caused: None,
            hang_duration: None,
            launch_duration: None,
        }
    }

    fn identity() -> BinaryIdentity {
        BinaryIdentity {
            bundle_identifier: "com.example.app".into(),
            app_build_version: "421".into(),
            os_version: "17.4".into(),
        }
    }

    fn empty_tree() -> CallStackTree {
        CallStackTree {
            call_stacks: Vec::new(),
            call_stack_per_thread: Some(true),
        }
    }

    #[test]
    fn symbolication_requires_matching_identity_and_call_stack() {
        let running = identity();
        assert!(payload(Some(identity()), Some(empty_tree())).can_symbolicate(&running));
        assert!(!payload(None, Some(empty_tree())).can_symbolicate(&running));
        assert!(!payload(Some(identity()), None).can_symbolicate(&running));

        let mut other = identity();
        other.app_build_version = "422".into();
        assert!(!payload(Some(other), Some(empty_tree())).can_symbolicate(&running));
    }

    #[test]
    fn relevance_window_rejects_future_and_ancient_times() {
        let now = 1_700_000_000_000;
        assert!(crash_time_within_range(now - 1000, now));
        assert!(!crash_time_within_range(now + 1000, now));
        assert!(!crash_time_within_range(now - 91 * 24 * 3600 * 1000, now));
    }

    #[test]
    fn frame_flattening_preserves_depth_first_order() {
        let leaf = Frame {
            binary_uuid: None,
            offset_into_binary_text_segment: None,
            sample_count: None,
            sub_frames: None,
            binary_name: Some("leaf".into()),
            address: None,
        };
        let root = Frame {
            binary_uuid: None,
            offset_into_binary_text_segment: None,
            sample_count: None,
            sub_frames: Some(vec![leaf]),
            binary_name: Some("root".into()),
            address: None,
        };
        let thread = DiagnosticThread {
            thread_attributed: Some(true),
            call_stack_root_frames: vec![root],
        };
        let names: Vec<_> = thread
            .frames()
            .iter()
            .map(|f| f.binary_name.clone().unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["root", "leaf"]);
    }
}
