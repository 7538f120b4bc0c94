//! Turns a diagnostic payload's raw call-stack tree into a [`StackTrace`]
//! document, resolving symbols when the running binary matches the payload
//! and the platform provides a resolver; otherwise format-only, with raw
//! addresses and offsets preserved.

use std::collections::HashMap;

use chrono::DateTime;
use uuid::Uuid;

use crate::payload::{DiagnosticPayload, Frame};
use crate::stack_trace::{StackBinaryImage, StackFrame, StackHeader, StackThread, StackTrace};

/// Resolved symbol for one address, plus what is known about the image it
/// lives in.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolInfo {
    pub symbol: String,
    pub offset: Option<u64>,
    pub architecture: Option<String>,
    pub image_path: Option<String>,
    pub image_size: Option<u64>,
}

/// Platform shim mapping a (binary uuid, address) pair to a symbol. The in-
/// process image table lives with the host integration, not here.
pub trait SymbolResolver: Send + Sync {
    fn resolve(&self, binary_uuid: Uuid, address: u64) -> Option<SymbolInfo>;
}

/// Build the stack-trace document. `resolver` is `Some` only when the
/// identity check allowed symbolication. Returns `None` when the payload
/// carries no call stack.
pub fn format_stack_trace(
    payload: &DiagnosticPayload,
    resolver: Option<&dyn SymbolResolver>,
) -> Option<StackTrace> {
    let tree = payload.call_stack_tree.as_ref()?;
    let mut trace = StackTrace {
        header: header_section(payload, &tree.call_stacks),
        ..StackTrace::default()
    };

    // Binary images first, so frames can reference them by index.
    let mut image_index: HashMap<String, i32> = HashMap::new();
    for thread in &tree.call_stacks {
        for frame in thread.frames() {
            let Some(placed) = PlacedFrame::from_raw(frame) else {
                continue;
            };
            if image_index.contains_key(&placed.image_uuid) {
                continue;
            }
            let resolved = resolver.and_then(|r| r.resolve(placed.raw_uuid, placed.address));
            trace.binary_images.push(binary_image(&placed, resolver.is_some(), resolved.as_ref()));
            image_index.insert(placed.image_uuid.clone(), trace.binary_images.len() as i32 - 1);
        }
    }

    for thread in &tree.call_stacks {
        let state = match thread.thread_attributed {
            Some(true) => Some("attributed".to_string()),
            _ => None,
        };
        let mut frames = Vec::new();
        for frame in thread.frames() {
            let Some(placed) = PlacedFrame::from_raw(frame) else {
                continue;
            };
            let resolved = resolver.and_then(|r| r.resolve(placed.raw_uuid, placed.address));
            frames.push(StackFrame {
                image_index: image_index.get(&placed.image_uuid).copied().unwrap_or(-1),
                binary_name: placed.binary_name.clone(),
                address: format!("{:#x}", placed.address),
                text_segment_offset: placed.text_offset.to_string(),
                sample_count: frame.sample_count.filter(|&c| c != 1),
                symbol: resolved.as_ref().map(|s| s.symbol.clone()),
                symbol_offset: resolved
                    .as_ref()
                    .and_then(|s| s.offset)
                    .map(|o| o.to_string()),
            });
        }
        trace.threads.push(StackThread { state, frames });
    }

    Some(trace)
}

/// A frame with the full identity quad present. Frames missing any of the
/// four fields are skipped in the output.
struct PlacedFrame {
    raw_uuid: Uuid,
    image_uuid: String,
    binary_name: String,
    address: u64,
    text_offset: u64,
}

impl PlacedFrame {
    fn from_raw(frame: &Frame) -> Option<Self> {
        let raw_uuid = frame.binary_uuid?;
        let text_offset = frame.offset_into_binary_text_segment?;
        let binary_name = frame.binary_name.clone()?;
        let address = frame.address?;
        Some(Self {
            raw_uuid,
            image_uuid: raw_uuid.simple().to_string(),
            binary_name,
            address,
            text_offset,
        })
    }
}

fn binary_image(
    placed: &PlacedFrame,
    symbolicating: bool,
    resolved: Option<&SymbolInfo>,
) -> StackBinaryImage {
    let end_addr = if symbolicating {
        Some(match resolved.and_then(|s| s.image_size) {
            // corrupt payloads can carry offsets near u64::MAX
            Some(size) => format!(
                "{:#x}",
                placed.text_offset.saturating_add(size).saturating_sub(1)
            ),
            None => "<unknown>".to_string(),
        })
    } else {
        None
    };
    StackBinaryImage {
        start_addr: placed.text_offset.to_string(),
        end_addr,
        name: placed.binary_name.clone(),
        arch: if symbolicating {
            Some(
                resolved
                    .and_then(|s| s.architecture.clone())
                    .unwrap_or_else(|| "<unknown>".to_string()),
            )
        } else {
            None
        },
        uuid: placed.image_uuid.clone(),
        path: if symbolicating {
            Some(resolved.and_then(|s| s.image_path.clone()).unwrap_or_default())
        } else {
            None
        },
    }
}

fn header_section(
    payload: &DiagnosticPayload,
    threads: &[crate::payload::DiagnosticThread],
) -> Vec<StackHeader> {
    let mut header = Vec::new();
    if let Some(identity) = &payload.identity {
        header.push(StackHeader::new("Identifier", &identity.bundle_identifier));
        if let Some(app_version) = &payload.app_version {
            header.push(StackHeader::new(
                "Version",
                format!("{app_version}({})", identity.app_build_version),
            ));
        }
    }
    if let Some(device) = &payload.device_type {
        header.push(StackHeader::new("Hardware Model", device));
    }
    header.push(StackHeader::new(
        "Date/Time",
        format_millis(payload.crash_time_ms),
    ));
    header.push(StackHeader::new(
        "Launch Time",
        format_millis(payload.crash_session.start_time_ms),
    ));
    if let Some(identity) = &payload.identity {
        header.push(StackHeader::new("OS Version", &identity.os_version));
    }
    if let Some(arch) = &payload.platform_architecture {
        header.push(StackHeader::new("Platform Architecture", arch));
    }
    // crash extras
    if let Some(name) = payload.exception_type.and_then(mach_exception_name) {
        header.push(StackHeader::new("Exception Type", name));
    }
    if let Some(code) = payload.exception_code {
        header.push(StackHeader::new("Exception Code", code.to_string()));
    }
    if let Some(name) = payload.signal.and_then(signal_name) {
        header.push(StackHeader::new("signal", name));
    }
    if let Some(reason) = &payload.termination_reason {
        header.push(StackHeader::new("Termination Reason", reason));
    }
    if let Some(info) = &payload.virtual_memory_region_info {
        header.push(StackHeader::new("Virtual Memory Region Info", info));
    }
    // cpu-exception extras
    if let Some(time) = &payload.total_cpu_time {
        header.push(StackHeader::new("Total CPU Time", time));
    }
    if let Some(time) = &payload.total_sampled_time {
        header.push(StackHeader::new("Total Sampled Time", time));
    }
    // disk-write extras
    if let Some(writes) = &payload.writes_caused {
        header.push(StackHeader::new("Writes Caused", writes));
    }
    // hang extras
    if let Some(duration) = &payload.hang_duration {
        header.push(StackHeader::new("Hang Duration", duration));
    }
    // app-launch extras
    if let Some(duration) = &payload.launch_duration {
        header.push(StackHeader::new("Launch Duration", duration));
    }
    if let Some(idx) = threads.iter().position(|t| t.thread_attributed == Some(true)) {
        header.push(StackHeader::new("Triggered by Thread", idx.to_string()));
    }
    header
}

fn format_millis(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S %z").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn mach_exception_name(exception_type: i64) -> Option<String> {
    let name = match exception_type {
        1 => "EXC_BAD_ACCESS",
        2 => "EXC_BAD_INSTRUCTION",
        3 => "EXC_ARITHMETIC",
        4 => "EXC_EMULATION",
        5 => "EXC_SOFTWARE",
        6 => "EXC_BREAKPOINT",
        7 => "EXC_SYSCALL",
        8 => "EXC_MACH_SYSCALL",
        9 => "EXC_RPC_ALERT",
        10 => "EXC_CRASH",
        11 => "EXC_RESOURCE",
        12 => "EXC_GUARD",
        13 => "EXC_CORPSE_NOTIFY",
        _ => return Some(exception_type.to_string()),
    };
    Some(name.to_string())
}

fn signal_name(signal: i64) -> Option<String> {
    let name = match signal {
        1 => "SIGHUP",
        2 => "SIGINT",
        3 => "SIGQUIT",
        4 => "SIGILL",
        5 => "SIGTRAP",
        6 => "SIGABRT",
        8 => "SIGFPE",
        9 => "SIGKILL",
        10 => "SIGBUS",
        11 => "SIGSEGV",
        12 => "SIGSYS",
        13 => "SIGPIPE",
        14 => "SIGALRM",
        15 => "SIGTERM",
        _ => return Some(signal.to_string()),
    };
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{BinaryIdentity, CallStackTree, CrashSession, DiagnosticThread};
    use pulse_core::beacon::CrashType;

    fn frame(uuid: Uuid, name: &str, address: u64, offset: u64) -> Frame {
        Frame {
            binary_uuid: Some(uuid),
            offset_into_binary_text_segment: Some(offset),
            sample_count: None,
            sub_frames: None,
            binary_name: Some(name.into()),
            address: Some(address),
        }
    }

    fn payload_with_tree(threads: Vec<DiagnosticThread>) -> DiagnosticPayload {
        DiagnosticPayload {
            crash_session: CrashSession {
                id: Uuid::new_v4(),
                start_time_ms: 1_700_000_000_000,
                view_name: None,
                carrier: None,
                connection_type: None,
                user_id: None,
                user_name: None,
                user_email: None,
            },
            crash_group_id: Uuid::new_v4(),
            crash_type: CrashType::Crash,
            crash_time_ms: 1_700_000_100_000,
            duration_ms: 0,
            error_type: None,
            error_message: None,
            payload_version: None,
            call_stack_tree: Some(CallStackTree {
                call_stacks: threads,
                call_stack_per_thread: Some(true),
            }),
            identity: Some(BinaryIdentity {
                bundle_identifier: "com.example.app".into(),
                app_build_version: "7".into(),
                os_version: "17.4".into(),
            }),
            app_version: Some("2.1.0".into()),
            device_type: None,
            platform_architecture: None,
            exception_type: Some(1),
            exception_code: None,
            signal: Some(11),
            termination_reason: None,
            virtual_memory_region_info: None,
            total_cpu_time: None,
            total_sampled_time: None,
            writes_caused: None,
            hang_duration: None,
            launch_duration: None,
        }
    }

    struct FixedResolver;

    impl SymbolResolver for FixedResolver {
        fn resolve(&self, _binary_uuid: Uuid, _address: u64) -> Option<SymbolInfo> {
            Some(SymbolInfo {
                symbol: "main".into(),
                offset: Some(32),
                architecture: Some("arm64".into()),
                image_path: Some("/usr/lib/App".into()),
                image_size: Some(4096),
            })
        }
    }

    #[test]
    fn images_are_deduplicated_and_referenced_by_index() {
        let uuid = Uuid::new_v4();
        let threads = vec![DiagnosticThread {
            thread_attributed: Some(true),
            call_stack_root_frames: vec![
                frame(uuid, "App", 0x1000, 64),
                frame(uuid, "App", 0x1040, 64),
            ],
        }];
        let trace = format_stack_trace(&payload_with_tree(threads), None).unwrap();

        assert_eq!(trace.binary_images.len(), 1);
        assert_eq!(trace.binary_images[0].uuid, uuid.simple().to_string());
        assert_eq!(trace.threads.len(), 1);
        assert_eq!(trace.threads[0].frames.len(), 2);
        assert!(trace.threads[0].frames.iter().all(|f| f.image_index == 0));
        assert_eq!(trace.threads[0].state.as_deref(), Some("attributed"));
    }

    #[test]
    fn format_only_output_preserves_raw_addresses_without_symbols() {
        let uuid = Uuid::new_v4();
        let threads = vec![DiagnosticThread {
            thread_attributed: None,
            call_stack_root_frames: vec![frame(uuid, "App", 0x2000, 128)],
        }];
        let trace = format_stack_trace(&payload_with_tree(threads), None).unwrap();

        let f = &trace.threads[0].frames[0];
        assert_eq!(f.address, "0x2000");
        assert_eq!(f.text_segment_offset, "128");
        assert!(f.symbol.is_none());
        assert!(trace.binary_images[0].arch.is_none());
        assert!(trace.binary_images[0].end_addr.is_none());
    }

    #[test]
    fn resolver_output_lands_on_frames_and_images() {
        let uuid = Uuid::new_v4();
        let threads = vec![DiagnosticThread {
            thread_attributed: Some(true),
            call_stack_root_frames: vec![frame(uuid, "App", 0x3000, 256)],
        }];
        let trace = format_stack_trace(&payload_with_tree(threads), Some(&FixedResolver)).unwrap();

        let f = &trace.threads[0].frames[0];
        assert_eq!(f.symbol.as_deref(), Some("main"));
        assert_eq!(f.symbol_offset.as_deref(), Some("32"));
        assert_eq!(trace.binary_images[0].arch.as_deref(), Some("arm64"));
        assert_eq!(trace.binary_images[0].path.as_deref(), Some("/usr/lib/App"));
    }

    struct OversizedImageResolver;

    impl SymbolResolver for OversizedImageResolver {
        fn resolve(&self, _binary_uuid: Uuid, _address: u64) -> Option<SymbolInfo> {
            Some(SymbolInfo {
                symbol: "main".into(),
                offset: None,
                architecture: None,
                image_path: None,
                image_size: Some(u64::MAX),
            })
        }
    }

    #[test]
    fn image_end_address_saturates_instead_of_overflowing() {
        let uuid = Uuid::new_v4();
        let threads = vec![DiagnosticThread {
            thread_attributed: Some(true),
            call_stack_root_frames: vec![frame(uuid, "App", 0x1000, u64::MAX)],
        }];
        let trace =
            format_stack_trace(&payload_with_tree(threads), Some(&OversizedImageResolver))
                .unwrap();

        // u64::MAX + u64::MAX saturates to u64::MAX before the -1
        assert_eq!(
            trace.binary_images[0].end_addr.as_deref(),
            Some("0xfffffffffffffffe")
        );
    }

    #[test]
    fn header_names_crash_signal_and_attributed_thread() {
        let uuid = Uuid::new_v4();
        let threads = vec![
            DiagnosticThread {
                thread_attributed: None,
                call_stack_root_frames: vec![frame(uuid, "App", 0x1, 1)],
            },
            DiagnosticThread {
                thread_attributed: Some(true),
                call_stack_root_frames: vec![frame(uuid, "App", 0x2, 1)],
            },
        ];
        let trace = format_stack_trace(&payload_with_tree(threads), None).unwrap();

        let find = |key: &str| {
            trace
                .header
                .iter()
                .find(|h| h.key == key)
                .map(|h| h.value.clone())
        };
        assert_eq!(find("Identifier").as_deref(), Some("com.example.app"));
        assert_eq!(find("Version").as_deref(), Some("2.1.0(7)"));
        assert_eq!(find("Exception Type").as_deref(), Some("EXC_BAD_ACCESS"));
        assert_eq!(find("signal").as_deref(), Some("SIGSEGV"));
        assert_eq!(find("Triggered by Thread").as_deref(), Some("1"));
    }
}
