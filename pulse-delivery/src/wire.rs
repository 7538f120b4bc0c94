//! Wire serialization — explicit, statically-typed field list per beacon
//! category. One `key<TAB>value` line per field, keys sorted, beacons joined
//! by a blank line.

use std::collections::BTreeMap;

use pulse_core::beacon::{BeaconKind, BeaconRecord, PerfMetric};
use pulse_core::constants::MAX_URL_LENGTH;
use pulse_core::errors::AgentResult;
use pulse_core::traits::IBeaconSerializer;

/// Default collector wire format.
#[derive(Debug, Default)]
pub struct WireSerializer;

impl IBeaconSerializer for WireSerializer {
    fn serialize(&self, records: &[BeaconRecord]) -> AgentResult<Vec<u8>> {
        let rendered: Vec<String> = records.iter().map(render_record).collect();
        Ok(rendered.join("\n\n").into_bytes())
    }
}

/// Strip characters that would corrupt the line format. Values never contain
/// raw newlines or tabs on the wire.
fn clean(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\t', " ")
}

fn truncate_url(url: &str) -> String {
    if url.len() <= MAX_URL_LENGTH {
        return url.to_string();
    }
    let mut cut = MAX_URL_LENGTH;
    while !url.is_char_boundary(cut) {
        cut -= 1;
    }
    url[..cut].to_string()
}

struct FieldWriter {
    fields: BTreeMap<String, String>,
}

impl FieldWriter {
    fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    fn put(&mut self, key: &str, value: impl ToString) {
        let value = value.to_string();
        if !value.is_empty() {
            self.fields.insert(key.to_string(), clean(&value));
        }
    }

    fn put_opt(&mut self, key: &str, value: &Option<impl ToString>) {
        if let Some(value) = value {
            self.put(key, value.to_string());
        }
    }

    fn put_meta(&mut self, prefix: &str, meta: &BTreeMap<String, String>) {
        for (key, value) in meta {
            if !value.is_empty() {
                self.put(&format!("{prefix}_{key}"), value);
            }
        }
    }

    fn render(self) -> String {
        let lines: Vec<String> = self
            .fields
            .into_iter()
            .map(|(k, v)| format!("{k}\t{v}"))
            .collect();
        lines.join("\n")
    }
}

fn render_record(record: &BeaconRecord) -> String {
    let mut w = FieldWriter::new();
    w.put("bid", record.id.as_str());
    w.put("ti", record.timestamp_ms);
    // an unresolved deferred-view placeholder never goes on the wire
    if !record.has_deferred_view() {
        w.put_opt("v", &record.view_name);
    }

    match &record.kind {
        BeaconKind::SessionStart { session_id } => {
            w.put("t", "sessionStart");
            w.put("sid", session_id);
        }
        BeaconKind::HttpRequest(data) => {
            w.put("t", "httpRequest");
            w.put("hm", &data.method);
            w.put("hu", truncate_url(&data.url));
            w.put_opt("hp", &data.path);
            w.put("hs", data.response_code);
            w.put("d", data.duration_ms);
            if let Some(size) = &data.response_size {
                w.put_opt("trs", &size.header_bytes);
                w.put_opt("ebs", &size.body_bytes);
                w.put_opt("dbs", &size.decoded_body_bytes);
            }
            w.put_opt("bt", &data.backend_tracing_id);
            w.put_opt("em", &data.error_message);
        }
        BeaconKind::ViewChange { view } => {
            w.put("t", "viewChange");
            w.put("v", view);
        }
        BeaconKind::Custom(data) => {
            w.put("t", "custom");
            w.put("cen", &data.name);
            w.put_opt("d", &data.duration_ms);
            w.put_opt("bt", &data.backend_tracing_id);
            w.put_opt("em", &data.error_message);
            w.put_meta("m", &data.meta);
        }
        BeaconKind::Crash(data) => {
            w.put("t", "crash");
            w.put("mg", data.group_id);
            w.put("mt", data.crash_type);
            w.put("ver", &data.payload_version);
            w.put("sym", u8::from(data.symbolicated));
            w.put("st", &data.stack_trace);
            w.put_meta("m", &data.meta);
        }
        BeaconKind::Performance(metric) => {
            w.put("t", "performance");
            match metric {
                PerfMetric::AppLaunch { phase, duration_ms } => {
                    w.put("pst", "appLaunch");
                    w.put("alp", format!("{phase:?}").to_lowercase());
                    w.put("d", duration_ms);
                }
                PerfMetric::LowMemory {
                    used_bytes,
                    available_bytes,
                } => {
                    w.put("pst", "lowMemory");
                    w.put_opt("mub", used_bytes);
                    w.put_opt("mab", available_bytes);
                }
                PerfMetric::AppNotResponding { duration_ms } => {
                    w.put("pst", "anr");
                    w.put("d", duration_ms);
                }
            }
        }
    }
    w.render()
}
