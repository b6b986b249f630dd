use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;

use crate::Error;
use crate::state::AcState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandLogMode {
    /// Every attempt, including failures.
    Full,
    /// Only successful operations that changed the mirror.
    Changes,
}

/// Append-only NDJSON record of the commands a controller sent.
pub(crate) struct CommandLog {
    mode: CommandLogMode,
    unit: String,
    file: File,
}

pub(crate) struct Entry<'a> {
    pub action: &'a str,
    pub command_id: Option<&'a str>,
    pub before: AcState,
    pub after: AcState,
    pub error: Option<&'a Error>,
}

impl CommandLog {
    pub fn new(mode: CommandLogMode, path: impl AsRef<Path>, unit: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            unit: unit.to_string(),
            file,
        })
    }

    pub fn record(&mut self, entry: &Entry<'_>) {
        match self.mode {
            CommandLogMode::Full => {
                let line = json!({
                    "ts": Utc::now().to_rfc3339(),
                    "unit": self.unit,
                    "action": entry.action,
                    "command_id": entry.command_id,
                    "before": entry.before,
                    "after": entry.after,
                    "ok": entry.error.is_none(),
                    "error": entry.error.map(|e| e.to_string()),
                });
                self.write_line(&line);
            }
            CommandLogMode::Changes => {
                if entry.error.is_some() {
                    return;
                }
                let changes = state_changes(&entry.before, &entry.after);
                if changes.is_empty() {
                    return;
                }
                let line = json!({
                    "ts": Utc::now().to_rfc3339(),
                    "unit": self.unit,
                    "action": entry.action,
                    "command_id": entry.command_id,
                    "changes": changes,
                });
                self.write_line(&line);
            }
        }
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write command log entry: {e}");
        }
    }
}

fn state_changes(before: &AcState, after: &AcState) -> Vec<Value> {
    let (Ok(Value::Object(old)), Ok(Value::Object(new))) =
        (serde_json::to_value(before), serde_json::to_value(after))
    else {
        return Vec::new();
    };
    new.iter()
        .filter(|(field, value)| old.get(*field) != Some(*value))
        .map(|(field, value)| {
            json!({ "field": field, "old": old.get(field), "new": value })
        })
        .collect()
}
