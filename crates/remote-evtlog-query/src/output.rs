//! Output framing for rendered records.

use std::{fmt::Write as _, io::Write};

use remote_evtlog_core::{OutputMode, StructuredRecord};

/// Column names of the delimited header row.
pub const DELIMITED_HEADER: &str =
    "RecordID||EventID||Channel||Provider||Computer||TimeCreated||Task||Level\n";

/// Field and record separator of the delimited format.
pub const DELIMITER: &str = "||";

/// Writes records to `W` with the framing `mode` requires.
///
/// Delimited output gets one header row and a [`DELIMITER`] before every
/// record but the first. Structured output is one JSON object per record
/// with nothing between them.
pub struct RecordWriter<W: Write> {
    out: W,
    mode: OutputMode,
    written: usize,
}

impl<W: Write> RecordWriter<W> {
    pub const fn new(out: W, mode: OutputMode) -> Self {
        Self {
            out,
            mode,
            written: 0,
        }
    }

    /// Emit the header row, if the format has one.
    ///
    /// # Errors
    /// Returns error if the sink rejects the write.
    pub fn begin(&mut self) -> std::io::Result<()> {
        if self.mode == OutputMode::Delimited {
            self.out.write_all(DELIMITED_HEADER.as_bytes())?;
        }
        Ok(())
    }

    /// Emit one record.
    ///
    /// # Errors
    /// Returns error if the sink rejects the write.
    pub fn write_record(&mut self, record: &StructuredRecord) -> std::io::Result<()> {
        let line = match self.mode {
            OutputMode::Structured => to_json(record),
            OutputMode::Delimited => {
                let row = to_delimited(record);
                if self.written == 0 {
                    row
                } else {
                    format!("{DELIMITER}{row}")
                }
            }
        };
        self.out.write_all(line.as_bytes())?;
        self.written += 1;
        Ok(())
    }

    /// Records written so far.
    #[must_use]
    pub const fn written(&self) -> usize {
        self.written
    }

    /// Flush and return the sink.
    ///
    /// # Errors
    /// Returns error if flushing fails.
    pub fn finish(mut self) -> std::io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// One JSON object in the fixed field order. The message is already
/// backslash-escaped, so only quotes and control characters are escaped here.
#[must_use]
pub fn to_json(record: &StructuredRecord) -> String {
    let mut json = String::with_capacity(256);
    json.push('{');
    let fields = [
        ("record_id", record.record_id.to_string()),
        ("event_id", record.event_id.clone()),
        ("logname", record.channel.clone()),
        ("source", record.provider_name.clone()),
        ("computer", record.computer.clone()),
        ("time_created", record.time_created.clone()),
        ("task", record.task.clone()),
        ("level", record.level.clone()),
    ];
    for (name, value) in &fields {
        push_json_str(&mut json, name);
        json.push(':');
        push_json_str(&mut json, value);
        json.push(',');
    }
    push_json_str(&mut json, "message");
    json.push_str(":\"");
    push_escaped_message(&mut json, &record.message);
    json.push_str("\"}");
    json
}

fn push_json_str(json: &mut String, value: &str) {
    // Serializing a str cannot fail.
    match serde_json::to_string(value) {
        Ok(quoted) => json.push_str(&quoted),
        Err(_) => json.push_str("\"\""),
    }
}

fn push_escaped_message(json: &mut String, message: &str) {
    for c in message.chars() {
        match c {
            '"' => json.push_str("\\\""),
            '\n' => json.push_str("\\n"),
            '\r' => json.push_str("\\r"),
            '\t' => json.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(json, "\\u{:04x}", u32::from(c));
            }
            c => json.push(c),
        }
    }
}

/// One delimited row, never containing a newline.
#[must_use]
pub fn to_delimited(record: &StructuredRecord) -> String {
    let mut row = [
        record.record_id.to_string(),
        flatten(&record.event_id),
        flatten(&record.channel),
        flatten(&record.provider_name),
        flatten(&record.computer),
        flatten(&record.time_created),
        flatten(&record.task),
        flatten(&record.level),
    ]
    .join(DELIMITER);
    if !record.message.is_empty() {
        row.push_str(DELIMITER);
        row.push_str(&flatten(&record.message));
    }
    row
}

fn flatten(field: &str) -> String {
    field.replace('\r', "\\r").replace('\n', "\\n")
}
