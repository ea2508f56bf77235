//! Batch manifest output.
//!
//! The manifest is what an archive packager consumes: one record per item
//! result followed by a single summary record. JSON Lines streams records as
//! items resolve; JSON buffers them into one document written at the end.

use crate::types::{BatchSummary, ItemResult};
use serde::Serialize;
use std::io::{self, Write};

/// Manifest format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One document `{"items": [...], "summary": {...}}`
    Json,
    /// One record per line, tagged with `"record"`
    JsonLines,
}

impl OutputFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum ManifestRecord<'a> {
    Item(&'a ItemResult),
    Summary(&'a BatchSummary),
}

#[derive(Serialize)]
struct ManifestDocument<'a> {
    items: &'a [ItemResult],
    summary: &'a BatchSummary,
}

/// Writes item results and the final summary.
pub struct ManifestWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    pretty: bool,
    buffered: Vec<ItemResult>,
    items_written: usize,
}

impl<W: Write> ManifestWriter<W> {
    /// `pretty` only affects the JSON format.
    pub fn new(writer: W, format: OutputFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
            buffered: Vec::new(),
            items_written: 0,
        }
    }

    pub fn write_item(&mut self, item: &ItemResult) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => self.buffered.push(item.clone()),
            OutputFormat::JsonLines => {
                serde_json::to_writer(&mut self.writer, &ManifestRecord::Item(item))
                    .map_err(io::Error::other)?;
                writeln!(self.writer)?;
                // Packagers may tail the file while the batch runs.
                self.writer.flush()?;
            }
        }
        self.items_written += 1;
        Ok(())
    }

    /// Write the summary and flush. Consumes the writer.
    pub fn finish(mut self, summary: &BatchSummary) -> io::Result<W> {
        match self.format {
            OutputFormat::Json => {
                let document = ManifestDocument {
                    items: &self.buffered,
                    summary,
                };
                if self.pretty {
                    serde_json::to_writer_pretty(&mut self.writer, &document)
                        .map_err(io::Error::other)?;
                } else {
                    serde_json::to_writer(&mut self.writer, &document)
                        .map_err(io::Error::other)?;
                }
            }
            OutputFormat::JsonLines => {
                serde_json::to_writer(&mut self.writer, &ManifestRecord::Summary(summary))
                    .map_err(io::Error::other)?;
            }
        }
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    pub fn items_written(&self) -> usize {
        self.items_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GenerationMetadata, GenerationMode, ItemState};
    use serde_json::Value;

    fn item(sequence_id: usize) -> ItemResult {
        ItemResult {
            sequence_id,
            mode: GenerationMode::Single,
            provider_id: "fal".to_string(),
            state: ItemState::Completed,
            prompt: format!("prompt {sequence_id}"),
            edit_prompt: None,
            primary: Some(format!("https://cdn.test/{sequence_id}.png")),
            derived: None,
            caption: Some("a caption".to_string()),
            failure: None,
            metadata: GenerationMetadata::default(),
        }
    }

    fn summary() -> BatchSummary {
        BatchSummary {
            completed: 2,
            failed: 0,
            total: 2,
            stopped: false,
            elapsed_ms: 10,
        }
    }

    #[test]
    fn test_jsonl_tags_records() {
        let mut writer = ManifestWriter::new(Vec::new(), OutputFormat::JsonLines, false);
        writer.write_item(&item(1)).unwrap();
        writer.write_item(&item(2)).unwrap();
        assert_eq!(writer.items_written(), 2);
        let buffer = writer.finish(&summary()).unwrap();

        let output = String::from_utf8(buffer).unwrap();
        let lines: Vec<Value> = output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["record"], "item");
        assert_eq!(lines[0]["state"], "COMPLETED");
        assert_eq!(lines[1]["sequence_id"], 2);
        assert_eq!(lines[2]["record"], "summary");
        assert_eq!(lines[2]["total"], 2);
    }

    #[test]
    fn test_json_document() {
        let mut writer = ManifestWriter::new(Vec::new(), OutputFormat::Json, true);
        writer.write_item(&item(1)).unwrap();
        let buffer = writer.finish(&summary()).unwrap();

        let doc: Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(doc["items"].as_array().unwrap().len(), 1);
        assert_eq!(doc["summary"]["completed"], 2);
        assert!(doc["items"][0].get("derived").is_none());
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(OutputFormat::parse("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("JSONL"), Some(OutputFormat::JsonLines));
        assert_eq!(OutputFormat::parse("ndjson"), Some(OutputFormat::JsonLines));
        assert_eq!(OutputFormat::parse("csv"), None);
    }
}
