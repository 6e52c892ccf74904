use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex};

use crate::domain::{Operation, OperationId, format_amount, format_timestamp};

use super::PipelineError;

/// CSV header, matching the persisted operation columns.
pub const CSV_HEADER: [&str; 6] = [
    "id",
    "operation",
    "wallet_from",
    "wallet_to",
    "amount",
    "created_at",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExportFormat {
    Csv,
    #[default]
    Json,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/x-ndjson",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "jsonl",
        }
    }

    /// Build the marshaler for this format on top of an open file.
    /// The CSV variant writes its header immediately.
    pub fn marshaler(self, file: File) -> Result<Arc<dyn Marshaler>, PipelineError> {
        let marshaler: Arc<dyn Marshaler> = match self {
            ExportFormat::Csv => Arc::new(CsvMarshaler::new(file)?),
            ExportFormat::Json => Arc::new(JsonMarshaler::new(file)),
        };
        Ok(marshaler)
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Format-specific body of one serialized operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    CsvRow(Vec<String>),
    JsonLine(Vec<u8>),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::CsvRow(_) => "csv",
            Payload::JsonLine(_) => "json",
        }
    }
}

/// One operation on its way from the marshal stage to the write stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarshalledResult {
    pub id: OperationId,
    pub payload: Payload,
}

/// Turns operations into serialized chunks and appends them to an output.
///
/// Writes go through a lock, so one marshaler can be shared by callers that
/// don't coordinate with each other.
pub trait Marshaler: Send + Sync {
    fn name(&self) -> &'static str;

    fn marshal(&self, op: &Operation) -> Result<MarshalledResult, PipelineError>;

    fn write(&self, record: &MarshalledResult) -> Result<(), PipelineError>;

    /// Push buffered output to the underlying writer.
    fn flush(&self) -> Result<(), PipelineError>;
}

// ========================
// CSV
// ========================

pub struct CsvMarshaler<W: Write> {
    writer: Mutex<csv::Writer<W>>,
}

impl<W: Write> CsvMarshaler<W> {
    pub fn new(writer: W) -> Result<Self, PipelineError> {
        let mut writer = csv::Writer::from_writer(writer);
        writer
            .write_record(CSV_HEADER)
            .map_err(|e| PipelineError::Flush(io::Error::other(e)))?;
        Ok(Self {
            writer: Mutex::new(writer),
        })
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(self) -> Result<W, PipelineError> {
        self.writer
            .into_inner()
            .map_err(|_| PipelineError::Poisoned)?
            .into_inner()
            .map_err(|e| PipelineError::Flush(io::Error::new(e.error().kind(), e.error().to_string())))
    }
}

impl<W: Write + Send> Marshaler for CsvMarshaler<W> {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn marshal(&self, op: &Operation) -> Result<MarshalledResult, PipelineError> {
        Ok(MarshalledResult {
            id: op.id,
            payload: Payload::CsvRow(vec![
                op.id.to_string(),
                op.kind.as_str().to_string(),
                op.wallet_from.unwrap_or(0).to_string(),
                op.wallet_to.to_string(),
                format_amount(op.amount),
                format_timestamp(op.created_at),
            ]),
        })
    }

    fn write(&self, record: &MarshalledResult) -> Result<(), PipelineError> {
        let Payload::CsvRow(row) = &record.payload else {
            return Err(PipelineError::PayloadMismatch {
                marshaler: self.name(),
                payload: record.payload.kind(),
            });
        };

        let mut writer = self.writer.lock().map_err(|_| PipelineError::Poisoned)?;
        writer
            .write_record(row)
            .map_err(|e| PipelineError::Write {
                id: record.id,
                source: io::Error::other(e),
            })
    }

    fn flush(&self) -> Result<(), PipelineError> {
        self.writer
            .lock()
            .map_err(|_| PipelineError::Poisoned)?
            .flush()
            .map_err(PipelineError::Flush)
    }
}

// ========================
// JSON lines
// ========================

pub struct JsonMarshaler<W: Write> {
    writer: Mutex<BufWriter<W>>,
}

impl<W: Write> JsonMarshaler<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
        }
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(self) -> Result<W, PipelineError> {
        self.writer
            .into_inner()
            .map_err(|_| PipelineError::Poisoned)?
            .into_inner()
            .map_err(|e| PipelineError::Flush(e.into_error()))
    }
}

impl<W: Write + Send> Marshaler for JsonMarshaler<W> {
    fn name(&self) -> &'static str {
        "json"
    }

    fn marshal(&self, op: &Operation) -> Result<MarshalledResult, PipelineError> {
        let mut line = serde_json::to_vec(op).map_err(|e| PipelineError::Marshal {
            id: op.id,
            reason: e.to_string(),
        })?;
        line.push(b'\n');
        Ok(MarshalledResult {
            id: op.id,
            payload: Payload::JsonLine(line),
        })
    }

    fn write(&self, record: &MarshalledResult) -> Result<(), PipelineError> {
        let Payload::JsonLine(line) = &record.payload else {
            return Err(PipelineError::PayloadMismatch {
                marshaler: self.name(),
                payload: record.payload.kind(),
            });
        };

        let mut writer = self.writer.lock().map_err(|_| PipelineError::Poisoned)?;
        writer
            .write_all(line)
            .map_err(|source| PipelineError::Write {
                id: record.id,
                source,
            })
    }

    fn flush(&self) -> Result<(), PipelineError> {
        self.writer
            .lock()
            .map_err(|_| PipelineError::Poisoned)?
            .flush()
            .map_err(PipelineError::Flush)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Amount, OperationKind};
    use chrono::{DateTime, Utc};

    fn operation(id: OperationId, wallet_from: Option<i64>) -> Operation {
        Operation {
            id,
            kind: OperationKind::Deposit,
            wallet_from,
            wallet_to: 2,
            amount: Amount::new(4000, 2),
            created_at: DateTime::parse_from_rfc3339("2024-01-15T10:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn test_csv_writes_header_and_rows() {
        let marshaler = CsvMarshaler::new(Vec::new()).unwrap();
        let record = marshaler.marshal(&operation(1, Some(1))).unwrap();
        marshaler.write(&record).unwrap();

        let output = String::from_utf8(marshaler.into_inner().unwrap()).unwrap();
        assert_eq!(
            output,
            "id,operation,wallet_from,wallet_to,amount,created_at\n\
             1,deposit,1,2,40,2024-01-15T10:30:00.000000Z\n"
        );
    }

    #[test]
    fn test_csv_renders_missing_source_as_zero() {
        let marshaler = CsvMarshaler::new(Vec::new()).unwrap();
        let record = marshaler.marshal(&operation(5, None)).unwrap();
        match record.payload {
            Payload::CsvRow(row) => assert_eq!(row[2], "0"),
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_json_writes_one_object_per_line() {
        let marshaler = JsonMarshaler::new(Vec::new());
        for id in [1, 2] {
            let record = marshaler.marshal(&operation(id, None)).unwrap();
            marshaler.write(&record).unwrap();
        }

        let output = String::from_utf8(marshaler.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["id"], 1);
        assert_eq!(first["operation"], "deposit");
        assert_eq!(first["wallet_from"], serde_json::Value::Null);
        assert_eq!(first["amount"], "40.00");
        assert_eq!(first["created_at"], "2024-01-15T10:30:00.000000Z");
    }

    #[test]
    fn test_empty_json_output_is_empty() {
        let marshaler = JsonMarshaler::new(Vec::new());
        marshaler.flush().unwrap();
        assert!(marshaler.into_inner().unwrap().is_empty());
    }

    #[test]
    fn test_payload_mismatch_is_rejected() {
        let marshaler = JsonMarshaler::new(Vec::new());
        let record = MarshalledResult {
            id: 1,
            payload: Payload::CsvRow(vec!["1".into()]),
        };
        assert!(matches!(
            marshaler.write(&record),
            Err(PipelineError::PayloadMismatch { .. })
        ));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!(ExportFormat::from_str("csv"), Some(ExportFormat::Csv));
        assert_eq!(ExportFormat::from_str("JSON"), Some(ExportFormat::Json));
        assert_eq!(ExportFormat::from_str("xml"), None);
        assert_eq!(ExportFormat::default(), ExportFormat::Json);
    }
}
