//! Operation export pipeline.
//!
//! Three stages run concurrently and hand records along bounded channels:
//!
//! ```text
//! read (task) ──Envelope<Operation>──▶ marshal (task) ──Envelope<MarshalledResult>──▶ write (blocking thread)
//!      │                                    │                                              │
//!      └──────────────── first failure ─────┴──────────────▶ error slot ◀──────────────────┘
//! ```
//!
//! A failing stage records its error in the single-slot error channel and sends
//! `Failed` downstream. Stages stop on `EndOfStream`/`Failed`, or when the
//! next stage has gone away, so a failure anywhere drains the whole pipeline.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::domain::{Operation, OperationFilter};
use crate::storage::{Database, OperationStore};

use super::{Marshaler, MarshalledResult, PipelineError, Stage};

/// Per-record signal passed between stages.
#[derive(Debug)]
pub enum Envelope<T> {
    Data(T),
    EndOfStream,
    /// The named stage failed; its error is in the error slot.
    Failed(Stage),
}

/// Counts reported by a successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub read: u64,
    pub marshalled: u64,
    pub written: u64,
}

/// Holds the first error reported by any stage. Later ones are logged and dropped.
#[derive(Clone)]
struct ErrorSlot(mpsc::Sender<PipelineError>);

impl ErrorSlot {
    fn new() -> (Self, mpsc::Receiver<PipelineError>) {
        let (tx, rx) = mpsc::channel(1);
        (Self(tx), rx)
    }

    fn report(&self, stage: Stage, err: PipelineError) {
        warn!(%stage, error = %err, "export stage failed");
        match self.0.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(err)) => {
                debug!(%stage, error = %err, "export error dropped, an earlier stage already failed");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

pub struct ExportPipeline {
    db: Database,
    channel_capacity: usize,
}

impl ExportPipeline {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            channel_capacity: 1,
        }
    }

    /// Records buffered per channel hop. At least one.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Stream every operation matching `filter` through `marshaler`.
    ///
    /// Waits for all three stages, flushes the marshaler, then returns the
    /// first stage error if there was one. Output order is log order.
    pub async fn run(
        &self,
        filter: OperationFilter,
        marshaler: Arc<dyn Marshaler>,
    ) -> Result<ExportSummary, PipelineError> {
        let (ops_tx, ops_rx) = mpsc::channel(self.channel_capacity);
        let (records_tx, records_rx) = mpsc::channel(self.channel_capacity);
        let (errors, mut first_error) = ErrorSlot::new();

        debug!(format = marshaler.name(), ?filter, "export pipeline starting");

        let read = tokio::spawn(read_stage(
            self.db.clone(),
            filter,
            ops_tx,
            errors.clone(),
        ));
        let marshal = tokio::spawn(marshal_stage(
            ops_rx,
            records_tx,
            marshaler.clone(),
            errors.clone(),
        ));
        let write = tokio::task::spawn_blocking({
            let marshaler = marshaler.clone();
            move || write_stage(records_rx, marshaler, errors)
        });

        let (read, marshal, write) = tokio::join!(read, marshal, write);

        let flushed = tokio::task::spawn_blocking({
            let marshaler = marshaler.clone();
            move || marshaler.flush()
        })
        .await
        .unwrap_or_else(|e| Err(crashed(Stage::Write, e)));

        if let Ok(err) = first_error.try_recv() {
            if let Err(flush_err) = flushed {
                debug!(error = %flush_err, "flush after failed export also failed");
            }
            return Err(err);
        }

        let summary = ExportSummary {
            read: read.map_err(|e| crashed(Stage::Read, e))?,
            marshalled: marshal.map_err(|e| crashed(Stage::Marshal, e))?,
            written: write.map_err(|e| crashed(Stage::Write, e))?,
        };
        flushed?;

        info!(
            format = marshaler.name(),
            written = summary.written,
            "export pipeline finished"
        );
        Ok(summary)
    }
}

fn crashed(stage: Stage, err: JoinError) -> PipelineError {
    PipelineError::StageCrashed {
        stage,
        reason: err.to_string(),
    }
}

async fn read_stage(
    db: Database,
    filter: OperationFilter,
    out: mpsc::Sender<Envelope<Operation>>,
    errors: ErrorSlot,
) -> u64 {
    let mut conn = match db.acquire().await {
        Ok(conn) => conn,
        Err(e) => {
            errors.report(Stage::Read, PipelineError::Read(e));
            let _ = out.send(Envelope::Failed(Stage::Read)).await;
            return 0;
        }
    };

    let mut rows = OperationStore::new(&mut conn).stream(&filter);
    let mut count = 0;

    while let Some(row) = rows.next().await {
        match row {
            Ok(op) => {
                if out.send(Envelope::Data(op)).await.is_err() {
                    debug!("marshal stage gone, read stage stopping");
                    return count;
                }
                count += 1;
            }
            Err(e) => {
                errors.report(Stage::Read, PipelineError::Read(e));
                let _ = out.send(Envelope::Failed(Stage::Read)).await;
                return count;
            }
        }
    }

    let _ = out.send(Envelope::EndOfStream).await;
    count
}

async fn marshal_stage(
    mut input: mpsc::Receiver<Envelope<Operation>>,
    out: mpsc::Sender<Envelope<MarshalledResult>>,
    marshaler: Arc<dyn Marshaler>,
    errors: ErrorSlot,
) -> u64 {
    let mut count = 0;

    while let Some(envelope) = input.recv().await {
        match envelope {
            Envelope::Data(op) => match marshaler.marshal(&op) {
                Ok(record) => {
                    if out.send(Envelope::Data(record)).await.is_err() {
                        debug!("write stage gone, marshal stage stopping");
                        return count;
                    }
                    count += 1;
                }
                Err(e) => {
                    errors.report(Stage::Marshal, e);
                    let _ = out.send(Envelope::Failed(Stage::Marshal)).await;
                    return count;
                }
            },
            Envelope::EndOfStream => {
                let _ = out.send(Envelope::EndOfStream).await;
                return count;
            }
            Envelope::Failed(stage) => {
                let _ = out.send(Envelope::Failed(stage)).await;
                return count;
            }
        }
    }

    // Upstream hung up without a terminal signal.
    let _ = out.send(Envelope::Failed(Stage::Read)).await;
    count
}

fn write_stage(
    mut input: mpsc::Receiver<Envelope<MarshalledResult>>,
    marshaler: Arc<dyn Marshaler>,
    errors: ErrorSlot,
) -> u64 {
    let mut written = 0;

    while let Some(envelope) = input.blocking_recv() {
        match envelope {
            Envelope::Data(record) => {
                if let Err(e) = marshaler.write(&record) {
                    errors.report(Stage::Write, e);
                    return written;
                }
                written += 1;
            }
            Envelope::EndOfStream => break,
            Envelope::Failed(stage) => {
                debug!(%stage, "upstream stage failed, write stage stopping");
                break;
            }
        }
    }

    written
}
