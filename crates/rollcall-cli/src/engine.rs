use chrono::NaiveDateTime;
use rollcall_core::{BoundingBox, Frame};
use rollcall_store::AttendanceRecord;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::session::{FrameReport, RemoveOutcome, Session, SessionError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Messages sent from callers to the engine thread.
enum EngineRequest {
    ProcessFrame {
        frame: Frame,
        faces: Vec<BoundingBox>,
        now: NaiveDateTime,
        reply: Reply<FrameReport>,
    },
    BeginEnrollment {
        name: String,
        reply: Reply<()>,
    },
    CancelEnrollment {
        reply: oneshot::Sender<Option<(String, usize)>>,
    },
    Remove {
        name: String,
        reply: Reply<RemoveOutcome>,
    },
    Roster {
        reply: oneshot::Sender<Vec<(String, usize)>>,
    },
    Attendance {
        reply: Reply<Vec<AttendanceRecord>>,
    },
}

/// Clone-safe handle to the engine thread.
///
/// The thread is the only owner of the profile store and the ledger; every
/// request is handled to completion before the next one is read.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Match, attribute, mark and learn from one frame.
    pub async fn process_frame(
        &self,
        frame: Frame,
        faces: Vec<BoundingBox>,
        now: NaiveDateTime,
    ) -> Result<FrameReport, EngineError> {
        let report = self
            .call(|reply| EngineRequest::ProcessFrame {
                frame,
                faces,
                now,
                reply,
            })
            .await??;
        Ok(report)
    }

    pub async fn begin_enrollment(&self, name: &str) -> Result<(), EngineError> {
        let name = name.to_string();
        self.call(|reply| EngineRequest::BeginEnrollment { name, reply })
            .await??;
        Ok(())
    }

    pub async fn cancel_enrollment(&self) -> Result<Option<(String, usize)>, EngineError> {
        self.call(|reply| EngineRequest::CancelEnrollment { reply })
            .await
    }

    pub async fn remove(&self, name: &str) -> Result<RemoveOutcome, EngineError> {
        let name = name.to_string();
        let outcome = self
            .call(|reply| EngineRequest::Remove { name, reply })
            .await??;
        Ok(outcome)
    }

    /// Enrolled names with their reference sample counts.
    pub async fn roster(&self) -> Result<Vec<(String, usize)>, EngineError> {
        self.call(|reply| EngineRequest::Roster { reply }).await
    }

    pub async fn attendance(&self) -> Result<Vec<AttendanceRecord>, EngineError> {
        let records = self
            .call(|reply| EngineRequest::Attendance { reply })
            .await??;
        Ok(records)
    }
}

/// Spawn the engine on a dedicated OS thread that takes ownership of `session`.
pub fn spawn_engine(mut session: Session) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::ProcessFrame {
                        frame,
                        faces,
                        now,
                        reply,
                    } => {
                        let result = session.process_frame(&frame, &faces, now);
                        if let Ok(report) = &result {
                            tracing::debug!(faces = faces.len(), status = %report.status, "frame processed");
                        }
                        let _ = reply.send(result);
                    }
                    EngineRequest::BeginEnrollment { name, reply } => {
                        let _ = reply.send(session.begin_enrollment(&name));
                    }
                    EngineRequest::CancelEnrollment { reply } => {
                        let _ = reply.send(session.cancel_enrollment());
                    }
                    EngineRequest::Remove { name, reply } => {
                        let _ = reply.send(session.remove_identity(&name));
                    }
                    EngineRequest::Roster { reply } => {
                        let _ = reply.send(session.roster());
                    }
                    EngineRequest::Attendance { reply } => {
                        let _ = reply.send(session.attendance());
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}
