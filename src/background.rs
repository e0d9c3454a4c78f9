//! File de tâches d'arrière-plan bornée, avec un worker supervisé.
//!
//! Une tâche soumise n'est jamais perdue en silence : son échec (ou sa
//! panique) est journalisé et publié sur le canal de comptes rendus.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error};

type Job = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(String),
    Panicked(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub name: String,
    pub outcome: JobOutcome,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SubmitError {
    #[error("background queue is full")]
    Full,
    #[error("background queue is shut down")]
    Closed,
}

pub struct BackgroundQueue {
    sender: Option<SyncSender<(String, Job)>>,
    reports: Receiver<JobReport>,
    worker: Option<JoinHandle<()>>,
}

impl BackgroundQueue {
    /// `capacity` borne à la fois les tâches en attente et les comptes rendus
    /// non lus (les plus récents sont alors seulement journalisés).
    pub fn new(capacity: usize) -> std::io::Result<Self> {
        let (tx, rx) = sync_channel::<(String, Job)>(capacity);
        let (report_tx, report_rx) = sync_channel::<JobReport>(capacity.max(1));
        let worker = thread::Builder::new()
            .name("releve-background".into())
            .spawn(move || {
                for (name, job) in rx {
                    let outcome = match catch_unwind(AssertUnwindSafe(job)) {
                        Ok(Ok(())) => {
                            debug!(job = %name, "background job done");
                            JobOutcome::Succeeded
                        }
                        Ok(Err(err)) => {
                            error!(job = %name, error = %format!("{err:#}"), "background job failed");
                            JobOutcome::Failed(format!("{err:#}"))
                        }
                        Err(panic) => {
                            let msg = panic_message(panic.as_ref());
                            error!(job = %name, panic = %msg, "background job panicked");
                            JobOutcome::Panicked(msg)
                        }
                    };
                    let _ = report_tx.try_send(JobReport { name, outcome });
                }
            })?;
        Ok(Self {
            sender: Some(tx),
            reports: report_rx,
            worker: Some(worker),
        })
    }

    /// Soumet sans bloquer ; une file pleine refuse la tâche.
    pub fn submit<F>(&self, name: impl Into<String>, job: F) -> Result<(), SubmitError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(SubmitError::Closed)?;
        sender
            .try_send((name.into(), Box::new(job)))
            .map_err(|e| match e {
                TrySendError::Full(_) => SubmitError::Full,
                TrySendError::Disconnected(_) => SubmitError::Closed,
            })
    }

    /// Comptes rendus disponibles, sans attendre.
    pub fn drain_reports(&self) -> Vec<JobReport> {
        self.reports.try_iter().collect()
    }

    /// Termine les tâches en attente, arrête le worker et rend les comptes
    /// rendus restants.
    pub fn shutdown(mut self) -> Vec<JobReport> {
        self.stop();
        self.drain_reports()
    }

    fn stop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("background worker thread panicked");
            }
        }
    }
}

impl Drop for BackgroundQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
