//! Shared fixtures for the engine integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tempfile::TempDir;

use grille_common::config::GrilleConfig;
use grille_common::model::{CriterionValue, Residence};
use grille_common::protocol::Submission;
use grille_common::snapshot::{
    CaptureSnapshot, CriterionSnapshot, ElementSnapshot, FicheSnapshot, ZoneSnapshot,
};
use grille_common::structure::StructureDef;
use grille_engine::db::{init_database, PlanFields, SendFields, Signatures, StorageRecord, StorageStore};
use grille_engine::remote::RemoteService;
use grille_engine::sync::BatchPayload;
use grille_engine::{Error, Result};

pub const STRUCTURE_JSON: &str = r#"{
    "zones": [
        {
            "id": "10", "text": "Exterior", "coef": 2, "group": "proximity",
            "elements": [
                {
                    "id": "101", "text": "Facade", "coef": 1,
                    "criteria": [
                        {"id": "1011", "text": "Paint intact", "coef": 2},
                        {"id": "1012", "text": "Gutters sealed", "coef": 3}
                    ]
                }
            ]
        },
        {
            "id": "20", "text": "Boiler room", "coef": 1, "group": "contract",
            "elements": [
                {
                    "id": "201", "text": "Boiler", "coef": 1,
                    "criteria": [
                        {"id": "2011", "text": "Serviced this year", "coef": 5}
                    ]
                }
            ]
        }
    ]
}"#;

pub fn structure_def() -> StructureDef {
    StructureDef::from_json(STRUCTURE_JSON).unwrap()
}

pub fn residence(id: &str) -> Residence {
    Residence {
        id: id.to_string(),
        reference: format!("REF-{}", id),
        name: "Les Tilleuls".to_string(),
        entry: "A".to_string(),
        address: "3 allee des Tilleuls".to_string(),
        supervisor: "M. Garnier".to_string(),
        caretaker: "Mme Roche".to_string(),
        agent: "P. Lefevre".to_string(),
    }
}

pub fn config() -> GrilleConfig {
    GrilleConfig::from_toml(
        r#"
        remote_url = "https://controls.example.org"
        notify_recipient = "supervision@example.org"
        score_low = 50
        score_high = 80
        remediation_threshold = 50
        "#,
    )
    .unwrap()
}

/// Open a throwaway database; the TempDir must outlive the pool
pub async fn open_store() -> (StorageStore, SqlitePool, TempDir) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("grille.db")).await.unwrap();
    (StorageStore::new(pool.clone()), pool, dir)
}

/// A minimal queued record with one commented failing criterion
pub fn sample_record(residence_id: &str, comment: &str) -> StorageRecord {
    let now = Utc::now();
    StorageRecord {
        residence_id: residence_id.to_string(),
        control_date: now,
        proximity: true,
        contract: false,
        inspection_type: "annual".to_string(),
        snapshot: FicheSnapshot {
            zones: vec![ZoneSnapshot {
                id: "10".to_string(),
                elements: vec![ElementSnapshot {
                    id: "101".to_string(),
                    criteria: vec![CriterionSnapshot {
                        id: "1012".to_string(),
                        value: CriterionValue::Fail,
                        comment: comment.to_string(),
                        capture: CaptureSnapshot::default(),
                    }],
                }],
            }],
        },
        signatures: Signatures::default(),
        plan: PlanFields::default(),
        send: SendFields {
            destinations: vec!["supervision@example.org".to_string()],
            reference: now.to_rfc3339(),
            source: "control".to_string(),
        },
        updated_at: now,
    }
}

/// Failure mode injected into one mock endpoint
#[derive(Debug, Clone)]
pub enum Failure {
    Transport,
    Rejected(String),
}

impl Failure {
    fn to_error(&self) -> Error {
        match self {
            Failure::Transport => Error::Transport("connection refused".to_string()),
            Failure::Rejected(text) => Error::Rejected(text.clone()),
        }
    }
}

/// In-memory remote service with injectable failures
#[derive(Default)]
pub struct MockRemote {
    pub submit_failure: Mutex<Option<Failure>>,
    pub fetch_failure: Mutex<Option<Failure>>,
    pub close_failure: Mutex<Option<Failure>>,
    /// Reply body of the batch endpoint; `None` simulates a transport failure
    pub batch_reply: Mutex<Option<String>>,
    /// Fetch/resume stream per residence id
    pub previous: Mutex<HashMap<String, String>>,
    pub fetch_calls: AtomicUsize,
    pub submissions: Mutex<Vec<(String, Submission)>>,
    pub batches: Mutex<Vec<BatchPayload>>,
    pub closed: Mutex<Vec<(String, Option<u8>)>>,
    pub notifications: Mutex<Vec<(String, String)>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self {
            batch_reply: Mutex::new(Some("ok".to_string())),
            ..Self::default()
        }
    }

    pub fn fail_submissions(&self, failure: Failure) {
        *self.submit_failure.lock().unwrap() = Some(failure);
    }

    pub fn restore_submissions(&self) {
        *self.submit_failure.lock().unwrap() = None;
    }

    pub fn set_previous(&self, residence_id: &str, stream: &str) {
        self.previous
            .lock()
            .unwrap()
            .insert(residence_id.to_string(), stream.to_string());
    }

    pub fn last_submission(&self) -> Option<(String, Submission)> {
        self.submissions.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl RemoteService for MockRemote {
    async fn submit_control(&self, residence_id: &str, submission: &Submission) -> Result<()> {
        if let Some(failure) = self.submit_failure.lock().unwrap().as_ref() {
            return Err(failure.to_error());
        }
        self.submissions
            .lock()
            .unwrap()
            .push((residence_id.to_string(), submission.clone()));
        Ok(())
    }

    async fn fetch_previous(&self, residence_id: &str) -> Result<Option<String>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.fetch_failure.lock().unwrap().as_ref() {
            return Err(failure.to_error());
        }
        Ok(self.previous.lock().unwrap().get(residence_id).cloned())
    }

    async fn submit_batch(&self, payload: &BatchPayload) -> Result<String> {
        self.batches.lock().unwrap().push(payload.clone());
        match self.batch_reply.lock().unwrap().as_ref() {
            Some(reply) => Ok(reply.clone()),
            None => Err(Error::Transport("request timed out".to_string())),
        }
    }

    async fn close_control(&self, residence_id: &str, note: Option<u8>) -> Result<()> {
        if let Some(failure) = self.close_failure.lock().unwrap().as_ref() {
            return Err(failure.to_error());
        }
        self.closed
            .lock()
            .unwrap()
            .push((residence_id.to_string(), note));
        Ok(())
    }

    async fn notify(&self, recipient: &str, message: &str) -> Result<()> {
        self.notifications
            .lock()
            .unwrap()
            .push((recipient.to_string(), message.to_string()));
        Ok(())
    }
}
