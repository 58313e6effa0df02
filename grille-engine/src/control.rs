//! Control lifecycle coordinator
//!
//! Ties start, fill-in and close together for one residence visit. The
//! session is an explicitly owned object handed through the application;
//! there is no ambient global fiche. Every submission failure falls back
//! to the offline queue, so inspector input is never lost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use grille_common::config::GrilleConfig;
use grille_common::model::{CriterionValue, Fiche, PlanAction, Residence};
use grille_common::protocol::{decode_resume, encode_submission};
use grille_common::scoring::{Score, Scored};
use grille_common::snapshot::FicheSnapshot;
use grille_common::structure::{build_fiche, ChecklistSelection, PreviousAnswers, StructureDef};

use crate::db::{PlanFields, SendFields, Signatures, StorageRecord, StorageStore};
use crate::events::EngineEvent;
use crate::remote::RemoteService;
use crate::{Error, Result};

/// Source tag written into the pending send fields of secured records
const SEND_SOURCE: &str = "control";

/// Lifecycle state of one control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    NotStarted,
    Building,
    /// Editing with the remote service reachable
    EditingOnline,
    /// Editing against the offline queue
    EditingSecured,
    /// Below the remediation threshold, a plan-of-action is required
    AwaitingPlanAction,
    AwaitingSignature,
    Closed,
}

impl std::fmt::Display for ControlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlState::NotStarted => write!(f, "not_started"),
            ControlState::Building => write!(f, "building"),
            ControlState::EditingOnline => write!(f, "editing_online"),
            ControlState::EditingSecured => write!(f, "editing_secured"),
            ControlState::AwaitingPlanAction => write!(f, "awaiting_plan_action"),
            ControlState::AwaitingSignature => write!(f, "awaiting_signature"),
            ControlState::Closed => write!(f, "closed"),
        }
    }
}

/// Updated aggregates for the path touched by one criterion mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreUpdate {
    pub element: Score,
    pub zone: Score,
    pub overall: Score,
}

/// One residence's active control session
pub struct ControlSession<R: RemoteService> {
    residence: Residence,
    selection: ChecklistSelection,
    inspection_type: String,
    config: GrilleConfig,
    storage: StorageStore,
    remote: Arc<R>,
    fiche: Option<Fiche>,
    state: ControlState,
    control_date: DateTime<Utc>,
    signatures: Signatures,
    plan_validated: bool,
    /// Submissions for a residence are strictly sequential
    in_flight: AtomicBool,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl<R: RemoteService> ControlSession<R> {
    pub fn new(
        residence: Residence,
        selection: ChecklistSelection,
        inspection_type: impl Into<String>,
        config: GrilleConfig,
        storage: StorageStore,
        remote: Arc<R>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            residence,
            selection,
            inspection_type: inspection_type.into(),
            config,
            storage,
            remote,
            fiche: None,
            state: ControlState::NotStarted,
            control_date: Utc::now(),
            signatures: Signatures::default(),
            plan_validated: false,
            in_flight: AtomicBool::new(false),
            event_tx,
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn residence_id(&self) -> &str {
        &self.residence.id
    }

    pub fn fiche(&self) -> Option<&Fiche> {
        self.fiche.as_ref()
    }

    pub fn signatures(&self) -> &Signatures {
        &self.signatures
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Overall aggregate of the current fiche
    pub fn overall_score(&self) -> Result<Score> {
        Ok(self.fiche_ref()?.score())
    }

    /// Start the control: build the grille from the structure definition
    /// merged with the previous answers
    ///
    /// A pending offline record for this residence takes precedence over
    /// the remote snapshot and resumes straight into secured editing. An
    /// unreachable service is not fatal — the control starts secured — but
    /// a malformed structure definition or resume stream aborts the whole
    /// start rather than producing a partial tree.
    pub async fn start(&mut self, def: &StructureDef) -> Result<ControlState> {
        if self.state != ControlState::NotStarted {
            return Err(Error::InvalidState(format!(
                "cannot start a control in state {}",
                self.state
            )));
        }
        self.set_state(ControlState::Building);
        self.control_date = Utc::now();

        let stored = match self.storage.load_previous(&self.residence.id).await {
            Ok(stored) => stored,
            Err(e) => {
                self.set_state(ControlState::NotStarted);
                return Err(e);
            }
        };

        let mut secured = false;
        let previous = if let Some(record) = &stored {
            info!(
                residence_id = %self.residence.id,
                "Resuming control from offline queue"
            );
            secured = true;
            PreviousAnswers::Local(record.snapshot.clone())
        } else {
            match self.remote.fetch_previous(&self.residence.id).await {
                Ok(Some(stream)) => match decode_resume(&stream) {
                    Ok(decoded) => PreviousAnswers::Remote(decoded),
                    Err(e) => {
                        self.set_state(ControlState::NotStarted);
                        return Err(e.into());
                    }
                },
                Ok(None) => PreviousAnswers::None,
                Err(e) if e.is_recoverable() => {
                    warn!(
                        residence_id = %self.residence.id,
                        "Service unreachable at start, beginning secured: {}", e
                    );
                    secured = true;
                    PreviousAnswers::None
                }
                Err(e) => {
                    self.set_state(ControlState::NotStarted);
                    return Err(e);
                }
            }
        };

        let fiche = match build_fiche(def, self.selection, &previous, self.residence.clone()) {
            Ok(fiche) => fiche,
            Err(e) => {
                self.set_state(ControlState::NotStarted);
                return Err(e.into());
            }
        };
        self.fiche = Some(fiche);

        // A resumed record restores plan and signature progress as well
        if let Some(record) = stored {
            self.signatures = record.signatures;
            self.plan_validated = record.plan.validated;
            if let Some(due_date) = record.plan.due_date {
                if let Some(fiche) = self.fiche.as_mut() {
                    fiche.plan_action = Some(PlanAction {
                        id: String::new(),
                        due_date,
                        text: record.plan.text,
                    });
                }
            }
        }

        self.set_state(if secured {
            ControlState::EditingSecured
        } else {
            ControlState::EditingOnline
        });
        Ok(self.state)
    }

    /// Apply one criterion answer and return the updated aggregates for
    /// the affected element, zone and overall levels
    pub fn apply_value(
        &mut self,
        zone_id: &str,
        element_id: &str,
        criterion_id: &str,
        value: i64,
    ) -> Result<ScoreUpdate> {
        self.ensure_editing()?;
        let value = CriterionValue::try_from(value).map_err(Error::from)?;

        let fiche = self
            .fiche
            .as_mut()
            .ok_or_else(|| Error::InvalidState("no fiche built".to_string()))?;
        let criterion = fiche
            .criterion_mut(zone_id, element_id, criterion_id)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "criterion {}/{}/{}",
                    zone_id, element_id, criterion_id
                ))
            })?;
        criterion.value = value;

        let update = score_update(fiche, zone_id, element_id)?;
        self.broadcast(EngineEvent::ScoreUpdated {
            residence_id: self.residence.id.clone(),
            percentage: update.overall.percentage(),
        });
        Ok(update)
    }

    /// Attach a comment to one criterion
    pub fn set_comment(
        &mut self,
        zone_id: &str,
        element_id: &str,
        criterion_id: &str,
        comment: impl Into<String>,
    ) -> Result<()> {
        self.ensure_editing()?;
        self.criterion_mut(zone_id, element_id, criterion_id)?.comment = comment.into();
        Ok(())
    }

    /// Attach a capture reference to one criterion
    pub fn set_capture(
        &mut self,
        zone_id: &str,
        element_id: &str,
        criterion_id: &str,
        name: impl Into<String>,
        data: impl Into<String>,
    ) -> Result<()> {
        self.ensure_editing()?;
        let criterion = self.criterion_mut(zone_id, element_id, criterion_id)?;
        criterion.capture = name.into();
        criterion.capture_data = data.into();
        Ok(())
    }

    /// Attempt submission on leaving the tree screen
    ///
    /// Success keeps the control online and clears any queued record for
    /// this residence; any transport failure or server rejection secures
    /// the control locally instead.
    pub async fn leave_screen(&mut self) -> Result<ControlState> {
        self.ensure_editing()?;

        match self.submit_current().await {
            Ok(()) => {
                self.storage.delete(&self.residence.id).await?;
                self.set_state(ControlState::EditingOnline);
            }
            Err(e) if e.is_recoverable() => {
                warn!(
                    residence_id = %self.residence.id,
                    "Submission failed, securing control locally: {}", e
                );
                self.secure_locally().await?;
                self.set_state(ControlState::EditingSecured);
            }
            Err(e) => return Err(e),
        }
        Ok(self.state)
    }

    /// Finish filling in: move to the plan-of-action step when the overall
    /// score needs remediation, else straight to the signature step
    pub fn finish(&mut self) -> Result<ControlState> {
        self.ensure_editing()?;

        let overall = self.fiche_ref()?.score();
        let needs_plan = overall
            .percentage()
            .is_some_and(|pct| pct < self.config.remediation_threshold);

        if needs_plan && !self.plan_validated {
            debug!(
                residence_id = %self.residence.id,
                "Overall score below remediation threshold, plan-of-action required"
            );
            self.set_state(ControlState::AwaitingPlanAction);
        } else {
            self.set_state(ControlState::AwaitingSignature);
        }
        Ok(self.state)
    }

    /// Record the remediation plan for a low-scoring control
    pub fn set_plan_action(&mut self, due_date: NaiveDate, text: impl Into<String>) -> Result<()> {
        if !matches!(
            self.state,
            ControlState::EditingOnline
                | ControlState::EditingSecured
                | ControlState::AwaitingPlanAction
        ) {
            return Err(Error::InvalidState(format!(
                "cannot set a plan-of-action in state {}",
                self.state
            )));
        }
        let text = text.into();
        if text.is_empty() {
            return Err(Error::InvalidInput(
                "plan-of-action text must not be empty".to_string(),
            ));
        }
        let fiche = self
            .fiche
            .as_mut()
            .ok_or_else(|| Error::InvalidState("no fiche built".to_string()))?;
        fiche.plan_action = Some(PlanAction {
            id: String::new(),
            due_date,
            text,
        });
        self.plan_validated = false;
        Ok(())
    }

    /// Validate the recorded plan and move on to signatures
    pub fn validate_plan_action(&mut self) -> Result<ControlState> {
        if self.state != ControlState::AwaitingPlanAction {
            return Err(Error::InvalidState(format!(
                "no plan-of-action awaited in state {}",
                self.state
            )));
        }
        if self.fiche_ref()?.plan_action.is_none() {
            return Err(Error::InvalidInput(
                "a plan-of-action is required before closing".to_string(),
            ));
        }
        self.plan_validated = true;
        self.set_state(ControlState::AwaitingSignature);
        Ok(self.state)
    }

    /// Record an optional signature (inspector, then on-site agent)
    pub fn record_signature(&mut self, agent_name: Option<&str>) -> Result<()> {
        if self.state != ControlState::AwaitingSignature {
            return Err(Error::InvalidState(format!(
                "no signature awaited in state {}",
                self.state
            )));
        }
        if self.signatures.count >= 2 {
            return Err(Error::InvalidInput(
                "both signature slots already filled".to_string(),
            ));
        }
        self.signatures.count += 1;
        if let Some(name) = agent_name {
            self.signatures.agent = name.to_string();
        }
        Ok(())
    }

    /// Close the control server-side
    ///
    /// Finalizes the overall note, confirms closure with the service,
    /// sends the fixed-recipient notification and clears this residence's
    /// queued record. A transport failure or rejection secures the control
    /// locally; the close can then be retried.
    pub async fn close(&mut self) -> Result<ControlState> {
        if self.state != ControlState::AwaitingSignature {
            return Err(Error::InvalidState(format!(
                "cannot close a control in state {}",
                self.state
            )));
        }

        let note = {
            let fiche = self
                .fiche
                .as_mut()
                .ok_or_else(|| Error::InvalidState("no fiche built".to_string()))?;
            fiche.note = fiche.score().percentage();
            fiche.note
        };

        match self.remote.close_control(&self.residence.id, note).await {
            Ok(()) => {
                let message = close_message(&self.residence, note);
                if let Err(e) = self
                    .remote
                    .notify(&self.config.notify_recipient, &message)
                    .await
                {
                    // The control is closed server-side either way
                    warn!(
                        residence_id = %self.residence.id,
                        "Close notification failed: {}", e
                    );
                }
                self.storage.delete(&self.residence.id).await?;
                self.set_state(ControlState::Closed);
                info!(residence_id = %self.residence.id, note = ?note, "Control closed");
                Ok(self.state)
            }
            Err(e) if e.is_recoverable() => {
                warn!(
                    residence_id = %self.residence.id,
                    "Close failed, securing control locally: {}", e
                );
                self.secure_locally().await?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Submit the current fiche, enforcing one in-flight operation per
    /// residence
    async fn submit_current(&self) -> Result<()> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(Error::InvalidState(
                "a submission for this residence is already outstanding".to_string(),
            ));
        }

        let result = match self.fiche.as_ref() {
            Some(fiche) => {
                let submission = encode_submission(fiche);
                self.remote
                    .submit_control(&self.residence.id, &submission)
                    .await
            }
            None => Err(Error::InvalidState("no fiche built".to_string())),
        };

        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    /// Write the full current state to the offline queue
    async fn secure_locally(&mut self) -> Result<()> {
        let fiche = self
            .fiche
            .as_ref()
            .ok_or_else(|| Error::InvalidState("no fiche built".to_string()))?;

        let now = Utc::now();
        let plan = fiche.plan_action.as_ref();
        let record = StorageRecord {
            residence_id: self.residence.id.clone(),
            control_date: self.control_date,
            proximity: self.selection.proximity,
            contract: self.selection.contract,
            inspection_type: self.inspection_type.clone(),
            snapshot: FicheSnapshot::from(fiche),
            signatures: self.signatures.clone(),
            plan: PlanFields {
                due_date: plan.map(|p| p.due_date),
                text: plan.map(|p| p.text.clone()).unwrap_or_default(),
                validated: self.plan_validated,
            },
            send: SendFields {
                destinations: vec![self.config.notify_recipient.clone()],
                reference: plan
                    .filter(|p| !p.id.is_empty())
                    .map(|p| p.id.clone())
                    .unwrap_or_else(|| self.control_date.to_rfc3339()),
                source: SEND_SOURCE.to_string(),
            },
            updated_at: now,
        };

        self.storage.secure(&record).await?;
        self.broadcast(EngineEvent::ControlSecured {
            residence_id: self.residence.id.clone(),
        });
        Ok(())
    }

    fn ensure_editing(&self) -> Result<()> {
        match self.state {
            ControlState::EditingOnline | ControlState::EditingSecured => Ok(()),
            other => Err(Error::InvalidState(format!(
                "control is not being edited (state {})",
                other
            ))),
        }
    }

    fn fiche_ref(&self) -> Result<&Fiche> {
        self.fiche
            .as_ref()
            .ok_or_else(|| Error::InvalidState("no fiche built".to_string()))
    }

    fn criterion_mut(
        &mut self,
        zone_id: &str,
        element_id: &str,
        criterion_id: &str,
    ) -> Result<&mut grille_common::model::Criterion> {
        self.fiche
            .as_mut()
            .ok_or_else(|| Error::InvalidState("no fiche built".to_string()))?
            .criterion_mut(zone_id, element_id, criterion_id)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "criterion {}/{}/{}",
                    zone_id, element_id, criterion_id
                ))
            })
    }

    fn set_state(&mut self, state: ControlState) {
        if self.state != state {
            debug!(residence_id = %self.residence.id, %state, "Control state changed");
            self.state = state;
            self.broadcast(EngineEvent::StateChanged {
                residence_id: self.residence.id.clone(),
                state,
            });
        }
    }

    fn broadcast(&self, event: EngineEvent) {
        // Ignore send errors (no receivers is OK)
        let _ = self.event_tx.send(event);
    }
}

fn score_update(fiche: &Fiche, zone_id: &str, element_id: &str) -> Result<ScoreUpdate> {
    let zone = fiche
        .zone(zone_id)
        .ok_or_else(|| Error::NotFound(format!("zone {}", zone_id)))?;
    let element = zone
        .element(element_id)
        .ok_or_else(|| Error::NotFound(format!("element {}/{}", zone_id, element_id)))?;

    Ok(ScoreUpdate {
        element: element.score(),
        zone: zone.score(),
        overall: fiche.score(),
    })
}

fn close_message(residence: &Residence, note: Option<u8>) -> String {
    match note {
        Some(pct) => format!(
            "Control closed for residence {} ({}) with overall score {}%",
            residence.name, residence.id, pct
        ),
        None => format!(
            "Control closed for residence {} ({}) with no applicable score",
            residence.name, residence.id
        ),
    }
}
