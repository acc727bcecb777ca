//! Channel-based progress bus. Events are immutable values; consumers that
//! fall behind or disconnect simply miss them. The job record stays the
//! source of truth.

use serde::Serialize;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use crate::models::{Action, Label, ScoreVector, Stage};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Progress {
        #[serde(rename = "jobId")]
        job_id: String,
        owner: String,
        stage: Stage,
        progress: u8,
        message: String,
    },
    Completed {
        #[serde(rename = "jobId")]
        job_id: String,
        owner: String,
        label: Label,
        #[serde(rename = "recommendedAction")]
        recommended_action: Action,
        #[serde(rename = "scoreVector")]
        score_vector: ScoreVector,
        #[serde(rename = "reportText")]
        report_text: String,
        #[serde(rename = "timelineEventCount")]
        timeline_event_count: usize,
    },
    Failed {
        #[serde(rename = "jobId")]
        job_id: String,
        owner: String,
        #[serde(rename = "errorMessage")]
        error_message: String,
    },
}

impl PipelineEvent {
    pub fn job_id(&self) -> &str {
        match self {
            PipelineEvent::Progress { job_id, .. }
            | PipelineEvent::Completed { job_id, .. }
            | PipelineEvent::Failed { job_id, .. } => job_id,
        }
    }

    pub fn owner(&self) -> &str {
        match self {
            PipelineEvent::Progress { owner, .. }
            | PipelineEvent::Completed { owner, .. }
            | PipelineEvent::Failed { owner, .. } => owner,
        }
    }
}

#[derive(Debug, Clone)]
enum Interest {
    All,
    Job(String),
    Owner(String),
}

impl Interest {
    fn wants(&self, event: &PipelineEvent) -> bool {
        match self {
            Interest::All => true,
            Interest::Job(id) => event.job_id() == id,
            Interest::Owner(owner) => event.owner() == owner,
        }
    }
}

struct Subscriber {
    interest: Interest,
    tx: Sender<PipelineEvent>,
}

/// Cheap to clone; all clones share one subscriber list.
#[derive(Clone, Default)]
pub struct ProgressBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_all(&self) -> Receiver<PipelineEvent> {
        self.subscribe(Interest::All)
    }

    pub fn subscribe_job(&self, job_id: &str) -> Receiver<PipelineEvent> {
        self.subscribe(Interest::Job(job_id.to_string()))
    }

    pub fn subscribe_owner(&self, owner: &str) -> Receiver<PipelineEvent> {
        self.subscribe(Interest::Owner(owner.to_string()))
    }

    fn subscribe(&self, interest: Interest) -> Receiver<PipelineEvent> {
        let (tx, rx) = channel();
        self.lock().push(Subscriber { interest, tx });
        rx
    }

    /// Deliver to every interested subscriber, dropping those whose receiver is gone.
    pub fn publish(&self, event: PipelineEvent) {
        self.lock()
            .retain(|s| !s.interest.wants(&event) || s.tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        // A poisoned lock still guards a valid list.
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(job: &str, owner: &str, pct: u8) -> PipelineEvent {
        PipelineEvent::Progress {
            job_id: job.into(),
            owner: owner.into(),
            stage: Stage::Vision,
            progress: pct,
            message: "Scoring frames".into(),
        }
    }

    #[test]
    fn events_route_by_job_and_owner() {
        let bus = ProgressBus::new();
        let by_job = bus.subscribe_job("j1");
        let by_owner = bus.subscribe_owner("bob");
        let all = bus.subscribe_all();

        bus.publish(progress("j1", "alice", 30));
        bus.publish(progress("j2", "bob", 40));

        assert_eq!(by_job.try_iter().count(), 1);
        assert_eq!(by_owner.try_recv().unwrap().job_id(), "j2");
        assert_eq!(all.try_iter().count(), 2);
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let bus = ProgressBus::new();
        let rx = bus.subscribe_all();
        drop(rx);
        bus.publish(progress("j1", "alice", 10));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn wire_shape_uses_camel_case_keys() {
        let json = serde_json::to_value(PipelineEvent::Failed {
            job_id: "j1".into(),
            owner: "alice".into(),
            error_message: "Cannot read media".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "failed");
        assert_eq!(json["jobId"], "j1");
        assert_eq!(json["errorMessage"], "Cannot read media");

        let json = serde_json::to_value(progress("j1", "alice", 42)).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["stage"], "vision");
        assert_eq!(json["progress"], 42);
    }
}
