//! Dispatch loop: mission queue to executor tasks

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::jobs::JobRecord;
use crate::judger::{Job, JobExecutor, JudgeContext};
use crate::languages::{Language, LanguageTable};
use crate::problem_sync::{InFlightSlot, ProblemSyncCoordinator};
use crate::queue::MissionQueue;

pub struct Dispatcher {
    missions: Arc<MissionQueue>,
    sync: Arc<ProblemSyncCoordinator>,
    languages: Arc<LanguageTable>,
    ctx: Arc<JudgeContext>,
}

impl Dispatcher {
    pub fn new(
        missions: Arc<MissionQueue>,
        sync: Arc<ProblemSyncCoordinator>,
        languages: Arc<LanguageTable>,
        ctx: Arc<JudgeContext>,
    ) -> Self {
        Self {
            missions,
            sync,
            languages,
            ctx,
        }
    }

    /// Take jobs off the mission queue forever, each on its own task
    pub async fn run(&self) {
        loop {
            let record = self.missions.pop().await;
            self.dispatch(record);
        }
    }

    /// Start an executor for `record`. `None` if the job was dropped.
    pub fn dispatch(&self, record: JobRecord) -> Option<JoinHandle<()>> {
        let slot = InFlightSlot::new(self.sync.clone(), record.pid);

        let profile = Language::from_code(record.language)
            .and_then(|language| Some((language, self.languages.profile(language)?.clone())));
        let Some((language, profile)) = profile else {
            error!(
                rid = record.rid,
                pid = record.pid,
                "Unsupported language code {}, dropping job",
                record.language
            );
            return None;
        };

        info!(
            rid = record.rid,
            pid = record.pid,
            queued = self.missions.len(),
            "dispatching job"
        );
        let executor = JobExecutor::new(Job::from_record(record, language), profile, self.ctx.clone());
        Some(tokio::spawn(async move {
            let _slot = slot;
            executor.run().await;
        }))
    }
}
