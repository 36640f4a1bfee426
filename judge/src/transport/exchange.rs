//! Periodic mission exchange
//!
//! Each tick uploads up to `batch_size` verdicts together with the current
//! load and admits whatever jobs come back. Verdicts leave the status queue
//! only after the coordinator acknowledged them.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{Coordinator, TransportError};
use crate::config::TransportConfig;
use crate::jobs::ExchangeRequest;
use crate::problem_sync::ProblemSyncCoordinator;
use crate::queue::StatusQueue;

pub struct TransportLoop {
    coordinator: Arc<dyn Coordinator>,
    status_queue: Arc<StatusQueue>,
    sync: Arc<ProblemSyncCoordinator>,
    batch_size: usize,
    period: Duration,
}

impl TransportLoop {
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        status_queue: Arc<StatusQueue>,
        sync: Arc<ProblemSyncCoordinator>,
        config: &TransportConfig,
    ) -> Self {
        Self {
            coordinator,
            status_queue,
            sync,
            batch_size: config.batch_size,
            period: config.period(),
        }
    }

    /// One exchange. Returns how many verdicts were delivered.
    pub async fn tick(&self) -> Result<usize, TransportError> {
        let batch = self.status_queue.peek(self.batch_size);
        debug!(
            pending = self.status_queue.len(),
            sending = batch.len(),
            "mission exchange"
        );
        for record in &batch {
            record.log_try_send();
        }

        let request = ExchangeRequest {
            status: batch,
            judging_count: self.sync.judging_count(),
        };
        let response = self.coordinator.exchange(&request).await?;

        self.status_queue.remove_front(request.status.len());
        for record in &request.status {
            record.log_send_success();
        }

        for job in response.problems {
            info!(rid = job.rid, pid = job.pid, "job received");
            self.sync.admit(job).await;
        }
        Ok(request.status.len())
    }

    pub async fn run(self) {
        info!("Mission exchange every {:?}", self.period);
        loop {
            if let Err(e) = self.tick().await {
                warn!("Mission exchange failed: {}", e);
            }
            tokio::time::sleep(self.period).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::core::JudgeStatus;
    use crate::jobs::VerdictRecord;
    use crate::judger::tests::record;
    use crate::queue::MissionQueue;
    use crate::transport::stubs::StubCoordinator;
    use std::sync::atomic::Ordering;

    struct Fixture {
        _root: tempfile::TempDir,
        stub: Arc<StubCoordinator>,
        statuses: Arc<StatusQueue>,
        missions: Arc<MissionQueue>,
        transport: TransportLoop,
    }

    fn fixture(batch_size: usize) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubCoordinator::new());
        let statuses = Arc::new(StatusQueue::new());
        let missions = Arc::new(MissionQueue::new());
        let sync = Arc::new(ProblemSyncCoordinator::new(
            stub.clone(),
            root.path().to_path_buf(),
            missions.clone(),
            &SyncConfig::default(),
        ));
        let config = TransportConfig {
            batch_size,
            ..TransportConfig::default()
        };
        let transport = TransportLoop::new(stub.clone(), statuses.clone(), sync, &config);
        Fixture {
            _root: root,
            stub,
            statuses,
            missions,
            transport,
        }
    }

    fn verdict(rid: i64) -> VerdictRecord {
        VerdictRecord {
            rid,
            pid: 1,
            status: JudgeStatus::WrongAnswer,
            time_cost: None,
            memory_cost: None,
            compilation_message: None,
        }
    }

    fn sent_rids(request: &ExchangeRequest) -> Vec<i64> {
        request.status.iter().map(|r| r.rid).collect()
    }

    #[tokio::test]
    async fn test_failed_exchange_keeps_verdicts() {
        let f = fixture(20);
        f.statuses.push(verdict(1));
        f.statuses.push(verdict(2));
        f.stub.failing_exchanges.store(1, Ordering::SeqCst);

        assert!(f.transport.tick().await.is_err());
        assert_eq!(f.statuses.len(), 2);

        assert_eq!(f.transport.tick().await.unwrap(), 2);
        assert_eq!(f.statuses.len(), 0);
        let exchanges = f.stub.exchanges();
        assert_eq!(exchanges.len(), 1);
        assert_eq!(sent_rids(&exchanges[0]), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_batches_are_bounded_and_ordered() {
        let f = fixture(2);
        for rid in 1..=3 {
            f.statuses.push(verdict(rid));
        }

        assert_eq!(f.transport.tick().await.unwrap(), 2);
        assert_eq!(f.transport.tick().await.unwrap(), 1);
        assert_eq!(f.transport.tick().await.unwrap(), 0);

        let exchanges = f.stub.exchanges();
        assert_eq!(sent_rids(&exchanges[0]), vec![1, 2]);
        assert_eq!(sent_rids(&exchanges[1]), vec![3]);
        assert!(exchanges[2].status.is_empty());
    }

    #[tokio::test]
    async fn test_received_jobs_are_admitted_and_counted() {
        let f = fixture(20);
        f.stub.queue_job(record(10, 1));
        f.stub.queue_job(record(11, 1));

        f.transport.tick().await.unwrap();
        assert_eq!(f.missions.len(), 2);

        f.transport.tick().await.unwrap();
        let exchanges = f.stub.exchanges();
        assert_eq!(exchanges[0].judging_count, 0);
        assert_eq!(exchanges[1].judging_count, 2);
    }
}
