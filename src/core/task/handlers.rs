use actix::{ActorContext, ActorFutureExt, AsyncContext, Handler, WrapFuture};
use log::{debug, warn};

use super::actor::DownloadWorker;
use super::download::DownloadJob;
use super::messages::*;
use super::meta::TaskId;

impl DownloadWorker {
    fn spawn_job(
        &mut self,
        ctx: &mut <Self as actix::Actor>::Context,
        task_id: TaskId,
        url: String,
        filename: String,
        offset: u64,
        expected_total: Option<u64>,
    ) {
        if self.started {
            warn!("任务 {} 的 worker 已启动 ({:?})，忽略重复的启动命令", task_id, self.state.get());
            return;
        }
        self.started = true;
        let job = DownloadJob {
            task_id,
            url,
            filename,
            offset,
            expected_total,
            generation: self.generation,
            state: self.state.clone(),
            source: self.source.clone(),
            sinks: self.sinks.clone(),
            events: self.coordinator.clone(),
            cancel: self.cancel.clone(),
            settings: self.settings.clone(),
        };
        ctx.spawn(job.run().into_actor(self).map(move |final_state, _act, ctx| {
            debug!("任务 {} 的 worker 结束: {:?}", task_id, final_state);
            ctx.stop();
        }));
    }
}

impl Handler<WorkerCommand> for DownloadWorker {
    type Result = ();
    fn handle(&mut self, msg: WorkerCommand, ctx: &mut Self::Context) {
        match msg {
            WorkerCommand::Start { task_id, url, filename } => {
                self.spawn_job(ctx, task_id, url, filename, 0, None);
            }
            WorkerCommand::Resume { task_id, url, filename, downloaded, total_size } => {
                self.spawn_job(ctx, task_id, url, filename, downloaded, Some(total_size));
            }
            WorkerCommand::Pause { task_id } => {
                debug!("任务 {} 收到暂停命令", task_id);
                self.cancel.cancel();
            }
        }
    }
}

impl Handler<QueryWorkerState> for DownloadWorker {
    type Result = actix::MessageResult<QueryWorkerState>;
    fn handle(&mut self, _msg: QueryWorkerState, _ctx: &mut Self::Context) -> Self::Result {
        actix::MessageResult(self.state.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use uuid::Uuid;

    use crate::core::error::{DownloadError, FailureKind};
    use crate::core::source::RangeSource;
    use crate::core::sink::SinkFactory;
    use crate::core::task::download::WorkerSettings;
    use crate::core::task::retry::RetryStrategy;
    use crate::core::task::state::WorkerState;
    use crate::core::task::util::FileInfo;
    use crate::testing::*;

    struct Harness {
        source: Rc<ScriptedSource>,
        sinks: Rc<MemorySinkFactory>,
        events: Rc<RefCell<Vec<WorkerReport>>>,
        worker: Addr<DownloadWorker>,
        task_id: TaskId,
    }

    impl Harness {
        fn new(source: ScriptedSource, settings: WorkerSettings) -> Self {
            let source = Rc::new(source);
            let sinks = Rc::new(MemorySinkFactory::default());
            let events = Rc::new(RefCell::new(Vec::new()));
            let collector = EventCollector { events: events.clone() }.start();
            let dyn_source: Rc<dyn RangeSource> = source.clone();
            let dyn_sinks: Rc<dyn SinkFactory> = sinks.clone();
            let worker = DownloadWorker::new(7, settings, dyn_source, dyn_sinks, collector.recipient()).start();
            Self { source, sinks, events, worker, task_id: Uuid::new_v4() }
        }

        fn start(&self) {
            self.worker.do_send(WorkerCommand::Start {
                task_id: self.task_id,
                url: "https://example.com/big.bin".to_string(),
                filename: "big.bin".to_string(),
            });
        }

        fn resume(&self, downloaded: u64, total_size: u64) {
            self.worker.do_send(WorkerCommand::Resume {
                task_id: self.task_id,
                url: "https://example.com/big.bin".to_string(),
                filename: "big.bin".to_string(),
                downloaded,
                total_size,
            });
        }

        fn events(&self) -> Vec<WorkerEvent> {
            self.events.borrow().iter().map(|r| r.event.clone()).collect()
        }

        async fn wait_terminal(&self) -> Vec<WorkerEvent> {
            let events = self.events.clone();
            wait_until(move || events.borrow().iter().any(|r| r.event.is_terminal())).await;
            self.events()
        }
    }

    fn no_retry() -> WorkerSettings {
        WorkerSettings { retry: RetryStrategy::disabled(), ..WorkerSettings::default() }
    }

    #[actix_rt::test]
    async fn test_two_ranged_requests_complete() {
        let h = Harness::new(
            ScriptedSource::new(FileInfo::ranged(1_000_000))
                .respond(ScriptedResponse::partial(vec![600_000], BodyEnd::Finish))
                .respond(ScriptedResponse::partial(vec![400_000], BodyEnd::Finish)),
            no_retry(),
        );
        h.start();
        let events = h.wait_terminal().await;

        let id = h.task_id;
        assert_eq!(
            events,
            vec![
                WorkerEvent::Init { task_id: id, total_size: 1_000_000 },
                WorkerEvent::Progress { task_id: id, downloaded: 600_000, progress: 60.0 },
                WorkerEvent::Progress { task_id: id, downloaded: 1_000_000, progress: 100.0 },
                WorkerEvent::Complete { task_id: id },
            ]
        );
        assert_eq!(h.source.requested_offsets(), vec![0, 600_000]);
        let file = h.sinks.file("big.bin").unwrap();
        assert_eq!(file.data.len(), 1_000_000);
        assert!(file.closed);
        assert!(h.events.borrow().iter().all(|r| r.generation == 7));
    }

    #[actix_rt::test]
    async fn test_missing_range_support_fails_regardless_of_length() {
        let h = Harness::new(
            ScriptedSource::new(FileInfo { size: Some(1_000_000), supports_range: false, ..FileInfo::default() }),
            no_retry(),
        );
        h.start();
        let events = h.wait_terminal().await;

        assert!(matches!(
            events.last(),
            Some(WorkerEvent::Error { kind: FailureKind::RangeNotSupported, .. })
        ));
        assert!(h.source.requested_offsets().is_empty());
        assert!(h.sinks.file("big.bin").is_none());
    }

    #[actix_rt::test]
    async fn test_zero_content_length_fails_probe() {
        let h = Harness::new(ScriptedSource::new(FileInfo::ranged(0)), no_retry());
        h.start();
        let events = h.wait_terminal().await;
        assert!(matches!(events.last(), Some(WorkerEvent::Error { kind: FailureKind::Probe, .. })));
    }

    #[actix_rt::test]
    async fn test_plain_200_stops_without_further_requests() {
        let h = Harness::new(
            ScriptedSource::new(FileInfo::ranged(1_000_000))
                .respond(ScriptedResponse::Status(200))
                .respond(ScriptedResponse::partial(vec![1_000_000], BodyEnd::Finish)),
            WorkerSettings::default(),
        );
        h.start();
        let events = h.wait_terminal().await;

        match events.last() {
            Some(WorkerEvent::Error { kind, error, .. }) => {
                assert_eq!(*kind, FailureKind::UnexpectedStatus);
                assert!(error.contains("200"));
            }
            other => panic!("unexpected terminal event: {:?}", other),
        }
        assert_eq!(h.source.requested_offsets(), vec![0]);
        assert!(!events.iter().any(|e| matches!(e, WorkerEvent::Progress { .. })));
        assert!(h.sinks.file("big.bin").unwrap().aborted);
    }

    #[actix_rt::test]
    async fn test_pause_mid_stream_aborts_sink() {
        let h = Harness::new(
            ScriptedSource::new(FileInfo::ranged(1_000_000))
                .respond(ScriptedResponse::partial(vec![250_000], BodyEnd::Hang)),
            no_retry(),
        );
        h.start();
        let events = h.events.clone();
        wait_until(move || {
            events.borrow().iter().any(|r| matches!(r.event, WorkerEvent::Progress { downloaded: 250_000, .. }))
        })
        .await;
        assert_eq!(h.worker.send(QueryWorkerState).await.unwrap(), WorkerState::Streaming);

        h.worker.do_send(WorkerCommand::Pause { task_id: h.task_id });
        let events = h.wait_terminal().await;

        assert_eq!(
            events.last(),
            Some(&WorkerEvent::Paused { task_id: h.task_id, downloaded: 250_000 })
        );
        let file = h.sinks.file("big.bin").unwrap();
        assert!(file.aborted);
        assert!(!file.closed);
        assert_eq!(file.data.len(), 250_000);
    }

    #[actix_rt::test]
    async fn test_resume_starts_at_offset() {
        let h = Harness::new(
            ScriptedSource::new(FileInfo::ranged(1_000_000))
                .respond(ScriptedResponse::partial(vec![750_000], BodyEnd::Finish)),
            no_retry(),
        );
        h.sinks.seed("big.bin", 250_000);
        h.resume(250_000, 1_000_000);
        let events = h.wait_terminal().await;

        assert_eq!(h.source.requested_offsets(), vec![250_000]);
        assert_eq!(events.last(), Some(&WorkerEvent::Complete { task_id: h.task_id }));
        assert_eq!(h.sinks.file("big.bin").unwrap().data.len(), 1_000_000);
    }

    #[actix_rt::test]
    async fn test_resume_rejected_by_server_is_not_restarted() {
        let h = Harness::new(
            ScriptedSource::new(FileInfo::ranged(1_000_000))
                .respond(ScriptedResponse::Status(416)),
            no_retry(),
        );
        h.sinks.seed("big.bin", 250_000);
        h.resume(250_000, 1_000_000);
        let events = h.wait_terminal().await;

        assert!(matches!(
            events.last(),
            Some(WorkerEvent::Error { kind: FailureKind::RangeNotSupported, .. })
        ));
        assert_eq!(h.source.requested_offsets(), vec![250_000]);
    }

    #[actix_rt::test]
    async fn test_resume_detects_changed_resource() {
        let h = Harness::new(ScriptedSource::new(FileInfo::ranged(2_000_000)), no_retry());
        h.resume(250_000, 1_000_000);
        let events = h.wait_terminal().await;
        assert!(matches!(
            events.last(),
            Some(WorkerEvent::Error { kind: FailureKind::ResourceChanged, .. })
        ));
    }

    #[actix_rt::test]
    async fn test_resume_at_end_skips_requests() {
        let h = Harness::new(ScriptedSource::new(FileInfo::ranged(1_000)), no_retry());
        h.sinks.seed("big.bin", 1_000);
        h.resume(1_000, 1_000);
        let events = h.wait_terminal().await;
        assert_eq!(events.last(), Some(&WorkerEvent::Complete { task_id: h.task_id }));
        assert!(h.source.requested_offsets().is_empty());
    }

    #[actix_rt::test]
    async fn test_transport_error_retries_from_confirmed_offset() {
        let settings = WorkerSettings {
            retry: RetryStrategy {
                max_retries: 2,
                base_delay: std::time::Duration::from_millis(1),
                max_delay: std::time::Duration::from_millis(5),
                ..RetryStrategy::default()
            },
            ..WorkerSettings::default()
        };
        let h = Harness::new(
            ScriptedSource::new(FileInfo::ranged(1_000))
                .respond(ScriptedResponse::partial(vec![300], BodyEnd::Fail("connection reset".into())))
                .respond(ScriptedResponse::SendError("connection refused".into()))
                .respond(ScriptedResponse::partial(vec![700], BodyEnd::Finish)),
            settings,
        );
        h.start();
        let events = h.wait_terminal().await;

        assert_eq!(events.last(), Some(&WorkerEvent::Complete { task_id: h.task_id }));
        assert_eq!(h.source.requested_offsets(), vec![0, 300, 300]);
    }

    #[actix_rt::test]
    async fn test_retry_budget_resets_after_partial_progress() {
        let settings = WorkerSettings {
            retry: RetryStrategy {
                max_retries: 1,
                base_delay: std::time::Duration::from_millis(1),
                max_delay: std::time::Duration::from_millis(5),
                ..RetryStrategy::default()
            },
            ..WorkerSettings::default()
        };
        let h = Harness::new(
            ScriptedSource::new(FileInfo::ranged(1_000))
                .respond(ScriptedResponse::partial(vec![300], BodyEnd::Fail("connection reset".into())))
                .respond(ScriptedResponse::partial(vec![300], BodyEnd::Fail("connection reset".into())))
                .respond(ScriptedResponse::partial(vec![400], BodyEnd::Finish)),
            settings,
        );
        h.start();
        let events = h.wait_terminal().await;

        assert_eq!(events.last(), Some(&WorkerEvent::Complete { task_id: h.task_id }));
        assert_eq!(h.source.requested_offsets(), vec![0, 300, 600]);
        assert_eq!(h.sinks.file("big.bin").unwrap().data.len(), 1_000);
    }

    #[actix_rt::test]
    async fn test_streaming_error_without_retry_fails() {
        let h = Harness::new(
            ScriptedSource::new(FileInfo::ranged(1_000))
                .respond(ScriptedResponse::partial(vec![300], BodyEnd::Fail("connection reset".into()))),
            no_retry(),
        );
        h.start();
        let events = h.wait_terminal().await;

        assert!(matches!(events.last(), Some(WorkerEvent::Error { kind: FailureKind::StreamingIo, .. })));
        let file = h.sinks.file("big.bin").unwrap();
        assert!(file.aborted);
        assert_eq!(file.data.len(), 300);
    }

    #[actix_rt::test]
    async fn test_sink_failure_is_reported() {
        let h = Harness::new(
            ScriptedSource::new(FileInfo::ranged(1_000))
                .respond(ScriptedResponse::partial(vec![400, 600], BodyEnd::Finish)),
            no_retry(),
        );
        h.sinks.fail_writes_after(1);
        h.start();
        let events = h.wait_terminal().await;

        assert!(matches!(events.last(), Some(WorkerEvent::Error { kind: FailureKind::Sink, .. })));
        let progress: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                WorkerEvent::Progress { downloaded, .. } => Some(*downloaded),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![400]);
    }

    #[actix_rt::test]
    async fn test_overlong_body_is_rejected() {
        let h = Harness::new(
            ScriptedSource::new(FileInfo::ranged(1_000))
                .respond(ScriptedResponse::partial(vec![1_200], BodyEnd::Finish)),
            no_retry(),
        );
        h.start();
        let events = h.wait_terminal().await;
        assert!(matches!(events.last(), Some(WorkerEvent::Error { kind: FailureKind::StreamingIo, .. })));
        assert_eq!(h.sinks.file("big.bin").unwrap().data.len(), 0);
    }

    #[actix_rt::test]
    async fn test_resume_cross_check_does_not_override_offset() {
        let settings = WorkerSettings {
            resume_check_endpoint: Some("https://example.com/api/resume".to_string()),
            ..no_retry()
        };
        let h = Harness::new(
            ScriptedSource::new(FileInfo::ranged(1_000))
                .with_resume_offset(Ok(100))
                .respond(ScriptedResponse::partial(vec![600], BodyEnd::Finish)),
            settings,
        );
        h.sinks.seed("big.bin", 400);
        h.resume(400, 1_000);
        let events = h.wait_terminal().await;

        assert_eq!(h.source.resume_queries(), 1);
        assert_eq!(h.source.requested_offsets(), vec![400]);
        assert_eq!(events.last(), Some(&WorkerEvent::Complete { task_id: h.task_id }));
    }

    #[actix_rt::test]
    async fn test_failed_cross_check_is_ignored() {
        let settings = WorkerSettings {
            resume_check_endpoint: Some("https://example.com/api/resume".to_string()),
            ..no_retry()
        };
        let h = Harness::new(
            ScriptedSource::new(FileInfo::ranged(1_000))
                .with_resume_offset(Err(DownloadError::UnexpectedStatus(404)))
                .respond(ScriptedResponse::partial(vec![600], BodyEnd::Finish)),
            settings,
        );
        h.sinks.seed("big.bin", 400);
        h.resume(400, 1_000);
        let events = h.wait_terminal().await;
        assert_eq!(events.last(), Some(&WorkerEvent::Complete { task_id: h.task_id }));
    }

    #[actix_rt::test]
    async fn test_duplicate_start_is_ignored() {
        let h = Harness::new(
            ScriptedSource::new(FileInfo::ranged(1_000))
                .respond(ScriptedResponse::partial(vec![1_000], BodyEnd::Finish)),
            no_retry(),
        );
        h.start();
        h.start();
        let events = h.wait_terminal().await;
        assert_eq!(events.iter().filter(|e| matches!(e, WorkerEvent::Init { .. })).count(), 1);
        assert_eq!(h.source.requested_offsets(), vec![0]);
    }
}
