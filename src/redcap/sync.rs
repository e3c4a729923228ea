//! Per-subject REDCap synchronization.
//!
//! For every (instance, record id) a subject has, and every project its
//! study may read from that instance:
//!
//! 1. Work out the snapshot path: `<protected>/surveys/<record>.<project>.json`
//! 2. If the snapshot exists and the trigger log shows nothing newer, skip
//! 3. Otherwise download the record (only non-identifying fields when the
//!    study is de-identified; nothing at all if no field is safe)
//! 4. `[]` means REDCap has no data for the record: log it, write nothing
//! 5. Hand the body to [`write_snapshot`], which creates, replaces with
//!    backup, or leaves an identical snapshot alone
//!
//! [`Syncer::sync`] wraps the whole subject in a bounded retry.
//! [`snapshot_status`] answers the skip question for every target without
//! touching the network.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::{Keyring, ProjectRef, RedcapSettings};
use crate::error::Result;
use crate::model::{snapshot_file_name, Subject};
use crate::snapshot::write_snapshot;

use super::client::{record_query, RedcapClient};
use super::metadata::deidentified_fields;
use super::retry::{retry, RetryPolicy};
use super::trigger::TriggerLog;
use super::types::{
    SnapshotState, SubjectReport, SyncAction, TargetReport, TargetStatus,
};

/// Whether a REDCap response body is the "no data" marker `[]`.
#[must_use]
pub fn is_empty_result(content: &[u8]) -> bool {
    content.trim_ascii() == b"[]"
}

/// One thing to sync: a subject's record id in one project.
struct Target<'s> {
    instance: &'s str,
    record_id: &'s str,
    project: ProjectRef,
    path: PathBuf,
}

impl Target<'_> {
    fn context(&self) -> String {
        format!("{}/{}/{}", self.instance, self.project.project, self.record_id)
    }

    fn report(&self, action: SyncAction) -> TargetReport {
        TargetReport {
            instance: self.instance.to_string(),
            project: self.project.project.clone(),
            record_id: self.record_id.to_string(),
            path: self.path.clone(),
            action,
        }
    }
}

/// Every target of a subject, in sync order.
///
/// Fails on the first keyring error.
fn targets<'s>(keyring: &Keyring, subject: &'s Subject) -> Result<Vec<Target<'s>>> {
    let dst_folder = subject.surveys_dir();
    let mut targets = Vec::new();
    for (instance, record_id) in subject.redcap_ids() {
        for project in keyring.redcap_projects(&subject.study, instance)? {
            let path = dst_folder.join(snapshot_file_name(record_id, &project.project));
            targets.push(Target {
                instance,
                record_id,
                project,
                path,
            });
        }
    }
    Ok(targets)
}

/// Report the snapshot state of every target of a subject from local state
/// alone: the snapshots on disk and the trigger log.
///
/// # Errors
///
/// Returns keyring errors, or an I/O error if a snapshot's mtime cannot be
/// read.
pub fn snapshot_status(
    keyring: &Keyring,
    trigger_log: &TriggerLog,
    subject: &Subject,
) -> Result<Vec<TargetStatus>> {
    targets(keyring, subject)?
        .into_iter()
        .map(|target| {
            let state = if !target.path.is_file() {
                SnapshotState::Missing
            } else if trigger_log.check_if_modified(target.record_id, &target.path)? {
                SnapshotState::Stale
            } else {
                SnapshotState::Current
            };
            Ok(TargetStatus {
                instance: target.instance.to_string(),
                project: target.project.project.clone(),
                record_id: target.record_id.to_string(),
                last_trigger: trigger_log.latest_update(target.record_id),
                path: target.path,
                state,
            })
        })
        .collect()
}

/// Drives syncs for many subjects against one keyring and trigger log.
pub struct Syncer<'a> {
    client: RedcapClient,
    keyring: &'a Keyring,
    settings: &'a RedcapSettings,
    trigger_log: &'a TriggerLog,
    retry: RetryPolicy,
    dry_run: bool,
}

impl<'a> Syncer<'a> {
    /// Create a syncer. Retries follow `settings.max_attempts`.
    pub fn new(
        client: RedcapClient,
        keyring: &'a Keyring,
        settings: &'a RedcapSettings,
        trigger_log: &'a TriggerLog,
    ) -> Self {
        Self {
            client,
            keyring,
            settings,
            trigger_log,
            retry: RetryPolicy::with_attempts(settings.max_attempts),
            dry_run: false,
        }
    }

    /// Do everything except writing snapshots.
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Sync a subject, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns keyring/config and I/O errors immediately, and fetch errors
    /// once the retry budget is spent.
    pub async fn sync(&self, subject: &Subject) -> Result<SubjectReport> {
        let name = format!("sync {}/{}", subject.study, subject.id);
        retry(&name, &self.retry, || self.sync_once(subject)).await
    }

    /// Sync a subject once, without retrying.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; snapshots written before it stay
    /// on disk.
    pub async fn sync_once(&self, subject: &Subject) -> Result<SubjectReport> {
        debug!("exploring {}/{}", subject.study, subject.id);
        let deidentify = self.settings.deidentify(&subject.study);
        debug!("deidentify for study {} is {deidentify}", subject.study);

        let mut report = SubjectReport {
            subject: subject.id.clone(),
            study: subject.study.clone(),
            deidentified: deidentify,
            targets: Vec::new(),
        };

        for target in targets(self.keyring, subject)? {
            let action = self.sync_target(&target, deidentify).await?;
            report.targets.push(target.report(action));
        }
        Ok(report)
    }

    async fn sync_target(&self, target: &Target<'_>, deidentify: bool) -> Result<SyncAction> {
        let context = target.context();

        if target.path.is_file()
            && !self
                .trigger_log
                .check_if_modified(target.record_id, &target.path)?
        {
            info!("{context}: no updates, not downloading REDCap data");
            return Ok(SyncAction::Skipped);
        }

        info!("{context}: downloading REDCap data");
        let mut query = record_query(&target.project.api_key, target.record_id);
        if deidentify {
            let Some(fields) =
                deidentified_fields(&self.client, &target.project, &context).await?
            else {
                warn!("{context}: every field is marked identifying, not downloading");
                return Ok(SyncAction::NoSafeFields);
            };
            query.push(("fields", fields));
        }

        let content = self
            .client
            .post(&target.project.api_url, &query, &context)
            .await?;

        if is_empty_result(&content) {
            info!("no redcap data for {}", target.record_id);
            return Ok(SyncAction::Empty);
        }

        let outcome = write_snapshot(&target.path, &content, self.dry_run)?;
        Ok(outcome.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::redcap::trigger::{now_secs, set_mtime_secs};
    use crate::snapshot::list_backups;
    use std::collections::BTreeMap;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RECORD: &str = r#"[{"record_id":"S1","age":"30"}]"#;

    struct Fixture {
        _dir: TempDir,
        server: MockServer,
        keyring: Keyring,
        settings: RedcapSettings,
        subject: Subject,
    }

    impl Fixture {
        async fn new(projects: &[&str]) -> Self {
            let dir = TempDir::new().unwrap();
            let server = MockServer::start().await;

            let tokens: BTreeMap<_, _> = projects
                .iter()
                .map(|p| ((*p).to_string(), format!("token-{p}")))
                .collect();
            let keyring = Keyring::from_json(
                &serde_json::json!({
                    "lochness": {"REDCAP": {"StudyA": {"redcap.main": projects}}},
                    "redcap.main": {"URL": server.uri(), "API_TOKEN": tokens},
                })
                .to_string(),
            )
            .unwrap();

            let mut redcap = BTreeMap::new();
            redcap.insert("redcap.main".to_string(), vec!["S1".to_string()]);
            let subject = Subject {
                id: "S1".into(),
                study: "StudyA".into(),
                protected_folder: dir.path().join("PROTECTED").join("S1"),
                redcap,
            };

            Self {
                _dir: dir,
                server,
                keyring,
                settings: RedcapSettings::default(),
                subject,
            }
        }

        fn snapshot(&self, project: &str) -> PathBuf {
            self.subject
                .surveys_dir()
                .join(snapshot_file_name("S1", project))
        }

        fn syncer<'a>(&'a self, log: &'a TriggerLog) -> Syncer<'a> {
            let client = RedcapClient::with_options(true, Duration::from_secs(5)).unwrap();
            Syncer::new(client, &self.keyring, &self.settings, log)
                .retry_policy(RetryPolicy::immediate(3))
        }

        async fn respond_record(&self, body: &str) {
            Mock::given(method("POST"))
                .and(path("/api/"))
                .and(body_string_contains("content=record"))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .mount(&self.server)
                .await;
        }
    }

    #[test]
    fn test_is_empty_result() {
        assert!(is_empty_result(b"[]"));
        assert!(is_empty_result(b"  [] \n"));
        assert!(!is_empty_result(b"[{}]"));
        assert!(!is_empty_result(b"[ ]"));
        assert!(!is_empty_result(b""));
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_fetched_and_created() {
        let fx = Fixture::new(&["intake"]).await;
        fx.respond_record(RECORD).await;
        let log = TriggerLog::empty();

        let report = fx.syncer(&log).sync(&fx.subject).await.unwrap();

        assert_eq!(report.targets.len(), 1);
        assert_eq!(report.targets[0].action, SyncAction::Created);
        assert_eq!(fs::read_to_string(fx.snapshot("intake")).unwrap(), RECORD);
    }

    #[tokio::test]
    async fn test_existing_snapshot_not_in_log_is_skipped() {
        let fx = Fixture::new(&["intake"]).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RECORD))
            .expect(0)
            .mount(&fx.server)
            .await;
        let snap = fx.snapshot("intake");
        fs::create_dir_all(snap.parent().unwrap()).unwrap();
        fs::write(&snap, "old").unwrap();
        let log = TriggerLog::from_entries([("S2", now_secs() + 1000.0)]);

        let report = fx.syncer(&log).sync(&fx.subject).await.unwrap();

        assert_eq!(report.targets[0].action, SyncAction::Skipped);
        assert_eq!(fs::read_to_string(&snap).unwrap(), "old");
    }

    #[tokio::test]
    async fn test_stale_snapshot_is_refetched_with_backup() {
        let fx = Fixture::new(&["intake"]).await;
        fx.respond_record(RECORD).await;
        let snap = fx.snapshot("intake");
        fs::create_dir_all(snap.parent().unwrap()).unwrap();
        fs::write(&snap, "old").unwrap();
        set_mtime_secs(&snap, 100.0).unwrap();
        let log = TriggerLog::from_entries([("S1", 50.0), ("S1", 150.0)]);

        let report = fx.syncer(&log).sync(&fx.subject).await.unwrap();

        assert!(matches!(report.targets[0].action, SyncAction::Updated { .. }));
        assert_eq!(fs::read_to_string(&snap).unwrap(), RECORD);
        let backups = list_backups(&snap).unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read_to_string(&backups[0]).unwrap(), "old");
    }

    #[tokio::test]
    async fn test_stale_but_identical_snapshot_is_unchanged() {
        let fx = Fixture::new(&["intake"]).await;
        fx.respond_record(RECORD).await;
        let snap = fx.snapshot("intake");
        fs::create_dir_all(snap.parent().unwrap()).unwrap();
        fs::write(&snap, RECORD).unwrap();
        set_mtime_secs(&snap, 100.0).unwrap();
        let log = TriggerLog::from_entries([("S1", 150.0)]);

        let report = fx.syncer(&log).sync(&fx.subject).await.unwrap();

        assert_eq!(report.targets[0].action, SyncAction::Unchanged);
        assert!(list_backups(&snap).unwrap().is_empty());
        let status = snapshot_status(&fx.keyring, &log, &fx.subject).unwrap();
        assert_eq!(status[0].state, SnapshotState::Current);
    }

    #[tokio::test]
    async fn test_empty_result_writes_nothing() {
        let fx = Fixture::new(&["intake"]).await;
        fx.respond_record(" [] \n").await;
        let log = TriggerLog::empty();

        let report = fx.syncer(&log).sync(&fx.subject).await.unwrap();

        assert_eq!(report.targets[0].action, SyncAction::Empty);
        assert!(!fx.subject.surveys_dir().exists());
    }

    #[tokio::test]
    async fn test_dry_run_fetches_but_does_not_write() {
        let fx = Fixture::new(&["intake"]).await;
        fx.respond_record(RECORD).await;
        let log = TriggerLog::empty();

        let report = fx
            .syncer(&log)
            .dry_run(true)
            .sync(&fx.subject)
            .await
            .unwrap();

        assert_eq!(report.targets[0].action, SyncAction::DryRun);
        assert!(!fx.snapshot("intake").exists());
    }

    #[tokio::test]
    async fn test_deidentified_study_requests_only_safe_fields() {
        let mut fx = Fixture::new(&["intake"]).await;
        fx.settings
            .studies
            .insert("StudyA".into(), serde_json::json!({"deidentify": true}));
        Mock::given(method("POST"))
            .and(body_string_contains("content=metadata"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"field_name":"record_id","identifier":""},
                    {"field_name":"name","identifier":"y"},
                    {"field_name":"age","identifier":""}]"#,
            ))
            .expect(1)
            .mount(&fx.server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("content=record"))
            .and(body_string_contains("fields=record_id%2Cage"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RECORD))
            .expect(1)
            .mount(&fx.server)
            .await;
        let log = TriggerLog::empty();

        let report = fx.syncer(&log).sync(&fx.subject).await.unwrap();

        assert!(report.deidentified);
        assert_eq!(report.targets[0].action, SyncAction::Created);
    }

    #[tokio::test]
    async fn test_deidentified_study_without_safe_fields_fetches_no_record() {
        let mut fx = Fixture::new(&["intake"]).await;
        fx.settings
            .studies
            .insert("StudyA".into(), serde_json::json!({"deidentify": true}));
        Mock::given(method("POST"))
            .and(body_string_contains("content=metadata"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"[{"field_name":"name","identifier":"y"}]"#),
            )
            .expect(1)
            .mount(&fx.server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("content=record"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"name":"Jane Doe"}]"#))
            .expect(0)
            .mount(&fx.server)
            .await;
        let log = TriggerLog::empty();

        let report = fx.syncer(&log).sync(&fx.subject).await.unwrap();

        assert_eq!(report.targets[0].action, SyncAction::NoSafeFields);
        assert!(!fx.snapshot("intake").exists());
        let requests = fx.server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!String::from_utf8_lossy(&requests[0].body).contains("content=record"));
    }

    #[tokio::test]
    async fn test_identified_study_sends_no_field_list() {
        let fx = Fixture::new(&["intake"]).await;
        Mock::given(method("POST"))
            .and(body_string_contains("content=metadata"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(0)
            .mount(&fx.server)
            .await;
        fx.respond_record(RECORD).await;
        let log = TriggerLog::empty();

        let report = fx.syncer(&log).sync(&fx.subject).await.unwrap();

        assert!(!report.deidentified);
        let requests = fx.server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!String::from_utf8_lossy(&requests[0].body).contains("fields="));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let fx = Fixture::new(&["intake"]).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&fx.server)
            .await;
        fx.respond_record(RECORD).await;
        let log = TriggerLog::empty();

        let report = fx.syncer(&log).sync(&fx.subject).await.unwrap();

        assert_eq!(report.targets[0].action, SyncAction::Created);
        assert_eq!(fx.server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_fetch_error() {
        let fx = Fixture::new(&["intake"]).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&fx.server)
            .await;
        let log = TriggerLog::empty();

        let err = fx.syncer(&log).sync(&fx.subject).await.unwrap_err();

        assert!(matches!(err, Error::Status { status: 500, .. }));
        assert_eq!(fx.server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_keyring_error_is_not_retried() {
        let mut fx = Fixture::new(&["intake"]).await;
        fx.keyring = Keyring::from_json(
            r#"{"lochness": {"REDCAP": {"StudyA": {"redcap.main": ["intake"]}}},
                "redcap.main": {"URL": "http://unused"}}"#,
        )
        .unwrap();
        let log = TriggerLog::empty();

        let err = fx.syncer(&log).sync(&fx.subject).await.unwrap_err();

        assert!(matches!(err, Error::Keyring(_)));
        assert!(fx.server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_skip_does_not_abandon_other_projects() {
        let fx = Fixture::new(&["intake", "followup"]).await;
        fx.respond_record(RECORD).await;
        let intake = fx.snapshot("intake");
        fs::create_dir_all(intake.parent().unwrap()).unwrap();
        fs::write(&intake, "old").unwrap();
        let log = TriggerLog::empty();

        let report = fx.syncer(&log).sync(&fx.subject).await.unwrap();

        assert_eq!(report.targets[0].action, SyncAction::Skipped);
        assert_eq!(report.targets[1].action, SyncAction::Created);
        assert!(fx.snapshot("followup").exists());
    }

    #[tokio::test]
    async fn test_status_reports_without_network() {
        let fx = Fixture::new(&["intake", "followup"]).await;
        let intake = fx.snapshot("intake");
        fs::create_dir_all(intake.parent().unwrap()).unwrap();
        fs::write(&intake, RECORD).unwrap();
        set_mtime_secs(&intake, 100.0).unwrap();
        let log = TriggerLog::from_entries([("S1", 150.0)]);

        let status = snapshot_status(&fx.keyring, &log, &fx.subject).unwrap();

        assert_eq!(status.len(), 2);
        assert_eq!(status[0].state, SnapshotState::Stale);
        assert_eq!(status[0].last_trigger, Some(150.0));
        assert_eq!(status[1].state, SnapshotState::Missing);
        assert!(fx.server.received_requests().await.unwrap().is_empty());
    }
}
