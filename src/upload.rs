//! Upload submitter: push every prefix group through its web form.
//!
//! The submitter only knows the [`FormLocator`] / [`FormHandle`] traits. How
//! a form is found (CSS selectors, a test double, anything else) is the
//! locator's business; [`crate::browser::WebDriverSession`] is the bundled
//! implementation.
//!
//! Groups are uploaded one after another in prefix order, and the files of a
//! group one after another in list order. After each UI action the submitter
//! pauses for [`RouteConfig::action_pause_ms`] so the page can register the
//! file selection before the next action arrives.
//!
//! A missing form or a rejected action abandons the rest of that group; the
//! next group still runs. Nothing is retried.

use crate::config::RouteConfig;
use crate::error::UploadError;
use crate::output::{GroupOutcome, UploadReport, UploadStats};
use crate::pipeline::group::FolderGroup;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failure inside a browser-automation implementation.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Nothing on the page matches the selector.
    #[error("no element matches '{selector}'")]
    NoSuchElement { selector: String },

    /// The driver could not be reached or answered garbage.
    #[error("driver request failed: {0}")]
    Http(String),

    /// The driver answered with a protocol-level error.
    #[error("driver error '{error}': {message}")]
    Protocol { error: String, message: String },
}

/// Finds the upload form for a prefix letter.
#[async_trait]
pub trait FormLocator: Send + Sync {
    async fn locate_form(&self, prefix: char) -> Result<Box<dyn FormHandle>, DriverError>;
}

/// One located upload form: a file input plus a submit control.
#[async_trait]
pub trait FormHandle: Send + Sync {
    /// Put `path` into the form's file input.
    async fn set_file(&self, path: &Path) -> Result<(), DriverError>;

    /// Press the form's submit control.
    async fn submit(&self) -> Result<(), DriverError>;
}

/// Upload every group of `groups` through `locator`.
///
/// Never fails as a whole: per-group failures are recorded in the returned
/// report. Reachability of the page is the caller's concern.
pub async fn upload_groups(
    groups: &FolderGroup,
    locator: &dyn FormLocator,
    config: &RouteConfig,
) -> UploadReport {
    let start = Instant::now();
    let pause = Duration::from_millis(config.action_pause_ms);
    let total_files = groups.file_count();
    info!("Uploading {} files in {} groups", total_files, groups.len());

    if let Some(ref cb) = config.progress_callback {
        cb.on_upload_start(groups.len(), total_files);
    }

    let mut outcomes = Vec::with_capacity(groups.len());
    for (prefix, files) in groups.iter() {
        if let Some(ref cb) = config.progress_callback {
            cb.on_group_start(prefix, files.len());
        }

        let outcome = upload_group(prefix, files, locator, pause, config).await;

        if let Some(ref err) = outcome.error {
            warn!("{} ({} files not uploaded)", err, outcome.skipped());
            if let Some(ref cb) = config.progress_callback {
                cb.on_group_error(prefix, &err.to_string());
            }
        }
        outcomes.push(outcome);
    }

    let stats = UploadStats {
        total_groups: outcomes.len(),
        failed_groups: outcomes.iter().filter(|g| g.error.is_some()).count(),
        total_files,
        uploaded_files: outcomes.iter().map(|g| g.uploaded.len()).sum(),
        duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        "Upload complete: {}/{} files, {} groups failed",
        stats.uploaded_files, stats.total_files, stats.failed_groups
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_upload_complete(stats.total_groups, stats.uploaded_files);
    }

    UploadReport {
        groups: outcomes,
        stats,
    }
}

async fn upload_group(
    prefix: char,
    files: &[PathBuf],
    locator: &dyn FormLocator,
    pause: Duration,
    config: &RouteConfig,
) -> GroupOutcome {
    let mut outcome = GroupOutcome {
        prefix,
        attempted: files.len(),
        uploaded: Vec::with_capacity(files.len()),
        error: None,
    };

    let form = match locator.locate_form(prefix).await {
        Ok(form) => form,
        Err(e) => {
            outcome.error = Some(UploadError::TargetMissing {
                prefix,
                detail: e.to_string(),
            });
            return outcome;
        }
    };
    debug!("Located form for group {}", prefix);

    for file in files {
        if let Err(e) = submit_file(form.as_ref(), file, pause).await {
            outcome.error = Some(UploadError::Action {
                prefix,
                file: file.clone(),
                detail: e.to_string(),
            });
            break;
        }
        debug!("Uploaded {} via group {}", file.display(), prefix);
        if let Some(ref cb) = config.progress_callback {
            cb.on_file_uploaded(prefix, file);
        }
        outcome.uploaded.push(file.clone());
    }

    outcome
}

async fn submit_file(
    form: &dyn FormHandle,
    file: &Path,
    pause: Duration,
) -> Result<(), DriverError> {
    form.set_file(file).await?;
    tokio::time::sleep(pause).await;
    form.submit().await?;
    tokio::time::sleep(pause).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every action as a string; fails where told to.
    #[derive(Default)]
    struct ScriptedLocator {
        log: Arc<Mutex<Vec<String>>>,
        missing: Vec<char>,
        reject_file: Option<String>,
    }

    struct ScriptedForm {
        prefix: char,
        log: Arc<Mutex<Vec<String>>>,
        reject_file: Option<String>,
    }

    #[async_trait]
    impl FormLocator for ScriptedLocator {
        async fn locate_form(&self, prefix: char) -> Result<Box<dyn FormHandle>, DriverError> {
            if self.missing.contains(&prefix) {
                return Err(DriverError::NoSuchElement {
                    selector: format!(".uploadForm[data-form-type={prefix}] input"),
                });
            }
            Ok(Box::new(ScriptedForm {
                prefix,
                log: Arc::clone(&self.log),
                reject_file: self.reject_file.clone(),
            }))
        }
    }

    #[async_trait]
    impl FormHandle for ScriptedForm {
        async fn set_file(&self, path: &Path) -> Result<(), DriverError> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            if self.reject_file.as_deref() == Some(name.as_str()) {
                return Err(DriverError::Protocol {
                    error: "invalid argument".into(),
                    message: "File not found".into(),
                });
            }
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:set:{}", self.prefix, name));
            Ok(())
        }

        async fn submit(&self) -> Result<(), DriverError> {
            self.log.lock().unwrap().push(format!("{}:submit", self.prefix));
            Ok(())
        }
    }

    fn groups(dir: &Path) -> FolderGroup {
        let layout: [(&str, &[&str]); 2] = [
            ("Anna Lee", &["a1.png"]),
            ("Jane Doe", &["j1.png", "j2.png"]),
        ];
        for (folder, files) in layout {
            std::fs::create_dir(dir.join(folder)).unwrap();
            for f in files {
                std::fs::write(dir.join(folder).join(f), b"x").unwrap();
            }
        }
        crate::pipeline::group::group_folder(dir).unwrap()
    }

    fn fast_config() -> RouteConfig {
        RouteConfig::builder().action_pause_ms(0).build().unwrap()
    }

    #[tokio::test]
    async fn uploads_every_file_in_prefix_order() {
        let dir = tempfile::tempdir().unwrap();
        let locator = ScriptedLocator::default();

        let report = upload_groups(&groups(dir.path()), &locator, &fast_config()).await;

        assert_eq!(
            *locator.log.lock().unwrap(),
            vec![
                "A:set:a1.png",
                "A:submit",
                "J:set:j1.png",
                "J:submit",
                "J:set:j2.png",
                "J:submit",
            ]
        );
        assert_eq!(report.stats.uploaded_files, 3);
        assert_eq!(report.stats.failed_groups, 0);
    }

    #[tokio::test]
    async fn missing_form_skips_group_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let locator = ScriptedLocator {
            missing: vec!['A'],
            ..Default::default()
        };

        let report = upload_groups(&groups(dir.path()), &locator, &fast_config()).await;

        let a = &report.groups[0];
        assert!(matches!(
            a.error,
            Some(UploadError::TargetMissing { prefix: 'A', .. })
        ));
        assert!(a.uploaded.is_empty());
        assert_eq!(report.groups[1].uploaded.len(), 2);
        assert_eq!(report.stats.failed_groups, 1);
        assert_eq!(report.stats.uploaded_files, 2);
    }

    #[tokio::test]
    async fn rejected_file_abandons_rest_of_group() {
        let dir = tempfile::tempdir().unwrap();
        let locator = ScriptedLocator {
            reject_file: Some("j1.png".into()),
            ..Default::default()
        };

        let report = upload_groups(&groups(dir.path()), &locator, &fast_config()).await;

        let j = &report.groups[1];
        match &j.error {
            Some(UploadError::Action { prefix, file, .. }) => {
                assert_eq!(*prefix, 'J');
                assert!(file.ends_with("j1.png"));
            }
            other => panic!("expected Action error, got {other:?}"),
        }
        assert_eq!(j.skipped(), 2);
        assert!(!locator
            .log
            .lock()
            .unwrap()
            .iter()
            .any(|l| l.contains("j2.png")));
    }

    #[tokio::test]
    async fn empty_groups_upload_nothing() {
        let locator = ScriptedLocator::default();
        let report = upload_groups(&FolderGroup::default(), &locator, &fast_config()).await;
        assert!(report.groups.is_empty());
        assert_eq!(report.stats.total_groups, 0);
        assert_eq!(report.stats.uploaded_files, 0);
    }

    /// Records each action with the virtual time it happened at.
    #[derive(Clone)]
    struct TimedForm {
        origin: tokio::time::Instant,
        log: Arc<Mutex<Vec<(String, u64)>>>,
    }

    impl TimedForm {
        fn record(&self, action: String) {
            let at = self.origin.elapsed().as_millis() as u64;
            self.log.lock().unwrap().push((action, at));
        }
    }

    #[async_trait]
    impl FormLocator for TimedForm {
        async fn locate_form(&self, _prefix: char) -> Result<Box<dyn FormHandle>, DriverError> {
            Ok(Box::new(self.clone()))
        }
    }

    #[async_trait]
    impl FormHandle for TimedForm {
        async fn set_file(&self, path: &Path) -> Result<(), DriverError> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            self.record(format!("set:{name}"));
            Ok(())
        }

        async fn submit(&self) -> Result<(), DriverError> {
            self.record("submit".to_string());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_after_every_action() {
        let dir = tempfile::tempdir().unwrap();
        let jane = dir.path().join("Jane Doe");
        std::fs::create_dir(&jane).unwrap();
        std::fs::write(jane.join("j1.png"), b"x").unwrap();
        std::fs::write(jane.join("j2.png"), b"x").unwrap();
        let groups = crate::pipeline::group::group_folder(dir.path()).unwrap();

        let origin = tokio::time::Instant::now();
        let form = TimedForm {
            origin,
            log: Arc::default(),
        };
        let config = RouteConfig::builder().action_pause_ms(50).build().unwrap();

        let report = upload_groups(&groups, &form, &config).await;

        assert_eq!(report.stats.uploaded_files, 2);
        assert_eq!(
            *form.log.lock().unwrap(),
            vec![
                ("set:j1.png".to_string(), 0),
                ("submit".to_string(), 50),
                ("set:j2.png".to_string(), 100),
                ("submit".to_string(), 150),
            ]
        );
        assert_eq!(origin.elapsed(), Duration::from_millis(4 * 50));
    }
}
