//! Remote-surface driver: the portal interactions a run is made of.
//!
//! Wraps one browser context. Waits are explicit and bounded; nothing here
//! retries. A timed-out wait becomes `RunError::InteractionTimeout`, any other
//! capability failure becomes `RunError::Interaction`.

use crate::config::{Credentials, Timeouts};
use crate::error::RunError;
use crate::live::portal::PortalLayout;
use crate::renderer::{DownloadedFile, NavigationResult, RenderContext, Target, TimedOut};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// What to wait for after a navigation.
#[derive(Debug, Clone)]
pub enum WaitPolicy {
    /// Fixed settle period.
    Settle(Duration),
    /// Until the target is visible, bounded by the duration.
    Visible(Target, Duration),
}

/// How an unsolicited overlay is dismissed.
#[derive(Debug, Clone)]
pub enum Dismissal {
    /// Click the given close control, which is also the presence probe.
    CloseControl(Target),
    /// Probe for the overlay, then press Escape and settle.
    Escape { overlay: Target, settle: Duration },
}

/// A report job that has been submitted to the portal.
#[derive(Debug, Clone)]
pub struct ExportHandle {
    pub report_kind: String,
    pub requested_at: Instant,
}

/// Drives the portal through a single browser context.
pub struct PortalDriver {
    context: Box<dyn RenderContext>,
    layout: PortalLayout,
    timeouts: Timeouts,
}

impl PortalDriver {
    pub fn new(context: Box<dyn RenderContext>, layout: PortalLayout, timeouts: Timeouts) -> Self {
        Self {
            context,
            layout,
            timeouts,
        }
    }

    /// Open the login page, submit the credentials, and let the portal settle.
    pub async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), RunError> {
        let login_url = self.layout.login_url.clone();
        let user_field = self.layout.user_field.clone();
        self.navigate(
            &login_url,
            WaitPolicy::Visible(user_field.clone(), self.timeouts.login_field),
        )
        .await?;

        self.context
            .fill(&user_field, credentials.user())
            .await
            .map_err(|e| classify("filling the user field", e))?;
        self.context
            .fill(&self.layout.password_field, credentials.secret())
            .await
            .map_err(|e| classify("filling the password field", e))?;
        self.context
            .click(&self.layout.login_button)
            .await
            .map_err(|e| classify("submitting the login form", e))?;

        dwell(self.timeouts.post_login_settle).await;
        info!(user = credentials.user(), "credentials submitted");
        Ok(())
    }

    /// Navigate and then apply `policy`.
    pub async fn navigate(
        &mut self,
        url: &str,
        policy: WaitPolicy,
    ) -> Result<NavigationResult, RunError> {
        let timeout_ms = self.timeouts.navigation.as_millis() as u64;
        let nav = self
            .context
            .navigate(url, timeout_ms)
            .await
            .map_err(|e| classify("navigating", e))?;
        debug!(url, final_url = %nav.final_url, load_ms = nav.load_time_ms, "navigated");

        match policy {
            WaitPolicy::Settle(d) => dwell(d).await,
            WaitPolicy::Visible(target, bound) => {
                self.wait_visible(&target, bound, "page content").await?
            }
        }
        Ok(nav)
    }

    /// Poll until `target` is visible or `bound` elapses.
    pub async fn wait_visible(
        &self,
        target: &Target,
        bound: Duration,
        what: &str,
    ) -> Result<(), RunError> {
        let poll = self.timeouts.poll_interval.max(Duration::from_millis(1));
        let deadline = tokio::time::Instant::now() + bound;
        let timed_out = || RunError::InteractionTimeout {
            what: format!("{what} ({target})"),
            timeout_ms: bound.as_millis() as u64,
        };

        let wait = async {
            loop {
                if self
                    .context
                    .is_visible(target)
                    .await
                    .map_err(|e| classify("probing visibility", e))?
                {
                    return Ok(());
                }
                let now = tokio::time::Instant::now();
                if now >= deadline {
                    return Err(timed_out());
                }
                tokio::time::sleep(poll.min(deadline - now)).await;
            }
        };

        match tokio::time::timeout_at(deadline, wait).await {
            Ok(result) => result,
            Err(_) => Err(timed_out()),
        }
    }

    /// Dismiss an overlay if one is showing. Returns whether one was found.
    pub async fn dismiss_overlay(&mut self, dismissal: &Dismissal) -> Result<bool, RunError> {
        match dismissal {
            Dismissal::CloseControl(close) => {
                if !self.probe(close).await? {
                    return Ok(false);
                }
                self.context
                    .click(close)
                    .await
                    .map_err(|e| classify("closing an overlay", e))?;
            }
            Dismissal::Escape { overlay, settle } => {
                if !self.probe(overlay).await? {
                    return Ok(false);
                }
                self.context
                    .press_key("Escape")
                    .await
                    .map_err(|e| classify("escaping an overlay", e))?;
                dwell(*settle).await;
            }
        }
        info!("overlay dismissed");
        Ok(true)
    }

    /// Wait for the export control and open the export dialog.
    pub async fn open_export_dialog(&mut self) -> Result<(), RunError> {
        let export = self.layout.export_button.clone();
        self.wait_visible(&export, self.timeouts.export_control, "export control")
            .await?;
        self.context
            .click(&export)
            .await
            .map_err(|e| classify("opening the export dialog", e))?;
        dwell(self.timeouts.dialog_step_settle).await;
        Ok(())
    }

    /// Pick the report category in the open dialog and confirm.
    ///
    /// This only submits the server-side job; the file is produced later.
    pub async fn trigger_export(&mut self, report_kind: &str) -> Result<ExportHandle, RunError> {
        let settle = self.timeouts.dialog_step_settle;
        let item = self.layout.report_item(report_kind);

        self.context
            .click(&self.layout.category_dropdown)
            .await
            .map_err(|e| classify("opening the report categories", e))?;
        dwell(settle).await;
        self.context
            .click(&item)
            .await
            .map_err(|e| classify("selecting the report", e))?;
        dwell(settle).await;
        self.context
            .click(&self.layout.confirm_button)
            .await
            .map_err(|e| classify("confirming the export", e))?;

        info!(report_kind, "export requested");
        Ok(ExportHandle {
            report_kind: report_kind.to_string(),
            requested_at: Instant::now(),
        })
    }

    /// Click the download control and wait for the file to land in `dir`.
    pub async fn await_download(
        &mut self,
        handle: &ExportHandle,
        dir: &Path,
    ) -> Result<DownloadedFile, RunError> {
        let bound = self.timeouts.download;
        let trigger = self.layout.download_button.clone();
        let file = self
            .context
            .download(&trigger, dir, bound)
            .await
            .map_err(|e| classify("downloading the report", e))?;

        info!(
            report_kind = %handle.report_kind,
            name = %file.suggested_name,
            bytes = file.bytes,
            since_request_ms = handle.requested_at.elapsed().as_millis() as u64,
            "download complete"
        );
        Ok(file)
    }

    /// Full-page screenshot for diagnosis.
    pub async fn screenshot(&self, path: &Path) -> Result<(), RunError> {
        self.context
            .screenshot(path)
            .await
            .map_err(|e| classify("capturing a screenshot", e))
    }

    /// Close the browser context.
    pub async fn close(self) -> Result<(), RunError> {
        self.context
            .close()
            .await
            .map_err(|e| classify("closing the browser context", e))
    }

    async fn probe(&self, target: &Target) -> Result<bool, RunError> {
        self.context
            .is_visible(target)
            .await
            .map_err(|e| classify("probing for an overlay", e))
    }
}

/// Fixed, unconditional wait.
pub async fn dwell(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

fn classify(step: &'static str, err: anyhow::Error) -> RunError {
    match err.downcast_ref::<TimedOut>() {
        Some(t) => RunError::InteractionTimeout {
            what: t.what.clone(),
            timeout_ms: t.timeout_ms,
        },
        None => RunError::interaction(step, err),
    }
}
