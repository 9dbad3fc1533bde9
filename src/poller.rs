use std::time::Duration;

use color_eyre::Section;
use color_eyre::eyre::{eyre, WrapErr};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::error::Result;
use crate::practicum::{HomeworkSource, PracticumClient};
use crate::response::{current_date, extract_latest};
use crate::status::parse_status;
use crate::telegram::{Notifier, TelegramNotifier};

/// Sent instead of a status update when nothing changed since the last cycle.
pub const NO_NEW_STATUSES: &str = "Отсутствие новых статусов";

/// What to do on the cycles that are not a plain status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub notify_unchanged: bool,
    pub advance_timestamp: bool,
    pub report_failures: bool,
}

impl From<&Config> for Policy {
    fn from(config: &Config) -> Self {
        Self {
            notify_unchanged: config.notify_unchanged,
            advance_timestamp: config.advance_timestamp,
            report_failures: config.report_failures,
        }
    }
}

/// Everything the loop remembers between cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopState {
    /// `from_date` sent to the API. Fixed unless `advance_timestamp` is on.
    pub from_date: i64,
    pub last_message: Option<String>,
    pub last_failure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A new status message went out.
    Notified(String),
    /// The status matched the last one sent.
    Unchanged,
    /// The API returned no homeworks for the window.
    NoHomeworks,
    /// The cycle failed; carries the failure summary.
    Failed(String),
}

pub struct Poller<S, N> {
    source: S,
    notifier: N,
    policy: Policy,
    retry_period: Duration,
    state: LoopState,
    cycle: u64,
}

/// The loop wired to the real homework API and Telegram.
pub type HomeworkPoller = Poller<PracticumClient, TelegramNotifier>;

impl HomeworkPoller {
    /// Builds the production loop, refusing to start without all credentials.
    /// The credential check runs before either network client exists.
    pub fn from_config(config: &Config, from_date: i64) -> color_eyre::Result<Self> {
        if !config.check_tokens() {
            let missing = config.missing_tokens().join(", ");
            error!(critical = true, missing = %missing, "Required environment variables are missing");
            return Err(eyre!("Missing required environment variables: {missing}").with_suggestion(
                || "Set PRACTICUM_TOKEN, TELEGRAM_TOKEN and TELEGRAM_CHAT_ID or add them to .env",
            ));
        }

        let source = PracticumClient::new(config).wrap_err("Failed to build homework API client")?;
        let notifier = TelegramNotifier::new(config).wrap_err("Failed to build Telegram client")?;
        Ok(Self::new(
            source,
            notifier,
            Policy::from(config),
            config.retry_period(),
            from_date,
        ))
    }
}

impl<S: HomeworkSource, N: Notifier> Poller<S, N> {
    pub fn new(source: S, notifier: N, policy: Policy, retry_period: Duration, from_date: i64) -> Self {
        Self {
            source,
            notifier,
            policy,
            retry_period,
            state: LoopState {
                from_date,
                ..Default::default()
            },
            cycle: 0,
        }
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    #[cfg(test)]
    pub(crate) fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Polls forever. Only process termination stops it.
    pub async fn run(mut self) {
        info!(
            retry_period = self.retry_period.as_secs(),
            from_date = self.state.from_date,
            "🚀 Homework status polling started"
        );
        loop {
            self.tick_and_wait().await;
        }
    }

    /// One cycle followed by the retry sleep, which runs whatever the outcome.
    pub async fn tick_and_wait(&mut self) -> CycleOutcome {
        let outcome = self.tick().await;
        debug!(seconds = self.retry_period.as_secs(), "Sleeping until next cycle");
        tokio::time::sleep(self.retry_period).await;
        outcome
    }

    /// Runs one fetch, validate, parse, notify pass. Never fails: errors are
    /// logged and folded into [`CycleOutcome::Failed`].
    pub async fn tick(&mut self) -> CycleOutcome {
        self.cycle += 1;
        let span = info_span!("cycle", cycle = self.cycle);

        async {
            match self.run_cycle().await {
                Ok(outcome) => {
                    self.state.last_failure = None;
                    outcome
                }
                Err(e) => {
                    error!(kind = ?e.kind(), error = %e, "❌ Polling cycle failed");
                    let summary = format!("Сбой в работе программы: {e}");
                    self.report_failure(&summary).await;
                    CycleOutcome::Failed(summary)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let body = self.source.fetch_updates(self.state.from_date).await?;

        let outcome = match extract_latest(&body)? {
            None => {
                debug!(from_date = self.state.from_date, "No homeworks in the polling window");
                CycleOutcome::NoHomeworks
            }
            Some(homework) => {
                let message = parse_status(homework)?;
                self.deliver(message).await?
            }
        };

        if self.policy.advance_timestamp {
            match current_date(&body) {
                Some(date) => self.state.from_date = date,
                None => warn!("Response has no current_date, from_date left unchanged"),
            }
        }

        Ok(outcome)
    }

    async fn deliver(&mut self, message: String) -> Result<CycleOutcome> {
        if self.state.last_message.as_deref() != Some(message.as_str()) {
            self.notifier.notify(&message).await?;
            info!(%message, "Status change delivered");
            self.state.last_message = Some(message.clone());
            return Ok(CycleOutcome::Notified(message));
        }

        if self.policy.notify_unchanged {
            self.notifier.notify(NO_NEW_STATUSES).await?;
        }
        debug!("No new statuses");
        Ok(CycleOutcome::Unchanged)
    }

    async fn report_failure(&mut self, summary: &str) {
        if !self.policy.report_failures || self.state.last_failure.as_deref() == Some(summary) {
            return;
        }
        match self.notifier.notify(summary).await {
            Ok(()) => self.state.last_failure = Some(summary.to_string()),
            Err(e) => warn!(error = %e, "Failure report was not delivered"),
        }
    }
}
