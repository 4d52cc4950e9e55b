//! Location acquirer: bounded retry loop over the device capability.
//!
//! Idle → Requesting(n) → Succeeded | Retrying → Requesting(n + 1) | Failed
//!
//! Attempts are strictly sequential. A Poor reading or a retryable device
//! error consumes one attempt; once the budget is spent the best reading seen
//! so far is accepted, whatever its tier.

use super::accuracy::{AccuracyTier, Profile};
use super::device::{DeviceError, DeviceLocation, RequestOptions};
use super::types::{AcquisitionError, ProgressEvent, Reading};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Outcome of evaluating one attempt.
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Accept(Reading),
    Retry,
    Fail(AcquisitionError),
}

/// Drives a [`DeviceLocation`] until a reading meets the profile's bar.
#[derive(Clone)]
pub struct LocationAcquirer {
    device: Arc<dyn DeviceLocation>,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl LocationAcquirer {
    pub fn new(device: Arc<dyn DeviceLocation>) -> Self {
        Self { device, progress: None }
    }

    /// Send progress events to `sender`.
    pub fn with_progress(mut self, sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event);
        }
    }

    /// Acquire one reading under `profile`.
    pub async fn acquire(
        &self,
        profile: &Profile,
        cancel: &CancellationToken,
    ) -> Result<Reading, AcquisitionError> {
        if !self.device.is_available() {
            tracing::debug!(profile = %profile.name, "location capability absent");
            return Err(AcquisitionError::CapabilityAbsent);
        }

        let options = RequestOptions::from(profile);
        let max_attempts = profile.attempt_budget();
        let mut best: Option<Reading> = None;
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(AcquisitionError::Cancelled);
            }

            tracing::debug!(profile = %profile.name, attempt, max_attempts, "requesting position");
            self.emit(ProgressEvent::AttemptStarted { attempt, max_attempts });

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AcquisitionError::Cancelled),
                outcome = self.request_once(&options) => outcome,
            };

            match &outcome {
                Ok(reading) => {
                    let tier = profile.classify(reading.precision_meters);
                    tracing::debug!(attempt, precision = reading.precision_meters, %tier, "reading observed");
                    self.emit(ProgressEvent::ReadingObserved {
                        attempt,
                        precision_meters: reading.precision_meters,
                        tier,
                    });
                }
                Err(err) => {
                    let error = AcquisitionError::from(*err);
                    tracing::debug!(attempt, %error, "attempt failed");
                    self.emit(ProgressEvent::AttemptFailed { attempt, error });
                }
            }

            match evaluate(attempt, outcome, profile, &mut best) {
                Step::Accept(reading) => {
                    tracing::debug!(attempt, precision = reading.precision_meters, "acquisition succeeded");
                    return Ok(reading);
                }
                Step::Fail(error) => {
                    tracing::debug!(attempt, %error, "acquisition failed");
                    return Err(error);
                }
                Step::Retry => {
                    self.emit(ProgressEvent::RetryScheduled {
                        next_attempt: attempt + 1,
                        delay_ms: profile.retry_delay.as_millis() as u64,
                    });
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(AcquisitionError::Cancelled),
                        _ = tokio::time::sleep(profile.retry_delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// One device request, bridged from its callback and bounded by the
    /// profile timeout. If this future is dropped the device still runs to
    /// completion; its result lands in a closed channel.
    async fn request_once(&self, options: &RequestOptions) -> Result<Reading, DeviceError> {
        let (tx, rx) = oneshot::channel();
        self.device.request_position(
            options,
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        );

        match tokio::time::timeout(options.timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(DeviceError::PositionUnavailable),
            Err(_) => Err(DeviceError::Timeout),
        }
    }
}

/// Decide what follows attempt `attempt`.
fn evaluate(
    attempt: u32,
    outcome: Result<Reading, DeviceError>,
    profile: &Profile,
    best: &mut Option<Reading>,
) -> Step {
    let last = attempt >= profile.attempt_budget();

    match outcome {
        Ok(reading) => {
            if profile.classify(reading.precision_meters) != AccuracyTier::Poor {
                return Step::Accept(reading);
            }
            keep_best(best, reading);
            if last {
                best.take().map_or(Step::Fail(AcquisitionError::PositionUnavailable), Step::Accept)
            } else {
                Step::Retry
            }
        }
        Err(err) => {
            let error = AcquisitionError::from(err);
            if !error.is_retryable() {
                Step::Fail(error)
            } else if last {
                best.take().map_or(Step::Fail(error), Step::Accept)
            } else {
                Step::Retry
            }
        }
    }
}

fn keep_best(best: &mut Option<Reading>, reading: Reading) {
    let better = match best {
        Some(current) => reading.effective_precision() < current.effective_precision(),
        None => true,
    };
    if better {
        *best = Some(reading);
    }
}
