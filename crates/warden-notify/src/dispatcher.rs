use crate::http::HttpReporter;
use crate::smtp::SmtpNotifier;
use warden_access::{AlertDispatcher, AlertEvent, DispatchError};

/// Telemetry over HTTP, notifications over SMTP. Unconfigured paths report
/// [`DispatchError::Disabled`].
#[derive(Default)]
pub struct NetworkDispatcher {
    reporter: Option<HttpReporter>,
    notifier: Option<SmtpNotifier>,
}

impl NetworkDispatcher {
    pub fn new(reporter: Option<HttpReporter>, notifier: Option<SmtpNotifier>) -> Self {
        Self { reporter, notifier }
    }
}

impl AlertDispatcher for NetworkDispatcher {
    fn report(&mut self, event: &AlertEvent) -> Result<(), DispatchError> {
        match &self.reporter {
            Some(reporter) => reporter.send(event),
            None => Err(DispatchError::Disabled("report")),
        }
    }

    fn notify(&mut self, event: &AlertEvent) -> Result<(), DispatchError> {
        match &self.notifier {
            Some(notifier) => notifier.send(event),
            None => Err(DispatchError::Disabled("notify")),
        }
    }
}
