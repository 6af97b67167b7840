//! Rate-limited logging of undecodable PDUs. A run of identical failures
//! is logged once when it starts and summarised when it ends.

use crate::pdu::DecodeError;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub(crate) struct BadPduLog {
    current: Option<DecodeError>,
    consecutive: u32,
}

impl BadPduLog {
    /// Records a failed decode.
    pub(crate) fn bad(&mut self, name: &str, error: DecodeError) {
        if let Some(current) = &self.current {
            if current.same_kind(&error) {
                self.consecutive += 1;
                return;
            }
        }
        self.flush(name);
        info!("'{}': Rejected PDU {}", name, error);
        self.current = Some(error);
    }

    /// Records a good decode, closing any run of failures.
    pub(crate) fn good(&mut self, name: &str) {
        if self.current.is_some() {
            self.flush(name);
        }
    }

    /// Summarises the current run of failures, if any.
    pub(crate) fn flush(&mut self, name: &str) {
        if let Some(current) = self.current.take() {
            if self.consecutive > 0 {
                warn!(
                    "'{}': Rejected {} additional PDU{} {}",
                    name,
                    self.consecutive,
                    if self.consecutive == 1 { "" } else { "s" },
                    current
                );
            }
        }
        self.consecutive = 0;
    }
}
