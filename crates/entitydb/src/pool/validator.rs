//! Liveness checks applied to idle connections at acquisition time

use std::fmt;
use std::time::Duration;

use crate::connection::Connection;

/// Decides whether a pooled connection can still be handed out.
///
/// A failed check reports `false`; validators never propagate errors.
pub trait ConnectionValidator: Send + Sync + fmt::Debug {
    fn is_valid(&self, conn: &mut dyn Connection, timeout: Duration) -> bool;
}

/// Asks the connection to ping its server.
#[derive(Debug, Clone, Copy, Default)]
pub struct PingValidator;

impl ConnectionValidator for PingValidator {
    fn is_valid(&self, conn: &mut dyn Connection, timeout: Duration) -> bool {
        if conn.is_closed() {
            return false;
        }

        match conn.is_valid(timeout) {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!(error = %e, "Connection liveness check failed");
                false
            }
        }
    }
}

/// Accepts every open connection without a round trip.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysValid;

impl ConnectionValidator for AlwaysValid {
    fn is_valid(&self, conn: &mut dyn Connection, _timeout: Duration) -> bool {
        !conn.is_closed()
    }
}
