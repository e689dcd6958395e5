//! Provider session shared by all jobs.

use crate::types::SessionToken;

/// Cached provider session token
///
/// Set by the login continuation and cleared only by an explicit logout. Lives in the
/// controlling context's state, so it is never touched from a worker.
#[derive(Debug, Default)]
pub(crate) struct Session {
    token: Option<SessionToken>,
    logins: u64,
}

impl Session {
    pub(crate) fn token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }

    pub(crate) fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub(crate) fn store(&mut self, token: SessionToken) {
        self.logins += 1;
        self.token = Some(token);
    }

    /// Forget the token; returns whether one was cached
    pub(crate) fn clear(&mut self) -> bool {
        self.token.take().is_some()
    }

    /// Successful logins since startup
    pub(crate) fn logins(&self) -> u64 {
        self.logins
    }
}
