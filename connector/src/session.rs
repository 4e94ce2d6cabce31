//! The credential boundary.
//!
//! The connector asks for a bearer credential exactly once per connect.
//! Whoever implements [`CredentialSource`] owns refresh scheduling, expiry
//! checks, and token exchange; a credential rotated mid-session only takes
//! effect on the next connect.

/// Supplies the bearer credential used to open the transport.
pub trait CredentialSource: Send + Sync {
    fn current_credential(&self) -> String;
}

/// A fixed credential, for services with long-lived tokens and for tests.
pub struct StaticCredential(String);

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl CredentialSource for StaticCredential {
    fn current_credential(&self) -> String {
        self.0.clone()
    }
}

/// Any closure producing a token works as a source, which is how a token
/// store with its own refresh loop plugs in.
impl<F> CredentialSource for F
where
    F: Fn() -> String + Send + Sync,
{
    fn current_credential(&self) -> String {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_sources_observe_rotation() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let generation = AtomicUsize::new(0);
        let source = move || format!("token-{}", generation.fetch_add(1, Ordering::SeqCst));

        assert_eq!(source.current_credential(), "token-0");
        assert_eq!(source.current_credential(), "token-1");
    }
}
