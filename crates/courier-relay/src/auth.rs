//! Identity verification contract.

use std::future::Future;

use crate::types::UserId;
use crate::RelayError;

/// Oracle that turns an opaque handshake credential into a stable identity.
///
/// The host application implements this trait; the relay calls it exactly
/// once per connection handshake attempt and treats any failure as terminal
/// for that attempt (no retry inside the core).
pub trait IdentityVerifier: Send + Sync + 'static {
    /// Verify a credential, returning the identity it was issued for.
    fn verify(
        &self,
        credential: &str,
    ) -> impl Future<Output = Result<UserId, RelayError>> + Send;
}
