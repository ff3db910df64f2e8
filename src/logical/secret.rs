use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use super::lease::Lease;

/// The lease half of a response that hands out a secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretData {
    #[serde(flatten)]
    pub lease: Lease,
    pub lease_id: String,
}

impl Deref for SecretData {
    type Target = Lease;

    fn deref(&self) -> &Lease {
        &self.lease
    }
}

impl DerefMut for SecretData {
    fn deref_mut(&mut self) -> &mut Lease {
        &mut self.lease
    }
}
