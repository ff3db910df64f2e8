use std::{
    io,
    sync::{MutexGuard, PoisonError, RwLockReadGuard, RwLockWriteGuard},
    time::SystemTimeError,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RvError {
    #[error("Config path is invalid.")]
    ErrConfigPathInvalid,
    #[error("Config load failed.")]
    ErrConfigLoadFailed,
    #[error("Config storage not found.")]
    ErrConfigStorageNotFound,
    #[error("Config connection not found.")]
    ErrConfigConnectionNotFound,
    #[error("Physical configuration item is missing.")]
    ErrPhysicalConfigItemMissing,
    #[error("Physical type is invalid.")]
    ErrPhysicalTypeInvalid,
    #[error("Physical backend prefix is invalid.")]
    ErrPhysicalBackendPrefixInvalid,
    #[error("Physical backend key is invalid.")]
    ErrPhysicalBackendKeyInvalid,
    #[error("Storage key sanity check failed.")]
    ErrStorageKeySanityCheckFailed,
    #[error("Logical backend path not supported.")]
    ErrLogicalPathUnsupported,
    #[error("Logical operation not supported.")]
    ErrLogicalOperationUnsupported,
    #[error("Request field is invalid, {0}")]
    ErrRequestFieldInvalid(String),
    #[error("Request field is unknown, {0}")]
    ErrRequestFieldUnknown(String),
    #[error("Validation failed, {0}")]
    ErrValidation(String),
    #[error("Not found.")]
    ErrNotFound,
    #[error("Role not found.")]
    ErrRoleNotFound,
    #[error("Role is still referenced by active leases.")]
    ErrRoleInUse,
    #[error("Lease not found.")]
    ErrLeaseNotFound,
    #[error("Lease is not renewable.")]
    ErrLeaseNotRenewable,
    #[error("Requested lease ttl exceeds the max ttl.")]
    ErrLeaseTtlExceedsMax,
    #[error("Credential generation attempts exhausted.")]
    ErrGenerationExhausted,
    #[error("Broker is unavailable, {0}")]
    ErrBrokerUnavailable(String),
    #[error("Broker rejected the request, status: {status}, {message}")]
    ErrBrokerRejected { status: u16, message: String },
    #[error("Scheduler task error, {0}")]
    ErrSchedulerTask(String),
    #[error("Some IO error happened, {:?}", .source)]
    IO {
        #[from]
        source: io::Error,
    },
    #[error("Some serde error happened, {:?}", .source)]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("Some regex error happened, {:?}", .source)]
    Regex {
        #[from]
        source: regex::Error,
    },
    #[error("Some hcl error happened, {:?}", .source)]
    Hcl {
        #[from]
        source: hcl::Error,
    },
    #[error("Some system time error happened, {:?}", .source)]
    SystemTime {
        #[from]
        source: SystemTimeError,
    },
    #[error("Some url error happened, {:?}", .source)]
    Url {
        #[from]
        source: url::ParseError,
    },
    #[error("RwLock was poisoned (reading)")]
    ErrRwLockReadPoison,
    #[error("RwLock was poisoned (writing)")]
    ErrRwLockWritePoison,
    #[error("Mutex was poisoned")]
    ErrMutexPoison,
    #[error(transparent)]
    ErrOther(#[from] anyhow::Error),
    #[error("Unknown error.")]
    ErrUnknown,
}

impl RvError {
    /// Whether the whole operation may be retried by the caller as is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RvError::ErrBrokerUnavailable(_) | RvError::ErrGenerationExhausted)
    }
}

impl PartialEq for RvError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RvError::ErrConfigPathInvalid, RvError::ErrConfigPathInvalid)
            | (RvError::ErrConfigLoadFailed, RvError::ErrConfigLoadFailed)
            | (RvError::ErrConfigStorageNotFound, RvError::ErrConfigStorageNotFound)
            | (RvError::ErrConfigConnectionNotFound, RvError::ErrConfigConnectionNotFound)
            | (RvError::ErrPhysicalConfigItemMissing, RvError::ErrPhysicalConfigItemMissing)
            | (RvError::ErrPhysicalTypeInvalid, RvError::ErrPhysicalTypeInvalid)
            | (RvError::ErrPhysicalBackendPrefixInvalid, RvError::ErrPhysicalBackendPrefixInvalid)
            | (RvError::ErrPhysicalBackendKeyInvalid, RvError::ErrPhysicalBackendKeyInvalid)
            | (RvError::ErrStorageKeySanityCheckFailed, RvError::ErrStorageKeySanityCheckFailed)
            | (RvError::ErrLogicalPathUnsupported, RvError::ErrLogicalPathUnsupported)
            | (RvError::ErrLogicalOperationUnsupported, RvError::ErrLogicalOperationUnsupported)
            | (RvError::ErrRequestFieldInvalid(_), RvError::ErrRequestFieldInvalid(_))
            | (RvError::ErrRequestFieldUnknown(_), RvError::ErrRequestFieldUnknown(_))
            | (RvError::ErrValidation(_), RvError::ErrValidation(_))
            | (RvError::ErrNotFound, RvError::ErrNotFound)
            | (RvError::ErrRoleNotFound, RvError::ErrRoleNotFound)
            | (RvError::ErrRoleInUse, RvError::ErrRoleInUse)
            | (RvError::ErrLeaseNotFound, RvError::ErrLeaseNotFound)
            | (RvError::ErrLeaseNotRenewable, RvError::ErrLeaseNotRenewable)
            | (RvError::ErrLeaseTtlExceedsMax, RvError::ErrLeaseTtlExceedsMax)
            | (RvError::ErrGenerationExhausted, RvError::ErrGenerationExhausted)
            | (RvError::ErrBrokerUnavailable(_), RvError::ErrBrokerUnavailable(_))
            | (RvError::ErrBrokerRejected { .. }, RvError::ErrBrokerRejected { .. })
            | (RvError::ErrSchedulerTask(_), RvError::ErrSchedulerTask(_))
            | (RvError::ErrRwLockReadPoison, RvError::ErrRwLockReadPoison)
            | (RvError::ErrRwLockWritePoison, RvError::ErrRwLockWritePoison)
            | (RvError::ErrMutexPoison, RvError::ErrMutexPoison)
            | (RvError::ErrUnknown, RvError::ErrUnknown) => true,
            _ => false,
        }
    }
}

impl<T> From<PoisonError<RwLockWriteGuard<'_, T>>> for RvError {
    fn from(_: PoisonError<RwLockWriteGuard<'_, T>>) -> Self {
        RvError::ErrRwLockWritePoison
    }
}

impl<T> From<PoisonError<RwLockReadGuard<'_, T>>> for RvError {
    fn from(_: PoisonError<RwLockReadGuard<'_, T>>) -> Self {
        RvError::ErrRwLockReadPoison
    }
}

impl<T> From<PoisonError<MutexGuard<'_, T>>> for RvError {
    fn from(_: PoisonError<MutexGuard<'_, T>>) -> Self {
        RvError::ErrMutexPoison
    }
}
