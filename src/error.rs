use thiserror::Error;

use crate::domain::{ClientId, DeviceId, InvalidStateCode};
use crate::ledger::LedgerError;
use crate::optimizer::OptimizerError;
use crate::repo::StorageError;

/// Errors surfaced by [`EnergyService`](crate::service::EnergyService)
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    InvalidStateCode(#[from] InvalidStateCode),

    #[error("Allocation for client {client} failed: {source}")]
    Allocation {
        client: ClientId,
        #[source]
        source: OptimizerError,
    },

    #[error("Client {0} has no transformer assigned")]
    NoTransformerAssigned(ClientId),

    #[error("Device {device} is not owned by client {client}")]
    DeviceNotOwned { client: ClientId, device: DeviceId },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Caller mistakes that retrying will not fix
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::Ledger(_)
                | Error::InvalidStateCode(_)
                | Error::DeviceNotOwned { .. }
                | Error::Allocation {
                    source: OptimizerError::InvalidProblem(_),
                    ..
                }
        )
    }
}
