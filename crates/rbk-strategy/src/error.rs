use rbk_host::HostError;
use rbk_schemas::{InstrumentCategory, InstrumentId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyError {
    /// Strategies can only run on instruments of category `Strategy`.
    #[error("instrument {instrument} has category {category:?}; expected a strategy")]
    WrongCategory {
        instrument: InstrumentId,
        category: InstrumentCategory,
    },

    #[error("strategy instrument {0} has no portfolio")]
    MissingPortfolio(InstrumentId),

    #[error(transparent)]
    Host(#[from] HostError),
}
