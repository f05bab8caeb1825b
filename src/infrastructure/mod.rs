//! Concrete data-source implementations: the EVM JSON-RPC transport and the
//! HTTP price oracle.

pub mod ethereum;
pub mod price;

pub use ethereum::fetch::EvmDataSource;
pub use price::PriceOracle;
