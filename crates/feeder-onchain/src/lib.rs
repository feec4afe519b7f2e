//! On-chain side of the feeder.
//!
//! Provides the oracle update executor (key/value packing, gas policy,
//! `setMultipleValues` submission with a backup endpoint), operator key
//! loading, and the swap quoter used by the simulation scraper.

pub mod contract;
pub mod error;
pub mod gas;
pub mod keys;
pub mod packing;
pub mod simulator;
pub mod updater;

pub use contract::{make_provider, ContractWriter, OracleWriter};
pub use error::{OnchainError, OnchainResult};
pub use gas::{bump_gas_price, ASTAR_CHAIN_ID};
pub use keys::{load_signer, parse_address};
pub use packing::{pack, unpack};
pub use simulator::RouterQuoter;
pub use updater::{encode_points, run_oracle_updater, update_once};
