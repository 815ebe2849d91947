//! Order validation and routing.
//!
//! Orders are validated against exchange tick/step filters before any
//! dispatch; valid orders go to the in-process virtual ledger or the
//! live executor with bounded retries.

pub mod ledger;
pub mod router;
pub mod validator;

pub use ledger::VirtualLedger;
pub use router::{ExecutionPolicy, OrderRouter};
pub use validator::{OrderValidator, SymbolFilters};
