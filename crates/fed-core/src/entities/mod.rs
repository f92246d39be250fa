//! Entity structs for the federation's durable records.
//!
//! Each entity maps to a table in the libSQL database (see `fed-db`
//! migrations). All structs derive `Serialize`, `Deserialize`, and
//! `JsonSchema` for JSON output.

mod dispatch;
mod query;
mod result;
mod site;
mod structured_query;

pub use dispatch::BrokerDispatch;
pub use query::{Query, QueryContent};
pub use result::{NewQueryResult, QueryResult};
pub use site::Site;
pub use structured_query::StructuredQuery;
