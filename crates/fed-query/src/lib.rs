//! # fed-query
//!
//! The federation core: turns a structured query into persisted records,
//! broadcasts it to every configured broker, and collects per-site answers.
//!
//! - [`QueryDispatcher`]: content-addressed enqueue and broker fan-out
//! - [`QueryStatusCollector`]: consumes broker status notifications and
//!   persists at most one result per `(query, site)`
//! - [`ResultService`]: TTL-bounded cache of result lines for polling
//! - [`QueryTranslator`]: seam for producing broker representations

pub mod collector;
pub mod dispatcher;
pub mod error;
pub mod results;
pub mod translate;

pub use collector::QueryStatusCollector;
pub use dispatcher::QueryDispatcher;
pub use error::{DispatchError, QueryResultCollectError, TranslationError};
pub use results::{QueryResultSummary, ResultLine, ResultService, ResultVisibility, SiteResult};
pub use translate::{PassthroughTranslator, QueryTranslator};
