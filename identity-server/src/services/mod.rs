//! Services layer for the identity server.
//!
//! Rights evaluation, access policy, the membership graph, credential
//! resolution and the transactional stores behind them.

mod database;
pub mod dispatcher;
pub mod error;
pub mod evaluator;
pub mod identity;
pub mod membership;
mod memory;
pub mod metrics;
pub mod policy;
pub mod resolver;
pub mod store;

pub use database::PgStore;
pub use dispatcher::{Dispatcher, EventSink, MemorySink, NotifySink, TracingSink};
pub use error::ServiceError;
pub use identity::{IdentityService, UpdateOutcome};
pub use memory::MemoryStore;
pub use policy::{PolicyError, PolicyService, RightsChange};
pub use resolver::{PrincipalResolver, CLUSTER_AUTH_HEADER};
pub use store::{Store, StoreError, StoreTx};
