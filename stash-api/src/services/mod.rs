//! Service Layer
//!
//! Business logic behind the routes: the cache resolution engine, the
//! streaming retrieval orchestrator, the population pipeline, and the full
//! cache refresh. Services depend only on the collaborator traits from
//! `stash-core`.

mod populate;
mod refresh;
mod resolver;
mod retrieval;

pub use populate::*;
pub use refresh::*;
pub use resolver::*;
pub use retrieval::*;
