//! Components: owning namespaces for handlers.
//!
//! A component bundles the handlers of one concern (the pyramid game, the
//! meta commands) under a shared namespace. The handler table is built
//! explicitly at construction - there is no runtime discovery of tagged
//! methods - and the bus walks it on mount and unmount.

use std::sync::Arc;

use crate::handler::Handler;

pub trait Component: Send + Sync {
    /// The namespace all of this component's handlers live under.
    fn name(&self) -> &str;

    /// The static registration table, built at construction.
    fn handlers(&self) -> Vec<Arc<dyn Handler>>;
}
