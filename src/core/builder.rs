use std::sync::Arc;

use super::{config::SupervisorConfig, supervisor::Supervisor};
use crate::{
    env::Environment,
    events::Bus,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing a [`Supervisor`].
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    env: Option<Arc<Environment>>,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            env: None,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (runner lifecycle, module failures, etc.)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Uses an existing environment instead of a fresh one.
    pub fn with_environment(mut self, env: Arc<Environment>) -> Self {
        self.env = Some(env);
        self
    }

    /// Builds the supervisor.
    ///
    /// Must be called inside a tokio runtime: subscriber workers are spawned here.
    pub fn build(self) -> Supervisor {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        let env = self.env.unwrap_or_default();
        Supervisor::new_internal(self.cfg, bus, subs, env)
    }
}
