use std::sync::Arc;

use crate::bus::MessageBus;
use crate::city::CityStateManager;
use crate::ledger::Ledger;
use crate::registry::Registry;
use crate::routing::RouteProvider;

/// Bundles everything that would otherwise be process-global state
/// (enterprise name, owned city, worker list, registry client) behind
/// one struct threaded through constructors instead.
#[derive(Clone)]
pub struct EnterpriseContext {
    pub enterprise_name: Arc<str>,
    pub api_url: Arc<str>,
    pub city: Arc<CityStateManager>,
    pub bus: Arc<dyn MessageBus>,
    pub registry: Arc<dyn Registry>,
    pub ledger: Arc<dyn Ledger>,
    pub route_provider: Arc<dyn RouteProvider>,
}

impl EnterpriseContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        enterprise_name: impl Into<Arc<str>>,
        api_url: impl Into<Arc<str>>,
        city: Arc<CityStateManager>,
        bus: Arc<dyn MessageBus>,
        registry: Arc<dyn Registry>,
        ledger: Arc<dyn Ledger>,
        route_provider: Arc<dyn RouteProvider>,
    ) -> Self {
        Self {
            enterprise_name: enterprise_name.into(),
            api_url: api_url.into(),
            city,
            bus,
            registry,
            ledger,
            route_provider,
        }
    }

    pub fn owned_city(&self) -> &str {
        self.city.owned_city()
    }
}
