//! Catalog - Static definitions of the service and server kinds this fleet knows about

/// LogicalName of the proxy process
pub const PROXY_NAME: &str = "Proxy";
/// Jar launched for the proxy
pub const PROXY_JAR: &str = "velocity.jar";
/// LogicalName of the limbo placeholder server
pub const LIMBO_NAME: &str = "NanoLimbo";
/// Jar launched for the limbo server
pub const LIMBO_JAR: &str = "NanoLimbo.jar";
/// Jar shared by every game-server instance
pub const GAMESERVER_JAR: &str = "HypixelCore.jar";
/// Proxy plugin fetched alongside the services
pub const PROXY_PLUGIN_JAR: &str = "SkyBlockProxy.jar";

/// A backend service, backed by exactly one singleton process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceKind {
    /// Upper-case catalog key, e.g. `BAZAAR`
    pub key: &'static str,
    /// Canonical jar filename, also the LogicalName of its process
    pub jar: &'static str,
}

impl ServiceKind {
    /// Jar name without the extension, e.g. `ServiceBazaar`
    pub fn name(&self) -> &'static str {
        self.jar.strip_suffix(".jar").unwrap_or(self.jar)
    }

    /// Derived id used by clients, e.g. `servicebazaar`
    pub fn id(&self) -> String {
        self.name().to_lowercase()
    }

    /// Whether a client-supplied id refers to this service
    pub fn matches(&self, id: &str) -> bool {
        id.eq_ignore_ascii_case(self.name()) || id.eq_ignore_ascii_case(self.key)
    }
}

/// A game-server kind; may have any number of numbered instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerKind {
    pub name: &'static str,
    /// Instances launched by the startup sequence
    pub default_instances: u32,
}

impl ServerKind {
    /// Lowercase id prefix used by clients, e.g. `skyblock_hub`
    pub fn id(&self) -> String {
        self.name.to_lowercase()
    }

    /// LogicalName of one numbered instance
    pub fn instance_name(&self, instance: u32) -> String {
        format!("{}_{}", self.name, instance)
    }
}

const fn service(key: &'static str, jar: &'static str) -> ServiceKind {
    ServiceKind { key, jar }
}

const fn server(name: &'static str, default_instances: u32) -> ServerKind {
    ServerKind {
        name,
        default_instances,
    }
}

static SERVICES: &[ServiceKind] = &[
    service("API", "ServiceAPI.jar"),
    service("AUCTION_HOUSE", "ServiceAuctionHouse.jar"),
    service("BAZAAR", "ServiceBazaar.jar"),
    service("DARK_AUCTION", "ServiceDarkAuction.jar"),
    service("DATA_MUTEX", "ServiceDataMutex.jar"),
    service("FRIEND", "ServiceFriend.jar"),
    service("ITEM_TRACKER", "ServiceItemTracker.jar"),
    service("ORCHESTRATOR", "ServiceOrchestrator.jar"),
    service("PARTY", "ServiceParty.jar"),
];

static SERVER_KINDS: &[ServerKind] = &[
    server("SKYBLOCK_HUB", 0),
    server("SKYBLOCK_ISLAND", 0),
    server("SKYBLOCK_SPIDERS_DEN", 0),
    server("SKYBLOCK_THE_END", 0),
    server("SKYBLOCK_CRIMSON_ISLE", 0),
    server("SKYBLOCK_DUNGEON_HUB", 0),
    server("SKYBLOCK_DUNGEON", 0),
    server("SKYBLOCK_FARMING_ISLANDS", 0),
    server("SKYBLOCK_GOLD_MINE", 0),
    server("SKYBLOCK_DEEP_CAVERNS", 0),
    server("SKYBLOCK_DWARVEN_MINES", 0),
    server("SKYBLOCK_CRYSTAL_HOLLOWS", 0),
    server("SKYBLOCK_THE_PARK", 0),
    server("SKYBLOCK_JERRYS_WORKSHOP", 0),
    server("SKYBLOCK_BACKWATER_BAYOU", 0),
    server("SKYBLOCK_GALATEA", 0),
    server("PROTOTYPE_LOBBY", 1),
    server("BEDWARS_LOBBY", 1),
    server("BEDWARS_GAME", 0),
    server("BEDWARS_CONFIGURATOR", 0),
    server("MURDER_MYSTERY_LOBBY", 0),
    server("MURDER_MYSTERY_GAME", 0),
    server("MURDER_MYSTERY_CONFIGURATOR", 0),
    server("SKYWARS_LOBBY", 0),
    server("SKYWARS_GAME", 0),
    server("SKYWARS_CONFIGURATOR", 0),
];

/// Read-only lookup table over the known kinds
#[derive(Debug, Clone, Copy)]
pub struct Catalog {
    services: &'static [ServiceKind],
    servers: &'static [ServerKind],
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(SERVICES, SERVER_KINDS)
    }
}

impl Catalog {
    pub const fn new(services: &'static [ServiceKind], servers: &'static [ServerKind]) -> Self {
        Self { services, servers }
    }

    pub fn services(&self) -> &'static [ServiceKind] {
        self.services
    }

    pub fn server_kinds(&self) -> &'static [ServerKind] {
        self.servers
    }

    /// Find a service by derived id (`servicebazaar`), jar stem or short key (`bazaar`)
    pub fn service_by_id(&self, id: &str) -> Option<ServiceKind> {
        self.services.iter().copied().find(|s| s.matches(id))
    }

    /// Find a server kind by name, ignoring case
    pub fn server_kind(&self, name: &str) -> Option<ServerKind> {
        self.servers
            .iter()
            .copied()
            .find(|k| k.name.eq_ignore_ascii_case(name))
    }
}
