//! Unit ids - Resolving client ids into the supervised unit they name

use std::path::PathBuf;

use super::catalog::{
    Catalog, ServerKind, ServiceKind, GAMESERVER_JAR, LIMBO_JAR, LIMBO_NAME, PROXY_JAR,
    PROXY_NAME,
};
use super::process::LaunchSpec;
use super::settings::Settings;

/// A client id that names no known unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownId(pub String);

/// One supervised unit, resolved from a client id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Proxy,
    Limbo,
    Service(ServiceKind),
    Server { kind: ServerKind, instance: u32 },
}

impl Unit {
    /// Parse a client id (`proxy`, `nanolimbo`, `servicebazaar`, `skyblock_hub_3`, ...).
    ///
    /// Matching is case-insensitive. Server ids split on the last underscore; the prefix
    /// must be a catalog kind and the suffix a non-negative integer.
    pub fn resolve(catalog: &Catalog, id: &str) -> Result<Self, UnknownId> {
        if id.eq_ignore_ascii_case("proxy") {
            return Ok(Self::Proxy);
        }
        if id.eq_ignore_ascii_case("nanolimbo") {
            return Ok(Self::Limbo);
        }
        if let Some(service) = catalog.service_by_id(id) {
            return Ok(Self::Service(service));
        }

        let unknown = || UnknownId(id.to_string());
        let (prefix, suffix) = id.rsplit_once('_').ok_or_else(unknown)?;
        let kind = catalog.server_kind(prefix).ok_or_else(unknown)?;
        let instance = suffix.parse::<u32>().map_err(|_| unknown())?;
        Ok(Self::Server { kind, instance })
    }

    /// The LogicalName keying this unit in the process table and tracker
    pub fn logical_name(&self) -> String {
        match self {
            Self::Proxy => PROXY_NAME.to_string(),
            Self::Limbo => LIMBO_NAME.to_string(),
            Self::Service(service) => service.jar.to_string(),
            Self::Server { kind, instance } => kind.instance_name(*instance),
        }
    }

    /// Human-readable label used in messages
    pub fn label(&self) -> String {
        match self {
            Self::Server { kind, instance } => format!("{} {}", kind.name, instance),
            other => other.logical_name(),
        }
    }

    /// File the unit's merged stdout/stderr is appended to
    pub fn log_file_name(&self) -> String {
        let name = self.logical_name();
        let stem = name.strip_suffix(".jar").unwrap_or(&name);
        format!("{stem}.log")
    }

    /// Jar the unit runs
    pub fn artifact(&self) -> &'static str {
        match self {
            Self::Proxy => PROXY_JAR,
            Self::Limbo => LIMBO_JAR,
            Self::Service(service) => service.jar,
            Self::Server { .. } => GAMESERVER_JAR,
        }
    }

    /// Directory the unit is launched from
    pub fn working_dir(&self, settings: &Settings) -> PathBuf {
        match self {
            Self::Proxy => settings.proxy_dir(),
            Self::Limbo => settings.limbo_dir(),
            Self::Service(_) => settings.services_dir(),
            Self::Server { .. } => settings.gameserver_dir(),
        }
    }

    /// Build the launch contract for this unit
    pub fn launch_spec(&self, settings: &Settings) -> LaunchSpec {
        let working_dir = self.working_dir(settings);
        let mut arguments = Vec::new();

        match self {
            Self::Proxy | Self::Limbo => {}
            Self::Service(_) => {
                arguments.push(format!("-Xms{}", settings.service_heap_min));
                arguments.push(format!("-Xmx{}", settings.service_heap_max));
            }
            Self::Server { .. } => {
                arguments.push(format!("-Xms{}", settings.server_heap_min));
                arguments.push(format!("-Xmx{}", settings.server_heap_max));
            }
        }
        arguments.push("-jar".to_string());
        arguments.push(self.artifact().to_string());
        if let Self::Server { kind, .. } = self {
            arguments.push(kind.name.to_string());
        }

        LaunchSpec {
            executable: settings.java_path.clone(),
            arguments,
            artifact: working_dir.join(self.artifact()),
            working_dir,
            log_path: settings.logs_dir().join(self.log_file_name()),
        }
    }
}
