//! Directory layout - Preparing the per-unit working directories from `configuration/`

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::core::catalog::{GAMESERVER_JAR, LIMBO_JAR, PROXY_JAR, PROXY_PLUGIN_JAR};
use crate::core::Settings;

const RESOURCES_FILE: &str = "resources.json";
const FORWARDING_SECRET: &str = "forwarding.secret";

/// Copy `src` over `dst` when `src` exists. Returns whether anything was copied.
fn copy_file(src: &Path, dst: &Path) -> Result<bool> {
    if !src.is_file() {
        return Ok(false);
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::copy(src, dst)
        .with_context(|| format!("Failed to copy {} -> {}", src.display(), dst.display()))?;
    info!("Copied {} -> {}", src.display(), dst.display());
    Ok(true)
}

/// Copy `src` to `dst` unless `dst` is already there
fn copy_if_missing(src: &Path, dst: &Path) -> Result<bool> {
    if dst.exists() {
        return Ok(false);
    }
    copy_file(src, dst)
}

fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("Failed to create {}", dst.display()))?;
    for entry in fs::read_dir(src).with_context(|| format!("Failed to read {}", src.display()))? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Files in `configuration/` that belong to a single unit and are never shared
/// with the game servers
fn is_unit_specific(name: &str) -> bool {
    let extension = Path::new(name).extension().and_then(|e| e.to_str());
    name == RESOURCES_FILE
        || name.ends_with(".secret")
        || matches!(extension, Some("jar" | "toml" | "yml"))
}

/// Create the working directories and seed them from `configuration/`.
///
/// With `skip_jar_copy` the proxy and limbo jars already in place are left alone.
pub fn setup_directories(settings: &Settings, skip_jar_copy: bool) -> Result<()> {
    let config = settings.config_dir();
    let proxy = settings.proxy_dir();
    let limbo = settings.limbo_dir();
    let services = settings.services_dir();
    let gameserver = settings.gameserver_dir();

    for dir in [
        proxy.join("plugins"),
        proxy.join("configuration"),
        gameserver.join("configuration"),
        limbo.clone(),
        services.clone(),
        settings.logs_dir(),
        config.clone(),
    ] {
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    if !skip_jar_copy {
        copy_file(&config.join(PROXY_JAR), &proxy.join(PROXY_JAR))?;
        copy_file(&config.join(LIMBO_JAR), &limbo.join(LIMBO_JAR))?;
    }
    copy_file(
        &config.join(PROXY_PLUGIN_JAR),
        &proxy.join("plugins").join(PROXY_PLUGIN_JAR),
    )?;

    copy_if_missing(&config.join("velocity.toml"), &proxy.join("velocity.toml"))?;
    copy_if_missing(&config.join(FORWARDING_SECRET), &proxy.join(FORWARDING_SECRET))?;
    copy_if_missing(&config.join("settings.yml"), &limbo.join("settings.yml"))?;

    let shared = gameserver.join("configuration");
    if config.is_dir() {
        for entry in fs::read_dir(&config)
            .with_context(|| format!("Failed to read {}", config.display()))?
        {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let target = shared.join(&name);
            if entry.file_type()?.is_dir() {
                if !target.exists() {
                    copy_dir(&entry.path(), &target)?;
                    info!("Copied dir {} -> {}", entry.path().display(), target.display());
                }
            } else if !is_unit_specific(&name) {
                copy_if_missing(&entry.path(), &target)?;
            }
        }
    }

    copy_if_missing(&services.join(GAMESERVER_JAR), &gameserver.join(GAMESERVER_JAR))?;

    for dir in [&proxy, &services, &gameserver] {
        copy_if_missing(
            &config.join(RESOURCES_FILE),
            &dir.join("configuration").join(RESOURCES_FILE),
        )?;
    }

    Ok(())
}

/// Overwrite every unit's copy of the forwarding secret and resources file
pub fn sync_shared_files(settings: &Settings) -> Result<()> {
    let config = settings.config_dir();
    copy_file(
        &config.join(FORWARDING_SECRET),
        &settings.proxy_dir().join(FORWARDING_SECRET),
    )?;
    for dir in [
        settings.proxy_dir(),
        settings.services_dir(),
        settings.gameserver_dir(),
    ] {
        copy_file(
            &config.join(RESOURCES_FILE),
            &dir.join("configuration").join(RESOURCES_FILE),
        )?;
    }
    Ok(())
}
