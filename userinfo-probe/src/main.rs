//! Resolve chat users through the cache and dump what it produced.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use env_logger::{Builder, Target};
use log::LevelFilter;
use userinfo_config::ConfigLoader;
use userinfo_core::{ObjectUrlStore, UserId, UserInfoCache, UserRecord};

#[derive(Debug, Parser)]
#[command(
    name = "userinfo-probe",
    about = "Resolve chat users and render their avatar thumbnails"
)]
struct Cli {
    /// TOML config file; defaults to USERINFO_CONFIG or ./userinfo.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Chat server base URL, overriding every other source
    #[arg(long)]
    server: Option<String>,

    /// Write `<id>-<size>.png` thumbnails into this directory
    #[arg(long)]
    out: Option<PathBuf>,

    /// How long to wait for each user to resolve
    #[arg(
        long,
        default_value = "15s",
        value_parser = humantime::parse_duration
    )]
    wait: Duration,

    /// User ids to look up
    #[arg(required = true)]
    ids: Vec<UserId>,
}

fn init_logger() {
    if std::env::var("RUST_LOG").is_ok() {
        env_logger::init();
        return;
    }

    Builder::new()
        .target(Target::Stdout)
        .filter_level(LevelFilter::Warn)
        .filter_module("userinfo_core", LevelFilter::Debug)
        .filter_module("userinfo_config", LevelFilter::Debug)
        .filter_module("userinfo_probe", LevelFilter::Debug)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    if let Some(server) = &cli.server {
        loader = loader.with_server_url(server);
    }
    let config = loader.load().context("loading configuration")?;
    log::debug!("Effective configuration: {config:?}");

    let cache = UserInfoCache::from_config(&config)
        .context("building user info cache")?;
    let sizes = cache.thumbnail_sizes().len();

    let records: Vec<Arc<UserRecord>> =
        cli.ids.iter().map(|id| cache.get_user_info(*id)).collect();
    let settled = futures::future::join_all(
        records.iter().map(|record| settle(record, sizes, cli.wait)),
    )
    .await;

    if let Some(out) = &cli.out {
        fs::create_dir_all(out)
            .with_context(|| format!("creating {}", out.display()))?;
    }

    let mut unresolved = 0;
    for (record, done) in records.iter().zip(settled) {
        print_record(record, done);
        if !done {
            unresolved += 1;
        }
        if let Some(out) = &cli.out {
            write_thumbnails(record, cache.object_urls(), out)?;
        }
    }

    let stats = cache.stats();
    log::debug!("{stats:?}");

    if unresolved > 0 {
        bail!(
            "{unresolved} of {} users did not resolve within {}",
            records.len(),
            humantime::format_duration(cli.wait)
        );
    }
    Ok(())
}

fn is_settled(record: &UserRecord, sizes: usize) -> bool {
    record.is_loaded()
        && (record.picture().is_empty()
            || record.derived_images().len() == sizes)
}

/// Wait until the name and every thumbnail are present.
async fn settle(
    record: &Arc<UserRecord>,
    sizes: usize,
    wait: Duration,
) -> bool {
    let mut changes = record.subscribe();
    let _ = tokio::time::timeout(wait, async {
        while !is_settled(record, sizes) {
            if changes.changed().await.is_err() {
                break;
            }
        }
    })
    .await;
    is_settled(record, sizes)
}

fn print_record(record: &UserRecord, settled: bool) {
    let snapshot = record.snapshot();
    let name = if snapshot.name.is_empty() {
        "<unresolved>"
    } else {
        snapshot.name.as_str()
    };
    let marker = if settled { "" } else { " (incomplete)" };

    println!("{}\t{name}{marker}", snapshot.id);
    if !snapshot.picture.is_empty() {
        println!("\tpicture {}", snapshot.picture);
    }
    for (size, image) in &snapshot.derived {
        println!("\t{size}\t{image}");
    }
}

fn write_thumbnails(
    record: &UserRecord,
    store: &ObjectUrlStore,
    out: &Path,
) -> Result<()> {
    for (size, image) in record.derived_images() {
        let Some(png) = store.read(&image) else {
            log::warn!("Thumbnail {image} for user {} is gone", record.id());
            continue;
        };
        let path = out.join(format!("{}-{}.png", record.id(), size.pixels()));
        fs::write(&path, png)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}
