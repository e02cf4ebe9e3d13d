//! Subcommand implementations.

use std::io::Write;

use anyhow::{Context, anyhow, bail};
use recordgate::query::{Criteria, FindOptions, IndexKeys, IndexOptions, SortOrder};
use recordgate::record::DynamicRecord;
use recordgate::store::Document;
use recordgate::{Gateway, ManagerOptions, RecordManager};
use tracing::info;

use crate::config::{Command, Target};

/// Runs `command`, writing its output to `out`.
pub async fn run(
    command: &Command,
    gateway: &Gateway,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        Command::Connections => {
            let registry = gateway.registry();
            for name in registry.names() {
                match registry.endpoint(&name) {
                    Some(endpoint) => writeln!(out, "{}\t{}", name, endpoint)?,
                    None => writeln!(out, "{}\t(registered store)", name)?,
                }
            }
        }
        Command::Count { target, filter } => {
            let manager = manager(gateway, target).await?;
            let criteria = filter.as_deref().map(parse_filter).transpose()?;
            writeln!(out, "{}", manager.count(criteria.as_ref()).await?)?;
        }
        Command::Find {
            target,
            filter,
            sort,
            skip,
            limit,
        } => {
            let manager = manager(gateway, target).await?;
            let criteria = match filter {
                Some(filter) => parse_filter(filter)?,
                None => Criteria::everything(),
            };
            let mut options = FindOptions::new();
            if let Some(sort) = sort {
                options = options.sort(parse_sort(sort)?);
            }
            if let Some(skip) = skip {
                options = options.skip(*skip);
            }
            if let Some(limit) = limit {
                options = options.limit(*limit);
            }

            let mut cursor = manager.find(&criteria, options).await?;
            let mut printed = 0usize;
            while let Some(record) = cursor.next().await? {
                writeln!(out, "{}", serde_json::to_string(&record)?)?;
                printed += 1;
            }
            info!("Printed {} documents from {}", printed, target.collection);
        }
        Command::Delete {
            target,
            filter,
            all,
        } => {
            let manager = manager(gateway, target).await?;
            let criteria = match filter {
                _ if *all => Criteria::everything(),
                Some(filter) => parse_filter(filter)?,
                None => bail!("delete needs --filter or --all"),
            };
            writeln!(out, "{}", manager.delete_many(&criteria).await?)?;
        }
        Command::Drop { target } => {
            let manager = manager(gateway, target).await?;
            let dropped = manager.drop_collection().await?;
            writeln!(out, "{}", if dropped { "dropped" } else { "absent" })?;
        }
        Command::Index {
            target,
            keys,
            name,
            unique,
            sparse,
        } => {
            let manager = manager(gateway, target).await?;
            let keys = IndexKeys::parse(keys)
                .ok_or_else(|| anyhow!("invalid index keys '{}'", keys))?;
            let options = IndexOptions {
                name: name.clone(),
                unique: *unique,
                sparse: *sparse,
                ..IndexOptions::default()
            };
            manager.ensure_index(keys, options).await?;
            writeln!(out, "ok")?;
        }
    }
    Ok(())
}

async fn manager(
    gateway: &Gateway,
    target: &Target,
) -> anyhow::Result<RecordManager<DynamicRecord>> {
    let options = ManagerOptions::new()
        .connection(target.connection.as_str())
        .collection(target.collection.as_str());
    gateway
        .manager_with::<DynamicRecord>(options)
        .await
        .with_context(|| format!("opening {} on '{}'", target.collection, target.connection))
}

fn parse_filter(text: &str) -> anyhow::Result<Criteria> {
    let document: Document = serde_json::from_str(text)
        .with_context(|| format!("filter is not a JSON object: {}", text))?;
    Ok(Criteria::from_document(document))
}

/// Parses `field[:1|-1],...` into a sort order.
fn parse_sort(text: &str) -> anyhow::Result<SortOrder> {
    let mut order: Option<SortOrder> = None;
    for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (field, direction) = match part.split_once(':') {
            Some((field, direction)) => (field.trim(), direction.trim()),
            None => (part, "1"),
        };
        if field.is_empty() {
            bail!("empty sort field in '{}'", text);
        }
        let descending = match direction {
            "1" | "asc" => false,
            "-1" | "desc" => true,
            other => bail!("invalid sort direction '{}' for {}", other, field),
        };
        order = Some(match (order, descending) {
            (None, false) => SortOrder::ascending(field),
            (None, true) => SortOrder::descending(field),
            (Some(order), false) => order.then_ascending(field),
            (Some(order), true) => order.then_descending(field),
        });
    }
    order.ok_or_else(|| anyhow!("empty sort '{}'", text))
}
