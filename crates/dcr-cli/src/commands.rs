use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use dcr_sdk::{Pid, Repository, RepositoryConfig, RepositoryError, RepositoryObject, ResourceType};
use serde_json::json;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let format = cli.format.clone();
    match cli.command {
        Command::Config(args) => cmd_config(&config, args, &format),
        Command::Resolve(args) => cmd_resolve(&Repository::connect(config)?, args, &format),
        Command::Show(args) => cmd_show(&Repository::connect(config)?, args, &format).await,
        Command::Members(args) => cmd_members(&Repository::connect(config)?, args, &format).await,
        Command::Parent(args) => cmd_parent(&Repository::connect(config)?, args, &format).await,
        Command::Create(args) => cmd_create(&Repository::connect(config)?, args, &format).await,
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<RepositoryConfig> {
    let mut config = match &cli.config {
        Some(path) => RepositoryConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RepositoryConfig::default(),
    };
    if let Some(base_uri) = &cli.base_uri {
        config.base_uri = base_uri.clone();
    }
    config.validate()?;
    tracing::debug!(base_uri = %config.base_uri(), "effective config");
    Ok(config)
}

fn resolve(repo: &Repository, value: &str) -> anyhow::Result<Pid> {
    match repo.resolve(value) {
        Some(pid) => Ok(pid),
        None => bail!("cannot resolve {value} under {}", repo.config().base_uri()),
    }
}

fn cmd_config(config: &RepositoryConfig, args: ConfigArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let shown = if args.show_secrets { config.clone() } else { config.redacted() };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&shown)?),
        OutputFormat::Text => print!("{}", shown.to_toml_string()?),
    }
    Ok(())
}

fn cmd_resolve(repo: &Repository, args: ResolveArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let pid = resolve(repo, &args.id)?;
    let uri = repo.uri(&pid);
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "pid": pid.to_string(),
                "qualifier": pid.qualifier().as_str(),
                "id": pid.id(),
                "component": pid.component_path(),
                "path": pid.repository_path(),
                "uri": uri,
            })
        ),
        OutputFormat::Text => {
            println!("{} {}", "PID:".bold(), pid.to_string().yellow());
            println!("  Qualifier: {}", pid.qualifier().as_str().cyan());
            if let Some(component) = pid.component_path() {
                println!("  Component: {}", component.cyan());
            }
            println!("  Path: {}", pid.repository_path());
            println!("  URI: {}", uri.blue());
        }
    }
    Ok(())
}

async fn cmd_show(repo: &Repository, args: ObjectArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let pid = resolve(repo, &args.pid)?;
    let object = repo.get_object(&pid).await?;
    match format {
        OutputFormat::Json => {
            let mut value = summary(&object);
            value["types"] = json!(object.types());
            value["triples"] = json!(object.graph().to_ntriples());
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            print_summary(&object);
            println!("  Types:");
            for iri in object.types() {
                println!("    {}", iri.dimmed());
            }
            println!("  Triples ({}):", object.graph().len());
            for line in object.graph().to_ntriples().lines() {
                println!("    {line}");
            }
        }
    }
    Ok(())
}

async fn cmd_members(repo: &Repository, args: ObjectArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let pid = resolve(repo, &args.pid)?;
    let members = repo.get_members(&pid).await?;
    match format {
        OutputFormat::Json => {
            let list: Vec<_> = members.iter().map(|m| summary(m)).collect();
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        OutputFormat::Text if members.is_empty() => println!("No members."),
        OutputFormat::Text => {
            for member in &members {
                println!(
                    "{} {} {}",
                    member.resource_type().name().cyan(),
                    member.pid().to_string().yellow(),
                    member.title().unwrap_or("")
                );
            }
        }
    }
    Ok(())
}

async fn cmd_parent(repo: &Repository, args: ObjectArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let pid = resolve(repo, &args.pid)?;
    let parent = repo.get_parent(&pid).await?;
    match (format, parent) {
        (OutputFormat::Json, parent) => {
            println!("{}", serde_json::to_string_pretty(&parent.as_deref().map(summary))?);
        }
        (OutputFormat::Text, Some(parent)) => print_summary(&parent),
        (OutputFormat::Text, None) => println!("{} has no parent.", pid.to_string().yellow()),
    }
    Ok(())
}

async fn cmd_create(repo: &Repository, args: CreateArgs, format: &OutputFormat) -> anyhow::Result<()> {
    if matches!(
        args.kind,
        ResourceType::Binary | ResourceType::Tombstone | ResourceType::PremisEvent
    ) {
        bail!("{} objects cannot be created from the command line", args.kind);
    }
    let pid = args.id.as_deref().map(|id| resolve(repo, id)).transpose()?;
    let parent = args.parent.as_deref().map(|p| resolve(repo, p)).transpose()?;
    let title = args.title.as_deref();
    let factory = repo.factory();

    let object = repo
        .run(|| async {
            let object: Arc<RepositoryObject> = match args.kind {
                ResourceType::ContentRoot => factory.create_content_root().await?.object().clone(),
                ResourceType::AdminUnit => factory.create_admin_unit(pid, title).await?.object().clone(),
                ResourceType::Collection => factory.create_collection(pid, title).await?.object().clone(),
                ResourceType::Folder => factory.create_folder(pid, title).await?.object().clone(),
                ResourceType::Work => factory.create_work(pid, title).await?.object().clone(),
                ResourceType::File => factory.create_file(pid, title).await?.object().clone(),
                ResourceType::DepositRecord => factory.create_deposit_record(pid, title).await?.object().clone(),
                other => {
                    return Err(RepositoryError::operation(other.name(), "not creatable without content"));
                }
            };
            if let Some(parent) = &parent {
                let container = repo.get_object(parent).await?;
                factory.add_member(&container, &object).await?;
            }
            Ok(object)
        })
        .await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary(&object))?),
        OutputFormat::Text => {
            println!("{} Created {}", "✓".green().bold(), object.resource_type().name().cyan());
            println!("  PID: {}", object.pid().to_string().yellow());
            println!("  URI: {}", object.uri().blue());
            if let Some(parent) = &parent {
                println!("  Parent: {}", parent.to_string().yellow());
            }
        }
    }
    Ok(())
}

fn summary(object: &RepositoryObject) -> serde_json::Value {
    json!({
        "pid": object.pid().to_string(),
        "uri": object.uri(),
        "type": object.resource_type(),
        "title": object.title(),
        "etag": object.etag(),
        "last_modified": object.last_modified().map(|t| t.to_rfc3339()),
    })
}

fn print_summary(object: &RepositoryObject) {
    println!(
        "{} {}",
        object.resource_type().name().cyan().bold(),
        object.pid().to_string().yellow()
    );
    println!("  URI: {}", object.uri().blue());
    if let Some(title) = object.title() {
        println!("  Title: {title}");
    }
    if let Some(etag) = object.etag() {
        println!("  ETag: {}", etag.dimmed());
    }
    if let Some(modified) = object.last_modified() {
        println!("  Last-Modified: {}", modified.to_rfc2822());
    }
}
