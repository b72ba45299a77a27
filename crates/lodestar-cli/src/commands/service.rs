//! `lodestar service ...`

use super::print_json;
use crate::context::CliContext;
use anyhow::{Context, Result};
use clap::Subcommand;
use lodestar_core::{parse_patches, LodestarError, ServiceName};
use lodestar_intent::Changeset;
use std::path::{Path, PathBuf};

/// Intent Store operations
#[derive(Debug, Subcommand)]
pub enum ServiceCommand {
    /// Merge one or more documents into the desired set (POST)
    Submit {
        /// JSON payload; `-` reads stdin
        file: PathBuf,
    },
    /// Replace an existing document wholesale (PUT)
    Replace {
        /// JSON payload holding complete documents
        file: PathBuf,
    },
    /// Remove a document from the desired set
    Delete {
        /// Service name
        name: String,
    },
    /// Print a stored document
    Show {
        /// Service name
        name: String,
    },
    /// List desired services
    List,
}

async fn read_payload(file: &Path) -> Result<String> {
    if file.as_os_str() == "-" {
        let mut body = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut tokio::io::stdin(), &mut body).await?;
        return Ok(body);
    }
    tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))
}

/// Run a service subcommand and print its result
pub async fn handle_service_command(cmd: ServiceCommand, ctx: &CliContext) -> Result<()> {
    match cmd {
        ServiceCommand::Submit { file } => {
            let patches = parse_patches(&read_payload(&file).await?)?;
            let mut changeset = Changeset::empty();
            for patch in &patches {
                changeset.merge(ctx.intents.submit(patch).await?);
            }
            print_json(&changeset)
        }
        ServiceCommand::Replace { file } => {
            let patches = parse_patches(&read_payload(&file).await?)?;
            let mut changeset = Changeset::empty();
            for patch in &patches {
                let doc = patch.apply_to(None)?;
                changeset.merge(ctx.intents.replace(&doc).await?);
            }
            print_json(&changeset)
        }
        ServiceCommand::Delete { name } => {
            let changeset = ctx.intents.delete(&ServiceName::new(name)).await?;
            print_json(&changeset)
        }
        ServiceCommand::Show { name } => {
            let name = ServiceName::new(name);
            let doc = ctx
                .intents
                .get(&name)
                .await?
                .ok_or_else(|| LodestarError::not_found(format!("service {name}")))?;
            print_json(&doc)
        }
        ServiceCommand::List => print_json(&ctx.intents.list().await?),
    }
}
