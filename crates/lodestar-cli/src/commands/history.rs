//! `lodestar history`

use super::print_json;
use crate::context::CliContext;
use anyhow::Result;
use lodestar_core::{LodestarError, StorePath};

/// Print the revisions of a store path, or one revision's content
pub async fn handle_history(path: String, seq: Option<u64>, ctx: &CliContext) -> Result<()> {
    let path = StorePath::new(path).map_err(LodestarError::from)?;
    let Some(seq) = seq else {
        return print_json(&ctx.generations.history(&path).await?);
    };
    match ctx.generations.get_revision(&path, seq).await? {
        Some(bytes) => {
            match serde_json::from_slice::<serde_json::Value>(&bytes) {
                Ok(value) => print_json(&value)?,
                Err(_) => println!("{}", String::from_utf8_lossy(&bytes)),
            }
            Ok(())
        }
        None => {
            println!("{path}@{seq}: tombstone");
            Ok(())
        }
    }
}
