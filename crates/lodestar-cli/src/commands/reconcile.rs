//! `lodestar reconcile` and `lodestar plan`

use super::print_json;
use crate::context::CliContext;
use anyhow::Result;
use clap::Args;
use lodestar_core::{ErrorClass, LodestarError, ServiceName};
use lodestar_intent::Changeset;
use lodestar_reconcile::ReconcileReport;
use tokio_util::sync::CancellationToken;

/// Which devices a pass covers
#[derive(Debug, Args)]
pub struct PassArgs {
    /// Services whose devices to cover; none means everything
    pub services: Vec<String>,

    /// Cover every indexed and desired device
    #[arg(long, conflicts_with = "services")]
    pub all: bool,
}

/// Changeset for named services, including devices they used to address
///
/// A deleted service is found through its last recorded output.
pub async fn changeset_for_services(ctx: &CliContext, names: &[String]) -> Result<Changeset> {
    let index = ctx.generations.load_device_index().await?;
    let mut changeset = Changeset::empty();
    for name in names.iter().map(ServiceName::new) {
        let doc = ctx.generations.load_service(&name).await?;
        let previous = ctx.generations.load_service_output(&name).await?;
        if doc.is_none() && previous.is_none() {
            return Err(LodestarError::not_found(format!("service {name}")).into());
        }
        let mut part = Changeset::for_service(name.clone(), None, doc.as_ref());
        for device in previous.iter().flat_map(|output| output.devices()) {
            if let Some(protocol) = index.get(device) {
                part.devices.entry(device.clone()).or_insert(*protocol);
            }
        }
        changeset.merge(part);
    }
    Ok(changeset)
}

async fn resolve(ctx: &CliContext, args: &PassArgs) -> Result<Changeset> {
    if args.all || args.services.is_empty() {
        Ok(ctx.engine.full_changeset().await?)
    } else {
        changeset_for_services(ctx, &args.services).await
    }
}

fn finish(report: &ReconcileReport) -> Result<Option<ErrorClass>> {
    print_json(report)?;
    tracing::info!("{}", report.summary());
    Ok(report.class())
}

/// Run a pass with pass-level retry and print the report
pub async fn handle_reconcile(
    args: PassArgs,
    ctx: &CliContext,
    cancel: &CancellationToken,
) -> Result<Option<ErrorClass>> {
    let changeset = resolve(ctx, &args).await?;
    let policy = ctx.config.reconcile.retry.policy();
    let report = ctx
        .engine
        .reconcile_with_retry(&changeset, &policy, cancel)
        .await?;
    finish(&report)
}

/// Dry-run a pass and print what it would push
pub async fn handle_plan(args: PassArgs, ctx: &CliContext) -> Result<Option<ErrorClass>> {
    let changeset = resolve(ctx, &args).await?;
    let report = ctx.engine.plan(&changeset).await?;
    finish(&report)
}
