//! Stripe setup command - provisions the plan catalogue in the configured account.

use anyhow::{Result, bail};
use colored::Colorize;
use corpdesk::billing::{
    BillingError, LiveStripeClient, ProvisionStatus, StripeConfig, provision_catalog,
};

use crate::cli::StripeSetupArgs;
use crate::{print_error, print_info, print_success, print_warning};

pub async fn run(args: StripeSetupArgs) -> Result<()> {
    corpdesk::init_tracing();

    let config = StripeConfig::from_env();
    let Some(client) = LiveStripeClient::from_config(&config)? else {
        bail!("STRIPE_SECRET_KEY is not set (CORPDESK_STRIPE_SECRET_KEY also accepted)");
    };
    if !client.is_test_mode() && !args.live && !args.dry_run {
        bail!("Refusing to provision with a live-mode key; pass --live to confirm");
    }

    println!(
        "\n{} Provisioning Stripe catalogue{}...\n",
        "corpdesk".cyan().bold(),
        if args.dry_run { " (dry run)" } else { "" }
    );

    let report = match provision_catalog(&client, args.dry_run).await {
        Ok(report) => report,
        Err(BillingError::ProvisioningConflict { existing }) => {
            print_error("Some catalogue prices already exist; nothing was created:");
            for key in &existing {
                println!("  - {}", key);
            }
            bail!("catalogue partially provisioned; archive those prices and retry");
        }
        Err(BillingError::ProvisioningFailed {
            step,
            message,
            rollback_failures,
        }) => {
            print_error(&format!("Step '{}' failed: {}", step, message));
            if rollback_failures.is_empty() {
                print_info("Everything created before the failure was deactivated");
            } else {
                print_warning("These resources could not be deactivated:");
                for failure in &rollback_failures {
                    println!("  - {}", failure);
                }
            }
            bail!("provisioning failed");
        }
        Err(e) => return Err(e.into()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match report.status {
        ProvisionStatus::AlreadyProvisioned => {
            print_success("Catalogue already provisioned, nothing to do");
        }
        ProvisionStatus::DryRun => {
            for step in &report.steps {
                print_info(step);
            }
            print_success(&format!("{} steps would run", report.steps.len()));
        }
        ProvisionStatus::Created => {
            for step in &report.steps {
                print_success(step);
            }
            println!("\n{}", "Catalogue created.".green().bold());
        }
    }
    Ok(())
}
