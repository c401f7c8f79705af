//! # ACL maintenance tool
//!
//! ## Commands
//!
//! - `migrate` - Create the ACL tables for the configured action schema
//! - `rebuild` - Recompute every authorization from the stored roles
//! - `rebuild-resource <descriptor>` - Recompute the authorizations of one resource
//! - `check <identity> <action> <descriptor>` - Print whether an identity may act on a resource
//!
//! Resource descriptors are `entity:<Class>:<id>` or `class:<Class>`.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL` - PostgreSQL connection string (required)
//! - `ACL_CONFIG` - Path to the JSON settings file (required)
//! - `RUST_LOG` - Log level (default: info)
//!
//! `rebuild` deletes every authorization before replaying the roles: run it
//! in a maintenance window. Resource hierarchies are registered by the host
//! application, so rebuilds from this tool do not cascade.

use anyhow::{bail, Context};
use cretoai_acl::{AclSettings, Resource, SecurityIdentity};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: acl-admin <migrate | rebuild | rebuild-resource <descriptor> | check <identity> <action> <descriptor>>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        bail!(USAGE);
    };

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
    let settings = AclSettings::from_env().context("Failed to load ACL settings")?;
    let identity_type = settings.security_identity_type.clone();

    info!("Starting acl-admin v{} ({})", cretoai_acl::VERSION, command);

    let setup = settings.into_setup()?;
    let store = Arc::new(setup.postgres_store(&database_url).await?);

    match (command.as_str(), &args[1..]) {
        ("migrate", []) => {
            store.ensure_schema().await?;
            info!("Schema is up to date");
        }
        ("rebuild", []) => {
            let acl = setup.build(store.clone(), store)?;
            acl.rebuild_authorizations().await?;
        }
        ("rebuild-resource", [descriptor]) => {
            let resource: Resource = descriptor.parse()?;
            let acl = setup.build(store.clone(), store)?;
            acl.rebuild_authorizations_for_resource(&resource).await?;
        }
        ("check", [identity, action, descriptor]) => {
            let resource: Resource = descriptor.parse()?;
            let acl = setup.build(store.clone(), store)?;
            let identity = SecurityIdentity::new(identity_type, identity.clone());
            let allowed = acl.is_allowed(&identity, action, &resource).await?;
            println!("{}", if allowed { "allowed" } else { "denied" });
        }
        _ => bail!(USAGE),
    }

    Ok(())
}
