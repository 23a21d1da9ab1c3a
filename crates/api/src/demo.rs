//! Demo data for single-process runs without real identity and catalog services.

use std::time::Duration;

use catalog::{CatalogError, CatalogStore, InMemoryCatalogStore, NewCatalogItem};
use common::{ItemId, UserId};
use orchestrator::{InMemoryIdentityAuthority, User};

const DEMO_USER: UserId = UserId::new(1);
const DEMO_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// What [`seed`] created.
#[derive(Debug, Clone)]
pub struct DemoSeed {
    /// Bearer token of the demo admin.
    pub token: Option<String>,
    pub item_ids: Vec<ItemId>,
}

/// Registers a demo admin and a few catalog items.
pub async fn seed(
    identity: &InMemoryIdentityAuthority,
    catalog: &InMemoryCatalogStore,
) -> Result<DemoSeed, CatalogError> {
    identity
        .add_user(User::new(DEMO_USER, "admin").with_role("admin"))
        .await;
    let token = identity.issue_token(DEMO_USER, DEMO_TOKEN_TTL).await;

    let items = [
        NewCatalogItem::new("Widget", 2.50, 5).with_category("hardware"),
        NewCatalogItem::new("Gadget", 19.99, 12).with_category("hardware"),
        NewCatalogItem::new("Manual", 0.0, 40).with_description("Printed handbook"),
    ];

    let mut item_ids = Vec::with_capacity(items.len());
    for item in items {
        let created = catalog.create(item, DEMO_USER).await?;
        item_ids.push(created.id);
    }

    Ok(DemoSeed { token, item_ids })
}
