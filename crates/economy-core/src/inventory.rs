use contracts::{AdItem, AdPlatform};

/// Read-only seam to the ad-inventory collaborator. Implementations return
/// up to `min_count` currently eligible items; returning fewer means the
/// caller cannot reserve and must not create a session.
pub trait AdInventory {
    fn list_eligible(&self, min_count: usize, now_ms: i64) -> Vec<AdItem>;
}

#[derive(Debug, Clone)]
pub struct SponsoredItem {
    pub item: AdItem,
    pub active: bool,
    pub sponsored_until_ms: Option<i64>,
}

impl SponsoredItem {
    pub fn eligible(&self, now_ms: i64) -> bool {
        self.active
            && self
                .sponsored_until_ms
                .map(|until_ms| until_ms > now_ms)
                .unwrap_or(true)
    }
}

/// Fixed in-memory catalog, used by the CLI server and by tests. Production
/// deployments wire the real collaborator behind the same trait.
#[derive(Debug, Clone, Default)]
pub struct StaticAdInventory {
    items: Vec<SponsoredItem>,
}

impl StaticAdInventory {
    pub fn new(items: Vec<SponsoredItem>) -> Self {
        Self { items }
    }

    pub fn default_catalog() -> Self {
        let catalog = [
            ("ad_sunrise_cola", AdPlatform::Youtube, "yt:sunrise-cola-15s"),
            ("ad_peak_fitness", AdPlatform::Vimeo, "vm:peak-fitness-20s"),
            ("ad_atlas_travel", AdPlatform::Youtube, "yt:atlas-travel-30s"),
            ("ad_nimbus_bank", AdPlatform::Dailymotion, "dm:nimbus-bank-15s"),
        ];

        Self::new(
            catalog
                .into_iter()
                .map(|(item_id, platform, embed_ref)| SponsoredItem {
                    item: AdItem {
                        item_id: item_id.to_string(),
                        platform,
                        embed_ref: embed_ref.to_string(),
                    },
                    active: true,
                    sponsored_until_ms: None,
                })
                .collect(),
        )
    }
}

impl AdInventory for StaticAdInventory {
    fn list_eligible(&self, min_count: usize, now_ms: i64) -> Vec<AdItem> {
        self.items
            .iter()
            .filter(|sponsored| sponsored.eligible(now_ms))
            .take(min_count)
            .map(|sponsored| sponsored.item.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, active: bool, until_ms: Option<i64>) -> SponsoredItem {
        SponsoredItem {
            item: AdItem {
                item_id: id.to_string(),
                platform: AdPlatform::Youtube,
                embed_ref: format!("yt:{id}"),
            },
            active,
            sponsored_until_ms: until_ms,
        }
    }

    #[test]
    fn filters_inactive_and_lapsed_sponsorships() {
        let inventory = StaticAdInventory::new(vec![
            item("live", true, Some(2_000)),
            item("lapsed", true, Some(500)),
            item("paused", false, None),
            item("evergreen", true, None),
        ]);

        let eligible = inventory.list_eligible(10, 1_000);
        let ids: Vec<&str> = eligible.iter().map(|ad| ad.item_id.as_str()).collect();
        assert_eq!(ids, vec!["live", "evergreen"]);
    }

    #[test]
    fn returns_fewer_when_inventory_is_short() {
        let inventory = StaticAdInventory::new(vec![item("only", true, None)]);
        assert_eq!(inventory.list_eligible(2, 0).len(), 1);
    }
}
