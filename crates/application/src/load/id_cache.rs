//! Ids harvested from list responses and creates, shared by all users.

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::Rng;
use scoreload_domain::Resource;
use serde_json::Value;

/// Known ids kept per resource; the oldest are dropped first.
const MAX_KNOWN_IDS: usize = 200;

/// Keys under which list endpoints wrap their items.
const ENVELOPE_KEYS: [&str; 3] = ["data", "items", "results"];

#[derive(Debug, Default)]
struct Pool {
    known: Vec<String>,
    created: Vec<String>,
}

/// Per-resource id pools.
///
/// `known` holds any id the API has shown us. `created` holds only ids this
/// run created and did not clean up; delete tasks draw from it exclusively.
#[derive(Debug, Default)]
pub struct IdCache {
    pools: Mutex<HashMap<Resource, Pool>>,
}

impl IdCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Harvests ids from a list response and returns how many were new.
    pub fn remember_listed(&self, resource: Resource, body: &Value) -> usize {
        let ids = extract_ids(body);
        if ids.is_empty() {
            return 0;
        }

        let mut pools = self.pools.lock();
        let pool = pools.entry(resource).or_default();
        let mut added = 0;
        for id in ids {
            if pool.known.contains(&id) {
                continue;
            }
            if pool.known.len() >= MAX_KNOWN_IDS {
                pool.known.remove(0);
            }
            pool.known.push(id);
            added += 1;
        }
        added
    }

    /// Records an id created by this run.
    pub fn remember_created(&self, resource: Resource, id: impl Into<String>) {
        let id = id.into();
        let mut pools = self.pools.lock();
        let pool = pools.entry(resource).or_default();
        if !pool.created.contains(&id) {
            pool.created.push(id);
        }
    }

    /// A random id for read/update tasks, or the resource's default id.
    pub fn pick<R: Rng + ?Sized>(&self, resource: Resource, rng: &mut R) -> String {
        let pools = self.pools.lock();
        let Some(pool) = pools.get(&resource) else {
            return resource.default_id().to_string();
        };

        let total = pool.known.len() + pool.created.len();
        if total == 0 {
            return resource.default_id().to_string();
        }
        let index = rng.random_range(0..total);
        pool.known
            .iter()
            .chain(pool.created.iter())
            .nth(index)
            .cloned()
            .unwrap_or_else(|| resource.default_id().to_string())
    }

    /// Removes and returns a random id created by this run.
    ///
    /// The id is also forgotten from the known pool so it is not read after
    /// being deleted.
    pub fn take_created<R: Rng + ?Sized>(&self, resource: Resource, rng: &mut R) -> Option<String> {
        let mut pools = self.pools.lock();
        let pool = pools.get_mut(&resource)?;
        if pool.created.is_empty() {
            return None;
        }
        let index = rng.random_range(0..pool.created.len());
        let id = pool.created.swap_remove(index);
        pool.known.retain(|known| known != &id);
        Some(id)
    }

    /// Number of ids created by this run and still available.
    #[must_use]
    pub fn created_count(&self, resource: Resource) -> usize {
        self.pools
            .lock()
            .get(&resource)
            .map_or(0, |pool| pool.created.len())
    }

    /// Number of ids harvested from list responses.
    #[must_use]
    pub fn known_count(&self, resource: Resource) -> usize {
        self.pools
            .lock()
            .get(&resource)
            .map_or(0, |pool| pool.known.len())
    }
}

/// Ids of the items in a list response.
///
/// Accepts a bare array or an object wrapping the array under `data`,
/// `items` or `results`. Items without an `id` are skipped.
#[must_use]
pub fn extract_ids(body: &Value) -> Vec<String> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(map) => match ENVELOPE_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
        {
            Some(items) => items,
            None => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| item.get("id").and_then(id_string))
        .collect()
}

/// Id of the item a create request returned, from `id` or `data.id`.
#[must_use]
pub fn created_id(body: &Value) -> Option<String> {
    body.get("id")
        .and_then(id_string)
        .or_else(|| body.get("data")?.get("id").and_then(id_string))
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::json;

    #[test]
    fn test_extract_ids_from_array_and_envelopes() {
        assert_eq!(extract_ids(&json!([{"id": 1}, {"id": "abc"}, {"name": "x"}])), ["1", "abc"]);
        assert_eq!(extract_ids(&json!({"data": [{"id": 7}]})), ["7"]);
        assert_eq!(extract_ids(&json!({"items": [{"id": 8}]})), ["8"]);
        assert_eq!(extract_ids(&json!({"results": [{"id": 9}]})), ["9"]);
        assert!(extract_ids(&json!({"id": 1})).is_empty());
        assert!(extract_ids(&json!("nope")).is_empty());
    }

    #[test]
    fn test_created_id() {
        assert_eq!(created_id(&json!({"id": 42})), Some("42".to_string()));
        assert_eq!(created_id(&json!({"data": {"id": "u-1"}})), Some("u-1".to_string()));
        assert_eq!(created_id(&json!({"id": ""})), None);
        assert_eq!(created_id(&json!({"message": "ok"})), None);
    }

    #[test]
    fn test_pick_falls_back_to_default_id() {
        let cache = IdCache::new();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(cache.pick(Resource::Users, &mut rng), "100");
        assert_eq!(cache.pick(Resource::Teams, &mut rng), "1");
    }

    #[test]
    fn test_pick_uses_harvested_ids() {
        let cache = IdCache::new();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(cache.remember_listed(Resource::Teams, &json!([{"id": 5}, {"id": 6}])), 2);
        assert_eq!(cache.remember_listed(Resource::Teams, &json!([{"id": 5}])), 0);

        for _ in 0..20 {
            let id = cache.pick(Resource::Teams, &mut rng);
            assert!(id == "5" || id == "6", "unexpected id {id}");
        }
        assert_eq!(cache.pick(Resource::Groups, &mut rng), "1");
    }

    #[test]
    fn test_known_pool_is_bounded() {
        let cache = IdCache::new();
        let items: Vec<_> = (0..MAX_KNOWN_IDS + 10).map(|i| json!({"id": i})).collect();
        cache.remember_listed(Resource::Staff, &Value::Array(items));
        assert_eq!(cache.known_count(Resource::Staff), MAX_KNOWN_IDS);
    }

    #[test]
    fn test_take_created_only_returns_created_ids() {
        let cache = IdCache::new();
        let mut rng = StdRng::seed_from_u64(3);
        cache.remember_listed(Resource::Groups, &json!([{"id": 1}]));
        assert_eq!(cache.take_created(Resource::Groups, &mut rng), None);

        cache.remember_created(Resource::Groups, "77");
        cache.remember_listed(Resource::Groups, &json!([{"id": "77"}]));
        assert_eq!(cache.take_created(Resource::Groups, &mut rng), Some("77".to_string()));
        assert_eq!(cache.created_count(Resource::Groups), 0);
        assert_eq!(cache.known_count(Resource::Groups), 1);
    }
}
