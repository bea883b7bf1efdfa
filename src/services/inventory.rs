use std::sync::Arc;

use crate::{
    db::store::InventoryStore,
    error::{AppError, AppResult},
    models::{Ingredient, Inventory, UserId},
    services::locks::KeyedLocks,
};

/// Serializes inventory mutations per user
///
/// Mutations of one user run one at a time within this process. Writers outside the
/// process are detected through the store's revision check; a stale write is retried
/// on a fresh snapshot up to `max_attempts` times before `AppError::Conflict` is returned.
pub struct InventoryCoordinator {
    store: Arc<dyn InventoryStore>,
    locks: KeyedLocks<UserId>,
    max_attempts: u32,
}

impl InventoryCoordinator {
    pub fn new(store: Arc<dyn InventoryStore>, max_attempts: u32) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn create_user(&self, user: &UserId) -> AppResult<()> {
        self.store.create_user(user).await?;
        tracing::info!(user = %user, "User created");
        Ok(())
    }

    /// Current inventory of `user`, as an immutable snapshot
    pub async fn list(&self, user: &UserId) -> AppResult<Inventory> {
        let snapshot = self.store.load(user).await?;
        Ok(Inventory::from_stored(snapshot.items))
    }

    pub async fn add(&self, user: &UserId, name: &str) -> AppResult<Inventory> {
        let ingredient = Ingredient::new(name)?;
        self.mutate(user, "add", |inventory| inventory.add(&ingredient.name))
            .await
    }

    pub async fn remove(&self, user: &UserId, name: &str) -> AppResult<Inventory> {
        let ingredient = Ingredient::new(name)?;
        self.mutate(user, "remove", |inventory| {
            inventory.remove(&ingredient.name).map(|_| true)
        })
        .await
    }

    pub async fn set_checked(
        &self,
        user: &UserId,
        index: usize,
        checked: bool,
    ) -> AppResult<Inventory> {
        self.mutate(user, "set_checked", |inventory| {
            inventory.set_checked(index, checked).map(|_| true)
        })
        .await
    }

    /// Runs `op` against a fresh snapshot and saves the result.
    ///
    /// `op` returns whether it changed anything. Unchanged inventories are only
    /// written back when they still hold legacy entries, which migrates them.
    async fn mutate<F>(&self, user: &UserId, operation: &'static str, op: F) -> AppResult<Inventory>
    where
        F: Fn(&mut Inventory) -> AppResult<bool> + Send + Sync,
    {
        let _guard = self.locks.lock(user).await;

        let mut attempt = 1;
        loop {
            let snapshot = self.store.load(user).await?;
            let has_legacy = snapshot.items.iter().any(|i| i.is_legacy());
            let mut inventory = Inventory::from_stored(snapshot.items);

            let changed = op(&mut inventory)?;
            if !changed && !has_legacy {
                tracing::debug!(user = %user, operation, "Inventory unchanged");
                return Ok(inventory);
            }

            match self
                .store
                .save(user, snapshot.revision, inventory.clone().into_stored())
                .await
            {
                Ok(revision) => {
                    tracing::info!(
                        user = %user,
                        operation,
                        revision,
                        migrated_legacy = has_legacy,
                        "Inventory updated"
                    );
                    return Ok(inventory);
                }
                Err(AppError::Conflict(reason)) if attempt < self.max_attempts => {
                    tracing::warn!(
                        user = %user,
                        operation,
                        attempt,
                        reason = %reason,
                        "Inventory revision moved, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::{InventorySnapshot, MockInventoryStore};
    use crate::db::MemoryStore;
    use crate::models::StoredIngredient;
    use tokio_test::{assert_err, assert_ok};

    fn user(name: &str) -> UserId {
        UserId::parse(name).unwrap()
    }

    async fn coordinator_with_user(name: &str) -> (InventoryCoordinator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.create_user(&user(name)).await.unwrap();
        (InventoryCoordinator::new(store.clone(), 3), store)
    }

    fn names(inventory: &Inventory) -> Vec<&str> {
        inventory.items().iter().map(|i| i.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_add_preserves_order_and_is_idempotent() {
        let (coordinator, _) = coordinator_with_user("alice").await;
        let alice = user("alice");

        coordinator.add(&alice, "Eggs").await.unwrap();
        coordinator.add(&alice, " bread ").await.unwrap();
        let inventory = coordinator.add(&alice, "EGGS").await.unwrap();

        assert_eq!(names(&inventory), vec!["Eggs", "bread"]);
    }

    #[tokio::test]
    async fn test_add_empty_name_rejected_without_touching_store() {
        let mut store = MockInventoryStore::new();
        store.expect_load().never();
        store.expect_save().never();
        let coordinator = InventoryCoordinator::new(Arc::new(store), 3);

        let result = coordinator.add(&user("alice"), "   ").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_remove_missing_is_not_found() {
        let (coordinator, _) = coordinator_with_user("alice").await;
        let result = coordinator.remove(&user("alice"), "saffron").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let coordinator = InventoryCoordinator::new(store, 3);
        let result = coordinator.add(&user("ghost"), "egg").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_set_checked_migrates_legacy_entries() {
        let (coordinator, store) = coordinator_with_user("alice").await;
        let alice = user("alice");
        store
            .save(
                &alice,
                0,
                vec![
                    StoredIngredient::Bare("eggs".into()),
                    StoredIngredient::Bare("bread".into()),
                ],
            )
            .await
            .unwrap();

        let inventory = coordinator.set_checked(&alice, 1, true).await.unwrap();
        assert!(!inventory.items()[0].checked);
        assert!(inventory.items()[1].checked);

        let stored = store.load(&alice).await.unwrap();
        assert!(stored.items.iter().all(|i| !i.is_legacy()));
    }

    #[tokio::test]
    async fn test_noop_add_still_migrates_legacy_entries() {
        let (coordinator, store) = coordinator_with_user("alice").await;
        let alice = user("alice");
        store
            .save(&alice, 0, vec![StoredIngredient::Bare("eggs".into())])
            .await
            .unwrap();

        coordinator.add(&alice, "eggs").await.unwrap();
        let stored = store.load(&alice).await.unwrap();
        assert_eq!(stored.revision, 2);
        assert!(!stored.items[0].is_legacy());
    }

    #[tokio::test]
    async fn test_concurrent_adds_do_not_lose_updates() {
        let (coordinator, _) = coordinator_with_user("alice").await;
        let coordinator = Arc::new(coordinator);
        let alice = user("alice");

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let coordinator = coordinator.clone();
                let alice = alice.clone();
                tokio::spawn(async move { coordinator.add(&alice, &format!("item-{}", i)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let inventory = coordinator.list(&alice).await.unwrap();
        assert_eq!(inventory.len(), 20);
        assert_eq!(coordinator.locks.len(), 0);
    }

    #[tokio::test]
    async fn test_user_locks_released_after_mutations() {
        let (coordinator, _) = coordinator_with_user("alice").await;
        coordinator.add(&user("alice"), "eggs").await.unwrap();
        for i in 0..10 {
            let result = coordinator.add(&user(&format!("ghost{}", i)), "egg").await;
            assert!(matches!(result, Err(AppError::NotFound(_))));
        }
        assert_eq!(coordinator.locks.len(), 0);
    }

    #[tokio::test]
    async fn test_conflict_is_retried_on_fresh_snapshot() {
        let mut store = MockInventoryStore::new();
        let mut revision = 0;
        store.expect_load().times(2).returning(move |_| {
            revision += 1;
            Ok(InventorySnapshot {
                revision,
                items: vec![],
            })
        });
        store
            .expect_save()
            .withf(|_, expected, _| *expected == 1)
            .times(1)
            .returning(|_, _, _| Err(AppError::Conflict("moved".into())));
        store
            .expect_save()
            .withf(|_, expected, _| *expected == 2)
            .times(1)
            .returning(|_, _, _| Ok(3));

        let coordinator = InventoryCoordinator::new(Arc::new(store), 3);
        let inventory = assert_ok!(coordinator.add(&user("alice"), "egg").await);
        assert_eq!(inventory.len(), 1);
    }

    #[tokio::test]
    async fn test_conflict_surfaces_after_max_attempts() {
        let mut store = MockInventoryStore::new();
        store
            .expect_load()
            .times(2)
            .returning(|_| Ok(InventorySnapshot::default()));
        store
            .expect_save()
            .times(2)
            .returning(|_, _, _| Err(AppError::Conflict("moved".into())));

        let coordinator = InventoryCoordinator::new(Arc::new(store), 2);
        let error = assert_err!(coordinator.add(&user("alice"), "egg").await);
        assert!(matches!(error, AppError::Conflict(_)));
    }
}
