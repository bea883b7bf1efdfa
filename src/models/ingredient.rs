use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt::Display};

use crate::error::{AppError, AppResult};

/// Normalized comparison key for an ingredient name (trimmed, case-folded)
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Identifier of the user owning an inventory and a favorites list
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Parses a username, rejecting blank values
    pub fn parse(raw: &str) -> AppResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation("username must not be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An inventory entry with its checklist state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub checked: bool,
}

impl Ingredient {
    /// Creates an unchecked ingredient from user input
    pub fn new(name: &str) -> AppResult<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation(
                "ingredient name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            name: trimmed.to_string(),
            checked: false,
        })
    }

    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }
}

/// Ingredient as persisted by an inventory store.
///
/// Older inventories hold bare names; newer ones hold `{name, checked}` records.
/// Both are accepted here and converted into [`Ingredient`] exactly once, so nothing
/// past this boundary looks at the representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredIngredient {
    Record {
        name: String,
        #[serde(default)]
        checked: bool,
    },
    Bare(String),
}

impl StoredIngredient {
    pub fn is_legacy(&self) -> bool {
        matches!(self, StoredIngredient::Bare(_))
    }
}

impl From<StoredIngredient> for Ingredient {
    fn from(stored: StoredIngredient) -> Self {
        match stored {
            StoredIngredient::Record { name, checked } => Ingredient {
                name: name.trim().to_string(),
                checked,
            },
            StoredIngredient::Bare(name) => Ingredient {
                name: name.trim().to_string(),
                checked: false,
            },
        }
    }
}

impl From<Ingredient> for StoredIngredient {
    fn from(ingredient: Ingredient) -> Self {
        StoredIngredient::Record {
            name: ingredient.name,
            checked: ingredient.checked,
        }
    }
}

/// A user's ingredients in insertion order, unique by normalized key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Inventory {
    items: Vec<Ingredient>,
}

impl Inventory {
    /// Builds an inventory from stored entries, dropping blanks and later duplicates
    pub fn from_stored(stored: Vec<StoredIngredient>) -> Self {
        let mut inventory = Self::default();
        for ingredient in stored.into_iter().map(Ingredient::from) {
            if ingredient.name.is_empty() || inventory.position(&ingredient.name).is_some() {
                continue;
            }
            inventory.items.push(ingredient);
        }
        inventory
    }

    pub fn items(&self) -> &[Ingredient] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Normalized keys of every entry, as consumed by the matching engine
    pub fn keys(&self) -> BTreeSet<String> {
        self.items.iter().map(Ingredient::key).collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        let key = normalize_name(name);
        self.items.iter().position(|i| i.key() == key)
    }

    /// Appends an ingredient; returns `false` when the key is already present
    pub fn add(&mut self, name: &str) -> AppResult<bool> {
        let ingredient = Ingredient::new(name)?;
        if self.position(&ingredient.name).is_some() {
            return Ok(false);
        }
        self.items.push(ingredient);
        Ok(true)
    }

    /// Removes the entry whose key matches `name`
    pub fn remove(&mut self, name: &str) -> AppResult<Ingredient> {
        if name.trim().is_empty() {
            return Err(AppError::Validation(
                "ingredient name must not be empty".to_string(),
            ));
        }
        match self.position(name) {
            Some(index) => Ok(self.items.remove(index)),
            None => Err(AppError::NotFound(format!(
                "ingredient '{}' is not in the inventory",
                name.trim()
            ))),
        }
    }

    pub fn set_checked(&mut self, index: usize, checked: bool) -> AppResult<()> {
        let len = self.items.len();
        let item = self.items.get_mut(index).ok_or_else(|| {
            AppError::NotFound(format!(
                "no ingredient at index {} (inventory has {} entries)",
                index, len
            ))
        })?;
        item.checked = checked;
        Ok(())
    }

    pub fn into_stored(self) -> Vec<StoredIngredient> {
        self.items.into_iter().map(StoredIngredient::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Egg "), "egg");
        assert_eq!(normalize_name("BREAD"), "bread");
    }

    #[test]
    fn test_user_id_rejects_blank() {
        assert!(UserId::parse("   ").is_err());
        assert_eq!(UserId::parse(" alice ").unwrap().as_str(), "alice");
    }

    #[test]
    fn test_stored_ingredient_accepts_both_shapes() {
        let stored: Vec<StoredIngredient> =
            serde_json::from_str(r#"["eggs", {"name": "bread", "checked": true}, {"name": "milk"}]"#)
                .unwrap();

        assert!(stored[0].is_legacy());
        assert!(!stored[1].is_legacy());

        let inventory = Inventory::from_stored(stored);
        assert_eq!(
            inventory.items(),
            &[
                Ingredient { name: "eggs".into(), checked: false },
                Ingredient { name: "bread".into(), checked: true },
                Ingredient { name: "milk".into(), checked: false },
            ]
        );
    }

    #[test]
    fn test_into_stored_migrates_legacy_entries() {
        let inventory = Inventory::from_stored(vec![StoredIngredient::Bare("eggs".into())]);
        let stored = inventory.into_stored();
        assert_eq!(
            stored,
            vec![StoredIngredient::Record { name: "eggs".into(), checked: false }]
        );
        assert_eq!(serde_json::to_string(&stored).unwrap(), r#"[{"name":"eggs","checked":false}]"#);
    }

    #[test]
    fn test_from_stored_drops_duplicates_and_blanks() {
        let inventory = Inventory::from_stored(vec![
            StoredIngredient::Bare("Egg".into()),
            StoredIngredient::Bare("  ".into()),
            StoredIngredient::Bare("egg ".into()),
        ]);
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory.items()[0].name, "Egg");
    }

    #[test]
    fn test_add_is_idempotent_by_key() {
        let mut inventory = Inventory::default();
        assert!(inventory.add(" Tomato ").unwrap());
        assert!(!inventory.add("tomato").unwrap());
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory.items()[0].name, "Tomato");
    }

    #[test]
    fn test_add_rejects_empty() {
        let mut inventory = Inventory::default();
        assert!(matches!(inventory.add("  "), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_remove() {
        let mut inventory = Inventory::default();
        inventory.add("Egg").unwrap();
        inventory.add("bread").unwrap();

        let removed = inventory.remove("EGG").unwrap();
        assert_eq!(removed.name, "Egg");
        assert_eq!(inventory.keys().into_iter().collect::<Vec<_>>(), vec!["bread"]);
        assert!(matches!(inventory.remove("egg"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_set_checked_out_of_range() {
        let mut inventory = Inventory::default();
        inventory.add("egg").unwrap();
        inventory.set_checked(0, true).unwrap();
        assert!(inventory.items()[0].checked);
        assert!(matches!(inventory.set_checked(3, true), Err(AppError::NotFound(_))));
    }
}
