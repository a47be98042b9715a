use serde::{Deserialize, Serialize};

/// One persisted build capture.
///
/// The serialized field names match the stored JSON layout, so lists written
/// by earlier deployments keep loading. `created_at` arrived after the first
/// records were written; readers fall back to `id`, which is itself an epoch
/// timestamp in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    /// Creation time in epoch milliseconds; doubles as identity.
    pub id: i64,
    /// External build-page link. Unique within a list.
    pub url: String,
    /// `data:image/png;base64,…` of the captured region or full-page fallback.
    pub screenshot: String,
    pub name: String,
    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,

    // Derived once at capture time, never edited afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weapon_base_monster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weapon_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monster_icon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weapon_type_icon_url: Option<String>,
}

impl Card {
    pub fn created_at_ms(&self) -> i64 {
        self.created_at.unwrap_or(self.id)
    }

    pub fn now_id() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// The shared card list, newest first.
///
/// Holds the two invariants the storage layer cannot enforce for us: unique
/// `id` and unique `url` within the list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CardList(Vec<Card>);

impl CardList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a caller-supplied list (e.g. a full-list overwrite request).
    pub fn from_cards(cards: Vec<Card>) -> anyhow::Result<Self> {
        let mut list = Self::new();
        // Prepend semantics would reverse the submitted order, so insert
        // back-to-front.
        for card in cards.into_iter().rev() {
            list.add(card)?;
        }
        Ok(list)
    }

    pub fn cards(&self) -> &[Card] {
        &self.0
    }

    pub fn into_cards(self) -> Vec<Card> {
        self.0
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.0.iter().any(|card| card.url == url)
    }

    /// Prepends a card. Rejected before any capture work when the URL is
    /// already present.
    pub fn add(&mut self, card: Card) -> anyhow::Result<()> {
        if self.contains_url(&card.url) {
            anyhow::bail!("build url already exists: {}", card.url);
        }
        if self.0.iter().any(|existing| existing.id == card.id) {
            anyhow::bail!("card id already exists: {}", card.id);
        }
        self.0.insert(0, card);
        Ok(())
    }

    /// Removes exactly the card with `id`. Returns whether anything changed.
    pub fn delete(&mut self, id: i64) -> bool {
        let before = self.0.len();
        self.0.retain(|card| card.id != id);
        self.0.len() != before
    }

    pub fn rename(&mut self, id: i64, name: &str) -> bool {
        match self.0.iter_mut().find(|card| card.id == id) {
            Some(card) => {
                card.name = name.to_string();
                true
            }
            None => false,
        }
    }

    pub fn set_description(&mut self, id: i64, description: &str) -> bool {
        match self.0.iter_mut().find(|card| card.id == id) {
            Some(card) => {
                card.description = description.to_string();
                true
            }
            None => false,
        }
    }

    /// Case-insensitive name search, the one derived view the gallery needs.
    pub fn filter_by_name<'a>(&'a self, term: &str) -> Vec<&'a Card> {
        let term = term.to_lowercase();
        self.0
            .iter()
            .filter(|card| card.name.to_lowercase().contains(&term))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(id: i64, url: &str, name: &str) -> Card {
        Card {
            id,
            url: url.to_string(),
            screenshot: "data:image/png;base64,AAAA".to_string(),
            name: name.to_string(),
            description: String::new(),
            created_at: None,
            weapon_base_monster: None,
            weapon_type: None,
            monster_icon_url: None,
            weapon_type_icon_url: None,
        }
    }

    #[test]
    fn add_prepends_newest_first() {
        let mut list = CardList::new();
        list.add(card(1, "https://a.example/1", "first")).unwrap();
        list.add(card(2, "https://a.example/2", "second")).unwrap();

        let ids: Vec<i64> = list.cards().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn duplicate_url_is_rejected_and_list_unchanged() {
        let mut list = CardList::new();
        list.add(card(1, "https://a.example/1", "first")).unwrap();

        let err = list
            .add(card(2, "https://a.example/1", "dup"))
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(list.cards().len(), 1);
        assert_eq!(list.cards()[0].id, 1);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut list = CardList::new();
        list.add(card(1, "https://a.example/1", "first")).unwrap();
        assert!(list.add(card(1, "https://a.example/2", "dup")).is_err());
    }

    #[test]
    fn delete_removes_exactly_one_id() {
        let mut list = CardList::new();
        list.add(card(1, "https://a.example/1", "one")).unwrap();
        list.add(card(2, "https://a.example/2", "two")).unwrap();

        assert!(list.delete(1));
        assert!(!list.delete(1));
        let ids: Vec<i64> = list.cards().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn rename_and_describe_mutate_in_place() {
        let mut list = CardList::new();
        list.add(card(1, "https://a.example/1", "old")).unwrap();

        assert!(list.rename(1, "Rathalos build"));
        assert!(list.set_description(1, "counter-focused"));
        assert!(!list.rename(99, "missing"));

        assert_eq!(list.cards()[0].name, "Rathalos build");
        assert_eq!(list.cards()[0].description, "counter-focused");
    }

    #[test]
    fn filter_by_name_is_case_insensitive() {
        let mut list = CardList::new();
        list.add(card(1, "https://a.example/1", "Rathalos GS")).unwrap();
        list.add(card(2, "https://a.example/2", "Legiana bow")).unwrap();

        let hits = list.filter_by_name("rathalos");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);
    }

    #[test]
    fn from_cards_preserves_submitted_order() {
        let cards = vec![
            card(3, "https://a.example/3", "newest"),
            card(2, "https://a.example/2", "mid"),
            card(1, "https://a.example/1", "oldest"),
        ];
        let list = CardList::from_cards(cards.clone()).unwrap();
        assert_eq!(list.cards(), &cards[..]);
    }

    #[test]
    fn minted_ids_are_millisecond_timestamps() {
        let id = Card::now_id();
        // 2024-01-01T00:00:00Z in epoch millis; a freshly minted id is later.
        assert!(id > 1_704_067_200_000);

        let fresh = card(id, "https://a.example/fresh", "fresh");
        assert_eq!(fresh.created_at_ms(), id);
    }

    #[test]
    fn created_at_falls_back_to_id_for_legacy_records() {
        let legacy = card(1700000000000, "https://a.example/1", "legacy");
        assert_eq!(legacy.created_at_ms(), 1700000000000);

        let mut recent = card(1700000000001, "https://a.example/2", "recent");
        recent.created_at = Some(1700000099999);
        assert_eq!(recent.created_at_ms(), 1700000099999);
    }

    #[test]
    fn legacy_json_without_optional_fields_still_parses() {
        let json = r#"{"id":1,"url":"https://a.example/1","screenshot":"data:,","name":"n"}"#;
        let card: Card = serde_json::from_str(json).unwrap();
        assert_eq!(card.description, "");
        assert!(card.weapon_base_monster.is_none());

        // Optional fields stay absent on the wire when unset.
        let out = serde_json::to_string(&card).unwrap();
        assert!(!out.contains("weaponBaseMonster"));
        assert!(!out.contains("createdAt"));
    }
}
