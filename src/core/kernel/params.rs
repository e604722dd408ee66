use url::form_urlencoded;

/// Ordered key/value parameters for a query string or form body
///
/// Keys keep the position of their first insertion and values follow
/// last-write-wins, so the encoded string (and therefore the request
/// signature) is stable for a given sequence of `set` calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamBag {
    pairs: Vec<(String, String)>,
}

impl ParamBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing any previous value for the key
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((key, value)),
        }
        self
    }

    /// Set a parameter only when a value is present
    pub fn set_opt<V: ToString>(&mut self, key: &str, value: Option<V>) -> &mut Self {
        if let Some(value) = value {
            self.set(key, value.to_string());
        }
        self
    }

    /// Merge another bag into this one; the other bag wins on conflicts
    pub fn merge(&mut self, other: &Self) -> &mut Self {
        for (key, value) in &other.pairs {
            self.set(key.clone(), value.clone());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.pairs.iter().position(|(k, _)| k == key)?;
        Some(self.pairs.remove(index).1)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// URL-encode the parameters in insertion order
    pub fn encode(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }
}

impl<K, V> FromIterator<(K, V)> for ParamBag
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = Self::new();
        for (key, value) in iter {
            bag.set(key, value);
        }
        bag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_keeps_insertion_order() {
        let mut bag = ParamBag::new();
        bag.set("symbol", "BTCUSDT").set("side", "BUY").set("type", "LIMIT");
        assert_eq!(bag.encode(), "symbol=BTCUSDT&side=BUY&type=LIMIT");
    }

    #[test]
    fn test_last_write_wins_in_place() {
        let mut bag = ParamBag::new();
        bag.set("symbol", "BTCUSDT").set("limit", "5").set("symbol", "ETHUSDT");
        assert_eq!(bag.len(), 2);
        assert_eq!(bag.encode(), "symbol=ETHUSDT&limit=5");
    }

    #[test]
    fn test_merge() {
        let mut base: ParamBag = [("symbol", "BTCUSDT"), ("limit", "5")].into_iter().collect();
        let overrides: ParamBag = [("limit", "10"), ("fromId", "42")].into_iter().collect();
        base.merge(&overrides);
        assert_eq!(base.encode(), "symbol=BTCUSDT&limit=10&fromId=42");
    }

    #[test]
    fn test_encode_escapes_reserved_characters() {
        let mut bag = ParamBag::new();
        bag.set("newClientOrderId", "a b&c=d")
            .set("orderIdList", "[1,2]");
        assert_eq!(
            bag.encode(),
            "newClientOrderId=a+b%26c%3Dd&orderIdList=%5B1%2C2%5D"
        );
    }

    #[test]
    fn test_set_opt_and_remove() {
        let mut bag = ParamBag::new();
        bag.set_opt("limit", Some(100)).set_opt::<u32>("fromId", None);
        assert!(bag.contains("limit"));
        assert!(!bag.contains("fromId"));
        assert_eq!(bag.remove("limit").as_deref(), Some("100"));
        assert!(bag.is_empty());
        assert_eq!(bag.encode(), "");
    }
}
