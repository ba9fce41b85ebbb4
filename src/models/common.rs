use serde::Serializer;
use surrealdb::sql::Thing;

/// Serializes a SurrealDB record id as its bare key so API responses carry
/// plain string ids instead of `{tb, id}` objects.
pub fn serialize_record_id<S>(id: &Option<Thing>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match id {
        Some(thing) => serializer.serialize_str(&thing.id.to_raw()),
        None => serializer.serialize_none(),
    }
}

/// Returns the bare record key of a stored document. Records loaded from the
/// database always carry an id; documents that were never persisted do not.
pub fn record_key(id: &Option<Thing>) -> String {
    id.as_ref().map(|t| t.id.to_raw()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_of_stored_record() {
        let thing = Thing::from(("booking", "abc-123"));
        assert_eq!(record_key(&Some(thing)), "abc-123");
    }

    #[test]
    fn test_record_key_of_unsaved_record() {
        assert_eq!(record_key(&None), "");
    }
}
