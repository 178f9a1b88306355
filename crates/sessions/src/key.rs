use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Compact numeric stand-in for a session's composite identity.
///
/// Allocated once per distinct [`SessionKey`], starting at 1, and never handed
/// out for a different key while the owning registry lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurrogateId(pub u64);

impl SurrogateId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SurrogateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a library process attached to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryId(pub i32);

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One side of a session: comp id plus the optional sub and location ids.
///
/// Absent sub/location ids are always stored as `""`, never as a separate
/// marker, so equality and hashing see a single representation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyId {
    #[serde(default, deserialize_with = "empty_if_null")]
    pub comp_id: String,
    #[serde(default, deserialize_with = "empty_if_null")]
    pub sub_id: String,
    #[serde(default, deserialize_with = "empty_if_null")]
    pub location_id: String,
}

fn empty_if_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl PartyId {
    pub fn new(comp_id: impl Into<String>, sub_id: Option<&str>, location_id: Option<&str>) -> Self {
        Self {
            comp_id: comp_id.into(),
            sub_id: sub_id.unwrap_or_default().to_string(),
            location_id: location_id.unwrap_or_default().to_string(),
        }
    }

    /// Party identified by comp id alone.
    pub fn comp(comp_id: impl Into<String>) -> Self {
        Self::new(comp_id, None, None)
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.comp_id)?;
        if !self.sub_id.is_empty() {
            write!(f, "/{}", self.sub_id)?;
        }
        if !self.location_id.is_empty() {
            write!(f, "@{}", self.location_id)?;
        }
        Ok(())
    }
}

/// Composite session identity: the local and remote parties of a logon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub local: PartyId,
    pub remote: PartyId,
}

impl SessionKey {
    pub fn new(local: PartyId, remote: PartyId) -> Self {
        Self { local, remote }
    }

    /// The six identity fields in wire order: local comp/sub/location, then
    /// remote comp/sub/location.
    pub fn fields(&self) -> [&str; 6] {
        [
            &self.local.comp_id,
            &self.local.sub_id,
            &self.local.location_id,
            &self.remote.comp_id,
            &self.remote.sub_id,
            &self.remote.location_id,
        ]
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.local, self.remote)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn brkr_client() -> SessionKey {
        SessionKey::new(
            PartyId::new("BRKR", None, Some("NY")),
            PartyId::new("CLIENT", Some("TRADE"), Some("LON")),
        )
    }

    #[test]
    fn absent_fields_are_empty_strings() {
        let key = brkr_client();
        assert_eq!(key.fields(), ["BRKR", "", "NY", "CLIENT", "TRADE", "LON"]);
    }

    #[test]
    fn none_and_empty_are_the_same_identity() {
        let a = SessionKey::new(PartyId::new("A", None, None), PartyId::comp("B"));
        let b = SessionKey::new(PartyId::new("A", Some(""), Some("")), PartyId::comp("B"));
        assert_eq!(a, b);

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn every_field_participates_in_equality() {
        let base = brkr_client();
        let mut other = base.clone();
        other.remote.location_id = "PAR".into();
        assert_ne!(base, other);

        let mut swapped = base.clone();
        std::mem::swap(&mut swapped.local, &mut swapped.remote);
        assert_ne!(base, swapped);
    }

    #[test]
    fn deserialize_normalizes_missing_and_null() {
        let key: SessionKey = serde_json::from_str(
            r#"{"local":{"comp_id":"BRKR","location_id":"NY"},
                "remote":{"comp_id":"CLIENT","sub_id":null,"location_id":"LON"}}"#,
        )
        .unwrap();
        assert_eq!(key.fields(), ["BRKR", "", "NY", "CLIENT", "", "LON"]);
    }

    #[test]
    fn display_skips_empty_parts() {
        assert_eq!(brkr_client().to_string(), "BRKR@NY->CLIENT/TRADE@LON");
    }
}
