use serde::{Deserialize, Serialize};

/// Account record as persisted in the data document. The hash is an argon2
/// PHC string and never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
}

/// A contact owned by a single user. `photo` is a `/uploads/...` reference
/// path and is only ever set through the photo-upload endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
}

impl ClientRecord {
    #[must_use]
    pub fn matches(&self, query: &str, field: SearchField) -> bool {
        field_matches(&self.name, &self.email, &self.phone, query, field)
    }
}

/// Which field a client search runs against. Anything unrecognized falls
/// back to `Any`, same as an absent `field` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Name,
    Email,
    Phone,
    Any,
}

impl SearchField {
    #[must_use]
    pub fn parse(field: Option<&str>) -> Self {
        match field {
            Some("name") => Self::Name,
            Some("email") => Self::Email,
            Some("phone") => Self::Phone,
            _ => Self::Any,
        }
    }
}

/// Case-insensitive substring match used by both the server handlers and the
/// offline mirror. `Any` matches against the space-joined concatenation of
/// all three fields. An empty query matches everything.
#[must_use]
pub fn field_matches(
    name: &str,
    email: &str,
    phone: &str,
    query: &str,
    field: SearchField,
) -> bool {
    let q = query.to_lowercase();
    if q.is_empty() {
        return true;
    }

    match field {
        SearchField::Name => name.to_lowercase().contains(&q),
        SearchField::Email => email.to_lowercase().contains(&q),
        SearchField::Phone => phone.to_lowercase().contains(&q),
        SearchField::Any => format!("{name} {email} {phone}").to_lowercase().contains(&q),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ClientRecord {
        ClientRecord {
            id: "c1".to_string(),
            user_id: "u1".to_string(),
            name: "Alice Smith".to_string(),
            email: "alice@example.com".to_string(),
            phone: "555-1234".to_string(),
            photo: None,
        }
    }

    #[test]
    fn test_parse_search_field() {
        assert_eq!(SearchField::parse(Some("name")), SearchField::Name);
        assert_eq!(SearchField::parse(Some("email")), SearchField::Email);
        assert_eq!(SearchField::parse(Some("phone")), SearchField::Phone);
        assert_eq!(SearchField::parse(Some("any")), SearchField::Any);
        assert_eq!(SearchField::parse(Some("bogus")), SearchField::Any);
        assert_eq!(SearchField::parse(None), SearchField::Any);
    }

    #[test]
    fn test_field_match_is_case_insensitive() {
        let c = record();
        assert!(c.matches("ALICE", SearchField::Name));
        assert!(c.matches("Example.COM", SearchField::Email));
        assert!(!c.matches("alice", SearchField::Phone));
    }

    #[test]
    fn test_any_matches_concatenation() {
        let c = record();
        assert!(c.matches("alice", SearchField::Any));
        assert!(c.matches("555", SearchField::Any));
        // The concatenation is space-joined, so a query spanning the
        // name/email boundary matches through the separator.
        assert!(c.matches("smith alice@", SearchField::Any));
        assert!(!c.matches("bob", SearchField::Any));
    }

    #[test]
    fn test_empty_query_matches_all() {
        let c = record();
        assert!(c.matches("", SearchField::Name));
        assert!(c.matches("", SearchField::Any));
    }

    #[test]
    fn test_record_json_shape() {
        let c = record();
        let value = serde_json::to_value(&c).unwrap();
        assert_eq!(value["userId"], "u1");
        assert!(value.get("photo").is_none());

        let with_photo = ClientRecord {
            photo: Some("/uploads/x.png".to_string()),
            ..record()
        };
        let value = serde_json::to_value(&with_photo).unwrap();
        assert_eq!(value["photo"], "/uploads/x.png");
    }
}
