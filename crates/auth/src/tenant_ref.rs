//! Tenant-id extraction for tenant-gated requests.
//!
//! One rule for every route: path, then query, then JSON body. The first source
//! that carries the field decides; a value that is present but not a tenant id
//! is not skipped over.

use serde_json::Value;

use kb_core::TenantId;

use crate::GateError;

/// Request field naming the target tenant.
pub const CLIENT_ID_FIELD: &str = "client_id";

/// Raw tenant-id candidates gathered from one request.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantSources<'a> {
    pub path: Option<&'a str>,
    pub query: Option<&'a str>,
    pub body: Option<&'a Value>,
}

pub fn resolve_tenant_id(sources: &TenantSources<'_>, field: &str) -> Result<TenantId, GateError> {
    if let Some(raw) = sources.path {
        return parse_text(raw);
    }
    if let Some(raw) = sources.query {
        return parse_text(raw);
    }
    match sources.body.and_then(|body| body.get(field)) {
        None | Some(Value::Null) => Err(GateError::TenantUnresolved),
        Some(Value::Number(n)) => n
            .as_i64()
            .filter(|raw| *raw >= 0)
            .map(TenantId::new)
            .ok_or(GateError::TenantUnresolved),
        Some(Value::String(s)) => parse_text(s),
        Some(_) => Err(GateError::TenantUnresolved),
    }
}

fn parse_text(raw: &str) -> Result<TenantId, GateError> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(GateError::TenantUnresolved);
    }
    raw.parse::<i64>().map(TenantId::new).map_err(|_| GateError::TenantUnresolved)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn resolve(path: Option<&str>, query: Option<&str>, body: Option<&Value>) -> Result<TenantId, GateError> {
        resolve_tenant_id(&TenantSources { path, query, body }, CLIENT_ID_FIELD)
    }

    #[test]
    fn path_wins_over_query_and_body() {
        let body = json!({ "client_id": 3 });
        assert_eq!(resolve(Some("1"), Some("2"), Some(&body)), Ok(TenantId::new(1)));
        assert_eq!(resolve(None, Some("2"), Some(&body)), Ok(TenantId::new(2)));
        assert_eq!(resolve(None, None, Some(&body)), Ok(TenantId::new(3)));
    }

    #[test]
    fn body_accepts_number_or_digit_string() {
        assert_eq!(resolve(None, None, Some(&json!({ "client_id": "42" }))), Ok(TenantId::new(42)));
        assert_eq!(resolve(None, None, Some(&json!({ "client_id": " 42 " }))), Ok(TenantId::new(42)));
        assert_eq!(resolve(None, None, Some(&json!({ "client_id": 42 }))), Ok(TenantId::new(42)));
    }

    #[test]
    fn unusable_values_are_unresolved() {
        for body in [
            json!({}),
            json!({ "client_id": null }),
            json!({ "client_id": 4.5 }),
            json!({ "client_id": "-4" }),
            json!({ "client_id": "abc" }),
            json!({ "client_id": [1] }),
            json!([1, 2]),
        ] {
            assert_eq!(resolve(None, None, Some(&body)), Err(GateError::TenantUnresolved), "{body}");
        }
        assert_eq!(resolve(None, None, None), Err(GateError::TenantUnresolved));
    }

    #[test]
    fn negative_ids_are_unresolved_from_every_source() {
        let body = json!({ "client_id": -4 });
        assert_eq!(resolve(None, None, Some(&body)), Err(GateError::TenantUnresolved));
        assert_eq!(resolve(Some("-4"), None, None), Err(GateError::TenantUnresolved));
        assert_eq!(resolve(None, Some("-4"), None), Err(GateError::TenantUnresolved));
        assert_eq!(resolve(None, None, Some(&json!({ "client_id": 0 }))), Ok(TenantId::new(0)));
    }

    #[test]
    fn bad_earlier_source_does_not_fall_through() {
        let body = json!({ "client_id": 3 });
        assert_eq!(resolve(Some("x"), None, Some(&body)), Err(GateError::TenantUnresolved));
        assert_eq!(resolve(None, Some(""), Some(&body)), Err(GateError::TenantUnresolved));
    }
}
