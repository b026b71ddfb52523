//! Effective request construction.
//!
//! Flattens an endpoint's auth, query, header, cookie, and body
//! configuration into the concrete pieces the executor attaches to an
//! HTTP request. Disabled and blank-keyed entries are skipped.

use base64::Engine;
use sentinel_common::{ApiKeyLocation, AuthConfig, BodyConfig, EndpointSpec, KeyValue};

/// Concrete request pieces derived from an [`EndpointSpec`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestPlan {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<PlannedBody>,
}

/// Request body after serialization strategy has been resolved
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedBody {
    /// Raw payload with an explicit content type (JSON bodies)
    Raw {
        content: String,
        content_type: &'static str,
    },
    /// `application/x-www-form-urlencoded` key/value pairs
    Form(Vec<(String, String)>),
    /// `multipart/form-data` text fields
    Multipart(Vec<(String, String)>),
}

/// Build the effective request plan for an endpoint.
///
/// Synthesizes the `Authorization` header for bearer/basic credentials,
/// folds cookies into a single `Cookie` header, and resolves the body
/// serialization. Bodies are dropped for methods that do not carry one.
pub fn build_request_plan(spec: &EndpointSpec) -> RequestPlan {
    let mut plan = RequestPlan::default();

    if let Some(headers) = &spec.request_headers {
        for h in headers.iter().filter(|h| h.is_active()) {
            plan.headers.push((h.key.clone(), h.value.clone()));
        }
    }

    if let Some(cookies) = &spec.cookies {
        let parts: Vec<String> = cookies
            .iter()
            .filter(|c| c.is_active())
            .map(|c| format!("{}={}", c.key, c.value))
            .collect();
        if !parts.is_empty() {
            plan.headers.push(("Cookie".to_string(), parts.join("; ")));
        }
    }

    if let Some(auth) = &spec.auth {
        apply_auth(auth, &mut plan);
    }

    if let Some(params) = &spec.query_params {
        for p in params.iter().filter(|p| p.is_active()) {
            plan.query.push((p.key.clone(), p.value.clone()));
        }
    }

    if spec.method.allows_body() {
        if let Some(body) = &spec.body {
            plan.body = plan_body(body);
        }
    }

    plan
}

fn apply_auth(auth: &AuthConfig, plan: &mut RequestPlan) {
    match auth {
        AuthConfig::None => {}
        AuthConfig::Bearer { token } => {
            let token = token.trim();
            if !token.is_empty() {
                plan.headers
                    .push(("Authorization".to_string(), format!("Bearer {token}")));
            }
        }
        AuthConfig::Basic { username, password } => {
            if !username.trim().is_empty() {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{password}"));
                plan.headers
                    .push(("Authorization".to_string(), format!("Basic {encoded}")));
            }
        }
        AuthConfig::ApiKey { key, value, add_to } => {
            let key = key.trim();
            if !key.is_empty() {
                match add_to {
                    ApiKeyLocation::Header => {
                        plan.headers.push((key.to_string(), value.clone()));
                    }
                    ApiKeyLocation::Query => {
                        plan.query.push((key.to_string(), value.clone()));
                    }
                }
            }
        }
    }
}

fn plan_body(body: &BodyConfig) -> Option<PlannedBody> {
    match body {
        BodyConfig::None => None,
        BodyConfig::Json { raw } => Some(PlannedBody::Raw {
            content: raw.clone(),
            content_type: "application/json",
        }),
        BodyConfig::Urlencoded { form_fields } => {
            let pairs = active_pairs(form_fields);
            if pairs.is_empty() {
                None
            } else {
                Some(PlannedBody::Form(pairs))
            }
        }
        BodyConfig::FormData { form_fields } => {
            let pairs = active_pairs(form_fields);
            if pairs.is_empty() {
                None
            } else {
                Some(PlannedBody::Multipart(pairs))
            }
        }
    }
}

fn active_pairs(fields: &[KeyValue]) -> Vec<(String, String)> {
    fields
        .iter()
        .filter(|f| f.is_active())
        .map(|f| (f.key.clone(), f.value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sentinel_common::HttpMethod;
    use uuid::Uuid;

    fn spec(method: HttpMethod) -> EndpointSpec {
        EndpointSpec {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "orders".to_string(),
            url: "https://api.test/orders".to_string(),
            method,
            expected_status: 200,
            expected_schema: None,
            query_params: None,
            request_headers: None,
            cookies: None,
            auth: None,
            body: None,
            interval_seconds: 60,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn bearer_token_becomes_authorization_header() {
        let mut s = spec(HttpMethod::GET);
        s.auth = Some(AuthConfig::Bearer {
            token: "tok-123".to_string(),
        });
        let plan = build_request_plan(&s);
        assert!(plan
            .headers
            .contains(&("Authorization".to_string(), "Bearer tok-123".to_string())));
    }

    #[test]
    fn blank_bearer_token_is_ignored() {
        let mut s = spec(HttpMethod::GET);
        s.auth = Some(AuthConfig::Bearer {
            token: "   ".to_string(),
        });
        assert!(build_request_plan(&s).headers.is_empty());
    }

    #[test]
    fn basic_auth_is_base64_encoded() {
        let mut s = spec(HttpMethod::GET);
        s.auth = Some(AuthConfig::Basic {
            username: "alice".to_string(),
            password: "s3cret".to_string(),
        });
        let plan = build_request_plan(&s);
        // base64("alice:s3cret")
        assert!(plan
            .headers
            .contains(&("Authorization".to_string(), "Basic YWxpY2U6czNjcmV0".to_string())));
    }

    #[test]
    fn api_key_can_target_header_or_query() {
        let mut s = spec(HttpMethod::GET);
        s.auth = Some(AuthConfig::ApiKey {
            key: "X-Api-Key".to_string(),
            value: "k".to_string(),
            add_to: ApiKeyLocation::Header,
        });
        let plan = build_request_plan(&s);
        assert!(plan.headers.contains(&("X-Api-Key".to_string(), "k".to_string())));

        s.auth = Some(AuthConfig::ApiKey {
            key: "api_key".to_string(),
            value: "k".to_string(),
            add_to: ApiKeyLocation::Query,
        });
        let plan = build_request_plan(&s);
        assert!(plan.query.contains(&("api_key".to_string(), "k".to_string())));
    }

    #[test]
    fn cookies_fold_into_one_header() {
        let mut s = spec(HttpMethod::GET);
        s.cookies = Some(vec![
            KeyValue::new("session", "abc"),
            KeyValue {
                key: "skipped".to_string(),
                value: "x".to_string(),
                enabled: false,
            },
            KeyValue::new("theme", "dark"),
        ]);
        let plan = build_request_plan(&s);
        assert!(plan
            .headers
            .contains(&("Cookie".to_string(), "session=abc; theme=dark".to_string())));
    }

    #[test]
    fn body_is_dropped_for_get() {
        let mut s = spec(HttpMethod::GET);
        s.body = Some(BodyConfig::Json {
            raw: "{\"a\":1}".to_string(),
        });
        assert!(build_request_plan(&s).body.is_none());
    }

    #[test]
    fn urlencoded_body_collects_active_fields() {
        let mut s = spec(HttpMethod::POST);
        s.body = Some(BodyConfig::Urlencoded {
            form_fields: vec![KeyValue::new("a", "1"), KeyValue::new("b", "2")],
        });
        let plan = build_request_plan(&s);
        assert_eq!(
            plan.body,
            Some(PlannedBody::Form(vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
            ]))
        );
    }
}
