/// Space-delimited OAuth2 scopes
///
/// Scopes travel as a single string (`"read write"`) and are handled as an
/// ordered, duplicate-free list.
///
/// Negotiation is permissive: requested scopes the client is not allowed are
/// dropped rather than failing the request, and an empty request grants
/// everything the client is allowed.
///
/// ```
/// use tenantgate_shared::auth::scope::{join_scopes, negotiate_scope, parse_scope};
///
/// let allowed = parse_scope("read write");
/// let granted = negotiate_scope(&allowed, Some("read write delete"));
/// assert_eq!(join_scopes(&granted), "read write");
/// ```

/// Splits a scope string on whitespace, dropping duplicates
pub fn parse_scope(scope: &str) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();

    for item in scope.split_whitespace() {
        if !scopes.iter().any(|s| s == item) {
            scopes.push(item.to_string());
        }
    }

    scopes
}

/// Joins scopes back into the wire form
pub fn join_scopes(scopes: &[String]) -> String {
    scopes.join(" ")
}

/// Intersects requested scopes with the client's allowed scopes
///
/// Keeps the requested order. `None` or a blank request yields all allowed scopes.
pub fn negotiate_scope(allowed: &[String], requested: Option<&str>) -> Vec<String> {
    let requested = requested.map(parse_scope).unwrap_or_default();

    if requested.is_empty() {
        return parse_scope(&join_scopes(allowed));
    }

    requested
        .into_iter()
        .filter(|scope| allowed.iter().any(|a| a == scope))
        .collect()
}

/// Exact-match scope check
pub fn has_scope(granted: &[String], required: &str) -> bool {
    granted.iter().any(|s| s == required)
}

/// Required scopes absent from the granted list
pub fn missing_scopes<'a>(granted: &[String], required: &'a [String]) -> Vec<&'a str> {
    required
        .iter()
        .filter(|r| !has_scope(granted, r))
        .map(String::as_str)
        .collect()
}
