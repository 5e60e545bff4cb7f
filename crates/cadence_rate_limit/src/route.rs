//! Route classification.
//!
//! Discord rate limits are tracked per route shape rather than per concrete URL,
//! so entity IDs are folded into a `:id` placeholder. Guild IDs are the
//! exception: guild-scoped endpoints such as Add Guild Member are limited per
//! guild, so `/guilds/<id>` stays literal.

/// Placeholder substituted for entity IDs.
pub const ID_PLACEHOLDER: &str = ":id";

/// Map a request path to the rate-limit route it is scheduled on.
///
/// A segment is replaced when it is a 17-19 digit snowflake and the segment
/// before it is a lowercase resource name (letters and `-`) other than
/// `guilds`. Any query string is carried over untouched.
///
/// # Examples
///
/// ```
/// use cadence_rate_limit::routefy;
///
/// assert_eq!(
///     routefy("/guilds/123456789012345678/members/234567890123456789"),
///     "/guilds/123456789012345678/members/:id"
/// );
/// assert_eq!(routefy("/users/@me/guilds"), "/users/@me/guilds");
/// ```
pub fn routefy(path: &str) -> String {
    let (path, query) = match path.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path, None),
    };

    let mut route = String::with_capacity(path.len());
    let mut previous: Option<&str> = None;
    for (index, segment) in path.split('/').enumerate() {
        if index > 0 {
            route.push('/');
        }
        match previous {
            Some(resource)
                if is_resource_name(resource) && resource != "guilds" && is_snowflake(segment) =>
            {
                route.push_str(ID_PLACEHOLDER)
            }
            _ => route.push_str(segment),
        }
        previous = Some(segment);
    }

    if let Some(query) = query {
        route.push('?');
        route.push_str(query);
    }
    route
}

fn is_resource_name(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_lowercase() || b == b'-')
}

fn is_snowflake(segment: &str) -> bool {
    (17..=19).contains(&segment.len()) && segment.bytes().all(|b| b.is_ascii_digit())
}
