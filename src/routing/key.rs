//! Route key parsing and path joining.
//!
//! A route key is `"path"` or `"METHOD path"`. A lone token keeps the
//! method inherited from the enclosing group; two tokens pin the method
//! explicitly. Anything else is a registration-time error, as is a method
//! token the dispatcher cannot route.

use axum::http::Method;
use axum::routing::MethodFilter;

use crate::errors::SetupError;

/// Split a route key into its method and path fragment.
///
/// The method token is case-insensitive. The path fragment is joined onto
/// the enclosing group's path by the compiler, so `"post create"` and
/// `"post /create"` are equivalent.
pub fn parse_key(key: &str, inherited: &Method) -> Result<(Method, String), SetupError> {
    let tokens: Vec<&str> = key.split(' ').collect();
    match tokens.as_slice() {
        [path] => Ok((inherited.clone(), (*path).to_string())),
        [method, path] => Ok((parse_method(method, key)?, (*path).to_string())),
        _ => Err(SetupError::InvalidRouteKey {
            key: key.to_string(),
        }),
    }
}

fn parse_method(token: &str, key: &str) -> Result<Method, SetupError> {
    let invalid = || SetupError::InvalidMethod {
        key: key.to_string(),
        method: token.to_string(),
    };
    let method =
        Method::from_bytes(token.to_ascii_uppercase().as_bytes()).map_err(|_| invalid())?;
    // from_bytes admits extension methods; the dispatcher does not route
    // those, so refuse them here where the offending key is still known
    MethodFilter::try_from(method.clone()).map_err(|_| invalid())?;
    Ok(method)
}

/// Join two path fragments the way POSIX path join does, rooted at `/`.
///
/// Duplicate separators collapse, `.` segments drop, `..` pops, and the
/// result always starts with a single `/`.
pub fn join_paths(parent: &str, child: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in parent.split('/').chain(child.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}
