//! User directory demo.
//!
//! A small in-memory social app exercising the whole pipeline surface:
//! grouped routes with inherited hooks, typed per-request state, the
//! validation taxonomy, path parameters, a raw HTML console, and a
//! request-counter plugin with a dependency.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use clap::Parser;
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bough::{
    affirm, fail, hook, proceed, reply, reply_raw, App, AppConfig, AppOptions, ErrorEntry, Events,
    Fault, Hook, HookFuture, HookResult, Plugin, PluginRef, PluginRegistry, RouteGroup, RouteSpec,
    Taxonomy,
};
use bough::pipeline::context::Acc;

#[derive(Parser)]
#[command(name = "bough-demo")]
#[command(about = "In-memory user directory demo server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value_t = 8080)]
    port: u16,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct User {
    name: String,
    hash: String,
    liked: Vec<String>,
    liked_by: Vec<String>,
}

type UserStore = Arc<Mutex<Vec<User>>>;

/// Field digests attached by [`AutoHash`] for later steps.
#[derive(Debug, Clone, Default)]
struct Hashes(HashMap<String, String>);

/// The authenticated user's name, attached by [`EnsureAuth`].
#[derive(Debug, Clone)]
struct CurrentUser(String);

// not secure, just stable enough for a demo
fn digest(input: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn validate_name(value: &Value) -> Result<(), Fault> {
    let Some(name) = value.as_str() else {
        return fail([ErrorEntry::new("field bad type")
            .with("field", "name")
            .with("type", "string")]);
    };
    affirm(name.chars().count() < 40, "name too long")?;
    affirm(name.chars().count() > 3, "name too short")?;
    Ok(())
}

fn validate_password(value: &Value) -> Result<(), Fault> {
    let Some(password) = value.as_str() else {
        return fail([ErrorEntry::new("field bad type")
            .with("field", "password")
            .with("type", "string")]);
    };
    affirm(password.chars().count() > 7, "password too short")?;
    affirm(
        password.chars().any(|c| c.is_ascii_digit()),
        "password missing digit",
    )?;
    affirm(
        password.chars().any(|c| c.is_ascii_uppercase()),
        "password missing uppercase",
    )?;
    affirm(
        password.chars().any(|c| c.is_ascii_lowercase()),
        "password missing lowercase",
    )?;
    Ok(())
}

// containers and null all classify as plain objects
fn json_type(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null | Value::Array(_) | Value::Object(_) => "object",
    }
}

/// Require fields in the merged request data, optionally type-checked.
struct EnsureHas {
    fields: Vec<(String, String)>,
}

impl EnsureHas {
    fn any(field: &str) -> Self {
        EnsureHas {
            fields: vec![(field.to_string(), "any".to_string())],
        }
    }

    fn all(fields: &[&str]) -> Self {
        EnsureHas {
            fields: fields
                .iter()
                .map(|field| (field.to_string(), "any".to_string()))
                .collect(),
        }
    }

    fn typed(fields: &[(&str, &str)]) -> Self {
        EnsureHas {
            fields: fields
                .iter()
                .map(|(field, ty)| (field.to_string(), ty.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl Hook for EnsureHas {
    async fn run(&self, acc: &mut Acc) -> HookResult {
        for (field, ty) in &self.fields {
            affirm(
                acc.data.contains_key(field),
                ErrorEntry::new("field missing").with("field", field.clone()),
            )?;

            if ty != "any" {
                let matched = acc.field(field).map(|v| json_type(v) == ty).unwrap_or(false);
                affirm(
                    matched,
                    ErrorEntry::new("field bad type")
                        .with("field", field.clone())
                        .with("type", ty.clone()),
                )?;
            }
        }
        proceed()
    }
}

/// Digest a string field into the per-request [`Hashes`] table.
struct AutoHash {
    field: String,
}

impl AutoHash {
    fn new(field: &str) -> Self {
        AutoHash {
            field: field.to_string(),
        }
    }
}

#[async_trait]
impl Hook for AutoHash {
    async fn run(&self, acc: &mut Acc) -> HookResult {
        let value = acc.field(&self.field);
        affirm(
            value.is_some(),
            ErrorEntry::new("field missing").with("field", self.field.clone()),
        )?;
        let text = value.and_then(Value::as_str);
        affirm(
            text.is_some(),
            ErrorEntry::new("field bad type")
                .with("field", self.field.clone())
                .with("type", "string"),
        )?;
        let hashed = digest(text.unwrap_or_default());

        let mut hashes = acc.get::<Hashes>().cloned().unwrap_or_default();
        hashes.0.insert(self.field.clone(), hashed);
        acc.insert(hashes);
        proceed()
    }
}

/// Resolve the requesting user from name + password digest.
struct EnsureAuth {
    store: UserStore,
}

#[async_trait]
impl Hook for EnsureAuth {
    async fn run(&self, acc: &mut Acc) -> HookResult {
        let name = acc.str_field("name").unwrap_or_default().to_string();
        let password_hash = acc
            .get::<Hashes>()
            .and_then(|hashes| hashes.0.get("password").cloned());
        let Some(password_hash) = password_hash else {
            return Err(Fault::internal("password digest missing from request state"));
        };

        let users = self.store.lock().expect("user store poisoned");
        let Some(known) = users.iter().find(|u| u.name == name) else {
            return Err(Fault::Validation(vec!["invalid user name".into()]));
        };
        affirm(known.hash == password_hash, "invalid user credentials")?;
        drop(users);

        acc.insert(CurrentUser(name));
        proceed()
    }
}

struct CreateUser {
    store: UserStore,
}

#[async_trait]
impl Hook for CreateUser {
    async fn run(&self, acc: &mut Acc) -> HookResult {
        validate_name(acc.field("name").unwrap_or(&Value::Null))?;
        validate_password(acc.field("password").unwrap_or(&Value::Null))?;

        let name = acc.str_field("name").unwrap_or_default().to_string();
        let password = acc.str_field("password").unwrap_or_default().to_string();

        let mut users = self.store.lock().expect("user store poisoned");
        affirm(
            users.iter().all(|u| u.name != name),
            "user name already exists",
        )?;

        let user = User {
            name,
            hash: digest(&password),
            liked: Vec::new(),
            liked_by: Vec::new(),
        };
        users.push(user.clone());
        reply(user)
    }
}

struct LikeUser {
    store: UserStore,
}

#[async_trait]
impl Hook for LikeUser {
    async fn run(&self, acc: &mut Acc) -> HookResult {
        let target_value = acc.field("targetName").cloned().unwrap_or(Value::Null);
        validate_name(&target_value)?;
        let target_name = target_value.as_str().unwrap_or_default().to_string();

        let Some(CurrentUser(me)) = acc.get::<CurrentUser>().cloned() else {
            return Err(Fault::internal("authenticated user missing from request state"));
        };

        let mut users = self.store.lock().expect("user store poisoned");
        let Some(target_idx) = users.iter().position(|u| u.name == target_name) else {
            return Err(Fault::Validation(vec!["invalid target user name".into()]));
        };
        let Some(me_idx) = users.iter().position(|u| u.name == me) else {
            return Err(Fault::internal("authenticated user vanished from the store"));
        };
        affirm(
            !users[me_idx].liked.contains(&target_name),
            "target user already liked",
        )?;

        users[target_idx].liked_by.push(me.clone());
        users[me_idx].liked.push(target_name);

        reply(json!({ "targetUserLikes": users[target_idx].liked_by.len() }))
    }
}

struct DeleteUser {
    store: UserStore,
}

#[async_trait]
impl Hook for DeleteUser {
    async fn run(&self, acc: &mut Acc) -> HookResult {
        let Some(CurrentUser(me)) = acc.get::<CurrentUser>().cloned() else {
            return Err(Fault::internal("authenticated user missing from request state"));
        };

        let mut users = self.store.lock().expect("user store poisoned");
        let Some(me_idx) = users.iter().position(|u| u.name == me) else {
            return Err(Fault::internal("authenticated user vanished from the store"));
        };

        // unlink from everyone else; the record itself stays
        let liked = users[me_idx].liked.clone();
        let liked_by = users[me_idx].liked_by.clone();
        for target in &liked {
            if let Some(idx) = users.iter().position(|u| &u.name == target) {
                if let Some(pos) = users[idx].liked_by.iter().position(|n| n == &me) {
                    users[idx].liked_by.remove(pos);
                }
            }
        }
        for target in &liked_by {
            if let Some(idx) = users.iter().position(|u| &u.name == target) {
                if let Some(pos) = users[idx].liked.iter().position(|n| n == &me) {
                    users[idx].liked.remove(pos);
                }
            }
        }

        reply(true)
    }
}

struct InspectUser {
    store: UserStore,
}

#[async_trait]
impl Hook for InspectUser {
    async fn run(&self, acc: &mut Acc) -> HookResult {
        let target = acc.str_field("targetName").unwrap_or_default().to_string();

        let users = self.store.lock().expect("user store poisoned");
        let Some(user) = users.iter().find(|u| u.name == target) else {
            return Err(Fault::Validation(vec!["invalid target user name".into()]));
        };

        reply(json!({
            "name": user.name,
            "liked": user.liked,
            "likedBy": user.liked_by,
        }))
    }
}

static NEXT: AtomicU64 = AtomicU64::new(0);

fn increment(_acc: &mut Acc) -> HookFuture<'_> {
    Box::pin(async move { reply(NEXT.fetch_add(1, Ordering::Relaxed)) })
}

fn echo(acc: &mut Acc) -> HookFuture<'_> {
    Box::pin(async move { reply(acc.data.clone()) })
}

fn log_request(acc: &mut Acc) -> HookFuture<'_> {
    Box::pin(async move {
        tracing::info!(method = %acc.meta.method, path = %acc.meta.path, "request");
        proceed()
    })
}

const CONSOLE_PAGE: &str = r#"
<input id=uname placeholder=name value=user><br>
<input id=psswd placeholder=password value=Password123><br>
<input id=target placeholder=target_name><br>
<button id=create>create</button>
<button id=like>like</button>
<button id=del>delete</button>
<button id=inspect>inspect</button>
<pre id=out></pre>
<script>
  const log = text => { out.textContent = text + '\n' + out.textContent };
  const api = (path = '/', method = 'POST', data = {}) => {
    const xhr = new XMLHttpRequest;
    xhr.open(method, path);
    xhr.setRequestHeader('Content-Type', 'application/json');
    xhr.send(JSON.stringify(data));
    xhr.onerror = () => log('ERR: ' + xhr.responseText);
    xhr.onload = () => log('OK: ' + xhr.responseText);
  }

  log('starting');

  const use = path => {
    api(path, 'POST', {
      name: uname.value,
      password: psswd.value,
      targetName: target.value,
    });
  }
  const assoc = (el, path) => el.addEventListener('click', () => use(path));

  assoc(create, '/user/create');
  assoc(like, '/user/like');
  assoc(del, '/user/delete');

  inspect.addEventListener('click', () => {
    api('/inspect/' + target.value, 'GET');
  })
</script>
"#;

fn console(_acc: &mut Acc) -> HookFuture<'_> {
    Box::pin(async move { reply_raw(CONSOLE_PAGE) })
}

/// Counts every request; serves the tally at `GET /stats`.
#[derive(Debug, Default)]
struct HitCounter {
    hits: AtomicU64,
}

struct CountHit {
    counter: Arc<HitCounter>,
}

#[async_trait]
impl Hook for CountHit {
    async fn run(&self, _acc: &mut Acc) -> HookResult {
        self.counter.hits.fetch_add(1, Ordering::Relaxed);
        proceed()
    }
}

struct ReadHits {
    counter: Arc<HitCounter>,
}

#[async_trait]
impl Hook for ReadHits {
    async fn run(&self, _acc: &mut Acc) -> HookResult {
        reply(json!({ "hits": self.counter.hits.load(Ordering::Relaxed) }))
    }
}

fn stats_plugin(counter: Arc<HitCounter>) -> Plugin {
    Plugin::new()
        .before(hook(CountHit {
            counter: Arc::clone(&counter),
        }))
        .routes(RouteGroup::new().route("get /stats", RouteSpec::handler(ReadHits { counter })))
        .requires(PluginRef::named("uptime"))
}

struct Uptime {
    started: Instant,
}

#[async_trait]
impl Hook for Uptime {
    async fn run(&self, _acc: &mut Acc) -> HookResult {
        reply(json!({ "uptimeSecs": self.started.elapsed().as_secs() }))
    }
}

fn uptime_plugin() -> Plugin {
    Plugin::new().routes(RouteGroup::new().route(
        "get /uptime",
        RouteSpec::handler(Uptime {
            started: Instant::now(),
        }),
    ))
}

fn taxonomy() -> Taxonomy {
    [
        "name not string",
        "name too short",
        "name too long",
        "password not string",
        "password too short",
        "password missing digit",
        "password missing uppercase",
        "password missing lowercase",
        "field missing",
        "field bad type",
        "invalid user name",
        "invalid user credentials",
        "user name already exists",
        "invalid target user name",
        "target user already liked",
    ]
    .into_iter()
    .collect()
}

fn routes(store: &UserStore) -> RouteGroup {
    RouteGroup::new()
        .route("get /increment", RouteSpec::handler(increment))
        .route("post /echo", RouteSpec::handler(echo))
        .route(
            "/user",
            RouteGroup::new()
                .before(hook(EnsureHas::typed(&[("name", "string")])))
                .before(hook(AutoHash::new("password")))
                .route(
                    "post /create",
                    RouteSpec::handler(CreateUser {
                        store: Arc::clone(store),
                    }),
                )
                .route(
                    "/",
                    RouteGroup::new()
                        .before(hook(EnsureHas::all(&["name", "password"])))
                        .before(hook(EnsureAuth {
                            store: Arc::clone(store),
                        }))
                        .route(
                            "post /like",
                            RouteSpec::handler(LikeUser {
                                store: Arc::clone(store),
                            })
                            .before(hook(EnsureHas::any("targetName"))),
                        )
                        .route(
                            "post /delete",
                            RouteSpec::handler(DeleteUser {
                                store: Arc::clone(store),
                            }),
                        ),
                ),
        )
        .route(
            "get /inspect/{targetName}",
            RouteSpec::handler(InspectUser {
                store: Arc::clone(store),
            }),
        )
        .route("get /", RouteSpec::handler(console))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bough=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let store: UserStore = Arc::new(Mutex::new(Vec::new()));
    let counter = Arc::new(HitCounter::default());

    let mut events = Events::new();
    events.before.push(hook(log_request));

    let mut registry = PluginRegistry::new();
    registry.register("uptime", PluginRef::literal(uptime_plugin()));

    let options = AppOptions {
        routes: routes(&store),
        plugins: vec![PluginRef::literal(stats_plugin(counter))],
        events,
        errors: taxonomy(),
        config: AppConfig {
            port: cli.port,
            ..Default::default()
        },
        registry,
    };

    let app = App::new(options)?;
    app.listen(None).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, Request};
    use bough::Flow;
    use serde_json::Map;

    fn acc_with(fields: &[(&str, Value)]) -> Acc {
        let (parts, _) = Request::builder()
            .method(Method::POST)
            .uri("/t")
            .body(())
            .unwrap()
            .into_parts();
        let body: Map<String, Value> = fields
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        Acc::new(parts, HashMap::new(), body, Method::POST, "/t".into())
    }

    fn seeded_store() -> UserStore {
        let user = User {
            name: "annabelle".into(),
            hash: digest("Password1"),
            liked: Vec::new(),
            liked_by: Vec::new(),
        };
        Arc::new(Mutex::new(vec![user]))
    }

    #[tokio::test]
    async fn test_matching_credentials_attach_the_current_user() {
        let auth = EnsureAuth {
            store: seeded_store(),
        };
        let mut acc = acc_with(&[("name", json!("annabelle"))]);
        let mut hashes = Hashes::default();
        hashes.0.insert("password".into(), digest("Password1"));
        acc.insert(hashes);

        assert_eq!(auth.run(&mut acc).await.unwrap(), Flow::Continue);
        assert_eq!(acc.get::<CurrentUser>().unwrap().0, "annabelle");
    }

    #[tokio::test]
    async fn test_unknown_user_name_is_a_validation_fault() {
        let auth = EnsureAuth {
            store: seeded_store(),
        };
        let mut acc = acc_with(&[("name", json!("nobody"))]);
        let mut hashes = Hashes::default();
        hashes.0.insert("password".into(), digest("Password1"));
        acc.insert(hashes);

        let err = auth.run(&mut acc).await.unwrap_err();
        match err {
            Fault::Validation(entries) => assert_eq!(entries[0].msg, "invalid user name"),
            other => panic!("expected validation fault, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_like_target_is_a_validation_fault() {
        let like = LikeUser {
            store: seeded_store(),
        };
        let mut acc = acc_with(&[("targetName", json!("nobody"))]);
        acc.insert(CurrentUser("annabelle".into()));

        let err = like.run(&mut acc).await.unwrap_err();
        match err {
            Fault::Validation(entries) => {
                assert_eq!(entries[0].msg, "invalid target user name")
            }
            other => panic!("expected validation fault, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_inspecting_a_missing_user_is_a_validation_fault() {
        let inspect = InspectUser {
            store: seeded_store(),
        };
        let mut acc = acc_with(&[("targetName", json!("nobody"))]);

        let err = inspect.run(&mut acc).await.unwrap_err();
        match err {
            Fault::Validation(entries) => {
                assert_eq!(entries[0].msg, "invalid target user name")
            }
            other => panic!("expected validation fault, got {other:?}"),
        }
    }
}
