//! Declarative route records.
//!
//! A [`RouteDescriptor`] describes one endpoint before compilation. Controllers
//! produce them through a [`RouteSet`], which carries the controller-level
//! defaults (mount prefix, required capability, fail redirect).

use std::fmt;

use axum::http::Method;
use serde::{Deserialize, Serialize};

/// HTTP verb a route is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
    /// Every method, exact path.
    All,
    /// Every method, path prefix.
    Use,
}

impl Verb {
    /// Returns true if a request with `method` can be served by this verb.
    pub fn accepts(self, method: &Method) -> bool {
        match self {
            Verb::Get => method == Method::GET || method == Method::HEAD,
            Verb::Post => method == Method::POST,
            Verb::Put => method == Method::PUT,
            Verb::Delete => method == Method::DELETE,
            Verb::All | Verb::Use => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::Post => "post",
            Verb::Put => "put",
            Verb::Delete => "delete",
            Verb::All => "all",
            Verb::Use => "use",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Multipart handling strategy for a POST route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// Many files, under any of the listed field names.
    #[default]
    Array,
    /// One file, under the first listed field name.
    Single,
    /// Per-field limits, as listed.
    Fields,
    /// Any file under any field name.
    Any,
}

/// One accepted upload field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FieldSpec {
    pub name: String,

    /// Maximum number of files for this field (`fields` mode only).
    #[serde(default)]
    pub max_count: Option<usize>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_count: None,
        }
    }

    pub fn with_max_count(mut self, max_count: usize) -> Self {
        self.max_count = Some(max_count);
        self
    }
}

/// Upload policy declared on a route.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct UploadPolicy {
    #[serde(default)]
    pub mode: UploadMode,

    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl UploadPolicy {
    pub fn array<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: UploadMode::Array,
            fields: names.into_iter().map(FieldSpec::new).collect(),
        }
    }

    pub fn single(name: impl Into<String>) -> Self {
        Self {
            mode: UploadMode::Single,
            fields: vec![FieldSpec::new(name)],
        }
    }

    pub fn fields(fields: Vec<FieldSpec>) -> Self {
        Self {
            mode: UploadMode::Fields,
            fields,
        }
    }

    pub fn any() -> Self {
        Self {
            mode: UploadMode::Any,
            fields: Vec::new(),
        }
    }
}

/// One dispatchable endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RouteDescriptor {
    /// Controller-level prefix.
    #[serde(default)]
    pub mount: String,

    /// Action-level suffix.
    pub path: String,

    pub verb: Verb,

    /// Identifier of the controller in the registry.
    pub controller: String,

    /// Action invoked on the controller.
    pub action: String,

    /// Required capability; `None` means public.
    #[serde(default)]
    pub capability: Option<String>,

    /// Redirect target when the capability check fails.
    #[serde(default)]
    pub fail: Option<String>,

    /// Default view used when the action renders without naming one.
    #[serde(default)]
    pub view: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub layout: Option<String>,

    #[serde(default)]
    pub upload: Option<UploadPolicy>,

    /// Higher registers first.
    #[serde(default)]
    pub priority: i32,
}

impl RouteDescriptor {
    pub fn new(
        verb: Verb,
        path: impl Into<String>,
        controller: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            mount: String::new(),
            path: path.into(),
            verb,
            controller: controller.into(),
            action: action.into(),
            capability: None,
            fail: None,
            view: None,
            title: None,
            layout: None,
            upload: None,
            priority: 0,
        }
    }

    /// The final registered path: `mount + path` with slashes normalised.
    pub fn full_path(&self) -> String {
        join_path(&self.mount, &self.path)
    }

    pub fn mount(&mut self, mount: impl Into<String>) -> &mut Self {
        self.mount = mount.into();
        self
    }

    pub fn capability(&mut self, capability: impl Into<String>) -> &mut Self {
        self.capability = Some(capability.into());
        self
    }

    pub fn fail(&mut self, location: impl Into<String>) -> &mut Self {
        self.fail = Some(location.into());
        self
    }

    pub fn view(&mut self, view: impl Into<String>) -> &mut Self {
        self.view = Some(view.into());
        self
    }

    pub fn title(&mut self, title: impl Into<String>) -> &mut Self {
        self.title = Some(title.into());
        self
    }

    pub fn layout(&mut self, layout: impl Into<String>) -> &mut Self {
        self.layout = Some(layout.into());
        self
    }

    pub fn upload(&mut self, policy: UploadPolicy) -> &mut Self {
        self.upload = Some(policy);
        self
    }

    pub fn priority(&mut self, priority: i32) -> &mut Self {
        self.priority = priority;
        self
    }
}

/// Concatenate a mount prefix and an action path.
///
/// Runs of slashes collapse to one; a trailing slash is trimmed unless the
/// result is the root path.
pub fn join_path(mount: &str, path: &str) -> String {
    let mut joined = String::with_capacity(mount.len() + path.len() + 1);
    for c in mount.chars().chain(path.chars()) {
        if c == '/' && joined.ends_with('/') {
            continue;
        }
        joined.push(c);
    }

    if !joined.starts_with('/') {
        joined.insert(0, '/');
    }
    if joined.len() > 1 && joined.ends_with('/') {
        joined.pop();
    }
    joined
}

/// Route declarations collected from one controller.
///
/// Every route added through the verb methods inherits the set's current
/// mount, capability and fail redirect.
#[derive(Debug)]
pub struct RouteSet {
    controller: String,
    mount: String,
    capability: Option<String>,
    fail: Option<String>,
    routes: Vec<RouteDescriptor>,
}

impl RouteSet {
    pub fn new(controller: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            mount: String::new(),
            capability: None,
            fail: None,
            routes: Vec::new(),
        }
    }

    pub fn controller(&self) -> &str {
        &self.controller
    }

    pub fn mount(&mut self, mount: impl Into<String>) -> &mut Self {
        self.mount = mount.into();
        self
    }

    pub fn capability(&mut self, capability: impl Into<String>) -> &mut Self {
        self.capability = Some(capability.into());
        self
    }

    pub fn fail(&mut self, location: impl Into<String>) -> &mut Self {
        self.fail = Some(location.into());
        self
    }

    pub fn route(&mut self, verb: Verb, path: &str, action: &str) -> &mut RouteDescriptor {
        let mut descriptor = RouteDescriptor::new(verb, path, self.controller.clone(), action);
        descriptor.mount = self.mount.clone();
        descriptor.capability = self.capability.clone();
        descriptor.fail = self.fail.clone();

        self.routes.push(descriptor);
        let last = self.routes.len() - 1;
        &mut self.routes[last]
    }

    pub fn get(&mut self, path: &str, action: &str) -> &mut RouteDescriptor {
        self.route(Verb::Get, path, action)
    }

    pub fn post(&mut self, path: &str, action: &str) -> &mut RouteDescriptor {
        self.route(Verb::Post, path, action)
    }

    pub fn put(&mut self, path: &str, action: &str) -> &mut RouteDescriptor {
        self.route(Verb::Put, path, action)
    }

    pub fn delete(&mut self, path: &str, action: &str) -> &mut RouteDescriptor {
        self.route(Verb::Delete, path, action)
    }

    pub fn all(&mut self, path: &str, action: &str) -> &mut RouteDescriptor {
        self.route(Verb::All, path, action)
    }

    pub fn using(&mut self, path: &str, action: &str) -> &mut RouteDescriptor {
        self.route(Verb::Use, path, action)
    }

    pub fn into_routes(self) -> Vec<RouteDescriptor> {
        self.routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/admin/user", "/:id/update"), "/admin/user/:id/update");
        assert_eq!(join_path("/", "/"), "/");
        assert_eq!(join_path("/admin/user", "/"), "/admin/user");
        assert_eq!(join_path("/admin/", "//user/"), "/admin/user");
        assert_eq!(join_path("", "about"), "/about");
        assert_eq!(join_path("", ""), "/");
    }

    #[test]
    fn test_route_set_applies_controller_defaults() {
        let mut set = RouteSet::new("user.admin");
        set.mount("/admin/user").capability("admin.users.view").fail("/");
        set.get("/", "index").view("user/admin").title("User Administration");
        set.post("/:id/remove", "remove_submit").priority(12);

        let routes = set.into_routes();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].full_path(), "/admin/user");
        assert_eq!(routes[0].capability.as_deref(), Some("admin.users.view"));
        assert_eq!(routes[0].fail.as_deref(), Some("/"));
        assert_eq!(routes[0].view.as_deref(), Some("user/admin"));
        assert_eq!(routes[1].full_path(), "/admin/user/:id/remove");
        assert_eq!(routes[1].controller, "user.admin");
        assert_eq!(routes[1].priority, 12);
    }

    #[test]
    fn test_get_accepts_head() {
        assert!(Verb::Get.accepts(&Method::HEAD));
        assert!(!Verb::Post.accepts(&Method::GET));
        assert!(Verb::All.accepts(&Method::PATCH));
    }

    #[test]
    fn test_descriptor_deserializes_with_defaults() {
        let json = r#"{"path": "/upload", "verb": "post", "controller": "files", "action": "store",
                       "upload": {"mode": "single", "fields": [{"name": "avatar"}]}}"#;
        let descriptor: RouteDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.priority, 0);
        assert_eq!(descriptor.verb, Verb::Post);
        assert_eq!(descriptor.upload, Some(UploadPolicy::single("avatar")));
    }
}
