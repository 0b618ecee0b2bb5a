//! Hierarchical route matching.
//!
//! Tenant-scoped routes start with the `:repo` wildcard, which stands for a
//! tenant path of however many segments the server is configured for. With
//! a static depth the wildcard always consumes exactly `depth` segments.
//! With dynamic depth every split point is tried from shortest tenant path
//! to longest, and the first split whose remainder matches a route wins.
//! Trying shorter tenant paths first is what keeps `/health` the health
//! check while `/health/index.yaml` is the index of a tenant called
//! `health`.

use axum::http::Method;

/// Name the tenant path is bound to in extracted parameters.
pub const TENANT_PARAM: &str = "repo";

/// Token that marks a pattern as tenant-scoped.
const TENANT_TOKEN: &str = ":repo";

/// Access a route requires. Enforcement belongs to the auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Pull,
    Push,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A registered route.
#[derive(Debug, Clone)]
pub struct Route<H> {
    method: Method,
    pattern: String,
    tenant_scoped: bool,
    segments: Vec<Segment>,
    handler: H,
    capability: Option<Capability>,
}

impl<H> Route<H> {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn capability(&self) -> Option<Capability> {
        self.capability
    }

    pub fn is_tenant_scoped(&self) -> bool {
        self.tenant_scoped
    }

    /// Match `path` (the part after the tenant) against this route's own
    /// segments, collecting its named parameters.
    fn match_suffix(&self, path: &[&str]) -> Option<Vec<(String, String)>> {
        if path.len() != self.segments.len() {
            return None;
        }
        let mut params = Vec::new();
        for (segment, value) in self.segments.iter().zip(path) {
            match segment {
                Segment::Literal(literal) if literal == value => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => params.push((name.clone(), (*value).to_string())),
            }
        }
        Some(params)
    }
}

/// Result of a successful match.
#[derive(Debug)]
pub struct RouteMatch<'a, H> {
    pub route: &'a Route<H>,
    /// The route's own parameters in pattern order, then `repo` for
    /// tenant-scoped routes.
    pub params: Vec<(String, String)>,
}

impl<H> RouteMatch<'_, H> {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// How the tenant part of a path is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantDepth {
    Static(usize),
    Dynamic,
}

impl TenantDepth {
    pub fn new(depth: usize, dynamic: bool) -> Self {
        if dynamic {
            TenantDepth::Dynamic
        } else {
            TenantDepth::Static(depth)
        }
    }
}

/// Ordered set of routes. Earlier registrations win ties.
#[derive(Debug, Clone)]
pub struct RouteTable<H> {
    routes: Vec<Route<H>>,
}

impl<H> Default for RouteTable<H> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<H> RouteTable<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route. Patterns are `/`-separated; `:name` binds one
    /// segment and a leading `:repo` marks the route as tenant-scoped.
    pub fn route(
        mut self,
        method: Method,
        pattern: &str,
        handler: H,
        capability: Option<Capability>,
    ) -> Self {
        let mut parts: Vec<&str> = split_path(pattern);
        let tenant_scoped = parts.first() == Some(&TENANT_TOKEN);
        if tenant_scoped {
            parts.remove(0);
        }
        let segments = parts
            .into_iter()
            .map(|p| match p.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(p.to_string()),
            })
            .collect();

        self.routes.push(Route {
            method,
            pattern: pattern.to_string(),
            tenant_scoped,
            segments,
            handler,
            capability,
        });
        self
    }

    pub fn routes(&self) -> &[Route<H>] {
        &self.routes
    }

    /// Resolve a request.
    ///
    /// `context_path` is stripped first; a path outside it never matches.
    /// Returns `None` when nothing matches.
    pub fn matches(
        &self,
        method: &Method,
        path: &str,
        context_path: &str,
        depth: TenantDepth,
    ) -> Option<RouteMatch<'_, H>> {
        let path = strip_context_path(path, context_path)?;
        let segments = split_path(path);

        match depth {
            TenantDepth::Static(depth) => self.match_split(method, &segments, depth, true),
            TenantDepth::Dynamic => (0..=segments.len())
                .find_map(|split| self.match_split(method, &segments, split, split == 0)),
        }
    }

    /// Try every route with the tenant taking the first `split` segments.
    /// Routes that are not tenant-scoped are only considered when
    /// `allow_plain` is set; they always see the whole path.
    fn match_split(
        &self,
        method: &Method,
        segments: &[&str],
        split: usize,
        allow_plain: bool,
    ) -> Option<RouteMatch<'_, H>> {
        self.routes
            .iter()
            .filter(|route| &route.method == method)
            .find_map(|route| {
                if route.tenant_scoped {
                    if split > segments.len() {
                        return None;
                    }
                    let mut params = route.match_suffix(&segments[split..])?;
                    params.push((TENANT_PARAM.to_string(), segments[..split].join("/")));
                    Some(RouteMatch { route, params })
                } else if allow_plain {
                    let params = route.match_suffix(segments)?;
                    Some(RouteMatch { route, params })
                } else {
                    None
                }
            })
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn strip_context_path<'a>(path: &'a str, context_path: &str) -> Option<&'a str> {
    let context_path = context_path.trim_end_matches('/');
    if context_path.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(context_path)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn table() -> RouteTable<u8> {
        RouteTable::new()
            .route(Method::GET, "/", 0, Some(Capability::Pull))
            .route(Method::GET, "/health", 1, None)
            .route(Method::GET, "/:repo/index.yaml", 2, Some(Capability::Pull))
            .route(Method::GET, "/:repo/charts/:filename", 3, Some(Capability::Pull))
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,7}".prop_filter("route literal", |s| s != "charts")
    }

    proptest! {
        #[test]
        fn prop_dynamic_matches_correct_static_depth(
            tenant in prop::collection::vec(segment(), 0..5),
            context in prop::collection::vec("[a-z]{1,4}", 0..3),
            filename in "[a-z]{1,8}-[0-9]\\.[0-9]\\.[0-9]\\.tgz",
            charts in any::<bool>(),
        ) {
            let table = table();
            let context_path = context.iter().map(|c| format!("/{c}")).collect::<String>();
            let tenant_path = tenant.iter().map(|s| format!("/{s}")).collect::<String>();
            let suffix = if charts { format!("/charts/{filename}") } else { "/index.yaml".to_string() };
            let path = format!("{context_path}{tenant_path}{suffix}");

            let fixed = table
                .matches(&Method::GET, &path, &context_path, TenantDepth::Static(tenant.len()))
                .map(|m| (*m.route.handler(), m.params));
            let dynamic = table
                .matches(&Method::GET, &path, &context_path, TenantDepth::Dynamic)
                .map(|m| (*m.route.handler(), m.params));

            prop_assert!(fixed.is_some());
            prop_assert_eq!(&fixed, &dynamic);
            let (_, params) = fixed.unwrap_or_default();
            prop_assert_eq!(params.last().map(|(_, v)| v.clone()), Some(tenant.join("/")));
        }
    }
}
