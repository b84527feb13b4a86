//! Route → resource key mapping.
//!
//! Each route pattern lists the resources a page on that route reads.
//! Dynamic segments (`:name`) are bound from the concrete path, or from the
//! caller's params when the path itself still holds the placeholder.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::cache::key::{ResourceKey, ResourceKind};
use crate::identity::UserId;

/// Values for dynamic route segments.
pub type RouteParams = BTreeMap<String, String>;

/// One resource read by a route, and the route params it is keyed by.
#[derive(Debug, Clone, Copy)]
pub struct KeyTemplate {
    pub kind: ResourceKind,
    pub params: &'static [&'static str],
}

const fn res(kind: ResourceKind) -> KeyTemplate {
    KeyTemplate { kind, params: &[] }
}

const fn res_with(kind: ResourceKind, params: &'static [&'static str]) -> KeyTemplate {
    KeyTemplate { kind, params }
}

#[derive(Debug, Clone, Copy)]
pub struct RouteSpec {
    pub pattern: &'static str,
    pub resources: &'static [KeyTemplate],
}

/// The application's routes.
pub const ROUTES: &[RouteSpec] = &[
    RouteSpec {
        pattern: "/dashboard",
        resources: &[
            res(ResourceKind::UserStats),
            res(ResourceKind::UserProgress),
            res(ResourceKind::UserStreak),
            res(ResourceKind::ActiveQuests),
            res(ResourceKind::Recommendations),
        ],
    },
    RouteSpec {
        pattern: "/quiz",
        resources: &[
            res(ResourceKind::Quizzes),
            res(ResourceKind::Subjects),
            res(ResourceKind::DailyChallenge),
        ],
    },
    RouteSpec {
        pattern: "/quiz/:quizId",
        resources: &[res_with(ResourceKind::Quiz, &["quizId"])],
    },
    RouteSpec {
        pattern: "/subjects",
        resources: &[res(ResourceKind::Subjects)],
    },
    RouteSpec {
        pattern: "/subjects/:subjectId",
        resources: &[
            res_with(ResourceKind::Subject, &["subjectId"]),
            res_with(ResourceKind::Topics, &["subjectId"]),
        ],
    },
    RouteSpec {
        pattern: "/subjects/:subjectId/topics/:topicId",
        resources: &[
            res_with(ResourceKind::Topic, &["topicId"]),
            res_with(ResourceKind::Quizzes, &["topicId"]),
        ],
    },
    RouteSpec {
        pattern: "/profile",
        resources: &[
            res(ResourceKind::UserProfile),
            res(ResourceKind::Achievements),
            res(ResourceKind::UserStats),
        ],
    },
    RouteSpec {
        pattern: "/leaderboard",
        resources: &[res(ResourceKind::Leaderboard)],
    },
    RouteSpec {
        pattern: "/learning-assistant",
        resources: &[
            res(ResourceKind::Recommendations),
            res(ResourceKind::ActiveSessions),
        ],
    },
];

fn segments(path: &str) -> Vec<&str> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Route table lookups.
#[derive(Debug, Clone, Copy)]
pub struct RouteTable {
    routes: &'static [RouteSpec],
}

impl Default for RouteTable {
    fn default() -> Self {
        Self { routes: ROUTES }
    }
}

impl RouteTable {
    pub fn new(routes: &'static [RouteSpec]) -> Self {
        Self { routes }
    }

    /// Find the route matching `path` and bind its dynamic segments.
    pub fn match_route(&self, path: &str, params: &RouteParams) -> Option<(&RouteSpec, RouteParams)> {
        let actual = segments(path);
        self.routes.iter().find_map(|spec| {
            let pattern = segments(spec.pattern);
            if pattern.len() != actual.len() {
                return None;
            }
            let mut bound = RouteParams::new();
            for (want, got) in pattern.iter().zip(&actual) {
                match want.strip_prefix(':') {
                    Some(name) => {
                        if got.starts_with(':') {
                            // Placeholder in the path; bind from params if present.
                            if let Some(value) = params.get(name) {
                                bound.insert(name.to_string(), value.clone());
                            }
                        } else {
                            bound.insert(name.to_string(), (*got).to_string());
                        }
                    }
                    None if want == got => {}
                    None => return None,
                }
            }
            Some((spec, bound))
        })
    }

    /// Resource keys relevant to `path`.
    ///
    /// User-scoped keys need a signed-in user; keys whose parameters cannot
    /// be bound are skipped with a warning. Unknown routes resolve to nothing.
    pub fn resolve(&self, path: &str, user: Option<&UserId>, params: &RouteParams) -> Vec<ResourceKey> {
        let Some((spec, bound)) = self.match_route(path, params) else {
            debug!(route = path, "No prefetch mapping for route");
            return Vec::new();
        };

        let mut keys = Vec::with_capacity(spec.resources.len());
        'templates: for template in spec.resources {
            let mut key = ResourceKey::new(template.kind);
            for name in template.params {
                match bound.get(*name) {
                    Some(value) => key = key.with(*name, value.clone()),
                    None => {
                        warn!(route = path, kind = %template.kind, param = *name, "Unbound route parameter, skipping");
                        continue 'templates;
                    }
                }
            }
            if template.kind.is_user_scoped() {
                match user {
                    Some(user) => key = key.with(crate::cache::key::USER_PARAM, user.as_str()),
                    None => continue,
                }
            }
            keys.push(key);
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concrete_path_binds_segments() {
        let table = RouteTable::default();
        let keys = table.resolve("/subjects/42/topics/7?tab=quiz", None, &RouteParams::new());
        assert_eq!(
            keys,
            vec![
                ResourceKey::new(ResourceKind::Topic).with("topicId", "7"),
                ResourceKey::new(ResourceKind::Quizzes).with("topicId", "7"),
            ]
        );
    }

    #[test]
    fn test_placeholder_bound_from_params() {
        let table = RouteTable::default();
        let params = RouteParams::from([("subjectId".to_string(), "9".to_string())]);
        let keys = table.resolve("/subjects/:subjectId", None, &params);
        assert_eq!(keys[0], ResourceKey::new(ResourceKind::Subject).with("subjectId", "9"));
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_missing_param_skips_key() {
        let table = RouteTable::default();
        let keys = table.resolve("/quiz/:quizId", None, &RouteParams::new());
        assert!(keys.is_empty());
    }

    #[test]
    fn test_user_scoped_keys_need_user() {
        let table = RouteTable::default();
        assert!(table.resolve("/dashboard", None, &RouteParams::new()).is_empty());

        let alice = UserId::new("alice");
        let keys = table.resolve("/dashboard/", Some(&alice), &RouteParams::new());
        assert_eq!(keys.len(), 5);
        assert!(keys.iter().all(|k| k.user() == Some("alice")));
    }

    #[test]
    fn test_unknown_route() {
        let table = RouteTable::default();
        assert!(table.resolve("/settings", None, &RouteParams::new()).is_empty());
        assert!(table.match_route("/quiz/1/extra", &RouteParams::new()).is_none());
    }
}
