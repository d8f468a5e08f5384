//! Newtype wrappers for string identifiers used across the pipeline.
//!
//! All newtypes serialize/deserialize as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Resource kind as written in a manifest's `kind` field, e.g. `AwsVpc`.
    KindName
);

string_newtype!(
    /// Fully qualified Pulumi stack name, `<organization>/<project>/<stack>`.
    StackFqdn
);

string_newtype!(
    /// Namespacing key for workspaces and module clone caches.
    ScopeKey
);

impl KindName {
    /// Directory name of the kind's module inside a provider tree.
    pub fn module_dir_name(&self) -> String {
        self.0.to_lowercase()
    }
}

impl StackFqdn {
    /// Split into `(organization, project, stack)`; `None` unless there are
    /// exactly three non-empty segments.
    pub fn parts(&self) -> Option<(&str, &str, &str)> {
        let mut it = self.0.split('/');
        let org = it.next()?;
        let project = it.next()?;
        let stack = it.next()?;
        if it.next().is_some() || org.is_empty() || project.is_empty() || stack.is_empty() {
            return None;
        }
        Some((org, project, stack))
    }

    pub fn project(&self) -> Option<&str> {
        self.parts().map(|(_, project, _)| project)
    }
}

impl ScopeKey {
    /// Scope safe to use as a single path component.
    pub fn path_component(&self) -> String {
        self.0
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' => '-',
                c if c.is_whitespace() => '-',
                c => c,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_and_module_dir() {
        let kind = KindName::new("AwsVpc");
        assert_eq!(kind.to_string(), "AwsVpc");
        assert_eq!(kind.module_dir_name(), "awsvpc");
    }

    #[test]
    fn kind_serde_is_transparent() {
        let kind = KindName::from("GcpGkeCluster");
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, "\"GcpGkeCluster\"");
        let back: KindName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kind);
    }

    #[test]
    fn stack_fqdn_parts() {
        let fqdn = StackFqdn::new("acme/networking/prod");
        assert_eq!(fqdn.parts(), Some(("acme", "networking", "prod")));
        assert_eq!(fqdn.project(), Some("networking"));
    }

    #[test]
    fn stack_fqdn_rejects_wrong_shape() {
        assert!(StackFqdn::new("acme/prod").parts().is_none());
        assert!(StackFqdn::new("a/b/c/d").parts().is_none());
        assert!(StackFqdn::new("a//c").parts().is_none());
    }

    #[test]
    fn scope_path_component_has_no_separators() {
        let scope = ScopeKey::new("acme/networking/prod");
        assert_eq!(scope.path_component(), "acme-networking-prod");
    }
}
