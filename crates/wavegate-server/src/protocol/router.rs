//! Maps namespaced command names to handler families.
//!
//! A command `<namespace>.<verb>` is split at the first `.`; the namespace
//! selects one of a closed set of families and the remainder is the verb.

/// Separator between namespace and verb.
pub const SEPARATOR: char = '.';

/// Verb spellings accepted for compatibility, with their canonical form.
const LEGACY_VERBS: &[(Namespace, &str, &str)] = &[(
    Namespace::Controller,
    "remove_node_from_all_assocations",
    "remove_node_from_all_associations",
)];

/// Command namespaces, one handler family each.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Controller node commands.
    Controller,
    /// Driver process commands.
    Driver,
    /// Per-node commands.
    Node,
    /// Per-endpoint commands.
    Endpoint,
    /// Multicast group commands.
    MulticastGroup,
    /// Broadcast node commands.
    BroadcastNode,
    /// Stateless helpers.
    Utils,
}

impl Namespace {
    /// All namespaces.
    pub const ALL: [Self; 7] = [
        Self::Controller,
        Self::Driver,
        Self::Node,
        Self::Endpoint,
        Self::MulticastGroup,
        Self::BroadcastNode,
        Self::Utils,
    ];

    /// Wire prefix.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Controller => "controller",
            Self::Driver => "driver",
            Self::Node => "node",
            Self::Endpoint => "endpoint",
            Self::MulticastGroup => "multicast_group",
            Self::BroadcastNode => "broadcast_node",
            Self::Utils => "utils",
        }
    }

    /// Namespace for a wire prefix.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ns| ns.prefix() == prefix)
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Result of routing a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Route<'a> {
    /// Handler family.
    pub namespace: Namespace,
    /// Verb with legacy spellings normalized. Empty if the command has no
    /// separator.
    pub verb: &'a str,
}

/// Route `command` to a namespace and verb. `None` if the namespace is unknown.
pub fn route(command: &str) -> Option<Route<'_>> {
    let (prefix, verb) = command.split_once(SEPARATOR).unwrap_or((command, ""));
    let namespace = Namespace::from_prefix(prefix)?;
    let verb = LEGACY_VERBS
        .iter()
        .find(|(ns, legacy, _)| *ns == namespace && *legacy == verb)
        .map_or(verb, |&(_, _, canonical)| canonical);
    Some(Route { namespace, verb })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_every_namespace() {
        for ns in Namespace::ALL {
            let command = format!("{}.do_thing", ns.prefix());
            let route = route(&command).unwrap();
            assert_eq!(route.namespace, ns);
            assert_eq!(route.verb, "do_thing");
        }
    }

    #[test]
    fn splits_on_first_separator_only() {
        let route = route("node.a.b").unwrap();
        assert_eq!(route.namespace, Namespace::Node);
        assert_eq!(route.verb, "a.b");
    }

    #[test]
    fn unknown_namespace() {
        assert!(route("bogus.verb").is_none());
        assert!(route("").is_none());
        assert!(route(".verb").is_none());
    }

    #[test]
    fn namespace_without_verb() {
        let route = route("utils").unwrap();
        assert_eq!(route.namespace, Namespace::Utils);
        assert_eq!(route.verb, "");
    }

    #[test]
    fn prefixes_are_case_sensitive() {
        assert!(route("Node.get_state").is_none());
    }

    #[test]
    fn legacy_spelling_is_normalized() {
        let legacy = route("controller.remove_node_from_all_assocations").unwrap();
        let current = route("controller.remove_node_from_all_associations").unwrap();
        assert_eq!(legacy, current);
        assert_eq!(legacy.verb, "remove_node_from_all_associations");
    }

    #[test]
    fn legacy_spelling_only_applies_to_its_namespace() {
        let route = route("node.remove_node_from_all_assocations").unwrap();
        assert_eq!(route.verb, "remove_node_from_all_assocations");
    }

    #[test]
    fn display_is_prefix() {
        assert_eq!(Namespace::MulticastGroup.to_string(), "multicast_group");
    }
}
