/*!
`BuildMux`: path-based dispatch of target keys to pipeline handlers.

This is an explicit value constructed per request rather than a
process-wide registry: handlers are injected at composition time, with a
small builder (`add`) preserving the "register at init" ergonomics.
*/

pub mod error;

use error::UnknownTargetError;
use std::collections::BTreeMap;

/// A routing entry: the key it was registered under, whether it is the
/// default (used when the requested key is empty), and a human
/// description surfaced by `list-targets`.
struct Entry<H> {
    handler: H,
    description: Option<String>,
    default: bool,
}

pub struct BuildMux<H> {
    entries: BTreeMap<String, Entry<H>>,
    registration_order: Vec<String>,
}

impl<H> Default for BuildMux<H> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            registration_order: Vec::new(),
        }
    }
}

impl<H> BuildMux<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `key`. Later registrations at the same key
    /// replace earlier ones.
    pub fn add(&mut self, key: impl Into<String>, handler: H, description: impl Into<String>) {
        let key = key.into();
        self.entries.insert(
            key.clone(),
            Entry {
                handler,
                description: Some(description.into()),
                default: false,
            },
        );
        self.registration_order.retain(|k| k != &key);
        self.registration_order.push(key);
    }

    /// Mark the handler at `key` as the default, used when an empty key is
    /// requested.
    pub fn set_default(&mut self, key: &str) {
        if let Some(e) = self.entries.get_mut(key) {
            e.default = true;
        }
    }

    /// Resolve `requested` to `(handler, remainder)`: the handler whose key
    /// is either equal to, or the longest `/`-delimited prefix of,
    /// `requested`. An empty `requested` resolves to the handler marked
    /// `default = true`, or the last-registered handler if none is marked.
    pub fn handle<'a>(&'a self, requested: &str) -> Result<(&'a H, &'a str), UnknownTargetError> {
        tracing::debug!(requested, "dispatching target key");
        if requested.is_empty() {
            if let Some(key) = self.entries.iter().find(|(_, e)| e.default).map(|(k, _)| k) {
                return Ok((&self.entries[key].handler, ""));
            }
            if let Some(key) = self.registration_order.last() {
                return Ok((&self.entries[key].handler, ""));
            }
            return error::UnknownTargetSnafu {
                requested: requested.to_string(),
                candidates: self.candidates(),
            }
            .fail();
        }

        // Longest-prefix match over `/`-delimited segments: a candidate key
        // matches if it equals `requested` or is followed by `/` at the
        // boundary.
        let mut best: Option<&str> = None;
        for key in self.entries.keys() {
            if requested == key.as_str()
                || requested.starts_with(key.as_str())
                    && requested.as_bytes().get(key.len()) == Some(&b'/')
            {
                if best.map(|b| key.len() > b.len()).unwrap_or(true) {
                    best = Some(key.as_str());
                }
            }
        }

        if let Some(key) = best {
            let remainder = requested[key.len()..].trim_start_matches('/');
            return Ok((&self.entries[key].handler, remainder));
        }

        // `requested` may itself be a strict prefix of one or more longer
        // registered keys (e.g. "debug" with "debug/resolve" and
        // "debug/sources" registered): fall back to the last-registered
        // entry under that namespace, mirroring the empty-key
        // default/last-registered behavior above.
        let namespace = format!("{requested}/");
        if let Some(key) = self
            .registration_order
            .iter()
            .rev()
            .find(|k| k.starts_with(&namespace))
        {
            return Ok((&self.entries[key].handler, ""));
        }

        error::UnknownTargetSnafu {
            requested: requested.to_string(),
            candidates: self.candidates(),
        }
        .fail()
    }

    fn candidates(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// All registered `(key, description)` pairs, for a `list-targets`
    /// introspection request.
    pub fn list_targets(&self) -> Vec<(String, Option<String>)> {
        self.entries
            .iter()
            .map(|(k, e)| (k.clone(), e.description.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_prefix_wins() {
        let mut mux = BuildMux::new();
        mux.add("debug/resolve", "resolve", "resolve debug info");
        mux.add("debug/sources", "sources", "resolve sources");
        mux.add("mariner2/rpm", "rpm", "build rpm");

        let (h, rem) = mux.handle("debug/resolve").unwrap();
        assert_eq!(*h, "resolve");
        assert_eq!(rem, "");

        let (h, rem) = mux.handle("mariner2/rpm/debug").unwrap();
        assert_eq!(*h, "rpm");
        assert_eq!(rem, "debug");
    }

    #[test]
    fn empty_key_uses_default_or_last_registered() {
        let mut mux = BuildMux::new();
        mux.add("debug/resolve", "resolve", "");
        mux.add("debug/sources", "sources", "");
        // no default marked: last-registered wins
        let (h, _) = mux.handle("").unwrap();
        assert_eq!(*h, "sources");

        mux.set_default("debug/resolve");
        let (h, _) = mux.handle("").unwrap();
        assert_eq!(*h, "resolve");
    }

    #[test]
    fn shorter_requested_key_falls_back_to_last_registered_in_namespace() {
        let mut mux = BuildMux::new();
        mux.add("debug/resolve", "resolve", "");
        mux.add("debug/sources", "sources", "");
        mux.add("mariner2/rpm", "rpm", "");

        let (h, rem) = mux.handle("debug").unwrap();
        assert_eq!(*h, "sources");
        assert_eq!(rem, "");
    }

    #[test]
    fn unknown_key_fails_with_candidates() {
        let mut mux = BuildMux::new();
        mux.add("mariner2/rpm", "rpm", "");
        let err = mux.handle("nope/nothing").unwrap_err();
        assert_eq!(err.requested, "nope/nothing");
        assert_eq!(err.candidates, vec!["mariner2/rpm".to_string()]);
    }

    #[test]
    fn sibling_prefixes_do_not_collide() {
        let mut mux = BuildMux::new();
        mux.add("mariner2/rpm", "rpm", "");
        mux.add("mariner2/rpmextra", "rpmextra", "");
        let (h, rem) = mux.handle("mariner2/rpmextra").unwrap();
        assert_eq!(*h, "rpmextra");
        assert_eq!(rem, "");
    }

    #[test]
    fn list_targets_reports_all_descriptions() {
        let mut mux = BuildMux::new();
        mux.add("a/b", "x", "desc a");
        mux.add("c/d", "y", "desc c");
        let mut listed = mux.list_targets();
        listed.sort();
        assert_eq!(
            listed,
            vec![
                ("a/b".to_string(), Some("desc a".to_string())),
                ("c/d".to_string(), Some("desc c".to_string())),
            ]
        );
    }
}
